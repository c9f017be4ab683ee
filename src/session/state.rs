//! Connection lifecycle state machine
//!
//! ```text
//! Idle --connect--> Connecting --ok--> Connected --disconnect--> Disconnecting --ok--> Idle
//!                        |                 ^                          |
//!                        +--err--> Failed  +-----------err------------+
//!                                    |
//!                                    +--reset--> Idle
//! ```

use serde::Serialize;

/// Lifecycle state of one logical connection attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleState {
    Idle,
    Connecting,
    Connected,
    Disconnecting,
    Failed,
}

impl std::fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            LifecycleState::Idle => "idle",
            LifecycleState::Connecting => "connecting",
            LifecycleState::Connected => "connected",
            LifecycleState::Disconnecting => "disconnecting",
            LifecycleState::Failed => "failed",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Invalid state transition: cannot {action} while {from}")]
pub struct TransitionError {
    pub from: LifecycleState,
    pub action: &'static str,
}

/// State machine plus the bookkeeping the UI shows next to a session
#[derive(Debug, Clone)]
pub struct LifecycleStateMachine {
    state: LifecycleState,
    /// Last hard error (connect / disconnect failure)
    error: Option<String>,
    /// Set when the session is connected but activation or refresh failed
    degraded: Option<String>,
}

impl LifecycleStateMachine {
    pub fn new() -> Self {
        Self {
            state: LifecycleState::Idle,
            error: None,
            degraded: None,
        }
    }

    pub fn state(&self) -> LifecycleState {
        self.state
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn degraded(&self) -> Option<&str> {
        self.degraded.as_deref()
    }

    fn expect(&self, allowed: LifecycleState, action: &'static str) -> Result<(), TransitionError> {
        if self.state == allowed {
            Ok(())
        } else {
            Err(TransitionError {
                from: self.state,
                action,
            })
        }
    }

    /// Idle -> Connecting
    pub fn start_connecting(&mut self) -> Result<(), TransitionError> {
        self.expect(LifecycleState::Idle, "connect")?;
        self.state = LifecycleState::Connecting;
        self.error = None;
        self.degraded = None;
        Ok(())
    }

    /// Connecting -> Connected
    pub fn connect_success(&mut self) -> Result<(), TransitionError> {
        self.expect(LifecycleState::Connecting, "complete connect")?;
        self.state = LifecycleState::Connected;
        Ok(())
    }

    /// Connecting -> Failed
    pub fn connect_failed(&mut self, error: String) -> Result<(), TransitionError> {
        self.expect(LifecycleState::Connecting, "fail connect")?;
        self.state = LifecycleState::Failed;
        self.error = Some(error);
        Ok(())
    }

    /// Failed -> Idle
    pub fn reset(&mut self) -> Result<(), TransitionError> {
        self.expect(LifecycleState::Failed, "reset")?;
        self.state = LifecycleState::Idle;
        Ok(())
    }

    /// Connected -> Disconnecting
    pub fn start_disconnecting(&mut self) -> Result<(), TransitionError> {
        self.expect(LifecycleState::Connected, "disconnect")?;
        self.state = LifecycleState::Disconnecting;
        Ok(())
    }

    /// Disconnecting -> Idle
    pub fn disconnect_complete(&mut self) -> Result<(), TransitionError> {
        self.expect(LifecycleState::Disconnecting, "complete disconnect")?;
        self.state = LifecycleState::Idle;
        self.error = None;
        self.degraded = None;
        Ok(())
    }

    /// Disconnecting -> Connected; the remote side may still be up
    pub fn disconnect_failed(&mut self, error: String) -> Result<(), TransitionError> {
        self.expect(LifecycleState::Disconnecting, "fail disconnect")?;
        self.state = LifecycleState::Connected;
        self.error = Some(error);
        Ok(())
    }

    pub fn set_degraded(&mut self, reason: Option<String>) {
        self.degraded = reason;
    }
}

impl Default for LifecycleStateMachine {
    fn default() -> Self {
        Self::new()
    }
}
