//! Generation numbers for module events
//!
//! Observers compare the `generation` of two events of the same session and
//! keep the higher one. Numbering restarts when a session is forgotten.

use dashmap::DashMap;

#[derive(Default)]
pub struct EventSequencer {
    last: DashMap<String, u64>,
}

impl EventSequencer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bump and return the generation of `session_id`; the first call yields 1
    pub fn next(&self, session_id: &str) -> u64 {
        let mut slot = self.last.entry(session_id.to_owned()).or_insert(0);
        *slot += 1;
        *slot
    }

    /// Last generation handed out, 0 if none
    pub fn current(&self, session_id: &str) -> u64 {
        self.last.get(session_id).map_or(0, |g| *g)
    }

    pub fn forget(&self, session_id: &str) {
        self.last.remove(session_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_generation_is_one() {
        let seq = EventSequencer::new();
        assert_eq!(seq.current("s1"), 0);
        assert_eq!(seq.next("s1"), 1);
        assert_eq!(seq.next("s1"), 2);
        assert_eq!(seq.current("s1"), 2);
    }

    #[test]
    fn test_sessions_count_separately() {
        let seq = EventSequencer::new();
        seq.next("s1");
        seq.next("s1");
        assert_eq!(seq.next("s2"), 1);
        assert_eq!(seq.current("s1"), 2);
    }

    #[test]
    fn test_forget_restarts_numbering() {
        let seq = EventSequencer::new();
        seq.next("s1");
        seq.forget("s1");
        assert_eq!(seq.current("s1"), 0);
        assert_eq!(seq.next("s1"), 1);
    }
}
