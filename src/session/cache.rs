//! Per-session module data cache
//!
//! Holds the last successfully applied data of each module. Every entry is
//! tagged with the session it belongs to and reads are session-scoped, so a
//! reader can never observe another session's artifacts.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use tracing::debug;

use super::types::{ModuleData, ModuleKind};

#[derive(Debug, Clone, PartialEq)]
pub struct CachedModule {
    pub session_id: String,
    pub data: ModuleData,
    pub generation: u64,
    pub fetched_at: DateTime<Utc>,
}

pub struct ModuleCache {
    entries: DashMap<ModuleKind, CachedModule>,
}

impl ModuleCache {
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
        }
    }

    pub fn store(&self, module: ModuleKind, session_id: &str, data: ModuleData, generation: u64) {
        self.entries.insert(
            module,
            CachedModule {
                session_id: session_id.to_string(),
                data,
                generation,
                fetched_at: Utc::now(),
            },
        );
    }

    /// Cached data of `module`, only if it belongs to `session_id`
    pub fn get(&self, module: ModuleKind, session_id: &str) -> Option<CachedModule> {
        self.entries
            .get(&module)
            .filter(|e| e.session_id == session_id)
            .map(|e| e.value().clone())
    }

    /// Drop everything that does not belong to `session_id`
    pub fn retain_session(&self, session_id: &str) {
        let before = self.entries.len();
        self.entries.retain(|_, e| e.session_id == session_id);
        let evicted = before - self.entries.len();
        if evicted > 0 {
            debug!("ModuleCache: evicted {} foreign entries (keeping {})", evicted, session_id);
        }
    }

    /// Drop everything that belongs to `session_id`
    pub fn evict_session(&self, session_id: &str) {
        self.entries.retain(|_, e| e.session_id != session_id);
    }

    pub fn modules_for(&self, session_id: &str) -> Vec<ModuleKind> {
        let mut modules: Vec<ModuleKind> = self
            .entries
            .iter()
            .filter(|e| e.session_id == session_id)
            .map(|e| *e.key())
            .collect();
        modules.sort();
        modules
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for ModuleCache {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_reads_are_session_scoped() {
        let cache = ModuleCache::new();
        cache.store(ModuleKind::SystemInfo, "s1", json!({"os": "linux"}), 1);

        assert!(cache.get(ModuleKind::SystemInfo, "s1").is_some());
        assert!(cache.get(ModuleKind::SystemInfo, "s2").is_none());
    }

    #[test]
    fn test_retain_session_evicts_others() {
        let cache = ModuleCache::new();
        cache.store(ModuleKind::SystemInfo, "s1", json!(1), 1);
        cache.store(ModuleKind::FileListing, "s2", json!(2), 1);

        cache.retain_session("s2");
        assert_eq!(cache.modules_for("s1"), vec![]);
        assert_eq!(cache.modules_for("s2"), vec![ModuleKind::FileListing]);
    }

    #[test]
    fn test_evict_session() {
        let cache = ModuleCache::new();
        cache.store(ModuleKind::Terminal, "s1", json!([]), 3);
        cache.evict_session("s1");
        assert!(cache.is_empty());
    }
}
