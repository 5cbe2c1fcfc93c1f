use crate::decision::Decision;
use crate::rule::Phase;
use crate::rule_map::RuleId;
use dashmap::DashMap;
use query_pipeline::ResponsePath;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tokio::sync::OnceCell;

/// Identifies one rule at one field occurrence in one phase
///
/// Validation runs against a `null` parent, so its decisions are kept apart
/// from the ones resolver guards take against the resolved parent.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CacheKey {
    pub rule: RuleId,
    pub phase: Phase,
    pub path: ResponsePath,
}

/// Per-request memo of rule decisions
///
/// Each key owns a cell that is initialised by the first evaluation; later
/// and concurrent lookups of the same key await that cell instead of running
/// the rule again. A cell whose evaluation was dropped stays empty and the
/// next lookup evaluates afresh.
#[derive(Clone, Default)]
pub struct EvaluationCache {
    slots: Arc<DashMap<CacheKey, Arc<OnceCell<Decision>>>>,
}

impl EvaluationCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cell for `key`, created on first use
    pub(crate) fn slot(&self, key: CacheKey) -> Arc<OnceCell<Decision>> {
        self.slots.entry(key).or_default().value().clone()
    }

    /// Settled decision for `key`, if any
    pub fn get(&self, key: &CacheKey) -> Option<Decision> {
        self.slots
            .get(key)
            .and_then(|slot| slot.value().get().cloned())
    }

    /// Number of keys with a settled decision
    pub fn len(&self) -> usize {
        self.slots
            .iter()
            .filter(|slot| slot.value().initialized())
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl fmt::Debug for EvaluationCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EvaluationCache")
            .field("settled", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(rule: u32, path: &str) -> CacheKey {
        CacheKey {
            rule: RuleId::from(rule),
            phase: Phase::Execution,
            path: ResponsePath::root().key(path),
        }
    }

    #[tokio::test]
    async fn test_slot_is_shared_per_key() {
        let cache = EvaluationCache::new();
        let first = cache.slot(key(1, "secret"));
        let again = cache.slot(key(1, "secret"));
        assert!(Arc::ptr_eq(&first, &again));

        first.get_or_init(|| async { Decision::deny("no") }).await;
        assert_eq!(cache.get(&key(1, "secret")), Some(Decision::deny("no")));
        assert_eq!(cache.get(&key(2, "secret")), None);
        assert_eq!(cache.get(&key(1, "other")), None);
        assert_eq!(cache.len(), 1);
    }

    #[tokio::test]
    async fn test_phases_do_not_share_entries() {
        let cache = EvaluationCache::new();
        let validation = CacheKey {
            phase: Phase::Validation,
            ..key(1, "post")
        };
        cache
            .slot(validation.clone())
            .get_or_init(|| async { Decision::Allow })
            .await;

        assert_eq!(cache.get(&validation), Some(Decision::Allow));
        assert_eq!(cache.get(&key(1, "post")), None);
        assert!(!Arc::ptr_eq(&cache.slot(validation), &cache.slot(key(1, "post"))));
    }

    #[tokio::test]
    async fn test_clones_share_entries() {
        let cache = EvaluationCache::new();
        let clone = cache.clone();
        clone
            .slot(key(3, "a"))
            .get_or_init(|| async { Decision::Allow })
            .await;
        assert_eq!(cache.get(&key(3, "a")), Some(Decision::Allow));
    }

    #[test]
    fn test_unsettled_slots_are_not_counted() {
        let cache = EvaluationCache::new();
        let _slot = cache.slot(key(1, "a"));
        assert!(cache.is_empty());
    }
}
