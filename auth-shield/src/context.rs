use crate::cache::{CacheKey, EvaluationCache};
use crate::decision::Decision;
use crate::rule::{FieldCall, ShieldRule};
use crate::rule_map::RuleMap;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, warn};
use uuid::Uuid;

/// Request-scoped evaluation state
///
/// Created once per request and handed to the resolver guards through the
/// request extensions. Clones share the same cache.
pub struct EvaluationContext<C> {
    request_id: Uuid,
    context: Arc<C>,
    cache: EvaluationCache,
    rules: Arc<RuleMap<C>>,
}

impl<C> Clone for EvaluationContext<C> {
    fn clone(&self) -> Self {
        Self {
            request_id: self.request_id,
            context: self.context.clone(),
            cache: self.cache.clone(),
            rules: self.rules.clone(),
        }
    }
}

impl<C> fmt::Debug for EvaluationContext<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EvaluationContext")
            .field("request_id", &self.request_id)
            .field("cache", &self.cache)
            .finish_non_exhaustive()
    }
}

impl<C> EvaluationContext<C>
where
    C: Send + Sync + 'static,
{
    pub fn new(context: Arc<C>, rules: Arc<RuleMap<C>>) -> Self {
        Self::with_cache(context, rules, EvaluationCache::new())
    }

    pub fn with_cache(context: Arc<C>, rules: Arc<RuleMap<C>>, cache: EvaluationCache) -> Self {
        Self {
            request_id: Uuid::new_v4(),
            context,
            cache,
            rules,
        }
    }

    pub fn request_id(&self) -> Uuid {
        self.request_id
    }

    /// The caller-supplied context
    pub fn context(&self) -> &Arc<C> {
        &self.context
    }

    pub fn cache(&self) -> &EvaluationCache {
        &self.cache
    }

    pub fn rules(&self) -> &Arc<RuleMap<C>> {
        &self.rules
    }

    /// Evaluate `rule` for one field occurrence, at most once per request
    /// and phase
    ///
    /// Rules that were not registered in the rule map have no identity and
    /// are evaluated uncached.
    pub async fn evaluate(&self, rule: &ShieldRule<C>, call: &FieldCall<'_>) -> Decision {
        let Some(id) = self.rules.rule_id(rule) else {
            return rule.evaluate(self, call).await;
        };

        let slot = self.cache.slot(CacheKey {
            rule: id,
            phase: call.phase,
            path: call.path.clone(),
        });
        let mut evaluated = false;
        let decision = slot
            .get_or_init(|| {
                evaluated = true;
                rule.evaluate(self, call)
            })
            .await
            .clone();

        if evaluated {
            debug!(
                request_id = %self.request_id,
                rule = rule.name(),
                %id,
                path = %call.path,
                phase = ?call.phase,
                decision = %decision,
                "Rule evaluated"
            );
            if let Decision::Error { ref cause } = decision {
                warn!(request_id = %self.request_id, path = %call.path, "Rule failed: {}", cause);
            }
        } else {
            debug!(request_id = %self.request_id, rule = rule.name(), %id, path = %call.path, "Cache hit");
        }

        decision
    }
}
