use crate::framework::CycleContext;
use crate::intersect::intersect;
use crate::state::CompatibleNodes;
use imagecompat_client::{Clock, FeatureGroupStore, MatcherTrigger};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Default pause between status polls
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Default upper bound on the total wait for group status
pub const DEFAULT_MAX_WAIT: Duration = Duration::from_secs(5);

/// Result of waiting for the feature matcher
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconcileOutcome {
    pub compatible: CompatibleNodes,
    /// Number of polling rounds performed
    pub polls: usize,
    /// Stopped at the wait limit, the cycle deadline or on cancellation
    pub timed_out: bool,
}

/// Waits for the feature matcher to populate group status
///
/// The matcher may only resync periodically, so group status is polled until
/// every group has reported and the intersection is non-empty, or the wait is
/// exhausted. Running out of time is not an error: groups still without
/// status are skipped and the best known (possibly empty) intersection is
/// returned.
#[derive(Clone)]
pub struct ReconcileDriver {
    store: Arc<dyn FeatureGroupStore>,
    trigger: Arc<dyn MatcherTrigger>,
    clock: Arc<dyn Clock>,
    poll_interval: Duration,
    max_wait: Duration,
}

impl ReconcileDriver {
    pub fn new(
        store: Arc<dyn FeatureGroupStore>,
        trigger: Arc<dyn MatcherTrigger>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            trigger,
            clock,
            poll_interval: DEFAULT_POLL_INTERVAL,
            max_wait: DEFAULT_MAX_WAIT,
        }
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    pub fn with_max_wait(mut self, max_wait: Duration) -> Self {
        self.max_wait = max_wait;
        self
    }

    /// Poll the groups until they share at least one node or time runs out
    pub async fn ensure_reconciled(
        &self,
        ctx: &CycleContext,
        groups: &[String],
        namespace: &str,
    ) -> ReconcileOutcome {
        if groups.is_empty() {
            return ReconcileOutcome {
                compatible: CompatibleNodes::All,
                polls: 0,
                timed_out: false,
            };
        }

        if let Err(e) = self.trigger.trigger(namespace).await {
            warn!("Feature matcher trigger failed, relying on resync: {}", e);
        }

        let limit = self.limit(ctx);
        let mut polls = 0;

        loop {
            let (compatible, pending) = self.poll(groups, namespace).await;
            polls += 1;

            if pending == 0 && !compatible.is_empty() {
                debug!(
                    "NodeFeatureGroups in {} reconciled after {} polls",
                    namespace, polls
                );
                return ReconcileOutcome {
                    compatible,
                    polls,
                    timed_out: false,
                };
            }

            let now = self.clock.now();
            if ctx.is_cancelled() || now >= limit {
                info!(
                    "Gave up waiting on {} NodeFeatureGroups in {} after {} polls, {} without status",
                    groups.len(),
                    namespace,
                    polls,
                    pending
                );
                return ReconcileOutcome {
                    compatible,
                    polls,
                    timed_out: true,
                };
            }

            let pause = self.poll_interval.min(limit - now);
            tokio::select! {
                _ = ctx.cancel.cancelled() => {
                    debug!("Scheduling cycle cancelled while waiting for NodeFeatureGroup status");
                }
                _ = self.clock.sleep(pause) => {}
            }
        }
    }

    /// Earliest of the wait limit and the cycle deadline
    fn limit(&self, ctx: &CycleContext) -> Instant {
        let wait_limit = self.clock.now() + self.max_wait;
        match ctx.deadline {
            Some(deadline) => wait_limit.min(deadline),
            None => wait_limit,
        }
    }

    /// One round of reads: the intersection of readable statuses and the
    /// number of groups that had none
    async fn poll(&self, groups: &[String], namespace: &str) -> (CompatibleNodes, usize) {
        let mut statuses = Vec::with_capacity(groups.len());
        for name in groups {
            let nodes = match self.store.get(namespace, name).await {
                Ok(group) => {
                    let nodes = group.matched_nodes();
                    if nodes.is_none() {
                        debug!("NodeFeatureGroup {}/{} has no status yet", namespace, name);
                    }
                    nodes
                }
                Err(e) => {
                    warn!(
                        "Skipping NodeFeatureGroup {}/{} this round: {}",
                        namespace, name, e
                    );
                    None
                }
            };
            statuses.push(nodes);
        }
        let pending = statuses.iter().filter(|nodes| nodes.is_none()).count();
        (intersect(statuses), pending)
    }
}
