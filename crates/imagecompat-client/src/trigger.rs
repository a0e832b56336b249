use crate::error::Result;
use crate::traits::MatcherTrigger;
use async_trait::async_trait;
use tracing::debug;

/// Trigger that relies on the matcher's own resync loop
///
/// node-feature-discovery recomputes NodeFeatureGroup status on every
/// resync period and on group creation, so there is nothing to push.
#[derive(Debug, Clone, Copy, Default)]
pub struct PeriodicResync;

#[async_trait]
impl MatcherTrigger for PeriodicResync {
    async fn trigger(&self, namespace: &str) -> Result<()> {
        debug!(
            "Waiting for feature matcher resync of groups in namespace {}",
            namespace
        );
        Ok(())
    }
}
