use crate::error::Result;
use imagecompat_client::{ArtifactClient, ClientError, FetchOptions};
use imagecompat_core::{ImageReference, NodeFeatureGroup};
use std::sync::Arc;
use tracing::debug;

/// Turns an image into unpersisted feature group descriptors
///
/// One descriptor per compatibility entry, carrying that entry's rules.
#[derive(Clone)]
pub struct FeatureGroupResolver {
    artifacts: Arc<dyn ArtifactClient>,
    options: FetchOptions,
}

impl FeatureGroupResolver {
    pub fn new(artifacts: Arc<dyn ArtifactClient>, options: FetchOptions) -> Self {
        Self { artifacts, options }
    }

    /// Fetch the image's compatibility specification and map it to descriptors
    ///
    /// An image without compatibility entries yields no descriptors. An entry
    /// without rules makes the whole specification malformed.
    pub async fn resolve(&self, image: &str) -> Result<Vec<NodeFeatureGroup>> {
        let reference = ImageReference::parse(image)?;
        let spec = self
            .artifacts
            .fetch_compatibility_spec(&reference, &self.options)
            .await?;

        if let Some(index) = spec.compatibilities.iter().position(|c| c.rules.is_empty()) {
            return Err(ClientError::artifact_fetch(
                image,
                format!(
                    "malformed compatibility specification: entry {} has no rules",
                    index
                ),
            )
            .into());
        }

        debug!(
            "Image {} declares {} compatibility entries",
            image,
            spec.compatibilities.len()
        );

        Ok(spec
            .compatibilities
            .into_iter()
            .map(|compatibility| NodeFeatureGroup::from_rules(compatibility.rules))
            .collect())
    }
}
