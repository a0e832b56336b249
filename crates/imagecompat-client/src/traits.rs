use crate::error::Result;
use async_trait::async_trait;
use imagecompat_core::{CompatibilitySpec, ImageReference, NodeFeatureGroup};

/// Options for fetching compatibility artifacts
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FetchOptions {
    /// Talk to the registry over plain HTTP instead of HTTPS
    pub plain_http: bool,
}

/// Trait for artifact store clients
///
/// Resolves an image reference to the compatibility specification attached
/// to it. `RegistryArtifactClient` talks to an OCI registry; `MockArtifactClient`
/// serves canned documents for tests.
#[async_trait]
pub trait ArtifactClient: Send + Sync {
    /// Fetch the compatibility specification attached to an image
    async fn fetch_compatibility_spec(
        &self,
        reference: &ImageReference,
        options: &FetchOptions,
    ) -> Result<CompatibilitySpec>;
}

/// Trait for the cluster store holding NodeFeatureGroup resources
///
/// All operations are namespaced. A missing resource is reported as
/// `ClientError::NotFound` so callers can tell it apart from transport errors.
#[async_trait]
pub trait FeatureGroupStore: Send + Sync {
    /// Create a group; the store assigns the name from `metadata.generateName`
    async fn create(&self, namespace: &str, group: &NodeFeatureGroup) -> Result<NodeFeatureGroup>;

    /// Get a group by name
    async fn get(&self, namespace: &str, name: &str) -> Result<NodeFeatureGroup>;

    /// List groups, optionally filtered by a label selector
    async fn list(
        &self,
        namespace: &str,
        label_selector: Option<&str>,
    ) -> Result<Vec<NodeFeatureGroup>>;

    /// Delete a group by name
    async fn delete(&self, namespace: &str, name: &str) -> Result<()>;
}

/// Trait for locating pods by label
#[async_trait]
pub trait PodLister: Send + Sync {
    /// Namespaces of pods matching the selector; `None` searches all namespaces
    async fn pod_namespaces(
        &self,
        namespace: Option<&str>,
        label_selector: &str,
    ) -> Result<Vec<String>>;
}

/// Trait for asking the feature matcher to recompute group status
#[async_trait]
pub trait MatcherTrigger: Send + Sync {
    /// Request a status refresh for groups in the namespace
    async fn trigger(&self, namespace: &str) -> Result<()>;
}
