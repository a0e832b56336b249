use crate::error::Result;
use imagecompat_client::PodLister;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Label selector of the feature matcher's control-plane pods
pub const NFD_MASTER_LABEL_SELECTOR: &str =
    "app.kubernetes.io/name=node-feature-discovery,role=master";

/// Namespaces searched before falling back to a cluster-wide lookup
pub const WELL_KNOWN_NAMESPACES: [&str; 3] = ["node-feature-discovery", "kube-system", "default"];

/// Namespace used when the matcher cannot be located
pub const DEFAULT_NAMESPACE: &str = "node-feature-discovery";

/// Locates the namespace the feature matcher runs in
#[derive(Clone)]
pub struct NamespaceDiscovery {
    pods: Arc<dyn PodLister>,
}

impl NamespaceDiscovery {
    pub fn new(pods: Arc<dyn PodLister>) -> Self {
        Self { pods }
    }

    /// Search the well-known namespaces in order, then the whole cluster
    ///
    /// Lookup failures in a single namespace are skipped. `None` means the
    /// matcher was not found anywhere.
    pub async fn discover(&self) -> Result<Option<String>> {
        for namespace in WELL_KNOWN_NAMESPACES {
            match self
                .pods
                .pod_namespaces(Some(namespace), NFD_MASTER_LABEL_SELECTOR)
                .await
            {
                Ok(found) if !found.is_empty() => {
                    info!("Found nfd-master in namespace {}", namespace);
                    return Ok(Some(namespace.to_string()));
                }
                Ok(_) => debug!("No nfd-master pods in namespace {}", namespace),
                Err(e) => debug!("Skipping namespace {} during discovery: {}", namespace, e),
            }
        }

        let found = self
            .pods
            .pod_namespaces(None, NFD_MASTER_LABEL_SELECTOR)
            .await?;

        match found.into_iter().next() {
            Some(namespace) => {
                info!("Found nfd-master in namespace {}", namespace);
                Ok(Some(namespace))
            }
            None => {
                warn!(
                    "nfd-master pod not found with label selector {}",
                    NFD_MASTER_LABEL_SELECTOR
                );
                Ok(None)
            }
        }
    }
}
