use miette::Diagnostic;
use thiserror::Error;

/// Error type for calls to external collaborators
#[derive(Error, Debug, Diagnostic)]
pub enum ClientError {
    /// Compatibility artifact could not be fetched or decoded
    #[error("Failed to fetch compatibility artifact for '{reference}': {message}")]
    #[diagnostic(
        code(imagecompat::client::artifact_fetch),
        help("Check that the image has a compatibility artifact attached (oras discover <image>) and that the registry is reachable. Use plainHttp for registries without TLS")
    )]
    ArtifactFetch {
        #[allow(unused)]
        reference: String,
        #[allow(unused)]
        message: String,
    },

    /// Resource not found in the store
    #[error("{kind} {namespace}/{name} not found")]
    #[diagnostic(
        code(imagecompat::client::not_found),
        help("The resource may have been garbage collected after its owner was deleted")
    )]
    NotFound {
        #[allow(unused)]
        kind: String,
        #[allow(unused)]
        namespace: String,
        #[allow(unused)]
        name: String,
    },

    /// Store request failed
    #[error("Store operation '{operation}' failed: {message}")]
    #[diagnostic(
        code(imagecompat::client::store_error),
        help("Verify API server connectivity and that the scheduler's service account may manage nodefeaturegroups.nfd.k8s-sigs.io")
    )]
    StoreError {
        #[allow(unused)]
        operation: String,
        #[allow(unused)]
        message: String,
    },

    /// Kubernetes client could not be built
    #[error("Kubernetes client initialization failed: {message}")]
    #[diagnostic(
        code(imagecompat::client::connection_failed),
        help("Pass --kubeconfig, or run in-cluster with a mounted service account token")
    )]
    ConnectionFailed {
        #[allow(unused)]
        message: String,
    },

    /// Matcher trigger failed
    #[error("Feature matcher trigger failed: {message}")]
    #[diagnostic(
        code(imagecompat::client::trigger_failed),
        help("Group status will still be refreshed by the matcher's periodic resync")
    )]
    TriggerFailed {
        #[allow(unused)]
        message: String,
    },

    /// Core library error
    #[error(transparent)]
    #[diagnostic(transparent)]
    CoreError(#[from] imagecompat_core::ImageCompatError),
}

/// Result type alias for client operations
pub type Result<T> = std::result::Result<T, ClientError>;

impl ClientError {
    pub fn artifact_fetch(reference: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ArtifactFetch {
            reference: reference.into(),
            message: message.into(),
        }
    }

    pub fn not_found(
        kind: impl Into<String>,
        namespace: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        Self::NotFound {
            kind: kind.into(),
            namespace: namespace.into(),
            name: name.into(),
        }
    }

    pub fn store_error(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self::StoreError {
            operation: operation.into(),
            message: message.into(),
        }
    }

    pub fn connection_failed(message: impl Into<String>) -> Self {
        Self::ConnectionFailed {
            message: message.into(),
        }
    }

    pub fn trigger_failed(message: impl Into<String>) -> Self {
        Self::TriggerFailed {
            message: message.into(),
        }
    }

    /// True when the store reported the resource as absent
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}
