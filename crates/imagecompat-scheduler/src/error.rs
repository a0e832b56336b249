// Allow unused assignments for diagnostic fields - they're used by the macros
#![allow(unused_assignments)]

use miette::Diagnostic;
use thiserror::Error;

/// Scheduler error type
#[derive(Error, Debug, Diagnostic)]
pub enum SchedulerError {
    /// Feature groups for an image could not be created
    #[error("Failed to create NodeFeatureGroups for image {image}: {message}")]
    #[diagnostic(
        code(scheduler::group_creation),
        help("Check that the NodeFeatureGroup CRD is installed and the target namespace exists")
    )]
    GroupCreation { image: String, message: String },

    /// Cycle state entry missing or of the wrong type
    #[error("Failed to read cycle state {key}: {message}")]
    #[diagnostic(
        code(scheduler::state_read),
        help("PreFilter must run before Filter within the same scheduling cycle")
    )]
    StateRead { key: String, message: String },

    /// Plugin arguments are invalid
    #[error("Invalid plugin configuration: {message}")]
    #[diagnostic(
        code(scheduler::invalid_config),
        help("{suggestion}")
    )]
    InvalidConfig { message: String, suggestion: String },

    /// Refused to touch a group this filter did not create
    #[error("NodeFeatureGroup {namespace}/{name} is not managed by the image compatibility filter")]
    #[diagnostic(
        code(scheduler::not_managed),
        help("Only groups labelled managed-by and temporary can be deleted here; use kubectl for others")
    )]
    NotManaged { namespace: String, name: String },

    /// External client error
    #[error(transparent)]
    #[diagnostic(transparent)]
    ClientError(#[from] imagecompat_client::ClientError),

    /// Core error
    #[error(transparent)]
    #[diagnostic(transparent)]
    CoreError(#[from] imagecompat_core::ImageCompatError),

    /// Internal error
    #[error("Internal error: {message}")]
    #[diagnostic(
        code(scheduler::internal_error),
        help("This is likely a bug. Please report it")
    )]
    InternalError { message: String },
}

/// Result type for scheduler operations
pub type Result<T> = std::result::Result<T, SchedulerError>;

impl SchedulerError {
    /// Create a GroupCreation error
    pub fn group_creation(image: impl Into<String>, message: impl Into<String>) -> Self {
        Self::GroupCreation {
            image: image.into(),
            message: message.into(),
        }
    }

    /// Create a StateRead error
    pub fn state_read(key: impl Into<String>, message: impl Into<String>) -> Self {
        Self::StateRead {
            key: key.into(),
            message: message.into(),
        }
    }

    /// Create an InvalidConfig error
    pub fn invalid_config(message: impl Into<String>, suggestion: impl Into<String>) -> Self {
        Self::InvalidConfig {
            message: message.into(),
            suggestion: suggestion.into(),
        }
    }

    /// Create a NotManaged error
    pub fn not_managed(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self::NotManaged {
            namespace: namespace.into(),
            name: name.into(),
        }
    }

    /// Create an InternalError
    pub fn internal_error(message: impl Into<String>) -> Self {
        Self::InternalError {
            message: message.into(),
        }
    }
}
