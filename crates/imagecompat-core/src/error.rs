// Allow unused assignments for diagnostic fields - they're used by the macros
#![allow(unused_assignments)]

use miette::Diagnostic;
use thiserror::Error;

/// Core error type for image compatibility operations
#[derive(Error, Debug, Diagnostic)]
pub enum ImageCompatError {
    /// Image reference could not be parsed
    #[error("Invalid image reference '{reference}': {reason}")]
    #[diagnostic(
        code(imagecompat::reference_parse),
        help("Use the form [registry/]repository[:tag][@sha256:digest], e.g. registry.example.com/team/app:v1")
    )]
    ReferenceParse {
        #[allow(unused)]
        reference: String,
        #[allow(unused)]
        reason: String,
    },

    /// Invalid resource
    #[error("Invalid resource: {reason}")]
    #[diagnostic(
        code(imagecompat::invalid_resource),
        help("{suggestion}")
    )]
    InvalidResource {
        #[allow(unused)]
        reason: String,
        #[allow(unused)]
        suggestion: String,
    },

    /// Serialization error
    #[error("Serialization error: {message}")]
    #[diagnostic(
        code(imagecompat::serialization_error),
        help("Ensure the document is valid JSON or YAML")
    )]
    SerializationError {
        #[allow(unused)]
        message: String,
        #[source]
        #[allow(unused)]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Internal error
    #[error("Internal error: {message}")]
    #[diagnostic(
        code(imagecompat::internal_error),
        help("This is likely a bug. Please report it with the full error details")
    )]
    InternalError {
        #[allow(unused)]
        message: String,
    },
}

/// Result type alias for core operations
pub type Result<T> = std::result::Result<T, ImageCompatError>;

impl ImageCompatError {
    /// Create a ReferenceParse error
    pub fn reference_parse(reference: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::ReferenceParse {
            reference: reference.into(),
            reason: reason.into(),
        }
    }

    /// Create an InvalidResource error
    pub fn invalid_resource(reason: impl Into<String>, suggestion: impl Into<String>) -> Self {
        Self::InvalidResource {
            reason: reason.into(),
            suggestion: suggestion.into(),
        }
    }

    /// Create a SerializationError
    pub fn serialization_error(
        message: impl Into<String>,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    ) -> Self {
        Self::SerializationError {
            message: message.into(),
            source,
        }
    }

    /// Create an InternalError
    pub fn internal_error(message: impl Into<String>) -> Self {
        Self::InternalError {
            message: message.into(),
        }
    }
}
