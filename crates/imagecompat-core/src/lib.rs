//! Imagecompat Core - Fundamental types for image compatibility scheduling
//!
//! This crate provides:
//! - Image reference parsing
//! - Compatibility specification documents
//! - The NodeFeatureGroup resource and ownership edges
//! - Error types with miette diagnostics
//! - Serialization helpers

pub mod compatibility;
pub mod error;
pub mod resources;
pub mod types;

// Re-export commonly used types
pub use compatibility::{
    Compatibility, CompatibilitySpec, GroupRule, COMPATIBILITY_ARTIFACT_TYPE,
    COMPATIBILITY_SPEC_MEDIA_TYPE,
};
pub use error::{ImageCompatError, Result};
pub use resources::{
    group_name_prefix, is_valid_name, managed_labels, managed_selector, FeatureGroupNode,
    NodeFeatureGroup, NodeFeatureGroupSpec, NodeFeatureGroupStatus, OwnerEdge, MANAGED_BY_LABEL,
    PLUGIN_NAME, TEMPORARY_LABEL,
};
pub use types::{ImageReference, DEFAULT_REGISTRY, DEFAULT_TAG};

// Re-export k8s-openapi types for convenience
pub use k8s_openapi;
pub use k8s_openapi::api::core::v1::{Node, Pod};
pub use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;

fn serialization_error<E>(what: &str, err: E) -> ImageCompatError
where
    E: std::error::Error + Send + Sync + 'static,
{
    ImageCompatError::serialization_error(format!("{}: {}", what, err), Some(Box::new(err)))
}

pub fn to_json<T: serde::Serialize>(value: &T) -> Result<String> {
    serde_json::to_string(value).map_err(|e| serialization_error("JSON encoding failed", e))
}

pub fn from_json<T: serde::de::DeserializeOwned>(data: &str) -> Result<T> {
    serde_json::from_str(data).map_err(|e| serialization_error("JSON decoding failed", e))
}

pub fn to_yaml<T: serde::Serialize>(value: &T) -> Result<String> {
    serde_yaml::to_string(value).map_err(|e| serialization_error("YAML encoding failed", e))
}

/// Decode YAML, the format of compatibility artifacts and plugin config
pub fn from_yaml<T: serde::de::DeserializeOwned>(data: &str) -> Result<T> {
    serde_yaml::from_str(data).map_err(|e| serialization_error("YAML decoding failed", e))
}
