use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Artifact type of compatibility specifications attached to images
pub const COMPATIBILITY_ARTIFACT_TYPE: &str = "application/vnd.nfd.image-compatibility.v1alpha1";

/// Media type of the layer carrying the YAML document
pub const COMPATIBILITY_SPEC_MEDIA_TYPE: &str =
    "application/vnd.nfd.image-compatibility.spec.v1alpha1+yaml";

/// Compatibility specification attached to a container image
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompatibilitySpec {
    /// Document version (e.g., "v1alpha1")
    #[serde(default)]
    pub version: String,
    /// Ordered compatibility entries
    #[serde(default)]
    pub compatibilities: Vec<Compatibility>,
}

impl CompatibilitySpec {
    /// True when the image declares no node requirements
    pub fn is_unconstrained(&self) -> bool {
        self.compatibilities.is_empty()
    }
}

/// A single compatibility entry: a named set of rules that must all match
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Compatibility {
    /// Rules a node must satisfy
    #[serde(default)]
    pub rules: Vec<GroupRule>,
    /// Priority of this entry (informational)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weight: Option<i32>,
    /// Grouping tag (informational)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tag: Option<String>,
    /// Human readable description
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// A matchable rule
///
/// Only the name is interpreted here. The matcher terms (`matchFeatures`,
/// `matchAny`, ...) are carried through untouched to the feature group.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct GroupRule {
    /// Rule name
    pub name: String,
    /// Matcher terms, evaluated by the external feature matcher
    #[serde(flatten)]
    pub terms: BTreeMap<String, serde_json::Value>,
}
