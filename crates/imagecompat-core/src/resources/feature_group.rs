use crate::compatibility::GroupRule;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::CustomResource;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Name under which the scheduler plugin registers, also used as manager label value
pub const PLUGIN_NAME: &str = "ImageCompatibilityFilter";

/// Label naming the component that manages a feature group
pub const MANAGED_BY_LABEL: &str = "managed-by";

/// Label marking a feature group as temporary
pub const TEMPORARY_LABEL: &str = "temporary";

/// Rules evaluated by the feature matcher for one compatibility entry
#[derive(CustomResource, Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[kube(
    group = "nfd.k8s-sigs.io",
    version = "v1alpha1",
    kind = "NodeFeatureGroup",
    namespaced,
    status = "NodeFeatureGroupStatus",
    schema = "disabled"
)]
pub struct NodeFeatureGroupSpec {
    /// Rules that must all match on a node
    pub rules: Vec<GroupRule>,
}

/// Status written by the feature matcher
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct NodeFeatureGroupStatus {
    /// Nodes currently matching every rule of the group
    #[serde(default)]
    pub nodes: Vec<FeatureGroupNode>,
}

/// A node listed in a feature group status
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct FeatureGroupNode {
    /// Node name
    pub name: String,
}

impl NodeFeatureGroup {
    /// Create an unpersisted group descriptor carrying the given rules
    pub fn from_rules(rules: Vec<GroupRule>) -> Self {
        Self {
            metadata: ObjectMeta::default(),
            spec: NodeFeatureGroupSpec { rules },
            status: None,
        }
    }

    /// Nodes reported by the matcher, or None while the status is not populated
    pub fn matched_nodes(&self) -> Option<BTreeSet<String>> {
        self.status
            .as_ref()
            .map(|status| status.nodes.iter().map(|n| n.name.clone()).collect())
    }

    /// Name assigned by the store, if persisted
    pub fn group_name(&self) -> Option<&str> {
        self.metadata.name.as_deref()
    }

    /// True when the group carries every managed label
    pub fn is_managed(&self) -> bool {
        let Some(labels) = &self.metadata.labels else {
            return false;
        };
        managed_labels()
            .iter()
            .all(|(key, value)| labels.get(key) == Some(value))
    }
}

/// Generated-name prefix for groups created on behalf of a pod
pub fn group_name_prefix(pod_name: &str) -> String {
    format!("image-compat-{}-", pod_name)
}

/// Labels attached to every group this subsystem creates
pub fn managed_labels() -> BTreeMap<String, String> {
    BTreeMap::from([
        (MANAGED_BY_LABEL.to_string(), PLUGIN_NAME.to_string()),
        (TEMPORARY_LABEL.to_string(), "true".to_string()),
    ])
}

/// Label selector matching the groups this subsystem creates
pub fn managed_selector() -> String {
    format!("{}={},{}=true", MANAGED_BY_LABEL, PLUGIN_NAME, TEMPORARY_LABEL)
}
