//! Wire types of the kube-scheduler extender protocol

use imagecompat_core::{Node, Pod};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Node list as sent by the scheduler when it does not cache nodes
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NodeList {
    #[serde(default)]
    pub items: Vec<Node>,
}

/// Body of a filter request
///
/// Exactly one of `nodes` and `node_names` is normally set, depending on
/// whether the extender is configured as node-cache capable.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExtenderArgs {
    pub pod: Pod,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nodes: Option<NodeList>,
    #[serde(
        default,
        rename = "nodenames",
        skip_serializing_if = "Option::is_none"
    )]
    pub node_names: Option<Vec<String>>,
}

impl ExtenderArgs {
    /// Names of the candidate nodes, from whichever list was sent
    pub fn candidate_names(&self) -> Vec<String> {
        if let Some(names) = &self.node_names {
            return names.clone();
        }
        self.nodes
            .iter()
            .flat_map(|list| list.items.iter())
            .filter_map(|node| node.metadata.name.clone())
            .collect()
    }
}

/// Node name to failure reason
pub type FailedNodesMap = BTreeMap<String, String>;

/// Response to a filter request
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtenderFilterResult {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nodes: Option<NodeList>,
    #[serde(
        default,
        rename = "nodenames",
        skip_serializing_if = "Option::is_none"
    )]
    pub node_names: Option<Vec<String>>,
    #[serde(default)]
    pub failed_nodes: FailedNodesMap,
    #[serde(default)]
    pub failed_and_unresolvable_nodes: FailedNodesMap,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub error: String,
}

impl ExtenderFilterResult {
    /// Result rejecting the whole request with an error
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            error: message.into(),
            ..Default::default()
        }
    }
}

/// Body of a cache invalidation request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvalidateRequest {
    pub image: String,
}

/// Response to a cache invalidation request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvalidateResponse {
    pub image: String,
    /// Whether an entry was present
    pub invalidated: bool,
}
