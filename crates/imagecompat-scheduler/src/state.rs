use crate::framework::StateData;
use imagecompat_core::PLUGIN_NAME;
use std::any::Any;
use std::collections::BTreeSet;

/// Cycle state key of the compatibility filter
pub const STATE_KEY: &str = PLUGIN_NAME;

/// Nodes a Pod may be placed on
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompatibleNodes {
    /// No image constrains placement
    All,
    /// Only the listed nodes qualify; an empty set rejects every node
    Only(BTreeSet<String>),
}

impl CompatibleNodes {
    pub fn contains(&self, node_name: &str) -> bool {
        match self {
            CompatibleNodes::All => true,
            CompatibleNodes::Only(nodes) => nodes.contains(node_name),
        }
    }

    /// True when no node qualifies
    pub fn is_empty(&self) -> bool {
        matches!(self, CompatibleNodes::Only(nodes) if nodes.is_empty())
    }

    /// Restrict to the nodes also present in `nodes`
    pub fn narrow(self, nodes: &BTreeSet<String>) -> Self {
        match self {
            CompatibleNodes::All => CompatibleNodes::Only(nodes.clone()),
            CompatibleNodes::Only(current) => {
                CompatibleNodes::Only(current.intersection(nodes).cloned().collect())
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// PreFilter started but did not finish
    Resolving,
    /// Compatible nodes and groups are recorded
    Populated,
}

/// What PreFilter records for Filter
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompatibilityState {
    pub phase: Phase,
    pub compatible: CompatibleNodes,
    /// Feature groups created or reused for the Pod
    pub groups: Vec<String>,
    /// Namespace holding the groups
    pub namespace: String,
}

impl CompatibilityState {
    pub fn resolving(namespace: impl Into<String>) -> Self {
        Self {
            phase: Phase::Resolving,
            compatible: CompatibleNodes::Only(BTreeSet::new()),
            groups: Vec::new(),
            namespace: namespace.into(),
        }
    }

    pub fn populate(&mut self, compatible: CompatibleNodes, groups: Vec<String>) {
        self.compatible = compatible;
        self.groups = groups;
        self.phase = Phase::Populated;
    }

    pub fn is_populated(&self) -> bool {
        self.phase == Phase::Populated
    }
}

impl StateData for CompatibilityState {
    fn clone_data(&self) -> Box<dyn StateData> {
        Box::new(self.clone())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}
