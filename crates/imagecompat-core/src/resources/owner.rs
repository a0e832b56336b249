use crate::error::{ImageCompatError, Result};
use k8s_openapi::api::core::v1::Pod;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;

/// Ownership edge from a dependent resource to its owner
///
/// The store garbage-collects dependents once the owner is gone, which is the
/// only cleanup path for feature groups.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OwnerEdge {
    pub api_version: String,
    pub kind: String,
    pub name: String,
    pub uid: String,
    pub controller: bool,
    pub block_owner_deletion: bool,
}

impl OwnerEdge {
    /// Edge making the given pod the controlling owner
    pub fn for_pod(pod: &Pod) -> Result<Self> {
        let name = pod.metadata.name.as_deref().ok_or_else(|| {
            ImageCompatError::invalid_resource(
                "Pod has no name",
                "Feature groups can only be owned by named pods",
            )
        })?;
        let uid = pod.metadata.uid.as_deref().ok_or_else(|| {
            ImageCompatError::invalid_resource(
                format!("Pod {} has no uid", name),
                "Only pods read back from the API server can own feature groups",
            )
        })?;

        Ok(Self {
            api_version: "v1".to_string(),
            kind: "Pod".to_string(),
            name: name.to_string(),
            uid: uid.to_string(),
            controller: true,
            block_owner_deletion: true,
        })
    }

    /// Convert into the store's owner reference representation
    pub fn to_owner_reference(&self) -> OwnerReference {
        OwnerReference {
            api_version: self.api_version.clone(),
            kind: self.kind.clone(),
            name: self.name.clone(),
            uid: self.uid.clone(),
            controller: Some(self.controller),
            block_owner_deletion: Some(self.block_owner_deletion),
        }
    }
}
