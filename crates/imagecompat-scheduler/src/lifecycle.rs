use crate::error::{Result, SchedulerError};
use imagecompat_client::{ClientError, FeatureGroupStore};
use imagecompat_core::{
    group_name_prefix, managed_labels, managed_selector, NodeFeatureGroup, OwnerEdge, Pod,
};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Creates and looks up the NodeFeatureGroups of scheduled Pods
///
/// Every created group is owned by its Pod, so the API server's garbage
/// collector removes it together with the Pod. Creation always creates;
/// reuse is decided by the cache.
#[derive(Clone)]
pub struct GroupLifecycle {
    store: Arc<dyn FeatureGroupStore>,
}

impl GroupLifecycle {
    pub fn new(store: Arc<dyn FeatureGroupStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &dyn FeatureGroupStore {
        self.store.as_ref()
    }

    /// Persist descriptors as groups owned by the Pod
    ///
    /// On failure the groups created by this call are deleted again
    /// (best effort) and the error is returned.
    pub async fn create_groups(
        &self,
        image: &str,
        descriptors: Vec<NodeFeatureGroup>,
        pod: &Pod,
        namespace: &str,
    ) -> Result<Vec<String>> {
        let owner = OwnerEdge::for_pod(pod)?.to_owner_reference();
        let prefix = group_name_prefix(&owner.name);

        let mut created = Vec::with_capacity(descriptors.len());
        for mut group in descriptors {
            group.metadata.name = None;
            group.metadata.generate_name = Some(prefix.clone());
            group.metadata.namespace = Some(namespace.to_string());
            group.metadata.labels = Some(managed_labels());
            group.metadata.owner_references = Some(vec![owner.clone()]);

            let result = self.store.create(namespace, &group).await.and_then(|stored| {
                stored.group_name().map(str::to_string).ok_or_else(|| {
                    ClientError::store_error(
                        "create",
                        "created NodeFeatureGroup has no name",
                    )
                })
            });

            match result {
                Ok(name) => {
                    debug!(
                        "Created NodeFeatureGroup {}/{} for image {}",
                        namespace, name, image
                    );
                    created.push(name);
                }
                Err(e) => {
                    self.rollback(namespace, &created).await;
                    return Err(SchedulerError::group_creation(image, e.to_string()));
                }
            }
        }

        info!(
            "Created {} NodeFeatureGroups in {} for image {} (pod {})",
            created.len(),
            namespace,
            image,
            owner.name
        );
        Ok(created)
    }

    async fn rollback(&self, namespace: &str, created: &[String]) {
        for name in created {
            if let Err(e) = self.store.delete(namespace, name).await {
                warn!(
                    "Failed to roll back NodeFeatureGroup {}/{}: {}",
                    namespace, name, e
                );
            }
        }
    }

    pub async fn get_group(&self, namespace: &str, name: &str) -> Result<NodeFeatureGroup> {
        Ok(self.store.get(namespace, name).await?)
    }

    /// Groups managed by this filter in the namespace
    pub async fn list_groups(&self, namespace: &str) -> Result<Vec<NodeFeatureGroup>> {
        Ok(self
            .store
            .list(namespace, Some(&managed_selector()))
            .await?)
    }

    /// Delete a group, refusing ones that lack the managed labels
    pub async fn delete_group(&self, namespace: &str, name: &str) -> Result<()> {
        let group = self.store.get(namespace, name).await?;
        if !group.is_managed() {
            return Err(SchedulerError::not_managed(namespace, name));
        }
        Ok(self.store.delete(namespace, name).await?)
    }
}
