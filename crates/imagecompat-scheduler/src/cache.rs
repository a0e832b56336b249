use imagecompat_client::FeatureGroupStore;
use std::collections::HashMap;
use tokio::sync::RwLock;
use tracing::{debug, info};

/// Image identity to feature group names
///
/// Entries are validated against the store on every read. A single lock
/// guards the whole map and is never held across store calls. Empty name
/// lists are never stored.
#[derive(Debug, Default)]
pub struct FeatureGroupCache {
    entries: RwLock<HashMap<String, Vec<String>>>,
}

impl FeatureGroupCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Group names for the image whose groups still exist in the namespace
    ///
    /// Names that no longer resolve are dropped from the entry, and the entry
    /// is removed once none resolve. Any failed lookup counts as missing.
    /// The write-back only applies if the entry was not replaced while the
    /// lookups ran.
    pub async fn get_valid(
        &self,
        image: &str,
        namespace: &str,
        store: &dyn FeatureGroupStore,
    ) -> Option<Vec<String>> {
        let recorded = {
            let entries = self.entries.read().await;
            match entries.get(image) {
                Some(names) if !names.is_empty() => names.clone(),
                _ => return None,
            }
        };

        let mut valid = Vec::with_capacity(recorded.len());
        for name in &recorded {
            match store.get(namespace, name).await {
                Ok(_) => valid.push(name.clone()),
                Err(e) => debug!(
                    "Cached NodeFeatureGroup {}/{} for image {} is unusable: {}",
                    namespace, name, image, e
                ),
            }
        }

        if valid.len() == recorded.len() {
            return Some(valid);
        }

        let mut entries = self.entries.write().await;
        let unchanged = entries.get(image) == Some(&recorded);

        if valid.is_empty() {
            if unchanged {
                entries.remove(image);
            }
            info!(
                "All cached NodeFeatureGroups for image {} are gone, dropping cache entry",
                image
            );
            return None;
        }

        if unchanged {
            entries.insert(image.to_string(), valid.clone());
        }
        info!(
            "Cached NodeFeatureGroups for image {} shrank from {} to {}",
            image,
            recorded.len(),
            valid.len()
        );
        Some(valid)
    }

    /// Record the groups created for an image; an empty list is ignored
    pub async fn update(&self, image: &str, names: Vec<String>) {
        if names.is_empty() {
            return;
        }
        debug!("Caching {} NodeFeatureGroups for image {}", names.len(), image);
        self.entries.write().await.insert(image.to_string(), names);
    }

    /// Drop the entry for an image; returns whether one existed
    pub async fn invalidate(&self, image: &str) -> bool {
        let removed = self.entries.write().await.remove(image).is_some();
        if removed {
            info!("Invalidated cached NodeFeatureGroups for image {}", image);
        }
        removed
    }

    /// Recorded names without validation
    pub async fn peek(&self, image: &str) -> Option<Vec<String>> {
        self.entries.read().await.get(image).cloned()
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}
