use crate::error::{ClientError, Result};
use crate::traits::{FeatureGroupStore, PodLister};
use async_trait::async_trait;
use imagecompat_core::NodeFeatureGroup;
use k8s_openapi::api::core::v1::Pod;
use kube::api::{DeleteParams, ListParams, PostParams};
use kube::config::{KubeConfigOptions, Kubeconfig};
use kube::{Api, Client, Config};
use std::path::Path;
use tracing::debug;

/// Build a Kubernetes client from a kubeconfig file, or infer one
///
/// Without a path the in-cluster service account is tried first, then
/// `~/.kube/config`.
pub async fn init_kube_client(kubeconfig: Option<&Path>) -> Result<Client> {
    let client = match kubeconfig {
        Some(path) => {
            let kubeconfig = Kubeconfig::read_from(path).map_err(|e| {
                ClientError::connection_failed(format!(
                    "Failed to read kubeconfig file {}: {}",
                    path.display(),
                    e
                ))
            })?;

            let config = Config::from_custom_kubeconfig(kubeconfig, &KubeConfigOptions::default())
                .await
                .map_err(|e| {
                    ClientError::connection_failed(format!(
                        "Failed to create config from kubeconfig {}: {}",
                        path.display(),
                        e
                    ))
                })?;

            Client::try_from(config).map_err(|e| {
                ClientError::connection_failed(format!(
                    "Failed to create Kubernetes client from custom kubeconfig: {}",
                    e
                ))
            })?
        }
        None => Client::try_default().await.map_err(|e| {
            ClientError::connection_failed(format!("Failed to create Kubernetes client: {}", e))
        })?,
    };
    Ok(client)
}

/// Translate a kube error, keeping 404 distinguishable
fn map_kube_error(err: kube::Error, operation: &str, namespace: &str, name: &str) -> ClientError {
    match err {
        kube::Error::Api(resp) if resp.code == 404 => {
            ClientError::not_found("NodeFeatureGroup", namespace, name)
        }
        other => ClientError::store_error(operation, other.to_string()),
    }
}

/// NodeFeatureGroup store backed by the Kubernetes API server
#[derive(Clone)]
pub struct KubeFeatureGroupStore {
    client: Client,
}

impl KubeFeatureGroupStore {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn api(&self, namespace: &str) -> Api<NodeFeatureGroup> {
        Api::namespaced(self.client.clone(), namespace)
    }
}

#[async_trait]
impl FeatureGroupStore for KubeFeatureGroupStore {
    async fn create(&self, namespace: &str, group: &NodeFeatureGroup) -> Result<NodeFeatureGroup> {
        let generate_name = group.metadata.generate_name.as_deref().unwrap_or_default();
        debug!("Creating NodeFeatureGroup {}/{}*", namespace, generate_name);

        self.api(namespace)
            .create(&PostParams::default(), group)
            .await
            .map_err(|e| map_kube_error(e, "create", namespace, generate_name))
    }

    async fn get(&self, namespace: &str, name: &str) -> Result<NodeFeatureGroup> {
        self.api(namespace)
            .get(name)
            .await
            .map_err(|e| map_kube_error(e, "get", namespace, name))
    }

    async fn list(
        &self,
        namespace: &str,
        label_selector: Option<&str>,
    ) -> Result<Vec<NodeFeatureGroup>> {
        let mut params = ListParams::default();
        if let Some(selector) = label_selector {
            params = params.labels(selector);
        }

        let list = self
            .api(namespace)
            .list(&params)
            .await
            .map_err(|e| map_kube_error(e, "list", namespace, ""))?;
        Ok(list.items)
    }

    async fn delete(&self, namespace: &str, name: &str) -> Result<()> {
        self.api(namespace)
            .delete(name, &DeleteParams::background())
            .await
            .map_err(|e| map_kube_error(e, "delete", namespace, name))?;
        Ok(())
    }
}

/// Pod lookups backed by the Kubernetes API server
#[derive(Clone)]
pub struct KubePodLister {
    client: Client,
}

impl KubePodLister {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl PodLister for KubePodLister {
    async fn pod_namespaces(
        &self,
        namespace: Option<&str>,
        label_selector: &str,
    ) -> Result<Vec<String>> {
        let api: Api<Pod> = match namespace {
            Some(ns) => Api::namespaced(self.client.clone(), ns),
            None => Api::all(self.client.clone()),
        };

        let pods = api
            .list(&ListParams::default().labels(label_selector))
            .await
            .map_err(|e| ClientError::store_error("list pods", e.to_string()))?;

        Ok(pods
            .items
            .into_iter()
            .filter_map(|pod| pod.metadata.namespace)
            .collect())
    }
}
