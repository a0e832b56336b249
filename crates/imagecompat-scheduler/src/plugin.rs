use crate::cache::FeatureGroupCache;
use crate::config::ImageCompatibilityArgs;
use crate::discovery::{NamespaceDiscovery, DEFAULT_NAMESPACE};
use crate::error::Result;
use crate::framework::{
    CycleContext, CycleState, FilterPlugin, Handle, Plugin, PreFilterPlugin, Registry,
    SchedulingPlugin, Status,
};
use crate::lifecycle::GroupLifecycle;
use crate::reconcile::ReconcileDriver;
use crate::resolver::FeatureGroupResolver;
use crate::state::{CompatibilityState, STATE_KEY};
use async_trait::async_trait;
use imagecompat_client::FetchOptions;
use imagecompat_core::Pod;
pub use imagecompat_core::PLUGIN_NAME;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

/// Filters nodes by the hardware requirements declared by a Pod's images
///
/// PreFilter resolves every image to NodeFeatureGroups (reusing cached ones),
/// waits for the feature matcher and records the nodes matching all groups.
/// Filter then only consults that record.
pub struct ImageCompatibilityPlugin {
    args: ImageCompatibilityArgs,
    resolver: FeatureGroupResolver,
    lifecycle: GroupLifecycle,
    cache: Arc<FeatureGroupCache>,
    driver: ReconcileDriver,
    discovery: NamespaceDiscovery,
    discovered_namespace: RwLock<Option<String>>,
}

impl ImageCompatibilityPlugin {
    pub fn new(args: ImageCompatibilityArgs, handle: &Handle) -> Self {
        let options = FetchOptions {
            plain_http: args.plain_http,
        };
        let driver = ReconcileDriver::new(
            handle.store.clone(),
            handle.trigger.clone(),
            handle.clock.clone(),
        )
        .with_poll_interval(args.poll_interval())
        .with_max_wait(args.max_wait());

        Self {
            resolver: FeatureGroupResolver::new(handle.artifacts.clone(), options),
            lifecycle: GroupLifecycle::new(handle.store.clone()),
            cache: handle.cache.clone(),
            driver,
            discovery: NamespaceDiscovery::new(handle.pods.clone()),
            discovered_namespace: RwLock::new(None),
            args,
        }
    }

    /// Plugin factory for the registry
    pub fn factory(
        args: Option<&serde_json::Value>,
        handle: &Handle,
    ) -> Result<Arc<dyn SchedulingPlugin>> {
        let args = ImageCompatibilityArgs::from_value(args)?;
        Ok(Arc::new(Self::new(args, handle)))
    }

    pub fn args(&self) -> &ImageCompatibilityArgs {
        &self.args
    }

    /// Namespace for this cycle's feature groups
    ///
    /// A configured namespace wins. Otherwise the matcher's namespace is
    /// discovered once and remembered; when discovery fails or finds nothing
    /// the default is used without remembering it, so the next Pod retries.
    pub async fn namespace(&self) -> String {
        if let Some(namespace) = &self.args.namespace {
            return namespace.clone();
        }
        if let Some(namespace) = self.discovered_namespace.read().await.clone() {
            return namespace;
        }

        match self.discovery.discover().await {
            Ok(Some(namespace)) => {
                *self.discovered_namespace.write().await = Some(namespace.clone());
                namespace
            }
            Ok(None) => {
                warn!(
                    "nfd-master namespace not found, using {} for now",
                    DEFAULT_NAMESPACE
                );
                DEFAULT_NAMESPACE.to_string()
            }
            Err(e) => {
                warn!(
                    "Failed to discover nfd-master namespace, using {} for now: {}",
                    DEFAULT_NAMESPACE, e
                );
                DEFAULT_NAMESPACE.to_string()
            }
        }
    }

    /// Forget the cached groups of an image so the next cycle re-resolves it
    pub async fn invalidate_image(&self, image: &str) -> bool {
        self.cache.invalidate(image).await
    }

    /// Group names for one image, reusing cached groups when they still exist
    async fn groups_for_image(
        &self,
        image: &str,
        pod: &Pod,
        namespace: &str,
    ) -> Result<Vec<String>> {
        if let Some(names) = self
            .cache
            .get_valid(image, namespace, self.lifecycle.store())
            .await
        {
            debug!("Reusing {} NodeFeatureGroups for image {}", names.len(), image);
            return Ok(names);
        }

        let descriptors = self.resolver.resolve(image).await?;
        if descriptors.is_empty() {
            debug!("Image {} declares no compatibility requirements", image);
            return Ok(Vec::new());
        }

        let names = self
            .lifecycle
            .create_groups(image, descriptors, pod, namespace)
            .await?;
        self.cache.update(image, names.clone()).await;
        Ok(names)
    }

    async fn resolve_pod(
        &self,
        ctx: &CycleContext,
        state: &mut CycleState,
        pod: &Pod,
    ) -> Result<()> {
        let namespace = self.namespace().await;
        state.write(STATE_KEY, Box::new(CompatibilityState::resolving(&namespace)));

        let mut groups = Vec::new();
        for image in pod_images(pod) {
            groups.extend(self.groups_for_image(&image, pod, &namespace).await?);
        }

        let outcome = self
            .driver
            .ensure_reconciled(ctx, &groups, &namespace)
            .await;

        info!(
            "Pod {}: {} NodeFeatureGroups, compatible nodes {:?}",
            pod_name(pod),
            groups.len(),
            outcome.compatible
        );

        state
            .read_as_mut::<CompatibilityState>(STATE_KEY)?
            .populate(outcome.compatible, groups);
        Ok(())
    }
}

impl Plugin for ImageCompatibilityPlugin {
    fn name(&self) -> &str {
        PLUGIN_NAME
    }
}

#[async_trait]
impl PreFilterPlugin for ImageCompatibilityPlugin {
    async fn pre_filter(&self, ctx: &CycleContext, state: &mut CycleState, pod: &Pod) -> Status {
        match self.resolve_pod(ctx, state, pod).await {
            Ok(()) => Status::success(),
            Err(e) => {
                warn!("PreFilter failed for pod {}: {}", pod_name(pod), e);
                Status::error(format!("prepare compatibility state error: {}", e))
            }
        }
    }
}

impl FilterPlugin for ImageCompatibilityPlugin {
    fn filter(&self, state: &CycleState, pod: &Pod, node_name: &str) -> Status {
        let compat = match state.read_as::<CompatibilityState>(STATE_KEY) {
            Ok(compat) => compat,
            Err(e) => return Status::error(e.to_string()),
        };

        if !compat.is_populated() {
            return Status::error(format!(
                "compatibility state for pod {} is not populated",
                pod_name(pod)
            ));
        }

        if compat.compatible.contains(node_name) {
            Status::success()
        } else {
            Status::unschedulable(format!(
                "node {} is not listed in any compatible NodeFeatureGroup status",
                node_name
            ))
        }
    }
}

/// Register the plugin under its name
pub fn register(registry: &mut Registry) -> Result<()> {
    registry.register(PLUGIN_NAME, Box::new(ImageCompatibilityPlugin::factory))
}

/// Images of init containers and containers, de-duplicated in declaration order
pub fn pod_images(pod: &Pod) -> Vec<String> {
    let Some(spec) = &pod.spec else {
        return Vec::new();
    };

    let mut images: Vec<String> = Vec::new();
    let containers = spec
        .init_containers
        .iter()
        .flatten()
        .chain(spec.containers.iter());

    for container in containers {
        match container.image.as_deref().map(str::trim) {
            Some(image) if !image.is_empty() => {
                if !images.iter().any(|known| known == image) {
                    images.push(image.to_string());
                }
            }
            _ => warn!(
                "Container {} of pod {} has no image, skipping",
                container.name,
                pod_name(pod)
            ),
        }
    }
    images
}

fn pod_name(pod: &Pod) -> String {
    format!(
        "{}/{}",
        pod.metadata.namespace.as_deref().unwrap_or("default"),
        pod.metadata.name.as_deref().unwrap_or("<unnamed>")
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::framework::Code;
    use crate::state::CompatibleNodes;
    use imagecompat_client::{
        ManualClock, MockArtifactClient, MockFeatureGroupStore, MockPodLister, MockTrigger,
    };
    use imagecompat_core::k8s_openapi::api::core::v1::{Container, PodSpec};
    use imagecompat_core::{Compatibility, CompatibilitySpec, GroupRule, ObjectMeta};
    use std::collections::{BTreeMap, BTreeSet};

    const NS: &str = "node-feature-discovery";

    struct Fixture {
        artifacts: Arc<MockArtifactClient>,
        store: Arc<MockFeatureGroupStore>,
        pods: Arc<MockPodLister>,
        trigger: Arc<MockTrigger>,
        clock: Arc<ManualClock>,
        handle: Handle,
    }

    fn fixture() -> Fixture {
        let artifacts = Arc::new(MockArtifactClient::new());
        let store = Arc::new(MockFeatureGroupStore::new());
        let pods = Arc::new(MockPodLister::new());
        let trigger = Arc::new(MockTrigger::new());
        let clock = Arc::new(ManualClock::new());
        let handle = Handle {
            artifacts: artifacts.clone(),
            store: store.clone(),
            pods: pods.clone(),
            trigger: trigger.clone(),
            clock: clock.clone(),
            cache: Arc::new(FeatureGroupCache::new()),
        };
        Fixture {
            artifacts,
            store,
            pods,
            trigger,
            clock,
            handle,
        }
    }

    fn configured(namespace: &str) -> ImageCompatibilityArgs {
        ImageCompatibilityArgs {
            namespace: Some(namespace.to_string()),
            ..Default::default()
        }
    }

    fn spec_with(rules: &[&[&str]]) -> CompatibilitySpec {
        CompatibilitySpec {
            version: "v1alpha1".to_string(),
            compatibilities: rules
                .iter()
                .map(|entry| Compatibility {
                    rules: entry
                        .iter()
                        .map(|name| GroupRule {
                            name: name.to_string(),
                            terms: BTreeMap::new(),
                        })
                        .collect(),
                    ..Default::default()
                })
                .collect(),
        }
    }

    fn container(name: &str, image: Option<&str>) -> Container {
        Container {
            name: name.to_string(),
            image: image.map(str::to_string),
            ..Default::default()
        }
    }

    fn pod(name: &str, init: Vec<Container>, containers: Vec<Container>) -> Pod {
        Pod {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                namespace: Some("default".to_string()),
                uid: Some(format!("uid-{}", name)),
                ..Default::default()
            },
            spec: Some(PodSpec {
                init_containers: if init.is_empty() { None } else { Some(init) },
                containers,
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    fn single_image_pod(name: &str, image: &str) -> Pod {
        pod(name, vec![], vec![container("app", Some(image))])
    }

    fn nodes(names: &[&str]) -> BTreeSet<String> {
        names.iter().map(|n| n.to_string()).collect()
    }

    fn compat_state(state: &CycleState) -> &CompatibilityState {
        state.read_as::<CompatibilityState>(STATE_KEY).unwrap()
    }

    #[test]
    fn test_pod_images_dedup_in_order() {
        let pod = pod(
            "web",
            vec![container("init", Some("busybox:1.36"))],
            vec![
                container("app", Some("app:v1")),
                container("sidecar", Some("busybox:1.36")),
                container("broken", None),
                container("proxy", Some("envoy:v1")),
            ],
        );

        assert_eq!(pod_images(&pod), vec!["busybox:1.36", "app:v1", "envoy:v1"]);
    }

    #[tokio::test]
    async fn test_pre_filter_and_filter() {
        let f = fixture();
        f.artifacts.insert_spec("app:v1", spec_with(&[&["avx"]])).await;
        f.store.set_rule_nodes("avx", &["n1"]).await;
        let plugin = ImageCompatibilityPlugin::new(configured(NS), &f.handle);
        let pod = single_image_pod("web", "app:v1");

        let mut state = CycleState::new();
        let status = plugin.pre_filter(&CycleContext::new(), &mut state, &pod).await;
        assert!(status.is_success());

        let compat = compat_state(&state);
        assert_eq!(compat.compatible, CompatibleNodes::Only(nodes(&["n1"])));
        assert_eq!(compat.groups.len(), 1);
        assert_eq!(compat.namespace, NS);

        let gets_before = f.store.get_count();
        assert!(plugin.filter(&state, &pod, "n1").is_success());

        let rejected = plugin.filter(&state, &pod, "n2");
        assert_eq!(rejected.code(), Code::Unschedulable);
        assert!(rejected.message().contains("n2"));
        assert_eq!(f.store.get_count(), gets_before);
        assert_eq!(f.artifacts.fetch_count(), 1);
    }

    #[tokio::test]
    async fn test_second_cycle_reuses_cached_groups() {
        let f = fixture();
        f.artifacts
            .insert_spec("app:v1", spec_with(&[&["avx"], &["gpu"]]))
            .await;
        f.store.set_rule_nodes("avx", &["n1", "n2"]).await;
        f.store.set_rule_nodes("gpu", &["n2"]).await;
        let plugin = ImageCompatibilityPlugin::new(configured(NS), &f.handle);
        let pod = single_image_pod("web", "app:v1");

        let mut first = CycleState::new();
        plugin.pre_filter(&CycleContext::new(), &mut first, &pod).await;
        let mut second = CycleState::new();
        plugin.pre_filter(&CycleContext::new(), &mut second, &pod).await;

        assert_eq!(f.store.create_count(), 2);
        assert_eq!(f.artifacts.fetch_count(), 1);
        assert_eq!(compat_state(&first).groups, compat_state(&second).groups);
        assert_eq!(
            compat_state(&second).compatible,
            CompatibleNodes::Only(nodes(&["n2"]))
        );
    }

    #[tokio::test]
    async fn test_deleted_groups_are_recreated() {
        let f = fixture();
        f.artifacts.insert_spec("app:v1", spec_with(&[&["avx"]])).await;
        f.store.set_rule_nodes("avx", &["n1"]).await;
        let plugin = ImageCompatibilityPlugin::new(configured(NS), &f.handle);
        let pod = single_image_pod("web", "app:v1");

        let mut state = CycleState::new();
        plugin.pre_filter(&CycleContext::new(), &mut state, &pod).await;
        for name in compat_state(&state).groups.clone() {
            f.store.remove(NS, &name).await;
        }

        let mut state = CycleState::new();
        plugin.pre_filter(&CycleContext::new(), &mut state, &pod).await;

        assert_eq!(f.store.create_count(), 2);
        assert_eq!(f.artifacts.fetch_count(), 2);
        assert!(plugin.filter(&state, &pod, "n1").is_success());
    }

    #[tokio::test]
    async fn test_unconstrained_image_does_not_restrict() {
        let f = fixture();
        f.artifacts.insert_spec("app:v1", spec_with(&[&["avx"]])).await;
        f.artifacts.insert_spec("sidecar:v1", spec_with(&[])).await;
        f.store.set_rule_nodes("avx", &["n1", "n2"]).await;
        let plugin = ImageCompatibilityPlugin::new(configured(NS), &f.handle);
        let pod = pod(
            "web",
            vec![],
            vec![
                container("app", Some("app:v1")),
                container("sidecar", Some("sidecar:v1")),
            ],
        );

        let mut state = CycleState::new();
        assert!(plugin
            .pre_filter(&CycleContext::new(), &mut state, &pod)
            .await
            .is_success());
        assert_eq!(
            compat_state(&state).compatible,
            CompatibleNodes::Only(nodes(&["n1", "n2"]))
        );
    }

    #[tokio::test]
    async fn test_all_unconstrained_accepts_every_node() {
        let f = fixture();
        f.artifacts.insert_spec("app:v1", spec_with(&[])).await;
        let plugin = ImageCompatibilityPlugin::new(configured(NS), &f.handle);
        let pod = single_image_pod("web", "app:v1");

        let mut state = CycleState::new();
        plugin.pre_filter(&CycleContext::new(), &mut state, &pod).await;

        assert_eq!(compat_state(&state).compatible, CompatibleNodes::All);
        assert!(plugin.filter(&state, &pod, "any-node").is_success());
        assert_eq!(f.trigger.call_count(), 0);
    }

    #[tokio::test]
    async fn test_multiple_images_intersect() {
        let f = fixture();
        f.artifacts.insert_spec("app:v1", spec_with(&[&["avx"]])).await;
        f.artifacts.insert_spec("gpu:v1", spec_with(&[&["gpu"]])).await;
        f.store.set_rule_nodes("avx", &["n1", "n2", "n3"]).await;
        f.store.set_rule_nodes("gpu", &["n2", "n3", "n4"]).await;
        let plugin = ImageCompatibilityPlugin::new(configured(NS), &f.handle);
        let pod = pod(
            "web",
            vec![container("warmup", Some("gpu:v1"))],
            vec![container("app", Some("app:v1"))],
        );

        let mut state = CycleState::new();
        plugin.pre_filter(&CycleContext::new(), &mut state, &pod).await;

        assert_eq!(
            compat_state(&state).compatible,
            CompatibleNodes::Only(nodes(&["n2", "n3"]))
        );
    }

    #[tokio::test]
    async fn test_invalidate_image_forces_new_groups() {
        let f = fixture();
        f.artifacts.insert_spec("app:v1", spec_with(&[&["avx"]])).await;
        f.store.set_rule_nodes("avx", &["n1"]).await;
        let plugin = ImageCompatibilityPlugin::new(configured(NS), &f.handle);
        let pod = single_image_pod("web", "app:v1");

        let mut first = CycleState::new();
        plugin.pre_filter(&CycleContext::new(), &mut first, &pod).await;
        assert!(plugin.invalidate_image("app:v1").await);
        assert!(!plugin.invalidate_image("app:v1").await);

        let mut second = CycleState::new();
        plugin.pre_filter(&CycleContext::new(), &mut second, &pod).await;

        assert_eq!(f.store.create_count(), 2);
        assert_eq!(f.artifacts.fetch_count(), 2);
        assert_ne!(compat_state(&first).groups, compat_state(&second).groups);
    }

    #[tokio::test]
    async fn test_no_compatible_node_is_not_a_pre_filter_error() {
        let f = fixture();
        f.artifacts.insert_spec("app:v1", spec_with(&[&["avx"]])).await;
        f.store.disable_matcher();
        let plugin = ImageCompatibilityPlugin::new(configured(NS), &f.handle);
        let pod = single_image_pod("web", "app:v1");

        let mut state = CycleState::new();
        let status = plugin.pre_filter(&CycleContext::new(), &mut state, &pod).await;

        assert!(status.is_success());
        assert!(compat_state(&state).compatible.is_empty());
        assert_eq!(f.clock.elapsed(), std::time::Duration::from_secs(5));
        assert_eq!(plugin.filter(&state, &pod, "n1").code(), Code::Unschedulable);
    }

    #[tokio::test]
    async fn test_fetch_failure_is_an_error_status() {
        let f = fixture();
        f.artifacts.insert_error("app:v1", "registry unreachable").await;
        let plugin = ImageCompatibilityPlugin::new(configured(NS), &f.handle);
        let pod = single_image_pod("web", "app:v1");

        let mut state = CycleState::new();
        let status = plugin.pre_filter(&CycleContext::new(), &mut state, &pod).await;

        assert_eq!(status.code(), Code::Error);
        assert!(status.message().contains("registry unreachable"));
        assert_eq!(plugin.filter(&state, &pod, "n1").code(), Code::Error);
    }

    #[tokio::test]
    async fn test_creation_failure_rolls_back_and_is_not_cached() {
        let f = fixture();
        f.artifacts
            .insert_spec("app:v1", spec_with(&[&["a"], &["b"]]))
            .await;
        f.store.fail_creates_after(1);
        let plugin = ImageCompatibilityPlugin::new(configured(NS), &f.handle);
        let pod = single_image_pod("web", "app:v1");

        let mut state = CycleState::new();
        let status = plugin.pre_filter(&CycleContext::new(), &mut state, &pod).await;

        assert_eq!(status.code(), Code::Error);
        assert!(f.store.names(NS).await.is_empty());
        assert_eq!(f.handle.cache.peek("app:v1").await, None);
    }

    #[test]
    fn test_filter_without_state_is_error() {
        let f = fixture();
        let plugin = ImageCompatibilityPlugin::new(configured(NS), &f.handle);
        let pod = single_image_pod("web", "app:v1");

        let status = plugin.filter(&CycleState::new(), &pod, "n1");
        assert_eq!(status.code(), Code::Error);
    }

    #[test]
    fn test_filter_on_resolving_state_is_error() {
        let f = fixture();
        let plugin = ImageCompatibilityPlugin::new(configured(NS), &f.handle);
        let pod = single_image_pod("web", "app:v1");

        let mut state = CycleState::new();
        state.write(STATE_KEY, Box::new(CompatibilityState::resolving(NS)));
        assert_eq!(plugin.filter(&state, &pod, "n1").code(), Code::Error);
    }

    #[tokio::test]
    async fn test_discovered_namespace_is_remembered() {
        let f = fixture();
        f.pods
            .add_pod(
                "kube-system",
                &[
                    ("app.kubernetes.io/name", "node-feature-discovery"),
                    ("role", "master"),
                ],
            )
            .await;
        let plugin = ImageCompatibilityPlugin::new(ImageCompatibilityArgs::default(), &f.handle);

        assert_eq!(plugin.namespace().await, "kube-system");
        assert_eq!(plugin.namespace().await, "kube-system");
        assert_eq!(f.pods.queries().await.len(), 2);
    }

    #[tokio::test]
    async fn test_missing_matcher_falls_back_without_caching() {
        let f = fixture();
        let plugin = ImageCompatibilityPlugin::new(ImageCompatibilityArgs::default(), &f.handle);

        assert_eq!(plugin.namespace().await, DEFAULT_NAMESPACE);
        assert_eq!(f.pods.queries().await.len(), 4);

        f.pods
            .add_pod(
                "nfd-system",
                &[
                    ("app.kubernetes.io/name", "node-feature-discovery"),
                    ("role", "master"),
                ],
            )
            .await;
        assert_eq!(plugin.namespace().await, "nfd-system");
    }

    #[tokio::test]
    async fn test_configured_namespace_skips_discovery() {
        let f = fixture();
        let plugin = ImageCompatibilityPlugin::new(configured("custom"), &f.handle);

        assert_eq!(plugin.namespace().await, "custom");
        assert!(f.pods.queries().await.is_empty());
    }

    #[tokio::test]
    async fn test_registry_builds_plugin() {
        let f = fixture();
        let mut registry = Registry::new();
        register(&mut registry).unwrap();
        assert!(register(&mut registry).is_err());

        let args = serde_json::json!({"namespace": NS});
        let plugin = registry.build(PLUGIN_NAME, Some(&args), &f.handle).unwrap();
        assert_eq!(plugin.name(), PLUGIN_NAME);

        assert!(registry.build("NodeResourcesFit", None, &f.handle).is_err());
    }
}
