use crate::error::{ClientError, Result};
use crate::traits::{ArtifactClient, FeatureGroupStore, FetchOptions, MatcherTrigger, PodLister};
use async_trait::async_trait;
use imagecompat_core::{
    CompatibilitySpec, FeatureGroupNode, ImageReference, NodeFeatureGroup, NodeFeatureGroupStatus,
};
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

/// True when every `key=value` pair of the selector is present in the labels
fn selector_matches(selector: &str, labels: &BTreeMap<String, String>) -> bool {
    selector
        .split(',')
        .map(str::trim)
        .filter(|term| !term.is_empty())
        .all(|term| match term.split_once('=') {
            Some((key, value)) => labels.get(key.trim()).map(String::as_str) == Some(value.trim()),
            None => labels.contains_key(term),
        })
}

/// Artifact client serving canned compatibility specifications
///
/// Specifications are keyed by the image identity as written in the Pod.
/// Unknown images fail the way a registry without a referrer does.
#[derive(Default)]
pub struct MockArtifactClient {
    specs: Arc<RwLock<HashMap<String, std::result::Result<CompatibilitySpec, String>>>>,
    last_options: Arc<RwLock<Option<FetchOptions>>>,
    fetches: AtomicUsize,
}

impl MockArtifactClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert_spec(&self, image: &str, spec: CompatibilitySpec) {
        self.specs.write().await.insert(image.to_string(), Ok(spec));
    }

    /// Make fetches for the image fail with the given message
    pub async fn insert_error(&self, image: &str, message: &str) {
        self.specs
            .write()
            .await
            .insert(image.to_string(), Err(message.to_string()));
    }

    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }

    pub async fn last_options(&self) -> Option<FetchOptions> {
        *self.last_options.read().await
    }
}

#[async_trait]
impl ArtifactClient for MockArtifactClient {
    async fn fetch_compatibility_spec(
        &self,
        reference: &ImageReference,
        options: &FetchOptions,
    ) -> Result<CompatibilitySpec> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        *self.last_options.write().await = Some(*options);

        match self.specs.read().await.get(reference.identity()) {
            Some(Ok(spec)) => Ok(spec.clone()),
            Some(Err(message)) => Err(ClientError::artifact_fetch(reference.identity(), message)),
            None => Err(ClientError::artifact_fetch(
                reference.identity(),
                "compatibility artifact not found",
            )),
        }
    }
}

/// A stored group plus the number of times it has been read
#[derive(Debug, Clone)]
struct MockGroup {
    group: NodeFeatureGroup,
    reads: usize,
}

/// In-memory NodeFeatureGroup store with a simulated feature matcher
///
/// Names are generated as `<generateName><n>`. Group status is computed from
/// the nodes registered per rule name with `set_rule_nodes`: a group matches
/// the nodes common to all of its rules. The status only becomes visible once
/// a group has been read more than `resync_after` times, which models the
/// matcher's resync latency.
pub struct MockFeatureGroupStore {
    groups: Arc<RwLock<BTreeMap<(String, String), MockGroup>>>,
    rule_nodes: Arc<RwLock<HashMap<String, BTreeSet<String>>>>,
    failing_gets: Arc<RwLock<HashSet<String>>>,
    resync_after: AtomicUsize,
    create_budget: AtomicUsize,
    matcher_enabled: AtomicBool,
    next_suffix: AtomicUsize,
    creates: AtomicUsize,
    gets: AtomicUsize,
    lists: AtomicUsize,
    deletes: AtomicUsize,
}

impl MockFeatureGroupStore {
    pub fn new() -> Self {
        Self {
            groups: Arc::new(RwLock::new(BTreeMap::new())),
            rule_nodes: Arc::new(RwLock::new(HashMap::new())),
            failing_gets: Arc::new(RwLock::new(HashSet::new())),
            resync_after: AtomicUsize::new(0),
            create_budget: AtomicUsize::new(usize::MAX),
            matcher_enabled: AtomicBool::new(true),
            next_suffix: AtomicUsize::new(0),
            creates: AtomicUsize::new(0),
            gets: AtomicUsize::new(0),
            lists: AtomicUsize::new(0),
            deletes: AtomicUsize::new(0),
        }
    }

    /// Register the nodes on which a rule (by name) matches
    pub async fn set_rule_nodes(&self, rule: &str, nodes: &[&str]) {
        self.rule_nodes.write().await.insert(
            rule.to_string(),
            nodes.iter().map(|n| n.to_string()).collect(),
        );
    }

    /// Number of reads a group must receive before its status is visible
    pub fn set_resync_after(&self, reads: usize) {
        self.resync_after.store(reads, Ordering::SeqCst);
    }

    /// Stop populating status entirely
    pub fn disable_matcher(&self) {
        self.matcher_enabled.store(false, Ordering::SeqCst);
    }

    /// Allow only `count` more successful creates; later creates fail
    pub fn fail_creates_after(&self, count: usize) {
        self.create_budget.store(count, Ordering::SeqCst);
    }

    /// Make `get` of the named group fail with a transport error
    pub async fn fail_gets_for(&self, name: &str) {
        self.failing_gets.write().await.insert(name.to_string());
    }

    /// Store a group under its explicit name without counting a create
    pub async fn insert(&self, namespace: &str, group: NodeFeatureGroup) {
        let name = group.metadata.name.clone().unwrap_or_default();
        self.groups.write().await.insert(
            (namespace.to_string(), name),
            MockGroup { group, reads: 0 },
        );
    }

    /// Delete a group out of band, as garbage collection would
    pub async fn remove(&self, namespace: &str, name: &str) {
        self.groups
            .write()
            .await
            .remove(&(namespace.to_string(), name.to_string()));
    }

    /// Overwrite a group's status with an explicit node list
    pub async fn set_status(&self, namespace: &str, name: &str, nodes: &[&str]) {
        if let Some(stored) = self
            .groups
            .write()
            .await
            .get_mut(&(namespace.to_string(), name.to_string()))
        {
            stored.group.status = Some(status_from(nodes.iter().map(|n| n.to_string())));
        }
    }

    /// Names of all groups currently stored in the namespace
    pub async fn names(&self, namespace: &str) -> Vec<String> {
        self.groups
            .read()
            .await
            .keys()
            .filter(|(ns, _)| ns == namespace)
            .map(|(_, name)| name.clone())
            .collect()
    }

    pub async fn stored(&self, namespace: &str, name: &str) -> Option<NodeFeatureGroup> {
        self.groups
            .read()
            .await
            .get(&(namespace.to_string(), name.to_string()))
            .map(|stored| stored.group.clone())
    }

    pub fn create_count(&self) -> usize {
        self.creates.load(Ordering::SeqCst)
    }

    pub fn get_count(&self) -> usize {
        self.gets.load(Ordering::SeqCst)
    }

    pub fn list_count(&self) -> usize {
        self.lists.load(Ordering::SeqCst)
    }

    pub fn delete_count(&self) -> usize {
        self.deletes.load(Ordering::SeqCst)
    }

    async fn evaluate(&self, group: &NodeFeatureGroup) -> NodeFeatureGroupStatus {
        let rule_nodes = self.rule_nodes.read().await;
        let mut matched: Option<BTreeSet<String>> = None;
        for rule in &group.spec.rules {
            let nodes = rule_nodes.get(&rule.name).cloned().unwrap_or_default();
            matched = Some(match matched {
                Some(current) => current.intersection(&nodes).cloned().collect(),
                None => nodes,
            });
        }
        status_from(matched.unwrap_or_default())
    }
}

impl Default for MockFeatureGroupStore {
    fn default() -> Self {
        Self::new()
    }
}

fn status_from(nodes: impl IntoIterator<Item = String>) -> NodeFeatureGroupStatus {
    NodeFeatureGroupStatus {
        nodes: nodes
            .into_iter()
            .map(|name| FeatureGroupNode { name })
            .collect(),
    }
}

#[async_trait]
impl FeatureGroupStore for MockFeatureGroupStore {
    async fn create(&self, namespace: &str, group: &NodeFeatureGroup) -> Result<NodeFeatureGroup> {
        self.creates.fetch_add(1, Ordering::SeqCst);

        let budget = self.create_budget.load(Ordering::SeqCst);
        if budget == 0 {
            return Err(ClientError::store_error("create", "injected create failure"));
        }
        if budget != usize::MAX {
            self.create_budget.store(budget - 1, Ordering::SeqCst);
        }

        let mut created = group.clone();
        let name = match (&group.metadata.name, &group.metadata.generate_name) {
            (Some(name), _) => name.clone(),
            (None, Some(prefix)) => {
                let n = self.next_suffix.fetch_add(1, Ordering::SeqCst);
                format!("{}{}", prefix, n)
            }
            (None, None) => {
                return Err(ClientError::store_error(
                    "create",
                    "name or generateName is required",
                ))
            }
        };

        let mut groups = self.groups.write().await;
        let key = (namespace.to_string(), name.clone());
        if groups.contains_key(&key) {
            return Err(ClientError::store_error(
                "create",
                format!("NodeFeatureGroup {}/{} already exists", namespace, name),
            ));
        }

        created.metadata.name = Some(name.clone());
        created.metadata.namespace = Some(namespace.to_string());
        created.metadata.uid = Some(format!("uid-{}", name));
        created.status = None;
        groups.insert(
            key,
            MockGroup {
                group: created.clone(),
                reads: 0,
            },
        );
        debug!("Mock: NodeFeatureGroup created: {}/{}", namespace, name);
        Ok(created)
    }

    async fn get(&self, namespace: &str, name: &str) -> Result<NodeFeatureGroup> {
        self.gets.fetch_add(1, Ordering::SeqCst);

        if self.failing_gets.read().await.contains(name) {
            return Err(ClientError::store_error("get", "injected get failure"));
        }

        let mut groups = self.groups.write().await;
        let stored = groups
            .get_mut(&(namespace.to_string(), name.to_string()))
            .ok_or_else(|| ClientError::not_found("NodeFeatureGroup", namespace, name))?;
        stored.reads += 1;

        if stored.group.status.is_none()
            && self.matcher_enabled.load(Ordering::SeqCst)
            && stored.reads > self.resync_after.load(Ordering::SeqCst)
        {
            let status = self.evaluate(&stored.group).await;
            stored.group.status = Some(status);
        }

        Ok(stored.group.clone())
    }

    async fn list(
        &self,
        namespace: &str,
        label_selector: Option<&str>,
    ) -> Result<Vec<NodeFeatureGroup>> {
        self.lists.fetch_add(1, Ordering::SeqCst);

        let groups = self.groups.read().await;
        Ok(groups
            .iter()
            .filter(|((ns, _), _)| ns == namespace)
            .map(|(_, stored)| &stored.group)
            .filter(|group| match label_selector {
                Some(selector) => {
                    let labels = group.metadata.labels.clone().unwrap_or_default();
                    selector_matches(selector, &labels)
                }
                None => true,
            })
            .cloned()
            .collect())
    }

    async fn delete(&self, namespace: &str, name: &str) -> Result<()> {
        self.deletes.fetch_add(1, Ordering::SeqCst);

        self.groups
            .write()
            .await
            .remove(&(namespace.to_string(), name.to_string()))
            .map(|_| ())
            .ok_or_else(|| ClientError::not_found("NodeFeatureGroup", namespace, name))
    }
}

/// Pod lister over a fixed set of (namespace, labels) entries
#[derive(Default)]
pub struct MockPodLister {
    pods: Arc<RwLock<Vec<(String, BTreeMap<String, String>)>>>,
    queries: Arc<RwLock<Vec<Option<String>>>>,
    failure: Arc<RwLock<Option<String>>>,
}

impl MockPodLister {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn add_pod(&self, namespace: &str, labels: &[(&str, &str)]) {
        let labels = labels
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        self.pods.write().await.push((namespace.to_string(), labels));
    }

    /// Make every lookup fail
    pub async fn fail_with(&self, message: &str) {
        *self.failure.write().await = Some(message.to_string());
    }

    /// Namespaces queried so far, `None` for cluster-wide lookups
    pub async fn queries(&self) -> Vec<Option<String>> {
        self.queries.read().await.clone()
    }
}

#[async_trait]
impl PodLister for MockPodLister {
    async fn pod_namespaces(
        &self,
        namespace: Option<&str>,
        label_selector: &str,
    ) -> Result<Vec<String>> {
        self.queries
            .write()
            .await
            .push(namespace.map(str::to_string));

        if let Some(message) = self.failure.read().await.as_ref() {
            return Err(ClientError::store_error("list pods", message.clone()));
        }

        Ok(self
            .pods
            .read()
            .await
            .iter()
            .filter(|(ns, labels)| {
                namespace.map_or(true, |wanted| wanted == ns)
                    && selector_matches(label_selector, labels)
            })
            .map(|(ns, _)| ns.clone())
            .collect())
    }
}

/// Matcher trigger that counts calls and can be told to fail
#[derive(Debug, Default)]
pub struct MockTrigger {
    calls: AtomicUsize,
    fail: AtomicBool,
}

impl MockTrigger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_failing(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MatcherTrigger for MockTrigger {
    async fn trigger(&self, namespace: &str) -> Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail.load(Ordering::SeqCst) {
            return Err(ClientError::trigger_failed(format!(
                "injected trigger failure for namespace {}",
                namespace
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use imagecompat_core::{group_name_prefix, managed_labels, managed_selector, GroupRule};

    fn rule(name: &str) -> GroupRule {
        GroupRule {
            name: name.to_string(),
            terms: BTreeMap::new(),
        }
    }

    fn descriptor(pod: &str, rules: &[&str]) -> NodeFeatureGroup {
        let mut group = NodeFeatureGroup::from_rules(rules.iter().map(|r| rule(r)).collect());
        group.metadata.generate_name = Some(group_name_prefix(pod));
        group.metadata.labels = Some(managed_labels());
        group
    }

    #[tokio::test]
    async fn test_create_generates_sequential_names() {
        let store = MockFeatureGroupStore::new();

        let first = store.create("nfd", &descriptor("web", &["avx"])).await.unwrap();
        let second = store.create("nfd", &descriptor("web", &["avx"])).await.unwrap();

        assert_eq!(first.group_name(), Some("image-compat-web-0"));
        assert_eq!(second.group_name(), Some("image-compat-web-1"));
        assert_eq!(store.create_count(), 2);
        assert!(first.status.is_none());
    }

    #[tokio::test]
    async fn test_status_appears_after_resync_reads() {
        let store = MockFeatureGroupStore::new();
        store.set_rule_nodes("avx", &["n1", "n2"]).await;
        store.set_rule_nodes("gpu", &["n2", "n3"]).await;
        store.set_resync_after(2);

        let created = store
            .create("nfd", &descriptor("web", &["avx", "gpu"]))
            .await
            .unwrap();
        let name = created.group_name().unwrap().to_string();

        assert!(store.get("nfd", &name).await.unwrap().status.is_none());
        assert!(store.get("nfd", &name).await.unwrap().status.is_none());

        let ready = store.get("nfd", &name).await.unwrap();
        let nodes = ready.matched_nodes().unwrap();
        assert_eq!(nodes, BTreeSet::from(["n2".to_string()]));
    }

    #[tokio::test]
    async fn test_get_missing_is_not_found() {
        let store = MockFeatureGroupStore::new();
        let err = store.get("nfd", "absent").await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_injected_failures() {
        let store = MockFeatureGroupStore::new();
        store.fail_creates_after(1);

        let created = store.create("nfd", &descriptor("web", &["a"])).await.unwrap();
        assert!(store.create("nfd", &descriptor("web", &["b"])).await.is_err());

        let name = created.group_name().unwrap().to_string();
        store.fail_gets_for(&name).await;
        let err = store.get("nfd", &name).await.unwrap_err();
        assert!(!err.is_not_found());
    }

    #[tokio::test]
    async fn test_list_filters_by_selector_and_namespace() {
        let store = MockFeatureGroupStore::new();
        store.create("nfd", &descriptor("web", &["a"])).await.unwrap();
        store
            .create("other", &descriptor("web", &["a"]))
            .await
            .unwrap();

        let mut unmanaged = NodeFeatureGroup::from_rules(vec![rule("a")]);
        unmanaged.metadata.name = Some("hand-made".to_string());
        store.insert("nfd", unmanaged).await;

        let managed = store.list("nfd", Some(&managed_selector())).await.unwrap();
        assert_eq!(managed.len(), 1);
        assert_eq!(store.list("nfd", None).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_pod_lister_filters() {
        let lister = MockPodLister::new();
        lister
            .add_pod("kube-system", &[("app", "nfd"), ("role", "master")])
            .await;
        lister.add_pod("default", &[("app", "nfd")]).await;

        let all = lister
            .pod_namespaces(None, "app=nfd,role=master")
            .await
            .unwrap();
        assert_eq!(all, vec!["kube-system".to_string()]);

        let scoped = lister
            .pod_namespaces(Some("default"), "app=nfd,role=master")
            .await
            .unwrap();
        assert!(scoped.is_empty());
        assert_eq!(
            lister.queries().await,
            vec![None, Some("default".to_string())]
        );
    }

    #[tokio::test]
    async fn test_mock_artifact_client() {
        let client = MockArtifactClient::new();
        let spec = CompatibilitySpec {
            version: "v1alpha1".to_string(),
            compatibilities: vec![],
        };
        client.insert_spec("app:v1", spec.clone()).await;
        client.insert_error("broken:v1", "registry unreachable").await;

        let options = FetchOptions { plain_http: true };
        let fetched = client
            .fetch_compatibility_spec(&ImageReference::parse("app:v1").unwrap(), &options)
            .await
            .unwrap();
        assert_eq!(fetched, spec);
        assert_eq!(client.last_options().await, Some(options));

        let err = client
            .fetch_compatibility_spec(&ImageReference::parse("broken:v1").unwrap(), &options)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("registry unreachable"));

        let missing = client
            .fetch_compatibility_spec(&ImageReference::parse("other:v1").unwrap(), &options)
            .await
            .unwrap_err();
        assert!(missing.to_string().contains("not found"));
        assert_eq!(client.fetch_count(), 3);
    }

    #[tokio::test]
    async fn test_mock_trigger() {
        let trigger = MockTrigger::new();
        trigger.trigger("nfd").await.unwrap();
        trigger.set_failing(true);
        assert!(trigger.trigger("nfd").await.is_err());
        assert_eq!(trigger.call_count(), 2);
    }
}
