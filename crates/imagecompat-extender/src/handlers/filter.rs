use crate::types::{ExtenderArgs, ExtenderFilterResult, NodeList};
use crate::AppState;
use axum::extract::State;
use axum::Json;
use imagecompat_scheduler::{Code, CycleContext, CycleState};
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// POST /filter
///
/// One request is one scheduling cycle: a fresh cycle state, PreFilter once,
/// then Filter for every candidate. Failures are reported in the `error`
/// field with a 200 status, as the extender protocol expects.
pub async fn filter(
    State(state): State<Arc<AppState>>,
    Json(args): Json<ExtenderArgs>,
) -> Json<ExtenderFilterResult> {
    Json(run_filter(&state, &args).await)
}

/// Run a scheduling cycle for the request
pub async fn run_filter(state: &AppState, args: &ExtenderArgs) -> ExtenderFilterResult {
    let pod = &args.pod;
    let pod_name = format!(
        "{}/{}",
        pod.metadata.namespace.as_deref().unwrap_or("default"),
        pod.metadata.name.as_deref().unwrap_or("<unnamed>")
    );

    let ctx = CycleContext::with_timeout(state.request_timeout);
    let mut cycle = CycleState::new();

    for plugin in &state.plugins {
        let status = plugin.pre_filter(&ctx, &mut cycle, pod).await;
        if !status.is_success() {
            warn!(
                "PreFilter {} rejected pod {}: {}",
                plugin.name(),
                pod_name,
                status.message()
            );
            return ExtenderFilterResult::error(format!(
                "{}: {}",
                plugin.name(),
                status.message()
            ));
        }
    }

    let mut result = ExtenderFilterResult::default();
    let mut passed = Vec::new();

    'nodes: for node_name in args.candidate_names() {
        for plugin in &state.plugins {
            let status = plugin.filter(&cycle, pod, &node_name);
            match status.code() {
                Code::Success => continue,
                Code::Unschedulable => {
                    result.failed_nodes.insert(node_name, status.message());
                }
                Code::UnschedulableAndUnresolvable => {
                    result
                        .failed_and_unresolvable_nodes
                        .insert(node_name, status.message());
                }
                Code::Error => {
                    warn!(
                        "Filter {} failed for pod {} on node {}: {}",
                        plugin.name(),
                        pod_name,
                        node_name,
                        status.message()
                    );
                    return ExtenderFilterResult::error(format!(
                        "{}: {}",
                        plugin.name(),
                        status.message()
                    ));
                }
            }
            continue 'nodes;
        }
        debug!("Node {} passes for pod {}", node_name, pod_name);
        passed.push(node_name);
    }

    info!(
        "Pod {}: {} nodes pass, {} rejected",
        pod_name,
        passed.len(),
        result.failed_nodes.len() + result.failed_and_unresolvable_nodes.len()
    );

    if let Some(nodes) = &args.nodes {
        let keep: BTreeSet<&str> = passed.iter().map(String::as_str).collect();
        result.nodes = Some(NodeList {
            items: nodes
                .items
                .iter()
                .filter(|node| {
                    node.metadata
                        .name
                        .as_deref()
                        .is_some_and(|name| keep.contains(name))
                })
                .cloned()
                .collect(),
        });
    }
    if args.node_names.is_some() || args.nodes.is_none() {
        result.node_names = Some(passed);
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use imagecompat_client::{
        ManualClock, MockArtifactClient, MockFeatureGroupStore, MockPodLister, MockTrigger,
    };
    use imagecompat_core::k8s_openapi::api::core::v1::{Container, PodSpec};
    use imagecompat_core::{Compatibility, CompatibilitySpec, GroupRule, Node, ObjectMeta, Pod};
    use imagecompat_scheduler::{FeatureGroupCache, Handle, ImageCompatibilityPlugin, PLUGIN_NAME};
    use std::collections::BTreeMap;

    struct Fixture {
        artifacts: Arc<MockArtifactClient>,
        store: Arc<MockFeatureGroupStore>,
        state: AppState,
    }

    fn fixture() -> Fixture {
        let artifacts = Arc::new(MockArtifactClient::new());
        let store = Arc::new(MockFeatureGroupStore::new());
        let cache = Arc::new(FeatureGroupCache::new());
        let handle = Handle {
            artifacts: artifacts.clone(),
            store: store.clone(),
            pods: Arc::new(MockPodLister::new()),
            trigger: Arc::new(MockTrigger::new()),
            clock: Arc::new(ManualClock::new()),
            cache: cache.clone(),
        };
        let registry = imagecompat_scheduler::default_registry().unwrap();
        let args = serde_json::json!({"namespace": "nfd"});
        let plugin = registry.build(PLUGIN_NAME, Some(&args), &handle).unwrap();

        Fixture {
            artifacts,
            store,
            state: AppState::new(vec![plugin], cache),
        }
    }

    fn pod(image: &str) -> Pod {
        Pod {
            metadata: ObjectMeta {
                name: Some("web".to_string()),
                namespace: Some("default".to_string()),
                uid: Some("uid-web".to_string()),
                ..Default::default()
            },
            spec: Some(PodSpec {
                containers: vec![Container {
                    name: "app".to_string(),
                    image: Some(image.to_string()),
                    ..Default::default()
                }],
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    fn spec(rule: &str) -> CompatibilitySpec {
        CompatibilitySpec {
            version: "v1alpha1".to_string(),
            compatibilities: vec![Compatibility {
                rules: vec![GroupRule {
                    name: rule.to_string(),
                    terms: BTreeMap::new(),
                }],
                ..Default::default()
            }],
        }
    }

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|n| n.to_string()).collect()
    }

    #[tokio::test]
    async fn test_filter_by_node_names() {
        let f = fixture();
        f.artifacts.insert_spec("app:v1", spec("avx")).await;
        f.store.set_rule_nodes("avx", &["n1", "n3"]).await;

        let args = ExtenderArgs {
            pod: pod("app:v1"),
            nodes: None,
            node_names: Some(names(&["n1", "n2", "n3"])),
        };
        let result = run_filter(&f.state, &args).await;

        assert!(result.error.is_empty());
        assert_eq!(result.node_names, Some(names(&["n1", "n3"])));
        assert!(result.failed_nodes.get("n2").unwrap().contains("n2"));
        assert!(result.nodes.is_none());
    }

    #[tokio::test]
    async fn test_filter_full_node_objects() {
        let f = fixture();
        f.artifacts.insert_spec("app:v1", spec("avx")).await;
        f.store.set_rule_nodes("avx", &["n2"]).await;

        let node = |name: &str| Node {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                ..Default::default()
            },
            ..Default::default()
        };
        let args = ExtenderArgs {
            pod: pod("app:v1"),
            nodes: Some(NodeList {
                items: vec![node("n1"), node("n2")],
            }),
            node_names: None,
        };
        let result = run_filter(&f.state, &args).await;

        let kept = result.nodes.unwrap();
        assert_eq!(kept.items.len(), 1);
        assert_eq!(kept.items[0].metadata.name.as_deref(), Some("n2"));
        assert!(result.node_names.is_none());
        assert!(result.failed_nodes.contains_key("n1"));
    }

    #[tokio::test]
    async fn test_pre_filter_error_is_reported_in_body() {
        let f = fixture();

        let args = ExtenderArgs {
            pod: pod("missing:v1"),
            nodes: None,
            node_names: Some(names(&["n1"])),
        };
        let result = run_filter(&f.state, &args).await;

        assert!(result.error.starts_with(PLUGIN_NAME));
        assert!(result.error.contains("not found"));
        assert!(result.node_names.is_none());
    }

    #[tokio::test]
    async fn test_handler_wraps_result() {
        let f = fixture();
        f.artifacts
            .insert_spec(
                "app:v1",
                CompatibilitySpec {
                    version: "v1alpha1".to_string(),
                    compatibilities: vec![],
                },
            )
            .await;

        let args = ExtenderArgs {
            pod: pod("app:v1"),
            nodes: None,
            node_names: Some(names(&["n1", "n2"])),
        };
        let Json(result) = filter(State(Arc::new(f.state)), Json(args)).await;

        assert_eq!(result.node_names, Some(names(&["n1", "n2"])));
        assert!(result.failed_nodes.is_empty());
    }
}
