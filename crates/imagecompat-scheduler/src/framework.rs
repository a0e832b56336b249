//! Minimal scheduling framework surface
//!
//! Mirrors the parts of the kube-scheduler plugin framework the
//! compatibility filter participates in: a per-cycle state store, the
//! PreFilter and Filter extension points, statuses and a plugin registry.

use crate::cache::FeatureGroupCache;
use crate::error::{Result, SchedulerError};
use async_trait::async_trait;
use imagecompat_client::{ArtifactClient, Clock, FeatureGroupStore, MatcherTrigger, PodLister};
use imagecompat_core::Pod;
use std::any::Any;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

/// Outcome class of a plugin invocation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Code {
    Success,
    /// Internal failure; the cycle is aborted
    Error,
    /// The node does not fit; preemption might help
    Unschedulable,
    /// The node does not fit and preemption cannot change that
    UnschedulableAndUnresolvable,
}

impl fmt::Display for Code {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Code::Success => "Success",
            Code::Error => "Error",
            Code::Unschedulable => "Unschedulable",
            Code::UnschedulableAndUnresolvable => "UnschedulableAndUnresolvable",
        };
        write!(f, "{}", s)
    }
}

/// Result of a plugin invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Status {
    code: Code,
    reasons: Vec<String>,
}

impl Status {
    pub fn new(code: Code, reason: impl Into<String>) -> Self {
        Self {
            code,
            reasons: vec![reason.into()],
        }
    }

    pub fn success() -> Self {
        Self {
            code: Code::Success,
            reasons: Vec::new(),
        }
    }

    pub fn error(reason: impl Into<String>) -> Self {
        Self::new(Code::Error, reason)
    }

    pub fn unschedulable(reason: impl Into<String>) -> Self {
        Self::new(Code::Unschedulable, reason)
    }

    pub fn code(&self) -> Code {
        self.code
    }

    pub fn reasons(&self) -> &[String] {
        &self.reasons
    }

    /// All reasons joined into one message
    pub fn message(&self) -> String {
        self.reasons.join(", ")
    }

    pub fn is_success(&self) -> bool {
        self.code == Code::Success
    }
}

impl From<SchedulerError> for Status {
    fn from(err: SchedulerError) -> Self {
        Status::error(err.to_string())
    }
}

/// Cancellation and deadline of one scheduling cycle
#[derive(Debug, Clone, Default)]
pub struct CycleContext {
    pub cancel: CancellationToken,
    pub deadline: Option<Instant>,
}

impl CycleContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Context that must finish within `timeout` from now
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            cancel: CancellationToken::new(),
            deadline: Some(Instant::now() + timeout),
        }
    }

    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

/// Data a plugin stores in the cycle state
///
/// `clone_data` must return an independent deep copy; the framework relies on
/// it when the state is duplicated.
pub trait StateData: Send + Sync + 'static {
    fn clone_data(&self) -> Box<dyn StateData>;

    fn as_any(&self) -> &dyn Any;

    fn as_any_mut(&mut self) -> &mut dyn Any;
}

/// Per-cycle key/value store shared by the extension points of one cycle
#[derive(Default)]
pub struct CycleState {
    entries: HashMap<String, Box<dyn StateData>>,
}

impl CycleState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store data under a key, replacing any previous entry
    pub fn write(&mut self, key: impl Into<String>, data: Box<dyn StateData>) {
        self.entries.insert(key.into(), data);
    }

    pub fn read(&self, key: &str) -> Result<&dyn StateData> {
        self.entries
            .get(key)
            .map(|data| &**data)
            .ok_or_else(|| SchedulerError::state_read(key, "not found"))
    }

    /// Read an entry and downcast it to its concrete type
    pub fn read_as<T: StateData>(&self, key: &str) -> Result<&T> {
        self.read(key)?
            .as_any()
            .downcast_ref::<T>()
            .ok_or_else(|| SchedulerError::state_read(key, "unexpected state type"))
    }

    pub fn read_as_mut<T: StateData>(&mut self, key: &str) -> Result<&mut T> {
        self.entries
            .get_mut(key)
            .ok_or_else(|| SchedulerError::state_read(key, "not found"))?
            .as_any_mut()
            .downcast_mut::<T>()
            .ok_or_else(|| SchedulerError::state_read(key, "unexpected state type"))
    }

    pub fn delete(&mut self, key: &str) {
        self.entries.remove(key);
    }
}

impl Clone for CycleState {
    fn clone(&self) -> Self {
        Self {
            entries: self
                .entries
                .iter()
                .map(|(key, data)| (key.clone(), data.clone_data()))
                .collect(),
        }
    }
}

impl fmt::Debug for CycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut keys: Vec<&String> = self.entries.keys().collect();
        keys.sort();
        f.debug_struct("CycleState").field("keys", &keys).finish()
    }
}

/// Base trait of every plugin
pub trait Plugin: Send + Sync {
    fn name(&self) -> &str;
}

/// Plugin invoked once per scheduling cycle before filtering
#[async_trait]
pub trait PreFilterPlugin: Plugin {
    async fn pre_filter(&self, ctx: &CycleContext, state: &mut CycleState, pod: &Pod) -> Status;
}

/// Plugin invoked once per candidate node
///
/// Filtering is synchronous: it may only consult the cycle state.
pub trait FilterPlugin: Plugin {
    fn filter(&self, state: &CycleState, pod: &Pod, node_name: &str) -> Status;
}

/// A plugin taking part in both PreFilter and Filter
pub trait SchedulingPlugin: PreFilterPlugin + FilterPlugin {}

impl<T: PreFilterPlugin + FilterPlugin> SchedulingPlugin for T {}

/// Collaborators handed to plugin factories
#[derive(Clone)]
pub struct Handle {
    pub artifacts: Arc<dyn ArtifactClient>,
    pub store: Arc<dyn FeatureGroupStore>,
    pub pods: Arc<dyn PodLister>,
    pub trigger: Arc<dyn MatcherTrigger>,
    pub clock: Arc<dyn Clock>,
    /// Image to feature group cache shared by every plugin instance
    pub cache: Arc<FeatureGroupCache>,
}

/// Builds a plugin from its raw arguments
pub type PluginFactory = Box<
    dyn Fn(Option<&serde_json::Value>, &Handle) -> Result<Arc<dyn SchedulingPlugin>> + Send + Sync,
>;

/// Plugin name to factory table
#[derive(Default)]
pub struct Registry {
    factories: BTreeMap<String, PluginFactory>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, name: impl Into<String>, factory: PluginFactory) -> Result<()> {
        let name = name.into();
        if self.factories.contains_key(&name) {
            return Err(SchedulerError::invalid_config(
                format!("plugin {} is already registered", name),
                "Register each plugin name once",
            ));
        }
        self.factories.insert(name, factory);
        Ok(())
    }

    /// Registered plugin names in sorted order
    pub fn names(&self) -> Vec<&str> {
        self.factories.keys().map(String::as_str).collect()
    }

    /// Instantiate a registered plugin
    pub fn build(
        &self,
        name: &str,
        args: Option<&serde_json::Value>,
        handle: &Handle,
    ) -> Result<Arc<dyn SchedulingPlugin>> {
        let factory = self.factories.get(name).ok_or_else(|| {
            SchedulerError::invalid_config(
                format!("unknown plugin {}", name),
                format!("Known plugins: {}", self.names().join(", ")),
            )
        })?;
        factory(args, handle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, PartialEq)]
    struct Counter(Vec<u32>);

    impl StateData for Counter {
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

    #[test]
    fn test_status_codes() {
        assert!(Status::success().is_success());
        assert!(Status::success().reasons().is_empty());

        let status = Status::unschedulable("node n2 is not compatible");
        assert_eq!(status.code(), Code::Unschedulable);
        assert_eq!(status.message(), "node n2 is not compatible");

        let status = Status::error("boom");
        assert!(!status.is_success());
        assert_eq!(status.code(), Code::Error);
    }

    #[test]
    fn test_cycle_state_read_write() {
        let mut state = CycleState::new();
        state.write("counter", Box::new(Counter(vec![1])));

        assert_eq!(state.read_as::<Counter>("counter").unwrap().0, vec![1]);
        state.read_as_mut::<Counter>("counter").unwrap().0.push(2);
        assert_eq!(state.read_as::<Counter>("counter").unwrap().0, vec![1, 2]);

        assert!(matches!(
            state.read("missing"),
            Err(SchedulerError::StateRead { .. })
        ));

        state.delete("counter");
        assert!(state.read("counter").is_err());
    }

    #[test]
    fn test_cycle_state_clone_is_deep() {
        let mut original = CycleState::new();
        original.write("counter", Box::new(Counter(vec![1])));

        let mut copy = original.clone();
        copy.read_as_mut::<Counter>("counter").unwrap().0.push(99);

        assert_eq!(original.read_as::<Counter>("counter").unwrap().0, vec![1]);
        assert_eq!(copy.read_as::<Counter>("counter").unwrap().0, vec![1, 99]);
    }

    #[test]
    fn test_cycle_context_deadline() {
        let ctx = CycleContext::with_timeout(Duration::from_secs(5));
        assert!(ctx.deadline.unwrap() > Instant::now());
        assert!(!ctx.is_cancelled());

        ctx.cancel.cancel();
        assert!(ctx.is_cancelled());
    }
}
