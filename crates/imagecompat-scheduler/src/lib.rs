//! Imagecompat Scheduler - Image compatibility filtering for Pod scheduling
//!
//! This crate provides:
//! - Resolution of image compatibility specifications into NodeFeatureGroups
//! - A self-validating image to feature group cache
//! - Bounded polling for feature matcher results
//! - Node set intersection across a Pod's images
//! - Per-cycle state and the PreFilter/Filter plugin framework
//! - Discovery of the feature matcher's namespace

pub mod cache;
pub mod config;
pub mod discovery;
pub mod error;
pub mod framework;
pub mod intersect;
pub mod lifecycle;
pub mod plugin;
pub mod reconcile;
pub mod resolver;
pub mod state;

// Re-export commonly used types
pub use cache::FeatureGroupCache;
pub use config::ImageCompatibilityArgs;
pub use discovery::{NamespaceDiscovery, DEFAULT_NAMESPACE, NFD_MASTER_LABEL_SELECTOR};
pub use error::{Result, SchedulerError};
pub use framework::{
    Code, CycleContext, CycleState, FilterPlugin, Handle, Plugin, PluginFactory, PreFilterPlugin,
    Registry, SchedulingPlugin, StateData, Status,
};
pub use intersect::intersect;
pub use lifecycle::GroupLifecycle;
pub use plugin::{pod_images, ImageCompatibilityPlugin, PLUGIN_NAME};
pub use reconcile::{ReconcileDriver, ReconcileOutcome};
pub use resolver::FeatureGroupResolver;
pub use state::{CompatibilityState, CompatibleNodes, Phase, STATE_KEY};

/// Registry with every plugin of this crate registered
pub fn default_registry() -> Result<framework::Registry> {
    let mut registry = framework::Registry::new();
    plugin::register(&mut registry)?;
    Ok(registry)
}
