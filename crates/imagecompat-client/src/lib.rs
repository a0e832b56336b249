//! Imagecompat Client - External collaborators of the compatibility filter
//!
//! This crate provides:
//! - Traits for the artifact store, the feature group store, pod lookup and
//!   the feature matcher trigger
//! - An OCI registry client that fetches compatibility artifacts
//! - Kubernetes-backed stores built on kube
//! - A clock abstraction with a virtual clock for tests
//! - In-memory test doubles

// Allow unused assignments for diagnostic fields - they're used by the thiserror/miette macros
#![allow(unused_assignments)]

pub mod clock;
pub mod error;
pub mod kube_store;
pub mod mock;
pub mod registry;
pub mod traits;
pub mod trigger;

// Re-export primary types
pub use clock::{Clock, ManualClock, TokioClock};
pub use error::{ClientError, Result};
pub use kube_store::{init_kube_client, KubeFeatureGroupStore, KubePodLister};
pub use mock::{MockArtifactClient, MockFeatureGroupStore, MockPodLister, MockTrigger};
pub use registry::{RegistryArtifactClient, MAX_BLOB_SIZE};
pub use traits::{ArtifactClient, FeatureGroupStore, FetchOptions, MatcherTrigger, PodLister};
pub use trigger::PeriodicResync;
