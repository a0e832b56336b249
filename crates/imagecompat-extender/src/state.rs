use imagecompat_scheduler::{FeatureGroupCache, SchedulingPlugin};
use std::sync::Arc;
use std::time::Duration;

/// Default deadline of one filter request
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    /// Plugins run for every filter request, in order
    pub plugins: Vec<Arc<dyn SchedulingPlugin>>,

    /// Feature group cache shared with the plugins
    pub cache: Arc<FeatureGroupCache>,

    /// Deadline handed to each scheduling cycle
    pub request_timeout: Duration,
}

impl AppState {
    /// Create a new AppState with the default request timeout
    pub fn new(plugins: Vec<Arc<dyn SchedulingPlugin>>, cache: Arc<FeatureGroupCache>) -> Self {
        Self {
            plugins,
            cache,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }

    pub fn with_request_timeout(mut self, request_timeout: Duration) -> Self {
        self.request_timeout = request_timeout;
        self
    }
}
