use crate::error::{Result, SchedulerError};
use crate::reconcile::{DEFAULT_MAX_WAIT, DEFAULT_POLL_INTERVAL};
use imagecompat_core::is_valid_name;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Arguments of the ImageCompatibilityFilter plugin
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ImageCompatibilityArgs {
    /// Fetch compatibility artifacts over plain HTTP
    pub plain_http: bool,
    /// Namespace for feature groups; discovered when unset
    #[serde(skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    /// Pause between status polls, in milliseconds
    pub poll_interval_ms: u64,
    /// Upper bound on waiting for group status, in milliseconds
    pub max_wait_ms: u64,
}

impl Default for ImageCompatibilityArgs {
    fn default() -> Self {
        Self {
            plain_http: false,
            namespace: None,
            poll_interval_ms: DEFAULT_POLL_INTERVAL.as_millis() as u64,
            max_wait_ms: DEFAULT_MAX_WAIT.as_millis() as u64,
        }
    }
}

impl ImageCompatibilityArgs {
    /// Load arguments from a YAML file
    pub fn from_file(path: &Path) -> Result<Self> {
        let data = std::fs::read_to_string(path).map_err(|e| {
            SchedulerError::invalid_config(
                format!("failed to read {}: {}", path.display(), e),
                "Check the --config path",
            )
        })?;
        let args: Self = imagecompat_core::from_yaml(&data)?;
        args.validate()?;
        Ok(args)
    }

    /// Decode arguments handed to a plugin factory; `None` means defaults
    pub fn from_value(value: Option<&serde_json::Value>) -> Result<Self> {
        let args = match value {
            Some(value) => serde_json::from_value(value.clone()).map_err(|e| {
                SchedulerError::invalid_config(
                    format!("failed to decode plugin arguments: {}", e),
                    "Expected plainHttp, namespace, pollIntervalMs and maxWaitMs",
                )
            })?,
            None => Self::default(),
        };
        args.validate()?;
        Ok(args)
    }

    pub fn validate(&self) -> Result<()> {
        if self.poll_interval_ms == 0 {
            return Err(SchedulerError::invalid_config(
                "pollIntervalMs must be greater than zero",
                "Use the default of 500",
            ));
        }
        if let Some(namespace) = &self.namespace {
            if !is_valid_name(namespace) {
                return Err(SchedulerError::invalid_config(
                    format!("invalid namespace {:?}", namespace),
                    "Namespaces are lowercase alphanumerics and '-', at most 63 characters",
                ));
            }
        }
        Ok(())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn max_wait(&self) -> Duration {
        Duration::from_millis(self.max_wait_ms)
    }
}
