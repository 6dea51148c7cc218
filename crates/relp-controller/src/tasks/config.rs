//! Controller Configuration
//!
//! Settings for the RsyslogRelp controller, read from a mounted ConfigMap file.
//! Every section has defaults so a missing file still yields a usable config.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Main controller configuration structure
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ControllerConfig {
    /// Work queue settings
    #[serde(default)]
    pub controller: ReconcilerConfig,

    /// Cleanup job wait settings
    #[serde(default)]
    pub cleanup: CleanupConfig,

    /// Images used by the per-node cleanup job
    #[serde(default)]
    pub images: ImagesConfig,

    /// Alerting and scrape wiring
    #[serde(default)]
    pub monitoring: MonitoringConfig,

    /// Requeue intervals
    #[serde(default)]
    pub requeue: RequeueConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ReconcilerConfig {
    /// Maximum number of tenants reconciled in parallel
    #[serde(rename = "maxConcurrentReconciles", default = "default_max_concurrent")]
    pub max_concurrent_reconciles: u16,

    /// Restrict the watch to one namespace; all namespaces when unset
    #[serde(rename = "watchNamespace", default)]
    pub watch_namespace: Option<String>,
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self {
            max_concurrent_reconciles: default_max_concurrent(),
            watch_namespace: None,
        }
    }
}

fn default_max_concurrent() -> u16 {
    5
}

/// Cleanup configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CleanupConfig {
    /// How long to wait for the cleanup job to be healthy on every node
    #[serde(rename = "healthyTimeoutSeconds", default = "default_wait_seconds")]
    pub healthy_timeout_seconds: u64,

    /// How long to wait for a withdrawn bundle to disappear
    #[serde(rename = "deletedTimeoutSeconds", default = "default_wait_seconds")]
    pub deleted_timeout_seconds: u64,

    /// Poll interval while waiting
    #[serde(rename = "pollIntervalSeconds", default = "default_poll_seconds")]
    pub poll_interval_seconds: u64,
}

impl Default for CleanupConfig {
    fn default() -> Self {
        Self {
            healthy_timeout_seconds: default_wait_seconds(),
            deleted_timeout_seconds: default_wait_seconds(),
            poll_interval_seconds: default_poll_seconds(),
        }
    }
}

fn default_wait_seconds() -> u64 {
    120
}

fn default_poll_seconds() -> u64 {
    5
}

impl CleanupConfig {
    #[must_use]
    pub fn healthy_timeout(&self) -> Duration {
        Duration::from_secs(self.healthy_timeout_seconds)
    }

    #[must_use]
    pub fn deleted_timeout(&self) -> Duration {
        Duration::from_secs(self.deleted_timeout_seconds)
    }

    #[must_use]
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_seconds)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ImagesConfig {
    /// Image of the init container that runs the cleanup script
    #[serde(default = "default_cleaner_image")]
    pub cleaner: ImageConfig,

    /// Image that keeps the cleanup pod alive once the script completed
    #[serde(default = "default_pause_image")]
    pub pause: ImageConfig,
}

impl Default for ImagesConfig {
    fn default() -> Self {
        Self {
            cleaner: default_cleaner_image(),
            pause: default_pause_image(),
        }
    }
}

/// Image configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq, Eq)]
pub struct ImageConfig {
    /// Image repository (e.g., "registry.k8s.io/pause")
    pub repository: String,

    /// Image tag (e.g., "3.10")
    pub tag: String,
}

impl ImageConfig {
    /// Returns `true` when both repository and tag are populated.
    pub fn is_configured(&self) -> bool {
        !self.repository.trim().is_empty() && !self.tag.trim().is_empty()
    }

    /// Full image reference
    pub fn reference(&self) -> String {
        format!("{}:{}", self.repository, self.tag)
    }
}

fn default_cleaner_image() -> ImageConfig {
    ImageConfig {
        repository: "docker.io/library/alpine".to_string(),
        tag: "3.21".to_string(),
    }
}

fn default_pause_image() -> ImageConfig {
    ImageConfig {
        repository: "registry.k8s.io/pause".to_string(),
        tag: "3.10".to_string(),
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MonitoringConfig {
    /// Install alert rules, scrape config and dashboard per tenant
    #[serde(default = "default_monitoring_enabled")]
    pub enabled: bool,

    /// Address of the tenant API server the scraper proxies through
    #[serde(rename = "apiServerAddress", default = "default_api_server_address")]
    pub api_server_address: String,

    /// Service of the node exporter in the tenant cluster
    #[serde(rename = "nodeExporterService", default = "default_node_exporter_service")]
    pub node_exporter_service: String,

    /// Port name of the node exporter service
    #[serde(rename = "nodeExporterPort", default = "default_node_exporter_port")]
    pub node_exporter_port: String,
}

impl Default for MonitoringConfig {
    fn default() -> Self {
        Self {
            enabled: default_monitoring_enabled(),
            api_server_address: default_api_server_address(),
            node_exporter_service: default_node_exporter_service(),
            node_exporter_port: default_node_exporter_port(),
        }
    }
}

fn default_monitoring_enabled() -> bool {
    true
}

fn default_api_server_address() -> String {
    "kube-apiserver:443".to_string()
}

fn default_node_exporter_service() -> String {
    "node-exporter".to_string()
}

fn default_node_exporter_port() -> String {
    "metrics".to_string()
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RequeueConfig {
    /// Resync interval after a successful reconcile
    #[serde(rename = "successSeconds", default = "default_success_requeue")]
    pub success_seconds: u64,

    /// Retry interval after a retryable failure
    #[serde(rename = "errorSeconds", default = "default_error_requeue")]
    pub error_seconds: u64,
}

impl Default for RequeueConfig {
    fn default() -> Self {
        Self {
            success_seconds: default_success_requeue(),
            error_seconds: default_error_requeue(),
        }
    }
}

impl RequeueConfig {
    #[must_use]
    pub fn success_interval(&self) -> Duration {
        Duration::from_secs(self.success_seconds)
    }

    #[must_use]
    pub fn error_interval(&self) -> Duration {
        Duration::from_secs(self.error_seconds)
    }
}

fn default_success_requeue() -> u64 {
    300
}

fn default_error_requeue() -> u64 {
    30
}

impl ControllerConfig {
    /// Validate that configuration has required fields
    pub fn validate(&self) -> Result<(), anyhow::Error> {
        if self.controller.max_concurrent_reconciles == 0 {
            return Err(anyhow::anyhow!(
                "controller.maxConcurrentReconciles must be at least 1"
            ));
        }

        for (name, image) in [("cleaner", &self.images.cleaner), ("pause", &self.images.pause)] {
            if !image.is_configured() {
                return Err(anyhow::anyhow!(format!(
                    "Image configuration for '{name}' must specify both repository and tag."
                )));
            }
        }

        if self.cleanup.poll_interval_seconds == 0 {
            return Err(anyhow::anyhow!("cleanup.pollIntervalSeconds must be positive"));
        }
        if self.cleanup.poll_interval_seconds > self.cleanup.healthy_timeout_seconds
            || self.cleanup.poll_interval_seconds > self.cleanup.deleted_timeout_seconds
        {
            return Err(anyhow::anyhow!(
                "cleanup.pollIntervalSeconds must not exceed the wait timeouts"
            ));
        }

        if self.monitoring.enabled && self.monitoring.api_server_address.trim().is_empty() {
            return Err(anyhow::anyhow!(
                "monitoring.apiServerAddress is required when monitoring is enabled"
            ));
        }

        Ok(())
    }

    /// Load configuration from mounted ConfigMap file
    pub fn from_mounted_file(config_path: &str) -> Result<Self, anyhow::Error> {
        let config_str = std::fs::read_to_string(config_path)
            .map_err(|e| anyhow::anyhow!("Failed to read config file {config_path}: {e}"))?;

        let config: ControllerConfig = serde_yaml::from_str(&config_str)
            .map_err(|e| anyhow::anyhow!("Failed to parse config YAML: {e}"))?;

        Ok(config)
    }
}
