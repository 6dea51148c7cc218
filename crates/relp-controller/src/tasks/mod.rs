use crate::crds::RsyslogRelp;
use futures::StreamExt;
use kube::api::ListParams;
use kube::runtime::controller::{Config as ControllerSettings, Controller};
use kube::runtime::watcher::Config;
use kube::{Api, Client, ResourceExt};
use std::path::Path;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn, Instrument};

pub mod actuator;
pub mod channel;
pub mod config;
pub mod controller;
pub mod lifecycle;
pub mod observability;
pub mod store;
pub mod types;

pub use config::ControllerConfig;
pub use controller::{error_policy, reconcile, FINALIZER_NAME};
pub use types::{Context, Error, Result};

use channel::KubeDistributionChannel;
use observability::KubeMonitoringSink;
use store::KubeResourceStore;

const DEFAULT_CONFIG_PATH: &str = "/config/config.yaml";

/// Loads the controller configuration from `CONTROLLER_CONFIG_PATH` or the
/// default mount, falling back to defaults when no file is readable.
pub fn load_config() -> Result<ControllerConfig> {
    let override_path = std::env::var("CONTROLLER_CONFIG_PATH").ok();
    let config_path = override_path
        .as_deref()
        .filter(|path| Path::new(path).exists())
        .unwrap_or(DEFAULT_CONFIG_PATH);

    let config = match ControllerConfig::from_mounted_file(config_path) {
        Ok(cfg) => {
            info!("Loaded controller configuration from {}", config_path);
            cfg
        }
        Err(e) => {
            warn!(
                "Failed to load configuration from {}: {}. Using defaults.",
                config_path, e
            );
            ControllerConfig::default()
        }
    };

    if let Err(validation_error) = config.validate() {
        error!("Configuration validation failed: {}", validation_error);
        return Err(Error::ConfigError(validation_error.to_string()));
    }
    debug!(
        max_concurrent_reconciles = config.controller.max_concurrent_reconciles,
        monitoring = config.monitoring.enabled,
        "Configuration validation passed"
    );
    Ok(config)
}

/// Runs the `RsyslogRelp` controller until `shutdown` is cancelled.
#[instrument(skip_all)]
pub async fn run_controller(
    client: Client,
    config: ControllerConfig,
    shutdown: CancellationToken,
) -> Result<()> {
    let config = Arc::new(config);
    let records: Api<RsyslogRelp> = match &config.controller.watch_namespace {
        Some(namespace) => {
            info!("Watching RsyslogRelp records in namespace {}", namespace);
            Api::namespaced(client.clone(), namespace)
        }
        None => {
            info!("Watching RsyslogRelp records in all namespaces");
            Api::all(client.clone())
        }
    };

    match records.list(&ListParams::default()).await {
        Ok(list) => {
            info!("Controller startup: found {} RsyslogRelp record(s)", list.items.len());
            for record in list.items {
                let phase = record
                    .phase()
                    .map_or_else(|| "(none)".to_string(), |p| p.to_string());
                info!(
                    "Existing RsyslogRelp: namespace={}, name={}, phase={}",
                    record.namespace().unwrap_or_default(),
                    record.name_any(),
                    phase
                );
            }
        }
        Err(e) => error!("Failed to list RsyslogRelp records at startup: {}", e),
    }

    let context = Arc::new(Context {
        client: client.clone(),
        config: config.clone(),
        channel: Arc::new(KubeDistributionChannel::new(
            client.clone(),
            config.cleanup.poll_interval(),
        )),
        store: Arc::new(KubeResourceStore::new(client.clone())),
        monitoring: Arc::new(KubeMonitoringSink::new(client.clone())),
        shutdown: shutdown.clone(),
    });

    // The shutdown trigger must be Sync, so bridge the token through a oneshot.
    let (stop_tx, stop_rx) = tokio::sync::oneshot::channel::<()>();
    tokio::spawn({
        let shutdown = shutdown.clone();
        async move {
            shutdown.cancelled().await;
            let _ = stop_tx.send(());
        }
    });

    info!(
        "Starting RsyslogRelp controller with concurrency {}",
        config.controller.max_concurrent_reconciles
    );

    Controller::new(records, Config::default().any_semantic())
        .with_config(
            ControllerSettings::default().concurrency(config.controller.max_concurrent_reconciles),
        )
        .graceful_shutdown_on(async move {
            let _ = stop_rx.await;
        })
        .run(reconcile, error_policy, context)
        .for_each(|reconciliation_result| {
            let span = tracing::info_span!("rsyslog_relp_reconciliation_result");
            async move {
                match reconciliation_result {
                    Ok((record, _action)) => {
                        debug!(record = %record.name, namespace = ?record.namespace, "RsyslogRelp reconciliation successful");
                    }
                    Err(reconciliation_err) => {
                        warn!(error = %reconciliation_err, "RsyslogRelp reconciliation error");
                    }
                }
            }
            .instrument(span)
        })
        .await;

    info!("RsyslogRelp controller shut down");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::io::Write;

    #[test]
    #[serial]
    fn load_config_prefers_override_path() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "requeue:\n  errorSeconds: 7").unwrap();
        std::env::set_var("CONTROLLER_CONFIG_PATH", file.path());

        let config = load_config().unwrap();
        std::env::remove_var("CONTROLLER_CONFIG_PATH");

        assert_eq!(config.requeue.error_seconds, 7);
        assert_eq!(config.controller.max_concurrent_reconciles, 5);
    }

    #[test]
    #[serial]
    fn load_config_rejects_invalid_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "cleanup:\n  pollIntervalSeconds: 0").unwrap();
        std::env::set_var("CONTROLLER_CONFIG_PATH", file.path());

        let result = load_config();
        std::env::remove_var("CONTROLLER_CONFIG_PATH");

        assert!(matches!(result, Err(Error::ConfigError(_))));
    }
}
