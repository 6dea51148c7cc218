//! Transition execution
//!
//! The actuator runs one [`Transition`] against the capability traits only,
//! mutating a copy of the record status as each step lands so that partial
//! progress (a published bundle, a cleanup job still present) survives a
//! failed reconcile.

use super::channel::{
    BundlePayload, DistributionChannel, CLEANER_BUNDLE, CONFIGURATION_BUNDLE,
};
use super::config::ControllerConfig;
use super::lifecycle::Transition;
use super::observability::MonitoringSink;
use super::store::{resolve_context, ResourceStore};
use super::types::{cancellable, Error, Result};
use crate::apis::{parse_config, set_defaults, validate_config, RsyslogRelpConfig};
use crate::cleanup::cleaner_manifests;
use crate::crds::{ClusterContext, Phase, RsyslogRelp, RsyslogRelpStatus};
use crate::monitoring::monitoring_objects;
use crate::synthesis::{synthesize, ArtifactSet};
use kube::ResourceExt;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

pub struct Actuator<'a> {
    pub channel: &'a dyn DistributionChannel,
    pub store: &'a dyn ResourceStore,
    pub monitoring: &'a dyn MonitoringSink,
    pub config: &'a ControllerConfig,
    pub token: CancellationToken,
}

impl Actuator<'_> {
    /// Runs `transition` for `record`, recording progress in `state`.
    /// Returns the success description for the tenant record.
    pub async fn execute(
        &self,
        transition: Transition,
        record: &RsyslogRelp,
        state: &mut RsyslogRelpStatus,
    ) -> Result<&'static str> {
        let namespace = record
            .namespace()
            .ok_or(Error::MissingObjectKey(".metadata.namespace"))?;

        match transition {
            Transition::Enable { restore } => {
                self.enable(record, &namespace, restore, state).await?;
                Ok("Rsyslog RELP forwarding configured")
            }
            Transition::Disable => {
                self.disable(&namespace, state).await?;
                Ok("Rsyslog RELP forwarding removed and nodes cleaned")
            }
            Transition::ForceDelete => {
                self.force_delete(&namespace, state).await?;
                Ok("Rsyslog RELP forwarding force deleted without node cleanup")
            }
            Transition::Migrate => {
                self.migrate(&namespace, state).await?;
                Ok("Node state kept for control plane migration")
            }
            Transition::Retain => Ok("Node state already handed over"),
        }
    }

    async fn enable(
        &self,
        record: &RsyslogRelp,
        namespace: &str,
        restore: bool,
        state: &mut RsyslogRelpStatus,
    ) -> Result<()> {
        let (config, artifacts) = self.prepare(record, namespace).await?;
        let hash = artifacts.hash();

        if state.cleanup_job_present {
            info!(namespace = %namespace, "Removing stale cleanup job before enabling");
            self.withdraw(namespace, CLEANER_BUNDLE).await?;
            state.cleanup_job_present = false;
        }

        let unchanged = state.phase == Some(Phase::Enabled)
            && state.last_applied_artifact_hash.as_deref() == Some(hash.as_str());
        if unchanged && !restore {
            debug!(namespace = %namespace, hash = %hash, "Artifacts unchanged, skipping publish");
        } else {
            let payload = BundlePayload::from_artifacts(&artifacts);
            self.publish(namespace, CONFIGURATION_BUNDLE, payload).await?;
            info!(namespace = %namespace, hash = %hash, files = artifacts.files().count(), "Published configuration bundle");
            state.last_applied_artifact_hash = Some(hash);
        }

        if self.config.monitoring.enabled {
            let objects =
                monitoring_objects(namespace, config.audit_enabled(), &self.config.monitoring)?;
            cancellable(&self.token, self.monitoring.apply(namespace, objects)).await?;
        }

        state.phase = Some(Phase::Enabled);
        Ok(())
    }

    async fn disable(&self, namespace: &str, state: &mut RsyslogRelpStatus) -> Result<()> {
        let cluster = cancellable(&self.token, self.store.cluster(namespace)).await?;
        let cluster_live = cluster.is_some_and(|c| c.metadata.deletion_timestamp.is_none());

        self.withdraw(namespace, CONFIGURATION_BUNDLE).await?;
        self.wait_deleted(namespace, CONFIGURATION_BUNDLE, self.config.cleanup.deleted_timeout())
            .await?;
        state.last_applied_artifact_hash = None;

        if cluster_live {
            let manifests = cleaner_manifests(&self.config.images)?;
            self.publish(namespace, CLEANER_BUNDLE, BundlePayload::from_manifests(manifests))
                .await?;
            state.cleanup_job_present = true;
            info!(namespace = %namespace, "Cleanup job deployed");

            self.wait_healthy(namespace, CLEANER_BUNDLE, self.config.cleanup.healthy_timeout())
                .await?;
            self.withdraw(namespace, CLEANER_BUNDLE).await?;
            self.wait_deleted(namespace, CLEANER_BUNDLE, self.config.cleanup.deleted_timeout())
                .await?;
            state.cleanup_job_present = false;
            info!(namespace = %namespace, "Nodes cleaned, cleanup job removed");
        } else {
            info!(namespace = %namespace, "Cluster is being deleted, skipping node cleanup");
            if state.cleanup_job_present {
                self.withdraw(namespace, CLEANER_BUNDLE).await?;
                state.cleanup_job_present = false;
            }
        }

        cancellable(&self.token, self.monitoring.remove(namespace)).await?;
        state.phase = Some(Phase::Disabled);
        Ok(())
    }

    async fn force_delete(&self, namespace: &str, state: &mut RsyslogRelpStatus) -> Result<()> {
        warn!(namespace = %namespace, "Force delete requested, nodes are not cleaned");
        self.withdraw(namespace, CONFIGURATION_BUNDLE).await?;
        state.last_applied_artifact_hash = None;
        self.withdraw(namespace, CLEANER_BUNDLE).await?;
        state.cleanup_job_present = false;
        cancellable(&self.token, self.monitoring.remove(namespace)).await?;
        state.phase = Some(Phase::ForceDeleted);
        Ok(())
    }

    /// Hands node state over to another control plane. Works from the bundle
    /// already on the cluster, so a config that no longer validates cannot
    /// block the handover.
    async fn migrate(&self, namespace: &str, state: &mut RsyslogRelpStatus) -> Result<()> {
        cancellable(&self.token, async {
            Ok(self.channel.keep_bundle(namespace, CONFIGURATION_BUNDLE).await?)
        })
        .await?;
        self.withdraw(namespace, CONFIGURATION_BUNDLE).await?;
        self.wait_deleted(namespace, CONFIGURATION_BUNDLE, self.config.cleanup.deleted_timeout())
            .await?;
        if state.cleanup_job_present {
            self.withdraw(namespace, CLEANER_BUNDLE).await?;
            state.cleanup_job_present = false;
        }
        cancellable(&self.token, self.monitoring.remove(namespace)).await?;

        info!(namespace = %namespace, "Configuration bundle released with node state kept");
        state.phase = Some(Phase::Migrating);
        Ok(())
    }

    /// Decodes, defaults, resolves, validates and synthesizes.
    async fn prepare(
        &self,
        record: &RsyslogRelp,
        namespace: &str,
    ) -> Result<(RsyslogRelpConfig, ArtifactSet)> {
        let config = set_defaults(decode_provider_config(record)?);
        let ctx: ClusterContext =
            cancellable(&self.token, resolve_context(self.store, namespace, &config)).await?;

        let errors = validate_config(&config, &ctx);
        if !errors.is_empty() {
            return Err(if errors.only_references() {
                Error::Reference(errors)
            } else {
                Error::Validation(errors)
            });
        }

        let artifacts = synthesize(&config, &ctx)?;
        Ok((config, artifacts))
    }

    async fn publish(
        &self,
        namespace: &str,
        name: &str,
        payload: BundlePayload,
    ) -> Result<()> {
        cancellable(&self.token, async {
            Ok(self.channel.publish_bundle(namespace, name, payload).await?)
        })
        .await
    }

    async fn withdraw(&self, namespace: &str, name: &str) -> Result<()> {
        cancellable(&self.token, async {
            Ok(self.channel.withdraw_bundle(namespace, name).await?)
        })
        .await
    }

    async fn wait_healthy(&self, namespace: &str, name: &str, timeout: Duration) -> Result<()> {
        cancellable(&self.token, async {
            Ok(self.channel.wait_healthy(namespace, name, timeout).await?)
        })
        .await
    }

    async fn wait_deleted(&self, namespace: &str, name: &str, timeout: Duration) -> Result<()> {
        cancellable(&self.token, async {
            Ok(self.channel.wait_deleted(namespace, name, timeout).await?)
        })
        .await
    }
}

/// Decodes `spec.providerConfig`. An absent document yields the empty config,
/// which then fails validation on `target`.
fn decode_provider_config(record: &RsyslogRelp) -> Result<RsyslogRelpConfig> {
    match &record.spec.provider_config {
        Some(raw) => Ok(parse_config(&serde_json::to_vec(raw)?)?),
        None => Ok(RsyslogRelpConfig::default()),
    }
}
