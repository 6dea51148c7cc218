//! Distribution channel
//!
//! The only path through which the controller affects nodes. A bundle is a
//! named, namespaced payload of files, units and cluster manifests; the
//! distribution agent delivers it to every node and reports health on the
//! bundle's status.

use crate::crds::{BundleFile, BundleUnit, NodeBundle, NodeBundleSpec};
use crate::synthesis::ArtifactSet;
use async_trait::async_trait;
use kube::api::{Api, DeleteParams, Patch, PatchParams};
use kube::Client;
use serde_json::{json, Value};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info};

/// Bundle carrying the forwarder configuration.
pub const CONFIGURATION_BUNDLE: &str = "rsyslog-relp-configuration";

/// Bundle carrying the per-node cleanup job.
pub const CLEANER_BUNDLE: &str = crate::cleanup::CLEANER_NAME;

const FIELD_MANAGER: &str = "relp-controller";

/// Errors that can occur when talking to the distribution channel.
#[derive(Debug, Error)]
pub enum ChannelError {
    /// Kubernetes API request failed
    #[error("bundle {name}: {source}")]
    Api {
        name: String,
        #[source]
        source: kube::Error,
    },

    /// The bundle did not reach the awaited state in time
    #[error("bundle {name} not {condition} after {seconds}s")]
    Timeout {
        name: String,
        condition: &'static str,
        seconds: u64,
    },

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl ChannelError {
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }
}

/// Payload of one bundle.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BundlePayload {
    pub files: Vec<BundleFile>,
    pub units: Vec<BundleUnit>,
    pub manifests: Vec<Value>,
}

impl BundlePayload {
    #[must_use]
    pub fn from_artifacts(set: &ArtifactSet) -> Self {
        Self {
            files: set.files().map(BundleFile::from).collect(),
            units: set.units().iter().map(BundleUnit::from).collect(),
            manifests: Vec::new(),
        }
    }

    #[must_use]
    pub fn from_manifests(manifests: Vec<Value>) -> Self {
        Self {
            manifests,
            ..Self::default()
        }
    }
}

/// Capability the reconciler uses to reach nodes.
#[async_trait]
pub trait DistributionChannel: Send + Sync {
    /// Creates or replaces a bundle.
    async fn publish_bundle(
        &self,
        namespace: &str,
        name: &str,
        payload: BundlePayload,
    ) -> Result<(), ChannelError>;

    /// Marks an existing bundle so the agent leaves node state in place when
    /// it is withdrawn. Marking an absent bundle succeeds.
    async fn keep_bundle(&self, namespace: &str, name: &str) -> Result<(), ChannelError>;

    /// Deletes a bundle. Withdrawing an absent bundle succeeds.
    async fn withdraw_bundle(&self, namespace: &str, name: &str) -> Result<(), ChannelError>;

    /// Resolves once the bundle is healthy on every node.
    async fn wait_healthy(
        &self,
        namespace: &str,
        name: &str,
        timeout: Duration,
    ) -> Result<(), ChannelError>;

    /// Resolves once the bundle no longer exists.
    async fn wait_deleted(
        &self,
        namespace: &str,
        name: &str,
        timeout: Duration,
    ) -> Result<(), ChannelError>;
}

/// [`DistributionChannel`] backed by `NodeBundle` objects.
pub struct KubeDistributionChannel {
    client: Client,
    poll_interval: Duration,
}

impl KubeDistributionChannel {
    #[must_use]
    pub fn new(client: Client, poll_interval: Duration) -> Self {
        Self {
            client,
            poll_interval,
        }
    }

    fn api(&self, namespace: &str) -> Api<NodeBundle> {
        Api::namespaced(self.client.clone(), namespace)
    }

    /// Polls `name` until `done` holds for the current object (or its absence).
    async fn poll_until<F>(
        &self,
        namespace: &str,
        name: &str,
        timeout: Duration,
        condition: &'static str,
        done: F,
    ) -> Result<(), ChannelError>
    where
        F: Fn(Option<&NodeBundle>) -> bool + Send + Sync,
    {
        let api = self.api(namespace);
        let poll = async {
            loop {
                let current = api.get_opt(name).await.map_err(|source| ChannelError::Api {
                    name: name.to_string(),
                    source,
                })?;
                if done(current.as_ref()) {
                    return Ok(());
                }
                if let Some(reason) = current.as_ref().and_then(NodeBundle::unhealthy_reason) {
                    debug!(bundle = %name, reason = %reason, "Bundle not yet {}", condition);
                }
                tokio::time::sleep(self.poll_interval).await;
            }
        };

        match tokio::time::timeout(timeout, poll).await {
            Ok(result) => result,
            Err(_) => Err(ChannelError::Timeout {
                name: name.to_string(),
                condition,
                seconds: timeout.as_secs(),
            }),
        }
    }
}

#[async_trait]
impl DistributionChannel for KubeDistributionChannel {
    async fn publish_bundle(
        &self,
        namespace: &str,
        name: &str,
        payload: BundlePayload,
    ) -> Result<(), ChannelError> {
        let spec = NodeBundleSpec {
            files: payload.files,
            units: payload.units,
            manifests: payload.manifests,
            keep_objects: false,
        };
        let bundle = json!({
            "apiVersion": "extensions.relp.platform/v1alpha1",
            "kind": "NodeBundle",
            "metadata": {
                "name": name,
                "namespace": namespace,
                "labels": { "app.kubernetes.io/managed-by": FIELD_MANAGER }
            },
            "spec": serde_json::to_value(spec)?,
        });

        self.api(namespace)
            .patch(
                name,
                &PatchParams::apply(FIELD_MANAGER).force(),
                &Patch::Apply(&bundle),
            )
            .await
            .map_err(|source| ChannelError::Api {
                name: name.to_string(),
                source,
            })?;

        info!(bundle = %name, namespace = %namespace, "Published bundle");
        Ok(())
    }

    async fn keep_bundle(&self, namespace: &str, name: &str) -> Result<(), ChannelError> {
        let patch = json!({ "spec": { "keepObjects": true } });
        match self
            .api(namespace)
            .patch(name, &PatchParams::default(), &Patch::Merge(&patch))
            .await
        {
            Ok(_) => {
                info!(bundle = %name, namespace = %namespace, "Bundle marked to keep node state");
                Ok(())
            }
            Err(kube::Error::Api(ae)) if ae.code == 404 => {
                debug!(bundle = %name, "Bundle absent, nothing to keep");
                Ok(())
            }
            Err(source) => Err(ChannelError::Api {
                name: name.to_string(),
                source,
            }),
        }
    }

    async fn withdraw_bundle(&self, namespace: &str, name: &str) -> Result<(), ChannelError> {
        match self.api(namespace).delete(name, &DeleteParams::default()).await {
            Ok(_) => {
                info!(bundle = %name, namespace = %namespace, "Withdrew bundle");
                Ok(())
            }
            Err(kube::Error::Api(ae)) if ae.code == 404 => {
                debug!(bundle = %name, "Bundle already absent");
                Ok(())
            }
            Err(source) => Err(ChannelError::Api {
                name: name.to_string(),
                source,
            }),
        }
    }

    async fn wait_healthy(
        &self,
        namespace: &str,
        name: &str,
        timeout: Duration,
    ) -> Result<(), ChannelError> {
        self.poll_until(namespace, name, timeout, "healthy", |bundle| {
            bundle.is_some_and(NodeBundle::is_healthy)
        })
        .await
    }

    async fn wait_deleted(
        &self,
        namespace: &str,
        name: &str,
        timeout: Duration,
    ) -> Result<(), ChannelError> {
        self.poll_until(namespace, name, timeout, "deleted", |bundle| bundle.is_none())
            .await
    }
}
