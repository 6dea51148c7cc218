//! Cluster and referenced-object reads

use super::types::{Error, Result};
use crate::apis::RsyslogRelpConfig;
use crate::crds::{Cluster, ClusterContext, ConfigMapSnapshot, ResolvedResource, SecretSnapshot};
use async_trait::async_trait;
use k8s_openapi::api::core::v1::{ConfigMap, Secret};
use kube::api::Api;
use kube::Client;
use tracing::debug;

/// Typed reads of the objects a tenant reconcile depends on.
#[async_trait]
pub trait ResourceStore: Send + Sync {
    /// The `Cluster` named after the tenant namespace.
    async fn cluster(&self, namespace: &str) -> Result<Option<Cluster>>;

    async fn secret(&self, namespace: &str, name: &str) -> Result<Option<SecretSnapshot>>;

    async fn config_map(&self, namespace: &str, name: &str) -> Result<Option<ConfigMapSnapshot>>;
}

/// [`ResourceStore`] reading straight from the API server, so immutability
/// is observed as stored rather than through a possibly stale cache.
pub struct KubeResourceStore {
    client: Client,
}

impl KubeResourceStore {
    #[must_use]
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ResourceStore for KubeResourceStore {
    async fn cluster(&self, namespace: &str) -> Result<Option<Cluster>> {
        let api: Api<Cluster> = Api::all(self.client.clone());
        Ok(api.get_opt(namespace).await?)
    }

    async fn secret(&self, namespace: &str, name: &str) -> Result<Option<SecretSnapshot>> {
        let api: Api<Secret> = Api::namespaced(self.client.clone(), namespace);
        Ok(api.get_opt(name).await?.map(|secret| secret_snapshot(name, &secret)))
    }

    async fn config_map(&self, namespace: &str, name: &str) -> Result<Option<ConfigMapSnapshot>> {
        let api: Api<ConfigMap> = Api::namespaced(self.client.clone(), namespace);
        Ok(api.get_opt(name).await?.map(|cm| config_map_snapshot(name, cm)))
    }
}

fn secret_snapshot(name: &str, secret: &Secret) -> SecretSnapshot {
    let mut keys: std::collections::BTreeSet<String> = secret
        .data
        .as_ref()
        .map(|data| data.keys().cloned().collect())
        .unwrap_or_default();
    if let Some(string_data) = &secret.string_data {
        keys.extend(string_data.keys().cloned());
    }
    SecretSnapshot {
        name: name.to_string(),
        immutable: secret.immutable.unwrap_or(false),
        keys,
    }
}

fn config_map_snapshot(name: &str, config_map: ConfigMap) -> ConfigMapSnapshot {
    ConfigMapSnapshot {
        name: name.to_string(),
        immutable: config_map.immutable.unwrap_or(false),
        data: config_map.data.unwrap_or_default(),
        binary_keys: config_map
            .binary_data
            .map(|data| data.into_keys().collect())
            .unwrap_or_default(),
    }
}

/// Builds the cluster context for `namespace` and resolves the objects the
/// tenant document references. References that do not resolve are left out
/// so that validation reports them.
pub async fn resolve_context(
    store: &dyn ResourceStore,
    namespace: &str,
    config: &RsyslogRelpConfig,
) -> Result<ClusterContext> {
    let cluster = store
        .cluster(namespace)
        .await?
        .ok_or_else(|| Error::ClusterNotFound(namespace.to_string()))?;
    let mut ctx = ClusterContext::from_cluster(&cluster);

    let tls_reference = config
        .enabled_tls()
        .and_then(|tls| tls.secret_reference_name.clone());
    if let Some(reference) = tls_reference {
        if let Some(target) = referenced_object(&ctx, &reference, "Secret") {
            if let Some(secret) = store.secret(namespace, &target).await? {
                ctx.insert_resolved(reference, ResolvedResource::Secret(secret));
            }
        }
    }

    let audit_reference = config
        .audit_config
        .as_ref()
        .filter(|audit| audit.enabled)
        .and_then(|audit| audit.config_map_reference_name.clone());
    if let Some(reference) = audit_reference {
        if let Some(target) = referenced_object(&ctx, &reference, "ConfigMap") {
            if let Some(config_map) = store.config_map(namespace, &target).await? {
                ctx.insert_resolved(reference, ResolvedResource::ConfigMap(config_map));
            }
        }
    }

    Ok(ctx)
}

fn referenced_object(ctx: &ClusterContext, reference: &str, kind: &str) -> Option<String> {
    let named = ctx.reference(reference)?;
    if named.resource_ref.kind != kind {
        debug!(reference = %reference, kind = %named.resource_ref.kind, "Reference has unexpected kind");
        return None;
    }
    Some(named.resource_ref.name.clone())
}
