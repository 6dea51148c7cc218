//! `Cluster` Custom Resource Definition and the resolved cluster context
//!
//! One `Cluster` object exists per tenant namespace (the object name equals the
//! namespace). It carries tenant identity and the named resource references a
//! tenant document may point at. [`ClusterContext`] is the read-only view the
//! validator and the synthesizer consume; referenced Secrets and ConfigMaps are
//! resolved into it by the reconciler before either runs.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

#[derive(CustomResource, Deserialize, Serialize, Clone, Debug, Default, JsonSchema)]
#[kube(
    group = "extensions.relp.platform",
    version = "v1alpha1",
    kind = "Cluster"
)]
#[kube(printcolumn = r#"{"name":"Project","type":"string","jsonPath":".spec.projectName"}"#)]
#[kube(printcolumn = r#"{"name":"Version","type":"string","jsonPath":".spec.kubernetesVersion"}"#)]
#[serde(rename_all = "camelCase")]
pub struct ClusterSpec {
    pub project_name: String,
    pub cluster_name: String,
    #[serde(rename = "clusterUID")]
    pub cluster_uid: String,
    pub kubernetes_version: String,

    /// Named references a tenant document can use to point at Secrets and ConfigMaps
    #[serde(default)]
    pub resources: Vec<NamedResourceReference>,
}

/// A tenant-visible name bound to an object in the tenant namespace.
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct NamedResourceReference {
    /// Name used inside the tenant document
    pub name: String,
    pub resource_ref: ResourceRef,
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, Eq, JsonSchema)]
pub struct ResourceRef {
    /// `Secret` or `ConfigMap`
    pub kind: String,
    /// Object name in the tenant namespace
    pub name: String,
}

/// Key set of a referenced Secret. Values are never read by the controller,
/// TLS material is bound late on the node.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SecretSnapshot {
    pub name: String,
    pub immutable: bool,
    pub keys: BTreeSet<String>,
}

/// Contents of a referenced ConfigMap.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConfigMapSnapshot {
    pub name: String,
    pub immutable: bool,
    pub data: BTreeMap<String, String>,
    pub binary_keys: BTreeSet<String>,
}

impl ConfigMapSnapshot {
    /// Number of keys across `data` and `binaryData`.
    #[must_use]
    pub fn key_count(&self) -> usize {
        self.data.len() + self.binary_keys.len()
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ResolvedResource {
    Secret(SecretSnapshot),
    ConfigMap(ConfigMapSnapshot),
}

/// Read-only view of the tenant cluster.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ClusterContext {
    pub project_name: String,
    pub cluster_name: String,
    pub cluster_uid: String,
    pub kubernetes_version: String,
    pub referenced_resources: Vec<NamedResourceReference>,
    /// Objects fetched for the references, keyed by reference name.
    /// A reference without an entry points at an object that does not exist.
    pub resolved: BTreeMap<String, ResolvedResource>,
    /// The cluster itself is being torn down
    pub deleting: bool,
}

impl ClusterContext {
    #[must_use]
    pub fn from_cluster(cluster: &Cluster) -> Self {
        Self {
            project_name: cluster.spec.project_name.clone(),
            cluster_name: cluster.spec.cluster_name.clone(),
            cluster_uid: cluster.spec.cluster_uid.clone(),
            kubernetes_version: cluster.spec.kubernetes_version.clone(),
            referenced_resources: cluster.spec.resources.clone(),
            resolved: BTreeMap::new(),
            deleting: cluster.metadata.deletion_timestamp.is_some(),
        }
    }

    #[must_use]
    pub fn reference(&self, name: &str) -> Option<&NamedResourceReference> {
        self.referenced_resources.iter().find(|r| r.name == name)
    }

    #[must_use]
    pub fn resolved(&self, name: &str) -> Option<&ResolvedResource> {
        self.resolved.get(name)
    }

    /// Object name behind a reference, used for late-bound secret sources.
    #[must_use]
    pub fn object_name(&self, reference: &str) -> Option<&str> {
        self.reference(reference).map(|r| r.resource_ref.name.as_str())
    }

    /// Records the fetched object for `reference`.
    pub fn insert_resolved(&mut self, reference: impl Into<String>, resource: ResolvedResource) {
        self.resolved.insert(reference.into(), resource);
    }
}
