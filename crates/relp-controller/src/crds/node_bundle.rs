//! `NodeBundle` Custom Resource Definition, the distribution record
//!
//! A bundle is written by this controller and consumed by the node
//! distribution agent, which writes files and units to every worker node,
//! applies the listed manifests to the cluster, and reports a `Healthy`
//! condition once everything converged.

use crate::synthesis::{Artifact, ArtifactSource, Encoding, UnitDef};
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Condition type the distribution agent reports once every node converged.
pub const HEALTHY_CONDITION: &str = "Healthy";

#[derive(CustomResource, Deserialize, Serialize, Clone, Debug, Default, PartialEq, JsonSchema)]
#[kube(
    group = "extensions.relp.platform",
    version = "v1alpha1",
    kind = "NodeBundle"
)]
#[kube(namespaced)]
#[kube(status = "NodeBundleStatus")]
#[kube(printcolumn = r#"{"name":"Keep","type":"boolean","jsonPath":".spec.keepObjects"}"#)]
#[serde(rename_all = "camelCase")]
pub struct NodeBundleSpec {
    #[serde(default)]
    pub files: Vec<BundleFile>,

    #[serde(default)]
    pub units: Vec<BundleUnit>,

    /// Cluster objects the agent applies alongside the node files
    #[serde(default)]
    pub manifests: Vec<serde_json::Value>,

    /// Leave node files and cluster objects in place when the bundle is deleted
    #[serde(default)]
    pub keep_objects: bool,
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, Eq, JsonSchema)]
pub struct BundleFile {
    pub path: String,
    pub permissions: u32,
    pub content: BundleFileContent,
}

/// Exactly one of the two fields is set.
#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct BundleFileContent {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub inline: Option<InlineContent>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub secret_ref: Option<SecretKeyRef>,
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, Eq, JsonSchema)]
pub struct InlineContent {
    /// Empty for plain text, `b64` for base64
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub encoding: String,
    pub data: String,
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct SecretKeyRef {
    pub name: String,
    pub data_key: String,
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, Eq, JsonSchema)]
pub struct BundleUnit {
    pub name: String,
    pub enable: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
}

#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct NodeBundleStatus {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub observed_generation: Option<i64>,

    #[serde(default)]
    pub conditions: Vec<BundleCondition>,
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct BundleCondition {
    #[serde(rename = "type")]
    pub condition_type: String,

    /// True, False, or Unknown
    pub status: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_transition_time: Option<String>,
}

impl NodeBundle {
    /// Healthy for the current generation on every node.
    #[must_use]
    pub fn is_healthy(&self) -> bool {
        let Some(status) = &self.status else {
            return false;
        };
        let current = match (status.observed_generation, self.metadata.generation) {
            (Some(observed), Some(generation)) => observed >= generation,
            (_, None) => true,
            (None, Some(_)) => false,
        };
        current
            && status
                .conditions
                .iter()
                .any(|c| c.condition_type == HEALTHY_CONDITION && c.status == "True")
    }

    /// Message of a failing `Healthy` condition, if the agent reported one.
    #[must_use]
    pub fn unhealthy_reason(&self) -> Option<&str> {
        self.status
            .as_ref()?
            .conditions
            .iter()
            .find(|c| c.condition_type == HEALTHY_CONDITION && c.status == "False")
            .and_then(|c| c.message.as_deref())
    }
}

impl From<&Artifact> for BundleFile {
    fn from(artifact: &Artifact) -> Self {
        let content = match &artifact.source {
            ArtifactSource::Inline { encoding, data } => BundleFileContent {
                inline: Some(InlineContent {
                    encoding: match encoding {
                        Encoding::Plain => String::new(),
                        Encoding::Base64 => "b64".to_string(),
                    },
                    data: data.clone(),
                }),
                secret_ref: None,
            },
            ArtifactSource::SecretKey { secret_name, key } => BundleFileContent {
                inline: None,
                secret_ref: Some(SecretKeyRef {
                    name: secret_name.clone(),
                    data_key: key.clone(),
                }),
            },
        };
        Self {
            path: artifact.path.clone(),
            permissions: artifact.permissions.bits(),
            content,
        }
    }
}

impl From<&UnitDef> for BundleUnit {
    fn from(unit: &UnitDef) -> Self {
        Self {
            name: unit.name.clone(),
            enable: unit.enable,
            content: Some(unit.content.clone()),
        }
    }
}
