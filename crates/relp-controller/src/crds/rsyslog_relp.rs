//! `RsyslogRelp` Custom Resource Definition, the tenant opt-in record

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Annotation selecting a control-plane migration step (`migrate` or `restore`).
pub const OPERATION_ANNOTATION: &str = "relp.platform/operation";

/// Annotation requesting deletion without node cleanup.
pub const FORCE_DELETE_ANNOTATION: &str = "relp.platform/force-delete";

#[derive(CustomResource, Deserialize, Serialize, Clone, Debug, Default, JsonSchema)]
#[kube(
    group = "extensions.relp.platform",
    version = "v1alpha1",
    kind = "RsyslogRelp"
)]
#[kube(namespaced)]
#[kube(status = "RsyslogRelpStatus")]
#[kube(shortname = "relp")]
#[kube(printcolumn = r#"{"name":"Phase","type":"string","jsonPath":".status.phase"}"#)]
#[kube(printcolumn = r#"{"name":"Operation","type":"string","jsonPath":".status.lastOperation.state"}"#)]
#[kube(printcolumn = r#"{"name":"Age","type":"date","jsonPath":".metadata.creationTimestamp"}"#)]
pub struct RsyslogRelpSpec {
    /// Raw `RsyslogRelpConfig` document; decoded and validated on every reconcile
    #[serde(rename = "providerConfig", default, skip_serializing_if = "Option::is_none")]
    pub provider_config: Option<serde_json::Value>,
}

#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct RsyslogRelpStatus {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phase: Option<Phase>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub observed_generation: Option<i64>,

    /// Hash of the artifact set last published to the nodes
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_applied_artifact_hash: Option<String>,

    /// Set while a cleanup bundle may still exist on the cluster
    #[serde(default)]
    pub cleanup_job_present: bool,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_operation: Option<LastOperation>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<LastError>,
}

/// Lifecycle phase of a tenant.
#[derive(Deserialize, Serialize, Clone, Copy, Debug, PartialEq, Eq, JsonSchema)]
pub enum Phase {
    /// Forwarding is configured on every node
    Enabled,
    /// Forwarding was removed and the nodes were cleaned
    Disabled,
    /// Node state is kept while the record moves to another control plane
    Migrating,
    /// The record was removed without node cleanup
    ForceDeleted,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Enabled => write!(f, "Enabled"),
            Self::Disabled => write!(f, "Disabled"),
            Self::Migrating => write!(f, "Migrating"),
            Self::ForceDeleted => write!(f, "ForceDeleted"),
        }
    }
}

/// Summary of the most recent reconcile, shown to the tenant.
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct LastOperation {
    #[serde(rename = "type")]
    pub operation_type: OperationType,
    pub state: OperationState,
    pub description: String,
    pub last_update_time: String,
}

#[derive(Deserialize, Serialize, Clone, Copy, Debug, PartialEq, Eq, JsonSchema)]
pub enum OperationType {
    Reconcile,
    Delete,
    Migrate,
    Restore,
}

#[derive(Deserialize, Serialize, Clone, Copy, Debug, PartialEq, Eq, JsonSchema)]
pub enum OperationState {
    Succeeded,
    /// Retryable failure, the controller keeps trying
    Error,
    /// Terminal failure for the current generation
    Failed,
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct LastError {
    pub description: String,

    /// Offending field path of the tenant document, when known
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field_path: Option<String>,

    pub retryable: bool,
}

/// Migration step requested through [`OPERATION_ANNOTATION`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MigrationStep {
    Migrate,
    Restore,
}

impl RsyslogRelp {
    /// Migration step requested on the record, if any.
    #[must_use]
    pub fn migration_step(&self) -> Option<MigrationStep> {
        let value = self.metadata.annotations.as_ref()?.get(OPERATION_ANNOTATION)?;
        match value.as_str() {
            "migrate" => Some(MigrationStep::Migrate),
            "restore" => Some(MigrationStep::Restore),
            _ => None,
        }
    }

    #[must_use]
    pub fn force_delete_requested(&self) -> bool {
        self.metadata
            .annotations
            .as_ref()
            .and_then(|a| a.get(FORCE_DELETE_ANNOTATION))
            .is_some_and(|v| v == "true")
    }

    #[must_use]
    pub fn is_deleting(&self) -> bool {
        self.metadata.deletion_timestamp.is_some()
    }

    /// Current phase, `None` for records that were never reconciled.
    #[must_use]
    pub fn phase(&self) -> Option<Phase> {
        self.status.as_ref().and_then(|s| s.phase)
    }
}
