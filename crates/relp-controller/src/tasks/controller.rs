use super::lifecycle::Transition;
use super::types::{Context, Error, Result};
use crate::crds::{
    LastError, LastOperation, OperationState, RsyslogRelp, RsyslogRelpStatus, OPERATION_ANNOTATION,
};
use kube::api::{Patch, PatchParams};
use kube::runtime::controller::Action;
use kube::runtime::finalizer::{finalizer, Event as FinalizerEvent};
use kube::{Api, ResourceExt};
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{debug, error, info, instrument, warn};

pub const FINALIZER_NAME: &str = "extensions.relp.platform/rsyslog-relp";

#[instrument(skip(record, ctx), fields(name = %record.name_any(), namespace = %record.namespace().unwrap_or_default()))]
pub async fn reconcile(record: Arc<RsyslogRelp>, ctx: Arc<Context>) -> Result<Action> {
    let namespace = record
        .namespace()
        .ok_or(Error::MissingObjectKey(".metadata.namespace"))?;
    let api: Api<RsyslogRelp> = Api::namespaced(ctx.client.clone(), &namespace);

    finalizer(&api, FINALIZER_NAME, record, |event| async {
        match event {
            FinalizerEvent::Apply(record) | FinalizerEvent::Cleanup(record) => {
                run_transition(record, &ctx, &api).await
            }
        }
    })
    .await
    .map_err(|e| match e {
        kube::runtime::finalizer::Error::ApplyFailed(err)
        | kube::runtime::finalizer::Error::CleanupFailed(err) => err,
        kube::runtime::finalizer::Error::AddFinalizer(e)
        | kube::runtime::finalizer::Error::RemoveFinalizer(e) => Error::KubeError(e),
        kube::runtime::finalizer::Error::UnnamedObject => Error::MissingObjectKey(".metadata.name"),
        kube::runtime::finalizer::Error::InvalidFinalizer => {
            Error::ConfigError("Invalid finalizer name".to_string())
        }
    })
}

async fn run_transition(
    record: Arc<RsyslogRelp>,
    ctx: &Context,
    api: &Api<RsyslogRelp>,
) -> Result<Action> {
    let name = record.name_any();
    let transition = Transition::plan(&record);
    info!(?transition, phase = ?record.phase(), "Reconciling RsyslogRelp");

    let mut state = record.status.clone().unwrap_or_default();
    let result = ctx
        .actuator()
        .execute(transition, &record, &mut state)
        .await;

    state.observed_generation = record.metadata.generation;
    match &result {
        Ok(description) => {
            state.last_operation = Some(operation(transition, OperationState::Succeeded, description));
            state.last_error = None;
            info!(phase = ?state.phase, "{description}");
        }
        Err(e) => {
            let retryable = e.is_retryable();
            let op_state = if retryable {
                OperationState::Error
            } else {
                OperationState::Failed
            };
            state.last_operation = Some(operation(transition, op_state, &e.to_string()));
            state.last_error = Some(LastError {
                description: e.to_string(),
                field_path: e.field_path().map(str::to_string),
                retryable,
            });
            if retryable {
                warn!(error = %e, "Reconcile failed, will retry");
            } else {
                error!(error = %e, field = e.field_path().unwrap_or_default(), "Reconcile failed");
            }
        }
    }

    if let Err(patch_error) = patch_status(api, &name, &state).await {
        warn!(error = %patch_error, "Failed to update RsyslogRelp status");
        if result.is_ok() {
            return Err(patch_error);
        }
    }
    result?;

    match transition {
        Transition::Enable { restore: true } => {
            clear_operation_annotation(api, &name).await?;
            Ok(Action::requeue(ctx.config.requeue.success_interval()))
        }
        Transition::Enable { restore: false } => {
            Ok(Action::requeue(ctx.config.requeue.success_interval()))
        }
        _ => Ok(Action::await_change()),
    }
}

fn operation(transition: Transition, state: OperationState, description: &str) -> LastOperation {
    LastOperation {
        operation_type: transition.operation_type(),
        state,
        description: description.to_string(),
        last_update_time: chrono::Utc::now().to_rfc3339(),
    }
}

/// Merge-patches the status subresource. Cleared optional fields are sent as
/// explicit nulls so the merge removes them.
async fn patch_status(api: &Api<RsyslogRelp>, name: &str, state: &RsyslogRelpStatus) -> Result<()> {
    let mut status = serde_json::to_value(state)?;
    if let Value::Object(fields) = &mut status {
        for key in ["lastAppliedArtifactHash", "lastError"] {
            fields.entry(key).or_insert(Value::Null);
        }
    }
    api.patch_status(name, &PatchParams::default(), &Patch::Merge(json!({ "status": status })))
        .await?;
    debug!(name = %name, "Status updated");
    Ok(())
}

async fn clear_operation_annotation(api: &Api<RsyslogRelp>, name: &str) -> Result<()> {
    let patch = json!({ "metadata": { "annotations": { (OPERATION_ANNOTATION): null } } });
    api.patch(name, &PatchParams::default(), &Patch::Merge(&patch))
        .await?;
    info!(name = %name, "Restore finished, operation annotation removed");
    Ok(())
}

/// Retryable failures requeue with the configured delay; terminal failures
/// wait for the record to change.
pub fn error_policy(record: Arc<RsyslogRelp>, error: &Error, ctx: Arc<Context>) -> Action {
    if error.is_retryable() {
        warn!(name = %record.name_any(), error = %error, "Requeueing RsyslogRelp after error");
        Action::requeue(ctx.config.requeue.error_interval())
    } else {
        debug!(name = %record.name_any(), "Terminal error, waiting for a change");
        Action::await_change()
    }
}
