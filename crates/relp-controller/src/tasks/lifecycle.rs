//! Tenant lifecycle state machine
//!
//! Each reconcile picks exactly one [`Transition`] from the record alone.
//! Priority: force delete, then deletion, then migration, then enable.

use crate::crds::{MigrationStep, OperationType, Phase, RsyslogRelp};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// Validate, synthesize and publish. `restore` republishes even when the
    /// recorded hash matches, since the record arrived from another control plane.
    Enable { restore: bool },
    /// Withdraw forwarding and clean the nodes, unless the cluster is going away.
    Disable,
    /// Withdraw without waiting and without node cleanup.
    ForceDelete,
    /// Keep node state and withdraw the bundle from this control plane.
    Migrate,
    /// Node state already handed over; nothing left to do here.
    Retain,
}

impl Transition {
    /// Plans the transition for the current state of `record`.
    #[must_use]
    pub fn plan(record: &RsyslogRelp) -> Self {
        let migrated = record.phase() == Some(Phase::Migrating);

        if record.is_deleting() {
            if record.force_delete_requested() {
                return Self::ForceDelete;
            }
            if migrated {
                return Self::Retain;
            }
            if record.migration_step() == Some(MigrationStep::Migrate) {
                return Self::Migrate;
            }
            return Self::Disable;
        }

        match record.migration_step() {
            Some(MigrationStep::Migrate) if migrated => Self::Retain,
            Some(MigrationStep::Migrate) => Self::Migrate,
            Some(MigrationStep::Restore) => Self::Enable { restore: true },
            None => Self::Enable { restore: false },
        }
    }

    /// Operation type reported on the tenant record.
    #[must_use]
    pub fn operation_type(self) -> OperationType {
        match self {
            Self::Enable { restore: true } => OperationType::Restore,
            Self::Enable { restore: false } => OperationType::Reconcile,
            Self::Disable | Self::ForceDelete => OperationType::Delete,
            Self::Migrate | Self::Retain => OperationType::Migrate,
        }
    }

    /// Whether the record is being removed and the finalizer path applies.
    #[must_use]
    pub fn is_teardown(self) -> bool {
        matches!(self, Self::Disable | Self::ForceDelete)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crds::{RsyslogRelpSpec, RsyslogRelpStatus, FORCE_DELETE_ANNOTATION, OPERATION_ANNOTATION};
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::Time;
    use std::collections::BTreeMap;

    fn record(annotations: &[(&str, &str)], deleting: bool, phase: Option<Phase>) -> RsyslogRelp {
        let mut record = RsyslogRelp::new("rsyslog-relp", RsyslogRelpSpec::default());
        record.metadata.annotations = Some(
            annotations
                .iter()
                .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
                .collect::<BTreeMap<_, _>>(),
        );
        if deleting {
            record.metadata.deletion_timestamp = Some(Time(chrono::Utc::now()));
        }
        record.status = Some(RsyslogRelpStatus {
            phase,
            ..Default::default()
        });
        record
    }

    #[test]
    fn plain_record_enables() {
        assert_eq!(
            Transition::plan(&record(&[], false, None)),
            Transition::Enable { restore: false }
        );
        assert_eq!(
            Transition::plan(&record(&[], false, Some(Phase::Enabled))),
            Transition::Enable { restore: false }
        );
    }

    #[test]
    fn force_delete_wins_over_everything() {
        let r = record(
            &[(FORCE_DELETE_ANNOTATION, "true"), (OPERATION_ANNOTATION, "migrate")],
            true,
            Some(Phase::Migrating),
        );
        assert_eq!(Transition::plan(&r), Transition::ForceDelete);
    }

    #[test]
    fn force_delete_annotation_alone_does_not_delete() {
        let r = record(&[(FORCE_DELETE_ANNOTATION, "true")], false, Some(Phase::Enabled));
        assert_eq!(Transition::plan(&r), Transition::Enable { restore: false });
    }

    #[test]
    fn deletion_disables() {
        let r = record(&[], true, Some(Phase::Enabled));
        assert_eq!(Transition::plan(&r), Transition::Disable);
        assert!(Transition::Disable.is_teardown());
    }

    #[test]
    fn migrated_record_is_retained_on_delete() {
        let r = record(&[(OPERATION_ANNOTATION, "migrate")], true, Some(Phase::Migrating));
        assert_eq!(Transition::plan(&r), Transition::Retain);
    }

    #[test]
    fn migrate_runs_once() {
        let first = record(&[(OPERATION_ANNOTATION, "migrate")], false, Some(Phase::Enabled));
        assert_eq!(Transition::plan(&first), Transition::Migrate);
        let again = record(&[(OPERATION_ANNOTATION, "migrate")], false, Some(Phase::Migrating));
        assert_eq!(Transition::plan(&again), Transition::Retain);
    }

    #[test]
    fn restore_enables_with_republish() {
        let r = record(&[(OPERATION_ANNOTATION, "restore")], false, None);
        let transition = Transition::plan(&r);
        assert_eq!(transition, Transition::Enable { restore: true });
        assert_eq!(transition.operation_type(), OperationType::Restore);
    }
}
