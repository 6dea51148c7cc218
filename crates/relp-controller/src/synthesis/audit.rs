//! Audit rule artifacts

use super::artifacts::{ArtifactSet, ArtifactSource, FileMode, Result, SynthesisError};
use super::paths;
use crate::apis::{parse_audit_rules, RsyslogRelpConfig};
use crate::crds::{ClusterContext, ResolvedResource};

/// Rule files shipped when the tenant does not bring its own.
pub const BASELINE_RULES: [(&str, &str); 4] = [
    (
        "00-base-config.rules",
        include_str!("../../templates/audit/00-base-config.rules"),
    ),
    (
        "10-privilege-escalation.rules",
        include_str!("../../templates/audit/10-privilege-escalation.rules"),
    ),
    (
        "11-privileged-special.rules",
        include_str!("../../templates/audit/11-privileged-special.rules"),
    ),
    (
        "12-system-integrity.rules",
        include_str!("../../templates/audit/12-system-integrity.rules"),
    ),
];

/// File that replaces the baseline when a tenant ConfigMap is referenced.
pub const OVERRIDE_RULES_FILE: &str = "00-rsyslog-relp.rules";

/// Adds the staged audit rules, if audit forwarding is enabled.
pub fn add_audit_rules(
    set: &mut ArtifactSet,
    config: &RsyslogRelpConfig,
    ctx: &ClusterContext,
) -> Result<()> {
    let Some(audit) = config.audit_config.as_ref().filter(|a| a.enabled) else {
        return Ok(());
    };

    match audit.config_map_reference_name.as_deref() {
        Some(reference) => {
            let rules = tenant_rules(reference, ctx)?;
            set.add_file(
                staged_rule_path(OVERRIDE_RULES_FILE),
                FileMode::Public,
                ArtifactSource::base64(rules),
            )
        }
        None => {
            for (name, content) in BASELINE_RULES {
                set.add_file(
                    staged_rule_path(name),
                    FileMode::Public,
                    ArtifactSource::plain(content),
                )?;
            }
            Ok(())
        }
    }
}

fn staged_rule_path(name: &str) -> String {
    format!("{}/{name}", paths::STAGED_AUDIT_RULES_DIR)
}

fn tenant_rules(reference: &str, ctx: &ClusterContext) -> Result<String> {
    let Some(ResolvedResource::ConfigMap(config_map)) = ctx.resolved(reference) else {
        return Err(SynthesisError::UnresolvedReference {
            field: "auditConfig.configMapReferenceName",
            reference: reference.to_string(),
        });
    };
    let raw = config_map
        .data
        .values()
        .next()
        .ok_or_else(|| SynthesisError::AuditRules(format!("configmap {} is empty", config_map.name)))?;
    let rules = parse_audit_rules(raw.as_bytes()).map_err(|e| SynthesisError::AuditRules(e.to_string()))?;
    Ok(rules.audit_rules)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::apis::AuditConfig;
    use crate::crds::ConfigMapSnapshot;
    use std::collections::{BTreeMap, BTreeSet};

    fn with_audit(enabled: bool, reference: Option<&str>) -> RsyslogRelpConfig {
        RsyslogRelpConfig {
            audit_config: Some(AuditConfig {
                enabled,
                config_map_reference_name: reference.map(ToString::to_string),
            }),
            ..Default::default()
        }
    }

    #[test]
    fn baseline_when_no_override() {
        let mut set = ArtifactSet::new();
        add_audit_rules(&mut set, &with_audit(true, None), &ClusterContext::default()).unwrap();
        let paths: Vec<&str> = set.paths_under(paths::STAGED_AUDIT_RULES_DIR).collect();
        assert_eq!(paths.len(), 4);
        assert!(paths[0].ends_with("/00-base-config.rules"));
        assert!(paths[3].ends_with("/12-system-integrity.rules"));
    }

    #[test]
    fn nothing_when_disabled() {
        let mut set = ArtifactSet::new();
        add_audit_rules(&mut set, &with_audit(false, None), &ClusterContext::default()).unwrap();
        assert_eq!(set.files().count(), 0);
    }

    #[test]
    fn override_is_base64_wrapped_verbatim() {
        let mut ctx = ClusterContext::default();
        ctx.insert_resolved(
            "audit-rules",
            ResolvedResource::ConfigMap(ConfigMapSnapshot {
                name: "ref-audit-rules".to_string(),
                immutable: true,
                data: BTreeMap::from([(
                    "auditRules".to_string(),
                    "apiVersion: rsyslog-relp.extensions.relp.platform/v1alpha1\nkind: AuditRules\nauditRules: |\n  -w /etc/shadow -p wa\n  -D\n".to_string(),
                )]),
                binary_keys: BTreeSet::new(),
            }),
        );
        let mut set = ArtifactSet::new();
        add_audit_rules(&mut set, &with_audit(true, Some("audit-rules")), &ctx).unwrap();

        let path = format!("{}/{OVERRIDE_RULES_FILE}", paths::STAGED_AUDIT_RULES_DIR);
        assert_eq!(set.files().count(), 1);
        assert_eq!(set.text(&path).unwrap(), "-w /etc/shadow -p wa\n-D\n");
        assert!(matches!(
            set.file(&path).unwrap().source,
            ArtifactSource::Inline {
                encoding: crate::synthesis::Encoding::Base64,
                ..
            }
        ));
    }

    #[test]
    fn unresolved_override_fails() {
        let mut set = ArtifactSet::new();
        assert!(matches!(
            add_audit_rules(&mut set, &with_audit(true, Some("gone")), &ClusterContext::default()),
            Err(SynthesisError::UnresolvedReference { .. })
        ));
    }
}
