//! Semantic validation of a defaulted tenant document
//!
//! Every failure carries the field path of the document it concerns. Checks on
//! referenced Secrets and ConfigMaps only read the pre-resolved objects of the
//! [`ClusterContext`]; nothing here performs I/O.

use super::decode::parse_audit_rules;
use super::ere::compile_posix_ere;
use super::errors::{FieldError, FieldErrors};
use super::types::{AuditConfig, AuthMode, LoggingRule, RsyslogRelpConfig, TlsConfig, TlsLib};
use crate::crds::{ClusterContext, ResolvedResource};
use std::collections::BTreeSet;

/// Keys a TLS secret must carry, no more and no less.
pub const TLS_SECRET_KEYS: [&str; 3] = ["ca", "crt", "key"];

const MAX_PORT: i32 = 65535;
const MAX_SEVERITY: i32 = 7;

/// Validates `config` against the cluster it is attached to.
#[must_use]
pub fn validate_config(config: &RsyslogRelpConfig, ctx: &ClusterContext) -> FieldErrors {
    let mut errors = FieldErrors::default();

    if config.target.is_empty() {
        errors.push(FieldError::required("target", "target must not be empty"));
    } else {
        check_printable("target", &config.target, &mut errors);
    }

    if config.port < 0 {
        errors.push(FieldError::invalid("port", "port cannot be less than 0"));
    } else if config.port > MAX_PORT {
        errors.push(FieldError::invalid(
            "port",
            format!("port cannot be greater than {MAX_PORT}"),
        ));
    }

    if config.logging_rules.is_empty() {
        errors.push(FieldError::required(
            "loggingRules",
            "at least one logging rule is required",
        ));
    }
    for (index, rule) in config.logging_rules.iter().enumerate() {
        validate_rule(&format!("loggingRules[{index}]"), rule, &mut errors);
    }

    if let Some(tls) = &config.tls {
        validate_tls(tls, ctx, &mut errors);
    }

    if let Some(audit) = &config.audit_config {
        validate_audit(audit, ctx, &mut errors);
    }

    errors
}

fn validate_rule(path: &str, rule: &LoggingRule, errors: &mut FieldErrors) {
    if rule.is_empty() {
        errors.push(FieldError::required(
            path,
            "at least one of programNames, severity or messageContent must be set",
        ));
        return;
    }

    if let Some(severity) = rule.severity {
        if !(0..=MAX_SEVERITY).contains(&severity) {
            errors.push(FieldError::invalid(
                format!("{path}.severity"),
                format!("severity must be between 0 and {MAX_SEVERITY}, got {severity}"),
            ));
        }
    }

    for (index, name) in rule.program_names.iter().enumerate() {
        check_printable(&format!("{path}.programNames[{index}]"), name, errors);
    }

    if let Some(content) = &rule.message_content {
        for (name, pattern) in [("regex", &content.regex), ("exclude", &content.exclude)] {
            if let Some(pattern) = pattern {
                let field = format!("{path}.messageContent.{name}");
                if !check_printable(&field, pattern, errors) {
                    continue;
                }
                if let Err(e) = compile_posix_ere(pattern) {
                    errors.push(FieldError::invalid(
                        field,
                        format!("\"{pattern}\" is not a valid POSIX extended regular expression: {e}"),
                    ));
                }
            }
        }
    }
}

/// Values end up inside quoted forwarder config strings, which cannot carry
/// control characters. Returns whether `value` passed.
fn check_printable(field: &str, value: &str, errors: &mut FieldErrors) -> bool {
    match value.chars().find(|c| c.is_control()) {
        Some(c) => {
            errors.push(FieldError::invalid(
                field,
                format!("must not contain control characters, found {c:?}"),
            ));
            false
        }
        None => true,
    }
}

fn validate_tls(tls: &TlsConfig, ctx: &ClusterContext, errors: &mut FieldErrors) {
    if let Some(mode) = &tls.auth_mode {
        if AuthMode::parse(mode).is_none() {
            errors.push(FieldError::not_supported(
                "tls.authMode",
                mode,
                &AuthMode::ALLOWED,
            ));
        }
    }

    if let Some(lib) = &tls.tls_lib {
        if TlsLib::parse(lib).is_none() {
            errors.push(FieldError::not_supported("tls.tlsLib", lib, &TlsLib::ALLOWED));
        }
    }

    for (index, peer) in tls.permitted_peer.iter().enumerate() {
        let field = format!("tls.permittedPeer[{index}]");
        if peer.is_empty() {
            errors.push(FieldError::required(field, "permitted peer must not be empty"));
        } else {
            check_printable(&field, peer, errors);
        }
    }

    if !tls.enabled {
        return;
    }

    match tls.secret_reference_name.as_deref() {
        None | Some("") => errors.push(FieldError::required(
            "tls.secretReferenceName",
            "secret reference is required when TLS is enabled",
        )),
        Some(reference) => {
            if let Some(error) = check_tls_secret(reference, ctx) {
                errors.push(error.on_reference());
            }
        }
    }
}

fn check_tls_secret(reference: &str, ctx: &ClusterContext) -> Option<FieldError> {
    const FIELD: &str = "tls.secretReferenceName";

    let named = match ctx.reference(reference) {
        Some(named) => named,
        None => {
            return Some(FieldError::not_found(
                FIELD,
                format!("cluster has no resource reference named \"{reference}\""),
            ))
        }
    };
    if named.resource_ref.kind != "Secret" {
        return Some(FieldError::invalid(
            FIELD,
            format!(
                "resource reference \"{reference}\" points at a {}, expected a Secret",
                named.resource_ref.kind
            ),
        ));
    }

    let secret = match ctx.resolved(reference) {
        Some(ResolvedResource::Secret(secret)) => secret,
        _ => {
            return Some(FieldError::not_found(
                FIELD,
                format!("secret \"{}\" does not exist", named.resource_ref.name),
            ))
        }
    };
    if !secret.immutable {
        return Some(FieldError::forbidden(
            FIELD,
            format!("secret \"{}\" must be immutable", secret.name),
        ));
    }

    let expected: BTreeSet<&str> = TLS_SECRET_KEYS.into_iter().collect();
    let present: BTreeSet<&str> = secret.keys.iter().map(String::as_str).collect();
    let missing: Vec<&str> = expected.difference(&present).copied().collect();
    let extra: Vec<&str> = present.difference(&expected).copied().collect();
    if missing.is_empty() && extra.is_empty() {
        return None;
    }

    let mut problems = Vec::new();
    if !missing.is_empty() {
        problems.push(format!("missing keys [{}]", missing.join(", ")));
    }
    if !extra.is_empty() {
        problems.push(format!("unexpected keys [{}]", extra.join(", ")));
    }
    Some(FieldError::invalid(
        FIELD,
        format!(
            "secret \"{}\" must contain exactly the keys [ca, crt, key]: {}",
            secret.name,
            problems.join("; ")
        ),
    ))
}

fn validate_audit(audit: &AuditConfig, ctx: &ClusterContext, errors: &mut FieldErrors) {
    if !audit.enabled {
        return;
    }
    let Some(reference) = audit.config_map_reference_name.as_deref() else {
        return;
    };
    if reference.is_empty() {
        errors.push(FieldError::required(
            "auditConfig.configMapReferenceName",
            "reference name must not be empty when set",
        ));
        return;
    }
    if let Some(error) = check_audit_config_map(reference, ctx) {
        errors.push(error.on_reference());
    }
}

fn check_audit_config_map(reference: &str, ctx: &ClusterContext) -> Option<FieldError> {
    const FIELD: &str = "auditConfig.configMapReferenceName";

    let named = match ctx.reference(reference) {
        Some(named) => named,
        None => {
            return Some(FieldError::not_found(
                FIELD,
                format!("cluster has no resource reference named \"{reference}\""),
            ))
        }
    };
    if named.resource_ref.kind != "ConfigMap" {
        return Some(FieldError::invalid(
            FIELD,
            format!(
                "resource reference \"{reference}\" points at a {}, expected a ConfigMap",
                named.resource_ref.kind
            ),
        ));
    }

    let config_map = match ctx.resolved(reference) {
        Some(ResolvedResource::ConfigMap(config_map)) => config_map,
        _ => {
            return Some(FieldError::not_found(
                FIELD,
                format!("configmap \"{}\" does not exist", named.resource_ref.name),
            ))
        }
    };
    if !config_map.immutable {
        return Some(FieldError::forbidden(
            FIELD,
            format!("configmap \"{}\" must be immutable", config_map.name),
        ));
    }

    match config_map.key_count() {
        0 => {
            return Some(FieldError::required(
                FIELD,
                format!("configmap \"{}\" has no data", config_map.name),
            ))
        }
        1 => {}
        n => {
            return Some(FieldError::invalid(
                FIELD,
                format!(
                    "configmap \"{}\" must contain exactly one key, found {n}",
                    config_map.name
                ),
            ))
        }
    }

    let Some((key, raw)) = config_map.data.iter().next() else {
        return Some(FieldError::invalid(
            FIELD,
            format!("configmap \"{}\" must carry its rules as text data", config_map.name),
        ));
    };
    match parse_audit_rules(raw.as_bytes()) {
        Err(e) => Some(FieldError::invalid(
            FIELD,
            format!("key \"{key}\" of configmap \"{}\": {e}", config_map.name),
        )),
        Ok(rules) if rules.audit_rules.trim().is_empty() => Some(FieldError::required(
            FIELD,
            format!("key \"{key}\" of configmap \"{}\" has empty auditRules", config_map.name),
        )),
        Ok(_) => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::apis::errors::FieldErrorKind;
    use crate::apis::types::MessageContent;
    use crate::crds::{ConfigMapSnapshot, NamedResourceReference, ResourceRef, SecretSnapshot};
    use std::collections::BTreeMap;

    fn base_config() -> RsyslogRelpConfig {
        RsyslogRelpConfig {
            target: "10.2.64.54".to_string(),
            port: 80,
            logging_rules: vec![LoggingRule {
                program_names: vec!["test-program".to_string()],
                severity: Some(1),
                message_content: None,
            }],
            ..Default::default()
        }
    }

    fn reference(name: &str, kind: &str) -> NamedResourceReference {
        NamedResourceReference {
            name: name.to_string(),
            resource_ref: ResourceRef {
                kind: kind.to_string(),
                name: format!("ref-{name}"),
            },
        }
    }

    fn ctx_with_secret(immutable: bool, keys: &[&str]) -> ClusterContext {
        let mut ctx = ClusterContext {
            referenced_resources: vec![reference("rsyslog-tls", "Secret")],
            ..Default::default()
        };
        ctx.insert_resolved(
            "rsyslog-tls",
            ResolvedResource::Secret(SecretSnapshot {
                name: "ref-rsyslog-tls".to_string(),
                immutable,
                keys: keys.iter().map(ToString::to_string).collect(),
            }),
        );
        ctx
    }

    fn tls_config() -> RsyslogRelpConfig {
        RsyslogRelpConfig {
            tls: Some(TlsConfig {
                enabled: true,
                secret_reference_name: Some("rsyslog-tls".to_string()),
                auth_mode: Some("name".to_string()),
                ..Default::default()
            }),
            ..base_config()
        }
    }

    fn ctx_with_config_map(immutable: bool, data: &[(&str, &str)]) -> ClusterContext {
        let mut ctx = ClusterContext {
            referenced_resources: vec![reference("audit-rules", "ConfigMap")],
            ..Default::default()
        };
        ctx.insert_resolved(
            "audit-rules",
            ResolvedResource::ConfigMap(ConfigMapSnapshot {
                name: "ref-audit-rules".to_string(),
                immutable,
                data: data
                    .iter()
                    .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
                    .collect::<BTreeMap<_, _>>(),
                binary_keys: BTreeSet::new(),
            }),
        );
        ctx
    }

    fn audit_config() -> RsyslogRelpConfig {
        RsyslogRelpConfig {
            audit_config: Some(AuditConfig {
                enabled: true,
                config_map_reference_name: Some("audit-rules".to_string()),
            }),
            ..base_config()
        }
    }

    const AUDIT_DOC: &str = "apiVersion: rsyslog-relp.extensions.relp.platform/v1alpha1\nkind: AuditRules\nauditRules: |\n  -w /etc/shadow -p wa\n";

    fn single_error(errors: &FieldErrors) -> &FieldError {
        assert_eq!(errors.len(), 1, "expected exactly one error, got {errors}");
        errors.iter().next().unwrap()
    }

    #[test]
    fn accepts_minimal_config() {
        assert!(validate_config(&base_config(), &ClusterContext::default()).is_empty());
    }

    #[test]
    fn negative_port() {
        let config = RsyslogRelpConfig {
            port: -1,
            ..base_config()
        };
        let errors = validate_config(&config, &ClusterContext::default());
        let error = single_error(&errors);
        assert_eq!(error.field, "port");
        assert_eq!(error.kind, FieldErrorKind::Invalid);
        assert_eq!(error.detail, "port cannot be less than 0");
    }

    #[test]
    fn empty_rule_and_bad_severity() {
        let config = RsyslogRelpConfig {
            logging_rules: vec![
                LoggingRule {
                    severity: Some(3),
                    ..Default::default()
                },
                LoggingRule::default(),
            ],
            ..base_config()
        };
        let errors = validate_config(&config, &ClusterContext::default());
        assert_eq!(single_error(&errors).field, "loggingRules[1]");

        let config = RsyslogRelpConfig {
            logging_rules: vec![LoggingRule {
                severity: Some(8),
                ..Default::default()
            }],
            ..base_config()
        };
        let errors = validate_config(&config, &ClusterContext::default());
        assert_eq!(single_error(&errors).field, "loggingRules[0].severity");
    }

    #[test]
    fn perl_regex_is_rejected() {
        let config = RsyslogRelpConfig {
            logging_rules: vec![LoggingRule {
                message_content: Some(MessageContent {
                    regex: Some("foo".to_string()),
                    exclude: Some("\\d+".to_string()),
                }),
                ..Default::default()
            }],
            ..base_config()
        };
        let errors = validate_config(&config, &ClusterContext::default());
        assert_eq!(
            single_error(&errors).field,
            "loggingRules[0].messageContent.exclude"
        );
    }

    #[test]
    fn control_characters_are_rejected_once() {
        let config = RsyslogRelpConfig {
            logging_rules: vec![LoggingRule {
                message_content: Some(MessageContent {
                    regex: Some("fail\nure".to_string()),
                    exclude: None,
                }),
                ..Default::default()
            }],
            ..base_config()
        };
        let errors = validate_config(&config, &ClusterContext::default());
        let error = single_error(&errors);
        assert_eq!(error.field, "loggingRules[0].messageContent.regex");
        assert_eq!(error.kind, FieldErrorKind::Invalid);
        assert!(error.detail.contains("control characters"));

        let config = RsyslogRelpConfig {
            target: "collector\n.example.com".to_string(),
            ..base_config()
        };
        let errors = validate_config(&config, &ClusterContext::default());
        assert_eq!(single_error(&errors).field, "target");
    }

    #[test]
    fn tls_without_secret_reference() {
        let mut config = tls_config();
        config.tls.as_mut().unwrap().secret_reference_name = None;
        let errors = validate_config(&config, &ClusterContext::default());
        let error = single_error(&errors);
        assert_eq!(error.field, "tls.secretReferenceName");
        assert_eq!(error.kind, FieldErrorKind::Required);
        assert!(!error.reference);
    }

    #[test]
    fn accepts_valid_tls_secret() {
        let ctx = ctx_with_secret(true, &["ca", "crt", "key"]);
        assert!(validate_config(&tls_config(), &ctx).is_empty());
    }

    #[test]
    fn tls_secret_faults_each_yield_one_error() {
        let cases = [
            ctx_with_secret(false, &["ca", "crt", "key"]),
            ctx_with_secret(true, &["ca", "crt"]),
            ctx_with_secret(true, &["ca", "crt", "key", "extra"]),
            ClusterContext {
                referenced_resources: vec![reference("rsyslog-tls", "Secret")],
                ..Default::default()
            },
            ClusterContext::default(),
        ];
        for ctx in cases {
            let errors = validate_config(&tls_config(), &ctx);
            let error = single_error(&errors);
            assert_eq!(error.field, "tls.secretReferenceName");
            assert!(error.reference);
        }
    }

    #[test]
    fn tls_enumerations_and_peers() {
        let mut config = tls_config();
        config.tls.as_mut().unwrap().auth_mode = Some("certvalid".to_string());
        let ctx = ctx_with_secret(true, &["ca", "crt", "key"]);
        let errors = validate_config(&config, &ctx);
        assert_eq!(single_error(&errors).kind, FieldErrorKind::NotSupported);

        let mut config = tls_config();
        config.tls.as_mut().unwrap().tls_lib = Some("nss".to_string());
        let errors = validate_config(&config, &ctx);
        assert_eq!(single_error(&errors).field, "tls.tlsLib");

        let mut config = tls_config();
        config.tls.as_mut().unwrap().permitted_peer =
            vec!["rsyslog-server".to_string(), String::new()];
        let errors = validate_config(&config, &ctx);
        assert_eq!(single_error(&errors).field, "tls.permittedPeer[1]");
    }

    #[test]
    fn accepts_valid_audit_config_map() {
        let ctx = ctx_with_config_map(true, &[("auditRules", AUDIT_DOC)]);
        assert!(validate_config(&audit_config(), &ctx).is_empty());
    }

    #[test]
    fn audit_config_map_faults_each_yield_one_error() {
        let empty_rules = "apiVersion: rsyslog-relp.extensions.relp.platform/v1alpha1\nkind: AuditRules\nauditRules: \"\"\n";
        let cases = [
            ctx_with_config_map(false, &[("auditRules", AUDIT_DOC)]),
            ctx_with_config_map(true, &[]),
            ctx_with_config_map(true, &[("a", AUDIT_DOC), ("b", AUDIT_DOC)]),
            ctx_with_config_map(true, &[("auditRules", "kind: Something\n")]),
            ctx_with_config_map(true, &[("auditRules", empty_rules)]),
            ClusterContext::default(),
        ];
        for ctx in cases {
            let errors = validate_config(&audit_config(), &ctx);
            let error = single_error(&errors);
            assert_eq!(error.field, "auditConfig.configMapReferenceName");
            assert!(error.reference);
        }
    }

    #[test]
    fn disabled_audit_skips_config_map_checks() {
        let mut config = audit_config();
        config.audit_config.as_mut().unwrap().enabled = false;
        assert!(validate_config(&config, &ClusterContext::default()).is_empty());
    }
}
