//! Decoding of versioned tenant documents
//!
//! Documents arrive as raw bytes (JSON or YAML). The type header is checked
//! before the body is decoded so that documents written for another API
//! version fail with a version error instead of a confusing field error.

use super::types::{AuditRules, RsyslogRelpConfig};
use super::{API_VERSION, AUDIT_RULES_KIND, CONFIG_KIND};
use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("document is not valid YAML or JSON: {0}")]
    Malformed(String),

    #[error("document must be an object")]
    NotAnObject,

    #[error("document is missing '{0}'")]
    MissingTypeField(&'static str),

    #[error("unsupported apiVersion '{found}', expected '{expected}'")]
    UnsupportedVersion { found: String, expected: &'static str },

    #[error("unknown kind '{found}', expected '{expected}'")]
    UnknownKind { found: String, expected: &'static str },

    #[error("invalid {kind} document: {source}")]
    InvalidBody {
        kind: &'static str,
        #[source]
        source: serde_json::Error,
    },
}

/// Decodes a tenant `RsyslogRelpConfig` document.
pub fn parse_config(raw: &[u8]) -> Result<RsyslogRelpConfig, DecodeError> {
    let body = checked_body(raw, CONFIG_KIND)?;
    serde_json::from_value(body).map_err(|source| DecodeError::InvalidBody {
        kind: CONFIG_KIND,
        source,
    })
}

/// Decodes an `AuditRules` document as stored in a referenced ConfigMap.
pub fn parse_audit_rules(raw: &[u8]) -> Result<AuditRules, DecodeError> {
    let mut body = checked_body(raw, AUDIT_RULES_KIND)?;
    if let Value::Object(map) = &mut body {
        map.insert("apiVersion".to_string(), Value::String(API_VERSION.to_string()));
        map.insert("kind".to_string(), Value::String(AUDIT_RULES_KIND.to_string()));
    }
    serde_json::from_value(body).map_err(|source| DecodeError::InvalidBody {
        kind: AUDIT_RULES_KIND,
        source,
    })
}

/// Parses the document, verifies its type header and returns the remaining fields.
fn checked_body(raw: &[u8], expected_kind: &'static str) -> Result<Value, DecodeError> {
    let document: Value =
        serde_yaml::from_slice(raw).map_err(|e| DecodeError::Malformed(e.to_string()))?;

    let Value::Object(mut map) = document else {
        return Err(DecodeError::NotAnObject);
    };

    let api_version = take_string(&mut map, "apiVersion")?;
    let kind = take_string(&mut map, "kind")?;

    if api_version != API_VERSION {
        return Err(DecodeError::UnsupportedVersion {
            found: api_version,
            expected: API_VERSION,
        });
    }
    if kind != expected_kind {
        return Err(DecodeError::UnknownKind {
            found: kind,
            expected: expected_kind,
        });
    }

    Ok(Value::Object(map))
}

fn take_string(
    map: &mut serde_json::Map<String, Value>,
    key: &'static str,
) -> Result<String, DecodeError> {
    match map.remove(key) {
        Some(Value::String(value)) if !value.is_empty() => Ok(value),
        _ => Err(DecodeError::MissingTypeField(key)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_yaml_document() {
        let raw = br#"
apiVersion: rsyslog-relp.extensions.relp.platform/v1alpha1
kind: RsyslogRelpConfig
target: 10.2.64.54
port: 80
loggingRules:
- programNames: ["test-program"]
  severity: 1
"#;
        let config = parse_config(raw).unwrap();
        assert_eq!(config.target, "10.2.64.54");
        assert_eq!(config.port, 80);
        assert_eq!(config.logging_rules.len(), 1);
        assert_eq!(config.logging_rules[0].severity, Some(1));
        assert!(config.audit_config.is_none());
    }

    #[test]
    fn parses_json_document() {
        let raw = br#"{"apiVersion":"rsyslog-relp.extensions.relp.platform/v1alpha1","kind":"RsyslogRelpConfig","target":"collector","port":443,"tls":{"enabled":true,"secretReferenceName":"rsyslog-tls","authMode":"name"}}"#;
        let config = parse_config(raw).unwrap();
        let tls = config.tls.unwrap();
        assert!(tls.enabled);
        assert_eq!(tls.secret_reference_name.as_deref(), Some("rsyslog-tls"));
    }

    #[test]
    fn rejects_other_api_version() {
        let raw = br#"{"apiVersion":"rsyslog-relp.extensions.relp.platform/v1alpha0","kind":"RsyslogRelpConfig","target":"x","port":1}"#;
        assert!(matches!(
            parse_config(raw),
            Err(DecodeError::UnsupportedVersion { .. })
        ));
    }

    #[test]
    fn rejects_unknown_kind() {
        let raw = br#"{"apiVersion":"rsyslog-relp.extensions.relp.platform/v1alpha1","kind":"SyslogConfig","target":"x","port":1}"#;
        assert!(matches!(parse_config(raw), Err(DecodeError::UnknownKind { .. })));
    }

    #[test]
    fn rejects_legacy_audit_rules_field() {
        let raw = br#"{"apiVersion":"rsyslog-relp.extensions.relp.platform/v1alpha1","kind":"RsyslogRelpConfig","target":"x","port":1,"auditRules":{"enabled":true}}"#;
        assert!(matches!(parse_config(raw), Err(DecodeError::InvalidBody { .. })));
    }

    #[test]
    fn rejects_missing_type_header() {
        assert!(matches!(
            parse_config(br#"{"target":"x","port":1}"#),
            Err(DecodeError::MissingTypeField("apiVersion"))
        ));
        assert!(matches!(parse_config(b"- a\n- b\n"), Err(DecodeError::NotAnObject)));
    }

    #[test]
    fn parses_audit_rules_document() {
        let raw = b"apiVersion: rsyslog-relp.extensions.relp.platform/v1alpha1\nkind: AuditRules\nauditRules: |\n  -w /etc/passwd -p wa\n";
        let rules = parse_audit_rules(raw).unwrap();
        assert_eq!(rules.kind, "AuditRules");
        assert_eq!(rules.audit_rules, "-w /etc/passwd -p wa\n");
    }
}
