//! Typed tenant configuration

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Tenant opt-in document describing where and what to forward.
#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct RsyslogRelpConfig {
    /// Hostname or IP of the RELP collector
    #[serde(default)]
    pub target: String,

    /// Collector port
    #[serde(default)]
    pub port: i32,

    /// Filter clauses, OR-combined in declared order
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub logging_rules: Vec<LoggingRule>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tls: Option<TlsConfig>,

    /// Seconds after which the RELP session is re-established
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rebind_interval: Option<i32>,

    /// Session timeout in seconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<i32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resume_retry_count: Option<i32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub report_suspension_continuation: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audit_config: Option<AuditConfig>,
}

impl RsyslogRelpConfig {
    /// Whether audit rules are shipped to nodes. Defaulting makes this explicit.
    #[must_use]
    pub fn audit_enabled(&self) -> bool {
        self.audit_config.as_ref().is_none_or(|audit| audit.enabled)
    }

    /// TLS settings, only when TLS is switched on.
    #[must_use]
    pub fn enabled_tls(&self) -> Option<&TlsConfig> {
        self.tls.as_ref().filter(|tls| tls.enabled)
    }
}

/// One filter clause. At least one of the fields must be set.
#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct LoggingRule {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub program_names: Vec<String>,

    /// Syslog severity 0..=7; messages at this severity or more severe match
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub severity: Option<i32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message_content: Option<MessageContent>,
}

impl LoggingRule {
    /// True when the rule constrains nothing at all.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.program_names.is_empty()
            && self.severity.is_none()
            && self
                .message_content
                .as_ref()
                .is_none_or(|content| content.regex.is_none() && content.exclude.is_none())
    }
}

/// Message body matching, both patterns are POSIX extended regular expressions.
#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct MessageContent {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub regex: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exclude: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct TlsConfig {
    #[serde(default)]
    pub enabled: bool,

    /// Name of the cluster resource reference pointing at the TLS secret
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secret_reference_name: Option<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub permitted_peer: Vec<String>,

    /// `name` or `fingerprint`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth_mode: Option<String>,

    /// `openssl` or `gnutls`; unset keeps the forwarder default
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tls_lib: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct AuditConfig {
    #[serde(default = "default_audit_enabled")]
    pub enabled: bool,

    /// Name of the cluster resource reference pointing at an `AuditRules` ConfigMap
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config_map_reference_name: Option<String>,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            enabled: default_audit_enabled(),
            config_map_reference_name: None,
        }
    }
}

fn default_audit_enabled() -> bool {
    true
}

/// Audit rules document carried by a referenced ConfigMap.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditRules {
    pub api_version: String,
    pub kind: String,
    #[serde(default)]
    pub audit_rules: String,
}

/// Peer authentication mode of the RELP TLS session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthMode {
    Name,
    Fingerprint,
}

impl AuthMode {
    pub const ALLOWED: [&'static str; 2] = ["name", "fingerprint"];

    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "name" => Some(Self::Name),
            "fingerprint" => Some(Self::Fingerprint),
            _ => None,
        }
    }
}

impl fmt::Display for AuthMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Name => write!(f, "name"),
            Self::Fingerprint => write!(f, "fingerprint"),
        }
    }
}

/// TLS library the forwarder links for RELP.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TlsLib {
    OpenSsl,
    GnuTls,
}

impl TlsLib {
    pub const ALLOWED: [&'static str; 2] = ["openssl", "gnutls"];

    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "openssl" => Some(Self::OpenSsl),
            "gnutls" => Some(Self::GnuTls),
            _ => None,
        }
    }
}

impl fmt::Display for TlsLib {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::OpenSsl => write!(f, "openssl"),
            Self::GnuTls => write!(f, "gnutls"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rule_with_only_empty_message_content_is_empty() {
        let rule = LoggingRule {
            message_content: Some(MessageContent::default()),
            ..Default::default()
        };
        assert!(rule.is_empty());
    }

    #[test]
    fn audit_defaults_to_enabled_when_absent() {
        let config = RsyslogRelpConfig::default();
        assert!(config.audit_enabled());
    }

    #[test]
    fn enabled_tls_ignores_disabled_block() {
        let config = RsyslogRelpConfig {
            tls: Some(TlsConfig {
                enabled: false,
                secret_reference_name: Some("tls".to_string()),
                ..Default::default()
            }),
            ..Default::default()
        };
        assert!(config.enabled_tls().is_none());
    }

    #[test]
    fn auth_mode_and_tls_lib_round_trip_display() {
        for value in AuthMode::ALLOWED {
            assert_eq!(AuthMode::parse(value).map(|m| m.to_string()).as_deref(), Some(value));
        }
        for value in TlsLib::ALLOWED {
            assert_eq!(TlsLib::parse(value).map(|l| l.to_string()).as_deref(), Some(value));
        }
        assert!(AuthMode::parse("certvalid").is_none());
    }
}
