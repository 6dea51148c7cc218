//! Tenant configuration API
//!
//! The `RsyslogRelpConfig` document a tenant attaches to its cluster, the
//! `AuditRules` document referenced from a ConfigMap, and the decode /
//! default / validate pipeline the reconciler runs before synthesis.

pub mod decode;
pub mod defaults;
pub mod ere;
pub mod errors;
pub mod types;
pub mod validation;

pub use decode::{parse_audit_rules, parse_config, DecodeError};
pub use defaults::set_defaults;
pub use errors::{FieldError, FieldErrorKind, FieldErrors};
pub use types::{
    AuditConfig, AuditRules, AuthMode, LoggingRule, MessageContent, RsyslogRelpConfig, TlsConfig,
    TlsLib,
};
pub use validation::validate_config;

/// API group/version of every document this extension understands.
pub const API_VERSION: &str = "rsyslog-relp.extensions.relp.platform/v1alpha1";

/// Kind of the tenant opt-in document.
pub const CONFIG_KIND: &str = "RsyslogRelpConfig";

/// Kind of the audit rules document stored in a referenced ConfigMap.
pub const AUDIT_RULES_KIND: &str = "AuditRules";
