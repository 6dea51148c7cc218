use super::types::{AuditConfig, RsyslogRelpConfig};

/// Applies defaulting rules to a decoded tenant document.
///
/// A missing `auditConfig` becomes `{enabled: true}`. An unset `tlsLib` is left
/// alone, meaning the forwarder picks its own default library.
#[must_use]
pub fn set_defaults(mut config: RsyslogRelpConfig) -> RsyslogRelpConfig {
    if config.audit_config.is_none() {
        config.audit_config = Some(AuditConfig::default());
    }
    config
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::apis::types::TlsConfig;

    #[test]
    fn adds_enabled_audit_config() {
        let config = set_defaults(RsyslogRelpConfig::default());
        assert_eq!(
            config.audit_config,
            Some(AuditConfig {
                enabled: true,
                config_map_reference_name: None
            })
        );
    }

    #[test]
    fn keeps_explicitly_disabled_audit() {
        let config = set_defaults(RsyslogRelpConfig {
            audit_config: Some(AuditConfig {
                enabled: false,
                config_map_reference_name: None,
            }),
            ..Default::default()
        });
        assert!(!config.audit_enabled());
    }

    #[test]
    fn leaves_tls_lib_unset() {
        let config = set_defaults(RsyslogRelpConfig {
            tls: Some(TlsConfig {
                enabled: true,
                ..Default::default()
            }),
            ..Default::default()
        });
        assert!(config.tls.unwrap().tls_lib.is_none());
    }
}
