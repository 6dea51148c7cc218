//! Artifact synthesis
//!
//! [`synthesize`] turns a validated, defaulted tenant document and its cluster
//! context into the [`ArtifactSet`] published to every node. It performs no
//! I/O; referenced objects must already be resolved into the context. The
//! same inputs always produce byte-identical output.

pub mod artifacts;
pub mod audit;
pub mod rsyslog;
pub mod scripts;
pub mod templates;

pub use artifacts::{
    Artifact, ArtifactSet, ArtifactSource, Encoding, FileMode, SynthesisError, UnitDef,
};

use crate::apis::RsyslogRelpConfig;
use crate::crds::ClusterContext;

/// Fixed node filesystem layout.
pub mod paths {
    pub const STAGING_DIR: &str = "/var/lib/rsyslog-relp-configurator";
    pub const STAGED_CONFIG: &str = "/var/lib/rsyslog-relp-configurator/rsyslog.d/60-audit.conf";
    pub const STAGED_AUDIT_RULES_DIR: &str = "/var/lib/rsyslog-relp-configurator/audit/rules.d";
    pub const APPLY_SCRIPT: &str = "/var/lib/rsyslog-relp-configurator/configure-rsyslog.sh";
    pub const PSTATS_SCRIPT: &str = "/var/lib/rsyslog-relp-configurator/process_rsyslog_pstats.sh";

    pub const LIVE_CONFIG: &str = "/etc/rsyslog.d/60-audit.conf";
    pub const TLS_DIR: &str = "/etc/ssl/rsyslog";
    pub const TLS_CA_CERT: &str = "/etc/ssl/rsyslog/ca.crt";
    pub const TLS_CERT: &str = "/etc/ssl/rsyslog/tls.crt";
    pub const TLS_KEY: &str = "/etc/ssl/rsyslog/tls.key";
    pub const AUDIT_RULES_DIR: &str = "/etc/audit/rules.d";
    pub const AUDIT_RULES_BACKUP_DIR: &str = "/etc/audit/rules.d.original";
    pub const AUDIT_SYSLOG_PLUGINS: [&str; 2] = [
        "/etc/audit/plugins.d/syslog.conf",
        "/etc/audisp/plugins.d/syslog.conf",
    ];
    pub const SPOOL_DIR: &str = "/var/log/rsyslog";
    pub const TEXTFILE_COLLECTOR_DIR: &str = "/var/lib/node-exporter/textfile-collector";
    pub const MEMORY_LIMITS_DROP_IN: &str =
        "/etc/systemd/system/rsyslog.service.d/10-rsyslog-relp-memory-limits.conf";
}

/// Secret key to node file mapping for TLS material.
pub const TLS_FILES: [(&str, &str); 3] = [
    ("ca", paths::TLS_CA_CERT),
    ("crt", paths::TLS_CERT),
    ("key", paths::TLS_KEY),
];

/// Builds the node artifact set for one tenant.
pub fn synthesize(
    config: &RsyslogRelpConfig,
    ctx: &ClusterContext,
) -> artifacts::Result<ArtifactSet> {
    let mut set = ArtifactSet::new();

    set.add_file(
        paths::STAGED_CONFIG,
        FileMode::Public,
        ArtifactSource::plain(rsyslog::render_forwarder_config(config, ctx)?),
    )?;

    audit::add_audit_rules(&mut set, config, ctx)?;

    if let Some(tls) = config.enabled_tls() {
        let reference = tls.secret_reference_name.as_deref().unwrap_or_default();
        let secret_name = ctx.object_name(reference).ok_or_else(|| {
            SynthesisError::UnresolvedReference {
                field: "tls.secretReferenceName",
                reference: reference.to_string(),
            }
        })?;
        for (key, path) in TLS_FILES {
            set.add_file(
                path,
                FileMode::Private,
                ArtifactSource::secret_key(secret_name, key),
            )?;
        }
    }

    set.add_file(
        paths::APPLY_SCRIPT,
        FileMode::Executable,
        ArtifactSource::plain(scripts::apply_script(config.audit_enabled())?),
    )?;
    set.add_file(
        paths::PSTATS_SCRIPT,
        FileMode::Executable,
        ArtifactSource::plain(scripts::PSTATS_SCRIPT),
    )?;
    set.add_file(
        paths::MEMORY_LIMITS_DROP_IN,
        FileMode::Public,
        ArtifactSource::plain(scripts::MEMORY_LIMITS_DROP_IN),
    )?;

    set.add_unit(scripts::configurator_unit()?)?;

    Ok(set)
}
