//! Node programs and systemd wiring
//!
//! The apply script and the stats pass-through script are plain POSIX shell.
//! Both honour an optional `NODE_ROOT` prefix, which is unset on real nodes.

use super::artifacts::{Result, UnitDef};
use super::paths;
use super::templates::{self, APPLY_SCRIPT, CONFIGURATOR_UNIT};
use serde_json::json;

/// Systemd unit that runs the apply script.
pub const CONFIGURATOR_UNIT_NAME: &str = "rsyslog-configurator.service";

pub const PSTATS_SCRIPT: &str = include_str!("../../templates/node/process_rsyslog_pstats.sh");

pub const MEMORY_LIMITS_DROP_IN: &str =
    include_str!("../../templates/node/10-rsyslog-relp-memory-limits.conf");

/// Renders the apply script; audit handling is fixed at synthesis time.
pub fn apply_script(audit_enabled: bool) -> Result<String> {
    templates::render(APPLY_SCRIPT, &json!({ "audit_enabled": audit_enabled }))
}

pub fn configurator_unit() -> Result<UnitDef> {
    let content = templates::render(
        CONFIGURATOR_UNIT,
        &json!({ "apply_script": paths::APPLY_SCRIPT }),
    )?;
    Ok(UnitDef {
        name: CONFIGURATOR_UNIT_NAME.to_string(),
        enable: true,
        content,
    })
}
