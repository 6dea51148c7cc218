//! Forwarder configuration rendering
//!
//! Produces the rsyslog configuration for one tenant: a fixed preamble, one
//! `omrelp` action wrapped in a ruleset, and one `if ... then` block per
//! logging rule that calls that ruleset. Rules are rendered in declared order,
//! so the first matching rule forwards the message.

use super::artifacts::Result;
use super::paths;
use super::templates::{self, FORWARDER_CONFIG};
use crate::apis::{LoggingRule, RsyslogRelpConfig, TlsConfig};
use crate::crds::ClusterContext;
use serde_json::json;

/// Name of the RELP action; alerting selects forwarder stats by it.
pub const RELP_ACTION_NAME: &str = "rsyslog-relp";

/// Quotes `value` as a RainerScript string literal.
#[must_use]
pub fn quote(value: &str) -> String {
    let mut quoted = String::with_capacity(value.len() + 2);
    quoted.push('"');
    for c in value.chars() {
        match c {
            '\\' => quoted.push_str("\\\\"),
            '"' => quoted.push_str("\\\""),
            '\n' => quoted.push_str("\\n"),
            '\r' => quoted.push_str("\\r"),
            '\t' => quoted.push_str("\\t"),
            _ => quoted.push(c),
        }
    }
    quoted.push('"');
    quoted
}

fn quoted_list(values: &[String]) -> String {
    let items: Vec<String> = values.iter().map(|v| quote(v)).collect();
    format!("[{}]", items.join(","))
}

/// Filter expression of a single rule, its clauses joined with `and`.
#[must_use]
pub fn rule_expression(rule: &LoggingRule) -> String {
    let mut clauses = Vec::new();

    if !rule.program_names.is_empty() {
        clauses.push(format!("$programname == {}", quoted_list(&rule.program_names)));
    }
    if let Some(severity) = rule.severity {
        clauses.push(format!("$syslogseverity <= {severity}"));
    }
    if let Some(content) = &rule.message_content {
        if let Some(regex) = &content.regex {
            clauses.push(format!("re_match($msg, {}) == 1", quote(regex)));
        }
        if let Some(exclude) = &content.exclude {
            clauses.push(format!("re_match($msg, {}) == 0", quote(exclude)));
        }
    }

    clauses.join(" and ")
}

fn action_params(config: &RsyslogRelpConfig) -> Vec<String> {
    let mut params = vec![
        format!("target={}", quote(&config.target)),
        format!("port=\"{}\"", config.port),
        "Template=\"SyslogForwarderTemplate\"".to_string(),
    ];

    if let Some(interval) = config.rebind_interval {
        params.push(format!("rebindInterval=\"{interval}\""));
    }
    if let Some(timeout) = config.timeout {
        params.push(format!("timeout=\"{timeout}\""));
    }
    if let Some(count) = config.resume_retry_count {
        params.push(format!("action.resumeRetryCount=\"{count}\""));
    }
    if let Some(report) = config.report_suspension_continuation {
        let value = if report { "on" } else { "off" };
        params.push(format!("action.reportSuspensionContinuation=\"{value}\""));
    }

    params.extend([
        "queue.type=\"LinkedList\"".to_string(),
        "queue.size=\"100000\"".to_string(),
        "queue.filename=\"rsyslog-relp-queue\"".to_string(),
        format!("queue.spoolDirectory={}", quote(paths::SPOOL_DIR)),
        "queue.maxDiskSpace=\"512m\"".to_string(),
        "queue.saveOnShutdown=\"on\"".to_string(),
    ]);

    if let Some(tls) = config.enabled_tls() {
        params.extend(tls_params(tls));
    }

    params
}

fn tls_params(tls: &TlsConfig) -> Vec<String> {
    let mut params = vec![
        "tls=\"on\"".to_string(),
        format!("tls.caCert={}", quote(paths::TLS_CA_CERT)),
        format!("tls.myCert={}", quote(paths::TLS_CERT)),
        format!("tls.myPrivKey={}", quote(paths::TLS_KEY)),
    ];
    if let Some(mode) = &tls.auth_mode {
        params.push(format!("tls.authMode={}", quote(mode)));
    }
    if !tls.permitted_peer.is_empty() {
        params.push(format!("tls.permittedPeer={}", quoted_list(&tls.permitted_peer)));
    }
    params
}

/// Renders the complete forwarder configuration file.
pub fn render_forwarder_config(config: &RsyslogRelpConfig, ctx: &ClusterContext) -> Result<String> {
    let filters: Vec<String> = config.logging_rules.iter().map(rule_expression).collect();
    let tls_lib = config.enabled_tls().and_then(|tls| tls.tls_lib.clone());

    templates::render(
        FORWARDER_CONFIG,
        &json!({
            "spool_dir": paths::SPOOL_DIR,
            "pstats_script": paths::PSTATS_SCRIPT,
            "action_name": RELP_ACTION_NAME,
            "project_name": escape_inner(&ctx.project_name),
            "cluster_name": escape_inner(&ctx.cluster_name),
            "cluster_uid": escape_inner(&ctx.cluster_uid),
            "tls_lib": tls_lib,
            "action_params": action_params(config),
            "filters": filters,
        }),
    )
}

/// Escapes a value that the template places between existing quotes.
fn escape_inner(value: &str) -> String {
    let quoted = quote(value);
    quoted[1..quoted.len() - 1].to_string()
}
