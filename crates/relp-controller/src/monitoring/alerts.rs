//! Alert rules over the forwarder metrics

use crate::synthesis::rsyslog::RELP_ACTION_NAME;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// Selector of the RELP action's stats series.
fn relp_action_selector() -> String {
    format!(r#"origin="core.action",name="{RELP_ACTION_NAME}""#)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertSeverity {
    Warning,
    Critical,
}

/// Alert definition
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlertRule {
    pub name: String,
    pub expr: String,
    /// How long the expression must hold, e.g. "15m"
    pub duration: String,
    pub severity: AlertSeverity,
    pub summary: String,
    pub description: String,
}

impl AlertRule {
    /// Prometheus rule-group entry.
    #[must_use]
    pub fn to_rule(&self) -> Value {
        json!({
            "alert": self.name,
            "expr": self.expr,
            "for": self.duration,
            "labels": {
                "severity": self.severity,
                "type": "shoot",
                "visibility": "owner",
            },
            "annotations": {
                "summary": self.summary,
                "description": self.description,
            }
        })
    }
}

/// Alerts for one tenant; the audit alert only exists when audit forwarding is on.
#[must_use]
pub fn alert_rules(audit_enabled: bool) -> Vec<AlertRule> {
    let selector = relp_action_selector();
    let processed = format!("rsyslog_pstat_processed{{{selector}}}");
    let failed = format!("rsyslog_pstat_failed{{{selector}}}");

    let mut rules = vec![
        AlertRule {
            name: "RsyslogTooManyRelpActionFailures".to_string(),
            expr: format!(
                "sum(rate({failed}[5m])) / sum(rate({processed}[5m])) > 0.02"
            ),
            duration: "15m".to_string(),
            severity: AlertSeverity::Warning,
            summary: "Rsyslog RELP action fails to forward messages".to_string(),
            description: "More than 2% of the messages handled by the rsyslog RELP action failed during the last 15 minutes.".to_string(),
        },
        AlertRule {
            name: "RsyslogRelpActionProcessingRateIsZero".to_string(),
            expr: format!("rate({processed}[5m]) == 0"),
            duration: "15m".to_string(),
            severity: AlertSeverity::Warning,
            summary: "Rsyslog RELP action processes no messages".to_string(),
            description: "The rsyslog RELP action on node {{$labels.node}} has not processed any messages for 15 minutes.".to_string(),
        },
    ];

    if audit_enabled {
        rules.push(AlertRule {
            name: "RsyslogRelpAuditRulesNotLoadedSuccessfully".to_string(),
            expr: "absent(rsyslog_augenrules_load_success == 1)".to_string(),
            duration: "15m".to_string(),
            severity: AlertSeverity::Warning,
            summary: "Audit rules were not loaded on a node".to_string(),
            description: "The audit rules configured for rsyslog RELP forwarding have not been loaded successfully for 15 minutes.".to_string(),
        });
    }

    rules
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn audit_alert_follows_audit_flag() {
        assert_eq!(alert_rules(false).len(), 2);
        let rules = alert_rules(true);
        assert_eq!(rules.len(), 3);
        assert!(rules[2].expr.contains("rsyslog_augenrules_load_success"));
    }

    #[test]
    fn failure_ratio_threshold_and_window() {
        let rule = &alert_rules(false)[0];
        assert!(rule.expr.contains("[5m]"));
        assert!(rule.expr.contains("0.02"));
        assert!(rule
            .expr
            .contains(r#"rsyslog_pstat_failed{origin="core.action",name="rsyslog-relp"}"#));
        assert_eq!(rule.duration, "15m");
    }

    #[test]
    fn renders_prometheus_rule_entry() {
        let value = alert_rules(false)[1].to_rule();
        assert_eq!(value["alert"], "RsyslogRelpActionProcessingRateIsZero");
        assert_eq!(value["for"], "15m");
        assert_eq!(value["labels"]["severity"], "warning");
    }
}
