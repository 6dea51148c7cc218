use k8s_openapi::api::core::v1::ConfigMap;
use serde_json::json;

pub const DASHBOARD_JSON: &str = include_str!("../../templates/monitoring/rsyslog-relp-dashboard.json");

/// Label the dashboard sidecar selects ConfigMaps by.
pub const DASHBOARD_LABEL: &str = "dashboard.monitoring.platform/tenant";

pub const DASHBOARD_NAME: &str = "rsyslog-relp-dashboard";

pub fn dashboard_config_map(namespace: &str) -> Result<ConfigMap, serde_json::Error> {
    serde_json::from_value(json!({
        "apiVersion": "v1",
        "kind": "ConfigMap",
        "metadata": {
            "name": DASHBOARD_NAME,
            "namespace": namespace,
            "labels": {
                (DASHBOARD_LABEL): "true",
                "app.kubernetes.io/managed-by": "relp-controller",
            }
        },
        "data": {
            "rsyslog-relp.json": DASHBOARD_JSON,
        }
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dashboard_is_valid_json_and_labelled() {
        let dashboard: serde_json::Value = serde_json::from_str(DASHBOARD_JSON).unwrap();
        assert_eq!(dashboard["uid"], "rsyslog-relp");

        let cm = dashboard_config_map("shoot--dev--logging").unwrap();
        assert_eq!(
            cm.metadata.labels.unwrap().get(DASHBOARD_LABEL).map(String::as_str),
            Some("true")
        );
    }
}
