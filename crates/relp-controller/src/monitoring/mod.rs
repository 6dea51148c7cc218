//! Observability wiring
//!
//! Per tenant namespace the controller maintains a Prometheus rule group, a
//! scrape config, and a dashboard ConfigMap. They are created on enable,
//! upserted on change, and deleted on disable.

pub mod alerts;
pub mod dashboard;
pub mod scrape;

use crate::tasks::config::MonitoringConfig;
use k8s_openapi::api::core::v1::ConfigMap;
use kube::api::{ApiResource, GroupVersionKind};
use serde_json::{json, Value};

/// Name shared by the rule group and the scrape config.
pub const MONITORING_NAME: &str = "rsyslog-relp";

/// A namespaced object of some kind, applied by name.
#[derive(Debug, Clone, PartialEq)]
pub struct ManagedObject {
    pub resource: ApiResource,
    pub name: String,
    pub body: Value,
}

impl ManagedObject {
    /// Kind and name, for logs.
    #[must_use]
    pub fn describe(&self) -> String {
        format!("{}/{}", self.resource.kind, self.name)
    }
}

fn prometheus_rule_resource() -> ApiResource {
    ApiResource::from_gvk(&GroupVersionKind::gvk(
        "monitoring.coreos.com",
        "v1",
        "PrometheusRule",
    ))
}

fn scrape_config_resource() -> ApiResource {
    ApiResource::from_gvk(&GroupVersionKind::gvk(
        "monitoring.coreos.com",
        "v1alpha1",
        "ScrapeConfig",
    ))
}

fn labels() -> Value {
    json!({
        "app.kubernetes.io/managed-by": "relp-controller",
        "prometheus": "tenant",
    })
}

/// Objects to apply for a tenant.
pub fn monitoring_objects(
    namespace: &str,
    audit_enabled: bool,
    config: &MonitoringConfig,
) -> Result<Vec<ManagedObject>, serde_json::Error> {
    let rule_resource = prometheus_rule_resource();
    let rules: Vec<Value> = alerts::alert_rules(audit_enabled)
        .iter()
        .map(alerts::AlertRule::to_rule)
        .collect();
    let prometheus_rule = json!({
        "apiVersion": rule_resource.api_version,
        "kind": rule_resource.kind,
        "metadata": { "name": MONITORING_NAME, "namespace": namespace, "labels": labels() },
        "spec": {
            "groups": [{ "name": "rsyslog-relp.rules", "rules": rules }]
        }
    });

    let scrape_resource = scrape_config_resource();
    let scrape_config = json!({
        "apiVersion": scrape_resource.api_version,
        "kind": scrape_resource.kind,
        "metadata": { "name": MONITORING_NAME, "namespace": namespace, "labels": labels() },
        "spec": scrape::scrape_config_spec(config)
    });

    let dashboard = serde_json::to_value(dashboard::dashboard_config_map(namespace)?)?;

    Ok(vec![
        ManagedObject {
            resource: rule_resource,
            name: MONITORING_NAME.to_string(),
            body: prometheus_rule,
        },
        ManagedObject {
            resource: scrape_resource,
            name: MONITORING_NAME.to_string(),
            body: scrape_config,
        },
        ManagedObject {
            resource: ApiResource::erase::<ConfigMap>(&()),
            name: dashboard::DASHBOARD_NAME.to_string(),
            body: dashboard,
        },
    ])
}

/// Identities of every object [`monitoring_objects`] may create, for removal.
#[must_use]
pub fn monitoring_object_refs() -> Vec<(ApiResource, String)> {
    vec![
        (prometheus_rule_resource(), MONITORING_NAME.to_string()),
        (scrape_config_resource(), MONITORING_NAME.to_string()),
        (
            ApiResource::erase::<ConfigMap>(&()),
            dashboard::DASHBOARD_NAME.to_string(),
        ),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_rule_scrape_and_dashboard() {
        let objects = monitoring_objects("shoot--dev--logging", true, &MonitoringConfig::default())
            .unwrap();
        let kinds: Vec<&str> = objects.iter().map(|o| o.resource.kind.as_str()).collect();
        assert_eq!(kinds, ["PrometheusRule", "ScrapeConfig", "ConfigMap"]);
        assert_eq!(objects[0].body["apiVersion"], "monitoring.coreos.com/v1");
        assert_eq!(objects[0].resource.plural, "prometheusrules");
        assert_eq!(
            objects[0].body["spec"]["groups"][0]["rules"]
                .as_array()
                .unwrap()
                .len(),
            3
        );
        assert_eq!(objects[1].body["metadata"]["namespace"], "shoot--dev--logging");
    }

    #[test]
    fn removal_refs_cover_created_objects() {
        let created = monitoring_objects("ns", false, &MonitoringConfig::default()).unwrap();
        let refs = monitoring_object_refs();
        for (object, (resource, name)) in created.iter().zip(refs.iter()) {
            assert_eq!(&object.resource, resource);
            assert_eq!(&object.name, name);
        }
    }
}
