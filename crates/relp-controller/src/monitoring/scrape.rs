//! Scrape target for the node exporter textfile metrics
//!
//! The scraper cannot reach tenant nodes directly. Targets are discovered via
//! the node exporter endpoints and rewritten to the API server's pod proxy
//! path; only series with the forwarder prefix are kept.

use crate::tasks::config::MonitoringConfig;
use serde_json::{json, Value};

/// Prefix of every series the extension exports.
pub const METRIC_PREFIX: &str = "rsyslog_";

/// Namespace of the node exporter inside the tenant cluster.
const NODE_EXPORTER_NAMESPACE: &str = "kube-system";

/// `ScrapeConfig` spec for one tenant.
#[must_use]
pub fn scrape_config_spec(config: &MonitoringConfig) -> Value {
    json!({
        "honorLabels": false,
        "scheme": "HTTPS",
        "tlsConfig": {
            "ca": { "secret": { "name": "ca", "key": "bundle.crt" } }
        },
        "authorization": {
            "type": "Bearer",
            "credentials": { "name": "shoot-access-prometheus-shoot", "key": "token" }
        },
        "kubernetesSDConfigs": [{
            "role": "Endpoints",
            "apiServer": format!("https://{}", config.api_server_address),
            "namespaces": { "names": [NODE_EXPORTER_NAMESPACE] },
            "tlsConfig": {
                "ca": { "secret": { "name": "ca", "key": "bundle.crt" } }
            },
            "authorization": {
                "type": "Bearer",
                "credentials": { "name": "shoot-access-prometheus-shoot", "key": "token" }
            }
        }],
        "relabelings": [
            {
                "sourceLabels": ["__meta_kubernetes_service_name", "__meta_kubernetes_endpoint_port_name"],
                "regex": format!("{};{}", config.node_exporter_service, config.node_exporter_port),
                "action": "keep"
            },
            {
                "sourceLabels": ["__meta_kubernetes_pod_node_name"],
                "targetLabel": "node"
            },
            {
                "targetLabel": "__address__",
                "replacement": config.api_server_address
            },
            {
                "sourceLabels": ["__meta_kubernetes_pod_name", "__meta_kubernetes_endpoint_port_number"],
                "regex": "(.+);(.+)",
                "targetLabel": "__metrics_path__",
                "replacement": format!("/api/v1/namespaces/{NODE_EXPORTER_NAMESPACE}/pods/${{1}}:${{2}}/proxy/metrics")
            }
        ],
        "metricRelabelings": [{
            "sourceLabels": ["__name__"],
            "regex": format!("{METRIC_PREFIX}.*"),
            "action": "keep"
        }]
    })
}
