//! Per-node cleanup job
//!
//! On opt-out the reconciler publishes a bundle holding a ConfigMap with the
//! teardown script and a DaemonSet that runs it on every node. The script runs
//! in an init container chrooted into the host filesystem; a pause container
//! then keeps each pod running so that "ready on every node" means "cleaned on
//! every node".

use crate::tasks::config::ImagesConfig;
use k8s_openapi::api::{apps::v1::DaemonSet, core::v1::ConfigMap};
use serde_json::{json, Value};
use sha2::{Digest, Sha256};

pub const CLEANUP_SCRIPT: &str = include_str!("../../templates/cleanup/clean-rsyslog-relp.sh");

/// Name of the cleanup DaemonSet, its ConfigMap, and its distribution bundle.
pub const CLEANER_NAME: &str = "rsyslog-relp-configuration-cleaner";

/// Namespace inside the tenant cluster the cleanup workload runs in.
pub const CLEANER_NAMESPACE: &str = "kube-system";

const SCRIPT_KEY: &str = "clean-rsyslog-relp.sh";
const SCRIPTS_MOUNT: &str = "/scripts";
const HOST_ROOT_MOUNT: &str = "/host";

fn labels() -> Value {
    json!({
        "app.kubernetes.io/name": CLEANER_NAME,
        "app.kubernetes.io/managed-by": "relp-controller",
    })
}

fn script_config_map() -> Result<ConfigMap, serde_json::Error> {
    serde_json::from_value(json!({
        "apiVersion": "v1",
        "kind": "ConfigMap",
        "metadata": {
            "name": CLEANER_NAME,
            "namespace": CLEANER_NAMESPACE,
            "labels": labels(),
        },
        "data": {
            (SCRIPT_KEY): CLEANUP_SCRIPT,
        }
    }))
}

fn daemon_set(images: &ImagesConfig) -> Result<DaemonSet, serde_json::Error> {
    let script_checksum = hex::encode(Sha256::digest(CLEANUP_SCRIPT.as_bytes()));
    let command = format!("chroot {HOST_ROOT_MOUNT} /bin/sh < {SCRIPTS_MOUNT}/{SCRIPT_KEY}");

    serde_json::from_value(json!({
        "apiVersion": "apps/v1",
        "kind": "DaemonSet",
        "metadata": {
            "name": CLEANER_NAME,
            "namespace": CLEANER_NAMESPACE,
            "labels": labels(),
        },
        "spec": {
            "selector": {
                "matchLabels": { "app.kubernetes.io/name": CLEANER_NAME }
            },
            "updateStrategy": { "type": "RollingUpdate" },
            "template": {
                "metadata": {
                    "labels": labels(),
                    "annotations": { "checksum/script": script_checksum }
                },
                "spec": {
                    "hostPID": true,
                    "priorityClassName": "system-node-critical",
                    "tolerations": [{ "operator": "Exists" }],
                    "initContainers": [{
                        "name": CLEANER_NAME,
                        "image": images.cleaner.reference(),
                        "imagePullPolicy": "IfNotPresent",
                        "command": ["sh", "-c", command],
                        "securityContext": { "privileged": true },
                        "resources": {
                            "requests": { "cpu": "10m", "memory": "16Mi" },
                            "limits": { "memory": "64Mi" }
                        },
                        "volumeMounts": [
                            { "name": "host-root-volume", "mountPath": HOST_ROOT_MOUNT },
                            { "name": "scripts", "mountPath": SCRIPTS_MOUNT, "readOnly": true }
                        ]
                    }],
                    "containers": [{
                        "name": "pause",
                        "image": images.pause.reference(),
                        "imagePullPolicy": "IfNotPresent",
                        "resources": {
                            "requests": { "cpu": "1m", "memory": "4Mi" },
                            "limits": { "memory": "16Mi" }
                        },
                        "securityContext": { "allowPrivilegeEscalation": false }
                    }],
                    "volumes": [
                        { "name": "host-root-volume", "hostPath": { "path": "/" } },
                        {
                            "name": "scripts",
                            "configMap": { "name": CLEANER_NAME, "defaultMode": 0o744 }
                        }
                    ]
                }
            }
        }
    }))
}

/// Manifests of the cleanup bundle, in apply order.
pub fn cleaner_manifests(images: &ImagesConfig) -> Result<Vec<Value>, serde_json::Error> {
    Ok(vec![
        serde_json::to_value(script_config_map()?)?,
        serde_json::to_value(daemon_set(images)?)?,
    ])
}
