//! Node program tests
//!
//! Runs the apply, cleanup and stats scripts with `sh` against a throwaway
//! node filesystem. `NODE_ROOT` points the scripts at the sandbox and stub
//! `systemctl` / `augenrules` binaries on `PATH` record what would have been
//! restarted or loaded.

#![cfg(unix)]
#![allow(clippy::missing_panics_doc)]

use relp_controller::apis::{set_defaults, LoggingRule, RsyslogRelpConfig};
use relp_controller::cleanup::CLEANUP_SCRIPT;
use relp_controller::synthesis::{paths, synthesize, ArtifactSet};
use relp_controller::ClusterContext;
use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use tempfile::TempDir;

const SYSTEMCTL_STUB: &str = r#"#!/bin/sh
echo "$*" >> "$STUB_DIR/systemctl.log"
case "$*" in
  *systemd-journald-audit.socket*)
    case "$1" in
      is-enabled) cat "$STUB_DIR/socket-state" 2> /dev/null || echo enabled ;;
      mask) echo masked > "$STUB_DIR/socket-state" ;;
      unmask) echo disabled > "$STUB_DIR/socket-state" ;;
      enable) echo enabled > "$STUB_DIR/socket-state" ;;
      disable) echo disabled > "$STUB_DIR/socket-state" ;;
    esac
    ;;
esac
exit 0
"#;

const AUGENRULES_STUB: &str = r#"#!/bin/sh
echo "$*" >> "$STUB_DIR/augenrules.log"
exit 0
"#;

const ORIGINAL_RULES: &str = "-w /etc/shadow -p wa -k shadow\n";

struct Node {
    root: TempDir,
    stubs: TempDir,
}

impl Node {
    fn new() -> Self {
        let stubs = TempDir::new().unwrap();
        for (name, body) in [("systemctl", SYSTEMCTL_STUB), ("augenrules", AUGENRULES_STUB)] {
            let path = stubs.path().join(name);
            fs::write(&path, body).unwrap();
            fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
        }
        Self {
            root: TempDir::new().unwrap(),
            stubs,
        }
    }

    fn path(&self, absolute: &str) -> PathBuf {
        self.root.path().join(absolute.trim_start_matches('/'))
    }

    fn write(&self, absolute: &str, content: &str) {
        let target = self.path(absolute);
        fs::create_dir_all(target.parent().unwrap()).unwrap();
        fs::write(target, content).unwrap();
    }

    fn read(&self, absolute: &str) -> String {
        fs::read_to_string(self.path(absolute)).unwrap()
    }

    /// A node as provisioned: original audit rules, disabled audit syslog
    /// plugin and an active journald audit socket.
    fn provisioned() -> Self {
        let node = Self::new();
        node.write("/etc/audit/rules.d/audit.rules", ORIGINAL_RULES);
        node.write("/etc/audit/plugins.d/syslog.conf", "active = no\ndirection = out\n");
        node.write("/lib/systemd/system/systemd-journald-audit.socket", "[Socket]\n");
        node
    }

    /// Writes what the distribution agent would deliver for `set`.
    fn deliver(&self, set: &ArtifactSet) {
        for artifact in set.files() {
            let target = self.path(&artifact.path);
            fs::create_dir_all(target.parent().unwrap()).unwrap();
            let bytes = artifact
                .source
                .inline_bytes()
                .expect("test sets carry inline artifacts only");
            fs::write(&target, bytes).unwrap();
            fs::set_permissions(
                &target,
                fs::Permissions::from_mode(artifact.permissions.into()),
            )
            .unwrap();
        }
        for unit in set.units() {
            self.write(&format!("/etc/systemd/system/{}", unit.name), &unit.content);
        }
    }

    fn run(&self, script: &Path, stdin: Option<&str>) -> String {
        let path = format!(
            "{}:{}",
            self.stubs.path().display(),
            std::env::var("PATH").unwrap_or_default()
        );
        let mut child = Command::new("sh")
            .arg(script)
            .env("NODE_ROOT", self.root.path())
            .env("STUB_DIR", self.stubs.path())
            .env("PATH", path)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .unwrap();
        {
            let mut pipe = child.stdin.take().unwrap();
            if let Some(input) = stdin {
                pipe.write_all(input.as_bytes()).unwrap();
            }
        }
        let output = child.wait_with_output().unwrap();
        assert!(
            output.status.success(),
            "{} failed: {}",
            script.display(),
            String::from_utf8_lossy(&output.stderr)
        );
        String::from_utf8_lossy(&output.stdout).into_owned()
    }

    fn apply(&self) -> String {
        self.run(&self.path(paths::APPLY_SCRIPT), None)
    }

    fn cleanup(&self) -> String {
        let script = self.stubs.path().join("clean-rsyslog-relp.sh");
        fs::write(&script, CLEANUP_SCRIPT).unwrap();
        self.run(&script, None)
    }

    fn systemctl_log(&self) -> String {
        fs::read_to_string(self.stubs.path().join("systemctl.log")).unwrap_or_default()
    }

    fn socket_state(&self) -> String {
        fs::read_to_string(self.stubs.path().join("socket-state"))
            .map(|s| s.trim().to_string())
            .unwrap_or_else(|_| "enabled".to_string())
    }

    /// Every path under the root with its content, directories as `None`.
    fn snapshot(&self) -> BTreeMap<PathBuf, Option<Vec<u8>>> {
        fn walk(dir: &Path, base: &Path, out: &mut BTreeMap<PathBuf, Option<Vec<u8>>>) {
            for entry in fs::read_dir(dir).unwrap() {
                let path = entry.unwrap().path();
                let relative = path.strip_prefix(base).unwrap().to_path_buf();
                if path.is_dir() {
                    out.insert(relative, None);
                    walk(&path, base, out);
                } else {
                    out.insert(relative, Some(fs::read(&path).unwrap()));
                }
            }
        }
        let mut out = BTreeMap::new();
        walk(self.root.path(), self.root.path(), &mut out);
        out
    }
}

fn minimal_config(audit_enabled: bool) -> RsyslogRelpConfig {
    let mut config = set_defaults(RsyslogRelpConfig {
        target: "10.2.64.54".to_string(),
        port: 80,
        logging_rules: vec![LoggingRule {
            program_names: vec!["test-program".to_string()],
            severity: Some(1),
            message_content: None,
        }],
        ..Default::default()
    });
    if let Some(audit) = config.audit_config.as_mut() {
        audit.enabled = audit_enabled;
    }
    config
}

fn minimal_set(audit_enabled: bool) -> ArtifactSet {
    synthesize(&minimal_config(audit_enabled), &ClusterContext::default()).unwrap()
}

#[test]
fn apply_installs_forwarder_and_audit_rules() {
    let node = Node::provisioned();
    node.deliver(&minimal_set(true));

    node.apply();

    assert_eq!(node.read(paths::LIVE_CONFIG), node.read(paths::STAGED_CONFIG));
    assert!(node.read(paths::LIVE_CONFIG).contains("$programname == [\"test-program\"]"));
    assert_eq!(
        node.read("/etc/audit/rules.d.original/audit.rules"),
        ORIGINAL_RULES
    );
    assert!(node.path("/etc/audit/rules.d/00-base-config.rules").exists());
    assert!(!node.path("/etc/audit/rules.d/audit.rules").exists());
    assert!(node.path(paths::SPOOL_DIR).is_dir());
    assert!(node
        .read("/etc/audit/plugins.d/syslog.conf")
        .starts_with("active = yes"));
    assert_eq!(node.socket_state(), "masked");

    let log = node.systemctl_log();
    assert!(log.contains("restart rsyslog"));
    assert!(log.contains("restart auditd"));
    assert!(node
        .read("/var/lib/node-exporter/textfile-collector/rsyslog_augenrules.prom")
        .contains("rsyslog_augenrules_load_success 1"));
}

#[test]
fn repeated_apply_is_quiet() {
    let node = Node::provisioned();
    node.deliver(&minimal_set(true));
    node.apply();
    let restarts = |log: String| log.lines().filter(|l| l.starts_with("restart")).count();
    let first = restarts(node.systemctl_log());

    node.apply();

    assert_eq!(restarts(node.systemctl_log()), first);
    assert_eq!(node.read(paths::LIVE_CONFIG), node.read(paths::STAGED_CONFIG));
}

#[test]
fn memory_limits_reload_systemd_when_changed() {
    let node = Node::provisioned();
    node.deliver(&minimal_set(true));
    let reloads = |log: &str| log.lines().filter(|l| *l == "daemon-reload").count();

    node.apply();
    let log = node.systemctl_log();
    assert_eq!(reloads(&log), 1);
    let reload_at = log.find("daemon-reload").unwrap();
    let restart_at = log.find("restart rsyslog").unwrap();
    assert!(reload_at < restart_at, "{log}");

    node.apply();
    assert_eq!(reloads(&node.systemctl_log()), 1);

    let drop_in = node.read(paths::MEMORY_LIMITS_DROP_IN);
    node.write(paths::MEMORY_LIMITS_DROP_IN, &format!("{drop_in}# tuned\n"));
    node.apply();
    let log = node.systemctl_log();
    assert_eq!(reloads(&log), 2);
    assert_eq!(log.matches("restart rsyslog").count(), 2);
}

#[test]
fn backup_reflects_state_before_first_apply() {
    let node = Node::provisioned();
    node.deliver(&minimal_set(true));

    for round in 0..3 {
        node.write(
            &format!("{}/99-round-{round}.rules", paths::STAGED_AUDIT_RULES_DIR),
            "-a always,exit -F arch=b64 -S mount\n",
        );
        node.apply();
    }

    let backup: Vec<_> = fs::read_dir(node.path(paths::AUDIT_RULES_BACKUP_DIR))
        .unwrap()
        .map(|e| e.unwrap().file_name().into_string().unwrap())
        .collect();
    assert_eq!(backup, ["audit.rules"]);
    assert_eq!(
        node.read("/etc/audit/rules.d.original/audit.rules"),
        ORIGINAL_RULES
    );
    assert!(node.path("/etc/audit/rules.d/99-round-2.rules").exists());
}

#[test]
fn backup_marker_is_created_without_live_rules() {
    let node = Node::new();
    node.deliver(&minimal_set(true));

    node.apply();

    assert!(node.path(paths::AUDIT_RULES_BACKUP_DIR).is_dir());
    assert_eq!(
        fs::read_dir(node.path(paths::AUDIT_RULES_BACKUP_DIR))
            .unwrap()
            .count(),
        0
    );
}

#[test]
fn disabling_audit_restores_original_rules() {
    let node = Node::provisioned();
    node.deliver(&minimal_set(true));
    node.apply();

    fs::remove_dir_all(node.path(paths::STAGED_AUDIT_RULES_DIR)).unwrap();
    node.deliver(&minimal_set(false));
    node.apply();

    assert_eq!(node.read("/etc/audit/rules.d/audit.rules"), ORIGINAL_RULES);
    assert!(!node.path(paths::AUDIT_RULES_BACKUP_DIR).exists());
    assert!(!node
        .path("/var/lib/node-exporter/textfile-collector/rsyslog_augenrules.prom")
        .exists());
}

#[test]
fn cleanup_returns_node_to_original_state() {
    let node = Node::provisioned();
    node.deliver(&minimal_set(true));
    node.apply();

    node.cleanup();

    assert!(!node.path(paths::LIVE_CONFIG).exists());
    assert!(!node.path(paths::STAGING_DIR).exists());
    assert!(!node.path(paths::SPOOL_DIR).exists());
    assert!(!node.path(paths::MEMORY_LIMITS_DROP_IN).exists());
    assert!(!node
        .path("/etc/systemd/system/rsyslog-configurator.service")
        .exists());
    assert!(!node.path(paths::AUDIT_RULES_BACKUP_DIR).exists());
    assert_eq!(node.read("/etc/audit/rules.d/audit.rules"), ORIGINAL_RULES);
    assert!(node
        .read("/etc/audit/plugins.d/syslog.conf")
        .starts_with("active = no"));
    assert_eq!(node.socket_state(), "enabled");
}

#[test]
fn cleanup_is_idempotent() {
    let node = Node::provisioned();
    node.deliver(&minimal_set(true));
    node.apply();
    node.cleanup();
    let once = node.snapshot();

    node.cleanup();

    assert_eq!(node.snapshot(), once);
}

#[test]
fn cleanup_on_unconfigured_node_changes_nothing() {
    let node = Node::provisioned();
    let before = node.snapshot();

    node.cleanup();

    assert_eq!(node.snapshot(), before);
    let log = node.systemctl_log();
    assert!(!log.contains("restart"));
    assert!(!log.contains("daemon-reload"));
}

#[test]
fn pstats_records_action_counters() {
    let node = Node::new();
    node.deliver(&minimal_set(true));

    let input = concat!(
        "{ \"name\": \"rsyslog-relp\", \"origin\": \"core.action\", \"processed\": 120, \"failed\": 3, \"suspended\": 0 }\n",
        "{ \"name\": \"imuxsock\", \"origin\": \"imuxsock\", \"submitted\": 44 }\n",
        "{ \"name\": \"rsyslog-relp\", \"origin\": \"core.action\", \"processed\": 150, \"failed\": 3, \"suspended\": 0 }\n",
    );
    node.run(&node.path(paths::PSTATS_SCRIPT), Some(input));

    let metrics = node.read("/var/lib/node-exporter/textfile-collector/rsyslog_pstats.prom");
    assert!(metrics
        .contains("rsyslog_pstat_processed{origin=\"core.action\",name=\"rsyslog-relp\"} 150"));
    assert!(metrics.contains("rsyslog_pstat_failed{origin=\"core.action\",name=\"rsyslog-relp\"} 3"));
    assert!(!metrics.contains("imuxsock"));
}
