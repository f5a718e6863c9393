//! Config load/save integration tests.
//! Layout: ~/.keel/agent.yaml

use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use assert_fs::prelude::*;
use keel_core::{
    config::{self, AgentConfig, CommandSettings},
    ConfigApplyRequest, ConfigError, FileAction, InstanceId,
};
use predicates::prelude::predicate;
use rstest::rstest;

fn write_config(home: &assert_fs::TempDir, yaml: &str) {
    home.child(".keel/agent.yaml")
        .write_str(yaml)
        .expect("write agent.yaml");
}

// ---------------------------------------------------------------------------
// 1. Load
// ---------------------------------------------------------------------------

#[test]
fn load_missing_config_returns_not_found() {
    let home = assert_fs::TempDir::new().expect("tempdir");
    let err = config::load_at(home.path()).unwrap_err();
    assert!(matches!(err, ConfigError::NotFound { .. }), "got: {err}");
    assert!(err.to_string().contains("agent.yaml"));
}

#[test]
fn load_corrupt_yaml_returns_parse_error_with_path() {
    let home = assert_fs::TempDir::new().expect("tempdir");
    write_config(&home, ": : corrupt : yaml : !!!\n  - broken: [unclosed");

    let err = config::load_at(home.path()).unwrap_err();
    assert!(matches!(err, ConfigError::Parse { .. }), "got: {err}");
    assert!(err.to_string().contains("agent.yaml"), "must contain file path, got: {err}");
}

#[test]
fn load_full_config_parses_humantime_durations() {
    let home = assert_fs::TempDir::new().expect("tempdir");
    write_config(
        &home,
        r#"
instance_id: nginx-1
allowed_directories:
  - /etc/nginx
  - /usr/share/nginx
common:
  initial_interval: 50ms
  max_interval: 1s
  max_elapsed_time: 10s
  multiplier: 2.0
  randomization_factor: 0.0
command:
  server_url: http://127.0.0.1:8981
config_apply:
  timeout: 2m
  rollback_on_failure: true
"#,
    );

    let loaded = config::load_at(home.path()).expect("load");
    assert_eq!(loaded.instance_id, InstanceId::from("nginx-1"));
    assert_eq!(
        loaded.allowed_directories,
        vec![PathBuf::from("/etc/nginx"), PathBuf::from("/usr/share/nginx")]
    );
    assert_eq!(loaded.common.initial_interval, Duration::from_millis(50));
    assert_eq!(loaded.common.max_interval, Duration::from_secs(1));
    assert_eq!(loaded.common.max_elapsed_time, Duration::from_secs(10));
    assert_eq!(loaded.common.multiplier, 2.0);
    assert_eq!(loaded.common.randomization_factor, 0.0);
    assert_eq!(
        loaded.command,
        Some(CommandSettings {
            server_url: "http://127.0.0.1:8981".to_string()
        })
    );
    assert_eq!(loaded.config_apply.timeout, Duration::from_secs(120));
    assert!(loaded.config_apply.rollback_on_failure);
}

#[test]
fn load_sparse_config_fills_defaults() {
    let home = assert_fs::TempDir::new().expect("tempdir");
    write_config(&home, "allowed_directories: [/etc/app]\n");

    let loaded = config::load_at(home.path()).expect("load");
    let defaults = AgentConfig::default();
    assert_eq!(loaded.common, defaults.common);
    assert_eq!(loaded.config_apply, defaults.config_apply);
    assert!(loaded.command.is_none());
    assert!(loaded.is_directory_allowed("/etc/app/a.conf"));
}

#[test]
fn load_rejects_invalid_values() {
    let home = assert_fs::TempDir::new().expect("tempdir");
    write_config(&home, "allowed_directories: [relative/dir]\n");

    let err = config::load_at(home.path()).unwrap_err();
    assert!(matches!(err, ConfigError::Invalid(_)), "got: {err}");
}

// ---------------------------------------------------------------------------
// 2. Save (atomic)
// ---------------------------------------------------------------------------

#[test]
fn save_creates_keel_dir_and_roundtrips() {
    let home = assert_fs::TempDir::new().expect("tempdir");
    let cfg = AgentConfig {
        instance_id: InstanceId::from("nginx-1"),
        allowed_directories: vec![PathBuf::from("/etc/nginx")],
        ..AgentConfig::default()
    };

    config::save_at(home.path(), &cfg).expect("save");
    home.child(".keel/agent.yaml").assert(predicate::path::exists());
    home.child(".keel/agent.yaml.tmp")
        .assert(predicate::path::missing());

    let loaded = config::load_at(home.path()).expect("load");
    assert_eq!(loaded, cfg);
}

#[test]
fn save_overwrites_existing_config() {
    let home = assert_fs::TempDir::new().expect("tempdir");
    write_config(&home, "instance_id: old\n");

    let cfg = AgentConfig {
        instance_id: InstanceId::from("new"),
        ..AgentConfig::default()
    };
    config::save_at(home.path(), &cfg).expect("save");

    let raw = fs::read_to_string(home.path().join(".keel/agent.yaml")).expect("read");
    assert!(raw.contains("instance_id: new"), "got: {raw}");
}

// ---------------------------------------------------------------------------
// 3. Allow-list
// ---------------------------------------------------------------------------

#[rstest]
#[case("/etc/nginx/nginx.conf", true)]
#[case("/etc/nginx/conf.d/site.conf", true)]
#[case("/etc/nginx", true)]
#[case("/etc/nginx-extra/x.conf", false)]
#[case("/etc/nginx/../passwd", false)]
#[case("/etc/nginx/./conf.d/../nginx.conf", true)]
#[case("etc/nginx/nginx.conf", false)]
#[case("/var/log/nginx/access.log", false)]
fn allow_list_matches_whole_components(#[case] path: &str, #[case] allowed: bool) {
    let config = AgentConfig {
        allowed_directories: vec![PathBuf::from("/etc/nginx")],
        ..AgentConfig::default()
    };
    assert_eq!(config.is_directory_allowed(path), allowed, "{path}");
}

// ---------------------------------------------------------------------------
// 4. Request wire shape
// ---------------------------------------------------------------------------

#[test]
fn apply_request_json_fills_file_defaults() {
    let json = r#"{
        "correlation_id": "c-1",
        "overview": {
            "files": [{ "meta": { "path": "/etc/nginx/nginx.conf" }, "action": "update" }],
            "config_version": { "instance_id": "nginx-1", "version": "v3" }
        }
    }"#;
    let request: ConfigApplyRequest = serde_json::from_str(json).expect("parse request");
    let overview = request.overview.expect("overview");

    assert_eq!(request.correlation_id, "c-1");
    assert_eq!(overview.config_version.instance_id, InstanceId::from("nginx-1"));
    let file = &overview.files[0];
    assert_eq!(file.action, FileAction::Update);
    assert_eq!(file.meta.permissions, "0644");
    assert_eq!(file.meta.mode(), Some(0o644));
    assert!(file.meta.content_hash.is_empty());
}

#[test]
fn apply_request_without_overview_parses_as_none() {
    let request: ConfigApplyRequest =
        serde_json::from_str(r#"{"correlation_id":"c-2","overview":null}"#).expect("parse");
    assert!(request.overview.is_none());
}
