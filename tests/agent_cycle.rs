//! End-to-end agent cycle tests over an in-memory vault: materialization,
//! rotation, cache fallback, strict lookup, templates, and cancellation.

use std::os::unix::fs::PermissionsExt;
use std::path::PathBuf;
use std::time::Duration;

use serde_json::json;

use ksm_agent::config::{
    AgentConfig, AgentMode, AuthConfig, FolderReference, OutputFormat, Reference, RetryConfig,
    RotationConfig,
};
use ksm_agent::runtime::Agent;
use ksm_agent::vault::mock::MockKsm;
use ksm_agent::vault::record::{Field, Folder, Record};

fn login_record(uid: &str, title: &str, pairs: &[(&str, &str)]) -> Record {
    Record {
        uid: uid.into(),
        title: title.into(),
        record_type: "login".into(),
        notes: None,
        fields: pairs
            .iter()
            .map(|(field_type, value)| Field {
                field_type: field_type.to_string(),
                label: None,
                value: vec![json!(value)],
            })
            .collect(),
        custom: vec![],
        files: vec![],
        folder_uid: None,
        inner_folder_uid: None,
    }
}

fn reference(name: &str, output: PathBuf) -> Reference {
    Reference {
        name: name.into(),
        uid: None,
        title: None,
        folder_path: None,
        record_name: None,
        notation: None,
        field_selector: None,
        fields: None,
        output_path: output,
        format: OutputFormat::Json,
        template: None,
        k8s_secret: None,
        k8s_secret_keys: None,
    }
}

fn config(mode: AgentMode, references: Vec<Reference>) -> AgentConfig {
    AgentConfig {
        mode,
        auth: AuthConfig::Secret {
            path: "/unused".into(),
        },
        refresh_interval: Duration::from_secs(15),
        cache_ttl: Duration::from_secs(86_400),
        fail_on_error: false,
        strict_lookup: false,
        listen_port: 0,
        retry: RetryConfig {
            max_attempts: 3,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(5),
        },
        rotation: RotationConfig::default(),
        references,
        folder_references: vec![],
    }
}

#[tokio::test]
async fn materializes_json_reference_with_restrictive_mode() {
    let dir = tempfile::tempdir().unwrap();
    let output = dir.path().join("demo");

    let mock = MockKsm::new();
    mock.set_records(vec![login_record("u1", "demo-secret", &[("password", "p1")])]);

    let mut r = reference("demo", output.clone());
    r.title = Some("demo-secret".into());
    let agent = Agent::with_client(config(AgentMode::Init, vec![r]), Box::new(mock));

    let report = agent.run_cycle(true).await.unwrap();
    assert_eq!(report.fresh, 1);
    assert_eq!(report.failed, 0);

    let contents = std::fs::read_to_string(&output).unwrap();
    assert_eq!(contents, "{\n  \"password\": \"p1\"\n}");
    let mode = std::fs::metadata(&output).unwrap().permissions().mode() & 0o777;
    assert_eq!(mode, 0o400);
}

#[tokio::test]
async fn rotation_updates_file_on_next_cycle() {
    let dir = tempfile::tempdir().unwrap();
    let output = dir.path().join("demo");

    let mock = MockKsm::new();
    mock.set_records(vec![login_record("u1", "demo-secret", &[("password", "p1")])]);

    let mut r = reference("demo", output.clone());
    r.title = Some("demo-secret".into());
    let agent = Agent::with_client(config(AgentMode::Sidecar, vec![r]), Box::new(mock.clone()));

    agent.run_cycle(true).await.unwrap();
    assert!(std::fs::read_to_string(&output).unwrap().contains("p1"));

    mock.set_records(vec![login_record("u1", "demo-secret", &[("password", "p2")])]);
    agent.run_cycle(false).await.unwrap();
    assert!(std::fs::read_to_string(&output).unwrap().contains("p2"));
}

#[tokio::test]
async fn unchanged_vault_produces_byte_identical_files() {
    let dir = tempfile::tempdir().unwrap();
    let output = dir.path().join("demo");

    let mock = MockKsm::new();
    mock.set_records(vec![login_record(
        "u1",
        "demo-secret",
        &[("login", "u"), ("password", "p1")],
    )]);

    let mut r = reference("demo", output.clone());
    r.title = Some("demo-secret".into());
    let agent = Agent::with_client(config(AgentMode::Sidecar, vec![r]), Box::new(mock));

    agent.run_cycle(true).await.unwrap();
    let first = std::fs::read(&output).unwrap();
    agent.run_cycle(false).await.unwrap();
    let second = std::fs::read(&output).unwrap();
    assert_eq!(first, second);
}

#[tokio::test]
async fn upstream_outage_serves_last_known_good_payload() {
    let dir = tempfile::tempdir().unwrap();
    let output = dir.path().join("demo");

    let mock = MockKsm::new();
    mock.set_records(vec![login_record("u1", "demo-secret", &[("password", "p1")])]);

    let mut r = reference("demo", output.clone());
    r.title = Some("demo-secret".into());
    let agent = Agent::with_client(config(AgentMode::Sidecar, vec![r]), Box::new(mock.clone()));
    let state = agent.server_state();

    agent.run_cycle(true).await.unwrap();
    state.mark_ready();

    // Three consecutive upstream errors exhaust the retry policy.
    mock.fail_times(3);
    let report = agent.run_cycle(false).await.unwrap();
    assert_eq!(report.from_cache, 1);
    assert_eq!(report.failed, 0);

    assert!(std::fs::read_to_string(&output).unwrap().contains("p1"));
    // Readiness is never revoked by a degraded cycle.
    assert!(state.is_ready());
}

#[tokio::test]
async fn outage_without_cache_skips_materialization() {
    let dir = tempfile::tempdir().unwrap();
    let output = dir.path().join("demo");

    let mock = MockKsm::new();
    mock.set_records(vec![login_record("u1", "demo-secret", &[("password", "p1")])]);
    mock.fail_times(3);

    let mut r = reference("demo", output.clone());
    r.title = Some("demo-secret".into());
    let agent = Agent::with_client(config(AgentMode::Sidecar, vec![r]), Box::new(mock));

    let report = agent.run_cycle(true).await.unwrap();
    assert_eq!(report.skipped, 1);
    assert!(!output.exists());
}

#[tokio::test]
async fn initial_failure_is_fatal_under_fail_on_error() {
    let dir = tempfile::tempdir().unwrap();

    let mock = MockKsm::new();
    mock.fail_times(3);

    let mut r = reference("demo", dir.path().join("demo"));
    r.title = Some("demo-secret".into());
    let mut cfg = config(AgentMode::Init, vec![r]);
    cfg.fail_on_error = true;
    let agent = Agent::with_client(cfg, Box::new(mock));

    assert!(agent.run_cycle(true).await.is_err());
}

#[tokio::test]
async fn ambiguous_strict_reference_fails_while_others_succeed() {
    let dir = tempfile::tempdir().unwrap();
    let dup_out = dir.path().join("dup");
    let ok_out = dir.path().join("ok");

    let mock = MockKsm::new();
    mock.set_records(vec![
        login_record("u1", "dup", &[("password", "a")]),
        login_record("u2", "dup", &[("password", "b")]),
        login_record("u3", "unique", &[("password", "c")]),
    ]);

    let mut dup = reference("dup", dup_out.clone());
    dup.title = Some("dup".into());
    let mut ok = reference("ok", ok_out.clone());
    ok.title = Some("unique".into());

    let mut cfg = config(AgentMode::Sidecar, vec![dup, ok]);
    cfg.strict_lookup = true;
    let agent = Agent::with_client(cfg, Box::new(mock));

    // The ambiguous reference produces nothing; the unique one succeeds
    // and the cycle completes normally.
    let report = agent.run_cycle(false).await.unwrap();
    assert_eq!(report.skipped, 1);
    assert_eq!(report.fresh, 1);
    assert!(!dup_out.exists());
    assert!(ok_out.exists());
}

#[tokio::test]
async fn notation_field_selector_writes_raw_scalar() {
    let dir = tempfile::tempdir().unwrap();
    let output = dir.path().join("pw");

    let mock = MockKsm::new();
    mock.set_folders(vec![
        Folder {
            uid: "f-prod".into(),
            name: "Production".into(),
            parent_uid: None,
        },
        Folder {
            uid: "f-db".into(),
            name: "Databases".into(),
            parent_uid: Some("f-prod".into()),
        },
    ]);
    let mut record = login_record("u1", "mysql-prod", &[("password", "hunter2")]);
    record.folder_uid = Some("f-db".into());
    mock.set_records(vec![record]);

    let mut r = reference("mysql", output.clone());
    r.notation = Some("Production/Databases/mysql-prod/field/password".into());
    let agent = Agent::with_client(config(AgentMode::Init, vec![r]), Box::new(mock));

    agent.run_cycle(true).await.unwrap();
    // Byte-for-byte the scalar value, no JSON wrapping.
    assert_eq!(std::fs::read(&output).unwrap(), b"hunter2");
}

#[tokio::test]
async fn template_reference_renders_connection_string() {
    let dir = tempfile::tempdir().unwrap();
    let output = dir.path().join("dsn");

    let mock = MockKsm::new();
    mock.set_records(vec![login_record(
        "u1",
        "db",
        &[("login", "u"), ("password", "p"), ("hostname", "h")],
    )]);

    let mut r = reference("dsn", output.clone());
    r.title = Some("db".into());
    r.template = Some("postgresql://{{ login }}:{{ password }}@{{ hostname }}:5432/db".into());
    let agent = Agent::with_client(config(AgentMode::Init, vec![r]), Box::new(mock));

    agent.run_cycle(true).await.unwrap();
    assert_eq!(
        std::fs::read_to_string(&output).unwrap(),
        "postgresql://u:p@h:5432/db"
    );
}

#[tokio::test]
async fn folder_reference_materializes_children_as_json_files() {
    let dir = tempfile::tempdir().unwrap();
    let out_dir = dir.path().join("team");

    let mock = MockKsm::new();
    mock.set_folders(vec![Folder {
        uid: "f".into(),
        name: "Team".into(),
        parent_uid: None,
    }]);
    let mut alpha = login_record("u1", "db one", &[("password", "pa")]);
    alpha.folder_uid = Some("f".into());
    let mut beta = login_record("u2", "db two", &[("password", "pb")]);
    beta.inner_folder_uid = Some("f".into());
    mock.set_records(vec![alpha, beta]);

    let mut cfg = config(AgentMode::Init, vec![]);
    cfg.folder_references = vec![FolderReference {
        name: "team".into(),
        uid: None,
        path: Some("Team".into()),
        output_dir: out_dir.clone(),
    }];
    let agent = Agent::with_client(cfg, Box::new(mock));

    let report = agent.run_cycle(true).await.unwrap();
    assert_eq!(report.fresh, 1);

    let alpha_json = std::fs::read_to_string(out_dir.join("db-one.json")).unwrap();
    assert!(alpha_json.contains("\"password\": \"pa\""));
    assert!(out_dir.join("db-two.json").exists());
    let mode = std::fs::metadata(&out_dir).unwrap().permissions().mode() & 0o777;
    assert_eq!(mode, 0o750);
}

#[tokio::test]
async fn cancelled_agent_stops_writing() {
    let dir = tempfile::tempdir().unwrap();
    let output = dir.path().join("demo");

    let mock = MockKsm::new();
    mock.set_records(vec![login_record("u1", "demo-secret", &[("password", "p1")])]);

    let mut r = reference("demo", output.clone());
    r.title = Some("demo-secret".into());
    let agent = Agent::with_client(config(AgentMode::Sidecar, vec![r]), Box::new(mock));

    agent.cancel_token().cancel();
    let report = agent.run_cycle(false).await.unwrap();
    assert_eq!(report.failed, 1);
    // No final path appears after cancellation.
    assert!(!output.exists());
}
