use std::io::Write;

use flowde_core::config::AppConfig;
use flowde_core::error::FlowError;

#[test]
fn test_load_full_config_from_file() {
    let toml_content = r#"
[store]
path = "/tmp/flowde-test/graph.db"

[layout]
main_step_dx = 300.0
after_dy = 90.0
child_dx = 120.0
default_position = { x = 10.0, y = 20.0 }
seed_origin = { x = 0.0, y = 0.0 }

[engine]
verify_invariants = true

[deep_dive]
max_steps = 5
"#;

    let mut tmp = tempfile::NamedTempFile::new().expect("create temp file");
    tmp.write_all(toml_content.as_bytes()).expect("write toml");

    let config = AppConfig::load(tmp.path()).expect("load config");

    assert_eq!(config.store.path, "/tmp/flowde-test/graph.db");
    assert_eq!(
        config.database_path(),
        std::path::PathBuf::from("/tmp/flowde-test/graph.db")
    );
    assert_eq!(config.layout.main_step_dx, 300.0);
    assert_eq!(config.layout.after_dy, 90.0);
    assert_eq!(config.layout.child_dx, 120.0);
    assert_eq!(config.layout.default_position.x, 10.0);
    assert_eq!(config.layout.default_position.y, 20.0);
    assert_eq!(config.layout.seed_origin.x, 0.0);
    assert!(config.engine.verify_invariants);
    assert_eq!(config.deep_dive.max_steps, 5);
}

#[test]
fn test_env_var_expansion_in_config() {
    std::env::set_var("FLOWDE_TEST_DB_DIR", "/var/lib/flowde-expanded");

    let toml_content = r#"
[store]
path = "${FLOWDE_TEST_DB_DIR}/flowde.db"
"#;

    let mut tmp = tempfile::NamedTempFile::new().expect("create temp file");
    tmp.write_all(toml_content.as_bytes()).expect("write toml");

    let config = AppConfig::load(tmp.path()).expect("load config");
    assert_eq!(config.store.path, "/var/lib/flowde-expanded/flowde.db");

    std::env::remove_var("FLOWDE_TEST_DB_DIR");
}

#[test]
fn test_empty_config_uses_defaults() {
    let tmp = tempfile::NamedTempFile::new().expect("create temp file");

    let config = AppConfig::load(tmp.path()).expect("load config");

    assert_eq!(config.store.path, "~/.flowde/flowde.db");
    assert_eq!(config.layout.main_step_dx, 250.0);
    assert_eq!(config.layout.after_dy, 80.0);
    assert_eq!(config.layout.child_dx, 150.0);
    assert_eq!(config.layout.default_position.x, 100.0);
    assert_eq!(config.layout.default_position.y, 100.0);
    assert!(!config.engine.verify_invariants);
    assert_eq!(config.deep_dive.max_steps, 12);
}

#[test]
fn test_invalid_layout_is_rejected() {
    let toml_content = r#"
[layout]
after_dy = -80.0
"#;

    let mut tmp = tempfile::NamedTempFile::new().expect("create temp file");
    tmp.write_all(toml_content.as_bytes()).expect("write toml");

    let err = AppConfig::load(tmp.path()).unwrap_err();
    assert!(matches!(err, FlowError::Config(_)));
}

#[test]
fn test_missing_file_reports_path() {
    let dir = tempfile::tempdir().expect("create temp dir");
    let path = dir.path().join("absent.toml");

    let err = AppConfig::load(&path).unwrap_err();
    match err {
        FlowError::ConfigNotFound(p) => assert!(p.ends_with("absent.toml")),
        other => panic!("unexpected error: {}", other),
    }
}

#[test]
fn test_default_config_round_trips_through_toml() {
    let rendered = toml::to_string_pretty(&AppConfig::default()).expect("render config");

    let mut tmp = tempfile::NamedTempFile::new().expect("create temp file");
    tmp.write_all(rendered.as_bytes()).expect("write toml");

    let config = AppConfig::load(tmp.path()).expect("load rendered config");
    assert_eq!(config.layout.main_step_dx, 250.0);
    assert_eq!(config.deep_dive.max_steps, 12);
}
