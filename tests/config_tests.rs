//! Configuration loading from files and environment overrides.

use dataspace_core::config::{ConfigManager, ConfigurationError, ConnectorConfig};
use dataspace_core::orchestration::StateMachineManager;
use dataspace_core::state_machine::TransferState;
use dataspace_core::store::InMemoryEntityStore;
use std::fs;
use std::sync::Arc;
use tempfile::TempDir;

fn config_dir(files: &[(&str, &str)]) -> TempDir {
    let dir = TempDir::new().unwrap();
    for (name, contents) in files {
        fs::write(dir.path().join(name), contents).unwrap();
    }
    dir
}

#[test]
fn environment_variables_override_files() {
    let dir = config_dir(&[("base.toml", "[flow_cache]\ncapacity = 10\n")]);
    std::env::set_var("DATASPACE__FLOW_CACHE__CAPACITY", "42");

    let manager = ConfigManager::load_from_directory_with_env(Some(dir.path().to_path_buf()), "test");
    std::env::remove_var("DATASPACE__FLOW_CACHE__CAPACITY");

    assert_eq!(manager.unwrap().config().flow_cache.capacity, 42);
}

#[test]
fn malformed_toml_is_reported_with_its_file() {
    let dir = config_dir(&[("base.toml", "[retry\nmax_retries = 3\n")]);

    let err = ConfigManager::load_from_directory_with_env(Some(dir.path().to_path_buf()), "test").unwrap_err();
    match err {
        ConfigurationError::InvalidToml { file_path, .. } => assert!(file_path.ends_with("base.toml")),
        other => panic!("expected InvalidToml, got {other:?}"),
    }
}

#[test]
fn wrongly_typed_value_is_a_merge_error() {
    let dir = config_dir(&[("base.toml", "[state_machine]\nbatch_size = \"many\"\n")]);

    let err = ConfigManager::load_from_directory_with_env(Some(dir.path().to_path_buf()), "staging").unwrap_err();
    assert!(matches!(err, ConfigurationError::ConfigMergeError { ref environment, .. } if environment == "staging"));
}

#[test]
fn debug_config_exposes_effective_values() {
    let dir = config_dir(&[
        ("base.toml", "[retry]\nmax_retries = 4\nbackoff_min_ms = 250\n"),
        ("production.toml", "[state_machine]\nbatch_size = 25\n"),
    ]);

    let manager =
        ConfigManager::load_from_directory_with_env(Some(dir.path().to_path_buf()), "production").unwrap();
    let debug = manager.debug_config();
    assert_eq!(debug["retry"]["max_retries"], 4);
    assert_eq!(debug["retry"]["backoff_min_ms"], 250);
    assert_eq!(debug["state_machine"]["batch_size"], 25);
    assert_eq!(manager.environment(), "production");
}

#[test]
fn manager_builder_applies_configuration() {
    let mut config = ConnectorConfig::default();
    config.state_machine.batch_size = 0;
    assert!(ConfigManager::from_config(config.clone(), "test").is_err());

    config.state_machine.batch_size = 3;
    let manager = ConfigManager::from_config(config, "test").unwrap();

    let store = Arc::new(InMemoryEntityStore::<TransferState, ()>::new(
        "node-a",
        manager.config().lease.duration(),
    ));
    let built = StateMachineManager::<TransferState, ()>::builder("transfer-process")
        .with_config(manager.config())
        .store(store)
        .build()
        .unwrap();
    assert_eq!(built.retry_policy_for(TransferState::Initial).max_retries(), 7);
    assert!(built.actionable_states().is_empty());
}
