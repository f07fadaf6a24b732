use super::settings::{PartialBrokerSettings, PartialSettings, Settings};
use super::load_config;
use serial_test::serial;
use std::env;
use std::fs;
use tempfile::TempDir;

const ENV_KEYS: [&str; 3] = [
    "PUBSUB_SERVER__PORT",
    "PUBSUB_BROKER__TOPIC_CAPACITY",
    "PUBSUB_LOG__LEVEL",
];

#[test]
fn test_default_settings() {
    let settings = Settings::default();
    assert_eq!(settings.server.host, "0.0.0.0");
    assert_eq!(settings.server.port, 8080);
    assert_eq!(settings.server.addr(), "0.0.0.0:8080");
    assert_eq!(settings.broker.topic_capacity, 128);
    assert_eq!(settings.broker.outbound_capacity, 64);
    assert_eq!(settings.broker.read_buffer_size, 2048);
    assert_eq!(settings.log.level, "info");
}

#[test]
fn test_partial_merge_keeps_defaults_for_missing_values() {
    let partial = PartialSettings {
        broker: Some(PartialBrokerSettings {
            topic_capacity: Some(4),
            ..Default::default()
        }),
        ..Default::default()
    };

    let merged = partial.merge(Settings::default());
    assert_eq!(merged.broker.topic_capacity, 4);
    assert_eq!(merged.broker.outbound_capacity, 64);
    assert_eq!(merged.server, Settings::default().server);
}

#[test]
#[serial]
fn load_config_without_sources_returns_defaults() {
    let tmp = TempDir::new().expect("create tempdir");
    let orig = env::current_dir().expect("current_dir");
    env::set_current_dir(tmp.path()).expect("set current dir");

    let cfg = temp_env::with_vars_unset(ENV_KEYS, load_config);

    env::set_current_dir(orig).expect("restore cwd");
    assert_eq!(cfg.expect("load_config failed"), Settings::default());
}

#[test]
#[serial]
fn load_config_from_file_overrides_defaults() {
    // load_config picks up config/default.toml relative to the current dir
    let tmp = TempDir::new().expect("create tempdir");
    let orig = env::current_dir().expect("current_dir");
    env::set_current_dir(tmp.path()).expect("set current dir");

    fs::create_dir_all("config").expect("create config dir");
    let toml = r#"
        [server]
        host = "127.0.0.1"
        port = 9000

        [broker]
        topic_capacity = 16
        read_buffer_size = 512

        [log]
        level = "debug"
    "#;
    fs::write("config/default.toml", toml).expect("write config file");

    let cfg = temp_env::with_vars_unset(ENV_KEYS, load_config);

    env::set_current_dir(orig).expect("restore cwd");

    let cfg = cfg.expect("load_config failed");
    assert_eq!(cfg.server.host, "127.0.0.1");
    assert_eq!(cfg.server.port, 9000);
    assert_eq!(cfg.broker.topic_capacity, 16);
    assert_eq!(cfg.broker.outbound_capacity, 64);
    assert_eq!(cfg.broker.read_buffer_size, 512);
    assert_eq!(cfg.log.level, "debug");
}

#[test]
#[serial]
fn load_config_from_env_overrides_defaults() {
    let tmp = TempDir::new().expect("create tempdir");
    let orig = env::current_dir().expect("current_dir");
    env::set_current_dir(tmp.path()).expect("set current dir");

    let cfg = temp_env::with_vars(
        [
            ("PUBSUB_SERVER__PORT", Some("7000")),
            ("PUBSUB_BROKER__TOPIC_CAPACITY", Some("8")),
            ("PUBSUB_LOG__LEVEL", Some("warn")),
        ],
        load_config,
    );

    env::set_current_dir(orig).expect("restore cwd");

    let cfg = cfg.expect("load_config failed");
    assert_eq!(cfg.server.port, 7000);
    assert_eq!(cfg.server.host, "0.0.0.0");
    assert_eq!(cfg.broker.topic_capacity, 8);
    assert_eq!(cfg.log.level, "warn");
}
