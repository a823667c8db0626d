//! Test plan for the `buzzhub-config` crate.
//!
//! These tests exercise the configuration loader across default handling,
//! file discovery, environment overrides, and validation behaviour.

use std::fs;
use std::path::{Path, PathBuf};

use serial_test::serial;
use tempfile::TempDir;

use buzzhub_config::{load, AppConfig, AuthConfig, DeliveryConfig, HttpConfig};

const ENV_VARS_TO_RESET: &[&str] = &[
    "BUZZHUB_CONFIG",
    "BUZZHUB__AUTH__DEV_TOKENS",
    "BUZZHUB__AUTH__SESSION_TTL_SECONDS",
    "BUZZHUB__DATABASE__MAX_CONNECTIONS",
    "BUZZHUB__DATABASE__URL",
    "BUZZHUB__DELIVERY__BUS_QUEUE_CAPACITY",
    "BUZZHUB__DELIVERY__CHANNEL_CAPACITY",
    "BUZZHUB__DELIVERY__MAX_MESSAGE_LENGTH",
    "BUZZHUB__HTTP__ADDRESS",
    "BUZZHUB__HTTP__CORS_ORIGINS",
    "BUZZHUB__HTTP__PORT",
];

struct TestContext {
    vars: Vec<(String, Option<String>)>,
    original_dir: Option<PathBuf>,
}

impl TestContext {
    fn new() -> Self {
        Self {
            vars: Vec::new(),
            original_dir: None,
        }
    }

    fn reset_environment(&mut self) {
        for key in ENV_VARS_TO_RESET {
            self.remove_var(key);
        }
    }

    fn set_var(&mut self, key: &str, value: impl AsRef<str>) {
        let previous = std::env::var(key).ok();
        std::env::set_var(key, value.as_ref());
        self.vars.push((key.to_string(), previous));
    }

    fn remove_var(&mut self, key: &str) {
        let previous = std::env::var(key).ok();
        std::env::remove_var(key);
        self.vars.push((key.to_string(), previous));
    }

    fn set_current_dir(&mut self, dir: &Path) {
        if self.original_dir.is_none() {
            self.original_dir =
                Some(std::env::current_dir().expect("failed to capture current directory"));
        }
        std::env::set_current_dir(dir).expect("failed to set current directory");
    }
}

impl Drop for TestContext {
    fn drop(&mut self) {
        if let Some(original) = self.original_dir.take() {
            let _ = std::env::set_current_dir(original);
        }

        while let Some((key, value)) = self.vars.pop() {
            match value {
                Some(val) => std::env::set_var(&key, val),
                None => std::env::remove_var(&key),
            }
        }
    }
}

fn write_config_file(root: &Path, relative: &str, contents: &str) {
    let path = root.join(relative);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).expect("failed to create config directories");
    }
    fs::write(path, contents).expect("failed to write config file");
}

#[test]
#[serial]
fn load_uses_default_values_when_no_files_found() {
    let temp_dir = TempDir::new().expect("failed to create temp dir");
    let mut ctx = TestContext::new();
    ctx.reset_environment();
    ctx.set_current_dir(temp_dir.path());

    let config = load().expect("configuration load should succeed without files");
    let defaults = AppConfig::default();

    assert_eq!(config.http.address, defaults.http.address);
    assert_eq!(config.http.port, defaults.http.port);
    assert_eq!(config.http.cors_origins, defaults.http.cors_origins);
    assert_eq!(config.database.url, defaults.database.url);
    assert_eq!(
        config.database.max_connections,
        defaults.database.max_connections
    );
    assert_eq!(config.auth.session_ttl_seconds, defaults.auth.session_ttl_seconds);
    assert!(!config.auth.dev_tokens);
    assert_eq!(
        config.delivery.bus_queue_capacity,
        defaults.delivery.bus_queue_capacity
    );
    assert_eq!(
        config.delivery.channel_capacity,
        defaults.delivery.channel_capacity
    );
}

#[test]
#[serial]
fn load_picks_first_available_file_in_search_order() {
    let temp_dir = TempDir::new().expect("failed to create temp dir");
    let mut ctx = TestContext::new();
    ctx.reset_environment();
    ctx.set_current_dir(temp_dir.path());

    write_config_file(
        temp_dir.path(),
        "buzzhub.toml",
        r#"
        [http]
        port = 4242
        "#,
    );
    write_config_file(
        temp_dir.path(),
        "config/buzzhub.toml",
        r#"
        [http]
        port = 5151
        "#,
    );

    let config = load().expect("configuration load should pick the first file");
    assert_eq!(config.http.port, 4242);
}

#[test]
#[serial]
fn load_merges_partial_file_with_defaults() {
    let temp_dir = TempDir::new().expect("failed to create temp dir");
    let mut ctx = TestContext::new();
    ctx.reset_environment();
    ctx.set_current_dir(temp_dir.path());

    write_config_file(
        temp_dir.path(),
        "buzzhub.toml",
        r#"
        [http]
        port = 8181

        [delivery]
        channel_capacity = 8
        "#,
    );

    let config = load().expect("configuration load should succeed");
    let defaults = AppConfig::default();

    assert_eq!(config.http.port, 8181);
    assert_eq!(config.http.address, defaults.http.address);
    assert_eq!(config.delivery.channel_capacity, 8);
    assert_eq!(
        config.delivery.bus_queue_capacity,
        defaults.delivery.bus_queue_capacity
    );
    assert_eq!(config.database.url, defaults.database.url);
}

#[test]
#[serial]
fn load_honours_explicit_config_path() {
    let temp_dir = TempDir::new().expect("failed to create temp dir");
    let mut ctx = TestContext::new();
    ctx.reset_environment();
    ctx.set_current_dir(temp_dir.path());

    write_config_file(
        temp_dir.path(),
        "elsewhere/custom.toml",
        r#"
        [auth]
        dev_tokens = true
        "#,
    );
    let explicit = temp_dir.path().join("elsewhere/custom.toml");
    ctx.set_var("BUZZHUB_CONFIG", explicit.to_string_lossy());

    let config = load().expect("configuration load should read the explicit file");
    assert!(config.auth.dev_tokens);
}

#[test]
#[serial]
fn load_applies_environment_overrides() {
    let temp_dir = TempDir::new().expect("failed to create temp dir");
    let mut ctx = TestContext::new();
    ctx.reset_environment();
    ctx.set_current_dir(temp_dir.path());

    write_config_file(
        temp_dir.path(),
        "buzzhub.toml",
        r#"
        [http]
        port = 3030
        "#,
    );

    ctx.set_var("BUZZHUB__HTTP__PORT", "8080");

    let config = load().expect("configuration load should honour env overrides");
    assert_eq!(config.http.port, 8080);
}

#[test]
#[serial]
fn load_splits_cors_origins_from_environment() {
    let temp_dir = TempDir::new().expect("failed to create temp dir");
    let mut ctx = TestContext::new();
    ctx.reset_environment();
    ctx.set_current_dir(temp_dir.path());

    ctx.set_var(
        "BUZZHUB__HTTP__CORS_ORIGINS",
        "https://buzzhub.example,http://localhost:3000",
    );

    let config = load().expect("configuration load should parse the origin list");
    assert_eq!(
        config.http.cors_origins,
        vec![
            "https://buzzhub.example".to_string(),
            "http://localhost:3000".to_string()
        ]
    );
}

#[test]
#[serial]
fn load_supports_database_url_environment_variable() {
    let temp_dir = TempDir::new().expect("failed to create temp dir");
    let mut ctx = TestContext::new();
    ctx.reset_environment();
    ctx.set_current_dir(temp_dir.path());

    let url = "sqlite:///var/lib/buzzhub/buzzhub.db";
    ctx.set_var("BUZZHUB__DATABASE__URL", url);

    let config = load().expect("configuration load should read database env override");
    assert_eq!(config.database.url, url);
}

#[test]
#[serial]
fn load_raises_zero_capacities_to_one() {
    let temp_dir = TempDir::new().expect("failed to create temp dir");
    let mut ctx = TestContext::new();
    ctx.reset_environment();
    ctx.set_current_dir(temp_dir.path());

    write_config_file(
        temp_dir.path(),
        "buzzhub.toml",
        r#"
        [delivery]
        bus_queue_capacity = 0
        channel_capacity = 0
        "#,
    );

    let config = load().expect("configuration load should succeed");
    assert_eq!(config.delivery.bus_queue_capacity, 1);
    assert_eq!(config.delivery.channel_capacity, 1);
}

#[test]
#[serial]
fn load_errors_on_invalid_toml_contents() {
    let temp_dir = TempDir::new().expect("failed to create temp dir");
    let mut ctx = TestContext::new();
    ctx.reset_environment();
    ctx.set_current_dir(temp_dir.path());

    write_config_file(
        temp_dir.path(),
        "buzzhub.toml",
        r#"
        [http]
        port = "not-a-number
        "#,
    );

    let error = load().expect_err("invalid TOML should cause load to fail");
    let message = error.to_string();
    assert!(
        message.contains("invalid configuration") || message.contains("unable to build configuration"),
        "unexpected error message: {message}"
    );
}

#[test]
fn auth_config_defaults_disable_dev_tokens() {
    let defaults = AuthConfig::default();
    assert!(!defaults.dev_tokens);
    assert_eq!(defaults.session_ttl_seconds, 86_400);
}

#[test]
fn delivery_config_defaults_are_non_zero() {
    let defaults = DeliveryConfig::default();
    assert!(defaults.bus_queue_capacity > 0);
    assert!(defaults.channel_capacity > 0);
    assert!(defaults.max_message_length > 0);
}

#[test]
fn http_config_defaults_match_expected_host_and_port() {
    let defaults = HttpConfig::default();
    assert_eq!(defaults.address, "127.0.0.1");
    assert_eq!(defaults.port, 4000);
    assert_eq!(defaults.cors_origins, vec!["http://localhost:3000".to_string()]);
}
