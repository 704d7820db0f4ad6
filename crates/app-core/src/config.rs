//! Thread-safe, hot-reloading configuration.
//!
//! Values come from a YAML file, overlaid by `APP__`-prefixed environment
//! variables (`APP__FIREBASE__PROJECT_ID` overrides `firebase.project_id`).
//! Credentials are usually supplied through the environment, so a value
//! missing from both is reported to the caller rather than defaulted here.

use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock, mpsc};
use std::thread;
use std::time::Duration;

use config::{Config as RawConfig, Environment, File};
use notify::{Event, RecommendedWatcher, RecursiveMode, Watcher};
use serde::de::DeserializeOwned;
use thiserror::Error;

const ENV_PREFIX: &str = "APP";
const ENV_SEPARATOR: &str = "__";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to load or parse configuration file")]
    Load(#[from] config::ConfigError),

    #[error("Failed to initialize file watcher")]
    Watch(#[from] notify::Error),

    #[error("Configuration lock was poisoned, indicating a panic in another thread")]
    LockPoisoned,
}

#[derive(Debug)]
pub struct Config {
    inner: Arc<RwLock<RawConfig>>,
    // Dropping the watcher stops the reload thread.
    _watcher: Option<RecommendedWatcher>,
}

impl Config {
    pub fn builder<P: AsRef<Path>>(path: P) -> ConfigBuilder {
        ConfigBuilder::new(path.as_ref().to_path_buf())
    }

    #[cfg(feature = "testing")]
    pub fn builder_test() -> test_utils::TestConfigBuilder {
        test_utils::TestConfigBuilder::new()
    }

    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Result<T, ConfigError> {
        let guard = self.inner.read().map_err(|_| ConfigError::LockPoisoned)?;
        guard.get(key).map_err(ConfigError::from)
    }

    /// Like [`Config::get`], but a missing key yields `None`. Type mismatches
    /// are still errors.
    pub fn get_opt<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, ConfigError> {
        match self.get(key) {
            Ok(value) => Ok(Some(value)),
            Err(ConfigError::Load(config::ConfigError::NotFound(_))) => Ok(None),
            Err(err) => Err(err),
        }
    }

    pub fn get_or<T: DeserializeOwned>(&self, key: &str, default: T) -> T {
        match self.get_opt(key) {
            Ok(Some(value)) => value,
            Ok(None) => default,
            Err(err) => {
                tracing::warn!(key, error = %err, "Invalid configuration value, using default");
                default
            },
        }
    }
}

pub struct ConfigBuilder {
    path: PathBuf,
    watch: bool,
    watch_interval: Duration,
    env_overrides: bool,
}

impl ConfigBuilder {
    fn new(path: PathBuf) -> Self {
        Self { path, watch: false, watch_interval: Duration::from_secs(2), env_overrides: true }
    }

    pub fn watch(mut self) -> Self {
        self.watch = true;
        self
    }

    pub fn watch_interval(mut self, interval: Duration) -> Self {
        self.watch_interval = interval;
        self
    }

    pub fn without_env(mut self) -> Self {
        self.env_overrides = false;
        self
    }

    pub fn build(self) -> Result<Config, ConfigError> {
        let raw_config = Self::load(&self.path, self.env_overrides)?;
        let config_arc = Arc::new(RwLock::new(raw_config));
        let mut watcher = None;

        if self.watch {
            let path_clone = self.path.clone();
            let env_overrides = self.env_overrides;
            let config_clone = Arc::clone(&config_arc);
            let (tx, rx) = mpsc::channel();

            let mut w = RecommendedWatcher::new(tx, notify::Config::default().with_poll_interval(self.watch_interval))?;
            w.watch(&self.path, RecursiveMode::NonRecursive)?;

            thread::spawn(move || {
                tracing::info!("Watching configuration file for changes: {}", &path_clone.to_string_lossy());
                while let Ok(event_result) = rx.recv() {
                    match event_result {
                        Ok(Event { kind: notify::EventKind::Modify(_), .. }) => {
                            tracing::info!("Configuration file changed. Reloading...");
                            match Self::load(&path_clone, env_overrides) {
                                Ok(new_config) => match config_clone.write() {
                                    Ok(mut guard) => {
                                        *guard = new_config;
                                        tracing::info!("Configuration reloaded successfully.");
                                    },
                                    Err(_) => tracing::error!("Failed to acquire write lock for reloading config."),
                                },
                                Err(e) => tracing::error!("Failed to reload configuration file: {}", e),
                            }
                        },
                        Err(e) => tracing::error!("File watcher error: {:?}", e),
                        _ => {},
                    }
                }
            });
            watcher = Some(w);
        }

        Ok(Config { inner: config_arc, _watcher: watcher })
    }

    fn load(path: &Path, env_overrides: bool) -> Result<RawConfig, config::ConfigError> {
        let mut builder = RawConfig::builder().add_source(File::from(path).required(true));
        if env_overrides {
            builder = builder.add_source(Environment::with_prefix(ENV_PREFIX).separator(ENV_SEPARATOR));
        }
        builder.build()
    }
}

#[cfg(feature = "testing")]
pub mod test_utils {
    use std::collections::HashMap;

    use config::Value;

    use super::*;

    #[derive(Default)]
    pub struct TestConfigBuilder {
        values: HashMap<String, Value>,
    }

    impl TestConfigBuilder {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn with<T: Into<Value>>(mut self, key: &str, value: T) -> Self {
            self.values.insert(key.to_string(), value.into());
            self
        }

        pub fn build(self) -> Config {
            let mut builder = RawConfig::builder();

            for (key, value) in self.values {
                builder = builder.set_override(key, value).expect("Invalid test config key");
            }

            let raw_config = builder.build().expect("Failed to create config from test values");

            Config { inner: Arc::new(RwLock::new(raw_config)), _watcher: None }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::io::Write;

    use serde::Deserialize;
    use tempfile::NamedTempFile;

    use super::*;

    #[derive(Debug, Deserialize, PartialEq)]
    struct FirebaseSettings {
        project_id: String,
        check_revoked: bool,
    }

    fn create_temp_config(content: &str) -> NamedTempFile {
        let mut temp_file = tempfile::Builder::new()
            .suffix(".yaml")
            .tempfile()
            .expect("Failed to create temp file");

        temp_file.write_all(content.as_bytes()).expect("Failed to write to temp file");
        temp_file.flush().expect("Failed to flush temp file");
        temp_file
    }

    #[test]
    fn test_builder_basic_usage() {
        let temp_file = create_temp_config(
            r#"
            server:
                address: "0.0.0.0:8000"
                timeout_secs: 10
            firebase:
                project_id: "demo-project"
                check_revoked: true
            "#,
        );
        let config = Config::builder(temp_file.path()).without_env().build().expect("Failed to build config");

        let address: String = config.get("server.address").unwrap();
        let timeout: u64 = config.get("server.timeout_secs").unwrap();
        let firebase: FirebaseSettings = config.get("firebase").unwrap();

        assert_eq!(address, "0.0.0.0:8000");
        assert_eq!(timeout, 10);
        assert_eq!(firebase, FirebaseSettings { project_id: "demo-project".to_string(), check_revoked: true });
    }

    #[test]
    fn test_nonexistent_file() {
        let result = Config::builder("/nonexistent/path/config.yaml").build();

        match result {
            Err(ConfigError::Load(_)) => {},
            other => panic!("Expected ConfigError::Load, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn test_invalid_yaml() {
        let temp_file = create_temp_config(
            r#"
            server: "test
            port: [invalid: yaml
            "#,
        );

        assert!(matches!(Config::builder(temp_file.path()).build(), Err(ConfigError::Load(_))));
    }

    #[test]
    fn test_optional_and_default_lookups() {
        let temp_file = create_temp_config(
            r#"
            session:
                store_timeout_secs: 3
            firebase:
                check_revoked: "sometimes"
            "#,
        );
        let config = Config::builder(temp_file.path()).without_env().build().unwrap();

        assert_eq!(config.get_opt::<u64>("session.store_timeout_secs").unwrap(), Some(3));
        assert_eq!(config.get_opt::<String>("firebase.project_id").unwrap(), None);
        assert_eq!(config.get_or("server.timeout_secs", 30u64), 30);
        assert!(config.get_opt::<bool>("firebase.check_revoked").is_err());
        assert!(!config.get_or("firebase.check_revoked", false));
    }

    #[test]
    fn test_auto_reload() {
        let temp_file = create_temp_config(
            r#"
            server:
                cors_origin: "http://localhost:3000"
            "#,
        );
        let config = Config::builder(temp_file.path())
            .without_env()
            .watch()
            .watch_interval(Duration::from_millis(100))
            .build()
            .expect("Failed to build config with watch");

        let origin: String = config.get("server.cors_origin").unwrap();
        assert_eq!(origin, "http://localhost:3000");

        fs::write(
            temp_file.path(),
            r#"
            server:
                cors_origin: "https://app.example.com"
            "#,
        )
        .expect("Failed to update config file");

        thread::sleep(Duration::from_millis(500));

        let origin: String = config.get("server.cors_origin").unwrap();
        assert_eq!(origin, "https://app.example.com");
    }

    #[cfg(feature = "testing")]
    #[test]
    fn test_builder_test() {
        let config = Config::builder_test()
            .with("firebase.project_id", "demo-project")
            .with("session.store_timeout_secs", 5)
            .with("auth.require_verified_email_for_admin", true)
            .build();

        let project: String = config.get("firebase.project_id").unwrap();
        let timeout: u64 = config.get("session.store_timeout_secs").unwrap();
        let strict: bool = config.get("auth.require_verified_email_for_admin").unwrap();

        assert_eq!(project, "demo-project");
        assert_eq!(timeout, 5);
        assert!(strict);
    }
}
