//! Daemon configuration

use anyhow::{Context, Result};
use boot_lib::{DockerSettings, ManagerOptions};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

/// Environment variable naming the config file
pub const CONFIG_PATH_ENV: &str = "DOCKERBOOT_CONFIG";

const DEFAULT_CONFIG_PATH: &str = "dockerboot.yaml";

/// Prefix and nesting separator of override variables
const ENV_PREFIX: &str = "DOCKERBOOT";
const ENV_SEPARATOR: &str = "__";

/// Maps whose keys are user data, not field names
const FREE_FORM_MAPS: &[&str] = &["environment", "labels", "volumes"];

/// Which container engine backs the managers
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EngineKind {
    #[default]
    Docker,
    /// In-process engine; nothing reaches a Docker daemon
    Memory,
}

/// Daemon configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct DaemonConfig {
    /// Reported in startup/shutdown logs
    #[serde(default = "default_instance_name", alias = "instance_name")]
    pub instance_name: String,

    /// API server port for health/metrics/control
    #[serde(default = "default_api_port", alias = "api_port")]
    pub api_port: u16,

    /// Upper bound for one image pull; 0 waits indefinitely
    #[serde(default = "default_pull_timeout", alias = "pull_timeout_secs")]
    pub pull_timeout_secs: u64,

    #[serde(default = "default_stop_timeout", alias = "stop_timeout_secs")]
    pub stop_timeout_secs: u64,

    #[serde(default)]
    pub engine: EngineKind,

    #[serde(default)]
    pub docker: DockerSettings,
}

fn default_instance_name() -> String {
    std::env::var("HOSTNAME").unwrap_or_else(|_| "dockerboot".to_string())
}

fn default_api_port() -> u16 {
    8080
}

fn default_pull_timeout() -> u64 {
    600
}

fn default_stop_timeout() -> u64 {
    10
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            instance_name: default_instance_name(),
            api_port: default_api_port(),
            pull_timeout_secs: default_pull_timeout(),
            stop_timeout_secs: default_stop_timeout(),
            engine: EngineKind::default(),
            docker: DockerSettings::default(),
        }
    }
}

impl DaemonConfig {
    /// Load from `$DOCKERBOOT_CONFIG` (default `dockerboot.yaml`) and environment
    pub fn load() -> Result<Self> {
        let path = std::env::var(CONFIG_PATH_ENV).unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
        Self::load_from(path)
    }

    /// Load from an optional file layered under `DOCKERBOOT__*` variables
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        Self::load_with_env(path, std::env::vars())
    }

    /// Load from an optional file layered under the given override variables
    ///
    /// `DOCKERBOOT__DOCKER__CONTAINERS__REDIS__IMAGE_NAME` sets
    /// `docker.containers.redis.image-name`.
    pub fn load_with_env(
        path: impl AsRef<Path>,
        vars: impl IntoIterator<Item = (String, String)>,
    ) -> Result<Self> {
        let path = path.as_ref();

        let config = config::Config::builder()
            .add_source(config::File::from(path).required(false))
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator(ENV_SEPARATOR)
                    .separator(ENV_SEPARATOR)
                    .try_parsing(true)
                    .source(Some(env_overrides(vars))),
            )
            .build()
            .with_context(|| format!("Failed to read configuration from {}", path.display()))?;

        let daemon: DaemonConfig = config
            .try_deserialize()
            .context("Invalid dockerboot configuration")?;

        daemon
            .docker
            .validate()
            .context("Invalid container definitions")?;

        Ok(daemon)
    }

    pub fn manager_options(&self) -> ManagerOptions {
        ManagerOptions {
            pull_timeout: (self.pull_timeout_secs > 0).then(|| Duration::from_secs(self.pull_timeout_secs)),
            stop_timeout: Duration::from_secs(self.stop_timeout_secs),
        }
    }
}

/// Keep the override variables and spell their field names the way the file does
///
/// Variable names cannot carry `-`, so `_` in the last segment becomes `-`.
/// Keys of free-form maps are left alone.
fn env_overrides(vars: impl IntoIterator<Item = (String, String)>) -> config::Map<String, String> {
    let prefix = format!("{}{}", ENV_PREFIX, ENV_SEPARATOR);

    vars.into_iter()
        .filter(|(key, _)| key.to_ascii_uppercase().starts_with(&prefix))
        .map(|(key, value)| {
            let mut segments: Vec<String> = key.split(ENV_SEPARATOR).map(str::to_string).collect();
            let parent_is_free_form = segments.len() >= 2
                && FREE_FORM_MAPS
                    .iter()
                    .any(|map| segments[segments.len() - 2].eq_ignore_ascii_case(map));
            if let Some(leaf) = segments.last_mut().filter(|_| !parent_is_free_form) {
                *leaf = leaf.replace('_', "-");
            }
            (segments.join(ENV_SEPARATOR), value)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use boot_lib::LifecycleMode;
    use std::io::Write;

    fn write_config(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(".yaml").tempfile().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let config = DaemonConfig::load_from("/nonexistent/dockerboot.yaml").unwrap();

        assert_eq!(config.api_port, 8080);
        assert_eq!(config.pull_timeout_secs, 600);
        assert_eq!(config.engine, EngineKind::Docker);
        assert_eq!(config.docker.host, "unix:///var/run/docker.sock");
        assert!(config.docker.containers.is_empty());
    }

    #[test]
    fn test_load_yaml_definitions() {
        let file = write_config(
            r#"
api-port: 9191
engine: memory
stop-timeout-secs: 3
docker:
  host: tcp://127.0.0.1:2375
  containers:
    redis:
      container-name: my-redis
      image-name: redis:7
      lifecycle-mode: START_ONLY
      ports:
        "6379": 16379
      environment:
        REDIS_ARGS: --save 60 1
    postgres:
      enabled: false
      container-name: my-pg
      image-name: postgres:16
"#,
        );

        let config = DaemonConfig::load_from(file.path()).unwrap();

        assert_eq!(config.api_port, 9191);
        assert_eq!(config.engine, EngineKind::Memory);
        assert_eq!(config.manager_options().stop_timeout, Duration::from_secs(3));
        assert_eq!(config.docker.host, "tcp://127.0.0.1:2375");

        let redis = &config.docker.containers["redis"];
        assert_eq!(redis.image_name, "redis:7");
        assert_eq!(redis.lifecycle_mode, LifecycleMode::StartOnly);
        assert_eq!(redis.ports.get("6379"), Some(&16379));
        assert!(!config.docker.containers["postgres"].enabled);
        assert_eq!(config.docker.enabled_containers().count(), 1);
    }

    #[test]
    fn test_duplicate_container_names_fail_to_load() {
        let file = write_config(
            r#"
docker:
  containers:
    a:
      container-name: shared
      image-name: redis:7
    b:
      container-name: shared
      image-name: nginx:1
"#,
        );

        let err = DaemonConfig::load_from(file.path()).unwrap_err();
        assert!(format!("{:#}", err).contains("shared"));
    }

    fn vars(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_env_overrides_multi_word_fields() {
        let file = write_config(
            r#"
api-port: 9191
docker:
  containers:
    redis:
      container-name: my-redis
      image-name: redis:7
"#,
        );

        let config = DaemonConfig::load_with_env(
            file.path(),
            vars(&[
                ("DOCKERBOOT__API_PORT", "9292"),
                ("DOCKERBOOT__PULL_TIMEOUT_SECS", "30"),
                ("DOCKERBOOT__DOCKER__TLS_VERIFY", "false"),
                ("DOCKERBOOT__DOCKER__CONTAINERS__REDIS__IMAGE_NAME", "redis:7.2"),
                ("DOCKERBOOT__DOCKER__CONTAINERS__REDIS__LIFECYCLE_MODE", "START_ONLY"),
                ("DOCKERBOOT__DOCKER__CONTAINERS__REDIS__LABELS__team_name", "cache"),
                ("DOCKERBOOT_CONFIG", "ignored.yaml"),
                ("PATH", "/usr/bin"),
            ]),
        )
        .unwrap();

        assert_eq!(config.api_port, 9292);
        assert_eq!(config.pull_timeout_secs, 30);
        assert!(!config.docker.tls_verify);

        let redis = &config.docker.containers["redis"];
        assert_eq!(redis.container_name, "my-redis");
        assert_eq!(redis.image_name, "redis:7.2");
        assert_eq!(redis.lifecycle_mode, LifecycleMode::StartOnly);
        assert_eq!(redis.labels.get("team_name").map(String::as_str), Some("cache"));
    }

    #[test]
    fn test_env_override_names() {
        let overrides = env_overrides(vars(&[
            ("DOCKERBOOT__STOP_TIMEOUT_SECS", "5"),
            ("DOCKERBOOT__DOCKER__CONTAINERS__MY_APP__CONTAINER_NAME", "app"),
            ("DOCKERBOOT__DOCKER__CONTAINERS__MY_APP__ENVIRONMENT__LOG_LEVEL", "debug"),
            ("DOCKERBOOT_CONFIG", "other.yaml"),
        ]));

        assert_eq!(overrides.len(), 3);
        assert!(overrides.contains_key("DOCKERBOOT__STOP-TIMEOUT-SECS"));
        assert!(overrides.contains_key("DOCKERBOOT__DOCKER__CONTAINERS__MY_APP__CONTAINER-NAME"));
        assert!(overrides.contains_key("DOCKERBOOT__DOCKER__CONTAINERS__MY_APP__ENVIRONMENT__LOG_LEVEL"));
    }

    #[test]
    fn test_zero_pull_timeout_disables_limit() {
        let config = DaemonConfig {
            pull_timeout_secs: 0,
            ..Default::default()
        };
        assert!(config.manager_options().pull_timeout.is_none());
    }
}
