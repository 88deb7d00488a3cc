//! Agent configuration

use anyhow::{Context, Result};
use scaler_lib::ScalerConfig;

/// Environment variable naming the configuration file
pub const CONFIG_PATH_ENV: &str = "SCALER_CONFIG";
const DEFAULT_CONFIG_PATH: &str = "scaler.toml";

/// Agent configuration
#[derive(Debug, Clone)]
pub struct AgentConfig {
    /// Instance name used in structured logs
    pub instance_name: String,

    /// API server port for health/metrics/status
    pub api_port: u16,

    pub scaler: ScalerConfig,
}

fn default_instance_name() -> String {
    std::env::var("HOSTNAME").unwrap_or_else(|_| "log-agent".to_string())
}

fn default_api_port() -> u16 {
    8080
}

impl AgentConfig {
    /// Load configuration from the config file and `SCALER__*` environment variables
    pub fn load() -> Result<Self> {
        let path =
            std::env::var(CONFIG_PATH_ENV).unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
        Self::load_from(&path)
    }

    /// Load configuration from `path` (optional) layered under the environment
    ///
    /// Fails when the result would make the control loop's math undefined.
    pub fn load_from(path: &str) -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::with_name(path).required(false))
            .add_source(
                config::Environment::with_prefix("SCALER")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .with_context(|| format!("Failed to read configuration from '{}'", path))?;

        let api_port = match settings.get::<u16>("api_port") {
            Ok(port) => port,
            Err(config::ConfigError::NotFound(_)) => default_api_port(),
            Err(e) => return Err(e).context("Invalid api_port"),
        };
        let instance_name = match settings.get_string("instance_name") {
            Ok(name) => name,
            Err(config::ConfigError::NotFound(_)) => default_instance_name(),
            Err(e) => return Err(e).context("Invalid instance_name"),
        };

        let scaler: ScalerConfig = settings
            .try_deserialize()
            .context("Invalid scaler configuration")?;
        scaler.validate()?;

        Ok(Self {
            instance_name,
            api_port,
            scaler,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn write_config(contents: &str) -> NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_load_from_file() {
        let file = write_config(
            r#"
api_port = 9100
instance_name = "scaler-0"
tick_interval_secs = 10
history_dir = "/var/lib/log-agent"

[endpoints]
loki = "http://loki:3100"

[[services]]
name = "flask-app-1"
max_replicas = 4

[[services]]
name = "flask-app-2"
demand_secs = 0.5
control_plane_app = "app2"
"#,
        );

        let config = AgentConfig::load_from(file.path().to_str().unwrap()).unwrap();
        assert_eq!(config.api_port, 9100);
        assert_eq!(config.instance_name, "scaler-0");
        assert_eq!(config.scaler.tick_interval_secs, 10);
        assert_eq!(config.scaler.window_secs, 600);
        assert_eq!(config.scaler.endpoints.loki, "http://loki:3100");
        assert_eq!(config.scaler.endpoints.policy, "http://localhost:5001");
        assert_eq!(config.scaler.services.len(), 2);
        assert_eq!(config.scaler.services[0].max_replicas(), 4);
        assert_eq!(config.scaler.services[1].demand(), 0.5);
        assert_eq!(config.scaler.services[1].control_plane_app(), "app2");
    }

    #[test]
    fn test_zero_demand_refuses_to_start() {
        let file = write_config(
            r#"
[[services]]
name = "flask-app-1"
demand_secs = 0.0
"#,
        );
        assert!(AgentConfig::load_from(file.path().to_str().unwrap()).is_err());
    }

    #[test]
    fn test_duplicate_service_refuses_to_start() {
        let file = write_config(
            r#"
[[services]]
name = "flask-app-1"

[[services]]
name = "flask-app-1"
"#,
        );
        let err = AgentConfig::load_from(file.path().to_str().unwrap()).unwrap_err();
        assert!(format!("{:#}", err).contains("more than once"));
    }

    #[test]
    fn test_no_services_refuses_to_start() {
        let file = write_config("tick_interval_secs = 5\n");
        assert!(AgentConfig::load_from(file.path().to_str().unwrap()).is_err());
    }
}
