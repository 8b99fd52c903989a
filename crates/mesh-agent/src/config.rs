//! Effective agent configuration (§4.C stage 2): environment variables
//! override decorator/builder arguments, which override built-in defaults.
//! Parsing uses the small free functions in `mesh_core::duration`, in the
//! style of the teacher's `RegistryClient::parse_duration`, rather than a
//! config-file framework — this system's configuration is entirely
//! environment + builder arguments (§1 ambient configuration note).

use std::time::Duration;

use mesh_core::duration::{parse_bool, parse_duration};

use crate::error::ConfigError;

fn env_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}

/// Resolve one setting with the documented precedence: env var, then the
/// builder-supplied value, then the default.
fn resolve(env_name: &str, builder_value: Option<String>, default: &str) -> String {
    env_var(env_name)
        .or(builder_value)
        .unwrap_or_else(|| default.to_string())
}

#[derive(Debug, Clone)]
pub struct AgentConfig {
    pub registry_url: String,
    pub agent_name: String,
    pub http_host: String,
    pub http_port: u16,
    pub http_enabled: bool,
    pub http_endpoint_override: Option<String>,
    pub namespace: Option<String>,
    pub health_interval: Duration,
    pub auto_run: bool,
    pub auto_run_interval: Option<Duration>,
    pub auth_token: Option<String>,
}

/// Builder-provided overrides, lower precedence than environment
/// variables. Every field defaults to `None`, meaning "let the
/// environment or the built-in default decide".
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub name: Option<String>,
    pub registry_url: Option<String>,
    pub http_host: Option<String>,
    pub http_port: Option<u16>,
    pub http_enabled: Option<bool>,
    pub namespace: Option<String>,
    pub health_interval: Option<Duration>,
    pub standalone: bool,
}

impl AgentConfig {
    pub fn resolve(overrides: &ConfigOverrides) -> Result<Self, ConfigError> {
        let registry_url = resolve(
            "MCP_MESH_REGISTRY_URL",
            overrides.registry_url.clone(),
            "http://localhost:8000",
        );

        let agent_name = resolve(
            "MCP_MESH_AGENT_NAME",
            overrides.name.clone(),
            "agent",
        );

        let http_host = resolve("MCP_MESH_HTTP_HOST", overrides.http_host.clone(), "0.0.0.0");

        let http_port = match env_var("MCP_MESH_HTTP_PORT") {
            Some(raw) => raw.parse().map_err(|_| ConfigError::InvalidValue {
                var: "MCP_MESH_HTTP_PORT".to_string(),
                message: format!("'{raw}' is not a valid port"),
            })?,
            None => overrides.http_port.unwrap_or(8080),
        };

        let http_enabled = match env_var("MCP_MESH_HTTP_ENABLED") {
            Some(raw) => parse_bool(&raw, true),
            None => overrides.http_enabled.unwrap_or(true),
        };

        let http_endpoint_override = env_var("MCP_MESH_HTTP_ENDPOINT");

        let namespace = env_var("MCP_MESH_NAMESPACE").or_else(|| overrides.namespace.clone());

        let health_interval = match env_var("MCP_MESH_HEALTH_INTERVAL") {
            Some(raw) => parse_duration(&raw).map_err(|e| ConfigError::InvalidValue {
                var: "MCP_MESH_HEALTH_INTERVAL".to_string(),
                message: e.to_string(),
            })?,
            None => overrides
                .health_interval
                .unwrap_or(Duration::from_secs(15)),
        };

        let auto_run = match env_var("MCP_MESH_AUTO_RUN") {
            Some(raw) => parse_bool(&raw, !overrides.standalone),
            None => !overrides.standalone,
        };

        let auto_run_interval = env_var("MCP_MESH_AUTO_RUN_INTERVAL")
            .map(|raw| {
                parse_duration(&raw).map_err(|e| ConfigError::InvalidValue {
                    var: "MCP_MESH_AUTO_RUN_INTERVAL".to_string(),
                    message: e.to_string(),
                })
            })
            .transpose()?;

        let auth_token = env_var("MCP_MESH_AUTH_TOKEN");

        Ok(Self {
            registry_url,
            agent_name,
            http_host,
            http_port,
            http_enabled,
            http_endpoint_override,
            namespace,
            health_interval,
            auto_run,
            auto_run_interval,
            auth_token,
        })
    }

    /// The endpoint advertised to the registry: the explicit override if
    /// set, otherwise `http://host:port`.
    pub fn advertised_endpoint(&self) -> String {
        self.http_endpoint_override
            .clone()
            .unwrap_or_else(|| format!("http://{}:{}", self.http_host, self.http_port))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_with_no_env_or_overrides() {
        let config = AgentConfig::resolve(&ConfigOverrides::default()).unwrap();
        assert_eq!(config.registry_url, "http://localhost:8000");
        assert_eq!(config.agent_name, "agent");
        assert!(config.http_enabled);
        assert!(config.auto_run);
    }

    #[test]
    fn builder_override_beats_default_but_not_env() {
        let overrides = ConfigOverrides {
            name: Some("greeter".to_string()),
            ..Default::default()
        };
        let config = AgentConfig::resolve(&overrides).unwrap();
        assert_eq!(config.agent_name, "greeter");
    }

    #[test]
    fn standalone_override_disables_auto_run_without_env() {
        let overrides = ConfigOverrides {
            standalone: true,
            ..Default::default()
        };
        let config = AgentConfig::resolve(&overrides).unwrap();
        assert!(!config.auto_run);
    }
}
