use std::{
    fs,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result, anyhow, bail};
use jsonschema::JSONSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{
    audit::AuditConfig, flags::FeatureFlags, ledger::LedgerConfig, logging::LoggingConfig,
    orchestrator::OrchestratorConfig, reasoner::ReasonersConfig, reliability::ReliabilityConfig,
};

const SCHEMA_FILE_NAME: &str = "inflow.schema.json";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub orchestrator: OrchestratorConfig,
    #[serde(default)]
    pub context: ContextConfig,
    #[serde(default)]
    pub reasoners: ReasonersConfig,
    #[serde(default)]
    pub reliability: ReliabilityConfig,
    #[serde(default)]
    pub flags: FeatureFlags,
    #[serde(default)]
    pub ledger: LedgerConfig,
    #[serde(default)]
    pub audit: AuditConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

fn default_socket_path() -> PathBuf {
    PathBuf::from("inflow.sock")
}

fn default_http_timeout_ms() -> u64 {
    2_000
}

/// Where the three context stores live. A store without a URL is served from
/// `fixtures_path` (or left empty) in process.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextConfig {
    #[serde(default)]
    pub identity_graph_url: Option<String>,
    #[serde(default)]
    pub preference_engine_url: Option<String>,
    #[serde(default)]
    pub memory_service_url: Option<String>,
    #[serde(default)]
    pub fixtures_path: Option<PathBuf>,
    /// Transport-level timeout of the shared HTTP client.
    #[serde(default = "default_http_timeout_ms")]
    pub http_timeout_ms: u64,
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            identity_graph_url: None,
            preference_engine_url: None,
            memory_service_url: None,
            fixtures_path: None,
            http_timeout_ms: default_http_timeout_ms(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_socket_path")]
    pub socket_path: PathBuf,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            socket_path: default_socket_path(),
        }
    }
}

impl Config {
    pub fn load(config_path: &Path) -> Result<Self> {
        let config_content = fs::read_to_string(config_path)
            .with_context(|| format!("failed to read {}", config_path.display()))?;
        let config_value: Value = json5::from_str(&config_content)
            .with_context(|| format!("failed to parse {}", config_path.display()))?;

        let config_base = config_path.parent().unwrap_or_else(|| Path::new("."));
        let schema_path = resolve_schema_path(config_base, &config_value)?;
        validate_against_schema(&config_value, &schema_path)?;

        let mut config: Config =
            serde_json::from_value(config_value).context("failed to deserialize inflow config")?;

        if !config.server.socket_path.is_absolute() {
            config.server.socket_path = config_base.join(&config.server.socket_path);
        }
        if let Some(fixtures) = config.context.fixtures_path.as_mut()
            && !fixtures.is_absolute()
        {
            *fixtures = config_base.join(&*fixtures);
        }

        Ok(config)
    }
}

/// `$schema` wins when present (relative to the config file); otherwise the
/// schema must sit next to the config.
fn resolve_schema_path(config_base: &Path, config_value: &Value) -> Result<PathBuf> {
    match config_value.get("$schema").and_then(Value::as_str) {
        Some(declared) => Ok(config_base.join(declared)),
        None => {
            let sibling = config_base.join(SCHEMA_FILE_NAME);
            if !sibling.exists() {
                bail!(
                    "unable to resolve schema path: expected $schema in config \
                     or {SCHEMA_FILE_NAME} next to it"
                );
            }
            Ok(sibling)
        }
    }
}

fn validate_against_schema(config_value: &Value, schema_path: &Path) -> Result<()> {
    let schema_content = fs::read_to_string(schema_path)
        .with_context(|| format!("failed to read schema {}", schema_path.display()))?;
    let schema: Value = serde_json::from_str(&schema_content)
        .with_context(|| format!("failed to parse schema {}", schema_path.display()))?;
    let compiled = JSONSchema::compile(&schema)
        .map_err(|err| anyhow!("failed to compile schema {}: {err}", schema_path.display()))?;

    if let Err(errors) = compiled.validate(config_value) {
        let messages: Vec<String> = errors.map(|error| error.to_string()).collect();
        bail!("config validation failed: {}", messages.join("; "));
    }
    Ok(())
}
