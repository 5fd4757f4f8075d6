//! Configuration management for Nodegate.

use ::config::{Environment, File, FileFormat};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use tracing::info;

use crate::admission::{validate_descriptors, NodeDescriptor};
use crate::error::{NodegateError, Result};

/// Prefix for environment overrides, e.g. `NODEGATE__SERVER__HTTP_ADDR`.
const ENV_PREFIX: &str = "NODEGATE";
const ENV_SEPARATOR: &str = "__";

/// Main configuration for the Nodegate service.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NodegateConfig {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Nodes declared inline, in admission order
    #[serde(default)]
    pub nodes: Vec<NodeDescriptor>,

    /// Path to a JSON node list, appended after the inline nodes
    #[serde(default)]
    pub nodes_file: Option<PathBuf>,
}

/// Server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// HTTP ingress address
    #[serde(default = "default_http_addr")]
    pub http_addr: SocketAddr,

    /// Largest request body accepted by the ingress, in bytes
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            http_addr: default_http_addr(),
            max_body_bytes: default_max_body_bytes(),
        }
    }
}

fn default_http_addr() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 8080))
}

fn default_max_body_bytes() -> usize {
    1024 * 1024
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default filter directive, overridden by `RUST_LOG`
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Emit JSON lines instead of human-readable output
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

impl NodegateConfig {
    /// Load configuration from an optional file, layered with `NODEGATE__*`
    /// environment overrides.
    ///
    /// The file format is inferred from its extension. Without a file the
    /// defaults are used as the base layer.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        Self::load_with_env(path, environment())
    }

    /// Load configuration from a file, layered with environment overrides.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::load(Some(path.as_ref()))
    }

    fn load_with_env(path: Option<&Path>, env: Environment) -> Result<Self> {
        let mut builder = ::config::Config::builder();
        if let Some(path) = path {
            info!(path = %path.display(), "Loading configuration");
            builder = builder.add_source(File::from(path));
        }

        let settings = builder.add_source(env).build()?;
        Ok(settings.try_deserialize()?)
    }

    /// Load configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        Self::from_str_with_format(yaml, FileFormat::Yaml)
    }

    /// Load configuration from a JSON string.
    pub fn from_json(json: &str) -> Result<Self> {
        Self::from_str_with_format(json, FileFormat::Json)
    }

    fn from_str_with_format(contents: &str, format: FileFormat) -> Result<Self> {
        let settings = ::config::Config::builder()
            .add_source(File::from_str(contents, format))
            .build()?;
        Ok(settings.try_deserialize()?)
    }

    /// Collect the configured nodes: inline ones first, then `nodes_file`.
    ///
    /// The combined list is validated as a whole.
    pub fn load_nodes(&self) -> Result<Vec<NodeDescriptor>> {
        let mut nodes = self.nodes.clone();
        if let Some(ref path) = self.nodes_file {
            nodes.extend(load_node_list(path)?);
        }

        validate_descriptors(&nodes)?;
        Ok(nodes)
    }
}

fn environment() -> Environment {
    Environment::with_prefix(ENV_PREFIX)
        .prefix_separator(ENV_SEPARATOR)
        .separator(ENV_SEPARATOR)
        .try_parsing(true)
}

/// Read a JSON node list from disk.
pub fn load_node_list<P: AsRef<Path>>(path: P) -> Result<Vec<NodeDescriptor>> {
    let path = path.as_ref();
    info!(path = %path.display(), "Loading node list");

    let contents = std::fs::read_to_string(path)?;
    parse_node_list(&contents)
}

/// Parse a JSON array of node descriptors.
pub fn parse_node_list(json: &str) -> Result<Vec<NodeDescriptor>> {
    serde_json::from_str(json)
        .map_err(|e| NodegateError::Config(format!("Failed to parse node list: {}", e)))
}
