//! Configuration for the relay server.
//!
//! Configuration is loaded in order of precedence:
//! 1. Environment variables (highest priority)
//! 2. Config file (~/.config/llm-relay/config.toml, or `--cfg-file`)
//! 3. Built-in defaults (lowest priority)

use anyhow::{Context, Result};
use serde::Deserialize;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

pub mod routing;

pub use routing::{Route, RouteFile, RouteTable, UpstreamFile, UpstreamProtocol};

/// Version info
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

const DEFAULT_TIMEOUT_SECONDS: u64 = 60;

// ─────────────────────────────────────────────────────────────────────────────
// Application configuration
// ─────────────────────────────────────────────────────────────────────────────

/// Resolved application configuration, ready for the runtime to consume.
#[derive(Debug, Clone)]
pub struct Config {
    /// Address to bind the relay's HTTP server to.
    pub bind_addr: SocketAddr,

    /// Directory for trajectory logs.
    pub log_dir: PathBuf,

    /// Resolved, validated route table.
    pub routes: RouteTable,
}

impl Config {
    /// Get the config file path: ~/.config/llm-relay/config.toml
    pub fn default_config_path() -> Option<PathBuf> {
        dirs::home_dir().map(|p| p.join(".config").join("llm-relay").join("config.toml"))
    }

    /// Create a config file with an empty route table if one doesn't already exist.
    pub fn ensure_config_exists(path: &Path) {
        if path.exists() {
            return;
        }
        if let Some(parent) = path.parent() {
            if std::fs::create_dir_all(parent).is_err() {
                return;
            }
        }
        let _ = std::fs::write(path, FileConfig::default().to_toml());
    }

    fn load_file_config(path: &Path) -> Result<FileConfig> {
        match std::fs::read_to_string(path) {
            Ok(contents) => {
                toml::from_str(&contents).with_context(|| format!("parsing {}", path.display()))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(FileConfig::default()),
            Err(e) => Err(e).with_context(|| format!("reading {}", path.display())),
        }
    }

    /// Load configuration: CLI overrides > env vars > file > defaults.
    pub fn load(
        cfg_file: Option<PathBuf>,
        host_override: Option<String>,
        port_override: Option<u16>,
        log_dir_override: Option<PathBuf>,
    ) -> Result<Self> {
        let path = cfg_file
            .or_else(Self::default_config_path)
            .context("could not determine config file path (no home directory)")?;
        let file = Self::load_file_config(&path)?;

        let bind_addr = {
            let host = host_override
                .or_else(|| std::env::var("LLM_RELAY_HOST").ok())
                .or(file.host)
                .unwrap_or_else(|| "127.0.0.1".to_string());
            let port = port_override
                .or_else(|| {
                    std::env::var("LLM_RELAY_PORT")
                        .ok()
                        .and_then(|v| v.parse().ok())
                })
                .or(file.port)
                .unwrap_or(18080);
            format!("{host}:{port}")
                .parse::<SocketAddr>()
                .with_context(|| format!("invalid bind address {host}:{port}"))?
        };

        let log_dir = log_dir_override
            .or_else(|| std::env::var("LLM_RELAY_LOG_DIR").ok().map(PathBuf::from))
            .or_else(|| file.log_dir.clone().map(PathBuf::from))
            .unwrap_or_else(|| PathBuf::from("./logs"));

        let default_timeout = file
            .defaults
            .as_ref()
            .and_then(|d| d.timeout_seconds)
            .unwrap_or(DEFAULT_TIMEOUT_SECONDS);

        let routes = RouteTable::from_files(file.routes, default_timeout)
            .context("building route table from config")?;

        Ok(Config {
            bind_addr,
            log_dir,
            routes,
        })
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// File configuration (deserialization layer)
// ─────────────────────────────────────────────────────────────────────────────

/// Config file structure (the subset of `Config` that persists to disk).
#[derive(Debug, Deserialize, Default)]
pub struct FileConfig {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub log_dir: Option<String>,
    pub defaults: Option<routing::DefaultsFile>,
    #[serde(default)]
    pub routes: Vec<RouteFile>,
}

impl FileConfig {
    /// Render the template written by `Config::ensure_config_exists`.
    pub fn to_toml(&self) -> String {
        let mut out = String::new();
        out.push_str("# llm-relay configuration\n\n");
        out.push_str("host = \"127.0.0.1\"\n");
        out.push_str("port = 18080\n");
        out.push_str("log_dir = \"./logs\"\n\n");
        out.push_str("[defaults]\n");
        out.push_str("timeout_seconds = 60\n\n");
        out.push_str("# [[routes]]\n");
        out.push_str("# name = \"claude\"\n");
        out.push_str("# request_model = \"claude-*\"\n");
        out.push_str("# [routes.upstream]\n");
        out.push_str("# provider = \"anthropic\"\n");
        out.push_str("# base_url = \"https://api.anthropic.com\"\n");
        out.push_str("# api_key_ref = \"ENV:ANTHROPIC_API_KEY\"\n");
        out
    }
}
