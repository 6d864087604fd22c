//! Configuration for `caseflow serve`.
//!
//! Settings come from four layers, highest precedence first: command-line
//! flags, environment variables, a TOML file, built-in defaults.
//!
//! # Example
//!
//! ```toml
//! [server]
//! port = 8080
//! rate_limit = 120
//! api_key = "local-dev-key"
//!
//! [catalog]
//! path = "catalog.json"
//!
//! [events]
//! path = "events.json"
//! ```
//!
//! Relative paths in the file resolve against the file's own directory.

use std::path::{Path, PathBuf};

use serde::Deserialize;

pub(crate) const DEFAULT_PORT: u16 = 8080;

/// Default rate limit: 60 requests per minute per IP.
pub(crate) const DEFAULT_RATE_LIMIT: u64 = 60;

pub(crate) const ENV_API_KEY: &str = "CASEFLOW_API_KEY";
pub(crate) const ENV_RATE_LIMIT: &str = "CASEFLOW_RATE_LIMIT";

// ── File format ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, Deserialize)]
pub(crate) struct ServeConfig {
    #[serde(default)]
    pub(crate) server: ServerSection,
    pub(crate) catalog: Option<PathSection>,
    pub(crate) events: Option<PathSection>,
}

/// `[server]` section.
#[derive(Debug, Clone, Default, Deserialize)]
pub(crate) struct ServerSection {
    pub(crate) port: Option<u16>,
    pub(crate) rate_limit: Option<u64>,
    pub(crate) api_key: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct PathSection {
    pub(crate) path: PathBuf,
}

/// Read and parse a serve config TOML file from `path`.
///
/// Returns a human-readable error string on failure.
pub(crate) fn read_serve_config(path: &Path) -> Result<ServeConfig, String> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| format!("could not read '{}': {}", path.display(), e))?;

    let mut config: ServeConfig = toml::from_str(&content)
        .map_err(|e| format!("could not parse '{}': {}", path.display(), e))?;

    if let Some(base) = path.parent() {
        for section in [&mut config.catalog, &mut config.events].into_iter().flatten() {
            if section.path.is_relative() {
                section.path = base.join(&section.path);
            }
        }
    }
    Ok(config)
}

// ── Resolution ────────────────────────────────────────────────────────────────

/// Values given on the command line.
#[derive(Debug, Clone, Default)]
pub(crate) struct ServeFlags {
    pub(crate) port: Option<u16>,
    pub(crate) catalog: Option<PathBuf>,
    pub(crate) events: Option<PathBuf>,
}

/// Fully resolved server settings.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct ServeSettings {
    pub(crate) port: u16,
    pub(crate) catalog: PathBuf,
    pub(crate) events: Option<PathBuf>,
    pub(crate) rate_limit: u64,
    pub(crate) api_key: Option<String>,
}

/// Merge flags, environment and file into final settings.
///
/// `env` looks up an environment variable; empty values count as unset.
pub(crate) fn resolve(
    flags: ServeFlags,
    env: impl Fn(&str) -> Option<String>,
    file: ServeConfig,
) -> Result<ServeSettings, String> {
    let env = |name: &str| env(name).filter(|v| !v.trim().is_empty());

    let catalog = flags
        .catalog
        .or(file.catalog.map(|s| s.path))
        .ok_or_else(|| "no catalog given: pass --catalog or set [catalog] path".to_string())?;

    let rate_limit = match env(ENV_RATE_LIMIT) {
        Some(raw) => raw
            .trim()
            .parse::<u64>()
            .map_err(|_| format!("{} must be a positive integer, got '{}'", ENV_RATE_LIMIT, raw))?,
        None => file.server.rate_limit.unwrap_or(DEFAULT_RATE_LIMIT),
    };
    if rate_limit == 0 {
        return Err("rate limit must be at least 1 request per minute".to_string());
    }

    Ok(ServeSettings {
        port: flags.port.or(file.server.port).unwrap_or(DEFAULT_PORT),
        catalog,
        events: flags.events.or(file.events.map(|s| s.path)),
        rate_limit,
        api_key: env(ENV_API_KEY).or(file.server.api_key.filter(|k| !k.is_empty())),
    })
}
