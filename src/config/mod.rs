//! Configuration system (layered: defaults < TOML file < env < code).

use std::fmt;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::LoopError;

/// Loop ceiling used when nothing else is configured.
pub const DEFAULT_MAX_ITERATIONS: usize = 10;

const DEFAULT_MODEL: &str = "claude-sonnet-4-20250514";
const DEFAULT_MAX_TOKENS: u32 = 4096;
const DEFAULT_SYSTEM_PROMPT: &str = "You are a helpful assistant. Use the available tools when they help answer the user. \
Tools that change the system require the user's approval before they run.";

/// Runtime configuration for the loop and the server.
#[derive(Clone)]
pub struct LoopConfig {
    /// Completion provider name ("anthropic").
    pub provider: String,
    pub model: String,
    pub api_key: Option<String>,
    pub base_url: Option<String>,
    pub max_tokens: u32,
    /// Provider round-trips allowed per turn.
    pub max_iterations: usize,
    pub system_prompt: String,
    pub listen_addr: SocketAddr,
    /// Root directory for the reference tools.
    pub workspace_root: PathBuf,
    /// Advisory checks applied to finished replies.
    pub response: ResponseConfig,
}

/// Rules for the reply validator. All empty means no validator runs.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ResponseConfig {
    pub max_chars: Option<usize>,
    pub forbidden_phrases: Vec<String>,
    /// Regular expressions, compiled when the agent is built.
    pub forbidden_patterns: Vec<String>,
}

impl ResponseConfig {
    pub fn is_empty(&self) -> bool {
        self.max_chars.is_none()
            && self.forbidden_phrases.is_empty()
            && self.forbidden_patterns.is_empty()
    }
}

impl fmt::Debug for LoopConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoopConfig")
            .field("provider", &self.provider)
            .field("model", &self.model)
            .field("api_key", &self.api_key.as_ref().map(|_| ".."))
            .field("base_url", &self.base_url)
            .field("max_tokens", &self.max_tokens)
            .field("max_iterations", &self.max_iterations)
            .field("listen_addr", &self.listen_addr)
            .field("workspace_root", &self.workspace_root)
            .field("response", &self.response)
            .finish()
    }
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self {
            provider: "anthropic".to_string(),
            model: DEFAULT_MODEL.to_string(),
            api_key: None,
            base_url: None,
            max_tokens: DEFAULT_MAX_TOKENS,
            max_iterations: DEFAULT_MAX_ITERATIONS,
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
            listen_addr: SocketAddr::from(([127, 0, 0, 1], 8787)),
            workspace_root: PathBuf::from("."),
            response: ResponseConfig::default(),
        }
    }
}

/// On-disk shape; every field is optional and overrides the defaults.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct FileConfig {
    provider: Option<String>,
    model: Option<String>,
    api_key: Option<String>,
    base_url: Option<String>,
    max_tokens: Option<u32>,
    max_iterations: Option<usize>,
    system_prompt: Option<String>,
    listen_addr: Option<String>,
    workspace_root: Option<PathBuf>,
    response: Option<ResponseConfig>,
}

impl LoopConfig {
    /// Load defaults, then the TOML file, then environment variables.
    ///
    /// With `path = None` the platform config file
    /// (`<config dir>/loopgate/config.toml`) is used when it exists.
    pub fn load(path: Option<&Path>) -> Result<Self, LoopError> {
        let mut config = Self::default();
        let file = match path {
            Some(p) => Some(p.to_path_buf()),
            None => default_config_path().filter(|p| p.exists()),
        };
        if let Some(file) = file {
            let raw = std::fs::read_to_string(&file).map_err(|e| {
                LoopError::Configuration(format!("failed to read {}: {e}", file.display()))
            })?;
            config.merge_toml(&raw)?;
            tracing::debug!(path = %file.display(), "loaded config file");
        }
        let _ = dotenvy::dotenv();
        config.merge_env(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Defaults overlaid with environment variables only.
    pub fn from_env() -> Result<Self, LoopError> {
        let _ = dotenvy::dotenv();
        let mut config = Self::default();
        config.merge_env(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Overlay values from a TOML document.
    pub fn merge_toml(&mut self, raw: &str) -> Result<(), LoopError> {
        let file: FileConfig = toml::from_str(raw)
            .map_err(|e| LoopError::Configuration(format!("invalid config file: {e}")))?;

        if let Some(v) = file.provider {
            self.provider = v;
        }
        if let Some(v) = file.model {
            self.model = v;
        }
        if file.api_key.is_some() {
            self.api_key = file.api_key;
        }
        if file.base_url.is_some() {
            self.base_url = file.base_url;
        }
        if let Some(v) = file.max_tokens {
            self.max_tokens = v;
        }
        if let Some(v) = file.max_iterations {
            self.set_max_iterations(v)?;
        }
        if let Some(v) = file.system_prompt {
            self.system_prompt = v;
        }
        if let Some(v) = file.listen_addr {
            self.listen_addr = parse_addr(&v)?;
        }
        if let Some(v) = file.workspace_root {
            self.workspace_root = v;
        }
        if let Some(v) = file.response {
            self.response = v;
        }
        Ok(())
    }

    /// Overlay values from environment-style lookups.
    pub fn merge_env(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<(), LoopError> {
        if let Some(v) = lookup("ANTHROPIC_API_KEY") {
            self.api_key = Some(v);
        }
        if let Some(v) = lookup("ANTHROPIC_BASE_URL") {
            self.base_url = Some(v);
        }
        if let Some(v) = lookup("LOOPGATE_PROVIDER") {
            self.provider = v;
        }
        if let Some(v) = lookup("LOOPGATE_MODEL") {
            self.model = v;
        }
        if let Some(v) = lookup("LOOPGATE_MAX_TOKENS") {
            self.max_tokens = v.parse().map_err(|_| {
                LoopError::Configuration(format!("LOOPGATE_MAX_TOKENS is not a number: {v}"))
            })?;
        }
        if let Some(v) = lookup("LOOPGATE_MAX_ITERATIONS") {
            let parsed = v.parse().map_err(|_| {
                LoopError::Configuration(format!("LOOPGATE_MAX_ITERATIONS is not a number: {v}"))
            })?;
            self.set_max_iterations(parsed)?;
        }
        if let Some(v) = lookup("LOOPGATE_SYSTEM_PROMPT") {
            self.system_prompt = v;
        }
        if let Some(v) = lookup("LOOPGATE_LISTEN_ADDR") {
            self.listen_addr = parse_addr(&v)?;
        }
        if let Some(v) = lookup("LOOPGATE_WORKSPACE_ROOT") {
            self.workspace_root = PathBuf::from(v);
        }
        if let Some(v) = lookup("LOOPGATE_RESPONSE_MAX_CHARS") {
            let parsed = v.parse().map_err(|_| {
                LoopError::Configuration(format!(
                    "LOOPGATE_RESPONSE_MAX_CHARS is not a number: {v}"
                ))
            })?;
            self.response.max_chars = Some(parsed);
        }
        if let Some(v) = lookup("LOOPGATE_FORBIDDEN_PHRASES") {
            self.response.forbidden_phrases = split_list(&v);
        }
        Ok(())
    }

    fn set_max_iterations(&mut self, value: usize) -> Result<(), LoopError> {
        if value == 0 {
            return Err(LoopError::Configuration(
                "max_iterations must be at least 1".into(),
            ));
        }
        self.max_iterations = value;
        Ok(())
    }
}

/// `<platform config dir>/loopgate/config.toml`, if a home directory exists.
pub fn default_config_path() -> Option<PathBuf> {
    directories::ProjectDirs::from("", "", "loopgate")
        .map(|dirs| dirs.config_dir().join("config.toml"))
}

/// Comma-separated env list, blanks dropped.
fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(str::to_string)
        .collect()
}

fn parse_addr(raw: &str) -> Result<SocketAddr, LoopError> {
    raw.parse()
        .map_err(|_| LoopError::Configuration(format!("invalid listen address: {raw}")))
}
