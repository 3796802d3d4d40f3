//! Settings for every assay layer, read from `~/.assay/config.toml`.
//!
//! Each section maps onto one crate: `[agent]` the controller, `[executor]`
//! the interpreter lanes, `[stream]` the orchestrator, `[gateway]` the SSE
//! server. Missing keys take defaults; `ASSAY_*` variables override.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// The root configuration structure.
///
/// Maps directly to `~/.assay/config.toml`.
#[derive(Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// API key (can be overridden per-provider)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Default LLM provider
    #[serde(default = "default_provider")]
    pub default_provider: String,

    /// Default model
    #[serde(default = "default_model")]
    pub default_model: String,

    /// Default temperature
    #[serde(default = "default_temperature")]
    pub default_temperature: f32,

    /// Default max tokens per LLM response
    #[serde(default = "default_max_tokens")]
    pub default_max_tokens: u32,

    /// Conversation controller settings
    #[serde(default)]
    pub agent: AgentConfig,

    /// Action executor settings
    #[serde(default)]
    pub executor: ExecutorConfig,

    /// Stream orchestrator settings
    #[serde(default)]
    pub stream: StreamConfig,

    /// Gateway configuration
    #[serde(default)]
    pub gateway: GatewayConfig,

    /// Provider-specific configurations
    #[serde(default)]
    pub providers: HashMap<String, ProviderConfig>,
}

fn default_provider() -> String {
    "openai".into()
}
fn default_model() -> String {
    "gpt-4o".into()
}
fn default_temperature() -> f32 {
    0.7
}
fn default_max_tokens() -> u32 {
    4096
}

fn redact(s: &Option<String>) -> &'static str {
    match s {
        Some(_) => "[REDACTED]",
        None => "None",
    }
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("api_key", &redact(&self.api_key))
            .field("default_provider", &self.default_provider)
            .field("default_model", &self.default_model)
            .field("default_temperature", &self.default_temperature)
            .field("default_max_tokens", &self.default_max_tokens)
            .field("agent", &self.agent)
            .field("executor", &self.executor)
            .field("stream", &self.stream)
            .field("gateway", &self.gateway)
            .field("providers", &self.providers)
            .finish()
    }
}

impl std::fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("api_key", &redact(&self.api_key))
            .field("api_url", &self.api_url)
            .field("default_model", &self.default_model)
            .finish()
    }
}

/// Conversation controller limits and options.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Upper bound on controller transitions per session
    #[serde(default = "default_max_steps")]
    pub max_steps: u32,

    /// Consecutive untagged replies tolerated before the session ends
    #[serde(default = "default_parse_error_limit")]
    pub parse_error_limit: u32,

    /// Ask the model to critique its own answer before ending
    #[serde(default)]
    pub self_critic: bool,

    /// Number of critique rounds when `self_critic` is on
    #[serde(default)]
    pub critic_rounds: u32,

    /// Size the last observation is cut to when the context overflows
    #[serde(default = "default_recovery_truncate_chars")]
    pub recovery_truncate_chars: usize,

    /// Optional JSON resource catalog advertised in the system prompt
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub catalog_path: Option<PathBuf>,
}

fn default_max_steps() -> u32 {
    500
}
fn default_parse_error_limit() -> u32 {
    2
}
fn default_recovery_truncate_chars() -> usize {
    2000
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_steps: default_max_steps(),
            parse_error_limit: default_parse_error_limit(),
            self_critic: false,
            critic_rounds: 0,
            recovery_truncate_chars: default_recovery_truncate_chars(),
            catalog_path: None,
        }
    }
}

/// An interpreter command line. The source is fed on stdin.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InterpreterConfig {
    pub program: String,

    #[serde(default)]
    pub args: Vec<String>,
}

impl InterpreterConfig {
    fn new(program: &str, args: &[&str]) -> Self {
        Self {
            program: program.into(),
            args: args.iter().map(|a| (*a).to_string()).collect(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutorConfig {
    /// Per-invocation timeout
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Hard ceiling on observation length
    #[serde(default = "default_max_output_chars")]
    pub max_output_chars: usize,

    /// Observations longer than this get a length annotation
    #[serde(default = "default_summary_threshold_chars")]
    pub summary_threshold_chars: usize,

    /// Keep one Python worker per session so variables survive between
    /// actions. When off, every Python action starts a fresh interpreter
    /// with `python.args`.
    #[serde(default = "default_persistent_python")]
    pub persistent_python: bool,

    #[serde(default = "default_python")]
    pub python: InterpreterConfig,

    #[serde(default = "default_r")]
    pub r: InterpreterConfig,

    #[serde(default = "default_shell")]
    pub shell: InterpreterConfig,
}

fn default_timeout_secs() -> u64 {
    600
}
fn default_max_output_chars() -> usize {
    10_000
}
fn default_summary_threshold_chars() -> usize {
    5_000
}
fn default_persistent_python() -> bool {
    true
}
fn default_python() -> InterpreterConfig {
    InterpreterConfig::new("python3", &["-"])
}
fn default_r() -> InterpreterConfig {
    InterpreterConfig::new("Rscript", &["-"])
}
fn default_shell() -> InterpreterConfig {
    InterpreterConfig::new("bash", &["-s"])
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
            max_output_chars: default_max_output_chars(),
            summary_threshold_chars: default_summary_threshold_chars(),
            persistent_python: default_persistent_python(),
            python: default_python(),
            r: default_r(),
            shell: default_shell(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamConfig {
    /// Age at which a pending tool call is force-resolved. Kept above
    /// `executor.timeout_secs` so the executor's own timeout text arrives
    /// first.
    #[serde(default = "default_tool_timeout_secs")]
    pub tool_timeout_secs: u64,

    /// Idle interval between liveness checks
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Controller → orchestrator channel capacity
    #[serde(default = "default_capacity")]
    pub chunk_capacity: usize,

    /// Orchestrator → sink channel capacity
    #[serde(default = "default_capacity")]
    pub event_capacity: usize,
}

fn default_tool_timeout_secs() -> u64 {
    default_timeout_secs() + 30
}
fn default_poll_interval_ms() -> u64 {
    100
}
fn default_capacity() -> usize {
    256
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            tool_timeout_secs: default_tool_timeout_secs(),
            poll_interval_ms: default_poll_interval_ms(),
            chunk_capacity: default_capacity(),
            event_capacity: default_capacity(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default = "default_host")]
    pub host: String,
}

fn default_port() -> u16 {
    42680
}
fn default_host() -> String {
    "127.0.0.1".into()
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            host: default_host(),
        }
    }
}

#[derive(Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_url: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_model: Option<String>,
}

/// Environment variables consulted for the API key, first hit wins.
const API_KEY_VARS: &[&str] = &["ASSAY_API_KEY", "OPENAI_API_KEY", "OPENROUTER_API_KEY"];

impl AppConfig {
    /// `~/.assay/config.toml` (or defaults), then environment overrides.
    pub fn load() -> Result<Self, ConfigError> {
        let mut config = Self::load_from(&Self::config_dir().join("config.toml"))?;
        config.apply_env(|name| std::env::var(name).ok());
        Ok(config)
    }

    /// Parse and validate one file. A missing file yields defaults.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::info!(path = %path.display(), "Config file absent, using defaults");
            return Ok(Self::default());
        }

        let raw = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        let config: Self = toml::from_str(&raw).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        config.validate()?;
        for warning in config.warnings() {
            tracing::warn!(path = %path.display(), "{warning}");
        }
        Ok(config)
    }

    /// Apply `ASSAY_*` and key overrides. A key in the file is kept; the
    /// provider and model variables always win.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if self.api_key.is_none() {
            self.api_key = API_KEY_VARS.iter().find_map(|name| lookup(*name));
        }
        if let Some(provider) = lookup("ASSAY_PROVIDER") {
            self.default_provider = provider;
        }
        if let Some(model) = lookup("ASSAY_MODEL") {
            self.default_model = model;
        }
    }

    pub fn config_dir() -> PathBuf {
        home_dir().join(".assay")
    }

    /// Reject settings no session could run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let agent = &self.agent;
        let executor = &self.executor;
        let checks = [
            (
                (0.0..=2.0).contains(&self.default_temperature),
                "default_temperature must be between 0.0 and 2.0",
            ),
            (agent.max_steps > 0, "agent.max_steps must be > 0"),
            (agent.parse_error_limit > 0, "agent.parse_error_limit must be > 0"),
            (executor.timeout_secs > 0, "executor.timeout_secs must be > 0"),
            (self.stream.tool_timeout_secs > 0, "stream.tool_timeout_secs must be > 0"),
            (self.stream.poll_interval_ms > 0, "stream.poll_interval_ms must be > 0"),
            (
                executor.summary_threshold_chars < executor.max_output_chars,
                "executor.summary_threshold_chars must be below executor.max_output_chars",
            ),
        ];

        match checks.iter().find(|(ok, _)| !ok) {
            Some((_, problem)) => Err(ConfigError::ValidationError((*problem).into())),
            None => Ok(()),
        }
    }

    /// Settings that load but are probably not what was meant.
    pub fn warnings(&self) -> Vec<String> {
        let mut warnings = Vec::new();
        if self.stream.tool_timeout_secs <= self.executor.timeout_secs {
            warnings.push(format!(
                "stream.tool_timeout_secs ({}) is not above executor.timeout_secs ({}); \
                 slow actions will be force-resolved before the executor reports its own timeout",
                self.stream.tool_timeout_secs, self.executor.timeout_secs
            ));
        }
        warnings
    }

    /// Whether the default provider has a key from any source.
    pub fn has_api_key(&self) -> bool {
        self.api_key.is_some()
            || self
                .providers
                .get(&self.default_provider)
                .is_some_and(|p| p.api_key.is_some())
    }

    /// The defaults rendered as TOML, as written by `assay onboard`.
    pub fn default_toml() -> String {
        toml::to_string_pretty(&Self::default()).unwrap_or_default()
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            default_provider: default_provider(),
            default_model: default_model(),
            default_temperature: default_temperature(),
            default_max_tokens: default_max_tokens(),
            agent: AgentConfig::default(),
            executor: ExecutorConfig::default(),
            stream: StreamConfig::default(),
            gateway: GatewayConfig::default(),
            providers: HashMap::new(),
        }
    }
}

fn home_dir() -> PathBuf {
    let var = if cfg!(windows) { "USERPROFILE" } else { "HOME" };
    std::env::var_os(var)
        .map(PathBuf::from)
        .unwrap_or_else(std::env::temp_dir)
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {path}: {reason}")]
    ReadError { path: PathBuf, reason: String },

    #[error("Failed to parse config file at {path}: {reason}")]
    ParseError { path: PathBuf, reason: String },

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}
