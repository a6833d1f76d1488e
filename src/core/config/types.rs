//! Public configuration types.
//!
//! These are the resolved, ready-to-use structs that subsystems consume.
//! Raw TOML deserialization types live in `raw.rs`.

use std::path::PathBuf;

// ── Comms ───────────────────────────────────────────────────────────────────

/// HTTP surface configuration.
#[derive(Debug, Clone)]
pub struct HttpConfig {
    /// Socket address to bind the listener to (`PORT` env overrides the port).
    pub bind: String,
    /// Origins allowed by the CORS layer.
    pub allowed_origins: Vec<String>,
}

/// Comms subsystem configuration.
#[derive(Debug, Clone)]
pub struct CommsConfig {
    pub http: HttpConfig,
}

// ── LLM ──────────────────────────────────────────────────────────────────────

/// OpenAI / OpenAI-compatible provider configuration.
/// Populated from `[llm.openai]` in the TOML.
#[derive(Debug, Clone)]
pub struct OpenAiConfig {
    /// Full chat completions endpoint URL.
    pub api_base_url: String,
    /// Model name passed in the request body.
    pub model: String,
    /// Sampling temperature used when a request does not carry its own.
    pub temperature: f32,
    /// Per-request HTTP timeout in seconds.
    pub timeout_seconds: u64,
}

/// LLM subsystem configuration.
#[derive(Debug, Clone)]
pub struct LlmConfig {
    /// Which provider is active (`"dummy"`, `"openai"`).
    pub provider: String,
    /// Completion token cap applied to every request.
    pub max_tokens: u32,
    pub openai: OpenAiConfig,
}

// ── Memory ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default)]
pub struct MemoryConfig {
    /// Keep at most this many turns per owner; `None` keeps everything.
    pub max_turns_per_owner: Option<usize>,
}

// ── Agents ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct AgentsConfig {
    /// Owner id recorded for turns when a request does not name one.
    pub default_owner_id: i64,
    /// Upper bound on tool calls per chat request.
    pub max_steps: usize,
}

// ── Tools ────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct DatabaseToolConfig {
    pub enabled: bool,
    /// SQLite database the capability runs queries against.
    pub path: PathBuf,
    /// Reject statements SQLite does not report as read-only.
    pub read_only: bool,
    pub max_rows: usize,
}

#[derive(Debug, Clone)]
pub struct TerminalToolConfig {
    pub enabled: bool,
    /// Programs that may be executed (matched against the first token).
    pub allowed_commands: Vec<String>,
    /// Opt-in to arbitrary `sh -c` execution; bypasses `allowed_commands`.
    pub allow_shell: bool,
    pub timeout_secs: u64,
    pub working_dir: Option<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct FilesToolConfig {
    pub enabled: bool,
    /// Directory every written/read file lives in.
    pub base_dir: PathBuf,
}

#[derive(Debug, Clone)]
pub struct AutomationToolConfig {
    pub enabled: bool,
    /// Gateway API root, e.g. `https://nla.zapier.com/api/v1`.
    pub base_url: String,
    pub timeout_secs: u64,
    /// From `ZAPIER_NLA_API_KEY`: never sourced from TOML.
    pub api_key: Option<String>,
}

#[derive(Debug, Clone)]
pub struct CodeQaToolConfig {
    pub enabled: bool,
    /// Directory that `path` inputs are resolved under.
    pub root_dir: PathBuf,
    pub chunk_size: usize,
    pub top_k: usize,
}

#[derive(Debug, Clone)]
pub struct ToolsConfig {
    pub database: DatabaseToolConfig,
    pub terminal: TerminalToolConfig,
    pub files: FilesToolConfig,
    pub automation: AutomationToolConfig,
    pub code_qa: CodeQaToolConfig,
}

// ── Tasks ────────────────────────────────────────────────────────────────────

/// Wall-clock time of day used by daily schedules.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeOfDay {
    pub hour: u32,
    pub minute: u32,
    pub second: u32,
}

#[derive(Debug, Clone)]
pub struct TasksConfig {
    /// When the daily request-limit check fires (local time).
    pub request_limit_check: TimeOfDay,
}

// ── Secrets ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct OAuthClient {
    pub client_id: String,
    pub client_secret: Option<String>,
}

/// Credentials loaded from the environment only.  Unset stays `None`.
#[derive(Debug, Clone, Default)]
pub struct SecretsConfig {
    /// `LLM_API_KEY`, falling back to `OPENAI_API_KEY`.
    pub llm_api_key: Option<String>,
    pub jwt_secret: Option<String>,
    pub google: Option<OAuthClient>,
    pub facebook: Option<OAuthClient>,
}

// ── Top-level ────────────────────────────────────────────────────────────────

/// Fully-resolved service configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub service_name: String,
    /// Working directory for all persistent data (already expanded, no `~`).
    pub work_dir: PathBuf,
    pub log_level: String,
    /// Append logs to this file instead of stderr.
    pub log_file: Option<PathBuf>,
    pub comms: CommsConfig,
    pub llm: LlmConfig,
    pub memory: MemoryConfig,
    pub agents: AgentsConfig,
    pub tools: ToolsConfig,
    pub tasks: TasksConfig,
    pub secrets: SecretsConfig,
}
