//! Raw TOML deserialization types.
//!
//! These structs mirror the TOML file shape and use `serde` defaults.
//! The `load` module converts them into the public `types` structs.

use serde::Deserialize;

// ── Top-level ────────────────────────────────────────────────────────────────

/// Raw TOML shape: serde target before resolution.
#[derive(Deserialize, Default)]
pub(super) struct RawConfig {
    #[serde(default)]
    pub supervisor: RawSupervisor,
    #[serde(default)]
    pub comms: RawComms,
    #[serde(default)]
    pub llm: RawLlm,
    #[serde(default)]
    pub memory: RawMemory,
    #[serde(default)]
    pub agents: RawAgents,
    #[serde(default)]
    pub tools: RawTools,
    #[serde(default)]
    pub tasks: RawTasks,
}

#[derive(Deserialize)]
pub(super) struct RawSupervisor {
    #[serde(default = "default_service_name")]
    pub service_name: String,
    #[serde(default = "default_work_dir")]
    pub work_dir: String,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default)]
    pub log_file: Option<String>,
}

impl Default for RawSupervisor {
    fn default() -> Self {
        Self {
            service_name: default_service_name(),
            work_dir: default_work_dir(),
            log_level: default_log_level(),
            log_file: None,
        }
    }
}

// ── Comms ───────────────────────────────────────────────────────────────────

#[derive(Deserialize, Default)]
pub(super) struct RawComms {
    #[serde(default)]
    pub http: RawHttp,
}

#[derive(Deserialize)]
pub(super) struct RawHttp {
    #[serde(default = "default_http_bind")]
    pub bind: String,
    #[serde(default = "default_allowed_origins")]
    pub allowed_origins: Vec<String>,
}

impl Default for RawHttp {
    fn default() -> Self {
        Self { bind: default_http_bind(), allowed_origins: default_allowed_origins() }
    }
}

// ── LLM ──────────────────────────────────────────────────────────────────────

#[derive(Deserialize)]
pub(super) struct RawLlm {
    /// Maps to `default = "..."` in `[llm]`.
    #[serde(rename = "default", default = "default_llm_provider")]
    pub provider: String,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default)]
    pub openai: RawOpenAiConfig,
}

impl Default for RawLlm {
    fn default() -> Self {
        Self {
            provider: default_llm_provider(),
            max_tokens: default_max_tokens(),
            openai: RawOpenAiConfig::default(),
        }
    }
}

#[derive(Deserialize)]
pub(super) struct RawOpenAiConfig {
    #[serde(default = "default_openai_api_base_url")]
    pub api_base_url: String,
    #[serde(default = "default_openai_model")]
    pub model: String,
    #[serde(default = "default_openai_temperature")]
    pub temperature: f32,
    #[serde(default = "default_openai_timeout_seconds")]
    pub timeout_seconds: u64,
}

impl Default for RawOpenAiConfig {
    fn default() -> Self {
        Self {
            api_base_url: default_openai_api_base_url(),
            model: default_openai_model(),
            temperature: default_openai_temperature(),
            timeout_seconds: default_openai_timeout_seconds(),
        }
    }
}

// ── Memory / agents ──────────────────────────────────────────────────────────

#[derive(Deserialize, Default)]
pub(super) struct RawMemory {
    #[serde(default)]
    pub max_turns_per_owner: Option<usize>,
}

#[derive(Deserialize)]
pub(super) struct RawAgents {
    #[serde(default = "default_owner_id")]
    pub default_owner_id: i64,
    #[serde(default = "default_max_steps")]
    pub max_steps: usize,
}

impl Default for RawAgents {
    fn default() -> Self {
        Self { default_owner_id: default_owner_id(), max_steps: default_max_steps() }
    }
}

// ── Tools ────────────────────────────────────────────────────────────────────

#[derive(Deserialize, Default)]
pub(super) struct RawTools {
    #[serde(default)]
    pub database: RawDatabaseTool,
    #[serde(default)]
    pub terminal: RawTerminalTool,
    #[serde(default)]
    pub files: RawFilesTool,
    #[serde(default)]
    pub automation: RawAutomationTool,
    #[serde(default)]
    pub code_qa: RawCodeQaTool,
}

#[derive(Deserialize)]
pub(super) struct RawDatabaseTool {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_database_path")]
    pub path: String,
    #[serde(default = "default_true")]
    pub read_only: bool,
    #[serde(default = "default_max_rows")]
    pub max_rows: usize,
}

impl Default for RawDatabaseTool {
    fn default() -> Self {
        Self {
            enabled: true,
            path: default_database_path(),
            read_only: true,
            max_rows: default_max_rows(),
        }
    }
}

#[derive(Deserialize)]
pub(super) struct RawTerminalTool {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_allowed_commands")]
    pub allowed_commands: Vec<String>,
    /// Defaults to `false`: shell execution must be explicitly enabled.
    #[serde(default = "default_false")]
    pub allow_shell: bool,
    #[serde(default = "default_terminal_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default)]
    pub working_dir: Option<String>,
}

impl Default for RawTerminalTool {
    fn default() -> Self {
        Self {
            enabled: true,
            allowed_commands: default_allowed_commands(),
            allow_shell: false,
            timeout_secs: default_terminal_timeout_secs(),
            working_dir: None,
        }
    }
}

#[derive(Deserialize)]
pub(super) struct RawFilesTool {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_files_base_dir")]
    pub base_dir: String,
}

impl Default for RawFilesTool {
    fn default() -> Self {
        Self { enabled: true, base_dir: default_files_base_dir() }
    }
}

#[derive(Deserialize)]
pub(super) struct RawAutomationTool {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_automation_base_url")]
    pub base_url: String,
    #[serde(default = "default_automation_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for RawAutomationTool {
    fn default() -> Self {
        Self {
            enabled: true,
            base_url: default_automation_base_url(),
            timeout_secs: default_automation_timeout_secs(),
        }
    }
}

#[derive(Deserialize)]
pub(super) struct RawCodeQaTool {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_code_qa_root_dir")]
    pub root_dir: String,
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    #[serde(default = "default_top_k")]
    pub top_k: usize,
}

impl Default for RawCodeQaTool {
    fn default() -> Self {
        Self {
            enabled: true,
            root_dir: default_code_qa_root_dir(),
            chunk_size: default_chunk_size(),
            top_k: default_top_k(),
        }
    }
}

// ── Tasks ────────────────────────────────────────────────────────────────────

#[derive(Deserialize)]
pub(super) struct RawTasks {
    /// `"HH:MM:SS"` local time.
    #[serde(default = "default_request_limit_check")]
    pub request_limit_check: String,
}

impl Default for RawTasks {
    fn default() -> Self {
        Self { request_limit_check: default_request_limit_check() }
    }
}

// ── Defaults ─────────────────────────────────────────────────────────────────

fn default_service_name() -> String { "agentdesk".to_string() }
fn default_work_dir() -> String { "~/.agentdesk".to_string() }
fn default_log_level() -> String { "info".to_string() }
pub(super) fn default_http_bind() -> String { "127.0.0.1:3009".to_string() }
fn default_allowed_origins() -> Vec<String> { vec!["http://localhost:3000".to_string()] }
fn default_llm_provider() -> String { "dummy".to_string() }
fn default_max_tokens() -> u32 { 1227 }
fn default_openai_api_base_url() -> String { "https://api.openai.com/v1/chat/completions".to_string() }
fn default_openai_model() -> String { "gpt-3.5-turbo".to_string() }
fn default_openai_temperature() -> f32 { 0.7 }
fn default_openai_timeout_seconds() -> u64 { 60 }
fn default_owner_id() -> i64 { 1 }
fn default_max_steps() -> usize { 6 }
fn default_database_path() -> String { "business.db".to_string() }
fn default_max_rows() -> usize { 50 }
fn default_allowed_commands() -> Vec<String> {
    ["ls", "pwd", "echo", "date", "whoami"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}
fn default_terminal_timeout_secs() -> u64 { 30 }
fn default_files_base_dir() -> String { "ai-generated".to_string() }
fn default_automation_base_url() -> String { "https://nla.zapier.com/api/v1".to_string() }
fn default_automation_timeout_secs() -> u64 { 60 }
fn default_code_qa_root_dir() -> String { ".".to_string() }
fn default_chunk_size() -> usize { 1000 }
fn default_top_k() -> usize { 4 }
fn default_request_limit_check() -> String { "00:00:00".to_string() }

fn default_true() -> bool {
    true
}

fn default_false() -> bool {
    false
}
