//! Configuration loading with env-var overrides.
//!
//! Reads one TOML file, resolves relative tool paths against `work_dir`,
//! then applies `AGENTDESK_WORK_DIR` / `AGENTDESK_LOG_LEVEL` and the
//! secret-bearing environment variables.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use crate::core::error::AppError;

use super::raw::RawConfig;
use super::types::*;

/// Load config from the given path, or `config/default.toml`, then apply env-var overrides.
/// If no path is given and `config/default.toml` does not exist, every section takes its
/// serde default.
pub fn load(config_path: Option<&str>) -> Result<Config, AppError> {
    let work_dir_override = env::var("AGENTDESK_WORK_DIR").ok();
    let log_level_override = env::var("AGENTDESK_LOG_LEVEL").ok();

    let mut config = match config_path {
        Some(path) => load_from(
            Path::new(path),
            work_dir_override.as_deref(),
            log_level_override.as_deref(),
        )?,
        None => {
            let default_path = Path::new("config/default.toml");
            if default_path.exists() {
                load_from(
                    default_path,
                    work_dir_override.as_deref(),
                    log_level_override.as_deref(),
                )?
            } else {
                resolve(
                    RawConfig::default(),
                    work_dir_override.as_deref(),
                    log_level_override.as_deref(),
                )?
            }
        }
    };

    apply_env(&mut config, |key| env::var(key).ok())?;
    Ok(config)
}

/// Internal loader: accepts an explicit path and optional overrides.
/// Tests pass overrides directly instead of mutating env vars.
pub fn load_from(
    path: &Path,
    work_dir_override: Option<&str>,
    log_level_override: Option<&str>,
) -> Result<Config, AppError> {
    let raw = fs::read_to_string(path)
        .map_err(|e| AppError::Config(format!("cannot read {}: {e}", path.display())))?;

    let parsed: RawConfig = toml::from_str(&raw)
        .map_err(|e| AppError::Config(format!("config error in {}: {e}", path.display())))?;

    resolve(parsed, work_dir_override, log_level_override)
}

fn resolve(
    parsed: RawConfig,
    work_dir_override: Option<&str>,
    log_level_override: Option<&str>,
) -> Result<Config, AppError> {
    let s = parsed.supervisor;

    let work_dir = expand_home(work_dir_override.unwrap_or(&s.work_dir));
    let log_level = log_level_override.unwrap_or(&s.log_level).to_string();
    let log_file = s.log_file.map(|p| under(&work_dir, &p));

    let request_limit_check = parse_time_of_day(&parsed.tasks.request_limit_check)?;

    let t = parsed.tools;

    Ok(Config {
        service_name: s.service_name,
        log_level,
        log_file,
        comms: CommsConfig {
            http: HttpConfig {
                bind: parsed.comms.http.bind,
                allowed_origins: parsed.comms.http.allowed_origins,
            },
        },
        llm: LlmConfig {
            provider: parsed.llm.provider,
            max_tokens: parsed.llm.max_tokens,
            openai: OpenAiConfig {
                api_base_url: parsed.llm.openai.api_base_url,
                model: parsed.llm.openai.model,
                temperature: parsed.llm.openai.temperature,
                timeout_seconds: parsed.llm.openai.timeout_seconds,
            },
        },
        memory: MemoryConfig {
            max_turns_per_owner: parsed.memory.max_turns_per_owner.filter(|n| *n > 0),
        },
        agents: AgentsConfig {
            default_owner_id: parsed.agents.default_owner_id,
            max_steps: parsed.agents.max_steps.max(1),
        },
        tools: ToolsConfig {
            database: DatabaseToolConfig {
                enabled: t.database.enabled,
                path: under(&work_dir, &t.database.path),
                read_only: t.database.read_only,
                max_rows: t.database.max_rows.max(1),
            },
            terminal: TerminalToolConfig {
                enabled: t.terminal.enabled,
                allowed_commands: t.terminal.allowed_commands,
                allow_shell: t.terminal.allow_shell,
                timeout_secs: t.terminal.timeout_secs.max(1),
                working_dir: t.terminal.working_dir.map(|p| under(&work_dir, &p)),
            },
            files: FilesToolConfig {
                enabled: t.files.enabled,
                base_dir: under(&work_dir, &t.files.base_dir),
            },
            automation: AutomationToolConfig {
                enabled: t.automation.enabled,
                base_url: t.automation.base_url.trim_end_matches('/').to_string(),
                timeout_secs: t.automation.timeout_secs.max(1),
                api_key: None,
            },
            code_qa: CodeQaToolConfig {
                enabled: t.code_qa.enabled,
                root_dir: under(&work_dir, &t.code_qa.root_dir),
                chunk_size: t.code_qa.chunk_size.max(1),
                top_k: t.code_qa.top_k.max(1),
            },
        },
        tasks: TasksConfig { request_limit_check },
        secrets: SecretsConfig::default(),
        work_dir,
    })
}

/// Apply environment-sourced values: `PORT` and the credentials.
/// `lookup` is `std::env::var` in production; tests pass a map.
pub fn apply_env<F>(config: &mut Config, lookup: F) -> Result<(), AppError>
where
    F: Fn(&str) -> Option<String>,
{
    let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

    if let Some(port) = non_empty("PORT") {
        let port: u16 = port
            .trim()
            .parse()
            .map_err(|_| AppError::Config(format!("PORT is not a valid port: {port}")))?;
        config.comms.http.bind = replace_port(&config.comms.http.bind, port);
    }

    config.secrets.llm_api_key = non_empty("LLM_API_KEY").or_else(|| non_empty("OPENAI_API_KEY"));
    config.secrets.jwt_secret = non_empty("JWT_SECRET");
    config.secrets.google = non_empty("GOOGLE_CLIENT_ID").map(|client_id| OAuthClient {
        client_id,
        client_secret: non_empty("GOOGLE_CLIENT_SECRET"),
    });
    config.secrets.facebook = non_empty("FACEBOOK_CLIENT_ID").map(|client_id| OAuthClient {
        client_id,
        client_secret: non_empty("FACEBOOK_CLIENT_SECRET"),
    });
    config.tools.automation.api_key = non_empty("ZAPIER_NLA_API_KEY");
    Ok(())
}

/// Parse `"HH:MM:SS"` (seconds optional) into a [`TimeOfDay`].
pub fn parse_time_of_day(value: &str) -> Result<TimeOfDay, AppError> {
    let bad = || AppError::Config(format!("invalid time of day (want HH:MM[:SS]): {value}"));
    let parts: Vec<&str> = value.trim().split(':').collect();
    if !(2..=3).contains(&parts.len()) {
        return Err(bad());
    }
    let field = |s: &str, max: u32| -> Result<u32, AppError> {
        let n: u32 = s.parse().map_err(|_| bad())?;
        if n > max { Err(bad()) } else { Ok(n) }
    };
    Ok(TimeOfDay {
        hour: field(parts[0], 23)?,
        minute: field(parts[1], 59)?,
        second: match parts.get(2) {
            Some(s) => field(s, 59)?,
            None => 0,
        },
    })
}

/// Expand a leading `~` to the user's home directory.
/// Absolute or relative paths without `~` are returned unchanged.
pub fn expand_home(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    if path == "~" {
        if let Some(home) = dirs::home_dir() {
            return home;
        }
    }
    PathBuf::from(path)
}

/// Relative paths are anchored at `work_dir`; `~` and absolute paths are kept.
fn under(work_dir: &Path, path: &str) -> PathBuf {
    let p = expand_home(path);
    if p.is_absolute() { p } else { work_dir.join(p) }
}

fn replace_port(bind: &str, port: u16) -> String {
    match bind.rsplit_once(':') {
        Some((host, _)) => format!("{host}:{port}"),
        None => format!("{bind}:{port}"),
    }
}
