//! Configuration loading with env-var overrides.
//!
//! Reads `config/default.toml` relative to the current working directory
//! (or the `-f` path), then applies `AGENTDESK_WORK_DIR`,
//! `AGENTDESK_LOG_LEVEL`, `PORT` and the credential variables.
//!
//! # Module layout
//!
//! - **types**: Public configuration structs consumed by subsystems
//!   (`Config`, `LlmConfig`, `ToolsConfig`, etc.).
//! - **raw**: Raw TOML deserialization types (`RawConfig`, `RawTools`, …).
//!   These mirror the file shape and use serde defaults; kept private.
//! - **load**: Loading logic: `load`, `load_from`, `apply_env`,
//!   `parse_time_of_day`, `expand_home`.

mod load;
mod raw;
mod types;

pub use load::{apply_env, expand_home, load, load_from, parse_time_of_day};
pub use types::*;

impl Config {
    /// Safe `Config` for tests: dummy LLM, no API keys, no external calls.
    /// Every tool path lives under `work_dir`.
    pub fn test_default(work_dir: &std::path::Path) -> Self {
        Self {
            service_name: "test".into(),
            work_dir: work_dir.to_path_buf(),
            log_level: "info".into(),
            log_file: None,
            comms: CommsConfig {
                http: HttpConfig {
                    bind: raw::default_http_bind(),
                    allowed_origins: vec!["http://localhost:3000".into()],
                },
            },
            llm: LlmConfig {
                provider: "dummy".into(),
                max_tokens: 1227,
                openai: OpenAiConfig {
                    api_base_url: "http://localhost:0/v1/chat/completions".into(),
                    model: "test-model".into(),
                    temperature: 0.0,
                    timeout_seconds: 1,
                },
            },
            memory: MemoryConfig::default(),
            agents: AgentsConfig { default_owner_id: 1, max_steps: 6 },
            tools: ToolsConfig {
                database: DatabaseToolConfig {
                    enabled: true,
                    path: work_dir.join("business.db"),
                    read_only: true,
                    max_rows: 50,
                },
                terminal: TerminalToolConfig {
                    enabled: true,
                    allowed_commands: vec!["echo".into(), "ls".into(), "sh".into()],
                    allow_shell: false,
                    timeout_secs: 5,
                    working_dir: Some(work_dir.to_path_buf()),
                },
                files: FilesToolConfig {
                    enabled: true,
                    base_dir: work_dir.join("ai-generated"),
                },
                automation: AutomationToolConfig {
                    enabled: true,
                    base_url: "http://localhost:0/api/v1".into(),
                    timeout_secs: 1,
                    api_key: None,
                },
                code_qa: CodeQaToolConfig {
                    enabled: true,
                    root_dir: work_dir.join("code"),
                    chunk_size: 1000,
                    top_k: 4,
                },
            },
            tasks: TasksConfig {
                request_limit_check: TimeOfDay { hour: 0, minute: 0, second: 0 },
            },
            secrets: SecretsConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;
    use std::path::{Path, PathBuf};
    use tempfile::NamedTempFile;

    const MINIMAL_TOML: &str = r#"
[supervisor]
service_name = "test-desk"
work_dir = "/srv/agentdesk"
log_level = "info"
"#;

    fn write_toml(content: &str) -> NamedTempFile {
        let mut f = NamedTempFile::new().unwrap();
        f.write_all(content.as_bytes()).unwrap();
        f
    }

    fn env_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> =
            pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn parse_basic_config() {
        let f = write_toml(MINIMAL_TOML);
        let cfg = load_from(f.path(), None, None).unwrap();
        assert_eq!(cfg.service_name, "test-desk");
        assert_eq!(cfg.log_level, "info");
        assert_eq!(cfg.work_dir, PathBuf::from("/srv/agentdesk"));
    }

    #[test]
    fn defaults_match_documented_values() {
        let f = write_toml(MINIMAL_TOML);
        let cfg = load_from(f.path(), None, None).unwrap();
        assert_eq!(cfg.comms.http.bind, "127.0.0.1:3009");
        assert_eq!(cfg.comms.http.allowed_origins, vec!["http://localhost:3000"]);
        assert_eq!(cfg.llm.max_tokens, 1227);
        assert_eq!(cfg.llm.provider, "dummy");
        assert_eq!(cfg.agents.default_owner_id, 1);
        assert_eq!(cfg.agents.max_steps, 6);
        assert!(cfg.tools.database.read_only);
        assert!(!cfg.tools.terminal.allow_shell);
        assert_eq!(cfg.tools.code_qa.chunk_size, 1000);
        assert_eq!(cfg.tools.code_qa.top_k, 4);
        assert_eq!(
            cfg.tasks.request_limit_check,
            TimeOfDay { hour: 0, minute: 0, second: 0 }
        );
        assert!(cfg.memory.max_turns_per_owner.is_none());
    }

    #[test]
    fn shipped_defaults_keep_escape_hatches_off_the_allow_list() {
        let shipped = Path::new(env!("CARGO_MANIFEST_DIR")).join("config/default.toml");
        let from_file = load_from(&shipped, Some("/tmp/desk"), None).unwrap();
        let f = write_toml(MINIMAL_TOML);
        let built_in = load_from(f.path(), None, None).unwrap();

        for cfg in [&from_file, &built_in] {
            let allowed = &cfg.tools.terminal.allowed_commands;
            for risky in ["git", "cat", "sh", "bash", "env", "xargs", "find"] {
                assert!(!allowed.iter().any(|c| c == risky), "{risky} is allowed by default");
            }
            assert!(!cfg.tools.terminal.allow_shell);
        }
    }

    #[test]
    fn relative_tool_paths_resolve_under_work_dir() {
        let toml = r#"
[supervisor]
work_dir = "/srv/desk"

[tools.files]
base_dir = "out"

[tools.database]
path = "/var/lib/biz.db"
"#;
        let f = write_toml(toml);
        let cfg = load_from(f.path(), None, None).unwrap();
        assert_eq!(cfg.tools.files.base_dir, PathBuf::from("/srv/desk/out"));
        assert_eq!(cfg.tools.database.path, PathBuf::from("/var/lib/biz.db"));
    }

    #[test]
    fn parse_tools_sections() {
        let toml = r#"
[tools.terminal]
allowed_commands = ["echo"]
allow_shell = true
timeout_secs = 3

[tools.automation]
enabled = false
base_url = "https://gateway.local/api/v1/"

[memory]
max_turns_per_owner = 20

[tasks]
request_limit_check = "03:15:30"
"#;
        let f = write_toml(toml);
        let cfg = load_from(f.path(), Some("/tmp/desk"), None).unwrap();
        assert_eq!(cfg.tools.terminal.allowed_commands, vec!["echo"]);
        assert!(cfg.tools.terminal.allow_shell);
        assert_eq!(cfg.tools.terminal.timeout_secs, 3);
        assert!(!cfg.tools.automation.enabled);
        assert_eq!(cfg.tools.automation.base_url, "https://gateway.local/api/v1");
        assert_eq!(cfg.memory.max_turns_per_owner, Some(20));
        assert_eq!(
            cfg.tasks.request_limit_check,
            TimeOfDay { hour: 3, minute: 15, second: 30 }
        );
    }

    #[test]
    fn bad_time_of_day_errors() {
        let f = write_toml("[tasks]\nrequest_limit_check = \"25:00:00\"\n");
        let err = load_from(f.path(), None, None).unwrap_err();
        assert!(err.to_string().contains("invalid time of day"));
    }

    #[test]
    fn time_of_day_seconds_optional() {
        let t = parse_time_of_day("07:30").unwrap();
        assert_eq!(t, TimeOfDay { hour: 7, minute: 30, second: 0 });
        assert!(parse_time_of_day("7").is_err());
        assert!(parse_time_of_day("aa:bb:cc").is_err());
    }

    #[test]
    fn unknown_type_errors() {
        let f = write_toml("[agents]\nmax_steps = \"many\"\n");
        let err = load_from(f.path(), None, None).unwrap_err();
        assert!(err.to_string().contains("config error"));
    }

    #[test]
    fn tilde_expands_to_home() {
        let home = dirs::home_dir().expect("home dir must exist in test env");
        let expanded = expand_home("~/.agentdesk");
        assert!(expanded.starts_with(&home));
        assert!(expanded.ends_with(".agentdesk"));
    }

    #[test]
    fn absolute_path_unchanged() {
        let p = expand_home("/absolute/path");
        assert_eq!(p, PathBuf::from("/absolute/path"));
    }

    #[test]
    fn relative_path_unchanged() {
        let p = expand_home("relative/path");
        assert_eq!(p, PathBuf::from("relative/path"));
    }

    #[test]
    fn missing_file_errors() {
        let result = load_from(std::path::Path::new("/nonexistent/config.toml"), None, None);
        assert!(result.is_err());
        let msg = result.unwrap_err().to_string();
        assert!(msg.contains("config error"));
    }

    #[test]
    fn env_work_dir_override() {
        let f = write_toml(MINIMAL_TOML);
        let cfg = load_from(f.path(), Some("/tmp/test-override"), None).unwrap();
        assert_eq!(cfg.work_dir, PathBuf::from("/tmp/test-override"));
    }

    #[test]
    fn env_log_level_override() {
        let f = write_toml(MINIMAL_TOML);
        let cfg = load_from(f.path(), None, Some("debug")).unwrap();
        assert_eq!(cfg.log_level, "debug");
    }

    #[test]
    fn port_env_replaces_bind_port() {
        let mut cfg = Config::test_default(std::path::Path::new("/tmp"));
        apply_env(&mut cfg, env_from(&[("PORT", "4100")])).unwrap();
        assert_eq!(cfg.comms.http.bind, "127.0.0.1:4100");
    }

    #[test]
    fn invalid_port_errors() {
        let mut cfg = Config::test_default(std::path::Path::new("/tmp"));
        let err = apply_env(&mut cfg, env_from(&[("PORT", "http")])).unwrap_err();
        assert!(err.to_string().contains("PORT"));
    }

    #[test]
    fn llm_key_falls_back_to_openai_key() {
        let mut cfg = Config::test_default(std::path::Path::new("/tmp"));
        apply_env(&mut cfg, env_from(&[("OPENAI_API_KEY", "sk-openai")])).unwrap();
        assert_eq!(cfg.secrets.llm_api_key.as_deref(), Some("sk-openai"));

        apply_env(
            &mut cfg,
            env_from(&[("OPENAI_API_KEY", "sk-openai"), ("LLM_API_KEY", "sk-llm")]),
        )
        .unwrap();
        assert_eq!(cfg.secrets.llm_api_key.as_deref(), Some("sk-llm"));
    }

    #[test]
    fn unset_secrets_stay_none() {
        let mut cfg = Config::test_default(std::path::Path::new("/tmp"));
        apply_env(&mut cfg, env_from(&[("JWT_SECRET", "  ")])).unwrap();
        assert!(cfg.secrets.jwt_secret.is_none());
        assert!(cfg.secrets.google.is_none());
        assert!(cfg.tools.automation.api_key.is_none());
    }

    #[test]
    fn oauth_and_automation_secrets_loaded() {
        let mut cfg = Config::test_default(std::path::Path::new("/tmp"));
        apply_env(
            &mut cfg,
            env_from(&[
                ("GOOGLE_CLIENT_ID", "gid"),
                ("GOOGLE_CLIENT_SECRET", "gsecret"),
                ("FACEBOOK_CLIENT_ID", "fid"),
                ("ZAPIER_NLA_API_KEY", "zk"),
            ]),
        )
        .unwrap();
        let google = cfg.secrets.google.unwrap();
        assert_eq!(google.client_id, "gid");
        assert_eq!(google.client_secret.as_deref(), Some("gsecret"));
        assert!(cfg.secrets.facebook.unwrap().client_secret.is_none());
        assert_eq!(cfg.tools.automation.api_key.as_deref(), Some("zk"));
    }
}
