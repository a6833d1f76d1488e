//! agentdesk: supervisor entry point.
//!
//! Startup sequence:
//!   1. Load .env (if present)
//!   2. Load config
//!   3. Resolve effective log level (CLI `-v` flags > env > config)
//!   4. Init logger once
//!   5. Start supervisor bus and register subsystem handlers
//!   6. Spawn Ctrl-C → shutdown signal watcher
//!   7. Register the daily maintenance schedule with cron
//!   8. Run comms (HTTP) until shutdown
//!   9. Cancel token + join supervisor

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use agentdesk::bootstrap::logger;
use agentdesk::config::{self, Config};
use agentdesk::error::AppError;
use agentdesk::subsystems;
use agentdesk::subsystems::agents::AgentsSubsystem;
#[cfg(feature = "subsystem-cron")]
use agentdesk::subsystems::cron::CronSubsystem;
use agentdesk::subsystems::llm::LlmSubsystem;
use agentdesk::subsystems::memory::MemorySubsystem;
use agentdesk::subsystems::tasks::TasksSubsystem;
use agentdesk::subsystems::tools::ToolsSubsystem;
use agentdesk::supervisor;
use agentdesk::supervisor::bus::SupervisorBus;
use agentdesk::supervisor::control::SupervisorControl;
use agentdesk::supervisor::dispatch::BusHandler;

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), AppError> {
    // Load .env if present: ignore errors (file is optional).
    let _ = dotenvy::dotenv();

    let args = parse_cli_args();

    let config = config::load(args.config_path.as_deref())?;

    let effective_log_level = args.log_level.unwrap_or(config.log_level.as_str());
    logger::init(effective_log_level, args.log_level.is_some(), config.log_file.as_deref())?;

    info!(
        service = %config.service_name,
        work_dir = %config.work_dir.display(),
        configured_log_level = %config.log_level,
        effective_log_level = %effective_log_level,
        "config loaded"
    );
    report_secrets(&config);

    std::fs::create_dir_all(&config.work_dir)?;

    // Shared shutdown token: Ctrl-C cancels it, all tasks watch it.
    let shutdown = CancellationToken::new();

    let bus = SupervisorBus::new(64);
    let control = SupervisorControl::new(32);
    let bus_handle = bus.handle.clone();
    let control_handle = control.handle.clone();

    let ctrlc_token = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("ctrl-c received, initiating shutdown");
            ctrlc_token.cancel();
        }
    });

    let llm = LlmSubsystem::new(&config.llm, config.secrets.llm_api_key.clone())
        .map_err(|e| AppError::Llm(e.to_string()))?;
    let llm_provider = llm.provider_name();
    let tools = ToolsSubsystem::new(&config.tools, bus_handle.clone())
        .map_err(|e| AppError::Tools(e.to_string()))?;

    let mut handlers: Vec<Box<dyn BusHandler>> = vec![
        Box::new(llm),
        Box::new(MemorySubsystem::new(&config)?),
        Box::new(tools),
        Box::new(AgentsSubsystem::new(&config.agents, bus_handle.clone())),
        Box::new(TasksSubsystem::new()),
    ];

    #[cfg(feature = "subsystem-cron")]
    handlers.push(Box::new(CronSubsystem::new(bus_handle.clone(), shutdown.clone())));

    let handler_names: Vec<String> = handlers.iter().map(|h| h.prefix().to_string()).collect();

    // Spawn supervisor run-loop (owns the bus receiver).
    let sup_token = shutdown.clone();
    let sup_handle = tokio::spawn(async move {
        supervisor::run(bus, control, sup_token, handlers).await;
    });

    #[cfg(feature = "subsystem-cron")]
    schedule_daily_tasks(&config, &bus_handle).await;

    print_startup_summary(&config, llm_provider, &handler_names);

    let comms = subsystems::comms::start(&config, bus_handle, control_handle, shutdown.clone());
    let result = comms.join().await;

    // Without channels, comms returns at once; stay up until Ctrl-C.
    if result.is_ok() {
        shutdown.cancelled().await;
    }
    shutdown.cancel();
    sup_handle.await.ok();

    result
}

/// Register `tasks/check_request_limit` to fire daily.  Failure is logged,
/// not fatal: the service still answers requests without it.
#[cfg(feature = "subsystem-cron")]
async fn schedule_daily_tasks(config: &Config, bus: &supervisor::bus::BusHandle) {
    use agentdesk::supervisor::bus::BusPayload;

    let payload = match subsystems::tasks::daily_check_schedule(config.tasks.request_limit_check) {
        Ok(p) => p,
        Err(e) => {
            warn!(error = %e, "failed to build daily task schedule");
            return;
        }
    };
    match bus.request("cron/schedule", payload).await {
        Ok(Ok(BusPayload::CronScheduleResult { schedule_id })) => {
            info!(%schedule_id, at = ?config.tasks.request_limit_check, "daily request-limit check scheduled");
        }
        Ok(Ok(other)) => warn!(reply = ?other, "unexpected cron/schedule reply"),
        Ok(Err(e)) => warn!(error = %e, "cron rejected daily task schedule"),
        Err(e) => warn!(error = %e, "cron/schedule bus call failed"),
    }
}

/// Log which credentials were found, never their values.
fn report_secrets(config: &Config) {
    let s = &config.secrets;
    info!(
        llm_api_key = s.llm_api_key.is_some(),
        automation_api_key = config.tools.automation.api_key.is_some(),
        jwt_secret = s.jwt_secret.is_some(),
        google_oauth = s.google.is_some(),
        facebook_oauth = s.facebook.is_some(),
        "credentials loaded from environment"
    );
    if config.llm.provider != "dummy" && s.llm_api_key.is_none() {
        warn!(provider = %config.llm.provider, "no LLM_API_KEY / OPENAI_API_KEY set");
    }
}

fn print_startup_summary(config: &Config, llm_provider: &str, handlers: &[String]) {
    let fit = |text: String| -> String {
        const WIDTH: usize = 58;
        let char_count = text.chars().count();
        if char_count >= WIDTH {
            let mut out = text.chars().take(WIDTH - 1).collect::<String>();
            out.push('…');
            out
        } else {
            format!("{text:<WIDTH$}")
        }
    };

    let mut names = handlers.to_vec();
    names.sort();

    let t = &config.tools;
    let tools: Vec<&str> = [
        ("database", t.database.enabled),
        ("terminal", t.terminal.enabled),
        ("write_file/read_file", t.files.enabled),
        ("automation", t.automation.enabled),
        ("code_qa", t.code_qa.enabled && cfg!(feature = "tool-code-qa")),
    ]
    .into_iter()
    .filter_map(|(name, on)| on.then_some(name))
    .collect();

    let http_line = if cfg!(feature = "channel-axum") {
        format!("http: {}", config.comms.http.bind)
    } else {
        "http: not compiled in".to_string()
    };

    println!("╔══════════════════════════════════════════════════════════════╗");
    println!("║ agentdesk supervisor                                         ║");
    println!("╟──────────────────────────────────────────────────────────────╢");
    println!("║   {}║", fit(format!("service: {}", config.service_name)));
    println!("║   {}║", fit(format!("pid: {}", std::process::id())));
    println!("║   {}║", fit(format!("subsystems: {}", names.join(", "))));
    println!("║   {}║", fit(http_line));
    println!("║   {}║", fit(format!("llm: {llm_provider} (max_tokens={})", config.llm.max_tokens)));
    println!("║   {}║", fit(format!("tools: {}", if tools.is_empty() { "none".to_string() } else { tools.join(", ") })));
    println!("╚══════════════════════════════════════════════════════════════╝");
}

struct CliArgs {
    log_level: Option<&'static str>,
    config_path: Option<String>,
}

fn parse_cli_args() -> CliArgs {
    let mut verbosity = 0u8;
    let mut config_path = None;

    let mut iter = std::env::args().skip(1);
    while let Some(arg) = iter.next() {
        if arg == "--" {
            break;
        }

        match arg.as_str() {
            "-h" | "--help" => {
                println!("Usage: agentdesk [OPTIONS]");
                println!();
                println!("Options:");
                println!("  -h, --help                 Print help");
                println!("  -f, --config <PATH>        Path to configuration file (default: config/default.toml)");
                println!("  -v, -vv, -vvv, -vvvv       Increase logging verbosity");
                std::process::exit(0);
            }
            "-f" | "--config" => {
                if let Some(path) = iter.next() {
                    config_path = Some(path);
                } else {
                    eprintln!("error: -f/--config requires a path argument");
                    std::process::exit(1);
                }
            }
            "--verbose" => verbosity = verbosity.saturating_add(1),
            a if a.starts_with('-') && a.len() > 1 && a.chars().skip(1).all(|c| c == 'v') => {
                verbosity = verbosity.saturating_add((a.len() - 1) as u8);
            }
            other => eprintln!("warning: ignoring unknown argument {other:?}"),
        }
    }

    CliArgs { log_level: logger::verbosity_level(verbosity), config_path }
}
