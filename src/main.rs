//! # solace
//!
//! Terminal chat surface for the wellness assistant. Loads settings, starts
//! logging, builds the Gemini gateway and runs one session at a time.

#![deny(unsafe_code)]

mod commands;

use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use futures::StreamExt;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};

use solace_core::connectivity::ConnectivityProbe;
use solace_core::errors::ErrorKind;
use solace_core::policy::{PromptPolicy, WellnessPolicy};
use solace_core::security::ApiKey;
use solace_llm::types::{GenerationConfig, HarmBlockThreshold};
use solace_llm::{GeminiConfig, GeminiProvider, RetryConfig, RetryingGateway, StaticConnectivity, TcpProbe};
use solace_session::{Session, SessionConfig, SessionError, SessionManager, TurnEvent};
use solace_settings::SolaceSettings;
use solace_telemetry::TelemetryConfig;

use crate::commands::{Command, HELP};

/// Supportive wellness chat in the terminal.
#[derive(Parser, Debug)]
#[command(name = "solace", about = "Supportive wellness chat in the terminal")]
struct Cli {
    /// Settings file (defaults to ~/.solace/settings.json).
    #[arg(long)]
    settings: Option<PathBuf>,

    /// Gemini model (overrides settings).
    #[arg(long)]
    model: Option<String>,

    /// Log level (overrides settings).
    #[arg(long)]
    log_level: Option<String>,

    /// Write logs to stderr as JSON lines.
    #[arg(long)]
    json_logs: bool,

    /// Name to greet you by.
    #[arg(long)]
    name: Option<String>,

    /// Skip the reachability check before each message.
    #[arg(long)]
    no_connectivity_check: bool,
}

impl Cli {
    /// Command-line flags win over the settings file and environment.
    fn apply(&self, settings: &mut SolaceSettings) {
        if let Some(model) = &self.model {
            settings.provider.model = model.clone();
        }
        if let Some(level) = &self.log_level {
            settings.logging.level = level.clone();
        }
        if self.json_logs {
            settings.logging.json = true;
        }
        if let Some(name) = &self.name {
            settings.identity.display_name = Some(name.clone());
        }
        if self.no_connectivity_check {
            settings.connectivity.enabled = false;
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let path = cli.settings.clone().unwrap_or_else(solace_settings::settings_path);
    let mut settings = solace_settings::load_settings_from_path(&path)
        .with_context(|| format!("Failed to load settings from {}", path.display()))?;
    cli.apply(&mut settings);
    settings.validate().context("Invalid settings")?;

    let telemetry = TelemetryConfig::from_names(
        &settings.logging.level,
        settings
            .logging
            .modules
            .iter()
            .map(|(module, level)| (module.as_str(), level.as_str())),
        settings.logging.json,
    );
    solace_telemetry::init_telemetry(&telemetry).context("Failed to initialize logging")?;

    let manager = build_manager(&settings)?;
    info!(model = manager.model(), "solace ready");
    run(&manager).await
}

fn build_manager(settings: &SolaceSettings) -> Result<SessionManager> {
    let p = &settings.provider;
    let safety_threshold = HarmBlockThreshold::parse(&p.safety_threshold).unwrap_or_else(|| {
        warn!(value = %p.safety_threshold, "unknown safety threshold, using default");
        HarmBlockThreshold::default()
    });
    let gemini = GeminiConfig {
        model: p.model.clone(),
        base_url: p.base_url.clone(),
        generation: GenerationConfig {
            temperature: Some(p.generation.temperature),
            top_k: Some(p.generation.top_k),
            top_p: Some(p.generation.top_p),
            max_output_tokens: Some(p.generation.max_output_tokens),
        },
        safety_threshold,
        history_window: p.history_window,
        connect_timeout: p.connect_timeout(),
        idle_timeout: p.idle_timeout(),
    };

    let api_key = ApiKey::from_env(&p.api_key_env);
    if api_key.is_none() {
        warn!(var = %p.api_key_env, "API key not set, sending disabled");
    }
    let provider = GeminiProvider::new(gemini, api_key).context("Failed to build Gemini provider")?;
    let retry = RetryConfig {
        max_retries: p.max_retries,
        base_delay: Duration::from_millis(p.retry_base_delay_ms),
        max_delay: Duration::from_millis(p.retry_max_delay_ms),
        ..RetryConfig::default()
    };
    let gateway = Arc::new(RetryingGateway::new(provider, retry));

    let c = &settings.connectivity;
    let connectivity: Arc<dyn ConnectivityProbe> = if !c.enabled {
        Arc::new(StaticConnectivity::online())
    } else if let Some(host) = &c.host {
        Arc::new(TcpProbe::new(host.clone(), c.port.unwrap_or(443), c.timeout()))
    } else {
        let probe = TcpProbe::for_base_url(&p.base_url, Some(c.timeout()))
            .context("Invalid provider base URL")?;
        Arc::new(probe)
    };

    let config = SessionConfig {
        identity: settings.identity.to_identity(),
        turn_deadline: settings.session.turn_deadline(),
        ..SessionConfig::default()
    };
    Ok(SessionManager::new(
        config,
        Arc::new(WellnessPolicy::new()),
        gateway,
        connectivity,
    ))
}

async fn run(manager: &SessionManager) -> Result<()> {
    print_session(&manager.snapshot());
    println!("Type /help for commands.");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut last_failed: Option<String> = None;

    loop {
        print!("> ");
        std::io::stdout().flush().context("Failed to write to stdout")?;
        let line = tokio::select! {
            line = lines.next_line() => line.context("Failed to read stdin")?,
            _ = tokio::signal::ctrl_c() => None,
        };
        let Some(line) = line else {
            println!();
            break;
        };

        let text = match Command::parse(&line) {
            Command::Message(text) => text,
            Command::Empty => continue,
            Command::Quit => break,
            Command::Help => {
                println!("{HELP}");
                continue;
            }
            Command::Crisis => {
                print_crisis(manager.policy());
                continue;
            }
            Command::Clear => {
                last_failed = None;
                print_session(&manager.clear());
                continue;
            }
            Command::Retry => match last_failed.take() {
                Some(text) => text,
                None => {
                    println!("Nothing to retry.");
                    continue;
                }
            },
            Command::Quick(None) => {
                for (i, prompt) in manager.policy().quick_prompts().iter().enumerate() {
                    println!("  {}. {prompt}", i + 1);
                }
                continue;
            }
            Command::Quick(Some(n)) => match manager.policy().quick_prompts().get(n - 1) {
                Some(prompt) => {
                    println!("> {prompt}");
                    prompt.to_string()
                }
                None => {
                    println!("No suggestion {n}. Type /quick to list them.");
                    continue;
                }
            },
            Command::Unknown(cmd) => {
                println!("Unknown command {cmd}. Type /help for commands.");
                continue;
            }
        };

        if let Err(e) = send(manager, &text).await {
            println!("{}", e.user_message());
            if e.kind().is_user_retriable() {
                last_failed = Some(text);
                println!("Type /retry to send it again.");
            }
        }
    }

    info!("bye");
    Ok(())
}

/// Stream one reply to stdout. Ctrl-C drops the turn, which rolls it back.
async fn send(manager: &SessionManager, text: &str) -> Result<(), SessionError> {
    let mut turn = manager.submit(text).await?;
    let mut stdout = std::io::stdout();
    loop {
        let event = tokio::select! {
            event = turn.next() => event,
            _ = tokio::signal::ctrl_c() => {
                println!("\n(reply cancelled)");
                return Ok(());
            }
        };
        match event {
            Some(Ok(TurnEvent::Partial { delta, .. })) => {
                print!("{delta}");
                let _ = stdout.flush();
            }
            Some(Ok(TurnEvent::Complete(_))) => println!(),
            Some(Err(e)) => {
                if !turn.text().is_empty() {
                    println!();
                }
                return Err(e);
            }
            None => return Ok(()),
        }
    }
}

fn print_session(session: &Session) {
    for message in &session.messages {
        println!("{}", message.content);
    }
    if !session.sending_enabled {
        println!("{}", ErrorKind::Configuration.user_message());
    }
}

fn print_crisis(policy: &dyn PromptPolicy) {
    println!("If you're in crisis, please reach out now:");
    for resource in policy.crisis_resources() {
        println!("  {}: {} ({})", resource.name, resource.contact, resource.description);
    }
}
