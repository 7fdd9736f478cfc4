//! Command-line interface parsing and handling
//!
//! This module handles parsing command-line arguments and executing the appropriate commands.

pub mod auth;
pub mod chat_loop;
pub mod context;
pub mod model_list;
pub mod say;
pub mod session_list;

use std::error::Error;
use std::path::Path;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use crate::cli::auth::{run_auth, run_deauth, run_validate};
use crate::cli::chat_loop::run_chat;
use crate::cli::context::{AppContext, Overrides};
use crate::cli::model_list::list_models;
use crate::cli::say::run_say;
use crate::cli::session_list::list_sessions;
use crate::core::builtin_providers::{find_builtin_provider, load_builtin_providers};
use crate::core::config::Config;
use crate::core::controller::ConversationController;
use crate::core::settings::Settings;

/// Filter directives for diagnostics, e.g. `CHATLINE_LOG=chatline=debug`.
pub const LOG_ENV: &str = "CHATLINE_LOG";

#[derive(Parser, Debug)]
#[command(name = "chatline")]
#[command(about = "A terminal chat client for OpenRouter and OpenAI-compatible APIs")]
#[command(
    long_about = "chatline sends your conversation to an OpenAI-compatible chat-completions \
endpoint, streams the reply as it arrives, retries transient failures, and keeps every chat \
on disk so you can pick it up later.\n\n\
Authentication:\n\
  Use 'chatline auth <key>' to check and store an API key.\n\n\
Environment Variables:\n\
  OPENROUTER_API_KEY   API key used when none is stored or passed\n\
  CHATLINE_CONFIG_DIR  Directory holding config.toml (and data/ unless data_dir is set)\n\
  CHATLINE_LOG         Diagnostic log filter, written to stderr (default: warn)\n\n\
Chat commands:\n\
  /help               List commands\n\
  /edit <n> <text>    Rewrite message n and regenerate\n\
  /stop               Stop the current response (also Ctrl+C)"
)]
pub struct Args {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Provider to use (openrouter, openai)
    #[arg(short = 'p', long, global = true)]
    pub provider: Option<String>,

    /// Model to use for chat
    #[arg(short = 'm', long, global = true)]
    pub model: Option<String>,

    /// API key for this run only
    #[arg(long, global = true, value_name = "KEY")]
    pub api_key: Option<String>,

    /// Wait for the whole reply instead of streaming it
    #[arg(long, global = true)]
    pub no_stream: bool,

    /// Resume a chat by id or link (`?chat=<id>`)
    #[arg(short = 'r', long, value_name = "CHAT")]
    pub resume: Option<String>,
}

#[derive(Subcommand, Debug, PartialEq)]
pub enum Commands {
    /// Start the interactive chat (default)
    Chat,
    /// Send one prompt and print the reply
    Say {
        #[arg(trailing_var_arg = true)]
        prompt: Vec<String>,
    },
    /// Check an API key and store it
    Auth {
        key: String,
    },
    /// Remove the stored API key
    Deauth,
    /// Check that the configured API key is accepted
    Validate,
    /// List available models
    Models,
    /// List saved chats
    Sessions,
    /// Set a stored preference (model, theme, provider)
    Set {
        key: String,
        #[arg(trailing_var_arg = true)]
        value: Vec<String>,
    },
}

impl Args {
    fn overrides(&self) -> Overrides {
        Overrides {
            provider: self.provider.clone(),
            model: self.model.clone(),
            api_key: self.api_key.clone(),
            no_stream: self.no_stream,
        }
    }
}

pub fn main() -> Result<(), Box<dyn Error>> {
    init_tracing();
    tokio::runtime::Runtime::new()?.block_on(async_main())
}

#[cfg(unix)]
pub(crate) type Interrupts = tokio::signal::unix::Signal;
#[cfg(windows)]
pub(crate) type Interrupts = tokio::signal::windows::CtrlC;

/// Ctrl+C listener. Registered once; interrupts that arrive between
/// `recv` calls are queued.
pub(crate) fn listen_for_interrupts() -> std::io::Result<Interrupts> {
    #[cfg(unix)]
    return tokio::signal::unix::signal(tokio::signal::unix::SignalKind::interrupt());
    #[cfg(windows)]
    return tokio::signal::windows::ctrl_c();
}

fn init_tracing() {
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

async fn async_main() -> Result<(), Box<dyn Error>> {
    let args = Args::parse();
    let mut context = AppContext::load(args.overrides())?;

    match args.command.unwrap_or(Commands::Chat) {
        Commands::Chat => {
            let delivery = context.delivery()?;
            let (controller, events) = ConversationController::new(
                context.session_store(),
                context.snapshots(),
                delivery,
                context.stream(),
            );
            run_chat(controller, events, args.resume, context.stream()).await
        }
        Commands::Say { prompt } => run_say(&context, prompt).await,
        Commands::Auth { key } => run_auth(&mut context, &key).await,
        Commands::Deauth => {
            run_deauth(&mut context);
            Ok(())
        }
        Commands::Validate => run_validate(&context).await,
        Commands::Models => {
            list_models(&context);
            Ok(())
        }
        Commands::Sessions => {
            list_sessions(&context);
            Ok(())
        }
        Commands::Set { key, value } => {
            let value = value.join(" ");
            if value.trim().is_empty() {
                return Err(format!("Usage: chatline set {key} <value>").into());
            }
            if key == "provider" {
                set_default_provider(&mut context.config, &value, &Config::config_path()?)?;
            } else {
                context.settings.update(settings_change(&key, value.clone())?);
            }
            println!("✅ Set {key} to: {value}");
            Ok(())
        }
    }
}

fn settings_change(key: &str, value: String) -> Result<Settings, Box<dyn Error>> {
    match key {
        "model" => Ok(Settings {
            model_name: Some(value),
            ..Default::default()
        }),
        "theme" => Ok(Settings {
            theme: Some(value),
            ..Default::default()
        }),
        other => {
            Err(format!("Unknown setting '{other}'. Available: model, theme, provider").into())
        }
    }
}

/// Persist the default gateway in the config file at `path`.
fn set_default_provider(config: &mut Config, id: &str, path: &Path) -> Result<(), Box<dyn Error>> {
    let Some(provider) = find_builtin_provider(id) else {
        let known: Vec<String> = load_builtin_providers().into_iter().map(|p| p.id).collect();
        return Err(format!("Unknown provider '{id}'. Available: {}", known.join(", ")).into());
    };
    config.default_provider = Some(provider.id);
    config.save_to_path(path)
}
