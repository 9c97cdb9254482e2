use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Result};
use charla_core::{
    service_from_config, CommandVoiceCapture, Config, ConversationStore, Controller, GeminiClient,
    OllamaClient, PermissionGate, Provider, Sender, SqliteStore,
};
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

mod app;
mod handler;
mod tui;
mod ui;

use app::App;
use tui::EventHandler;

#[derive(Parser)]
#[command(name = "charla")]
#[command(about = "Chat with a generative-language model from the terminal")]
struct Cli {
    /// Conversation database (defaults to the platform data directory)
    #[arg(long)]
    db: Option<PathBuf>,

    /// AI provider: gemini or ollama
    #[arg(short, long)]
    provider: Option<String>,

    /// Model to use
    #[arg(short, long)]
    model: Option<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the saved conversation and exit
    History,
    /// List models for the selected provider
    Models,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = Config::load()?;
    if let Some(provider) = &cli.provider {
        let provider = Provider::from_str(provider)
            .ok_or_else(|| anyhow!("Unknown provider '{}'. Use gemini or ollama.", provider))?;
        config.provider = Some(provider.as_str().to_string());
    }
    if let Some(model) = cli.model {
        config.model = Some(model);
    }
    if let Some(db) = cli.db {
        config.database_path = Some(db);
    }

    match cli.command {
        Some(Commands::History) => print_history(&config),
        Some(Commands::Models) => list_models(&config).await,
        None => {
            init_logging();
            run_tui(config).await
        }
    }
}

/// Logs go to a file; the terminal belongs to the UI.
fn init_logging() {
    let log_path = dirs::cache_dir()
        .map(|dir| dir.join("charla"))
        .unwrap_or_else(std::env::temp_dir);
    if std::fs::create_dir_all(&log_path).is_err() {
        return;
    }

    if let Ok(file) = std::fs::File::create(log_path.join("charla.log")) {
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new("charla_tui=info,charla_core=info"));
        tracing_subscriber::fmt()
            .with_writer(std::sync::Mutex::new(file))
            .with_env_filter(filter)
            .with_ansi(false)
            .init();
    }
}

async fn run_tui(config: Config) -> Result<()> {
    let service = service_from_config(&config)?;

    let store = SqliteStore::open(&config.database_path())?;

    let (gate, permission_rx) = PermissionGate::new(config.microphone_allowed.unwrap_or(false));
    let voice = Arc::new(CommandVoiceCapture::new(config.voice_command.clone(), gate));

    let (mut controller, controller_rx) = Controller::new(
        Box::new(store),
        service,
        voice,
        config.store_queue_capacity(),
    )?;

    let provider = config.provider();
    let mut app = App::new(config.theme(), provider.display_name(), &config.model());
    info!(provider = provider.as_str(), model = %config.model(), "Starting charla");

    tui::install_panic_hook();
    let mut terminal = tui::init()?;
    let mut events = EventHandler::new(controller_rx, permission_rx);

    controller.load_history();

    let result = async {
        loop {
            terminal.draw(|frame| ui::render(&mut app, frame))?;

            match events.next().await {
                Some(event) => handler::handle_event(&mut app, &mut controller, event),
                None => break,
            }

            if app.should_quit {
                break;
            }
        }
        Ok::<(), anyhow::Error>(())
    }
    .await;

    tui::restore()?;
    controller.shutdown().await;
    info!("charla stopped");
    result
}

fn print_history(config: &Config) -> Result<()> {
    let store = SqliteStore::open(&config.database_path())?;
    let messages = store.list_all()?;

    if messages.is_empty() {
        println!("No saved messages.");
        return Ok(());
    }

    for message in messages {
        let label = match message.sender {
            Sender::User => "You",
            Sender::Bot => "Bot",
        };
        println!("[{}] {}: {}", message.id.unwrap_or_default(), label, message.text);
    }
    Ok(())
}

async fn list_models(config: &Config) -> Result<()> {
    let models = match config.provider() {
        Provider::Gemini => GeminiClient::list_models(),
        Provider::Ollama => {
            let timeout = Duration::from_secs(config.request_timeout_secs());
            OllamaClient::new(&config.ollama_url(), &config.model(), timeout)?
                .list_models()
                .await?
        }
    };

    println!("{} models:", config.provider().display_name());
    for model in models {
        println!("  • {}", model);
    }
    Ok(())
}
