mod cli;
mod config;
mod gemini_client;
mod storage;

use std::io;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use dotenv::dotenv;
use eyre::Result;
use tracing::{error, info, Level};
use tracing_subscriber::FmtSubscriber;

use crate::cli::chat::controller::ConversationController;
use crate::cli::chat::presenter::TerminalPresenter;
use crate::cli::chat::session::Session;
use crate::cli::chat::{read_api_key, ChatContext};
use crate::config::Config;
use crate::gemini_client::GeminiClient;
use crate::storage::{FileStore, KeyValueStore, MemoryStore};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Input to send to the chat
    #[arg(short, long)]
    input: Option<String>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Directory holding the saved key, theme and history
    #[arg(long, env = "GEMINI_CHAT_DATA_DIR", global = true)]
    data_dir: Option<PathBuf>,

    /// generateContent endpoint to call
    #[arg(long, env = "GEMINI_ENDPOINT", global = true)]
    endpoint: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start a chat session
    Chat {
        /// Input to send to the chat
        #[arg(short, long)]
        input: Option<String>,
    },
    /// Save the Gemini API key, prompting for it when not given
    Key { key: Option<String> },
    /// Toggle between light and dark colors
    Theme,
    /// Print the saved conversation
    History,
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    // Load environment variables from .env file
    dotenv().ok();

    let cli = Cli::parse();

    let log_level = if cli.verbose { Level::DEBUG } else { Level::WARN };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_writer(io::stderr)
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;

    let config = Config::resolve(cli.data_dir, cli.endpoint)?;
    info!("Starting Gemini Chat");

    let controller = build_controller(&config)?;

    match cli.command {
        Some(Commands::Chat { input }) => chat(controller, input.or(cli.input)).await,
        None => chat(controller, cli.input).await,
        Some(Commands::Key { key }) => {
            let key = match key {
                Some(key) => key,
                None => match read_api_key()? {
                    Some(key) => key,
                    None => return Ok(ExitCode::FAILURE),
                },
            };
            match controller.save_credential(&key) {
                Ok(()) => Ok(ExitCode::SUCCESS),
                Err(e) => {
                    eprintln!("{}", e);
                    Ok(ExitCode::FAILURE)
                }
            }
        }
        Some(Commands::Theme) => {
            controller.toggle_theme();
            Ok(ExitCode::SUCCESS)
        }
        Some(Commands::History) => {
            if controller.replay_history() == 0 {
                println!("No messages yet.");
            }
            Ok(ExitCode::SUCCESS)
        }
    }
}

async fn chat(controller: ConversationController, input: Option<String>) -> Result<ExitCode> {
    let mut chat_context = ChatContext::new(Box::new(io::stdout()), input, true, controller);
    chat_context.run().await
}

fn build_controller(config: &Config) -> Result<ConversationController> {
    let store: Box<dyn KeyValueStore> = match FileStore::open(&config.data_dir) {
        Ok(store) => {
            info!("Using store at {}", store.path().display());
            Box::new(store)
        }
        Err(e) => {
            error!("Failed to open storage, nothing will be saved this session: {}", e);
            Box::new(MemoryStore::new())
        }
    };

    let mut session = Session::load(store);
    if let Some(key) = &config.env_api_key {
        session.seed_credential(key);
    }

    let presenter = TerminalPresenter::new(Box::new(io::stdout()), session.dark_theme());
    let client = GeminiClient::new(&config.endpoint)?;

    Ok(ConversationController::new(
        session,
        Box::new(client),
        Box::new(presenter),
    ))
}
