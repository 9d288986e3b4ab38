use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod commands;

#[derive(Parser)]
#[command(name = "campusync-cli", version, about = "Campusync offline sync CLI")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Pending-action queue
    Queue {
        #[command(subcommand)]
        action: commands::queue::QueueAction,
    },
    /// Replay queued actions against the server
    Sync {
        #[command(subcommand)]
        action: commands::sync::SyncAction,
    },
    /// Send one request through the offline interceptor
    Fetch(commands::fetch::FetchArgs),
    /// Follow connectivity and sync events until Ctrl-C
    Watch,
    /// Install prompt dismissal record
    Prompt {
        #[command(subcommand)]
        action: commands::prompt::PromptAction,
    },
    /// Configuration management
    Config {
        #[command(subcommand)]
        action: commands::config::ConfigAction,
    },
}

#[tokio::main]
async fn main() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let result = match cli.command {
        Commands::Queue { action } => commands::queue::run(action),
        Commands::Sync { action } => commands::sync::run(action).await,
        Commands::Fetch(args) => commands::fetch::run(args).await,
        Commands::Watch => commands::watch::run().await,
        Commands::Prompt { action } => commands::prompt::run(action),
        Commands::Config { action } => commands::config::run(action),
    };

    if let Err(e) = result {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}
