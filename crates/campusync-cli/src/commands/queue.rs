use campusync_core::Config;
use clap::Subcommand;

use super::{open_queue, CliResult};

#[derive(Subcommand)]
pub enum QueueAction {
    /// Queue an action for later replay
    Add {
        /// Server operation tag (e.g. "create-project")
        action: String,
        /// Operation parameters as JSON
        #[arg(long, default_value = "{}")]
        data: String,
    },
    /// List queued actions
    List {
        /// Include actions already confirmed by the server
        #[arg(long)]
        all: bool,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Remove one action by id
    Remove { id: String },
    /// Remove every queued action
    Clear,
}

pub fn run(action: QueueAction) -> CliResult {
    let config = Config::load_or_default();
    let queue = open_queue(&config)?;

    match action {
        QueueAction::Add { action, data } => {
            let data: serde_json::Value = serde_json::from_str(&data)
                .map_err(|e| format!("--data is not valid JSON: {e}"))?;
            let entry = queue.enqueue(&action, data)?;
            println!("{}", entry.id);
        }
        QueueAction::List { all, json } => {
            let entries = if all { queue.list() } else { queue.unsynced() };
            if json {
                println!("{}", serde_json::to_string_pretty(&entries)?);
            } else if entries.is_empty() {
                println!("queue is empty");
            } else {
                for entry in entries {
                    let mark = if entry.synced { "synced" } else { "pending" };
                    println!(
                        "{}  {:<8} {}  {}",
                        entry.id,
                        mark,
                        entry.timestamp.format("%Y-%m-%d %H:%M:%S"),
                        entry.action
                    );
                }
            }
        }
        QueueAction::Remove { id } => {
            queue.remove(&id)?;
            println!("removed {id}");
        }
        QueueAction::Clear => {
            queue.clear()?;
            println!("queue cleared");
        }
    }
    Ok(())
}
