//! Drain the queue on demand and report connectivity.

use campusync_core::sync::{ConnectionStatus, ReachabilityProbe};
use campusync_core::{Config, DrainOutcome, EventBus, OfflineRuntime};
use clap::Subcommand;

use super::{open_queue, open_store, CliResult};

#[derive(Subcommand)]
pub enum SyncAction {
    /// Replay every pending action now
    Run {
        /// Output the drain report as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show reachability and the pending count
    Status {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

pub async fn run(action: SyncAction) -> CliResult {
    match action {
        SyncAction::Run { json } => run_drain(json).await,
        SyncAction::Status { json } => show_status(json).await,
    }
}

async fn run_drain(json: bool) -> CliResult {
    let config = Config::load_or_default();
    let runtime = OfflineRuntime::builder(config).store(open_store()?).build()?;
    let report = runtime.sync_now().await;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }
    match report.outcome {
        DrainOutcome::Completed => {
            println!("synced {} action(s), {} pending", report.replayed.len(), report.remaining);
        }
        DrainOutcome::Halted => {
            println!("synced {} action(s), {} pending", report.replayed.len(), report.remaining);
            if let Some(failed) = &report.failed {
                return Err(format!("replay of {} failed: {}", failed.id, failed.reason).into());
            }
        }
        DrainOutcome::AlreadyRunning => println!("a sync is already running"),
    }
    Ok(())
}

async fn show_status(json: bool) -> CliResult {
    let config = Config::load_or_default();
    let queue = open_queue(&config)?;
    let probe = ReachabilityProbe::new(&config.network, EventBus::new())?;
    let online = probe.check().await;

    let connection = if online {
        ConnectionStatus::Online
    } else {
        ConnectionStatus::Offline
    };
    let pending = queue.pending_count();

    if json {
        let status = serde_json::json!({
            "connection_status": connection,
            "probe_url": probe.url().as_str(),
            "pending_action_count": pending,
        });
        println!("{}", serde_json::to_string_pretty(&status)?);
    } else {
        println!("Connection: {connection}");
        println!("Origin:     {}", probe.url());
        println!("Pending:    {pending}");
    }
    Ok(())
}
