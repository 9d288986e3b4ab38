use campusync_core::{Config, OfflineRuntime};

use super::{open_store, CliResult};

/// Run the runtime with the reachability probe and print every event as a
/// JSON line until Ctrl-C.
pub async fn run() -> CliResult {
    let config = Config::load_or_default();
    let mut runtime = OfflineRuntime::builder(config).store(open_store()?).build()?;

    let _printer = runtime.bus().subscribe(&[], |event| {
        match serde_json::to_string(event) {
            Ok(line) => println!("{line}"),
            Err(e) => tracing::warn!(error = %e, "event not printable"),
        }
    })?;

    runtime.start(None);
    runtime.start_probe()?;
    eprintln!(
        "watching {} ({} pending), Ctrl-C to stop",
        runtime.config().network.origin,
        runtime.queue().pending_count()
    );

    tokio::signal::ctrl_c().await?;
    runtime.shutdown().await;
    Ok(())
}
