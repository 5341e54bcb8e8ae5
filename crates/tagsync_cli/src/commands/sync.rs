//! Push toggle, one-shot sync and the foreground watch loop.

use super::open_replica;
use std::path::Path;
use std::sync::Arc;
use tagsync_engine::{
    Action, HttpTransport, RenewalTimer, SyncConfig, SyncEngine, SyncNotice, SyncScheduler,
};
use tokio::runtime::Runtime;
use tokio::sync::watch;

/// Sets (`Some`) or flips (`None`) the push-enabled flag.
pub fn set_push(path: &Path, requested: Option<bool>) -> Result<(), Box<dyn std::error::Error>> {
    let dispatcher = open_replica(path)?;
    dispatcher.dispatch(Action::TogglePushChanges(requested));
    let enabled = dispatcher.app().push_changes;
    println!(
        "✓ Pushing local changes {}",
        if enabled { "enabled" } else { "disabled" }
    );
    Ok(())
}

/// Runs a single sync attempt.
pub fn run_once(path: &Path, config: SyncConfig) -> Result<(), Box<dyn std::error::Error>> {
    let dispatcher = open_replica(path)?;
    let transport = HttpTransport::new(&config)?;
    let engine = SyncEngine::new(config, transport, dispatcher);

    let rt = Runtime::new()?;
    let result = rt.block_on(engine.sync())?;

    println!("✓ Sync complete");
    println!("  Cursor:   {} -> {}", result.cursor_before, result.cursor_after);
    println!("  Received: {}", result.pulled);
    if result.push_attempted {
        println!("  Pushed:   {}", result.pushed);
    } else {
        println!("  Pushed:   skipped");
    }
    if result.conflict_retries > 0 {
        println!("  Retries:  {}", result.conflict_retries);
    }
    println!("  Took:     {:?}", result.duration);
    Ok(())
}

/// Syncs now, then keeps renewing until Ctrl-C.
pub fn watch(path: &Path, config: SyncConfig) -> Result<(), Box<dyn std::error::Error>> {
    let dispatcher = open_replica(path)?;
    let transport = HttpTransport::new(&config)?;
    let backoff = config.renewal.clone();
    let engine = Arc::new(SyncEngine::new(config, transport, dispatcher));

    let rt = Runtime::new()?;
    rt.block_on(async move {
        let scheduler = SyncScheduler::new(engine.clone());
        scheduler.sync_on_local_changes();
        scheduler.subscribe(|notice: &SyncNotice| match notice {
            SyncNotice::Starting => tracing::debug!("sync starting"),
            SyncNotice::Completed => println!("✓ Synced"),
            SyncNotice::Failed(message) => eprintln!("✗ Sync failed: {}", message),
        });

        if let Err(e) = scheduler.sync_now().await {
            tracing::warn!(error = %e, "initial sync failed");
        }

        let (foreground, signal) = watch::channel(true);
        let mut timer = RenewalTimer::start(scheduler.clone(), backoff, signal);
        println!("Watching for changes (Ctrl-C to stop)");

        let interrupted = tokio::signal::ctrl_c().await;
        timer.stop();
        scheduler.cancel_pending();
        drop(foreground);

        let stats = engine.stats();
        println!();
        println!("Cycles:    {}", stats.cycles_completed);
        println!("Pulls:     {}", stats.pull_calls);
        println!("Pushes:    {}", stats.push_calls);
        println!("Conflicts: {}", stats.conflicts_handled);
        if let Some(error) = stats.last_error {
            println!("Last error: {}", error);
        }
        interrupted
    })?;
    Ok(())
}
