// ABOUTME: Long-running scheduler process that fires the persisted schedule until Ctrl+C
// ABOUTME: Re-reads the persisted schedule periodically so CLI changes take effect

use super::AppContext;
use crate::scheduler::Scheduler;
use anyhow::Result;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time::interval;

pub async fn command(ctx: &AppContext, reload_every: Duration) -> Result<()> {
    let scheduler = ctx.scheduler().await?;
    scheduler.start().await?;

    println!();
    println!("========================================");
    println!("Starting scheduled replication");
    println!("========================================");
    match scheduler.current_config().await {
        Some(config) => {
            println!("  Schedule: {}", config.cron_expression);
            println!("  Tables:   {}", config.selected_tables.len());
            if config.paused {
                println!("  (paused)");
            }
        }
        None => println!("  No schedule configured yet; waiting for one"),
    }
    println!("  Press Ctrl+C to stop");
    println!();

    let (shutdown_tx, shutdown_rx) = broadcast::channel::<()>(1);
    let shutdown_tx_clone = shutdown_tx.clone();
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl+C: {}", e);
            return;
        }
        tracing::info!("Received shutdown signal");
        let _ = shutdown_tx_clone.send(());
    });

    run_until_shutdown(&scheduler, reload_every, shutdown_rx).await
}

/// Keep the scheduler alive, reloading it whenever the persisted schedule
/// changes, until a shutdown signal arrives. An in-flight run is allowed to
/// finish before returning.
pub async fn run_until_shutdown(
    scheduler: &Scheduler,
    reload_every: Duration,
    mut shutdown: broadcast::Receiver<()>,
) -> Result<()> {
    let mut last_seen = scheduler.current_config().await;
    let mut reload = interval(reload_every);
    reload.tick().await;

    loop {
        tokio::select! {
            biased;

            _ = shutdown.recv() => {
                tracing::info!("Shutdown signal received, stopping scheduler");
                break;
            }
            _ = reload.tick() => {
                let current = scheduler.current_config().await;
                if current != last_seen {
                    tracing::info!("Persisted schedule changed; reloading");
                    if let Err(e) = scheduler.start().await {
                        tracing::error!("Failed to reload schedule: {}", e);
                    }
                    last_seen = scheduler.current_config().await;
                }
            }
        }
    }

    scheduler.shutdown().await;
    if scheduler.is_running() {
        tracing::info!("Waiting for the current run to finish...");
        while scheduler.is_running() {
            tokio::time::sleep(Duration::from_millis(200)).await;
        }
    }
    Ok(())
}
