//! offwatch
//!
//! Offset monitor. Loads the feed backlog, launches the configured plugins,
//! and keeps following the feed and serving status until interrupted.

use anyhow::Result;
use offwatch_monitor::{status, Application, Config, FeedReader};
use tokio::sync::watch;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::from_env()?;

    // Prefer RUST_LOG, fall back to OFFWATCH_LOG_LEVEL
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| config.log_level.clone().into()))
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    info!("Starting offwatch");
    info!(
        feed_path = %config.feed_path.display(),
        follow = config.follow,
        poll_interval_ms = config.poll_interval.as_millis() as u64,
        notify_cooldown_ms = config.notify_cooldown.as_millis() as u64,
        event_log = config.plugins.event_log,
        lag_report = config.plugins.lag_report,
        status = config.plugins.status,
        "Configuration loaded"
    );

    let app = Application::from_config(&config)?;
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let status_handle = app.status().cloned().map(|state| {
        let addr = config.status_addr;
        let shutdown_rx = shutdown_rx.clone();
        tokio::spawn(async move { status::serve(addr, state, shutdown_rx).await })
    });

    let reader = FeedReader::new(&config.feed_path);
    let follow = config.follow.then_some(config.poll_interval);
    let mut app_handle = tokio::spawn(app.run(reader, follow, shutdown_rx));

    let feed_done = tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("Received shutdown signal");
            false
        }
        result = &mut app_handle => {
            report_feed(result);
            true
        }
    };

    if feed_done && status_handle.is_some() {
        info!("Feed finished; serving status until interrupted");
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for shutdown signal");
        }
    }

    let _ = shutdown_tx.send(true);

    if !feed_done {
        report_feed(app_handle.await);
    }

    if let Some(handle) = status_handle {
        match handle.await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => error!(error = %e, "Status server error"),
            Err(e) => error!(error = %e, "Status server task panicked"),
        }
    }

    info!("offwatch shutdown complete");
    Ok(())
}

fn report_feed(result: Result<Result<offwatch_monitor::FeedStats>, tokio::task::JoinError>) {
    match result {
        Ok(Ok(stats)) => info!(
            applied = stats.applied,
            skipped = stats.skipped,
            failed = stats.failed,
            "Feed finished"
        ),
        Ok(Err(e)) => error!(error = %e, "Feed error"),
        Err(e) => error!(error = %e, "Feed task panicked"),
    }
}
