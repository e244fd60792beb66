//! # Example: Zero-downtime worker
//!
//! Run with `cargo run --example supervise --features logging`.
//!
//! The same binary is the supervisor (no role marker set) and every worker it
//! spawns. The supervisor hands off to a fresh worker every 10 seconds; each
//! worker "boots" for a second, completes the handshake and then serves until
//! it is told to stop. Ctrl-C stops everything.

use std::{sync::Arc, time::Duration};

use handover::{Config, LogWriter, Orchestrator, Subscribe, WorkerClient};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    if handover::is_supervisor() {
        supervise().await
    } else {
        work().await
    }
}

async fn supervise() -> anyhow::Result<()> {
    let subs: Vec<Arc<dyn Subscribe>> = vec![Arc::new(LogWriter::default())];
    let orchestrator = Orchestrator::builder(Config::current_exe()?)
        .with_subscribers(subs)
        .build();

    let rolling = orchestrator.clone();
    tokio::spawn(async move {
        let mut tick = tokio::time::interval(Duration::from_secs(10));
        tick.tick().await;
        loop {
            tick.tick().await;
            match rolling.restart().await {
                Ok(worker) => tracing::info!(pid = worker.pid, "rolled over"),
                Err(err) => tracing::warn!(error = %err, "roll-over failed"),
            }
        }
    });

    orchestrator.serve_until_signal().await?;
    Ok(())
}

async fn work() -> anyhow::Result<()> {
    let client = WorkerClient::from_env()?;
    let pid = std::process::id();

    tracing::info!(pid, role = ?client.role(), "booting");
    tokio::time::sleep(Duration::from_secs(1)).await;

    if let Err(err) = client.await_ready().await {
        tracing::error!(pid, error = %err, "handshake failed");
        std::process::exit(1);
    }

    let mut served = 0u64;
    loop {
        tokio::time::sleep(Duration::from_secs(2)).await;
        served += 1;
        tracing::info!(pid, served, "serving");
    }
}
