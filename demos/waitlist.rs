//! # Example: waitlist
//!
//! Simulates a small waitlist with short timeouts so the whole lifecycle plays out
//! in a few seconds.
//!
//! Shows how to:
//! - Build a [`Waitlist`] with the [`LogWriter`] subscriber.
//! - Join, heartbeat and leave from concurrent client tasks.
//! - Let the [`ReconcileDriver`](waitvisor::ReconcileDriver) evict silent clients
//!   and promote the head of the queue.
//!
//! ## Flow
//! ```text
//! c0 c1 ──► join ──► Active      c0 heartbeats every 500ms, c1 goes silent
//! c2 c3 c4 ──► join ──► Waiting  c4 leaves right away
//!
//! every 1s: ReconcileDriver ──► tick
//!   ├─ c4 idle > 2s   ──► evicted
//!   ├─ c1 stale > 3s  ──► evicted
//!   └─ c2 promoted into c1's slot
//! ```
//!
//! ## Run
//! ```bash
//! RUST_LOG=waitvisor=debug cargo run --example waitlist
//! ```

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;
use waitvisor::{Config, LogWriter, Subscribe, Waitlist};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = Config {
        active_capacity: 2,
        active_stale_timeout: Duration::from_secs(3),
        waiting_idle_timeout: Duration::from_secs(2),
        reconcile_interval: Duration::from_secs(1),
        ..Config::from_env()
    };
    let subs: Vec<Arc<dyn Subscribe>> = vec![Arc::new(LogWriter::new())];
    let waitlist = Waitlist::builder(config).with_subscribers(subs).build();

    let token = CancellationToken::new();
    let driver = waitlist
        .reconcile_driver()
        .with_signals(true)
        .spawn(token.clone());

    for i in 0..5 {
        let outcome = waitlist.join(format!("c{i}")).await?;
        tracing::info!(client = i, ?outcome, "joined");
    }
    waitlist.leave("c4").await?;

    let beating = {
        let waitlist = Arc::clone(&waitlist);
        let token = token.clone();
        tokio::spawn(async move {
            let mut every = tokio::time::interval(Duration::from_millis(500));
            while !token.is_cancelled() {
                every.tick().await;
                if let Err(e) = waitlist.heartbeat("c0").await {
                    tracing::warn!(error = %e, "c0 lost its slot");
                    break;
                }
            }
        })
    };

    tokio::time::sleep(Duration::from_millis(5_500)).await;

    for i in 0..5 {
        let client = format!("c{i}");
        match waitlist.session_status(client.as_str()).await? {
            Some(view) => tracing::info!(
                client = %client,
                status = view.status.as_str(),
                position = %view.position,
                "status"
            ),
            None => tracing::info!(client = %client, "gone"),
        }
    }
    let bounds = waitlist.global_queue_bounds().await?;
    tracing::info!(
        first = %bounds.first_waiting_position,
        last = %bounds.last_waiting_position,
        "queue bounds"
    );

    token.cancel();
    driver.await?;
    beating.await?;
    Ok(())
}
