//! Demo: run a short simulated chat workload and print the final stats.

use anyhow::{anyhow, Context, Result};
use futures::future::join_all;
use parley_lib::coordinator::ChannelSink;
use parley_lib::{telemetry, Coordinator, ServerConfig, ServerContext};
use std::sync::Arc;
use tracing::info;

const CLIENTS: usize = 8;
const ROUTES: [&str; 3] = ["general", "ops", "random"];
const PAYLOADS: [&str; 4] = [
    "morning all",
    "!deploy starts in five",
    "URGENT: database failover",
    "important: read the runbook",
];

#[tokio::main]
async fn main() -> Result<()> {
    let config = ServerConfig::load().context("loading configuration")?;
    telemetry::init(&config.logging.filter).map_err(|e| anyhow!(e))?;

    let context = ServerContext::new(config).context("building server context")?;
    let reporter = context.spawn_stats_reporter();
    let coordinator = Coordinator::new(Arc::clone(&context));

    let connects = (0..CLIENTS).map(|i| {
        let coordinator = coordinator.clone();
        async move {
            let id = format!("client-{}", i);
            let (sink, rx) = ChannelSink::new();
            let admission = coordinator.connect(&id, Arc::new(sink)).await;
            if admission.accepted {
                coordinator.join_route(&id, ROUTES[i % ROUTES.len()]);
            }
            (id, rx)
        }
    });
    let mut clients = join_all(connects).await;

    let mut refused = 0;
    for (n, (id, _)) in clients.iter().enumerate() {
        let route = ROUTES[n % ROUTES.len()];
        let payload = PAYLOADS[n % PAYLOADS.len()];
        if !coordinator.on_incoming_message(id, route, payload).accepted {
            refused += 1;
        }
    }

    context.queue().wait_idle().await;
    let received: usize = clients
        .iter_mut()
        .map(|(_, rx)| std::iter::from_fn(|| rx.try_recv().ok()).count())
        .sum();
    info!(received, refused, "Workload finished");

    println!("{}", serde_json::to_string_pretty(&coordinator.stats())?);

    context.shutdown().await;
    reporter.await?;
    Ok(())
}
