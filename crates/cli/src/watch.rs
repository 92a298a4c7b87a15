//! `watch-queue`: print action-queue broadcasts as they arrive.

use std::time::Duration;

use anyhow::{Context, Result};
use floorline_bus::{BusError, EventSubscriber, QueueSnapshot, TopicScheme, Transport, ZmqSubscriber};
use tracing::{info, warn};

const RECV_RETRY_DELAY: Duration = Duration::from_millis(200);

pub async fn watch_queue(endpoint: &str, topics: &TopicScheme) -> Result<()> {
    let transport = Transport::parse(endpoint).context("invalid bus endpoint")?;
    let subscriber = ZmqSubscriber::connect(&transport)
        .await
        .with_context(|| format!("failed to connect to {transport}"))?;

    let topic = topics.action_queue();
    subscriber
        .subscribe(&topic)
        .await
        .with_context(|| format!("failed to subscribe to {topic}"))?;
    info!(topic = %topic, endpoint = %transport, "watching action queue");

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("interrupted");
            Ok(())
        }
        () = follow(&subscriber, print_snapshot) => Ok(()),
    }
}

/// Hand every decodable snapshot to `on_snapshot` until the bus closes.
async fn follow(subscriber: &dyn EventSubscriber, mut on_snapshot: impl FnMut(&QueueSnapshot)) {
    loop {
        match subscriber.recv().await {
            Ok(message) => match message.decode::<QueueSnapshot>() {
                Ok(snapshot) => on_snapshot(&snapshot),
                Err(e) => warn!(topic = %message.topic, error = %e, "undecodable queue snapshot"),
            },
            Err(BusError::Closed) => return,
            Err(e) => {
                warn!(error = %e, "receive failed");
                tokio::time::sleep(RECV_RETRY_DELAY).await;
            }
        }
    }
}

fn print_snapshot(snapshot: &QueueSnapshot) {
    println!(
        "{} {} {} ({}) {} queued",
        snapshot.timestamp_utc.format("%H:%M:%S%.3f"),
        snapshot.module_id,
        snapshot.reason,
        snapshot.changed_conversation_id,
        snapshot.entries.len()
    );
    for entry in &snapshot.entries {
        let started = entry
            .started_at_utc
            .map(|t| t.format("%H:%M:%S").to_string())
            .unwrap_or_else(|| "-".into());
        println!(
            "  #{:<3} {:<8} {:<24} {:<36} started {}",
            entry.queue_position,
            entry.action_state.to_string(),
            entry.action_title,
            entry.conversation_id,
            started
        );
    }
}
