use std::{env, sync::Arc};

use chatlink_core::{AckLevel, BusinessFeed, MessageKind, RawEvent, RawEventQueue, RawMessage};
use chatlink_engine::{CorrelatorConfig, EventCorrelator};
use chatlink_store::InMemoryCacheStore;
use tokio::time::{Duration, timeout};
use tracing::info;
use tracing_subscriber::EnvFilter;

const DEFAULT_FILTER: &str = "info,chatlink_engine=debug";

/// Initialize global tracing subscriber with severity gating from environment.
///
/// Precedence:
/// 1) `RUST_LOG`
/// 2) `CHATLINK_LOG`
/// 3) internal default filter
fn init_tracing() {
    let env_filter = filter_from_env();
    let _ = tracing_subscriber::fmt()
        .with_target(true)
        .with_env_filter(env_filter)
        .try_init();
}

fn filter_from_env() -> EnvFilter {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return filter;
    }

    if let Some(value) = env::var("CHATLINK_LOG")
        .ok()
        .filter(|v| !v.trim().is_empty())
        && let Ok(filter) = EnvFilter::try_new(value)
    {
        return filter;
    }

    EnvFilter::new(DEFAULT_FILTER)
}

fn incoming_text(id: &str, from: &str, body: &str) -> RawMessage {
    RawMessage {
        id: id.to_owned(),
        from_me: false,
        kind: MessageKind::Text,
        body: body.to_owned(),
        author: Some(from.to_owned()),
        from: Some(from.to_owned()),
        timestamp: 1_700_000_000,
        ack: AckLevel::Pending,
        has_media: false,
        caption: None,
        links: Vec::new(),
        invite_code: None,
    }
}

#[tokio::main]
async fn main() {
    init_tracing();

    let (queue, raw_rx) = RawEventQueue::new(64);
    let feed = BusinessFeed::new(64);
    let correlator = Arc::new(EventCorrelator::with_config(
        feed.sender(),
        CorrelatorConfig {
            create_grace_ms: 50,
            ..CorrelatorConfig::default()
        },
    ));
    correlator
        .attach_store(Arc::new(InMemoryCacheStore::default()))
        .await;

    let mut business = feed.subscribe();
    let worker = tokio::spawn(Arc::clone(&correlator).run(raw_rx));

    info!("feeding a duplicated incoming message and a companion-device echo");
    let message = incoming_text("smoke-1", "49123@c.us", "hello from the smoke run");
    for event in [
        RawEvent::Message(message.clone()),
        RawEvent::Message(message),
        RawEvent::MessageCreate(RawMessage {
            from_me: true,
            ..incoming_text("smoke-2", "49123@c.us", "echo from a companion device")
        }),
    ] {
        if queue.push(event).await.is_err() {
            eprintln!("correlator loop is gone; aborting");
            std::process::exit(1);
        }
    }

    while let Ok(Some(event)) = timeout(Duration::from_millis(500), business.recv()).await {
        println!("business event: {event:?}");
    }

    drop(queue);
    let _ = worker.await;
}
