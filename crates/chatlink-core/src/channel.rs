use thiserror::Error;
use tokio::sync::{broadcast, mpsc};

use crate::types::{BusinessEvent, RawEvent};

/// Errors returned when queueing raw events toward the engine.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EventChannelError {
    /// The correlator loop is gone; the event can never be processed.
    #[error("raw event queue is closed")]
    Closed,
    /// The bounded queue is full; the transport is outpacing the engine.
    #[error("raw event queue is full")]
    Full,
}

/// Bounded intake queue between the transport and the correlator loop.
///
/// The backend surfaces messages, acknowledgments, revocations and contact
/// updates on independent notification paths; the queue funnels them into the
/// single ingestion order the correlator requires. Async transports call
/// [`push`](Self::push), which applies backpressure. Transports delivering
/// from synchronous callbacks call [`try_push`](Self::try_push) and decide
/// themselves what a full queue means.
#[derive(Clone, Debug)]
pub struct RawEventQueue {
    tx: mpsc::Sender<RawEvent>,
}

impl RawEventQueue {
    /// Create a queue holding up to `capacity` undrained events (raised to at
    /// least 1) and return it with the receiver the correlator loop drains.
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<RawEvent>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self { tx }, rx)
    }

    /// Queue one raw event, waiting for capacity.
    pub async fn push(&self, event: RawEvent) -> Result<(), EventChannelError> {
        self.tx
            .send(event)
            .await
            .map_err(|_| EventChannelError::Closed)
    }

    /// Queue one raw event without waiting.
    pub fn try_push(&self, event: RawEvent) -> Result<(), EventChannelError> {
        self.tx.try_send(event).map_err(|err| match err {
            mpsc::error::TrySendError::Full(_) => EventChannelError::Full,
            mpsc::error::TrySendError::Closed(_) => EventChannelError::Closed,
        })
    }
}

/// Fan-out feed of emitted business events.
///
/// Emission never blocks the engine: a subscriber that falls behind loses its
/// oldest undelivered events rather than slowing ingestion down. Consumers
/// re-read full payloads from the cache store by id, so a lost id is
/// recoverable.
#[derive(Clone, Debug)]
pub struct BusinessFeed {
    tx: broadcast::Sender<BusinessEvent>,
}

impl BusinessFeed {
    /// Create a feed retaining up to `capacity` undelivered events per
    /// subscriber (raised to at least 1).
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Sender handle wired into the correlator.
    pub fn sender(&self) -> broadcast::Sender<BusinessEvent> {
        self.tx.clone()
    }

    /// Subscribe to events emitted from this point on.
    pub fn subscribe(&self) -> BusinessStream {
        BusinessStream {
            rx: self.tx.subscribe(),
        }
    }
}

/// One subscriber's view of the business-event stream.
#[derive(Debug)]
pub struct BusinessStream {
    rx: broadcast::Receiver<BusinessEvent>,
}

impl BusinessStream {
    /// Receive the next business event.
    ///
    /// A subscriber that overflowed its buffer resumes from the oldest event
    /// still retained; the gap is not surfaced as an error. Returns `None`
    /// once the feed is gone.
    pub async fn recv(&mut self) -> Option<BusinessEvent> {
        loop {
            match self.rx.recv().await {
                Ok(event) => return Some(event),
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    /// Receive the next new-message id, skipping other event kinds.
    pub async fn recv_message_id(&mut self) -> Option<String> {
        loop {
            if let BusinessEvent::Message { message_id } = self.recv().await? {
                return Some(message_id);
            }
        }
    }
}
