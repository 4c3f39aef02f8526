use std::{
    hash::{DefaultHasher, Hash, Hasher},
    sync::Arc,
    time::{SystemTime, UNIX_EPOCH},
};

use thiserror::Error;
use tokio::{
    sync::{Mutex, RwLock, broadcast, mpsc},
    time::Duration,
};
use tracing::{debug, trace, warn};
use uuid::Uuid;

use chatlink_core::{
    BusinessEvent, CachedMessage, ContactChange, DirtyKind, FriendshipCandidate, InviteRecord,
    MessageKind, RawEvent, RawMessage, ack, classify,
};
use chatlink_store::{CacheStore, StoreError};

use crate::tracker::{RequestTracker, SendReceipt, TrackerError};

/// Number of mutex shards serializing per-id read-modify-write sequences.
const LOCK_SHARDS: usize = 64;
/// Default bounded wait for a late send registration in the create path.
const DEFAULT_CREATE_GRACE_MS: u64 = 500;
/// Default send-confirmation timeout.
const DEFAULT_SEND_TIMEOUT_MS: u64 = 120_000;

/// Errors surfaced by correlator operations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CorrelatorError {
    /// The cache store has not been attached yet (login not finished).
    #[error("cache store is not available yet")]
    CacheUnavailable,
    /// A cache store operation failed.
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Runtime tuning values for the correlator.
#[derive(Debug, Clone)]
pub struct CorrelatorConfig {
    /// Bounded wait for a late send registration in the create path, in
    /// milliseconds.
    pub create_grace_ms: u64,
    /// Send-confirmation timeout used by [`EventCorrelator::track_send`], in
    /// milliseconds.
    pub send_timeout_ms: u64,
}

impl Default for CorrelatorConfig {
    fn default() -> Self {
        Self {
            create_grace_ms: DEFAULT_CREATE_GRACE_MS,
            send_timeout_ms: DEFAULT_SEND_TIMEOUT_MS,
        }
    }
}

/// Single ingestion point for raw backend events.
///
/// Owns the dedup/emit decision for every event kind, using the cache store
/// as the only source of truth for "seen before", the ack decision logic for
/// confirmation handling, and the request tracker to match confirmations to
/// application-initiated sends. All read-modify-write sequences are
/// serialized per message id through sharded mutexes; cross-id traffic
/// proceeds in parallel.
pub struct EventCorrelator {
    store: RwLock<Option<Arc<dyn CacheStore>>>,
    tracker: RequestTracker,
    events: broadcast::Sender<BusinessEvent>,
    config: CorrelatorConfig,
    locks: Vec<Mutex<()>>,
}

impl EventCorrelator {
    /// Create a correlator emitting business events on `events`.
    ///
    /// The correlator starts without a cache store and drops all incoming
    /// events until [`attach_store`](Self::attach_store) is called.
    pub fn new(events: broadcast::Sender<BusinessEvent>) -> Self {
        Self::with_config(events, CorrelatorConfig::default())
    }

    /// Create a correlator with explicit tuning values.
    pub fn with_config(events: broadcast::Sender<BusinessEvent>, config: CorrelatorConfig) -> Self {
        Self {
            store: RwLock::new(None),
            tracker: RequestTracker::new(),
            events,
            config,
            locks: std::iter::repeat_with(|| Mutex::new(())).take(LOCK_SHARDS).collect(),
        }
    }

    /// Attach the cache store once login has produced one.
    pub async fn attach_store(&self, store: Arc<dyn CacheStore>) {
        *self.store.write().await = Some(store);
    }

    /// Detach the cache store (logout); subsequent events are dropped.
    pub async fn detach_store(&self) {
        *self.store.write().await = None;
    }

    /// Current cache store, for consumers resolving emitted payload ids.
    pub async fn store(&self) -> Result<Arc<dyn CacheStore>, CorrelatorError> {
        self.store
            .read()
            .await
            .clone()
            .ok_or(CorrelatorError::CacheUnavailable)
    }

    /// The send-request tracker bridged by this correlator.
    pub fn tracker(&self) -> &RequestTracker {
        &self.tracker
    }

    /// Register an application-initiated send awaiting confirmation for
    /// `message_id`, with the configured send timeout.
    pub fn track_send(&self, message_id: &str) -> Result<SendReceipt, TrackerError> {
        self.tracker
            .register(message_id, Duration::from_millis(self.config.send_timeout_ms))
    }

    /// Dispatch one raw backend event to its handler.
    pub async fn handle(&self, event: RawEvent) -> Result<(), CorrelatorError> {
        match event {
            RawEvent::Message(message) => self.on_message(message).await,
            RawEvent::MessageAck(message) => self.on_message_ack(message).await,
            RawEvent::MessageCreate(message) => self.on_message_create(message).await,
            RawEvent::MessageRevokeEveryone { message, original } => {
                self.on_message_revoke_everyone(message, original).await
            }
            RawEvent::MessageRevokeMe(message) => self.on_message_revoke_me(message).await,
            RawEvent::ContactChange(change) => self.on_contact_change(change).await,
            RawEvent::MediaUploaded(message) => self.on_media_uploaded(message).await,
        }
    }

    /// Drain `raw_rx`, dispatching each event and logging failures.
    ///
    /// No event is re-queued or retried; redelivery dedup is the only
    /// tolerance mechanism.
    pub async fn run(self: Arc<Self>, mut raw_rx: mpsc::Receiver<RawEvent>) {
        while let Some(event) = raw_rx.recv().await {
            if let Err(err) = self.handle(event).await {
                warn!(error = %err, "raw event processing failed");
            }
        }
        debug!("raw event channel closed; correlator loop exiting");
    }

    /// Process an incoming message delivery.
    pub async fn on_message(&self, message: RawMessage) -> Result<(), CorrelatorError> {
        let Some(cache) = self.cache_for("on_message").await else {
            return Ok(());
        };
        self.ingest_message(&cache, message).await
    }

    async fn ingest_message(
        &self,
        cache: &Arc<dyn CacheStore>,
        message: RawMessage,
    ) -> Result<(), CorrelatorError> {
        if classify::is_noise(&message) {
            trace!(message_id = %message.id, "noise payload skipped");
            return Ok(());
        }

        let message_id = message.id.clone();
        {
            let _guard = self.id_lock(&message_id).lock().await;
            if cache.get_message(&message_id).await?.is_some() {
                trace!(message_id = %message_id, "transport redelivery skipped");
                return Ok(());
            }
            cache
                .set_message(&message_id, CachedMessage::from(&message))
                .await?;
        }

        // The backend bundles an image caption inside the media payload
        // without a separate text notification; surface it as its own
        // message under a derived id.
        if let Some(caption_message) = caption_text_message(&message) {
            Box::pin(self.ingest_message(cache, caption_message)).await?;
        }

        if let Some(sender) = message.from.as_deref()
            && classify::is_contact_id(sender)
        {
            let contact = cache.get_contact(sender).await?;
            let not_friend = !contact.is_some_and(|c| c.is_my_contact);
            if not_friend {
                let candidate = FriendshipCandidate {
                    id: Uuid::new_v4().to_string(),
                    contact_id: sender.to_owned(),
                    hello: message.body.clone(),
                    timestamp: message.timestamp,
                };
                cache.set_friendship(&candidate.id, candidate.clone()).await?;
                self.emit(BusinessEvent::Friendship {
                    friendship_id: candidate.id,
                });
            }
        }

        if self.classify_invite(cache, &message).await? {
            self.emit(BusinessEvent::Message { message_id });
        }
        Ok(())
    }

    /// Convert invite-carrying payloads into a room-invite event.
    ///
    /// Returns whether the message should still be emitted as a message
    /// event; an invite is never surfaced as both.
    async fn classify_invite(
        &self,
        cache: &Arc<dyn CacheStore>,
        message: &RawMessage,
    ) -> Result<bool, CorrelatorError> {
        if message.kind == MessageKind::GroupInvite {
            match message.invite_code.as_deref() {
                Some(code) => {
                    cache
                        .set_invite(
                            code,
                            InviteRecord {
                                invite_code: code.to_owned(),
                            },
                        )
                        .await?;
                    self.emit(BusinessEvent::RoomInvite {
                        room_invitation_id: code.to_owned(),
                    });
                }
                None => {
                    warn!(message_id = %message.id, "group invite without an invite code");
                }
            }
            return Ok(false);
        }

        if message.kind == MessageKind::Text
            && let [link] = message.links.as_slice()
            && let Some(code) = classify::invite_code_from_link(link)
        {
            cache
                .set_invite(
                    &code,
                    InviteRecord {
                        invite_code: code.clone(),
                    },
                )
                .await?;
            self.emit(BusinessEvent::RoomInvite {
                room_invitation_id: code,
            });
            return Ok(false);
        }

        Ok(true)
    }

    /// Process a delivery-confirmation update.
    ///
    /// Only self-authored confirmations are relevant; the backend reports
    /// peer messages through the message channel instead.
    pub async fn on_message_ack(&self, message: RawMessage) -> Result<(), CorrelatorError> {
        if !message.from_me {
            return Ok(());
        }
        let Some(cache) = self.cache_for("on_message_ack").await else {
            return Ok(());
        };
        self.process_self_message(&cache, &message).await
    }

    /// Shared acknowledgment path for self-authored messages.
    async fn process_self_message(
        &self,
        cache: &Arc<dyn CacheStore>,
        message: &RawMessage,
    ) -> Result<(), CorrelatorError> {
        let message_id = message.id.clone();
        let decision = {
            let _guard = self.id_lock(&message_id).lock().await;
            let previous_level = cache.get_message(&message_id).await?.map(|m| m.ack);
            let decision = ack::decide(
                previous_level,
                message.ack,
                message.kind.is_media(),
                message.has_media,
            );

            // Persist the observation unconditionally, pinning the stored
            // level to max(previous, observed).
            let mut payload = CachedMessage::from(message);
            if let Some(previous_level) = previous_level
                && !decision.advance
            {
                payload.ack = previous_level;
            }
            cache.set_message(&message_id, payload).await?;
            decision
        };

        if decision.should_emit {
            // A pending send claims the confirmation silently; its caller
            // receives the message through the completed send instead.
            if !self.tracker.resolve(&message_id) {
                self.emit(BusinessEvent::Message {
                    message_id: message_id.clone(),
                });
            }
        }
        if decision.should_mark_dirty {
            self.emit(BusinessEvent::Dirty {
                payload_type: DirtyKind::Message,
                payload_id: message_id,
            });
        }
        Ok(())
    }

    /// Process the echo of a message created by the current account,
    /// including from a companion device.
    pub async fn on_message_create(&self, message: RawMessage) -> Result<(), CorrelatorError> {
        if !message.from_me {
            return Ok(());
        }
        let Some(cache) = self.cache_for("on_message_create").await else {
            return Ok(());
        };

        let message_id = message.id.clone();
        {
            let _guard = self.id_lock(&message_id).lock().await;
            // An ack observation can land before this echo; never regress
            // the stored level.
            let mut payload = CachedMessage::from(&message);
            if let Some(existing) = cache.get_message(&message_id).await? {
                payload.ack = payload.ack.max(existing.ack);
            }
            cache.set_message(&message_id, payload).await?;
        }

        // A send initiated by this process registers the id just after the
        // send call returns, which can lose the race against this echo; wait
        // a bounded grace for the registration before treating the message
        // as externally initiated.
        let grace = Duration::from_millis(self.config.create_grace_ms);
        if !self.tracker.resolve_within(&message_id, grace).await {
            self.emit(BusinessEvent::Message { message_id });
        }
        Ok(())
    }

    /// Process a message deleted for every participant.
    ///
    /// The revocation reuses the live message id; the pre-revocation payload
    /// is preserved under a derived key so existing references stay
    /// resolvable.
    pub async fn on_message_revoke_everyone(
        &self,
        mut message: RawMessage,
        original: Option<RawMessage>,
    ) -> Result<(), CorrelatorError> {
        let Some(cache) = self.cache_for("on_message_revoke_everyone").await else {
            return Ok(());
        };

        let message_id = message.id.clone();
        {
            let _guard = self.id_lock(&message_id).lock().await;
            if let Some(original) = original {
                let revoked_key = classify::revoked_message_key(&original.id);
                message.body = revoked_key.clone();
                cache
                    .set_message(&revoked_key, CachedMessage::from(&original))
                    .await?;
            }
            cache
                .set_message(&message_id, CachedMessage::from(&message))
                .await?;
        }

        self.emit(BusinessEvent::Message { message_id });
        Ok(())
    }

    /// Self-only deletion report from the backend; intentionally a no-op.
    pub async fn on_message_revoke_me(&self, message: RawMessage) -> Result<(), CorrelatorError> {
        trace!(message_id = %message.id, "self-only revoke ignored");
        Ok(())
    }

    /// Process a contact-list change.
    pub async fn on_contact_change(&self, change: ContactChange) -> Result<(), CorrelatorError> {
        let Some(cache) = self.cache_for("on_contact_change").await else {
            return Ok(());
        };

        match change {
            ContactChange::NameChange {
                contact,
                new_name,
                old_name,
            } => {
                debug!(
                    contact_id = %contact.id,
                    %new_name,
                    %old_name,
                    "contact name changed"
                );
                let payload_type = if contact.is_group {
                    DirtyKind::Room
                } else {
                    DirtyKind::Contact
                };
                cache.delete_contact_or_room(&contact.id).await?;
                self.emit(BusinessEvent::Dirty {
                    payload_type,
                    payload_id: contact.id,
                });
            }
            ContactChange::Add { contact } => {
                let candidate = FriendshipCandidate {
                    id: Uuid::new_v4().to_string(),
                    contact_id: contact.id,
                    hello: String::new(),
                    timestamp: unix_timestamp(),
                };
                cache.set_friendship(&candidate.id, candidate.clone()).await?;
                self.emit(BusinessEvent::Friendship {
                    friendship_id: candidate.id,
                });
            }
            ContactChange::Remove { contact_id } => {
                trace!(%contact_id, "contact removal ignored");
            }
        }
        Ok(())
    }

    /// Process an upload-complete notification for a media message.
    ///
    /// Updates the cached payload in place, keeping any body already cached
    /// and never regressing the stored ack level. No emission; the ack path
    /// decides visibility.
    pub async fn on_media_uploaded(&self, message: RawMessage) -> Result<(), CorrelatorError> {
        let Some(cache) = self.cache_for("on_media_uploaded").await else {
            return Ok(());
        };

        if message.kind == MessageKind::Image {
            let message_id = message.id.clone();
            let _guard = self.id_lock(&message_id).lock().await;
            let mut payload = CachedMessage::from(&message);
            if let Some(existing) = cache.get_message(&message_id).await? {
                if !existing.body.is_empty() {
                    payload.body = existing.body;
                }
                payload.ack = payload.ack.max(existing.ack);
            }
            cache.set_message(&message_id, payload).await?;
        }
        if !message.has_media {
            warn!(message_id = %message.id, kind = ?message.kind, "media reported uploaded without asset");
        }
        Ok(())
    }

    async fn cache_for(&self, operation: &'static str) -> Option<Arc<dyn CacheStore>> {
        let store = self.store.read().await.clone();
        if store.is_none() {
            warn!(operation, "event dropped: cache store not ready before login finished");
        }
        store
    }

    fn id_lock(&self, message_id: &str) -> &Mutex<()> {
        let mut hasher = DefaultHasher::new();
        message_id.hash(&mut hasher);
        let index = (hasher.finish() as usize) % self.locks.len();
        &self.locks[index]
    }

    fn emit(&self, event: BusinessEvent) {
        trace!(?event, "business event emitted");
        let _ = self.events.send(event);
    }
}

/// Synthesize the derived text message for an image payload carrying caption
/// text.
fn caption_text_message(message: &RawMessage) -> Option<RawMessage> {
    if message.kind != MessageKind::Image {
        return None;
    }
    let caption = message.caption.as_deref().filter(|text| !text.is_empty())?;
    Some(RawMessage {
        id: classify::caption_message_key(&message.id),
        kind: MessageKind::Text,
        body: caption.to_owned(),
        caption: None,
        has_media: false,
        ..message.clone()
    })
}

fn unix_timestamp() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_secs())
        .unwrap_or_default()
}
