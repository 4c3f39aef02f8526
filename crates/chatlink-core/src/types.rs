use serde::{Deserialize, Serialize};

/// Backend-reported delivery-confirmation stage for a message.
///
/// Levels are ordered; a well-behaved delivery advances monotonically, but the
/// wire may report them out of order or with gaps. The derived `Ord` is the
/// authority for "has this level advanced".
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
pub enum AckLevel {
    /// Accepted locally, not yet confirmed by the server.
    Pending,
    /// Confirmed received by the server.
    Server,
    /// Delivered to the recipient device.
    Device,
    /// Read by the recipient.
    Read,
    /// Played by the recipient (voice/video notes).
    Played,
}

/// Backend-native message kind, reduced to the closed set the engine inspects.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum MessageKind {
    /// Plain text message.
    Text,
    /// Audio attachment.
    Audio,
    /// Voice note.
    Voice,
    /// Image attachment (may bundle a caption).
    Image,
    /// Video attachment.
    Video,
    /// Document attachment.
    Document,
    /// Sticker attachment.
    Sticker,
    /// Single contact card.
    ContactCard,
    /// Multi-recipient contact-card placeholder (noise, never surfaced).
    MultiContactCard,
    /// Direct group-invite payload.
    GroupInvite,
    /// Backend system notice (encryption/join notifications).
    SystemNotice,
    /// Revocation notice replacing a deleted message.
    Revoked,
}

impl MessageKind {
    /// Whether this kind carries a media asset whose availability is reported
    /// separately from the message itself.
    pub fn is_media(self) -> bool {
        matches!(
            self,
            Self::Audio | Self::Voice | Self::Image | Self::Video | Self::Document | Self::Sticker
        )
    }
}

/// Backend-native message payload subset consumed by the correlation engine.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RawMessage {
    /// Backend-assigned message id, stable for a logical message.
    pub id: String,
    /// Whether the message was authored by the logged-in account.
    pub from_me: bool,
    /// Message kind.
    pub kind: MessageKind,
    /// Display body (caption text for media kinds).
    pub body: String,
    /// Authoring participant id; absent for messages the current session sent
    /// itself, present for companion-device and group messages.
    pub author: Option<String>,
    /// Sender conversation id (contact, room, or broadcast id).
    pub from: Option<String>,
    /// Backend timestamp, seconds since the Unix epoch.
    pub timestamp: u64,
    /// Delivery-confirmation level observed on this payload.
    pub ack: AckLevel,
    /// Whether the media asset is confirmed retrievable.
    pub has_media: bool,
    /// Caption bundled inside a media payload.
    pub caption: Option<String>,
    /// Links embedded in the body.
    pub links: Vec<String>,
    /// Invite code carried by a direct group-invite payload.
    pub invite_code: Option<String>,
}

/// Contact fields carried by contact-change notifications.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ContactSnapshot {
    /// Contact or room id.
    pub id: String,
    /// Display name when known.
    pub name: Option<String>,
    /// Whether the entity is a room rather than a single contact.
    pub is_group: bool,
}

/// Contact-change sub-events delivered by the backend.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum ContactChange {
    /// Display name changed.
    NameChange {
        /// Affected contact or room.
        contact: ContactSnapshot,
        /// Name after the change.
        new_name: String,
        /// Name before the change.
        old_name: String,
    },
    /// Contact was added to the account's contact list.
    Add {
        /// Added contact.
        contact: ContactSnapshot,
    },
    /// Contact was removed from the account's contact list.
    Remove {
        /// Removed contact id.
        contact_id: String,
    },
}

/// Raw backend event union, dispatched by a single classifier.
///
/// The backend delivers these over independent notification channels with no
/// ordering guarantee between kinds and possible redelivery of the same
/// logical event.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum RawEvent {
    /// Incoming message delivery.
    Message(RawMessage),
    /// Delivery-confirmation update for a sent message.
    MessageAck(RawMessage),
    /// Echo of a message created by the current account (any device).
    MessageCreate(RawMessage),
    /// Message deleted for every participant.
    MessageRevokeEveryone {
        /// Revocation payload (reuses the original message id).
        message: RawMessage,
        /// Pre-revocation payload when the backend still holds it.
        original: Option<RawMessage>,
    },
    /// Message deleted on the account's own devices only.
    MessageRevokeMe(RawMessage),
    /// Contact-list change.
    ContactChange(ContactChange),
    /// Media asset for a message became retrievable.
    MediaUploaded(RawMessage),
}

/// Entity class referenced by a dirty event.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum DirtyKind {
    /// Cached message payload is stale.
    Message,
    /// Cached contact payload is stale.
    Contact,
    /// Cached room payload is stale.
    Room,
}

/// Normalized business event emitted to the downstream consumer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum BusinessEvent {
    /// A message payload is ready to fetch under `message_id`.
    Message {
        /// Cache key of the message payload.
        message_id: String,
    },
    /// An unconfirmed friendship was inferred.
    Friendship {
        /// Cache key of the friendship payload.
        friendship_id: String,
    },
    /// Previously delivered data for an entity is stale and should be refetched.
    Dirty {
        /// Entity class of the stale payload.
        payload_type: DirtyKind,
        /// Cache key of the stale payload.
        payload_id: String,
    },
    /// A group invitation was extracted from a message.
    RoomInvite {
        /// Invite code, also the cache key of the invite payload.
        room_invitation_id: String,
    },
}

/// Message payload shape persisted in the cache store.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CachedMessage {
    /// Backend-assigned message id.
    pub id: String,
    /// Highest delivery-confirmation level observed so far.
    pub ack: AckLevel,
    /// Message kind.
    pub kind: MessageKind,
    /// Display body.
    pub body: String,
    /// Whether the message was authored by the logged-in account.
    pub from_me: bool,
    /// Whether the raw payload carried an author id.
    pub author_present: bool,
    /// Whether the media asset was confirmed retrievable.
    pub has_media: bool,
    /// Backend timestamp, seconds since the Unix epoch.
    pub timestamp: u64,
}

impl From<&RawMessage> for CachedMessage {
    fn from(message: &RawMessage) -> Self {
        Self {
            id: message.id.clone(),
            ack: message.ack,
            kind: message.kind,
            body: message.body.clone(),
            from_me: message.from_me,
            author_present: message.author.is_some(),
            has_media: message.has_media,
            timestamp: message.timestamp,
        }
    }
}

/// Unconfirmed friendship inferred from a message or contact-list change.
///
/// Written once to the cache store and never mutated.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FriendshipCandidate {
    /// Synthesized friendship id.
    pub id: String,
    /// Peer contact id.
    pub contact_id: String,
    /// Greeting text from the triggering message, may be empty.
    pub hello: String,
    /// Backend timestamp, seconds since the Unix epoch.
    pub timestamp: u64,
}

/// Cached group-invitation code extracted from a message.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct InviteRecord {
    /// Backend invite code.
    pub invite_code: String,
}
