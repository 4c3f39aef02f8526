//! Core adapter contract shared between the correlation engine and consumers.
//!
//! This crate defines the raw/business event protocol, the acknowledgment
//! decision logic, raw-event classification helpers, and common channel
//! abstractions.

/// Pure acknowledgment-level decision logic.
pub mod ack;
/// Raw-event intake queue and business-event fan-out feed.
pub mod channel;
/// Raw payload classification helpers (noise, ids, invite links, derived keys).
pub mod classify;
/// Protocol types (raw events, business events, cached payloads).
pub mod types;

pub use ack::{AckDecision, decide};
pub use channel::{BusinessFeed, BusinessStream, EventChannelError, RawEventQueue};
pub use classify::{
    caption_message_key, invite_code_from_link, is_contact_id, is_invite_link, is_noise,
    is_room_id, revoked_message_key,
};
pub use types::{
    AckLevel, BusinessEvent, CachedMessage, ContactChange, ContactSnapshot, DirtyKind,
    FriendshipCandidate, InviteRecord, MessageKind, RawEvent, RawMessage,
};
