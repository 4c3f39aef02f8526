//! Cache store contract consumed by the correlation engine.
//!
//! The store is the single source of truth for "have we seen this before";
//! the engine never caches its values in process-local state across calls.

use std::{
    collections::HashMap,
    sync::{Arc, RwLock},
};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use chatlink_core::{CachedMessage, FriendshipCandidate, InviteRecord};

/// Errors surfaced by cache store operations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// The backing store rejected or failed the operation.
    #[error("cache store backend failure: {0}")]
    Backend(String),
}

/// Cached contact or room record.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Contact {
    /// Contact or room id.
    pub id: String,
    /// Display name when known.
    pub name: Option<String>,
    /// Whether the contact is a confirmed friend of the account.
    pub is_my_contact: bool,
    /// Whether the entity is a room.
    pub is_group: bool,
}

/// Key-value persistence contract for message, contact, friendship, and
/// invitation payloads, keyed by backend-assigned identifiers.
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Fetch a cached message payload.
    async fn get_message(&self, id: &str) -> Result<Option<CachedMessage>, StoreError>;

    /// Store a message payload under `id`.
    async fn set_message(&self, id: &str, payload: CachedMessage) -> Result<(), StoreError>;

    /// Fetch a cached contact or room record.
    async fn get_contact(&self, id: &str) -> Result<Option<Contact>, StoreError>;

    /// Store a contact or room record under `id`.
    async fn set_contact(&self, id: &str, contact: Contact) -> Result<(), StoreError>;

    /// Remove a cached contact or room record.
    async fn delete_contact_or_room(&self, id: &str) -> Result<(), StoreError>;

    /// Fetch a cached friendship payload.
    async fn get_friendship(&self, id: &str) -> Result<Option<FriendshipCandidate>, StoreError>;

    /// Store a friendship payload under `id`.
    async fn set_friendship(
        &self,
        id: &str,
        payload: FriendshipCandidate,
    ) -> Result<(), StoreError>;

    /// Fetch a cached invitation payload.
    async fn get_invite(&self, code: &str) -> Result<Option<InviteRecord>, StoreError>;

    /// Store an invitation payload under `code`.
    async fn set_invite(&self, code: &str, payload: InviteRecord) -> Result<(), StoreError>;
}

#[derive(Default)]
struct Tables {
    messages: HashMap<String, CachedMessage>,
    contacts: HashMap<String, Contact>,
    friendships: HashMap<String, FriendshipCandidate>,
    invites: HashMap<String, InviteRecord>,
}

/// In-memory cache store used by tests and the smoke binary.
#[derive(Clone, Default)]
pub struct InMemoryCacheStore {
    tables: Arc<RwLock<Tables>>,
}

impl InMemoryCacheStore {
    fn read(&self) -> Result<std::sync::RwLockReadGuard<'_, Tables>, StoreError> {
        self.tables
            .read()
            .map_err(|_| StoreError::Backend("poisoned lock".to_owned()))
    }

    fn write(&self) -> Result<std::sync::RwLockWriteGuard<'_, Tables>, StoreError> {
        self.tables
            .write()
            .map_err(|_| StoreError::Backend("poisoned lock".to_owned()))
    }
}

#[async_trait]
impl CacheStore for InMemoryCacheStore {
    async fn get_message(&self, id: &str) -> Result<Option<CachedMessage>, StoreError> {
        Ok(self.read()?.messages.get(id).cloned())
    }

    async fn set_message(&self, id: &str, payload: CachedMessage) -> Result<(), StoreError> {
        self.write()?.messages.insert(id.to_owned(), payload);
        Ok(())
    }

    async fn get_contact(&self, id: &str) -> Result<Option<Contact>, StoreError> {
        Ok(self.read()?.contacts.get(id).cloned())
    }

    async fn set_contact(&self, id: &str, contact: Contact) -> Result<(), StoreError> {
        self.write()?.contacts.insert(id.to_owned(), contact);
        Ok(())
    }

    async fn delete_contact_or_room(&self, id: &str) -> Result<(), StoreError> {
        self.write()?.contacts.remove(id);
        Ok(())
    }

    async fn get_friendship(&self, id: &str) -> Result<Option<FriendshipCandidate>, StoreError> {
        Ok(self.read()?.friendships.get(id).cloned())
    }

    async fn set_friendship(
        &self,
        id: &str,
        payload: FriendshipCandidate,
    ) -> Result<(), StoreError> {
        self.write()?.friendships.insert(id.to_owned(), payload);
        Ok(())
    }

    async fn get_invite(&self, code: &str) -> Result<Option<InviteRecord>, StoreError> {
        Ok(self.read()?.invites.get(code).cloned())
    }

    async fn set_invite(&self, code: &str, payload: InviteRecord) -> Result<(), StoreError> {
        self.write()?.invites.insert(code.to_owned(), payload);
        Ok(())
    }
}
