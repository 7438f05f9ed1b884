use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use uuid::Uuid;

use agora_types::models::{Message, MessageStamp, Pin};

/// A message as held by the cache: immutable content plus the stamp
/// counts, which reaction writes patch in place.
///
/// Edits, deletes, pins and unpins never mutate an instance; they evict it
/// so the next read builds a fresh one from the store.
#[derive(Debug)]
pub struct CachedMessage {
    id: Uuid,
    user_id: Uuid,
    channel_id: Uuid,
    content: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    deleted_at: Option<DateTime<Utc>>,
    pin: Option<Pin>,
    stamps: RwLock<Vec<MessageStamp>>,
}

impl CachedMessage {
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn user_id(&self) -> Uuid {
        self.user_id
    }

    pub fn channel_id(&self) -> Uuid {
        self.channel_id
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    pub fn is_edited(&self) -> bool {
        self.updated_at > self.created_at
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }

    pub fn pin(&self) -> Option<&Pin> {
        self.pin.as_ref()
    }

    pub fn is_pinned(&self) -> bool {
        self.pin.is_some()
    }

    /// Snapshot of the stamp rows, in first-reaction order.
    pub fn stamps(&self) -> Vec<MessageStamp> {
        self.stamps.read().clone()
    }

    /// Zero when the user has not used the stamp on this message.
    pub fn stamp_count(&self, stamp_id: Uuid, user_id: Uuid) -> u32 {
        self.stamps
            .read()
            .iter()
            .find(|s| s.stamp_id == stamp_id && s.user_id == user_id)
            .map_or(0, |s| s.count)
    }

    /// Replace the (stamp, user) row with `stamp`, which carries the stored total.
    pub(crate) fn update_stamp(&self, stamp: &MessageStamp) {
        let mut stamps = self.stamps.write();
        match stamps
            .iter_mut()
            .find(|s| s.stamp_id == stamp.stamp_id && s.user_id == stamp.user_id)
        {
            Some(existing) => *existing = stamp.clone(),
            None => stamps.push(stamp.clone()),
        }
    }

    pub(crate) fn remove_stamp(&self, stamp_id: Uuid, user_id: Uuid) {
        self.stamps
            .write()
            .retain(|s| !(s.stamp_id == stamp_id && s.user_id == user_id));
    }

    /// Owned copy of the current state.
    pub fn to_model(&self) -> Message {
        Message {
            id: self.id,
            user_id: self.user_id,
            channel_id: self.channel_id,
            content: self.content.clone(),
            created_at: self.created_at,
            updated_at: self.updated_at,
            deleted_at: self.deleted_at,
            pin: self.pin.clone(),
            stamps: self.stamps(),
        }
    }
}

impl From<Message> for CachedMessage {
    fn from(m: Message) -> Self {
        Self {
            id: m.id,
            user_id: m.user_id,
            channel_id: m.channel_id,
            content: m.content,
            created_at: m.created_at,
            updated_at: m.updated_at,
            deleted_at: m.deleted_at,
            pin: m.pin,
            stamps: RwLock::new(m.stamps),
        }
    }
}
