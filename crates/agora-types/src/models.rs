use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Well-known ID of the seeded `general` channel.
pub const GENERAL_CHANNEL_ID: Uuid = Uuid::from_u128(1);

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Channel {
    pub id: Uuid,
    pub name: String,
    /// DM channels are private; everything created through the channel API is public.
    pub is_public: bool,
    pub is_archived: bool,
    pub created_at: DateTime<Utc>,
}

/// A message as the store returns it.
///
/// `pin` and `stamps` are only populated when the store was asked to preload
/// related rows; a lookup by ID always preloads.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: Uuid,
    pub user_id: Uuid,
    pub channel_id: Uuid,
    pub content: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
    pub pin: Option<Pin>,
    pub stamps: Vec<MessageStamp>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pin {
    pub message_id: Uuid,
    pub channel_id: Uuid,
    /// The user who pinned the message.
    pub user_id: Uuid,
    pub created_at: DateTime<Utc>,
}

/// One user's reactions with one stamp on one message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageStamp {
    pub message_id: Uuid,
    pub stamp_id: Uuid,
    pub user_id: Uuid,
    pub count: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelEventType {
    PinAdded,
    PinRemoved,
    ArchiveChanged,
}

impl ChannelEventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PinAdded => "pin_added",
            Self::PinRemoved => "pin_removed",
            Self::ArchiveChanged => "archive_changed",
        }
    }
}

impl fmt::Display for ChannelEventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownEventType(pub String);

impl fmt::Display for UnknownEventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown channel event type '{}'", self.0)
    }
}

impl std::error::Error for UnknownEventType {}

impl FromStr for ChannelEventType {
    type Err = UnknownEventType;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pin_added" => Ok(Self::PinAdded),
            "pin_removed" => Ok(Self::PinRemoved),
            "archive_changed" => Ok(Self::ArchiveChanged),
            other => Err(UnknownEventType(other.to_string())),
        }
    }
}

/// Free-form key/value payload attached to a channel event.
pub type ChannelEventDetail = serde_json::Map<String, serde_json::Value>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelEvent {
    pub channel_id: Uuid,
    pub event_type: ChannelEventType,
    pub detail: ChannelEventDetail,
    pub created_at: DateTime<Utc>,
}
