use chrono::{DateTime, Utc};
use uuid::Uuid;

use agora_types::models::{ChannelEventDetail, ChannelEventType, Message, MessageStamp, Pin};

use crate::error::RepoError;

/// Filters and paging for a message listing. All filters are AND-combined.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MessagesQuery {
    /// Only messages posted by this user.
    pub user: Option<Uuid>,
    /// Only messages in this channel.
    pub channel: Option<Uuid>,
    /// Only messages in channels this user subscribes to.
    pub channels_subscribed_by_user: Option<Uuid>,
    pub since: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
    /// Make `since` and `until` inclusive bounds.
    pub inclusive: bool,
    /// Zero means no limit.
    pub limit: usize,
    pub offset: usize,
    /// Oldest first instead of newest first.
    pub asc: bool,
    pub exclude_dms: bool,
    /// Skip loading pins and stamps for the returned rows.
    pub disable_preload: bool,
}

/// Durable message storage. This is the system of record the message
/// manager caches in front of.
pub trait MessageRepository: Send + Sync {
    fn get_message_by_id(&self, id: Uuid) -> Result<Message, RepoError>;

    fn create_message(
        &self,
        user_id: Uuid,
        channel_id: Uuid,
        content: &str,
    ) -> Result<Message, RepoError>;

    fn update_message(&self, id: Uuid, content: &str) -> Result<(), RepoError>;

    fn delete_message(&self, id: Uuid) -> Result<(), RepoError>;

    fn pin_message(&self, id: Uuid, user_id: Uuid) -> Result<Pin, RepoError>;

    fn unpin_message(&self, id: Uuid) -> Result<Pin, RepoError>;

    /// Adds `n` to the user's count for the stamp and returns the stored row.
    fn add_stamp_to_message(
        &self,
        id: Uuid,
        stamp_id: Uuid,
        user_id: Uuid,
        n: u32,
    ) -> Result<MessageStamp, RepoError>;

    fn remove_stamp_from_message(
        &self,
        id: Uuid,
        stamp_id: Uuid,
        user_id: Uuid,
    ) -> Result<(), RepoError>;

    /// Returns one page of messages and whether more rows exist past it.
    fn get_messages(&self, query: &MessagesQuery) -> Result<(Vec<Message>, bool), RepoError>;

    fn record_channel_event(
        &self,
        channel_id: Uuid,
        event_type: ChannelEventType,
        detail: &ChannelEventDetail,
        at: DateTime<Utc>,
    ) -> Result<(), RepoError>;
}
