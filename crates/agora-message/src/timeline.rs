use std::sync::Arc;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use agora_db::MessagesQuery;
use agora_types::models::Message;

use crate::error::{MessageError, Result};
use crate::manager::MessageManager;
use crate::message::CachedMessage;

/// Parameters for [`MessageManager::get_timeline`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TimelineQuery {
    pub user: Option<Uuid>,
    pub channel: Option<Uuid>,
    pub channels_subscribed_by_user: Option<Uuid>,
    pub since: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
    pub inclusive: bool,
    /// Zero means no limit.
    pub limit: usize,
    pub offset: usize,
    pub asc: bool,
    pub exclude_dms: bool,
    /// Skip loading pins and stamps with the page; records are then
    /// resolved one by one through the cache.
    pub disable_preload: bool,
}

impl From<&TimelineQuery> for MessagesQuery {
    fn from(q: &TimelineQuery) -> Self {
        Self {
            user: q.user,
            channel: q.channel,
            channels_subscribed_by_user: q.channels_subscribed_by_user,
            since: q.since,
            until: q.until,
            inclusive: q.inclusive,
            limit: q.limit,
            offset: q.offset,
            asc: q.asc,
            exclude_dms: q.exclude_dms,
            disable_preload: q.disable_preload,
        }
    }
}

/// One page of a message query, as the store returned it at `retrieved_at`.
pub struct Timeline {
    query: TimelineQuery,
    records: Vec<Message>,
    more: bool,
    preloaded: bool,
    retrieved_at: DateTime<Utc>,
    manager: MessageManager,
}

impl Timeline {
    pub(crate) fn new(
        query: TimelineQuery,
        records: Vec<Message>,
        more: bool,
        preloaded: bool,
        retrieved_at: DateTime<Utc>,
        manager: MessageManager,
    ) -> Self {
        Self {
            query,
            records,
            more,
            preloaded,
            retrieved_at,
            manager,
        }
    }

    pub fn query(&self) -> &TimelineQuery {
        &self.query
    }

    /// Messages in query order.
    ///
    /// Preloaded rows are wrapped as they are. Otherwise each row is
    /// re-resolved through the manager's cache, and rows deleted since the
    /// query ran are skipped.
    pub fn records(&self) -> Result<Vec<Arc<CachedMessage>>> {
        if self.preloaded {
            return Ok(self
                .records
                .iter()
                .cloned()
                .map(|m| Arc::new(CachedMessage::from(m)))
                .collect());
        }

        let mut resolved = Vec::with_capacity(self.records.len());
        for record in &self.records {
            match self.manager.get(record.id) {
                Ok(m) => resolved.push(m),
                Err(MessageError::NotFound) => continue,
                Err(e) => return Err(e),
            }
        }
        Ok(resolved)
    }

    /// The rows exactly as the store returned them.
    pub fn raw(&self) -> &[Message] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn has_more(&self) -> bool {
        self.more
    }

    pub fn preloaded(&self) -> bool {
        self.preloaded
    }

    pub fn retrieved_at(&self) -> DateTime<Utc> {
        self.retrieved_at
    }
}
