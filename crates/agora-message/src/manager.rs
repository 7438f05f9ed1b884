use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use chrono::Utc;
use serde_json::json;
use tokio::runtime::Handle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use uuid::Uuid;

use agora_channel::ChannelOracle;
use agora_db::{MessageRepository, MessagesQuery};
use agora_types::models::{ChannelEventDetail, ChannelEventType, MessageStamp, Pin};

use crate::audit::AuditLog;
use crate::cache::Cache;
use crate::error::{MessageError, Result};
use crate::message::CachedMessage;
use crate::timeline::{Timeline, TimelineQuery};

#[derive(Debug, Clone)]
pub struct ManagerConfig {
    /// Maximum number of cached messages. Cache operations cost O(log capacity).
    pub cache_capacity: usize,
    /// How long a cached message is served before it is reloaded.
    pub cache_ttl: Duration,
    /// Maximum number of channel event writes in flight.
    pub audit_concurrency: usize,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            cache_capacity: 200,
            cache_ttl: Duration::from_secs(60),
            audit_concurrency: 16,
        }
    }
}

pub type MessageCache = Cache<Uuid, Arc<CachedMessage>, MessageError>;

/// Front door for reading and mutating messages.
///
/// Every mutation checks the channel's archive state, writes the store, and
/// only then touches the cache. Cheap to clone.
#[derive(Clone)]
pub struct MessageManager {
    inner: Arc<ManagerInner>,
}

struct ManagerInner {
    repo: Arc<dyn MessageRepository>,
    channels: Arc<dyn ChannelOracle>,
    cache: MessageCache,
    cache_ttl: Duration,
    audit: AuditLog,
}

impl MessageManager {
    /// Must be called from within a tokio runtime; channel events are
    /// written on it.
    pub fn new(
        repo: Arc<dyn MessageRepository>,
        channels: Arc<dyn ChannelOracle>,
        config: ManagerConfig,
    ) -> anyhow::Result<Self> {
        let runtime =
            Handle::try_current().context("message manager requires a tokio runtime")?;

        let loader_repo = repo.clone();
        let ttl = config.cache_ttl;
        let cache: MessageCache = Cache::new(config.cache_capacity, move |id: &Uuid| {
            let message = loader_repo
                .get_message_by_id(*id)
                .map_err(|e| MessageError::from_repo("get message by id", e))?;
            Ok((Arc::new(CachedMessage::from(message)), ttl))
        });

        info!(
            cache_capacity = config.cache_capacity,
            cache_ttl_secs = ttl.as_secs(),
            "Message manager ready"
        );

        Ok(Self {
            inner: Arc::new(ManagerInner {
                audit: AuditLog::new(repo.clone(), config.audit_concurrency, runtime),
                repo,
                channels,
                cache,
                cache_ttl: ttl,
            }),
        })
    }

    // -- Reads --

    pub fn get(&self, id: Uuid) -> Result<Arc<CachedMessage>> {
        if id.is_nil() {
            return Err(MessageError::NotFound);
        }
        self.inner.cache.get(&id)
    }

    /// Run a query against the store. Timelines never read from the cache.
    pub fn get_timeline(&self, query: TimelineQuery) -> Result<Timeline> {
        let q = MessagesQuery::from(&query);
        let (records, more) = self
            .inner
            .repo
            .get_messages(&q)
            .map_err(|e| MessageError::store("get messages", e))?;

        Ok(Timeline::new(
            query,
            records,
            more,
            !q.disable_preload,
            Utc::now(),
            self.clone(),
        ))
    }

    // -- Creation --

    pub fn create(
        &self,
        channel_id: Uuid,
        user_id: Uuid,
        content: &str,
    ) -> Result<Arc<CachedMessage>> {
        self.ensure_writable(channel_id)?;
        self.create_in(channel_id, user_id, content)
    }

    /// Post into the DM channel between `from` and `to`, creating it if needed.
    /// DM channels are never archived, so no archive check applies.
    pub fn create_dm(&self, from: Uuid, to: Uuid, content: &str) -> Result<Arc<CachedMessage>> {
        let channel_id = self
            .inner
            .channels
            .get_dm_channel(from, to)
            .map_err(|e| MessageError::from_channel("get DM channel", e))?;
        self.create_in(channel_id, from, content)
    }

    fn create_in(
        &self,
        channel_id: Uuid,
        user_id: Uuid,
        content: &str,
    ) -> Result<Arc<CachedMessage>> {
        let message = self
            .inner
            .repo
            .create_message(user_id, channel_id, content)
            .map_err(|e| MessageError::store("create message", e))?;

        let cached = Arc::new(CachedMessage::from(message));
        self.inner
            .cache
            .set_with_expire(cached.id(), cached.clone(), self.inner.cache_ttl);

        debug!(message_id = %cached.id(), %channel_id, %user_id, "Message created");
        Ok(cached)
    }

    // -- Content mutations --

    pub fn edit(&self, id: Uuid, content: &str) -> Result<()> {
        let message = self.get(id)?;
        self.ensure_writable(message.channel_id())?;

        self.inner
            .repo
            .update_message(id, content)
            .map_err(|e| MessageError::from_repo("update message", e))?;
        self.inner.cache.remove(&id);

        debug!(message_id = %id, "Message edited");
        Ok(())
    }

    pub fn delete(&self, id: Uuid) -> Result<()> {
        let message = self.get(id)?;
        self.ensure_writable(message.channel_id())?;

        self.inner
            .repo
            .delete_message(id)
            .map_err(|e| MessageError::from_repo("delete message", e))?;
        self.inner.cache.remove(&id);

        debug!(message_id = %id, "Message deleted");
        Ok(())
    }

    // -- Pins --

    pub fn pin(&self, id: Uuid, user_id: Uuid) -> Result<Pin> {
        let message = self.get(id)?;
        if message.is_pinned() {
            return Err(MessageError::AlreadyExists);
        }
        self.ensure_writable(message.channel_id())?;

        let pin = self
            .inner
            .repo
            .pin_message(id, user_id)
            .map_err(|e| MessageError::from_repo("pin message", e))?;
        self.inner.cache.remove(&id);

        self.inner.audit.record(
            pin.channel_id,
            ChannelEventType::PinAdded,
            pin_detail(user_id, pin.message_id),
            pin.created_at,
        );
        debug!(message_id = %id, %user_id, "Message pinned");
        Ok(pin)
    }

    pub fn unpin(&self, id: Uuid, user_id: Uuid) -> Result<()> {
        let message = self.get(id)?;
        if !message.is_pinned() {
            return Err(MessageError::NotFound);
        }
        self.ensure_writable(message.channel_id())?;

        let pin = self
            .inner
            .repo
            .unpin_message(id)
            .map_err(|e| MessageError::from_repo("unpin message", e))?;
        self.inner.cache.remove(&id);

        self.inner.audit.record(
            pin.channel_id,
            ChannelEventType::PinRemoved,
            pin_detail(user_id, pin.message_id),
            Utc::now(),
        );
        debug!(message_id = %id, %user_id, "Message unpinned");
        Ok(())
    }

    // -- Stamps --

    /// Add `n` reactions with a stamp. The cached message is patched in
    /// place instead of evicted, so the next read needs no store round-trip.
    pub fn add_stamps(
        &self,
        id: Uuid,
        stamp_id: Uuid,
        user_id: Uuid,
        n: u32,
    ) -> Result<MessageStamp> {
        let message = self.inner.cache.get(&id)?;
        self.ensure_writable(message.channel_id())?;

        let stamp = self
            .inner
            .repo
            .add_stamp_to_message(id, stamp_id, user_id, n)
            .map_err(|e| MessageError::from_repo("add stamp to message", e))?;
        message.update_stamp(&stamp);

        Ok(stamp)
    }

    pub fn remove_stamps(&self, id: Uuid, stamp_id: Uuid, user_id: Uuid) -> Result<()> {
        let message = self.inner.cache.get(&id)?;
        self.ensure_writable(message.channel_id())?;

        self.inner
            .repo
            .remove_stamp_from_message(id, stamp_id, user_id)
            .map_err(|e| MessageError::from_repo("remove stamp from message", e))?;
        message.remove_stamp(stamp_id, user_id);

        Ok(())
    }

    // -- Shutdown --

    /// Wait for every queued channel event write to finish, or until
    /// `cancel` fires, whichever comes first.
    pub async fn drain(&self, cancel: &CancellationToken) -> Result<()> {
        self.inner.audit.drain(cancel).await
    }

    /// Channel event writes queued or running.
    pub fn pending_audit_writes(&self) -> usize {
        self.inner.audit.pending()
    }

    pub fn cache(&self) -> &MessageCache {
        &self.inner.cache
    }

    /// Queried live on every call; archive state is never cached here.
    fn ensure_writable(&self, channel_id: Uuid) -> Result<()> {
        let channels = &self.inner.channels;
        if channels.is_public_channel(channel_id) && channels.is_archived_channel(channel_id) {
            debug!(%channel_id, "Rejected write to archived channel");
            return Err(MessageError::ChannelArchived);
        }
        Ok(())
    }
}

fn pin_detail(user_id: Uuid, message_id: Uuid) -> ChannelEventDetail {
    let mut detail = ChannelEventDetail::new();
    detail.insert("userId".into(), json!(user_id));
    detail.insert("messageId".into(), json!(message_id));
    detail
}
