//! In-memory collaborators for manager tests.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use uuid::Uuid;

use agora_channel::{ChannelError, ChannelOracle};
use agora_db::{MessageRepository, MessagesQuery, RepoError};
use agora_types::models::{
    ChannelEvent, ChannelEventDetail, ChannelEventType, Message, MessageStamp, Pin,
};

#[derive(Default)]
pub(crate) struct MemoryRepository {
    /// Insertion sequence breaks ties between equal timestamps.
    messages: Mutex<HashMap<Uuid, (u64, Message)>>,
    next_seq: Mutex<u64>,
    events: Mutex<Vec<ChannelEvent>>,
    calls: Mutex<HashMap<&'static str, usize>>,
    event_delay: Option<Duration>,
    fail_reads: AtomicBool,
    fail_writes: AtomicBool,
    fail_events: AtomicBool,
}

impl MemoryRepository {
    pub(crate) fn with_event_delay(delay: Duration) -> Self {
        Self {
            event_delay: Some(delay),
            ..Default::default()
        }
    }

    pub(crate) fn calls(&self, op: &str) -> usize {
        self.calls.lock().get(op).copied().unwrap_or(0)
    }

    pub(crate) fn events(&self) -> Vec<ChannelEvent> {
        self.events.lock().clone()
    }

    pub(crate) fn fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    pub(crate) fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    pub(crate) fn fail_events(&self, fail: bool) {
        self.fail_events.store(fail, Ordering::SeqCst);
    }

    fn hit(&self, op: &'static str) {
        *self.calls.lock().entry(op).or_default() += 1;
    }

    fn check(flag: &AtomicBool) -> Result<(), RepoError> {
        if flag.load(Ordering::SeqCst) {
            return Err(RepoError::Other(anyhow::anyhow!("injected failure")));
        }
        Ok(())
    }

    fn with_live<T>(
        &self,
        id: Uuid,
        f: impl FnOnce(&mut Message) -> Result<T, RepoError>,
    ) -> Result<T, RepoError> {
        Self::check(&self.fail_writes)?;
        let mut messages = self.messages.lock();
        match messages.get_mut(&id) {
            Some((_, m)) if m.deleted_at.is_none() => f(m),
            _ => Err(RepoError::NotFound),
        }
    }
}

impl MessageRepository for MemoryRepository {
    fn get_message_by_id(&self, id: Uuid) -> Result<Message, RepoError> {
        self.hit("get_message_by_id");
        Self::check(&self.fail_reads)?;
        match self.messages.lock().get(&id) {
            Some((_, m)) if m.deleted_at.is_none() => Ok(m.clone()),
            _ => Err(RepoError::NotFound),
        }
    }

    fn create_message(
        &self,
        user_id: Uuid,
        channel_id: Uuid,
        content: &str,
    ) -> Result<Message, RepoError> {
        self.hit("create_message");
        Self::check(&self.fail_writes)?;
        let now = Utc::now();
        let message = Message {
            id: Uuid::new_v4(),
            user_id,
            channel_id,
            content: content.to_string(),
            created_at: now,
            updated_at: now,
            deleted_at: None,
            pin: None,
            stamps: vec![],
        };
        let seq = {
            let mut next = self.next_seq.lock();
            *next += 1;
            *next
        };
        self.messages
            .lock()
            .insert(message.id, (seq, message.clone()));
        Ok(message)
    }

    fn update_message(&self, id: Uuid, content: &str) -> Result<(), RepoError> {
        self.hit("update_message");
        self.with_live(id, |m| {
            m.content = content.to_string();
            m.updated_at = Utc::now();
            Ok(())
        })
    }

    fn delete_message(&self, id: Uuid) -> Result<(), RepoError> {
        self.hit("delete_message");
        self.with_live(id, |m| {
            m.deleted_at = Some(Utc::now());
            m.pin = None;
            Ok(())
        })
    }

    fn pin_message(&self, id: Uuid, user_id: Uuid) -> Result<Pin, RepoError> {
        self.hit("pin_message");
        self.with_live(id, |m| {
            if m.pin.is_some() {
                return Err(RepoError::AlreadyExists);
            }
            let pin = Pin {
                message_id: id,
                channel_id: m.channel_id,
                user_id,
                created_at: Utc::now(),
            };
            m.pin = Some(pin.clone());
            Ok(pin)
        })
    }

    fn unpin_message(&self, id: Uuid) -> Result<Pin, RepoError> {
        self.hit("unpin_message");
        self.with_live(id, |m| m.pin.take().ok_or(RepoError::NotFound))
    }

    fn add_stamp_to_message(
        &self,
        id: Uuid,
        stamp_id: Uuid,
        user_id: Uuid,
        n: u32,
    ) -> Result<MessageStamp, RepoError> {
        self.hit("add_stamp_to_message");
        self.with_live(id, |m| {
            let now = Utc::now();
            if let Some(s) = m
                .stamps
                .iter_mut()
                .find(|s| s.stamp_id == stamp_id && s.user_id == user_id)
            {
                s.count += n;
                s.updated_at = now;
                return Ok(s.clone());
            }
            let stamp = MessageStamp {
                message_id: id,
                stamp_id,
                user_id,
                count: n,
                created_at: now,
                updated_at: now,
            };
            m.stamps.push(stamp.clone());
            Ok(stamp)
        })
    }

    fn remove_stamp_from_message(
        &self,
        id: Uuid,
        stamp_id: Uuid,
        user_id: Uuid,
    ) -> Result<(), RepoError> {
        self.hit("remove_stamp_from_message");
        self.with_live(id, |m| {
            m.stamps
                .retain(|s| !(s.stamp_id == stamp_id && s.user_id == user_id));
            Ok(())
        })
    }

    fn get_messages(&self, query: &MessagesQuery) -> Result<(Vec<Message>, bool), RepoError> {
        self.hit("get_messages");
        Self::check(&self.fail_reads)?;

        let in_range = |t: DateTime<Utc>| {
            let after = query
                .since
                .is_none_or(|s| if query.inclusive { t >= s } else { t > s });
            let before = query
                .until
                .is_none_or(|u| if query.inclusive { t <= u } else { t < u });
            after && before
        };

        let mut rows: Vec<(u64, Message)> = self
            .messages
            .lock()
            .values()
            .filter(|(_, m)| m.deleted_at.is_none())
            .filter(|(_, m)| query.user.is_none_or(|u| m.user_id == u))
            .filter(|(_, m)| query.channel.is_none_or(|c| m.channel_id == c))
            .filter(|(_, m)| in_range(m.created_at))
            .cloned()
            .collect();
        rows.sort_by_key(|(seq, m)| (m.created_at, *seq));
        if !query.asc {
            rows.reverse();
        }

        let mut page: Vec<Message> = rows
            .into_iter()
            .skip(query.offset)
            .map(|(_, mut m)| {
                if query.disable_preload {
                    m.pin = None;
                    m.stamps.clear();
                }
                m
            })
            .collect();
        let more = query.limit > 0 && page.len() > query.limit;
        if query.limit > 0 {
            page.truncate(query.limit);
        }
        Ok((page, more))
    }

    fn record_channel_event(
        &self,
        channel_id: Uuid,
        event_type: ChannelEventType,
        detail: &ChannelEventDetail,
        at: DateTime<Utc>,
    ) -> Result<(), RepoError> {
        self.hit("record_channel_event");
        if let Some(delay) = self.event_delay {
            std::thread::sleep(delay);
        }
        Self::check(&self.fail_events)?;
        self.events.lock().push(ChannelEvent {
            channel_id,
            event_type,
            detail: detail.clone(),
            created_at: at,
        });
        Ok(())
    }
}

#[derive(Default)]
pub(crate) struct TestChannels {
    public: Mutex<HashSet<Uuid>>,
    archived: Mutex<HashSet<Uuid>>,
    dms: Mutex<HashMap<(Uuid, Uuid), Uuid>>,
}

impl TestChannels {
    pub(crate) fn add_public(&self, id: Uuid) {
        self.public.lock().insert(id);
    }

    pub(crate) fn archive(&self, id: Uuid) {
        self.archived.lock().insert(id);
    }

    pub(crate) fn unarchive(&self, id: Uuid) {
        self.archived.lock().remove(&id);
    }
}

impl ChannelOracle for TestChannels {
    fn is_public_channel(&self, id: Uuid) -> bool {
        self.public.lock().contains(&id)
    }

    fn is_archived_channel(&self, id: Uuid) -> bool {
        self.archived.lock().contains(&id)
    }

    fn get_dm_channel(&self, a: Uuid, b: Uuid) -> Result<Uuid, ChannelError> {
        let key = if a <= b { (a, b) } else { (b, a) };
        Ok(*self.dms.lock().entry(key).or_insert_with(Uuid::new_v4))
    }
}
