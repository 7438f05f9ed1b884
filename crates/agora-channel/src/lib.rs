//! In-memory view of the channel set, answering the questions the message
//! manager asks before every mutation.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use serde_json::json;
use tracing::{debug, info};
use uuid::Uuid;

use agora_db::{Database, MessageRepository, RepoError};
use agora_types::models::{Channel, ChannelEventDetail, ChannelEventType};

#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    #[error("channel not found")]
    NotFound,
    #[error("channel store failure")]
    Store(#[from] RepoError),
}

/// Channel facts consulted by the message manager.
///
/// Answers must reflect the live channel state: implementations must not
/// hand out a stale archived flag.
pub trait ChannelOracle: Send + Sync {
    fn is_public_channel(&self, id: Uuid) -> bool;

    fn is_archived_channel(&self, id: Uuid) -> bool;

    /// Find or create the private channel shared by two users.
    fn get_dm_channel(&self, a: Uuid, b: Uuid) -> Result<Uuid, ChannelError>;
}

pub struct ChannelTree {
    db: Arc<Database>,
    nodes: RwLock<HashMap<Uuid, Channel>>,
    /// DM channel to its two members.
    dm_members: RwLock<HashMap<Uuid, (Uuid, Uuid)>>,
}

impl ChannelTree {
    pub fn load(db: Arc<Database>) -> Result<Self, ChannelError> {
        let nodes: HashMap<Uuid, Channel> = db
            .list_channels()?
            .into_iter()
            .map(|c| (c.id, c))
            .collect();
        let dm_members: HashMap<Uuid, (Uuid, Uuid)> = db
            .list_dm_channels()?
            .into_iter()
            .map(|(channel, a, b)| (channel, (a, b)))
            .collect();

        info!("Loaded {} channels ({} DMs)", nodes.len(), dm_members.len());
        Ok(Self {
            db,
            nodes: RwLock::new(nodes),
            dm_members: RwLock::new(dm_members),
        })
    }

    pub fn channel(&self, id: Uuid) -> Option<Channel> {
        self.nodes.read().get(&id).cloned()
    }

    /// The two members of a DM channel; `None` for any other channel.
    pub fn dm_members(&self, channel_id: Uuid) -> Option<(Uuid, Uuid)> {
        self.dm_members.read().get(&channel_id).copied()
    }

    /// Whether `user_id` may read and write in `channel_id`. Public channels
    /// are open to everyone, DMs only to their members.
    pub fn can_access(&self, channel_id: Uuid, user_id: Uuid) -> bool {
        match self.dm_members(channel_id) {
            Some((a, b)) => user_id == a || user_id == b,
            None => self.is_public_channel(channel_id),
        }
    }

    /// Public channels, oldest first.
    pub fn public_channels(&self) -> Vec<Channel> {
        let mut channels: Vec<Channel> = self
            .nodes
            .read()
            .values()
            .filter(|c| c.is_public)
            .cloned()
            .collect();
        channels.sort_by_key(|c| c.created_at);
        channels
    }

    pub fn create_channel(&self, name: &str) -> Result<Channel, ChannelError> {
        let channel = self.db.create_channel(name)?;
        self.nodes.write().insert(channel.id, channel.clone());
        info!(channel_id = %channel.id, name, "Channel created");
        Ok(channel)
    }

    pub fn archive(&self, id: Uuid, user_id: Uuid) -> Result<(), ChannelError> {
        self.set_archived(id, user_id, true)
    }

    pub fn unarchive(&self, id: Uuid, user_id: Uuid) -> Result<(), ChannelError> {
        self.set_archived(id, user_id, false)
    }

    /// The node lock is held from the check until the node is updated, so
    /// concurrent toggles reach the store and the tree in the same order.
    fn set_archived(&self, id: Uuid, user_id: Uuid, archived: bool) -> Result<(), ChannelError> {
        let mut nodes = self.nodes.write();
        let node = match nodes.get_mut(&id) {
            Some(node) if node.is_public => node,
            _ => return Err(ChannelError::NotFound),
        };
        if node.is_archived == archived {
            return Ok(());
        }

        self.db.set_channel_archived(id, archived).map_err(|e| match e {
            RepoError::NotFound => ChannelError::NotFound,
            e => e.into(),
        })?;
        node.is_archived = archived;
        drop(nodes);

        let mut detail = ChannelEventDetail::new();
        detail.insert("userId".into(), json!(user_id));
        detail.insert("archived".into(), json!(archived));
        self.db.record_channel_event(
            id,
            ChannelEventType::ArchiveChanged,
            &detail,
            chrono::Utc::now(),
        )?;

        info!(channel_id = %id, %user_id, archived, "Channel archive state changed");
        Ok(())
    }

    pub fn subscribe(&self, user_id: Uuid, channel_id: Uuid) -> Result<(), ChannelError> {
        if self.channel(channel_id).is_none() {
            return Err(ChannelError::NotFound);
        }
        self.db.subscribe_channel(user_id, channel_id)?;
        Ok(())
    }
}

impl ChannelOracle for ChannelTree {
    fn is_public_channel(&self, id: Uuid) -> bool {
        self.nodes.read().get(&id).is_some_and(|c| c.is_public)
    }

    fn is_archived_channel(&self, id: Uuid) -> bool {
        self.nodes.read().get(&id).is_some_and(|c| c.is_archived)
    }

    fn get_dm_channel(&self, a: Uuid, b: Uuid) -> Result<Uuid, ChannelError> {
        if let Some(id) = self.db.get_dm_channel_id(a, b)? {
            self.dm_members.write().entry(id).or_insert((a, b));
            return Ok(id);
        }

        match self.db.create_dm_channel(a, b) {
            Ok(channel) => {
                let id = channel.id;
                self.dm_members.write().insert(id, (a, b));
                self.nodes.write().insert(id, channel);
                debug!(channel_id = %id, "DM channel created");
                Ok(id)
            }
            // Lost a race with a concurrent creator
            Err(RepoError::AlreadyExists) => {
                let id = self.db.get_dm_channel_id(a, b)?.ok_or(ChannelError::NotFound)?;
                self.dm_members.write().entry(id).or_insert((a, b));
                Ok(id)
            }
            Err(e) => Err(e.into()),
        }
    }
}
