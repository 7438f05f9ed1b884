use rusqlite::{OptionalExtension, params};
use uuid::Uuid;

use agora_types::models::{Channel, ChannelEvent, ChannelEventType};

use crate::Database;
use crate::error::RepoError;
use crate::row::{micros, now, time_at, uuid_at};

impl Database {
    // -- Channels --

    pub fn list_channels(&self) -> Result<Vec<Channel>, RepoError> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, name, is_public, is_archived, created_at FROM channels ORDER BY created_at",
            )?;
            let rows = stmt
                .query_map([], channel_from_row)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    pub fn create_channel(&self, name: &str) -> Result<Channel, RepoError> {
        let channel = Channel {
            id: Uuid::new_v4(),
            name: name.to_string(),
            is_public: true,
            is_archived: false,
            created_at: now(),
        };
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO channels (id, name, is_public, is_archived, created_at)
                 VALUES (?1, ?2, 1, 0, ?3)",
                params![channel.id.to_string(), name, micros(channel.created_at)],
            )?;
            Ok(())
        })?;
        Ok(channel)
    }

    pub fn set_channel_archived(&self, id: Uuid, archived: bool) -> Result<(), RepoError> {
        self.with_conn(|conn| {
            let changed = conn.execute(
                "UPDATE channels SET is_archived = ?2 WHERE id = ?1 AND is_public = 1",
                params![id.to_string(), archived],
            )?;
            if changed == 0 {
                return Err(RepoError::NotFound);
            }
            Ok(())
        })
    }

    pub fn subscribe_channel(&self, user_id: Uuid, channel_id: Uuid) -> Result<(), RepoError> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT OR IGNORE INTO users_subscribe_channels (user_id, channel_id) VALUES (?1, ?2)",
                params![user_id.to_string(), channel_id.to_string()],
            )?;
            Ok(())
        })
    }

    // -- Direct messages --

    pub fn get_dm_channel_id(&self, a: Uuid, b: Uuid) -> Result<Option<Uuid>, RepoError> {
        let (user1, user2) = ordered_pair(a, b);
        self.with_conn(|conn| {
            let id = conn
                .query_row(
                    "SELECT channel_id FROM dm_channel_mappings WHERE user1 = ?1 AND user2 = ?2",
                    params![user1.to_string(), user2.to_string()],
                    |row| uuid_at(row, 0),
                )
                .optional()?;
            Ok(id)
        })
    }

    /// Every DM channel with its two members.
    pub fn list_dm_channels(&self) -> Result<Vec<(Uuid, Uuid, Uuid)>, RepoError> {
        self.with_conn(|conn| {
            let mut stmt =
                conn.prepare("SELECT channel_id, user1, user2 FROM dm_channel_mappings")?;
            let rows = stmt
                .query_map([], |row| Ok((uuid_at(row, 0)?, uuid_at(row, 1)?, uuid_at(row, 2)?)))?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// Create the private channel for a user pair. Fails with `AlreadyExists`
    /// if the pair already has one.
    pub fn create_dm_channel(&self, a: Uuid, b: Uuid) -> Result<Channel, RepoError> {
        let (user1, user2) = ordered_pair(a, b);
        let channel = Channel {
            id: Uuid::new_v4(),
            name: format!("dm-{}-{}", user1, user2),
            is_public: false,
            is_archived: false,
            created_at: now(),
        };

        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            tx.execute(
                "INSERT INTO channels (id, name, is_public, is_archived, created_at)
                 VALUES (?1, ?2, 0, 0, ?3)",
                params![channel.id.to_string(), channel.name, micros(channel.created_at)],
            )?;
            tx.execute(
                "INSERT INTO dm_channel_mappings (channel_id, user1, user2) VALUES (?1, ?2, ?3)",
                params![channel.id.to_string(), user1.to_string(), user2.to_string()],
            )?;
            tx.commit()?;
            Ok(())
        })?;

        Ok(channel)
    }

    // -- Channel events --

    /// Most recent events first.
    pub fn list_channel_events(
        &self,
        channel_id: Uuid,
        limit: u32,
    ) -> Result<Vec<ChannelEvent>, RepoError> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT channel_id, event_type, detail, created_at
                 FROM channel_events
                 WHERE channel_id = ?1
                 ORDER BY created_at DESC, id DESC
                 LIMIT ?2",
            )?;
            let rows = stmt
                .query_map(params![channel_id.to_string(), limit], |row| {
                    Ok((
                        uuid_at(row, 0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        time_at(row, 3)?,
                    ))
                })?
                .collect::<Result<Vec<_>, _>>()?;

            rows.into_iter()
                .map(|(channel_id, event_type, detail, created_at)| -> Result<_, RepoError> {
                    Ok(ChannelEvent {
                        channel_id,
                        event_type: event_type
                            .parse::<ChannelEventType>()
                            .map_err(anyhow::Error::from)?,
                        detail: serde_json::from_str(&detail)?,
                        created_at,
                    })
                })
                .collect()
        })
    }
}

fn ordered_pair(a: Uuid, b: Uuid) -> (Uuid, Uuid) {
    if a <= b { (a, b) } else { (b, a) }
}

fn channel_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Channel> {
    Ok(Channel {
        id: uuid_at(row, 0)?,
        name: row.get(1)?,
        is_public: row.get(2)?,
        is_archived: row.get(3)?,
        created_at: time_at(row, 4)?,
    })
}
