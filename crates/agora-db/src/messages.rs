use std::collections::HashMap;

use chrono::{DateTime, Utc};
use rusqlite::types::Value;
use rusqlite::{Connection, OptionalExtension, params, params_from_iter};
use uuid::Uuid;

use agora_types::models::{ChannelEventDetail, ChannelEventType, Message, MessageStamp, Pin};

use crate::Database;
use crate::error::RepoError;
use crate::repository::{MessageRepository, MessagesQuery};
use crate::row::{micros, now, opt_time_at, time_at, uuid_at};

const MESSAGE_COLUMNS: &str =
    "m.id, m.user_id, m.channel_id, m.content, m.created_at, m.updated_at, m.deleted_at";

impl MessageRepository for Database {
    fn get_message_by_id(&self, id: Uuid) -> Result<Message, RepoError> {
        self.with_conn(|conn| {
            let mut message = conn.query_row(
                &format!(
                    "SELECT {} FROM messages m WHERE m.id = ?1 AND m.deleted_at IS NULL",
                    MESSAGE_COLUMNS
                ),
                [id.to_string()],
                message_from_row,
            )?;
            preload(conn, std::slice::from_mut(&mut message))?;
            Ok(message)
        })
    }

    fn create_message(
        &self,
        user_id: Uuid,
        channel_id: Uuid,
        content: &str,
    ) -> Result<Message, RepoError> {
        let created_at = now();
        let message = Message {
            id: Uuid::new_v4(),
            user_id,
            channel_id,
            content: content.to_string(),
            created_at,
            updated_at: created_at,
            deleted_at: None,
            pin: None,
            stamps: vec![],
        };

        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO messages (id, user_id, channel_id, content, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?5)",
                params![
                    message.id.to_string(),
                    user_id.to_string(),
                    channel_id.to_string(),
                    content,
                    micros(message.created_at),
                ],
            )?;
            Ok(())
        })?;

        Ok(message)
    }

    fn update_message(&self, id: Uuid, content: &str) -> Result<(), RepoError> {
        self.with_conn(|conn| {
            let changed = conn.execute(
                "UPDATE messages SET content = ?2, updated_at = ?3
                 WHERE id = ?1 AND deleted_at IS NULL",
                params![id.to_string(), content, micros(now())],
            )?;
            if changed == 0 {
                return Err(RepoError::NotFound);
            }
            Ok(())
        })
    }

    fn delete_message(&self, id: Uuid) -> Result<(), RepoError> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            let changed = tx.execute(
                "UPDATE messages SET deleted_at = ?2 WHERE id = ?1 AND deleted_at IS NULL",
                params![id.to_string(), micros(now())],
            )?;
            if changed == 0 {
                return Err(RepoError::NotFound);
            }
            // A deleted message cannot stay pinned
            tx.execute("DELETE FROM pins WHERE message_id = ?1", [id.to_string()])?;
            tx.commit()?;
            Ok(())
        })
    }

    fn pin_message(&self, id: Uuid, user_id: Uuid) -> Result<Pin, RepoError> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            let channel_id = live_channel_of(&tx, id)?;

            let pin = Pin {
                message_id: id,
                channel_id,
                user_id,
                created_at: now(),
            };
            tx.execute(
                "INSERT INTO pins (message_id, user_id, created_at) VALUES (?1, ?2, ?3)",
                params![id.to_string(), user_id.to_string(), micros(pin.created_at)],
            )?;
            tx.commit()?;
            Ok(pin)
        })
    }

    fn unpin_message(&self, id: Uuid) -> Result<Pin, RepoError> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            let pin = query_pin(&tx, id)?.ok_or(RepoError::NotFound)?;
            tx.execute("DELETE FROM pins WHERE message_id = ?1", [id.to_string()])?;
            tx.commit()?;
            Ok(pin)
        })
    }

    fn add_stamp_to_message(
        &self,
        id: Uuid,
        stamp_id: Uuid,
        user_id: Uuid,
        n: u32,
    ) -> Result<MessageStamp, RepoError> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            live_channel_of(&tx, id)?;

            let stamp = tx.query_row(
                "INSERT INTO message_stamps (message_id, stamp_id, user_id, count, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?5)
                 ON CONFLICT(message_id, stamp_id, user_id)
                 DO UPDATE SET count = count + excluded.count, updated_at = excluded.updated_at
                 RETURNING message_id, stamp_id, user_id, count, created_at, updated_at",
                params![
                    id.to_string(),
                    stamp_id.to_string(),
                    user_id.to_string(),
                    n,
                    micros(now()),
                ],
                stamp_from_row,
            )?;
            tx.commit()?;
            Ok(stamp)
        })
    }

    fn remove_stamp_from_message(
        &self,
        id: Uuid,
        stamp_id: Uuid,
        user_id: Uuid,
    ) -> Result<(), RepoError> {
        self.with_conn(|conn| {
            conn.execute(
                "DELETE FROM message_stamps WHERE message_id = ?1 AND stamp_id = ?2 AND user_id = ?3",
                params![id.to_string(), stamp_id.to_string(), user_id.to_string()],
            )?;
            Ok(())
        })
    }

    fn get_messages(&self, query: &MessagesQuery) -> Result<(Vec<Message>, bool), RepoError> {
        self.with_conn(|conn| query_messages(conn, query))
    }

    fn record_channel_event(
        &self,
        channel_id: Uuid,
        event_type: ChannelEventType,
        detail: &ChannelEventDetail,
        at: DateTime<Utc>,
    ) -> Result<(), RepoError> {
        let detail = serde_json::to_string(detail)?;
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO channel_events (channel_id, event_type, detail, created_at)
                 VALUES (?1, ?2, ?3, ?4)",
                params![channel_id.to_string(), event_type.as_str(), detail, micros(at)],
            )?;
            Ok(())
        })
    }
}

fn query_messages(
    conn: &Connection,
    query: &MessagesQuery,
) -> Result<(Vec<Message>, bool), RepoError> {
    let mut sql = format!(
        "SELECT {} FROM messages m WHERE m.deleted_at IS NULL",
        MESSAGE_COLUMNS
    );
    let mut args: Vec<Value> = Vec::new();

    if let Some(user) = query.user {
        sql.push_str(" AND m.user_id = ?");
        args.push(Value::Text(user.to_string()));
    }
    if let Some(channel) = query.channel {
        sql.push_str(" AND m.channel_id = ?");
        args.push(Value::Text(channel.to_string()));
    }
    if let Some(subscriber) = query.channels_subscribed_by_user {
        sql.push_str(
            " AND m.channel_id IN (SELECT channel_id FROM users_subscribe_channels WHERE user_id = ?)",
        );
        args.push(Value::Text(subscriber.to_string()));
    }

    let (lower, upper) = if query.inclusive { (">=", "<=") } else { (">", "<") };
    if let Some(since) = query.since {
        sql.push_str(&format!(" AND m.created_at {} ?", lower));
        args.push(Value::Integer(micros(since)));
    }
    if let Some(until) = query.until {
        sql.push_str(&format!(" AND m.created_at {} ?", upper));
        args.push(Value::Integer(micros(until)));
    }
    if query.exclude_dms {
        sql.push_str(" AND m.channel_id NOT IN (SELECT channel_id FROM dm_channel_mappings)");
    }

    if query.asc {
        sql.push_str(" ORDER BY m.created_at ASC, m.rowid ASC");
    } else {
        sql.push_str(" ORDER BY m.created_at DESC, m.rowid DESC");
    }

    // Fetch one extra row to learn whether another page exists
    let offset = i64::try_from(query.offset).unwrap_or(i64::MAX);
    if query.limit > 0 {
        sql.push_str(" LIMIT ? OFFSET ?");
        let limit = i64::try_from(query.limit).unwrap_or(i64::MAX);
        args.push(Value::Integer(limit.saturating_add(1)));
        args.push(Value::Integer(offset));
    } else if query.offset > 0 {
        sql.push_str(" LIMIT -1 OFFSET ?");
        args.push(Value::Integer(offset));
    }

    let mut stmt = conn.prepare(&sql)?;
    let mut messages = stmt
        .query_map(params_from_iter(args), message_from_row)?
        .collect::<Result<Vec<_>, _>>()?;

    let more = query.limit > 0 && messages.len() > query.limit;
    if more {
        messages.truncate(query.limit);
    }

    if !query.disable_preload {
        preload(conn, &mut messages)?;
    }

    Ok((messages, more))
}

/// Channel of a message that exists and is not deleted.
fn live_channel_of(conn: &Connection, id: Uuid) -> Result<Uuid, RepoError> {
    let channel_id = conn.query_row(
        "SELECT channel_id FROM messages WHERE id = ?1 AND deleted_at IS NULL",
        [id.to_string()],
        |row| uuid_at(row, 0),
    )?;
    Ok(channel_id)
}

fn query_pin(conn: &Connection, id: Uuid) -> Result<Option<Pin>, RepoError> {
    let pin = conn
        .query_row(
            "SELECT p.message_id, m.channel_id, p.user_id, p.created_at
             FROM pins p
             JOIN messages m ON m.id = p.message_id
             WHERE p.message_id = ?1",
            [id.to_string()],
            pin_from_row,
        )
        .optional()?;
    Ok(pin)
}

/// Bound on the IDs bound into one `IN (...)` list, well under SQLite's
/// variable limit.
const PRELOAD_CHUNK: usize = 500;

/// Batch-load pins and stamps for a page of messages.
fn preload(conn: &Connection, messages: &mut [Message]) -> Result<(), RepoError> {
    let mut pins: HashMap<Uuid, Pin> = HashMap::new();
    let mut stamps: HashMap<Uuid, Vec<MessageStamp>> = HashMap::new();

    for chunk in messages.chunks(PRELOAD_CHUNK) {
        let ids: Vec<Value> = chunk.iter().map(|m| Value::Text(m.id.to_string())).collect();
        let placeholders = vec!["?"; ids.len()].join(", ");

        let mut stmt = conn.prepare(&format!(
            "SELECT p.message_id, m.channel_id, p.user_id, p.created_at
             FROM pins p
             JOIN messages m ON m.id = p.message_id
             WHERE p.message_id IN ({})",
            placeholders
        ))?;
        for pin in stmt.query_map(params_from_iter(ids.iter()), pin_from_row)? {
            let pin = pin?;
            pins.insert(pin.message_id, pin);
        }

        let mut stmt = conn.prepare(&format!(
            "SELECT message_id, stamp_id, user_id, count, created_at, updated_at
             FROM message_stamps
             WHERE message_id IN ({})
             ORDER BY created_at ASC",
            placeholders
        ))?;
        for stamp in stmt.query_map(params_from_iter(ids.iter()), stamp_from_row)? {
            let stamp = stamp?;
            stamps.entry(stamp.message_id).or_default().push(stamp);
        }
    }

    for message in messages.iter_mut() {
        message.pin = pins.remove(&message.id);
        message.stamps = stamps.remove(&message.id).unwrap_or_default();
    }
    Ok(())
}

fn message_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Message> {
    Ok(Message {
        id: uuid_at(row, 0)?,
        user_id: uuid_at(row, 1)?,
        channel_id: uuid_at(row, 2)?,
        content: row.get(3)?,
        created_at: time_at(row, 4)?,
        updated_at: time_at(row, 5)?,
        deleted_at: opt_time_at(row, 6)?,
        pin: None,
        stamps: vec![],
    })
}

fn pin_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Pin> {
    Ok(Pin {
        message_id: uuid_at(row, 0)?,
        channel_id: uuid_at(row, 1)?,
        user_id: uuid_at(row, 2)?,
        created_at: time_at(row, 3)?,
    })
}

fn stamp_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<MessageStamp> {
    Ok(MessageStamp {
        message_id: uuid_at(row, 0)?,
        stamp_id: uuid_at(row, 1)?,
        user_id: uuid_at(row, 2)?,
        count: row.get(3)?,
        created_at: time_at(row, 4)?,
        updated_at: time_at(row, 5)?,
    })
}
