use anyhow::Result;
use rusqlite::Connection;
use tracing::info;

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS channels (
            id          TEXT PRIMARY KEY,
            name        TEXT NOT NULL,
            is_public   INTEGER NOT NULL DEFAULT 1,
            is_archived INTEGER NOT NULL DEFAULT 0,
            created_at  INTEGER NOT NULL
        );

        CREATE TABLE IF NOT EXISTS dm_channel_mappings (
            channel_id  TEXT PRIMARY KEY REFERENCES channels(id),
            user1       TEXT NOT NULL,
            user2       TEXT NOT NULL,
            UNIQUE(user1, user2)
        );

        CREATE TABLE IF NOT EXISTS users_subscribe_channels (
            user_id     TEXT NOT NULL,
            channel_id  TEXT NOT NULL REFERENCES channels(id),
            PRIMARY KEY(user_id, channel_id)
        );

        CREATE TABLE IF NOT EXISTS messages (
            id          TEXT PRIMARY KEY,
            user_id     TEXT NOT NULL,
            channel_id  TEXT NOT NULL REFERENCES channels(id),
            content     TEXT NOT NULL,
            created_at  INTEGER NOT NULL,
            updated_at  INTEGER NOT NULL,
            deleted_at  INTEGER
        );

        CREATE INDEX IF NOT EXISTS idx_messages_channel
            ON messages(channel_id, created_at);

        CREATE INDEX IF NOT EXISTS idx_messages_user
            ON messages(user_id, created_at);

        CREATE TABLE IF NOT EXISTS pins (
            message_id  TEXT PRIMARY KEY REFERENCES messages(id),
            user_id     TEXT NOT NULL,
            created_at  INTEGER NOT NULL
        );

        CREATE TABLE IF NOT EXISTS message_stamps (
            message_id  TEXT NOT NULL REFERENCES messages(id),
            stamp_id    TEXT NOT NULL,
            user_id     TEXT NOT NULL,
            count       INTEGER NOT NULL,
            created_at  INTEGER NOT NULL,
            updated_at  INTEGER NOT NULL,
            PRIMARY KEY(message_id, stamp_id, user_id)
        );

        CREATE TABLE IF NOT EXISTS channel_events (
            id          INTEGER PRIMARY KEY AUTOINCREMENT,
            channel_id  TEXT NOT NULL,
            event_type  TEXT NOT NULL,
            detail      TEXT NOT NULL,
            created_at  INTEGER NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_channel_events_channel
            ON channel_events(channel_id, created_at);

        -- Seed the default general channel
        INSERT OR IGNORE INTO channels (id, name, is_public, is_archived, created_at)
            VALUES ('00000000-0000-0000-0000-000000000001', 'general', 1, 0, 0);
        ",
    )?;

    info!("Database migrations complete");
    Ok(())
}
