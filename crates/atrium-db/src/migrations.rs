use anyhow::Result;
use rusqlite::Connection;
use tracing::info;

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS users (
            id              TEXT PRIMARY KEY,
            name            TEXT NOT NULL,
            email           TEXT NOT NULL UNIQUE,
            phone           TEXT NOT NULL UNIQUE,
            password        TEXT NOT NULL,
            faculty         TEXT NOT NULL,
            degree          TEXT NOT NULL,
            course          INTEGER NOT NULL,
            profile_picture TEXT,
            is_active       INTEGER NOT NULL DEFAULT 1,
            created_at      TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS admins (
            id          TEXT PRIMARY KEY,
            username    TEXT NOT NULL UNIQUE,
            password    TEXT NOT NULL,
            is_super    INTEGER NOT NULL DEFAULT 0,
            created_at  TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS messages (
            id          TEXT PRIMARY KEY,
            room_type   TEXT NOT NULL CHECK (room_type IN ('faculty', 'private')),
            room_id     TEXT,
            content     TEXT NOT NULL,
            sender_id   TEXT NOT NULL REFERENCES users(id),
            receiver_id TEXT REFERENCES users(id),
            created_at  TEXT NOT NULL,
            expires_at  TEXT
        );

        CREATE INDEX IF NOT EXISTS idx_messages_room
            ON messages(room_type, room_id, created_at);

        CREATE INDEX IF NOT EXISTS idx_messages_pair
            ON messages(sender_id, receiver_id, created_at);

        CREATE INDEX IF NOT EXISTS idx_messages_expiry
            ON messages(expires_at) WHERE expires_at IS NOT NULL;

        CREATE TABLE IF NOT EXISTS blocks (
            blocker_id  TEXT NOT NULL REFERENCES users(id),
            blocked_id  TEXT NOT NULL REFERENCES users(id),
            created_at  TEXT NOT NULL,
            PRIMARY KEY (blocker_id, blocked_id)
        );

        CREATE INDEX IF NOT EXISTS idx_blocks_blocked
            ON blocks(blocked_id);

        CREATE TABLE IF NOT EXISTS reports (
            id          TEXT PRIMARY KEY,
            reporter_id TEXT NOT NULL REFERENCES users(id),
            reported_id TEXT NOT NULL REFERENCES users(id),
            reason      TEXT,
            created_at  TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_reports_reported
            ON reports(reported_id);

        CREATE TABLE IF NOT EXISTS settings (
            key     TEXT PRIMARY KEY,
            value   TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS filter_words (
            word    TEXT PRIMARY KEY
        );
        ",
    )?;

    info!("Database migrations complete");
    Ok(())
}
