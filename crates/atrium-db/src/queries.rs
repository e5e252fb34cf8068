use crate::Database;
use crate::models::{AdminRow, MessageRow, NewMessage, ProfileRow, UserRow};
use anyhow::Result;
use rusqlite::Connection;

impl Database {
    // -- Users --

    pub fn create_user(&self, user: &UserRow) -> Result<()> {
        self.with_conn_mut(|conn| {
            conn.execute(
                "INSERT INTO users (id, name, email, phone, password, faculty, degree, course, profile_picture, is_active, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
                rusqlite::params![
                    user.id,
                    user.name,
                    user.email,
                    user.phone,
                    user.password,
                    user.faculty,
                    user.degree,
                    user.course,
                    user.profile_picture,
                    user.is_active,
                    user.created_at,
                ],
            )?;
            Ok(())
        })
    }

    pub fn get_user_by_id(&self, id: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user(conn, "id", id))
    }

    pub fn get_user_by_email(&self, email: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user(conn, "email", email))
    }

    pub fn get_user_by_phone(&self, phone: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user(conn, "phone", phone))
    }

    /// Active members of one faculty, the requesting user excluded.
    pub fn list_faculty_users(&self, faculty: &str, exclude_id: &str) -> Result<Vec<UserRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, name, email, phone, password, faculty, degree, course, profile_picture, is_active, created_at
                 FROM users
                 WHERE faculty = ?1 AND is_active = 1 AND id != ?2
                 ORDER BY name ASC",
            )?;
            let rows = stmt
                .query_map([faculty, exclude_id], map_user)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// Returns false when no such user exists.
    pub fn set_user_active(&self, id: &str, active: bool) -> Result<bool> {
        self.with_conn_mut(|conn| {
            let changed = conn.execute(
                "UPDATE users SET is_active = ?1 WHERE id = ?2",
                rusqlite::params![active, id],
            )?;
            Ok(changed > 0)
        })
    }

    pub fn list_users_with_report_counts(&self) -> Result<Vec<(UserRow, i64)>> {
        self.with_conn(|conn| query_accounts(conn, None))
    }

    pub fn list_reported_users(&self, min_reports: i64) -> Result<Vec<(UserRow, i64)>> {
        self.with_conn(|conn| query_accounts(conn, Some(min_reports)))
    }

    // -- Admins --

    pub fn create_admin(&self, admin: &AdminRow) -> Result<()> {
        self.with_conn_mut(|conn| {
            conn.execute(
                "INSERT INTO admins (id, username, password, is_super, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                rusqlite::params![
                    admin.id,
                    admin.username,
                    admin.password,
                    admin.is_super,
                    admin.created_at,
                ],
            )?;
            Ok(())
        })
    }

    pub fn get_admin_by_id(&self, id: &str) -> Result<Option<AdminRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, username, password, is_super, created_at FROM admins WHERE id = ?1",
            )?;
            stmt.query_row([id], map_admin).optional()
        })
    }

    pub fn get_admin_by_username(&self, username: &str) -> Result<Option<AdminRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, username, password, is_super, created_at FROM admins WHERE username = ?1",
            )?;
            stmt.query_row([username], map_admin).optional()
        })
    }

    pub fn get_super_admin(&self) -> Result<Option<AdminRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, username, password, is_super, created_at FROM admins WHERE is_super = 1 LIMIT 1",
            )?;
            stmt.query_row([], map_admin).optional()
        })
    }

    pub fn list_sub_admins(&self) -> Result<Vec<AdminRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, username, password, is_super, created_at
                 FROM admins
                 WHERE is_super = 0
                 ORDER BY created_at DESC",
            )?;
            let rows = stmt
                .query_map([], map_admin)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// Returns false when no such admin exists.
    pub fn delete_admin(&self, id: &str) -> Result<bool> {
        self.with_conn_mut(|conn| {
            let changed = conn.execute("DELETE FROM admins WHERE id = ?1", [id])?;
            Ok(changed > 0)
        })
    }

    // -- Messages --

    pub fn insert_message(&self, msg: &NewMessage) -> Result<()> {
        self.with_conn_mut(|conn| {
            conn.execute(
                "INSERT INTO messages (id, room_type, room_id, content, sender_id, receiver_id, created_at, expires_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                rusqlite::params![
                    msg.id,
                    msg.room_type,
                    msg.room_id,
                    msg.content,
                    msg.sender_id,
                    msg.receiver_id,
                    msg.created_at,
                    msg.expires_at,
                ],
            )?;
            Ok(())
        })
    }

    /// Faculty room history, newest first. Messages from senders the
    /// requester has blocked are filtered out here rather than in the
    /// handler, so one query serves pagination and blocking both.
    pub fn get_faculty_messages(
        &self,
        faculty: &str,
        requester_id: &str,
        limit: u32,
        before: Option<&str>,
    ) -> Result<Vec<MessageRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT m.id, m.room_type, m.room_id, m.content, m.created_at, m.expires_at,
                        s.id, s.name, s.faculty, s.degree, s.course, s.profile_picture
                 FROM messages m
                 JOIN users s ON s.id = m.sender_id
                 WHERE m.room_type = 'faculty'
                   AND m.room_id = ?1
                   AND m.sender_id NOT IN (SELECT blocked_id FROM blocks WHERE blocker_id = ?2)
                   AND (?3 IS NULL OR m.created_at < ?3)
                 ORDER BY m.created_at DESC, m.rowid DESC
                 LIMIT ?4",
            )?;
            let rows = stmt
                .query_map(
                    rusqlite::params![faculty, requester_id, before, limit],
                    map_group_message,
                )?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// All messages between two users, in either direction, newest first.
    pub fn get_private_messages(
        &self,
        user_a: &str,
        user_b: &str,
        limit: u32,
        before: Option<&str>,
    ) -> Result<Vec<MessageRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT m.id, m.room_type, m.room_id, m.content, m.created_at, m.expires_at,
                        s.id, s.name, s.faculty, s.degree, s.course, s.profile_picture,
                        r.id, r.name, r.faculty, r.degree, r.course, r.profile_picture
                 FROM messages m
                 JOIN users s ON s.id = m.sender_id
                 JOIN users r ON r.id = m.receiver_id
                 WHERE m.room_type = 'private'
                   AND ((m.sender_id = ?1 AND m.receiver_id = ?2)
                     OR (m.sender_id = ?2 AND m.receiver_id = ?1))
                   AND (?3 IS NULL OR m.created_at < ?3)
                 ORDER BY m.created_at DESC, m.rowid DESC
                 LIMIT ?4",
            )?;
            let rows = stmt
                .query_map(
                    rusqlite::params![user_a, user_b, before, limit],
                    map_private_message,
                )?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// Every private message a user took part in, newest first. Feeds the
    /// conversation overview, which keeps the first row seen per peer.
    pub fn get_private_messages_involving(&self, user_id: &str) -> Result<Vec<MessageRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT m.id, m.room_type, m.room_id, m.content, m.created_at, m.expires_at,
                        s.id, s.name, s.faculty, s.degree, s.course, s.profile_picture,
                        r.id, r.name, r.faculty, r.degree, r.course, r.profile_picture
                 FROM messages m
                 JOIN users s ON s.id = m.sender_id
                 JOIN users r ON r.id = m.receiver_id
                 WHERE m.room_type = 'private'
                   AND (m.sender_id = ?1 OR m.receiver_id = ?1)
                 ORDER BY m.created_at DESC, m.rowid DESC",
            )?;
            let rows = stmt
                .query_map([user_id], map_private_message)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// Delete messages whose expiry is at or before `now`. Returns how many
    /// rows went away.
    pub fn delete_expired_messages(&self, now: &str) -> Result<usize> {
        self.with_conn_mut(|conn| {
            let deleted = conn.execute(
                "DELETE FROM messages WHERE expires_at IS NOT NULL AND expires_at <= ?1",
                [now],
            )?;
            Ok(deleted)
        })
    }

    // -- Blocks --

    pub fn block_exists(&self, blocker_id: &str, blocked_id: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let found: Option<i64> = conn
                .query_row(
                    "SELECT 1 FROM blocks WHERE blocker_id = ?1 AND blocked_id = ?2",
                    [blocker_id, blocked_id],
                    |row| row.get(0),
                )
                .optional()?;
            Ok(found.is_some())
        })
    }

    pub fn insert_block(&self, blocker_id: &str, blocked_id: &str, created_at: &str) -> Result<()> {
        self.with_conn_mut(|conn| {
            conn.execute(
                "INSERT INTO blocks (blocker_id, blocked_id, created_at) VALUES (?1, ?2, ?3)",
                [blocker_id, blocked_id, created_at],
            )?;
            Ok(())
        })
    }

    /// Idempotent: deleting a block that does not exist is a no-op.
    pub fn delete_block(&self, blocker_id: &str, blocked_id: &str) -> Result<()> {
        self.with_conn_mut(|conn| {
            conn.execute(
                "DELETE FROM blocks WHERE blocker_id = ?1 AND blocked_id = ?2",
                [blocker_id, blocked_id],
            )?;
            Ok(())
        })
    }

    /// True when either user blocks the other.
    pub fn is_blocked_either(&self, user_a: &str, user_b: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let found: Option<i64> = conn
                .query_row(
                    "SELECT 1 FROM blocks
                     WHERE (blocker_id = ?1 AND blocked_id = ?2)
                        OR (blocker_id = ?2 AND blocked_id = ?1)",
                    [user_a, user_b],
                    |row| row.get(0),
                )
                .optional()?;
            Ok(found.is_some())
        })
    }

    /// Ids of everyone who has blocked `user_id`.
    pub fn blockers_of(&self, user_id: &str) -> Result<Vec<String>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare("SELECT blocker_id FROM blocks WHERE blocked_id = ?1")?;
            let rows = stmt
                .query_map([user_id], |row| row.get(0))?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// Ids of everyone involved in a block with `user_id`, either direction.
    pub fn blocked_peers(&self, user_id: &str) -> Result<Vec<String>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT blocker_id, blocked_id FROM blocks
                 WHERE blocker_id = ?1 OR blocked_id = ?1",
            )?;
            let rows: Vec<(String, String)> = stmt
                .query_map([user_id], |row| Ok((row.get(0)?, row.get(1)?)))?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows
                .into_iter()
                .map(|(blocker, blocked)| if blocker == user_id { blocked } else { blocker })
                .collect())
        })
    }

    /// Users the given user has blocked, most recent block first.
    pub fn list_blocked_users(&self, blocker_id: &str) -> Result<Vec<UserRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT u.id, u.name, u.email, u.phone, u.password, u.faculty, u.degree, u.course, u.profile_picture, u.is_active, u.created_at
                 FROM blocks b
                 JOIN users u ON u.id = b.blocked_id
                 WHERE b.blocker_id = ?1
                 ORDER BY b.created_at DESC",
            )?;
            let rows = stmt
                .query_map([blocker_id], map_user)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    // -- Reports --

    pub fn insert_report(
        &self,
        id: &str,
        reporter_id: &str,
        reported_id: &str,
        reason: Option<&str>,
        created_at: &str,
    ) -> Result<()> {
        self.with_conn_mut(|conn| {
            conn.execute(
                "INSERT INTO reports (id, reporter_id, reported_id, reason, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                rusqlite::params![id, reporter_id, reported_id, reason, created_at],
            )?;
            Ok(())
        })
    }

    // -- Settings --

    pub fn get_setting(&self, key: &str) -> Result<Option<String>> {
        self.with_conn(|conn| {
            conn.query_row("SELECT value FROM settings WHERE key = ?1", [key], |row| {
                row.get(0)
            })
            .optional()
        })
    }

    /// Batch-fetch a fixed set of settings keys.
    pub fn get_settings(&self, keys: &[&str]) -> Result<Vec<(String, String)>> {
        if keys.is_empty() {
            return Ok(vec![]);
        }

        self.with_conn(|conn| {
            let placeholders: Vec<String> = (1..=keys.len()).map(|i| format!("?{}", i)).collect();
            let sql = format!(
                "SELECT key, value FROM settings WHERE key IN ({})",
                placeholders.join(", ")
            );

            let mut stmt = conn.prepare(&sql)?;
            let params: Vec<&dyn rusqlite::types::ToSql> = keys
                .iter()
                .map(|key| key as &dyn rusqlite::types::ToSql)
                .collect();

            let rows = stmt
                .query_map(params.as_slice(), |row| Ok((row.get(0)?, row.get(1)?)))?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    pub fn all_settings(&self) -> Result<Vec<(String, String)>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare("SELECT key, value FROM settings ORDER BY key")?;
            let rows = stmt
                .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// Last write wins.
    pub fn upsert_setting(&self, key: &str, value: &str) -> Result<()> {
        self.with_conn_mut(|conn| {
            conn.execute(
                "INSERT INTO settings (key, value) VALUES (?1, ?2)
                 ON CONFLICT(key) DO UPDATE SET value = excluded.value",
                [key, value],
            )?;
            Ok(())
        })
    }

    // -- Filter words --

    pub fn list_filter_words(&self) -> Result<Vec<String>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare("SELECT word FROM filter_words ORDER BY word")?;
            let rows = stmt
                .query_map([], |row| row.get(0))?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    pub fn filter_word_exists(&self, word: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let found: Option<i64> = conn
                .query_row("SELECT 1 FROM filter_words WHERE word = ?1", [word], |row| {
                    row.get(0)
                })
                .optional()?;
            Ok(found.is_some())
        })
    }

    pub fn insert_filter_word(&self, word: &str) -> Result<()> {
        self.with_conn_mut(|conn| {
            conn.execute("INSERT INTO filter_words (word) VALUES (?1)", [word])?;
            Ok(())
        })
    }

    /// Idempotent: removing an absent word is a no-op.
    pub fn delete_filter_word(&self, word: &str) -> Result<()> {
        self.with_conn_mut(|conn| {
            conn.execute("DELETE FROM filter_words WHERE word = ?1", [word])?;
            Ok(())
        })
    }

    // -- Stats --

    /// (total users, active users, total messages, total reports)
    pub fn dashboard_counts(&self) -> Result<(i64, i64, i64, i64)> {
        self.with_conn(|conn| {
            let users: i64 = conn.query_row("SELECT COUNT(*) FROM users", [], |row| row.get(0))?;
            let active: i64 = conn.query_row(
                "SELECT COUNT(*) FROM users WHERE is_active = 1",
                [],
                |row| row.get(0),
            )?;
            let messages: i64 =
                conn.query_row("SELECT COUNT(*) FROM messages", [], |row| row.get(0))?;
            let reports: i64 =
                conn.query_row("SELECT COUNT(*) FROM reports", [], |row| row.get(0))?;
            Ok((users, active, messages, reports))
        })
    }
}

fn query_user(conn: &Connection, column: &str, value: &str) -> Result<Option<UserRow>> {
    let sql = format!(
        "SELECT id, name, email, phone, password, faculty, degree, course, profile_picture, is_active, created_at
         FROM users WHERE {column} = ?1"
    );
    let mut stmt = conn.prepare(&sql)?;
    stmt.query_row([value], map_user).optional()
}

fn query_accounts(conn: &Connection, min_reports: Option<i64>) -> Result<Vec<(UserRow, i64)>> {
    let having = match min_reports {
        Some(_) => "HAVING COUNT(r.id) >= ?1",
        None => "",
    };
    let sql = format!(
        "SELECT u.id, u.name, u.email, u.phone, u.password, u.faculty, u.degree, u.course, u.profile_picture, u.is_active, u.created_at,
                COUNT(r.id) AS report_count
         FROM users u
         LEFT JOIN reports r ON r.reported_id = u.id
         GROUP BY u.id
         {having}
         ORDER BY report_count DESC, u.created_at DESC"
    );
    let mut stmt = conn.prepare(&sql)?;

    let map = |row: &rusqlite::Row<'_>| -> rusqlite::Result<(UserRow, i64)> {
        Ok((map_user(row)?, row.get(11)?))
    };
    let rows = match min_reports {
        Some(min) => stmt
            .query_map([min], map)?
            .collect::<std::result::Result<Vec<_>, _>>()?,
        None => stmt
            .query_map([], map)?
            .collect::<std::result::Result<Vec<_>, _>>()?,
    };
    Ok(rows)
}

fn map_user(row: &rusqlite::Row<'_>) -> rusqlite::Result<UserRow> {
    Ok(UserRow {
        id: row.get(0)?,
        name: row.get(1)?,
        email: row.get(2)?,
        phone: row.get(3)?,
        password: row.get(4)?,
        faculty: row.get(5)?,
        degree: row.get(6)?,
        course: row.get(7)?,
        profile_picture: row.get(8)?,
        is_active: row.get(9)?,
        created_at: row.get(10)?,
    })
}

fn map_admin(row: &rusqlite::Row<'_>) -> rusqlite::Result<AdminRow> {
    Ok(AdminRow {
        id: row.get(0)?,
        username: row.get(1)?,
        password: row.get(2)?,
        is_super: row.get(3)?,
        created_at: row.get(4)?,
    })
}

fn map_group_message(row: &rusqlite::Row<'_>) -> rusqlite::Result<MessageRow> {
    Ok(MessageRow {
        id: row.get(0)?,
        room_type: row.get(1)?,
        room_id: row.get(2)?,
        content: row.get(3)?,
        created_at: row.get(4)?,
        expires_at: row.get(5)?,
        sender: map_profile_at(row, 6)?,
        receiver: None,
    })
}

fn map_private_message(row: &rusqlite::Row<'_>) -> rusqlite::Result<MessageRow> {
    Ok(MessageRow {
        id: row.get(0)?,
        room_type: row.get(1)?,
        room_id: row.get(2)?,
        content: row.get(3)?,
        created_at: row.get(4)?,
        expires_at: row.get(5)?,
        sender: map_profile_at(row, 6)?,
        receiver: Some(map_profile_at(row, 12)?),
    })
}

fn map_profile_at(row: &rusqlite::Row<'_>, offset: usize) -> rusqlite::Result<ProfileRow> {
    Ok(ProfileRow {
        id: row.get(offset)?,
        name: row.get(offset + 1)?,
        faculty: row.get(offset + 2)?,
        degree: row.get(offset + 3)?,
        course: row.get(offset + 4)?,
        profile_picture: row.get(offset + 5)?,
    })
}

/// Extension trait for optional query results
trait OptionalExt<T> {
    fn optional(self) -> Result<Option<T>>;
}

impl<T> OptionalExt<T> for std::result::Result<T, rusqlite::Error> {
    fn optional(self) -> Result<Option<T>> {
        match self {
            Ok(val) => Ok(Some(val)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::fmt_ts;
    use chrono::{Duration, Utc};
    use std::path::Path;
    use uuid::Uuid;

    fn test_db() -> Database {
        Database::open(Path::new(":memory:")).expect("open in-memory database")
    }

    fn seed_user(db: &Database, name: &str, faculty: &str) -> String {
        let id = Uuid::new_v4().to_string();
        db.create_user(&UserRow {
            id: id.clone(),
            name: name.to_string(),
            email: format!("{name}@campus.edu"),
            phone: format!("+994{}", &id[..8]),
            password: "argon2-hash".to_string(),
            faculty: faculty.to_string(),
            degree: "bachelor".to_string(),
            course: 2,
            profile_picture: None,
            is_active: true,
            created_at: fmt_ts(Utc::now()),
        })
        .expect("seed user");
        id
    }

    fn group_message(
        db: &Database,
        sender: &str,
        faculty: &str,
        content: &str,
        at: chrono::DateTime<Utc>,
        expires: Option<chrono::DateTime<Utc>>,
    ) -> String {
        let id = Uuid::new_v4().to_string();
        db.insert_message(&NewMessage {
            id: id.clone(),
            room_type: "faculty".to_string(),
            room_id: Some(faculty.to_string()),
            content: content.to_string(),
            sender_id: sender.to_string(),
            receiver_id: None,
            created_at: fmt_ts(at),
            expires_at: expires.map(fmt_ts),
        })
        .expect("insert group message");
        id
    }

    fn private_message(
        db: &Database,
        sender: &str,
        receiver: &str,
        content: &str,
        at: chrono::DateTime<Utc>,
    ) {
        db.insert_message(&NewMessage {
            id: Uuid::new_v4().to_string(),
            room_type: "private".to_string(),
            room_id: None,
            content: content.to_string(),
            sender_id: sender.to_string(),
            receiver_id: Some(receiver.to_string()),
            created_at: fmt_ts(at),
            expires_at: None,
        })
        .expect("insert private message");
    }

    #[test]
    fn user_lookup_by_id_email_and_phone() {
        let db = test_db();
        let id = seed_user(&db, "aysel", "Physics");

        let by_id = db.get_user_by_id(&id).unwrap().expect("found by id");
        assert_eq!(by_id.name, "aysel");
        assert!(by_id.is_active);

        let by_email = db.get_user_by_email("aysel@campus.edu").unwrap();
        assert!(by_email.is_some());

        let by_phone = db.get_user_by_phone(&by_id.phone).unwrap();
        assert!(by_phone.is_some());

        assert!(db.get_user_by_id("no-such-id").unwrap().is_none());
    }

    #[test]
    fn faculty_roster_excludes_self_and_inactive() {
        let db = test_db();
        let aysel = seed_user(&db, "aysel", "Physics");
        let tural = seed_user(&db, "tural", "Physics");
        let rena = seed_user(&db, "rena", "Physics");
        seed_user(&db, "lala", "Law");

        db.set_user_active(&rena, false).unwrap();

        let roster = db.list_faculty_users("Physics", &aysel).unwrap();
        let names: Vec<&str> = roster.iter().map(|u| u.name.as_str()).collect();
        assert_eq!(names, vec!["tural"]);

        let roster_for_tural = db.list_faculty_users("Physics", &tural).unwrap();
        assert_eq!(roster_for_tural.len(), 1);
    }

    #[test]
    fn faculty_messages_newest_first_with_insertion_tiebreak() {
        let db = test_db();
        let sender = seed_user(&db, "aysel", "Physics");
        let reader = seed_user(&db, "tural", "Physics");
        let t = Utc::now();

        group_message(&db, &sender, "Physics", "first", t, None);
        group_message(&db, &sender, "Physics", "second", t, None);
        group_message(&db, &sender, "Physics", "third", t + Duration::seconds(1), None);

        let rows = db.get_faculty_messages("Physics", &reader, 50, None).unwrap();
        let contents: Vec<&str> = rows.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["third", "second", "first"]);
    }

    #[test]
    fn faculty_messages_hide_senders_the_requester_blocked() {
        let db = test_db();
        let aysel = seed_user(&db, "aysel", "Physics");
        let tural = seed_user(&db, "tural", "Physics");
        let rena = seed_user(&db, "rena", "Physics");
        let t = Utc::now();

        group_message(&db, &aysel, "Physics", "from aysel", t, None);
        group_message(&db, &tural, "Physics", "from tural", t + Duration::seconds(1), None);

        db.insert_block(&rena, &aysel, &fmt_ts(t)).unwrap();

        let rows = db.get_faculty_messages("Physics", &rena, 50, None).unwrap();
        let contents: Vec<&str> = rows.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["from tural"]);

        // The block is one-directional: aysel still sees everything.
        let rows = db.get_faculty_messages("Physics", &aysel, 50, None).unwrap();
        assert_eq!(rows.len(), 2);
    }

    #[test]
    fn faculty_messages_paginate_with_before_cursor() {
        let db = test_db();
        let sender = seed_user(&db, "aysel", "Physics");
        let t = Utc::now();

        group_message(&db, &sender, "Physics", "oldest", t - Duration::minutes(2), None);
        group_message(&db, &sender, "Physics", "middle", t - Duration::minutes(1), None);
        group_message(&db, &sender, "Physics", "newest", t, None);

        let first_page = db
            .get_faculty_messages("Physics", &sender, 2, None)
            .unwrap();
        assert_eq!(first_page.len(), 2);
        assert_eq!(first_page[0].content, "newest");

        let cursor = first_page.last().unwrap().created_at.clone();
        let second_page = db
            .get_faculty_messages("Physics", &sender, 2, Some(&cursor))
            .unwrap();
        let contents: Vec<&str> = second_page.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["oldest"]);
    }

    #[test]
    fn private_messages_cover_both_directions() {
        let db = test_db();
        let aysel = seed_user(&db, "aysel", "Physics");
        let tural = seed_user(&db, "tural", "Law");
        let rena = seed_user(&db, "rena", "Physics");
        let t = Utc::now();

        private_message(&db, &aysel, &tural, "hi tural", t);
        private_message(&db, &tural, &aysel, "hi aysel", t + Duration::seconds(1));
        private_message(&db, &aysel, &rena, "unrelated", t + Duration::seconds(2));

        let rows = db.get_private_messages(&aysel, &tural, 50, None).unwrap();
        let contents: Vec<&str> = rows.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["hi aysel", "hi tural"]);

        let receiver = rows[0].receiver.as_ref().expect("private rows carry a receiver");
        assert_eq!(receiver.name, "aysel");
    }

    #[test]
    fn private_messages_involving_feed_conversation_overview() {
        let db = test_db();
        let aysel = seed_user(&db, "aysel", "Physics");
        let tural = seed_user(&db, "tural", "Law");
        let rena = seed_user(&db, "rena", "Physics");
        let t = Utc::now();

        private_message(&db, &aysel, &tural, "older", t);
        private_message(&db, &rena, &aysel, "newer", t + Duration::seconds(1));
        private_message(&db, &tural, &rena, "not aysel's", t + Duration::seconds(2));

        let rows = db.get_private_messages_involving(&aysel).unwrap();
        let contents: Vec<&str> = rows.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["newer", "older"]);
    }

    #[test]
    fn block_round_trip_and_direction_queries() {
        let db = test_db();
        let aysel = seed_user(&db, "aysel", "Physics");
        let tural = seed_user(&db, "tural", "Law");
        let now = fmt_ts(Utc::now());

        assert!(!db.block_exists(&aysel, &tural).unwrap());
        db.insert_block(&aysel, &tural, &now).unwrap();

        assert!(db.block_exists(&aysel, &tural).unwrap());
        assert!(!db.block_exists(&tural, &aysel).unwrap());
        assert!(db.is_blocked_either(&aysel, &tural).unwrap());
        assert!(db.is_blocked_either(&tural, &aysel).unwrap());

        assert_eq!(db.blockers_of(&tural).unwrap(), vec![aysel.clone()]);
        assert!(db.blockers_of(&aysel).unwrap().is_empty());
        assert_eq!(db.blocked_peers(&aysel).unwrap(), vec![tural.clone()]);
        assert_eq!(db.blocked_peers(&tural).unwrap(), vec![aysel.clone()]);

        let listed = db.list_blocked_users(&aysel).unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].name, "tural");

        db.delete_block(&aysel, &tural).unwrap();
        assert!(!db.block_exists(&aysel, &tural).unwrap());
        // Deleting again is a no-op.
        db.delete_block(&aysel, &tural).unwrap();
    }

    #[test]
    fn expired_messages_are_swept() {
        let db = test_db();
        let sender = seed_user(&db, "aysel", "Physics");
        let now = Utc::now();

        group_message(&db, &sender, "Physics", "expired", now - Duration::hours(2), Some(now - Duration::hours(1)));
        group_message(&db, &sender, "Physics", "alive", now, Some(now + Duration::hours(1)));
        group_message(&db, &sender, "Physics", "kept", now, None);

        let deleted = db.delete_expired_messages(&fmt_ts(now)).unwrap();
        assert_eq!(deleted, 1);

        let remaining = db.get_faculty_messages("Physics", &sender, 50, None).unwrap();
        assert_eq!(remaining.len(), 2);
        assert!(remaining.iter().all(|m| m.content != "expired"));
    }

    #[test]
    fn settings_upsert_overwrites() {
        let db = test_db();
        assert!(db.get_setting("rules").unwrap().is_none());

        db.upsert_setting("rules", "be kind").unwrap();
        db.upsert_setting("rules", "be kinder").unwrap();
        assert_eq!(db.get_setting("rules").unwrap().as_deref(), Some("be kinder"));

        db.upsert_setting("topicOfDay", "exams").unwrap();
        let batch = db.get_settings(&["rules", "topicOfDay", "missing"]).unwrap();
        assert_eq!(batch.len(), 2);

        let all = db.all_settings().unwrap();
        assert_eq!(all.len(), 2);
    }

    #[test]
    fn filter_words_round_trip() {
        let db = test_db();
        assert!(db.list_filter_words().unwrap().is_empty());

        db.insert_filter_word("crab").unwrap();
        db.insert_filter_word("apple").unwrap();
        assert_eq!(db.list_filter_words().unwrap(), vec!["apple", "crab"]);
        assert!(db.filter_word_exists("crab").unwrap());

        db.delete_filter_word("crab").unwrap();
        assert!(!db.filter_word_exists("crab").unwrap());
        db.delete_filter_word("crab").unwrap();
    }

    #[test]
    fn report_counts_and_threshold() {
        let db = test_db();
        let aysel = seed_user(&db, "aysel", "Physics");
        let tural = seed_user(&db, "tural", "Law");
        let rena = seed_user(&db, "rena", "Physics");
        let now = fmt_ts(Utc::now());

        for reporter in [&tural, &rena] {
            db.insert_report(&Uuid::new_v4().to_string(), reporter, &aysel, Some("spam"), &now)
                .unwrap();
        }

        let all = db.list_users_with_report_counts().unwrap();
        assert_eq!(all.len(), 3);
        assert_eq!(all[0].0.name, "aysel");
        assert_eq!(all[0].1, 2);

        let flagged = db.list_reported_users(2).unwrap();
        assert_eq!(flagged.len(), 1);
        assert_eq!(flagged[0].0.name, "aysel");

        assert!(db.list_reported_users(3).unwrap().is_empty());
    }

    #[test]
    fn set_user_active_reports_missing_users() {
        let db = test_db();
        let id = seed_user(&db, "aysel", "Physics");

        assert!(db.set_user_active(&id, false).unwrap());
        assert!(!db.get_user_by_id(&id).unwrap().unwrap().is_active);
        assert!(!db.set_user_active("ghost", false).unwrap());
    }

    #[test]
    fn admin_lifecycle() {
        let db = test_db();
        assert!(db.get_super_admin().unwrap().is_none());

        let root = AdminRow {
            id: Uuid::new_v4().to_string(),
            username: "root".to_string(),
            password: "hash".to_string(),
            is_super: true,
            created_at: fmt_ts(Utc::now()),
        };
        db.create_admin(&root).unwrap();

        let sub = AdminRow {
            id: Uuid::new_v4().to_string(),
            username: "moderator".to_string(),
            password: "hash".to_string(),
            is_super: false,
            created_at: fmt_ts(Utc::now()),
        };
        db.create_admin(&sub).unwrap();

        assert!(db.get_super_admin().unwrap().expect("super exists").is_super);
        assert_eq!(db.list_sub_admins().unwrap().len(), 1);
        assert!(db.get_admin_by_username("moderator").unwrap().is_some());

        assert!(db.delete_admin(&sub.id).unwrap());
        assert!(!db.delete_admin(&sub.id).unwrap());
        assert!(db.list_sub_admins().unwrap().is_empty());
    }

    #[test]
    fn dashboard_counts_cover_all_tables() {
        let db = test_db();
        let aysel = seed_user(&db, "aysel", "Physics");
        let tural = seed_user(&db, "tural", "Law");
        db.set_user_active(&tural, false).unwrap();

        group_message(&db, &aysel, "Physics", "hello", Utc::now(), None);
        db.insert_report(
            &Uuid::new_v4().to_string(),
            &aysel,
            &tural,
            None,
            &fmt_ts(Utc::now()),
        )
        .unwrap();

        let (users, active, messages, reports) = db.dashboard_counts().unwrap();
        assert_eq!((users, active, messages, reports), (2, 1, 1, 1));
    }
}
