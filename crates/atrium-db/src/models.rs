//! Database row types — these map directly to SQLite rows.
//! Distinct from the atrium-types API models to keep the DB layer
//! independent. Conversions live here so the REST handlers and the
//! gateway share one (lossy, logged) parsing path.

use chrono::{DateTime, SecondsFormat, Utc};
use tracing::warn;
use uuid::Uuid;

use atrium_types::models::{ChatMessage, RoomType, UserProfile};

/// Canonical timestamp encoding: RFC 3339 UTC with microsecond precision.
/// Lexicographic order on these strings matches chronological order, which
/// message pagination and expiry comparisons rely on.
pub fn fmt_ts(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub fn parse_ts(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .ok()
}

/// Parse a stored id, logging instead of failing on corrupt rows.
pub fn parse_uuid(raw: &str, what: &str) -> Uuid {
    raw.parse().unwrap_or_else(|e| {
        warn!("Corrupt {} '{}' in database: {}", what, raw, e);
        Uuid::default()
    })
}

pub struct UserRow {
    pub id: String,
    pub name: String,
    pub email: String,
    pub phone: String,
    pub password: String,
    pub faculty: String,
    pub degree: String,
    pub course: u8,
    pub profile_picture: Option<String>,
    pub is_active: bool,
    pub created_at: String,
}

impl UserRow {
    pub fn profile(&self) -> UserProfile {
        UserProfile {
            id: parse_uuid(&self.id, "user id"),
            name: self.name.clone(),
            faculty: self.faculty.clone(),
            degree: self.degree.clone(),
            course: self.course,
            profile_picture: self.profile_picture.clone(),
        }
    }
}

#[derive(Clone)]
pub struct AdminRow {
    pub id: String,
    pub username: String,
    pub password: String,
    pub is_super: bool,
    pub created_at: String,
}

/// Profile columns joined onto a message row.
pub struct ProfileRow {
    pub id: String,
    pub name: String,
    pub faculty: String,
    pub degree: String,
    pub course: u8,
    pub profile_picture: Option<String>,
}

impl ProfileRow {
    pub fn into_profile(self) -> UserProfile {
        UserProfile {
            id: parse_uuid(&self.id, "user id"),
            name: self.name,
            faculty: self.faculty,
            degree: self.degree,
            course: self.course,
            profile_picture: self.profile_picture,
        }
    }
}

pub struct MessageRow {
    pub id: String,
    pub room_type: String,
    pub room_id: Option<String>,
    pub content: String,
    pub created_at: String,
    pub expires_at: Option<String>,
    pub sender: ProfileRow,
    pub receiver: Option<ProfileRow>,
}

impl MessageRow {
    pub fn into_message(self) -> ChatMessage {
        let room_type = match self.room_type.as_str() {
            "private" => RoomType::Private,
            "faculty" => RoomType::Faculty,
            other => {
                warn!("Unknown room_type '{}' on message '{}'", other, self.id);
                RoomType::Faculty
            }
        };
        let created_at = parse_ts(&self.created_at).unwrap_or_else(|| {
            warn!(
                "Corrupt created_at '{}' on message '{}'",
                self.created_at, self.id
            );
            DateTime::<Utc>::default()
        });
        ChatMessage {
            id: parse_uuid(&self.id, "message id"),
            room_type,
            room_id: self.room_id,
            content: self.content,
            sender: self.sender.into_profile(),
            receiver: self.receiver.map(ProfileRow::into_profile),
            created_at,
            expires_at: self.expires_at.as_deref().and_then(parse_ts),
        }
    }
}

/// Insert payload for a new message; owned so it can cross into a
/// blocking task.
pub struct NewMessage {
    pub id: String,
    pub room_type: String,
    pub room_id: Option<String>,
    pub content: String,
    pub sender_id: String,
    pub receiver_id: Option<String>,
    pub created_at: String,
    pub expires_at: Option<String>,
}

impl NewMessage {
    pub fn from_message(message: &ChatMessage) -> Self {
        Self {
            id: message.id.to_string(),
            room_type: message.room_type.as_str().to_string(),
            room_id: message.room_id.clone(),
            content: message.content.clone(),
            sender_id: message.sender.id.to_string(),
            receiver_id: message.receiver.as_ref().map(|r| r.id.to_string()),
            created_at: fmt_ts(message.created_at),
            expires_at: message.expires_at.map(fmt_ts),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn timestamp_format_orders_lexicographically() {
        let base = Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap();
        let earlier = fmt_ts(base);
        let later = fmt_ts(base + chrono::Duration::microseconds(1));
        assert!(earlier < later);
    }

    #[test]
    fn timestamp_round_trips() {
        let now = Utc::now();
        let parsed = parse_ts(&fmt_ts(now)).expect("formatted timestamp parses");
        assert_eq!(parsed.timestamp_micros(), now.timestamp_micros());
    }

    #[test]
    fn corrupt_room_type_falls_back_to_faculty() {
        let row = MessageRow {
            id: Uuid::new_v4().to_string(),
            room_type: "carrier-pigeon".into(),
            room_id: None,
            content: "hello".into(),
            created_at: fmt_ts(Utc::now()),
            expires_at: None,
            sender: ProfileRow {
                id: Uuid::new_v4().to_string(),
                name: "a".into(),
                faculty: "Physics".into(),
                degree: "bachelor".into(),
                course: 1,
                profile_picture: None,
            },
            receiver: None,
        };
        assert_eq!(row.into_message().room_type, RoomType::Faculty);
    }
}
