use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Faculties students can register under. Each one backs a group chat room.
pub const FACULTIES: &[&str] = &[
    "Mathematics",
    "Computer Science",
    "Physics",
    "Chemistry",
    "Biology",
    "Geography",
    "Geology",
    "Philology",
    "History",
    "Economics",
    "Law",
    "Journalism",
    "Psychology",
];

/// Degree programmes accepted at registration.
pub const DEGREES: &[&str] = &["bachelor", "master", "doctorate"];

/// Public profile shape, denormalized onto messages and rosters.
/// Contact details (email, phone) are deliberately not part of it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: Uuid,
    pub name: String,
    pub faculty: String,
    pub degree: String,
    pub course: u8,
    pub profile_picture: Option<String>,
}

/// Which kind of room a stored message belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RoomType {
    Faculty,
    Private,
}

impl RoomType {
    pub fn as_str(self) -> &'static str {
        match self {
            RoomType::Faculty => "faculty",
            RoomType::Private => "private",
        }
    }
}

/// A chat message as clients see it.
///
/// Faculty messages carry the faculty name in `room_id` and no receiver.
/// Private messages carry a receiver and no `room_id`; the sender/receiver
/// pair identifies the conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: Uuid,
    pub room_type: RoomType,
    pub room_id: Option<String>,
    pub content: String,
    pub sender: UserProfile,
    pub receiver: Option<UserProfile>,
    pub created_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
}

/// Canonical key for a two-party conversation: both ids in sorted order,
/// so either participant derives the same key.
pub fn pair_key(a: Uuid, b: Uuid) -> String {
    let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
    format!("{lo}_{hi}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pair_key_is_order_independent() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        assert_eq!(pair_key(a, b), pair_key(b, a));
    }

    #[test]
    fn pair_key_distinguishes_pairs() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let c = Uuid::new_v4();
        assert_ne!(pair_key(a, b), pair_key(a, c));
    }

    #[test]
    fn pair_key_allows_self_pair() {
        let a = Uuid::new_v4();
        assert_eq!(pair_key(a, a), format!("{a}_{a}"));
    }
}
