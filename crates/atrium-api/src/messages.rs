use std::collections::HashSet;

use axum::{
    Extension, Json,
    extract::{Path, Query, State},
};
use serde::Deserialize;
use uuid::Uuid;

use atrium_db::models::{fmt_ts, parse_ts};
use atrium_types::api::{Claims, Conversation};
use atrium_types::models::ChatMessage;

use crate::auth::AppState;
use crate::error::{ApiError, Result, blocking};

#[derive(Debug, Deserialize)]
pub struct MessageQuery {
    #[serde(default = "default_limit")]
    pub limit: u32,
    /// Cursor for older pages: the `created_at` of the oldest message the
    /// client already has.
    pub before: Option<String>,
}

fn default_limit() -> u32 {
    50
}

/// Faculty room history, oldest first, capped at 200 rows per page.
/// Senders the requester has blocked are absent.
pub async fn faculty_messages(
    State(state): State<AppState>,
    Path(faculty): Path<String>,
    Query(query): Query<MessageQuery>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<Vec<ChatMessage>>> {
    let limit = query.limit.min(200);
    let before = normalize_before(query.before)?;

    let db = state.db.clone();
    let requester = claims.sub.to_string();
    let mut rows = blocking(move || {
        db.get_faculty_messages(&faculty, &requester, limit, before.as_deref())
    })
    .await?;

    rows.reverse();
    let messages: Vec<ChatMessage> = rows.into_iter().map(|row| row.into_message()).collect();
    Ok(Json(messages))
}

/// History with one peer, oldest first. Refused outright while a block in
/// either direction stands.
pub async fn private_messages(
    State(state): State<AppState>,
    Path(peer_id): Path<Uuid>,
    Query(query): Query<MessageQuery>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<Vec<ChatMessage>>> {
    let db = state.db.clone();
    let me = claims.sub.to_string();
    let peer = peer_id.to_string();
    if blocking(move || db.is_blocked_either(&me, &peer)).await? {
        return Err(ApiError::Blocked(
            "messaging with this user is not possible".into(),
        ));
    }

    let limit = query.limit.min(200);
    let before = normalize_before(query.before)?;

    let db = state.db.clone();
    let me = claims.sub.to_string();
    let peer = peer_id.to_string();
    let mut rows =
        blocking(move || db.get_private_messages(&me, &peer, limit, before.as_deref())).await?;

    rows.reverse();
    let messages: Vec<ChatMessage> = rows.into_iter().map(|row| row.into_message()).collect();
    Ok(Json(messages))
}

/// One entry per peer the requester has exchanged private messages with,
/// most recent conversation first. Blocked peers are dropped entirely.
pub async fn conversations(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<Vec<Conversation>>> {
    let db = state.db.clone();
    let me = claims.sub.to_string();
    let rows = blocking(move || db.get_private_messages_involving(&me)).await?;

    let db = state.db.clone();
    let me = claims.sub.to_string();
    let blocked: HashSet<String> = blocking(move || db.blocked_peers(&me))
        .await?
        .into_iter()
        .collect();

    let mut seen: HashSet<Uuid> = HashSet::new();
    let mut overview = Vec::new();
    for row in rows {
        let message = row.into_message();
        let peer = if message.sender.id == claims.sub {
            match &message.receiver {
                Some(receiver) => receiver.clone(),
                None => continue,
            }
        } else {
            message.sender.clone()
        };

        if blocked.contains(&peer.id.to_string()) || !seen.insert(peer.id) {
            continue;
        }
        overview.push(Conversation {
            peer,
            last_message: message,
        });
    }

    Ok(Json(overview))
}

/// Cursors are round-tripped through the canonical timestamp format so a
/// client cannot smuggle arbitrary text into the comparison.
fn normalize_before(raw: Option<String>) -> Result<Option<String>> {
    match raw {
        None => Ok(None),
        Some(value) => {
            let parsed = parse_ts(&value).ok_or_else(|| {
                ApiError::Validation("before must be an RFC 3339 timestamp".to_string())
            })?;
            Ok(Some(fmt_ts(parsed)))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn before_cursor_is_canonicalized() {
        let normalized = normalize_before(Some("2026-03-01T10:00:00+04:00".into()))
            .expect("valid cursor")
            .expect("some");
        assert_eq!(normalized, "2026-03-01T06:00:00.000000Z");

        assert!(normalize_before(Some("yesterday".into())).is_err());
        assert!(normalize_before(None).expect("ok").is_none());
    }
}
