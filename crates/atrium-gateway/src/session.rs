use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use thiserror::Error;
use tracing::{error, info};
use uuid::Uuid;

use atrium_db::Database;
use atrium_db::models::{NewMessage, parse_uuid};
use atrium_types::events::{ClientCommand, GatewayEvent};
use atrium_types::models::{ChatMessage, RoomType, UserProfile};

use crate::dispatcher::Dispatcher;
use crate::filter;
use crate::rooms;

/// Settings keys holding per-room-type message lifetime, in hours.
pub const GROUP_EXPIRY_KEY: &str = "groupMessageExpiry";
pub const PRIVATE_EXPIRY_KEY: &str = "privateMessageExpiry";

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("{0}")]
    Validation(String),
    #[error("{0}")]
    Blocked(String),
    #[error("{0}")]
    NotFound(String),
    #[error("message could not be sent")]
    Storage(#[from] anyhow::Error),
}

/// Command processor for one authenticated gateway connection.
///
/// A connection's read task handles commands one at a time, which is what
/// keeps a sender's messages in submission order.
pub struct Session {
    pub conn_id: Uuid,
    pub user: UserProfile,
    db: Arc<Database>,
    dispatcher: Dispatcher,
}

impl Session {
    pub fn new(conn_id: Uuid, user: UserProfile, db: Arc<Database>, dispatcher: Dispatcher) -> Self {
        Self {
            conn_id,
            user,
            db,
            dispatcher,
        }
    }

    /// Handle one client command. Failures are reported back to this
    /// connection only; storage errors additionally hit the log.
    pub async fn handle(&self, cmd: ClientCommand) {
        let result = match cmd {
            ClientCommand::Authenticate { .. } => {
                // Already authenticated — re-ack with the session identity.
                self.dispatcher
                    .send_to_conn(
                        self.conn_id,
                        GatewayEvent::Authenticated {
                            user: self.user.clone(),
                        },
                    )
                    .await;
                Ok(())
            }
            ClientCommand::JoinRoom { faculty } => self.join_room(&faculty).await,
            ClientCommand::LeaveRoom { faculty } => {
                self.leave_room(&faculty).await;
                Ok(())
            }
            ClientCommand::SendGroupMessage { faculty, content } => {
                self.send_group_message(&faculty, &content).await
            }
            ClientCommand::StartPrivateSession { peer_id } => {
                self.start_private_session(peer_id).await
            }
            ClientCommand::SendPrivateMessage {
                receiver_id,
                content,
            } => self.send_private_message(receiver_id, &content).await,
            ClientCommand::Typing { peer_id, is_typing } => {
                self.typing(peer_id, is_typing).await;
                Ok(())
            }
        };

        if let Err(err) = result {
            if let SessionError::Storage(source) = &err {
                error!(
                    "{} ({}) command failed: {:#}",
                    self.user.name, self.conn_id, source
                );
            }
            self.dispatcher
                .send_to_conn(
                    self.conn_id,
                    GatewayEvent::Error {
                        message: err.to_string(),
                    },
                )
                .await;
        }
    }

    async fn join_room(&self, faculty: &str) -> Result<(), SessionError> {
        if faculty.trim().is_empty() {
            return Err(SessionError::Validation("faculty name required".into()));
        }

        let room = rooms::faculty_room(faculty);
        if self.dispatcher.join_room(self.conn_id, &room).await {
            info!("{} joined faculty room {}", self.user.name, faculty);
            self.dispatcher
                .send_to_room_except(
                    &room,
                    self.conn_id,
                    GatewayEvent::MemberJoined {
                        faculty: faculty.to_string(),
                        user: self.user.clone(),
                    },
                )
                .await;
        }
        Ok(())
    }

    async fn leave_room(&self, faculty: &str) {
        self.dispatcher
            .leave_room(self.conn_id, &rooms::faculty_room(faculty))
            .await;
    }

    async fn send_group_message(&self, faculty: &str, content: &str) -> Result<(), SessionError> {
        if faculty.trim().is_empty() {
            return Err(SessionError::Validation("faculty name required".into()));
        }
        if content.trim().is_empty() {
            return Err(SessionError::Validation("message cannot be empty".into()));
        }

        let message = self
            .persist_message(RoomType::Faculty, Some(faculty), None, content, GROUP_EXPIRY_KEY)
            .await?;

        // Connections of users who block the sender are skipped; everyone
        // else receives the blocker list alongside the message.
        let db = self.db.clone();
        let sender_id = self.user.id.to_string();
        let blocked_by: Vec<Uuid> = blocking(move || db.blockers_of(&sender_id))
            .await?
            .iter()
            .map(|raw| parse_uuid(raw, "blocker id"))
            .collect();
        let excluded: HashSet<Uuid> = blocked_by.iter().copied().collect();

        self.dispatcher
            .send_to_room_excluding_users(
                &rooms::faculty_room(faculty),
                &excluded,
                GatewayEvent::NewGroupMessage {
                    message,
                    blocked_by,
                },
            )
            .await;
        Ok(())
    }

    async fn start_private_session(&self, peer_id: Uuid) -> Result<(), SessionError> {
        let db = self.db.clone();
        let (a, b) = (self.user.id.to_string(), peer_id.to_string());
        if blocking(move || db.is_blocked_either(&a, &b)).await? {
            return Err(SessionError::Blocked(
                "messaging with this user is not possible".into(),
            ));
        }

        let room = rooms::private_room(self.user.id, peer_id);
        self.dispatcher.join_room(self.conn_id, &room).await;
        self.dispatcher
            .send_to_conn(
                self.conn_id,
                GatewayEvent::PrivateSessionStarted { room_id: room, peer_id },
            )
            .await;
        Ok(())
    }

    async fn send_private_message(
        &self,
        receiver_id: Uuid,
        content: &str,
    ) -> Result<(), SessionError> {
        if content.trim().is_empty() {
            return Err(SessionError::Validation("message cannot be empty".into()));
        }

        let db = self.db.clone();
        let (a, b) = (self.user.id.to_string(), receiver_id.to_string());
        if blocking(move || db.is_blocked_either(&a, &b)).await? {
            return Err(SessionError::Blocked(
                "messaging with this user is not possible".into(),
            ));
        }

        let db = self.db.clone();
        let rid = receiver_id.to_string();
        let receiver = blocking(move || db.get_user_by_id(&rid))
            .await?
            .ok_or_else(|| SessionError::NotFound("unknown user".into()))?
            .profile();

        let message = self
            .persist_message(
                RoomType::Private,
                None,
                Some(&receiver),
                content,
                PRIVATE_EXPIRY_KEY,
            )
            .await?;

        let room = rooms::private_room(self.user.id, receiver_id);
        self.dispatcher
            .send_to_room(
                &room,
                GatewayEvent::NewPrivateMessage {
                    message: message.clone(),
                },
            )
            .await;

        // A receiver who is online but browsing elsewhere still hears about it.
        if !self.dispatcher.user_in_room(&room, receiver_id).await
            && self.dispatcher.is_online(receiver_id).await
        {
            self.dispatcher
                .send_to_user(
                    receiver_id,
                    GatewayEvent::Notification {
                        from: self.user.clone(),
                        message,
                    },
                )
                .await;
        }
        Ok(())
    }

    async fn typing(&self, peer_id: Uuid, is_typing: bool) {
        self.dispatcher
            .send_to_user(
                peer_id,
                GatewayEvent::UserTyping {
                    user_id: self.user.id,
                    is_typing,
                },
            )
            .await;
    }

    /// Filter, stamp, compute expiry from settings, and persist. Broadcast
    /// happens only after this returns, so readers never see a message that
    /// failed to store.
    async fn persist_message(
        &self,
        room_type: RoomType,
        room_id: Option<&str>,
        receiver: Option<&UserProfile>,
        content: &str,
        expiry_key: &'static str,
    ) -> Result<ChatMessage, SessionError> {
        let created_at = Utc::now();

        let db = self.db.clone();
        let words = blocking(move || db.list_filter_words()).await?;
        let filtered = filter::apply(content.trim(), &words);

        let db = self.db.clone();
        let setting = blocking(move || db.get_setting(expiry_key)).await?;
        let expires_at = expiry_from_setting(setting.as_deref(), created_at);

        let message = ChatMessage {
            id: Uuid::new_v4(),
            room_type,
            room_id: room_id.map(str::to_string),
            content: filtered,
            sender: self.user.clone(),
            receiver: receiver.cloned(),
            created_at,
            expires_at,
        };

        let row = NewMessage::from_message(&message);
        let db = self.db.clone();
        blocking(move || db.insert_message(&row)).await?;

        Ok(message)
    }
}

/// Expiry is `now + N hours` when the setting parses as a positive integer;
/// anything else (absent, zero, negative, junk) means the message is kept
/// forever.
pub fn expiry_from_setting(raw: Option<&str>, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
    let hours = raw?.trim().parse::<i64>().ok().filter(|h| *h > 0)?;
    let ttl = Duration::try_hours(hours)?;
    now.checked_add_signed(ttl)
}

async fn blocking<T, F>(f: F) -> Result<T, SessionError>
where
    F: FnOnce() -> anyhow::Result<T> + Send + 'static,
    T: Send + 'static,
{
    let joined = tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| SessionError::Storage(anyhow::anyhow!("blocking task failed: {e}")))?;
    joined.map_err(SessionError::Storage)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expiry_uses_positive_integer_hours() {
        let now = Utc::now();
        let expiry = expiry_from_setting(Some("24"), now).expect("24h expiry");
        assert_eq!(expiry, now + Duration::hours(24));
    }

    #[test]
    fn expiry_tolerates_surrounding_whitespace() {
        let now = Utc::now();
        assert!(expiry_from_setting(Some(" 1 "), now).is_some());
    }

    #[test]
    fn non_positive_or_junk_settings_mean_no_expiry() {
        let now = Utc::now();
        assert!(expiry_from_setting(None, now).is_none());
        assert!(expiry_from_setting(Some("0"), now).is_none());
        assert!(expiry_from_setting(Some("-3"), now).is_none());
        assert!(expiry_from_setting(Some("soon"), now).is_none());
        assert!(expiry_from_setting(Some(""), now).is_none());
        assert!(expiry_from_setting(Some("1.5"), now).is_none());
    }
}
