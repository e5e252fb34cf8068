use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{ChatMessage, UserProfile};

/// Commands sent from clients to the gateway.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum ClientCommand {
    /// Present a JWT; must be the first command on a new connection
    Authenticate { token: String },

    /// Join a faculty group room
    JoinRoom { faculty: String },

    /// Leave a faculty group room
    LeaveRoom { faculty: String },

    /// Post a message to a faculty room
    SendGroupMessage { faculty: String, content: String },

    /// Open the pairwise room shared with another user
    StartPrivateSession { peer_id: Uuid },

    /// Send a direct message to another user
    SendPrivateMessage { receiver_id: Uuid, content: String },

    /// Typing indicator for a private conversation
    Typing { peer_id: Uuid, is_typing: bool },
}

/// Events pushed from the gateway to clients.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum GatewayEvent {
    /// The connection is authenticated and registered for delivery
    Authenticated { user: UserProfile },

    /// Authentication failed; the server closes the socket after this
    AuthError { reason: String },

    /// A message was posted to a faculty room. `blocked_by` lists users who
    /// block the sender; their connections never receive this event.
    NewGroupMessage {
        message: ChatMessage,
        blocked_by: Vec<Uuid>,
    },

    /// A message in a private room this connection has joined
    NewPrivateMessage { message: ChatMessage },

    /// Acknowledges StartPrivateSession with the canonical room key
    PrivateSessionStarted { room_id: String, peer_id: Uuid },

    /// Another user joined a faculty room this connection is in
    MemberJoined { faculty: String, user: UserProfile },

    /// A private message arrived for a recipient who is online but has not
    /// opened the conversation
    Notification {
        from: UserProfile,
        message: ChatMessage,
    },

    /// Peer typing state for a private conversation
    UserTyping { user_id: Uuid, is_typing: bool },

    /// A command failed; reported only to the connection that issued it
    Error { message: String },
}
