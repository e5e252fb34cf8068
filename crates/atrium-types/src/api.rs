use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::UserProfile;

/// User JWT claims. Shared by the REST middleware and the gateway
/// handshake so the two sides can never drift apart.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,
    pub name: String,
    pub exp: usize,
}

/// Admin JWT claims. `is_super` gates admin-account management.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdminClaims {
    pub sub: Uuid,
    pub username: String,
    pub is_super: bool,
    pub exp: usize,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RegisterRequest {
    pub name: String,
    pub email: String,
    pub phone: String,
    pub password: String,
    pub faculty: String,
    pub degree: String,
    pub course: u8,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct AuthResponse {
    pub user: UserProfile,
    pub token: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AdminLoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct AdminSummary {
    pub id: Uuid,
    pub username: String,
    pub is_super: bool,
}

#[derive(Debug, Serialize)]
pub struct AdminAuthResponse {
    pub admin: AdminSummary,
    pub token: String,
}

/// A user's own profile, contact details included.
#[derive(Debug, Serialize)]
pub struct OwnProfile {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub phone: String,
    pub faculty: String,
    pub degree: String,
    pub course: u8,
    pub profile_picture: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BlockRequest {
    pub user_id: Uuid,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ReportRequest {
    pub user_id: Uuid,
    pub reason: Option<String>,
}

/// One entry of the private-conversation overview: the peer plus the most
/// recent message exchanged with them.
#[derive(Debug, Serialize)]
pub struct Conversation {
    pub peer: UserProfile,
    pub last_message: crate::models::ChatMessage,
}

/// Admin view of an account, report tally included.
#[derive(Debug, Serialize)]
pub struct UserAccount {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub phone: String,
    pub faculty: String,
    pub degree: String,
    pub course: u8,
    pub profile_picture: Option<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub report_count: i64,
}

#[derive(Debug, Serialize)]
pub struct DashboardStats {
    pub total_users: i64,
    pub active_users: i64,
    pub total_messages: i64,
    pub total_reports: i64,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StatusRequest {
    pub is_active: bool,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SettingRequest {
    pub key: String,
    pub value: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FilterWordRequest {
    pub word: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreateAdminRequest {
    pub username: String,
    pub password: String,
}
