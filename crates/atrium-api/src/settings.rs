use std::collections::HashMap;

use axum::{Json, extract::State};
use serde_json::{Value, json};

use crate::auth::AppState;
use crate::error::{Result, blocking};

/// The slice of settings any client may read. Everything else stays
/// admin-only.
pub const PUBLIC_KEYS: &[&str] = &[
    "rules",
    "topicOfDay",
    "groupMessageExpiry",
    "privateMessageExpiry",
];

pub async fn public_settings(State(state): State<AppState>) -> Result<Json<Value>> {
    let db = state.db.clone();
    let settings: HashMap<String, String> = blocking(move || db.get_settings(PUBLIC_KEYS))
        .await?
        .into_iter()
        .collect();

    Ok(Json(json!({ "settings": settings })))
}
