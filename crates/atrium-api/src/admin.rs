use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
};
use chrono::Utc;
use serde_json::{Value, json};
use tracing::info;
use uuid::Uuid;

use atrium_db::models::{AdminRow, UserRow, fmt_ts, parse_ts, parse_uuid};
use atrium_types::api::{
    AdminClaims, AdminSummary, CreateAdminRequest, DashboardStats, FilterWordRequest,
    SettingRequest, StatusRequest, UserAccount,
};

use crate::auth::AppState;
use crate::error::{ApiError, Result, blocking};

/// Accounts at or past this many reports surface for moderation review.
pub const REPORT_FLAG_THRESHOLD: i64 = 16;

pub async fn dashboard_stats(State(state): State<AppState>) -> Result<Json<DashboardStats>> {
    let db = state.db.clone();
    let (total_users, active_users, total_messages, total_reports) =
        blocking(move || db.dashboard_counts()).await?;

    Ok(Json(DashboardStats {
        total_users,
        active_users,
        total_messages,
        total_reports,
    }))
}

pub async fn list_users(State(state): State<AppState>) -> Result<Json<Vec<UserAccount>>> {
    let db = state.db.clone();
    let rows = blocking(move || db.list_users_with_report_counts()).await?;

    let accounts = rows
        .into_iter()
        .map(|(row, report_count)| account_view(row, report_count))
        .collect();
    Ok(Json(accounts))
}

pub async fn reported_users(State(state): State<AppState>) -> Result<Json<Vec<UserAccount>>> {
    let db = state.db.clone();
    let rows = blocking(move || db.list_reported_users(REPORT_FLAG_THRESHOLD)).await?;

    let accounts = rows
        .into_iter()
        .map(|(row, report_count)| account_view(row, report_count))
        .collect();
    Ok(Json(accounts))
}

/// Toggle an account. Deactivation also drops every live gateway
/// connection the user holds, so the ban takes effect immediately.
pub async fn set_user_status(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
    Extension(claims): Extension<AdminClaims>,
    Json(req): Json<StatusRequest>,
) -> Result<Json<Value>> {
    let db = state.db.clone();
    let id = user_id.to_string();
    let found = blocking(move || db.set_user_active(&id, req.is_active)).await?;
    if !found {
        return Err(ApiError::NotFound("user not found".into()));
    }

    if req.is_active {
        info!("admin {} reactivated user {}", claims.username, user_id);
        return Ok(Json(json!({ "message": "account activated" })));
    }

    let kicked = state
        .dispatcher
        .kick_user(user_id, "account is deactivated")
        .await;
    info!(
        "admin {} deactivated user {} ({} connection(s) dropped)",
        claims.username, user_id, kicked
    );
    Ok(Json(json!({ "message": "account deactivated" })))
}

pub async fn all_settings(State(state): State<AppState>) -> Result<Json<Value>> {
    let db = state.db.clone();
    let settings: std::collections::HashMap<String, String> =
        blocking(move || db.all_settings()).await?.into_iter().collect();

    Ok(Json(json!({ "settings": settings })))
}

pub async fn update_setting(
    State(state): State<AppState>,
    Extension(claims): Extension<AdminClaims>,
    Json(req): Json<SettingRequest>,
) -> Result<Json<Value>> {
    let key = req.key.trim().to_string();
    if key.is_empty() {
        return Err(ApiError::Validation("setting key cannot be empty".into()));
    }

    let db = state.db.clone();
    let stored_key = key.clone();
    blocking(move || db.upsert_setting(&stored_key, &req.value)).await?;

    info!("admin {} updated setting {}", claims.username, key);
    Ok(Json(json!({ "message": "setting saved" })))
}

pub async fn filter_words(State(state): State<AppState>) -> Result<Json<Value>> {
    let db = state.db.clone();
    let words = blocking(move || db.list_filter_words()).await?;
    Ok(Json(json!({ "words": words })))
}

/// Words are stored lowercase; matching is case-insensitive anyway, and a
/// single spelling keeps the list readable.
pub async fn add_filter_word(
    State(state): State<AppState>,
    Json(req): Json<FilterWordRequest>,
) -> Result<(StatusCode, Json<Value>)> {
    let word = req.word.trim().to_lowercase();
    if word.is_empty() {
        return Err(ApiError::Validation("word cannot be empty".into()));
    }

    let db = state.db.clone();
    let probe = word.clone();
    if blocking(move || db.filter_word_exists(&probe)).await? {
        return Err(ApiError::Duplicate("this word is already filtered".into()));
    }

    let db = state.db.clone();
    let stored = word.clone();
    blocking(move || db.insert_filter_word(&stored)).await?;

    Ok((StatusCode::CREATED, Json(json!({ "word": word }))))
}

pub async fn remove_filter_word(
    State(state): State<AppState>,
    Path(word): Path<String>,
) -> Result<Json<Value>> {
    let word = word.trim().to_lowercase();

    let db = state.db.clone();
    blocking(move || db.delete_filter_word(&word)).await?;

    Ok(Json(json!({ "message": "word removed" })))
}

pub async fn list_admins(State(state): State<AppState>) -> Result<Json<Value>> {
    let db = state.db.clone();
    let rows = blocking(move || db.list_sub_admins()).await?;

    let admins: Vec<AdminSummary> = rows
        .iter()
        .map(|row| AdminSummary {
            id: parse_uuid(&row.id, "admin id"),
            username: row.username.clone(),
            is_super: row.is_super,
        })
        .collect();
    Ok(Json(json!({ "admins": admins })))
}

pub async fn create_admin_account(
    State(state): State<AppState>,
    Json(req): Json<CreateAdminRequest>,
) -> Result<(StatusCode, Json<AdminSummary>)> {
    let username = req.username.trim().to_string();
    if username.is_empty() {
        return Err(ApiError::Validation("username cannot be empty".into()));
    }
    if req.password.len() < 8 {
        return Err(ApiError::Validation(
            "password must be at least 8 characters".into(),
        ));
    }

    let db = state.db.clone();
    let probe = username.clone();
    if blocking(move || db.get_admin_by_username(&probe)).await?.is_some() {
        return Err(ApiError::Duplicate("this username is already taken".into()));
    }

    let row = AdminRow {
        id: Uuid::new_v4().to_string(),
        username,
        password: crate::auth::hash_password(&req.password)?,
        is_super: false,
        created_at: fmt_ts(Utc::now()),
    };
    let summary = AdminSummary {
        id: parse_uuid(&row.id, "admin id"),
        username: row.username.clone(),
        is_super: false,
    };

    let db = state.db.clone();
    blocking(move || db.create_admin(&row)).await?;

    Ok((StatusCode::CREATED, Json(summary)))
}

pub async fn delete_admin_account(
    State(state): State<AppState>,
    Path(admin_id): Path<Uuid>,
) -> Result<Json<Value>> {
    let db = state.db.clone();
    let id = admin_id.to_string();
    let row = blocking(move || db.get_admin_by_id(&id))
        .await?
        .ok_or_else(|| ApiError::NotFound("admin not found".to_string()))?;

    if row.is_super {
        return Err(ApiError::Forbidden("the super admin cannot be deleted".into()));
    }

    let db = state.db.clone();
    let id = admin_id.to_string();
    blocking(move || db.delete_admin(&id)).await?;

    Ok(Json(json!({ "message": "admin removed" })))
}

fn account_view(row: UserRow, report_count: i64) -> UserAccount {
    UserAccount {
        id: parse_uuid(&row.id, "user id"),
        name: row.name,
        email: row.email,
        phone: row.phone,
        faculty: row.faculty,
        degree: row.degree,
        course: row.course,
        profile_picture: row.profile_picture,
        is_active: row.is_active,
        created_at: parse_ts(&row.created_at).unwrap_or_default(),
        report_count,
    }
}
