use axum::{
    Extension, Json,
    extract::{Path, State},
};
use chrono::Utc;
use serde_json::{Value, json};
use uuid::Uuid;

use atrium_db::models::{UserRow, fmt_ts, parse_ts, parse_uuid};
use atrium_types::api::{BlockRequest, Claims, OwnProfile, ReportRequest};
use atrium_types::models::UserProfile;

use crate::auth::AppState;
use crate::error::{ApiError, Result, blocking};

pub async fn me(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<OwnProfile>> {
    let db = state.db.clone();
    let id = claims.sub.to_string();
    let row = blocking(move || db.get_user_by_id(&id))
        .await?
        .ok_or_else(|| ApiError::NotFound("account no longer exists".to_string()))?;

    Ok(Json(own_profile(row)))
}

/// Active members of the requester's chosen faculty, the requester left out.
pub async fn faculty_roster(
    State(state): State<AppState>,
    Path(faculty): Path<String>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<Value>> {
    let db = state.db.clone();
    let requester = claims.sub.to_string();
    let rows = blocking(move || db.list_faculty_users(&faculty, &requester)).await?;

    let users: Vec<UserProfile> = rows.iter().map(UserRow::profile).collect();
    Ok(Json(json!({ "users": users })))
}

pub async fn user_by_id(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
    Extension(_claims): Extension<Claims>,
) -> Result<Json<Value>> {
    let db = state.db.clone();
    let id = user_id.to_string();
    let row = blocking(move || db.get_user_by_id(&id))
        .await?
        .ok_or_else(|| ApiError::NotFound("user not found".to_string()))?;

    Ok(Json(json!({ "user": row.profile(), "is_active": row.is_active })))
}

pub async fn block_user(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<BlockRequest>,
) -> Result<Json<Value>> {
    if req.user_id == claims.sub {
        return Err(ApiError::Validation("you cannot block yourself".into()));
    }

    let db = state.db.clone();
    let target = req.user_id.to_string();
    if blocking(move || db.get_user_by_id(&target)).await?.is_none() {
        return Err(ApiError::NotFound("user not found".into()));
    }

    let db = state.db.clone();
    let blocker = claims.sub.to_string();
    let target = req.user_id.to_string();
    if blocking(move || db.block_exists(&blocker, &target)).await? {
        return Err(ApiError::Duplicate("this user is already blocked".into()));
    }

    let db = state.db.clone();
    let blocker = claims.sub.to_string();
    let target = req.user_id.to_string();
    blocking(move || db.insert_block(&blocker, &target, &fmt_ts(Utc::now()))).await?;

    Ok(Json(json!({ "message": "user blocked" })))
}

/// Removing an absent block succeeds; the end state is the same either way.
pub async fn unblock_user(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<Value>> {
    let db = state.db.clone();
    let blocker = claims.sub.to_string();
    let target = user_id.to_string();
    blocking(move || db.delete_block(&blocker, &target)).await?;

    Ok(Json(json!({ "message": "user unblocked" })))
}

pub async fn blocked_users(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<Value>> {
    let db = state.db.clone();
    let blocker = claims.sub.to_string();
    let rows = blocking(move || db.list_blocked_users(&blocker)).await?;

    let users: Vec<UserProfile> = rows.iter().map(UserRow::profile).collect();
    Ok(Json(json!({ "users": users })))
}

pub async fn report_user(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<ReportRequest>,
) -> Result<Json<Value>> {
    if req.user_id == claims.sub {
        return Err(ApiError::Validation("you cannot report yourself".into()));
    }

    let db = state.db.clone();
    let target = req.user_id.to_string();
    if blocking(move || db.get_user_by_id(&target)).await?.is_none() {
        return Err(ApiError::NotFound("user not found".into()));
    }

    let db = state.db.clone();
    let reporter = claims.sub.to_string();
    let target = req.user_id.to_string();
    blocking(move || {
        db.insert_report(
            &Uuid::new_v4().to_string(),
            &reporter,
            &target,
            req.reason.as_deref(),
            &fmt_ts(Utc::now()),
        )
    })
    .await?;

    Ok(Json(json!({ "message": "report submitted" })))
}

fn own_profile(row: UserRow) -> OwnProfile {
    OwnProfile {
        id: parse_uuid(&row.id, "user id"),
        name: row.name,
        email: row.email,
        phone: row.phone,
        faculty: row.faculty,
        degree: row.degree,
        course: row.course,
        profile_picture: row.profile_picture,
        created_at: parse_ts(&row.created_at).unwrap_or_default(),
    }
}
