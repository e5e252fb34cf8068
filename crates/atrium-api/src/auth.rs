use std::sync::Arc;

use argon2::{
    Argon2, PasswordHash, PasswordHasher, PasswordVerifier,
    password_hash::{SaltString, rand_core::OsRng},
};
use axum::{Json, extract::State, http::StatusCode};
use chrono::Utc;
use jsonwebtoken::{EncodingKey, Header, encode};
use serde_json::{Value, json};
use uuid::Uuid;

use atrium_db::Database;
use atrium_db::models::{AdminRow, UserRow, fmt_ts};
use atrium_gateway::dispatcher::Dispatcher;
use atrium_types::api::{
    AdminAuthResponse, AdminClaims, AdminLoginRequest, AdminSummary, AuthResponse, Claims,
    LoginRequest, RegisterRequest,
};
use atrium_types::models::{DEGREES, FACULTIES, UserProfile};

use crate::error::{ApiError, Result, blocking};

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub db: Arc<Database>,
    pub dispatcher: Dispatcher,
    pub jwt_secret: String,
    pub email_domain: String,
    pub super_admin_username: String,
    pub super_admin_password: String,
}

/// Tokens outlive a study week, not a semester.
const TOKEN_DAYS: i64 = 7;

pub async fn faculties() -> Json<Value> {
    Json(json!({ "faculties": FACULTIES }))
}

pub async fn register(
    State(state): State<AppState>,
    Json(req): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<AuthResponse>)> {
    validate_registration(&req, &state.email_domain)?;

    let db = state.db.clone();
    let email = req.email.clone();
    if blocking(move || db.get_user_by_email(&email)).await?.is_some() {
        return Err(ApiError::Duplicate("this email is already registered".into()));
    }

    let db = state.db.clone();
    let phone = req.phone.clone();
    if blocking(move || db.get_user_by_phone(&phone)).await?.is_some() {
        return Err(ApiError::Duplicate("this phone number is already registered".into()));
    }

    let password_hash = hash_password(&req.password)?;
    let row = UserRow {
        id: Uuid::new_v4().to_string(),
        name: req.name.trim().to_string(),
        email: req.email,
        phone: req.phone,
        password: password_hash,
        faculty: req.faculty,
        degree: req.degree,
        course: req.course,
        profile_picture: None,
        is_active: true,
        created_at: fmt_ts(Utc::now()),
    };
    let user = row.profile();

    let db = state.db.clone();
    blocking(move || db.create_user(&row)).await?;

    let token = create_user_token(&state.jwt_secret, &user)?;
    Ok((StatusCode::CREATED, Json(AuthResponse { user, token })))
}

pub async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> Result<Json<AuthResponse>> {
    let db = state.db.clone();
    let email = req.email.trim().to_string();
    let row = blocking(move || db.get_user_by_email(&email))
        .await?
        .ok_or_else(|| ApiError::Auth("wrong email or password".to_string()))?;

    if !row.is_active {
        return Err(ApiError::Forbidden("account is deactivated".into()));
    }
    if !verify_password(&req.password, &row.password) {
        return Err(ApiError::Auth("wrong email or password".into()));
    }

    let user = row.profile();
    let token = create_user_token(&state.jwt_secret, &user)?;
    Ok(Json(AuthResponse { user, token }))
}

/// Admin sign-in. The super admin account is created lazily the first time
/// the configured credentials are used; sub-admins live in the database
/// from the start.
pub async fn admin_login(
    State(state): State<AppState>,
    Json(req): Json<AdminLoginRequest>,
) -> Result<Json<AdminAuthResponse>> {
    if req.username.trim().is_empty() || req.password.is_empty() {
        return Err(ApiError::Validation("username and password are required".into()));
    }

    if req.username == state.super_admin_username && req.password == state.super_admin_password {
        let db = state.db.clone();
        let row = match blocking(move || db.get_super_admin()).await? {
            Some(row) => row,
            None => {
                let row = AdminRow {
                    id: Uuid::new_v4().to_string(),
                    username: state.super_admin_username.clone(),
                    password: hash_password(&state.super_admin_password)?,
                    is_super: true,
                    created_at: fmt_ts(Utc::now()),
                };
                let db = state.db.clone();
                let stored = row.clone();
                blocking(move || db.create_admin(&stored)).await?;
                row
            }
        };
        return admin_response(&state.jwt_secret, &row);
    }

    let db = state.db.clone();
    let username = req.username.clone();
    let row = blocking(move || db.get_admin_by_username(&username))
        .await?
        .ok_or_else(|| ApiError::Auth("wrong username or password".to_string()))?;

    if !verify_password(&req.password, &row.password) {
        return Err(ApiError::Auth("wrong username or password".into()));
    }
    admin_response(&state.jwt_secret, &row)
}

fn admin_response(secret: &str, row: &AdminRow) -> Result<Json<AdminAuthResponse>> {
    let id: Uuid = row
        .id
        .parse()
        .map_err(|e| anyhow::anyhow!("corrupt admin id '{}': {e}", row.id))?;

    let claims = AdminClaims {
        sub: id,
        username: row.username.clone(),
        is_super: row.is_super,
        exp: (Utc::now() + chrono::Duration::days(TOKEN_DAYS)).timestamp() as usize,
    };
    let token = encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .map_err(|e| anyhow::anyhow!("token encoding failed: {e}"))?;

    Ok(Json(AdminAuthResponse {
        admin: AdminSummary {
            id,
            username: row.username.clone(),
            is_super: row.is_super,
        },
        token,
    }))
}

fn create_user_token(secret: &str, user: &UserProfile) -> Result<String> {
    let claims = Claims {
        sub: user.id,
        name: user.name.clone(),
        exp: (Utc::now() + chrono::Duration::days(TOKEN_DAYS)).timestamp() as usize,
    };

    let token = encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .map_err(|e| anyhow::anyhow!("token encoding failed: {e}"))?;

    Ok(token)
}

pub(crate) fn hash_password(password: &str) -> Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| ApiError::Storage(anyhow::anyhow!("password hashing failed: {e}")))
}

/// A hash that fails to parse counts as a failed verification, the same as
/// a wrong password.
pub(crate) fn verify_password(password: &str, stored_hash: &str) -> bool {
    PasswordHash::new(stored_hash)
        .map(|parsed| {
            Argon2::default()
                .verify_password(password.as_bytes(), &parsed)
                .is_ok()
        })
        .unwrap_or(false)
}

fn validate_registration(req: &RegisterRequest, email_domain: &str) -> Result<()> {
    if req.name.trim().is_empty() {
        return Err(ApiError::Validation("name cannot be empty".into()));
    }
    if !req.email.ends_with(email_domain) || req.email.len() <= email_domain.len() {
        return Err(ApiError::Validation(format!(
            "email must belong to {email_domain}"
        )));
    }
    if !valid_phone(&req.phone) {
        return Err(ApiError::Validation(
            "phone must be a + followed by 9 to 14 digits".into(),
        ));
    }
    if req.password.len() < 8 {
        return Err(ApiError::Validation(
            "password must be at least 8 characters".into(),
        ));
    }
    if !FACULTIES.contains(&req.faculty.as_str()) {
        return Err(ApiError::Validation("unknown faculty".into()));
    }
    if !DEGREES.contains(&req.degree.as_str()) {
        return Err(ApiError::Validation("unknown degree".into()));
    }
    if !(1..=6).contains(&req.course) {
        return Err(ApiError::Validation("course must be between 1 and 6".into()));
    }
    Ok(())
}

fn valid_phone(phone: &str) -> bool {
    let Some(digits) = phone.strip_prefix('+') else {
        return false;
    };
    (9..=14).contains(&digits.len()) && digits.chars().all(|c| c.is_ascii_digit())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    fn test_state() -> AppState {
        Arc::new(AppStateInner {
            db: Arc::new(Database::open(Path::new(":memory:")).expect("open database")),
            dispatcher: Dispatcher::new(),
            jwt_secret: "test-secret".into(),
            email_domain: "@campus.edu".into(),
            super_admin_username: "admin".into(),
            super_admin_password: "super-secret-pw".into(),
        })
    }

    fn sample_registration() -> RegisterRequest {
        RegisterRequest {
            name: "Aysel".into(),
            email: "aysel@campus.edu".into(),
            phone: "+994501234567".into(),
            password: "longenough".into(),
            faculty: "Physics".into(),
            degree: "bachelor".into(),
            course: 2,
        }
    }

    #[test]
    fn registration_validation_catches_each_field() {
        let domain = "@campus.edu";
        assert!(validate_registration(&sample_registration(), domain).is_ok());

        let mut bad = sample_registration();
        bad.name = "   ".into();
        assert!(matches!(
            validate_registration(&bad, domain),
            Err(ApiError::Validation(_))
        ));

        let mut bad = sample_registration();
        bad.email = "aysel@gmail.com".into();
        assert!(validate_registration(&bad, domain).is_err());

        // The bare domain with no local part is not an address.
        let mut bad = sample_registration();
        bad.email = "@campus.edu".into();
        assert!(validate_registration(&bad, domain).is_err());

        let mut bad = sample_registration();
        bad.password = "short".into();
        assert!(validate_registration(&bad, domain).is_err());

        let mut bad = sample_registration();
        bad.faculty = "Alchemy".into();
        assert!(validate_registration(&bad, domain).is_err());

        let mut bad = sample_registration();
        bad.degree = "wizard".into();
        assert!(validate_registration(&bad, domain).is_err());

        let mut bad = sample_registration();
        bad.course = 0;
        assert!(validate_registration(&bad, domain).is_err());
        bad.course = 7;
        assert!(validate_registration(&bad, domain).is_err());
    }

    #[test]
    fn phone_needs_plus_and_digits() {
        assert!(valid_phone("+994501234567"));
        assert!(valid_phone("+123456789"));
        assert!(!valid_phone("994501234567"));
        assert!(!valid_phone("+12345678"));
        assert!(!valid_phone("+123456789012345"));
        assert!(!valid_phone("+99450abc567"));
        assert!(!valid_phone(""));
    }

    #[test]
    fn password_hash_round_trip() {
        let hash = hash_password("correct horse").expect("hash");
        assert!(verify_password("correct horse", &hash));
        assert!(!verify_password("wrong horse", &hash));
        assert!(!verify_password("correct horse", "not-a-phc-string"));
    }

    #[tokio::test]
    async fn register_then_login_round_trip() {
        let state = test_state();

        let (status, Json(created)) =
            register(State(state.clone()), Json(sample_registration()))
                .await
                .expect("register");
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(created.user.name, "Aysel");
        assert!(!created.token.is_empty());

        let Json(logged_in) = login(
            State(state.clone()),
            Json(LoginRequest {
                email: "aysel@campus.edu".into(),
                password: "longenough".into(),
            }),
        )
        .await
        .expect("login");
        assert_eq!(logged_in.user.id, created.user.id);

        let wrong = login(
            State(state.clone()),
            Json(LoginRequest {
                email: "aysel@campus.edu".into(),
                password: "wrong-password".into(),
            }),
        )
        .await;
        assert!(matches!(wrong, Err(ApiError::Auth(_))));
    }

    #[tokio::test]
    async fn duplicate_email_and_phone_conflict() {
        let state = test_state();
        register(State(state.clone()), Json(sample_registration()))
            .await
            .expect("register");

        let same_email = register(State(state.clone()), Json(sample_registration())).await;
        assert!(matches!(same_email, Err(ApiError::Duplicate(_))));

        let mut same_phone = sample_registration();
        same_phone.email = "other@campus.edu".into();
        let result = register(State(state.clone()), Json(same_phone)).await;
        assert!(matches!(result, Err(ApiError::Duplicate(_))));
    }

    #[tokio::test]
    async fn deactivated_accounts_cannot_log_in() {
        let state = test_state();
        let (_, Json(created)) = register(State(state.clone()), Json(sample_registration()))
            .await
            .expect("register");

        state
            .db
            .set_user_active(&created.user.id.to_string(), false)
            .expect("deactivate");

        let result = login(
            State(state.clone()),
            Json(LoginRequest {
                email: "aysel@campus.edu".into(),
                password: "longenough".into(),
            }),
        )
        .await;
        assert!(matches!(result, Err(ApiError::Forbidden(_))));
    }

    #[tokio::test]
    async fn super_admin_is_bootstrapped_once() {
        let state = test_state();

        let Json(first) = admin_login(
            State(state.clone()),
            Json(AdminLoginRequest {
                username: "admin".into(),
                password: "super-secret-pw".into(),
            }),
        )
        .await
        .expect("first login");
        assert!(first.admin.is_super);

        let Json(second) = admin_login(
            State(state.clone()),
            Json(AdminLoginRequest {
                username: "admin".into(),
                password: "super-secret-pw".into(),
            }),
        )
        .await
        .expect("second login");
        assert_eq!(second.admin.id, first.admin.id);

        let wrong = admin_login(
            State(state.clone()),
            Json(AdminLoginRequest {
                username: "admin".into(),
                password: "guessed".into(),
            }),
        )
        .await;
        assert!(matches!(wrong, Err(ApiError::Auth(_))));
    }
}
