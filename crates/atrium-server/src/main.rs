use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use axum::{
    Router,
    extract::{State, WebSocketUpgrade},
    middleware,
    response::IntoResponse,
    routing::{delete, get, post, put},
};
use serde_json::json;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use atrium_api::auth::{self, AppState, AppStateInner};
use atrium_api::middleware::{require_admin, require_auth, require_super_admin};
use atrium_api::{admin, messages, settings, users};
use atrium_gateway::connection;
use atrium_gateway::dispatcher::Dispatcher;

mod reaper;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    // Init logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "atrium=debug,tower_http=debug".into()),
        )
        .init();

    // Config
    let jwt_secret =
        std::env::var("ATRIUM_JWT_SECRET").unwrap_or_else(|_| "dev-secret-change-me".into());
    let db_path = std::env::var("ATRIUM_DB_PATH").unwrap_or_else(|_| "atrium.db".into());
    let host = std::env::var("ATRIUM_HOST").unwrap_or_else(|_| "0.0.0.0".into());
    let port: u16 = std::env::var("ATRIUM_PORT")
        .unwrap_or_else(|_| "3000".into())
        .parse()?;
    let email_domain =
        std::env::var("ATRIUM_EMAIL_DOMAIN").unwrap_or_else(|_| "@campus.edu".into());
    let reaper_interval: u64 = std::env::var("ATRIUM_REAPER_INTERVAL_SECS")
        .unwrap_or_else(|_| "300".into())
        .parse()?;
    let super_admin_username =
        std::env::var("ATRIUM_SUPER_ADMIN_USERNAME").unwrap_or_else(|_| "admin".into());
    let super_admin_password =
        std::env::var("ATRIUM_SUPER_ADMIN_PASSWORD").unwrap_or_else(|_| "change-me-admin".into());

    // Init database
    let db = Arc::new(atrium_db::Database::open(&PathBuf::from(&db_path))?);

    // Shared state
    let dispatcher = Dispatcher::new();
    let state: AppState = Arc::new(AppStateInner {
        db: db.clone(),
        dispatcher,
        jwt_secret,
        email_domain,
        super_admin_username,
        super_admin_password,
    });

    // Expired messages disappear on a timer, not on request traffic.
    tokio::spawn(reaper::run_reaper_loop(db, reaper_interval));

    // Routes
    let public_routes = Router::new()
        .route("/health", get(health))
        .route("/auth/faculties", get(auth::faculties))
        .route("/auth/register", post(auth::register))
        .route("/auth/login", post(auth::login))
        .route("/auth/admin/login", post(auth::admin_login))
        .route("/settings/public", get(settings::public_settings));

    let user_routes = Router::new()
        .route("/users/me", get(users::me))
        .route("/users/faculty/{faculty}", get(users::faculty_roster))
        .route(
            "/users/blocks",
            post(users::block_user).get(users::blocked_users),
        )
        .route("/users/blocks/{user_id}", delete(users::unblock_user))
        .route("/users/reports", post(users::report_user))
        .route("/users/{user_id}", get(users::user_by_id))
        .route("/messages/faculty/{faculty}", get(messages::faculty_messages))
        .route("/messages/private/{peer_id}", get(messages::private_messages))
        .route("/messages/conversations", get(messages::conversations))
        .layer(middleware::from_fn_with_state(state.clone(), require_auth));

    let admin_routes = Router::new()
        .route("/admin/stats", get(admin::dashboard_stats))
        .route("/admin/users", get(admin::list_users))
        .route("/admin/users/{user_id}/status", put(admin::set_user_status))
        .route("/admin/reported", get(admin::reported_users))
        .route(
            "/admin/settings",
            get(admin::all_settings).put(admin::update_setting),
        )
        .route(
            "/admin/filter-words",
            get(admin::filter_words).post(admin::add_filter_word),
        )
        .route("/admin/filter-words/{word}", delete(admin::remove_filter_word))
        .layer(middleware::from_fn_with_state(state.clone(), require_admin));

    let super_admin_routes = Router::new()
        .route(
            "/admin/admins",
            get(admin::list_admins).post(admin::create_admin_account),
        )
        .route("/admin/admins/{admin_id}", delete(admin::delete_admin_account))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            require_super_admin,
        ));

    let ws_route = Router::new().route("/gateway", get(ws_upgrade));

    let app = Router::new()
        .merge(public_routes)
        .merge(user_routes)
        .merge(admin_routes)
        .merge(super_admin_routes)
        .merge(ws_route)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    let addr: SocketAddr = format!("{}:{}", host, port).parse()?;
    info!("Atrium server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

async fn health() -> impl IntoResponse {
    axum::Json(json!({ "status": "OK", "timestamp": chrono::Utc::now() }))
}

async fn ws_upgrade(State(state): State<AppState>, ws: WebSocketUpgrade) -> impl IntoResponse {
    ws.on_upgrade(move |socket| {
        connection::handle_connection(
            socket,
            state.dispatcher.clone(),
            state.db.clone(),
            state.jwt_secret.clone(),
        )
    })
}
