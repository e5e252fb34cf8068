use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use jsonwebtoken::{DecodingKey, Validation, decode};
use tokio::sync::mpsc;
use tracing::{info, warn};

use atrium_db::Database;
use atrium_types::api::Claims;
use atrium_types::events::{ClientCommand, GatewayEvent};
use atrium_types::models::UserProfile;

use crate::dispatcher::{Dispatcher, Outbound};
use crate::session::Session;

/// Heartbeat interval: server sends a Ping every 15 seconds.
/// If 2 consecutive Pongs are missed (~30s), the connection is dropped.
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(15);

/// How long an unauthenticated socket may sit before the server closes it.
const AUTH_TIMEOUT: Duration = Duration::from_secs(10);

/// Drive one WebSocket connection: authenticate within the bounded window,
/// register with the dispatcher, then pump commands and outbound events
/// until either side closes.
pub async fn handle_connection(
    socket: WebSocket,
    dispatcher: Dispatcher,
    db: Arc<Database>,
    jwt_secret: String,
) {
    let (mut sender, mut receiver) = socket.split();

    let user = match wait_for_authenticate(&mut receiver, &db, &jwt_secret).await {
        Ok(user) => user,
        Err(reason) => {
            warn!("WebSocket authentication failed: {}", reason);
            let event = GatewayEvent::AuthError { reason };
            let _ = sender
                .send(Message::Text(serde_json::to_string(&event).unwrap().into()))
                .await;
            let _ = sender.send(Message::Close(None)).await;
            return;
        }
    };

    let (conn_id, user_rx) = dispatcher.register(user.id).await;
    info!("{} ({}) connected to gateway", user.name, user.id);

    let ack = GatewayEvent::Authenticated { user: user.clone() };
    if sender
        .send(Message::Text(serde_json::to_string(&ack).unwrap().into()))
        .await
        .is_err()
    {
        dispatcher.disconnect(conn_id).await;
        return;
    }

    let session = Session::new(conn_id, user.clone(), db, dispatcher.clone());
    run_connection_loop(sender, receiver, session, user_rx).await;

    dispatcher.disconnect(conn_id).await;
    info!("{} ({}) disconnected from gateway", user.name, user.id);
}

/// Wait (bounded) for the first Authenticate command, verify the token and
/// resolve an active account.
async fn wait_for_authenticate(
    receiver: &mut SplitStream<WebSocket>,
    db: &Arc<Database>,
    jwt_secret: &str,
) -> Result<UserProfile, String> {
    let handshake = tokio::time::timeout(AUTH_TIMEOUT, async {
        while let Some(Ok(msg)) = receiver.next().await {
            if let Message::Text(text) = msg {
                if let Ok(ClientCommand::Authenticate { token }) =
                    serde_json::from_str::<ClientCommand>(&text)
                {
                    return Some(token);
                }
            }
        }
        None
    });

    let token = match handshake.await {
        Ok(Some(token)) => token,
        Ok(None) => return Err("connection closed before authenticating".into()),
        Err(_) => return Err("authentication timed out".into()),
    };

    let claims = decode::<Claims>(
        &token,
        &DecodingKey::from_secret(jwt_secret.as_bytes()),
        &Validation::default(),
    )
    .map_err(|_| "invalid or expired token".to_string())?
    .claims;

    let db = db.clone();
    let user_id = claims.sub.to_string();
    let row = tokio::task::spawn_blocking(move || db.get_user_by_id(&user_id))
        .await
        .map_err(|_| "account lookup failed".to_string())?
        .map_err(|_| "account lookup failed".to_string())?;

    match row {
        Some(row) if row.is_active => Ok(row.profile()),
        Some(_) => Err("account is deactivated".into()),
        None => Err("account no longer exists".into()),
    }
}

async fn run_connection_loop(
    mut sender: SplitSink<WebSocket, Message>,
    mut receiver: SplitStream<WebSocket>,
    session: Session,
    mut user_rx: mpsc::UnboundedReceiver<Outbound>,
) {
    // Shared flag for heartbeat
    let pong_received = Arc::new(AtomicBool::new(true));
    let pong_flag_send = pong_received.clone();
    let pong_flag_recv = pong_received;

    // Forward outbound events -> client, with heartbeat
    let mut send_task = tokio::spawn(async move {
        let mut heartbeat = tokio::time::interval(HEARTBEAT_INTERVAL);
        heartbeat.tick().await;
        let mut missed_heartbeats: u8 = 0;

        loop {
            tokio::select! {
                result = user_rx.recv() => {
                    match result {
                        Some(Outbound::Event(event)) => {
                            let text = serde_json::to_string(&event).unwrap();
                            if sender.send(Message::Text(text.into())).await.is_err() {
                                break;
                            }
                        }
                        Some(Outbound::Shutdown) => {
                            let _ = sender.send(Message::Close(None)).await;
                            break;
                        }
                        None => break,
                    }
                }
                _ = heartbeat.tick() => {
                    if pong_flag_send.swap(false, Ordering::Acquire) {
                        missed_heartbeats = 0;
                    } else {
                        missed_heartbeats += 1;
                        if missed_heartbeats >= 2 {
                            warn!("Heartbeat timeout (missed {} pongs), dropping connection", missed_heartbeats);
                            break;
                        }
                    }
                    if sender.send(Message::Ping(vec![].into())).await.is_err() {
                        break;
                    }
                }
            }
        }
    });

    // Read commands from client
    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = receiver.next().await {
            match msg {
                Message::Text(text) => match serde_json::from_str::<ClientCommand>(&text) {
                    Ok(cmd) => session.handle(cmd).await,
                    Err(e) => {
                        let preview: String = text.chars().take(200).collect();
                        warn!(
                            "{} ({}) bad command: {} -- raw: {}",
                            session.user.name, session.conn_id, e, preview
                        );
                    }
                },
                Message::Pong(_) => {
                    pong_flag_recv.store(true, Ordering::Release);
                }
                Message::Close(_) => break,
                _ => {}
            }
        }
    });

    // Whichever task finishes first tears down the other
    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }
}
