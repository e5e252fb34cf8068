use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tokio::sync::{RwLock, mpsc};
use uuid::Uuid;

use atrium_types::events::GatewayEvent;

/// What a connection task pulls off its outbound channel.
#[derive(Debug)]
pub enum Outbound {
    Event(GatewayEvent),
    /// Close the socket (account deactivated, admin kick)
    Shutdown,
}

struct ConnectionEntry {
    user_id: Uuid,
    tx: mpsc::UnboundedSender<Outbound>,
}

/// Tracks connected clients, their room memberships, and delivers events.
///
/// A user may hold several connections at once (multiple tabs); presence
/// maps each user to the set of their live connection ids, and rooms hold
/// connection ids so each tab receives its own copy exactly once.
#[derive(Clone)]
pub struct Dispatcher {
    inner: Arc<DispatcherInner>,
}

struct DispatcherInner {
    /// conn_id -> owning user and outbound channel
    connections: RwLock<HashMap<Uuid, ConnectionEntry>>,

    /// user_id -> that user's open connections
    presence: RwLock<HashMap<Uuid, HashSet<Uuid>>>,

    /// room key -> member connections
    rooms: RwLock<HashMap<String, HashSet<Uuid>>>,

    /// conn_id -> rooms joined, for disconnect cleanup
    memberships: RwLock<HashMap<Uuid, HashSet<String>>>,
}

impl Dispatcher {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(DispatcherInner {
                connections: RwLock::new(HashMap::new()),
                presence: RwLock::new(HashMap::new()),
                rooms: RwLock::new(HashMap::new()),
                memberships: RwLock::new(HashMap::new()),
            }),
        }
    }

    /// Register an authenticated connection. Returns its id and the
    /// receiver the connection task drains.
    pub async fn register(&self, user_id: Uuid) -> (Uuid, mpsc::UnboundedReceiver<Outbound>) {
        let conn_id = Uuid::new_v4();
        let (tx, rx) = mpsc::unbounded_channel();

        self.inner
            .connections
            .write()
            .await
            .insert(conn_id, ConnectionEntry { user_id, tx });
        self.inner
            .presence
            .write()
            .await
            .entry(user_id)
            .or_default()
            .insert(conn_id);

        (conn_id, rx)
    }

    /// Drop a connection from presence and every room it joined.
    pub async fn disconnect(&self, conn_id: Uuid) {
        let entry = self.inner.connections.write().await.remove(&conn_id);
        let Some(entry) = entry else { return };

        {
            let mut presence = self.inner.presence.write().await;
            if let Some(conns) = presence.get_mut(&entry.user_id) {
                conns.remove(&conn_id);
                if conns.is_empty() {
                    presence.remove(&entry.user_id);
                }
            }
        }

        let joined = self.inner.memberships.write().await.remove(&conn_id);
        if let Some(joined) = joined {
            let mut rooms = self.inner.rooms.write().await;
            for key in joined {
                if let Some(members) = rooms.get_mut(&key) {
                    members.remove(&conn_id);
                    if members.is_empty() {
                        rooms.remove(&key);
                    }
                }
            }
        }
    }

    /// Add a connection to a room. Returns false if it was already a member.
    pub async fn join_room(&self, conn_id: Uuid, room: &str) -> bool {
        let newly_joined = self
            .inner
            .rooms
            .write()
            .await
            .entry(room.to_string())
            .or_default()
            .insert(conn_id);

        if newly_joined {
            self.inner
                .memberships
                .write()
                .await
                .entry(conn_id)
                .or_default()
                .insert(room.to_string());
        }

        newly_joined
    }

    pub async fn leave_room(&self, conn_id: Uuid, room: &str) {
        {
            let mut rooms = self.inner.rooms.write().await;
            if let Some(members) = rooms.get_mut(room) {
                members.remove(&conn_id);
                if members.is_empty() {
                    rooms.remove(room);
                }
            }
        }

        if let Some(joined) = self.inner.memberships.write().await.get_mut(&conn_id) {
            joined.remove(room);
        }
    }

    /// Whether the user has at least one live connection.
    pub async fn is_online(&self, user_id: Uuid) -> bool {
        self.inner.presence.read().await.contains_key(&user_id)
    }

    /// Whether any of the user's connections has joined the room.
    pub async fn user_in_room(&self, room: &str, user_id: Uuid) -> bool {
        let rooms = self.inner.rooms.read().await;
        let Some(members) = rooms.get(room) else {
            return false;
        };
        let connections = self.inner.connections.read().await;
        members
            .iter()
            .any(|cid| connections.get(cid).is_some_and(|c| c.user_id == user_id))
    }

    /// Send a targeted event to one connection.
    pub async fn send_to_conn(&self, conn_id: Uuid, event: GatewayEvent) {
        if let Some(entry) = self.inner.connections.read().await.get(&conn_id) {
            let _ = entry.tx.send(Outbound::Event(event));
        }
    }

    /// Send an event to every connection of a user.
    pub async fn send_to_user(&self, user_id: Uuid, event: GatewayEvent) {
        let presence = self.inner.presence.read().await;
        let Some(conns) = presence.get(&user_id) else {
            return;
        };
        let connections = self.inner.connections.read().await;
        for cid in conns {
            if let Some(entry) = connections.get(cid) {
                let _ = entry.tx.send(Outbound::Event(event.clone()));
            }
        }
    }

    /// Send an event to every member connection of a room.
    pub async fn send_to_room(&self, room: &str, event: GatewayEvent) {
        self.fan_out(room, event, |_, _| true).await;
    }

    /// Room send that skips one connection (e.g. the originator).
    pub async fn send_to_room_except(&self, room: &str, skip: Uuid, event: GatewayEvent) {
        self.fan_out(room, event, |cid, _| cid != skip).await;
    }

    /// Room send that skips every connection owned by an excluded user.
    /// This is how blocked senders stay invisible at delivery time.
    pub async fn send_to_room_excluding_users(
        &self,
        room: &str,
        excluded: &HashSet<Uuid>,
        event: GatewayEvent,
    ) {
        self.fan_out(room, event, |_, uid| !excluded.contains(&uid))
            .await;
    }

    /// Force-close every connection a user holds. Returns how many.
    pub async fn kick_user(&self, user_id: Uuid, reason: &str) -> usize {
        let conn_ids: Vec<Uuid> = {
            let presence = self.inner.presence.read().await;
            match presence.get(&user_id) {
                Some(conns) => conns.iter().copied().collect(),
                None => return 0,
            }
        };

        let connections = self.inner.connections.read().await;
        let mut kicked = 0;
        for cid in conn_ids {
            if let Some(entry) = connections.get(&cid) {
                let _ = entry.tx.send(Outbound::Event(GatewayEvent::AuthError {
                    reason: reason.to_string(),
                }));
                let _ = entry.tx.send(Outbound::Shutdown);
                kicked += 1;
            }
        }
        kicked
    }

    async fn fan_out<F>(&self, room: &str, event: GatewayEvent, mut keep: F)
    where
        F: FnMut(Uuid, Uuid) -> bool,
    {
        let rooms = self.inner.rooms.read().await;
        let Some(members) = rooms.get(room) else {
            return;
        };
        let connections = self.inner.connections.read().await;
        for cid in members {
            if let Some(entry) = connections.get(cid) {
                if keep(*cid, entry.user_id) {
                    let _ = entry.tx.send(Outbound::Event(event.clone()));
                }
            }
        }
    }
}
