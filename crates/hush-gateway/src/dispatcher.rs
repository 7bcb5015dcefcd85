use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{Mutex, OwnedMutexGuard, RwLock, mpsc};
use uuid::Uuid;

use hush_types::events::GatewayEvent;

/// Tracks every live gateway connection and routes events to them.
///
/// A user may hold several connections at once (one per device or tab).
/// Each gets its own channel and is addressed by `(user_id, conn_id)`.
#[derive(Clone, Default)]
pub struct Dispatcher {
    inner: Arc<DispatcherInner>,
}

#[derive(Default)]
struct DispatcherInner {
    /// user_id -> (conn_id -> sender)
    connections: RwLock<HashMap<Uuid, HashMap<Uuid, mpsc::UnboundedSender<GatewayEvent>>>>,

    /// chat_id -> lock held while a message is persisted and fanned out
    chat_locks: Mutex<HashMap<Uuid, Arc<Mutex<()>>>>,
}

impl Dispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new connection for `user_id`. Returns (conn_id, receiver).
    pub async fn register(&self, user_id: Uuid) -> (Uuid, mpsc::UnboundedReceiver<GatewayEvent>) {
        let conn_id = Uuid::new_v4();
        let (tx, rx) = mpsc::unbounded_channel();
        self.inner
            .connections
            .write()
            .await
            .entry(user_id)
            .or_default()
            .insert(conn_id, tx);
        (conn_id, rx)
    }

    /// Drop one connection. Other connections of the same user stay registered.
    pub async fn unregister(&self, user_id: Uuid, conn_id: Uuid) {
        let mut connections = self.inner.connections.write().await;
        if let Some(user_conns) = connections.get_mut(&user_id) {
            user_conns.remove(&conn_id);
            if user_conns.is_empty() {
                connections.remove(&user_id);
            }
        }
    }

    /// Live connections held by `user_id`.
    pub async fn connection_count(&self, user_id: Uuid) -> usize {
        self.inner
            .connections
            .read()
            .await
            .get(&user_id)
            .map_or(0, HashMap::len)
    }

    /// Send to every connection of `user_id`. Returns how many received it.
    pub async fn send_to_user(&self, user_id: Uuid, event: &GatewayEvent) -> usize {
        self.send_to_user_except(user_id, None, event).await
    }

    /// Send to every connection of `user_id` other than `except`.
    pub async fn send_to_user_except(
        &self,
        user_id: Uuid,
        except: Option<Uuid>,
        event: &GatewayEvent,
    ) -> usize {
        let connections = self.inner.connections.read().await;
        let Some(user_conns) = connections.get(&user_id) else {
            return 0;
        };

        user_conns
            .iter()
            .filter(|(conn_id, _)| Some(**conn_id) != except)
            .filter(|(_, tx)| tx.send(event.clone()).is_ok())
            .count()
    }

    /// Send to one specific connection only.
    pub async fn send_to_connection(&self, user_id: Uuid, conn_id: Uuid, event: GatewayEvent) -> bool {
        let connections = self.inner.connections.read().await;
        connections
            .get(&user_id)
            .and_then(|user_conns| user_conns.get(&conn_id))
            .is_some_and(|tx| tx.send(event).is_ok())
    }

    /// Acquire the ordering lock for `chat_id`. Messages to one chat are
    /// persisted and pushed while holding it, so every member observes
    /// them in storage order.
    pub async fn lock_chat(&self, chat_id: Uuid) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.inner.chat_locks.lock().await;
            // Forget locks nobody else holds or waits on.
            locks.retain(|id, lock| *id == chat_id || Arc::strong_count(lock) > 1);
            locks.entry(chat_id).or_default().clone()
        };
        lock.lock_owned().await
    }
}
