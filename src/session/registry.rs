use dashmap::DashMap;
use serde::Serialize;
use std::borrow::Borrow;
use std::collections::HashMap;
use std::hash::Hash;
use std::sync::Arc;

use crate::connection::{ConnectionHandle, ConnectionId};
use crate::metrics::ConnectionMetrics;

use super::SessionKey;

/// Per-process index of live connections by session key.
///
/// A connection is registered under at most one key. A key whose last
/// connection is removed is dropped from the index, so memory is bounded by
/// the keys currently connected.
#[derive(Default)]
pub struct SessionRegistry {
    /// session_key -> {connection_id -> handle}
    sessions: DashMap<SessionKey, HashMap<ConnectionId, Arc<ConnectionHandle>>>,
    /// connection_id -> session_key
    connection_keys: DashMap<ConnectionId, SessionKey>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RegistryStats {
    pub total_connections: usize,
    pub unique_keys: usize,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `connection` under `key`. Adding the same connection again is
    /// a no-op; adding it under another key moves it.
    pub fn add(&self, connection: Arc<ConnectionHandle>, key: SessionKey) {
        let connection_id = connection.id;

        if let Some(previous) = self.connection_keys.insert(connection_id, key.clone()) {
            if previous != key {
                self.detach(&previous, connection_id);
            }
        }

        self.sessions
            .entry(key.clone())
            .or_default()
            .insert(connection_id, connection);

        self.update_gauges();
        tracing::info!(connection_id = %connection_id, session_key = %key, "Connection registered");
    }

    /// Unregister a connection. Unknown ids are ignored.
    pub fn remove(&self, connection_id: ConnectionId) -> Option<SessionKey> {
        let (_, key) = self.connection_keys.remove(&connection_id)?;
        self.detach(&key, connection_id);

        self.update_gauges();
        tracing::info!(connection_id = %connection_id, session_key = %key, "Connection unregistered");
        Some(key)
    }

    /// Remove one connection from a key's set and drop the key if the set is
    /// now empty, atomically with respect to concurrent adds on that key.
    fn detach(&self, key: &SessionKey, connection_id: ConnectionId) {
        self.sessions.remove_if_mut(key, |_, connections| {
            connections.remove(&connection_id);
            connections.is_empty()
        });
    }

    /// Snapshot of the connections under `key`, ordered by connection id.
    pub fn connections_for<Q>(&self, key: &Q) -> Vec<Arc<ConnectionHandle>>
    where
        SessionKey: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let mut connections: Vec<_> = self
            .sessions
            .get(key)
            .map(|entry| entry.values().cloned().collect())
            .unwrap_or_default();
        connections.sort_by_key(|c| c.id);
        connections
    }

    pub fn contains_key<Q>(&self, key: &Q) -> bool
    where
        SessionKey: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.sessions.contains_key(key)
    }

    pub fn key_of(&self, connection_id: ConnectionId) -> Option<SessionKey> {
        self.connection_keys
            .get(&connection_id)
            .map(|entry| entry.value().clone())
    }

    pub fn all_keys(&self) -> Vec<SessionKey> {
        self.sessions.iter().map(|entry| entry.key().clone()).collect()
    }

    pub fn all_connections(&self) -> Vec<Arc<ConnectionHandle>> {
        self.sessions
            .iter()
            .flat_map(|entry| entry.value().values().cloned().collect::<Vec<_>>())
            .collect()
    }

    pub fn stats(&self) -> RegistryStats {
        RegistryStats {
            total_connections: self.connection_keys.len(),
            unique_keys: self.sessions.len(),
        }
    }

    fn update_gauges(&self) {
        let stats = self.stats();
        ConnectionMetrics::set_registry_size(stats.total_connections, stats.unique_keys);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::{ChannelConnection, WriterConfig};
    use std::collections::HashSet;

    fn connection() -> Arc<ConnectionHandle> {
        let (conn, _peer) = ChannelConnection::pair();
        ConnectionHandle::new(conn, WriterConfig::default())
    }

    fn ids(connections: &[Arc<ConnectionHandle>]) -> Vec<ConnectionId> {
        connections.iter().map(|c| c.id).collect()
    }

    #[tokio::test]
    async fn test_add_and_remove_single_connection() {
        let registry = SessionRegistry::new();
        let c1 = connection();

        registry.add(c1.clone(), SessionKey::from("user-42"));
        assert_eq!(ids(&registry.connections_for("user-42")), vec![c1.id]);
        assert_eq!(registry.key_of(c1.id), Some(SessionKey::from("user-42")));

        assert_eq!(registry.remove(c1.id), Some(SessionKey::from("user-42")));
        assert!(registry.connections_for("user-42").is_empty());
        assert!(!registry.all_keys().contains(&SessionKey::from("user-42")));
        assert_eq!(
            registry.stats(),
            RegistryStats {
                total_connections: 0,
                unique_keys: 0
            }
        );
    }

    #[tokio::test]
    async fn test_key_kept_until_last_connection_removed() {
        let registry = SessionRegistry::new();
        let c1 = connection();
        let c2 = connection();
        let key = SessionKey::from("user-42");

        registry.add(c1.clone(), key.clone());
        registry.add(c2.clone(), key.clone());

        registry.remove(c1.id);
        assert!(registry.contains_key("user-42"));
        assert_eq!(ids(&registry.connections_for("user-42")), vec![c2.id]);

        registry.remove(c2.id);
        assert!(!registry.contains_key("user-42"));
    }

    #[tokio::test]
    async fn test_add_is_idempotent() {
        let registry = SessionRegistry::new();
        let c1 = connection();

        registry.add(c1.clone(), SessionKey::from("a"));
        registry.add(c1.clone(), SessionKey::from("a"));

        assert_eq!(registry.connections_for("a").len(), 1);
        assert_eq!(registry.stats().total_connections, 1);
    }

    #[tokio::test]
    async fn test_readd_under_other_key_moves_connection() {
        let registry = SessionRegistry::new();
        let c1 = connection();

        registry.add(c1.clone(), SessionKey::from("a"));
        registry.add(c1.clone(), SessionKey::from("b"));

        assert!(!registry.contains_key("a"));
        assert_eq!(ids(&registry.connections_for("b")), vec![c1.id]);
        assert_eq!(registry.all_connections().len(), 1);
    }

    #[test]
    fn test_remove_unknown_is_noop() {
        let registry = SessionRegistry::new();
        assert_eq!(registry.remove(ConnectionId::from(u64::MAX)), None);
        assert!(registry.connections_for("nobody").is_empty());
    }

    #[tokio::test]
    async fn test_snapshot_is_ordered_and_detached() {
        let registry = SessionRegistry::new();
        let connections: Vec<_> = (0..5).map(|_| connection()).collect();
        for c in connections.iter().rev() {
            registry.add(c.clone(), SessionKey::from("k"));
        }

        let snapshot = registry.connections_for("k");
        for c in &connections {
            registry.remove(c.id);
        }

        assert_eq!(ids(&snapshot), ids(&connections));
        assert!(registry.connections_for("k").is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_add_remove_same_key() {
        let registry = Arc::new(SessionRegistry::new());
        let keep: Vec<_> = (0..8).map(|_| connection()).collect();
        let churn: Vec<_> = (0..64).map(|_| connection()).collect();

        let mut tasks = Vec::new();
        for c in keep.clone() {
            let registry = registry.clone();
            tasks.push(tokio::spawn(async move {
                registry.add(c, SessionKey::from("shared"));
            }));
        }
        for c in churn.clone() {
            let registry = registry.clone();
            tasks.push(tokio::spawn(async move {
                let id = c.id;
                registry.add(c, SessionKey::from("shared"));
                tokio::task::yield_now().await;
                registry.remove(id);
            }));
        }
        for task in tasks {
            task.await.unwrap();
        }

        let remaining: HashSet<_> = ids(&registry.connections_for("shared")).into_iter().collect();
        let expected: HashSet<_> = keep.iter().map(|c| c.id).collect();
        assert_eq!(remaining, expected);
        assert_eq!(registry.stats().total_connections, keep.len());

        for c in &keep {
            registry.remove(c.id);
        }
        assert!(registry.all_keys().is_empty());
    }
}
