//! Track live connections.

use crate::ConnectionId;
use std::{
    collections::HashMap,
    net::SocketAddr,
    sync::{Arc, Mutex, MutexGuard},
};
use tokio::task::JoinHandle;

/// A registered connection and the tasks serving it.
///
/// Disposing a connection aborts its tasks, which drops (and closes) both halves
/// of its socket.
#[derive(Debug)]
pub struct Connection {
    id: ConnectionId,
    address: SocketAddr,
    reader: Option<JoinHandle<()>>,
    worker: Option<JoinHandle<()>>,
    disposed: bool,
}

impl Connection {
    pub fn new(id: ConnectionId, address: SocketAddr) -> Self {
        Self {
            id,
            address,
            reader: None,
            worker: None,
            disposed: false,
        }
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn address(&self) -> SocketAddr {
        self.address
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed
    }

    /// Stops the connection's tasks. Returns `false` if already disposed.
    pub fn dispose(&mut self) -> bool {
        if self.disposed {
            return false;
        }
        self.disposed = true;
        if let Some(reader) = self.reader.take() {
            reader.abort();
        }
        if let Some(worker) = self.worker.take() {
            worker.abort();
        }
        true
    }
}

/// Shared map of live connections.
///
/// Written by the listener (insert) and by workers and [crate::Server::stop] (remove).
/// Removal hands ownership of the [Connection] to exactly one caller, which is then
/// responsible for disposing it.
#[derive(Clone, Debug, Default)]
pub struct Registry {
    connections: Arc<Mutex<HashMap<ConnectionId, Connection>>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<ConnectionId, Connection>> {
        self.connections
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn insert(&self, connection: Connection) {
        self.lock().insert(connection.id(), connection);
    }

    /// Attaches the tasks serving `id`.
    ///
    /// If `id` is no longer registered, the tasks are aborted and `false` is returned.
    pub fn attach(&self, id: ConnectionId, reader: JoinHandle<()>, worker: JoinHandle<()>) -> bool {
        let mut connections = self.lock();
        match connections.get_mut(&id) {
            Some(connection) if !connection.is_disposed() => {
                connection.reader = Some(reader);
                connection.worker = Some(worker);
                true
            }
            _ => {
                reader.abort();
                worker.abort();
                false
            }
        }
    }

    pub fn contains(&self, id: ConnectionId) -> bool {
        self.lock().contains_key(&id)
    }

    pub fn remove(&self, id: ConnectionId) -> Option<Connection> {
        self.lock().remove(&id)
    }

    /// Removes every connection.
    pub fn drain(&self) -> Vec<Connection> {
        self.lock().drain().map(|(_, connection)| connection).collect()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn ids(&self) -> Vec<ConnectionId> {
        let mut ids: Vec<_> = self.lock().keys().copied().collect();
        ids.sort();
        ids
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn address() -> SocketAddr {
        SocketAddr::from(([127, 0, 0, 1], 4000))
    }

    #[tokio::test]
    async fn test_dispose_once() {
        let mut connection = Connection::new(ConnectionId::new(1), address());
        let reader = tokio::spawn(async { tokio::time::sleep(Duration::from_secs(60)).await });
        let worker = tokio::spawn(async { tokio::time::sleep(Duration::from_secs(60)).await });

        let registry = Registry::new();
        registry.insert(connection);
        assert!(registry.attach(ConnectionId::new(1), reader, worker));

        connection = registry.remove(ConnectionId::new(1)).unwrap();
        assert!(registry.remove(ConnectionId::new(1)).is_none());
        assert!(connection.dispose());
        assert!(connection.is_disposed());
        assert!(!connection.dispose());
    }

    #[tokio::test]
    async fn test_dispose_aborts_tasks() {
        let registry = Registry::new();
        let id = ConnectionId::new(7);
        registry.insert(Connection::new(id, address()));
        let (tx, rx) = tokio::sync::oneshot::channel::<()>();
        let reader = tokio::spawn(async move {
            let _tx = tx;
            tokio::time::sleep(Duration::from_secs(60)).await;
        });
        let worker = tokio::spawn(async {});
        assert!(registry.attach(id, reader, worker));

        let mut connection = registry.remove(id).unwrap();
        connection.dispose();

        // Aborting the reader drops its sender
        assert!(rx.await.is_err());
    }

    #[tokio::test]
    async fn test_attach_after_removal() {
        let registry = Registry::new();
        let id = ConnectionId::new(3);
        registry.insert(Connection::new(id, address()));
        registry.remove(id);

        let reader = tokio::spawn(async { tokio::time::sleep(Duration::from_secs(60)).await });
        let worker = tokio::spawn(async { tokio::time::sleep(Duration::from_secs(60)).await });
        assert!(!registry.attach(id, reader, worker));
    }

    #[test]
    fn test_drain() {
        let registry = Registry::new();
        for i in 0..3 {
            registry.insert(Connection::new(ConnectionId::new(i), address()));
        }
        assert_eq!(registry.len(), 3);
        assert_eq!(
            registry.ids(),
            vec![ConnectionId::new(0), ConnectionId::new(1), ConnectionId::new(2)]
        );

        let mut drained = registry.drain();
        assert!(registry.is_empty());
        assert_eq!(drained.len(), 3);
        assert!(drained.iter_mut().all(|connection| connection.dispose()));
        assert!(drained.iter_mut().all(|connection| !connection.dispose()));
    }
}
