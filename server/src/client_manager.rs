//! Registry of connected clients for the arena server
//!
//! This module tracks every TCP connection that completed (or is completing)
//! the JOIN handshake:
//! - Player id assignment, unique for the lifetime of the process
//! - Capacity enforcement
//! - Per-connection lifecycle state
//! - The outbound frame queue used by the broadcaster
//!
//! The registry is shared between connection tasks and the broadcaster
//! behind a `tokio::sync::RwLock`; it never holds game state.

use log::{debug, info, warn};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc;

/// An encoded, length-prefixed-ready message shared by all recipients
pub type Frame = Arc<[u8]>;

/// Lifecycle of a single client connection
///
/// ```text
/// Connecting -> Joined -> Leaving -> Disconnected
///      \           \____________________^
///       \_______________________________^
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Registered, JOIN_ACK not yet delivered
    Connecting,
    /// Receives STATE broadcasts
    Joined,
    /// Sent LEAVE, waiting for teardown
    Leaving,
    Disconnected,
}

impl ConnectionState {
    pub fn can_transition_to(self, next: ConnectionState) -> bool {
        use ConnectionState::*;
        matches!(
            (self, next),
            (Connecting, Joined)
                | (Connecting, Disconnected)
                | (Joined, Leaving)
                | (Joined, Disconnected)
                | (Leaving, Disconnected)
        )
    }
}

/// A registered client and its outbound queue
#[derive(Debug)]
pub struct Client {
    /// Player id, also used as the id of the player entity
    pub id: u32,
    /// Remote address, for logging
    pub addr: SocketAddr,
    pub state: ConnectionState,
    pub connected_at: Instant,
    outbox: mpsc::Sender<Frame>,
}

impl Client {
    pub fn new(id: u32, addr: SocketAddr, outbox: mpsc::Sender<Frame>) -> Self {
        Self {
            id,
            addr,
            state: ConnectionState::Connecting,
            connected_at: Instant::now(),
            outbox,
        }
    }
}

/// Manages all registered clients
///
/// Ids start at 1 and are never reused, so a late message about a departed
/// player can never be confused with a newcomer.
pub struct ClientManager {
    /// Registered clients indexed by player id
    clients: HashMap<u32, Client>,
    /// Next id handed out by `add_client`
    next_client_id: u32,
    /// Maximum number of concurrent clients allowed
    max_clients: usize,
}

impl ClientManager {
    pub fn new(max_clients: usize) -> Self {
        Self {
            clients: HashMap::new(),
            next_client_id: 1,
            max_clients,
        }
    }

    /// Registers a new client in the `Connecting` state
    ///
    /// Returns the assigned id, or None if the server is at capacity.
    pub fn add_client(&mut self, addr: SocketAddr, outbox: mpsc::Sender<Frame>) -> Option<u32> {
        if self.clients.len() >= self.max_clients {
            warn!(
                "Rejecting {}: server full ({} clients)",
                addr, self.max_clients
            );
            return None;
        }

        let client_id = self.next_client_id;
        self.next_client_id += 1;

        info!("Client {} registered from {}", client_id, addr);
        self.clients
            .insert(client_id, Client::new(client_id, addr, outbox));

        Some(client_id)
    }

    /// Removes a client from the registry
    ///
    /// Returns the removed client marked `Disconnected`, or None if it was
    /// already gone. Dropping the returned client drops its outbox sender,
    /// which ends the connection's write loop.
    pub fn remove_client(&mut self, client_id: u32) -> Option<Client> {
        let mut client = self.clients.remove(&client_id)?;
        client.state = ConnectionState::Disconnected;
        info!(
            "Client {} ({}) unregistered after {:.1}s",
            client_id,
            client.addr,
            client.connected_at.elapsed().as_secs_f32()
        );
        Some(client)
    }

    /// Moves a client to `next` if the transition is allowed
    pub fn set_state(&mut self, client_id: u32, next: ConnectionState) -> bool {
        match self.clients.get_mut(&client_id) {
            Some(client) if client.state.can_transition_to(next) => {
                debug!("Client {}: {:?} -> {:?}", client_id, client.state, next);
                client.state = next;
                true
            }
            _ => false,
        }
    }

    pub fn get(&self, client_id: u32) -> Option<&Client> {
        self.clients.get(&client_id)
    }

    /// Outbound queues of the given ids that are currently `Joined`
    pub fn joined_outboxes<'a, I>(&self, ids: I) -> Vec<(u32, mpsc::Sender<Frame>)>
    where
        I: IntoIterator<Item = &'a u32>,
    {
        ids.into_iter()
            .filter_map(|id| self.clients.get(id))
            .filter(|client| client.state == ConnectionState::Joined)
            .map(|client| (client.id, client.outbox.clone()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc::error::TrySendError;

    fn test_addr() -> SocketAddr {
        "127.0.0.1:8080".parse().unwrap()
    }

    fn outbox() -> (mpsc::Sender<Frame>, mpsc::Receiver<Frame>) {
        mpsc::channel(4)
    }

    #[test]
    fn test_client_manager_creation() {
        let manager = ClientManager::new(5);
        assert_eq!(manager.max_clients, 5);
        assert!(manager.is_empty());
        assert_eq!(manager.len(), 0);
    }

    #[test]
    fn test_ids_are_sequential_and_never_reused() {
        let mut manager = ClientManager::new(3);
        let (tx, _rx) = outbox();

        let first = manager.add_client(test_addr(), tx.clone()).unwrap();
        let second = manager.add_client(test_addr(), tx.clone()).unwrap();
        assert_eq!((first, second), (1, 2));

        manager.remove_client(first);
        let third = manager.add_client(test_addr(), tx).unwrap();
        assert_eq!(third, 3);
    }

    #[test]
    fn test_add_client_max_capacity() {
        let mut manager = ClientManager::new(1);
        let (tx, _rx) = outbox();

        assert!(manager.add_client(test_addr(), tx.clone()).is_some());
        assert!(manager.add_client(test_addr(), tx.clone()).is_none());
        assert_eq!(manager.len(), 1);

        manager.remove_client(1);
        assert!(manager.add_client(test_addr(), tx).is_some());
    }

    #[test]
    fn test_remove_client_is_idempotent() {
        let mut manager = ClientManager::new(2);
        let (tx, _rx) = outbox();
        let id = manager.add_client(test_addr(), tx).unwrap();

        let removed = manager.remove_client(id).unwrap();
        assert_eq!(removed.state, ConnectionState::Disconnected);
        assert!(manager.remove_client(id).is_none());
        assert!(manager.is_empty());
    }

    #[test]
    fn test_state_transitions() {
        use ConnectionState::*;

        assert!(Connecting.can_transition_to(Joined));
        assert!(Joined.can_transition_to(Leaving));
        assert!(Leaving.can_transition_to(Disconnected));
        assert!(!Joined.can_transition_to(Connecting));
        assert!(!Disconnected.can_transition_to(Joined));
        assert!(!Leaving.can_transition_to(Joined));

        let mut manager = ClientManager::new(2);
        let (tx, _rx) = outbox();
        let id = manager.add_client(test_addr(), tx).unwrap();

        assert_eq!(manager.get(id).map(|c| c.state), Some(Connecting));
        assert!(manager.set_state(id, Joined));
        assert!(!manager.set_state(id, Connecting));
        assert_eq!(manager.get(id).map(|c| c.state), Some(Joined));
        assert!(!manager.set_state(99, Joined));
    }

    #[test]
    fn test_joined_outboxes_filters_state_and_ids() {
        let mut manager = ClientManager::new(4);
        let (tx, _rx) = outbox();
        let a = manager.add_client(test_addr(), tx.clone()).unwrap();
        let b = manager.add_client(test_addr(), tx.clone()).unwrap();
        let c = manager.add_client(test_addr(), tx).unwrap();
        manager.set_state(a, ConnectionState::Joined);
        manager.set_state(c, ConnectionState::Joined);

        let ids: Vec<u32> = manager
            .joined_outboxes(&[a, b])
            .into_iter()
            .map(|(id, _)| id)
            .collect();
        assert_eq!(ids, vec![a]);

        let all: Vec<u32> = manager
            .joined_outboxes(&[a, b, c])
            .into_iter()
            .map(|(id, _)| id)
            .collect();
        assert_eq!(all, vec![a, c]);
    }

    #[test]
    fn test_outbox_reports_full_and_closed() {
        let mut manager = ClientManager::new(1);
        let (tx, rx) = mpsc::channel(1);
        let id = manager.add_client(test_addr(), tx).unwrap();
        manager.set_state(id, ConnectionState::Joined);

        let (_, outbox) = manager.joined_outboxes(&[id]).pop().unwrap();
        let frame: Frame = Arc::from(&b"{}"[..]);

        assert!(outbox.try_send(frame.clone()).is_ok());
        assert!(matches!(
            outbox.try_send(frame.clone()),
            Err(TrySendError::Full(_))
        ));

        drop(rx);
        assert!(matches!(
            outbox.try_send(frame),
            Err(TrySendError::Closed(_))
        ));
    }
}
