use std::fmt;
use std::net::SocketAddr;
use std::time::Instant;

use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ClientId(u64);

impl ClientId {
    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

pub struct Client<S = TcpStream> {
    id: ClientId,
    peer: SocketAddr,
    connected_at: Instant,
    conn: S,
}

impl<S> Client<S> {
    pub fn id(&self) -> ClientId {
        self.id
    }

    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    pub fn connected_at(&self) -> Instant {
        self.connected_at
    }

    pub fn conn(&self) -> &S {
        &self.conn
    }

    pub fn conn_mut(&mut self) -> &mut S {
        &mut self.conn
    }

    pub fn into_conn(self) -> S {
        self.conn
    }
}

impl<S> fmt::Debug for Client<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Client")
            .field("id", &self.id)
            .field("peer", &self.peer)
            .finish_non_exhaustive()
    }
}

/// Connected clients in accept order.
///
/// Delivery iterates over [`ClientRegistry::ids`], a snapshot, so clients can be
/// removed mid-pass.
pub struct ClientRegistry<S = TcpStream> {
    clients: Vec<Client<S>>,
    next_id: u64,
}

impl<S> Default for ClientRegistry<S> {
    fn default() -> Self {
        Self {
            clients: Vec::new(),
            next_id: 1,
        }
    }
}

impl<S> ClientRegistry<S> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, conn: S, peer: SocketAddr) -> ClientId {
        let id = ClientId(self.next_id);
        self.next_id = self.next_id.wrapping_add(1);
        self.clients.push(Client {
            id,
            peer,
            connected_at: Instant::now(),
            conn,
        });
        id
    }

    pub fn remove(&mut self, id: ClientId) -> Option<Client<S>> {
        let index = self.clients.iter().position(|client| client.id == id)?;
        Some(self.clients.remove(index))
    }

    pub fn contains(&self, id: ClientId) -> bool {
        self.clients.iter().any(|client| client.id == id)
    }

    pub fn get(&self, id: ClientId) -> Option<&Client<S>> {
        self.clients.iter().find(|client| client.id == id)
    }

    pub fn get_mut(&mut self, id: ClientId) -> Option<&mut Client<S>> {
        self.clients.iter_mut().find(|client| client.id == id)
    }

    pub fn ids(&self) -> Vec<ClientId> {
        self.clients.iter().map(|client| client.id).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Client<S>> {
        self.clients.iter()
    }

    pub fn len(&self) -> usize {
        self.clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }

    pub fn drain(&mut self) -> Vec<Client<S>> {
        std::mem::take(&mut self.clients)
    }
}

impl<S: AsyncWrite + Unpin> ClientRegistry<S> {
    /// Shuts down and drops every remaining client; returns how many there were.
    pub async fn close_all(&mut self) -> usize {
        let clients = self.drain();
        let count = clients.len();
        for mut client in clients {
            if let Err(err) = client.conn.shutdown().await {
                debug!(client = %client.id, peer = %client.peer, error = %err, "client shutdown failed");
            }
        }
        count
    }
}
