use std::io;

use futures_util::FutureExt;
use tokio::net::TcpListener;
use tracing::{info, trace, warn};

use crate::{ClientId, ClientRegistry};

const SCRATCH_BYTES: usize = 4096;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PollReport {
    pub accepted: Option<ClientId>,
    pub evicted: Vec<ClientId>,
}

/// Zero-timeout readiness pass over the listener and all registered clients.
pub struct ReadinessPoller {
    scratch: Vec<u8>,
}

impl Default for ReadinessPoller {
    fn default() -> Self {
        Self {
            scratch: vec![0; SCRATCH_BYTES],
        }
    }
}

impl ReadinessPoller {
    pub fn new() -> Self {
        Self::default()
    }

    /// Accepts at most one pending connection and evicts clients whose peer went away.
    ///
    /// Never waits on I/O: the only suspension is a cooperative yield that lets the
    /// runtime's I/O driver publish fresh readiness before the non-blocking attempts.
    pub async fn poll(&mut self, listener: &TcpListener, registry: &mut ClientRegistry) -> PollReport {
        tokio::task::yield_now().await;

        let mut report = PollReport::default();
        match listener.accept().now_or_never() {
            Some(Ok((stream, peer))) => {
                let id = registry.add(stream, peer);
                info!(client = %id, %peer, clients = registry.len(), "accepting client connection");
                report.accepted = Some(id);
            }
            Some(Err(err)) => {
                warn!(error = %err, "accept failed");
            }
            None => {}
        }

        for id in registry.ids() {
            let Some(client) = registry.get(id) else {
                continue;
            };
            let peer = client.peer();

            match client.conn().try_read(&mut self.scratch) {
                Ok(0) => {
                    info!(client = %id, %peer, "closing client connection");
                    registry.remove(id);
                    report.evicted.push(id);
                }
                Ok(read) => {
                    trace!(client = %id, bytes = read, "discarding client input");
                }
                Err(err)
                    if matches!(
                        err.kind(),
                        io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted
                    ) => {}
                Err(err) => {
                    info!(client = %id, %peer, error = %err, "dropping client after read error");
                    registry.remove(id);
                    report.evicted.push(id);
                }
            }
        }

        report
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tokio::io::AsyncWriteExt;
    use tokio::net::TcpStream;

    use super::*;

    async fn poll_until<F>(
        poller: &mut ReadinessPoller,
        listener: &TcpListener,
        registry: &mut ClientRegistry,
        mut done: F,
    ) -> bool
    where
        F: FnMut(&ClientRegistry) -> bool,
    {
        for _ in 0..200 {
            poller.poll(listener, registry).await;
            if done(registry) {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        false
    }

    #[tokio::test]
    async fn poll_returns_immediately_when_idle() {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let mut registry = ClientRegistry::new();
        let mut poller = ReadinessPoller::new();

        let report = tokio::time::timeout(
            Duration::from_millis(500),
            poller.poll(&listener, &mut registry),
        )
        .await
        .expect("poll must not block");
        assert_eq!(report, PollReport::default());
    }

    #[tokio::test]
    async fn poll_accepts_one_connection_per_call() {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("addr");
        let _first = TcpStream::connect(addr).await.expect("connect first");
        let _second = TcpStream::connect(addr).await.expect("connect second");

        let mut registry = ClientRegistry::new();
        let mut poller = ReadinessPoller::new();
        let mut max_growth = 0;
        for _ in 0..200 {
            let before = registry.len();
            poller.poll(&listener, &mut registry).await;
            max_growth = max_growth.max(registry.len() - before);
            if registry.len() == 2 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }

        assert_eq!(registry.len(), 2);
        assert_eq!(max_growth, 1);
    }

    #[tokio::test]
    async fn peer_close_evicts_client() {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("addr");
        let client = TcpStream::connect(addr).await.expect("connect");

        let mut registry = ClientRegistry::new();
        let mut poller = ReadinessPoller::new();
        assert!(poll_until(&mut poller, &listener, &mut registry, |r| r.len() == 1).await);

        drop(client);
        assert!(poll_until(&mut poller, &listener, &mut registry, |r| r.is_empty()).await);
    }

    #[tokio::test]
    async fn client_input_is_discarded_without_eviction() {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("addr");
        let mut client = TcpStream::connect(addr).await.expect("connect");

        let mut registry = ClientRegistry::new();
        let mut poller = ReadinessPoller::new();
        assert!(poll_until(&mut poller, &listener, &mut registry, |r| r.len() == 1).await);

        client.write_all(b"ignored input\n").await.expect("write");
        for _ in 0..10 {
            let report = poller.poll(&listener, &mut registry).await;
            assert!(report.evicted.is_empty());
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert_eq!(registry.len(), 1);
    }
}
