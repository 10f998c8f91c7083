use std::io;
use std::net::SocketAddr;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use bytes::{BufMut, Bytes, BytesMut};
use futures_util::{Stream, StreamExt};
use s3cast_source::SourceError;
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::{ClientId, ClientRegistry, ReadinessPoller, ServerConfig};

/// Lines sent since the last pacing pause.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PacingState {
    batch_size: usize,
    sent_since_pause: usize,
}

impl PacingState {
    pub fn new(batch_size: usize) -> Self {
        Self {
            batch_size,
            sent_since_pause: 0,
        }
    }

    /// Counts one sent line; returns `true` when a pause is due, resetting the counter.
    pub fn record_line(&mut self) -> bool {
        self.sent_since_pause += 1;
        if self.sent_since_pause > self.batch_size {
            self.sent_since_pause = 0;
            return true;
        }
        false
    }

    pub fn sent_since_pause(&self) -> usize {
        self.sent_since_pause
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BroadcastStats {
    pub lines: u64,
    pub deliveries: u64,
    pub failed_deliveries: u64,
    pub accepted: u64,
    pub evicted: u64,
    pub pauses: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamEnd {
    Exhausted,
    Interrupted,
}

#[derive(Debug, Default)]
pub struct DeliveryReport {
    pub delivered: usize,
    pub failed: Vec<DeliveryFailure>,
}

#[derive(Debug)]
pub struct DeliveryFailure {
    pub client: ClientId,
    pub peer: SocketAddr,
    pub error: io::Error,
}

/// Sends `line` to every registered client, evicting those whose send fails.
pub async fn deliver_line<S>(registry: &mut ClientRegistry<S>, line: &[u8]) -> DeliveryReport
where
    S: AsyncWrite + Unpin,
{
    let mut report = DeliveryReport::default();
    for id in registry.ids() {
        let Some(client) = registry.get_mut(id) else {
            continue;
        };

        match client.conn_mut().write_all(line).await {
            Ok(()) => report.delivered += 1,
            Err(error) => {
                let peer = client.peer();
                info!(client = %id, %peer, error = %error, "dropping client after send failure");
                registry.remove(id);
                report.failed.push(DeliveryFailure {
                    client: id,
                    peer,
                    error,
                });
            }
        }
    }
    report
}

/// `<RFC 3339 UTC timestamp>\t<line>`.
pub fn stamp_line(line: &[u8], at: SystemTime) -> Bytes {
    let stamp = format_timestamp(at);
    let mut out = BytesMut::with_capacity(stamp.len() + 1 + line.len());
    out.put_slice(stamp.as_bytes());
    out.put_u8(b'\t');
    out.put_slice(line);
    out.freeze()
}

fn format_timestamp(ts: SystemTime) -> String {
    let duration = ts
        .duration_since(UNIX_EPOCH)
        .unwrap_or_else(|_| Duration::from_secs(0));
    let nanos = duration.as_nanos() as i128;
    OffsetDateTime::from_unix_timestamp_nanos(nanos)
        .ok()
        .and_then(|odt| odt.format(&Rfc3339).ok())
        .unwrap_or_else(|| "1970-01-01T00:00:00Z".to_string())
}

/// Moves lines from a source stream to the client registry under pacing control.
pub struct LineBroadcaster {
    pause_interval: Duration,
    timestamp: bool,
    pacing: PacingState,
    poller: ReadinessPoller,
    stats: BroadcastStats,
}

impl LineBroadcaster {
    pub fn new(config: &ServerConfig) -> Self {
        Self {
            pause_interval: config.pause_interval,
            timestamp: config.timestamp,
            pacing: PacingState::new(config.batch_size),
            poller: ReadinessPoller::new(),
            stats: BroadcastStats::default(),
        }
    }

    pub fn stats(&self) -> BroadcastStats {
        self.stats
    }

    pub fn pacing(&self) -> &PacingState {
        &self.pacing
    }

    pub async fn poll_clients(&mut self, listener: &TcpListener, registry: &mut ClientRegistry) {
        let report = self.poller.poll(listener, registry).await;
        if report.accepted.is_some() {
            self.stats.accepted += 1;
        }
        self.stats.evicted += report.evicted.len() as u64;
    }

    /// Broadcasts every line of `lines`; a source read error aborts with that error.
    ///
    /// Cancellation is observed between lines, while waiting on the source, and
    /// during the pacing pause; a line already being sent is finished first.
    pub async fn stream_lines<L>(
        &mut self,
        lines: &mut L,
        listener: &TcpListener,
        registry: &mut ClientRegistry,
        shutdown: &CancellationToken,
    ) -> Result<StreamEnd, SourceError>
    where
        L: Stream<Item = Result<Bytes, SourceError>> + Unpin,
    {
        self.poll_clients(listener, registry).await;

        loop {
            let next = tokio::select! {
                biased;
                _ = shutdown.cancelled() => return Ok(StreamEnd::Interrupted),
                next = lines.next() => next,
            };
            let Some(line) = next else {
                return Ok(StreamEnd::Exhausted);
            };

            self.broadcast(line?, registry).await;

            if self.pacing.record_line() {
                self.stats.pauses += 1;
                if !self.pause(shutdown).await {
                    return Ok(StreamEnd::Interrupted);
                }
            }

            self.poll_clients(listener, registry).await;
        }
    }

    async fn broadcast<S>(&mut self, line: Bytes, registry: &mut ClientRegistry<S>)
    where
        S: AsyncWrite + Unpin,
    {
        let payload = if self.timestamp {
            stamp_line(&line, SystemTime::now())
        } else {
            line
        };

        let report = deliver_line(registry, &payload).await;
        self.stats.lines += 1;
        self.stats.deliveries += report.delivered as u64;
        self.stats.failed_deliveries += report.failed.len() as u64;
        self.stats.evicted += report.failed.len() as u64;
    }

    /// Returns `false` when shutdown interrupted the pause.
    async fn pause(&self, shutdown: &CancellationToken) -> bool {
        if self.pause_interval.is_zero() {
            return true;
        }

        debug!(
            interval_ms = self.pause_interval.as_millis() as u64,
            "batch complete, pausing"
        );
        tokio::select! {
            _ = shutdown.cancelled() => false,
            _ = tokio::time::sleep(self.pause_interval) => true,
        }
    }
}
