use std::io;
use std::net::SocketAddr;

use s3cast_source::{Locator, ObjectSource};
use tokio::net::{TcpListener, TcpSocket};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, info_span, Instrument, Span};

use crate::{BroadcastStats, ClientRegistry, LineBroadcaster, ServerConfig, ServerError, StreamEnd};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub objects: u64,
    pub lines: u64,
    pub deliveries: u64,
    pub failed_deliveries: u64,
    pub accepted: u64,
    pub evicted: u64,
    pub pauses: u64,
    pub interrupted: bool,
}

impl RunSummary {
    fn new(objects: u64, stats: BroadcastStats, interrupted: bool) -> Self {
        Self {
            objects,
            lines: stats.lines,
            deliveries: stats.deliveries,
            failed_deliveries: stats.failed_deliveries,
            accepted: stats.accepted,
            evicted: stats.evicted,
            pauses: stats.pauses,
            interrupted,
        }
    }
}

struct Progress {
    objects: u64,
    end: StreamEnd,
}

/// Owns the listening socket and drives locators through the broadcaster.
pub struct Server<S> {
    config: ServerConfig,
    source: S,
    span: Span,
}

impl<S: ObjectSource> Server<S> {
    pub fn new(config: ServerConfig, source: S) -> Self {
        Self {
            config,
            source,
            span: info_span!("server"),
        }
    }

    /// Emits all events of the run inside `span`.
    pub fn with_span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub async fn bind(&self) -> Result<TcpListener, ServerError> {
        let target = self.config.bind_target();
        let addrs: Vec<SocketAddr> = tokio::net::lookup_host(&target)
            .await
            .map_err(|source| ServerError::Resolve {
                target: target.clone(),
                source,
            })?
            .collect();

        let mut last_error = None;
        for addr in addrs {
            match bind_listener(addr, self.config.backlog) {
                Ok(listener) => {
                    let local = listener.local_addr().unwrap_or(addr);
                    info!(parent: &self.span, addr = %local, backlog = self.config.backlog, "listening");
                    return Ok(listener);
                }
                Err(source) => last_error = Some((addr, source)),
            }
        }

        Err(match last_error {
            Some((addr, source)) => ServerError::Bind {
                addr: addr.to_string(),
                source,
            },
            None => ServerError::Resolve {
                target,
                source: io::Error::new(io::ErrorKind::AddrNotAvailable, "no addresses resolved"),
            },
        })
    }

    /// Binds, then streams every locator in order. See [`Server::serve`].
    pub async fn run(
        &self,
        locators: &[Locator],
        shutdown: CancellationToken,
    ) -> Result<RunSummary, ServerError> {
        let listener = self.bind().await?;
        self.serve(listener, locators, shutdown).await
    }

    /// Streams every locator through `listener`'s clients.
    ///
    /// The listener and all client connections are closed before this returns,
    /// whether the run completed, failed, or was interrupted via `shutdown`.
    pub async fn serve(
        &self,
        listener: TcpListener,
        locators: &[Locator],
        shutdown: CancellationToken,
    ) -> Result<RunSummary, ServerError> {
        async move {
            let mut registry = ClientRegistry::new();
            let mut broadcaster = LineBroadcaster::new(&self.config);

            let outcome = self
                .stream_locators(&listener, &mut registry, &mut broadcaster, locators, &shutdown)
                .await;

            let closed = registry.close_all().await;
            drop(listener);
            info!(clients = closed, "listening socket closed");

            let progress = outcome?;
            let summary = RunSummary::new(
                progress.objects,
                broadcaster.stats(),
                progress.end == StreamEnd::Interrupted,
            );
            info!(
                objects = summary.objects,
                lines = summary.lines,
                deliveries = summary.deliveries,
                accepted = summary.accepted,
                evicted = summary.evicted,
                pauses = summary.pauses,
                interrupted = summary.interrupted,
                "run finished"
            );
            Ok(summary)
        }
        .instrument(self.span.clone())
        .await
    }

    async fn stream_locators(
        &self,
        listener: &TcpListener,
        registry: &mut ClientRegistry,
        broadcaster: &mut LineBroadcaster,
        locators: &[Locator],
        shutdown: &CancellationToken,
    ) -> Result<Progress, ServerError> {
        let mut objects_read = 0u64;
        let interrupted = |objects| Progress {
            objects,
            end: StreamEnd::Interrupted,
        };

        for locator in locators {
            info!(
                locator = %locator,
                bucket = locator.bucket(),
                prefix = locator.prefix(),
                "processing locator"
            );
            let objects = tokio::select! {
                biased;
                _ = shutdown.cancelled() => return Ok(interrupted(objects_read)),
                listed = self.source.list_objects(locator) => listed?,
            };
            debug!(locator = %locator, objects = objects.len(), "locator resolved");

            for object in objects {
                info!(object = %object, "reading object");
                let mut lines = tokio::select! {
                    biased;
                    _ = shutdown.cancelled() => return Ok(interrupted(objects_read)),
                    opened = self.source.open(&object) => opened?,
                };
                objects_read += 1;

                let end = broadcaster
                    .stream_lines(&mut lines, listener, registry, shutdown)
                    .await?;
                debug!(object = %object, lines = lines.lines_read(), "object finished");
                if end == StreamEnd::Interrupted {
                    info!("shutdown requested, stopping before next line");
                    return Ok(interrupted(objects_read));
                }
            }
        }

        Ok(Progress {
            objects: objects_read,
            end: StreamEnd::Exhausted,
        })
    }
}

fn bind_listener(addr: SocketAddr, backlog: u32) -> io::Result<TcpListener> {
    let socket = if addr.is_ipv4() {
        TcpSocket::new_v4()?
    } else {
        TcpSocket::new_v6()?
    };
    socket.set_reuseaddr(true)?;
    socket.bind(addr)?;
    socket.listen(backlog.max(1))
}

#[cfg(test)]
mod tests;
