mod broadcaster;
mod config;
mod error;
mod poller;
mod registry;
mod server;

pub use broadcaster::{
    deliver_line, stamp_line, BroadcastStats, DeliveryFailure, DeliveryReport, LineBroadcaster,
    PacingState, StreamEnd,
};
pub use config::{
    ServerConfig, DEFAULT_BACKLOG, DEFAULT_BATCH_SIZE, DEFAULT_HOST, DEFAULT_PAUSE_INTERVAL,
    DEFAULT_PORT,
};
pub use error::ServerError;
pub use poller::{PollReport, ReadinessPoller};
pub use registry::{Client, ClientId, ClientRegistry};
pub use server::{RunSummary, Server};
