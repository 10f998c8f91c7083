use std::time::Duration;

pub const DEFAULT_HOST: &str = "0.0.0.0";
pub const DEFAULT_PORT: u16 = 9977;
pub const DEFAULT_PAUSE_INTERVAL: Duration = Duration::from_secs(1);
pub const DEFAULT_BATCH_SIZE: usize = 5;
pub const DEFAULT_BACKLOG: u32 = 5;

/// Settings fixed for the lifetime of one server run.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ServerConfig {
    pub bind_host: String,
    /// `0` binds an ephemeral port.
    pub bind_port: u16,
    pub pause_interval: Duration,
    /// Lines sent before a pause; the pause fires once the count exceeds this value.
    pub batch_size: usize,
    pub timestamp: bool,
    pub backlog: u32,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_host: DEFAULT_HOST.to_string(),
            bind_port: DEFAULT_PORT,
            pause_interval: DEFAULT_PAUSE_INTERVAL,
            batch_size: DEFAULT_BATCH_SIZE,
            timestamp: false,
            backlog: DEFAULT_BACKLOG,
        }
    }
}

impl ServerConfig {
    /// `host:port`, bracketing IPv6 literals.
    pub fn bind_target(&self) -> String {
        let host = self.bind_host.trim();
        if host.contains(':') && !host.starts_with('[') {
            format!("[{host}]:{}", self.bind_port)
        } else {
            format!("{host}:{}", self.bind_port)
        }
    }
}
