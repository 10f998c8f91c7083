use std::fs;
use std::path::Path;
use std::time::Duration;

use s3cast_core::{
    ServerConfig, DEFAULT_BACKLOG, DEFAULT_BATCH_SIZE, DEFAULT_HOST, DEFAULT_PORT,
};
use s3cast_source::{LineCodec, S3Options};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::cli::Cli;

pub const DEFAULT_INTERVAL: &str = "1s";
pub const DEFAULT_FILE_ROOT: &str = ".";
pub const DEFAULT_MAX_LINE_BYTES: usize = 1024 * 1024;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config: {0}")]
    Read(std::io::Error),
    #[error("failed to parse config: {0}")]
    Parse(toml::de::Error),
    #[error("config validation failed: {0}")]
    Validation(String),
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct CastConfig {
    pub server: ServerSection,
    pub sources: SourcesSection,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct ServerSection {
    pub host: String,
    pub port: u16,
    pub interval: String,
    pub batch: usize,
    pub timestamp: bool,
    pub backlog: u32,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            interval: DEFAULT_INTERVAL.to_string(),
            batch: DEFAULT_BATCH_SIZE,
            timestamp: false,
            backlog: DEFAULT_BACKLOG,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct SourcesSection {
    pub file_root: String,
    /// Zero disables the limit.
    pub max_line_bytes: usize,
    pub s3: S3Section,
}

impl Default for SourcesSection {
    fn default() -> Self {
        Self {
            file_root: DEFAULT_FILE_ROOT.to_string(),
            max_line_bytes: DEFAULT_MAX_LINE_BYTES,
            s3: S3Section::default(),
        }
    }
}

/// Empty strings defer to the `AWS_*` environment.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct S3Section {
    pub region: String,
    pub endpoint: String,
    pub path_style: bool,
}

/// Plain seconds (`2`, `0.25`) or a humantime duration (`250ms`, `1m 30s`).
pub fn parse_interval(raw: &str) -> Result<Duration, String> {
    let trimmed = raw.trim();
    if let Ok(seconds) = trimmed.parse::<f64>() {
        if !seconds.is_finite() || seconds < 0.0 {
            return Err(format!("interval must be a non-negative duration: {raw}"));
        }
        return Duration::try_from_secs_f64(seconds)
            .map_err(|err| format!("invalid interval {raw}: {err}"));
    }
    humantime::parse_duration(trimmed).map_err(|err| format!("invalid interval {raw}: {err}"))
}

pub fn load(path: impl AsRef<Path>) -> Result<CastConfig, ConfigError> {
    let raw = fs::read_to_string(path.as_ref()).map_err(ConfigError::Read)?;
    let mut cfg: CastConfig = toml::from_str(&raw).map_err(ConfigError::Parse)?;
    cfg.normalize();
    cfg.validate()?;
    Ok(cfg)
}

/// Loads `path` when given, otherwise the built-in defaults.
pub fn load_or_default(path: Option<&str>) -> Result<CastConfig, ConfigError> {
    match path {
        Some(path) => load(path),
        None => Ok(CastConfig::default()),
    }
}

impl CastConfig {
    pub fn normalize(&mut self) {
        self.server.host = self.server.host.trim().to_string();
        if self.server.host.is_empty() {
            self.server.host = DEFAULT_HOST.to_string();
        }
        self.server.interval = self.server.interval.trim().to_string();
        if self.server.interval.is_empty() {
            self.server.interval = DEFAULT_INTERVAL.to_string();
        }
        if self.sources.file_root.trim().is_empty() {
            self.sources.file_root = DEFAULT_FILE_ROOT.to_string();
        }
        self.sources.s3.region = self.sources.s3.region.trim().to_string();
        self.sources.s3.endpoint = self.sources.s3.endpoint.trim().to_string();
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server.host.trim().is_empty() {
            return Err(ConfigError::Validation(
                "server.host must not be empty".to_string(),
            ));
        }
        if self.server.backlog == 0 {
            return Err(ConfigError::Validation(
                "server.backlog must be > 0".to_string(),
            ));
        }
        self.pause_interval()?;
        Ok(())
    }

    /// Command-line flags take precedence over file values.
    pub fn apply_cli(&mut self, cli: &Cli) {
        if let Some(host) = &cli.host {
            self.server.host = host.clone();
        }
        if let Some(port) = cli.port {
            self.server.port = port;
        }
        if let Some(interval) = cli.interval {
            self.server.interval = humantime::format_duration(interval).to_string();
        }
        if let Some(batch) = cli.batch {
            self.server.batch = batch;
        }
        if cli.timestamp {
            self.server.timestamp = true;
        }
        if let Some(backlog) = cli.backlog {
            self.server.backlog = backlog;
        }
        if let Some(root) = &cli.file_root {
            self.sources.file_root = root.clone();
        }
        if let Some(max) = cli.max_line_bytes {
            self.sources.max_line_bytes = max;
        }
        if let Some(region) = &cli.s3_region {
            self.sources.s3.region = region.clone();
        }
        if let Some(endpoint) = &cli.s3_endpoint {
            self.sources.s3.endpoint = endpoint.clone();
        }
        if cli.s3_path_style {
            self.sources.s3.path_style = true;
        }
    }

    pub fn pause_interval(&self) -> Result<Duration, ConfigError> {
        parse_interval(&self.server.interval)
            .map_err(|err| ConfigError::Validation(format!("server.interval: {err}")))
    }

    pub fn server_config(&self) -> Result<ServerConfig, ConfigError> {
        Ok(ServerConfig {
            bind_host: self.server.host.clone(),
            bind_port: self.server.port,
            pause_interval: self.pause_interval()?,
            batch_size: self.server.batch,
            timestamp: self.server.timestamp,
            backlog: self.server.backlog,
        })
    }

    pub fn line_codec(&self) -> LineCodec {
        match self.sources.max_line_bytes {
            0 => LineCodec::new(),
            max => LineCodec::with_max_length(max),
        }
    }

    pub fn s3_options(&self) -> S3Options {
        let mut options = S3Options::from_env();
        let s3 = &self.sources.s3;
        if !s3.region.is_empty() {
            options.region = s3.region.clone();
        }
        if !s3.endpoint.is_empty() {
            options.endpoint = Some(s3.endpoint.clone());
        }
        options.path_style = s3.path_style;
        options
    }
}
