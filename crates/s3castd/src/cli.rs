use std::time::Duration;

#[cfg(test)]
use anyhow::{anyhow, Result};
use clap::Parser;

use crate::config_file::parse_interval;

#[derive(Parser, Debug, Clone)]
#[command(
    name = "s3castd",
    about = "Stream lines from object storage to TCP clients",
    long_about = "Reads every object under each locator line by line and sends each line to all \
                  connected TCP clients, pausing after every batch. Clients that connect late \
                  only see lines sent after they joined."
)]
pub struct Cli {
    #[arg(long, help = "Path to s3cast.toml config file")]
    pub config: Option<String>,
    #[arg(short = 'H', long, help = "Bind host (default: 0.0.0.0)")]
    pub host: Option<String>,
    #[arg(short = 'P', long, help = "Bind port, 0 for ephemeral (default: 9977)")]
    pub port: Option<u16>,
    #[arg(
        short = 'I',
        long,
        value_parser = parse_interval,
        help = "Pause after each batch, seconds or duration like 250ms (default: 1s)"
    )]
    pub interval: Option<Duration>,
    #[arg(short = 'B', long, help = "Lines per batch before pausing (default: 5)")]
    pub batch: Option<usize>,
    #[arg(
        short = 'T',
        long,
        default_value_t = false,
        help = "Prefix each line with an RFC 3339 timestamp and a tab"
    )]
    pub timestamp: bool,
    #[arg(long, help = "Listen backlog (default: 5)")]
    pub backlog: Option<u32>,
    #[arg(long = "file-root", help = "Root directory for file:// buckets")]
    pub file_root: Option<String>,
    #[arg(
        long = "max-line-bytes",
        help = "Longest accepted source line in bytes, 0 for unlimited"
    )]
    pub max_line_bytes: Option<usize>,
    #[arg(long = "s3-region", help = "S3 region override")]
    pub s3_region: Option<String>,
    #[arg(long = "s3-endpoint", help = "S3-compatible endpoint URL")]
    pub s3_endpoint: Option<String>,
    #[arg(
        long = "s3-path-style",
        default_value_t = false,
        help = "Address buckets as URL path segments instead of host names"
    )]
    pub s3_path_style: bool,
    #[arg(
        value_name = "LOCATOR",
        required = true,
        num_args = 1..,
        help = "Object locators like s3://bucket/prefix or file://bucket/prefix"
    )]
    pub locators: Vec<String>,
}

pub fn parse_cli() -> Cli {
    Cli::parse()
}

#[cfg(test)]
pub(crate) fn parse_cli_from<I, T>(args: I) -> Result<Cli>
where
    I: IntoIterator<Item = T>,
    T: Into<String>,
{
    let args = args.into_iter().map(Into::into).collect::<Vec<String>>();
    Cli::try_parse_from(args).map_err(|err| anyhow!(err.to_string()))
}
