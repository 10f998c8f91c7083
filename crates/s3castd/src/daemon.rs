use std::io;

use anyhow::{Context, Result};
use s3cast_core::{RunSummary, Server, ServerConfig};
use s3cast_source::{LocalFsSource, Locator, S3Source, SourceRouter, S3_SCHEMES};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, info_span, warn};

use crate::cli::Cli;
use crate::config_file::{load_or_default, CastConfig};

/// Everything resolved from flags and config before any socket is opened.
pub(crate) struct CastPlan {
    pub(crate) server: ServerConfig,
    pub(crate) locators: Vec<Locator>,
    pub(crate) router: SourceRouter,
}

pub(crate) fn plan(cli: &Cli) -> Result<CastPlan> {
    let mut config = load_or_default(cli.config.as_deref()).with_context(|| {
        format!(
            "failed to load config {}",
            cli.config.as_deref().unwrap_or("<defaults>")
        )
    })?;
    config.apply_cli(cli);
    config.validate()?;
    let server = config.server_config()?;

    let locators = parse_locators(&cli.locators)?;
    let router = build_router(&config, &locators)?;
    for locator in &locators {
        router
            .check(locator)
            .with_context(|| format!("cannot read locator {locator}"))?;
    }

    Ok(CastPlan {
        server,
        locators,
        router,
    })
}

pub async fn run(cli: Cli) -> Result<()> {
    let CastPlan {
        server,
        locators,
        router,
    } = plan(&cli)?;
    info!(
        bind = %server.bind_target(),
        interval_ms = server.pause_interval.as_millis() as u64,
        batch = server.batch_size,
        timestamp = server.timestamp,
        locators = locators.len(),
        "starting s3castd"
    );

    let shutdown = CancellationToken::new();
    let signals = spawn_signal_watcher(shutdown.clone());

    let span = info_span!("cast", port = server.bind_port);
    let result = Server::new(server, router)
        .with_span(span)
        .run(&locators, shutdown.clone())
        .await;

    signals.abort();
    let summary = result.context("streaming stopped")?;
    report(&summary);
    Ok(())
}

fn parse_locators(raw: &[String]) -> Result<Vec<Locator>> {
    raw.iter()
        .map(|value| Locator::parse(value).with_context(|| format!("invalid locator {value}")))
        .collect()
}

fn build_router(config: &CastConfig, locators: &[Locator]) -> Result<SourceRouter> {
    let codec = config.line_codec();
    let mut router = SourceRouter::new()
        .with_fs(LocalFsSource::new(&config.sources.file_root).with_codec(codec.clone()));

    // The S3 client is only built when a locator needs it.
    if locators
        .iter()
        .any(|locator| S3_SCHEMES.contains(&locator.scheme()))
    {
        let s3 = S3Source::new(config.s3_options())
            .context("failed to configure s3 source")?
            .with_codec(codec);
        info!(signed = s3.is_signed(), "s3 source ready");
        router = router.with_s3(s3);
    }
    Ok(router)
}

fn report(summary: &RunSummary) {
    if summary.interrupted {
        info!(lines = summary.lines, "stopped by signal");
    } else {
        info!(
            objects = summary.objects,
            lines = summary.lines,
            "all locators exhausted"
        );
    }
}

fn spawn_signal_watcher(shutdown: CancellationToken) -> JoinHandle<()> {
    tokio::spawn(async move {
        tokio::select! {
            _ = shutdown.cancelled() => {}
            signal = wait_for_signal() => match signal {
                Ok(name) => {
                    info!(signal = name, "received signal, shutting down");
                    shutdown.cancel();
                }
                Err(err) => warn!(error = %err, "failed to listen for shutdown signals"),
            },
        }
    })
}

#[cfg(unix)]
async fn wait_for_signal() -> io::Result<&'static str> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut terminate = signal(SignalKind::terminate())?;
    tokio::select! {
        ctrl = tokio::signal::ctrl_c() => ctrl.map(|()| "SIGINT"),
        _ = terminate.recv() => Ok("SIGTERM"),
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() -> io::Result<&'static str> {
    tokio::signal::ctrl_c().await.map(|()| "ctrl-c")
}
