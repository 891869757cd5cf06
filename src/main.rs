#![forbid(unsafe_code)]

//! `endurance-watch`: runs one monitoring session.
//!
//! Loads the session file, starts the local feed server, monitors every
//! enabled stream until the session ends, appends the report, and exits
//! with the verdict's status code.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, ValueEnum};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, EnvFilter};

use endurance_watch::ipc::server::{spawn_feed_server, FeedContext};
use endurance_watch::models::SessionResult;
use endurance_watch::report::{render_summary, JsonlReportWriter, SessionReporter};
use endurance_watch::{AppError, Result, SessionConfig};

#[derive(Debug, Copy, Clone, Eq, PartialEq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Parser)]
#[command(name = "endurance-watch", about = "Feed liveness watchdog session runner", version, long_about = None)]
struct Cli {
    /// Path to the TOML session file.
    #[arg(long)]
    config: PathBuf,

    /// Log output format (text or json).
    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,

    /// Override the session duration in seconds.
    #[arg(long)]
    duration: Option<f64>,

    /// Override the report directory.
    #[arg(long)]
    report_dir: Option<PathBuf>,

    /// Override the feed server socket name.
    #[arg(long)]
    ipc_name: Option<String>,
}

fn main() -> ExitCode {
    let args = Cli::parse();
    if let Err(err) = init_tracing(args.log_format) {
        eprintln!("{err}");
        return ExitCode::FAILURE;
    }
    info!("endurance-watch bootstrap");

    let outcome = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|err| AppError::Config(format!("failed to build tokio runtime: {err}")))
        .and_then(|runtime| runtime.block_on(run(args)));

    match outcome {
        Ok(result) => {
            print!("{}", render_summary(&result));
            if let Some(detail) = &result.hard_timeout {
                eprintln!(
                    "hard timeout: stream {} silent for {} ms",
                    detail.stream_id, detail.silence_ms
                );
            }
            ExitCode::from(u8::try_from(result.exit_code()).unwrap_or(1))
        }
        Err(err) => {
            error!(%err, "session failed to run");
            eprintln!("error: {err}");
            ExitCode::FAILURE
        }
    }
}

async fn run(args: Cli) -> Result<SessionResult> {
    // ── Load configuration ──────────────────────────────
    let mut config = SessionConfig::load_from_path(&args.config)?;
    if let Some(duration) = args.duration {
        if !(duration.is_finite() && duration > 0.0) {
            return Err(AppError::Config(
                "--duration must be greater than zero".into(),
            ));
        }
        config.duration_seconds = Some(duration);
    }
    if let Some(dir) = args.report_dir {
        config.report_dir = dir;
    }
    if let Some(name) = args.ipc_name {
        config.ipc_name = name;
    }
    info!(session_name = %config.session_name, "configuration loaded");

    // ── Build watchers and reporter ─────────────────────
    let mut orchestrator = config.build_orchestrator()?;
    let reporter = JsonlReportWriter::new(config.report_dir.clone())?;

    // ── Start feed server ───────────────────────────────
    let operator_abort = CancellationToken::new();
    let server_ct = CancellationToken::new();
    let ctx = FeedContext {
        session_id: orchestrator.session_id().to_owned(),
        session_name: orchestrator.session_name().to_owned(),
        sink: orchestrator.sink(),
        operator_abort: operator_abort.clone(),
    };
    let server_handle = spawn_feed_server(&config.ipc_name, ctx, server_ct.clone())?;

    // ── Run the session ─────────────────────────────────
    let session = orchestrator.start(config.duration(), operator_abort.clone())?;
    let signal_abort = operator_abort.clone();
    let signal_handle = tokio::spawn(async move {
        tokio::select! {
            () = shutdown_signal() => {
                warn!("shutdown signal received, aborting session");
                signal_abort.cancel();
            }
            () = signal_abort.cancelled() => {}
        }
    });

    let result = session.wait().await;

    // ── Shut down ───────────────────────────────────────
    operator_abort.cancel();
    server_ct.cancel();
    let _ = tokio::join!(server_handle, signal_handle);

    if let Err(err) = reporter.record(&result) {
        error!(%err, "failed to append session report");
        return Err(err);
    }
    info!(
        verdict = ?result.verdict,
        exit_code = result.exit_code(),
        "endurance-watch finished"
    );

    Ok(result)
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = ctrl_c => {}
                    _ = sigterm.recv() => {}
                }
            }
            Err(err) => {
                tracing::warn!(%err, "failed to register SIGTERM handler, using ctrl-c only");
                let _ = ctrl_c.await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        if let Err(err) = ctrl_c.await {
            tracing::error!(%err, "ctrl-c signal handler failed");
        }
    }
}

fn init_tracing(log_format: LogFormat) -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = fmt().with_env_filter(env_filter);

    match log_format {
        LogFormat::Text => subscriber
            .try_init()
            .map_err(|err| AppError::Config(format!("failed to init tracing: {err}")))?,
        LogFormat::Json => subscriber
            .json()
            .try_init()
            .map_err(|err| AppError::Config(format!("failed to init tracing: {err}")))?,
    }

    Ok(())
}
