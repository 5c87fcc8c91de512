use std::sync::Arc;

use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use notify_quota::config::QuotaConfig;
use notify_quota::error::QuotaError;
use notify_quota::notify::{LogNotifier, NotificationService};
use notify_quota::ratelimit::{spawn_sweeper, RateLimiter, RuleTable};

/// Rate-limited notification dispatcher.
///
/// Reads `<recipient> <category> <message...>` lines from stdin and sends
/// each one that is within its category quota.
#[derive(Debug, Parser)]
#[command(version, about)]
struct Cli {
    /// Service configuration file (YAML)
    #[arg(short, long)]
    config: Option<String>,

    /// Rate limit rules file, overriding `rules_path` from the config
    #[arg(short, long)]
    rules: Option<String>,

    /// Seconds between idle key sweeps, overriding the config
    #[arg(long)]
    sweep_interval_secs: Option<u64>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = QuotaConfig::load(cli.config.as_deref())?;
    if let Some(rules) = cli.rules {
        config.rules_path = Some(rules);
    }
    if let Some(secs) = cli.sweep_interval_secs {
        anyhow::ensure!(secs > 0, "--sweep-interval-secs must be positive");
        config.sweep_interval_secs = secs;
    }

    // Initialize tracing
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.log_level));
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(true);
    if config.log_json {
        subscriber.json().init();
    } else {
        subscriber.init();
    }

    info!("Starting notify-quota");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    let rules = match config.rules_path.as_deref() {
        Some(path) => RuleTable::from_file(path)?,
        None => {
            warn!("No rules configured, notifications will not be rate limited");
            RuleTable::default()
        }
    };

    let rate_limiter = Arc::new(RateLimiter::new(rules));
    let sweeper = spawn_sweeper(&rate_limiter, config.sweep_interval());
    info!(
        categories = ?rate_limiter.rules().categories().collect::<Vec<_>>(),
        sweep_interval = ?config.sweep_interval(),
        "Rate limiter initialized"
    );

    let service = NotificationService::new(rate_limiter, LogNotifier);

    tokio::select! {
        result = dispatch_stdin(&service) => result?,
        _ = shutdown_signal() => {}
    }

    sweeper.abort();
    info!("notify-quota stopped");
    Ok(())
}

/// Dispatch notifications read from stdin until EOF.
async fn dispatch_stdin(
    service: &NotificationService<RateLimiter, LogNotifier>,
) -> anyhow::Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        let Some((recipient, category, message)) = parse_line(&line) else {
            warn!(line = %line, "Expected <recipient> <category> <message>");
            continue;
        };

        match service.send(recipient, category, message) {
            Ok(()) => {}
            Err(e @ QuotaError::RateLimitExceeded { .. }) => warn!("{}", e),
            Err(e) => warn!(error = %e, "Failed to send notification"),
        }
    }

    info!("Input closed");
    Ok(())
}

/// Split `<recipient> <category> <message...>`; the message may be empty.
fn parse_line(line: &str) -> Option<(&str, &str, &str)> {
    let (recipient, rest) = line.trim().split_once(char::is_whitespace)?;
    let rest = rest.trim_start();
    let (category, message) = rest.split_once(char::is_whitespace).unwrap_or((rest, ""));
    Some((recipient, category, message.trim()))
}

/// Wait for a shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, initiating graceful shutdown");
        }
        _ = terminate => {
            info!("Received SIGTERM, initiating graceful shutdown");
        }
    }
}
