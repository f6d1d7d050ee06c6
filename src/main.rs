//! Usage relay.
//!
//! Reads newline-delimited JSON notifications from the file named on the
//! command line (or stdin), relays them as one batch and prints the
//! delivery results as JSON.

use anyhow::{Context, Result};
use tokio::io::BufReader;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use usage_relay::{build_handler, read_batch, relay_batch, Config};

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::load()?;
    init_tracing(&config.rust_log)?;

    info!(queue = config.queue.as_deref().unwrap_or("-"), "configuration loaded");

    let mut batch = match std::env::args().nth(1) {
        Some(path) => {
            let file = tokio::fs::File::open(&path)
                .await
                .with_context(|| format!("Failed to open {path}"))?;
            read_batch(BufReader::new(file)).await?
        },
        None => read_batch(BufReader::new(tokio::io::stdin())).await?,
    };

    let cancellation = CancellationToken::new();
    tokio::spawn(cancel_on_shutdown(cancellation.clone()));

    let handler = build_handler(&config, cancellation)?;
    let results = relay_batch(&handler, &mut batch).await;

    let output = serde_json::to_string_pretty(&results).context("Failed to encode results")?;
    println!("{output}");
    Ok(())
}

/// Installs the fmt subscriber; `RUST_LOG` wins over the configured filter.
fn init_tracing(default_filter: &str) -> Result<()> {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_filter))
        .context("Invalid log filter")?;

    let fmt_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_file(true)
        .with_line_number(true);

    tracing_subscriber::registry().with(filter).with(fmt_layer).init();
    Ok(())
}

/// Cancels pending retry waits on Ctrl-C or SIGTERM.
async fn cancel_on_shutdown(token: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            },
            Err(e) => {
                warn!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            },
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => info!("received Ctrl-C, cancelling pending retries"),
        () = terminate => info!("received SIGTERM, cancelling pending retries"),
    }
    token.cancel();
}
