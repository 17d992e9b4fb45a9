//! `skew-doctor`: diagnostic entry point for the Skew interceptor.
//!
//! 1. **Wire observability**: `tracing-subscriber` with a JSON layer on
//!    stderr and, when `OTEL_EXPORTER_OTLP_ENDPOINT` is set, an OTLP span
//!    exporter.
//! 2. **Resolve configuration** from the `SKEW_*` environment variables,
//!    exactly as `interceptor::wrap` would. A configuration error exits
//!    non-zero.
//! 3. **Check** proxy health (only when routing is enabled) and fetch the
//!    control-plane policy.
//! 4. **Print** the redacted snapshot and check results as JSON on stdout.

mod checks;
mod observability;
mod report;

use anyhow::Context;
use domain::{ConfigResolver, WrapOptions};
use tracing::warn;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let provider = observability::init().context("tracing could not be initialised")?;

    let outcome = run().await;

    if let Some(provider) = provider {
        if let Err(e) = provider.shutdown() {
            warn!(error = %e, "span exporter did not shut down cleanly");
        }
    }
    outcome
}

async fn run() -> anyhow::Result<()> {
    let config = ConfigResolver::from_env()
        .resolve(&WrapOptions::new())
        .context("configuration could not be resolved")?;

    let http = reqwest::Client::builder()
        .build()
        .context("HTTP client could not be initialised")?;

    let report = checks::run(config, http).await;
    println!("{}", serde_json::to_string_pretty(&report.to_json())?);
    Ok(())
}
