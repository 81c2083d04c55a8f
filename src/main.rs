//! Mutually-authenticated TCP reverse proxy.
//!
//! # Architecture Overview
//!
//! ```text
//!                    ┌──────────────────────────────────────────────┐
//!                    │                  TCP PROXY                   │
//!                    │                                              │
//!   TLS client       │  ┌──────────┐   ┌───────────┐   ┌─────────┐ │
//!   ─────────────────┼─▶│   net    │──▶│ security  │──▶│  load   │ │
//!   (user@group CN)  │  │ listener │   │ authz +   │   │balancer │ │
//!                    │  └──────────┘   │ ratelimit │   └────┬────┘ │
//!                    │                 └───────────┘        │      │
//!                    │                                      ▼      │
//!   TLS client       │  ┌──────────┐                  ┌─────────┐  │      Upstream
//!   ◀────────────────┼──│byte pumps│◀────────────────▶│ upstream│◀─┼────▶ (plain TCP)
//!                    │  └──────────┘                  │  dial   │  │
//!                    │                                └─────────┘  │
//!                    │  ┌────────────────────────────────────────┐ │
//!                    │  │ config · lifecycle · observability     │ │
//!                    │  └────────────────────────────────────────┘ │
//!                    └──────────────────────────────────────────────┘
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;

use mtls_proxy::config::loader::load_config;
use mtls_proxy::lifecycle::signals;
use mtls_proxy::observability::{logging, metrics};
use mtls_proxy::proxy::Proxy;

#[derive(Parser)]
#[command(name = "mtls-proxy")]
#[command(about = "Mutually-authenticated TCP reverse proxy", long_about = None)]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(short, long, default_value = "config.toml")]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let (config, observability) = load_config(&cli.config)?;

    logging::init(&format!("mtls_proxy={}", observability.log_level));

    tracing::info!(
        config = %cli.config.display(),
        listen_addr = %config.listener.listen_addr,
        "mtls-proxy starting"
    );

    if observability.metrics_enabled {
        if let Ok(addr) = observability.metrics_address.parse() {
            metrics::init_metrics(addr);
        } else {
            tracing::error!(
                metrics_address = %observability.metrics_address,
                "Failed to parse metrics address"
            );
        }
    }

    let proxy = Arc::new(Proxy::new(config).await?);

    let serve_handle = tokio::spawn({
        let proxy = Arc::clone(&proxy);
        async move { proxy.serve().await }
    });

    signals::wait_for_signal().await;
    tracing::info!("shutting down proxy");

    proxy.close().await?;
    serve_handle.await??;

    tracing::info!("proxy stopped");
    Ok(())
}
