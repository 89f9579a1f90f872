//! Envoy ext_proc endpoint picker.
//!
//! Envoy calls this service once per HTTP request over a bidirectional gRPC
//! stream. The picker chooses a backend pod round-robin and either names it in
//! a request header or forwards the request body itself and returns the
//! backend's reply.
//!
//! # Architecture Overview
//!
//! ```text
//!                 ┌──────────────────────────────────────────────────────┐
//!                 │                   ENDPOINT PICKER                     │
//!                 │                                                       │
//!   Envoy         │  ┌──────────┐   ┌───────────┐   ┌────────────────┐   │
//!   ext_proc ─────┼─▶│ ext_proc │──▶│ processor │──▶│ load_balancer  │   │
//!   stream        │  │ service  │   │  + state  │   │ pool + cursor  │   │
//!                 │  └──────────┘   └─────┬─────┘   └───────▲────────┘   │
//!                 │                       │                 │ snapshots  │
//!                 │                       ▼                 │            │
//!   Backend  ◀────┼────────────── ┌────────────┐    ┌───────┴────────┐   │
//!   pods          │               │ forwarding │    │   discovery    │◀──┼── Kubernetes
//!                 │               └────────────┘    │   refresher    │   │   API
//!                 │                                 └────────────────┘   │
//!                 │  config · observability · lifecycle                  │
//!                 └──────────────────────────────────────────────────────┘
//! ```

use std::path::PathBuf;

use clap::Parser;

use endpoint_picker::config::validation::validate_config;
use endpoint_picker::config::{load_config, ConfigError};
use endpoint_picker::lifecycle::signals::spawn_signal_handler;
use endpoint_picker::lifecycle::{Picker, Shutdown};
use endpoint_picker::observability::logging;

#[derive(Parser, Debug)]
#[command(name = "endpoint-picker", version, about = "Envoy ext_proc round-robin endpoint picker")]
struct Cli {
    /// Path to a TOML configuration file. Defaults apply when omitted.
    #[arg(short, long, env = "PICKER_CONFIG")]
    config: Option<PathBuf>,

    /// Override listener.bind_address.
    #[arg(long, env = "PICKER_BIND_ADDRESS")]
    bind_address: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let mut config = load_config(cli.config.as_deref())?;
    if let Some(bind_address) = cli.bind_address {
        config.listener.bind_address = bind_address;
        validate_config(&config).map_err(ConfigError::Validation)?;
    }

    logging::init(&config.observability);

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        bind_address = %config.listener.bind_address,
        mode = ?config.discovery.mode,
        label_selector = %config.discovery.label_selector,
        "endpoint-picker starting"
    );

    let picker = Picker::build(config).await?;
    let listener = picker.bind().await?;

    let shutdown = Shutdown::new();
    spawn_signal_handler(shutdown.clone());

    picker.serve(listener, shutdown).await?;
    Ok(())
}
