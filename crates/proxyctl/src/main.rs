// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use clap::Parser;
use tracing::error;

use proxyctl::config::{ControlConfig, LogFormat};

/// Agent credential broker and proxy-assignment control plane.
#[derive(Debug, Parser)]
#[command(name = "proxyctl", version)]
struct Cli {
    #[command(flatten)]
    config: ControlConfig,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing(cli.config.log_format);

    if let Err(e) = proxyctl::run(cli.config).await {
        error!("fatal: {e:#}");
        std::process::exit(1);
    }
}

fn init_tracing(format: LogFormat) {
    use tracing_subscriber::fmt;
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    match format {
        LogFormat::Json => fmt::fmt().with_env_filter(filter).json().init(),
        LogFormat::Text => fmt::fmt().with_env_filter(filter).init(),
    }
}
