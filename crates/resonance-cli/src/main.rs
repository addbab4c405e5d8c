// SPDX-License-Identifier: GPL-3.0-or-later

//! `resonance`: content-addressed music library organizer. Thin entry point;
//! all wiring lives in `cli`, `pipeline`, and `providers`.

use clap::Parser;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use resonance_cli::cli::{self, Cli};

#[tokio::main(flavor = "multi_thread")]
async fn main() {
    init_tracing();

    let args = Cli::parse();
    if let Err(err) = cli::run(args).await {
        tracing::error!(%err, "resonance exiting");
        eprintln!("error: {err}");
        std::process::exit(err.exit_code());
    }
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry().with(env_filter).with(fmt::layer().with_target(true)).init();
}
