use anyhow::{bail, Context, Result};
use clap::Parser;
use log::info;

use ledger_bench::peer::{self, PeerConfig, ECHO_PATH};

/// Echo confirmation peer for ledger-bench
#[derive(Parser)]
#[command(name = "ledger-echo-serve", version)]
#[command(about = "Answer POST /echo with the confirmed subset of a transaction batch")]
struct Args {
    /// Listen address
    #[arg(long, default_value = "127.0.0.1:8000")]
    bind: String,

    /// Probability that a single transaction is left unconfirmed (0.0..=1.0)
    #[arg(long, default_value_t = 0.0)]
    drop_rate: f64,

    /// Seed for the drop decisions
    #[arg(long, default_value_t = PeerConfig::default().seed)]
    seed: u64,

    /// Wrap answers as {"method": "POST", "data": [..]}
    #[arg(long)]
    envelope: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();
    if !(0.0..=1.0).contains(&args.drop_rate) {
        bail!("--drop-rate must be within 0.0..=1.0");
    }

    let listener = tokio::net::TcpListener::bind(&args.bind)
        .await
        .with_context(|| format!("bind {}", args.bind))?;
    info!(
        "serving {}{} (drop_rate={}, envelope={})",
        args.bind, ECHO_PATH, args.drop_rate, args.envelope
    );

    peer::serve(
        listener,
        PeerConfig {
            drop_rate: args.drop_rate,
            seed: args.seed,
            envelope: args.envelope,
        },
    )
    .await?;
    Ok(())
}
