use std::{path::PathBuf, process::ExitCode};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use log::info;

use ledger_bench::{
    bench::{BenchmarkReport, Harness},
    config::{BenchConfig, FixedTransfer},
    ledger::Ledger,
    peer::{self, PeerConfig, PeerHandle},
    report::{JsonReportSink, NullSink, ReportSink},
    submit::ConfirmationClient,
    tx::{Signer, TransactionFactory},
    verify::SignatureScheme,
};

const FIXED_RECIPIENT: &str = "B";
const FIXED_AMOUNT: u64 = 10;

/// Transfer-ledger throughput harness
#[derive(Parser)]
#[command(name = "ledger-bench", version)]
#[command(about = "Sign, batch, confirm and apply transfers; report transactions per second")]
struct Cli {
    /// JSON config file; flags below override its values
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Confirmation peer URL
    #[arg(long, global = true)]
    endpoint: Option<String>,

    /// Pre-submission signature check
    #[arg(long, global = true, value_enum)]
    verifier: Option<ledger_bench::config::VerifierKind>,

    /// Hex secret key used to sign generated transfers
    #[arg(long, global = true)]
    sk_hex: Option<String>,

    #[arg(long, global = true)]
    genesis_balance: Option<u64>,

    /// Seed for the transaction factory
    #[arg(long, global = true)]
    seed: Option<u64>,

    #[arg(long, global = true)]
    timeout_ms: Option<u64>,

    /// Where processed_transactions.json and balances.json go
    #[arg(long, global = true)]
    out_dir: Option<PathBuf>,

    /// Skip writing the snapshot files
    #[arg(long, global = true)]
    no_write: bool,

    /// Repeat one fixed transfer (GENESIS -> B, 10 tokens) instead of random ones
    #[arg(long, global = true)]
    fixed: bool,

    /// Start an in-process echo peer and point the client at it
    #[arg(long, global = true)]
    local_peer: bool,

    /// Drop probability for the in-process echo peer
    #[arg(long, global = true, default_value_t = 0.0)]
    peer_drop_rate: f64,

    /// Print the report as JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Push one batch through the pipeline
    Batch {
        #[arg(long)]
        batch_size: Option<usize>,
    },
    /// Submit single transfers until the window closes
    Window {
        #[arg(long)]
        duration_secs: Option<f64>,
    },
    /// Print a fresh key pair as hex
    Keygen {
        #[arg(long, value_enum, default_value = "ecdsa")]
        scheme: SignatureScheme,
    },
    /// Sign a descriptor with --sk-hex
    Sign {
        #[arg(long, value_enum, default_value = "ecdsa")]
        scheme: SignatureScheme,
        #[arg(long)]
        data: String,
    },
}

fn build_config(cli: &Cli) -> Result<BenchConfig> {
    let mut config = match &cli.config {
        Some(path) => BenchConfig::load(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => BenchConfig::default(),
    };
    if let Some(endpoint) = &cli.endpoint {
        config.endpoint = endpoint.clone();
    }
    if let Some(verifier) = cli.verifier {
        config.verifier = verifier;
    }
    if let Some(sk_hex) = &cli.sk_hex {
        config.secret_key_hex = Some(sk_hex.clone());
    }
    if let Some(balance) = cli.genesis_balance {
        config.genesis_balance = balance;
    }
    if cli.seed.is_some() {
        config.seed = cli.seed;
    }
    if let Some(timeout_ms) = cli.timeout_ms {
        config.timeout_ms = timeout_ms;
    }
    if let Some(out_dir) = &cli.out_dir {
        config.out_dir = out_dir.clone();
    }
    if cli.no_write {
        config.write_snapshots = false;
    }
    if cli.fixed && config.fixed_transfer.is_none() {
        config.fixed_transfer = Some(FixedTransfer {
            to: FIXED_RECIPIENT.into(),
            amount: FIXED_AMOUNT,
        });
    }
    match &cli.command {
        Command::Batch {
            batch_size: Some(n),
        } => config.batch_size = *n,
        Command::Window {
            duration_secs: Some(secs),
        } => config.duration_secs = *secs,
        _ => {}
    }
    config.validate()?;
    Ok(config)
}

/// The returned peer handle, if any, must outlive the run.
fn build_harness(cli: &Cli, config: &BenchConfig) -> Result<(Harness, Option<PeerHandle>)> {
    let mut factory = TransactionFactory::new(config.genesis_address.clone(), config.seed);
    if let Some(fixed) = &config.fixed_transfer {
        factory = factory.fixed(fixed.to.clone(), fixed.amount);
    }
    if let Some(scheme) = config.verifier.scheme() {
        let signer = match &config.secret_key_hex {
            Some(sk_hex) => Signer::from_secret_hex(scheme, sk_hex)?,
            None => Signer::generate(scheme),
        };
        info!("signing with {:?} key {}", scheme, signer.public_key_hex());
        factory = factory.with_signer(signer);
    }

    let local_peer = if cli.local_peer {
        if !(0.0..=1.0).contains(&cli.peer_drop_rate) {
            bail!("--peer-drop-rate must be within 0.0..=1.0");
        }
        let handle = peer::spawn(PeerConfig {
            drop_rate: cli.peer_drop_rate,
            ..PeerConfig::default()
        })?;
        info!("local echo peer listening on {}", handle.addr());
        Some(handle)
    } else {
        None
    };
    let endpoint = match &local_peer {
        Some(handle) => handle.endpoint(),
        None => config.endpoint.clone(),
    };
    let client = ConfirmationClient::new(endpoint, config.timeout())?;
    info!("submitting to {}", client.endpoint());

    let sink: Box<dyn ReportSink> = if config.write_snapshots {
        Box::new(JsonReportSink::new(config.out_dir.clone()))
    } else {
        Box::new(NullSink)
    };

    let ledger = Ledger::with_genesis(config.genesis_address.clone(), config.genesis_balance);
    let harness = Harness::new(
        ledger,
        factory,
        config.verifier.build(),
        Box::new(client),
        sink,
    )
    .batch_size(config.batch_size);
    Ok((harness, local_peer))
}

fn print_report(report: &BenchmarkReport, as_json: bool) -> Result<()> {
    if as_json {
        println!("{}", serde_json::to_string_pretty(report)?);
    } else {
        println!(
            "Processed {} transactions in {:.2} seconds.",
            report.transactions_processed, report.elapsed_seconds
        );
        println!("Transactions per second: {:.2}", report.throughput);
    }
    Ok(())
}

fn run(cli: Cli) -> Result<()> {
    match &cli.command {
        Command::Keygen { scheme } => {
            let signer = Signer::generate(*scheme);
            println!("secret_key_hex: {}", signer.secret_key_hex());
            println!("public_key_hex: {}", signer.public_key_hex());
        }
        Command::Sign { scheme, data } => {
            let Some(sk_hex) = &cli.sk_hex else {
                bail!("sign needs --sk-hex");
            };
            let signer = Signer::from_secret_hex(*scheme, sk_hex)?;
            println!("signature_hex:  {}", signer.sign(data));
            println!("public_key_hex: {}", signer.public_key_hex());
        }
        Command::Batch { .. } => {
            let config = build_config(&cli)?;
            let (mut harness, _peer) = build_harness(&cli, &config)?;
            print_report(&harness.run_batch(), cli.json)?;
        }
        Command::Window { .. } => {
            let config = build_config(&cli)?;
            let (mut harness, _peer) = build_harness(&cli, &config)?;
            let window = config.duration()?;
            print_report(&harness.run_window(window), cli.json)?;
        }
    }
    Ok(())
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    match run(Cli::parse()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {err:#}");
            ExitCode::FAILURE
        }
    }
}
