use std::{fs, path::Path, path::PathBuf, time::Duration};

use serde::{Deserialize, Serialize};

use crate::error::BenchError;
use crate::ledger::{Address, Amount, DEFAULT_GENESIS_BALANCE, GENESIS_ADDRESS};
use crate::submit::DEFAULT_ENDPOINT;
use crate::tx::DEFAULT_BATCH_SIZE;
use crate::verify::{EcdsaVerifier, Ed25519Verifier, SignatureScheme, StubVerifier, Verifier};

const DEFAULT_TIMEOUT_MS: u64 = 10_000;
const DEFAULT_DURATION_SECS: f64 = 1.0;

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Default, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum VerifierKind {
    #[default]
    Stub,
    Ecdsa,
    Ed25519,
}

impl VerifierKind {
    pub fn scheme(self) -> Option<SignatureScheme> {
        match self {
            VerifierKind::Stub => None,
            VerifierKind::Ecdsa => Some(SignatureScheme::Ecdsa),
            VerifierKind::Ed25519 => Some(SignatureScheme::Ed25519),
        }
    }

    pub fn build(self) -> Box<dyn Verifier> {
        match self {
            VerifierKind::Stub => Box::new(StubVerifier),
            VerifierKind::Ecdsa => Box::new(EcdsaVerifier),
            VerifierKind::Ed25519 => Box::new(Ed25519Verifier),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct FixedTransfer {
    pub to: Address,
    pub amount: Amount,
}

/// Run settings. Every field has a default, so a config file only needs to
/// name what it changes.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct BenchConfig {
    pub endpoint: String,
    pub timeout_ms: u64,
    pub batch_size: usize,
    pub duration_secs: f64,
    pub verifier: VerifierKind,
    /// Hex secret used to sign generated transactions. A fresh key is
    /// generated when the verifier needs one and this is unset.
    pub secret_key_hex: Option<String>,
    pub genesis_address: Address,
    pub genesis_balance: Amount,
    pub seed: Option<u64>,
    pub fixed_transfer: Option<FixedTransfer>,
    pub out_dir: PathBuf,
    pub write_snapshots: bool,
}

impl Default for BenchConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            timeout_ms: DEFAULT_TIMEOUT_MS,
            batch_size: DEFAULT_BATCH_SIZE,
            duration_secs: DEFAULT_DURATION_SECS,
            verifier: VerifierKind::Stub,
            secret_key_hex: None,
            genesis_address: GENESIS_ADDRESS.to_string(),
            genesis_balance: DEFAULT_GENESIS_BALANCE,
            seed: None,
            fixed_transfer: None,
            out_dir: PathBuf::from("."),
            write_snapshots: true,
        }
    }
}

impl BenchConfig {
    pub fn load(path: &Path) -> Result<Self, BenchError> {
        let bytes = fs::read(path)?;
        let config: BenchConfig = serde_json::from_slice(&bytes)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), BenchError> {
        if self.batch_size == 0 {
            return Err(BenchError::Config("batch_size must be > 0".into()));
        }
        if !self.duration_secs.is_finite() || self.duration_secs <= 0.0 {
            return Err(BenchError::Config("duration_secs must be > 0".into()));
        }
        self.duration()?;
        if self.timeout_ms == 0 {
            return Err(BenchError::Config("timeout_ms must be > 0".into()));
        }
        if self.genesis_address.is_empty() {
            return Err(BenchError::Config("genesis_address must not be empty".into()));
        }
        if let Some(fixed) = &self.fixed_transfer {
            if fixed.amount == 0 {
                return Err(BenchError::Config("fixed_transfer.amount must be > 0".into()));
            }
        }
        if self.secret_key_hex.is_some() && self.verifier == VerifierKind::Stub {
            return Err(BenchError::Config(
                "secret_key_hex needs a signing verifier (ecdsa or ed25519)".into(),
            ));
        }
        Ok(())
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn duration(&self) -> Result<Duration, BenchError> {
        Duration::try_from_secs_f64(self.duration_secs).map_err(|err| {
            BenchError::Config(format!("duration_secs {}: {err}", self.duration_secs))
        })
    }
}
