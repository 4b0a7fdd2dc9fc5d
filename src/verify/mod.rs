use log::debug;
use p256::ecdsa::signature::hazmat::PrehashVerifier as _;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::tx::Transaction;

/// SHA-256 of the human-readable descriptor; this is what gets signed.
pub fn digest(data: &str) -> [u8; 32] {
    Sha256::digest(data.as_bytes()).into()
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum SignatureScheme {
    Ecdsa,
    Ed25519,
}

/// Pre-submission authenticity check.
///
/// Implementations must be pure: the same inputs always give the same
/// verdict, and malformed credentials are a `false`, never a panic.
pub trait Verifier {
    fn verify(&self, data: &str, signature: Option<&str>, public_key: Option<&str>) -> bool;

    fn name(&self) -> &'static str;

    fn verify_transaction(&self, tx: &Transaction) -> bool {
        self.verify(&tx.data, tx.signature.as_deref(), tx.public_key.as_deref())
    }
}

/// Accepts everything. Used to measure the pipeline without crypto cost.
#[derive(Clone, Copy, Debug, Default)]
pub struct StubVerifier;

impl Verifier for StubVerifier {
    fn verify(&self, _data: &str, _signature: Option<&str>, _public_key: Option<&str>) -> bool {
        true
    }

    fn name(&self) -> &'static str {
        "stub"
    }
}

/// ECDSA over NIST P-256.
///
/// * public key: hex SEC1 point, `04 || X || Y` (compressed `02/03 || X` also
///   decodes)
/// * signature: hex `r || s`, each a 32-byte big-endian scalar
#[derive(Clone, Copy, Debug, Default)]
pub struct EcdsaVerifier;

impl EcdsaVerifier {
    fn check(data: &str, signature: &str, public_key: &str) -> Result<(), &'static str> {
        let pk_bytes = hex::decode(public_key).map_err(|_| "public key is not hex")?;
        let key = p256::ecdsa::VerifyingKey::from_sec1_bytes(&pk_bytes)
            .map_err(|_| "public key is not a P-256 point")?;
        let sig_bytes = hex::decode(signature).map_err(|_| "signature is not hex")?;
        let sig = p256::ecdsa::Signature::from_slice(&sig_bytes)
            .map_err(|_| "signature is not 64 bytes of non-zero r || s")?;
        key.verify_prehash(&digest(data), &sig)
            .map_err(|_| "signature does not match")
    }
}

impl Verifier for EcdsaVerifier {
    fn verify(&self, data: &str, signature: Option<&str>, public_key: Option<&str>) -> bool {
        let (Some(signature), Some(public_key)) = (signature, public_key) else {
            debug!("ecdsa: missing credentials for {data:?}");
            return false;
        };
        match Self::check(data, signature, public_key) {
            Ok(()) => true,
            Err(reason) => {
                debug!("ecdsa: {reason} for {data:?}");
                false
            }
        }
    }

    fn name(&self) -> &'static str {
        "ecdsa-p256"
    }
}

/// Ed25519 (strict) over the same SHA-256 digest.
#[derive(Clone, Copy, Debug, Default)]
pub struct Ed25519Verifier;

impl Ed25519Verifier {
    fn check(data: &str, signature: &str, public_key: &str) -> Result<(), &'static str> {
        let pk_bytes = hex::decode(public_key).map_err(|_| "public key is not hex")?;
        let pk: [u8; 32] = pk_bytes
            .as_slice()
            .try_into()
            .map_err(|_| "public key is not 32 bytes")?;
        let key = ed25519_dalek::VerifyingKey::from_bytes(&pk)
            .map_err(|_| "public key is not a curve point")?;
        let sig_bytes = hex::decode(signature).map_err(|_| "signature is not hex")?;
        let sig = ed25519_dalek::Signature::from_slice(&sig_bytes)
            .map_err(|_| "signature is not 64 bytes")?;
        key.verify_strict(&digest(data), &sig)
            .map_err(|_| "signature does not match")
    }
}

impl Verifier for Ed25519Verifier {
    fn verify(&self, data: &str, signature: Option<&str>, public_key: Option<&str>) -> bool {
        let (Some(signature), Some(public_key)) = (signature, public_key) else {
            debug!("ed25519: missing credentials for {data:?}");
            return false;
        };
        match Self::check(data, signature, public_key) {
            Ok(()) => true,
            Err(reason) => {
                debug!("ed25519: {reason} for {data:?}");
                false
            }
        }
    }

    fn name(&self) -> &'static str {
        "ed25519"
    }
}
