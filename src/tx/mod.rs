use ed25519_dalek::Signer as _;
use p256::ecdsa::signature::DigestSigner as _;
use rand::{rngs::OsRng, rngs::StdRng, Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::BenchError;
use crate::ledger::{Address, Amount};
use crate::verify::{digest, SignatureScheme};

pub const DEFAULT_BATCH_SIZE: usize = 100;
const ADDRESS_LEN: usize = 5;
const MAX_RANDOM_AMOUNT: Amount = 100;

/// A transfer as it travels on the wire. Field names match the confirmation
/// peer's schema; credentials are only sent when present.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct Transaction {
    pub data: String,
    pub from: Address,
    pub to: Address,
    pub amount: Amount,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signature: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub public_key: Option<String>,
}

impl Transaction {
    /// Unsigned transfer with the canonical human-readable descriptor.
    pub fn transfer(from: impl Into<Address>, to: impl Into<Address>, amount: Amount) -> Self {
        let from = from.into();
        let to = to.into();
        Self {
            data: describe(&from, &to, amount),
            from,
            to,
            amount,
            signature: None,
            public_key: None,
        }
    }

    pub fn signed_by(mut self, signer: &Signer) -> Self {
        self.signature = Some(signer.sign(&self.data));
        self.public_key = Some(signer.public_key_hex().to_string());
        self
    }
}

pub fn describe(from: &str, to: &str, amount: Amount) -> String {
    format!("Transfer {amount} tokens from {from} to {to}")
}

/// Ordered group of transactions sent in one round trip.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Batch {
    max_size: usize,
    txs: Vec<Transaction>,
}

impl Batch {
    pub fn with_capacity(max_size: usize) -> Self {
        Self {
            max_size,
            txs: Vec::with_capacity(max_size),
        }
    }

    pub fn single(tx: Transaction) -> Self {
        Self {
            max_size: 1,
            txs: vec![tx],
        }
    }

    /// Hands the transaction back when the batch is already full.
    pub fn push(&mut self, tx: Transaction) -> Result<(), Transaction> {
        if self.is_full() {
            return Err(tx);
        }
        self.txs.push(tx);
        Ok(())
    }

    pub fn is_full(&self) -> bool {
        self.txs.len() >= self.max_size
    }

    pub fn len(&self) -> usize {
        self.txs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.txs.is_empty()
    }

    pub fn transactions(&self) -> &[Transaction] {
        &self.txs
    }
}

enum SigningKey {
    Ecdsa(p256::ecdsa::SigningKey),
    Ed25519(ed25519_dalek::SigningKey),
}

/// Produces credentials the matching verifier accepts.
///
/// ECDSA signatures are `r || s` (32-byte big-endian each) and public keys
/// are uncompressed SEC1 points `04 || X || Y`; Ed25519 uses its native
/// 64-byte signature and 32-byte key. Everything is hex on the wire, and
/// both schemes sign the SHA-256 digest of the descriptor.
pub struct Signer {
    key: SigningKey,
    public_key_hex: String,
}

impl Signer {
    pub fn generate(scheme: SignatureScheme) -> Self {
        match scheme {
            SignatureScheme::Ecdsa => Self::from_ecdsa(p256::ecdsa::SigningKey::random(&mut OsRng)),
            SignatureScheme::Ed25519 => {
                Self::from_ed25519(ed25519_dalek::SigningKey::generate(&mut OsRng))
            }
        }
    }

    pub fn from_secret_hex(scheme: SignatureScheme, sk_hex: &str) -> Result<Self, BenchError> {
        let bytes = hex::decode(sk_hex.trim())
            .map_err(|e| BenchError::KeyMaterial(format!("secret key hex: {e}")))?;
        match scheme {
            SignatureScheme::Ecdsa => {
                let key = p256::ecdsa::SigningKey::from_slice(&bytes).map_err(|_| {
                    BenchError::KeyMaterial("secret key is not a valid P-256 scalar".into())
                })?;
                Ok(Self::from_ecdsa(key))
            }
            SignatureScheme::Ed25519 => {
                let arr: [u8; 32] = bytes.as_slice().try_into().map_err(|_| {
                    BenchError::KeyMaterial(format!(
                        "ed25519 secret key must be 32 bytes, got {}",
                        bytes.len()
                    ))
                })?;
                Ok(Self::from_ed25519(ed25519_dalek::SigningKey::from_bytes(&arr)))
            }
        }
    }

    fn from_ecdsa(key: p256::ecdsa::SigningKey) -> Self {
        let point = key.verifying_key().to_encoded_point(false);
        Self {
            public_key_hex: hex::encode(point.as_bytes()),
            key: SigningKey::Ecdsa(key),
        }
    }

    fn from_ed25519(key: ed25519_dalek::SigningKey) -> Self {
        Self {
            public_key_hex: hex::encode(key.verifying_key().as_bytes()),
            key: SigningKey::Ed25519(key),
        }
    }

    pub fn scheme(&self) -> SignatureScheme {
        match self.key {
            SigningKey::Ecdsa(_) => SignatureScheme::Ecdsa,
            SigningKey::Ed25519(_) => SignatureScheme::Ed25519,
        }
    }

    pub fn public_key_hex(&self) -> &str {
        &self.public_key_hex
    }

    pub fn secret_key_hex(&self) -> String {
        match &self.key {
            SigningKey::Ecdsa(key) => hex::encode(key.to_bytes()),
            SigningKey::Ed25519(key) => hex::encode(key.to_bytes()),
        }
    }

    /// Hex signature over the SHA-256 digest of `data`.
    pub fn sign(&self, data: &str) -> String {
        match &self.key {
            SigningKey::Ecdsa(key) => {
                let sig: p256::ecdsa::Signature =
                    key.sign_digest(Sha256::new_with_prefix(data.as_bytes()));
                hex::encode(sig.to_bytes())
            }
            SigningKey::Ed25519(key) => hex::encode(key.sign(&digest(data)).to_bytes()),
        }
    }
}

/// Builds candidate transfers for the harness: random five-letter
/// recipients with amounts in `1..=100`, or one fixed transfer repeated.
pub struct TransactionFactory {
    rng: StdRng,
    sender: Address,
    fixed: Option<(Address, Amount)>,
    signer: Option<Signer>,
}

impl TransactionFactory {
    pub fn new(sender: impl Into<Address>, seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self {
            rng,
            sender: sender.into(),
            fixed: None,
            signer: None,
        }
    }

    pub fn with_signer(mut self, signer: Signer) -> Self {
        self.signer = Some(signer);
        self
    }

    /// Always emit the same transfer instead of random ones.
    pub fn fixed(mut self, to: impl Into<Address>, amount: Amount) -> Self {
        self.fixed = Some((to.into(), amount));
        self
    }

    pub fn sender(&self) -> &str {
        &self.sender
    }

    pub fn next_transaction(&mut self) -> Transaction {
        let (to, amount) = match &self.fixed {
            Some((to, amount)) => (to.clone(), *amount),
            None => (
                self.random_address(),
                self.rng.gen_range(1..=MAX_RANDOM_AMOUNT),
            ),
        };
        let tx = Transaction::transfer(self.sender.clone(), to, amount);
        match &self.signer {
            Some(signer) => tx.signed_by(signer),
            None => tx,
        }
    }

    fn random_address(&mut self) -> Address {
        (0..ADDRESS_LEN)
            .map(|_| self.rng.gen_range(b'A'..=b'Z') as char)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_format_uses_peer_field_names() {
        let tx = Transaction::transfer("A", "B", 10);
        let json = serde_json::to_value(&tx).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "data": "Transfer 10 tokens from A to B",
                "from": "A",
                "to": "B",
                "amount": 10
            })
        );
    }

    #[test]
    fn batch_refuses_past_capacity() {
        let mut batch = Batch::with_capacity(2);
        batch.push(Transaction::transfer("A", "B", 1)).unwrap();
        batch.push(Transaction::transfer("A", "C", 2)).unwrap();
        let rejected = batch.push(Transaction::transfer("A", "D", 3)).unwrap_err();
        assert_eq!(rejected.to, "D");
        assert_eq!(batch.len(), 2);
        assert!(batch.is_full());
    }

    #[test]
    fn factory_generates_in_range_transfers_from_sender() {
        let mut factory = TransactionFactory::new("GENESIS", Some(7));
        for _ in 0..200 {
            let tx = factory.next_transaction();
            assert_eq!(tx.from, "GENESIS");
            assert_eq!(tx.to.len(), ADDRESS_LEN);
            assert!(tx.to.chars().all(|c| c.is_ascii_uppercase()));
            assert!((1..=MAX_RANDOM_AMOUNT).contains(&tx.amount));
            assert_eq!(tx.data, describe(&tx.from, &tx.to, tx.amount));
            assert!(tx.signature.is_none());
        }
    }

    #[test]
    fn seeded_factories_agree() {
        let mut a = TransactionFactory::new("GENESIS", Some(42));
        let mut b = TransactionFactory::new("GENESIS", Some(42));
        for _ in 0..10 {
            assert_eq!(a.next_transaction(), b.next_transaction());
        }
    }

    #[test]
    fn fixed_factory_attaches_credentials() {
        let signer = Signer::generate(SignatureScheme::Ecdsa);
        let pk = signer.public_key_hex().to_string();
        let mut factory = TransactionFactory::new("GENESIS", None)
            .fixed("B", 10)
            .with_signer(signer);
        let tx = factory.next_transaction();
        assert_eq!(tx.data, "Transfer 10 tokens from GENESIS to B");
        assert_eq!(tx.public_key.as_deref(), Some(pk.as_str()));
        assert_eq!(tx.signature.as_ref().map(|s| s.len()), Some(128));
        assert_eq!(pk.len(), 130);
        assert!(pk.starts_with("04"));
    }

    #[test]
    fn secret_key_hex_round_trips_through_signer() {
        for scheme in [SignatureScheme::Ecdsa, SignatureScheme::Ed25519] {
            let signer = Signer::generate(scheme);
            let restored = Signer::from_secret_hex(scheme, &signer.secret_key_hex()).unwrap();
            assert_eq!(restored.public_key_hex(), signer.public_key_hex());
            assert_eq!(restored.scheme(), scheme);
        }
        assert!(Signer::from_secret_hex(SignatureScheme::Ed25519, "abcd").is_err());
        assert!(Signer::from_secret_hex(SignatureScheme::Ecdsa, "zz").is_err());
    }
}
