use std::collections::BTreeMap;

use log::debug;
use serde::{Deserialize, Serialize};

use crate::tx::Transaction;

pub type Address = String;
pub type Amount = u64;

pub const GENESIS_ADDRESS: &str = "GENESIS";
pub const DEFAULT_GENESIS_BALANCE: Amount = 1_000_000_000;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum LedgerError {
    #[error("transfer from {from} to {to} for {amount} tokens rejected: insufficient balance ({available} available)")]
    InsufficientBalance {
        from: Address,
        to: Address,
        amount: Amount,
        available: Amount,
    },
    #[error("transfer from {from} to {to} rejected: amount must be positive")]
    ZeroAmount { from: Address, to: Address },
}

/// The two artefacts written at the end of a run.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct LedgerSnapshot {
    pub balances: BTreeMap<Address, Amount>,
    pub processed: Vec<Transaction>,
}

/// In-memory balance table plus the list of transfers applied to it.
///
/// All mutation goes through [`Ledger::apply_transfer`]; the genesis credit
/// in [`Ledger::with_genesis`] is the only out-of-band assignment.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Ledger {
    balances: BTreeMap<Address, Amount>,
    processed: Vec<Transaction>,
}

impl Ledger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_genesis(address: impl Into<Address>, amount: Amount) -> Self {
        let mut balances = BTreeMap::new();
        balances.insert(address.into(), amount);
        Self {
            balances,
            processed: Vec::new(),
        }
    }

    /// Balance of `address`; unknown addresses read as zero.
    pub fn balance(&self, address: &str) -> Amount {
        self.balances.get(address).copied().unwrap_or(0)
    }

    pub fn apply_transfer(&mut self, tx: &Transaction) -> Result<(), LedgerError> {
        if tx.amount == 0 {
            return Err(LedgerError::ZeroAmount {
                from: tx.from.clone(),
                to: tx.to.clone(),
            });
        }
        let available = self.balance(&tx.from);
        if available < tx.amount {
            return Err(LedgerError::InsufficientBalance {
                from: tx.from.clone(),
                to: tx.to.clone(),
                amount: tx.amount,
                available,
            });
        }

        // sender first so a self-transfer nets out to the same balance
        *self.balances.entry(tx.from.clone()).or_insert(0) -= tx.amount;
        let recipient = self.balances.entry(tx.to.clone()).or_insert(0);
        *recipient = recipient.saturating_add(tx.amount);
        self.processed.push(tx.clone());
        debug!(
            "applied transfer {} -> {} ({} tokens)",
            tx.from, tx.to, tx.amount
        );
        Ok(())
    }

    pub fn total_supply(&self) -> u128 {
        self.balances.values().map(|b| *b as u128).sum()
    }

    pub fn balances(&self) -> &BTreeMap<Address, Amount> {
        &self.balances
    }

    pub fn processed(&self) -> &[Transaction] {
        &self.processed
    }

    pub fn snapshot(&self) -> LedgerSnapshot {
        LedgerSnapshot {
            balances: self.balances.clone(),
            processed: self.processed.clone(),
        }
    }
}
