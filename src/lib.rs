//! Throughput harness for a toy value-transfer ledger.
//!
//! A run generates signed transfers, checks them locally, submits them in
//! batches to a confirmation peer over HTTP and applies only what the peer
//! confirms to an in-memory ledger:
//!
//! * [`tx`] — the wire transaction, bounded batches, the candidate factory
//!   and signing keys.
//! * [`verify`] — the pluggable signature check (stub, ECDSA P-256, Ed25519).
//! * [`ledger`] — balances with conservation and all-or-nothing transfers.
//! * [`submit`] — the blocking confirmation client.
//! * [`bench`] — batch and time-window drivers plus the throughput report.
//! * [`report`] — snapshot sinks for the processed list and balance table.
//! * [`peer`] — a local echo peer for offline runs and tests.

pub mod bench;
pub mod config;
pub mod ledger;
pub mod peer;
pub mod report;
pub mod submit;
pub mod tx;
pub mod verify;

mod error;

pub use error::{BenchError, SubmitError};
