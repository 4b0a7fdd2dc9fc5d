use std::{collections::HashMap, time::Duration};

use log::{debug, warn};
use serde::Deserialize;

use crate::error::SubmitError;
use crate::tx::{Batch, Transaction};

pub const DEFAULT_ENDPOINT: &str = "http://127.0.0.1:8000/echo";

/// One request/response exchange with the confirmation peer.
///
/// `Ok` carries exactly the transactions the peer attests to; any failure
/// means nothing from the batch was confirmed.
pub trait Submitter {
    fn submit(&self, batch: &Batch) -> Result<Vec<Transaction>, SubmitError>;
}

/// Accepted response shapes: a bare array, or the `{"method": .., "data": [..]}`
/// envelope some echo peers wrap their answer in.
#[derive(Deserialize)]
#[serde(untagged)]
enum ConfirmationBody {
    Bare(Vec<Transaction>),
    Envelope { data: Vec<Transaction> },
}

pub fn decode_confirmation(body: &[u8]) -> Result<Vec<Transaction>, SubmitError> {
    let body: ConfirmationBody = serde_json::from_slice(body).map_err(SubmitError::Decode)?;
    Ok(match body {
        ConfirmationBody::Bare(txs) => txs,
        ConfirmationBody::Envelope { data } => data,
    })
}

/// How many of `sent` the peer left out of `confirmed` (multiset difference).
pub fn unconfirmed_count(sent: &[Transaction], confirmed: &[Transaction]) -> usize {
    let mut outstanding: HashMap<&Transaction, usize> = HashMap::new();
    for tx in sent {
        *outstanding.entry(tx).or_default() += 1;
    }
    for tx in confirmed {
        match outstanding.get_mut(tx) {
            Some(n) if *n > 0 => *n -= 1,
            _ => debug!("peer confirmed a transaction that was not submitted: {}", tx.data),
        }
    }
    outstanding.values().sum()
}

/// A peer answer split against the batch that was sent.
#[derive(Debug, Default, PartialEq)]
pub struct Reconciled {
    /// Confirmed entries that match a submitted transaction, in answer order.
    pub matched: Vec<Transaction>,
    /// Confirmed entries that were never submitted (or confirmed too often).
    pub unsolicited: Vec<Transaction>,
    /// Submitted transactions the peer left out.
    pub unconfirmed: usize,
}

/// Match `confirmed` against `sent` as multisets. Only `matched` entries may
/// be applied.
pub fn reconcile(sent: &[Transaction], confirmed: Vec<Transaction>) -> Reconciled {
    let mut outstanding: HashMap<&Transaction, usize> = HashMap::new();
    for tx in sent {
        *outstanding.entry(tx).or_default() += 1;
    }
    let mut reconciled = Reconciled::default();
    for tx in confirmed {
        match outstanding.get_mut(&tx) {
            Some(n) if *n > 0 => {
                *n -= 1;
                reconciled.matched.push(tx);
            }
            _ => reconciled.unsolicited.push(tx),
        }
    }
    reconciled.unconfirmed = outstanding.values().sum();
    reconciled
}

/// Blocking HTTP client for the confirmation peer: POST a JSON array, read a
/// JSON array back.
pub struct ConfirmationClient {
    http: reqwest::blocking::Client,
    endpoint: String,
}

impl ConfirmationClient {
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Result<Self, SubmitError> {
        let http = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .build()?;
        Ok(Self {
            http,
            endpoint: endpoint.into(),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

impl Submitter for ConfirmationClient {
    fn submit(&self, batch: &Batch) -> Result<Vec<Transaction>, SubmitError> {
        if batch.is_empty() {
            return Ok(Vec::new());
        }
        let payload = serde_json::to_vec(batch.transactions()).map_err(SubmitError::Encode)?;
        let response = self
            .http
            .post(&self.endpoint)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .body(payload)
            .send()?;

        let status = response.status();
        if !status.is_success() {
            return Err(SubmitError::Status {
                status: status.as_u16(),
            });
        }
        let body = response.bytes()?;
        let confirmed = decode_confirmation(&body)?;

        let dropped = unconfirmed_count(batch.transactions(), &confirmed);
        if dropped > 0 {
            warn!(
                "peer confirmed {} of {} transactions ({} unconfirmed)",
                confirmed.len(),
                batch.len(),
                dropped
            );
        } else {
            debug!("peer confirmed all {} transactions", batch.len());
        }
        Ok(confirmed)
    }
}
