use thiserror::Error;

/// Failure of one confirmation round trip. Every variant means the whole
/// batch counts as unconfirmed; nothing from it reaches the ledger.
#[derive(Debug, Error)]
pub enum SubmitError {
    /// Connection refused, timeout, or the body could not be read.
    #[error("transport failure: {0}")]
    Transport(#[from] reqwest::Error),

    /// The peer answered with a non-2xx status.
    #[error("peer answered {status}")]
    Status { status: u16 },

    /// The response was not a transaction array.
    #[error("undecodable confirmation: {0}")]
    Decode(#[source] serde_json::Error),

    /// The outgoing batch could not be serialised.
    #[error("unable to encode batch: {0}")]
    Encode(#[source] serde_json::Error),
}

/// Errors surfaced to the caller of the harness and the CLI.
#[derive(Debug, Error)]
pub enum BenchError {
    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("invalid key material: {0}")]
    KeyMaterial(String),

    #[error("confirmation client: {0}")]
    Submit(#[from] SubmitError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}
