use std::time::{Duration, Instant};

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

use crate::ledger::Ledger;
use crate::report::ReportSink;
use crate::submit::{reconcile, Submitter};
use crate::tx::{Batch, TransactionFactory, DEFAULT_BATCH_SIZE};
use crate::verify::Verifier;

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RunMode {
    /// One batch through the pipeline.
    Batch,
    /// Single-transaction round trips until a wall-clock window closes.
    Window,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct BenchmarkReport {
    pub mode: RunMode,
    pub transactions_processed: u64,
    pub elapsed_seconds: f64,
    pub throughput: f64,
    pub transactions_generated: u64,
    pub verification_rejected: u64,
    pub precheck_rejected: u64,
    pub transactions_submitted: u64,
    pub unconfirmed: u64,
    /// Confirmed entries refused before apply: never submitted, or failing
    /// verification on the way back.
    pub confirmation_rejected: u64,
    pub balance_rejected: u64,
    pub failed_rounds: u64,
    pub iterations: u64,
}

/// Applied transactions per second; a zero-length run reports 0.
pub fn throughput(processed: u64, elapsed_seconds: f64) -> f64 {
    if elapsed_seconds > 0.0 {
        processed as f64 / elapsed_seconds
    } else {
        0.0
    }
}

#[derive(Default)]
struct Tally {
    generated: u64,
    verification_rejected: u64,
    precheck_rejected: u64,
    submitted: u64,
    unconfirmed: u64,
    confirmation_rejected: u64,
    applied: u64,
    balance_rejected: u64,
    failed_rounds: u64,
    iterations: u64,
}

/// Drives Factory → Verifier → Submitter → Ledger and reports throughput.
///
/// Everything runs on the calling thread; the ledger is owned here and only
/// touched between round trips.
pub struct Harness {
    ledger: Ledger,
    factory: TransactionFactory,
    verifier: Box<dyn Verifier>,
    submitter: Box<dyn Submitter>,
    sink: Box<dyn ReportSink>,
    batch_size: usize,
}

impl Harness {
    pub fn new(
        ledger: Ledger,
        factory: TransactionFactory,
        verifier: Box<dyn Verifier>,
        submitter: Box<dyn Submitter>,
        sink: Box<dyn ReportSink>,
    ) -> Self {
        Self {
            ledger,
            factory,
            verifier,
            submitter,
            sink,
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }

    pub fn batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    pub fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    pub fn into_ledger(self) -> Ledger {
        self.ledger
    }

    /// Generate up to `batch_size` transfers from the factory's sender, keep
    /// the funded and verified ones, submit them once and apply the confirmed
    /// entries that match the batch and verify again.
    pub fn run_batch(&mut self) -> BenchmarkReport {
        let mut tally = Tally::default();
        let mut batch = Batch::with_capacity(self.batch_size);
        let sender = self.factory.sender().to_string();

        for _ in 0..self.batch_size {
            let tx = self.factory.next_transaction();
            tally.generated += 1;
            if self.ledger.balance(&sender) < tx.amount {
                tally.precheck_rejected += 1;
                debug!("skipping unfunded candidate: {}", tx.data);
                continue;
            }
            if !self.verifier.verify_transaction(&tx) {
                tally.verification_rejected += 1;
                warn!("{} verification failed: {}", self.verifier.name(), tx.data);
                continue;
            }
            if batch.push(tx).is_err() {
                break;
            }
        }
        tally.iterations = 1;

        let started = Instant::now();
        self.round_trip(&batch, &mut tally);
        let elapsed = started.elapsed();

        self.finish(RunMode::Batch, tally, elapsed)
    }

    /// Repeat construct → verify → submit one → apply until `window` has
    /// passed. Only the submit/apply segments count towards elapsed time.
    pub fn run_window(&mut self, window: Duration) -> BenchmarkReport {
        let mut tally = Tally::default();
        let mut busy = Duration::ZERO;
        let started = Instant::now();

        while started.elapsed() < window {
            tally.iterations += 1;
            let tx = self.factory.next_transaction();
            tally.generated += 1;
            if !self.verifier.verify_transaction(&tx) {
                tally.verification_rejected += 1;
                debug!("{} verification failed: {}", self.verifier.name(), tx.data);
                continue;
            }
            let batch = Batch::single(tx);
            let round = Instant::now();
            self.round_trip(&batch, &mut tally);
            busy += round.elapsed();
        }

        self.finish(RunMode::Window, tally, busy)
    }

    fn round_trip(&mut self, batch: &Batch, tally: &mut Tally) {
        if batch.is_empty() {
            debug!("nothing to submit this round");
            return;
        }
        tally.submitted += batch.len() as u64;
        match self.submitter.submit(batch) {
            Ok(confirmed) => {
                let reconciled = reconcile(batch.transactions(), confirmed);
                tally.unconfirmed += reconciled.unconfirmed as u64;
                for tx in &reconciled.unsolicited {
                    tally.confirmation_rejected += 1;
                    warn!("peer confirmed a transaction that was not submitted: {}", tx.data);
                }
                for tx in &reconciled.matched {
                    if !self.verifier.verify_transaction(tx) {
                        tally.confirmation_rejected += 1;
                        warn!("{} rejected confirmed transaction: {}", self.verifier.name(), tx.data);
                        continue;
                    }
                    match self.ledger.apply_transfer(tx) {
                        Ok(()) => tally.applied += 1,
                        Err(err) => {
                            tally.balance_rejected += 1;
                            warn!("{err}");
                        }
                    }
                }
            }
            Err(err) => {
                tally.failed_rounds += 1;
                tally.unconfirmed += batch.len() as u64;
                warn!("batch of {} left unconfirmed: {err}", batch.len());
            }
        }
    }

    fn finish(&mut self, mode: RunMode, tally: Tally, elapsed: Duration) -> BenchmarkReport {
        let elapsed_seconds = elapsed.as_secs_f64();
        let report = BenchmarkReport {
            mode,
            transactions_processed: tally.applied,
            elapsed_seconds,
            throughput: throughput(tally.applied, elapsed_seconds),
            transactions_generated: tally.generated,
            verification_rejected: tally.verification_rejected,
            precheck_rejected: tally.precheck_rejected,
            transactions_submitted: tally.submitted,
            unconfirmed: tally.unconfirmed,
            confirmation_rejected: tally.confirmation_rejected,
            balance_rejected: tally.balance_rejected,
            failed_rounds: tally.failed_rounds,
            iterations: tally.iterations,
        };
        info!(
            "Processed {} transactions in {:.2} seconds.",
            report.transactions_processed, report.elapsed_seconds
        );
        info!("Transactions per second: {:.2}", report.throughput);

        if let Err(err) = self.sink.write_snapshot(&self.ledger.snapshot()) {
            warn!("unable to write ledger snapshot: {err}");
        }
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{BenchError, SubmitError};
    use crate::ledger::{LedgerSnapshot, GENESIS_ADDRESS};
    use crate::peer::{self, PeerConfig};
    use crate::report::NullSink;
    use crate::submit::ConfirmationClient;
    use crate::tx::{Signer, Transaction};
    use crate::verify::{EcdsaVerifier, SignatureScheme, StubVerifier};
    use std::{cell::RefCell, collections::HashSet, rc::Rc};

    struct Echo;

    impl Submitter for Echo {
        fn submit(&self, batch: &Batch) -> Result<Vec<Transaction>, SubmitError> {
            Ok(batch.transactions().to_vec())
        }
    }

    /// Confirms everything except the entry at `skip`.
    struct DropOne {
        skip: usize,
    }

    impl Submitter for DropOne {
        fn submit(&self, batch: &Batch) -> Result<Vec<Transaction>, SubmitError> {
            Ok(batch
                .transactions()
                .iter()
                .enumerate()
                .filter(|(i, _)| *i != self.skip)
                .map(|(_, tx)| tx.clone())
                .collect())
        }
    }

    /// Rewrites every entry to pay MALLORY and strips the credentials.
    struct Tampering;

    impl Submitter for Tampering {
        fn submit(&self, batch: &Batch) -> Result<Vec<Transaction>, SubmitError> {
            Ok(batch
                .transactions()
                .iter()
                .map(|tx| Transaction::transfer(tx.from.clone(), "MALLORY", 999_000))
                .collect())
        }
    }

    struct Unavailable;

    impl Submitter for Unavailable {
        fn submit(&self, _batch: &Batch) -> Result<Vec<Transaction>, SubmitError> {
            Err(SubmitError::Status { status: 503 })
        }
    }

    /// Accepts each descriptor the first time it is seen only.
    #[derive(Default)]
    struct AcceptOnce(RefCell<HashSet<String>>);

    impl Verifier for AcceptOnce {
        fn verify(&self, data: &str, _signature: Option<&str>, _public_key: Option<&str>) -> bool {
            self.0.borrow_mut().insert(data.to_string())
        }

        fn name(&self) -> &'static str {
            "accept-once"
        }
    }

    struct Undecodable;

    impl Submitter for Undecodable {
        fn submit(&self, _batch: &Batch) -> Result<Vec<Transaction>, SubmitError> {
            let err = serde_json::from_str::<Vec<Transaction>>("{").unwrap_err();
            Err(SubmitError::Decode(err))
        }
    }

    #[derive(Clone, Default)]
    struct RecordingSink(Rc<RefCell<Vec<LedgerSnapshot>>>);

    impl ReportSink for RecordingSink {
        fn write_snapshot(&self, snapshot: &LedgerSnapshot) -> Result<(), BenchError> {
            self.0.borrow_mut().push(snapshot.clone());
            Ok(())
        }
    }

    struct FailingSink;

    impl ReportSink for FailingSink {
        fn write_snapshot(&self, _snapshot: &LedgerSnapshot) -> Result<(), BenchError> {
            Err(BenchError::Config("read-only".into()))
        }
    }

    fn harness(submitter: Box<dyn Submitter>, sink: Box<dyn ReportSink>, genesis: u64) -> Harness {
        Harness::new(
            Ledger::with_genesis(GENESIS_ADDRESS, genesis),
            TransactionFactory::new(GENESIS_ADDRESS, Some(11)),
            Box::new(StubVerifier),
            submitter,
            sink,
        )
    }

    #[test]
    fn throughput_is_processed_over_elapsed() {
        assert!((throughput(37, 2.0) - 18.5).abs() < 1e-9);
        assert_eq!(throughput(10, 0.0), 0.0);
    }

    #[test]
    fn batch_run_applies_every_confirmed_transfer() {
        let sink = RecordingSink::default();
        let mut h = harness(Box::new(Echo), Box::new(sink.clone()), 1_000_000).batch_size(100);
        let report = h.run_batch();

        assert_eq!(report.mode, RunMode::Batch);
        assert_eq!(report.transactions_generated, 100);
        assert_eq!(report.transactions_submitted, 100);
        assert_eq!(report.transactions_processed, 100);
        assert_eq!(report.unconfirmed, 0);
        assert_eq!(h.ledger().processed().len(), 100);
        assert_eq!(h.ledger().total_supply(), 1_000_000);

        let snapshots = sink.0.borrow();
        assert_eq!(snapshots.len(), 1);
        assert_eq!(snapshots[0], h.ledger().snapshot());
    }

    #[test]
    fn peer_dropping_one_of_three_applies_exactly_two() {
        let mut h = harness(Box::new(DropOne { skip: 1 }), Box::new(NullSink), 1_000_000).batch_size(3);
        let report = h.run_batch();

        assert_eq!(report.transactions_submitted, 3);
        assert_eq!(report.transactions_processed, 2);
        assert_eq!(report.unconfirmed, 1);

        let ledger = h.ledger();
        assert_eq!(ledger.processed().len(), 2);
        let moved: u64 = ledger.processed().iter().map(|tx| tx.amount).sum();
        assert_eq!(ledger.balance(GENESIS_ADDRESS), 1_000_000 - moved);

        // replay the generator to find the dropped transfer
        let mut replay = TransactionFactory::new(GENESIS_ADDRESS, Some(11));
        let generated: Vec<_> = (0..3).map(|_| replay.next_transaction()).collect();
        assert!(!ledger.processed().contains(&generated[1]));
        assert_eq!(ledger.processed(), &[generated[0].clone(), generated[2].clone()]);
    }

    #[test]
    fn failed_round_applies_nothing_but_still_reports() {
        let sink = RecordingSink::default();
        let mut h = harness(Box::new(Undecodable), Box::new(sink.clone()), 1_000_000).batch_size(10);
        let before = h.ledger().clone();
        let report = h.run_batch();

        assert_eq!(report.failed_rounds, 1);
        assert_eq!(report.transactions_processed, 0);
        assert_eq!(report.unconfirmed, 10);
        assert_eq!(report.throughput, 0.0);
        assert_eq!(h.ledger(), &before);
        assert_eq!(sink.0.borrow().len(), 1);
    }

    #[test]
    fn rewritten_confirmations_are_never_applied() {
        let factory = TransactionFactory::new(GENESIS_ADDRESS, Some(5))
            .with_signer(Signer::generate(SignatureScheme::Ecdsa));
        let mut h = Harness::new(
            Ledger::with_genesis(GENESIS_ADDRESS, 1_000_000),
            factory,
            Box::new(EcdsaVerifier),
            Box::new(Tampering),
            Box::new(NullSink),
        )
        .batch_size(4);
        let before = h.ledger().clone();
        let report = h.run_batch();

        assert_eq!(report.transactions_submitted, 4);
        assert_eq!(report.transactions_processed, 0);
        assert_eq!(report.confirmation_rejected, 4);
        assert_eq!(report.unconfirmed, 4);
        assert_eq!(h.ledger().balance("MALLORY"), 0);
        assert_eq!(h.ledger(), &before);
    }

    #[test]
    fn confirmed_entries_are_verified_again_before_apply() {
        let mut h = Harness::new(
            Ledger::with_genesis(GENESIS_ADDRESS, 1_000_000),
            TransactionFactory::new(GENESIS_ADDRESS, Some(11)),
            Box::new(AcceptOnce::default()),
            Box::new(Echo),
            Box::new(NullSink),
        )
        .batch_size(3);
        let report = h.run_batch();

        assert_eq!(report.verification_rejected, 0);
        assert_eq!(report.transactions_submitted, 3);
        assert_eq!(report.unconfirmed, 0);
        assert_eq!(report.confirmation_rejected, 3);
        assert_eq!(report.transactions_processed, 0);
        assert!(h.ledger().processed().is_empty());
    }

    #[test]
    fn rejected_status_leaves_ledger_untouched() {
        let mut h = harness(Box::new(Unavailable), Box::new(NullSink), 1_000_000).batch_size(5);
        let before = h.ledger().clone();
        let report = h.run_batch();

        assert_eq!(report.failed_rounds, 1);
        assert_eq!(report.unconfirmed, 5);
        assert_eq!(report.transactions_processed, 0);
        assert_eq!(h.ledger(), &before);
    }

    #[test]
    fn unreachable_peer_leaves_ledger_untouched() {
        // grab a free port, then close it again
        let addr = std::net::TcpListener::bind("127.0.0.1:0")
            .unwrap()
            .local_addr()
            .unwrap();
        let client =
            ConfirmationClient::new(format!("http://{addr}/echo"), Duration::from_secs(2)).unwrap();
        let mut h = harness(Box::new(client), Box::new(NullSink), 1_000_000).batch_size(5);
        let before = h.ledger().clone();
        let report = h.run_batch();

        assert_eq!(report.failed_rounds, 1);
        assert_eq!(report.transactions_submitted, 5);
        assert_eq!(report.transactions_processed, 0);
        assert_eq!(h.ledger(), &before);
    }

    #[test]
    fn unfunded_sender_submits_nothing() {
        let mut h = harness(Box::new(Echo), Box::new(NullSink), 0).batch_size(5);
        let report = h.run_batch();
        assert_eq!(report.precheck_rejected, 5);
        assert_eq!(report.transactions_submitted, 0);
        assert_eq!(report.transactions_processed, 0);
    }

    #[test]
    fn confirmed_overdraft_is_rejected_at_apply_time() {
        // the pre-check reads the balance per candidate, so a batch can
        // overdraw in aggregate; the ledger catches it
        let mut h = Harness::new(
            Ledger::with_genesis(GENESIS_ADDRESS, 15),
            TransactionFactory::new(GENESIS_ADDRESS, None).fixed("B", 10),
            Box::new(StubVerifier),
            Box::new(Echo),
            Box::new(NullSink),
        )
        .batch_size(3);
        let report = h.run_batch();
        assert_eq!(report.transactions_submitted, 3);
        assert_eq!(report.transactions_processed, 1);
        assert_eq!(report.balance_rejected, 2);
        assert_eq!(h.ledger().balance(GENESIS_ADDRESS), 5);
        assert_eq!(h.ledger().balance("B"), 10);
    }

    #[test]
    fn ecdsa_run_drops_unsigned_candidates() {
        let mut h = Harness::new(
            Ledger::with_genesis(GENESIS_ADDRESS, 1_000),
            TransactionFactory::new(GENESIS_ADDRESS, Some(5)),
            Box::new(EcdsaVerifier),
            Box::new(Echo),
            Box::new(NullSink),
        )
        .batch_size(4);
        let report = h.run_batch();
        assert_eq!(report.verification_rejected, 4);
        assert_eq!(report.transactions_submitted, 0);
    }

    #[test]
    fn ecdsa_run_accepts_signed_candidates() {
        let factory = TransactionFactory::new(GENESIS_ADDRESS, Some(5))
            .with_signer(Signer::generate(SignatureScheme::Ecdsa));
        let mut h = Harness::new(
            Ledger::with_genesis(GENESIS_ADDRESS, 1_000_000),
            factory,
            Box::new(EcdsaVerifier),
            Box::new(Echo),
            Box::new(NullSink),
        )
        .batch_size(8);
        let report = h.run_batch();
        assert_eq!(report.verification_rejected, 0);
        assert_eq!(report.transactions_processed, 8);
    }

    #[test]
    fn window_run_loops_until_deadline() {
        let mut h = harness(Box::new(Echo), Box::new(NullSink), 1_000_000_000);
        let window = Duration::from_millis(50);
        let started = Instant::now();
        let report = h.run_window(window);

        assert!(started.elapsed() >= window);
        assert_eq!(report.mode, RunMode::Window);
        assert!(report.iterations > 0);
        assert_eq!(report.iterations, report.transactions_submitted);
        assert_eq!(report.transactions_processed, report.iterations);
        assert!(report.elapsed_seconds <= started.elapsed().as_secs_f64());
        assert_eq!(h.ledger().total_supply(), 1_000_000_000);
    }

    #[test]
    fn window_run_survives_failing_rounds() {
        let mut h = harness(Box::new(Undecodable), Box::new(FailingSink), 1_000);
        let report = h.run_window(Duration::from_millis(20));
        assert!(report.failed_rounds > 0);
        assert_eq!(report.failed_rounds, report.iterations);
        assert_eq!(report.transactions_processed, 0);
        assert_eq!(h.ledger().balance(GENESIS_ADDRESS), 1_000);
    }

    #[test]
    fn batch_run_against_local_peer() {
        let handle = peer::spawn(PeerConfig::default()).unwrap();
        let client = ConfirmationClient::new(handle.endpoint(), Duration::from_secs(5)).unwrap();
        let mut h = harness(Box::new(client), Box::new(NullSink), 1_000_000_000).batch_size(25);
        let report = h.run_batch();

        assert_eq!(report.failed_rounds, 0);
        assert_eq!(report.transactions_processed, 25);
        assert!(report.elapsed_seconds > 0.0);
        assert!(report.throughput > 0.0);
        let ledger = h.into_ledger();
        assert_eq!(ledger.total_supply(), 1_000_000_000);
    }
}
