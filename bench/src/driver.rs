//! Runs the suite against the contract in bounded batches, one sample per case.

use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use estimator::{content_bytes, estimate_message_size, GasPrice};
use gasbench_types::{ExecuteMsg, RunTally, Sample, TestCase};

use crate::cases::render_payload;
use crate::chain::{ChainError, ContractSubmitter};
use crate::retry::{wait, with_retry};
use crate::watcher::{Confirmation, ConfirmationWatcher};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DriverConfig {
    /// Cases submitted concurrently per batch.
    pub concurrency: usize,
    /// Pause between batches (not after the last one).
    pub batch_delay: Duration,
    /// Submit-then-confirm attempts per case.
    pub case_attempts: usize,
    pub retry_delay: Duration,
    pub gas_price: GasPrice,
}

/// Every sample, in submission order, plus the success tally.
#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub samples: Vec<Sample>,
    pub tally: RunTally,
}

/// Terminal result of one submit-then-confirm attempt.
enum Attempt {
    Confirmed { tx_hash: String, height: u64, gas_used: u64 },
    Failed { tx_hash: Option<String>, reason: String },
    TimedOut { tx_hash: String, reason: String },
}

pub struct BatchDriver {
    submitter: Arc<dyn ContractSubmitter>,
    watcher: ConfirmationWatcher,
    contract: String,
    cfg: DriverConfig,
}

impl BatchDriver {
    pub fn new(
        submitter: Arc<dyn ContractSubmitter>,
        watcher: ConfirmationWatcher,
        contract: impl Into<String>,
        cfg: DriverConfig,
    ) -> Self {
        Self { submitter, watcher, contract: contract.into(), cfg }
    }

    pub async fn run(&self, cases: &[TestCase]) -> RunOutcome {
        let k = self.cfg.concurrency.max(1);
        let batches = cases.len().div_ceil(k);
        let mut samples = Vec::with_capacity(cases.len());

        for (idx, batch) in cases.chunks(k).enumerate() {
            info!(
                target: "driver",
                batch = idx + 1,
                batches,
                size = batch.len(),
                "submitting batch"
            );
            // join_all yields in input order regardless of completion order
            let done = join_all(batch.iter().map(|case| self.run_case(case))).await;
            samples.extend(done);

            if idx + 1 < batches {
                wait(self.cfg.batch_delay).await;
            }
        }

        let tally = RunTally::from_samples(&samples);
        info!(
            target: "driver",
            confirmed = tally.confirmed,
            failed = tally.failed,
            timed_out = tally.timed_out,
            total = tally.total,
            "run finished"
        );
        RunOutcome { samples, tally }
    }

    async fn run_case(&self, case: &TestCase) -> Sample {
        let msg = ExecuteMsg::store(render_payload(&case.rule));
        let payload_size = content_bytes(msg.content());
        let message_bytes = match estimate_message_size(&msg) {
            Ok(est) => est.message_bytes,
            Err(e) => {
                let reason = format!("encode message: {e}");
                return Sample::failed(
                    &case.label,
                    case.kind,
                    payload_size,
                    0,
                    None,
                    reason,
                );
            }
        };

        let operation = format!("case {} ({payload_size} bytes)", case.label);
        let result = with_retry(
            &operation,
            self.cfg.case_attempts,
            self.cfg.retry_delay,
            |attempt| self.attempt(case, &msg, payload_size, attempt),
        )
        .await;

        match result {
            Ok(Attempt::Confirmed { tx_hash, gas_used: 0, .. }) => {
                warn!(
                    target: "driver",
                    label = %case.label,
                    tx_hash = %tx_hash,
                    "confirmed with zero gas"
                );
                Sample::failed(
                    &case.label,
                    case.kind,
                    payload_size,
                    message_bytes,
                    Some(tx_hash),
                    "ledger reported zero gas",
                )
            }
            Ok(Attempt::Confirmed { tx_hash, height, gas_used }) => {
                info!(
                    target: "driver",
                    label = %case.label,
                    payload_size,
                    gas_used,
                    height,
                    tx_hash = %tx_hash,
                    "case confirmed"
                );
                Sample::confirmed(
                    &case.label,
                    case.kind,
                    payload_size,
                    message_bytes,
                    gas_used,
                    self.cfg.gas_price.amount,
                    tx_hash,
                    height,
                )
            }
            Ok(Attempt::Failed { tx_hash, reason }) => {
                warn!(
                    target: "driver",
                    label = %case.label,
                    payload_size,
                    error = %reason,
                    "case failed"
                );
                Sample::failed(
                    &case.label,
                    case.kind,
                    payload_size,
                    message_bytes,
                    tx_hash,
                    reason,
                )
            }
            Ok(Attempt::TimedOut { tx_hash, reason }) => {
                warn!(
                    target: "driver",
                    label = %case.label,
                    payload_size,
                    tx_hash = %tx_hash,
                    "case timed out"
                );
                Sample::timed_out(
                    &case.label,
                    case.kind,
                    payload_size,
                    message_bytes,
                    tx_hash,
                    reason,
                )
            }
            Err(e) => {
                warn!(
                    target: "driver",
                    label = %case.label,
                    payload_size,
                    error = %e,
                    "case exhausted attempts"
                );
                Sample::failed(
                    &case.label,
                    case.kind,
                    payload_size,
                    message_bytes,
                    None,
                    e.to_string(),
                )
            }
        }
    }

    /// `Err` only for failures worth another attempt; chain verdicts and
    /// timeouts come back as `Ok` so the retry wrapper leaves them alone.
    async fn attempt(
        &self,
        case: &TestCase,
        msg: &ExecuteMsg,
        payload_size: u64,
        attempt: usize,
    ) -> Result<Attempt, ChainError> {
        let receipt = match self.submitter.submit(&self.contract, msg).await {
            Ok(r) => r,
            Err(e) if e.is_retryable() => {
                warn!(
                    target: "driver",
                    label = %case.label,
                    payload_size,
                    attempt,
                    error = %e,
                    "submit failed"
                );
                return Err(e);
            }
            Err(e) => {
                return Ok(Attempt::Failed {
                    tx_hash: None,
                    reason: e.to_string(),
                })
            }
        };

        Ok(match self.watcher.watch(&receipt.tx_hash).await {
            Confirmation::Confirmed { height, gas_used, .. } => {
                Attempt::Confirmed { tx_hash: receipt.tx_hash, height, gas_used }
            }
            Confirmation::Failed { code, raw_log, .. } => Attempt::Failed {
                tx_hash: Some(receipt.tx_hash),
                reason: format!("chain code {code}: {raw_log}"),
            },
            Confirmation::TimedOut { elapsed, polls } => Attempt::TimedOut {
                tx_hash: receipt.tx_hash,
                reason: format!(
                    "no terminal status after {}ms ({polls} polls)",
                    elapsed.as_millis()
                ),
            },
        })
    }
}
