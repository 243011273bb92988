//! Polls the ledger until a submitted transaction is terminal or a deadline passes.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::{timeout, Instant};
use tracing::{debug, warn};

use gasbench_types::TxLookup;

use crate::chain::LedgerQuery;
use crate::retry::wait;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WatchConfig {
    pub timeout: Duration,
    pub poll_interval: Duration,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_millis(60_000),
            poll_interval: Duration::from_millis(3_000),
        }
    }
}

/// Terminal outcome of one watch. `polls` counts status queries issued.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Confirmation {
    Confirmed { height: u64, gas_used: u64, gas_wanted: u64, polls: u32 },
    /// Included with a non-zero code. Never retried.
    Failed { code: u32, raw_log: String, height: u64, polls: u32 },
    /// No terminal status before the deadline; the tx may still land later.
    TimedOut { elapsed: Duration, polls: u32 },
}

impl Confirmation {
    pub fn polls(&self) -> u32 {
        match self {
            Confirmation::Confirmed { polls, .. }
            | Confirmation::Failed { polls, .. }
            | Confirmation::TimedOut { polls, .. } => *polls,
        }
    }
}

/// Each call to [`ConfirmationWatcher::watch`] is independent; any number may
/// run concurrently against the same ledger client.
#[derive(Clone)]
pub struct ConfirmationWatcher {
    ledger: Arc<dyn LedgerQuery>,
    cfg: WatchConfig,
}

impl ConfirmationWatcher {
    pub fn new(ledger: Arc<dyn LedgerQuery>, cfg: WatchConfig) -> Self {
        Self { ledger, cfg }
    }

    /// Poll immediately, then every `poll_interval`, until the ledger reports a
    /// terminal code or `timeout` has elapsed. "Not found" and transport errors
    /// both count as pending.
    pub async fn watch(&self, tx_hash: &str) -> Confirmation {
        let start = Instant::now();
        let mut polls = 0u32;

        loop {
            polls += 1;
            // a stuck query must not push us past the deadline by more than one interval
            let query = self.ledger.query_transaction(tx_hash);
            match timeout(self.cfg.poll_interval, query).await {
                Ok(Ok(TxLookup::Found(st))) if st.is_success() => {
                    debug!(
                        target: "watcher",
                        tx_hash,
                        polls,
                        height = st.height,
                        gas_used = st.gas_used,
                        "confirmed"
                    );
                    return Confirmation::Confirmed {
                        height: st.height,
                        gas_used: st.gas_used,
                        gas_wanted: st.gas_wanted,
                        polls,
                    };
                }
                Ok(Ok(TxLookup::Found(st))) => {
                    debug!(
                        target: "watcher",
                        tx_hash,
                        polls,
                        code = st.code,
                        "included with error code"
                    );
                    return Confirmation::Failed {
                        code: st.code,
                        raw_log: st.raw_log,
                        height: st.height,
                        polls,
                    };
                }
                Ok(Ok(TxLookup::NotFound)) => {
                    debug!(target: "watcher", tx_hash, poll = polls, "not found yet");
                }
                Ok(Err(e)) => {
                    warn!(
                        target: "watcher",
                        tx_hash,
                        poll = polls,
                        error = %e,
                        "status query failed; still pending"
                    );
                }
                Err(_) => {
                    warn!(
                        target: "watcher",
                        tx_hash,
                        poll = polls,
                        limit_ms = self.cfg.poll_interval.as_millis() as u64,
                        "status query timed out; still pending"
                    );
                }
            }

            let elapsed = start.elapsed();
            if elapsed >= self.cfg.timeout {
                return Confirmation::TimedOut { elapsed, polls };
            }
            wait(self.cfg.poll_interval.min(self.cfg.timeout - elapsed)).await;
        }
    }
}
