use std::sync::atomic::{AtomicU64, Ordering};

use gasbench_types::TxLookup;

/// Per-client call counters.
#[derive(Debug, Default)]
pub struct RpcMetrics {
    submit: AtomicU64,
    submit_err: AtomicU64,
    tx_query: AtomicU64,
    tx_not_found: AtomicU64,
    tx_query_err: AtomicU64,
    contract_query: AtomicU64,
    account_query: AtomicU64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct RpcMetricsSnapshot {
    pub submit: u64,
    pub submit_err: u64,
    pub tx_query: u64,
    pub tx_not_found: u64,
    pub tx_query_err: u64,
    pub contract_query: u64,
    pub account_query: u64,
}

impl RpcMetrics {
    pub fn track_submit(&self, ok: bool) {
        self.submit.fetch_add(1, Ordering::Relaxed);
        if !ok {
            self.submit_err.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Counts every status lookup, including the ones that end in an error.
    pub fn track_tx_query<T>(&self, result: &Result<TxLookup, T>) {
        self.tx_query.fetch_add(1, Ordering::Relaxed);
        match result {
            Ok(TxLookup::Found(_)) => {}
            Ok(TxLookup::NotFound) => {
                self.tx_not_found.fetch_add(1, Ordering::Relaxed);
            }
            Err(_) => {
                self.tx_query_err.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    pub fn track_contract_query(&self) {
        self.contract_query.fetch_add(1, Ordering::Relaxed);
    }

    pub fn track_account_query(&self) {
        self.account_query.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> RpcMetricsSnapshot {
        RpcMetricsSnapshot {
            submit: self.submit.load(Ordering::Relaxed),
            submit_err: self.submit_err.load(Ordering::Relaxed),
            tx_query: self.tx_query.load(Ordering::Relaxed),
            tx_not_found: self.tx_not_found.load(Ordering::Relaxed),
            tx_query_err: self.tx_query_err.load(Ordering::Relaxed),
            contract_query: self.contract_query.load(Ordering::Relaxed),
            account_query: self.account_query.load(Ordering::Relaxed),
        }
    }
}

impl RpcMetricsSnapshot {
    /// Field-wise sum, for clients that share one report.
    pub fn merge(&self, other: &RpcMetricsSnapshot) -> RpcMetricsSnapshot {
        RpcMetricsSnapshot {
            submit: self.submit + other.submit,
            submit_err: self.submit_err + other.submit_err,
            tx_query: self.tx_query + other.tx_query,
            tx_not_found: self.tx_not_found + other.tx_not_found,
            tx_query_err: self.tx_query_err + other.tx_query_err,
            contract_query: self.contract_query + other.contract_query,
            account_query: self.account_query + other.account_query,
        }
    }
}
