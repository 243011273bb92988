use serde::{Deserialize, Serialize};

/// What the submitter hands back once a broadcast is accepted into the mempool.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SubmitReceipt {
    pub tx_hash: String,
    /// Gas wanted/estimated at submission; canonical usage comes from the ledger.
    pub reported_gas: Option<u64>,
}

/// Ledger view of an included transaction.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TxStatus {
    pub tx_hash: String,
    pub code: u32,
    #[serde(with = "crate::serde::serde_u64_string")]
    pub gas_used: u64,
    #[serde(with = "crate::serde::serde_u64_string")]
    pub gas_wanted: u64,
    #[serde(with = "crate::serde::serde_u64_string")]
    pub height: u64,
    pub raw_log: String,
}

impl TxStatus {
    pub fn is_success(&self) -> bool {
        self.code == 0
    }
}

/// Result of one ledger status query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TxLookup {
    /// Not (yet) indexed by the node; callers treat it as pending.
    NotFound,
    Found(TxStatus),
}
