use serde::{Deserialize, Serialize};

use crate::case::CaseKind;

/// Terminal state of one measured test case.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Confirmed,
    /// Chain returned a non-zero code, or the case never got a transaction in.
    Failed,
    /// No terminal status before the deadline; the tx may still land later.
    TimedOut,
}

impl Outcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Outcome::Confirmed => "confirmed",
            Outcome::Failed => "failed",
            Outcome::TimedOut => "timed_out",
        }
    }
}

/// One measured test case. Never mutated after the driver creates it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Sample {
    pub label: String,
    pub kind: CaseKind,
    /// UTF-8 byte length of the stored content.
    pub payload_size: u64,
    /// Byte length of the full execute message JSON.
    pub message_bytes: u64,
    /// Present (and > 0) only for `Confirmed` samples.
    pub gas_used: Option<u64>,
    /// `gas_used × gas price`, in the minimal fee denom.
    pub cost: Option<f64>,
    pub tx_hash: Option<String>,
    pub block_height: Option<u64>,
    pub outcome: Outcome,
    /// Diagnostic for failed/timed-out cases (chain code, raw log, transport error).
    pub error: Option<String>,
}

impl Sample {
    #[allow(clippy::too_many_arguments)]
    pub fn confirmed(
        label: impl Into<String>,
        kind: CaseKind,
        payload_size: u64,
        message_bytes: u64,
        gas_used: u64,
        gas_price: f64,
        tx_hash: impl Into<String>,
        block_height: u64,
    ) -> Self {
        Self {
            label: label.into(),
            kind,
            payload_size,
            message_bytes,
            gas_used: Some(gas_used),
            cost: Some(gas_used as f64 * gas_price),
            tx_hash: Some(tx_hash.into()),
            block_height: Some(block_height),
            outcome: Outcome::Confirmed,
            error: None,
        }
    }

    pub fn failed(
        label: impl Into<String>,
        kind: CaseKind,
        payload_size: u64,
        message_bytes: u64,
        tx_hash: Option<String>,
        error: impl Into<String>,
    ) -> Self {
        Self {
            label: label.into(),
            kind,
            payload_size,
            message_bytes,
            gas_used: None,
            cost: None,
            tx_hash,
            block_height: None,
            outcome: Outcome::Failed,
            error: Some(error.into()),
        }
    }

    pub fn timed_out(
        label: impl Into<String>,
        kind: CaseKind,
        payload_size: u64,
        message_bytes: u64,
        tx_hash: impl Into<String>,
        error: impl Into<String>,
    ) -> Self {
        Self {
            label: label.into(),
            kind,
            payload_size,
            message_bytes,
            gas_used: None,
            cost: None,
            tx_hash: Some(tx_hash.into()),
            block_height: None,
            outcome: Outcome::TimedOut,
            error: Some(error.into()),
        }
    }

    pub fn is_confirmed(&self) -> bool {
        self.outcome == Outcome::Confirmed
    }

    /// `(payload_size, gas_used)` if this sample may feed a regression.
    pub fn observation(&self) -> Option<(u64, u64)> {
        match (self.outcome, self.gas_used) {
            (Outcome::Confirmed, Some(gas)) if gas > 0 => Some((self.payload_size, gas)),
            _ => None,
        }
    }
}

/// Successes vs. total for one run.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct RunTally {
    pub confirmed: usize,
    pub failed: usize,
    pub timed_out: usize,
    pub total: usize,
}

impl RunTally {
    pub fn from_samples(samples: &[Sample]) -> Self {
        let mut t = RunTally { total: samples.len(), ..Default::default() };
        for s in samples {
            match s.outcome {
                Outcome::Confirmed => t.confirmed += 1,
                Outcome::Failed => t.failed += 1,
                Outcome::TimedOut => t.timed_out += 1,
            }
        }
        t
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_confirmed_samples_yield_observations() {
        let ok = Sample::confirmed("100", CaseKind::Length, 100, 130, 133_000, 0.02, "AB", 7);
        let bad = Sample::failed("200", CaseKind::Length, 200, 230, None, "code 5");
        let late =
            Sample::timed_out("300", CaseKind::Length, 300, 330, "CD", "no status after 60s");

        assert_eq!(ok.observation(), Some((100, 133_000)));
        assert_eq!(bad.observation(), None);
        assert_eq!(late.observation(), None);
        assert!((ok.cost.unwrap() - 2660.0).abs() < 1e-9);
    }

    #[test]
    fn tally_counts_each_outcome() {
        let samples = vec![
            Sample::confirmed("a", CaseKind::Character, 1, 33, 120_000, 0.02, "A", 1),
            Sample::failed("b", CaseKind::Character, 1, 33, None, "boom"),
            Sample::timed_out("c", CaseKind::Character, 1, 33, "C", "late"),
        ];
        let t = RunTally::from_samples(&samples);
        assert_eq!(t, RunTally { confirmed: 1, failed: 1, timed_out: 1, total: 3 });
    }

    #[test]
    fn outcome_serializes_snake_case() {
        assert_eq!(serde_json::to_string(&Outcome::TimedOut).unwrap(), "\"timed_out\"");
    }
}
