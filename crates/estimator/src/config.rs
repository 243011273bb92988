use serde::{Serialize, Deserialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EstimatorConfig {
    /// Payload sizes (bytes) at which the report prices the fitted line.
    pub reference_sizes: Vec<u64>,
    /// Samples with `payload_size <= small_threshold` form the "small" segment.
    pub small_threshold: u64,
    /// Additive gas buffer for recommended limits
    pub gas_slack: u64,
    /// Multiply gas by (1 + pct/100.0) for recommended limits
    pub gas_safety_pct: u8,
}

impl Default for EstimatorConfig {
    fn default() -> Self {
        Self {
            reference_sizes: vec![10, 100, 1_000, 10_000],
            small_threshold: 200,
            gas_slack: 0,
            // mirrors the `--gas-adjustment 1.3` used at submission
            gas_safety_pct: 30,
        }
    }
}
