use serde::{Serialize, Deserialize};

use crate::regression::RegressionResult;

/// Fee price: `amount` units of `denom` per gas unit (e.g. 0.002 ubbn).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GasPrice {
    pub amount: f64,
    pub denom: String,
    /// Decimal places between `denom` and its display unit (ubbn -> BBN = 6).
    pub display_exponent: u32,
}

impl GasPrice {
    /// `gas × price`, in the minimal denom.
    pub fn cost_of(&self, gas: f64) -> f64 {
        gas * self.amount
    }

    /// Minimal denom amount converted to the display unit.
    pub fn to_display(&self, minimal: f64) -> f64 {
        minimal / 10f64.powi(self.display_exponent as i32)
    }

    pub fn display_denom(&self) -> String {
        match self.denom.strip_prefix('u') {
            Some(rest) if self.display_exponent == 6 && !rest.is_empty() => rest.to_uppercase(),
            _ => self.denom.clone(),
        }
    }
}

impl std::fmt::Display for GasPrice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}{}", self.amount, self.denom)
    }
}

/// Gas with a safety cushion (additive slack + percentage).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GasEstimate {
    pub gas: u64,
    pub gas_with_safety: u64,
}

pub fn apply_safety(gas: u64, slack: u64, pct: u8) -> GasEstimate {
    let pct_add = (gas as u128 * pct as u128 / 100) as u64;
    let with = gas.saturating_add(slack).saturating_add(pct_add);
    GasEstimate { gas, gas_with_safety: with }
}

/// Predicted gas and cost for one reference payload size.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CostEstimate {
    pub size: u64,
    pub gas: f64,
    pub cost: f64,
    pub display_cost: f64,
    pub recommended_gas_limit: u64,
}

/// Round half away from zero to `places` decimals (report formatting rule).
pub fn round_to(v: f64, places: u32) -> f64 {
    let k = 10f64.powi(places as i32);
    (v * k).round() / k
}

/// Evaluate the fitted line at each size; gas rounded to 2 decimals, costs to 4.
pub fn estimate_at(
    reg: &RegressionResult,
    sizes: &[u64],
    price: &GasPrice,
    slack: u64,
    pct: u8,
) -> Vec<CostEstimate> {
    sizes
        .iter()
        .map(|&size| {
            let gas = round_to(reg.predict(size as f64), 2);
            let cost = round_to(price.cost_of(gas), 4);
            let limit = apply_safety(gas.max(0.0).ceil() as u64, slack, pct);
            CostEstimate {
                size,
                gas,
                cost,
                display_cost: price.to_display(cost),
                recommended_gas_limit: limit.gas_with_safety,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn price(amount: f64) -> GasPrice {
        GasPrice { amount, denom: "ubbn".into(), display_exponent: 6 }
    }

    #[test]
    fn reference_size_estimate_matches_hand_computation() {
        let reg = RegressionResult {
            label: "gas".into(),
            intercept: 129_256.99,
            slope: 41.37,
            r_squared: 0.99,
            samples: 12,
        };
        let est = estimate_at(&reg, &[100], &price(0.02), 0, 0);
        assert_eq!(est[0].gas, 133_393.99);
        assert_eq!(est[0].cost, 2667.8798);
        assert_eq!(est[0].recommended_gas_limit, 133_394);
    }

    #[test]
    fn safety_adds_slack_and_percentage() {
        let e = apply_safety(100_000, 5_000, 30);
        assert_eq!(e.gas_with_safety, 135_000);
        assert_eq!(apply_safety(u64::MAX, 1, 0).gas_with_safety, u64::MAX);
    }

    #[test]
    fn display_conversion_uses_exponent() {
        let p = price(0.002);
        assert_eq!(p.display_denom(), "BBN");
        assert!((p.to_display(2_500_000.0) - 2.5).abs() < 1e-12);
        assert_eq!(p.to_string(), "0.002ubbn");
    }

    #[test]
    fn rounding_rule_is_half_away_from_zero() {
        assert_eq!(round_to(2.5, 0), 3.0);
        assert_eq!(round_to(-2.5, 0), -3.0);
        assert_eq!(round_to(1.23456, 2), 1.23);
    }
}
