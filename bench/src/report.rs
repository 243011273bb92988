//! Summary report and chart payload, built from the samples and the fitted lines.
//!
//! Everything here is a pure function of its inputs (the timestamp included,
//! which the caller passes in), so two runs over the same samples render the
//! same text.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use estimator::{
    estimate_at, fit_segmented, round_to, CostEstimate, EstimatorConfig, GasPrice, Obs,
    RegressionError, RegressionResult, SegmentedRegression,
};
use gasbench_types::{CaseKind, ListMessagesResponse, Outcome, RunTally, Sample};

use crate::chain::RpcMetricsSnapshot;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainInfo {
    pub chain_id: String,
    pub contract: String,
    pub rest_url: String,
}

/// Everything the report needs besides the samples.
#[derive(Debug, Clone)]
pub struct ReportContext {
    pub chain: ChainInfo,
    pub gas_price: GasPrice,
    pub estimator: EstimatorConfig,
    pub generated_at: String,
    pub rpc: RpcMetricsSnapshot,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SegmentReport {
    pub title: String,
    pub fit: Option<RegressionResult>,
    /// Why the segment could not be fit.
    pub error: Option<String>,
}

impl SegmentReport {
    fn from_result(title: String, r: &Result<RegressionResult, RegressionError>) -> Self {
        match r {
            Ok(fit) => Self { title, fit: Some(fit.clone()), error: None },
            Err(e) => Self { title, fit: None, error: Some(e.to_string()) },
        }
    }
}

/// A confirmed character/format case compared against the overall line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpecialCase {
    pub label: String,
    pub kind: CaseKind,
    pub payload_size: u64,
    pub gas_used: u64,
    pub cost: f64,
    /// `gas_used − predicted`, when an overall fit exists.
    pub delta_vs_fit: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailureLine {
    pub label: String,
    pub payload_size: u64,
    pub outcome: Outcome,
    pub tx_hash: Option<String>,
    pub error: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SummaryReport {
    pub generated_at: String,
    pub chain: ChainInfo,
    pub gas_price: GasPrice,
    pub tally: RunTally,
    pub threshold: u64,
    pub overall: SegmentReport,
    pub small: SegmentReport,
    pub large: SegmentReport,
    pub formula: Option<String>,
    pub estimates: Vec<CostEstimate>,
    pub special_cases: Vec<SpecialCase>,
    pub failures: Vec<FailureLine>,
    pub rpc: RpcMetricsSnapshot,
    pub cross_check: Option<CrossCheck>,
}

/// Samples feeding the regression: confirmed length cases. A suite without
/// length cases falls back to every confirmed sample.
pub fn regression_samples(samples: &[Sample]) -> Vec<&Sample> {
    let has_lengths = samples.iter().any(|s| s.kind == CaseKind::Length);
    samples
        .iter()
        .filter(|s| !has_lengths || s.kind == CaseKind::Length)
        .filter(|s| s.observation().is_some())
        .collect()
}

pub fn regression_input(samples: &[Sample]) -> Vec<Obs> {
    regression_samples(samples).into_iter().filter_map(|s| s.observation()).map(Obs::from).collect()
}

pub fn fit(samples: &[Sample], cfg: &EstimatorConfig) -> SegmentedRegression {
    fit_segmented("gas", &regression_input(samples), cfg.small_threshold)
}

pub fn summarize(
    ctx: &ReportContext,
    samples: &[Sample],
    seg: &SegmentedRegression,
) -> SummaryReport {
    let overall_fit = seg.overall.as_ref().ok();
    let estimates = overall_fit
        .map(|r| {
            estimate_at(
                r,
                &ctx.estimator.reference_sizes,
                &ctx.gas_price,
                ctx.estimator.gas_slack,
                ctx.estimator.gas_safety_pct,
            )
        })
        .unwrap_or_default();

    let special_cases = samples
        .iter()
        .filter(|s| s.kind != CaseKind::Length)
        .filter_map(|s| {
            let (size, gas) = s.observation()?;
            Some(SpecialCase {
                label: s.label.clone(),
                kind: s.kind,
                payload_size: size,
                gas_used: gas,
                cost: s.cost.unwrap_or_default(),
                delta_vs_fit: overall_fit.map(|r| round_to(gas as f64 - r.predict(size as f64), 2)),
            })
        })
        .collect();

    let failures = samples
        .iter()
        .filter(|s| !s.is_confirmed() || s.observation().is_none())
        .map(|s| FailureLine {
            label: s.label.clone(),
            payload_size: s.payload_size,
            outcome: s.outcome,
            tx_hash: s.tx_hash.clone(),
            error: s.error.clone().unwrap_or_default(),
        })
        .collect();

    let t = seg.threshold;
    SummaryReport {
        generated_at: ctx.generated_at.clone(),
        chain: ctx.chain.clone(),
        gas_price: ctx.gas_price.clone(),
        tally: RunTally::from_samples(samples),
        threshold: t,
        overall: SegmentReport::from_result("all sizes".into(), &seg.overall),
        small: SegmentReport::from_result(format!("≤ {t} bytes"), &seg.small),
        large: SegmentReport::from_result(format!("> {t} bytes"), &seg.large),
        formula: overall_fit.map(RegressionResult::formula),
        estimates,
        special_cases,
        failures,
        rpc: ctx.rpc.clone(),
        cross_check: None,
    }
}

impl SummaryReport {
    pub fn with_cross_check(mut self, check: CrossCheck) -> Self {
        self.cross_check = Some(check);
        self
    }
}

fn write_segment(f: &mut fmt::Formatter<'_>, seg: &SegmentReport) -> fmt::Result {
    match (&seg.fit, &seg.error) {
        (Some(r), _) => {
            writeln!(f, "Regression ({}, n={})", seg.title, r.samples)?;
            writeln!(f, "  {}", r.formula())?;
            writeln!(f, "  Base gas cost:          {:.2} gas units", r.intercept)?;
            writeln!(f, "  Marginal cost per byte: {:.2} gas units", r.slope)?;
            writeln!(f, "  R-squared:              {:.4}", r.r_squared)
        }
        (None, err) => writeln!(
            f,
            "Regression ({}): not computed ({})",
            seg.title,
            err.as_deref().unwrap_or("no data")
        ),
    }
}

impl fmt::Display for SummaryReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let display = self.gas_price.display_denom();
        writeln!(f, "Gas Benchmark Report")?;
        writeln!(f, "====================")?;
        writeln!(f, "Generated:  {}", self.generated_at)?;
        writeln!(f, "Chain ID:   {}", self.chain.chain_id)?;
        writeln!(f, "Contract:   {}", self.chain.contract)?;
        writeln!(f, "REST:       {}", self.chain.rest_url)?;
        writeln!(
            f,
            "Gas price:  {} (1 {} = 10^{} {})",
            self.gas_price, display, self.gas_price.display_exponent, self.gas_price.denom
        )?;
        writeln!(
            f,
            "Run:        {}/{} confirmed, {} failed, {} timed out",
            self.tally.confirmed, self.tally.total, self.tally.failed, self.tally.timed_out
        )?;
        writeln!(f)?;

        write_segment(f, &self.overall)?;
        write_segment(f, &self.small)?;
        write_segment(f, &self.large)?;

        if let Some(formula) = &self.formula {
            writeln!(f)?;
            writeln!(f, "Formula: {formula}")?;
        }

        if !self.estimates.is_empty() {
            writeln!(f)?;
            writeln!(f, "Reference sizes")?;
            writeln!(
                f,
                "  {:>8}  {:>12}  {:>14}  {:>14}  {:>10}",
                "bytes",
                "gas",
                self.gas_price.denom,
                display,
                "gas limit"
            )?;
            for e in &self.estimates {
                writeln!(
                    f,
                    "  {:>8}  {:>12.2}  {:>14.4}  {:>14.8}  {:>10}",
                    e.size, e.gas, e.cost, e.display_cost, e.recommended_gas_limit
                )?;
            }
        }

        if !self.special_cases.is_empty() {
            writeln!(f)?;
            writeln!(f, "Special cases")?;
            for s in &self.special_cases {
                let delta = s
                    .delta_vs_fit
                    .map(|d| format!("{d:+.2}"))
                    .unwrap_or_else(|| "-".into());
                writeln!(
                    f,
                    "  {:<10} {:<9} {:>6} bytes  {:>9} gas  {:>12.4} {}  Δ vs fit {}",
                    s.label,
                    s.kind.as_str(),
                    s.payload_size,
                    s.gas_used,
                    s.cost,
                    self.gas_price.denom,
                    delta
                )?;
            }
        }

        if !self.failures.is_empty() {
            writeln!(f)?;
            writeln!(f, "Failures")?;
            for x in &self.failures {
                writeln!(
                    f,
                    "  {:<10} {:>6} bytes  {:<9} tx={}  {}",
                    x.label,
                    x.payload_size,
                    x.outcome.as_str(),
                    x.tx_hash.as_deref().unwrap_or("-"),
                    x.error
                )?;
            }
        }

        writeln!(f)?;
        writeln!(
            f,
            "RPC calls: submit={} (errors {}), tx queries={} (not found {}, errors {}), \
             contract queries={}, account queries={}",
            self.rpc.submit,
            self.rpc.submit_err,
            self.rpc.tx_query,
            self.rpc.tx_not_found,
            self.rpc.tx_query_err,
            self.rpc.contract_query,
            self.rpc.account_query
        )?;

        if let Some(cc) = &self.cross_check {
            writeln!(f)?;
            write!(f, "{cc}")?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChartPoint {
    pub x: u64,
    pub y: u64,
    pub label: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LinePoint {
    pub x: f64,
    pub y: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChartData {
    pub points: Vec<ChartPoint>,
    /// Overall fit from x = 0 to 1.1 × the largest payload.
    pub line: Option<[LinePoint; 2]>,
    /// Small-segment fit over `[0, threshold]`.
    pub small_line: Option<[LinePoint; 2]>,
    pub formula: Option<String>,
    pub r_squared: Option<f64>,
}

fn endpoints(r: &RegressionResult, x_max: f64) -> [LinePoint; 2] {
    [LinePoint { x: 0.0, y: r.predict(0.0) }, LinePoint { x: x_max, y: r.predict(x_max) }]
}

/// Points come from the same samples the regression saw, in sample order.
pub fn chart_data(samples: &[Sample], seg: &SegmentedRegression) -> ChartData {
    let points: Vec<ChartPoint> = regression_samples(samples)
        .into_iter()
        .filter_map(|s| s.observation().map(|(x, y)| ChartPoint { x, y, label: s.label.clone() }))
        .collect();
    let max_x = points.iter().map(|p| p.x).max();

    let overall = seg.overall.as_ref().ok();
    ChartData {
        // 1.1 × max, written as ×11/10 so round sizes stay exact
        line: overall.zip(max_x).map(|(r, m)| endpoints(r, m as f64 * 11.0 / 10.0)),
        small_line: seg.small.as_ref().ok().map(|r| endpoints(r, seg.threshold as f64)),
        formula: overall.map(RegressionResult::formula),
        r_squared: overall.map(|r| r.r_squared),
        points,
    }
}

/// On-chain view versus what the run recorded. The contract keys messages
/// by block height, so several cases landing in one block leave one entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CrossCheck {
    pub stored_messages: usize,
    pub stored_bytes: u64,
    pub blocks_checked: usize,
    pub blocks_matched: usize,
    /// Heights with a confirmed case but no stored message.
    pub missing: Vec<u64>,
    /// Heights whose stored length matches none of the cases confirmed there.
    pub mismatched: Vec<LengthMismatch>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LengthMismatch {
    pub height: u64,
    pub stored_length: u64,
    pub sample_sizes: Vec<u64>,
}

impl CrossCheck {
    pub fn is_consistent(&self) -> bool {
        self.missing.is_empty() && self.mismatched.is_empty()
    }
}

pub fn cross_check(samples: &[Sample], onchain: &ListMessagesResponse) -> CrossCheck {
    let mut by_height: BTreeMap<u64, Vec<u64>> = BTreeMap::new();
    for s in samples.iter().filter(|s| s.observation().is_some()) {
        if let Some(h) = s.block_height {
            by_height.entry(h).or_default().push(s.payload_size);
        }
    }
    let stored: BTreeMap<&str, u64> =
        onchain.messages.iter().map(|m| (m.id.as_str(), m.length)).collect();

    let mut missing = Vec::new();
    let mut mismatched = Vec::new();
    for (height, sizes) in &by_height {
        match stored.get(format!("msg_{height}").as_str()) {
            None => missing.push(*height),
            Some(len) if !sizes.contains(len) => mismatched.push(LengthMismatch {
                height: *height,
                stored_length: *len,
                sample_sizes: sizes.clone(),
            }),
            Some(_) => {}
        }
    }

    CrossCheck {
        stored_messages: onchain.messages.len(),
        stored_bytes: onchain.total_length(),
        blocks_checked: by_height.len(),
        blocks_matched: by_height.len() - missing.len() - mismatched.len(),
        missing,
        mismatched,
    }
}

impl fmt::Display for CrossCheck {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "On-chain cross-check: {} stored messages ({} bytes); {}/{} blocks match",
            self.stored_messages, self.stored_bytes, self.blocks_matched, self.blocks_checked
        )?;
        for h in &self.missing {
            writeln!(f, "  height {h}: no stored message")?;
        }
        for m in &self.mismatched {
            writeln!(
                f,
                "  height {}: stored length {} not in recorded sizes {:?}",
                m.height, m.stored_length, m.sample_sizes
            )?;
        }
        Ok(())
    }
}
