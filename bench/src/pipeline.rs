//! One benchmark run end to end: drive the suite, persist samples, fit, report.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use chrono::{DateTime, SecondsFormat, Utc};
use tracing::{error, info, warn};

use gasbench_types::{RunTally, TestCase};

use crate::chain::{
    list_messages, ContractQuery, ContractSubmitter, LedgerQuery, RpcMetrics, RpcMetricsSnapshot,
};
use crate::config::BenchConfig;
use crate::driver::BatchDriver;
use crate::export;
use crate::report::{self, ChainInfo, ReportContext, SummaryReport};
use crate::watcher::ConfirmationWatcher;

/// The chain as seen by one run.
pub struct Collaborators {
    pub submitter: Arc<dyn ContractSubmitter>,
    pub ledger: Arc<dyn LedgerQuery>,
    pub contracts: Arc<dyn ContractQuery>,
    /// Counters of every client above, merged into the report.
    pub metrics: Vec<Arc<RpcMetrics>>,
}

#[derive(Debug)]
pub struct RunSummary {
    pub dir: PathBuf,
    pub tally: RunTally,
    pub report: SummaryReport,
}

fn merged_metrics(metrics: &[Arc<RpcMetrics>]) -> RpcMetricsSnapshot {
    metrics
        .iter()
        .fold(RpcMetricsSnapshot::default(), |acc, m| acc.merge(&m.snapshot()))
}

/// Per-case failures and failed fits end up in the report; only I/O on the
/// output directory aborts the run.
pub async fn run_suite(
    cfg: &BenchConfig,
    chain: Collaborators,
    cases: &[TestCase],
    started: DateTime<Utc>,
) -> Result<RunSummary> {
    let dir = export::create_run_dir(&cfg.output.dir, started)?;
    info!(target: "report", dir = %dir.display(), cases = cases.len(), "starting run");

    let watcher = ConfirmationWatcher::new(Arc::clone(&chain.ledger), cfg.watch_config());
    let driver = BatchDriver::new(
        Arc::clone(&chain.submitter),
        watcher,
        cfg.chain.contract.clone(),
        cfg.driver_config(),
    );
    let outcome = driver.run(cases).await;

    export::write_samples(&dir, &outcome.samples)?;

    let seg = report::fit(&outcome.samples, &cfg.estimator);
    match &seg.overall {
        Ok(r) => info!(
            target: "report",
            intercept = r.intercept,
            slope = r.slope,
            r_squared = r.r_squared,
            samples = r.samples,
            "regression fitted"
        ),
        Err(e) => error!(
            target: "report",
            error = %e,
            "regression not computed; samples were still written"
        ),
    }

    let cross_check = if cfg.output.cross_check {
        match list_messages(chain.contracts.as_ref(), &cfg.chain.contract).await {
            Ok(onchain) => Some(report::cross_check(&outcome.samples, &onchain)),
            Err(e) => {
                warn!(target: "report", error = %e, "on-chain cross-check skipped");
                None
            }
        }
    } else {
        None
    };

    let ctx = ReportContext {
        chain: ChainInfo {
            chain_id: cfg.chain.chain_id.clone(),
            contract: cfg.chain.contract.clone(),
            rest_url: cfg.chain.rest_url.clone(),
        },
        gas_price: cfg.gas_price(),
        estimator: cfg.estimator.clone(),
        generated_at: started.to_rfc3339_opts(SecondsFormat::Secs, true),
        rpc: merged_metrics(&chain.metrics),
    };
    let mut summary = report::summarize(&ctx, &outcome.samples, &seg);
    if let Some(cc) = cross_check {
        if !cc.is_consistent() {
            warn!(
                target: "report",
                missing = cc.missing.len(),
                mismatched = cc.mismatched.len(),
                "on-chain state differs from recorded samples"
            );
        }
        summary = summary.with_cross_check(cc);
    }

    export::write_report(&dir, &summary)?;
    export::write_chart(&dir, &report::chart_data(&outcome.samples, &seg))?;
    info!(target: "report", dir = %dir.display(), "artifacts written");

    Ok(RunSummary { dir, tally: outcome.tally, report: summary })
}
