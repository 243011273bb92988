//! Run artifacts on disk: samples, report and chart, in one directory per run.

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;

use gasbench_types::Sample;

use crate::report::{ChartData, SummaryReport};

pub const SAMPLES_CSV: &str = "samples.csv";
pub const SAMPLES_JSONL: &str = "samples.jsonl";
pub const REPORT_TXT: &str = "report.txt";
pub const REPORT_JSON: &str = "report.json";
pub const CHART_JSON: &str = "chart.json";
pub const CHART_HTML: &str = "chart.html";

const CHART_TEMPLATE: &str = include_str!("chart.html");
const CHART_PLACEHOLDER: &str = "__CHART_DATA__";

/// `{base}/run-YYYYMMDD-HHMMSS`, created if missing.
pub fn create_run_dir(base: &Path, started: DateTime<Utc>) -> Result<PathBuf> {
    let dir = base.join(format!("run-{}", started.format("%Y%m%d-%H%M%S")));
    fs::create_dir_all(&dir).with_context(|| format!("create output dir {}", dir.display()))?;
    Ok(dir)
}

#[derive(Serialize)]
struct CsvRow<'a> {
    label: &'a str,
    kind: &'static str,
    payload_size: u64,
    message_bytes: u64,
    gas_used: Option<u64>,
    cost: Option<f64>,
    tx_hash: Option<&'a str>,
    outcome: &'static str,
    error: Option<&'a str>,
}

impl<'a> From<&'a Sample> for CsvRow<'a> {
    fn from(s: &'a Sample) -> Self {
        CsvRow {
            label: &s.label,
            kind: s.kind.as_str(),
            payload_size: s.payload_size,
            message_bytes: s.message_bytes,
            gas_used: s.gas_used,
            cost: s.cost,
            tx_hash: s.tx_hash.as_deref(),
            outcome: s.outcome.as_str(),
            error: s.error.as_deref(),
        }
    }
}

/// One row per sample, in run order; failed cases keep empty gas/cost cells.
pub fn write_samples_csv(path: &Path, samples: &[Sample]) -> Result<()> {
    let mut w = csv::WriterBuilder::new()
        .has_headers(true)
        .from_path(path)
        .with_context(|| format!("open {}", path.display()))?;
    for s in samples {
        w.serialize(CsvRow::from(s)).with_context(|| format!("write csv row {}", s.label))?;
    }
    w.flush().with_context(|| format!("flush {}", path.display()))?;
    Ok(())
}

/// One JSON document per line.
pub fn write_jsonl<T: Serialize>(path: &Path, values: &[T]) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let file = File::create(path).with_context(|| format!("create {}", path.display()))?;
    let mut out = BufWriter::new(file);
    for value in values {
        serde_json::to_writer(&mut out, value)?;
        out.write_all(b"\n")?;
    }
    out.flush()?;
    Ok(())
}

fn write_pretty_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let body = serde_json::to_string_pretty(value)?;
    fs::write(path, body).with_context(|| format!("write {}", path.display()))
}

/// Written before any regression work so a failed fit never loses the raw data.
pub fn write_samples(dir: &Path, samples: &[Sample]) -> Result<()> {
    write_samples_csv(&dir.join(SAMPLES_CSV), samples)?;
    write_jsonl(&dir.join(SAMPLES_JSONL), samples)
}

pub fn write_report(dir: &Path, report: &SummaryReport) -> Result<()> {
    fs::write(dir.join(REPORT_TXT), report.to_string())
        .with_context(|| format!("write {}", dir.join(REPORT_TXT).display()))?;
    write_pretty_json(&dir.join(REPORT_JSON), report)
}

pub fn write_chart(dir: &Path, chart: &ChartData) -> Result<()> {
    write_pretty_json(&dir.join(CHART_JSON), chart)?;
    fs::write(dir.join(CHART_HTML), render_chart_html(chart)?)
        .with_context(|| format!("write {}", dir.join(CHART_HTML).display()))
}

/// Self-contained page; the payload is inlined into a `<script>` block.
pub fn render_chart_html(chart: &ChartData) -> Result<String> {
    // "</script>" inside a label must not terminate the block
    let data = serde_json::to_string(chart)?.replace("</", "<\\/");
    Ok(CHART_TEMPLATE.replace(CHART_PLACEHOLDER, &data))
}
