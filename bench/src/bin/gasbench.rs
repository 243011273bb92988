use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;

use estimator::{content_bytes, estimate_message_size};
use gasbench::cases::{build_suite, render_payload, SuiteSelection};
use gasbench::chain::{CliSubmitter, RestClient};
use gasbench::{run_suite, BenchConfig, Collaborators};
use gasbench_types::{ExecuteMsg, TestCase};

/// ------- CLI args -------
#[derive(Parser, Debug)]
#[command(name = "gasbench", version, about = "CosmWasm execute gas benchmark")]
struct Args {
    /// JSON config file; flags and GASBENCH_* variables override it
    #[arg(long)]
    config: Option<PathBuf>,

    /// Message-store contract address
    #[arg(long)]
    contract: Option<String>,

    #[arg(long)]
    chain_id: Option<String>,

    /// REST (LCD) endpoint, e.g. https://lcd.testnet.example
    #[arg(long)]
    rest: Option<String>,

    /// Tendermint RPC endpoint passed to the node binary
    #[arg(long)]
    rpc: Option<String>,

    /// Node binary used to sign and broadcast
    #[arg(long)]
    node_bin: Option<String>,

    /// Keyring entry of the signer
    #[arg(long)]
    key: Option<String>,

    #[arg(long)]
    keyring_backend: Option<String>,

    /// Price per gas unit in --denom
    #[arg(long)]
    gas_price: Option<f64>,

    #[arg(long)]
    denom: Option<String>,

    /// Cases submitted concurrently per batch
    #[arg(long)]
    concurrency: Option<usize>,

    #[arg(long)]
    batch_delay_ms: Option<u64>,

    #[arg(long)]
    poll_interval_ms: Option<u64>,

    #[arg(long)]
    tx_timeout_ms: Option<u64>,

    /// Submit-then-confirm attempts per case
    #[arg(long)]
    attempts: Option<usize>,

    #[arg(long, value_enum)]
    suite: Option<SuiteSelection>,

    /// Parent directory for timestamped run output
    #[arg(long)]
    out_dir: Option<PathBuf>,

    /// Print the planned cases and exit without touching the network
    #[arg(long, default_value_t = false)]
    plan_only: bool,

    /// Skip the on-chain list_messages comparison
    #[arg(long, default_value_t = false)]
    skip_crosscheck: bool,
}

impl Args {
    fn apply(self, cfg: &mut BenchConfig) {
        let c = &mut cfg.chain;
        if let Some(v) = self.contract {
            c.contract = v;
        }
        if let Some(v) = self.chain_id {
            c.chain_id = v;
        }
        if let Some(v) = self.rest {
            c.rest_url = v;
        }
        if let Some(v) = self.rpc {
            c.rpc_url = v;
        }
        if let Some(v) = self.node_bin {
            c.node_binary = v;
        }
        if let Some(v) = self.key {
            c.key_name = v;
        }
        if let Some(v) = self.keyring_backend {
            c.keyring_backend = v;
        }
        if let Some(v) = self.gas_price {
            c.gas_price = v;
        }
        if let Some(v) = self.denom {
            c.denom = v;
        }

        let r = &mut cfg.run;
        if let Some(v) = self.concurrency {
            r.concurrency = v;
        }
        if let Some(v) = self.batch_delay_ms {
            r.batch_delay_ms = v;
        }
        if let Some(v) = self.poll_interval_ms {
            r.poll_interval_ms = v;
        }
        if let Some(v) = self.tx_timeout_ms {
            r.tx_timeout_ms = v;
        }
        if let Some(v) = self.attempts {
            r.case_attempts = v;
        }

        if let Some(v) = self.suite {
            cfg.suite.selection = v;
        }
        if let Some(v) = self.out_dir {
            cfg.output.dir = v;
        }
        if self.skip_crosscheck {
            cfg.output.cross_check = false;
        }
    }
}

fn load_config(args: Args) -> Result<BenchConfig> {
    let mut cfg = match &args.config {
        Some(path) => BenchConfig::from_file(path)?,
        None => BenchConfig::default(),
    };
    cfg.apply_env()?;
    args.apply(&mut cfg);
    Ok(cfg)
}

fn print_plan(cases: &[TestCase]) -> Result<()> {
    println!(
        "{:<4} {:<10} {:<10} {:>12} {:>14}",
        "#", "label", "kind", "payload (B)", "message (B)"
    );
    for (i, case) in cases.iter().enumerate() {
        let msg = ExecuteMsg::store(render_payload(&case.rule));
        let size = estimate_message_size(&msg)
            .with_context(|| format!("encode case {}", case.label))?;
        println!(
            "{:<4} {:<10} {:<10} {:>12} {:>14}",
            i + 1,
            case.label,
            case.kind.as_str(),
            content_bytes(msg.content()),
            size.message_bytes
        );
    }
    println!("{} cases", cases.len());
    Ok(())
}

#[tokio::main(flavor = "multi_thread")]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let plan_only = args.plan_only;
    let cfg = load_config(args)?;
    let cases = build_suite(&cfg.suite);

    if plan_only {
        return print_plan(&cases);
    }

    cfg.validate().context("configuration")?;
    info!(
        chain_id = %cfg.chain.chain_id,
        contract = %cfg.chain.contract,
        gas_price = %cfg.gas_price(),
        cases = cases.len(),
        concurrency = cfg.run.concurrency,
        "gasbench starting"
    );

    let rest = Arc::new(RestClient::new(cfg.rest_config()?).context("build REST client")?);
    let submitter = Arc::new(CliSubmitter::new(cfg.cli_config(), rest.clone()));
    let chain = Collaborators {
        metrics: vec![rest.metrics(), submitter.metrics()],
        submitter,
        ledger: rest.clone(),
        contracts: rest,
    };

    let summary = run_suite(&cfg, chain, &cases, chrono::Utc::now()).await?;
    println!("{}", summary.report);
    println!("Artifacts: {}", summary.dir.display());
    Ok(())
}
