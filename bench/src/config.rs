use std::env;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

use estimator::{EstimatorConfig, GasPrice};

use crate::cases::SuiteConfig;
use crate::chain::{CliConfig, RestConfig};
use crate::driver::DriverConfig;
use crate::watcher::WatchConfig;

const ENV_PREFIX: &str = "GASBENCH_";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("missing required setting `{0}`")]
    Missing(&'static str),
    #[error("invalid `{field}`: {reason}")]
    Invalid { field: &'static str, reason: String },
    #[error("environment variable {var}={value:?}: {reason}")]
    Env { var: String, value: String, reason: String },
    #[error("read config file {path}: {source}")]
    Io { path: PathBuf, source: std::io::Error },
    #[error("parse config file {path}: {source}")]
    Parse { path: PathBuf, source: serde_json::Error },
}

/// Target chain, signer and fee settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChainConfig {
    pub chain_id: String,
    /// Address of the deployed message-store contract.
    pub contract: String,
    /// Cosmos REST (LCD) endpoint for status and contract queries.
    pub rest_url: String,
    /// Tendermint RPC endpoint handed to the node binary.
    pub rpc_url: String,
    pub node_binary: String,
    pub key_name: String,
    pub keyring_backend: String,
    pub home: Option<PathBuf>,
    pub gas_price: f64,
    pub denom: String,
    pub display_exponent: u32,
    pub gas_adjustment: f64,
    pub request_timeout_ms: u64,
    pub connect_timeout_ms: u64,
    pub command_timeout_ms: u64,
}

impl Default for ChainConfig {
    fn default() -> Self {
        Self {
            chain_id: String::new(),
            contract: String::new(),
            rest_url: String::new(),
            rpc_url: String::new(),
            node_binary: "babylond".to_string(),
            key_name: String::new(),
            keyring_backend: "test".to_string(),
            home: None,
            gas_price: 0.002,
            denom: "ubbn".to_string(),
            display_exponent: 6,
            gas_adjustment: 1.3,
            request_timeout_ms: 10_000,
            connect_timeout_ms: 5_000,
            command_timeout_ms: 60_000,
        }
    }
}

/// Batching, polling and retry knobs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    pub concurrency: usize,
    pub batch_delay_ms: u64,
    pub poll_interval_ms: u64,
    pub tx_timeout_ms: u64,
    pub case_attempts: usize,
    pub retry_delay_ms: u64,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            concurrency: 3,
            batch_delay_ms: 2_000,
            poll_interval_ms: 3_000,
            tx_timeout_ms: 60_000,
            case_attempts: 2,
            retry_delay_ms: 1_000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Parent of the per-run timestamped directories.
    pub dir: PathBuf,
    /// Compare the contract's stored messages with the run afterwards.
    pub cross_check: bool,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self { dir: PathBuf::from("gas-results"), cross_check: true }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BenchConfig {
    pub chain: ChainConfig,
    pub run: RunConfig,
    pub suite: SuiteConfig,
    pub estimator: EstimatorConfig,
    pub output: OutputConfig,
}

fn parse_env<T: FromStr>(var: &str, value: &str) -> Result<T, ConfigError>
where
    T::Err: std::fmt::Display,
{
    value.trim().parse::<T>().map_err(|e| ConfigError::Env {
        var: var.to_string(),
        value: value.to_string(),
        reason: e.to_string(),
    })
}

impl BenchConfig {
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)
            .map_err(|source| ConfigError::Io { path: path.to_path_buf(), source })?;
        serde_json::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Overlay `GASBENCH_*` variables from the process environment.
    pub fn apply_env(&mut self) -> Result<(), ConfigError> {
        self.apply_env_from(|key| env::var(key).ok())
    }

    /// Overlay `GASBENCH_*` variables read through `lookup`; unset keys leave
    /// the current value alone, unparsable ones are an error.
    pub fn apply_env_from(
        &mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<(), ConfigError> {
        let get = |name: &str| {
            let var = format!("{ENV_PREFIX}{name}");
            lookup(&var).filter(|v| !v.is_empty()).map(|v| (var, v))
        };

        let c = &mut self.chain;
        for (name, slot) in [
            ("CHAIN_ID", &mut c.chain_id),
            ("CONTRACT", &mut c.contract),
            ("REST_URL", &mut c.rest_url),
            ("RPC_URL", &mut c.rpc_url),
            ("NODE_BIN", &mut c.node_binary),
            ("KEY", &mut c.key_name),
            ("KEYRING_BACKEND", &mut c.keyring_backend),
            ("DENOM", &mut c.denom),
        ] {
            if let Some((_, v)) = get(name) {
                *slot = v;
            }
        }
        if let Some((_, v)) = get("HOME") {
            c.home = Some(PathBuf::from(v));
        }
        if let Some((var, v)) = get("GAS_PRICE") {
            c.gas_price = parse_env(&var, &v)?;
        }

        let r = &mut self.run;
        for (name, slot) in [
            ("BATCH_DELAY_MS", &mut r.batch_delay_ms),
            ("POLL_INTERVAL_MS", &mut r.poll_interval_ms),
            ("TX_TIMEOUT_MS", &mut r.tx_timeout_ms),
            ("RETRY_DELAY_MS", &mut r.retry_delay_ms),
        ] {
            if let Some((var, v)) = get(name) {
                *slot = parse_env(&var, &v)?;
            }
        }
        if let Some((var, v)) = get("CONCURRENCY") {
            r.concurrency = parse_env(&var, &v)?;
        }
        if let Some((var, v)) = get("ATTEMPTS") {
            r.case_attempts = parse_env(&var, &v)?;
        }

        if let Some((_, v)) = get("OUT_DIR") {
            self.output.dir = PathBuf::from(v);
        }
        Ok(())
    }

    /// Checks everything a run needs before any network activity.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let c = &self.chain;
        for (field, value) in [
            ("chain.chain_id", &c.chain_id),
            ("chain.contract", &c.contract),
            ("chain.rest_url", &c.rest_url),
            ("chain.rpc_url", &c.rpc_url),
            ("chain.key_name", &c.key_name),
            ("chain.node_binary", &c.node_binary),
            ("chain.denom", &c.denom),
        ] {
            if value.trim().is_empty() {
                return Err(ConfigError::Missing(field));
            }
        }
        Url::parse(&c.rest_url)
            .map_err(|e| ConfigError::Invalid { field: "chain.rest_url", reason: e.to_string() })?;
        Url::parse(&c.rpc_url)
            .map_err(|e| ConfigError::Invalid { field: "chain.rpc_url", reason: e.to_string() })?;
        if !c.gas_price.is_finite() || c.gas_price < 0.0 {
            return Err(ConfigError::Invalid {
                field: "chain.gas_price",
                reason: format!("must be a non-negative number, got {}", c.gas_price),
            });
        }
        if !c.gas_adjustment.is_finite() || c.gas_adjustment < 1.0 {
            return Err(ConfigError::Invalid {
                field: "chain.gas_adjustment",
                reason: format!("must be >= 1.0, got {}", c.gas_adjustment),
            });
        }

        let r = &self.run;
        if r.concurrency == 0 {
            return Err(ConfigError::Invalid {
                field: "run.concurrency",
                reason: "must be at least 1".into(),
            });
        }
        if r.case_attempts == 0 {
            return Err(ConfigError::Invalid {
                field: "run.case_attempts",
                reason: "must be at least 1".into(),
            });
        }
        if r.poll_interval_ms == 0 {
            return Err(ConfigError::Invalid {
                field: "run.poll_interval_ms",
                reason: "must be positive".into(),
            });
        }
        if r.tx_timeout_ms < r.poll_interval_ms {
            return Err(ConfigError::Invalid {
                field: "run.tx_timeout_ms",
                reason: format!(
                    "{}ms is shorter than the poll interval ({}ms)",
                    r.tx_timeout_ms, r.poll_interval_ms
                ),
            });
        }
        if self.estimator.reference_sizes.is_empty() {
            return Err(ConfigError::Invalid {
                field: "estimator.reference_sizes",
                reason: "at least one size is required".into(),
            });
        }
        Ok(())
    }

    pub fn gas_price(&self) -> GasPrice {
        GasPrice {
            amount: self.chain.gas_price,
            denom: self.chain.denom.clone(),
            display_exponent: self.chain.display_exponent,
        }
    }

    pub fn watch_config(&self) -> WatchConfig {
        WatchConfig {
            timeout: Duration::from_millis(self.run.tx_timeout_ms),
            poll_interval: Duration::from_millis(self.run.poll_interval_ms),
        }
    }

    pub fn driver_config(&self) -> DriverConfig {
        DriverConfig {
            concurrency: self.run.concurrency,
            batch_delay: Duration::from_millis(self.run.batch_delay_ms),
            case_attempts: self.run.case_attempts,
            retry_delay: Duration::from_millis(self.run.retry_delay_ms),
            gas_price: self.gas_price(),
        }
    }

    pub fn rest_config(&self) -> Result<RestConfig, ConfigError> {
        let url = Url::parse(&self.chain.rest_url)
            .map_err(|e| ConfigError::Invalid { field: "chain.rest_url", reason: e.to_string() })?;
        Ok(RestConfig {
            url,
            request_timeout: Duration::from_millis(self.chain.request_timeout_ms),
            connect_timeout: Duration::from_millis(self.chain.connect_timeout_ms),
        })
    }

    pub fn cli_config(&self) -> CliConfig {
        let c = &self.chain;
        CliConfig {
            binary: c.node_binary.clone(),
            key_name: c.key_name.clone(),
            keyring_backend: c.keyring_backend.clone(),
            home: c.home.clone(),
            chain_id: c.chain_id.clone(),
            node: c.rpc_url.clone(),
            gas_prices: self.gas_price().to_string(),
            gas_adjustment: c.gas_adjustment,
            command_timeout: Duration::from_millis(c.command_timeout_ms),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn complete() -> BenchConfig {
        let mut cfg = BenchConfig::default();
        cfg.chain.chain_id = "bbn-test-5".into();
        cfg.chain.contract = "bbn1store".into();
        cfg.chain.rest_url = "https://lcd.example".into();
        cfg.chain.rpc_url = "https://rpc.example:443".into();
        cfg.chain.key_name = "bench".into();
        cfg
    }

    #[test]
    fn defaults_match_documented_knobs() {
        let cfg = BenchConfig::default();
        assert_eq!(cfg.run.concurrency, 3);
        assert_eq!(cfg.run.batch_delay_ms, 2_000);
        assert_eq!(cfg.run.poll_interval_ms, 3_000);
        assert_eq!(cfg.run.tx_timeout_ms, 60_000);
        assert_eq!(cfg.run.case_attempts, 2);
        assert_eq!(cfg.gas_price().to_string(), "0.002ubbn");
        assert_eq!(cfg.estimator.small_threshold, 200);
    }

    #[test]
    fn missing_contract_is_reported_before_anything_else_runs() {
        let mut cfg = complete();
        cfg.chain.contract.clear();
        assert!(matches!(cfg.validate(), Err(ConfigError::Missing("chain.contract"))));
        assert!(complete().validate().is_ok());
    }

    #[test]
    fn out_of_range_knobs_are_rejected() {
        fn invalid_field(cfg: &BenchConfig) -> Option<&'static str> {
            match cfg.validate() {
                Err(ConfigError::Invalid { field, .. }) => Some(field),
                _ => None,
            }
        }

        let mut cfg = complete();
        cfg.run.concurrency = 0;
        assert_eq!(invalid_field(&cfg), Some("run.concurrency"));

        let mut cfg = complete();
        cfg.chain.gas_price = f64::NAN;
        assert_eq!(invalid_field(&cfg), Some("chain.gas_price"));

        let mut cfg = complete();
        cfg.chain.rest_url = "not a url".into();
        assert_eq!(invalid_field(&cfg), Some("chain.rest_url"));

        let mut cfg = complete();
        cfg.run.tx_timeout_ms = 1_000;
        assert_eq!(invalid_field(&cfg), Some("run.tx_timeout_ms"));
    }

    #[test]
    fn env_overlays_and_rejects_garbage() {
        let vars: HashMap<&str, &str> = [
            ("GASBENCH_CONTRACT", "bbn1other"),
            ("GASBENCH_CONCURRENCY", "5"),
            ("GASBENCH_GAS_PRICE", "0.01"),
            ("GASBENCH_OUT_DIR", "/tmp/out"),
            ("GASBENCH_KEY", ""),
        ]
        .into_iter()
        .collect();
        let mut cfg = complete();
        cfg.apply_env_from(|k| vars.get(k).map(|v| v.to_string())).unwrap();
        assert_eq!(cfg.chain.contract, "bbn1other");
        assert_eq!(cfg.run.concurrency, 5);
        assert_eq!(cfg.chain.gas_price, 0.01);
        assert_eq!(cfg.output.dir, PathBuf::from("/tmp/out"));
        // empty values are treated as unset
        assert_eq!(cfg.chain.key_name, "bench");

        let err = cfg
            .apply_env_from(|k| (k == "GASBENCH_ATTEMPTS").then(|| "two".to_string()))
            .unwrap_err();
        assert!(err.to_string().contains("GASBENCH_ATTEMPTS=\"two\""));
    }

    #[test]
    fn partial_file_keeps_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bench.json");
        std::fs::write(
            &path,
            r#"{
                "chain": {"contract": "bbn1store", "gas_price": 0.02},
                "suite": {"selection": "lengths"}
            }"#,
        )
        .unwrap();
        let cfg = BenchConfig::from_file(&path).unwrap();
        assert_eq!(cfg.chain.contract, "bbn1store");
        assert_eq!(cfg.chain.denom, "ubbn");
        assert_eq!(cfg.run.concurrency, 3);
        assert_eq!(cfg.suite.selection, crate::cases::SuiteSelection::Lengths);
        assert_eq!(cfg.suite.lengths.len(), 10);

        let missing = BenchConfig::from_file(&dir.path().join("nope.json"));
        assert!(matches!(missing, Err(ConfigError::Io { .. })));
    }

    #[test]
    fn derived_component_configs() {
        let cfg = complete();
        assert_eq!(cfg.watch_config().poll_interval, Duration::from_secs(3));
        assert_eq!(cfg.driver_config().batch_delay, Duration::from_secs(2));
        assert_eq!(cfg.cli_config().gas_prices, "0.002ubbn");
        assert_eq!(cfg.rest_config().unwrap().url.as_str(), "https://lcd.example/");
    }
}
