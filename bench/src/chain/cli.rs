use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tokio::process::Command;
use tokio::sync::Mutex;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use gasbench_types::{ExecuteMsg, SubmitReceipt};

use super::{AccountQuery, ChainError, ContractSubmitter, RpcMetrics, CODE_SEQUENCE_MISMATCH};

#[derive(Debug, Clone)]
pub struct CliConfig {
    /// Node binary, e.g. `babylond`.
    pub binary: String,
    pub key_name: String,
    pub keyring_backend: String,
    pub home: Option<PathBuf>,
    pub chain_id: String,
    /// Tendermint RPC endpoint passed as `--node`.
    pub node: String,
    /// Fee price as the CLI expects it, e.g. `0.002ubbn`.
    pub gas_prices: String,
    pub gas_adjustment: f64,
    pub command_timeout: Duration,
}

/// Account number and next sequence of the single signing key. `None`
/// means "ask the chain before the next broadcast".
#[derive(Debug, Default)]
struct SignerState {
    address: Option<String>,
    account_number: u64,
    next_sequence: Option<u64>,
}

impl SignerState {
    fn commit(&mut self, used: u64) {
        self.next_sequence = Some(used + 1);
    }

    /// Adopt the sequence the chain told us it expects, or drop our guess.
    fn resync_from(&mut self, log: &str) {
        self.next_sequence = expected_sequence(log);
    }
}

/// Signs and broadcasts through the node CLI. Broadcasts are serialized so
/// sequence numbers go out strictly in order; confirmation is someone else's job.
pub struct CliSubmitter {
    cfg: CliConfig,
    accounts: Arc<dyn AccountQuery>,
    state: Mutex<SignerState>,
    metrics: Arc<RpcMetrics>,
}

#[derive(Debug, Deserialize)]
struct BroadcastOutput {
    txhash: String,
    #[serde(default)]
    code: u32,
    #[serde(default)]
    raw_log: String,
    #[serde(default, with = "gasbench_types::serde::serde_u64_string")]
    gas_wanted: u64,
}

impl CliSubmitter {
    pub fn new(cfg: CliConfig, accounts: Arc<dyn AccountQuery>) -> Self {
        Self {
            cfg,
            accounts,
            state: Mutex::new(SignerState::default()),
            metrics: Arc::new(RpcMetrics::default()),
        }
    }

    pub fn metrics(&self) -> Arc<RpcMetrics> {
        Arc::clone(&self.metrics)
    }

    fn keyring_args(&self) -> Vec<String> {
        let mut args = vec!["--keyring-backend".to_string(), self.cfg.keyring_backend.clone()];
        if let Some(home) = &self.cfg.home {
            args.push("--home".to_string());
            args.push(home.display().to_string());
        }
        args
    }

    fn execute_args(
        &self,
        contract: &str,
        msg_json: &str,
        account_number: u64,
        sequence: u64,
    ) -> Vec<String> {
        let mut args: Vec<String> = [
            "tx",
            "wasm",
            "execute",
            contract,
            msg_json,
            "--from",
            self.cfg.key_name.as_str(),
            "--chain-id",
            self.cfg.chain_id.as_str(),
            "--node",
            self.cfg.node.as_str(),
            "--gas",
            "auto",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect();
        args.extend([
            "--gas-adjustment".to_string(),
            self.cfg.gas_adjustment.to_string(),
            "--gas-prices".to_string(),
            self.cfg.gas_prices.clone(),
            "--broadcast-mode".to_string(),
            "sync".to_string(),
            "--output".to_string(),
            "json".to_string(),
            "--yes".to_string(),
            "--account-number".to_string(),
            account_number.to_string(),
            "--sequence".to_string(),
            sequence.to_string(),
        ]);
        args.extend(self.keyring_args());
        args
    }

    async fn run(&self, args: &[String]) -> Result<std::process::Output, ChainError> {
        let child = Command::new(&self.cfg.binary)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| ChainError::Cli(format!("failed to spawn {}: {e}", self.cfg.binary)))?;

        timeout(self.cfg.command_timeout, child.wait_with_output())
            .await
            .map_err(|_| {
                ChainError::Cli(format!(
                    "{} did not exit within {:?}",
                    self.cfg.binary, self.cfg.command_timeout
                ))
            })?
            .map_err(|e| ChainError::Cli(format!("waiting for {}: {e}", self.cfg.binary)))
    }

    async fn signer_address(&self, state: &mut SignerState) -> Result<String, ChainError> {
        if let Some(addr) = &state.address {
            return Ok(addr.clone());
        }
        let mut args = vec![
            "keys".to_string(),
            "show".to_string(),
            self.cfg.key_name.clone(),
            "-a".to_string(),
        ];
        args.extend(self.keyring_args());
        let out = self.run(&args).await?;
        if !out.status.success() {
            return Err(ChainError::Cli(format!(
                "keys show {} failed: {}",
                self.cfg.key_name,
                String::from_utf8_lossy(&out.stderr).trim()
            )));
        }
        let addr = String::from_utf8_lossy(&out.stdout).trim().to_string();
        if addr.is_empty() {
            return Err(ChainError::Cli(format!(
                "keys show {} printed no address",
                self.cfg.key_name
            )));
        }
        state.address = Some(addr.clone());
        Ok(addr)
    }

    /// (account_number, sequence) for the next broadcast.
    async fn reserve_sequence(&self, state: &mut SignerState) -> Result<(u64, u64), ChainError> {
        let address = self.signer_address(state).await?;
        if let Some(seq) = state.next_sequence {
            return Ok((state.account_number, seq));
        }
        let info = self.accounts.query_account(&address).await?;
        info!(
            target: "chain",
            address = %address,
            account_number = info.account_number,
            sequence = info.sequence,
            "signer sequence synced from chain"
        );
        state.account_number = info.account_number;
        state.next_sequence = Some(info.sequence);
        Ok((info.account_number, info.sequence))
    }
}

#[async_trait]
impl ContractSubmitter for CliSubmitter {
    async fn submit(&self, contract: &str, msg: &ExecuteMsg) -> Result<SubmitReceipt, ChainError> {
        let msg_json = serde_json::to_string(msg).map_err(|e| ChainError::Decode(e.to_string()))?;

        let mut state = self.state.lock().await;
        let (account_number, sequence) = self.reserve_sequence(&mut state).await?;
        let args = self.execute_args(contract, &msg_json, account_number, sequence);
        debug!(
            target: "chain",
            contract,
            sequence,
            msg_bytes = msg_json.len(),
            "broadcasting execute"
        );

        let output = match self.run(&args).await {
            Ok(o) => o,
            Err(e) => {
                // unknown whether it reached the mempool
                state.next_sequence = None;
                self.metrics.track_submit(false);
                return Err(e);
            }
        };
        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);

        let parsed = match parse_broadcast_output(&stdout) {
            Ok(p) => p,
            Err(decode_err) => {
                self.metrics.track_submit(false);
                if stderr.contains("account sequence mismatch") {
                    state.resync_from(&stderr);
                    return Err(ChainError::Rejected {
                        code: CODE_SEQUENCE_MISMATCH,
                        raw_log: stderr.trim().to_string(),
                    });
                }
                if !output.status.success() {
                    warn!(
                        target: "chain",
                        exit_code = ?output.status.code(),
                        stderr = %stderr.trim(),
                        "execute command failed"
                    );
                    return Err(ChainError::Cli(format!(
                        "{} exited with {:?}: {}",
                        self.cfg.binary,
                        output.status.code(),
                        stderr.trim()
                    )));
                }
                return Err(decode_err);
            }
        };

        if parsed.code != 0 {
            self.metrics.track_submit(false);
            if parsed.code == CODE_SEQUENCE_MISMATCH {
                state.resync_from(&parsed.raw_log);
            }
            return Err(ChainError::Rejected { code: parsed.code, raw_log: parsed.raw_log });
        }

        state.commit(sequence);
        self.metrics.track_submit(true);
        let reported_gas =
            parse_gas_estimate(&stderr).or((parsed.gas_wanted > 0).then_some(parsed.gas_wanted));
        Ok(SubmitReceipt { tx_hash: parsed.txhash, reported_gas })
    }
}

/// The CLI may print warnings before the JSON document; decode from the first `{`.
fn parse_broadcast_output(stdout: &str) -> Result<BroadcastOutput, ChainError> {
    let start = stdout
        .find('{')
        .ok_or_else(|| {
            ChainError::Decode(format!("no JSON in broadcast output: {:?}", stdout.trim()))
        })?;
    let out: BroadcastOutput = serde_json::from_str(stdout[start..].trim_end())
        .map_err(|e| ChainError::Decode(format!("broadcast output: {e}")))?;
    if out.txhash.is_empty() {
        return Err(ChainError::Decode("broadcast output has empty txhash".into()));
    }
    Ok(out)
}

/// `gas estimate: 142311` as printed by `--gas auto`.
fn parse_gas_estimate(stderr: &str) -> Option<u64> {
    stderr
        .lines()
        .find_map(|line| line.trim().strip_prefix("gas estimate:"))
        .and_then(|rest| rest.trim().parse().ok())
}

/// Pulls N out of `account sequence mismatch, expected N, got M`.
fn expected_sequence(log: &str) -> Option<u64> {
    let rest = &log[log.find("expected ")? + "expected ".len()..];
    let digits: String = rest.chars().take_while(|c| c.is_ascii_digit()).collect();
    digits.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::AccountInfo;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct NoAccounts;

    #[async_trait]
    impl AccountQuery for NoAccounts {
        async fn query_account(&self, address: &str) -> Result<AccountInfo, ChainError> {
            Ok(AccountInfo { address: address.to_string(), account_number: 0, sequence: 0 })
        }
    }

    fn config(binary: &str) -> CliConfig {
        CliConfig {
            binary: binary.into(),
            key_name: "bench".into(),
            keyring_backend: "test".into(),
            home: Some(PathBuf::from("/tmp/bbn")),
            chain_id: "bbn-test-5".into(),
            node: "https://rpc.example:443".into(),
            gas_prices: "0.002ubbn".into(),
            gas_adjustment: 1.3,
            command_timeout: Duration::from_secs(30),
        }
    }

    fn submitter() -> CliSubmitter {
        CliSubmitter::new(config("babylond"), Arc::new(NoAccounts))
    }

    #[test]
    fn execute_args_pin_account_and_sequence() {
        let msg = r#"{"store_message":{"content":"a"}}"#;
        let args = submitter().execute_args("bbn1store", msg, 17, 204);
        let joined = args.join(" ");
        assert!(joined.starts_with(&format!("tx wasm execute bbn1store {msg} --from bench")));
        assert!(joined.contains("--gas auto --gas-adjustment 1.3 --gas-prices 0.002ubbn"));
        assert!(joined.contains("--broadcast-mode sync --output json --yes"));
        assert!(joined.contains("--account-number 17 --sequence 204"));
        assert!(joined.ends_with("--keyring-backend test --home /tmp/bbn"));
    }

    #[test]
    fn broadcast_output_after_warning_lines() {
        let stdout = concat!(
            "WARNING: using insecure keyring\n",
            r#"{"height":"0","txhash":"F00D","code":0,"raw_log":"","gas_wanted":"0"}"#,
            "\n",
        );
        let out = parse_broadcast_output(stdout).expect("parse");
        assert_eq!(out.txhash, "F00D");
        assert_eq!(out.code, 0);

        let rejected = r#"{"txhash":"BEEF","code":32,
            "raw_log":"account sequence mismatch, expected 9, got 7: incorrect account sequence"}"#;
        let out = parse_broadcast_output(rejected).expect("parse");
        assert_eq!(out.code, CODE_SEQUENCE_MISMATCH);
        assert_eq!(expected_sequence(&out.raw_log), Some(9));
    }

    #[test]
    fn garbage_output_is_decode_error() {
        let not_json = parse_broadcast_output("Error: key not found");
        assert!(matches!(not_json, Err(ChainError::Decode(_))));
        assert!(matches!(parse_broadcast_output(r#"{"txhash":""}"#), Err(ChainError::Decode(_))));
    }

    #[test]
    fn gas_estimate_line() {
        assert_eq!(parse_gas_estimate("gas estimate: 142311\n"), Some(142_311));
        assert_eq!(parse_gas_estimate("nothing here"), None);
    }

    struct CountingAccounts {
        sequence: u64,
        queries: AtomicUsize,
    }

    #[async_trait]
    impl AccountQuery for CountingAccounts {
        async fn query_account(&self, address: &str) -> Result<AccountInfo, ChainError> {
            self.queries.fetch_add(1, Ordering::SeqCst);
            Ok(AccountInfo {
                address: address.to_string(),
                account_number: 17,
                sequence: self.sequence,
            })
        }
    }

    /// Stand-in node binary. Appends every `--sequence` it is given to
    /// `sequences.log` and answers like `tx wasm execute --output json`; a
    /// `reject-json` or `reject-stderr` file in its directory makes the next
    /// broadcast fail with a sequence mismatch expecting the number inside.
    /// Writing an executable while another test forks can fail the exec with
    /// ETXTBSY; tests that run a fake node hold this for their whole body.
    #[cfg(unix)]
    static FAKE_NODE: tokio::sync::Mutex<()> = tokio::sync::Mutex::const_new(());

    #[cfg(unix)]
    fn fake_node(dir: &std::path::Path) -> PathBuf {
        use std::os::unix::fs::PermissionsExt;

        let d = dir.display();
        let script = format!(
            r#"#!/bin/sh
if [ "$1" = "keys" ]; then echo bbn1signer; exit 0; fi
seq=""
prev=""
for a in "$@"; do
  if [ "$prev" = "--sequence" ]; then seq="$a"; fi
  prev="$a"
done
echo "$seq" >> "{d}/sequences.log"
if [ -f "{d}/reject-json" ]; then
  want=$(cat "{d}/reject-json"); rm "{d}/reject-json"
  printf '{{"txhash":"R%s","code":32,"raw_log":"%s"}}\n' "$seq" \
    "account sequence mismatch, expected $want, got $seq: incorrect account sequence"
  exit 0
fi
if [ -f "{d}/reject-stderr" ]; then
  want=$(cat "{d}/reject-stderr"); rm "{d}/reject-stderr"
  echo "Error: account sequence mismatch, expected $want, got $seq: incorrect account sequence" \
    >&2
  exit 1
fi
echo "gas estimate: 150000" >&2
printf '{{"height":"0","txhash":"H%s","code":0,"raw_log":"","gas_wanted":"195000"}}\n' "$seq"
"#
        );
        let path = dir.join("fake-babylond");
        std::fs::write(&path, script).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    #[cfg(unix)]
    fn logged_sequences(dir: &std::path::Path) -> Vec<u64> {
        std::fs::read_to_string(dir.join("sequences.log"))
            .unwrap()
            .lines()
            .map(|l| l.parse().unwrap())
            .collect()
    }

    #[cfg(unix)]
    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_submits_take_consecutive_sequences() {
        let _node = FAKE_NODE.lock().await;
        let dir = tempfile::tempdir().unwrap();
        let node = fake_node(dir.path());
        let accounts = Arc::new(CountingAccounts { sequence: 40, queries: AtomicUsize::new(0) });
        let submitter = CliSubmitter::new(config(&node.display().to_string()), accounts.clone());
        let msgs: Vec<ExecuteMsg> = ["a", "bb", "ccc"].into_iter().map(ExecuteMsg::store).collect();

        let submits = msgs.iter().map(|m| submitter.submit("bbn1store", m));
        let receipts = futures::future::join_all(submits).await;
        let mut hashes: Vec<String> = receipts
            .into_iter()
            .map(|r| {
                let r = r.expect("accepted");
                assert_eq!(r.reported_gas, Some(150_000));
                r.tx_hash
            })
            .collect();
        hashes.sort();
        assert_eq!(hashes, ["H40", "H41", "H42"]);
        // broadcasts never interleave, so the log is strictly ascending
        assert_eq!(logged_sequences(dir.path()), [40, 41, 42]);
        assert_eq!(accounts.queries.load(Ordering::SeqCst), 1);

        let snap = submitter.metrics().snapshot();
        assert_eq!((snap.submit, snap.submit_err), (3, 0));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn sequence_mismatch_resyncs_from_hint() {
        let _node = FAKE_NODE.lock().await;
        let dir = tempfile::tempdir().unwrap();
        let node = fake_node(dir.path());
        let accounts = Arc::new(CountingAccounts { sequence: 40, queries: AtomicUsize::new(0) });
        let submitter = CliSubmitter::new(config(&node.display().to_string()), accounts.clone());
        let msg = ExecuteMsg::store("payload");

        assert_eq!(submitter.submit("bbn1store", &msg).await.unwrap().tx_hash, "H40");

        std::fs::write(dir.path().join("reject-json"), "45").unwrap();
        let err = submitter.submit("bbn1store", &msg).await.unwrap_err();
        assert!(
            matches!(err, ChainError::Rejected { code: CODE_SEQUENCE_MISMATCH, .. }),
            "{err:?}"
        );
        assert!(err.is_retryable());
        assert_eq!(submitter.submit("bbn1store", &msg).await.unwrap().tx_hash, "H45");

        std::fs::write(dir.path().join("reject-stderr"), "50").unwrap();
        let err = submitter.submit("bbn1store", &msg).await.unwrap_err();
        assert!(
            matches!(err, ChainError::Rejected { code: CODE_SEQUENCE_MISMATCH, .. }),
            "{err:?}"
        );
        assert_eq!(submitter.submit("bbn1store", &msg).await.unwrap().tx_hash, "H50");

        assert_eq!(logged_sequences(dir.path()), [40, 41, 45, 46, 50]);
        // the hints were enough; the account was only read once
        assert_eq!(accounts.queries.load(Ordering::SeqCst), 1);
        assert_eq!(submitter.metrics().snapshot().submit_err, 2);
    }

    #[test]
    fn signer_state_tracks_sequence() {
        let mut st = SignerState { next_sequence: Some(4), ..Default::default() };
        st.commit(4);
        assert_eq!(st.next_sequence, Some(5));
        st.resync_from("account sequence mismatch, expected 11, got 5");
        assert_eq!(st.next_sequence, Some(11));
        st.resync_from("connection reset");
        assert_eq!(st.next_sequence, None);
    }
}
