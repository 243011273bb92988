//! Chain collaborators: contract submission, ledger status lookups and
//! contract reads, behind async traits so the watcher and the driver never
//! depend on a concrete node.
//!
//! Two implementations ship with the crate:
//! - [`RestClient`] talks to the Cosmos REST (LCD) gateway for every read.
//! - [`CliSubmitter`] signs and broadcasts through the chain's node binary,
//!   serializing sequence-number assignment for the single signer.

use std::fmt;

use async_trait::async_trait;
use gasbench_types::{ExecuteMsg, ListMessagesResponse, QueryMsg, SubmitReceipt, TxLookup};

pub mod cli;
pub mod metrics;
pub mod rest;

pub use cli::{CliConfig, CliSubmitter};
pub use metrics::{RpcMetrics, RpcMetricsSnapshot};
pub use rest::{RestClient, RestConfig};

/// Cosmos SDK `ErrWrongSequence`.
pub const CODE_SEQUENCE_MISMATCH: u32 = 32;

#[async_trait]
pub trait ContractSubmitter: Send + Sync {
    /// Sign and broadcast `msg` against `contract`; returns once the node accepted it.
    async fn submit(&self, contract: &str, msg: &ExecuteMsg) -> Result<SubmitReceipt, ChainError>;
}

#[async_trait]
pub trait LedgerQuery: Send + Sync {
    async fn query_transaction(&self, tx_hash: &str) -> Result<TxLookup, ChainError>;
}

#[async_trait]
pub trait ContractQuery: Send + Sync {
    async fn query_contract(
        &self,
        contract: &str,
        query: &serde_json::Value,
    ) -> Result<serde_json::Value, ChainError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountInfo {
    pub address: String,
    pub account_number: u64,
    pub sequence: u64,
}

#[async_trait]
pub trait AccountQuery: Send + Sync {
    async fn query_account(&self, address: &str) -> Result<AccountInfo, ChainError>;
}

/// Typed `list_messages` read used for the on-chain cross-check.
pub async fn list_messages(
    client: &dyn ContractQuery,
    contract: &str,
) -> Result<ListMessagesResponse, ChainError> {
    let query = serde_json::to_value(QueryMsg::ListMessages {})
        .map_err(|e| ChainError::Decode(format!("encode list_messages: {e}")))?;
    let data = client.query_contract(contract, &query).await?;
    serde_json::from_value(data)
        .map_err(|e| ChainError::Decode(format!("list_messages response: {e}")))
}

/// Where a request to the node broke down before any HTTP status came back.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TransportKind {
    Timeout,
    Resolve,
    Tls,
    Refused,
    Request,
    Other,
}

impl TransportKind {
    pub fn of(err: &reqwest::Error) -> Self {
        if err.is_timeout() {
            TransportKind::Timeout
        } else if err.is_connect() {
            std::iter::successors(Some(err as &(dyn std::error::Error + 'static)), |e| e.source())
                .find_map(|e| connect_failure(&e.to_string()))
                .unwrap_or(TransportKind::Refused)
        } else if err.is_request() {
            TransportKind::Request
        } else {
            TransportKind::Other
        }
    }

    /// A TLS failure is a certificate or protocol mismatch; everything else
    /// may clear up before the next attempt.
    pub fn is_transient(self) -> bool {
        self != TransportKind::Tls
    }
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            TransportKind::Timeout => "timeout",
            TransportKind::Resolve => "resolve",
            TransportKind::Tls => "tls",
            TransportKind::Refused => "refused",
            TransportKind::Request => "request",
            TransportKind::Other => "other",
        })
    }
}

/// Names the failure behind a connect error from one message of its source chain.
fn connect_failure(message: &str) -> Option<TransportKind> {
    const RESOLVE: [&str; 4] = [
        "failed to lookup address",
        "name or service not known",
        "no such host",
        "name resolution",
    ];
    let lower = message.to_ascii_lowercase();
    if RESOLVE.iter().any(|m| lower.contains(m)) {
        Some(TransportKind::Resolve)
    } else if lower.contains("certificate") || lower.contains("tls") {
        Some(TransportKind::Tls)
    } else {
        None
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ChainError {
    #[error("{kind} failure talking to the node: {message}")]
    Transport { kind: TransportKind, message: String },
    #[error("http {status} from {url}: {body}")]
    Http { status: u16, url: String, body: String },
    #[error("decode error: {0}")]
    Decode(String),
    #[error("chain rejected tx (code {code}): {raw_log}")]
    Rejected { code: u32, raw_log: String },
    #[error("node cli error: {0}")]
    Cli(String),
}

impl ChainError {
    /// Worth another submit attempt: the network or node hiccuped, or our
    /// cached sequence number went stale.
    pub fn is_retryable(&self) -> bool {
        match self {
            ChainError::Transport { kind, .. } => kind.is_transient(),
            ChainError::Cli(_) => true,
            ChainError::Http { status, .. } => *status == 429 || *status >= 500,
            ChainError::Rejected { code, .. } => *code == CODE_SEQUENCE_MISMATCH,
            ChainError::Decode(_) => false,
        }
    }
}

impl From<reqwest::Error> for ChainError {
    fn from(err: reqwest::Error) -> Self {
        ChainError::Transport { kind: TransportKind::of(&err), message: err.to_string() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retry_classification() {
        let http = |status| ChainError::Http {
            status,
            url: "u".into(),
            body: String::new(),
        };
        let rejected = |code| ChainError::Rejected {
            code,
            raw_log: "r".into(),
        };
        let timeout = ChainError::Transport {
            kind: TransportKind::Timeout,
            message: "t".into(),
        };
        assert!(timeout.is_retryable());
        assert!(http(503).is_retryable());
        assert!(http(429).is_retryable());
        assert!(!http(400).is_retryable());
        assert!(rejected(CODE_SEQUENCE_MISMATCH).is_retryable());
        assert!(!rejected(5).is_retryable());
        assert!(!ChainError::Decode("bad".into()).is_retryable());
    }

    #[test]
    fn connect_failures_are_named() {
        assert_eq!(
            connect_failure("error trying to connect: failed to lookup address information"),
            Some(TransportKind::Resolve)
        );
        assert_eq!(
            connect_failure("invalid peer certificate: UnknownIssuer"),
            Some(TransportKind::Tls)
        );
        assert_eq!(connect_failure("Connection refused (os error 111)"), None);
    }

    #[test]
    fn tls_failures_are_not_retried() {
        let tls = ChainError::Transport {
            kind: TransportKind::Tls,
            message: "bad cert".into(),
        };
        assert!(!tls.is_retryable());
        let dns = ChainError::Transport {
            kind: TransportKind::Resolve,
            message: "no such host".into(),
        };
        assert!(dns.is_retryable());
        assert_eq!(dns.to_string(), "resolve failure talking to the node: no such host");
    }

    #[tokio::test(flavor = "current_thread")]
    async fn refused_connection_is_transient() {
        // bind then drop so the port is closed
        let port = std::net::TcpListener::bind("127.0.0.1:0").unwrap().local_addr().unwrap().port();
        let err = reqwest::Client::new()
            .get(format!("http://127.0.0.1:{port}/"))
            .send()
            .await
            .unwrap_err();
        let err = ChainError::from(err);
        assert!(
            matches!(err, ChainError::Transport { kind: TransportKind::Refused, .. }),
            "{err:?}"
        );
        assert!(err.is_retryable());
    }
}
