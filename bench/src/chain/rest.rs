use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use base64::Engine as _;
use reqwest::{Client as HttpClient, StatusCode};
use serde::Deserialize;
use tracing::debug;
use url::Url;

use gasbench_types::{TxLookup, TxStatus};

use super::{AccountInfo, AccountQuery, ChainError, ContractQuery, LedgerQuery, RpcMetrics};

/// gRPC `NotFound`, as surfaced by the REST gateway.
const GRPC_NOT_FOUND: u64 = 5;

#[derive(Debug, Clone)]
pub struct RestConfig {
    pub url: Url,
    pub request_timeout: Duration,
    pub connect_timeout: Duration,
}

impl RestConfig {
    pub fn new(url: Url) -> Self {
        Self {
            url,
            request_timeout: Duration::from_secs(10),
            connect_timeout: Duration::from_secs(5),
        }
    }
}

/// Read-side client for the Cosmos REST gateway.
#[derive(Clone)]
pub struct RestClient {
    base: Url,
    http: HttpClient,
    metrics: Arc<RpcMetrics>,
}

impl RestClient {
    pub fn new(cfg: RestConfig) -> Result<Self, ChainError> {
        let http = HttpClient::builder()
            .timeout(cfg.request_timeout)
            .connect_timeout(cfg.connect_timeout)
            .build()?;
        Ok(Self::with_http_client(cfg.url, http))
    }

    pub fn with_http_client(mut base: Url, http: HttpClient) -> Self {
        // `Url::join` replaces the last path segment unless the base ends in '/'.
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        Self { base, http, metrics: Arc::new(RpcMetrics::default()) }
    }

    pub fn metrics(&self) -> Arc<RpcMetrics> {
        Arc::clone(&self.metrics)
    }

    fn endpoint(&self, path: &str) -> Result<Url, ChainError> {
        self.base
            .join(path)
            .map_err(|e| ChainError::Decode(format!("bad endpoint {path}: {e}")))
    }

    /// GET `url`; returns the status and the body parsed as JSON (or `Null`
    /// when the body is not JSON, which only matters for error statuses).
    async fn get_json(
        &self,
        url: &Url,
    ) -> Result<(StatusCode, serde_json::Value, String), ChainError> {
        let resp = self
            .http
            .get(url.clone())
            .header(reqwest::header::ACCEPT, "application/json")
            .send()
            .await?;
        let status = resp.status();
        let text = resp.text().await?;
        let value = match serde_json::from_str(&text) {
            Ok(v) => v,
            Err(e) if status.is_success() => {
                return Err(ChainError::Decode(format!("invalid JSON from {url}: {e}")));
            }
            Err(_) => serde_json::Value::Null,
        };
        debug!(target: "chain", %url, status = status.as_u16(), "rest response");
        Ok((status, value, text))
    }
}

#[derive(Deserialize)]
struct TxEnvelope {
    tx_response: RawTxResponse,
}

#[derive(Deserialize)]
struct RawTxResponse {
    txhash: String,
    #[serde(default)]
    code: u32,
    #[serde(default, with = "gasbench_types::serde::serde_u64_string")]
    height: u64,
    #[serde(default, with = "gasbench_types::serde::serde_u64_string")]
    gas_used: u64,
    #[serde(default, with = "gasbench_types::serde::serde_u64_string")]
    gas_wanted: u64,
    #[serde(default)]
    raw_log: String,
}

impl From<RawTxResponse> for TxStatus {
    fn from(r: RawTxResponse) -> Self {
        TxStatus {
            tx_hash: r.txhash,
            code: r.code,
            gas_used: r.gas_used,
            gas_wanted: r.gas_wanted,
            height: r.height,
            raw_log: r.raw_log,
        }
    }
}

fn http_error(status: StatusCode, url: &Url, body: String) -> ChainError {
    ChainError::Http {
        status: status.as_u16(),
        url: url.to_string(),
        body,
    }
}

fn is_not_found(status: StatusCode, body: &serde_json::Value) -> bool {
    if status == StatusCode::NOT_FOUND {
        return true;
    }
    let code_says_so = body.get("code").and_then(|c| c.as_u64()) == Some(GRPC_NOT_FOUND);
    let message_says_so = body
        .get("message")
        .and_then(|m| m.as_str())
        .map(|m| m.to_ascii_lowercase().contains("not found"))
        .unwrap_or(false);
    code_says_so || message_says_so
}

impl RestClient {
    async fn lookup_transaction(&self, tx_hash: &str) -> Result<TxLookup, ChainError> {
        let url = self.endpoint(&format!("cosmos/tx/v1beta1/txs/{tx_hash}"))?;
        let (status, body, text) = self.get_json(&url).await?;

        if !status.is_success() {
            if is_not_found(status, &body) {
                return Ok(TxLookup::NotFound);
            }
            return Err(http_error(status, &url, text));
        }

        let env: TxEnvelope = serde_json::from_value(body)
            .map_err(|e| ChainError::Decode(format!("tx_response for {tx_hash}: {e}")))?;
        Ok(TxLookup::Found(env.tx_response.into()))
    }
}

#[async_trait]
impl LedgerQuery for RestClient {
    async fn query_transaction(&self, tx_hash: &str) -> Result<TxLookup, ChainError> {
        let result = self.lookup_transaction(tx_hash).await;
        self.metrics.track_tx_query(&result);
        result
    }
}

#[async_trait]
impl ContractQuery for RestClient {
    async fn query_contract(
        &self,
        contract: &str,
        query: &serde_json::Value,
    ) -> Result<serde_json::Value, ChainError> {
        let raw = serde_json::to_vec(query).map_err(|e| ChainError::Decode(e.to_string()))?;
        // URL-safe alphabet keeps '/' out of the path segment; the gateway accepts both.
        let encoded = base64::engine::general_purpose::URL_SAFE.encode(raw);
        let url = self.endpoint(&format!("cosmwasm/wasm/v1/contract/{contract}/smart/{encoded}"))?;
        self.metrics.track_contract_query();

        let (status, mut body, text) = self.get_json(&url).await?;
        if !status.is_success() {
            return Err(http_error(status, &url, text));
        }
        match body.get_mut("data") {
            Some(data) => Ok(data.take()),
            None => Err(ChainError::Decode(format!("smart query response without data: {text}"))),
        }
    }
}

/// Vesting and module accounts wrap the base account; find the object that
/// actually carries the numbers.
fn find_base_account(v: &serde_json::Value) -> Option<&serde_json::Map<String, serde_json::Value>> {
    let obj = v.as_object()?;
    if obj.contains_key("account_number") {
        return Some(obj);
    }
    obj.values().find_map(find_base_account)
}

fn u64_field(
    obj: &serde_json::Map<String, serde_json::Value>,
    key: &str,
) -> Result<u64, ChainError> {
    match obj.get(key) {
        Some(serde_json::Value::String(s)) if s.is_empty() => Ok(0),
        Some(serde_json::Value::String(s)) => {
            s.parse().map_err(|e| ChainError::Decode(format!("account {key}={s:?}: {e}")))
        }
        Some(serde_json::Value::Number(n)) => {
            n.as_u64().ok_or_else(|| ChainError::Decode(format!("account {key}={n} is not a u64")))
        }
        // a fresh account omits the sequence
        None => Ok(0),
        Some(other) => Err(ChainError::Decode(format!(
            "account {key} has unexpected type: {other}"
        ))),
    }
}

#[async_trait]
impl AccountQuery for RestClient {
    async fn query_account(&self, address: &str) -> Result<AccountInfo, ChainError> {
        let url = self.endpoint(&format!("cosmos/auth/v1beta1/accounts/{address}"))?;
        self.metrics.track_account_query();
        let (status, body, text) = self.get_json(&url).await?;
        if !status.is_success() {
            return Err(http_error(status, &url, text));
        }

        let account = body
            .get("account")
            .and_then(find_base_account)
            .ok_or_else(|| ChainError::Decode(format!("no base account in response: {text}")))?;
        Ok(AccountInfo {
            address: address.to_string(),
            account_number: u64_field(account, "account_number")?,
            sequence: u64_field(account, "sequence")?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{method, path, path_regex};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client_for(server: &MockServer) -> RestClient {
        let url = Url::parse(&server.uri()).expect("mock url");
        RestClient::new(RestConfig::new(url)).expect("client")
    }

    #[tokio::test(flavor = "current_thread")]
    async fn included_tx_maps_to_status() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/cosmos/tx/v1beta1/txs/ABC123"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "tx": {},
                "tx_response": {
                    "height": "812",
                    "txhash": "ABC123",
                    "code": 0,
                    "raw_log": "",
                    "gas_wanted": "180000",
                    "gas_used": "133394"
                }
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = client_for(&server);
        let st = match client.query_transaction("ABC123").await.expect("lookup") {
            TxLookup::Found(st) => st,
            TxLookup::NotFound => panic!("expected Found"),
        };
        assert!(st.is_success());
        assert_eq!(st.height, 812);
        assert_eq!(st.gas_used, 133_394);
        assert_eq!(client.metrics().snapshot().tx_query, 1);
    }

    #[tokio::test(flavor = "current_thread")]
    async fn unindexed_tx_is_not_found() {
        let server = MockServer::start().await;
        Mock::given(path("/cosmos/tx/v1beta1/txs/PENDING"))
            .respond_with(ResponseTemplate::new(404).set_body_json(json!({
                "code": 5,
                "message": "tx not found: PENDING",
                "details": []
            })))
            .mount(&server)
            .await;
        Mock::given(path("/cosmos/tx/v1beta1/txs/LEGACY"))
            .respond_with(ResponseTemplate::new(400).set_body_json(json!({
                "code": 2,
                "message": "tx (LEGACY) not found"
            })))
            .mount(&server)
            .await;

        let client = client_for(&server);
        assert_eq!(client.query_transaction("PENDING").await.unwrap(), TxLookup::NotFound);
        assert_eq!(client.query_transaction("LEGACY").await.unwrap(), TxLookup::NotFound);
        assert_eq!(client.metrics().snapshot().tx_not_found, 2);
    }

    #[tokio::test(flavor = "current_thread")]
    async fn server_error_surfaces_as_http() {
        let server = MockServer::start().await;
        Mock::given(path("/cosmos/tx/v1beta1/txs/BOOM"))
            .respond_with(ResponseTemplate::new(503).set_body_string("upstream unavailable"))
            .mount(&server)
            .await;

        let err = client_for(&server).query_transaction("BOOM").await.unwrap_err();
        match err {
            ChainError::Http { status, ref body, .. } => {
                assert_eq!(status, 503);
                assert_eq!(body, "upstream unavailable");
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(err.is_retryable());
    }

    #[tokio::test(flavor = "current_thread")]
    async fn failed_lookups_still_count_as_queries() {
        let server = MockServer::start().await;
        Mock::given(path("/cosmos/tx/v1beta1/txs/FLAKY"))
            .respond_with(ResponseTemplate::new(502).set_body_string("bad gateway"))
            .mount(&server)
            .await;
        Mock::given(path("/cosmos/tx/v1beta1/txs/GARBLED"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({ "tx_response": { "code": 0 } })),
            )
            .mount(&server)
            .await;

        let client = client_for(&server);
        let flaky = client.query_transaction("FLAKY").await;
        assert!(matches!(flaky, Err(ChainError::Http { status: 502, .. })));
        let garbled = client.query_transaction("GARBLED").await;
        assert!(matches!(garbled, Err(ChainError::Decode(_))));

        let snap = client.metrics().snapshot();
        assert_eq!(snap.tx_query, 2);
        assert_eq!(snap.tx_query_err, 2);
        assert_eq!(snap.tx_not_found, 0);
    }

    #[tokio::test(flavor = "current_thread")]
    async fn smart_query_returns_data_field() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path_regex(r"^/cosmwasm/wasm/v1/contract/bbn1store/smart/[A-Za-z0-9_=-]+$"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": {
                    "messages": [
                        {
                            "id": "1",
                            "content": "aaaa",
                            "length": 4,
                            "btc_status": {
                                "finalized": false,
                                "btc_height": null,
                                "btc_timestamp": null
                            }
                        }
                    ]
                }
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = client_for(&server);
        let list = crate::chain::list_messages(&client, "bbn1store").await.expect("list");
        assert_eq!(list.messages.len(), 1);
        assert_eq!(list.total_length(), 4);
    }

    #[tokio::test(flavor = "current_thread")]
    async fn account_numbers_found_inside_vesting_wrapper() {
        let server = MockServer::start().await;
        Mock::given(path("/cosmos/auth/v1beta1/accounts/bbn1signer"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "account": {
                    "@type": "/cosmos.vesting.v1beta1.ContinuousVestingAccount",
                    "base_vesting_account": {
                        "base_account": {
                            "address": "bbn1signer",
                            "account_number": "17",
                            "sequence": "204"
                        }
                    }
                }
            })))
            .mount(&server)
            .await;

        let info = client_for(&server).query_account("bbn1signer").await.expect("account");
        assert_eq!(info.account_number, 17);
        assert_eq!(info.sequence, 204);
    }

    #[test]
    fn base_path_keeps_its_prefix() {
        let client = RestClient::with_http_client(
            Url::parse("http://node.example/lcd").unwrap(),
            HttpClient::new(),
        );
        let url = client.endpoint("cosmos/tx/v1beta1/txs/X").unwrap();
        assert_eq!(url.as_str(), "http://node.example/lcd/cosmos/tx/v1beta1/txs/X");
    }
}
