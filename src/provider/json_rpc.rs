use async_trait::async_trait;
use log::{debug, error, info, warn};
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;
use std::time::Duration;
use tokio::time::{sleep, timeout};

use super::WalletProvider;
use crate::entity::{
    ConfirmationOutcome, FeeEstimate, LedgerError, NetworkConfig, Result, Submission, Wei,
    CODE_METHOD_NOT_FOUND, CODE_UNRECOGNIZED_CHAIN,
};
use crate::utils::{parse_hex_quantity, to_hex_quantity};

#[derive(Serialize)]
struct RpcRequest<'a> {
    jsonrpc: &'static str,
    id: u64,
    method: &'a str,
    params: Value,
}

#[derive(Deserialize)]
struct RpcResponse {
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<RpcErrorBody>,
}

#[derive(Deserialize)]
struct RpcErrorBody {
    code: i64,
    #[serde(default)]
    message: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RpcReceipt {
    status: Option<String>,
    gas_used: Option<String>,
    effective_gas_price: Option<String>,
}

impl RpcReceipt {
    fn into_outcome(self) -> ConfirmationOutcome {
        let outcome = match self.status.as_deref() {
            Some("0x1") => ConfirmationOutcome::confirmed(),
            _ => ConfirmationOutcome::failed(),
        };
        ConfirmationOutcome {
            gas_used: self.gas_used.as_deref().and_then(|q| parse_hex_quantity(q).ok()),
            gas_price: self
                .effective_gas_price
                .as_deref()
                .and_then(|q| parse_hex_quantity(q).ok()),
            ..outcome
        }
    }
}

/// Failure of a single JSON-RPC call, before it is mapped onto [`LedgerError`].
#[derive(Debug)]
enum CallError {
    Rpc { code: i64, message: String },
    Transport(LedgerError),
}

impl CallError {
    fn is_method_not_found(&self) -> bool {
        matches!(self, CallError::Rpc { code, .. } if *code == CODE_METHOD_NOT_FOUND)
    }
}

impl From<CallError> for LedgerError {
    fn from(err: CallError) -> Self {
        match err {
            CallError::Rpc { code, message } => LedgerError::from_provider_code(code, &message),
            CallError::Transport(err) => err,
        }
    }
}

/// Wallet provider speaking Ethereum JSON-RPC over HTTP, e.g. to a local
/// node or a wallet daemon holding unlocked accounts.
pub struct JsonRpcProvider {
    http_client: Client,
    rpc_url: String,
    next_id: AtomicU64,
    selected_account: RwLock<Option<String>>,
    poll_interval: Duration,
    confirmation_timeout: Duration,
}

impl JsonRpcProvider {
    pub fn new(rpc_url: &str, poll_interval: Duration, confirmation_timeout: Duration) -> Self {
        Self {
            http_client: Client::new(),
            rpc_url: rpc_url.to_string(),
            next_id: AtomicU64::new(1),
            selected_account: RwLock::new(None),
            poll_interval,
            confirmation_timeout,
        }
    }

    pub fn rpc_url(&self) -> &str {
        &self.rpc_url
    }

    async fn call_raw(&self, method: &str, params: Value) -> std::result::Result<Value, CallError> {
        let request = RpcRequest {
            jsonrpc: "2.0",
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
            method,
            params,
        };
        debug!("JSON-RPC call {} (id {})", method, request.id);

        let response = self
            .http_client
            .post(&self.rpc_url)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                if e.is_connect() || e.is_timeout() {
                    error!("Wallet provider at {} is unreachable: {}", self.rpc_url, e);
                    CallError::Transport(LedgerError::ProviderUnavailable)
                } else {
                    CallError::Transport(LedgerError::Unknown(format!(
                        "Request {} failed: {}",
                        method, e
                    )))
                }
            })?;

        let body: RpcResponse = response.json().await.map_err(|e| {
            CallError::Transport(LedgerError::Unknown(format!(
                "Invalid response to {}: {}",
                method, e
            )))
        })?;

        if let Some(err) = body.error {
            debug!("JSON-RPC {} failed with code {}: {}", method, err.code, err.message);
            return Err(CallError::Rpc {
                code: err.code,
                message: err.message,
            });
        }
        Ok(body.result.unwrap_or(Value::Null))
    }

    async fn call<T: DeserializeOwned>(&self, method: &str, params: Value) -> Result<T> {
        let result = self.call_raw(method, params).await?;
        decode(method, result)
    }

    fn select_account(&self, accounts: &[String]) {
        if let Ok(mut selected) = self.selected_account.write() {
            *selected = accounts.first().cloned();
        }
    }

    fn selected_account(&self) -> Result<String> {
        self.selected_account
            .read()
            .ok()
            .and_then(|selected| selected.clone())
            .ok_or(LedgerError::WalletNotConnected)
    }

    async fn poll_receipt(&self, id: &str) -> Result<ConfirmationOutcome> {
        loop {
            let receipt: Option<RpcReceipt> =
                self.call("eth_getTransactionReceipt", json!([id])).await?;
            if let Some(receipt) = receipt {
                return Ok(receipt.into_outcome());
            }
            sleep(self.poll_interval).await;
        }
    }

    /// Used when the endpoint cannot switch networks itself: succeed only if
    /// it already serves the requested chain.
    async fn ensure_chain(&self, network: &NetworkConfig) -> Result<()> {
        let actual = self.chain_id().await?;
        if network.is_chain(&actual) {
            Ok(())
        } else {
            Err(LedgerError::NetworkMismatch {
                expected: network.chain_id.clone(),
                actual,
            })
        }
    }
}

fn decode<T: DeserializeOwned>(method: &str, value: Value) -> Result<T> {
    serde_json::from_value(value)
        .map_err(|e| LedgerError::Unknown(format!("Unexpected result for {}: {}", method, e)))
}

#[async_trait]
impl WalletProvider for JsonRpcProvider {
    async fn detect(&self) -> bool {
        match self.call::<String>("eth_chainId", json!([])).await {
            Ok(chain_id) => {
                debug!("Wallet provider at {} serves chain {}", self.rpc_url, chain_id);
                true
            }
            Err(e) => {
                warn!("Error detecting provider at {}: {}", self.rpc_url, e);
                false
            }
        }
    }

    async fn request_accounts(&self) -> Result<Vec<String>> {
        let accounts: Vec<String> = match self.call_raw("eth_requestAccounts", json!([])).await {
            Ok(value) => decode("eth_requestAccounts", value)?,
            Err(err) if err.is_method_not_found() => {
                debug!("eth_requestAccounts not supported, falling back to eth_accounts");
                self.call("eth_accounts", json!([])).await?
            }
            Err(err) => return Err(err.into()),
        };
        self.select_account(&accounts);
        Ok(accounts)
    }

    async fn accounts(&self) -> Result<Vec<String>> {
        let accounts: Vec<String> = self.call("eth_accounts", json!([])).await?;
        self.select_account(&accounts);
        Ok(accounts)
    }

    async fn chain_id(&self) -> Result<String> {
        self.call("eth_chainId", json!([])).await
    }

    async fn switch_network(&self, network: &NetworkConfig) -> Result<()> {
        let params = json!([{ "chainId": network.chain_id }]);
        match self.call_raw("wallet_switchEthereumChain", params).await {
            Ok(_) => {
                info!("Switched to {} ({})", network.chain_name, network.chain_id);
                Ok(())
            }
            Err(CallError::Rpc { code, .. }) if code == CODE_UNRECOGNIZED_CHAIN => {
                Err(LedgerError::UnsupportedChain(network.chain_id.clone()))
            }
            Err(err) if err.is_method_not_found() => self.ensure_chain(network).await,
            Err(err) => Err(err.into()),
        }
    }

    async fn add_network(&self, network: &NetworkConfig) -> Result<()> {
        match self.call_raw("wallet_addEthereumChain", json!([network])).await {
            Ok(_) => {
                info!("Added {} ({})", network.chain_name, network.chain_id);
                Ok(())
            }
            Err(err) if err.is_method_not_found() => self.ensure_chain(network).await,
            Err(err) => Err(err.into()),
        }
    }

    async fn get_balance(&self, address: &str) -> Result<Wei> {
        let balance: String = self.call("eth_getBalance", json!([address, "latest"])).await?;
        parse_hex_quantity(&balance)
    }

    async fn estimate_fee(&self, to: &str, value: Wei) -> Result<FeeEstimate> {
        let from = self.selected_account()?;
        let tx = json!({ "from": from, "to": to, "value": to_hex_quantity(value) });

        let gas_limit: String = self.call("eth_estimateGas", json!([tx])).await?;
        let gas_price: String = self.call("eth_gasPrice", json!([])).await?;
        Ok(FeeEstimate::new(
            parse_hex_quantity(&gas_limit)?,
            parse_hex_quantity(&gas_price)?,
        ))
    }

    async fn submit(&self, to: &str, value: Wei) -> Result<Submission> {
        let from = self.selected_account()?;
        let tx = json!({ "from": from, "to": to, "value": to_hex_quantity(value) });

        let hash: String = self.call("eth_sendTransaction", json!([tx])).await?;
        info!("Submitted transfer {} from {} to {}", hash, from, to);
        Ok(Submission { id: hash, from })
    }

    async fn await_confirmation(&self, id: &str) -> Result<ConfirmationOutcome> {
        match timeout(self.confirmation_timeout, self.poll_receipt(id)).await {
            Ok(outcome) => outcome,
            Err(_) => Err(LedgerError::Unknown(format!(
                "Timed out waiting for confirmation of {}",
                id
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::ConfirmationStatus;
    use std::collections::HashMap;
    use std::sync::Arc;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::{TcpListener, TcpStream};

    const ACCOUNT: &str = "0x1111111111111111111111111111111111111111";

    /// Minimal JSON-RPC endpoint answering each method with a canned reply.
    /// A reply is either `{"result": ..}` or `{"error": {..}}`.
    async fn serve(replies: HashMap<&'static str, Value>) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("http://{}", listener.local_addr().unwrap());
        let replies = Arc::new(replies);
        tokio::spawn(async move {
            loop {
                let (stream, _) = listener.accept().await.unwrap();
                tokio::spawn(answer(stream, replies.clone()));
            }
        });
        url
    }

    async fn answer(mut stream: TcpStream, replies: Arc<HashMap<&'static str, Value>>) {
        let mut buf = Vec::new();
        let mut chunk = [0u8; 4096];
        let (header_end, content_length) = loop {
            let n = stream.read(&mut chunk).await.unwrap();
            if n == 0 {
                return;
            }
            buf.extend_from_slice(&chunk[..n]);
            if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
                let head = String::from_utf8_lossy(&buf[..pos]).to_lowercase();
                let length = head
                    .lines()
                    .find_map(|line| line.strip_prefix("content-length:"))
                    .map(|v| v.trim().parse::<usize>().unwrap())
                    .unwrap_or(0);
                break (pos + 4, length);
            }
        };
        while buf.len() < header_end + content_length {
            let n = stream.read(&mut chunk).await.unwrap();
            if n == 0 {
                break;
            }
            buf.extend_from_slice(&chunk[..n]);
        }

        let request: Value = serde_json::from_slice(&buf[header_end..]).unwrap();
        let method = request["method"].as_str().unwrap_or_default();
        let mut reply = replies.get(method).cloned().unwrap_or_else(
            || json!({ "error": { "code": -32601, "message": "the method does not exist" } }),
        );
        reply["jsonrpc"] = json!("2.0");
        reply["id"] = request["id"].clone();

        let body = reply.to_string();
        let response = format!(
            "HTTP/1.1 200 OK\r\n\
             content-type: application/json\r\n\
             content-length: {}\r\n\
             connection: close\r\n\r\n{}",
            body.len(),
            body
        );
        stream.write_all(response.as_bytes()).await.unwrap();
        let _ = stream.shutdown().await;
    }

    fn provider(url: &str) -> JsonRpcProvider {
        JsonRpcProvider::new(url, Duration::from_millis(10), Duration::from_secs(2))
    }

    #[tokio::test]
    async fn test_request_accounts_falls_back_to_eth_accounts() {
        let url = serve(HashMap::from([("eth_accounts", json!({ "result": [ACCOUNT] }))])).await;
        let provider = provider(&url);

        assert_eq!(provider.request_accounts().await.unwrap(), vec![ACCOUNT]);
        assert_eq!(provider.selected_account().unwrap(), ACCOUNT);
    }

    #[tokio::test]
    async fn test_error_codes_are_mapped() {
        let url = serve(HashMap::from([
            (
                "eth_requestAccounts",
                json!({ "error": { "code": 4001, "message": "User denied" } }),
            ),
            (
                "wallet_switchEthereumChain",
                json!({ "error": { "code": 4902, "message": "Unrecognized chain" } }),
            ),
            (
                "eth_gasPrice",
                json!({ "error": { "code": -32603, "message": "boom" } }),
            ),
        ]))
        .await;
        let provider = provider(&url);

        assert_eq!(
            provider.request_accounts().await.unwrap_err(),
            LedgerError::UserRejected
        );
        assert_eq!(
            provider.switch_network(&NetworkConfig::shardeum()).await.unwrap_err(),
            LedgerError::UnsupportedChain("0x1F93".to_string())
        );
        assert_eq!(
            provider.call::<String>("eth_gasPrice", json!([])).await.unwrap_err(),
            LedgerError::Unknown("Internal error. Please try again.".to_string())
        );
    }

    #[tokio::test]
    async fn test_switch_without_wallet_methods_checks_chain() {
        let url = serve(HashMap::from([("eth_chainId", json!({ "result": "0x1f93" }))])).await;
        let provider = provider(&url);
        assert!(provider.switch_network(&NetworkConfig::shardeum()).await.is_ok());

        let mut other = NetworkConfig::shardeum();
        other.chain_id = "0x1".to_string();
        assert!(matches!(
            provider.add_network(&other).await,
            Err(LedgerError::NetworkMismatch { .. })
        ));
    }

    #[tokio::test]
    async fn test_submit_requires_selected_account() {
        let url = serve(HashMap::new()).await;
        let provider = provider(&url);
        assert_eq!(
            provider.submit(ACCOUNT, Wei::one()).await.unwrap_err(),
            LedgerError::WalletNotConnected
        );
    }

    #[tokio::test]
    async fn test_balance_fee_and_confirmation() {
        let url = serve(HashMap::from([
            ("eth_accounts", json!({ "result": [ACCOUNT] })),
            ("eth_getBalance", json!({ "result": "0xde0b6b3a7640000" })),
            ("eth_estimateGas", json!({ "result": "0x5208" })),
            ("eth_gasPrice", json!({ "result": "0x3b9aca00" })),
            ("eth_sendTransaction", json!({ "result": "0xfeed" })),
            (
                "eth_getTransactionReceipt",
                json!({
                    "result": { "status": "0x1", "gasUsed": "0x5208", "effectiveGasPrice": "0xa" }
                }),
            ),
        ]))
        .await;
        let provider = provider(&url);
        provider.accounts().await.unwrap();

        assert_eq!(provider.get_balance(ACCOUNT).await.unwrap(), Wei::exp10(18));

        let fee = provider.estimate_fee(ACCOUNT, Wei::one()).await.unwrap();
        assert_eq!(fee.gas_limit, Wei::from(21_000u64));
        assert_eq!(fee.estimated_cost, Wei::from(21_000_000_000_000u64));

        let submission = provider.submit(ACCOUNT, Wei::one()).await.unwrap();
        assert_eq!(submission.id, "0xfeed");
        assert_eq!(submission.from, ACCOUNT);

        let outcome = provider.await_confirmation(&submission.id).await.unwrap();
        assert_eq!(outcome.status, ConfirmationStatus::Confirmed);
        assert_eq!(outcome.gas_used, Some(Wei::from(21_000u64)));
        assert_eq!(outcome.gas_price, Some(Wei::from(10u64)));
    }

    #[tokio::test]
    async fn test_confirmation_times_out() {
        let url = serve(HashMap::from([(
            "eth_getTransactionReceipt",
            json!({ "result": null }),
        )]))
        .await;
        let provider =
            JsonRpcProvider::new(&url, Duration::from_millis(10), Duration::from_millis(100));
        assert!(matches!(
            provider.await_confirmation("0xfeed").await,
            Err(LedgerError::Unknown(_))
        ));
    }

    #[tokio::test]
    async fn test_unreachable_provider() {
        let provider = provider("http://127.0.0.1:1");
        assert!(!provider.detect().await);
        assert_eq!(
            provider.chain_id().await.unwrap_err(),
            LedgerError::ProviderUnavailable
        );
    }

    #[test]
    fn test_failed_receipt() {
        let receipt: RpcReceipt = serde_json::from_value(json!({ "status": "0x0" })).unwrap();
        let outcome = receipt.into_outcome();
        assert_eq!(outcome.status, ConfirmationStatus::Failed);
        assert_eq!(outcome.gas_used, None);
    }
}
