//! EVM JSON-RPC client
//!
//! [`EvmRpc`] is the chain surface the relay pipeline depends on; the
//! nonce coordinator, gas engine, relay-state checker and submitter all take
//! `&dyn EvmRpc` so they can be driven by an in-memory chain in tests.
//! [`EvmClient`] implements it over HTTP with `reqwest`.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use ethereum_types::{H160, H256, U256};
use reqwest::Client;
use serde_json::{json, Value};
use thiserror::Error;
use tracing::{debug, warn};

/// Largest `extraData` a non-POA block header carries.
const MAX_STANDARD_EXTRA_DATA: usize = 32;

// ============================================================================
// ERRORS
// ============================================================================

#[derive(Debug, Clone, Error)]
pub enum RpcError {
    /// The node answered with a JSON-RPC error object.
    #[error("JSON-RPC error from {method} (code {code}): {message}")]
    Node {
        method: String,
        code: i64,
        message: String,
        data: Option<Value>,
    },
    #[error("transport error calling {method}: {message}")]
    Transport { method: String, message: String },
    #[error("timed out after {secs}s waiting for {method}")]
    Timeout { method: String, secs: u64 },
    #[error("unexpected {method} response: {message}")]
    InvalidResponse { method: String, message: String },
}

impl RpcError {
    /// Node message plus any textual error data, for classification.
    pub fn message(&self) -> String {
        match self {
            RpcError::Node { message, data, .. } => match data {
                Some(Value::String(text)) => format!("{} {}", message, text),
                Some(other) => format!("{} {}", message, other),
                None => message.clone(),
            },
            other => other.to_string(),
        }
    }

    /// Revert payload attached to an `eth_call` / `eth_estimateGas` error.
    ///
    /// Nodes return it either as a hex string or nested under `data.data`.
    pub fn revert_data(&self) -> Option<Vec<u8>> {
        let RpcError::Node { data: Some(data), .. } = self else {
            return None;
        };
        let text = match data {
            Value::String(text) => text.as_str(),
            Value::Object(map) => map.get("data").and_then(|d| d.as_str())?,
            _ => return None,
        };
        hex::decode(text.trim_start_matches("0x")).ok().filter(|b| !b.is_empty())
    }

    fn invalid(method: &str, message: impl Into<String>) -> Self {
        RpcError::InvalidResponse { method: method.to_string(), message: message.into() }
    }
}

// ============================================================================
// TYPES
// ============================================================================

/// Block tag for state reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockTag {
    Latest,
    Pending,
}

impl BlockTag {
    pub fn as_str(&self) -> &'static str {
        match self {
            BlockTag::Latest => "latest",
            BlockTag::Pending => "pending",
        }
    }
}

/// Transaction-shaped request for `eth_call` / `eth_estimateGas`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CallRequest {
    pub from: Option<H160>,
    pub to: Option<H160>,
    pub gas: Option<u64>,
    pub gas_price: Option<U256>,
    pub max_fee_per_gas: Option<U256>,
    pub max_priority_fee_per_gas: Option<U256>,
    pub value: Option<U256>,
    pub data: Option<Vec<u8>>,
}

impl CallRequest {
    pub fn to_json(&self) -> Value {
        let mut object = serde_json::Map::new();
        if let Some(from) = self.from {
            object.insert("from".into(), json!(format!("{:?}", from)));
        }
        if let Some(to) = self.to {
            object.insert("to".into(), json!(format!("{:?}", to)));
        }
        if let Some(gas) = self.gas {
            object.insert("gas".into(), json!(format!("{:#x}", gas)));
        }
        let quantities = [
            ("gasPrice", self.gas_price),
            ("maxFeePerGas", self.max_fee_per_gas),
            ("maxPriorityFeePerGas", self.max_priority_fee_per_gas),
            ("value", self.value),
        ];
        for (key, value) in quantities {
            if let Some(value) = value {
                object.insert(key.into(), json!(format!("{:#x}", value)));
            }
        }
        if let Some(data) = &self.data {
            object.insert("data".into(), json!(format!("0x{}", hex::encode(data))));
        }
        Value::Object(object)
    }
}

/// The header fields the gas engine needs from the latest block.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BlockHeader {
    pub number: u64,
    /// Absent on chains without EIP-1559
    pub base_fee_per_gas: Option<U256>,
    pub gas_used: u64,
    pub gas_limit: u64,
    pub extra_data_len: usize,
}

impl BlockHeader {
    /// True when gas used exceeds 90% of the block gas limit.
    pub fn is_congested(&self) -> bool {
        self.gas_limit > 0 && (self.gas_used as u128) * 10 > (self.gas_limit as u128) * 9
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Receipt {
    pub transaction_hash: H256,
    pub block_number: Option<u64>,
    /// 1 success, 0 reverted; `None` for pre-Byzantium receipts
    pub status: Option<u64>,
    pub gas_used: Option<u64>,
}

impl Receipt {
    pub fn is_success(&self) -> bool {
        self.status == Some(1)
    }
}

// ============================================================================
// TRAIT
// ============================================================================

/// EVM JSON-RPC surface used by the relay pipeline.
#[async_trait]
pub trait EvmRpc: Send + Sync {
    async fn chain_id(&self) -> Result<u64, RpcError>;
    async fn transaction_count(&self, address: H160, tag: BlockTag) -> Result<u64, RpcError>;
    async fn gas_price(&self) -> Result<U256, RpcError>;
    async fn max_priority_fee_per_gas(&self) -> Result<U256, RpcError>;
    async fn latest_block(&self) -> Result<BlockHeader, RpcError>;
    async fn estimate_gas(&self, call: &CallRequest) -> Result<u64, RpcError>;
    async fn call(&self, call: &CallRequest) -> Result<Vec<u8>, RpcError>;
    async fn send_raw_transaction(&self, raw: &[u8]) -> Result<H256, RpcError>;
    async fn transaction_receipt(&self, hash: H256) -> Result<Option<Receipt>, RpcError>;
    async fn code_at(&self, address: H160) -> Result<Vec<u8>, RpcError>;
}

// ============================================================================
// HTTP CLIENT
// ============================================================================

/// `reqwest`-backed JSON-RPC client for one chain.
pub struct EvmClient {
    client: Client,
    rpc_url: String,
    call_timeout: Duration,
    /// Set from the registry, or once an oversized `extraData` is observed.
    /// Informational only: headers parse the same way on POA chains.
    poa: AtomicBool,
}

impl EvmClient {
    /// Creates a new JSON-RPC client
    ///
    /// # Arguments
    ///
    /// * `rpc_url` - HTTP endpoint of the node
    /// * `call_timeout` - Upper bound for a single JSON-RPC call
    /// * `is_poa` - Whether the chain is known to use POA headers
    pub fn new(rpc_url: &str, call_timeout: Duration, is_poa: bool) -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .no_proxy()
            .build()
            .map_err(|e| anyhow::anyhow!("Failed to create HTTP client: {}", e))?;

        Ok(Self {
            client,
            rpc_url: rpc_url.to_string(),
            call_timeout,
            poa: AtomicBool::new(is_poa),
        })
    }

    pub fn rpc_url(&self) -> &str {
        &self.rpc_url
    }

    /// Whether the chain is known or observed to use POA headers (reporting only).
    pub fn is_poa(&self) -> bool {
        self.poa.load(Ordering::Relaxed)
    }

    /// Sends a JSON-RPC request and returns the raw `result` value (possibly null).
    async fn request(&self, method: &str, params: Value) -> Result<Value, RpcError> {
        let request = json!({
            "jsonrpc": "2.0",
            "method": method,
            "params": params,
            "id": 1,
        });

        let rpc_future = async {
            let resp = self
                .client
                .post(&self.rpc_url)
                .json(&request)
                .send()
                .await
                .map_err(|e| RpcError::Transport { method: method.to_string(), message: e.to_string() })?;
            resp.json::<Value>()
                .await
                .map_err(|e| RpcError::invalid(method, format!("failed to parse body: {}", e)))
        };

        let response = tokio::time::timeout(self.call_timeout, rpc_future)
            .await
            .map_err(|_| RpcError::Timeout { method: method.to_string(), secs: self.call_timeout.as_secs() })??;

        if let Some(error) = response.get("error") {
            return Err(RpcError::Node {
                method: method.to_string(),
                code: error.get("code").and_then(|c| c.as_i64()).unwrap_or(0),
                message: error
                    .get("message")
                    .and_then(|m| m.as_str())
                    .unwrap_or("unknown error")
                    .to_string(),
                data: error.get("data").cloned(),
            });
        }

        response
            .get("result")
            .cloned()
            .ok_or_else(|| RpcError::invalid(method, "no result field"))
    }

    async fn request_quantity(&self, method: &str, params: Value) -> Result<U256, RpcError> {
        let value = self.request(method, params).await?;
        parse_quantity(&value).ok_or_else(|| RpcError::invalid(method, format!("not a quantity: {}", value)))
    }

    async fn request_u64(&self, method: &str, params: Value) -> Result<u64, RpcError> {
        let value = self.request_quantity(method, params).await?;
        if value > U256::from(u64::MAX) {
            return Err(RpcError::invalid(method, "quantity exceeds u64"));
        }
        Ok(value.low_u64())
    }

    async fn request_bytes(&self, method: &str, params: Value) -> Result<Vec<u8>, RpcError> {
        let value = self.request(method, params).await?;
        let text = value
            .as_str()
            .ok_or_else(|| RpcError::invalid(method, format!("not a hex string: {}", value)))?;
        hex::decode(text.trim_start_matches("0x")).map_err(|e| RpcError::invalid(method, e.to_string()))
    }
}

/// Parses a JSON-RPC hex quantity.
pub fn parse_quantity(value: &Value) -> Option<U256> {
    let text = value.as_str()?.trim_start_matches("0x");
    if text.is_empty() {
        return Some(U256::zero());
    }
    U256::from_str_radix(text, 16).ok()
}

fn quantity_u64(value: Option<&Value>) -> Option<u64> {
    parse_quantity(value?).filter(|q| *q <= U256::from(u64::MAX)).map(|q| q.low_u64())
}

fn parse_h256(value: &Value) -> Option<H256> {
    let bytes = hex::decode(value.as_str()?.trim_start_matches("0x")).ok()?;
    (bytes.len() == 32).then(|| H256::from_slice(&bytes))
}

#[async_trait]
impl EvmRpc for EvmClient {
    async fn chain_id(&self) -> Result<u64, RpcError> {
        self.request_u64("eth_chainId", json!([])).await
    }

    async fn transaction_count(&self, address: H160, tag: BlockTag) -> Result<u64, RpcError> {
        self.request_u64("eth_getTransactionCount", json!([format!("{:?}", address), tag.as_str()]))
            .await
    }

    async fn gas_price(&self) -> Result<U256, RpcError> {
        self.request_quantity("eth_gasPrice", json!([])).await
    }

    async fn max_priority_fee_per_gas(&self) -> Result<U256, RpcError> {
        self.request_quantity("eth_maxPriorityFeePerGas", json!([])).await
    }

    async fn latest_block(&self) -> Result<BlockHeader, RpcError> {
        const METHOD: &str = "eth_getBlockByNumber";
        let block = self.request(METHOD, json!(["latest", false])).await?;
        if block.is_null() {
            return Err(RpcError::invalid(METHOD, "latest block not available"));
        }

        let extra_data_len = block
            .get("extraData")
            .and_then(|v| v.as_str())
            .map(|s| s.trim_start_matches("0x").len() / 2)
            .unwrap_or(0);
        if extra_data_len > MAX_STANDARD_EXTRA_DATA && !self.poa.swap(true, Ordering::Relaxed) {
            warn!(
                "Block extraData is {} bytes on {}; treating chain as POA",
                extra_data_len, self.rpc_url
            );
        }

        Ok(BlockHeader {
            number: quantity_u64(block.get("number"))
                .ok_or_else(|| RpcError::invalid(METHOD, "missing block number"))?,
            base_fee_per_gas: block.get("baseFeePerGas").and_then(parse_quantity),
            gas_used: quantity_u64(block.get("gasUsed")).unwrap_or(0),
            gas_limit: quantity_u64(block.get("gasLimit")).unwrap_or(0),
            extra_data_len,
        })
    }

    async fn estimate_gas(&self, call: &CallRequest) -> Result<u64, RpcError> {
        self.request_u64("eth_estimateGas", json!([call.to_json()])).await
    }

    async fn call(&self, call: &CallRequest) -> Result<Vec<u8>, RpcError> {
        self.request_bytes("eth_call", json!([call.to_json(), "latest"])).await
    }

    async fn send_raw_transaction(&self, raw: &[u8]) -> Result<H256, RpcError> {
        const METHOD: &str = "eth_sendRawTransaction";
        let value = self.request(METHOD, json!([format!("0x{}", hex::encode(raw))])).await?;
        parse_h256(&value).ok_or_else(|| RpcError::invalid(METHOD, format!("not a tx hash: {}", value)))
    }

    async fn transaction_receipt(&self, hash: H256) -> Result<Option<Receipt>, RpcError> {
        const METHOD: &str = "eth_getTransactionReceipt";
        let receipt = self.request(METHOD, json!([format!("{:?}", hash)])).await?;
        if receipt.is_null() {
            debug!("Receipt for {:?} not available yet", hash);
            return Ok(None);
        }
        Ok(Some(Receipt {
            transaction_hash: receipt
                .get("transactionHash")
                .and_then(parse_h256)
                .unwrap_or(hash),
            block_number: quantity_u64(receipt.get("blockNumber")),
            status: quantity_u64(receipt.get("status")),
            gas_used: quantity_u64(receipt.get("gasUsed")),
        }))
    }

    async fn code_at(&self, address: H160) -> Result<Vec<u8>, RpcError> {
        self.request_bytes("eth_getCode", json!([format!("{:?}", address), "latest"])).await
    }
}
