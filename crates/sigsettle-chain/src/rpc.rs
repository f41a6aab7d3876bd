//! EVM JSON-RPC transfer source.
//!
//! Reads the transaction receipt, decodes every ERC-20 `Transfer` log and
//! resolves token metadata from a static registry, falling back to
//! `symbol()` / `decimals()` calls against the token contract.

use std::time::Duration;

use alloy::primitives::U256;
use alloy::sol;
use alloy::sol_types::{SolCall, SolEvent};
use async_trait::async_trait;
use dashmap::DashMap;
use reqwest::Client;
use rust_decimal::Decimal;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::config::ChainConfig;
use crate::error::{ChainError, ChainResult};
use crate::transfer::{TokenTransfer, TransferSource};

sol! {
    interface IERC20 {
        function symbol() external view returns (string);
        function decimals() external view returns (uint8);
        event Transfer(address indexed from, address indexed to, uint256 value);
    }
}

/// Largest mantissa a `Decimal` can hold (2^96 - 1).
const MAX_MANTISSA: u128 = (1u128 << 96) - 1;
const MAX_SCALE: u32 = 28;

/// Well-known tokens: (chain, lowercased address, symbol, decimals).
const KNOWN_TOKENS: &[(&str, &str, &str, u8)] = &[
    ("base", "0x833589fcd6edb6e08f4c7c32d4f71b54bda02913", "USDC", 6),
    ("base", "0xd9aaec86b65d86f6a7b5b1b0c42ffa531710b6ca", "USDbC", 6),
    ("base", "0x50c5725949a6f0c72e6c4a641f24049a917db0cb", "DAI", 18),
    ("base", "0x4200000000000000000000000000000000000006", "WETH", 18),
    ("base", "0xcbb7c0000ab88b473b1f5afd9ef808440eed33bf", "cbBTC", 8),
    ("ethereum", "0xa0b86991c6218b36c1d19d4a2e9eb0ce3606eb48", "USDC", 6),
    ("ethereum", "0xdac17f958d2ee523a2206206994597c13d831ec7", "USDT", 6),
    ("ethereum", "0x6b175474e89094c44da98b954eedeac495271d0f", "DAI", 18),
    ("ethereum", "0xc02aaa39b223fe8d0a0e5c4f27ead9083c756cc2", "WETH", 18),
    ("ethereum", "0x2260fac5e5542a773aa44fbcfedf7c193bc2c599", "WBTC", 8),
    ("arbitrum", "0xaf88d065e77c8cc2239327c5edb3a432268e5831", "USDC", 6),
    ("arbitrum", "0xff970a61a04b1ca14834a43f5de4533ebddb5cc8", "USDC.e", 6),
    ("arbitrum", "0x82af49447d8a07e3bd95bd0d56f35241523fbab1", "WETH", 18),
    ("bsc", "0x55d398326f99059ff775485246999027b3197955", "USDT", 18),
    ("bsc", "0xbb4cdb9cbd36b01bd1cbaebf2de08d9173bc095c", "WBNB", 18),
];

#[derive(Debug, Clone, PartialEq, Eq)]
struct TokenMeta {
    symbol: String,
    decimals: u8,
}

#[derive(Debug, Serialize)]
struct RpcRequest<'a> {
    jsonrpc: &'static str,
    id: u64,
    method: &'a str,
    params: Value,
}

#[derive(Debug, Deserialize)]
struct RpcResponse<T> {
    result: Option<T>,
    error: Option<RpcErrorBody>,
}

#[derive(Debug, Deserialize)]
struct RpcErrorBody {
    code: i64,
    message: String,
}

#[derive(Debug, Deserialize)]
struct Receipt {
    #[serde(default)]
    logs: Vec<RpcLog>,
}

#[derive(Debug, Deserialize)]
struct RpcLog {
    address: String,
    #[serde(default)]
    topics: Vec<String>,
    #[serde(default)]
    data: String,
}

/// A decoded `Transfer` log before token metadata is attached.
#[derive(Debug, Clone, PartialEq, Eq)]
struct RawTransfer {
    token: String,
    from: String,
    to: String,
    value: U256,
}

/// [`TransferSource`] backed by EVM JSON-RPC endpoints.
pub struct EvmRpcTransferSource {
    client: Client,
    config: ChainConfig,
    metadata: DashMap<String, TokenMeta>,
}

impl EvmRpcTransferSource {
    pub fn new(config: ChainConfig) -> ChainResult<Self> {
        let client = Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(|e| ChainError::HttpClient(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            config,
            metadata: DashMap::new(),
        })
    }

    pub fn timeout(&self) -> Duration {
        self.config.timeout()
    }

    async fn call<T: DeserializeOwned>(
        &self,
        url: &str,
        method: &str,
        params: Value,
    ) -> ChainResult<Option<T>> {
        let request = RpcRequest {
            jsonrpc: "2.0",
            id: 1,
            method,
            params,
        };

        let response = self
            .client
            .post(url)
            .json(&request)
            .send()
            .await
            .map_err(|e| ChainError::HttpClient(format!("HTTP request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ChainError::HttpClient(format!("HTTP {status}: {body}")));
        }

        let body: RpcResponse<T> = response
            .json()
            .await
            .map_err(|e| ChainError::Decode(format!("Failed to parse RPC response: {e}")))?;

        if let Some(err) = body.error {
            return Err(ChainError::Rpc(format!("{method} ({}): {}", err.code, err.message)));
        }
        Ok(body.result)
    }

    async fn eth_call(&self, url: &str, to: &str, calldata: Vec<u8>) -> ChainResult<Vec<u8>> {
        let params = json!([{ "to": to, "data": format!("0x{}", hex::encode(calldata)) }, "latest"]);
        let result: Option<String> = self.call(url, "eth_call", params).await?;
        let result = result.ok_or_else(|| ChainError::Rpc(format!("eth_call to {to} returned null")))?;
        decode_hex(&result)
    }

    async fn token_meta(&self, chain: &str, url: &str, token: &str) -> ChainResult<TokenMeta> {
        if let Some(meta) = known_token(chain, token) {
            return Ok(meta);
        }
        let key = format!("{chain}:{token}");
        if let Some(meta) = self.metadata.get(&key) {
            return Ok(meta.clone());
        }

        let symbol_raw = self
            .eth_call(url, token, IERC20::symbolCall {}.abi_encode())
            .await?;
        let decimals_raw = self
            .eth_call(url, token, IERC20::decimalsCall {}.abi_encode())
            .await?;
        let meta = TokenMeta {
            symbol: decode_symbol(&symbol_raw)?,
            decimals: IERC20::decimalsCall::abi_decode_returns(&decimals_raw, true)
                .map_err(|e| ChainError::Decode(format!("decimals() of {token}: {e}")))?
                ._0,
        };
        debug!(chain, token, symbol = %meta.symbol, decimals = meta.decimals, "Resolved token metadata");
        self.metadata.insert(key, meta.clone());
        Ok(meta)
    }
}

#[async_trait]
impl TransferSource for EvmRpcTransferSource {
    async fn token_transfers(&self, chain: &str, tx_id: &str) -> ChainResult<Vec<TokenTransfer>> {
        let url = self
            .config
            .rpc_url(chain)
            .ok_or_else(|| ChainError::UnsupportedChain(chain.to_string()))?
            .to_string();

        let receipt: Receipt = self
            .call(&url, "eth_getTransactionReceipt", json!([tx_id]))
            .await?
            .ok_or_else(|| ChainError::TransactionNotFound(tx_id.to_string()))?;

        let mut transfers = Vec::new();
        for raw in receipt.logs.iter().filter_map(decode_transfer_log) {
            let meta = match self.token_meta(chain, &url, &raw.token).await {
                Ok(meta) => meta,
                Err(e) => {
                    warn!(chain, tx_id, token = %raw.token, error = %e, "Skipping transfer with unknown token");
                    continue;
                }
            };
            let Some(amount) = scale_amount(raw.value, meta.decimals) else {
                warn!(chain, tx_id, token = %raw.token, "Skipping transfer with out-of-range amount");
                continue;
            };
            transfers.push(TokenTransfer {
                token_address: raw.token,
                symbol: meta.symbol,
                decimals: meta.decimals,
                from: raw.from,
                to: raw.to,
                amount,
            });
        }

        debug!(chain, tx_id, logs = receipt.logs.len(), transfers = transfers.len(), "Decoded receipt");
        Ok(transfers)
    }
}

fn known_token(chain: &str, token: &str) -> Option<TokenMeta> {
    KNOWN_TOKENS
        .iter()
        .find(|(c, addr, _, _)| *c == chain && *addr == token)
        .map(|(_, _, symbol, decimals)| TokenMeta {
            symbol: (*symbol).to_string(),
            decimals: *decimals,
        })
}

fn decode_hex(value: &str) -> ChainResult<Vec<u8>> {
    hex::decode(value.trim_start_matches("0x"))
        .map_err(|e| ChainError::Decode(format!("invalid hex {value:?}: {e}")))
}

/// Hex string of the `Transfer(address,address,uint256)` topic, without `0x`.
fn transfer_topic() -> String {
    hex::encode(IERC20::Transfer::SIGNATURE_HASH)
}

/// Address from a 32-byte indexed topic.
fn topic_address(topic: &str) -> Option<String> {
    let bytes = decode_hex(topic).ok()?;
    (bytes.len() == 32).then(|| format!("0x{}", hex::encode(&bytes[12..])))
}

/// Decode an ERC-20 `Transfer` log. ERC-721 transfers (value indexed, four
/// topics) and unrelated events yield `None`.
fn decode_transfer_log(log: &RpcLog) -> Option<RawTransfer> {
    if log.topics.len() != 3 {
        return None;
    }
    if !log.topics[0]
        .trim_start_matches("0x")
        .eq_ignore_ascii_case(&transfer_topic())
    {
        return None;
    }
    let data = decode_hex(&log.data).ok()?;
    Some(RawTransfer {
        token: log.address.to_ascii_lowercase(),
        from: topic_address(&log.topics[1])?,
        to: topic_address(&log.topics[2])?,
        value: U256::try_from_be_slice(&data)?,
    })
}

/// Scale a raw token amount by its decimals. Excess precision beyond what a
/// `Decimal` can hold is truncated; amounts too large in whole units yield `None`.
fn scale_amount(value: U256, decimals: u8) -> Option<Decimal> {
    let mut mantissa = u128::try_from(value).ok()?;
    let mut scale = u32::from(decimals);
    while mantissa > MAX_MANTISSA || scale > MAX_SCALE {
        if scale == 0 {
            return None;
        }
        mantissa /= 10;
        scale -= 1;
    }
    let mantissa = i128::try_from(mantissa).ok()?;
    Decimal::try_from_i128_with_scale(mantissa, scale)
        .ok()
        .map(|d| d.normalize())
}

/// Decode a `symbol()` return value: ABI string, or bytes32 for older tokens.
fn decode_symbol(raw: &[u8]) -> ChainResult<String> {
    if let Ok(ret) = IERC20::symbolCall::abi_decode_returns(raw, true) {
        return Ok(ret._0);
    }
    if raw.len() == 32 {
        let trimmed: Vec<u8> = raw.iter().copied().take_while(|b| *b != 0).collect();
        if let Ok(symbol) = String::from_utf8(trimmed) {
            if !symbol.is_empty() {
                return Ok(symbol);
            }
        }
    }
    Err(ChainError::Decode("symbol() returned neither string nor bytes32".to_string()))
}
