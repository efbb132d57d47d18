//! PAW node RPC client.
//!
//! The node speaks a single-endpoint JSON protocol: every call is a POST with
//! an `action` field. Amounts are decimal raw strings (9 digits finer than
//! ledger units). The node holds the custody wallet; send/receive operations
//! reference it by wallet id, which never appears in logs.

use alloy::primitives::U256;
use async_trait::async_trait;
use eyre::{eyre, Result, WrapErr};
use serde::{de, Deserialize, Deserializer};
use serde_json::json;
use std::collections::HashMap;
use std::time::Duration;

use crate::redact::Redacted;
use crate::types::{parse_units, raw_to_units, units_to_raw, NativeAddress};

/// A pending receivable on an account: coin sent to us but not yet pocketed.
#[derive(Debug, Clone)]
pub struct Receivable {
    pub hash: String,
    /// Sender account, as reported by the node
    pub source: String,
    /// Amount in node raw
    pub amount_raw: U256,
}

/// Native-chain capability used by the L1 watcher and the bridge service.
///
/// Amounts cross this boundary in ledger atomic units; the implementation
/// converts to and from node raw.
#[async_trait]
pub trait L1Client: Send + Sync {
    /// Confirmed balance of an account, in units
    async fn balance(&self, account: &NativeAddress) -> Result<U256>;

    /// Pending receivables on an account
    async fn receivables(&self, account: &NativeAddress) -> Result<Vec<Receivable>>;

    /// Pocket a receivable into the hot wallet. Safe to replay: the node
    /// answers idempotently for an already-received block.
    async fn receive(&self, hash: &str) -> Result<()>;

    /// Send `units` from the hot wallet to `to`; returns the block hash.
    async fn send(&self, to: &NativeAddress, units: U256) -> Result<String>;
}

/// Reqwest-backed implementation of [`L1Client`] against a PAW node.
pub struct PawNodeClient {
    http: reqwest::Client,
    rpc_url: String,
    wallet_id: Redacted<String>,
    hot_wallet: NativeAddress,
}

#[derive(Debug, Deserialize)]
struct BalanceResponse {
    #[serde(default)]
    balance: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ReceivableEntry {
    amount: String,
    source: String,
}

#[derive(Debug, Deserialize)]
struct ReceivableResponse {
    #[serde(default, deserialize_with = "deserialize_blocks")]
    blocks: HashMap<String, ReceivableEntry>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct BlockResponse {
    #[serde(default)]
    block: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

impl PawNodeClient {
    pub fn new(rpc_url: &str, wallet_id: &str, hot_wallet: NativeAddress) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .wrap_err("Failed to build HTTP client")?;

        tracing::info!(rpc_url = %rpc_url, hot_wallet = %hot_wallet, "PAW node client initialized");

        Ok(Self {
            http,
            rpc_url: rpc_url.to_string(),
            wallet_id: Redacted(wallet_id.to_string()),
            hot_wallet,
        })
    }

    async fn call<T: serde::de::DeserializeOwned>(&self, body: serde_json::Value) -> Result<T> {
        let action = body["action"].as_str().unwrap_or("?").to_string();
        let response = self
            .http
            .post(&self.rpc_url)
            .json(&body)
            .send()
            .await
            .wrap_err_with(|| format!("node rpc {} failed", action))?;

        if !response.status().is_success() {
            return Err(eyre!(
                "node rpc {} returned status {}",
                action,
                response.status()
            ));
        }

        response
            .json()
            .await
            .wrap_err_with(|| format!("node rpc {} returned malformed JSON", action))
    }
}

#[async_trait]
impl L1Client for PawNodeClient {
    async fn balance(&self, account: &NativeAddress) -> Result<U256> {
        let response: BalanceResponse = self
            .call(json!({
                "action": "account_balance",
                "account": account.as_str(),
            }))
            .await?;
        if let Some(error) = response.error {
            return Err(eyre!("account_balance error: {}", error));
        }
        let balance = response
            .balance
            .ok_or_else(|| eyre!("account_balance returned no balance"))?;
        let raw = parse_units(&balance)?;
        Ok(raw_to_units(raw))
    }

    async fn receivables(&self, account: &NativeAddress) -> Result<Vec<Receivable>> {
        let response: ReceivableResponse = self
            .call(json!({
                "action": "receivable",
                "account": account.as_str(),
                "count": "100",
                "source": "true",
            }))
            .await?;
        if let Some(error) = response.error {
            return Err(eyre!("receivable error: {}", error));
        }
        let mut out = Vec::with_capacity(response.blocks.len());
        for (hash, entry) in response.blocks {
            out.push(Receivable {
                hash,
                source: entry.source,
                amount_raw: parse_units(&entry.amount)?,
            });
        }
        Ok(out)
    }

    async fn receive(&self, hash: &str) -> Result<()> {
        let response: BlockResponse = self
            .call(json!({
                "action": "receive",
                "wallet": self.wallet_id.0,
                "account": self.hot_wallet.as_str(),
                "block": hash,
            }))
            .await?;
        if let Some(error) = response.error {
            // The node reports an already-pocketed block as an error; the
            // operation is a replay and has succeeded.
            if error.contains("already received") || error.contains("Unreceivable") {
                tracing::debug!(hash = %hash, "receive replayed, already pocketed");
                return Ok(());
            }
            return Err(eyre!("receive error for {}: {}", hash, error));
        }
        Ok(())
    }

    async fn send(&self, to: &NativeAddress, units: U256) -> Result<String> {
        let raw = units_to_raw(units);
        let response: BlockResponse = self
            .call(json!({
                "action": "send",
                "wallet": self.wallet_id.0,
                "source": self.hot_wallet.as_str(),
                "destination": to.as_str(),
                "amount": raw.to_string(),
            }))
            .await?;
        if let Some(error) = response.error {
            return Err(eyre!("send to {} failed: {}", to, error));
        }
        response
            .block
            .ok_or_else(|| eyre!("send to {} returned no block hash", to))
    }
}

/// The node returns `"blocks": ""` instead of an empty map when an account
/// has no receivables. Accept both shapes.
fn deserialize_blocks<'de, D>(
    deserializer: D,
) -> std::result::Result<HashMap<String, ReceivableEntry>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    match value {
        serde_json::Value::Object(_) => {
            serde_json::from_value(value).map_err(de::Error::custom)
        }
        serde_json::Value::String(_) | serde_json::Value::Null => Ok(HashMap::new()),
        other => Err(de::Error::custom(format!(
            "unexpected blocks value: {}",
            other
        ))),
    }
}
