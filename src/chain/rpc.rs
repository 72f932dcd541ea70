use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicU64, Ordering};

use super::decode::{self, StakeRecord, VaultRecord};
use super::keys;
use super::scale::Cursor;

/// JSON-RPC client for a parachain archive node. Historical state is read
/// over plain HTTP; ws endpoints from existing configs are accepted and
/// mapped to their HTTP equivalent, since Substrate nodes answer the same
/// calls on both.
pub struct ParachainRpc {
    http: reqwest::Client,
    url: String,
    next_id: AtomicU64,
}

#[derive(Debug, Deserialize)]
struct RpcResponse {
    result: Option<Value>,
    error: Option<RpcErrorBody>,
}

#[derive(Debug, Deserialize)]
struct RpcErrorBody {
    code: i64,
    message: String,
}

impl ParachainRpc {
    /// Build a client and probe the node, so a bad endpoint fails the run
    /// before any snapshot work starts.
    pub async fn connect(endpoint: &str) -> eyre::Result<Self> {
        let url = http_endpoint(endpoint)?;
        let rpc = Self {
            http: reqwest::Client::new(),
            url,
            next_id: AtomicU64::new(1),
        };
        let chain: String = rpc.request("system_chain", json!([])).await?;
        let version: String = rpc.request("system_version", json!([])).await?;
        tracing::info!(
            chain = %chain,
            version = %version,
            url = %rpc.url,
            "Connected to parachain node"
        );
        Ok(rpc)
    }

    async fn request<T: DeserializeOwned>(&self, method: &str, params: Value) -> eyre::Result<T> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let body = json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": method,
            "params": params,
        });

        let response: RpcResponse = self
            .http
            .post(&self.url)
            .json(&body)
            .send()
            .await
            .map_err(|e| eyre::eyre!("RPC {} request failed: {}", method, e))?
            .error_for_status()
            .map_err(|e| eyre::eyre!("RPC {} request failed: {}", method, e))?
            .json()
            .await
            .map_err(|e| eyre::eyre!("RPC {} returned malformed JSON: {}", method, e))?;

        if let Some(error) = response.error {
            eyre::bail!("RPC {} failed: {} (code {})", method, error.message, error.code);
        }
        serde_json::from_value(response.result.unwrap_or(Value::Null))
            .map_err(|e| eyre::eyre!("RPC {} returned an unexpected shape: {}", method, e))
    }

    /// All key/value pairs under a storage prefix, at a block hash or at
    /// the node's best block.
    pub async fn storage_pairs(
        &self,
        prefix_hex: &str,
        at: Option<&str>,
    ) -> eyre::Result<Vec<(Vec<u8>, Vec<u8>)>> {
        let params = match at {
            Some(hash) => json!([prefix_hex, hash]),
            None => json!([prefix_hex]),
        };
        let pairs: Vec<(String, String)> = self.request("state_getPairs", params).await?;
        pairs
            .into_iter()
            .map(|(key, value)| Ok((decode_hex(&key)?, decode_hex(&value)?)))
            .collect()
    }

    /// Read one storage value; `None` when the key has no entry.
    pub async fn storage(&self, key_hex: &str, at: Option<&str>) -> eyre::Result<Option<Vec<u8>>> {
        let params = match at {
            Some(hash) => json!([key_hex, hash]),
            None => json!([key_hex]),
        };
        let value: Option<String> = self.request("state_getStorage", params).await?;
        value.map(|v| decode_hex(&v)).transpose()
    }

    /// View of chain state pinned at one block hash.
    pub fn at(&self, block_hash: &str) -> PinnedState<'_> {
        PinnedState {
            rpc: self,
            block_hash: block_hash.to_string(),
        }
    }
}

/// Storage reads frozen at a single historical block.
pub struct PinnedState<'a> {
    rpc: &'a ParachainRpc,
    block_hash: String,
}

impl PinnedState<'_> {
    pub fn block_hash(&self) -> &str {
        &self.block_hash
    }

    pub async fn storage_pairs(&self, prefix_hex: &str) -> eyre::Result<Vec<(Vec<u8>, Vec<u8>)>> {
        self.rpc
            .storage_pairs(prefix_hex, Some(&self.block_hash))
            .await
    }

    pub async fn storage(&self, key_hex: &str) -> eyre::Result<Option<Vec<u8>>> {
        self.rpc.storage(key_hex, Some(&self.block_hash)).await
    }

    /// Every vault registry entry at this block. Entries that fail to
    /// decode are logged and dropped; a transport failure is an error.
    pub async fn vaults(&self, ss58_prefix: u16) -> eyre::Result<Vec<VaultRecord>> {
        let prefix = keys::storage_prefix_hex("VaultRegistry", "Vaults");
        let pairs = self.storage_pairs(&prefix).await?;
        Ok(decode::vault_records(&pairs, ss58_prefix))
    }

    /// Every nonce-keyed collateral stake total at this block.
    pub async fn collateral_stakes(&self) -> eyre::Result<Vec<StakeRecord>> {
        let prefix = keys::storage_prefix_hex("VaultStaking", "TotalCurrentStake");
        let pairs = self.storage_pairs(&prefix).await?;
        Ok(decode::stake_records(&pairs))
    }

    /// The block's wall clock from `Timestamp.Now`, if the entry exists.
    pub async fn timestamp(&self) -> eyre::Result<Option<DateTime<Utc>>> {
        let key = keys::plain_key_hex("Timestamp", "Now");
        let Some(value) = self.storage(&key).await? else {
            return Ok(None);
        };
        let millis = Cursor::new(&value).u64_le()?;
        Ok(DateTime::from_timestamp_millis(millis as i64))
    }
}

/// Map a node endpoint to its HTTP form.
pub fn http_endpoint(endpoint: &str) -> eyre::Result<String> {
    if let Some(rest) = endpoint.strip_prefix("ws://") {
        Ok(format!("http://{}", rest))
    } else if let Some(rest) = endpoint.strip_prefix("wss://") {
        Ok(format!("https://{}", rest))
    } else if endpoint.starts_with("http://") || endpoint.starts_with("https://") {
        Ok(endpoint.to_string())
    } else {
        Err(eyre::eyre!(
            "Unsupported endpoint scheme in '{}': expected ws, wss, http or https",
            endpoint
        ))
    }
}

fn decode_hex(value: &str) -> eyre::Result<Vec<u8>> {
    let trimmed = value.strip_prefix("0x").unwrap_or(value);
    hex::decode(trimmed).map_err(|e| eyre::eyre!("Invalid hex in RPC response: {}", e))
}
