use bigdecimal::BigDecimal;
use serde_json::{json, Value};
use std::fmt;

use super::currency::{CurrencyId, CurrencyMeta};
use super::keys;
use super::scale::Cursor;
use super::ss58;

/// Largest integer the chain's RPC renders as a bare JSON number; anything
/// above it comes out as a hex string, and we keep that convention so our
/// records match the index files consumers already parse.
const MAX_SAFE_JSON_INT: u128 = (1 << 53) - 1;

/// One storage value rendered three ways: `machine` mirrors the chain
/// RPC's JSON shape, `human` swaps raw balances and ids for readable
/// forms, `display` is a one-line summary for logs.
#[derive(Debug, Clone)]
pub struct Decoded {
    pub machine: Value,
    pub human: Value,
    pub display: String,
}

/// A 32-byte sr25519/ed25519 public key.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct AccountId32(pub [u8; 32]);

impl AccountId32 {
    pub fn decode(cursor: &mut Cursor) -> eyre::Result<Self> {
        let bytes = cursor.take(32)?;
        let mut key = [0u8; 32];
        key.copy_from_slice(bytes);
        Ok(Self(key))
    }

    pub fn pubkey_hex(&self) -> String {
        format!("0x{}", hex::encode(self.0))
    }

    pub fn to_ss58(&self, prefix: u16) -> String {
        ss58::encode(prefix, &self.0)
    }
}

impl fmt::Debug for AccountId32 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AccountId32({})", hex::encode(self.0))
    }
}

/// Identity of a vault: its operator account plus the collateral/wrapped
/// currency pair it runs.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct VaultId {
    pub account: AccountId32,
    pub collateral: CurrencyId,
    pub wrapped: CurrencyId,
}

impl VaultId {
    pub fn decode(cursor: &mut Cursor) -> eyre::Result<Self> {
        let account = AccountId32::decode(cursor)?;
        let collateral = CurrencyId::decode(cursor)?;
        let wrapped = CurrencyId::decode(cursor)?;
        Ok(Self {
            account,
            collateral,
            wrapped,
        })
    }

    pub fn to_json(&self, ss58_prefix: u16) -> Value {
        json!({
            "accountId": self.account.to_ss58(ss58_prefix),
            "currencies": {
                "collateral": self.collateral.to_json(),
                "wrapped": self.wrapped.to_json(),
            },
        })
    }

    pub fn display(&self, ss58_prefix: u16) -> String {
        format!(
            "{} ({} -> {})",
            self.account.to_ss58(ss58_prefix),
            self.collateral,
            self.wrapped
        )
    }

    pub fn decoded(&self, ss58_prefix: u16) -> Decoded {
        Decoded {
            machine: self.to_json(ss58_prefix),
            human: json!({
                "accountId": self.account.to_ss58(ss58_prefix),
                "currencies": {
                    "collateral": self.collateral.to_string(),
                    "wrapped": self.wrapped.to_string(),
                },
            }),
            display: self.display(ss58_prefix),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VaultStatus {
    Active(bool),
    Liquidated,
}

impl VaultStatus {
    pub fn decode(cursor: &mut Cursor) -> eyre::Result<Self> {
        match cursor.u8()? {
            0 => Ok(Self::Active(cursor.u8()? == 1)),
            1 => Ok(Self::Liquidated),
            tag => Err(eyre::eyre!("Unknown VaultStatus tag {}", tag)),
        }
    }

    pub fn to_json(&self) -> Value {
        match self {
            Self::Active(accepting) => json!({ "active": accepting }),
            Self::Liquidated => json!({ "liquidated": null }),
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Active(true) => "active",
            Self::Active(false) => "active (not accepting issues)",
            Self::Liquidated => "liquidated",
        }
    }
}

/// A `VaultRegistry.Vaults` storage value. Field order follows the
/// on-chain struct, which is the order the SCALE bytes arrive in.
#[derive(Debug, Clone)]
pub struct Vault {
    pub id: VaultId,
    pub status: VaultStatus,
    pub banned_until: Option<u32>,
    pub secure_collateral_threshold: Option<u128>,
    pub to_be_issued_tokens: u128,
    pub issued_tokens: u128,
    pub to_be_redeemed_tokens: u128,
    pub to_be_replaced_tokens: u128,
    pub replace_collateral: u128,
    pub active_replace_collateral: u128,
    pub liquidated_collateral: u128,
}

impl Vault {
    pub fn decode(cursor: &mut Cursor) -> eyre::Result<Self> {
        Ok(Self {
            id: VaultId::decode(cursor)?,
            status: VaultStatus::decode(cursor)?,
            banned_until: cursor.option(|c| c.u32_le())?,
            secure_collateral_threshold: cursor.option(|c| c.u128_le())?,
            to_be_issued_tokens: cursor.u128_le()?,
            issued_tokens: cursor.u128_le()?,
            to_be_redeemed_tokens: cursor.u128_le()?,
            to_be_replaced_tokens: cursor.u128_le()?,
            replace_collateral: cursor.u128_le()?,
            active_replace_collateral: cursor.u128_le()?,
            liquidated_collateral: cursor.u128_le()?,
        })
    }

    pub fn decoded(&self, ss58_prefix: u16) -> Decoded {
        let machine = json!({
            "id": self.id.to_json(ss58_prefix),
            "status": self.status.to_json(),
            "bannedUntil": self.banned_until,
            "secureCollateralThreshold": self.secure_collateral_threshold.map(balance_json),
            "toBeIssuedTokens": balance_json(self.to_be_issued_tokens),
            "issuedTokens": balance_json(self.issued_tokens),
            "toBeRedeemedTokens": balance_json(self.to_be_redeemed_tokens),
            "toBeReplacedTokens": balance_json(self.to_be_replaced_tokens),
            "replaceCollateral": balance_json(self.replace_collateral),
            "activeReplaceCollateral": balance_json(self.active_replace_collateral),
            "liquidatedCollateral": balance_json(self.liquidated_collateral),
        });
        let human = json!({
            "id": self.id.display(ss58_prefix),
            "status": self.status.label(),
            "bannedUntil": self.banned_until,
            "secureCollateralThreshold":
                self.secure_collateral_threshold.map(|v| v.to_string()),
            "toBeIssuedTokens": self.to_be_issued_tokens.to_string(),
            "issuedTokens": self.issued_tokens.to_string(),
            "toBeRedeemedTokens": self.to_be_redeemed_tokens.to_string(),
            "toBeReplacedTokens": self.to_be_replaced_tokens.to_string(),
            "replaceCollateral": self.replace_collateral.to_string(),
            "activeReplaceCollateral": self.active_replace_collateral.to_string(),
            "liquidatedCollateral": self.liquidated_collateral.to_string(),
        });
        let display = format!(
            "vault {} {} issued={}",
            self.id.display(ss58_prefix),
            self.status.label(),
            self.issued_tokens
        );
        Decoded {
            machine,
            human,
            display,
        }
    }
}

/// Render a balance the way the chain RPC does: a plain number while it
/// fits, a hex string once it cannot be represented losslessly.
pub fn balance_json(value: u128) -> Value {
    if value <= MAX_SAFE_JSON_INT {
        Value::from(value as u64)
    } else {
        Value::String(format!("{:#x}", value))
    }
}

/// The chain's `FixedI128`: a signed integer carrying 18 fractional
/// decimal digits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixedPoint(pub i128);

impl FixedPoint {
    pub const DECIMALS: u32 = 18;

    pub fn decode(cursor: &mut Cursor) -> eyre::Result<Self> {
        Ok(Self(cursor.i128_le()?))
    }

    /// The underlying planck amount as an exact decimal.
    pub fn to_decimal(&self) -> BigDecimal {
        let raw = BigDecimal::from(self.0);
        let divisor = BigDecimal::from(10u128.pow(Self::DECIMALS));
        (raw / divisor).normalized()
    }
}

/// One decoded entry of the vault registry map.
#[derive(Debug, Clone)]
pub struct VaultRecord {
    pub id: VaultId,
    pub key: Decoded,
    pub payload: Decoded,
}

/// One decoded entry of the collateral stake map.
#[derive(Debug, Clone)]
pub struct StakeRecord {
    pub nonce: u32,
    pub id: VaultId,
    pub stake: FixedPoint,
}

/// Decode `VaultRegistry.Vaults` key/value pairs. Entries that fail to
/// decode are logged and dropped; an unreadable single vault should not
/// sink a whole snapshot hour.
pub fn vault_records(pairs: &[(Vec<u8>, Vec<u8>)], ss58_prefix: u16) -> Vec<VaultRecord> {
    let prefix = keys::storage_prefix("VaultRegistry", "Vaults");
    let mut records = Vec::with_capacity(pairs.len());

    for (key, value) in pairs {
        if value.is_empty() {
            tracing::debug!(key = %hex::encode(key), "Vault entry with empty value, skipping");
            continue;
        }
        match decode_vault_entry(key, value, &prefix) {
            Ok(vault) => records.push(VaultRecord {
                key: vault.id.decoded(ss58_prefix),
                payload: vault.decoded(ss58_prefix),
                id: vault.id,
            }),
            Err(e) => {
                tracing::warn!(
                    key = %hex::encode(key),
                    error = %e,
                    "Failed to decode vault entry, skipping"
                );
            }
        }
    }

    records
}

fn decode_vault_entry(key: &[u8], value: &[u8], prefix: &[u8]) -> eyre::Result<Vault> {
    let suffix = keys::key_suffix(key, prefix)?;
    let mut key_cursor = Cursor::new(keys::strip_blake2_128_concat(suffix)?);
    let key_id = VaultId::decode(&mut key_cursor)?;
    if !key_cursor.is_empty() {
        eyre::bail!("{} trailing bytes after vault key", key_cursor.remaining());
    }

    let mut value_cursor = Cursor::new(value);
    let vault = Vault::decode(&mut value_cursor)?;
    if vault.id != key_id {
        eyre::bail!("Vault key and value disagree on the vault id");
    }
    Ok(vault)
}

/// Decode `VaultStaking.TotalCurrentStake` key/value pairs. The map key
/// is `(nonce, vault_id)`, both halves blake2_128_concat hashed; the
/// value is a `FixedI128`.
pub fn stake_records(pairs: &[(Vec<u8>, Vec<u8>)]) -> Vec<StakeRecord> {
    let prefix = keys::storage_prefix("VaultStaking", "TotalCurrentStake");
    let mut records = Vec::with_capacity(pairs.len());

    for (key, value) in pairs {
        if value.is_empty() {
            tracing::debug!(key = %hex::encode(key), "Stake entry with empty value, skipping");
            continue;
        }
        match decode_stake_entry(key, value, &prefix) {
            Ok(record) => records.push(record),
            Err(e) => {
                tracing::warn!(
                    key = %hex::encode(key),
                    error = %e,
                    "Failed to decode stake entry, skipping"
                );
            }
        }
    }

    records
}

fn decode_stake_entry(key: &[u8], value: &[u8], prefix: &[u8]) -> eyre::Result<StakeRecord> {
    let suffix = keys::key_suffix(key, prefix)?;
    let mut cursor = Cursor::new(keys::strip_blake2_128_concat(suffix)?);
    let nonce = cursor.u32_le()?;
    let rest = cursor.take(cursor.remaining())?;
    let mut cursor = Cursor::new(keys::strip_blake2_128_concat(rest)?);
    let id = VaultId::decode(&mut cursor)?;
    if !cursor.is_empty() {
        eyre::bail!("{} trailing bytes after stake key", cursor.remaining());
    }

    let stake = FixedPoint::decode(&mut Cursor::new(value))?;
    Ok(StakeRecord { nonce, id, stake })
}

/// Decode the leading fields of `AssetRegistry.Metadata` values: decimals,
/// then name, then symbol. The location and extra fields that follow vary
/// by runtime version, so we stop reading once we have what we need.
pub fn asset_metadata(pairs: &[(Vec<u8>, Vec<u8>)]) -> Vec<(u32, CurrencyMeta)> {
    let prefix = keys::storage_prefix("AssetRegistry", "Metadata");
    let mut assets = Vec::with_capacity(pairs.len());

    for (key, value) in pairs {
        match decode_asset_entry(key, value, &prefix) {
            Ok(asset) => assets.push(asset),
            Err(e) => {
                tracing::warn!(
                    key = %hex::encode(key),
                    error = %e,
                    "Failed to decode asset metadata, skipping"
                );
            }
        }
    }

    assets
}

fn decode_asset_entry(
    key: &[u8],
    value: &[u8],
    prefix: &[u8],
) -> eyre::Result<(u32, CurrencyMeta)> {
    let suffix = keys::key_suffix(key, prefix)?;
    let mut key_cursor = Cursor::new(keys::strip_twox_64_concat(suffix)?);
    let asset_id = key_cursor.u32_le()?;
    if !key_cursor.is_empty() {
        eyre::bail!("{} trailing bytes after asset key", key_cursor.remaining());
    }

    let mut cursor = Cursor::new(value);
    let decimals = cursor.u32_le()?;
    let _name = cursor.byte_vec()?;
    let symbol = String::from_utf8_lossy(cursor.byte_vec()?).into_owned();

    Ok((asset_id, CurrencyMeta { symbol, decimals }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::currency::TokenSymbol;

    fn sample_vault_id() -> VaultId {
        VaultId {
            account: AccountId32([0x11; 32]),
            collateral: CurrencyId::Token(TokenSymbol::Dot),
            wrapped: CurrencyId::Token(TokenSymbol::Ibtc),
        }
    }

    fn encode_currency(id: &CurrencyId, out: &mut Vec<u8>) {
        match id {
            CurrencyId::Token(symbol) => {
                out.push(0);
                out.push(match symbol {
                    TokenSymbol::Dot => 0,
                    TokenSymbol::Ibtc => 1,
                    TokenSymbol::Intr => 2,
                    TokenSymbol::Ksm => 10,
                    TokenSymbol::Kbtc => 11,
                    TokenSymbol::Kint => 12,
                });
            }
            CurrencyId::ForeignAsset(id) => {
                out.push(1);
                out.extend_from_slice(&id.to_le_bytes());
            }
            _ => unimplemented!("not needed in fixtures"),
        }
    }

    fn encode_vault_id(id: &VaultId, out: &mut Vec<u8>) {
        out.extend_from_slice(&id.account.0);
        encode_currency(&id.collateral, out);
        encode_currency(&id.wrapped, out);
    }

    fn encode_vault_value(vault_id: &VaultId, issued: u128, threshold: Option<u128>) -> Vec<u8> {
        let mut out = Vec::new();
        encode_vault_id(vault_id, &mut out);
        out.extend_from_slice(&[0, 1]); // status Active(true)
        out.push(0); // bannedUntil: None
        match threshold {
            Some(v) => {
                out.push(1);
                out.extend_from_slice(&v.to_le_bytes());
            }
            None => out.push(0),
        }
        for amount in [0u128, issued, 0, 0, 0, 0, 0] {
            out.extend_from_slice(&amount.to_le_bytes());
        }
        out
    }

    fn vault_storage_key(vault_id: &VaultId) -> Vec<u8> {
        let mut key = keys::storage_prefix("VaultRegistry", "Vaults");
        key.extend_from_slice(&[0xab; 16]); // stand-in for the blake2 half
        encode_vault_id(vault_id, &mut key);
        key
    }

    fn stake_storage_key(nonce: u32, vault_id: &VaultId) -> Vec<u8> {
        let mut key = keys::storage_prefix("VaultStaking", "TotalCurrentStake");
        key.extend_from_slice(&[0xcd; 16]);
        key.extend_from_slice(&nonce.to_le_bytes());
        key.extend_from_slice(&[0xef; 16]);
        encode_vault_id(vault_id, &mut key);
        key
    }

    #[test]
    fn test_decode_vault_entry() {
        let id = sample_vault_id();
        let pairs = vec![(
            vault_storage_key(&id),
            encode_vault_value(&id, 5_000_000, Some(900_000_000_000_000_000)),
        )];

        let records = vault_records(&pairs, 42);
        assert_eq!(records.len(), 1);
        let record = &records[0];
        assert_eq!(record.id, id);
        assert_eq!(
            record.key.machine["currencies"]["collateral"],
            json!({ "token": "DOT" })
        );
        assert_eq!(record.payload.machine["issuedTokens"], json!(5_000_000));
        assert_eq!(record.payload.machine["status"], json!({ "active": true }));
        assert_eq!(record.payload.machine["bannedUntil"], Value::Null);
        // 9e17 is past the safe JSON integer range, so it renders as hex.
        assert_eq!(
            record.payload.machine["secureCollateralThreshold"],
            json!("0xc7d713b49da0000")
        );
        assert_eq!(
            record.payload.human["secureCollateralThreshold"],
            json!("900000000000000000")
        );
    }

    #[test]
    fn test_decode_vault_skips_bad_entries() {
        let id = sample_vault_id();
        let good = (
            vault_storage_key(&id),
            encode_vault_value(&id, 1, None),
        );
        let truncated = (vault_storage_key(&id), vec![0x00, 0x01]);
        let empty = (vault_storage_key(&id), Vec::new());

        let records = vault_records(&[truncated, empty, good], 42);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].payload.machine["issuedTokens"], json!(1));
    }

    #[test]
    fn test_decode_stake_entry() {
        let id = sample_vault_id();
        // 250.5 units at the chain's 18-digit fixed point.
        let stake = 250_500_000_000_000_000_000i128;
        let pairs = vec![(stake_storage_key(0, &id), stake.to_le_bytes().to_vec())];

        let records = stake_records(&pairs);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].nonce, 0);
        assert_eq!(records[0].id, id);
        assert_eq!(records[0].stake.to_decimal().to_string(), "250.5");
    }

    #[test]
    fn test_fixed_point_negative_and_zero() {
        assert_eq!(FixedPoint(0).to_decimal().to_string(), "0");
        assert_eq!(
            FixedPoint(-1_500_000_000_000_000_000).to_decimal().to_string(),
            "-1.5"
        );
    }

    #[test]
    fn test_balance_json_threshold() {
        assert_eq!(balance_json(0), json!(0));
        assert_eq!(balance_json(9_007_199_254_740_991), json!(9_007_199_254_740_991u64));
        assert_eq!(balance_json(9_007_199_254_740_992), json!("0x20000000000000"));
    }

    #[test]
    fn test_decode_asset_metadata() {
        let mut key = keys::storage_prefix("AssetRegistry", "Metadata");
        key.extend_from_slice(&[0x99; 8]);
        key.extend_from_slice(&3u32.to_le_bytes());

        let mut value = Vec::new();
        value.extend_from_slice(&6u32.to_le_bytes());
        value.push((10 << 2) as u8); // compact len 10
        value.extend_from_slice(b"Tether USD");
        value.push((4 << 2) as u8); // compact len 4
        value.extend_from_slice(b"USDT");
        value.extend_from_slice(&[0xff; 7]); // trailing fields we ignore

        let assets = asset_metadata(&[(key, value)]);
        assert_eq!(assets.len(), 1);
        assert_eq!(assets[0].0, 3);
        assert_eq!(assets[0].1.symbol, "USDT");
        assert_eq!(assets[0].1.decimals, 6);
    }

    #[test]
    fn test_account_ss58_and_hex() {
        let account = AccountId32([0x11; 32]);
        assert!(account.pubkey_hex().starts_with("0x1111"));
        let address = account.to_ss58(2032);
        let (prefix, key) = ss58::decode(&address).unwrap();
        assert_eq!(prefix, 2032);
        assert_eq!(key, account.0);
    }
}
