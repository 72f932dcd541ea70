use bigdecimal::BigDecimal;
use serde::Serialize;
use serde_json::Value;
use std::collections::{HashMap, HashSet};

use crate::chain::currency::CurrencyRegistry;
use crate::chain::decode::{StakeRecord, VaultId, VaultRecord};

use super::convert::{apply_conversions, ConversionRule};

/// Per-hour constants stamped onto every record of the hour.
pub struct HourContext<'a> {
    pub chain_name: &'a str,
    pub block_hash: &'a str,
    pub block_number: u64,
    pub ts: i64,
    pub section: &'a str,
    pub storage: &'a str,
    pub track: &'a str,
    pub source: &'a str,
    pub ss58_prefix: u16,
}

/// One output line. Serialization order is declaration order, which is
/// the column order downstream loaders expect.
#[derive(Serialize)]
struct JoinedRecord<'a> {
    chain_name: &'a str,
    block_hash: &'a str,
    block_number: u64,
    ts: i64,
    section: &'a str,
    storage: &'a str,
    track: &'a str,
    track_val: String,
    source: &'a str,
    address_pubkey: String,
    address_ss58: String,
    kv: &'a Value,
    pv: Value,
}

/// Join each collateral stake to its vault registry entry and render the
/// hour's records as NDJSON lines. Stakes without a vault are logged and
/// dropped; vaults without a stake are only reported.
pub fn join_hour(
    vaults: &[VaultRecord],
    stakes: &[StakeRecord],
    registry: &CurrencyRegistry,
    rules: &[ConversionRule],
    ctx: &HourContext,
) -> eyre::Result<Vec<String>> {
    let by_id: HashMap<&VaultId, &VaultRecord> =
        vaults.iter().map(|vault| (&vault.id, vault)).collect();
    let mut matched: HashSet<&VaultId> = HashSet::new();
    let mut lines = Vec::with_capacity(stakes.len());

    for stake in stakes {
        let Some(vault) = by_id.get(&stake.id) else {
            tracing::warn!(
                vault = %stake.id.display(ctx.ss58_prefix),
                nonce = stake.nonce,
                "Stake entry has no matching vault registry entry, skipping"
            );
            continue;
        };
        matched.insert(&vault.id);

        let planck = stake.stake.to_decimal();
        let (collateral, ticker) = match registry.resolve(&stake.id.collateral) {
            Some(meta) => (
                Value::String(human_amount(&planck, meta.decimals)),
                meta.symbol.clone(),
            ),
            None => {
                tracing::warn!(
                    currency = %stake.id.collateral,
                    vault = %stake.id.display(ctx.ss58_prefix),
                    "No metadata for collateral currency, emitting raw planck only"
                );
                (Value::Null, stake.id.collateral.to_string())
            }
        };

        let mut pv = serde_json::Map::new();
        pv.insert("collateral".to_string(), collateral);
        pv.insert("collateral_currency".to_string(), Value::String(ticker));
        pv.insert("nonce".to_string(), Value::from(stake.nonce));
        pv.insert(
            "raw_collateral".to_string(),
            Value::String(planck.to_string()),
        );
        if let Value::Object(fields) = &vault.payload.machine {
            for (key, value) in fields {
                pv.insert(key.clone(), value.clone());
            }
        }
        let mut pv = Value::Object(pv);
        apply_conversions(&mut pv, rules);

        let record = JoinedRecord {
            chain_name: ctx.chain_name,
            block_hash: ctx.block_hash,
            block_number: ctx.block_number,
            ts: ctx.ts,
            section: ctx.section,
            storage: ctx.storage,
            track: ctx.track,
            track_val: serde_json::to_string(&stake.id.collateral.to_json())?,
            source: ctx.source,
            address_pubkey: stake.id.account.pubkey_hex(),
            address_ss58: stake.id.account.to_ss58(ctx.ss58_prefix),
            kv: &vault.key.machine,
            pv,
        };
        lines.push(serde_json::to_string(&record)?);
    }

    let unmatched = vaults.len() - matched.len();
    if unmatched > 0 {
        for vault in vaults {
            if !matched.contains(&vault.id) {
                tracing::debug!(vault = %vault.key.display, "Vault has no collateral stake entry");
            }
        }
        tracing::warn!(count = unmatched, "Vault entries without a collateral stake");
    }

    Ok(lines)
}

/// Scale a planck amount down to display units.
fn human_amount(planck: &BigDecimal, decimals: u32) -> String {
    match 10u128.checked_pow(decimals) {
        Some(divisor) => (planck / BigDecimal::from(divisor)).normalized().to_string(),
        None => planck.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::currency::{CurrencyId, TokenSymbol};
    use crate::chain::decode::{AccountId32, FixedPoint, Vault, VaultStatus};
    use crate::snapshot::convert::Converter;
    use serde_json::json;

    const PREFIX: u16 = 2032;

    fn vault_id(seed: u8, collateral: CurrencyId) -> VaultId {
        VaultId {
            account: AccountId32([seed; 32]),
            collateral,
            wrapped: CurrencyId::Token(TokenSymbol::Ibtc),
        }
    }

    fn vault_record(id: &VaultId, issued: u128, threshold: Option<u128>) -> VaultRecord {
        let vault = Vault {
            id: id.clone(),
            status: VaultStatus::Active(true),
            banned_until: None,
            secure_collateral_threshold: threshold,
            to_be_issued_tokens: 0,
            issued_tokens: issued,
            to_be_redeemed_tokens: 0,
            to_be_replaced_tokens: 0,
            replace_collateral: 0,
            active_replace_collateral: 0,
            liquidated_collateral: 0,
        };
        VaultRecord {
            id: id.clone(),
            key: id.decoded(PREFIX),
            payload: vault.decoded(PREFIX),
        }
    }

    fn stake(id: &VaultId, nonce: u32, raw: i128) -> StakeRecord {
        StakeRecord {
            nonce,
            id: id.clone(),
            stake: FixedPoint(raw),
        }
    }

    fn ctx() -> HourContext<'static> {
        HourContext {
            chain_name: "Interlay",
            block_hash: "0xbbbb",
            block_number: 3968299,
            ts: 1704117599,
            section: "vaultRegistry",
            storage: "vaults",
            track: "vault-collateral",
            source: "parastate-exporter",
            ss58_prefix: PREFIX,
        }
    }

    #[test]
    fn test_join_produces_one_line_per_stake() {
        let id = vault_id(0x11, CurrencyId::Token(TokenSymbol::Dot));
        let vaults = vec![vault_record(&id, 5_000_000, None)];
        // 250.5 DOT of collateral: planck 2_505_000_000_000 at fixed
        // point 1e18.
        let stakes = vec![stake(&id, 0, 2_505_000_000_000i128 * 10i128.pow(18))];
        let registry = CurrencyRegistry::with_native_tokens();

        let lines = join_hour(&vaults, &stakes, &registry, &[], &ctx()).unwrap();
        assert_eq!(lines.len(), 1);

        let record: Value = serde_json::from_str(&lines[0]).unwrap();
        assert_eq!(record["chain_name"], json!("Interlay"));
        assert_eq!(record["block_hash"], json!("0xbbbb"));
        assert_eq!(record["block_number"], json!(3968299));
        assert_eq!(record["ts"], json!(1704117599));
        assert_eq!(record["section"], json!("vaultRegistry"));
        assert_eq!(record["track"], json!("vault-collateral"));
        assert_eq!(record["track_val"], json!(r#"{"token":"DOT"}"#));
        assert_eq!(record["address_pubkey"].as_str().unwrap().len(), 66);
        assert_eq!(
            record["address_ss58"],
            record["kv"]["accountId"],
        );
        assert_eq!(record["pv"]["collateral"], json!("250.5"));
        assert_eq!(record["pv"]["collateral_currency"], json!("DOT"));
        assert_eq!(record["pv"]["nonce"], json!(0));
        assert_eq!(record["pv"]["raw_collateral"], json!("2505000000000"));
        assert_eq!(record["pv"]["issuedTokens"], json!(5_000_000));
        assert_eq!(record["pv"]["status"], json!({ "active": true }));
    }

    #[test]
    fn test_line_starts_with_chain_name() {
        // Loaders rely on stable column order, so the struct order must
        // survive serialization.
        let id = vault_id(0x22, CurrencyId::Token(TokenSymbol::Dot));
        let vaults = vec![vault_record(&id, 0, None)];
        let stakes = vec![stake(&id, 0, 10i128.pow(18))];
        let registry = CurrencyRegistry::with_native_tokens();

        let lines = join_hour(&vaults, &stakes, &registry, &[], &ctx()).unwrap();
        assert!(lines[0].starts_with(r#"{"chain_name":"Interlay","block_hash":"#));
    }

    #[test]
    fn test_stake_without_vault_is_dropped() {
        let id = vault_id(0x33, CurrencyId::Token(TokenSymbol::Dot));
        let stakes = vec![stake(&id, 0, 10i128.pow(18))];
        let registry = CurrencyRegistry::with_native_tokens();

        let lines = join_hour(&[], &stakes, &registry, &[], &ctx()).unwrap();
        assert!(lines.is_empty());
    }

    #[test]
    fn test_unknown_currency_falls_back_to_raw() {
        let id = vault_id(0x44, CurrencyId::ForeignAsset(9));
        let vaults = vec![vault_record(&id, 0, None)];
        let stakes = vec![stake(&id, 2, 42 * 10i128.pow(18))];
        let registry = CurrencyRegistry::with_native_tokens();

        let lines = join_hour(&vaults, &stakes, &registry, &[], &ctx()).unwrap();
        let record: Value = serde_json::from_str(&lines[0]).unwrap();
        assert_eq!(record["pv"]["collateral"], Value::Null);
        assert_eq!(record["pv"]["collateral_currency"], json!("ForeignAsset(9)"));
        assert_eq!(record["pv"]["raw_collateral"], json!("42"));
        assert_eq!(record["pv"]["nonce"], json!(2));
    }

    #[test]
    fn test_conversion_rules_rewrite_payload_fields() {
        let id = vault_id(0x55, CurrencyId::Token(TokenSymbol::Dot));
        // 0.9e18, rendered as hex by the codec layer.
        let vaults = vec![vault_record(&id, 0, Some(900_000_000_000_000_000))];
        let stakes = vec![stake(&id, 0, 10i128.pow(18))];
        let registry = CurrencyRegistry::with_native_tokens();
        let rules = [ConversionRule {
            path: "secureCollateralThreshold".to_string(),
            op: Converter::HexToDecimal { scale: 18 },
        }];

        let lines = join_hour(&vaults, &stakes, &registry, &rules, &ctx()).unwrap();
        let record: Value = serde_json::from_str(&lines[0]).unwrap();
        assert_eq!(record["pv"]["secureCollateralThreshold"], json!("0.9"));
    }

    #[test]
    fn test_empty_hour_produces_no_lines() {
        let registry = CurrencyRegistry::with_native_tokens();
        let lines = join_hour(&[], &[], &registry, &[], &ctx()).unwrap();
        assert!(lines.is_empty());
    }
}
