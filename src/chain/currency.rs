use serde_json::{json, Value};
use std::collections::HashMap;
use std::fmt;

use super::scale::Cursor;

/// Native tokens of the vault chains, with their runtime enum tags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenSymbol {
    Dot,
    Ibtc,
    Intr,
    Ksm,
    Kbtc,
    Kint,
}

impl TokenSymbol {
    pub fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            0 => Some(Self::Dot),
            1 => Some(Self::Ibtc),
            2 => Some(Self::Intr),
            10 => Some(Self::Ksm),
            11 => Some(Self::Kbtc),
            12 => Some(Self::Kint),
            _ => None,
        }
    }

    pub fn from_ticker(ticker: &str) -> Option<Self> {
        match ticker {
            "DOT" => Some(Self::Dot),
            "IBTC" => Some(Self::Ibtc),
            "INTR" => Some(Self::Intr),
            "KSM" => Some(Self::Ksm),
            "KBTC" => Some(Self::Kbtc),
            "KINT" => Some(Self::Kint),
            _ => None,
        }
    }

    pub fn ticker(&self) -> &'static str {
        match self {
            Self::Dot => "DOT",
            Self::Ibtc => "IBTC",
            Self::Intr => "INTR",
            Self::Ksm => "KSM",
            Self::Kbtc => "KBTC",
            Self::Kint => "KINT",
        }
    }

    /// Planck decimals as registered on chain.
    pub fn decimals(&self) -> u32 {
        match self {
            Self::Dot => 10,
            Self::Ibtc => 8,
            Self::Intr => 10,
            Self::Ksm => 12,
            Self::Kbtc => 8,
            Self::Kint => 12,
        }
    }

    pub fn all() -> [Self; 6] {
        [
            Self::Dot,
            Self::Ibtc,
            Self::Intr,
            Self::Ksm,
            Self::Kbtc,
            Self::Kint,
        ]
    }
}

/// Runtime `CurrencyId` of the vault chains. Tag order matches the
/// on-chain enum, which is what the SCALE bytes carry.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CurrencyId {
    Token(TokenSymbol),
    ForeignAsset(u32),
    LendToken(u32),
    LpToken(Box<CurrencyId>, Box<CurrencyId>),
    StableLpToken(u32),
}

impl CurrencyId {
    pub fn decode(cursor: &mut Cursor) -> eyre::Result<Self> {
        let tag = cursor.u8()?;
        let id = match tag {
            0 => {
                let token_tag = cursor.u8()?;
                let symbol = TokenSymbol::from_tag(token_tag)
                    .ok_or_else(|| eyre::eyre!("Unknown token tag {}", token_tag))?;
                Self::Token(symbol)
            }
            1 => Self::ForeignAsset(cursor.u32_le()?),
            2 => Self::LendToken(cursor.u32_le()?),
            3 => Self::LpToken(
                Box::new(Self::decode_lp_leaf(cursor)?),
                Box::new(Self::decode_lp_leaf(cursor)?),
            ),
            4 => Self::StableLpToken(cursor.u32_le()?),
            _ => eyre::bail!("Unknown CurrencyId tag {}", tag),
        };
        Ok(id)
    }

    /// The constituents of an LP pair draw from a restricted enum with its
    /// own tag numbering.
    fn decode_lp_leaf(cursor: &mut Cursor) -> eyre::Result<Self> {
        let tag = cursor.u8()?;
        let id = match tag {
            0 => {
                let token_tag = cursor.u8()?;
                let symbol = TokenSymbol::from_tag(token_tag)
                    .ok_or_else(|| eyre::eyre!("Unknown token tag {}", token_tag))?;
                Self::Token(symbol)
            }
            1 => Self::ForeignAsset(cursor.u32_le()?),
            2 => Self::StableLpToken(cursor.u32_le()?),
            _ => eyre::bail!("Unknown LP constituent tag {}", tag),
        };
        Ok(id)
    }

    /// JSON in the camel-cased shape the chain's own RPC renders, so
    /// records line up with what downstream consumers already parse.
    pub fn to_json(&self) -> Value {
        match self {
            Self::Token(symbol) => json!({ "token": symbol.ticker() }),
            Self::ForeignAsset(id) => json!({ "foreignAsset": id }),
            Self::LendToken(id) => json!({ "lendToken": id }),
            Self::LpToken(a, b) => json!({ "lpToken": [a.to_json(), b.to_json()] }),
            Self::StableLpToken(id) => json!({ "stableLpToken": id }),
        }
    }
}

impl fmt::Display for CurrencyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Token(symbol) => write!(f, "{}", symbol.ticker()),
            Self::ForeignAsset(id) => write!(f, "ForeignAsset({})", id),
            Self::LendToken(id) => write!(f, "LendToken({})", id),
            Self::LpToken(a, b) => write!(f, "LpToken({}, {})", a, b),
            Self::StableLpToken(id) => write!(f, "StableLpToken({})", id),
        }
    }
}

/// Display metadata for one currency.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CurrencyMeta {
    pub symbol: String,
    pub decimals: u32,
}

/// Maps currency identifiers to tickers and decimals. Populated from the
/// chain profile, then the on-chain asset registry, then an optional CSV;
/// later inserts win.
#[derive(Debug, Default)]
pub struct CurrencyRegistry {
    entries: HashMap<CurrencyId, CurrencyMeta>,
}

impl CurrencyRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry preloaded with the native tokens and their well-known
    /// decimals.
    pub fn with_native_tokens() -> Self {
        let mut registry = Self::new();
        for symbol in TokenSymbol::all() {
            registry.insert(
                CurrencyId::Token(symbol),
                CurrencyMeta {
                    symbol: symbol.ticker().to_string(),
                    decimals: symbol.decimals(),
                },
            );
        }
        registry
    }

    pub fn insert(&mut self, id: CurrencyId, meta: CurrencyMeta) {
        self.entries.insert(id, meta);
    }

    /// Register a native token by ticker. Returns false when the ticker is
    /// not one this chain family knows.
    pub fn insert_native(&mut self, ticker: &str, decimals: u32) -> bool {
        match TokenSymbol::from_ticker(ticker) {
            Some(symbol) => {
                self.insert(
                    CurrencyId::Token(symbol),
                    CurrencyMeta {
                        symbol: ticker.to_string(),
                        decimals,
                    },
                );
                true
            }
            None => false,
        }
    }

    pub fn resolve(&self, id: &CurrencyId) -> Option<&CurrencyMeta> {
        self.entries.get(id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Load currency metadata from a CSV with columns
    /// `id,name,symbol,decimals,type`. Rows that do not parse are logged
    /// and skipped. Returns how many rows were loaded.
    pub fn load_csv(&mut self, path: &str) -> eyre::Result<usize> {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .from_path(path)
            .map_err(|e| eyre::eyre!("Failed to open asset CSV '{}': {}", path, e))?;

        let mut loaded = 0usize;
        for (row, result) in reader.records().enumerate() {
            let record = result?;
            let id_field = record.get(0).unwrap_or("").trim();
            let symbol = record.get(2).unwrap_or("").trim();
            let decimals_field = record.get(3).unwrap_or("").trim();
            let kind = record.get(4).unwrap_or("").trim();

            let (Ok(id_num), Ok(decimals)) =
                (id_field.parse::<u32>(), decimals_field.parse::<u32>())
            else {
                tracing::warn!(row, id = id_field, "Skipping unparseable asset CSV row");
                continue;
            };
            if symbol.is_empty() {
                tracing::warn!(row, id = id_num, "Skipping asset CSV row without a symbol");
                continue;
            }

            let id = match kind {
                "token" => {
                    let native = u8::try_from(id_num).ok().and_then(TokenSymbol::from_tag);
                    match native {
                        Some(native) => CurrencyId::Token(native),
                        None => {
                            tracing::warn!(row, tag = id_num, "Skipping unknown native token tag");
                            continue;
                        }
                    }
                }
                "foreignAsset" => CurrencyId::ForeignAsset(id_num),
                "lendToken" => CurrencyId::LendToken(id_num),
                "stableLpToken" => CurrencyId::StableLpToken(id_num),
                other => {
                    tracing::warn!(row, kind = other, "Skipping asset CSV row of unknown type");
                    continue;
                }
            };

            self.insert(
                id,
                CurrencyMeta {
                    symbol: symbol.to_string(),
                    decimals,
                },
            );
            loaded += 1;
        }

        tracing::info!(path, loaded, "Loaded currency metadata from CSV");
        Ok(loaded)
    }
}
