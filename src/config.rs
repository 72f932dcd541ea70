use clap::Parser;
use serde::Deserialize;
use std::path::PathBuf;

use chrono::{DateTime, Utc};

use crate::snapshot::convert::{ConversionRule, Converter};
use crate::window::{self, Window};

/// Export hourly parachain storage snapshots as NDJSON.
#[derive(Debug, Parser)]
#[command(name = "parastate-exporter", version, about)]
pub struct Args {
    /// Parachain node endpoint (ws, wss, http or https)
    #[arg(long)]
    pub parachain_endpoint: String,

    /// First day to export, "YYYY-MM-DD" or "YYYY-MM-DD H"
    #[arg(long)]
    pub start_date: String,

    /// Last hour to export, "YYYY-MM-DD" or "YYYY-MM-DD H";
    /// defaults to the last fully elapsed hour
    #[arg(long)]
    pub end_date: Option<String>,

    /// Root directory for the output tree
    #[arg(long, default_value = "/tmp")]
    pub out: PathBuf,

    /// Built-in chain profile to use
    #[arg(long, default_value = "interlay")]
    pub chain: String,

    /// TOML chain profile, overriding --chain
    #[arg(long)]
    pub chain_config: Option<String>,

    /// Snapshot index base URL, overriding the profile's
    #[arg(long)]
    pub index_url: Option<String>,

    /// Currency metadata CSV (columns: id,name,symbol,decimals,type)
    #[arg(long)]
    pub assets_csv: Option<String>,

    /// Producer tag recorded on every output record
    #[arg(long)]
    pub source: Option<String>,
}

/// Everything chain-specific the pipeline needs: identity of the chain in
/// the index service, address format, native tokens, and per-field output
/// conversions.
#[derive(Debug, Clone, Deserialize)]
pub struct ChainProfile {
    pub chain_name: String,
    pub relay_chain: String,
    pub para_id: u32,
    pub ss58_prefix: u16,
    #[serde(default = "default_index_url")]
    pub index_url: String,
    #[serde(default = "default_section")]
    pub section: String,
    #[serde(default = "default_storage")]
    pub storage: String,
    #[serde(default = "default_track")]
    pub track: String,
    #[serde(default = "default_source")]
    pub source: String,
    #[serde(default)]
    pub tokens: Vec<TokenConfig>,
    #[serde(default)]
    pub conversions: Vec<ConversionRule>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TokenConfig {
    pub symbol: String,
    pub decimals: u32,
}

fn default_index_url() -> String {
    "https://api.polkaholic.io".to_string()
}

fn default_section() -> String {
    "vaultRegistry".to_string()
}

fn default_storage() -> String {
    "vaults".to_string()
}

fn default_track() -> String {
    "vault-collateral".to_string()
}

fn default_source() -> String {
    "parastate-exporter".to_string()
}

impl ChainProfile {
    /// The profiles shipped with the binary. A TOML profile can express
    /// anything these can.
    pub fn builtin(name: &str) -> Option<Self> {
        match name {
            "interlay" => Some(Self::interlay()),
            "kintsugi" => Some(Self::kintsugi()),
            _ => None,
        }
    }

    pub fn interlay() -> Self {
        Self {
            chain_name: "Interlay".to_string(),
            relay_chain: "polkadot".to_string(),
            para_id: 2032,
            ss58_prefix: 2032,
            index_url: default_index_url(),
            section: default_section(),
            storage: default_storage(),
            track: default_track(),
            source: default_source(),
            tokens: vec![token("DOT", 10), token("IBTC", 8), token("INTR", 10)],
            conversions: threshold_conversions(),
        }
    }

    pub fn kintsugi() -> Self {
        Self {
            chain_name: "Kintsugi".to_string(),
            relay_chain: "kusama".to_string(),
            para_id: 2092,
            ss58_prefix: 2092,
            index_url: default_index_url(),
            section: default_section(),
            storage: default_storage(),
            track: default_track(),
            source: default_source(),
            tokens: vec![token("KSM", 12), token("KBTC", 8), token("KINT", 12)],
            conversions: threshold_conversions(),
        }
    }

    /// Load a profile from a TOML file.
    pub fn load(path: &str) -> eyre::Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| eyre::eyre!("Failed to read chain profile '{}': {}", path, e))?;
        let profile: Self = toml::from_str(&content)
            .map_err(|e| eyre::eyre!("Failed to parse chain profile '{}': {}", path, e))?;
        profile.validate()?;
        Ok(profile)
    }

    pub fn validate(&self) -> eyre::Result<()> {
        if self.chain_name.is_empty() {
            return Err(eyre::eyre!("Chain profile needs a chain_name"));
        }
        if self.relay_chain.is_empty() {
            return Err(eyre::eyre!("Chain profile needs a relay_chain"));
        }
        if !self.index_url.starts_with("http://") && !self.index_url.starts_with("https://") {
            return Err(eyre::eyre!(
                "Index URL '{}' must be http or https",
                self.index_url
            ));
        }
        for token in &self.tokens {
            if token.symbol.is_empty() {
                return Err(eyre::eyre!("Profile token without a symbol"));
            }
            if token.decimals > 38 {
                return Err(eyre::eyre!(
                    "Token '{}' has {} decimals, more than a u128 amount can carry",
                    token.symbol,
                    token.decimals
                ));
            }
        }
        for rule in &self.conversions {
            if rule.path.is_empty() {
                return Err(eyre::eyre!("Conversion rule without a path"));
            }
            if let Converter::HexToDecimal { scale } = rule.op {
                if scale > 38 {
                    return Err(eyre::eyre!(
                        "Conversion at '{}' scales by {} digits, more than a u128 amount can carry",
                        rule.path,
                        scale
                    ));
                }
            }
        }
        Ok(())
    }
}

fn token(symbol: &str, decimals: u32) -> TokenConfig {
    TokenConfig {
        symbol: symbol.to_string(),
        decimals,
    }
}

/// The fixed-point fields the codec layer renders as hex; every profile
/// wants them readable.
fn threshold_conversions() -> Vec<ConversionRule> {
    vec![
        ConversionRule {
            path: "secureCollateralThreshold".to_string(),
            op: Converter::HexToDecimal { scale: 18 },
        },
        ConversionRule {
            path: "liquidatedCollateral".to_string(),
            op: Converter::HexToDecimal { scale: 0 },
        },
    ]
}

/// Fully resolved run configuration, frozen before any network call.
#[derive(Debug, Clone)]
pub struct RunConfig {
    pub endpoint: String,
    pub window: Window,
    pub out_root: PathBuf,
    pub profile: ChainProfile,
    pub assets_csv: Option<String>,
}

impl RunConfig {
    pub fn from_args(args: Args, now: DateTime<Utc>) -> eyre::Result<Self> {
        let mut profile = match &args.chain_config {
            Some(path) => ChainProfile::load(path)?,
            None => ChainProfile::builtin(&args.chain)
                .ok_or_else(|| eyre::eyre!("Unknown chain profile '{}'", args.chain))?,
        };
        if let Some(index_url) = args.index_url {
            profile.index_url = index_url;
        }
        if let Some(source) = args.source {
            profile.source = source;
        }
        profile.validate()?;

        let window = window::resolve_window(&args.start_date, args.end_date.as_deref(), now)?;

        Ok(Self {
            endpoint: args.parachain_endpoint,
            window,
            out_root: args.out,
            profile,
            assets_csv: args.assets_csv,
        })
    }
}
