use chrono::NaiveDate;

use crate::chain::currency::{CurrencyId, CurrencyRegistry};
use crate::chain::decode;
use crate::chain::keys;
use crate::chain::rpc::ParachainRpc;
use crate::config::RunConfig;
use crate::index::{SnapshotHour, SnapshotIndexClient};
use crate::window::Window;

use super::join::{self, HourContext};
use super::writer::{HourKey, SnapshotWriter};

/// Counters for one export run.
#[derive(Debug, Default)]
pub struct RunSummary {
    pub days: u32,
    pub hours_written: u32,
    pub hours_skipped: u32,
    pub records: u64,
}

/// What to do with one index day's hours.
#[derive(Debug)]
pub struct DayPlan<'a> {
    pub process: Vec<&'a SnapshotHour>,
    pub skipped: u32,
    pub stopped: bool,
}

/// Classify a day's hours against the run window. Hours outside the
/// window are skipped. The first in-window hour without an end-of-hour
/// block hash ends the day: the index writes hours in order, so nothing
/// after it is finished either.
pub fn plan_day<'a>(hours: &'a [SnapshotHour], window: &Window) -> DayPlan<'a> {
    let mut plan = DayPlan {
        process: Vec::new(),
        skipped: 0,
        stopped: false,
    };
    for hour in hours {
        if !window.contains(hour.index_ts) {
            tracing::debug!(
                hr = hour.hr,
                index_ts = hour.index_ts,
                "Hour outside run window, skipping"
            );
            plan.skipped += 1;
            continue;
        }
        if hour.end_hash().is_none() {
            plan.stopped = true;
            break;
        }
        plan.process.push(hour);
    }
    plan
}

/// Orchestrates one export run: index metadata per day, pinned storage
/// reads per hour, join, write.
pub struct SnapshotPipeline {
    config: RunConfig,
    index: SnapshotIndexClient,
    rpc: ParachainRpc,
    writer: SnapshotWriter,
    registry: CurrencyRegistry,
}

impl SnapshotPipeline {
    /// Connect to the node and assemble the currency registry: profile
    /// natives first, then the on-chain asset registry, then the CSV, so
    /// later sources win.
    pub async fn init(config: RunConfig) -> eyre::Result<Self> {
        let rpc = ParachainRpc::connect(&config.endpoint).await?;
        let index = SnapshotIndexClient::new(&config.profile.index_url);
        let writer = SnapshotWriter::new(config.out_root.clone());

        let mut registry = CurrencyRegistry::new();
        for token in &config.profile.tokens {
            if !registry.insert_native(&token.symbol, token.decimals) {
                tracing::warn!(
                    symbol = %token.symbol,
                    "Profile token is not a native of this chain family, ignoring"
                );
            }
        }

        let metadata_prefix = keys::storage_prefix_hex("AssetRegistry", "Metadata");
        match rpc.storage_pairs(&metadata_prefix, None).await {
            Ok(pairs) => {
                let assets = decode::asset_metadata(&pairs);
                let count = assets.len();
                for (asset_id, meta) in assets {
                    registry.insert(CurrencyId::ForeignAsset(asset_id), meta);
                }
                tracing::info!(count, "Loaded foreign asset metadata from chain");
            }
            Err(e) => {
                tracing::warn!(
                    error = %e,
                    "Could not sweep the on-chain asset registry, continuing without"
                );
            }
        }

        if let Some(path) = &config.assets_csv {
            registry.load_csv(path)?;
        }
        tracing::info!(currencies = registry.len(), "Currency registry ready");

        Ok(Self {
            config,
            index,
            rpc,
            writer,
            registry,
        })
    }

    /// Walk the run window day by day, oldest first, writing one file per
    /// processed hour.
    pub async fn run(&self) -> eyre::Result<RunSummary> {
        let window = self.config.window;
        let mut summary = RunSummary::default();

        if window.is_empty() {
            tracing::warn!(
                start = %window.start,
                end = %window.end,
                "Requested window is empty, nothing to export"
            );
            return Ok(summary);
        }

        for day in window.days() {
            summary.days += 1;
            let log_dt = day.format("%Y%m%d").to_string();
            let hours = self
                .index
                .fetch_day(self.config.profile.para_id, &log_dt, 0, 23)
                .await?;
            tracing::info!(date = %day, hours = hours.len(), "Fetched snapshot index for day");

            let plan = plan_day(&hours, &window);
            summary.hours_skipped += plan.skipped;
            for hour in &plan.process {
                summary.records += self.process_hour(day, hour).await?;
                summary.hours_written += 1;
            }
            if plan.stopped {
                tracing::info!(
                    date = %day,
                    "Reached an hour the index has not finished, leaving the rest of the day"
                );
            }
        }

        Ok(summary)
    }

    async fn process_hour(&self, day: NaiveDate, hour: &SnapshotHour) -> eyre::Result<u64> {
        let end_hash = hour
            .end_hash()
            .ok_or_else(|| eyre::eyre!("Hour {} has no end block hash", hour.hr))?;
        tracing::info!(date = %day, hr = hour.hr, block = %end_hash, "Processing snapshot hour");

        let at = self.rpc.at(end_hash);
        match at.timestamp().await? {
            Some(block_time) => {
                tracing::info!(block_time = %block_time.to_rfc3339(), "Pinned block time");
            }
            None => {
                tracing::warn!(block = %end_hash, "Pinned block has no timestamp entry");
            }
        }

        let vaults = at.vaults(self.config.profile.ss58_prefix).await?;
        let stakes = at.collateral_stakes().await?;

        let profile = &self.config.profile;
        let ctx = HourContext {
            chain_name: &profile.chain_name,
            block_hash: end_hash,
            block_number: hour.end_bn.unwrap_or(0),
            ts: hour.end_ts.unwrap_or(hour.index_ts),
            section: &profile.section,
            storage: &profile.storage,
            track: &profile.track,
            source: &profile.source,
            ss58_prefix: profile.ss58_prefix,
        };
        let lines = join::join_hour(&vaults, &stakes, &self.registry, &profile.conversions, &ctx)?;

        let path = self.writer.write_hour(
            &HourKey {
                relay_chain: &profile.relay_chain,
                para_id: profile.para_id,
                date: day,
                hour: hour.hr,
            },
            &lines,
        )?;
        tracing::info!(
            date = %day,
            hr = hour.hr,
            vaults = vaults.len(),
            stakes = stakes.len(),
            records = lines.len(),
            path = %path.display(),
            "Snapshot hour written"
        );
        Ok(lines.len() as u64)
    }
}
