use chrono::{Datelike, NaiveDate};
use std::fs;
use std::path::{Path, PathBuf};

/// Placement of one hour file inside the output tree.
#[derive(Debug, Clone, Copy)]
pub struct HourKey<'a> {
    pub relay_chain: &'a str,
    pub para_id: u32,
    pub date: NaiveDate,
    pub hour: u32,
}

/// Writes hour snapshots as date-partitioned NDJSON files:
/// `{root}/{relay}/{para_id}/{yyyy}/{mm}/{dd}/{relay}_snapshots_{para_id}_{yyyymmdd}_{hh}.json`.
pub struct SnapshotWriter {
    out_root: PathBuf,
}

impl SnapshotWriter {
    pub fn new(out_root: impl Into<PathBuf>) -> Self {
        Self {
            out_root: out_root.into(),
        }
    }

    pub fn hour_path(&self, key: &HourKey) -> PathBuf {
        let file = format!(
            "{}_snapshots_{}_{}_{:02}.json",
            key.relay_chain,
            key.para_id,
            key.date.format("%Y%m%d"),
            key.hour
        );
        self.out_root
            .join(key.relay_chain)
            .join(key.para_id.to_string())
            .join(format!("{:04}", key.date.year()))
            .join(format!("{:02}", key.date.month()))
            .join(format!("{:02}", key.date.day()))
            .join(file)
    }

    /// Write (or overwrite) one hour file. An hour with no records still
    /// produces a file, so a present-but-empty hour is distinguishable
    /// from an hour never exported.
    pub fn write_hour(&self, key: &HourKey, lines: &[String]) -> eyre::Result<PathBuf> {
        let path = self.hour_path(key);
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir)
                .map_err(|e| eyre::eyre!("Failed to create '{}': {}", dir.display(), e))?;
        }
        write_lines(&path, lines)?;
        Ok(path)
    }
}

fn write_lines(path: &Path, lines: &[String]) -> eyre::Result<()> {
    fs::write(path, lines.join("\n"))
        .map_err(|e| eyre::eyre!("Failed to write '{}': {}", path.display(), e))
}
