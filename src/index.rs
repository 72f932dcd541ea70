use serde::Deserialize;

/// One hour's snapshot metadata from the block index service. Fields for
/// hours the indexer has not finished yet come back null or missing, so
/// everything beyond the hour number and index timestamp is optional.
#[derive(Debug, Clone, Deserialize)]
pub struct SnapshotHour {
    #[serde(rename = "snapshotDT", default)]
    pub snapshot_dt: Option<String>,
    pub hr: u32,
    #[serde(rename = "indexTS")]
    pub index_ts: i64,
    #[serde(rename = "startBN", default)]
    pub start_bn: Option<u64>,
    #[serde(rename = "endBN", default)]
    pub end_bn: Option<u64>,
    #[serde(rename = "startTS", default)]
    pub start_ts: Option<i64>,
    #[serde(rename = "endTS", default)]
    pub end_ts: Option<i64>,
    #[serde(default)]
    pub start_blockhash: Option<String>,
    #[serde(default)]
    pub end_blockhash: Option<String>,
}

impl SnapshotHour {
    /// Hash of the last block of the hour. `None` (or empty, which some
    /// index versions emit) means the hour is not fully indexed yet.
    pub fn end_hash(&self) -> Option<&str> {
        self.end_blockhash.as_deref().filter(|hash| !hash.is_empty())
    }
}

/// Client for the snapshot index API.
pub struct SnapshotIndexClient {
    http: reqwest::Client,
    base_url: String,
}

impl SnapshotIndexClient {
    pub fn new(base_url: &str) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    /// Fetch the hour table for one chain and day. `log_dt` is the day as
    /// `YYYYMMDD`; the hour bounds are inclusive.
    pub async fn fetch_day(
        &self,
        chain_id: u32,
        log_dt: &str,
        start_hr: u32,
        final_hr: u32,
    ) -> eyre::Result<Vec<SnapshotHour>> {
        let url = format!(
            "{}/snapshot/{}?logDT={}&startHR={}&finalHR={}",
            self.base_url, chain_id, log_dt, start_hr, final_hr
        );
        tracing::debug!(url = %url, "Requesting snapshot index");

        let hours: Vec<SnapshotHour> = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|e| eyre::eyre!("Snapshot index request for {} failed: {}", log_dt, e))?
            .error_for_status()
            .map_err(|e| eyre::eyre!("Snapshot index request for {} failed: {}", log_dt, e))?
            .json()
            .await
            .map_err(|e| {
                eyre::eyre!("Snapshot index returned malformed JSON for {}: {}", log_dt, e)
            })?;

        Ok(hours)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_complete_hour() {
        let json = r#"{
            "snapshotDT": "2024-01-01",
            "hr": 14,
            "indexTS": 1704114000,
            "startBN": 3968000,
            "endBN": 3968299,
            "startTS": 1704114000,
            "endTS": 1704117599,
            "start_blockhash": "0xaaaa",
            "end_blockhash": "0xbbbb"
        }"#;
        let hour: SnapshotHour = serde_json::from_str(json).unwrap();
        assert_eq!(hour.hr, 14);
        assert_eq!(hour.index_ts, 1704114000);
        assert_eq!(hour.end_bn, Some(3968299));
        assert_eq!(hour.end_hash(), Some("0xbbbb"));
    }

    #[test]
    fn test_parse_unfinished_hour() {
        let json = r#"{ "hr": 15, "indexTS": 1704117600 }"#;
        let hour: SnapshotHour = serde_json::from_str(json).unwrap();
        assert_eq!(hour.hr, 15);
        assert_eq!(hour.start_bn, None);
        assert_eq!(hour.end_hash(), None);
    }

    #[test]
    fn test_parse_nulled_hour() {
        let json = r#"{
            "snapshotDT": null,
            "hr": 9,
            "indexTS": 1704096000,
            "startBN": null,
            "endBN": null,
            "startTS": null,
            "endTS": null,
            "start_blockhash": null,
            "end_blockhash": null
        }"#;
        let hour: SnapshotHour = serde_json::from_str(json).unwrap();
        assert_eq!(hour.end_hash(), None);
    }

    #[test]
    fn test_empty_blockhash_counts_as_missing() {
        let json = r#"{ "hr": 3, "indexTS": 1704074400, "end_blockhash": "" }"#;
        let hour: SnapshotHour = serde_json::from_str(json).unwrap();
        assert_eq!(hour.end_hash(), None);
    }

    #[test]
    fn test_base_url_trailing_slash() {
        let client = SnapshotIndexClient::new("https://index.example.com/");
        assert_eq!(client.base_url, "https://index.example.com");
    }

    #[tokio::test]
    #[ignore]
    async fn test_fetch_day_live() {
        let client = SnapshotIndexClient::new("https://api.polkaholic.io");

        let hours = client
            .fetch_day(2032, "20240101", 0, 23)
            .await
            .expect("Failed to fetch snapshot index");

        println!("{:#?}", hours);

        assert!(!hours.is_empty());
    }
}
