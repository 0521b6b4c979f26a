//! Advertisement replay from a JSON-lines file
//!
//! Stands in for the radio when no Bluetooth adapter is available. Each line is
//! one advertisement:
//!
//! ```text
//! {"address": "AA:BB:CC:DD:EE:FF", "rssi": -55, "data": "abc123def456"}
//! {"address": "AA:BB:CC:DD:EE:FF", "companyId": 76, "data": "ignored", "delayMs": 200}
//! ```
//!
//! Records go through the same manufacturer-data decoding as live advertisements,
//! so records for another company id or with an empty payload are dropped.

use crate::advertisement::sample_from_manufacturer_data;
use crate::error::{DiscoveryError, DiscoveryResult};
use nearlink_core::AdvertisementSample;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// One line of a replay file
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplayRecord {
    pub address: String,
    #[serde(default)]
    pub rssi: Option<i16>,
    /// Defaults to the configured company id
    #[serde(default)]
    pub company_id: Option<u16>,
    /// Manufacturer payload as text
    pub data: String,
    /// Pause before emitting this record
    #[serde(default)]
    pub delay_ms: u64,
}

/// Replays advertisements into the sample channel
pub struct ReplaySource {
    company_id: u16,
}

impl ReplaySource {
    pub fn new(company_id: u16) -> Self {
        Self { company_id }
    }

    /// Decode a record the way the live scanner decodes an advertisement
    pub fn decode(&self, record: &ReplayRecord) -> DiscoveryResult<AdvertisementSample> {
        let mut manufacturer_data = HashMap::new();
        manufacturer_data.insert(
            record.company_id.unwrap_or(self.company_id),
            record.data.as_bytes().to_vec(),
        );
        sample_from_manufacturer_data(&record.address, record.rssi, &manufacturer_data, self.company_id)
    }

    /// Stream every record of `path` into `samples`.
    ///
    /// Blank lines are skipped. A line that is not valid JSON aborts the replay.
    /// Returns the number of samples delivered.
    pub async fn run(
        &self,
        path: impl AsRef<Path>,
        samples: mpsc::Sender<AdvertisementSample>,
    ) -> DiscoveryResult<usize> {
        let path = path.as_ref();
        let file = tokio::fs::File::open(path).await?;
        let mut lines = BufReader::new(file).lines();

        info!("Replaying advertisements from {:?}", path);

        let mut line_no = 0;
        let mut delivered = 0;
        while let Some(line) = lines.next_line().await? {
            line_no += 1;
            if line.trim().is_empty() {
                continue;
            }

            let record: ReplayRecord =
                serde_json::from_str(&line).map_err(|e| DiscoveryError::Replay {
                    line: line_no,
                    message: e.to_string(),
                })?;

            if record.delay_ms > 0 {
                tokio::time::sleep(Duration::from_millis(record.delay_ms)).await;
            }

            match self.decode(&record) {
                Ok(sample) => {
                    if samples.send(sample).await.is_err() {
                        warn!("Sample consumer closed, stopping replay");
                        break;
                    }
                    delivered += 1;
                }
                Err(e) => debug!("Dropping replay line {}: {}", line_no, e),
            }
        }

        info!("Replay finished: {} sample(s) delivered", delivered);
        Ok(delivered)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_replay(lines: &[&str]) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        for line in lines {
            writeln!(file, "{}", line).unwrap();
        }
        file
    }

    #[tokio::test]
    async fn test_replay_delivers_decodable_records() {
        let file = write_replay(&[
            r#"{"address": "AA", "rssi": -55, "data": "abc123def456"}"#,
            "",
            r#"{"address": "AA", "data": "abc123def456"}"#,
            r#"{"address": "BB", "rssi": -40, "companyId": 76, "data": "apple"}"#,
            r#"{"address": "CC", "rssi": -40, "data": "   "}"#,
        ]);

        let (tx, mut rx) = mpsc::channel(16);
        let delivered = ReplaySource::new(0x1234).run(file.path(), tx).await.unwrap();
        assert_eq!(delivered, 2);

        let first = rx.recv().await.unwrap();
        assert_eq!(first.identifier, "abc123def456");
        assert_eq!(first.rssi, Some(-55));

        let second = rx.recv().await.unwrap();
        assert_eq!(second.rssi, None);
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_replay_rejects_invalid_json() {
        let file = write_replay(&[
            r#"{"address": "AA", "rssi": -55, "data": "abc123"}"#,
            "not json",
        ]);

        let (tx, _rx) = mpsc::channel(16);
        let result = ReplaySource::new(0x1234).run(file.path(), tx).await;
        assert!(matches!(result, Err(DiscoveryError::Replay { line: 2, .. })));
    }

    #[tokio::test]
    async fn test_replay_missing_file() {
        let (tx, _rx) = mpsc::channel(1);
        let result = ReplaySource::new(0x1234)
            .run("/nonexistent/replay.jsonl", tx)
            .await;
        assert!(matches!(result, Err(DiscoveryError::Io(_))));
    }
}
