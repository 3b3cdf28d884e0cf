//! Result snapshot and the last-result cache.
//!
//! A `TestReport` is assembled once, at the instant a run terminates,
//! and never mutated afterwards. The store trait is the persistence
//! collaborator boundary; a failed load must never block a new run.

use std::error::Error;
use std::fs;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use log::warn;
use serde::{Deserialize, Serialize};

use crate::server::requests::ip::IpInfoReply;
use crate::stats::SummaryStats;

/// Best-effort network identity. Missing fields degrade to "Unknown",
/// never to a failed run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkIdentity {
    pub ip: String,
    pub city: String,
    pub region: String,
    pub country: String,
    pub isp: String,
}

impl NetworkIdentity {
    pub fn from_reply(reply: IpInfoReply) -> Self {
        let or_unknown =
            |field: Option<String>| field.unwrap_or_else(|| "Unknown".into());

        Self {
            ip: or_unknown(reply.ip),
            city: or_unknown(reply.city),
            region: or_unknown(reply.region),
            country: or_unknown(reply.country),
            isp: or_unknown(reply.isp),
        }
    }
}

impl Default for NetworkIdentity {
    fn default() -> Self {
        Self::from_reply(IpInfoReply::default())
    }
}

/// Immutable snapshot of one completed test run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestReport {
    /// When the run completed.
    pub timestamp: DateTime<Utc>,
    /// Settled download average in Mbps.
    pub download_mbps: f64,
    /// Settled upload average in Mbps.
    pub upload_mbps: f64,
    /// Raw mean of the ping samples in milliseconds.
    pub ping_ms: f64,
    /// Spread (max - min) of the ping samples in milliseconds.
    pub jitter_ms: f64,
    pub download_stats: SummaryStats,
    pub upload_stats: SummaryStats,
    pub identity: NetworkIdentity,
}

/// Persistence collaborator for the last-result cache.
pub trait ResultStore: Send + Sync {
    fn save(
        &self,
        report: &TestReport,
    ) -> Result<(), Box<dyn Error + Send + Sync>>;

    /// Best effort; corrupt or missing caches read as empty.
    fn load_last(&self) -> Option<TestReport>;
}

/// JSON file store for the most recent result.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }
}

impl ResultStore for JsonFileStore {
    fn save(
        &self,
        report: &TestReport,
    ) -> Result<(), Box<dyn Error + Send + Sync>> {
        let json = serde_json::to_string_pretty(report)?;
        fs::write(&self.path, json)?;
        Ok(())
    }

    fn load_last(&self) -> Option<TestReport> {
        let raw = fs::read_to_string(&self.path).ok()?;

        match serde_json::from_str(&raw) {
            Ok(report) => Some(report),
            Err(e) => {
                warn!(
                    "ignoring unreadable result cache {}: {}",
                    self.path.display(),
                    e
                );
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stats(average: f64) -> SummaryStats {
        SummaryStats {
            average,
            median: average,
            min: average,
            max: average,
            valid_count: 1,
            filtered_count: 1,
        }
    }

    fn report() -> TestReport {
        TestReport {
            timestamp: Utc::now(),
            download_mbps: 93.4,
            upload_mbps: 41.2,
            ping_ms: 18.0,
            jitter_ms: 4.0,
            download_stats: stats(93.4),
            upload_stats: stats(41.2),
            identity: NetworkIdentity::default(),
        }
    }

    #[test]
    fn missing_identity_fields_become_unknown() {
        let reply = IpInfoReply {
            ip: Some("203.0.113.7".into()),
            city: None,
            region: None,
            country: Some("MM".into()),
            isp: None,
        };

        let identity = NetworkIdentity::from_reply(reply);
        assert_eq!(identity.ip, "203.0.113.7");
        assert_eq!(identity.city, "Unknown");
        assert_eq!(identity.region, "Unknown");
        assert_eq!(identity.country, "MM");
        assert_eq!(identity.isp, "Unknown");
    }

    #[test]
    fn file_store_round_trips_a_report() {
        let path = std::env::temp_dir().join(format!(
            "speedprobe-cache-{}.json",
            std::process::id()
        ));
        let store = JsonFileStore::new(path.clone());

        store.save(&report()).unwrap();
        let loaded = store.load_last().unwrap();
        assert!((loaded.download_mbps - 93.4).abs() < 1e-9);
        assert_eq!(loaded.identity.city, "Unknown");

        let _ = fs::remove_file(path);
    }

    #[test]
    fn missing_cache_reads_as_empty() {
        let store =
            JsonFileStore::new(PathBuf::from("/nonexistent/speedprobe.json"));
        assert!(store.load_last().is_none());
    }

    #[test]
    fn corrupt_cache_reads_as_empty() {
        let path = std::env::temp_dir().join(format!(
            "speedprobe-corrupt-{}.json",
            std::process::id()
        ));
        fs::write(&path, "not json{").unwrap();

        let store = JsonFileStore::new(path.clone());
        assert!(store.load_last().is_none());

        let _ = fs::remove_file(path);
    }
}
