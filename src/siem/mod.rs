//! Security-event aggregation: time-windowed alert counts per session,
//! bucketed by severity and STRIDE category. Absence of alert data never
//! blocks a decision; it only removes one risk contribution.

mod store;

pub use store::{AlertStore, MemoryAlertStore, SqliteAlertStore};

use crate::config::SiemConfig;
use crate::validator::ReasonCode;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Low,
    Medium,
    High,
}

impl Severity {
    /// Normalize a feed token; `critical` folds to high, unknown to medium.
    pub fn parse_token(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "low" => Severity::Low,
            "high" | "critical" => Severity::High,
            _ => Severity::Medium,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
        }
    }
}

/// STRIDE threat taxonomy used to categorize alerts and anomaly reasons.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Stride {
    Spoofing,
    Tampering,
    Repudiation,
    InformationDisclosure,
    DoS,
    EoP,
}

impl Stride {
    /// Normalize a feed token; unknown categories fold to
    /// InformationDisclosure, the least specific bucket.
    pub fn parse_token(s: &str) -> Self {
        let t = s.trim().replace(['_', '-', ' '], "").to_lowercase();
        match t.as_str() {
            "spoofing" => Stride::Spoofing,
            "tampering" => Stride::Tampering,
            "repudiation" => Stride::Repudiation,
            "dos" | "denialofservice" => Stride::DoS,
            "eop" | "elevationofprivilege" => Stride::EoP,
            _ => Stride::InformationDisclosure,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Stride::Spoofing => "Spoofing",
            Stride::Tampering => "Tampering",
            Stride::Repudiation => "Repudiation",
            Stride::InformationDisclosure => "InformationDisclosure",
            Stride::DoS => "DoS",
            Stride::EoP => "EoP",
        }
    }
}

impl fmt::Display for Stride {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single alert as stored in the alert feed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertRecord {
    pub session_id: String,
    pub severity: Severity,
    pub stride: Stride,
    pub source: Option<String>,
    pub ts: DateTime<Utc>,
}

impl AlertRecord {
    /// Build a record from raw feed fields. Severity and STRIDE tokens are
    /// normalized; a recognizable reason token (e.g. `GPS_MISMATCH`) wins
    /// over the supplied category so feed and scorer agree.
    pub fn normalized(
        session_id: impl Into<String>,
        severity: &str,
        stride_or_reason: &str,
        source: Option<String>,
    ) -> Self {
        let stride = match ReasonCode::parse_token(stride_or_reason) {
            Some(reason) => crate::trust::category_for(reason),
            None => Stride::parse_token(stride_or_reason),
        };
        Self {
            session_id: session_id.into(),
            severity: Severity::parse_token(severity),
            stride,
            source,
            ts: Utc::now(),
        }
    }
}

/// Read-only snapshot of alert counts for one session and window.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AlertWindow {
    pub low: u32,
    pub medium: u32,
    pub high: u32,
    pub by_category: BTreeMap<Stride, u32>,
}

impl AlertWindow {
    /// Explicit all-zero default used at every failure-absorption point.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn total(&self) -> u32 {
        self.low + self.medium + self.high
    }
}

/// Aggregates prior alerts for a session inside a trailing window.
pub struct AlertAggregator {
    config: SiemConfig,
    store: Arc<dyn AlertStore>,
}

impl AlertAggregator {
    pub fn new(config: SiemConfig, store: Arc<dyn AlertStore>) -> Self {
        Self { config, store }
    }

    pub fn window_minutes(&self) -> i64 {
        self.config.window_minutes
    }

    /// Record one alert into the feed. Ingest failures are surfaced to the
    /// caller; they never affect the scoring path.
    pub fn ingest(&self, record: &AlertRecord) -> crate::error::Result<()> {
        self.store.insert(record)
    }

    /// Count alerts for `session_id` in `[now - window, now]`. Per-severity
    /// counts are saturated so alert storms cannot inflate risk without
    /// bound. An unreachable store yields an empty window.
    pub fn aggregate(&self, session_id: &str, window_minutes: i64) -> AlertWindow {
        let since = Utc::now() - Duration::minutes(window_minutes.max(0));
        self.aggregate_since(session_id, since)
    }

    fn aggregate_since(&self, session_id: &str, since: DateTime<Utc>) -> AlertWindow {
        let records = match self.store.query_since(session_id, since) {
            Ok(records) => records,
            Err(e) => {
                warn!(session_id, error = %e, "alert store unreachable, using empty window");
                return AlertWindow::empty();
            }
        };

        let mut window = AlertWindow::empty();
        for r in &records {
            match r.severity {
                Severity::Low => window.low += 1,
                Severity::Medium => window.medium += 1,
                Severity::High => window.high += 1,
            }
            *window.by_category.entry(r.stride).or_insert(0) += 1;
        }
        let cap = self.config.saturation;
        window.low = window.low.min(cap);
        window.medium = window.medium.min(cap);
        window.high = window.high.min(cap);
        window
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn aggregator_with(records: Vec<AlertRecord>) -> AlertAggregator {
        let store = Arc::new(MemoryAlertStore::default());
        for r in &records {
            store.insert(r).unwrap();
        }
        AlertAggregator::new(SiemConfig::default(), store)
    }

    fn alert(session: &str, severity: Severity, stride: Stride, mins_ago: i64) -> AlertRecord {
        AlertRecord {
            session_id: session.into(),
            severity,
            stride,
            source: None,
            ts: Utc::now() - Duration::minutes(mins_ago),
        }
    }

    #[test]
    fn counts_bucket_by_severity_and_category() {
        let agg = aggregator_with(vec![
            alert("s1", Severity::High, Stride::DoS, 1),
            alert("s1", Severity::High, Stride::DoS, 2),
            alert("s1", Severity::Medium, Stride::Spoofing, 3),
            alert("s1", Severity::Low, Stride::Tampering, 4),
            alert("other", Severity::High, Stride::EoP, 1),
        ]);
        let w = agg.aggregate("s1", 15);
        assert_eq!((w.low, w.medium, w.high), (1, 1, 2));
        assert_eq!(w.by_category[&Stride::DoS], 2);
        assert_eq!(w.total(), 4);
    }

    #[test]
    fn old_alerts_fall_outside_window() {
        let agg = aggregator_with(vec![
            alert("s1", Severity::High, Stride::DoS, 60),
            alert("s1", Severity::Medium, Stride::DoS, 5),
        ]);
        let w = agg.aggregate("s1", 15);
        assert_eq!(w.high, 0);
        assert_eq!(w.medium, 1);
    }

    #[test]
    fn severity_counts_saturate() {
        let records = (0..50)
            .map(|_| alert("s1", Severity::High, Stride::DoS, 1))
            .collect();
        let agg = aggregator_with(records);
        let w = agg.aggregate("s1", 15);
        assert_eq!(w.high, SiemConfig::default().saturation);
    }

    #[test]
    fn unreachable_store_yields_empty_window() {
        struct FailingStore;
        impl AlertStore for FailingStore {
            fn insert(&self, _: &AlertRecord) -> crate::error::Result<()> {
                Err(crate::error::Error::LookupUnavailable("down".into()))
            }
            fn query_since(
                &self,
                _: &str,
                _: DateTime<Utc>,
            ) -> crate::error::Result<Vec<AlertRecord>> {
                Err(crate::error::Error::LookupUnavailable("down".into()))
            }
        }
        let agg = AlertAggregator::new(SiemConfig::default(), Arc::new(FailingStore));
        assert_eq!(agg.aggregate("s1", 15), AlertWindow::empty());
    }

    #[test]
    fn tokens_normalize() {
        assert_eq!(Severity::parse_token("CRITICAL"), Severity::High);
        assert_eq!(Severity::parse_token("weird"), Severity::Medium);
        assert_eq!(Stride::parse_token("denial_of_service"), Stride::DoS);
        assert_eq!(
            Stride::parse_token("unknown"),
            Stride::InformationDisclosure
        );
    }

    #[test]
    fn ingested_reason_token_overrides_category() {
        let agg = aggregator_with(vec![]);
        let r = AlertRecord::normalized("s1", "high", "GPS_MISMATCH", Some("feed".into()));
        assert_eq!(r.stride, Stride::Spoofing);
        agg.ingest(&r).unwrap();
        let w = agg.aggregate("s1", 15);
        assert_eq!(w.high, 1);
        assert_eq!(w.by_category[&Stride::Spoofing], 1);
    }
}
