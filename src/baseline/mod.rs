//! Rule-based baseline scorer: a deliberately simple second opinion that
//! reads only raw signals. Kept fully independent of the validator, alert
//! feed, and trust engine so the two pipelines can be compared side by side.

use crate::config::BaselineConfig;
use crate::enrichment::EnrichmentLookup;
use crate::gateway::{Decision, Enforcement};
use crate::signals::SignalBundle;
use crate::validator::haversine_km;
use chrono::{DateTime, Datelike, Local, Timelike};
use rusqlite::{params, Connection};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::Path;
use std::sync::{Arc, Mutex};
use tracing::warn;

/// Documentation and reserved ranges treated as hostile origins.
const SUSPICIOUS_IP_PREFIXES: [&str; 5] =
    ["203.0.113.", "198.51.100.", "0.", "127.", "169.254."];

/// SHA-256 over `device_id:ip`, hex-encoded. Binds the device identity to
/// the network origin it was first trusted from.
pub fn device_fingerprint(device_id: &str, ip: &str) -> String {
    let digest = Sha256::digest(format!("{device_id}:{ip}").as_bytes());
    digest.iter().map(|b| format!("{b:02x}")).collect()
}

/// Persistence for devices previously allowed through.
pub trait TrustedDeviceStore: Send + Sync {
    fn is_trusted(&self, fingerprint: &str) -> crate::error::Result<bool>;
    fn upsert(&self, fingerprint: &str, device_id: &str) -> crate::error::Result<()>;
}

pub struct SqliteTrustedDevices {
    conn: Mutex<Connection>,
}

impl SqliteTrustedDevices {
    pub fn open(path: &Path) -> crate::error::Result<Self> {
        let conn = Connection::open(path)?;
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS trusted_devices (
                fingerprint TEXT PRIMARY KEY,
                device_id TEXT NOT NULL,
                last_seen INTEGER NOT NULL
            );
            "#,
        )?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }
}

impl TrustedDeviceStore for SqliteTrustedDevices {
    fn is_trusted(&self, fingerprint: &str) -> crate::error::Result<bool> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare("SELECT 1 FROM trusted_devices WHERE fingerprint = ?1")?;
        Ok(stmt.exists(params![fingerprint])?)
    }

    fn upsert(&self, fingerprint: &str, device_id: &str) -> crate::error::Result<()> {
        self.conn.lock().unwrap().execute(
            "INSERT INTO trusted_devices (fingerprint, device_id, last_seen) \
             VALUES (?1, ?2, ?3) \
             ON CONFLICT(fingerprint) DO UPDATE SET last_seen = excluded.last_seen",
            params![fingerprint, device_id, chrono::Utc::now().timestamp_millis()],
        )?;
        Ok(())
    }
}

/// In-memory device table for tests.
#[derive(Default)]
pub struct MemoryTrustedDevices {
    fingerprints: Mutex<std::collections::HashSet<String>>,
}

impl TrustedDeviceStore for MemoryTrustedDevices {
    fn is_trusted(&self, fingerprint: &str) -> crate::error::Result<bool> {
        Ok(self.fingerprints.lock().unwrap().contains(fingerprint))
    }

    fn upsert(&self, fingerprint: &str, _device_id: &str) -> crate::error::Result<()> {
        self.fingerprints
            .lock()
            .unwrap()
            .insert(fingerprint.to_string());
        Ok(())
    }
}

/// Baseline outcome with the rule factors that fired.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BaselineDecision {
    pub decision: Decision,
    pub enforcement: Enforcement,
    pub risk_score: f64,
    pub factors: Vec<String>,
}

pub struct BaselineScorer {
    config: BaselineConfig,
    devices: Arc<dyn TrustedDeviceStore>,
    lookup: Arc<dyn EnrichmentLookup>,
}

impl BaselineScorer {
    pub fn new(
        config: BaselineConfig,
        devices: Arc<dyn TrustedDeviceStore>,
        lookup: Arc<dyn EnrichmentLookup>,
    ) -> Self {
        Self {
            config,
            devices,
            lookup,
        }
    }

    pub fn decide(&self, bundle: &SignalBundle) -> BaselineDecision {
        self.decide_at(bundle, Local::now())
    }

    /// Rule evaluation at an explicit wall-clock instant. Never fails: a
    /// device-store error counts the device as unknown.
    pub fn decide_at(&self, bundle: &SignalBundle, now: DateTime<Local>) -> BaselineDecision {
        let c = &self.config;
        let mut risk = 0.0;
        let mut factors = Vec::new();

        let ip = bundle.ip_geo.as_ref().map(|s| s.ip.as_str());
        match ip {
            Some(ip) if !Self::ip_suspicious(ip) => {}
            _ => {
                risk += c.suspicious_ip_weight;
                factors.push("SUSPICIOUS_IP".to_string());
            }
        }

        let fingerprint = match (&bundle.device_posture, ip) {
            (Some(d), Some(ip)) => Some(device_fingerprint(&d.device_id, ip)),
            _ => None,
        };
        let trusted = match &fingerprint {
            None => false,
            Some(fp) => self.devices.is_trusted(fp).unwrap_or_else(|e| {
                warn!(session_id = %bundle.session_id, error = %e, "device store unreachable");
                false
            }),
        };
        if !trusted {
            risk += c.unknown_device_weight;
            factors.push("UNKNOWN_DEVICE".to_string());
            // off-hours access only matters for devices we have never seen
            if self.outside_business_hours(now) {
                risk += c.outside_hours_weight;
                factors.push("OUTSIDE_HOURS".to_string());
            }
        }

        let label = bundle.label_upper();
        for (category, matched) in [
            ("DOS_ATTACK", label.contains("DOS") || label.contains("DDOS")),
            (
                "WEB_ATTACK",
                label.contains("WEB ATTACK") || label.contains("SQL"),
            ),
            (
                "MALWARE",
                label.contains("BOT") || label.contains("INFILTRATION"),
            ),
            ("TLS_VULNERABILITY", label.contains("HEARTBLEED")),
        ] {
            if matched {
                risk += c.threat_weight;
                factors.push(category.to_string());
            }
        }

        if !bundle.is_benign() {
            if let (Some(g), Some(wifi)) = (&bundle.gps, &bundle.wifi_bssid) {
                if let Some(ap) = self.lookup.ap_for_bssid(&wifi.bssid) {
                    if haversine_km(g.lat, g.lon, ap.lat, ap.lon) > c.distance_threshold_km {
                        risk += c.location_anomaly_weight;
                        factors.push("LOCATION_ANOMALY".to_string());
                    }
                }
            }
        }

        let risk_score = risk.clamp(0.0, 1.0);
        let decision = if risk_score >= c.deny_threshold {
            Decision::Deny
        } else if risk_score >= c.stepup_threshold {
            Decision::StepUp
        } else {
            Decision::Allow
        };

        // only a clean allow earns a trusted-device row
        if decision == Decision::Allow {
            if let (Some(fp), Some(d)) = (&fingerprint, &bundle.device_posture) {
                if let Err(e) = self.devices.upsert(fp, &d.device_id) {
                    warn!(session_id = %bundle.session_id, error = %e, "trusted-device upsert failed");
                }
            }
        }

        BaselineDecision {
            decision,
            enforcement: decision.enforcement(),
            risk_score,
            factors,
        }
    }

    fn ip_suspicious(ip: &str) -> bool {
        SUSPICIOUS_IP_PREFIXES.iter().any(|p| ip.starts_with(p))
    }

    fn outside_business_hours(&self, now: DateTime<Local>) -> bool {
        let weekend = now.weekday().number_from_monday() > 5;
        let hour = now.hour();
        weekend || hour < self.config.business_hours_start || hour >= self.config.business_hours_end
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::enrichment::{EnrichmentTables, WifiAp};
    use crate::signals::*;
    use chrono::TimeZone;

    fn tables() -> Arc<EnrichmentTables> {
        Arc::new(EnrichmentTables::with_entries(
            vec![],
            vec![(
                "aa:bb:cc:dd:ee:ff",
                WifiAp {
                    ssid: Some("office".into()),
                    lat: 52.52,
                    lon: 13.40,
                },
            )],
            vec![],
            vec![],
        ))
    }

    fn scorer(devices: Arc<MemoryTrustedDevices>) -> BaselineScorer {
        BaselineScorer::new(BaselineConfig::default(), devices, tables())
    }

    fn weekday_morning() -> DateTime<Local> {
        // Tuesday 10:00
        Local.with_ymd_and_hms(2026, 8, 25, 10, 0, 0).unwrap()
    }

    fn sunday_night() -> DateTime<Local> {
        Local.with_ymd_and_hms(2026, 8, 23, 3, 0, 0).unwrap()
    }

    fn bundle(ip: &str, device: &str) -> SignalBundle {
        let mut b = SignalBundle::new("sess-base");
        b.ip_geo = Some(IpGeoSignal { ip: ip.into() });
        b.device_posture = Some(DevicePostureSignal {
            device_id: device.into(),
        });
        b
    }

    #[test]
    fn known_device_clean_ip_allows() {
        let devices = Arc::new(MemoryTrustedDevices::default());
        devices
            .upsert(&device_fingerprint("dev-1", "8.8.8.8"), "dev-1")
            .unwrap();
        let d = scorer(devices).decide_at(&bundle("8.8.8.8", "dev-1"), weekday_morning());
        assert_eq!(d.decision, Decision::Allow);
        assert!(d.factors.is_empty());
        assert_eq!(d.risk_score, 0.0);
    }

    #[test]
    fn suspicious_ip_alone_sits_on_stepup_boundary() {
        let devices = Arc::new(MemoryTrustedDevices::default());
        devices
            .upsert(&device_fingerprint("dev-1", "203.0.113.9"), "dev-1")
            .unwrap();
        let d = scorer(devices).decide_at(&bundle("203.0.113.9", "dev-1"), weekday_morning());
        assert!((d.risk_score - 0.25).abs() < 1e-9);
        assert_eq!(d.decision, Decision::StepUp);
        assert_eq!(d.enforcement, Enforcement::MfaRequired);
    }

    #[test]
    fn unknown_device_off_hours_accumulates_but_allows() {
        let devices = Arc::new(MemoryTrustedDevices::default());
        let d = scorer(devices).decide_at(&bundle("8.8.8.8", "dev-9"), sunday_night());
        assert!((d.risk_score - 0.23).abs() < 1e-9);
        assert_eq!(d.decision, Decision::Allow);
        assert!(d.factors.contains(&"UNKNOWN_DEVICE".to_string()));
        assert!(d.factors.contains(&"OUTSIDE_HOURS".to_string()));
    }

    #[test]
    fn off_hours_ignored_for_trusted_devices() {
        let devices = Arc::new(MemoryTrustedDevices::default());
        devices
            .upsert(&device_fingerprint("dev-1", "8.8.8.8"), "dev-1")
            .unwrap();
        let d = scorer(devices).decide_at(&bundle("8.8.8.8", "dev-1"), sunday_night());
        assert!(!d.factors.contains(&"OUTSIDE_HOURS".to_string()));
    }

    #[test]
    fn stacked_threat_labels_deny() {
        let devices = Arc::new(MemoryTrustedDevices::default());
        let mut b = bundle("203.0.113.9", "dev-9");
        b.label = Some("DDoS with SQL injection".into());
        let d = scorer(devices).decide_at(&b, weekday_morning());
        // 0.25 + 0.15 + 0.20 + 0.20
        assert!((d.risk_score - 0.80).abs() < 1e-9);
        assert_eq!(d.decision, Decision::Deny);
        assert!(d.factors.contains(&"DOS_ATTACK".to_string()));
        assert!(d.factors.contains(&"WEB_ATTACK".to_string()));
    }

    #[test]
    fn hostile_label_with_distant_gps_adds_location_anomaly() {
        let devices = Arc::new(MemoryTrustedDevices::default());
        devices
            .upsert(&device_fingerprint("dev-1", "8.8.8.8"), "dev-1")
            .unwrap();
        let mut b = bundle("8.8.8.8", "dev-1");
        b.label = Some("Bot".into());
        b.gps = Some(GpsSignal {
            lat: 35.68,
            lon: 139.69,
        });
        b.wifi_bssid = Some(WifiSignal {
            bssid: "aa:bb:cc:dd:ee:ff".into(),
        });
        let d = scorer(devices).decide_at(&b, weekday_morning());
        assert!(d.factors.contains(&"LOCATION_ANOMALY".to_string()));
        assert!(d.factors.contains(&"MALWARE".to_string()));
        assert!((d.risk_score - 0.30).abs() < 1e-9);
    }

    #[test]
    fn benign_label_skips_location_anomaly() {
        let devices = Arc::new(MemoryTrustedDevices::default());
        devices
            .upsert(&device_fingerprint("dev-1", "8.8.8.8"), "dev-1")
            .unwrap();
        let mut b = bundle("8.8.8.8", "dev-1");
        b.gps = Some(GpsSignal {
            lat: 35.68,
            lon: 139.69,
        });
        b.wifi_bssid = Some(WifiSignal {
            bssid: "aa:bb:cc:dd:ee:ff".into(),
        });
        let d = scorer(devices).decide_at(&b, weekday_morning());
        assert!(!d.factors.contains(&"LOCATION_ANOMALY".to_string()));
        assert_eq!(d.decision, Decision::Allow);
    }

    #[test]
    fn allow_upserts_trusted_device_but_stepup_does_not() {
        let devices = Arc::new(MemoryTrustedDevices::default());
        let s = scorer(Arc::clone(&devices));

        // first clean visit: unknown (+0.15) but under the step-up threshold
        let first = s.decide_at(&bundle("8.8.8.8", "dev-7"), weekday_morning());
        assert_eq!(first.decision, Decision::Allow);
        assert!(devices
            .is_trusted(&device_fingerprint("dev-7", "8.8.8.8"))
            .unwrap());

        // a step-up outcome earns no trust
        let d = s.decide_at(&bundle("203.0.113.9", "dev-8"), weekday_morning());
        assert_eq!(d.decision, Decision::StepUp);
        assert!(!devices
            .is_trusted(&device_fingerprint("dev-8", "203.0.113.9"))
            .unwrap());
    }

    #[test]
    fn missing_ip_counts_as_suspicious() {
        let devices = Arc::new(MemoryTrustedDevices::default());
        let mut b = SignalBundle::new("sess-base");
        b.device_posture = Some(DevicePostureSignal {
            device_id: "dev-1".into(),
        });
        let d = scorer(devices).decide_at(&b, weekday_morning());
        assert!(d.factors.contains(&"SUSPICIOUS_IP".to_string()));
        // no ip means no fingerprint either, so the device is unknown
        assert!(d.factors.contains(&"UNKNOWN_DEVICE".to_string()));
        assert_eq!(d.decision, Decision::StepUp);
    }

    #[test]
    fn fingerprint_is_stable_and_origin_bound() {
        let a = device_fingerprint("dev-1", "8.8.8.8");
        assert_eq!(a, device_fingerprint("dev-1", "8.8.8.8"));
        assert_ne!(a, device_fingerprint("dev-1", "9.9.9.9"));
        assert_eq!(a.len(), 64);
    }

    #[test]
    fn sqlite_store_roundtrips() {
        let dir = tempfile::tempdir().unwrap();
        let store = SqliteTrustedDevices::open(&dir.path().join("devices.db")).unwrap();
        let fp = device_fingerprint("dev-1", "8.8.8.8");
        assert!(!store.is_trusted(&fp).unwrap());
        store.upsert(&fp, "dev-1").unwrap();
        store.upsert(&fp, "dev-1").unwrap();
        assert!(store.is_trusted(&fp).unwrap());
    }
}
