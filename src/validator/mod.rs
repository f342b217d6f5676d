//! Signal validation: per-signal confidence weights, cross-signal consistency
//! checks, and an overall quality score. Pure given the enrichment snapshot;
//! only a malformed raw value fails the call.

mod geo;

pub use geo::haversine_km;

use crate::config::ValidatorConfig;
use crate::enrichment::EnrichmentLookup;
use crate::error::Error;
use crate::signals::{SignalBundle, SignalKind};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::net::IpAddr;
use std::sync::Arc;

/// Anomaly reason codes emitted by validation; wire form is the
/// SCREAMING_SNAKE token used across the alert feed and audit records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReasonCode {
    GpsMismatch,
    TlsAnomaly,
    PostureOutdated,
    HighFrequency,
    PolicyElevation,
    BruteForce,
    DownloadExfil,
}

impl ReasonCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReasonCode::GpsMismatch => "GPS_MISMATCH",
            ReasonCode::TlsAnomaly => "TLS_ANOMALY",
            ReasonCode::PostureOutdated => "POSTURE_OUTDATED",
            ReasonCode::HighFrequency => "HIGH_FREQUENCY",
            ReasonCode::PolicyElevation => "POLICY_ELEVATION",
            ReasonCode::BruteForce => "BRUTE_FORCE",
            ReasonCode::DownloadExfil => "DOWNLOAD_EXFIL",
        }
    }

    /// Parse a normalized token (underscores, any case). Unknown tokens are
    /// dropped by callers rather than treated as errors.
    pub fn parse_token(token: &str) -> Option<Self> {
        let t = token.trim().replace(['-', ' '], "_").to_uppercase();
        match t.as_str() {
            "GPS_MISMATCH" => Some(ReasonCode::GpsMismatch),
            "TLS_ANOMALY" => Some(ReasonCode::TlsAnomaly),
            "POSTURE_OUTDATED" => Some(ReasonCode::PostureOutdated),
            "HIGH_FREQUENCY" => Some(ReasonCode::HighFrequency),
            "POLICY_ELEVATION" => Some(ReasonCode::PolicyElevation),
            "BRUTE_FORCE" => Some(ReasonCode::BruteForce),
            "DOWNLOAD_EXFIL" => Some(ReasonCode::DownloadExfil),
            _ => None,
        }
    }
}

impl fmt::Display for ReasonCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of validating one bundle. Produced fresh per request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationResult {
    /// Confidence per signal, each in [0,1]
    pub weights: BTreeMap<SignalKind, f64>,
    /// Overall completeness/consistency in [0,1]
    pub quality: f64,
    /// Ordered, deduplicated anomaly codes
    pub reasons: Vec<ReasonCode>,
    /// Signals absent from the bundle or unresolvable via enrichment
    pub missing: BTreeSet<SignalKind>,
}

impl ValidationResult {
    /// Lowest-confidence result, substituted when validation cannot run.
    /// Empty weights push the scorer onto its no-signal base risk.
    pub fn degraded() -> Self {
        Self {
            weights: BTreeMap::new(),
            quality: 0.0,
            reasons: Vec::new(),
            missing: SignalKind::ALL.into_iter().collect(),
        }
    }

    pub fn total_weight(&self) -> f64 {
        self.weights.values().sum()
    }

    fn push_reason(&mut self, code: ReasonCode) {
        if !self.reasons.contains(&code) {
            self.reasons.push(code);
        }
    }
}

/// Computes confidence weights, quality, and anomaly reasons from a raw
/// bundle plus the enrichment snapshot.
pub struct Validator {
    config: ValidatorConfig,
    lookup: Arc<dyn EnrichmentLookup>,
}

impl Validator {
    pub fn new(config: ValidatorConfig, lookup: Arc<dyn EnrichmentLookup>) -> Self {
        Self { config, lookup }
    }

    pub fn validate(&self, bundle: &SignalBundle) -> Result<ValidationResult, Error> {
        let mut out = ValidationResult {
            weights: BTreeMap::new(),
            quality: 1.0,
            reasons: Vec::new(),
            missing: BTreeSet::new(),
        };
        let w = self.config.lookup_weight;

        // ip_geo: parse failure is the caller's fault, lookup miss is not
        match &bundle.ip_geo {
            None => {
                out.missing.insert(SignalKind::IpGeo);
            }
            Some(sig) => {
                let ip: IpAddr = sig
                    .ip
                    .parse()
                    .map_err(|_| Error::validation("ip_geo", format!("unparseable ip '{}'", sig.ip)))?;
                match self.lookup.geo_for_ip(&ip) {
                    Some(_) => {
                        out.weights.insert(SignalKind::IpGeo, w);
                    }
                    None => {
                        out.weights.insert(SignalKind::IpGeo, 0.0);
                        out.missing.insert(SignalKind::IpGeo);
                    }
                }
            }
        }

        // gps: range check only, no table
        match &bundle.gps {
            None => {
                out.missing.insert(SignalKind::Gps);
            }
            Some(g) => {
                if !g.lat.is_finite()
                    || !g.lon.is_finite()
                    || !(-90.0..=90.0).contains(&g.lat)
                    || !(-180.0..=180.0).contains(&g.lon)
                {
                    return Err(Error::validation(
                        "gps",
                        format!("coordinates out of range ({}, {})", g.lat, g.lon),
                    ));
                }
                out.weights.insert(SignalKind::Gps, w);
            }
        }

        // wifi_bssid: resolve to access-point coordinates
        let mut ap = None;
        match &bundle.wifi_bssid {
            None => {
                out.missing.insert(SignalKind::WifiBssid);
            }
            Some(sig) => match self.lookup.ap_for_bssid(&sig.bssid) {
                Some(found) => {
                    out.weights.insert(SignalKind::WifiBssid, w);
                    ap = Some(found);
                }
                None => {
                    out.weights.insert(SignalKind::WifiBssid, 0.0);
                    out.missing.insert(SignalKind::WifiBssid);
                }
            },
        }

        // cross-validation: GPS vs the access point's known position
        if let (Some(g), Some(ap)) = (&bundle.gps, &ap) {
            let dist = haversine_km(g.lat, g.lon, ap.lat, ap.lon);
            if dist > self.config.distance_threshold_km {
                out.push_reason(ReasonCode::GpsMismatch);
                // scale both location weights by how far over threshold we are
                let factor = self.config.distance_threshold_km / dist;
                for kind in [SignalKind::Gps, SignalKind::WifiBssid] {
                    if let Some(wt) = out.weights.get_mut(&kind) {
                        *wt = (*wt * factor).max(0.0);
                    }
                }
            }
        }

        // tls: unknown fingerprints are misses; tagged ones are anomalies
        match &bundle.tls {
            None => {
                out.missing.insert(SignalKind::Tls);
            }
            Some(sig) => match self.lookup.tag_for_ja3(&sig.ja3) {
                Some(tag) => {
                    out.weights.insert(SignalKind::Tls, w);
                    let tag = tag.to_lowercase();
                    if tag == "malicious" || tag == "suspicious" {
                        out.push_reason(ReasonCode::TlsAnomaly);
                    }
                }
                None => {
                    out.weights.insert(SignalKind::Tls, 0.0);
                    out.missing.insert(SignalKind::Tls);
                }
            },
        }

        // device posture: unpatched or missing EDR is an anomaly, not a miss
        match &bundle.device_posture {
            None => {
                out.missing.insert(SignalKind::DevicePosture);
            }
            Some(sig) => match self.lookup.posture_for_device(&sig.device_id) {
                Some(posture) => {
                    out.weights.insert(SignalKind::DevicePosture, w);
                    let edr_missing =
                        posture.edr.as_deref().map(str::trim).unwrap_or("").is_empty();
                    if !posture.patched || edr_missing {
                        out.push_reason(ReasonCode::PostureOutdated);
                    }
                }
                None => {
                    out.weights.insert(SignalKind::DevicePosture, 0.0);
                    out.missing.insert(SignalKind::DevicePosture);
                }
            },
        }

        // user behavior: consistency-only weight plus rate/privilege checks
        match &bundle.user_behavior {
            None => {
                out.missing.insert(SignalKind::UserBehavior);
            }
            Some(b) => {
                if !b.requests_per_minute.is_finite() || b.requests_per_minute < 0.0 {
                    return Err(Error::validation(
                        "user_behavior",
                        format!("invalid requests_per_minute {}", b.requests_per_minute),
                    ));
                }
                out.weights
                    .insert(SignalKind::UserBehavior, self.config.behavior_weight);
                if b.requests_per_minute > self.config.high_frequency_rpm {
                    out.push_reason(ReasonCode::HighFrequency);
                }
                if b.privilege_change {
                    out.push_reason(ReasonCode::PolicyElevation);
                }
                if b.failed_attempts >= self.config.max_failed_attempts {
                    out.push_reason(ReasonCode::BruteForce);
                }
            }
        }

        out.quality = (1.0
            - self.config.missing_penalty * out.missing.len() as f64
            - self.config.consistency_penalty * out.reasons.len() as f64)
            .clamp(0.0, 1.0);
        for wt in out.weights.values_mut() {
            *wt = wt.clamp(0.0, 1.0);
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ValidatorConfig;
    use crate::enrichment::{DevicePosture, EnrichmentTables, GeoInfo, WifiAp};
    use crate::signals::*;

    fn tables() -> Arc<EnrichmentTables> {
        Arc::new(EnrichmentTables::with_entries(
            vec![(
                "203.0.113.7".parse().unwrap(),
                GeoInfo {
                    country: Some("DE".into()),
                    city: Some("Berlin".into()),
                    lat: 52.52,
                    lon: 13.40,
                },
            )],
            vec![(
                "aa:bb:cc:dd:ee:ff",
                WifiAp {
                    ssid: Some("office".into()),
                    lat: 52.52,
                    lon: 13.40,
                },
            )],
            vec![("good-ja3", "benign"), ("evil-ja3", "malicious")],
            vec![
                (
                    "dev-1",
                    DevicePosture {
                        os: Some("linux".into()),
                        patched: true,
                        edr: Some("falcon".into()),
                    },
                ),
                (
                    "dev-2",
                    DevicePosture {
                        os: Some("windows".into()),
                        patched: false,
                        edr: None,
                    },
                ),
            ],
        ))
    }

    fn validator() -> Validator {
        Validator::new(ValidatorConfig::default(), tables())
    }

    fn full_benign_bundle() -> SignalBundle {
        let mut b = SignalBundle::new("sess-a");
        b.label = Some("BENIGN".into());
        b.ip_geo = Some(IpGeoSignal {
            ip: "203.0.113.7".into(),
        });
        b.gps = Some(GpsSignal {
            lat: 52.52,
            lon: 13.40,
        });
        b.wifi_bssid = Some(WifiSignal {
            bssid: "AA:BB:CC:DD:EE:FF".into(),
        });
        b.tls = Some(TlsSignal {
            ja3: "good-ja3".into(),
        });
        b.device_posture = Some(DevicePostureSignal {
            device_id: "dev-1".into(),
        });
        b.user_behavior = Some(UserBehaviorSignal {
            requests_per_minute: 12.0,
            failed_attempts: 0,
            privilege_change: false,
        });
        b
    }

    #[test]
    fn clean_bundle_validates_with_high_weights() {
        let v = validator().validate(&full_benign_bundle()).unwrap();
        assert!(v.reasons.is_empty());
        assert!(v.missing.is_empty());
        assert_eq!(v.quality, 1.0);
        for kind in [
            SignalKind::IpGeo,
            SignalKind::Gps,
            SignalKind::WifiBssid,
            SignalKind::Tls,
            SignalKind::DevicePosture,
        ] {
            assert!(v.weights[&kind] >= 0.8, "{kind} weight too low");
        }
    }

    #[test]
    fn distant_gps_adds_mismatch_and_crushes_location_weights() {
        let mut b = full_benign_bundle();
        // roughly Tokyo, ~8900 km from the Berlin access point
        b.gps = Some(GpsSignal {
            lat: 35.68,
            lon: 139.69,
        });
        let v = validator().validate(&b).unwrap();
        assert!(v.reasons.contains(&ReasonCode::GpsMismatch));
        assert!(v.weights[&SignalKind::Gps] < 0.02);
        assert!(v.weights[&SignalKind::WifiBssid] < 0.02);
        assert!(v.weights[&SignalKind::Gps] >= 0.0);
        assert!(v.quality < 1.0);
    }

    #[test]
    fn malicious_ja3_and_unpatched_device_flagged() {
        let mut b = full_benign_bundle();
        b.tls = Some(TlsSignal {
            ja3: "evil-ja3".into(),
        });
        b.device_posture = Some(DevicePostureSignal {
            device_id: "dev-2".into(),
        });
        let v = validator().validate(&b).unwrap();
        assert!(v.reasons.contains(&ReasonCode::TlsAnomaly));
        assert!(v.reasons.contains(&ReasonCode::PostureOutdated));
        // anomalies keep their weights: the signals themselves resolved
        assert!(v.weights[&SignalKind::Tls] >= 0.8);
    }

    #[test]
    fn lookup_miss_is_missing_not_fatal() {
        let mut b = full_benign_bundle();
        b.tls = Some(TlsSignal {
            ja3: "never-seen".into(),
        });
        let v = validator().validate(&b).unwrap();
        assert_eq!(v.weights[&SignalKind::Tls], 0.0);
        assert!(v.missing.contains(&SignalKind::Tls));
    }

    #[test]
    fn malformed_ip_fails_validation() {
        let mut b = full_benign_bundle();
        b.ip_geo = Some(IpGeoSignal {
            ip: "not-an-ip".into(),
        });
        let err = validator().validate(&b).unwrap_err();
        assert!(matches!(err, Error::Validation { .. }));
    }

    #[test]
    fn out_of_range_gps_fails_validation() {
        let mut b = full_benign_bundle();
        b.gps = Some(GpsSignal {
            lat: 123.0,
            lon: 0.0,
        });
        assert!(validator().validate(&b).is_err());
    }

    #[test]
    fn behavior_thresholds_add_reasons_once() {
        let mut b = full_benign_bundle();
        b.user_behavior = Some(UserBehaviorSignal {
            requests_per_minute: 900.0,
            failed_attempts: 5,
            privilege_change: true,
        });
        let v = validator().validate(&b).unwrap();
        assert!(v.reasons.contains(&ReasonCode::HighFrequency));
        assert!(v.reasons.contains(&ReasonCode::PolicyElevation));
        assert!(v.reasons.contains(&ReasonCode::BruteForce));
        let mut deduped = v.reasons.clone();
        deduped.dedup();
        assert_eq!(deduped.len(), v.reasons.len());
    }

    #[test]
    fn empty_bundle_has_floor_quality() {
        let b = SignalBundle::new("sess-empty");
        let v = validator().validate(&b).unwrap();
        assert!(v.weights.is_empty());
        assert_eq!(v.missing.len(), SignalKind::ALL.len());
        assert!(v.quality <= 0.11, "quality {} not penalized", v.quality);
    }

    #[test]
    fn degraded_result_is_empty_and_zero_quality() {
        let d = ValidationResult::degraded();
        assert_eq!(d.quality, 0.0);
        assert_eq!(d.total_weight(), 0.0);
    }
}
