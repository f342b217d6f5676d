//! Engine configuration: named numeric thresholds and weights, loaded once at
//! startup and treated as read-only for the process lifetime.

use crate::error::Error;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Data directory (SQLite stores, enrichment tables)
    pub data_dir: PathBuf,
    /// Validator: per-signal confidence weighting and cross-checks
    pub validator: ValidatorConfig,
    /// SIEM alert aggregation window and saturation
    pub siem: SiemConfig,
    /// Trust engine: base risk, confidence normalization, bumps
    pub trust: TrustConfig,
    /// Decision thresholds and stage timeouts
    pub gateway: GatewayConfig,
    /// Baseline rule-engine weights and thresholds
    pub baseline: BaselineConfig,
    /// Logging
    pub log: LogConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidatorConfig {
    /// Confidence assigned to a signal whose enrichment lookup succeeds
    pub lookup_weight: f64,
    /// Confidence for user_behavior (no enrichment table, consistency only)
    pub behavior_weight: f64,
    /// GPS vs BSSID distance above this adds GPS_MISMATCH (km)
    pub distance_threshold_km: f64,
    /// Quality penalty per missing signal
    pub missing_penalty: f64,
    /// Quality penalty per anomaly reason
    pub consistency_penalty: f64,
    /// requests_per_minute above this adds HIGH_FREQUENCY
    pub high_frequency_rpm: f64,
    /// failed_attempts at or above this adds BRUTE_FORCE
    pub max_failed_attempts: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SiemConfig {
    /// Trailing aggregation window (minutes)
    pub window_minutes: i64,
    /// Per-severity count saturation; anything above counts as this
    pub saturation: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrustConfig {
    /// Base risk when at least one signal carries weight
    pub base_risk_with_signals: f64,
    /// Fallback base when the bundle is essentially empty; kept at or above
    /// the allow threshold so degraded validation lands on step_up
    pub base_risk_no_signals: f64,
    /// Sum of weights is divided by this before clamping
    pub confidence_norm: f64,
    /// Upper clamp for the confidence multiplier
    pub max_multiplier: f64,
    /// Factor applied to reason bumps when the declared label is benign
    pub benign_dampening: f64,
    /// Risk added per high-severity alert in the window
    pub siem_high_bump: f64,
    /// Risk added per medium-severity alert in the window
    pub siem_medium_bump: f64,
    /// Cap on the total SIEM contribution
    pub siem_cap: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    /// Risk at or above this requires MFA step-up
    pub allow_threshold: f64,
    /// Risk at or above this is denied
    pub deny_threshold: f64,
    /// Bounded timeout applied to the validator and aggregator stages (ms)
    pub stage_timeout_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BaselineConfig {
    pub suspicious_ip_weight: f64,
    pub unknown_device_weight: f64,
    pub outside_hours_weight: f64,
    pub threat_weight: f64,
    pub location_anomaly_weight: f64,
    /// Same gross-distance check as the validator, unweighted (km)
    pub distance_threshold_km: f64,
    /// Business hours, local time, weekdays only
    pub business_hours_start: u32,
    pub business_hours_end: u32,
    pub stepup_threshold: f64,
    pub deny_threshold: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    pub level: String,
    pub json: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from(".zta"),
            validator: ValidatorConfig::default(),
            siem: SiemConfig::default(),
            trust: TrustConfig::default(),
            gateway: GatewayConfig::default(),
            baseline: BaselineConfig::default(),
            log: LogConfig::default(),
        }
    }
}

impl Default for ValidatorConfig {
    fn default() -> Self {
        Self {
            lookup_weight: 0.9,
            behavior_weight: 0.6,
            distance_threshold_km: 100.0,
            missing_penalty: 0.15,
            consistency_penalty: 0.10,
            high_frequency_rpm: 120.0,
            max_failed_attempts: 3,
        }
    }
}

impl Default for SiemConfig {
    fn default() -> Self {
        Self {
            window_minutes: 15,
            saturation: 20,
        }
    }
}

impl Default for TrustConfig {
    fn default() -> Self {
        Self {
            base_risk_with_signals: 0.02,
            base_risk_no_signals: 0.15,
            confidence_norm: 1.5,
            max_multiplier: 1.0,
            benign_dampening: 0.5,
            siem_high_bump: 0.15,
            siem_medium_bump: 0.08,
            siem_cap: 0.90,
        }
    }
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            allow_threshold: 0.12,
            deny_threshold: 0.80,
            stage_timeout_ms: 3000,
        }
    }
}

impl Default for BaselineConfig {
    fn default() -> Self {
        Self {
            suspicious_ip_weight: 0.25,
            unknown_device_weight: 0.15,
            outside_hours_weight: 0.08,
            threat_weight: 0.20,
            location_anomaly_weight: 0.10,
            distance_threshold_km: 100.0,
            business_hours_start: 8,
            business_hours_end: 18,
            stepup_threshold: 0.25,
            deny_threshold: 0.70,
        }
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: true,
        }
    }
}

impl EngineConfig {
    /// Load from JSON file if present; otherwise return default
    pub fn load(path: &std::path::Path) -> Self {
        if path.exists() {
            if let Ok(data) = std::fs::read_to_string(path) {
                if let Ok(c) = serde_json::from_str::<EngineConfig>(&data) {
                    return c;
                }
            }
        }
        Self::default()
    }

    /// Reject misconfigured thresholds at startup; per-request code may then
    /// assume ordered, in-range values.
    pub fn validate(&self) -> Result<(), Error> {
        let unit = |name: &str, v: f64| {
            if !v.is_finite() || !(0.0..=1.0).contains(&v) {
                Err(Error::Configuration(format!(
                    "{name} must be in [0,1], got {v}"
                )))
            } else {
                Ok(())
            }
        };
        unit("gateway.allow_threshold", self.gateway.allow_threshold)?;
        unit("gateway.deny_threshold", self.gateway.deny_threshold)?;
        unit("baseline.stepup_threshold", self.baseline.stepup_threshold)?;
        unit("baseline.deny_threshold", self.baseline.deny_threshold)?;
        unit("trust.base_risk_with_signals", self.trust.base_risk_with_signals)?;
        unit("trust.base_risk_no_signals", self.trust.base_risk_no_signals)?;
        unit("trust.benign_dampening", self.trust.benign_dampening)?;
        unit("validator.lookup_weight", self.validator.lookup_weight)?;
        unit("validator.behavior_weight", self.validator.behavior_weight)?;
        if self.gateway.allow_threshold >= self.gateway.deny_threshold {
            return Err(Error::Configuration(format!(
                "allow_threshold {} must be below deny_threshold {}",
                self.gateway.allow_threshold, self.gateway.deny_threshold
            )));
        }
        if self.baseline.stepup_threshold >= self.baseline.deny_threshold {
            return Err(Error::Configuration(format!(
                "baseline stepup_threshold {} must be below deny_threshold {}",
                self.baseline.stepup_threshold, self.baseline.deny_threshold
            )));
        }
        if self.trust.confidence_norm <= 0.0 {
            return Err(Error::Configuration(
                "trust.confidence_norm must be positive".into(),
            ));
        }
        if self.validator.distance_threshold_km <= 0.0 {
            return Err(Error::Configuration(
                "validator.distance_threshold_km must be positive".into(),
            ));
        }
        if self.baseline.business_hours_start >= self.baseline.business_hours_end
            || self.baseline.business_hours_end > 24
        {
            return Err(Error::Configuration(format!(
                "baseline business hours {}..{} invalid",
                self.baseline.business_hours_start, self.baseline.business_hours_end
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        assert!(EngineConfig::default().validate().is_ok());
    }

    #[test]
    fn inverted_thresholds_rejected() {
        let mut c = EngineConfig::default();
        c.gateway.allow_threshold = 0.9;
        assert!(matches!(c.validate(), Err(Error::Configuration(_))));
    }

    #[test]
    fn out_of_range_threshold_rejected() {
        let mut c = EngineConfig::default();
        c.gateway.deny_threshold = 1.4;
        assert!(c.validate().is_err());
    }
}
