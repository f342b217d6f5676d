//! Risk scoring: combines validation confidence, anomaly reasons, and the
//! recent alert window into one risk value in [0,1]. Pure and deterministic;
//! same inputs always produce the same assessment.

mod stride;

pub use stride::category_for;

use crate::config::TrustConfig;
use crate::siem::{AlertWindow, Stride};
use crate::validator::{ReasonCode, ValidationResult};
use serde::{Deserialize, Serialize};

/// One additive contribution to the final risk value.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskComponent {
    pub reason: ReasonCode,
    pub category: Stride,
    pub contribution: f64,
}

/// Scoring outcome with full breakdown for audit records.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskAssessment {
    pub risk: f64,
    pub base: f64,
    /// Confidence multiplier derived from total signal weight, in [0,1]
    pub confidence: f64,
    pub components: Vec<RiskComponent>,
    pub siem_contribution: f64,
}

pub struct RiskScorer {
    config: TrustConfig,
}

impl RiskScorer {
    pub fn new(config: TrustConfig) -> Self {
        Self { config }
    }

    /// Score one request. `benign` is the declared traffic label; benign
    /// sessions get their reason bumps dampened, never their alert term.
    pub fn score(
        &self,
        validated: &ValidationResult,
        alerts: &AlertWindow,
        benign: bool,
    ) -> RiskAssessment {
        let c = &self.config;
        let has_signal = validated.weights.values().any(|w| *w > 0.0);
        let base = if has_signal {
            c.base_risk_with_signals
        } else {
            c.base_risk_no_signals
        };
        let confidence = (validated.total_weight() / c.confidence_norm)
            .clamp(0.0, c.max_multiplier);
        let dampening = if benign { c.benign_dampening } else { 1.0 };

        let mut components = Vec::with_capacity(validated.reasons.len());
        let mut reason_sum = 0.0;
        for &reason in &validated.reasons {
            let (category, bump) = stride::bump_for(reason);
            let contribution = bump * confidence * dampening;
            reason_sum += contribution;
            components.push(RiskComponent {
                reason,
                category,
                contribution,
            });
        }

        let siem_raw = c.siem_high_bump * f64::from(alerts.high)
            + c.siem_medium_bump * f64::from(alerts.medium);
        let siem_contribution = siem_raw.min(c.siem_cap) * confidence;

        RiskAssessment {
            risk: (base + reason_sum + siem_contribution).clamp(0.0, 1.0),
            base,
            confidence,
            components,
            siem_contribution,
        }
    }
}
