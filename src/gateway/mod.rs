//! Decision gateway: orchestrates validate, aggregate, score, and enforce
//! with per-stage timeouts. Infrastructure failure degrades a stage's input
//! rather than aborting; the session still gets an answer and an audit row.

use crate::config::GatewayConfig;
use crate::siem::{AlertAggregator, AlertWindow};
use crate::signals::SignalBundle;
use crate::storage::AuditSink;
use crate::trust::{RiskAssessment, RiskScorer};
use crate::validator::{ValidationResult, Validator};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;
use tracing::{info, warn};
use uuid::Uuid;

/// Access decision for one authentication request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Decision {
    Allow,
    StepUp,
    Deny,
}

impl Decision {
    pub fn enforcement(&self) -> Enforcement {
        match self {
            Decision::Allow => Enforcement::Allow,
            Decision::StepUp => Enforcement::MfaRequired,
            Decision::Deny => Enforcement::Deny,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Decision::Allow => "allow",
            Decision::StepUp => "step_up",
            Decision::Deny => "deny",
        }
    }
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Enforcement action handed to the access proxy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Enforcement {
    Allow,
    MfaRequired,
    Deny,
}

/// Map a risk value to a decision. A score exactly on a threshold escalates.
pub fn decide(risk: f64, config: &GatewayConfig) -> Decision {
    if risk >= config.deny_threshold {
        Decision::Deny
    } else if risk >= config.allow_threshold {
        Decision::StepUp
    } else {
        Decision::Allow
    }
}

/// Immutable record of one decision; produced for every request, even when
/// the sink write fails.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditRecord {
    pub id: Uuid,
    pub session_id: String,
    pub ts: DateTime<Utc>,
    pub decision: Decision,
    pub enforcement: Enforcement,
    pub assessment: RiskAssessment,
}

pub struct DecisionGateway {
    config: GatewayConfig,
    validator: Arc<Validator>,
    aggregator: Arc<AlertAggregator>,
    scorer: RiskScorer,
    sink: Option<Arc<AuditSink>>,
}

impl DecisionGateway {
    pub fn new(
        config: GatewayConfig,
        validator: Arc<Validator>,
        aggregator: Arc<AlertAggregator>,
        scorer: RiskScorer,
        sink: Option<Arc<AuditSink>>,
    ) -> Self {
        Self {
            config,
            validator,
            aggregator,
            scorer,
            sink,
        }
    }

    /// Run the full pipeline for one bundle. Malformed raw signals are the
    /// only failure; infrastructure trouble (timeouts, panics, unreachable
    /// stores) substitutes degraded inputs, which bias toward step-up.
    pub async fn evaluate(&self, bundle: &SignalBundle) -> crate::error::Result<AuditRecord> {
        let stage_budget = Duration::from_millis(self.config.stage_timeout_ms);

        let validated = self.validate_stage(bundle, stage_budget).await?;
        let alerts = self.aggregate_stage(&bundle.session_id, stage_budget).await;
        let assessment = self.scorer.score(&validated, &alerts, bundle.is_benign());
        let decision = decide(assessment.risk, &self.config);

        let record = AuditRecord {
            id: Uuid::new_v4(),
            session_id: bundle.session_id.clone(),
            ts: Utc::now(),
            decision,
            enforcement: decision.enforcement(),
            assessment,
        };

        info!(
            session_id = %record.session_id,
            risk = record.assessment.risk,
            decision = %record.decision,
            "gateway decision"
        );

        if let Some(sink) = &self.sink {
            if let Err(e) = sink.append(&record) {
                warn!(session_id = %record.session_id, error = %e, "audit write failed");
            }
        }
        Ok(record)
    }

    async fn validate_stage(
        &self,
        bundle: &SignalBundle,
        budget: Duration,
    ) -> crate::error::Result<ValidationResult> {
        let validator = Arc::clone(&self.validator);
        let owned = bundle.clone();
        let session_id = bundle.session_id.clone();
        let task = tokio::task::spawn_blocking(move || validator.validate(&owned));
        match timeout(budget, task).await {
            Ok(Ok(result)) => result,
            Ok(Err(e)) => {
                warn!(session_id, error = %e, "validation task aborted, degrading");
                Ok(ValidationResult::degraded())
            }
            Err(_) => {
                warn!(session_id, "validation timed out, degrading");
                Ok(ValidationResult::degraded())
            }
        }
    }

    async fn aggregate_stage(&self, session_id: &str, budget: Duration) -> AlertWindow {
        let aggregator = Arc::clone(&self.aggregator);
        let window = aggregator.window_minutes();
        let sid = session_id.to_string();
        let task = tokio::task::spawn_blocking(move || aggregator.aggregate(&sid, window));
        match timeout(budget, task).await {
            Ok(Ok(w)) => w,
            Ok(Err(e)) => {
                warn!(session_id, error = %e, "aggregation task aborted, using empty window");
                AlertWindow::empty()
            }
            Err(_) => {
                warn!(session_id, "aggregation timed out, using empty window");
                AlertWindow::empty()
            }
        }
    }
}
