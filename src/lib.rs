//! ZTA Engine — Multi-signal zero-trust authentication risk engine.
//!
//! Modular structure:
//! - [`signals`] — Raw per-session authentication signal bundles
//! - [`enrichment`] — IP / BSSID / JA3 / device-posture lookup tables
//! - [`validator`] — Per-signal confidence, cross-checks, quality score
//! - [`siem`] — Time-windowed security-alert aggregation
//! - [`trust`] — Confidence-weighted risk scoring with STRIDE breakdown
//! - [`gateway`] — Decision orchestration, thresholds, audit records
//! - [`baseline`] — Independent rule-based comparison scorer
//! - [`storage`] — Encrypted audit-record sink
//! - [`logging`] — Structured JSON logging

pub mod config;
pub mod error;
pub mod signals;
pub mod enrichment;
pub mod validator;
pub mod siem;
pub mod trust;
pub mod gateway;
pub mod baseline;
pub mod storage;
pub mod logging;

pub use config::EngineConfig;
pub use error::{Error, Result};
pub use signals::{SignalBundle, SignalKind};
pub use enrichment::{EnrichmentLookup, EnrichmentTables};
pub use validator::{ReasonCode, ValidationResult, Validator};
pub use siem::{AlertAggregator, AlertStore, AlertWindow, Severity, SqliteAlertStore, Stride};
pub use trust::{RiskAssessment, RiskScorer};
pub use gateway::{decide, AuditRecord, Decision, DecisionGateway, Enforcement};
pub use baseline::{BaselineDecision, BaselineScorer, SqliteTrustedDevices};
pub use storage::AuditSink;
pub use logging::StructuredLogger;
