//! ZTA engine entrypoint: loads config and enrichment tables, opens the
//! local stores, then evaluates one signal bundle (path argument or stdin)
//! through both the trust pipeline and the rule baseline, printing both
//! results as JSON on stdout.

use serde::Serialize;
use std::io::Read;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use zta_engine::{
    baseline::{BaselineDecision, BaselineScorer, SqliteTrustedDevices},
    config::EngineConfig,
    gateway::{AuditRecord, DecisionGateway},
    logging::StructuredLogger,
    siem::{AlertAggregator, SqliteAlertStore},
    signals::SignalBundle,
    storage::AuditSink,
    trust::RiskScorer,
    validator::Validator,
    EnrichmentTables,
};

#[derive(Serialize)]
struct EngineOutput {
    engine: AuditRecord,
    baseline: BaselineDecision,
}

fn read_bundle() -> Result<SignalBundle, Box<dyn std::error::Error + Send + Sync>> {
    let raw = match std::env::args().nth(1) {
        Some(path) => std::fs::read_to_string(path)?,
        None => {
            let mut buf = String::new();
            std::io::stdin().read_to_string(&mut buf)?;
            buf
        }
    };
    Ok(serde_json::from_str(&raw)?)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let config_path = std::env::var("ZTA_CONFIG_PATH")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("config.json"));
    let config = EngineConfig::load(&config_path);
    config.validate()?;

    StructuredLogger::init(config.log.json, &config.log.level);

    info!(data_dir = ?config.data_dir, "ZTA engine starting");

    std::fs::create_dir_all(&config.data_dir)?;
    let secret = b"audit-secret-placeholder"; // In production: from KMS
    let audit = Arc::new(AuditSink::open(&config.data_dir.join("audit.db"), secret)?);
    let alerts = Arc::new(SqliteAlertStore::open(&config.data_dir.join("alerts.db"))?);
    let devices = Arc::new(SqliteTrustedDevices::open(
        &config.data_dir.join("devices.db"),
    )?);
    let tables = Arc::new(EnrichmentTables::load(&config.data_dir));
    let status = tables.status();
    if !(status.geo && status.wifi && status.tls && status.device) {
        tracing::warn!(?status, "one or more enrichment tables missing; affected signals will validate as missing");
    }

    let gateway = DecisionGateway::new(
        config.gateway.clone(),
        Arc::new(Validator::new(config.validator.clone(), tables.clone())),
        Arc::new(AlertAggregator::new(config.siem.clone(), alerts)),
        RiskScorer::new(config.trust.clone()),
        Some(audit),
    );
    let baseline = BaselineScorer::new(config.baseline.clone(), devices, tables);

    let bundle = read_bundle()?;
    let engine = gateway.evaluate(&bundle).await?;
    let rule = baseline.decide(&bundle);

    info!(
        session_id = %bundle.session_id,
        engine = %engine.decision,
        baseline = %rule.decision,
        "evaluation complete"
    );
    StructuredLogger::emit_json(
        &EngineOutput {
            engine,
            baseline: rule,
        },
        &mut std::io::stdout(),
    );
    Ok(())
}
