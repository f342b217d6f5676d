//! SQLite-backed audit sink with AES-GCM encryption of the assessment
//! payload. Key derived from a deployment secret (in production: KMS or an
//! HSM-backed key).

use crate::error::{Error, Result};
use crate::gateway::AuditRecord;
use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm,
};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use chrono::{DateTime, Utc};
use rand::RngCore;
use rusqlite::{params, Connection};
use std::path::Path;
use std::sync::Mutex;

const NONCE_LEN: usize = 12;
const KEY_LEN: usize = 32;

fn derive_key(seed: &[u8]) -> [u8; KEY_LEN] {
    use ring::digest;
    let mut out = [0u8; KEY_LEN];
    let h = digest::digest(&digest::SHA256, seed);
    out[..h.as_ref().len().min(KEY_LEN)].copy_from_slice(h.as_ref());
    out
}

fn seal(key: &[u8; KEY_LEN], plaintext: &[u8]) -> Result<String> {
    let cipher = Aes256Gcm::new_from_slice(key)
        .map_err(|e| Error::Crypto(format!("bad key length: {e:?}")))?;
    let mut nonce = [0u8; NONCE_LEN];
    rand::thread_rng().fill_bytes(&mut nonce);
    let ciphertext = cipher
        .encrypt((&nonce).into(), plaintext)
        .map_err(|_| Error::Crypto("encryption failed".into()))?;
    let mut out = nonce.to_vec();
    out.extend(ciphertext);
    Ok(BASE64.encode(&out))
}

fn open_sealed(key: &[u8; KEY_LEN], encoded: &str) -> Result<Vec<u8>> {
    let raw = BASE64
        .decode(encoded)
        .map_err(|e| Error::Crypto(format!("bad encoding: {e}")))?;
    if raw.len() < NONCE_LEN {
        return Err(Error::Crypto("payload too short".into()));
    }
    let (nonce, ct) = raw.split_at(NONCE_LEN);
    let cipher = Aes256Gcm::new_from_slice(key)
        .map_err(|e| Error::Crypto(format!("bad key length: {e:?}")))?;
    cipher
        .decrypt(nonce.into(), ct)
        .map_err(|_| Error::Crypto("decryption failed".into()))
}

/// Append-only store of audit records. Decision and risk stay queryable in
/// the clear; the full assessment payload is sealed.
pub struct AuditSink {
    conn: Mutex<Connection>,
    key: [u8; KEY_LEN],
}

impl AuditSink {
    /// Open or create the audit DB at `path`, deriving the payload key
    /// from `secret`.
    pub fn open(path: &Path, secret: &[u8]) -> Result<Self> {
        let conn = Connection::open(path)?;
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS audit (
                id TEXT PRIMARY KEY,
                session_id TEXT NOT NULL,
                ts INTEGER NOT NULL,
                decision TEXT NOT NULL,
                risk REAL NOT NULL,
                record_enc TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_audit_session_ts ON audit(session_id, ts);
            "#,
        )?;
        Ok(Self {
            conn: Mutex::new(conn),
            key: derive_key(secret),
        })
    }

    pub fn append(&self, record: &AuditRecord) -> Result<()> {
        let payload = serde_json::to_string(record)?;
        let enc = seal(&self.key, payload.as_bytes())?;
        self.conn.lock().unwrap().execute(
            "INSERT OR REPLACE INTO audit (id, session_id, ts, decision, risk, record_enc) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                record.id.to_string(),
                record.session_id,
                record.ts.timestamp_millis(),
                record.decision.as_str(),
                record.assessment.risk,
                enc,
            ],
        )?;
        Ok(())
    }

    /// Fetch and unseal one record by id.
    pub fn fetch(&self, id: &str) -> Result<Option<AuditRecord>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare("SELECT record_enc FROM audit WHERE id = ?1")?;
        let mut rows = stmt.query(params![id])?;
        if let Some(row) = rows.next()? {
            let enc: String = row.get(0)?;
            let plain = open_sealed(&self.key, &enc)?;
            let record: AuditRecord = serde_json::from_slice(&plain)?;
            return Ok(Some(record));
        }
        Ok(None)
    }

    /// Retention: delete records older than given timestamp.
    pub fn prune_before(&self, ts: DateTime<Utc>) -> Result<u64> {
        let n = self
            .conn
            .lock()
            .unwrap()
            .execute("DELETE FROM audit WHERE ts < ?1", params![ts.timestamp_millis()])?;
        Ok(n as u64)
    }
}
