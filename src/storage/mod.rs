//! Encrypted local persistence for decision audit records.

mod encrypted;

pub use encrypted::AuditSink;
