//! Audit & Evidence Engine
//!
//! Append-only audit trail for every governed action, plus time-boxed
//! evidence packs with a content integrity hash for compliance export.

pub mod evidence;
pub mod export;
pub mod store;

pub use evidence::{EvidenceBuilder, EvidencePack, EvidenceWindow};
pub use store::{ActorType, AuditEvent, AuditQuery, AuditStore};
