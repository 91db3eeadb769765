//! rollcall-store — Durable state for the attendance service.
//!
//! Two resources live here: the SQLite database holding the identity index
//! and the attendance ledger, and a small JSON file holding the single
//! admin credential hash. Each is its own serialization domain; neither
//! knows about the other.

pub mod admin;
pub mod ledger;
pub mod store;

pub use admin::{AdminCredentialFile, CredentialError, DEFAULT_ADMIN_SECRET};
pub use ledger::AttendanceRecord;
pub use store::{Store, StoreError};
