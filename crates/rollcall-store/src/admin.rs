//! Admin credential store — one salted hash in a JSON file.
//!
//! Materialized on first open by hashing a fixed default secret. Replaced
//! atomically on password change (write-temp then rename), so a failed
//! change leaves the prior hash intact.

use argon2::password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Secret used to seed the credential file when none exists yet.
pub const DEFAULT_ADMIN_SECRET: &str = "admin123";

#[derive(Error, Debug)]
pub enum CredentialError {
    #[error("credential file io: {0}")]
    Io(#[from] std::io::Error),
    #[error("credential file malformed: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("password hashing failed: {0}")]
    Hash(String),
}

#[derive(Serialize, Deserialize)]
struct CredentialRecord {
    hash: String,
}

/// Handle to the on-disk admin credential.
pub struct AdminCredentialFile {
    path: PathBuf,
}

impl AdminCredentialFile {
    /// Open the credential file, creating it with the default secret's hash
    /// when it does not exist yet.
    pub fn open(path: &Path) -> Result<Self, CredentialError> {
        let file = Self { path: path.to_path_buf() };
        if !path.exists() {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            file.set(DEFAULT_ADMIN_SECRET)?;
            tracing::warn!(
                path = %path.display(),
                "admin credential initialized with the default secret; change it"
            );
        }
        Ok(file)
    }

    /// Check a candidate secret against the stored hash. Always a boolean:
    /// a non-matching candidate is not an error.
    pub fn verify(&self, candidate: &str) -> Result<bool, CredentialError> {
        let raw = std::fs::read_to_string(&self.path)?;
        let record: CredentialRecord = serde_json::from_str(&raw)?;
        let parsed =
            PasswordHash::new(&record.hash).map_err(|e| CredentialError::Hash(e.to_string()))?;
        Ok(Argon2::default()
            .verify_password(candidate.as_bytes(), &parsed)
            .is_ok())
    }

    /// Hash the new secret and atomically replace the stored record.
    pub fn set(&self, secret: &str) -> Result<(), CredentialError> {
        let salt = SaltString::generate(&mut OsRng);
        let hash = Argon2::default()
            .hash_password(secret.as_bytes(), &salt)
            .map_err(|e| CredentialError::Hash(e.to_string()))?
            .to_string();

        let body = serde_json::to_string(&CredentialRecord { hash })?;
        let tmp = self.path.with_extension("tmp");
        std::fs::write(&tmp, body)?;
        std::fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}
