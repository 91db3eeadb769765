//! SQLite-backed identity index.
//!
//! Thread-safe via an internal `Mutex<Connection>`; every operation is a
//! single statement or transaction, so a failed call leaves the database in
//! its pre-call state.

use rollcall_core::{Embedding, Identity, EMBEDDING_DIM};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("sqlite: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("store lock poisoned")]
    Poisoned,
    #[error("embedding has {len} values, expected {expected}")]
    EmbeddingDimension { len: usize, expected: usize },
}

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS identities (
    name      TEXT PRIMARY KEY,
    mobile    TEXT,
    email     TEXT,
    embedding BLOB NOT NULL
);
CREATE TABLE IF NOT EXISTS attendance (
    name    TEXT NOT NULL,
    date    TEXT NOT NULL,
    intime  TEXT NOT NULL,
    outtime TEXT NOT NULL,
    PRIMARY KEY (name, date)
);
";

/// Handle to the SQLite database holding identities and attendance.
pub struct Store {
    conn: Mutex<Connection>,
}

impl Store {
    /// Open (or create) the database at the given path and apply the schema.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent() {
            let _ = std::fs::create_dir_all(parent);
        }
        let conn = Connection::open(path)?;
        conn.execute_batch(SCHEMA)?;
        tracing::info!(path = %path.display(), "attendance database opened");
        Ok(Self { conn: Mutex::new(conn) })
    }

    /// In-memory database, used by tests.
    pub fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self { conn: Mutex::new(conn) })
    }

    pub(crate) fn lock(&self) -> Result<MutexGuard<'_, Connection>, StoreError> {
        self.conn.lock().map_err(|_| StoreError::Poisoned)
    }

    /// Insert a new identity. A single INSERT, so the index either gains the
    /// full row or stays unchanged. The caller is responsible for refusing
    /// duplicate names before calling this.
    pub fn insert_identity(&self, identity: &Identity) -> Result<(), StoreError> {
        check_dimension(&identity.embedding)?;
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO identities (name, mobile, email, embedding) VALUES (?1, ?2, ?3, ?4)",
            params![
                identity.name,
                identity.mobile,
                identity.email,
                encode_embedding(&identity.embedding),
            ],
        )?;
        Ok(())
    }

    pub fn identity_exists(&self, name: &str) -> Result<bool, StoreError> {
        let conn = self.lock()?;
        let found: Option<String> = conn
            .query_row(
                "SELECT name FROM identities WHERE name = ?1",
                params![name],
                |row| row.get(0),
            )
            .optional()?;
        Ok(found.is_some())
    }

    /// Overwrite the stored embedding for an existing identity. Contact
    /// metadata is never touched here. Returns false when the name is not
    /// enrolled.
    pub fn update_embedding(&self, name: &str, embedding: &Embedding) -> Result<bool, StoreError> {
        check_dimension(embedding)?;
        let conn = self.lock()?;
        let rows = conn.execute(
            "UPDATE identities SET embedding = ?2 WHERE name = ?1",
            params![name, encode_embedding(embedding)],
        )?;
        Ok(rows > 0)
    }

    pub fn get_identity(&self, name: &str) -> Result<Option<Identity>, StoreError> {
        let conn = self.lock()?;
        let row = conn
            .query_row(
                "SELECT name, mobile, email, embedding FROM identities WHERE name = ?1",
                params![name],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, Option<String>>(1)?,
                        row.get::<_, Option<String>>(2)?,
                        row.get::<_, Vec<u8>>(3)?,
                    ))
                },
            )
            .optional()?;

        match row {
            None => Ok(None),
            Some((name, mobile, email, blob)) => Ok(Some(Identity {
                name,
                mobile,
                email,
                embedding: decode_embedding(&blob)?,
            })),
        }
    }

    /// Every enrolled identity, in name order.
    pub fn all_identities(&self) -> Result<Vec<Identity>, StoreError> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare("SELECT name, mobile, email, embedding FROM identities ORDER BY name")?;
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, Option<String>>(1)?,
                row.get::<_, Option<String>>(2)?,
                row.get::<_, Vec<u8>>(3)?,
            ))
        })?;

        let mut identities = Vec::new();
        for row in rows {
            let (name, mobile, email, blob) = row?;
            identities.push(Identity {
                name,
                mobile,
                email,
                embedding: decode_embedding(&blob)?,
            });
        }
        Ok(identities)
    }

    pub fn enrolled_count(&self) -> Result<i64, StoreError> {
        let conn = self.lock()?;
        Ok(conn.query_row("SELECT COUNT(*) FROM identities", [], |row| row.get(0))?)
    }
}

fn check_dimension(embedding: &Embedding) -> Result<(), StoreError> {
    if embedding.dim() != EMBEDDING_DIM {
        return Err(StoreError::EmbeddingDimension {
            len: embedding.dim(),
            expected: EMBEDDING_DIM,
        });
    }
    Ok(())
}

/// Embeddings are stored as little-endian f32 blobs.
fn encode_embedding(embedding: &Embedding) -> Vec<u8> {
    embedding
        .values
        .iter()
        .flat_map(|v| v.to_le_bytes())
        .collect()
}

fn decode_embedding(blob: &[u8]) -> Result<Embedding, StoreError> {
    let values: Vec<f32> = blob
        .chunks_exact(4)
        .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect();
    let embedding = Embedding { values };
    check_dimension(&embedding)?;
    Ok(embedding)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_embedding(seed: f32) -> Embedding {
        Embedding {
            values: (0..EMBEDDING_DIM).map(|i| seed + i as f32 * 0.001).collect(),
        }
    }

    fn test_identity(name: &str, seed: f32) -> Identity {
        Identity {
            name: name.into(),
            mobile: Some("555-0100".into()),
            email: None,
            embedding: test_embedding(seed),
        }
    }

    #[test]
    fn insert_then_read_back() {
        let store = Store::open_in_memory().unwrap();
        let alice = test_identity("alice", 0.1);
        store.insert_identity(&alice).unwrap();

        assert!(store.identity_exists("alice").unwrap());
        assert!(!store.identity_exists("bob").unwrap());
        assert_eq!(store.enrolled_count().unwrap(), 1);

        let stored = store.get_identity("alice").unwrap().unwrap();
        assert_eq!(stored.mobile.as_deref(), Some("555-0100"));
        assert_eq!(stored.embedding, alice.embedding);
        assert_eq!(stored.embedding.dim(), EMBEDDING_DIM);
    }

    #[test]
    fn insert_rejects_wrong_dimension() {
        let store = Store::open_in_memory().unwrap();
        let bad = Identity {
            name: "alice".into(),
            mobile: None,
            email: None,
            embedding: Embedding { values: vec![1.0, 2.0] },
        };
        let err = store.insert_identity(&bad).unwrap_err();
        assert!(matches!(err, StoreError::EmbeddingDimension { len: 2, .. }));
        assert_eq!(store.enrolled_count().unwrap(), 0);
    }

    #[test]
    fn update_embedding_preserves_contact_metadata() {
        let store = Store::open_in_memory().unwrap();
        store.insert_identity(&test_identity("alice", 0.1)).unwrap();

        let replaced = test_embedding(0.9);
        assert!(store.update_embedding("alice", &replaced).unwrap());

        let stored = store.get_identity("alice").unwrap().unwrap();
        assert_eq!(stored.embedding, replaced);
        assert_eq!(stored.mobile.as_deref(), Some("555-0100"));
    }

    #[test]
    fn update_embedding_missing_name_changes_nothing() {
        let store = Store::open_in_memory().unwrap();
        store.insert_identity(&test_identity("alice", 0.1)).unwrap();

        assert!(!store.update_embedding("ghost", &test_embedding(0.5)).unwrap());
        let stored = store.get_identity("alice").unwrap().unwrap();
        assert_eq!(stored.embedding, test_embedding(0.1));
    }

    #[test]
    fn all_identities_in_name_order() {
        let store = Store::open_in_memory().unwrap();
        store.insert_identity(&test_identity("zoe", 0.3)).unwrap();
        store.insert_identity(&test_identity("anna", 0.1)).unwrap();
        store.insert_identity(&test_identity("mira", 0.2)).unwrap();

        let names: Vec<String> = store
            .all_identities()
            .unwrap()
            .into_iter()
            .map(|i| i.name)
            .collect();
        assert_eq!(names, vec!["anna", "mira", "zoe"]);
    }

    #[test]
    fn embedding_blob_roundtrip() {
        let original = test_embedding(0.42);
        let decoded = decode_embedding(&encode_embedding(&original)).unwrap();
        assert_eq!(decoded, original);
    }
}
