//! Profile document store.
//!
//! Each account owns one JSON document in the `profiles` table. Writes use
//! document semantics: [`ProfileStore::set`] replaces, [`ProfileStore::merge`]
//! overlays the given fields and leaves every other field untouched.
//!
//! After every write the whole collection is re-read and published on a
//! `watch` channel. Subscribers always receive a full snapshot; there is no
//! incremental change feed. The channel starts at `None` until the first
//! snapshot has been loaded.

use std::sync::Arc;

use rusqlite::{params, OptionalExtension, TransactionBehavior};
use serde_json::{Map, Value};
use tokio::sync::watch;

use crate::state::DbPool;

pub type ProfileDocument = Map<String, Value>;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Pool error: {0}")]
    Pool(#[from] r2d2::Error),

    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Document {0} is not a JSON object")]
    Corrupt(String),
}

/// One document as it appears in a collection snapshot.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredDocument {
    pub id: String,
    pub data: ProfileDocument,
}

pub type Snapshot = Arc<Vec<StoredDocument>>;

#[derive(Clone)]
pub struct ProfileStore {
    pool: DbPool,
    snapshots: Arc<watch::Sender<Option<Snapshot>>>,
}

impl ProfileStore {
    pub fn new(pool: DbPool) -> Self {
        let (tx, _rx) = watch::channel(None);
        Self {
            pool,
            snapshots: Arc::new(tx),
        }
    }

    pub fn get(&self, uid: &str) -> Result<Option<ProfileDocument>, StoreError> {
        let conn = self.pool.get()?;
        let raw: Option<String> = conn
            .query_row(
                "SELECT doc FROM profiles WHERE uid = ?1",
                params![uid],
                |row| row.get(0),
            )
            .optional()?;

        raw.map(|json| parse_document(uid, &json)).transpose()
    }

    /// Replace the whole document.
    pub fn set(&self, uid: &str, doc: &ProfileDocument) -> Result<(), StoreError> {
        {
            let conn = self.pool.get()?;
            let json = serde_json::to_string(doc)?;
            conn.execute(
                "INSERT INTO profiles (uid, doc, updated_at) VALUES (?1, ?2, datetime('now'))
                 ON CONFLICT(uid) DO UPDATE SET
                   doc = excluded.doc,
                   updated_at = excluded.updated_at",
                params![uid, json],
            )?;
        }
        self.publish()
    }

    /// Overlay `fields` onto the stored document, creating it if missing.
    /// Returns the document as written.
    pub fn merge(&self, uid: &str, fields: ProfileDocument) -> Result<ProfileDocument, StoreError> {
        let merged = {
            let mut conn = self.pool.get()?;
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

            let existing: Option<String> = tx
                .query_row(
                    "SELECT doc FROM profiles WHERE uid = ?1",
                    params![uid],
                    |row| row.get(0),
                )
                .optional()?;

            let mut doc = match existing {
                Some(json) => parse_document(uid, &json)?,
                None => ProfileDocument::new(),
            };
            for (key, value) in fields {
                doc.insert(key, value);
            }

            tx.execute(
                "INSERT INTO profiles (uid, doc, updated_at) VALUES (?1, ?2, datetime('now'))
                 ON CONFLICT(uid) DO UPDATE SET
                   doc = excluded.doc,
                   updated_at = excluded.updated_at",
                params![uid, serde_json::to_string(&doc)?],
            )?;
            tx.commit()?;
            doc
        };

        self.publish()?;
        Ok(merged)
    }

    /// Returns whether a document existed.
    pub fn delete(&self, uid: &str) -> Result<bool, StoreError> {
        let rows = {
            let conn = self.pool.get()?;
            conn.execute("DELETE FROM profiles WHERE uid = ?1", params![uid])?
        };
        self.publish()?;
        Ok(rows > 0)
    }

    pub fn list(&self) -> Result<Vec<StoredDocument>, StoreError> {
        let conn = self.pool.get()?;
        let mut stmt = conn.prepare("SELECT uid, doc FROM profiles ORDER BY uid")?;
        let rows: Vec<(String, String)> = stmt
            .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
            .collect::<Result<_, _>>()?;

        let mut docs = Vec::with_capacity(rows.len());
        for (id, json) in rows {
            match parse_document(&id, &json) {
                Ok(data) => docs.push(StoredDocument { id, data }),
                Err(e) => tracing::warn!("Skipping unreadable profile document: {}", e),
            }
        }
        Ok(docs)
    }

    /// Re-read the collection and push it to every subscriber.
    pub fn publish(&self) -> Result<(), StoreError> {
        let docs = self.list()?;
        tracing::debug!(count = docs.len(), "Publishing profile snapshot");
        self.snapshots.send_replace(Some(Arc::new(docs)));
        Ok(())
    }

    /// Subscribe to the whole collection. The receiver sees `None` until the
    /// first snapshot has been published.
    pub fn subscribe(&self) -> watch::Receiver<Option<Snapshot>> {
        self.snapshots.subscribe()
    }

    /// Subscribe to a single document, derived from the collection feed.
    pub fn watch_document(&self, uid: impl Into<String>) -> DocumentSubscription {
        DocumentSubscription {
            uid: uid.into(),
            rx: self.subscribe(),
        }
    }
}

/// A live view of one document. Dropping it tears down the subscription.
pub struct DocumentSubscription {
    uid: String,
    rx: watch::Receiver<Option<Snapshot>>,
}

/// Latest known state of a watched document.
#[derive(Debug, Clone, PartialEq)]
pub enum DocumentState {
    Loading,
    Present(ProfileDocument),
    Absent,
}

impl DocumentSubscription {
    pub fn uid(&self) -> &str {
        &self.uid
    }

    pub fn current(&self) -> DocumentState {
        document_state(&self.rx.borrow(), &self.uid)
    }

    /// Wait for the next snapshot and return the document state within it.
    /// `None` once the store has been dropped.
    pub async fn changed(&mut self) -> Option<DocumentState> {
        self.rx.changed().await.ok()?;
        Some(self.current())
    }
}

fn document_state(snapshot: &Option<Snapshot>, uid: &str) -> DocumentState {
    match snapshot {
        None => DocumentState::Loading,
        Some(docs) => docs
            .iter()
            .find(|d| d.id == uid)
            .map(|d| DocumentState::Present(d.data.clone()))
            .unwrap_or(DocumentState::Absent),
    }
}

fn parse_document(uid: &str, json: &str) -> Result<ProfileDocument, StoreError> {
    match serde_json::from_str::<Value>(json)? {
        Value::Object(map) => Ok(map),
        _ => Err(StoreError::Corrupt(uid.to_string())),
    }
}
