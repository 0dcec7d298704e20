use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};

use crate::config::StorageOptions;

pub mod feed;
mod schema;

pub use feed::{SnapshotFeed, Subscription};

/// Full contents of the store, ascending by id (insertion order).
pub type EntryList = Vec<Entry>;

/// One journal record as read back from the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entry {
    pub id: i64,
    /// `dd.MM.yyyy`, stored verbatim and never validated.
    pub date: String,
    pub time: String,
    pub mood_label: String,
    pub description: String,
}

/// Insert payload; the store assigns the id.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NewEntry {
    pub date: String,
    pub time: String,
    pub mood_label: String,
    pub description: String,
}

impl NewEntry {
    pub fn new(
        date: impl Into<String>,
        time: impl Into<String>,
        mood_label: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            date: date.into(),
            time: time.into(),
            mood_label: mood_label.into(),
            description: description.into(),
        }
    }

    pub fn with_id(self, id: i64) -> Entry {
        Entry {
            id,
            date: self.date,
            time: self.time,
            mood_label: self.mood_label,
            description: self.description,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutationOutcome {
    Applied,
    /// No entry carried the requested id; nothing changed.
    NotFound,
}

impl MutationOutcome {
    pub fn is_applied(self) -> bool {
        self == MutationOutcome::Applied
    }

    fn from_affected(rows: usize) -> Self {
        if rows == 0 {
            MutationOutcome::NotFound
        } else {
            MutationOutcome::Applied
        }
    }
}

/// Durable entry collection. Every successful mutation publishes the full
/// list on the store's feed.
#[derive(Clone)]
pub struct EntryStore {
    db_path: Arc<PathBuf>,
    options: Arc<StorageOptions>,
    feed: SnapshotFeed<EntryList>,
}

impl EntryStore {
    pub fn connect(&self) -> Result<Connection> {
        let conn = Connection::open(&*self.db_path)
            .with_context(|| format!("opening database {}", self.db_path.display()))?;
        prepare_connection(&conn, &self.options)?;
        Ok(conn)
    }

    pub fn with_connection<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T>,
    {
        let conn = self.connect()?;
        f(&conn)
    }

    pub fn database_path(&self) -> &Path {
        &self.db_path
    }

    pub fn feed(&self) -> SnapshotFeed<EntryList> {
        self.feed.clone()
    }

    pub fn observe(&self) -> Subscription<EntryList> {
        self.feed.subscribe()
    }

    pub fn fetch_all(&self) -> Result<EntryList> {
        self.with_connection(fetch_all_entries)
    }

    pub fn fetch_by_id(&self, id: i64) -> Result<Option<Entry>> {
        self.with_connection(|conn| {
            conn.query_row(
                "SELECT id, date, time, mood, description FROM mood_entries WHERE id = ?1",
                params![id],
                entry_from_row,
            )
            .optional()
            .with_context(|| format!("fetching entry {id}"))
        })
    }

    pub fn insert(&self, entry: &NewEntry) -> Result<i64> {
        let id = self.with_connection(|conn| {
            conn.execute(
                "INSERT INTO mood_entries (date, time, mood, description)
                 VALUES (?1, ?2, ?3, ?4)",
                params![entry.date, entry.time, entry.mood_label, entry.description],
            )
            .context("inserting entry")?;
            Ok(conn.last_insert_rowid())
        })?;
        self.publish_snapshot();
        Ok(id)
    }

    /// Replaces every field of the entry carrying `entry.id`.
    pub fn update(&self, entry: &Entry) -> Result<MutationOutcome> {
        let outcome = self.with_connection(|conn| {
            let updated = conn
                .execute(
                    "UPDATE mood_entries
                     SET date = ?1, time = ?2, mood = ?3, description = ?4
                     WHERE id = ?5",
                    params![
                        entry.date,
                        entry.time,
                        entry.mood_label,
                        entry.description,
                        entry.id
                    ],
                )
                .with_context(|| format!("updating entry {}", entry.id))?;
            Ok(MutationOutcome::from_affected(updated))
        })?;
        if outcome.is_applied() {
            self.publish_snapshot();
        }
        Ok(outcome)
    }

    pub fn delete(&self, id: i64) -> Result<MutationOutcome> {
        let outcome = self.with_connection(|conn| {
            let deleted = conn
                .execute("DELETE FROM mood_entries WHERE id = ?1", params![id])
                .with_context(|| format!("deleting entry {id}"))?;
            Ok(MutationOutcome::from_affected(deleted))
        })?;
        if outcome.is_applied() {
            self.publish_snapshot();
        }
        Ok(outcome)
    }

    /// Runs after the mutation has committed, so a failed re-read must not
    /// turn the mutation into an error. Subscribers catch up on the next
    /// successful publish.
    fn publish_snapshot(&self) {
        match self.fetch_all() {
            Ok(entries) => {
                let count = entries.len();
                let version = self.feed.publish(entries);
                tracing::debug!(version, count, "published entry snapshot");
            }
            Err(err) => {
                tracing::error!(error = %format!("{err:#}"), "committed change left unpublished");
            }
        }
    }
}

fn fetch_all_entries(conn: &Connection) -> Result<EntryList> {
    let mut stmt = conn.prepare(
        "SELECT id, date, time, mood, description
         FROM mood_entries
         ORDER BY id ASC",
    )?;
    let entries = stmt
        .query_map([], entry_from_row)?
        .collect::<std::result::Result<Vec<_>, _>>()
        .context("querying entries")?;
    Ok(entries)
}

fn entry_from_row(row: &Row<'_>) -> rusqlite::Result<Entry> {
    Ok(Entry {
        id: row.get(0)?,
        date: row.get(1)?,
        time: row.get(2)?,
        mood_label: row.get(3)?,
        description: row.get(4)?,
    })
}

pub fn init(storage: &StorageOptions) -> Result<EntryStore> {
    let db_path = &storage.database_path;
    if let Some(parent) = db_path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("creating data directory {}", parent.display()))?;
    }
    let conn = Connection::open(db_path)
        .with_context(|| format!("opening database {}", db_path.display()))?;
    prepare_connection(&conn, storage)?;
    schema::apply(&conn)?;
    let entries = fetch_all_entries(&conn)?;
    tracing::info!(
        path = %db_path.display(),
        entries = entries.len(),
        "opened entry store"
    );
    Ok(EntryStore {
        db_path: Arc::new(db_path.clone()),
        options: Arc::new(storage.clone()),
        feed: SnapshotFeed::new(entries),
    })
}

fn prepare_connection(conn: &Connection, storage: &StorageOptions) -> Result<()> {
    conn.pragma_update(None, "journal_mode", "WAL")
        .context("setting journal_mode=WAL")?;
    conn.pragma_update(None, "synchronous", "NORMAL")
        .context("setting synchronous=NORMAL")?;
    conn.pragma_update(
        None,
        "wal_autocheckpoint",
        storage.wal_autocheckpoint.to_string(),
    )
    .context("setting wal_autocheckpoint")?;
    Ok(())
}
