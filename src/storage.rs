//! Persistent archive: a `Content` relation of immutable text blobs and a
//! `Bookmark` relation referencing them, both kept in one SQLite file.
//!
//! The archive is written by [`ArchiveWriter`] inside a single transaction
//! that is committed once at the end of an acquisition run, and read by
//! [`ArchiveReader`], which keeps every bookmark in memory and loads content
//! lazily through a small pool of read-only connections.

use std::{
    path::{Path, PathBuf},
    sync::Mutex,
};

use chrono::{DateTime, Local};
use rusqlite::{params, Connection, OpenFlags, OptionalExtension};

use crate::bookmarks::Bookmark;

#[derive(thiserror::Error, Debug)]
pub enum StoreError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("io error: {0}")]
    IO(#[from] std::io::Error),

    #[error("archive not found at {0}")]
    Missing(PathBuf),

    #[error("content {0} not found")]
    ContentNotFound(i64),

    #[error("store lock poisoned")]
    Poisoned,

    #[error("store task failed: {0}")]
    Task(String),
}

/// Append-only sink for rendered page text.
pub trait ContentStore: Send + Sync {
    /// Stores `text` as a new blob and returns its identifier. Identifiers
    /// are strictly increasing and never reused.
    fn save_contents(&self, text: &str) -> Result<i64, StoreError>;
}

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS Content (
    Id INTEGER PRIMARY KEY AUTOINCREMENT,
    Text TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS Bookmark (
    Id INTEGER PRIMARY KEY,
    Url TEXT NOT NULL,
    Title TEXT NOT NULL,
    Folder TEXT,
    DateAdded INTEGER NOT NULL,
    ContentId INTEGER REFERENCES Content (Id)
);
";

const BULK_LOAD_PRAGMAS: &str = "
PRAGMA synchronous = OFF;
PRAGMA temp_store = MEMORY;
PRAGMA cache_size = -65536;
";

fn query_contents(conn: &Connection, id: i64) -> Result<String, StoreError> {
    conn.prepare_cached("SELECT Text FROM Content WHERE Id = ?1")?
        .query_row(params![id], |row| row.get::<_, String>(0))
        .optional()?
        .ok_or(StoreError::ContentNotFound(id))
}

fn row_to_bookmark(row: &rusqlite::Row) -> rusqlite::Result<Bookmark> {
    let date_added: i64 = row.get(3)?;

    Ok(Bookmark {
        url: row.get(0)?,
        title: row.get(1)?,
        folder: row.get(2)?,
        date_added: DateTime::from_timestamp(date_added, 0).unwrap_or_default(),
        content_id: row.get(4)?,
    })
}

/// Write side of the archive. Opening it clears the previous run's data and
/// begins the run transaction; nothing becomes durable until [`commit`].
///
/// [`commit`]: ArchiveWriter::commit
pub struct ArchiveWriter {
    conn: Mutex<Connection>,
    path: PathBuf,
}

impl ArchiveWriter {
    pub fn create(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();
        let conn = Connection::open(&path)?;

        conn.execute_batch(SCHEMA)?;
        conn.execute_batch(BULK_LOAD_PRAGMAS)?;
        // the old rows go away inside the run transaction, so a crashed run
        // leaves the previous archive untouched
        conn.execute_batch(
            "BEGIN TRANSACTION;
             DELETE FROM Bookmark;
             DELETE FROM Content;",
        )?;

        log::info!("archive opened for writing at {}", path.display());

        Ok(Self {
            conn: Mutex::new(conn),
            path,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn save_bookmarks(&self, bookmarks: &[Bookmark]) -> Result<(), StoreError> {
        let conn = self.conn.lock().map_err(|_| StoreError::Poisoned)?;
        let mut stmt = conn.prepare_cached(
            "INSERT INTO Bookmark (Url, Title, Folder, DateAdded, ContentId)
             VALUES (?1, ?2, ?3, ?4, ?5)",
        )?;

        for bmark in bookmarks {
            stmt.execute(params![
                bmark.url,
                bmark.title,
                bmark.folder,
                bmark.date_added.timestamp(),
                bmark.content_id,
            ])?;
        }

        log::debug!("{} bookmarks written", bookmarks.len());
        Ok(())
    }

    /// Reads back a blob written during the current run.
    pub fn load_contents(&self, id: i64) -> Result<String, StoreError> {
        let conn = self.conn.lock().map_err(|_| StoreError::Poisoned)?;
        query_contents(&conn, id)
    }

    /// Commits the run transaction, then compacts the file.
    pub fn commit(&self) -> Result<(), StoreError> {
        let conn = self.conn.lock().map_err(|_| StoreError::Poisoned)?;
        conn.execute_batch("COMMIT; VACUUM; PRAGMA optimize;")?;

        log::info!("archive committed at {}", self.path.display());
        Ok(())
    }
}

impl ContentStore for ArchiveWriter {
    fn save_contents(&self, text: &str) -> Result<i64, StoreError> {
        let conn = self.conn.lock().map_err(|_| StoreError::Poisoned)?;
        conn.prepare_cached("INSERT INTO Content (Text) VALUES (?1)")?
            .execute(params![text])?;

        Ok(conn.last_insert_rowid())
    }
}

/// Read side of the archive.
pub struct ArchiveReader {
    path: PathBuf,
    pool: Mutex<Vec<Connection>>,
    bookmarks: Vec<Bookmark>,
    last_modified: Option<DateTime<Local>>,
}

impl ArchiveReader {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();
        if !path.exists() {
            return Err(StoreError::Missing(path));
        }

        let last_modified = std::fs::metadata(&path)?
            .modified()
            .ok()
            .map(DateTime::<Local>::from);

        let conn = Self::connect(&path)?;
        let bookmarks = {
            let mut stmt = conn.prepare(
                "SELECT Url, Title, Folder, DateAdded, ContentId
                 FROM Bookmark
                 ORDER BY DateAdded DESC, Id ASC",
            )?;
            let rows = stmt.query_map([], row_to_bookmark)?;
            rows.collect::<Result<Vec<_>, _>>()?
        };

        log::debug!("{} bookmarks loaded from {}", bookmarks.len(), path.display());

        Ok(Self {
            path,
            pool: Mutex::new(vec![conn]),
            bookmarks,
            last_modified,
        })
    }

    fn connect(path: &Path) -> Result<Connection, StoreError> {
        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;
        conn.execute_batch("PRAGMA cache_size = 5000;")?;
        Ok(conn)
    }

    pub fn bookmarks(&self) -> &[Bookmark] {
        &self.bookmarks
    }

    pub fn last_modified(&self) -> Option<DateTime<Local>> {
        self.last_modified
    }

    /// Safe to call from many threads at once: each call borrows its own
    /// connection from the pool, opening a new one when the pool is empty.
    pub fn load_contents(&self, id: i64) -> Result<String, StoreError> {
        let pooled = self.pool.lock().map_err(|_| StoreError::Poisoned)?.pop();
        let conn = match pooled {
            Some(conn) => conn,
            None => Self::connect(&self.path)?,
        };

        let result = query_contents(&conn, id);

        self.pool
            .lock()
            .map_err(|_| StoreError::Poisoned)?
            .push(conn);

        result
    }
}

