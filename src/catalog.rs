//! SQLite-backed catalog of albums, images and displayed-marks.
//!
//! Every public operation runs in its own short transaction and never fails
//! outward: storage errors are logged and mapped to an empty value (`None`,
//! `0`, empty collection or `false`). Callers observe a degraded result and
//! decide whether to retry.

mod migrations;

use std::collections::BTreeSet;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use rand::Rng;
use rusqlite::{Connection, OptionalExtension, Row, params};
use tracing::{debug, error, info, warn};

use crate::error::Error;

pub use migrations::{CURRENT_SCHEMA_VERSION, LEGACY_SCHEMA_VERSION};

/// One cataloged image with its album context.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageRecord {
    pub id: i64,
    /// `directory_path` joined with `filename`, relative to `source_root`.
    pub relative_path: PathBuf,
    pub album_name: String,
    pub source_root: PathBuf,
}

impl ImageRecord {
    /// Absolute location on disk.
    pub fn absolute_path(&self) -> PathBuf {
        self.source_root.join(&self.relative_path)
    }
}

/// Which images a query considers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Pool {
    All,
    Undisplayed,
}

impl Pool {
    fn from_clause(self) -> &'static str {
        match self {
            Pool::All => {
                "FROM images i
                 JOIN albums a ON a.id = i.album_id
                 WHERE (?1 IS NULL OR a.name = ?1)"
            }
            Pool::Undisplayed => {
                "FROM images i
                 JOIN albums a ON a.id = i.album_id
                 LEFT JOIN displayed_images d ON d.image_id = i.id
                 WHERE d.id IS NULL AND (?1 IS NULL OR a.name = ?1)"
            }
        }
    }

    fn select_sql(self) -> String {
        format!(
            "SELECT i.id, a.directory_path, i.filename, a.name, a.source_root {}",
            self.from_clause()
        )
    }

    fn count_sql(self) -> String {
        format!("SELECT COUNT(*) {}", self.from_clause())
    }
}

fn record_from_row(row: &Row<'_>) -> rusqlite::Result<ImageRecord> {
    let directory: String = row.get(1)?;
    let filename: String = row.get(2)?;
    let source_root: String = row.get(4)?;
    Ok(ImageRecord {
        id: row.get(0)?,
        relative_path: Path::new(&directory).join(filename),
        album_name: row.get(3)?,
        source_root: PathBuf::from(source_root),
    })
}

/// Durable store for the catalog. Safe to share behind an `Arc`; calls are
/// serialized on one connection.
pub struct CatalogStore {
    conn: Mutex<Connection>,
    path: Option<PathBuf>,
}

impl CatalogStore {
    /// Open (or create) the catalog at `path`, creating tables and running
    /// migrations as needed.
    ///
    /// `legacy_root` fills `source_root` for rows migrated from the legacy
    /// single-root layout.
    ///
    /// # Errors
    /// Fails only if the database file cannot be opened or configured.
    /// Migration problems are logged and leave an empty catalog instead.
    pub fn open(path: impl AsRef<Path>, legacy_root: Option<&Path>) -> Result<Self, Error> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA foreign_keys = ON;",
        )?;
        let store = Self::initialize(conn, legacy_root, Some(path.to_path_buf()));
        info!(path = %path.display(), "catalog opened");
        Ok(store)
    }

    /// In-memory catalog, mostly for tests.
    ///
    /// # Errors
    /// Fails if SQLite cannot allocate the database.
    pub fn open_in_memory() -> Result<Self, Error> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        Ok(Self::initialize(conn, None, None))
    }

    fn initialize(mut conn: Connection, legacy_root: Option<&Path>, path: Option<PathBuf>) -> Self {
        let legacy_root = legacy_root
            .map(|p| p.to_string_lossy().into_owned())
            .unwrap_or_default();
        match migrations::bootstrap(&mut conn, &legacy_root) {
            Ok(version) => debug!(version, "catalog schema ready"),
            Err(err) => {
                warn!(error = %err, "catalog migration failed; starting from an empty catalog");
                if let Err(err) = migrations::rebuild_empty(&mut conn) {
                    error!(error = %err, "could not rebuild catalog tables");
                }
            }
        }
        Self {
            conn: Mutex::new(conn),
            path,
        }
    }

    /// Location of the database file, `None` for in-memory catalogs.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Insert the album keyed on `(name, source_root)` unless present; return its id.
    ///
    /// `None` means the store failed and dependent inserts must be skipped.
    pub fn upsert_album(&self, name: &str, directory_path: &str, source_root: &str) -> Option<i64> {
        let res = (|| {
            let mut conn = self.conn();
            let tx = conn.transaction()?;
            let id = upsert_album_in(&tx, name, directory_path, source_root)?;
            tx.commit()?;
            Ok::<_, Error>(id)
        })();
        degrade("upsert album", res, None, Some)
    }

    /// Insert the image keyed on `(filename, album_id)` unless present; return its id.
    pub fn upsert_image(&self, filename: &str, album_id: i64) -> Option<i64> {
        let res = (|| {
            let mut conn = self.conn();
            let tx = conn.transaction()?;
            let id = upsert_image_in(&tx, filename, album_id)?;
            tx.commit()?;
            Ok::<_, Error>(id)
        })();
        degrade("upsert image", res, None, Some)
    }

    /// Record that `image_id` has been shown, refreshing `displayed_at`.
    pub fn mark_displayed(&self, image_id: i64) -> bool {
        let res = self
            .conn()
            .execute(
                "INSERT OR REPLACE INTO displayed_images (image_id, displayed_at) VALUES (?1, ?2)",
                params![image_id, Utc::now()],
            )
            .map_err(Error::from);
        degrade("mark displayed", res, false, |_| {
            debug!(image_id, "marked displayed");
            true
        })
    }

    /// Forget every displayed-mark.
    pub fn clear_displayed_marks(&self) -> bool {
        let res = self
            .conn()
            .execute("DELETE FROM displayed_images", [])
            .map_err(Error::from);
        degrade("clear displayed marks", res, false, |removed| {
            info!(removed, "cleared displayed history");
            true
        })
    }

    pub fn list_all_images(&self, album: Option<&str>) -> Vec<ImageRecord> {
        degrade("list images", self.try_list(Pool::All, album), Vec::new(), |v| v)
    }

    pub fn list_undisplayed_images(&self, album: Option<&str>) -> Vec<ImageRecord> {
        degrade(
            "list undisplayed images",
            self.try_list(Pool::Undisplayed, album),
            Vec::new(),
            |v| v,
        )
    }

    pub fn count_all_images(&self, album: Option<&str>) -> u64 {
        degrade("count images", self.try_count(Pool::All, album), 0, |n| n)
    }

    pub fn count_undisplayed_images(&self, album: Option<&str>) -> u64 {
        degrade(
            "count undisplayed images",
            self.try_count(Pool::Undisplayed, album),
            0,
            |n| n,
        )
    }

    /// One uniformly random image matching `album`, displayed or not.
    pub fn sample_random_image<R: Rng>(
        &self,
        album: Option<&str>,
        rng: &mut R,
    ) -> Option<ImageRecord> {
        degrade("sample image", self.try_sample(Pool::All, album, rng), None, |r| r)
    }

    /// One uniformly random image matching `album` that has no displayed-mark.
    pub fn sample_random_undisplayed_image<R: Rng>(
        &self,
        album: Option<&str>,
        rng: &mut R,
    ) -> Option<ImageRecord> {
        degrade(
            "sample undisplayed image",
            self.try_sample(Pool::Undisplayed, album, rng),
            None,
            |r| r,
        )
    }

    /// Distinct album names across all roots.
    pub fn list_album_names(&self) -> BTreeSet<String> {
        let res = (|| {
            let conn = self.conn();
            let mut stmt = conn.prepare("SELECT DISTINCT name FROM albums")?;
            let names = stmt
                .query_map([], |row| row.get::<_, String>(0))?
                .collect::<rusqlite::Result<BTreeSet<_>>>()?;
            Ok::<_, Error>(names)
        })();
        degrade("list albums", res, BTreeSet::new(), |v| v)
    }

    /// Stored structural version, `0` if unknown.
    pub fn schema_version(&self) -> u32 {
        let res = migrations::read_version(&self.conn()).map_err(Error::from);
        degrade("read schema version", res, 0, |v| v.unwrap_or(0))
    }

    pub fn set_schema_version(&self, version: u32) -> bool {
        let res = migrations::write_version(&self.conn(), version).map_err(Error::from);
        degrade("write schema version", res, false, |()| true)
    }

    /// Time of the most recent displayed-mark, if any.
    pub fn last_displayed_at(&self) -> Option<DateTime<Utc>> {
        let res = self
            .conn()
            .query_row(
                "SELECT displayed_at FROM displayed_images ORDER BY displayed_at DESC LIMIT 1",
                [],
                |row| row.get::<_, DateTime<Utc>>(0),
            )
            .optional()
            .map_err(Error::from);
        degrade("read last displayed", res, None, |t| t)
    }

    fn try_list(&self, pool: Pool, album: Option<&str>) -> Result<Vec<ImageRecord>, Error> {
        let conn = self.conn();
        let mut stmt = conn.prepare(&format!("{} ORDER BY i.id", pool.select_sql()))?;
        let rows = stmt
            .query_map(params![album], record_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    fn try_count(&self, pool: Pool, album: Option<&str>) -> Result<u64, Error> {
        let n: i64 = self
            .conn()
            .query_row(&pool.count_sql(), params![album], |row| row.get(0))?;
        Ok(u64::try_from(n).unwrap_or(0))
    }

    /// Count the matches, then fetch the row at a random offset, both inside
    /// one read transaction so the offset stays in range.
    fn try_sample<R: Rng>(
        &self,
        pool: Pool,
        album: Option<&str>,
        rng: &mut R,
    ) -> Result<Option<ImageRecord>, Error> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;
        let count: i64 = tx.query_row(&pool.count_sql(), params![album], |row| row.get(0))?;
        if count <= 0 {
            return Ok(None);
        }
        let offset = rng.random_range(0..count);
        let record = tx
            .query_row(
                &format!("{} ORDER BY i.id LIMIT 1 OFFSET ?2", pool.select_sql()),
                params![album, offset],
                record_from_row,
            )
            .optional()?;
        tx.commit()?;
        Ok(record)
    }
}

impl fmt::Debug for CatalogStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CatalogStore")
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

/// Log a failed operation and substitute `fallback`, or map the success value.
fn degrade<T, U>(what: &str, res: Result<T, Error>, fallback: U, ok: impl FnOnce(T) -> U) -> U {
    match res {
        Ok(v) => ok(v),
        Err(err) => {
            error!(operation = what, error = %err, "catalog operation failed");
            fallback
        }
    }
}

pub(crate) fn upsert_album_in(
    conn: &Connection,
    name: &str,
    directory_path: &str,
    source_root: &str,
) -> rusqlite::Result<i64> {
    let existing = conn
        .query_row(
            "SELECT id, directory_path FROM albums WHERE name = ?1 AND source_root = ?2",
            params![name, source_root],
            |row| Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?)),
        )
        .optional()?;
    if let Some((id, stored_dir)) = existing {
        if stored_dir != directory_path {
            warn!(
                album = name,
                source_root,
                stored = %stored_dir,
                found = %directory_path,
                "album name already cataloged under another directory of this root"
            );
        }
        return Ok(id);
    }
    conn.execute(
        "INSERT INTO albums (name, directory_path, source_root) VALUES (?1, ?2, ?3)",
        params![name, directory_path, source_root],
    )?;
    let id = conn.last_insert_rowid();
    debug!(album = name, id, "added album");
    Ok(id)
}

pub(crate) fn upsert_image_in(
    conn: &Connection,
    filename: &str,
    album_id: i64,
) -> rusqlite::Result<i64> {
    let inserted = conn.execute(
        "INSERT OR IGNORE INTO images (filename, album_id) VALUES (?1, ?2)",
        params![filename, album_id],
    )?;
    if inserted > 0 {
        let id = conn.last_insert_rowid();
        debug!(filename, album_id, id, "added image");
        return Ok(id);
    }
    conn.query_row(
        "SELECT id FROM images WHERE filename = ?1 AND album_id = ?2",
        params![filename, album_id],
        |row| row.get(0),
    )
}
