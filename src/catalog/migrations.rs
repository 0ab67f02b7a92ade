//! Schema bootstrap and versioned migrations.

use std::collections::HashMap;
use std::path::Path;

use rusqlite::{Connection, OptionalExtension, Transaction, params};
use tracing::{info, warn};

use super::{upsert_album_in, upsert_image_in};
use crate::albums::placement_for;
use crate::error::Error;

/// Layout with one combined relative `path` per image and root-less albums.
pub const LEGACY_SCHEMA_VERSION: u32 = 1;
/// Layout with `directory_path`/`filename` split and per-root albums.
pub const CURRENT_SCHEMA_VERSION: u32 = 2;

const CURRENT_SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS albums (
        id             INTEGER PRIMARY KEY,
        name           TEXT NOT NULL,
        directory_path TEXT NOT NULL DEFAULT '',
        source_root    TEXT NOT NULL,
        UNIQUE (name, source_root)
    );
    CREATE TABLE IF NOT EXISTS images (
        id       INTEGER PRIMARY KEY,
        filename TEXT NOT NULL,
        album_id INTEGER NOT NULL REFERENCES albums (id),
        UNIQUE (filename, album_id)
    );
    CREATE TABLE IF NOT EXISTS displayed_images (
        id           INTEGER PRIMARY KEY,
        image_id     INTEGER NOT NULL UNIQUE REFERENCES images (id),
        displayed_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP
    );
    CREATE INDEX IF NOT EXISTS idx_images_album_id ON images (album_id);
    CREATE INDEX IF NOT EXISTS idx_albums_name ON albums (name);
";

/// Upgrades one version to the next. Runs inside its own transaction.
struct Migration {
    from: u32,
    apply: fn(&Transaction<'_>, &str) -> rusqlite::Result<()>,
}

const MIGRATIONS: &[Migration] = &[Migration {
    from: LEGACY_SCHEMA_VERSION,
    apply: split_legacy_paths,
}];

/// Bring the database to [`CURRENT_SCHEMA_VERSION`] and return the final version.
pub(super) fn bootstrap(conn: &mut Connection, legacy_root: &str) -> Result<u32, Error> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_version (
            id      INTEGER PRIMARY KEY CHECK (id = 1),
            version INTEGER NOT NULL
        );",
    )?;

    let mut version = match read_version(conn)? {
        Some(v) => v,
        None => detect_version(conn)?,
    };

    if version == 0 {
        let tx = conn.transaction()?;
        tx.execute_batch(CURRENT_SCHEMA)?;
        write_version(&tx, CURRENT_SCHEMA_VERSION)?;
        tx.commit()?;
        info!(version = CURRENT_SCHEMA_VERSION, "created catalog schema");
        return Ok(CURRENT_SCHEMA_VERSION);
    }

    while version < CURRENT_SCHEMA_VERSION {
        let step = MIGRATIONS
            .iter()
            .find(|m| m.from == version)
            .ok_or(Error::UnknownSchemaVersion(version))?;
        let tx = conn.transaction()?;
        (step.apply)(&tx, legacy_root).map_err(|source| Error::Migration {
            from: version,
            source,
        })?;
        write_version(&tx, version + 1)?;
        tx.commit()?;
        info!(from = version, to = version + 1, "migrated catalog schema");
        version += 1;
    }

    if version > CURRENT_SCHEMA_VERSION {
        warn!(
            version,
            supported = CURRENT_SCHEMA_VERSION,
            "catalog was written by a newer schema; using it as-is"
        );
    }

    conn.execute_batch(CURRENT_SCHEMA)?;
    if read_version(conn)?.is_none() {
        write_version(conn, version)?;
    }
    Ok(version)
}

/// Drop every catalog table and recreate the current layout, empty.
pub(super) fn rebuild_empty(conn: &mut Connection) -> Result<(), Error> {
    let tx = conn.transaction()?;
    tx.execute_batch(
        "DROP TABLE IF EXISTS displayed_images;
         DROP TABLE IF EXISTS displayed_images_legacy;
         DROP TABLE IF EXISTS images;
         DROP TABLE IF EXISTS images_legacy;
         DROP TABLE IF EXISTS albums;
         DROP TABLE IF EXISTS albums_legacy;
         CREATE TABLE IF NOT EXISTS schema_version (
            id      INTEGER PRIMARY KEY CHECK (id = 1),
            version INTEGER NOT NULL
         );",
    )?;
    tx.execute_batch(CURRENT_SCHEMA)?;
    write_version(&tx, CURRENT_SCHEMA_VERSION)?;
    tx.commit()?;
    Ok(())
}

pub(super) fn read_version(conn: &Connection) -> rusqlite::Result<Option<u32>> {
    conn.query_row("SELECT version FROM schema_version WHERE id = 1", [], |row| {
        row.get(0)
    })
    .optional()
}

pub(super) fn write_version(conn: &Connection, version: u32) -> rusqlite::Result<()> {
    conn.execute(
        "INSERT INTO schema_version (id, version) VALUES (1, ?1)
         ON CONFLICT (id) DO UPDATE SET version = excluded.version",
        params![version],
    )?;
    Ok(())
}

fn table_columns(conn: &Connection, table: &str) -> rusqlite::Result<Vec<String>> {
    let mut stmt = conn.prepare(&format!("PRAGMA table_info({table})"))?;
    let columns = stmt
        .query_map([], |row| row.get::<_, String>(1))?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(columns)
}

fn table_exists(conn: &Connection, table: &str) -> rusqlite::Result<bool> {
    conn.query_row(
        "SELECT EXISTS (SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?1)",
        params![table],
        |row| row.get(0),
    )
}

/// Classify an unversioned database by the shape of its `images` table.
fn detect_version(conn: &Connection) -> rusqlite::Result<u32> {
    let columns = table_columns(conn, "images")?;
    let has = |name: &str| columns.iter().any(|c| c == name);
    let version = if columns.is_empty() {
        0
    } else if has("filename") {
        CURRENT_SCHEMA_VERSION
    } else {
        // Anything else is treated as legacy; an unexpected shape fails the
        // migration and falls back to an empty catalog.
        LEGACY_SCHEMA_VERSION
    };
    info!(version, "detected unversioned catalog");
    Ok(version)
}

/// v1 -> v2: split each legacy relative path into `directory_path`/`filename`,
/// re-derive albums with the deepest-directory rule, carry displayed-marks
/// across, then drop the legacy tables.
fn split_legacy_paths(tx: &Transaction<'_>, legacy_root: &str) -> rusqlite::Result<()> {
    let had_marks = table_exists(tx, "displayed_images")?;
    if had_marks {
        tx.execute_batch("ALTER TABLE displayed_images RENAME TO displayed_images_legacy;")?;
    }
    tx.execute_batch(
        "ALTER TABLE images RENAME TO images_legacy;
         ALTER TABLE albums RENAME TO albums_legacy;",
    )?;
    tx.execute_batch(CURRENT_SCHEMA)?;

    let legacy: Vec<(i64, String)> = {
        let mut stmt = tx.prepare("SELECT id, path FROM images_legacy ORDER BY id")?;
        let rows = stmt
            .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
            .collect::<rusqlite::Result<_>>()?;
        rows
    };

    let mut remap: HashMap<i64, i64> = HashMap::with_capacity(legacy.len());
    for (old_id, path) in legacy {
        let Some(placement) = placement_for(Path::new(&path)) else {
            warn!(path = %path, "legacy image has no file name; dropping");
            continue;
        };
        let album_id = upsert_album_in(
            tx,
            &placement.album,
            &placement.directory_path,
            legacy_root,
        )?;
        let image_id = upsert_image_in(tx, &placement.filename, album_id)?;
        remap.insert(old_id, image_id);
    }

    let mut carried = 0usize;
    if had_marks {
        let marks: Vec<(i64, Option<String>)> = {
            let mut stmt =
                tx.prepare("SELECT image_id, displayed_at FROM displayed_images_legacy")?;
            let rows = stmt
                .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
                .collect::<rusqlite::Result<_>>()?;
            rows
        };
        for (old_id, displayed_at) in marks {
            let Some(new_id) = remap.get(&old_id) else {
                continue;
            };
            carried += tx.execute(
                "INSERT OR REPLACE INTO displayed_images (image_id, displayed_at)
                 VALUES (?1, COALESCE(?2, CURRENT_TIMESTAMP))",
                params![new_id, displayed_at],
            )?;
        }
    }

    tx.execute_batch(
        "DROP TABLE IF EXISTS displayed_images_legacy;
         DROP TABLE images_legacy;
         DROP TABLE albums_legacy;",
    )?;
    info!(
        images = remap.len(),
        marks = carried,
        "converted legacy catalog rows"
    );
    Ok(())
}
