//! Attribution lookup in tile files.
//!
//! MBTiles files are SQLite databases with a `metadata(name, value)` table.
//! The reconciler only ever needs the `attribution` row.

use crate::error::MetadataError;
use rusqlite::types::ValueRef;
use rusqlite::{Connection, OpenFlags, OptionalExtension};
use std::path::Path;

/// Reads the attribution string of a tile file.
///
/// `Ok(None)` means the file is readable but carries no attribution; an
/// `Err` means the file itself could not be read and should be skipped.
pub trait AttributionReader: Send + Sync + 'static {
    fn read_attribution(&self, path: &Path) -> Result<Option<String>, MetadataError>;
}

/// Reader for MBTiles (SQLite) files.
#[derive(Debug, Clone, Copy, Default)]
pub struct MbtilesReader;

impl MbtilesReader {
    pub fn new() -> Self {
        Self
    }

    fn open(path: &Path) -> Result<Connection, MetadataError> {
        // Read-only and no mutex: the connection lives for one lookup on one thread
        Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )
        .map_err(|source| MetadataError::Open {
            path: path.to_path_buf(),
            source,
        })
    }
}

impl AttributionReader for MbtilesReader {
    fn read_attribution(&self, path: &Path) -> Result<Option<String>, MetadataError> {
        let conn = Self::open(path)?;
        let query_err = |source: rusqlite::Error| MetadataError::Query {
            path: path.to_path_buf(),
            source,
        };

        // Also the first statement to touch the file, so non-SQLite files fail here
        let has_metadata: bool = conn
            .query_row(
                "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type IN ('table', 'view') AND name = 'metadata')",
                [],
                |row| row.get(0),
            )
            .map_err(query_err)?;
        if !has_metadata {
            return Ok(None);
        }

        let attribution: Option<Option<String>> = conn
            .query_row(
                "SELECT value FROM metadata WHERE name = 'attribution' LIMIT 1",
                [],
                |row| {
                    // Non-text values count as no attribution
                    Ok(match row.get_ref(0)? {
                        ValueRef::Text(text) => Some(String::from_utf8_lossy(text).into_owned()),
                        _ => None,
                    })
                },
            )
            .optional()
            .map_err(query_err)?;

        Ok(attribution
            .flatten()
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty()))
    }
}
