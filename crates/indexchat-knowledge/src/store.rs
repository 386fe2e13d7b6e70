//! Read-only access to the chunk store written by the ingestion pipeline.
//!
//! Layout:
//! - `documents`: one row per chunk, embedding stored as a codec blob
//! - `vss_text` / `vss_image` / `vss_audio`: optional sqlite-vss tables whose
//!   `rowid` is `documents.id`

use indexchat_core::config::IndexConfig;
use indexchat_core::error::{IndexChatError, Result};
use indexchat_core::types::{Chunk, Modality, SearchResult};
use rusqlite::{Connection, LoadExtensionGuard, OpenFlags, OptionalExtension, params};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::codec;
use crate::similarity::l2_squared_to_similarity;

/// Schema the ingestion pipeline writes. The core never executes it outside
/// of tests; it documents the contract.
pub const SCHEMA_SQL: &str = "
CREATE TABLE IF NOT EXISTS documents (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    file_name TEXT NOT NULL,
    content_type TEXT NOT NULL,
    chunk_text TEXT NOT NULL,
    embedding BLOB NOT NULL,
    embedding_dimensions INTEGER NOT NULL,
    metadata TEXT
);
";

/// Name of the sqlite-vss table for a modality.
pub fn vss_table(modality: Modality) -> &'static str {
    match modality {
        Modality::Text => "vss_text",
        Modality::Image => "vss_image",
        Modality::Audio => "vss_audio",
    }
}

fn index_err(e: rusqlite::Error) -> IndexChatError {
    IndexChatError::Index(e.to_string())
}

/// Handle to the on-disk store. Cheap to clone; holds no open connection.
#[derive(Debug, Clone)]
pub struct ChunkStore {
    path: PathBuf,
    vss_extensions: Vec<PathBuf>,
}

impl ChunkStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            vss_extensions: vec![],
        }
    }

    /// Shared libraries to load on every connection, in order.
    pub fn with_vss_extensions(mut self, extensions: Vec<PathBuf>) -> Self {
        self.vss_extensions = extensions;
        self
    }

    pub fn from_config(config: &IndexConfig) -> Self {
        Self::new(config.db_path()).with_vss_extensions(config.vss_extension_paths())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.is_file()
    }

    /// Chunk counts per modality; empty when nothing has been indexed yet.
    pub fn stats(&self) -> Result<Vec<(Modality, usize)>> {
        match self.open_read_only()? {
            Some(conn) => conn.stats(),
            None => Ok(Vec::new()),
        }
    }

    /// Open a read-only connection, or `None` if nothing has been indexed yet.
    ///
    /// The connection closes when the returned value is dropped.
    pub fn open_read_only(&self) -> Result<Option<StoreConnection>> {
        if !self.exists() {
            tracing::debug!("Chunk store {} does not exist yet", self.path.display());
            return Ok(None);
        }

        let conn = Connection::open_with_flags(
            &self.path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )
        .map_err(index_err)?;
        // The ingestion process may be writing concurrently.
        conn.busy_timeout(Duration::from_secs(5)).map_err(index_err)?;

        let vss_loaded = load_extensions(&conn, &self.vss_extensions);
        Ok(Some(StoreConnection { conn, vss_loaded }))
    }
}

/// Load every configured extension. Returns `true` only if all of them loaded.
fn load_extensions(conn: &Connection, extensions: &[PathBuf]) -> bool {
    if extensions.is_empty() {
        return false;
    }

    // SAFETY: the libraries come from the operator's own config, and the guard
    // disables extension loading again when it is dropped.
    let result = unsafe {
        LoadExtensionGuard::new(conn).and_then(|_guard| {
            for ext in extensions {
                conn.load_extension(ext, None)?;
            }
            Ok(())
        })
    };

    match result {
        Ok(()) => true,
        Err(e) => {
            tracing::warn!("sqlite-vss extension not loaded, using exact search: {e}");
            false
        }
    }
}

/// A stored row before its embedding is decoded.
#[derive(Debug, Clone)]
pub struct StoredChunk {
    pub id: i64,
    pub file_name: String,
    pub modality: Modality,
    pub payload_text: String,
    pub embedding: Vec<u8>,
    pub metadata: Option<String>,
}

impl StoredChunk {
    /// Decode the embedding, enforcing the modality's configured dimension.
    pub fn decode(self, dimensions: usize) -> Result<Chunk> {
        let embedding = codec::deserialize_with_dimension(&self.embedding, dimensions)?;
        Ok(Chunk {
            id: self.id,
            file_name: self.file_name,
            modality: self.modality,
            payload_text: self.payload_text,
            embedding,
            metadata: self.metadata,
        })
    }
}

/// A scoped read-only connection to the store.
pub struct StoreConnection {
    conn: Connection,
    vss_loaded: bool,
}

impl StoreConnection {
    pub fn vss_loaded(&self) -> bool {
        self.vss_loaded
    }

    pub fn has_table(&self, name: &str) -> Result<bool> {
        self.conn
            .query_row(
                "SELECT 1 FROM sqlite_master WHERE name = ?1 AND type IN ('table', 'view')",
                params![name],
                |_| Ok(()),
            )
            .optional()
            .map(|found| found.is_some())
            .map_err(index_err)
    }

    /// Every chunk of one modality, in ascending id order.
    pub fn chunks(&self, modality: Modality) -> Result<Vec<StoredChunk>> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT id, file_name, chunk_text, embedding, metadata
                 FROM documents
                 WHERE content_type = ?1
                 ORDER BY id ASC",
            )
            .map_err(index_err)?;

        let rows = stmt
            .query_map(params![modality.as_str()], |row| {
                Ok(StoredChunk {
                    id: row.get(0)?,
                    file_name: row.get(1)?,
                    modality,
                    payload_text: row.get(2)?,
                    embedding: row.get(3)?,
                    metadata: row.get(4)?,
                })
            })
            .map_err(index_err)?;

        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(index_err)
    }

    /// Nearest neighbours from the modality's sqlite-vss table.
    ///
    /// Scores are converted from squared L2 distance to "higher is better".
    pub fn vss_search(
        &self,
        modality: Modality,
        query: &[f32],
        top_k: usize,
    ) -> Result<Vec<SearchResult>> {
        let sql = format!(
            "SELECT d.id, d.file_name, d.chunk_text, d.metadata, v.distance
             FROM (SELECT rowid, distance FROM {table}
                   WHERE vss_search(embedding, ?1)
                   LIMIT ?2) v
             JOIN documents d ON d.id = v.rowid
             WHERE d.content_type = ?3",
            table = vss_table(modality)
        );
        let mut stmt = self.conn.prepare(&sql).map_err(index_err)?;

        let blob = codec::serialize_embedding(query);
        let limit = i64::try_from(top_k).unwrap_or(i64::MAX);
        let rows = stmt
            .query_map(params![blob, limit, modality.as_str()], |row| {
                let distance: f64 = row.get(4)?;
                Ok(SearchResult {
                    chunk_id: row.get(0)?,
                    file_name: row.get(1)?,
                    modality,
                    payload_text: row.get(2)?,
                    metadata: row.get(3)?,
                    rank_score: l2_squared_to_similarity(distance as f32),
                })
            })
            .map_err(index_err)?;

        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(index_err)
    }

    /// Chunk counts per modality.
    pub fn stats(&self) -> Result<Vec<(Modality, usize)>> {
        let mut stmt = self
            .conn
            .prepare("SELECT content_type, COUNT(*) FROM documents GROUP BY content_type")
            .map_err(index_err)?;
        let rows = stmt
            .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?)))
            .map_err(index_err)?;

        let mut counts = Vec::new();
        for row in rows {
            let (content_type, count) = row.map_err(index_err)?;
            if let Some(m) = Modality::parse(&content_type) {
                counts.push((m, count.max(0) as usize));
            }
        }
        counts.sort_by_key(|(m, _)| Modality::ALL.iter().position(|x| x == m));
        Ok(counts)
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    //! Writes stores the way the ingestion pipeline does.

    use super::*;

    pub struct Fixture {
        pub dir: tempfile::TempDir,
        pub store: ChunkStore,
    }

    impl Fixture {
        pub fn new() -> Self {
            let dir = tempfile::tempdir().unwrap();
            let path = dir.path().join("database.sqlite");
            let conn = Connection::open(&path).unwrap();
            conn.execute_batch(SCHEMA_SQL).unwrap();
            Self {
                store: ChunkStore::new(path),
                dir,
            }
        }

        pub fn insert(&self, id: i64, file_name: &str, modality: Modality, text: &str, embedding: &[f32]) {
            self.insert_raw(id, file_name, modality, text, &codec::serialize_embedding(embedding), None);
        }

        pub fn insert_raw(
            &self,
            id: i64,
            file_name: &str,
            modality: Modality,
            text: &str,
            blob: &[u8],
            metadata: Option<&str>,
        ) {
            let conn = Connection::open(self.store.path()).unwrap();
            conn.execute(
                "INSERT INTO documents (id, file_name, content_type, chunk_text, embedding, embedding_dimensions, metadata)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![id, file_name, modality.as_str(), text, blob, (blob.len() / 4) as i64, metadata],
            )
            .unwrap();
        }
    }
}
