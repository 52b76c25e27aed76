//! SQLite persistence for index snapshots.
//!
//! A snapshot is written to a sibling temp file in one transaction and then
//! renamed over the previous file, so the file on disk is always a complete
//! snapshot.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use finrag_core::{AppError, AppResult};
use rusqlite::{params, Connection, OptionalExtension};

use crate::index::snapshot::{IndexSnapshot, IndexedChunk, SnapshotParts};
use crate::types::{Chunk, CoverageGap, DocumentMeta, DocumentRecord, Section};

const SCHEMA: &str = r#"
    CREATE TABLE meta (
        key TEXT PRIMARY KEY,
        value TEXT NOT NULL
    );

    CREATE TABLE documents (
        id TEXT PRIMARY KEY,
        meta TEXT NOT NULL,
        content_hash TEXT NOT NULL,
        origin TEXT NOT NULL,
        ingested_at TEXT NOT NULL,
        sections TEXT NOT NULL
    );

    CREATE TABLE chunks (
        id TEXT PRIMARY KEY,
        seq INTEGER NOT NULL,
        document_id TEXT NOT NULL REFERENCES documents(id) ON DELETE CASCADE,
        section_label TEXT NOT NULL,
        section_ordinal INTEGER NOT NULL,
        word_start INTEGER NOT NULL,
        word_end INTEGER NOT NULL,
        page_start INTEGER NOT NULL,
        page_end INTEGER NOT NULL,
        text TEXT NOT NULL,
        content_hash TEXT NOT NULL,
        embedding BLOB NOT NULL
    );

    CREATE INDEX idx_chunks_document ON chunks(document_id);

    CREATE TABLE coverage_gaps (
        chunk_id TEXT PRIMARY KEY,
        document_id TEXT NOT NULL,
        section TEXT NOT NULL,
        reason TEXT NOT NULL
    );
"#;

fn db_err(context: &str) -> impl Fn(rusqlite::Error) -> AppError + '_ {
    move |e| AppError::Index(format!("{}: {}", context, e))
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

/// Write `snapshot` to `path`, replacing any previous file.
pub fn save_snapshot(path: &Path, snapshot: &IndexSnapshot) -> AppResult<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let tmp = temp_path(path);
    if tmp.exists() {
        fs::remove_file(&tmp)?;
    }

    {
        let mut conn = Connection::open(&tmp).map_err(db_err("Failed to create index file"))?;
        conn.execute_batch(SCHEMA)
            .map_err(db_err("Failed to create tables"))?;

        let tx = conn
            .transaction()
            .map_err(db_err("Failed to start transaction"))?;

        let meta = [
            ("version", snapshot.version().to_string()),
            ("identity", serde_json::to_string(snapshot.identity())?),
            ("chunking", serde_json::to_string(&snapshot.chunking())?),
            (
                "built_at",
                snapshot.built_at().map(|t| t.to_rfc3339()).unwrap_or_default(),
            ),
        ];
        for (key, value) in &meta {
            tx.execute(
                "INSERT INTO meta (key, value) VALUES (?1, ?2)",
                params![key, value],
            )
            .map_err(db_err("Failed to write index metadata"))?;
        }

        for doc in snapshot.documents() {
            tx.execute(
                "INSERT INTO documents (id, meta, content_hash, origin, ingested_at, sections)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    doc.id(),
                    serde_json::to_string(&doc.meta)?,
                    doc.content_hash,
                    doc.origin,
                    doc.ingested_at.to_rfc3339(),
                    serde_json::to_string(&doc.sections)?,
                ],
            )
            .map_err(db_err("Failed to write document"))?;
        }

        {
            let mut stmt = tx
                .prepare(
                    "INSERT INTO chunks (id, seq, document_id, section_label, section_ordinal,
                         word_start, word_end, page_start, page_end, text, content_hash, embedding)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
                )
                .map_err(db_err("Failed to prepare chunk insert"))?;
            for record in snapshot.records() {
                let c = &record.chunk;
                stmt.execute(params![
                    c.id,
                    record.seq as i64,
                    c.document_id,
                    c.section_label,
                    c.section_ordinal as i64,
                    c.word_start as i64,
                    c.word_end as i64,
                    c.page_start,
                    c.page_end,
                    c.text,
                    c.content_hash,
                    embedding_to_bytes(&record.vector),
                ])
                .map_err(db_err("Failed to write chunk"))?;
            }
        }

        for gap in snapshot.gaps() {
            tx.execute(
                "INSERT OR REPLACE INTO coverage_gaps (chunk_id, document_id, section, reason)
                 VALUES (?1, ?2, ?3, ?4)",
                params![gap.chunk_id, gap.document_id, gap.section, gap.reason],
            )
            .map_err(db_err("Failed to write coverage gap"))?;
        }

        tx.commit().map_err(db_err("Failed to commit index"))?;
    }

    fs::rename(&tmp, path)?;
    tracing::debug!(
        path = %path.display(),
        snapshot.version = snapshot.version(),
        chunks = snapshot.len(),
        "Persisted index snapshot"
    );
    Ok(())
}

/// Read the snapshot stored at `path`; `None` when no index exists yet.
pub fn load_snapshot(path: &Path) -> AppResult<Option<IndexSnapshot>> {
    if !path.exists() {
        return Ok(None);
    }
    let conn = Connection::open(path).map_err(db_err("Failed to open index"))?;

    let version: u64 = read_meta(&conn, "version")?
        .parse()
        .map_err(|e| AppError::Index(format!("Corrupt index version: {}", e)))?;
    let identity = serde_json::from_str(&read_meta(&conn, "identity")?)?;
    let chunking = serde_json::from_str(&read_meta(&conn, "chunking")?)?;
    let built_at_raw = read_meta(&conn, "built_at")?;
    let built_at = if built_at_raw.is_empty() {
        None
    } else {
        Some(parse_timestamp(&built_at_raw)?)
    };

    let documents = {
        let mut stmt = conn
            .prepare("SELECT meta, content_hash, origin, ingested_at, sections FROM documents")
            .map_err(db_err("Failed to query documents"))?;
        let rows = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, String>(4)?,
                ))
            })
            .map_err(db_err("Failed to query documents"))?;

        let mut documents = Vec::new();
        for row in rows {
            let (meta, content_hash, origin, ingested_at, sections) =
                row.map_err(db_err("Failed to read document"))?;
            documents.push(DocumentRecord {
                meta: serde_json::from_str::<DocumentMeta>(&meta)?,
                content_hash,
                origin,
                ingested_at: parse_timestamp(&ingested_at)?,
                sections: serde_json::from_str::<Vec<Section>>(&sections)?,
            });
        }
        documents
    };

    let records = {
        let mut stmt = conn
            .prepare(
                "SELECT id, seq, document_id, section_label, section_ordinal, word_start,
                        word_end, page_start, page_end, text, content_hash, embedding
                 FROM chunks ORDER BY seq",
            )
            .map_err(db_err("Failed to query chunks"))?;
        let rows = stmt
            .query_map([], |row| {
                let chunk = Chunk {
                    id: row.get(0)?,
                    document_id: row.get(2)?,
                    section_label: row.get(3)?,
                    section_ordinal: row.get::<_, i64>(4)? as usize,
                    word_start: row.get::<_, i64>(5)? as usize,
                    word_end: row.get::<_, i64>(6)? as usize,
                    page_start: row.get(7)?,
                    page_end: row.get(8)?,
                    text: row.get(9)?,
                    content_hash: row.get(10)?,
                };
                Ok((row.get::<_, i64>(1)? as u64, chunk, row.get::<_, Vec<u8>>(11)?))
            })
            .map_err(db_err("Failed to query chunks"))?;

        let mut records = Vec::new();
        for row in rows {
            let (seq, chunk, bytes) = row.map_err(db_err("Failed to read chunk"))?;
            records.push(IndexedChunk {
                seq,
                chunk,
                vector: bytes_to_embedding(&bytes)?,
            });
        }
        records
    };

    let gaps = {
        let mut stmt = conn
            .prepare("SELECT chunk_id, document_id, section, reason FROM coverage_gaps")
            .map_err(db_err("Failed to query coverage gaps"))?;
        let rows = stmt
            .query_map([], |row| {
                Ok(CoverageGap {
                    chunk_id: row.get(0)?,
                    document_id: row.get(1)?,
                    section: row.get(2)?,
                    reason: row.get(3)?,
                })
            })
            .map_err(db_err("Failed to query coverage gaps"))?;
        rows.collect::<Result<Vec<_>, _>>()
            .map_err(db_err("Failed to read coverage gap"))?
    };

    tracing::debug!(
        path = %path.display(),
        snapshot.version = version,
        chunks = records.len(),
        "Loaded index snapshot"
    );

    Ok(Some(IndexSnapshot::from_parts(SnapshotParts {
        version,
        identity,
        chunking,
        built_at,
        documents,
        records,
        gaps,
    })))
}

fn read_meta(conn: &Connection, key: &str) -> AppResult<String> {
    conn.query_row("SELECT value FROM meta WHERE key = ?1", [key], |row| {
        row.get::<_, String>(0)
    })
    .optional()
    .map_err(db_err("Failed to read index metadata"))?
    .ok_or_else(|| AppError::Index(format!("Index metadata is missing '{}'", key)))
}

fn parse_timestamp(raw: &str) -> AppResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| AppError::Index(format!("Corrupt timestamp '{}': {}", raw, e)))
}

/// Convert embedding vector to little-endian bytes for storage.
fn embedding_to_bytes(embedding: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(embedding.len() * 4);
    for &value in embedding {
        bytes.extend_from_slice(&value.to_le_bytes());
    }
    bytes
}

/// Convert bytes back to embedding vector.
fn bytes_to_embedding(bytes: &[u8]) -> AppResult<Vec<f32>> {
    if bytes.len() % 4 != 0 {
        return Err(AppError::Index("Invalid embedding bytes length".to_string()));
    }
    Ok(bytes
        .chunks_exact(4)
        .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunker::ChunkingParams;
    use crate::embeddings::EmbeddingConfig;
    use crate::index::snapshot::SnapshotBuilder;
    use chrono::NaiveDate;
    use tempfile::TempDir;

    fn sample_snapshot() -> IndexSnapshot {
        let identity = EmbeddingConfig {
            dimensions: 3,
            ..EmbeddingConfig::default()
        }
        .identity();
        let chunking = ChunkingParams {
            chunk_size: 200,
            overlap: 50,
        };
        let date = NaiveDate::from_ymd_opt(2023, 11, 3).unwrap();
        let section = Section {
            label: "Item 1A. Risk Factors".to_string(),
            ordinal: 1,
            page_start: 2,
            page_end: 3,
            page_breaks: vec![5],
            text: "Risk one. Risk two.".to_string(),
        };

        let mut builder = SnapshotBuilder::empty(0, identity, chunking);
        builder.upsert_document(DocumentRecord {
            meta: DocumentMeta::new("AAPL", "10-K", date, "0000320193-23-000106")
                .with_company("Apple Inc."),
            content_hash: "abc".to_string(),
            origin: "filings/aapl/source.htm".to_string(),
            ingested_at: Utc::now(),
            sections: vec![section],
        });
        builder
            .upsert_record(
                Chunk {
                    id: "0000320193-23-000106:1:0".to_string(),
                    document_id: "0000320193-23-000106".to_string(),
                    section_label: "Item 1A. Risk Factors".to_string(),
                    section_ordinal: 1,
                    word_start: 0,
                    word_end: 4,
                    page_start: 2,
                    page_end: 3,
                    text: "Risk one. Risk two.".to_string(),
                    content_hash: "def".to_string(),
                },
                vec![0.25, -1.5, 3.0],
            )
            .unwrap();
        builder.add_gap(CoverageGap {
            chunk_id: "0000320193-23-000106:1:150".to_string(),
            document_id: "0000320193-23-000106".to_string(),
            section: "Item 1A. Risk Factors".to_string(),
            reason: "Upstream timeout".to_string(),
        });
        builder.finish()
    }

    #[test]
    fn test_save_and_load_snapshot() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("knowledge").join("index.sqlite");
        let snapshot = sample_snapshot();

        save_snapshot(&path, &snapshot).unwrap();
        assert!(!temp_path(&path).exists());

        let loaded = load_snapshot(&path).unwrap().unwrap();
        assert_eq!(loaded.version(), 1);
        assert_eq!(loaded.identity(), snapshot.identity());
        assert_eq!(loaded.chunking(), snapshot.chunking());
        assert_eq!(loaded.records(), snapshot.records());
        assert_eq!(loaded.gaps(), snapshot.gaps());
        let doc = loaded.document("0000320193-23-000106").unwrap();
        assert_eq!(doc.meta.company.as_deref(), Some("Apple Inc."));
        assert_eq!(doc.sections[0].page_breaks, vec![5]);
    }

    #[test]
    fn test_save_replaces_previous_file() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("index.sqlite");
        let snapshot = sample_snapshot();
        save_snapshot(&path, &snapshot).unwrap();

        let empty = IndexSnapshot::empty(snapshot.identity().clone(), snapshot.chunking());
        save_snapshot(&path, &empty).unwrap();

        let loaded = load_snapshot(&path).unwrap().unwrap();
        assert!(loaded.is_empty());
        assert_eq!(loaded.document_count(), 0);
    }

    #[test]
    fn test_missing_file_loads_nothing() {
        let temp = TempDir::new().unwrap();
        assert!(load_snapshot(&temp.path().join("none.sqlite")).unwrap().is_none());
    }

    #[test]
    fn test_embedding_bytes() {
        let embedding = vec![1.0f32, -0.5, 0.0];
        let bytes = embedding_to_bytes(&embedding);
        assert_eq!(bytes.len(), 12);
        assert_eq!(bytes_to_embedding(&bytes).unwrap(), embedding);
        assert!(bytes_to_embedding(&bytes[..5]).is_err());
    }
}
