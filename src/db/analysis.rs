use std::path::PathBuf;

use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AnalysisRepoError {
    #[error("analysis request not found")]
    NotFound,

    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

#[derive(Debug, Clone, Serialize)]
pub struct AnalysisRequestRecord {
    pub id: i64,
    pub image_url: String,
    pub created_at: String,
    pub raw_response: String,
    pub uploaded_file_ref: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MaterialRecord {
    pub id: i64,
    pub name: String,
}

/// One confirmed item to persist: the name plus the parsed material list.
/// Materials are deduplicated by exact string equality before linking.
#[derive(Debug, Clone)]
pub struct NewItem {
    pub name: String,
    pub materials: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ItemWithMaterials {
    pub id: i64,
    pub name: String,
    pub materials: Vec<String>,
}

/// SQLite-backed store for analysis requests, items and materials.
/// Connection-per-call; the schema is ensured on every open.
#[derive(Debug, Clone)]
pub struct AnalysisStore {
    db_path: PathBuf,
}

impl AnalysisStore {
    pub fn new(db_path: impl Into<PathBuf>) -> Self {
        Self {
            db_path: db_path.into(),
        }
    }

    pub fn initialize(&self) -> Result<(), AnalysisRepoError> {
        self.with_connection(|_| Ok(()))
    }

    fn with_connection<T, F>(&self, func: F) -> Result<T, AnalysisRepoError>
    where
        F: FnOnce(&Connection) -> Result<T, AnalysisRepoError>,
    {
        if let Some(parent) = self.db_path.parent() {
            let _ = std::fs::create_dir_all(parent);
        }
        let conn = Connection::open(self.db_path.as_path())?;
        conn.execute("PRAGMA foreign_keys = ON", [])?;
        ensure_schema(&conn)?;
        func(&conn)
    }

    fn with_connection_mut<T, F>(&self, func: F) -> Result<T, AnalysisRepoError>
    where
        F: FnOnce(&mut Connection) -> Result<T, AnalysisRepoError>,
    {
        if let Some(parent) = self.db_path.parent() {
            let _ = std::fs::create_dir_all(parent);
        }
        let mut conn = Connection::open(self.db_path.as_path())?;
        conn.execute("PRAGMA foreign_keys = ON", [])?;
        ensure_schema(&conn)?;
        func(&mut conn)
    }
}

impl AnalysisStore {
    pub fn create_request(
        &self,
        image_url: &str,
        raw_response: &str,
    ) -> Result<AnalysisRequestRecord, AnalysisRepoError> {
        self.with_connection(|conn| {
            let created_at = Utc::now().to_rfc3339();
            conn.execute(
                "INSERT INTO analysis_requests (image_url, created_at, raw_response)
                 VALUES (?1, ?2, ?3)",
                params![image_url, created_at, raw_response],
            )?;
            Ok(AnalysisRequestRecord {
                id: conn.last_insert_rowid(),
                image_url: image_url.to_string(),
                created_at,
                raw_response: raw_response.to_string(),
                uploaded_file_ref: None,
            })
        })
    }

    pub fn get_request(&self, id: i64) -> Result<AnalysisRequestRecord, AnalysisRepoError> {
        self.with_connection(|conn| {
            conn.query_row(
                "SELECT id, image_url, created_at, raw_response, uploaded_file_ref
                 FROM analysis_requests WHERE id = ?1",
                [id],
                |row| {
                    Ok(AnalysisRequestRecord {
                        id: row.get("id")?,
                        image_url: row.get("image_url")?,
                        created_at: row.get("created_at")?,
                        raw_response: row.get("raw_response")?,
                        uploaded_file_ref: row.get("uploaded_file_ref")?,
                    })
                },
            )
            .optional()?
            .ok_or(AnalysisRepoError::NotFound)
        })
    }

    /// Records the provider file reference. The guard clause makes the
    /// write first-wins: once set, the reference is never overwritten.
    /// Returns whether this call performed the write.
    pub fn set_uploaded_file_ref(
        &self,
        id: i64,
        file_ref: &str,
    ) -> Result<bool, AnalysisRepoError> {
        self.with_connection(|conn| {
            let updated = conn.execute(
                "UPDATE analysis_requests SET uploaded_file_ref = ?2
                 WHERE id = ?1 AND uploaded_file_ref IS NULL",
                params![id, file_ref],
            )?;
            Ok(updated > 0)
        })
    }

    /// Resolves a material row by exact name, creating it on first sight.
    /// Names are globally unique and matched case-sensitively.
    pub fn get_or_create_material(&self, name: &str) -> Result<MaterialRecord, AnalysisRepoError> {
        self.with_connection(|conn| get_or_create_material_in(conn, name))
    }

    /// Persists the confirmed items and their material links in one
    /// transaction. Material lists are deduplicated here; the caller keeps
    /// the raw lists for its response payload.
    pub fn add_confirmed_items(
        &self,
        request_id: i64,
        items: &[NewItem],
    ) -> Result<(), AnalysisRepoError> {
        self.with_connection_mut(|conn| {
            let tx = conn.transaction()?;

            let exists: Option<i64> = tx
                .query_row(
                    "SELECT id FROM analysis_requests WHERE id = ?1",
                    [request_id],
                    |row| row.get(0),
                )
                .optional()?;
            if exists.is_none() {
                return Err(AnalysisRepoError::NotFound);
            }

            for item in items {
                tx.execute(
                    "INSERT INTO items (analysis_request_id, name) VALUES (?1, ?2)",
                    params![request_id, item.name],
                )?;
                let item_id = tx.last_insert_rowid();

                let mut seen: Vec<&str> = Vec::with_capacity(item.materials.len());
                for material_name in &item.materials {
                    if seen.contains(&material_name.as_str()) {
                        continue;
                    }
                    seen.push(material_name.as_str());

                    let material = get_or_create_material_in(&tx, material_name.as_str())?;
                    tx.execute(
                        "INSERT OR IGNORE INTO item_materials (item_id, material_id)
                         VALUES (?1, ?2)",
                        params![item_id, material.id],
                    )?;
                }
            }

            tx.commit()?;
            Ok(())
        })
    }

    pub fn list_items(&self, request_id: i64) -> Result<Vec<ItemWithMaterials>, AnalysisRepoError> {
        self.with_connection(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, name FROM items WHERE analysis_request_id = ?1 ORDER BY id",
            )?;
            let mut rows = stmt.query([request_id])?;
            let mut out = Vec::new();
            while let Some(row) = rows.next()? {
                out.push(ItemWithMaterials {
                    id: row.get(0)?,
                    name: row.get(1)?,
                    materials: Vec::new(),
                });
            }

            let mut link_stmt = conn.prepare(
                "SELECT m.name FROM item_materials im
                 JOIN materials m ON m.id = im.material_id
                 WHERE im.item_id = ?1 ORDER BY m.id",
            )?;
            for item in &mut out {
                let mut links = link_stmt.query([item.id])?;
                while let Some(row) = links.next()? {
                    item.materials.push(row.get(0)?);
                }
            }
            Ok(out)
        })
    }

    pub fn count_materials(&self) -> Result<i64, AnalysisRepoError> {
        self.with_connection(|conn| {
            Ok(conn.query_row("SELECT COUNT(*) FROM materials", [], |row| row.get(0))?)
        })
    }
}

fn get_or_create_material_in(
    conn: &Connection,
    name: &str,
) -> Result<MaterialRecord, AnalysisRepoError> {
    conn.execute("INSERT OR IGNORE INTO materials (name) VALUES (?1)", [name])?;
    let id: i64 = conn.query_row("SELECT id FROM materials WHERE name = ?1", [name], |row| {
        row.get(0)
    })?;
    Ok(MaterialRecord {
        id,
        name: name.to_string(),
    })
}

fn ensure_schema(conn: &Connection) -> Result<(), AnalysisRepoError> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS analysis_requests (
          id INTEGER PRIMARY KEY AUTOINCREMENT,
          image_url TEXT NOT NULL,
          created_at TEXT NOT NULL,
          raw_response TEXT NOT NULL,
          uploaded_file_ref TEXT
        );

        CREATE TABLE IF NOT EXISTS items (
          id INTEGER PRIMARY KEY AUTOINCREMENT,
          analysis_request_id INTEGER NOT NULL,
          name TEXT NOT NULL,
          FOREIGN KEY(analysis_request_id) REFERENCES analysis_requests(id) ON DELETE CASCADE
        );

        CREATE TABLE IF NOT EXISTS materials (
          id INTEGER PRIMARY KEY AUTOINCREMENT,
          name TEXT NOT NULL UNIQUE
        );

        CREATE TABLE IF NOT EXISTS item_materials (
          item_id INTEGER NOT NULL,
          material_id INTEGER NOT NULL,
          PRIMARY KEY (item_id, material_id),
          FOREIGN KEY(item_id) REFERENCES items(id) ON DELETE CASCADE,
          FOREIGN KEY(material_id) REFERENCES materials(id) ON DELETE CASCADE
        );
        ",
    )?;
    Ok(())
}
