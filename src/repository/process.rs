//! Tender process repository for SQLite persistence.

use std::collections::HashMap;
use std::path::Path;

use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use tracing::debug;

use super::{parse_datetime, parse_datetime_opt};
use crate::classify::Category;
use crate::error::Result;
use crate::models::ExtractedProcess;

/// Storage date format for publication dates.
const DATE_FORMAT: &str = "%Y-%m-%d";

/// Metadata key holding the last successful sync timestamp.
const LAST_SYNC_KEY: &str = "last_sync";

/// A persisted tender record.
#[derive(Debug, Clone)]
pub struct StoredProcess {
    pub id: i64,
    pub process_number: String,
    pub entity: String,
    pub description: String,
    pub process_type: String,
    pub status: String,
    pub published: Option<NaiveDate>,
    pub reference_value: Option<f64>,
    pub currency: String,
    pub detail_url: Option<String>,
    pub extracted_at: DateTime<Utc>,
    pub relevance: u32,
    pub category: Option<Category>,
    pub raw_fields: HashMap<String, String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// SQLite-backed store for extracted tender processes.
///
/// One repository connection serves one orchestration run at a time; batch
/// commits use the explicit `begin`/`commit`/`rollback` scope.
pub struct ProcessRepository {
    conn: Connection,
}

impl ProcessRepository {
    /// Open (and initialize) the store at the given path.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            let _ = std::fs::create_dir_all(parent);
        }
        let conn = Connection::open(path)?;
        let repo = Self { conn };
        repo.init_schema()?;
        Ok(repo)
    }

    /// Open an in-memory store (tests, dry runs).
    pub fn open_in_memory() -> Result<Self> {
        let repo = Self {
            conn: Connection::open_in_memory()?,
        };
        repo.init_schema()?;
        Ok(repo)
    }

    fn init_schema(&self) -> Result<()> {
        self.conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS procesos (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                numero_proceso TEXT NOT NULL UNIQUE,
                entidad TEXT NOT NULL DEFAULT '',
                objeto_contratacion TEXT NOT NULL DEFAULT '',
                tipo_proceso TEXT NOT NULL DEFAULT '',
                estado TEXT NOT NULL DEFAULT '',
                fecha_publicacion TEXT,
                valor_referencial REAL,
                moneda TEXT NOT NULL DEFAULT 'PEN',
                url_detalle TEXT,
                fecha_extraccion TEXT NOT NULL,
                relevancia INTEGER NOT NULL DEFAULT 0,
                categoria_proyecto TEXT,
                raw_fields TEXT NOT NULL DEFAULT '{}',
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_procesos_categoria
                ON procesos(categoria_proyecto);
            CREATE TABLE IF NOT EXISTS sync_meta (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            );",
        )?;
        Ok(())
    }

    /// Begin the batch-commit scope for one orchestration run.
    pub fn begin(&self) -> Result<()> {
        self.conn.execute_batch("BEGIN IMMEDIATE")?;
        Ok(())
    }

    pub fn commit(&self) -> Result<()> {
        self.conn.execute_batch("COMMIT")?;
        Ok(())
    }

    pub fn rollback(&self) -> Result<()> {
        self.conn.execute_batch("ROLLBACK")?;
        Ok(())
    }

    /// Whether an insert failed on the unique process-number constraint.
    pub fn is_unique_violation(err: &rusqlite::Error) -> bool {
        matches!(
            err,
            rusqlite::Error::SqliteFailure(e, _)
                if e.code == rusqlite::ErrorCode::ConstraintViolation
        )
    }

    /// Look up a record by its external process identifier (exact match).
    pub fn find_by_process_number(&self, process_number: &str) -> Result<Option<StoredProcess>> {
        let row = self
            .conn
            .query_row(
                "SELECT id, numero_proceso, entidad, objeto_contratacion, tipo_proceso,
                        estado, fecha_publicacion, valor_referencial, moneda, url_detalle,
                        fecha_extraccion, relevancia, categoria_proyecto, raw_fields,
                        created_at, updated_at
                 FROM procesos WHERE numero_proceso = ?1",
                params![process_number],
                Self::map_row,
            )
            .optional()?;
        Ok(row)
    }

    /// Insert a new record. Fails with a unique violation on duplicates.
    pub fn insert(&self, process: &ExtractedProcess) -> Result<i64> {
        let now = Utc::now().to_rfc3339();
        self.conn.execute(
            "INSERT INTO procesos (
                numero_proceso, entidad, objeto_contratacion, tipo_proceso, estado,
                fecha_publicacion, valor_referencial, moneda, url_detalle,
                fecha_extraccion, relevancia, categoria_proyecto, raw_fields,
                created_at, updated_at
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)",
            params![
                process.process_number,
                process.entity,
                process.description,
                process.process_type,
                process.status,
                process.published.map(|d| d.format(DATE_FORMAT).to_string()),
                process.reference_value,
                process.currency,
                process.detail_url,
                process.extracted_at.to_rfc3339(),
                process.relevance,
                process.category.map(|c| c.as_str()),
                serde_json::to_string(&process.raw_fields)
                    .unwrap_or_else(|_| "{}".to_string()),
                now,
                now,
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    /// Update a persisted record in place, only when one of the mutable
    /// fields (status, reference value, detail URL) actually changed.
    /// Any other field difference is deliberately ignored.
    pub fn update_if_changed(
        &self,
        existing: &StoredProcess,
        fresh: &ExtractedProcess,
    ) -> Result<bool> {
        let status_changed = !fresh.status.is_empty() && fresh.status != existing.status;
        let value_changed = fresh.reference_value.is_some()
            && fresh.reference_value != existing.reference_value;
        let url_changed =
            fresh.detail_url.is_some() && fresh.detail_url != existing.detail_url;

        if !(status_changed || value_changed || url_changed) {
            return Ok(false);
        }

        let status = if status_changed {
            &fresh.status
        } else {
            &existing.status
        };
        let value = if value_changed {
            fresh.reference_value
        } else {
            existing.reference_value
        };
        let url = if url_changed {
            fresh.detail_url.as_deref()
        } else {
            existing.detail_url.as_deref()
        };

        self.conn.execute(
            "UPDATE procesos
             SET estado = ?1, valor_referencial = ?2, url_detalle = ?3, updated_at = ?4
             WHERE id = ?5",
            params![status, value, url, Utc::now().to_rfc3339(), existing.id],
        )?;
        debug!(
            "updated process {} (status={}, value={}, url={})",
            existing.process_number, status_changed, value_changed, url_changed
        );
        Ok(true)
    }

    pub fn count(&self) -> Result<u64> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM procesos", [], |row| row.get(0))?;
        Ok(count as u64)
    }

    /// Record counts per category label, most populated first.
    pub fn category_counts(&self) -> Result<Vec<(String, u64)>> {
        let mut stmt = self.conn.prepare(
            "SELECT COALESCE(categoria_proyecto, 'Sin categoría'), COUNT(*)
             FROM procesos GROUP BY categoria_proyecto ORDER BY COUNT(*) DESC",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)? as u64))
        })?;
        let mut counts = Vec::new();
        for row in rows {
            counts.push(row?);
        }
        Ok(counts)
    }

    /// Most recently updated records, for stats output and assistant prompts.
    pub fn recent(&self, limit: usize) -> Result<Vec<StoredProcess>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, numero_proceso, entidad, objeto_contratacion, tipo_proceso,
                    estado, fecha_publicacion, valor_referencial, moneda, url_detalle,
                    fecha_extraccion, relevancia, categoria_proyecto, raw_fields,
                    created_at, updated_at
             FROM procesos ORDER BY updated_at DESC LIMIT ?1",
        )?;
        let rows = stmt.query_map(params![limit as i64], Self::map_row)?;
        let mut processes = Vec::new();
        for row in rows {
            processes.push(row?);
        }
        Ok(processes)
    }

    /// Timestamp of the last successful sync, if any run completed.
    pub fn last_sync(&self) -> Result<Option<DateTime<Utc>>> {
        let value: Option<String> = self
            .conn
            .query_row(
                "SELECT value FROM sync_meta WHERE key = ?1",
                params![LAST_SYNC_KEY],
                |row| row.get(0),
            )
            .optional()?;
        Ok(parse_datetime_opt(value))
    }

    /// Persist the last-sync timestamp. Called only on overall run success.
    pub fn set_last_sync(&self, timestamp: DateTime<Utc>) -> Result<()> {
        self.conn.execute(
            "INSERT INTO sync_meta (key, value) VALUES (?1, ?2)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            params![LAST_SYNC_KEY, timestamp.to_rfc3339()],
        )?;
        Ok(())
    }

    fn map_row(row: &Row<'_>) -> rusqlite::Result<StoredProcess> {
        let published: Option<String> = row.get(6)?;
        let category: Option<String> = row.get(12)?;
        let raw_fields: String = row.get(13)?;
        let extracted_at: String = row.get(10)?;
        let created_at: String = row.get(14)?;
        let updated_at: String = row.get(15)?;

        Ok(StoredProcess {
            id: row.get(0)?,
            process_number: row.get(1)?,
            entity: row.get(2)?,
            description: row.get(3)?,
            process_type: row.get(4)?,
            status: row.get(5)?,
            published: published
                .and_then(|d| NaiveDate::parse_from_str(&d, DATE_FORMAT).ok()),
            reference_value: row.get(7)?,
            currency: row.get(8)?,
            detail_url: row.get(9)?,
            extracted_at: parse_datetime(&extracted_at),
            relevance: row.get::<_, i64>(11)?.max(0) as u32,
            category: category.as_deref().and_then(Category::from_str),
            raw_fields: serde_json::from_str(&raw_fields).unwrap_or_default(),
            created_at: parse_datetime(&created_at),
            updated_at: parse_datetime(&updated_at),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ScrapeError;

    fn sample_process(number: &str) -> ExtractedProcess {
        let mut p = ExtractedProcess::new();
        p.process_number = number.to_string();
        p.entity = "Ministerio de Salud".to_string();
        p.description = "Desarrollo de sistema web".to_string();
        p.process_type = "Concurso Público".to_string();
        p.status = "Convocado".to_string();
        p.published = NaiveDate::from_ymd_opt(2024, 3, 15);
        p.reference_value = Some(125_000.5);
        p.detail_url = Some("/detalle?id=1".to_string());
        p.relevance = 3;
        p.category = Some(Category::SoftwareDevelopment);
        p.raw_fields.insert("Nomenclatura".into(), number.into());
        p
    }

    #[test]
    fn insert_and_find_round_trip() {
        let repo = ProcessRepository::open_in_memory().unwrap();
        repo.insert(&sample_process("SEL-1")).unwrap();

        let stored = repo.find_by_process_number("SEL-1").unwrap().unwrap();
        assert_eq!(stored.entity, "Ministerio de Salud");
        assert_eq!(stored.published, NaiveDate::from_ymd_opt(2024, 3, 15));
        assert_eq!(stored.reference_value, Some(125_000.5));
        assert_eq!(stored.category, Some(Category::SoftwareDevelopment));
        assert_eq!(stored.relevance, 3);
        assert_eq!(
            stored.raw_fields.get("Nomenclatura").map(String::as_str),
            Some("SEL-1")
        );
    }

    #[test]
    fn lookup_is_case_sensitive_exact_match() {
        let repo = ProcessRepository::open_in_memory().unwrap();
        repo.insert(&sample_process("SEL-1")).unwrap();
        assert!(repo.find_by_process_number("sel-1").unwrap().is_none());
        assert!(repo.find_by_process_number("SEL-1").unwrap().is_some());
    }

    #[test]
    fn duplicate_insert_is_a_unique_violation() {
        let repo = ProcessRepository::open_in_memory().unwrap();
        repo.insert(&sample_process("SEL-1")).unwrap();

        let err = repo.insert(&sample_process("SEL-1")).unwrap_err();
        match err {
            ScrapeError::Persistence(e) => assert!(ProcessRepository::is_unique_violation(&e)),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn unchanged_record_is_not_updated() {
        let repo = ProcessRepository::open_in_memory().unwrap();
        let p = sample_process("SEL-1");
        repo.insert(&p).unwrap();
        let stored = repo.find_by_process_number("SEL-1").unwrap().unwrap();

        assert!(!repo.update_if_changed(&stored, &p).unwrap());
    }

    #[test]
    fn status_change_triggers_update() {
        let repo = ProcessRepository::open_in_memory().unwrap();
        let p = sample_process("SEL-1");
        repo.insert(&p).unwrap();
        let stored = repo.find_by_process_number("SEL-1").unwrap().unwrap();

        let mut fresh = p.clone();
        fresh.status = "Adjudicado".to_string();
        assert!(repo.update_if_changed(&stored, &fresh).unwrap());

        let after = repo.find_by_process_number("SEL-1").unwrap().unwrap();
        assert_eq!(after.status, "Adjudicado");
    }

    #[test]
    fn entity_change_alone_is_ignored() {
        let repo = ProcessRepository::open_in_memory().unwrap();
        let p = sample_process("SEL-1");
        repo.insert(&p).unwrap();
        let stored = repo.find_by_process_number("SEL-1").unwrap().unwrap();

        let mut fresh = p.clone();
        fresh.entity = "Otra Entidad".to_string();
        assert!(!repo.update_if_changed(&stored, &fresh).unwrap());
    }

    #[test]
    fn last_sync_round_trip() {
        let repo = ProcessRepository::open_in_memory().unwrap();
        assert!(repo.last_sync().unwrap().is_none());

        let now = Utc::now();
        repo.set_last_sync(now).unwrap();
        let stored = repo.last_sync().unwrap().unwrap();
        assert_eq!(stored.to_rfc3339(), now.to_rfc3339());

        // Overwrites, not accumulates.
        repo.set_last_sync(now).unwrap();
        assert!(repo.last_sync().unwrap().is_some());
    }

    #[test]
    fn count_and_category_breakdown() {
        let repo = ProcessRepository::open_in_memory().unwrap();
        repo.insert(&sample_process("SEL-1")).unwrap();
        let mut other = sample_process("SEL-2");
        other.category = Some(Category::Database);
        repo.insert(&other).unwrap();

        assert_eq!(repo.count().unwrap(), 2);
        let counts = repo.category_counts().unwrap();
        assert_eq!(counts.len(), 2);
        assert_eq!(counts.iter().map(|(_, n)| n).sum::<u64>(), 2);
    }

    #[test]
    fn batch_scope_commits_and_rolls_back() {
        let dir = tempfile::tempdir().unwrap();
        let repo = ProcessRepository::open(&dir.path().join("t.db")).unwrap();

        repo.begin().unwrap();
        repo.insert(&sample_process("SEL-1")).unwrap();
        repo.rollback().unwrap();
        assert_eq!(repo.count().unwrap(), 0);

        repo.begin().unwrap();
        repo.insert(&sample_process("SEL-1")).unwrap();
        repo.commit().unwrap();
        assert_eq!(repo.count().unwrap(), 1);
    }
}
