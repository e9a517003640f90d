use anyhow::{anyhow, Result};
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};

use crate::aggregate::LabelCounts;
use crate::{now_s, open_db_connection};

/// Largest page size a history listing accepts.
pub const MAX_PAGE_LIMIT: u32 = 100;

/// Scalar fields of a finalized analysis, ready to persist.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NewAnalysis {
    pub image_filename: String,
    pub processed_image_filename: String,
    pub person_count: u32,
    pub label_counts: LabelCounts,
    pub summary: String,
}

/// A stored analysis with its assigned id and timestamp.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisRecord {
    pub id: i64,
    pub image_filename: String,
    pub processed_image_filename: String,
    /// Seconds since the Unix epoch, UTC.
    pub timestamp: i64,
    pub person_count: u32,
    pub label_counts: LabelCounts,
    pub summary: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryPage {
    pub records: Vec<AnalysisRecord>,
    pub page: u32,
    pub limit: u32,
    pub total: u64,
    pub total_pages: u64,
}

pub trait AnalysisStore {
    /// Persist an analysis, assigning id and timestamp.
    fn append(&mut self, analysis: NewAnalysis) -> Result<AnalysisRecord>;

    fn get(&mut self, id: i64) -> Result<Option<AnalysisRecord>>;

    fn count(&mut self) -> Result<u64>;

    /// Newest first. `page` starts at 1; `limit` is `1..=MAX_PAGE_LIMIT`.
    fn list_page(&mut self, page: u32, limit: u32) -> Result<HistoryPage>;
}

fn validate_page(page: u32, limit: u32) -> Result<()> {
    if page == 0 {
        return Err(anyhow!("page must be >= 1"));
    }
    if limit == 0 || limit > MAX_PAGE_LIMIT {
        return Err(anyhow!("limit must be between 1 and {}", MAX_PAGE_LIMIT));
    }
    Ok(())
}

fn total_pages(total: u64, limit: u32) -> u64 {
    total.div_ceil(limit as u64)
}

pub struct SqliteAnalysisStore {
    conn: Connection,
}

impl SqliteAnalysisStore {
    pub fn open(db_path: &str) -> Result<Self> {
        let conn = open_db_connection(db_path)?;
        let mut store = Self { conn };
        store.ensure_schema()?;
        Ok(store)
    }

    fn ensure_schema(&mut self) -> Result<()> {
        self.conn.execute_batch(
            r#"
            PRAGMA journal_mode=WAL;

            CREATE TABLE IF NOT EXISTS analyses (
              id INTEGER PRIMARY KEY AUTOINCREMENT,
              image_filename TEXT NOT NULL,
              processed_image_filename TEXT NOT NULL,
              timestamp INTEGER NOT NULL,
              person_count INTEGER NOT NULL,
              focused_challenge_count INTEGER NOT NULL DEFAULT 0,
              classroom_tension_count INTEGER NOT NULL DEFAULT 0,
              learning_anxiety_count INTEGER NOT NULL DEFAULT 0,
              active_engagement_count INTEGER NOT NULL DEFAULT 0,
              learning_surprise_count INTEGER NOT NULL DEFAULT 0,
              calm_attention_count INTEGER NOT NULL DEFAULT 0,
              summary TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_analyses_image ON analyses(image_filename);
            CREATE INDEX IF NOT EXISTS idx_analyses_timestamp ON analyses(timestamp);
            "#,
        )?;
        Ok(())
    }
}

const RECORD_COLUMNS: &str = "id, image_filename, processed_image_filename, timestamp, \
     person_count, focused_challenge_count, classroom_tension_count, learning_anxiety_count, \
     active_engagement_count, learning_surprise_count, calm_attention_count, summary";

fn record_from_row(row: &Row<'_>) -> rusqlite::Result<AnalysisRecord> {
    Ok(AnalysisRecord {
        id: row.get(0)?,
        image_filename: row.get(1)?,
        processed_image_filename: row.get(2)?,
        timestamp: row.get(3)?,
        person_count: row.get(4)?,
        label_counts: LabelCounts {
            focused_challenge: row.get(5)?,
            classroom_tension: row.get(6)?,
            learning_anxiety: row.get(7)?,
            active_engagement: row.get(8)?,
            learning_surprise: row.get(9)?,
            calm_attention: row.get(10)?,
        },
        summary: row.get(11)?,
    })
}

impl AnalysisStore for SqliteAnalysisStore {
    fn append(&mut self, analysis: NewAnalysis) -> Result<AnalysisRecord> {
        let timestamp = i64::try_from(now_s()?)
            .map_err(|_| anyhow!("timestamp exceeds i64 range"))?;
        let counts = analysis.label_counts;

        self.conn.execute(
            r#"
            INSERT INTO analyses(
              image_filename, processed_image_filename, timestamp, person_count,
              focused_challenge_count, classroom_tension_count, learning_anxiety_count,
              active_engagement_count, learning_surprise_count, calm_attention_count,
              summary
            )
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
            "#,
            params![
                analysis.image_filename,
                analysis.processed_image_filename,
                timestamp,
                analysis.person_count,
                counts.focused_challenge,
                counts.classroom_tension,
                counts.learning_anxiety,
                counts.active_engagement,
                counts.learning_surprise,
                counts.calm_attention,
                analysis.summary,
            ],
        )?;

        Ok(AnalysisRecord {
            id: self.conn.last_insert_rowid(),
            image_filename: analysis.image_filename,
            processed_image_filename: analysis.processed_image_filename,
            timestamp,
            person_count: analysis.person_count,
            label_counts: counts,
            summary: analysis.summary,
        })
    }

    fn get(&mut self, id: i64) -> Result<Option<AnalysisRecord>> {
        let sql = format!("SELECT {} FROM analyses WHERE id = ?1", RECORD_COLUMNS);
        let record = self
            .conn
            .query_row(&sql, params![id], record_from_row)
            .optional()?;
        Ok(record)
    }

    fn count(&mut self) -> Result<u64> {
        let n: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM analyses", [], |row| row.get(0))?;
        Ok(n as u64)
    }

    fn list_page(&mut self, page: u32, limit: u32) -> Result<HistoryPage> {
        validate_page(page, limit)?;
        let total = self.count()?;
        let offset = (page as i64 - 1) * limit as i64;

        let records = {
            let sql = format!(
                "SELECT {} FROM analyses ORDER BY timestamp DESC, id DESC LIMIT ?1 OFFSET ?2",
                RECORD_COLUMNS
            );
            let mut stmt = self.conn.prepare(&sql)?;
            let rows = stmt.query_map(params![limit as i64, offset], record_from_row)?;
            rows.collect::<rusqlite::Result<Vec<_>>>()?
        };

        Ok(HistoryPage {
            records,
            page,
            limit,
            total,
            total_pages: total_pages(total, limit),
        })
    }
}

#[derive(Clone, Debug, Default)]
pub struct InMemoryAnalysisStore {
    records: Vec<AnalysisRecord>,
}

impl InMemoryAnalysisStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl AnalysisStore for InMemoryAnalysisStore {
    fn append(&mut self, analysis: NewAnalysis) -> Result<AnalysisRecord> {
        let timestamp = i64::try_from(now_s()?)
            .map_err(|_| anyhow!("timestamp exceeds i64 range"))?;
        let id = self.records.last().map(|r| r.id + 1).unwrap_or(1);
        let record = AnalysisRecord {
            id,
            image_filename: analysis.image_filename,
            processed_image_filename: analysis.processed_image_filename,
            timestamp,
            person_count: analysis.person_count,
            label_counts: analysis.label_counts,
            summary: analysis.summary,
        };
        self.records.push(record.clone());
        Ok(record)
    }

    fn get(&mut self, id: i64) -> Result<Option<AnalysisRecord>> {
        Ok(self.records.iter().find(|r| r.id == id).cloned())
    }

    fn count(&mut self) -> Result<u64> {
        Ok(self.records.len() as u64)
    }

    fn list_page(&mut self, page: u32, limit: u32) -> Result<HistoryPage> {
        validate_page(page, limit)?;
        let mut sorted: Vec<&AnalysisRecord> = self.records.iter().collect();
        sorted.sort_by(|a, b| b.timestamp.cmp(&a.timestamp).then(b.id.cmp(&a.id)));

        let offset = (page as usize - 1) * limit as usize;
        let records = sorted
            .into_iter()
            .skip(offset)
            .take(limit as usize)
            .cloned()
            .collect();
        let total = self.records.len() as u64;

        Ok(HistoryPage {
            records,
            page,
            limit,
            total,
            total_pages: total_pages(total, limit),
        })
    }
}
