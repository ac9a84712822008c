use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::SqlitePool;
use summary_core::{
    sort_newest_first, Error, FilingKind, FilingReport, StatementKind, StatementRecord,
    StatementRepository,
};

/// Sqlite-backed `StatementRepository`. Record sets persist as one JSON
/// array per (symbol, kind) row; `replace` is an upsert that bumps the
/// row's version.
pub struct SqliteStatementStore {
    pool: SqlitePool,
}

impl SqliteStatementStore {
    /// Opens (creating if needed) the database at `path` and prepares tables.
    pub async fn open(path: &str) -> Result<Self, Error> {
        let pool = SqlitePool::connect(&format!("sqlite:{path}?mode=rwc"))
            .await
            .map_err(|e| Error::Storage(e.to_string()))?;

        sqlx::query("PRAGMA journal_mode=WAL")
            .execute(&pool)
            .await
            .map_err(|e| Error::Storage(e.to_string()))?;

        let store = Self::new(pool);
        store.init_tables().await?;
        tracing::debug!("statement store ready at {path}");
        Ok(store)
    }

    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn init_tables(&self) -> Result<(), Error> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS statement_sets (
                symbol TEXT NOT NULL,
                kind TEXT NOT NULL,
                version INTEGER NOT NULL,
                records TEXT NOT NULL,
                replaced_at TEXT NOT NULL,
                PRIMARY KEY (symbol, kind)
            )",
        )
        .execute(&self.pool)
        .await
        .map_err(|e| Error::Storage(e.to_string()))?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS filing_reports (
                symbol TEXT NOT NULL,
                kind TEXT NOT NULL,
                url TEXT NOT NULL,
                retrieved_at TEXT NOT NULL,
                text TEXT NOT NULL,
                truncated INTEGER NOT NULL,
                full_text_length INTEGER NOT NULL,
                PRIMARY KEY (symbol, kind)
            )",
        )
        .execute(&self.pool)
        .await
        .map_err(|e| Error::Storage(e.to_string()))?;

        Ok(())
    }
}

#[async_trait]
impl StatementRepository for SqliteStatementStore {
    async fn load(&self, symbol: &str, kind: StatementKind) -> Result<Vec<StatementRecord>, Error> {
        let row: Option<(String,)> =
            sqlx::query_as("SELECT records FROM statement_sets WHERE symbol = ? AND kind = ?")
                .bind(symbol)
                .bind(kind.as_str())
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| Error::Storage(e.to_string()))?;

        match row {
            Some((json,)) => {
                serde_json::from_str(&json).map_err(|e| Error::Storage(e.to_string()))
            }
            None => Ok(Vec::new()),
        }
    }

    async fn replace(
        &self,
        symbol: &str,
        kind: StatementKind,
        mut records: Vec<StatementRecord>,
    ) -> Result<u64, Error> {
        sort_newest_first(&mut records);
        let json = serde_json::to_string(&records).map_err(|e| Error::Storage(e.to_string()))?;

        let (version,): (i64,) = sqlx::query_as(
            "INSERT INTO statement_sets (symbol, kind, version, records, replaced_at)
             VALUES (?, ?, 1, ?, ?)
             ON CONFLICT(symbol, kind) DO UPDATE SET
                version = statement_sets.version + 1,
                records = excluded.records,
                replaced_at = excluded.replaced_at
             RETURNING version",
        )
        .bind(symbol)
        .bind(kind.as_str())
        .bind(&json)
        .bind(Utc::now().to_rfc3339())
        .fetch_one(&self.pool)
        .await
        .map_err(|e| Error::Storage(e.to_string()))?;

        Ok(version as u64)
    }

    async fn load_filing(
        &self,
        symbol: &str,
        kind: FilingKind,
    ) -> Result<Option<FilingReport>, Error> {
        let row = sqlx::query_as::<_, FilingRow>(
            "SELECT symbol, kind, url, retrieved_at, text, truncated, full_text_length
             FROM filing_reports WHERE symbol = ? AND kind = ?",
        )
        .bind(symbol)
        .bind(kind.as_label())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| Error::Storage(e.to_string()))?;

        row.map(FilingRow::into_report).transpose()
    }

    async fn store_filing(&self, report: &FilingReport) -> Result<(), Error> {
        sqlx::query(
            "INSERT INTO filing_reports
                (symbol, kind, url, retrieved_at, text, truncated, full_text_length)
             VALUES (?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(symbol, kind) DO UPDATE SET
                url = excluded.url,
                retrieved_at = excluded.retrieved_at,
                text = excluded.text,
                truncated = excluded.truncated,
                full_text_length = excluded.full_text_length",
        )
        .bind(&report.symbol)
        .bind(report.kind.as_label())
        .bind(&report.url)
        .bind(report.retrieved_at.to_rfc3339())
        .bind(&report.text)
        .bind(report.truncated)
        .bind(report.full_text_length as i64)
        .execute(&self.pool)
        .await
        .map_err(|e| Error::Storage(e.to_string()))?;

        Ok(())
    }
}

#[derive(sqlx::FromRow)]
struct FilingRow {
    symbol: String,
    kind: String,
    url: String,
    retrieved_at: String,
    text: String,
    truncated: bool,
    full_text_length: i64,
}

impl FilingRow {
    fn into_report(self) -> Result<FilingReport, Error> {
        let kind = FilingKind::from_label(&self.kind)
            .ok_or_else(|| Error::Storage(format!("unknown filing kind: {}", self.kind)))?;
        let retrieved_at = DateTime::parse_from_rfc3339(&self.retrieved_at)
            .map_err(|e| Error::Storage(e.to_string()))?
            .with_timezone(&Utc);

        Ok(FilingReport {
            symbol: self.symbol,
            kind,
            url: self.url,
            retrieved_at,
            text: self.text,
            truncated: self.truncated,
            full_text_length: self.full_text_length as usize,
        })
    }
}
