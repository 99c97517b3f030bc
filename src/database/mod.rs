use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{
    sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous},
    Row, Sqlite, SqlitePool, Transaction,
};
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, info};

use crate::models::{Constituent, SectorRecord, UNKNOWN_SECTOR};

/// Storage contract shared by the resolver, the refresher and the dashboard.
///
/// Every call is its own transaction. Readers may run while the refresher
/// replaces the snapshot; no coordination beyond the store's isolation.
#[async_trait]
pub trait PortfolioStore: Send + Sync {
    /// Current snapshot joined with the knowledge base for sectors.
    async fn load_snapshot(&self) -> Result<Vec<Constituent>>;

    /// Delete every snapshot row and insert `constituents`, atomically.
    async fn replace_snapshot(&self, constituents: &[Constituent]) -> Result<()>;

    async fn get_sector(&self, ticker: &str) -> Result<Option<String>>;

    async fn upsert_sector(&self, ticker: &str, sector: &str) -> Result<()>;

    async fn bulk_upsert_sectors(&self, sectors: &HashMap<String, String>) -> Result<()>;

    /// Newest row time; every price refresh moves it.
    async fn last_snapshot_timestamp(&self) -> Result<Option<DateTime<Utc>>>;

    /// Replace the snapshot with a downloaded basket and record when it was composed.
    async fn replace_composition(&self, constituents: &[Constituent], composed_at: DateTime<Utc>) -> Result<()>;

    /// When the basket was last downloaded. Price refreshes leave it alone.
    async fn last_composition_timestamp(&self) -> Result<Option<DateTime<Utc>>>;
}

/// SQLite-backed store
#[derive(Clone)]
pub struct DatabaseManager {
    pool: SqlitePool,
}

impl DatabaseManager {
    /// Open (creating if needed) the database file and bring the schema up to date
    pub async fn new(database_path: &str) -> Result<Self> {
        let path = database_path.strip_prefix("sqlite:").unwrap_or(database_path);

        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .busy_timeout(Duration::from_secs(5));

        let pool = SqlitePoolOptions::new()
            .max_connections(8)
            .acquire_timeout(Duration::from_secs(30))
            .connect_with(options)
            .await?;

        let db = Self { pool };
        db.run_migrations().await?;
        info!("Database initialized at {}", path);

        Ok(db)
    }

    /// Create tables and add columns that older databases lack
    async fn run_migrations(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS sector_knowledge (
                ticker TEXT PRIMARY KEY,
                sector TEXT NOT NULL,
                updated_at DATETIME NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS portfolio_snapshot (
                ticker TEXT PRIMARY KEY,
                share REAL NOT NULL DEFAULT 0,
                updated_at DATETIME NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS portfolio_meta (
                key TEXT PRIMARY KEY,
                updated_at DATETIME NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        for column in ["price", "change_pct", "turnover"] {
            self.add_column_if_missing("portfolio_snapshot", column, "REAL DEFAULT 0")
                .await?;
        }

        debug!("Database migrations completed");
        Ok(())
    }

    async fn add_column_if_missing(&self, table: &str, column: &str, definition: &str) -> Result<bool> {
        let rows = sqlx::query(&format!("PRAGMA table_info({})", table))
            .fetch_all(&self.pool)
            .await?;

        let exists = rows
            .iter()
            .any(|r| r.get::<String, _>("name").eq_ignore_ascii_case(column));
        if exists {
            return Ok(false);
        }

        sqlx::query(&format!("ALTER TABLE {} ADD COLUMN {} {}", table, column, definition))
            .execute(&self.pool)
            .await?;
        info!("Added column {}.{}", table, column);
        Ok(true)
    }

    /// Knowledge-base distribution, largest sector first
    pub async fn sector_counts(&self) -> Result<Vec<(String, i64)>> {
        let rows = sqlx::query(
            r#"
            SELECT sector, COUNT(*) AS count
            FROM sector_knowledge
            GROUP BY sector
            ORDER BY count DESC, sector
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|r| (r.get::<String, _>("sector"), r.get::<i64, _>("count")))
            .collect())
    }

    pub async fn get_sector_record(&self, ticker: &str) -> Result<Option<SectorRecord>> {
        let row = sqlx::query("SELECT ticker, sector, updated_at FROM sector_knowledge WHERE ticker = ?")
            .bind(ticker)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.map(|r| SectorRecord {
            ticker: r.get::<String, _>("ticker"),
            sector: r.get::<String, _>("sector"),
            updated_at: r.try_get::<DateTime<Utc>, _>("updated_at").unwrap_or_else(|_| Utc::now()),
        }))
    }

    pub async fn clear_snapshot(&self) -> Result<()> {
        sqlx::query("DELETE FROM portfolio_snapshot")
            .execute(&self.pool)
            .await?;
        info!("Cleared portfolio snapshot");
        Ok(())
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

const COMPOSITION_KEY: &str = "composition";

const UPSERT_SECTOR_SQL: &str = r#"
    INSERT INTO sector_knowledge (ticker, sector, updated_at)
    VALUES (?, ?, ?)
    ON CONFLICT(ticker) DO UPDATE SET
        sector = excluded.sector,
        updated_at = excluded.updated_at
"#;

#[async_trait]
impl PortfolioStore for DatabaseManager {
    async fn load_snapshot(&self) -> Result<Vec<Constituent>> {
        let rows = sqlx::query(
            r#"
            SELECT p.ticker, p.share, p.price, p.change_pct, p.turnover, k.sector
            FROM portfolio_snapshot p
            LEFT JOIN sector_knowledge k ON p.ticker = k.ticker
            ORDER BY p.share DESC, p.ticker
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|r| Constituent {
                ticker: r.get::<String, _>("ticker"),
                share: r.get::<Option<f64>, _>("share").unwrap_or(0.0),
                price: r.get::<Option<f64>, _>("price").unwrap_or(0.0),
                change_pct: r.get::<Option<f64>, _>("change_pct").unwrap_or(0.0),
                turnover: r.get::<Option<f64>, _>("turnover").unwrap_or(0.0),
                sector: r
                    .get::<Option<String>, _>("sector")
                    .filter(|s| !s.is_empty())
                    .unwrap_or_else(|| UNKNOWN_SECTOR.to_string()),
                name: None,
                isin: None,
            })
            .collect())
    }

    async fn replace_snapshot(&self, constituents: &[Constituent]) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        write_snapshot(&mut tx, constituents, Utc::now()).await?;
        tx.commit().await?;

        debug!("Replaced snapshot with {} constituents", constituents.len());
        Ok(())
    }

    async fn get_sector(&self, ticker: &str) -> Result<Option<String>> {
        let row = sqlx::query("SELECT sector FROM sector_knowledge WHERE ticker = ?")
            .bind(ticker)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row
            .map(|r| r.get::<String, _>("sector"))
            .filter(|s| !s.is_empty()))
    }

    async fn upsert_sector(&self, ticker: &str, sector: &str) -> Result<()> {
        sqlx::query(UPSERT_SECTOR_SQL)
            .bind(ticker)
            .bind(sector)
            .bind(Utc::now())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn bulk_upsert_sectors(&self, sectors: &HashMap<String, String>) -> Result<()> {
        if sectors.is_empty() {
            return Ok(());
        }

        let now = Utc::now();
        let mut tx = self.pool.begin().await?;
        for (ticker, sector) in sectors {
            sqlx::query(UPSERT_SECTOR_SQL)
                .bind(ticker)
                .bind(sector)
                .bind(now)
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;

        debug!("Upserted {} sector records", sectors.len());
        Ok(())
    }

    async fn last_snapshot_timestamp(&self) -> Result<Option<DateTime<Utc>>> {
        let row = sqlx::query("SELECT MAX(updated_at) AS last_date FROM portfolio_snapshot")
            .fetch_one(&self.pool)
            .await?;

        Ok(row.try_get::<Option<DateTime<Utc>>, _>("last_date")?)
    }

    async fn replace_composition(&self, constituents: &[Constituent], composed_at: DateTime<Utc>) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        write_snapshot(&mut tx, constituents, Utc::now()).await?;

        sqlx::query(
            r#"
            INSERT INTO portfolio_meta (key, updated_at)
            VALUES (?, ?)
            ON CONFLICT(key) DO UPDATE SET updated_at = excluded.updated_at
            "#,
        )
        .bind(COMPOSITION_KEY)
        .bind(composed_at)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        debug!("Installed composition of {} constituents", constituents.len());
        Ok(())
    }

    async fn last_composition_timestamp(&self) -> Result<Option<DateTime<Utc>>> {
        let row = sqlx::query("SELECT updated_at FROM portfolio_meta WHERE key = ?")
            .bind(COMPOSITION_KEY)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(r) => Ok(Some(r.try_get::<DateTime<Utc>, _>("updated_at")?)),
            None => Ok(None),
        }
    }
}

/// Delete every snapshot row and insert `constituents` inside `tx`
async fn write_snapshot(
    tx: &mut Transaction<'_, Sqlite>,
    constituents: &[Constituent],
    now: DateTime<Utc>,
) -> Result<()> {
    sqlx::query("DELETE FROM portfolio_snapshot")
        .execute(&mut **tx)
        .await?;

    for c in constituents {
        sqlx::query(
            r#"
            INSERT INTO portfolio_snapshot (ticker, share, price, change_pct, turnover, updated_at)
            VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT(ticker) DO UPDATE SET
                share = excluded.share,
                price = excluded.price,
                change_pct = excluded.change_pct,
                turnover = excluded.turnover,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&c.ticker)
        .bind(c.share)
        .bind(c.price)
        .bind(c.change_pct)
        .bind(c.turnover)
        .bind(now)
        .execute(&mut **tx)
        .await?;
    }
    Ok(())
}
