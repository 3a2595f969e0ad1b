use chrono::{DateTime, NaiveDateTime, Utc};
use sqlx::{sqlite::SqlitePoolOptions, sqlite::SqliteRow, Pool, Row, Sqlite};
use uuid::Uuid;

use crate::{record::NormalizedRecord, Error, Result};

const PUBLISHED_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

const INIT_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS awards (
    id TEXT PRIMARY KEY,
    notice_id TEXT NOT NULL UNIQUE,
    source_url TEXT NOT NULL,
    title TEXT,
    notice_type TEXT,
    procedure_type TEXT,
    department TEXT,
    buyer_name TEXT,
    buyer_address TEXT,
    buyer_city TEXT,
    winner_name TEXT,
    winner_address TEXT,
    winner_city TEXT,
    award_value REAL,
    estimated_value REAL,
    currency TEXT NOT NULL,
    winner_country TEXT NOT NULL DEFAULT 'FR',
    source TEXT NOT NULL,
    cpv_codes TEXT NOT NULL,
    cpv_primary TEXT,
    published_at TEXT,
    short_description TEXT,
    roles_swapped INTEGER NOT NULL DEFAULT 0,
    content_hash TEXT NOT NULL,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_awards_buyer ON awards(buyer_name);
CREATE INDEX IF NOT EXISTS idx_awards_winner ON awards(winner_name);
CREATE INDEX IF NOT EXISTS idx_awards_cpv ON awards(cpv_primary);
"#;

const UPSERT_SQL: &str = r#"
INSERT INTO awards (
    id, notice_id, source_url, title, notice_type, procedure_type, department,
    buyer_name, buyer_address, buyer_city, winner_name, winner_address, winner_city,
    award_value, estimated_value, currency, winner_country, source, cpv_codes, cpv_primary,
    published_at, short_description, roles_swapped, content_hash, created_at, updated_at
)
VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
ON CONFLICT(notice_id) DO UPDATE SET
    source_url = excluded.source_url,
    title = excluded.title,
    notice_type = excluded.notice_type,
    procedure_type = excluded.procedure_type,
    department = excluded.department,
    buyer_name = excluded.buyer_name,
    buyer_address = excluded.buyer_address,
    buyer_city = excluded.buyer_city,
    winner_name = excluded.winner_name,
    winner_address = excluded.winner_address,
    winner_city = excluded.winner_city,
    award_value = excluded.award_value,
    estimated_value = excluded.estimated_value,
    currency = excluded.currency,
    winner_country = excluded.winner_country,
    source = excluded.source,
    cpv_codes = excluded.cpv_codes,
    cpv_primary = excluded.cpv_primary,
    published_at = excluded.published_at,
    short_description = excluded.short_description,
    roles_swapped = excluded.roles_swapped,
    content_hash = excluded.content_hash,
    updated_at = excluded.updated_at
"#;

/// What an upsert did to the stored row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Inserted,
    Updated,
    /// Same notice, same content hash.
    Unchanged,
}

/// A persisted award row.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredAward {
    pub id: Uuid,
    pub notice_id: String,
    pub source_url: String,
    pub title: Option<String>,
    pub notice_type: Option<String>,
    pub procedure_type: Option<String>,
    pub department: Option<String>,
    pub buyer_name: Option<String>,
    pub buyer_address: Option<String>,
    pub buyer_city: Option<String>,
    pub winner_name: Option<String>,
    pub winner_address: Option<String>,
    pub winner_city: Option<String>,
    pub award_value: Option<f64>,
    pub estimated_value: Option<f64>,
    pub currency: String,
    pub winner_country: String,
    pub source: String,
    pub cpv_codes: Vec<String>,
    pub cpv_primary: Option<String>,
    pub published_at: Option<NaiveDateTime>,
    pub short_description: Option<String>,
    pub roles_swapped: bool,
    pub content_hash: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

pub struct Storage {
    pool: Pool<Sqlite>,
}

impl Storage {
    pub async fn open(path: &str) -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(&format!("sqlite:{path}?mode=rwc"))
            .await?;

        sqlx::query(INIT_SQL).execute(&pool).await?;

        Ok(Self { pool })
    }

    pub async fn open_memory() -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await?;

        sqlx::query(INIT_SQL).execute(&pool).await?;

        Ok(Self { pool })
    }

    /// Insert or refresh the row for `record.notice_id`.
    ///
    /// Re-ingesting a page whose bytes did not change is a no-op.
    pub async fn upsert_award(&self, record: &NormalizedRecord) -> Result<UpsertOutcome> {
        let existing: Option<(String,)> =
            sqlx::query_as("SELECT content_hash FROM awards WHERE notice_id = ?")
                .bind(&record.notice_id)
                .fetch_optional(&self.pool)
                .await?;

        let outcome = match existing {
            Some((hash,)) if hash == record.content_hash => return Ok(UpsertOutcome::Unchanged),
            Some(_) => UpsertOutcome::Updated,
            None => UpsertOutcome::Inserted,
        };

        let now = Utc::now().to_rfc3339();
        let cpv_json = serde_json::to_string(&record.cpv_codes)?;
        let published = record
            .published_at
            .map(|d| d.format(PUBLISHED_FORMAT).to_string());

        sqlx::query(UPSERT_SQL)
            .bind(Uuid::now_v7().to_string())
            .bind(&record.notice_id)
            .bind(&record.source_url)
            .bind(&record.title)
            .bind(&record.notice_type)
            .bind(&record.procedure_type)
            .bind(&record.department)
            .bind(&record.buyer_name)
            .bind(&record.buyer_address)
            .bind(&record.buyer_city)
            .bind(&record.winner_name)
            .bind(&record.winner_address)
            .bind(&record.winner_city)
            .bind(record.award_value)
            .bind(record.estimated_value)
            .bind(&record.currency)
            .bind(&record.winner_country)
            .bind(&record.source)
            .bind(cpv_json)
            .bind(&record.cpv_primary)
            .bind(published)
            .bind(&record.short_description)
            .bind(record.roles_swapped)
            .bind(&record.content_hash)
            .bind(&now)
            .bind(&now)
            .execute(&self.pool)
            .await?;

        tracing::debug!("Award {} {:?}", record.notice_id, outcome);
        Ok(outcome)
    }

    pub async fn get_award(&self, notice_id: &str) -> Result<Option<StoredAward>> {
        let row = sqlx::query("SELECT * FROM awards WHERE notice_id = ?")
            .bind(notice_id)
            .fetch_optional(&self.pool)
            .await?;

        row.map(|r| parse_award_row(&r)).transpose()
    }

    pub async fn count(&self) -> Result<u64> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM awards")
            .fetch_one(&self.pool)
            .await?;

        Ok(u64::try_from(count).unwrap_or_default())
    }
}

fn parse_award_row(row: &SqliteRow) -> Result<StoredAward> {
    let notice_id: String = row.try_get("notice_id")?;
    let corrupt = |reason: String| Error::CorruptRow {
        notice_id: notice_id.clone(),
        reason,
    };

    let id: String = row.try_get("id")?;
    let cpv_json: String = row.try_get("cpv_codes")?;
    let published: Option<String> = row.try_get("published_at")?;
    let created_at: String = row.try_get("created_at")?;
    let updated_at: String = row.try_get("updated_at")?;

    let published_at = published
        .map(|p| NaiveDateTime::parse_from_str(&p, PUBLISHED_FORMAT))
        .transpose()
        .map_err(|e| corrupt(format!("published_at: {e}")))?;
    let timestamp = |raw: &str| {
        DateTime::parse_from_rfc3339(raw)
            .map(|t| t.with_timezone(&Utc))
            .map_err(|e| corrupt(format!("timestamp: {e}")))
    };

    Ok(StoredAward {
        id: id.parse().map_err(|e| corrupt(format!("id: {e}")))?,
        source_url: row.try_get("source_url")?,
        title: row.try_get("title")?,
        notice_type: row.try_get("notice_type")?,
        procedure_type: row.try_get("procedure_type")?,
        department: row.try_get("department")?,
        buyer_name: row.try_get("buyer_name")?,
        buyer_address: row.try_get("buyer_address")?,
        buyer_city: row.try_get("buyer_city")?,
        winner_name: row.try_get("winner_name")?,
        winner_address: row.try_get("winner_address")?,
        winner_city: row.try_get("winner_city")?,
        award_value: row.try_get("award_value")?,
        estimated_value: row.try_get("estimated_value")?,
        currency: row.try_get("currency")?,
        winner_country: row.try_get("winner_country")?,
        source: row.try_get("source")?,
        cpv_codes: serde_json::from_str(&cpv_json)?,
        cpv_primary: row.try_get("cpv_primary")?,
        published_at,
        short_description: row.try_get("short_description")?,
        roles_swapped: row.try_get("roles_swapped")?,
        content_hash: row.try_get("content_hash")?,
        created_at: timestamp(&created_at)?,
        updated_at: timestamp(&updated_at)?,
        notice_id,
    })
}
