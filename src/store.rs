use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteRow};
use sqlx::{QueryBuilder, Row, Sqlite, SqlitePool};
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;
use tracing::{info, warn};

use crate::models::{
    Answers, CategoryCount, CategoryField, ClientMetadata, NewSubmission, Pagination, Submission,
    SubmissionFilter,
};

const INSERT_ATTEMPTS: u32 = 3;
const INSERT_BACKOFF: Duration = Duration::from_millis(50);

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("encoding error: {0}")]
    Encoding(#[from] serde_json::Error),

    #[error("storage unavailable: {0}")]
    Unavailable(String),
}

#[async_trait]
pub trait SubmissionStore: Send + Sync {
    // atomic; returns the new id
    async fn insert(&self, submission: &NewSubmission) -> Result<i64, StoreError>;

    async fn count_matching(&self, filter: &SubmissionFilter) -> Result<i64, StoreError>;

    // oldest first
    async fn query(
        &self,
        filter: &SubmissionFilter,
        pagination: Pagination,
    ) -> Result<Vec<Submission>, StoreError>;

    async fn find(&self, id: i64) -> Result<Option<Submission>, StoreError>;

    // counts per answer to `field`, most common first
    async fn breakdown(&self, field: CategoryField) -> Result<Vec<CategoryCount>, StoreError>;
}

#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub async fn connect(url: &str) -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::from_str(url)?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(Duration::from_secs(5));
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .acquire_timeout(Duration::from_secs(3))
            .connect_with(options)
            .await?;

        let store = Self { pool };
        store.migrate().await?;
        info!(url, "submission store ready");
        Ok(store)
    }

    // each sqlite memory connection is its own database: keep exactly one alive
    pub async fn in_memory() -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?;
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?;

        let store = Self { pool };
        store.migrate().await?;
        Ok(store)
    }

    async fn migrate(&self) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS responses (
                id                  INTEGER PRIMARY KEY AUTOINCREMENT,
                question1           TEXT NOT NULL,
                question2           TEXT NOT NULL,
                question3           TEXT NOT NULL,
                question4           TEXT NOT NULL,
                question5           TEXT NOT NULL,
                question6           TEXT NOT NULL,
                question7           TEXT NOT NULL,
                question8           TEXT NOT NULL,
                other_sector        TEXT,
                question9           TEXT NOT NULL,
                question10          TEXT NOT NULL,
                question11          TEXT NOT NULL,
                question12          TEXT NOT NULL,
                question13          TEXT NOT NULL,
                question14          TEXT NOT NULL,
                question15          TEXT,
                question16          TEXT,
                user_hash           TEXT NOT NULL,
                browser_fingerprint TEXT,
                user_agent          TEXT,
                screen_resolution   TEXT,
                client_timestamp    TEXT,
                created_at          INTEGER NOT NULL,
                updated_at          INTEGER
            );
            CREATE INDEX IF NOT EXISTS idx_responses_user_hash ON responses(user_hash);
            CREATE INDEX IF NOT EXISTS idx_responses_fingerprint ON responses(browser_fingerprint);
            CREATE INDEX IF NOT EXISTS idx_responses_created_at ON responses(created_at);
            "#,
        )
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn try_insert(&self, s: &NewSubmission, question4: &str) -> Result<i64, sqlx::Error> {
        let a = &s.answers;
        let m = &s.metadata;
        let result = sqlx::query(
            r#"
            INSERT INTO responses (
                question1, question2, question3, question4, question5,
                question6, question7, question8, other_sector, question9,
                question10, question11, question12, question13, question14,
                question15, question16, user_hash, browser_fingerprint,
                user_agent, screen_resolution, client_timestamp, created_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&a.question1)
        .bind(&a.question2)
        .bind(&a.question3)
        .bind(question4)
        .bind(&a.question5)
        .bind(&a.question6)
        .bind(&a.question7)
        .bind(&a.question8)
        .bind(&a.other_sector)
        .bind(&a.question9)
        .bind(&a.question10)
        .bind(&a.question11)
        .bind(&a.question12)
        .bind(&a.question13)
        .bind(&a.question14)
        .bind(&a.question15)
        .bind(&a.question16)
        .bind(&s.user_hash)
        .bind(&m.browser_fingerprint)
        .bind(&m.user_agent)
        .bind(&m.screen_resolution)
        .bind(&m.client_timestamp)
        .bind(s.created_at.timestamp_millis())
        .execute(&self.pool)
        .await?;
        Ok(result.last_insert_rowid())
    }
}

#[async_trait]
impl SubmissionStore for SqliteStore {
    async fn insert(&self, submission: &NewSubmission) -> Result<i64, StoreError> {
        let question4 = serde_json::to_string(&submission.answers.question4)?;

        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.try_insert(submission, &question4).await {
                Ok(id) => return Ok(id),
                Err(e) if is_transient(&e) && attempt < INSERT_ATTEMPTS => {
                    let backoff = INSERT_BACKOFF * 2u32.pow(attempt - 1);
                    warn!(attempt, error = %e, ?backoff, "insert failed, retrying");
                    tokio::time::sleep(backoff).await;
                }
                Err(e) if is_transient(&e) => {
                    return Err(StoreError::Unavailable(format!(
                        "insert failed after {attempt} attempts: {e}"
                    )));
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    async fn count_matching(&self, filter: &SubmissionFilter) -> Result<i64, StoreError> {
        let mut qb = QueryBuilder::<Sqlite>::new("SELECT COUNT(*) FROM responses WHERE 1 = 1");
        push_conditions(&mut qb, filter);
        let count = qb.build_query_scalar::<i64>().fetch_one(&self.pool).await?;
        Ok(count)
    }

    async fn query(
        &self,
        filter: &SubmissionFilter,
        pagination: Pagination,
    ) -> Result<Vec<Submission>, StoreError> {
        let mut qb = QueryBuilder::<Sqlite>::new("SELECT * FROM responses WHERE 1 = 1");
        push_conditions(&mut qb, filter);
        qb.push(" ORDER BY id ASC LIMIT ")
            .push_bind(pagination.limit())
            .push(" OFFSET ")
            .push_bind(pagination.offset());

        let rows = qb.build().fetch_all(&self.pool).await?;
        rows.iter()
            .map(submission_from_row)
            .collect::<Result<Vec<_>, _>>()
            .map_err(StoreError::from)
    }

    async fn find(&self, id: i64) -> Result<Option<Submission>, StoreError> {
        let row = sqlx::query("SELECT * FROM responses WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.as_ref().map(submission_from_row).transpose()?)
    }

    async fn breakdown(&self, field: CategoryField) -> Result<Vec<CategoryCount>, StoreError> {
        // Column names come from the closed CategoryField set, never from input
        let sql = if field.is_multi_select() {
            format!(
                "SELECT j.value AS value, COUNT(*) AS count \
                 FROM responses, json_each(responses.{col}) AS j \
                 GROUP BY j.value ORDER BY count DESC, value ASC",
                col = field.column()
            )
        } else {
            format!(
                "SELECT {col} AS value, COUNT(*) AS count \
                 FROM responses GROUP BY {col} ORDER BY count DESC, value ASC",
                col = field.column()
            )
        };

        let rows: Vec<(String, i64)> = sqlx::query_as(&sql).fetch_all(&self.pool).await?;
        Ok(rows
            .into_iter()
            .map(|(value, count)| CategoryCount { value, count })
            .collect())
    }
}

fn push_conditions(qb: &mut QueryBuilder<'_, Sqlite>, filter: &SubmissionFilter) {
    match (&filter.user_hash, &filter.browser_fingerprint) {
        (Some(hash), Some(fingerprint)) => {
            qb.push(" AND (user_hash = ")
                .push_bind(hash.clone())
                .push(" OR browser_fingerprint = ")
                .push_bind(fingerprint.clone())
                .push(")");
        }
        (Some(hash), None) => {
            qb.push(" AND user_hash = ").push_bind(hash.clone());
        }
        (None, Some(fingerprint)) => {
            qb.push(" AND browser_fingerprint = ").push_bind(fingerprint.clone());
        }
        (None, None) => {}
    }

    for (field, value) in &filter.categories {
        if field.is_multi_select() {
            qb.push(format!(
                " AND EXISTS (SELECT 1 FROM json_each(responses.{}) WHERE json_each.value = ",
                field.column()
            ))
            .push_bind(value.clone())
            .push(")");
        } else {
            qb.push(format!(" AND {} = ", field.column()))
                .push_bind(value.clone());
        }
    }

    if let Some(from) = filter.from {
        qb.push(" AND created_at >= ").push_bind(from.timestamp_millis());
    }
    if let Some(to) = filter.to {
        qb.push(" AND created_at <= ").push_bind(to.timestamp_millis());
    }
}

fn is_transient(e: &sqlx::Error) -> bool {
    match e {
        sqlx::Error::PoolTimedOut | sqlx::Error::Io(_) => true,
        // SQLITE_BUSY / SQLITE_LOCKED
        sqlx::Error::Database(db) => matches!(db.code().as_deref(), Some("5") | Some("6")),
        _ => false,
    }
}

fn submission_from_row(row: &SqliteRow) -> Result<Submission, sqlx::Error> {
    let question4: String = row.try_get("question4")?;
    let answers = Answers {
        question1: row.try_get("question1")?,
        question2: row.try_get("question2")?,
        question3: row.try_get("question3")?,
        // Unreadable multi-select degrades to no selection rather than failing the listing
        question4: serde_json::from_str(&question4).unwrap_or_default(),
        question5: row.try_get("question5")?,
        question6: row.try_get("question6")?,
        question7: row.try_get("question7")?,
        question8: row.try_get("question8")?,
        question9: row.try_get("question9")?,
        question10: row.try_get("question10")?,
        question11: row.try_get("question11")?,
        question12: row.try_get("question12")?,
        question13: row.try_get("question13")?,
        question14: row.try_get("question14")?,
        question15: row.try_get("question15")?,
        question16: row.try_get("question16")?,
        other_sector: row.try_get("other_sector")?,
    };
    let metadata = ClientMetadata {
        browser_fingerprint: row.try_get("browser_fingerprint")?,
        user_agent: row.try_get("user_agent")?,
        screen_resolution: row.try_get("screen_resolution")?,
        client_timestamp: row.try_get("client_timestamp")?,
    };
    let created_at: i64 = row.try_get("created_at")?;
    let updated_at: Option<i64> = row.try_get("updated_at")?;

    Ok(Submission {
        id: row.try_get("id")?,
        answers,
        metadata,
        user_hash: row.try_get("user_hash")?,
        created_at: from_millis(created_at),
        updated_at: updated_at.map(from_millis),
    })
}

fn from_millis(ms: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(ms).unwrap_or_default()
}
