//! Storage layer: SQLite pool setup, migrations and stored verdicts.

use serde::Serialize;
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::{FromRow, SqlitePool};
use tracing::debug;

pub async fn connect(database_url: &str) -> anyhow::Result<SqlitePool> {
    let mut url = database_url.to_string();
    if !database_url.starts_with("sqlite:") {
        let path = std::path::PathBuf::from(database_url);
        if let Some(parent) = path.parent() {
            let _ = std::fs::create_dir_all(parent);
        }
        let norm = path.to_string_lossy().replace('\\', "/");
        if path.is_absolute() {
            url = format!("sqlite:///{}", norm.trim_start_matches('/'));
        } else {
            url = format!("sqlite://{}", norm);
        }
        if !url.contains('?') {
            url.push_str("?mode=rwc");
        }
    }
    let mut opts = SqlitePoolOptions::new();
    if url.contains("memory") {
        opts = opts.max_connections(1);
    } else {
        opts = opts.max_connections(5);
    }
    let pool = opts.connect(&url).await?;
    Ok(pool)
}

pub async fn migrate(pool: &SqlitePool) -> anyhow::Result<()> {
    // Applies SQLx migrations located in crates/storage/migrations.
    // Safe to run multiple times (idempotent).
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

/// One verdict as stored: the full verdict JSON plus the columns we query on.
#[derive(Debug, Clone, PartialEq, Serialize, FromRow)]
pub struct VerdictRow {
    pub rule_id: String,
    pub position: i64,
    pub status: String,
    pub payload_json: String,
    pub checked_at: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, FromRow)]
pub struct DocumentSummary {
    pub document: String,
    pub rules: i64,
    pub errors: i64,
    pub last_checked: i64,
}

/// Upserts verdicts for `document`; a row for the same rule is replaced.
pub async fn save_verdicts(
    pool: &SqlitePool,
    document: &str,
    rows: &[VerdictRow],
) -> anyhow::Result<()> {
    let mut tx = pool.begin().await?;
    for row in rows {
        sqlx::query(
            r#"
            INSERT INTO verdicts (document, rule_id, position, status, payload_json, checked_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            ON CONFLICT(document, rule_id) DO UPDATE SET
                position=excluded.position,
                status=excluded.status,
                payload_json=excluded.payload_json,
                checked_at=excluded.checked_at
            "#,
        )
        .bind(document)
        .bind(&row.rule_id)
        .bind(row.position)
        .bind(&row.status)
        .bind(&row.payload_json)
        .bind(row.checked_at)
        .execute(&mut *tx)
        .await?;
    }
    tx.commit().await?;
    debug!(document, rows = rows.len(), "saved verdicts");
    Ok(())
}

/// Stored verdicts for `document` in check order, optionally limited to `statuses`.
pub async fn load_verdicts(
    pool: &SqlitePool,
    document: &str,
    statuses: &[String],
) -> anyhow::Result<Vec<VerdictRow>> {
    let mut qb = sqlx::QueryBuilder::<sqlx::Sqlite>::new(
        "SELECT rule_id, position, status, payload_json, checked_at FROM verdicts WHERE document = ",
    );
    qb.push_bind(document);
    if !statuses.is_empty() {
        qb.push(" AND status IN (");
        let mut separated = qb.separated(", ");
        for s in statuses {
            separated.push_bind(s);
        }
        separated.push_unseparated(")");
    }
    qb.push(" ORDER BY position, rule_id");
    let rows = qb.build_query_as::<VerdictRow>().fetch_all(pool).await?;
    Ok(rows)
}

pub async fn list_documents(pool: &SqlitePool) -> anyhow::Result<Vec<DocumentSummary>> {
    let rows = sqlx::query_as::<_, DocumentSummary>(
        r#"
        SELECT document,
               COUNT(*) AS rules,
               SUM(CASE WHEN status = 'Error' THEN 1 ELSE 0 END) AS errors,
               MAX(checked_at) AS last_checked
        FROM verdicts
        GROUP BY document
        ORDER BY last_checked DESC, document
        "#,
    )
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

pub async fn delete_document(pool: &SqlitePool, document: &str) -> anyhow::Result<u64> {
    let res = sqlx::query("DELETE FROM verdicts WHERE document = ?1")
        .bind(document)
        .execute(pool)
        .await?;
    Ok(res.rows_affected())
}
