//! Database connection pool management and schema bootstrap.

use crate::config::DatabaseConfig;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;

/// Type alias for the PostgreSQL connection pool.
pub type DbPool = PgPool;

/// Create a new database connection pool.
///
/// Connections use the configured schema as their `search_path`, so queries
/// refer to tables unqualified.
///
/// # Errors
///
/// Returns an error if the connection pool cannot be created.
pub async fn create_pool(config: &DatabaseConfig) -> Result<DbPool, sqlx::Error> {
    let pool = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .min_connections(config.min_connections)
        .acquire_timeout(config.acquire_timeout())
        .idle_timeout(config.idle_timeout())
        .connect_with(config.connect_options())
        .await?;

    tracing::info!(
        target_db = %config.display_url(),
        max_connections = config.max_connections,
        statement_timeout_ms = config.statement_timeout_ms,
        "Database connection pool created"
    );

    Ok(pool)
}

/// Check if the database connection is healthy.
pub async fn health_check(pool: &DbPool) -> bool {
    sqlx::query("SELECT 1").execute(pool).await.is_ok()
}

/// Statements creating the engine tables. Each is idempotent.
///
/// The partial unique index on `pause_record` is what keeps an execution
/// from holding two active pauses when two suspensions race.
const SCHEMA_STATEMENTS: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS workflow_execution (
        id            TEXT PRIMARY KEY,
        workflow_id   TEXT NOT NULL,
        status        TEXT NOT NULL,
        definition    JSONB NOT NULL,
        input         JSONB NOT NULL,
        checkpoint    JSONB NOT NULL DEFAULT '{}'::jsonb,
        error_message TEXT,
        created_at    TIMESTAMPTZ NOT NULL,
        updated_at    TIMESTAMPTZ NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS pause_record (
        id                TEXT PRIMARY KEY,
        execution_id      TEXT NOT NULL REFERENCES workflow_execution(id),
        paused_step_id    TEXT NOT NULL,
        pause_reason      TEXT NOT NULL,
        resume_conditions JSONB NOT NULL DEFAULT '{}'::jsonb,
        status            TEXT NOT NULL,
        timeout_at        TIMESTAMPTZ NOT NULL,
        timeout_action    TEXT NOT NULL,
        default_response  JSONB,
        resume_reason     TEXT,
        resume_data       JSONB,
        created_at        TIMESTAMPTZ NOT NULL,
        resolved_at       TIMESTAMPTZ
    )
    "#,
    r#"
    CREATE UNIQUE INDEX IF NOT EXISTS pause_record_one_active
        ON pause_record (execution_id)
        WHERE status = 'active'
    "#,
    r#"
    CREATE INDEX IF NOT EXISTS pause_record_timeout
        ON pause_record (timeout_at)
        WHERE status = 'active'
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS interaction (
        id               TEXT PRIMARY KEY,
        execution_id     TEXT NOT NULL REFERENCES workflow_execution(id),
        step_id          TEXT NOT NULL,
        pause_id         TEXT NOT NULL REFERENCES pause_record(id),
        interaction_type TEXT NOT NULL,
        channel          TEXT NOT NULL,
        title            TEXT NOT NULL,
        message          TEXT NOT NULL,
        options          JSONB NOT NULL DEFAULT '[]'::jsonb,
        status           TEXT NOT NULL,
        expires_at       TIMESTAMPTZ NOT NULL,
        warning_sent     BOOLEAN NOT NULL DEFAULT FALSE,
        response         JSONB,
        created_at       TIMESTAMPTZ NOT NULL,
        responded_at     TIMESTAMPTZ
    )
    "#,
    r#"
    CREATE INDEX IF NOT EXISTS interaction_pause
        ON interaction (pause_id)
    "#,
];

/// Create the engine schema and tables if they do not exist yet.
pub async fn ensure_schema(pool: &DbPool, schema: &str) -> Result<(), sqlx::Error> {
    if !is_identifier(schema) {
        return Err(sqlx::Error::Configuration(
            format!("invalid schema name '{}'", schema).into(),
        ));
    }

    sqlx::query(&format!("CREATE SCHEMA IF NOT EXISTS {}", schema))
        .execute(pool)
        .await?;

    for statement in SCHEMA_STATEMENTS {
        sqlx::query(statement).execute(pool).await?;
    }

    tracing::info!(schema = %schema, "Database schema ready");
    Ok(())
}

fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}
