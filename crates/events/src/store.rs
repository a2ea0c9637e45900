//! Raw SQL for the `events` table: insertion (with backend-native
//! `NOTIFY`), and the catchup range query.

use sqlx::any::install_default_drivers;
use sqlx::{AnyPool, Row};

use tarsy_domain::config::DbBackend;
use tarsy_domain::error::{Error, Result};
use tarsy_domain::model::{Event, EventPayload};

pub async fn connect(url: &str, pool_size: u32) -> Result<AnyPool> {
    install_default_drivers();
    let pool = sqlx::any::AnyPoolOptions::new()
        .max_connections(pool_size)
        .connect(url)
        .await
        .map_err(|e| Error::Other(format!("connecting event store: {e}")))?;
    migrate(&pool, backend_from_url(url)).await?;
    Ok(pool)
}

/// `events::connect` only receives a connection URL, not a parsed
/// `DbBackend`, so the backend is sniffed from the URL scheme the same
/// way `sqlx::any` itself dispatches drivers.
fn backend_from_url(url: &str) -> DbBackend {
    if url.starts_with("postgres://") || url.starts_with("postgresql://") {
        DbBackend::Postgres
    } else {
        DbBackend::Sqlite
    }
}

/// `id` must be backend-native autoincrement/identity: a bare `BIGINT
/// PRIMARY KEY` has no default on either backend, so `INSERT … RETURNING
/// id` without supplying `id` would violate the NOT NULL PK constraint on
/// Postgres and insert a NULL id on SQLite (only the literal `INTEGER
/// PRIMARY KEY` type aliases `rowid` there).
async fn migrate(pool: &AnyPool, backend: DbBackend) -> Result<()> {
    let ddl = match backend {
        DbBackend::Sqlite => {
            "CREATE TABLE IF NOT EXISTS events (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                channel TEXT NOT NULL,
                payload TEXT NOT NULL,
                created_at TEXT NOT NULL
            )"
        }
        DbBackend::Postgres => {
            "CREATE TABLE IF NOT EXISTS events (
                id BIGSERIAL PRIMARY KEY,
                channel TEXT NOT NULL,
                payload TEXT NOT NULL,
                created_at TEXT NOT NULL
            )"
        }
    };
    sqlx::query(ddl).execute(pool).await.map_err(|e| Error::Other(format!("creating events table: {e}")))?;
    Ok(())
}

/// Double-quotes a SQL identifier, doubling any embedded double quote —
/// `NOTIFY` does not accept bind parameters for the channel name.
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Single-quotes a SQL string literal, doubling any embedded single
/// quote, for embedding the JSON payload directly in the `NOTIFY`
/// statement text.
pub fn quote_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

/// Inserts an event row on `executor` (the caller's transaction) and,
/// on PostgreSQL, additionally issues `NOTIFY` so that any connected
/// `PgListener` wakes immediately instead of waiting for the next poll.
/// Returns the assigned `id`.
pub async fn insert_event(
    tx: &mut sqlx::Transaction<'_, sqlx::Any>,
    backend: DbBackend,
    channel: &str,
    payload: &EventPayload,
) -> Result<i64> {
    let payload_json =
        serde_json::to_string(payload).map_err(|e| Error::Other(format!("serializing event payload: {e}")))?;
    let created_at = chrono::Utc::now().to_rfc3339();

    let row = sqlx::query("INSERT INTO events (channel, payload, created_at) VALUES (?, ?, ?) RETURNING id")
        .bind(channel)
        .bind(&payload_json)
        .bind(&created_at)
        .fetch_one(&mut **tx)
        .await
        .map_err(|e| Error::Other(format!("inserting event: {e}")))?;
    let id: i64 = row.try_get("id").map_err(|e| Error::Other(e.to_string()))?;

    if backend.supports_notify() {
        let notify_sql = format!("NOTIFY {}, {}", quote_ident(channel), quote_literal(&payload_json));
        sqlx::query(&notify_sql)
            .execute(&mut **tx)
            .await
            .map_err(|e| Error::Other(format!("issuing NOTIFY: {e}")))?;
    }

    Ok(id)
}

/// Events on `channel` with `id > since_id`, oldest first, capped at 100
/// per the catchup contract.
pub async fn events_after(pool: &AnyPool, channel: &str, since_id: i64) -> Result<Vec<Event>> {
    let rows = sqlx::query("SELECT * FROM events WHERE channel = ? AND id > ? ORDER BY id ASC LIMIT 100")
        .bind(channel)
        .bind(since_id)
        .fetch_all(pool)
        .await
        .map_err(|e| Error::Other(format!("querying events: {e}")))?;
    rows.into_iter().map(event_from_row).collect()
}

fn event_from_row(row: sqlx::any::AnyRow) -> Result<Event> {
    let id: i64 = row.try_get("id").map_err(|e| Error::Other(e.to_string()))?;
    let channel: String = row.try_get("channel").map_err(|e| Error::Other(e.to_string()))?;
    let payload_raw: String = row.try_get("payload").map_err(|e| Error::Other(e.to_string()))?;
    let created_at_raw: String = row.try_get("created_at").map_err(|e| Error::Other(e.to_string()))?;
    let payload: EventPayload =
        serde_json::from_str(&payload_raw).map_err(|e| Error::Other(format!("parsing event payload: {e}")))?;
    let created_at = chrono::DateTime::parse_from_rfc3339(&created_at_raw)
        .map_err(|e| Error::Other(format!("parsing event created_at: {e}")))?
        .with_timezone(&chrono::Utc);
    Ok(Event { id, channel, payload, created_at })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quote_ident_doubles_embedded_quotes() {
        assert_eq!(quote_ident("session:abc"), "\"session:abc\"");
        assert_eq!(quote_ident("weird\"name"), "\"weird\"\"name\"");
    }

    #[test]
    fn quote_literal_doubles_embedded_single_quotes() {
        assert_eq!(quote_literal("it's fine"), "'it''s fine'");
    }

    #[test]
    fn backend_from_url_detects_postgres_schemes() {
        assert_eq!(backend_from_url("postgres://user@host/db"), DbBackend::Postgres);
        assert_eq!(backend_from_url("postgresql://user@host/db"), DbBackend::Postgres);
    }

    #[test]
    fn backend_from_url_defaults_to_sqlite() {
        assert_eq!(backend_from_url("sqlite::memory:"), DbBackend::Sqlite);
        assert_eq!(backend_from_url("sqlite://tarsy.db"), DbBackend::Sqlite);
    }

    #[tokio::test]
    async fn insert_event_assigns_monotonic_ids_on_sqlite() {
        let pool = connect("sqlite::memory:", 1).await.unwrap();
        let mut tx = pool.begin().await.unwrap();
        let first = insert_event(&mut tx, DbBackend::Sqlite, "sessions", &EventPayload::SessionCreated { session_id: "s1".into() })
            .await
            .unwrap();
        let second = insert_event(&mut tx, DbBackend::Sqlite, "sessions", &EventPayload::SessionCreated { session_id: "s2".into() })
            .await
            .unwrap();
        tx.commit().await.unwrap();
        assert!(second > first);
    }
}
