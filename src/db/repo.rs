use crate::model::{Identity, Session};
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::{Row, SqlitePool};
use tracing::instrument;
use uuid::Uuid;

pub type Pool = SqlitePool;

const CURRENT_KEY: &str = "current";

pub async fn init_pool(database_url: &str) -> Result<Pool> {
    let normalized = prepare_sqlite_url(database_url);
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect(&normalized)
        .await
        .with_context(|| format!("failed to open session cache at {}", normalized))?;
    sqlx::query("PRAGMA journal_mode=WAL;")
        .execute(&pool)
        .await?;
    Ok(pool)
}

/// If using a file-backed SQLite URL, expand a leading `~/`, ensure the parent
/// directory exists and ask SQLite to create the file. In-memory URLs pass through.
fn prepare_sqlite_url(url: &str) -> String {
    if !url.starts_with("sqlite:") || url.starts_with("sqlite::memory") {
        return url.to_string();
    }

    let rest = &url["sqlite:".len()..];
    let path_with_query = rest.strip_prefix("//").unwrap_or(rest);
    let (path_part, query_part) = match path_with_query.split_once('?') {
        Some((p, q)) => (p, Some(q)),
        None => (path_with_query, None),
    };
    if path_part.is_empty() {
        return url.to_string();
    }

    let expanded_path = match (path_part.strip_prefix("~/"), std::env::var("HOME")) {
        (Some(rest), Ok(home)) => format!("{}/{}", home.trim_end_matches('/'), rest),
        _ => path_part.to_string(),
    };

    if let Some(parent) = std::path::Path::new(&expanded_path).parent() {
        if !parent.as_os_str().is_empty() {
            let _ = std::fs::create_dir_all(parent);
        }
    }

    let query = match query_part {
        Some(q) if q.contains("mode=") => q.to_string(),
        Some(q) => format!("{}&mode=rwc", q),
        None => "mode=rwc".to_string(),
    };
    format!("sqlite://{}?{}", expanded_path, query)
}

pub async fn run_migrations(pool: &Pool) -> Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

#[instrument(skip_all)]
pub async fn save_session(pool: &Pool, session: &Session) -> Result<()> {
    sqlx::query(
        "INSERT INTO sessions (key, user_id, email, access_token, refresh_token, expires_at, saved_at)
         VALUES (?, ?, ?, ?, ?, ?, CURRENT_TIMESTAMP)
         ON CONFLICT(key) DO UPDATE SET
            user_id = excluded.user_id,
            email = excluded.email,
            access_token = excluded.access_token,
            refresh_token = excluded.refresh_token,
            expires_at = excluded.expires_at,
            saved_at = CURRENT_TIMESTAMP",
    )
    .bind(CURRENT_KEY)
    .bind(session.user.id.to_string())
    .bind(session.user.email.as_deref())
    .bind(&session.access_token)
    .bind(&session.refresh_token)
    .bind(session.expires_at)
    .execute(pool)
    .await?;
    Ok(())
}

/// The cached session, unless there is none or it has expired.
#[instrument(skip_all)]
pub async fn load_session(pool: &Pool, now: DateTime<Utc>) -> Result<Option<Session>> {
    let row = sqlx::query(
        "SELECT user_id, email, access_token, refresh_token, expires_at FROM sessions WHERE key = ?",
    )
    .bind(CURRENT_KEY)
    .fetch_optional(pool)
    .await?;
    let Some(row) = row else {
        return Ok(None);
    };

    let user_id: String = row.get("user_id");
    let expires_at: Option<DateTime<Utc>> = row.try_get("expires_at")?;
    if expires_at.is_some_and(|at| at <= now) {
        return Ok(None);
    }
    Ok(Some(Session {
        access_token: row.get("access_token"),
        refresh_token: row.get("refresh_token"),
        expires_at,
        user: Identity {
            id: Uuid::parse_str(&user_id).context("cached session has invalid user id")?,
            email: row.get("email"),
        },
    }))
}

#[instrument(skip_all)]
pub async fn clear_session(pool: &Pool) -> Result<()> {
    sqlx::query("DELETE FROM sessions WHERE key = ?")
        .bind(CURRENT_KEY)
        .execute(pool)
        .await?;
    Ok(())
}
