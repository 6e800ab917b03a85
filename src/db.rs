use std::{path::Path, sync::Arc};

use rusqlite::fallible_iterator::FallibleIterator;
use rusqlite::{ErrorCode, OptionalExtension, params};
use tokio::sync::Mutex;

use crate::{code, model};

/// How many freshly generated codes may collide before giving up.
pub const MAX_ATTEMPTS: usize = 10;

#[derive(Debug)]
pub enum DbError {
    Sqlite(rusqlite::Error),
    /// the short code is already taken
    Conflict(String),
    /// no row for the short code
    NotFound(String),
    /// every generated code collided
    Exhausted(usize),
}

impl std::fmt::Display for DbError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DbError::Sqlite(e) => write!(f, "sqlite: {}", e),
            DbError::Conflict(code) => write!(f, "short code already exists: {}", code),
            DbError::NotFound(code) => write!(f, "no link for short code: {}", code),
            DbError::Exhausted(attempts) => write!(f, "no unique short code after {} attempts", attempts),
        }
    }
}

impl std::error::Error for DbError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            DbError::Sqlite(e) => Some(e),
            _ => None,
        }
    }
}

impl From<rusqlite::Error> for DbError {
    fn from(e: rusqlite::Error) -> Self {
        DbError::Sqlite(e)
    }
}

fn is_unique_violation(e: &rusqlite::Error) -> bool {
    matches!(
        e,
        rusqlite::Error::SqliteFailure(err, _) if err.code == ErrorCode::ConstraintViolation
    )
}

fn record_from_row(row: &rusqlite::Row<'_>) -> Result<model::LinkRecord, rusqlite::Error> {
    Ok(model::LinkRecord {
        short_code: row.get(0)?,
        original_url: row.get(1)?,
        created_at: row.get(2)?,
        click_count: row.get(3)?,
    })
}

const SELECT_RECORD: &str = r#"SELECT short_code, original_url, created_at, click_count FROM urls"#;

fn find_by_url(conn: &rusqlite::Connection, url: &str) -> Result<Option<model::LinkRecord>, DbError> {
    let mut stmt = conn.prepare_cached(&format!("{SELECT_RECORD} WHERE original_url = ?1 ORDER BY id LIMIT 1"))?;
    Ok(stmt.query_row([url], record_from_row).optional()?)
}

fn find_by_code(conn: &rusqlite::Connection, code: &str) -> Result<Option<model::LinkRecord>, DbError> {
    let mut stmt = conn.prepare_cached(&format!("{SELECT_RECORD} WHERE short_code = ?1"))?;
    Ok(stmt.query_row([code], record_from_row).optional()?)
}

fn insert(conn: &rusqlite::Connection, url: &str, code: &str) -> Result<model::LinkRecord, DbError> {
    let record = model::LinkRecord {
        short_code: code.to_string(),
        original_url: url.to_string(),
        created_at: chrono::Utc::now(),
        click_count: 0,
    };
    conn.execute(
        r#"INSERT INTO urls (original_url, short_code, created_at, click_count) values (?1, ?2, ?3, ?4)"#,
        params![record.original_url, record.short_code, record.created_at, record.click_count],
    )
    .map_err(|e| {
        if is_unique_violation(&e) {
            DbError::Conflict(code.to_string())
        } else {
            DbError::from(e)
        }
    })?;
    Ok(record)
}

/// Data access for the `urls` table. Clones share one connection.
#[derive(Clone, Debug)]
pub struct LinkDAO {
    connection: Arc<Mutex<rusqlite::Connection>>,
}

impl LinkDAO {
    fn new(connection: Arc<Mutex<rusqlite::Connection>>) -> Self {
        Self { connection }
    }

    pub async fn find_by_url(&self, url: &str) -> Result<Option<model::LinkRecord>, DbError> {
        let conn = self.connection.lock().await;
        find_by_url(&conn, url)
    }

    pub async fn find_by_code(&self, code: &str) -> Result<Option<model::LinkRecord>, DbError> {
        let conn = self.connection.lock().await;
        find_by_code(&conn, code)
    }

    /// Stores a new link. A taken `code` is reported as [`DbError::Conflict`],
    /// the existing row is left alone.
    pub async fn insert(&self, url: &str, code: &str) -> Result<model::LinkRecord, DbError> {
        let conn = self.connection.lock().await;
        insert(&conn, url, code)
    }

    pub async fn increment_click(&self, code: &str) -> Result<(), DbError> {
        let conn = self.connection.lock().await;

        let updated = conn.execute(
            r#"UPDATE urls SET click_count = click_count + 1 WHERE short_code = ?1"#,
            [code],
        )?;
        if updated == 0 {
            return Err(DbError::NotFound(code.to_string()));
        }

        Ok(())
    }

    /// Counts one click and returns the record as it is afterwards, or `None`
    /// when the code is unknown. Lookup and increment are one statement.
    pub async fn record_click(&self, code: &str) -> Result<Option<model::LinkRecord>, DbError> {
        let conn = self.connection.lock().await;

        let mut stmt = conn.prepare_cached(
            r#"UPDATE urls SET click_count = click_count + 1 WHERE short_code = ?1
    RETURNING short_code, original_url, created_at, click_count"#,
        )?;
        Ok(stmt.query_row([code], record_from_row).optional()?)
    }

    /// All records, newest first.
    pub async fn list_all(&self) -> Result<Vec<model::LinkRecord>, DbError> {
        let conn = self.connection.lock().await;

        let mut stmt: rusqlite::Statement<'_> =
            conn.prepare(&format!("{SELECT_RECORD} ORDER BY created_at DESC, id DESC"))?;
        let rows = stmt.query([])?;
        let results: Vec<model::LinkRecord> = rows.map(|row| record_from_row(row)).collect()?;
        Ok(results)
    }

    /// Returns the record for `url`, minting one with a fresh code of
    /// `code_len` characters if the url has not been shortened before.
    ///
    /// Lookup and insert happen under one lock and one transaction so a url
    /// never ends up with two codes.
    pub async fn get_or_create(&self, url: &str, code_len: usize) -> Result<(model::LinkRecord, bool), DbError> {
        let mut conn = self.connection.lock().await;
        let tx = conn.transaction()?;

        if let Some(existing) = find_by_url(&tx, url)? {
            tracing::debug!("url already shortened: {}", existing);
            return Ok((existing, false));
        }

        for attempt in 1..=MAX_ATTEMPTS {
            let candidate = code::generate(code_len);
            if find_by_code(&tx, &candidate)?.is_some() {
                tracing::debug!("short code collision on attempt {}: {}", attempt, candidate);
                continue;
            }
            match insert(&tx, url, &candidate) {
                Ok(record) => {
                    tx.commit()?;
                    return Ok((record, true));
                }
                Err(DbError::Conflict(taken)) => {
                    tracing::debug!("short code collision on attempt {}: {}", attempt, taken);
                }
                Err(e) => return Err(e),
            }
        }

        Err(DbError::Exhausted(MAX_ATTEMPTS))
    }
}

/// Db owns the sqlite connection and hands out the DAOs built on it.
#[derive(Clone, Debug)]
pub struct Db {
    pub link: LinkDAO,
}

fn boxed(conn: rusqlite::Connection) -> Arc<Mutex<rusqlite::Connection>> {
    Arc::new(Mutex::new(conn))
}

fn create_urls_table(conn: &rusqlite::Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(
        r#"create table if not exists urls(
    id           INTEGER PRIMARY KEY AUTOINCREMENT,
    original_url TEXT    NOT NULL,
    short_code   TEXT    NOT NULL UNIQUE,
    created_at   TEXT    NOT NULL DEFAULT CURRENT_TIMESTAMP,
    click_count  INTEGER NOT NULL DEFAULT 0
);
create index if not exists urls_original_url on urls(original_url);"#,
    )?;

    Ok(())
}

impl Db {
    pub fn new(connection: rusqlite::Connection) -> Result<Self, rusqlite::Error> {
        create_urls_table(&connection)?;

        let boxed_connection = boxed(connection);
        Ok(Self {
            link: LinkDAO::new(Arc::clone(&boxed_connection)),
        })
    }

    /// Opens (creating if needed) the database file at `path`.
    pub fn open(path: &Path) -> Result<Self, rusqlite::Error> {
        Self::new(rusqlite::Connection::open(path)?)
    }

    /// A database that lives only as long as the process.
    pub fn in_memory() -> Result<Self, rusqlite::Error> {
        Self::new(rusqlite::Connection::open_in_memory()?)
    }
}
