//! SQLite connection implementation.
//!
//! A thread-safe wrapper around a SQLite database handle, implementing
//! the `Connection` trait from `lazylink-core`. All FFI access goes
//! through `libsqlite3-sys` with the bundled amalgamation.

// Allow casts in FFI code where we need to match C types exactly
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_lossless)]

use crate::types;
use lazylink_core::{
    Connection, Cx, Error, Outcome, Row, Value,
    error::{ConnectionError, ConnectionErrorKind, QueryError, QueryErrorKind, Result},
    row::ColumnInfo,
};
use libsqlite3_sys as ffi;
use std::ffi::{CStr, CString, c_int};
use std::future::Future;
use std::ptr;
use std::sync::{Arc, Mutex, PoisonError};

/// Configuration for opening SQLite connections.
#[derive(Debug, Clone)]
pub struct SqliteConfig {
    /// Path to the database file, or ":memory:" for an in-memory database.
    pub path: String,
    /// Busy timeout in milliseconds.
    pub busy_timeout_ms: u32,
}

impl Default for SqliteConfig {
    fn default() -> Self {
        Self {
            path: ":memory:".to_string(),
            busy_timeout_ms: 5000,
        }
    }
}

impl SqliteConfig {
    /// Config for an in-memory database.
    pub fn memory() -> Self {
        Self::default()
    }

    /// Config for a file-based database.
    pub fn file(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            ..Self::default()
        }
    }

    /// Set the busy timeout.
    pub fn busy_timeout(mut self, ms: u32) -> Self {
        self.busy_timeout_ms = ms;
        self
    }
}

struct SqliteInner {
    db: *mut ffi::sqlite3,
}

// SAFETY: the handle is only touched while holding the connection mutex.
unsafe impl Send for SqliteInner {}

/// A connection to a SQLite database.
pub struct SqliteConnection {
    inner: Mutex<SqliteInner>,
    path: String,
}

// SAFETY: all access to the raw handle goes through the mutex.
unsafe impl Send for SqliteConnection {}
unsafe impl Sync for SqliteConnection {}

impl SqliteConnection {
    /// Open a connection with the given configuration.
    pub fn open(config: &SqliteConfig) -> Result<Self> {
        let c_path = CString::new(config.path.as_str()).map_err(|_| {
            Error::Connection(ConnectionError {
                kind: ConnectionErrorKind::Open,
                message: "invalid path: contains null byte".to_string(),
            })
        })?;

        let mut db: *mut ffi::sqlite3 = ptr::null_mut();
        let flags = ffi::SQLITE_OPEN_READWRITE | ffi::SQLITE_OPEN_CREATE;

        // SAFETY: we pass valid pointers and check the return value.
        let rc = unsafe { ffi::sqlite3_open_v2(c_path.as_ptr(), &mut db, flags, ptr::null()) };

        if rc != ffi::SQLITE_OK {
            let message = if db.is_null() {
                error_string(rc)
            } else {
                // SAFETY: db is valid; errmsg returns a valid C string.
                unsafe {
                    let msg = CStr::from_ptr(ffi::sqlite3_errmsg(db))
                        .to_string_lossy()
                        .into_owned();
                    ffi::sqlite3_close(db);
                    msg
                }
            };
            return Err(Error::Connection(ConnectionError {
                kind: ConnectionErrorKind::Open,
                message: format!("failed to open database: {message}"),
            }));
        }

        if config.busy_timeout_ms > 0 {
            // SAFETY: db is valid.
            unsafe {
                ffi::sqlite3_busy_timeout(db, config.busy_timeout_ms as c_int);
            }
        }

        Ok(Self {
            inner: Mutex::new(SqliteInner { db }),
            path: config.path.clone(),
        })
    }

    /// Open an in-memory database.
    pub fn open_memory() -> Result<Self> {
        Self::open(&SqliteConfig::memory())
    }

    /// Open a file-based database.
    pub fn open_file(path: impl Into<String>) -> Result<Self> {
        Self::open(&SqliteConfig::file(path))
    }

    /// The database path.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Execute SQL directly without preparing (DDL, pragmas).
    pub fn execute_raw(&self, sql: &str) -> Result<()> {
        let inner = self.lock_inner();
        let c_sql = CString::new(sql).map_err(|_| syntax_error(sql, "SQL contains null byte"))?;

        let mut errmsg: *mut std::ffi::c_char = ptr::null_mut();

        // SAFETY: all pointers are valid.
        let rc = unsafe {
            ffi::sqlite3_exec(inner.db, c_sql.as_ptr(), None, ptr::null_mut(), &mut errmsg)
        };

        if rc != ffi::SQLITE_OK {
            let message = if errmsg.is_null() {
                error_string(rc)
            } else {
                // SAFETY: errmsg is a valid C string allocated by SQLite.
                unsafe {
                    let msg = CStr::from_ptr(errmsg).to_string_lossy().into_owned();
                    ffi::sqlite3_free(errmsg.cast());
                    msg
                }
            };
            return Err(Error::Query(QueryError {
                kind: error_code_to_kind(rc),
                sql: Some(sql.to_string()),
                message,
            }));
        }

        Ok(())
    }

    /// The rowid assigned by the most recent successful INSERT.
    pub fn last_insert_rowid(&self) -> i64 {
        let inner = self.lock_inner();
        // SAFETY: db is valid.
        unsafe { ffi::sqlite3_last_insert_rowid(inner.db) }
    }

    /// Rows changed by the most recent statement.
    pub fn changes(&self) -> i64 {
        let inner = self.lock_inner();
        // SAFETY: db is valid.
        unsafe { i64::from(ffi::sqlite3_changes(inner.db)) }
    }

    fn lock_inner(&self) -> std::sync::MutexGuard<'_, SqliteInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn query_sync(&self, sql: &str, params: &[Value]) -> Result<Vec<Row>> {
        tracing::debug!(sql = %sql, "executing query");
        let inner = self.lock_inner();
        let stmt = prepare_stmt(inner.db, sql)?;

        for (i, param) in params.iter().enumerate() {
            // SAFETY: stmt is valid; index is 1-based.
            let rc = unsafe { types::bind_value(stmt, (i + 1) as c_int, param) };
            if rc != ffi::SQLITE_OK {
                // SAFETY: stmt is valid.
                unsafe { ffi::sqlite3_finalize(stmt) };
                return Err(bind_error(inner.db, sql, i + 1));
            }
        }

        // SAFETY: stmt is valid.
        let col_count = unsafe { ffi::sqlite3_column_count(stmt) };
        let mut col_names = Vec::with_capacity(col_count as usize);
        for i in 0..col_count {
            let name =
                unsafe { types::column_name(stmt, i) }.unwrap_or_else(|| format!("col{i}"));
            col_names.push(name);
        }
        let columns = Arc::new(ColumnInfo::new(col_names));

        let mut rows = Vec::new();
        loop {
            // SAFETY: stmt is valid.
            let rc = unsafe { ffi::sqlite3_step(stmt) };
            match rc {
                ffi::SQLITE_ROW => {
                    let mut values = Vec::with_capacity(col_count as usize);
                    for i in 0..col_count {
                        // SAFETY: stmt is valid and just returned SQLITE_ROW.
                        values.push(unsafe { types::read_column(stmt, i) });
                    }
                    rows.push(Row::with_columns(Arc::clone(&columns), values));
                }
                ffi::SQLITE_DONE => break,
                _ => {
                    // SAFETY: stmt is valid.
                    unsafe { ffi::sqlite3_finalize(stmt) };
                    return Err(step_error(inner.db, sql, rc));
                }
            }
        }

        // SAFETY: stmt is valid.
        unsafe { ffi::sqlite3_finalize(stmt) };

        Ok(rows)
    }

    fn execute_sync(&self, sql: &str, params: &[Value]) -> Result<u64> {
        tracing::debug!(sql = %sql, "executing statement");
        let inner = self.lock_inner();
        let stmt = prepare_stmt(inner.db, sql)?;

        for (i, param) in params.iter().enumerate() {
            // SAFETY: stmt is valid; index is 1-based.
            let rc = unsafe { types::bind_value(stmt, (i + 1) as c_int, param) };
            if rc != ffi::SQLITE_OK {
                // SAFETY: stmt is valid.
                unsafe { ffi::sqlite3_finalize(stmt) };
                return Err(bind_error(inner.db, sql, i + 1));
            }
        }

        // SAFETY: stmt is valid.
        let rc = unsafe { ffi::sqlite3_step(stmt) };
        // SAFETY: stmt is valid.
        unsafe { ffi::sqlite3_finalize(stmt) };

        match rc {
            ffi::SQLITE_DONE | ffi::SQLITE_ROW => {
                // SAFETY: db is valid.
                let changes = unsafe { ffi::sqlite3_changes(inner.db) };
                Ok(changes as u64)
            }
            _ => Err(step_error(inner.db, sql, rc)),
        }
    }

    fn insert_sync(&self, sql: &str, params: &[Value]) -> Result<i64> {
        self.execute_sync(sql, params)?;
        Ok(self.last_insert_rowid())
    }
}

impl Drop for SqliteConnection {
    fn drop(&mut self) {
        let inner = self.lock_inner();
        if !inner.db.is_null() {
            // SAFETY: db is valid; all prepared statements are finalized
            // eagerly after each exec/query, so none remain open at close.
            unsafe {
                ffi::sqlite3_close(inner.db);
            }
        }
    }
}

impl Connection for SqliteConnection {
    fn query(
        &self,
        _cx: &Cx,
        sql: &str,
        params: &[Value],
    ) -> impl Future<Output = Outcome<Vec<Row>, Error>> + Send {
        let result = self.query_sync(sql, params);
        async move { result.map_or_else(Outcome::Err, Outcome::Ok) }
    }

    fn execute(
        &self,
        _cx: &Cx,
        sql: &str,
        params: &[Value],
    ) -> impl Future<Output = Outcome<u64, Error>> + Send {
        let result = self.execute_sync(sql, params);
        async move { result.map_or_else(Outcome::Err, Outcome::Ok) }
    }

    fn insert(
        &self,
        _cx: &Cx,
        sql: &str,
        params: &[Value],
    ) -> impl Future<Output = Outcome<i64, Error>> + Send {
        let result = self.insert_sync(sql, params);
        async move { result.map_or_else(Outcome::Err, Outcome::Ok) }
    }

    fn close(self, _cx: &Cx) -> impl Future<Output = Result<()>> + Send {
        // Drop performs the actual close.
        async move {
            drop(self);
            Ok(())
        }
    }
}

fn syntax_error(sql: &str, message: &str) -> Error {
    Error::Query(QueryError {
        kind: QueryErrorKind::Syntax,
        sql: Some(sql.to_string()),
        message: message.to_string(),
    })
}

fn prepare_stmt(db: *mut ffi::sqlite3, sql: &str) -> Result<*mut ffi::sqlite3_stmt> {
    let c_sql = CString::new(sql).map_err(|_| syntax_error(sql, "SQL contains null byte"))?;

    let mut stmt: *mut ffi::sqlite3_stmt = ptr::null_mut();
    // SAFETY: all pointers are valid; -1 means read until the terminator.
    let rc = unsafe {
        ffi::sqlite3_prepare_v2(db, c_sql.as_ptr(), -1, &mut stmt, ptr::null_mut())
    };

    if rc != ffi::SQLITE_OK {
        return Err(Error::Query(QueryError {
            kind: QueryErrorKind::Syntax,
            sql: Some(sql.to_string()),
            message: db_message(db, rc),
        }));
    }
    Ok(stmt)
}

fn bind_error(db: *mut ffi::sqlite3, sql: &str, index: usize) -> Error {
    Error::Query(QueryError {
        kind: QueryErrorKind::Bind,
        sql: Some(sql.to_string()),
        message: format!("failed to bind parameter {index}: {}", db_message(db, 0)),
    })
}

fn step_error(db: *mut ffi::sqlite3, sql: &str, rc: c_int) -> Error {
    Error::Query(QueryError {
        kind: error_code_to_kind(rc),
        sql: Some(sql.to_string()),
        message: db_message(db, rc),
    })
}

fn db_message(db: *mut ffi::sqlite3, rc: c_int) -> String {
    if db.is_null() {
        return error_string(rc);
    }
    // SAFETY: db is valid; errmsg returns a valid C string.
    unsafe {
        CStr::from_ptr(ffi::sqlite3_errmsg(db))
            .to_string_lossy()
            .into_owned()
    }
}

fn error_string(rc: c_int) -> String {
    // SAFETY: sqlite3_errstr returns a static string for any code.
    unsafe {
        CStr::from_ptr(ffi::sqlite3_errstr(rc))
            .to_string_lossy()
            .into_owned()
    }
}

/// Map a SQLite result code to a query error kind. Extended result codes
/// carry the primary code in their low byte.
fn error_code_to_kind(rc: c_int) -> QueryErrorKind {
    match rc & 0xff {
        ffi::SQLITE_CONSTRAINT => QueryErrorKind::Constraint,
        ffi::SQLITE_MISMATCH | ffi::SQLITE_RANGE => QueryErrorKind::Bind,
        _ => QueryErrorKind::Database,
    }
}
