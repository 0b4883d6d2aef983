//! SQLite driver for lazylink.
//!
//! Wraps `libsqlite3-sys` in a safe [`SqliteConnection`] implementing the
//! `Connection` trait from `lazylink-core`. The loader test-beds run
//! entirely against in-memory databases opened with
//! [`SqliteConnection::open_memory`].

mod connection;
mod types;

pub use connection::{SqliteConfig, SqliteConnection};
