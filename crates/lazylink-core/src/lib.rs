//! Core types for lazylink.
//!
//! This crate holds everything the loader, driver, and session layers share:
//! dynamic SQL values and result rows, the error type, the entity and
//! relation metadata model, the process-wide metadata registry, and the
//! async `Connection` contract.
//!
//! All async operations integrate with asupersync's structured concurrency:
//! they take a `Cx` context and return an `Outcome` so cancellation
//! propagates instead of being swallowed.

pub mod connection;
pub mod entity;
pub mod error;
pub mod identifiers;
pub mod registry;
pub mod relation;
pub mod row;
pub mod value;

// asupersync re-exports so downstream crates name one source of truth.
pub use asupersync::{Cx, Outcome};

pub use connection::Connection;
pub use entity::{ColumnType, Entity, EntityDef, EntityRef, FieldDef};
pub use error::{Error, Result};
pub use identifiers::{is_valid_identifier, quote_ident};
pub use registry::{Registry, RegistryBuilder};
pub use relation::{LinkOp, RelationDef};
pub use row::{ColumnInfo, FromValue, Row, rows_to_json};
pub use value::Value;
