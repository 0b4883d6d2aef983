//! Relation collections and batched loading.
//!
//! This crate implements lazy initialization of many-to-many relation
//! collections in two modes:
//!
//! - **Immediate**: [`Collection::init`] issues one query for its own
//!   owner identifier, joining the join table to the target table.
//! - **Batched**: [`Collection::init_batched`] registers a request in a
//!   [`BatchWindow`]; [`BatchWindow::flush`] consolidates all requests for
//!   the same relation definition into one multi-identifier query and
//!   distributes the result rows back to each requesting collection.
//!
//! The batched query deliberately keeps the double-join shape whose row
//! fan-out this repository pins down; distribution deduplicates by target
//! identifier, so collections always resolve to the distinct matching
//! rows. See the `sql` module for the exact query texts.

pub mod collection;
pub mod options;
pub mod sql;
pub mod window;

#[cfg(test)]
pub(crate) mod testkit;

pub use collection::{Collection, CollectionState};
pub use options::InitOptions;
pub use window::{BatchWindow, PendingInit, RequestState, WindowSummary};
