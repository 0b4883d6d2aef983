//! lazylink — batched lazy loading for many-to-many SQL relations.
//!
//! lazylink loads the many-to-many members of an entity row lazily,
//! either one owner at a time or consolidated through an explicit batch
//! window, against in-memory SQLite:
//!
//! ```ignore
//! use lazylink::prelude::*;
//!
//! // Seed through the session.
//! let mut session = Session::new(conn, registry);
//! let p1 = session.create(Product::new("Product 1"));
//! let c1 = session.create(Category::new("Category 1"));
//! c1.with(|c| c.products.add(&[p1.clone()]));
//! session.flush(&cx).await;
//!
//! // Immediate initialization: one query for this owner.
//! let product = session
//!     .find_one_or_fail::<Product>(&cx, Filter::eq("name", "Product 1"))
//!     .await;
//! product.categories.init(&cx, session.connection(), InitOptions::new()).await;
//!
//! // Batched initialization: requests collected in a window, one query
//! // per relation at the flush boundary.
//! let window = BatchWindow::new();
//! let pending = product
//!     .categories
//!     .init_batched(&window, InitOptions::new().dataloader())?;
//! window.flush(&cx, session.connection()).await;
//! ```

// Re-export the public surface of the sub-crates.
pub use lazylink_core::{
    ColumnType, Connection, Cx, Entity, EntityDef, EntityRef, Error, FieldDef, LinkOp, Outcome,
    Registry, RegistryBuilder, RelationDef, Result, Row, Value, is_valid_identifier, quote_ident,
    rows_to_json,
};

pub use lazylink_loader::{
    BatchWindow, Collection, CollectionState, InitOptions, PendingInit, RequestState,
    WindowSummary, sql,
};

pub mod schema;
pub mod session;

pub use schema::SchemaBuilder;
pub use session::{Filter, FlushReport, Session};

/// Everything a typical caller needs.
pub mod prelude {
    pub use crate::{
        BatchWindow, Collection, CollectionState, ColumnType, Connection, Cx, Entity, EntityDef,
        EntityRef, Error, FieldDef, Filter, FlushReport, InitOptions, LinkOp, Outcome, PendingInit,
        Registry, RelationDef, RequestState, Result, Row, SchemaBuilder, Session, Value,
        WindowSummary, rows_to_json,
    };
}
