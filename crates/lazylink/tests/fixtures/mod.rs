//! Shared product/category fixtures for the integration suites.

#![allow(dead_code)]

use lazylink::prelude::*;
use lazylink_sqlite::SqliteConnection;
use std::sync::{Arc, OnceLock};

pub static PRODUCT_DEF: EntityDef = EntityDef::new(
    "Product",
    "product",
    &[
        FieldDef::new("id", ColumnType::Integer).primary_key(),
        FieldDef::new("name", ColumnType::Text),
    ],
);

pub static CATEGORY_DEF: EntityDef = EntityDef::new(
    "Category",
    "category",
    &[
        FieldDef::new("id", ColumnType::Integer).primary_key(),
        FieldDef::new("name", ColumnType::Text),
    ],
);

pub static PRODUCT_CATEGORIES: RelationDef =
    RelationDef::new("categories", &PRODUCT_DEF, &CATEGORY_DEF).link(
        "category_products",
        "product_id",
        "category_id",
    );

pub static CATEGORY_PRODUCTS: RelationDef =
    RelationDef::new("products", &CATEGORY_DEF, &PRODUCT_DEF)
        .link("category_products", "category_id", "product_id")
        .owner();

/// Process-wide registry, built once and read-only thereafter.
pub fn registry() -> Arc<Registry> {
    static REGISTRY: OnceLock<Arc<Registry>> = OnceLock::new();
    Arc::clone(REGISTRY.get_or_init(|| {
        Arc::new(
            Registry::builder()
                .entity(&PRODUCT_DEF)
                .entity(&CATEGORY_DEF)
                .relation(&PRODUCT_CATEGORIES)
                .relation(&CATEGORY_PRODUCTS)
                .build()
                .expect("fixture registry is valid"),
        )
    }))
}

#[derive(Debug, Clone)]
pub struct Product {
    pub id: Option<i64>,
    pub name: String,
    pub categories: Collection<Category>,
}

impl Product {
    pub fn new(name: &str) -> Self {
        Self {
            id: None,
            name: name.to_string(),
            categories: Collection::new(&PRODUCT_CATEGORIES),
        }
    }
}

impl Entity for Product {
    const ENTITY_NAME: &'static str = "Product";
    const TABLE_NAME: &'static str = "product";

    fn id(&self) -> Option<i64> {
        self.id
    }

    fn set_id(&mut self, id: i64) {
        self.id = Some(id);
        self.categories.set_owner(id);
    }

    fn to_row(&self) -> Vec<(&'static str, Value)> {
        vec![("name", Value::from(self.name.clone()))]
    }

    fn from_row(row: &Row) -> Result<Self> {
        let id: i64 = row.get_named("id")?;
        Ok(Self {
            id: Some(id),
            name: row.get_named("name")?,
            categories: Collection::for_owner(&PRODUCT_CATEGORIES, id),
        })
    }

    fn drain_links(&mut self) -> Result<Vec<LinkOp>> {
        self.categories.drain_link_ops()
    }

    fn has_pending_links(&self) -> bool {
        self.categories.staged_len() > 0
    }
}

#[derive(Debug, Clone)]
pub struct Category {
    pub id: Option<i64>,
    pub name: String,
    pub products: Collection<Product>,
}

impl Category {
    pub fn new(name: &str) -> Self {
        Self {
            id: None,
            name: name.to_string(),
            products: Collection::new(&CATEGORY_PRODUCTS),
        }
    }
}

impl Entity for Category {
    const ENTITY_NAME: &'static str = "Category";
    const TABLE_NAME: &'static str = "category";

    fn id(&self) -> Option<i64> {
        self.id
    }

    fn set_id(&mut self, id: i64) {
        self.id = Some(id);
        self.products.set_owner(id);
    }

    fn to_row(&self) -> Vec<(&'static str, Value)> {
        vec![("name", Value::from(self.name.clone()))]
    }

    fn from_row(row: &Row) -> Result<Self> {
        let id: i64 = row.get_named("id")?;
        Ok(Self {
            id: Some(id),
            name: row.get_named("name")?,
            products: Collection::for_owner(&CATEGORY_PRODUCTS, id),
        })
    }

    fn drain_links(&mut self) -> Result<Vec<LinkOp>> {
        self.products.drain_link_ops()
    }

    fn has_pending_links(&self) -> bool {
        self.products.staged_len() > 0
    }
}

/// Open a fresh in-memory database with the fixture schema applied.
pub fn fresh_database() -> SqliteConnection {
    let conn = SqliteConnection::open_memory().expect("open sqlite memory db");
    let registry = registry();
    for statement in SchemaBuilder::new(&registry).create_statements() {
        conn.execute_raw(&statement).expect("schema statement");
    }
    conn
}

pub fn unwrap_outcome<T>(outcome: Outcome<T, Error>) -> T {
    match outcome {
        Outcome::Ok(v) => v,
        Outcome::Err(e) => panic!("unexpected error: {e}"),
        Outcome::Cancelled(r) => panic!("cancelled: {r:?}"),
        Outcome::Panicked(p) => panic!("panicked: {p:?}"),
    }
}
