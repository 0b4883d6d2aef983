//! Shared fixtures for loader unit tests: a small doc/tag schema and a
//! canned-row mock connection.

use lazylink_core::{
    ColumnType, Connection, Cx, Entity, EntityDef, Error, FieldDef, Outcome, RelationDef, Result,
    Row, Value,
    error::{QueryError, QueryErrorKind},
};
use std::future::Future;
use std::sync::{Mutex, PoisonError};

pub static DOC: EntityDef = EntityDef::new(
    "Doc",
    "doc",
    &[
        FieldDef::new("id", ColumnType::Integer).primary_key(),
        FieldDef::new("title", ColumnType::Text),
    ],
);

pub static TAG: EntityDef = EntityDef::new(
    "Tag",
    "tag",
    &[
        FieldDef::new("id", ColumnType::Integer).primary_key(),
        FieldDef::new("name", ColumnType::Text),
    ],
);

/// Doc.tags, owner side of the `doc_tags` join table.
pub static TAG_DOCS: RelationDef = RelationDef::new("tags", &DOC, &TAG)
    .link("doc_tags", "doc_id", "tag_id")
    .owner();

#[derive(Debug, Clone)]
pub struct Tag {
    pub id: Option<i64>,
    pub name: String,
}

impl Entity for Tag {
    const ENTITY_NAME: &'static str = "Tag";
    const TABLE_NAME: &'static str = "tag";

    fn id(&self) -> Option<i64> {
        self.id
    }

    fn set_id(&mut self, id: i64) {
        self.id = Some(id);
    }

    fn to_row(&self) -> Vec<(&'static str, Value)> {
        vec![("name", Value::from(self.name.clone()))]
    }

    fn from_row(row: &Row) -> Result<Self> {
        Ok(Self {
            id: Some(row.get_named("id")?),
            name: row.get_named("name")?,
        })
    }
}

/// A plain target-table row, as returned by the immediate query.
pub fn tag_row(id: i64, name: &str) -> Row {
    Row::new(
        vec!["id".to_string(), "name".to_string()],
        vec![Value::Int(id), Value::from(name)],
    )
}

/// A batched-query row: target columns plus the populated owner id.
pub fn batched_tag_row(id: i64, name: &str, owner: i64) -> Row {
    Row::new(
        vec!["id".to_string(), "name".to_string(), "d1__id".to_string()],
        vec![Value::Int(id), Value::from(name), Value::Int(owner)],
    )
}

/// A join-table row, as returned by the reference-only query.
pub fn link_row(doc_id: i64, tag_id: i64) -> Row {
    Row::new(
        vec!["fk__doc_id".to_string(), "fk__tag_id".to_string()],
        vec![Value::Int(doc_id), Value::Int(tag_id)],
    )
}

/// Connection that returns the same canned rows for every query and
/// records the SQL it was handed.
pub struct MockConnection {
    rows: Vec<Row>,
    error: Option<String>,
    queries: Mutex<Vec<String>>,
}

impl MockConnection {
    pub fn with_rows(rows: Vec<Row>) -> Self {
        Self {
            rows,
            error: None,
            queries: Mutex::new(Vec::new()),
        }
    }

    pub fn failing(message: &str) -> Self {
        Self {
            rows: Vec::new(),
            error: Some(message.to_string()),
            queries: Mutex::new(Vec::new()),
        }
    }

    pub fn query_count(&self) -> usize {
        self.queries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn last_sql(&self) -> Option<String> {
        self.queries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .last()
            .cloned()
    }

    fn record(&self, sql: &str) {
        self.queries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(sql.to_string());
    }

    fn fail(&self, sql: &str) -> Option<Error> {
        self.error.as_ref().map(|message| {
            Error::Query(QueryError {
                kind: QueryErrorKind::Database,
                sql: Some(sql.to_string()),
                message: message.clone(),
            })
        })
    }
}

impl Connection for MockConnection {
    fn query(
        &self,
        _cx: &Cx,
        sql: &str,
        _params: &[Value],
    ) -> impl Future<Output = Outcome<Vec<Row>, Error>> + Send {
        self.record(sql);
        let result = match self.fail(sql) {
            Some(e) => Outcome::Err(e),
            None => Outcome::Ok(self.rows.clone()),
        };
        async move { result }
    }

    fn execute(
        &self,
        _cx: &Cx,
        sql: &str,
        _params: &[Value],
    ) -> impl Future<Output = Outcome<u64, Error>> + Send {
        self.record(sql);
        let result = match self.fail(sql) {
            Some(e) => Outcome::Err(e),
            None => Outcome::Ok(0),
        };
        async move { result }
    }

    fn insert(
        &self,
        _cx: &Cx,
        sql: &str,
        _params: &[Value],
    ) -> impl Future<Output = Outcome<i64, Error>> + Send {
        self.record(sql);
        let result = match self.fail(sql) {
            Some(e) => Outcome::Err(e),
            None => Outcome::Ok(1),
        };
        async move { result }
    }

    fn close(self, _cx: &Cx) -> impl Future<Output = Result<()>> + Send {
        async move { Ok(()) }
    }
}
