//! Entity-manager session: create, find, flush, raw execute.
//!
//! The session owns a connection and a handle on the metadata registry.
//! `create` stages inserts; `flush` runs them inside a transaction in
//! creation order, writes the storage-assigned identifiers back through
//! the shared [`EntityRef`] handles, then executes the join-table writes
//! staged on the entities' collections.

use lazylink_core::{
    Connection, Cx, Entity, EntityRef, Error, LinkOp, Outcome, Registry, Result, Row, Value,
    quote_ident,
};
use std::fmt;
use std::sync::Arc;

/// A single-predicate lookup filter.
#[derive(Debug, Clone)]
pub struct Filter {
    /// Column to match
    pub column: &'static str,
    /// Value to match
    pub value: Value,
}

impl Filter {
    /// Match rows where `column` equals `value`.
    pub fn eq(column: &'static str, value: impl Into<Value>) -> Self {
        Self {
            column,
            value: value.into(),
        }
    }
}

impl fmt::Display for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{ {}: {} }}", self.column, self.value)
    }
}

/// Counts of work done by one flush.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FlushReport {
    /// Entities inserted
    pub inserted: usize,
    /// Join-table rows inserted
    pub linked: usize,
}

/// Object-safe view of a staged entity handle.
trait PendingCreate: Send {
    fn entity_name(&self) -> &'static str;
    fn table(&self) -> &'static str;
    fn is_new(&self) -> bool;
    fn insert_row(&self) -> (Vec<&'static str>, Vec<Value>);
    fn assign_id(&self, id: i64);
    fn drain_links(&self) -> Result<Vec<LinkOp>>;
    fn has_pending_links(&self) -> bool;
}

impl<T: Entity> PendingCreate for EntityRef<T> {
    fn entity_name(&self) -> &'static str {
        T::ENTITY_NAME
    }

    fn table(&self) -> &'static str {
        T::TABLE_NAME
    }

    fn is_new(&self) -> bool {
        self.with(Entity::is_new)
    }

    fn insert_row(&self) -> (Vec<&'static str>, Vec<Value>) {
        self.with(|entity| {
            let row = entity.to_row();
            let mut columns = Vec::with_capacity(row.len());
            let mut values = Vec::with_capacity(row.len());
            for (column, value) in row {
                columns.push(column);
                values.push(value);
            }
            (columns, values)
        })
    }

    fn assign_id(&self, id: i64) {
        self.with_mut(|entity| entity.set_id(id));
    }

    fn drain_links(&self) -> Result<Vec<LinkOp>> {
        self.with_mut(Entity::drain_links)
    }

    fn has_pending_links(&self) -> bool {
        self.with(Entity::has_pending_links)
    }
}

/// A database session over one connection.
pub struct Session<C: Connection> {
    conn: C,
    registry: Arc<Registry>,
    /// Created but not yet flushed, in creation order.
    pending: Vec<Box<dyn PendingCreate>>,
    /// Flushed handles kept so later staged links still reach the join
    /// table on the next flush.
    managed: Vec<Box<dyn PendingCreate>>,
}

impl<C: Connection> Session<C> {
    /// Create a session over a connection and a frozen registry.
    pub fn new(conn: C, registry: Arc<Registry>) -> Self {
        Self {
            conn,
            registry,
            pending: Vec::new(),
            managed: Vec::new(),
        }
    }

    /// The underlying connection.
    pub fn connection(&self) -> &C {
        &self.conn
    }

    /// The metadata registry this session was built with.
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Stage an entity for insertion at the next flush.
    ///
    /// Returns a shared handle; flush writes the storage-assigned
    /// identifier into the same instance the caller holds.
    pub fn create<T: Entity>(&mut self, entity: T) -> EntityRef<T> {
        if self.registry.entity(T::ENTITY_NAME).is_none() {
            tracing::warn!(
                entity = T::ENTITY_NAME,
                "creating an entity that is not present in the registry"
            );
        }
        let handle = EntityRef::new(entity);
        self.pending.push(Box::new(handle.clone()));
        handle
    }

    /// Number of entities staged for insertion.
    pub fn pending_creates(&self) -> usize {
        self.pending.len()
    }

    /// Persist staged inserts and staged join-table writes.
    ///
    /// Everything runs inside one transaction; the first failure rolls
    /// back and is returned as-is (constraint violations surface with the
    /// constraint query-error kind). No retries.
    pub async fn flush(&mut self, cx: &Cx) -> Outcome<FlushReport, Error> {
        let has_link_work = self
            .pending
            .iter()
            .chain(self.managed.iter())
            .any(|p| p.has_pending_links());
        if self.pending.is_empty() && !has_link_work {
            return Outcome::Ok(FlushReport::default());
        }

        match self.conn.execute(cx, "begin", &[]).await {
            Outcome::Ok(_) => {}
            Outcome::Err(e) => return Outcome::Err(e),
            Outcome::Cancelled(r) => return Outcome::Cancelled(r),
            Outcome::Panicked(p) => return Outcome::Panicked(p),
        }

        let mut report = FlushReport::default();

        for pending in &self.pending {
            if !pending.is_new() {
                continue;
            }
            let (columns, values) = pending.insert_row();
            let sql = insert_sql(pending.table(), &columns);
            tracing::debug!(entity = pending.entity_name(), sql = %sql, "flushing insert");
            match self.conn.insert(cx, &sql, &values).await {
                Outcome::Ok(id) => {
                    pending.assign_id(id);
                    report.inserted += 1;
                }
                Outcome::Err(e) => {
                    self.rollback(cx).await;
                    return Outcome::Err(e);
                }
                Outcome::Cancelled(r) => {
                    self.rollback(cx).await;
                    return Outcome::Cancelled(r);
                }
                Outcome::Panicked(p) => {
                    self.rollback(cx).await;
                    return Outcome::Panicked(p);
                }
            }
        }

        let mut ops: Vec<LinkOp> = Vec::new();
        for handle in self.pending.iter().chain(self.managed.iter()) {
            match handle.drain_links() {
                Ok(mut links) => ops.append(&mut links),
                Err(e) => {
                    self.rollback(cx).await;
                    return Outcome::Err(e);
                }
            }
        }

        for op in &ops {
            match execute_link_op(cx, &self.conn, op).await {
                Outcome::Ok(()) => report.linked += 1,
                Outcome::Err(e) => {
                    self.rollback(cx).await;
                    return Outcome::Err(e);
                }
                Outcome::Cancelled(r) => {
                    self.rollback(cx).await;
                    return Outcome::Cancelled(r);
                }
                Outcome::Panicked(p) => {
                    self.rollback(cx).await;
                    return Outcome::Panicked(p);
                }
            }
        }

        match self.conn.execute(cx, "commit", &[]).await {
            Outcome::Ok(_) => {}
            Outcome::Err(e) => return Outcome::Err(e),
            Outcome::Cancelled(r) => return Outcome::Cancelled(r),
            Outcome::Panicked(p) => return Outcome::Panicked(p),
        }

        self.managed.append(&mut self.pending);
        tracing::debug!(
            inserted = report.inserted,
            linked = report.linked,
            "flushed session"
        );
        Outcome::Ok(report)
    }

    /// Find at most one entity matching the filter.
    pub async fn find_one<T: Entity>(&self, cx: &Cx, filter: &Filter) -> Outcome<Option<T>, Error> {
        let alias = format!("{}0", T::TABLE_NAME.chars().next().unwrap_or('t'));
        let sql = format!(
            "select {alias_q}.* from {table} as {alias_q} where {alias_q}.{column} = ?1 limit 1",
            alias_q = quote_ident(&alias),
            table = quote_ident(T::TABLE_NAME),
            column = quote_ident(filter.column),
        );
        tracing::debug!(entity = T::ENTITY_NAME, sql = %sql, "find one");

        let row = match self
            .conn
            .query_one(cx, &sql, std::slice::from_ref(&filter.value))
            .await
        {
            Outcome::Ok(row) => row,
            Outcome::Err(e) => return Outcome::Err(e),
            Outcome::Cancelled(r) => return Outcome::Cancelled(r),
            Outcome::Panicked(p) => return Outcome::Panicked(p),
        };

        match row {
            Some(row) => match T::from_row(&row) {
                Ok(entity) => Outcome::Ok(Some(entity)),
                Err(e) => Outcome::Err(e),
            },
            None => Outcome::Ok(None),
        }
    }

    /// Find exactly one entity matching the filter; fail with a
    /// not-found error naming the entity and the criteria otherwise.
    pub async fn find_one_or_fail<T: Entity>(&self, cx: &Cx, filter: &Filter) -> Outcome<T, Error> {
        match self.find_one::<T>(cx, filter).await {
            Outcome::Ok(Some(entity)) => Outcome::Ok(entity),
            Outcome::Ok(None) => {
                Outcome::Err(Error::not_found(T::ENTITY_NAME, filter.to_string()))
            }
            Outcome::Err(e) => Outcome::Err(e),
            Outcome::Cancelled(r) => Outcome::Cancelled(r),
            Outcome::Panicked(p) => Outcome::Panicked(p),
        }
    }

    /// Raw SQL passthrough.
    ///
    /// Not used by application logic; tests use it to replay generated
    /// query text and assert on the returned rows.
    pub async fn execute(&self, cx: &Cx, sql: &str) -> Outcome<Vec<Row>, Error> {
        tracing::debug!(sql = %sql, "raw execute");
        self.conn.query(cx, sql, &[]).await
    }

    async fn rollback(&self, cx: &Cx) {
        match self.conn.execute(cx, "rollback", &[]).await {
            Outcome::Ok(_) => {}
            Outcome::Err(e) => tracing::warn!(error = %e, "rollback failed"),
            Outcome::Cancelled(_) | Outcome::Panicked(_) => {
                tracing::warn!("rollback did not complete");
            }
        }
    }
}

fn insert_sql(table: &str, columns: &[&'static str]) -> String {
    let column_list: Vec<String> = columns.iter().map(|c| quote_ident(c)).collect();
    let placeholders: Vec<String> = (1..=columns.len()).map(|i| format!("?{i}")).collect();
    format!(
        "insert into {} ({}) values ({})",
        quote_ident(table),
        column_list.join(", "),
        placeholders.join(", ")
    )
}

#[tracing::instrument(level = "debug", skip(cx, conn))]
async fn execute_link_op<C: Connection>(cx: &Cx, conn: &C, op: &LinkOp) -> Outcome<(), Error> {
    let sql = format!(
        "insert into {} ({}, {}) values (?1, ?2)",
        quote_ident(op.table),
        quote_ident(op.source_column),
        quote_ident(op.target_column)
    );
    match conn
        .execute(
            cx,
            &sql,
            &[Value::Int(op.source_id), Value::Int(op.target_id)],
        )
        .await
    {
        Outcome::Ok(_) => Outcome::Ok(()),
        Outcome::Err(e) => Outcome::Err(e),
        Outcome::Cancelled(r) => Outcome::Cancelled(r),
        Outcome::Panicked(p) => Outcome::Panicked(p),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filter_renders_like_criteria() {
        let filter = Filter::eq("name", "Product 1");
        assert_eq!(filter.to_string(), "{ name: 'Product 1' }");

        let by_id = Filter::eq("id", 3_i64);
        assert_eq!(by_id.to_string(), "{ id: 3 }");
    }

    #[test]
    fn insert_sql_shape() {
        assert_eq!(
            insert_sql("product", &["name"]),
            "insert into `product` (`name`) values (?1)"
        );
        assert_eq!(
            insert_sql("pair", &["a", "b"]),
            "insert into `pair` (`a`, `b`) values (?1, ?2)"
        );
    }
}
