//! Entity trait and static entity metadata.
//!
//! Entities and their relations are described by explicit static
//! definitions (`EntityDef`, `FieldDef`, `RelationDef`) registered in a
//! [`Registry`](crate::registry::Registry) at process startup. There is no
//! derive layer: the metadata a program uses is exactly the metadata it
//! wrote down.

use crate::Result;
use crate::relation::LinkOp;
use crate::row::Row;
use crate::value::Value;
use std::sync::{Arc, Mutex, PoisonError};

/// Column types, mirroring SQLite's type affinities.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    Integer,
    Real,
    Text,
    Blob,
    Boolean,
}

impl ColumnType {
    /// The type name emitted into DDL.
    pub const fn sql_name(&self) -> &'static str {
        match self {
            ColumnType::Integer => "integer",
            ColumnType::Real => "real",
            ColumnType::Text => "text",
            ColumnType::Blob => "blob",
            ColumnType::Boolean => "boolean",
        }
    }
}

/// Static metadata about one entity column.
#[derive(Debug, Clone, Copy)]
pub struct FieldDef {
    /// Column name
    pub column: &'static str,
    /// Column type
    pub ty: ColumnType,
    /// Whether this column is the primary identifier
    pub primary_key: bool,
    /// Whether NULL is allowed
    pub nullable: bool,
}

impl FieldDef {
    /// Create a new field definition.
    pub const fn new(column: &'static str, ty: ColumnType) -> Self {
        Self {
            column,
            ty,
            primary_key: false,
            nullable: false,
        }
    }

    /// Mark this field as the primary identifier.
    pub const fn primary_key(mut self) -> Self {
        self.primary_key = true;
        self
    }

    /// Allow NULL values.
    pub const fn nullable(mut self) -> Self {
        self.nullable = true;
        self
    }
}

/// Static metadata about one entity type.
#[derive(Debug, Clone, Copy)]
pub struct EntityDef {
    /// Entity name as used in error messages ("Product")
    pub name: &'static str,
    /// Table name ("product")
    pub table: &'static str,
    /// Columns, identifier first by convention
    pub fields: &'static [FieldDef],
}

impl EntityDef {
    /// Create a new entity definition.
    pub const fn new(
        name: &'static str,
        table: &'static str,
        fields: &'static [FieldDef],
    ) -> Self {
        Self {
            name,
            table,
            fields,
        }
    }

    /// The primary identifier column ("id" unless declared otherwise).
    pub fn primary_key_column(&self) -> &'static str {
        self.fields
            .iter()
            .find(|f| f.primary_key)
            .map_or("id", |f| f.column)
    }

    /// Column names in declaration order.
    pub fn column_names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.fields.iter().map(|f| f.column)
    }
}

/// Trait for row-backed records with an integer primary identifier
/// assigned by storage.
pub trait Entity: Sized + Send + Sync + 'static {
    /// Entity name as used in error messages.
    const ENTITY_NAME: &'static str;

    /// The name of the database table.
    const TABLE_NAME: &'static str;

    /// The primary identifier, if already assigned by storage.
    fn id(&self) -> Option<i64>;

    /// Record the storage-assigned identifier.
    ///
    /// Implementations owning relation collections must also fix up the
    /// collections' owner identifier here.
    fn set_id(&mut self, id: i64);

    /// The non-identifier column values for insertion, in column order.
    fn to_row(&self) -> Vec<(&'static str, Value)>;

    /// Construct an instance from a result row.
    fn from_row(row: &Row) -> Result<Self>;

    /// Check if this record has not been persisted yet.
    fn is_new(&self) -> bool {
        self.id().is_none()
    }

    /// Drain join-table writes staged on this entity's collections.
    ///
    /// Called by the session at flush time, after identifiers have been
    /// assigned. The default covers entities without collections.
    fn drain_links(&mut self) -> Result<Vec<LinkOp>> {
        Ok(Vec::new())
    }

    /// Whether any join-table writes are staged on this entity's
    /// collections. Lets the session skip a flush round-trip when there
    /// is nothing to do.
    fn has_pending_links(&self) -> bool {
        false
    }
}

/// A shared handle to an entity staged in a session.
///
/// `create` hands one of these back so the caller can keep using the
/// entity while flush writes the storage-assigned identifier into the
/// same instance. Clones share the underlying cell.
pub struct EntityRef<T: Entity> {
    inner: Arc<Mutex<T>>,
}

impl<T: Entity> EntityRef<T> {
    /// Wrap an entity in a shared handle.
    pub fn new(entity: T) -> Self {
        Self {
            inner: Arc::new(Mutex::new(entity)),
        }
    }

    /// Run a closure over a shared borrow of the entity.
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        let guard = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        f(&guard)
    }

    /// Run a closure over an exclusive borrow of the entity.
    pub fn with_mut<R>(&self, f: impl FnOnce(&mut T) -> R) -> R {
        let mut guard = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut guard)
    }

    /// The entity's identifier, if assigned.
    pub fn id(&self) -> Option<i64> {
        self.with(Entity::id)
    }

    /// Whether two handles point at the same entity instance.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl<T: Entity> Clone for EntityRef<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: Entity + std::fmt::Debug> std::fmt::Debug for EntityRef<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.with(|e| f.debug_tuple("EntityRef").field(e).finish())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    static WIDGET_DEF: EntityDef = EntityDef::new(
        "Widget",
        "widget",
        &[
            FieldDef::new("id", ColumnType::Integer).primary_key(),
            FieldDef::new("label", ColumnType::Text),
            FieldDef::new("note", ColumnType::Text).nullable(),
        ],
    );

    #[derive(Debug)]
    struct Widget {
        id: Option<i64>,
        label: String,
    }

    impl Entity for Widget {
        const ENTITY_NAME: &'static str = "Widget";
        const TABLE_NAME: &'static str = "widget";

        fn id(&self) -> Option<i64> {
            self.id
        }

        fn set_id(&mut self, id: i64) {
            self.id = Some(id);
        }

        fn to_row(&self) -> Vec<(&'static str, Value)> {
            vec![("label", Value::from(self.label.clone()))]
        }

        fn from_row(row: &Row) -> Result<Self> {
            Ok(Self {
                id: Some(row.get_named("id")?),
                label: row.get_named("label")?,
            })
        }
    }

    #[test]
    fn entity_def_primary_key_lookup() {
        assert_eq!(WIDGET_DEF.primary_key_column(), "id");
        assert_eq!(
            WIDGET_DEF.column_names().collect::<Vec<_>>(),
            vec!["id", "label", "note"]
        );
    }

    #[test]
    fn field_builders() {
        let f = FieldDef::new("note", ColumnType::Text).nullable();
        assert!(f.nullable);
        assert!(!f.primary_key);
        assert_eq!(f.ty.sql_name(), "text");
    }

    #[test]
    fn entity_ref_shares_state() {
        let widget = EntityRef::new(Widget {
            id: None,
            label: "a".to_string(),
        });
        let clone = widget.clone();
        assert!(widget.ptr_eq(&clone));
        assert!(widget.with(Entity::is_new));

        clone.with_mut(|w| w.set_id(7));
        assert_eq!(widget.id(), Some(7));
        assert!(!widget.with(Entity::is_new));
    }

    #[test]
    fn default_drain_links_is_empty() {
        let mut widget = Widget {
            id: Some(1),
            label: "a".to_string(),
        };
        assert!(widget.drain_links().unwrap().is_empty());
    }
}
