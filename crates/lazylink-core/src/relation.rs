//! Many-to-many relation metadata.

use crate::entity::EntityDef;

/// Static metadata describing one side of a many-to-many association.
///
/// Both sides of an association reference the same join table; exactly one
/// side is the owner (it controls the physical join table — column order
/// in DDL follows the owner side). The
/// [`Registry`](crate::registry::Registry) enforces that invariant.
///
/// # Example
///
/// ```
/// use lazylink_core::{ColumnType, EntityDef, FieldDef, RelationDef};
///
/// static PRODUCT: EntityDef = EntityDef::new(
///     "Product",
///     "product",
///     &[
///         FieldDef::new("id", ColumnType::Integer).primary_key(),
///         FieldDef::new("name", ColumnType::Text),
///     ],
/// );
/// static CATEGORY: EntityDef = EntityDef::new(
///     "Category",
///     "category",
///     &[
///         FieldDef::new("id", ColumnType::Integer).primary_key(),
///         FieldDef::new("name", ColumnType::Text),
///     ],
/// );
///
/// static PRODUCT_CATEGORIES: RelationDef =
///     RelationDef::new("categories", &PRODUCT, &CATEGORY)
///         .link("category_products", "product_id", "category_id");
/// static CATEGORY_PRODUCTS: RelationDef =
///     RelationDef::new("products", &CATEGORY, &PRODUCT)
///         .link("category_products", "category_id", "product_id")
///         .owner();
/// ```
#[derive(Debug, Clone, Copy)]
pub struct RelationDef {
    /// Name of the relation field on the source entity ("categories")
    pub name: &'static str,
    /// The entity this collection lives on
    pub source: &'static EntityDef,
    /// The entity the collection contains
    pub target: &'static EntityDef,
    /// Physical join table name
    pub join_table: &'static str,
    /// Join-table column referencing the source entity
    pub source_column: &'static str,
    /// Join-table column referencing the target entity
    pub target_column: &'static str,
    /// Whether this side controls the physical join table
    pub owner: bool,
}

impl RelationDef {
    /// Create a relation definition; finish it with [`link`](Self::link).
    pub const fn new(
        name: &'static str,
        source: &'static EntityDef,
        target: &'static EntityDef,
    ) -> Self {
        Self {
            name,
            source,
            target,
            join_table: "",
            source_column: "",
            target_column: "",
            owner: false,
        }
    }

    /// Set the join table and its two foreign-key columns.
    pub const fn link(
        mut self,
        join_table: &'static str,
        source_column: &'static str,
        target_column: &'static str,
    ) -> Self {
        self.join_table = join_table;
        self.source_column = source_column;
        self.target_column = target_column;
        self
    }

    /// Designate this side as the owner of the join table.
    pub const fn owner(mut self) -> Self {
        self.owner = true;
        self
    }

    /// Source table name.
    pub fn source_table(&self) -> &'static str {
        self.source.table
    }

    /// Target table name.
    pub fn target_table(&self) -> &'static str {
        self.target.table
    }

    /// Build a staged join-table insert for one (source, target) pair.
    pub fn link_op(&self, source_id: i64, target_id: i64) -> LinkOp {
        LinkOp {
            table: self.join_table,
            source_column: self.source_column,
            source_id,
            target_column: self.target_column,
            target_id,
        }
    }
}

/// A pending join-table insert, produced by `Collection::add` staging and
/// executed by the session at flush time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LinkOp {
    /// Join table name
    pub table: &'static str,
    /// Column referencing the collection's owner
    pub source_column: &'static str,
    /// Owner identifier
    pub source_id: i64,
    /// Column referencing the added member
    pub target_column: &'static str,
    /// Member identifier
    pub target_id: i64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::{ColumnType, FieldDef};

    static LEFT: EntityDef = EntityDef::new(
        "Left",
        "left_side",
        &[FieldDef::new("id", ColumnType::Integer).primary_key()],
    );
    static RIGHT: EntityDef = EntityDef::new(
        "Right",
        "right_side",
        &[FieldDef::new("id", ColumnType::Integer).primary_key()],
    );

    static LEFT_RIGHTS: RelationDef = RelationDef::new("rights", &LEFT, &RIGHT)
        .link("left_rights", "left_id", "right_id")
        .owner();

    #[test]
    fn const_builders_compose_in_statics() {
        assert_eq!(LEFT_RIGHTS.name, "rights");
        assert_eq!(LEFT_RIGHTS.source_table(), "left_side");
        assert_eq!(LEFT_RIGHTS.target_table(), "right_side");
        assert_eq!(LEFT_RIGHTS.join_table, "left_rights");
        assert!(LEFT_RIGHTS.owner);
    }

    #[test]
    fn link_op_carries_column_pairing() {
        let op = LEFT_RIGHTS.link_op(1, 2);
        assert_eq!(
            op,
            LinkOp {
                table: "left_rights",
                source_column: "left_id",
                source_id: 1,
                target_column: "right_id",
                target_id: 2,
            }
        );
    }
}
