//! Schema DDL generated from the registry.
//!
//! One `create table` per entity, one per join table (derived from the
//! owner side of each relation, which controls the physical layout).
//! The dialect is the same lowercase/backtick SQL the loader generates.

use lazylink_core::{EntityDef, Registry, RelationDef, quote_ident};

/// Builds DDL statement lists from a registry.
#[derive(Debug, Clone, Copy)]
pub struct SchemaBuilder<'a> {
    registry: &'a Registry,
}

impl<'a> SchemaBuilder<'a> {
    /// Build DDL for the given registry.
    pub fn new(registry: &'a Registry) -> Self {
        Self { registry }
    }

    /// Statements that create the full schema, in dependency order.
    pub fn create_statements(&self) -> Vec<String> {
        let mut statements = vec!["pragma foreign_keys = on".to_string()];
        for entity in self.registry.entities() {
            statements.push(create_entity_table(entity));
        }
        for relation in self.registry.owner_relations() {
            statements.push(create_join_table(relation));
        }
        statements
    }

    /// Statements that drop the full schema, join tables first.
    pub fn drop_statements(&self) -> Vec<String> {
        let mut statements = Vec::new();
        for relation in self.registry.owner_relations() {
            statements.push(format!(
                "drop table if exists {}",
                quote_ident(relation.join_table)
            ));
        }
        for entity in self.registry.entities().iter().rev() {
            statements.push(format!("drop table if exists {}", quote_ident(entity.table)));
        }
        statements
    }
}

fn create_entity_table(entity: &EntityDef) -> String {
    let mut columns = Vec::with_capacity(entity.fields.len());
    for field in entity.fields {
        if field.primary_key {
            columns.push(format!(
                "{} {} not null primary key autoincrement",
                quote_ident(field.column),
                field.ty.sql_name()
            ));
        } else {
            let nullability = if field.nullable { "null" } else { "not null" };
            columns.push(format!(
                "{} {} {}",
                quote_ident(field.column),
                field.ty.sql_name(),
                nullability
            ));
        }
    }
    format!(
        "create table {} ({})",
        quote_ident(entity.table),
        columns.join(", ")
    )
}

fn create_join_table(relation: &RelationDef) -> String {
    let source_col = quote_ident(relation.source_column);
    let target_col = quote_ident(relation.target_column);
    format!(
        "create table {table} ({source_col} integer not null, {target_col} integer not null, \
         primary key ({source_col}, {target_col}), \
         foreign key ({source_col}) references {source_table} ({source_pk}) on delete cascade, \
         foreign key ({target_col}) references {target_table} ({target_pk}) on delete cascade)",
        table = quote_ident(relation.join_table),
        source_table = quote_ident(relation.source_table()),
        source_pk = quote_ident(relation.source.primary_key_column()),
        target_table = quote_ident(relation.target_table()),
        target_pk = quote_ident(relation.target.primary_key_column()),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use lazylink_core::{ColumnType, FieldDef};

    static PRODUCT: EntityDef = EntityDef::new(
        "Product",
        "product",
        &[
            FieldDef::new("id", ColumnType::Integer).primary_key(),
            FieldDef::new("name", ColumnType::Text),
        ],
    );
    static CATEGORY: EntityDef = EntityDef::new(
        "Category",
        "category",
        &[
            FieldDef::new("id", ColumnType::Integer).primary_key(),
            FieldDef::new("name", ColumnType::Text),
        ],
    );
    static CATEGORY_PRODUCTS: RelationDef = RelationDef::new("products", &CATEGORY, &PRODUCT)
        .link("category_products", "category_id", "product_id")
        .owner();

    fn registry() -> Registry {
        Registry::builder()
            .entity(&PRODUCT)
            .entity(&CATEGORY)
            .relation(&CATEGORY_PRODUCTS)
            .build()
            .expect("registry is valid")
    }

    #[test]
    fn create_statements_cover_entities_and_join_tables() {
        let registry = registry();
        let statements = SchemaBuilder::new(&registry).create_statements();
        assert_eq!(statements.len(), 4);
        assert_eq!(statements[0], "pragma foreign_keys = on");
        assert_eq!(
            statements[1],
            "create table `product` (`id` integer not null primary key autoincrement, `name` text not null)"
        );
        assert_eq!(
            statements[2],
            "create table `category` (`id` integer not null primary key autoincrement, `name` text not null)"
        );
        assert_eq!(
            statements[3],
            "create table `category_products` (`category_id` integer not null, `product_id` integer not null, \
             primary key (`category_id`, `product_id`), \
             foreign key (`category_id`) references `category` (`id`) on delete cascade, \
             foreign key (`product_id`) references `product` (`id`) on delete cascade)"
        );
    }

    #[test]
    fn drop_statements_remove_join_tables_first() {
        let registry = registry();
        let statements = SchemaBuilder::new(&registry).drop_statements();
        assert_eq!(
            statements,
            vec![
                "drop table if exists `category_products`".to_string(),
                "drop table if exists `category`".to_string(),
                "drop table if exists `product`".to_string(),
            ]
        );
    }

    #[test]
    fn nullable_columns_render_as_null() {
        static NOTE: EntityDef = EntityDef::new(
            "Note",
            "note",
            &[
                FieldDef::new("id", ColumnType::Integer).primary_key(),
                FieldDef::new("body", ColumnType::Text).nullable(),
            ],
        );
        assert_eq!(
            create_entity_table(&NOTE),
            "create table `note` (`id` integer not null primary key autoincrement, `body` text null)"
        );
    }
}
