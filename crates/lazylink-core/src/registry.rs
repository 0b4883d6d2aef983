//! Process-wide entity/relation metadata registry.
//!
//! The registry is built once at startup from explicit static definitions
//! and is read-only afterwards (callers typically park it in a `OnceLock`
//! or `Arc`). Construction validates the metadata so that every later
//! layer — SQL generation, schema DDL, the loader — can trust it without
//! re-checking.

use crate::entity::EntityDef;
use crate::error::{Error, Result};
use crate::identifiers::is_valid_identifier;
use crate::relation::RelationDef;
use std::collections::HashMap;

/// Validated, read-only entity/relation metadata.
#[derive(Debug)]
pub struct Registry {
    entities: Vec<&'static EntityDef>,
    relations: Vec<&'static RelationDef>,
}

impl Registry {
    /// Start building a registry.
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::default()
    }

    /// All registered entities, in registration order.
    pub fn entities(&self) -> &[&'static EntityDef] {
        &self.entities
    }

    /// All registered relations, in registration order.
    pub fn relations(&self) -> &[&'static RelationDef] {
        &self.relations
    }

    /// Look up an entity by name.
    pub fn entity(&self, name: &str) -> Option<&'static EntityDef> {
        self.entities.iter().copied().find(|e| e.name == name)
    }

    /// Look up a relation by source entity and relation name.
    pub fn relation(&self, source_entity: &str, name: &str) -> Option<&'static RelationDef> {
        self.relations
            .iter()
            .copied()
            .find(|r| r.source.name == source_entity && r.name == name)
    }

    /// The owner side of every join table, in registration order.
    ///
    /// Schema generation derives join-table DDL from these.
    pub fn owner_relations(&self) -> impl Iterator<Item = &'static RelationDef> + '_ {
        self.relations.iter().copied().filter(|r| r.owner)
    }
}

/// Builder for [`Registry`]; `build` runs all validation.
#[derive(Debug, Default)]
pub struct RegistryBuilder {
    entities: Vec<&'static EntityDef>,
    relations: Vec<&'static RelationDef>,
}

impl RegistryBuilder {
    /// Register an entity definition.
    pub fn entity(mut self, def: &'static EntityDef) -> Self {
        self.entities.push(def);
        self
    }

    /// Register a relation definition.
    pub fn relation(mut self, def: &'static RelationDef) -> Self {
        self.relations.push(def);
        self
    }

    /// Validate and freeze the registry.
    pub fn build(self) -> Result<Registry> {
        validate_entities(&self.entities)?;
        validate_relations(&self.entities, &self.relations)?;
        tracing::debug!(
            entities = self.entities.len(),
            relations = self.relations.len(),
            "metadata registry built"
        );
        Ok(Registry {
            entities: self.entities,
            relations: self.relations,
        })
    }
}

fn check_identifier(what: &str, name: &str) -> Result<()> {
    if is_valid_identifier(name) {
        Ok(())
    } else {
        Err(Error::metadata(format!("invalid {what} '{name}'")))
    }
}

fn validate_entities(entities: &[&'static EntityDef]) -> Result<()> {
    let mut names = HashMap::new();
    let mut tables = HashMap::new();
    for entity in entities {
        check_identifier("entity name", entity.name)?;
        check_identifier("table name", entity.table)?;
        if names.insert(entity.name, ()).is_some() {
            return Err(Error::metadata(format!(
                "duplicate entity '{}'",
                entity.name
            )));
        }
        if tables.insert(entity.table, ()).is_some() {
            return Err(Error::metadata(format!(
                "duplicate table '{}'",
                entity.table
            )));
        }
        let mut pk_count = 0;
        for field in entity.fields {
            check_identifier("column name", field.column)?;
            if field.primary_key {
                pk_count += 1;
            }
        }
        if pk_count != 1 {
            return Err(Error::metadata(format!(
                "entity '{}' must declare exactly one primary key column, found {pk_count}",
                entity.name
            )));
        }
    }
    Ok(())
}

fn validate_relations(
    entities: &[&'static EntityDef],
    relations: &[&'static RelationDef],
) -> Result<()> {
    let registered =
        |def: &'static EntityDef| entities.iter().any(|e| std::ptr::eq(*e, def));

    let mut by_join_table: HashMap<&'static str, Vec<&'static RelationDef>> = HashMap::new();
    let mut names = HashMap::new();

    for rel in relations {
        check_identifier("relation name", rel.name)?;
        check_identifier("join table name", rel.join_table)?;
        check_identifier("join column name", rel.source_column)?;
        check_identifier("join column name", rel.target_column)?;

        if !registered(rel.source) || !registered(rel.target) {
            return Err(Error::metadata(format!(
                "relation '{}.{}' references an unregistered entity",
                rel.source.name, rel.name
            )));
        }
        if rel.source_column == rel.target_column {
            return Err(Error::metadata(format!(
                "relation '{}.{}' uses the same join column for both sides",
                rel.source.name, rel.name
            )));
        }
        if entities.iter().any(|e| e.table == rel.join_table) {
            return Err(Error::metadata(format!(
                "join table '{}' collides with an entity table",
                rel.join_table
            )));
        }
        if names.insert((rel.source.name, rel.name), ()).is_some() {
            return Err(Error::metadata(format!(
                "duplicate relation '{}.{}'",
                rel.source.name, rel.name
            )));
        }
        by_join_table.entry(rel.join_table).or_default().push(rel);
    }

    for (join_table, sides) in &by_join_table {
        let owners = sides.iter().filter(|r| r.owner).count();
        if owners != 1 {
            return Err(Error::metadata(format!(
                "join table '{join_table}' must have exactly one owner side, found {owners}"
            )));
        }
        if sides.len() > 2 {
            return Err(Error::metadata(format!(
                "join table '{join_table}' is referenced by more than two relation sides"
            )));
        }
        if let [a, b] = sides.as_slice() {
            let mirrored = a.source.table == b.target.table
                && a.target.table == b.source.table
                && a.source_column == b.target_column
                && a.target_column == b.source_column;
            if !mirrored {
                return Err(Error::metadata(format!(
                    "join table '{join_table}' sides '{}.{}' and '{}.{}' do not mirror each other",
                    a.source.name, a.name, b.source.name, b.name
                )));
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::{ColumnType, FieldDef};

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

    static PRODUCT_CATEGORIES: RelationDef = RelationDef::new("categories", &PRODUCT, &CATEGORY)
        .link("category_products", "product_id", "category_id");
    static CATEGORY_PRODUCTS: RelationDef = RelationDef::new("products", &CATEGORY, &PRODUCT)
        .link("category_products", "category_id", "product_id")
        .owner();

    fn build_ok() -> Registry {
        Registry::builder()
            .entity(&PRODUCT)
            .entity(&CATEGORY)
            .relation(&PRODUCT_CATEGORIES)
            .relation(&CATEGORY_PRODUCTS)
            .build()
            .expect("registry is valid")
    }

    #[test]
    fn builds_and_looks_up() {
        let registry = build_ok();
        assert_eq!(registry.entities().len(), 2);
        assert_eq!(registry.entity("Product").unwrap().table, "product");
        assert!(registry.entity("Missing").is_none());

        let rel = registry.relation("Product", "categories").unwrap();
        assert_eq!(rel.join_table, "category_products");
        assert!(!rel.owner);

        let owners: Vec<_> = registry.owner_relations().collect();
        assert_eq!(owners.len(), 1);
        assert_eq!(owners[0].source.name, "Category");
    }

    #[test]
    fn rejects_zero_owner_sides() {
        static NO_OWNER: RelationDef = RelationDef::new("categories", &PRODUCT, &CATEGORY)
            .link("category_products", "product_id", "category_id");
        let err = Registry::builder()
            .entity(&PRODUCT)
            .entity(&CATEGORY)
            .relation(&NO_OWNER)
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("exactly one owner side"));
    }

    #[test]
    fn rejects_two_owner_sides() {
        static A: RelationDef = RelationDef::new("categories", &PRODUCT, &CATEGORY)
            .link("category_products", "product_id", "category_id")
            .owner();
        static B: RelationDef = RelationDef::new("products", &CATEGORY, &PRODUCT)
            .link("category_products", "category_id", "product_id")
            .owner();
        let err = Registry::builder()
            .entity(&PRODUCT)
            .entity(&CATEGORY)
            .relation(&A)
            .relation(&B)
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("exactly one owner side"));
    }

    #[test]
    fn rejects_unmirrored_sides() {
        static A: RelationDef = RelationDef::new("categories", &PRODUCT, &CATEGORY)
            .link("category_products", "product_id", "category_id")
            .owner();
        static B: RelationDef = RelationDef::new("products", &CATEGORY, &PRODUCT)
            .link("category_products", "product_id", "category_id");
        let err = Registry::builder()
            .entity(&PRODUCT)
            .entity(&CATEGORY)
            .relation(&A)
            .relation(&B)
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("do not mirror"));
    }

    #[test]
    fn rejects_unregistered_entity() {
        let err = Registry::builder()
            .entity(&PRODUCT)
            .relation(&PRODUCT_CATEGORIES)
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("unregistered entity"));
    }

    #[test]
    fn rejects_duplicate_entities() {
        let err = Registry::builder()
            .entity(&PRODUCT)
            .entity(&PRODUCT)
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("duplicate entity"));
    }

    #[test]
    fn rejects_invalid_identifiers() {
        static BAD: EntityDef = EntityDef::new(
            "Bad Name",
            "bad",
            &[FieldDef::new("id", ColumnType::Integer).primary_key()],
        );
        let err = Registry::builder().entity(&BAD).build().unwrap_err();
        assert!(err.to_string().contains("invalid entity name"));
    }

    #[test]
    fn single_sided_relation_with_owner_is_accepted() {
        static ONLY: RelationDef = RelationDef::new("products", &CATEGORY, &PRODUCT)
            .link("category_products", "category_id", "product_id")
            .owner();
        let registry = Registry::builder()
            .entity(&PRODUCT)
            .entity(&CATEGORY)
            .relation(&ONLY)
            .build()
            .expect("unidirectional relation is valid");
        assert_eq!(registry.relations().len(), 1);
    }
}
