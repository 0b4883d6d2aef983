//! SQL shapes for collection initialization.
//!
//! These builders are pure: they turn a relation definition plus a set of
//! owner identifiers into query text, and report the column names the
//! caller needs to interpret the result. Aliases are the first character
//! of the aliased table name plus a per-query counter, allocated in the
//! order the tables enter the query plan.

use lazylink_core::{RelationDef, quote_ident};

/// Per-query alias allocator.
struct Aliases {
    next: usize,
}

impl Aliases {
    fn new() -> Self {
        Self { next: 0 }
    }

    fn next(&mut self, table: &str) -> String {
        let letter = table.chars().next().unwrap_or('t');
        let alias = format!("{letter}{}", self.next);
        self.next += 1;
        alias
    }
}

fn col(alias: &str, column: &str) -> String {
    format!("{}.{}", quote_ident(alias), quote_ident(column))
}

fn ids_list(ids: &[i64]) -> String {
    let rendered: Vec<String> = ids.iter().map(ToString::to_string).collect();
    rendered.join(", ")
}

/// The immediate (non-batched) collection query.
#[derive(Debug, Clone)]
pub struct CollectionQuery {
    /// Query text
    pub sql: String,
    /// Result column carrying the owner identifier (`fk__product_id`)
    pub fk_source_column: String,
    /// Result column carrying the target identifier (`fk__category_id`)
    pub fk_target_column: String,
}

/// Build the single-owner initialization query: the join table inner-joined
/// to the target table, filtered by the owning identifiers.
pub fn collection_query(rel: &RelationDef, owner_ids: &[i64]) -> CollectionQuery {
    let mut aliases = Aliases::new();
    let j = aliases.next(rel.join_table);
    let t = aliases.next(rel.target_table());

    let fk_source_column = format!("fk__{}", rel.source_column);
    let fk_target_column = format!("fk__{}", rel.target_column);

    let sql = format!(
        "select {target_all}, {j_source} as {fk_source}, {j_target} as {fk_target} \
         from {join_table} as {j_alias} \
         inner join {target_table} as {t_alias} on {j_target_on} = {t_pk} \
         where {j_source_where} in ({ids})",
        target_all = format!("{}.*", quote_ident(&t)),
        j_source = col(&j, rel.source_column),
        fk_source = quote_ident(&fk_source_column),
        j_target = col(&j, rel.target_column),
        fk_target = quote_ident(&fk_target_column),
        join_table = quote_ident(rel.join_table),
        j_alias = quote_ident(&j),
        target_table = quote_ident(rel.target_table()),
        t_alias = quote_ident(&t),
        j_target_on = col(&j, rel.target_column),
        t_pk = col(&t, rel.target.primary_key_column()),
        j_source_where = col(&j, rel.source_column),
        ids = ids_list(owner_ids),
    );

    CollectionQuery {
        sql,
        fk_source_column,
        fk_target_column,
    }
}

/// The reference-only query: join table only, no entity data.
#[derive(Debug, Clone)]
pub struct RefQuery {
    /// Query text
    pub sql: String,
    /// Result column carrying the target identifier
    pub fk_target_column: String,
}

/// Build the reference-only initialization query.
pub fn ref_query(rel: &RelationDef, owner_ids: &[i64]) -> RefQuery {
    let mut aliases = Aliases::new();
    let j = aliases.next(rel.join_table);

    let fk_source_column = format!("fk__{}", rel.source_column);
    let fk_target_column = format!("fk__{}", rel.target_column);

    let sql = format!(
        "select {j_source} as {fk_source}, {j_target} as {fk_target} \
         from {join_table} as {j_alias} \
         where {j_source_where} in ({ids})",
        j_source = col(&j, rel.source_column),
        fk_source = quote_ident(&fk_source_column),
        j_target = col(&j, rel.target_column),
        fk_target = quote_ident(&fk_target_column),
        join_table = quote_ident(rel.join_table),
        j_alias = quote_ident(&j),
        j_source_where = col(&j, rel.source_column),
        ids = ids_list(owner_ids),
    );

    RefQuery {
        sql,
        fk_target_column,
    }
}

/// The consolidated batched query.
#[derive(Debug, Clone)]
pub struct BatchedQuery {
    /// Query text
    pub sql: String,
    /// Result column carrying the populated owner identifier (`p1__id`);
    /// distribution partitions rows by this column.
    pub owner_id_column: String,
}

/// Build the batched initialization query covering all queued owner
/// identifiers.
///
/// The shape is the documented double join: the target table is
/// left-joined to the join table and through it to the owner table
/// (unfiltered populate joins), then left-joined to the join table a
/// second time to carry the owner filter. Because the populate joins are
/// unfiltered, each target row appears once per linked owner row — raw
/// fan-out the distribution layer must deduplicate.
pub fn batched_collection_query(rel: &RelationDef, owner_ids: &[i64]) -> BatchedQuery {
    let mut aliases = Aliases::new();
    let root = aliases.next(rel.target_table());
    let populate = aliases.next(rel.source_table());
    let link = aliases.next(rel.join_table);
    let filter = aliases.next(rel.join_table);

    let source_pk = rel.source.primary_key_column();
    let target_pk = rel.target.primary_key_column();
    let owner_id_column = format!("{populate}__{source_pk}");

    let mut select_list = vec![format!("{}.*", quote_ident(&root))];
    for field in rel.source.fields {
        select_list.push(format!(
            "{} as {}",
            col(&populate, field.column),
            quote_ident(&format!("{populate}__{}", field.column)),
        ));
    }

    let sql = format!(
        "select {select_list} \
         from {target_table} as {root_alias} \
         left join {join_table} as {link_alias} on {root_pk} = {link_target} \
         left join {source_table} as {populate_alias} on {link_source} = {populate_pk} \
         left join {join_table} as {filter_alias} on {root_pk2} = {filter_target} \
         where {filter_source} in ({ids})",
        select_list = select_list.join(", "),
        target_table = quote_ident(rel.target_table()),
        root_alias = quote_ident(&root),
        join_table = quote_ident(rel.join_table),
        link_alias = quote_ident(&link),
        root_pk = col(&root, target_pk),
        link_target = col(&link, rel.target_column),
        source_table = quote_ident(rel.source_table()),
        populate_alias = quote_ident(&populate),
        link_source = col(&link, rel.source_column),
        populate_pk = col(&populate, source_pk),
        filter_alias = quote_ident(&filter),
        root_pk2 = col(&root, target_pk),
        filter_target = col(&filter, rel.target_column),
        filter_source = col(&filter, rel.source_column),
        ids = ids_list(owner_ids),
    );

    BatchedQuery {
        sql,
        owner_id_column,
    }
}
