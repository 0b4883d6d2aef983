//! Many-to-many relation collections.

use crate::options::{InitOptions, REF_OPTION};
use crate::sql;
use crate::window::{BatchWindow, PendingInit};
use lazylink_core::{
    Connection, Cx, Entity, EntityRef, Error, LinkOp, Outcome, RelationDef, Result, Row,
};
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Lifecycle state of a relation collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CollectionState {
    /// No load has been requested yet.
    #[default]
    Uninitialized,
    /// A load request is registered but results have not been delivered.
    Initializing,
    /// Results have been delivered.
    Initialized,
}

struct Inner<T: Entity> {
    owner_id: Option<i64>,
    state: CollectionState,
    items: Vec<T>,
    refs: Vec<i64>,
    staged: Vec<EntityRef<T>>,
}

fn lock<T: Entity>(inner: &Arc<Mutex<Inner<T>>>) -> MutexGuard<'_, Inner<T>> {
    inner.lock().unwrap_or_else(PoisonError::into_inner)
}

/// The many-to-many members of one owning entity instance.
///
/// A collection starts uninitialized. It is loaded either immediately with
/// [`init`](Self::init), or through a [`BatchWindow`] with
/// [`init_batched`](Self::init_batched). New members are staged with
/// [`add`](Self::add) and written to the join table at the next session
/// flush.
///
/// Clones share the underlying state: a collection identifies the relation
/// members of one entity row, however many handles point at it.
pub struct Collection<T: Entity> {
    relation: &'static RelationDef,
    inner: Arc<Mutex<Inner<T>>>,
}

impl<T: Entity> Collection<T> {
    /// Create an unloaded collection for an entity that has not been
    /// persisted yet.
    pub fn new(relation: &'static RelationDef) -> Self {
        Self {
            relation,
            inner: Arc::new(Mutex::new(Inner {
                owner_id: None,
                state: CollectionState::Uninitialized,
                items: Vec::new(),
                refs: Vec::new(),
                staged: Vec::new(),
            })),
        }
    }

    /// Create an unloaded collection bound to a persisted owner.
    pub fn for_owner(relation: &'static RelationDef, owner_id: i64) -> Self {
        let collection = Self::new(relation);
        lock(&collection.inner).owner_id = Some(owner_id);
        collection
    }

    /// The relation this collection belongs to.
    pub fn relation(&self) -> &'static RelationDef {
        self.relation
    }

    /// The owning entity's identifier, once persisted.
    pub fn owner_id(&self) -> Option<i64> {
        lock(&self.inner).owner_id
    }

    /// Record the owner identifier after the owning entity is persisted.
    pub fn set_owner(&self, owner_id: i64) {
        lock(&self.inner).owner_id = Some(owner_id);
    }

    /// Current lifecycle state.
    pub fn state(&self) -> CollectionState {
        lock(&self.inner).state
    }

    /// Whether results have been delivered.
    pub fn is_initialized(&self) -> bool {
        self.state() == CollectionState::Initialized
    }

    /// Number of loaded members (0 while unloaded; for reference-only
    /// loads this counts the identifier stand-ins).
    pub fn len(&self) -> usize {
        let inner = lock(&self.inner);
        if inner.items.is_empty() {
            inner.refs.len()
        } else {
            inner.items.len()
        }
    }

    /// Whether no members are loaded.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The loaded members, if initialized with full entities.
    pub fn loaded(&self) -> Option<Vec<T>>
    where
        T: Clone,
    {
        let inner = lock(&self.inner);
        match inner.state {
            CollectionState::Initialized => Some(inner.items.clone()),
            _ => None,
        }
    }

    /// The identifier stand-ins, if initialized with a reference-only load.
    pub fn ref_ids(&self) -> Option<Vec<i64>> {
        let inner = lock(&self.inner);
        match inner.state {
            CollectionState::Initialized => Some(inner.refs.clone()),
            _ => None,
        }
    }

    /// Stage members for the next flush.
    ///
    /// Set semantics: a member already staged (same handle or same
    /// identifier) is skipped.
    pub fn add(&self, members: &[EntityRef<T>]) {
        let mut inner = lock(&self.inner);
        for member in members {
            let duplicate = inner.staged.iter().any(|existing| {
                existing.ptr_eq(member)
                    || matches!((existing.id(), member.id()), (Some(a), Some(b)) if a == b)
            });
            if !duplicate {
                inner.staged.push(member.clone());
            }
        }
    }

    /// Number of members staged for the next flush.
    pub fn staged_len(&self) -> usize {
        lock(&self.inner).staged.len()
    }

    /// Drain staged members into join-table inserts.
    ///
    /// Called at flush time, after identifiers have been assigned. Fails
    /// if the owner or any staged member has no identifier yet.
    pub fn drain_link_ops(&self) -> Result<Vec<LinkOp>> {
        let mut inner = lock(&self.inner);
        if inner.staged.is_empty() {
            return Ok(Vec::new());
        }
        let Some(owner_id) = inner.owner_id else {
            return Err(Error::custom(format!(
                "cannot flush links for '{}.{}': owner is not persisted",
                self.relation.source.name, self.relation.name
            )));
        };
        let staged = std::mem::take(&mut inner.staged);
        drop(inner);

        let mut ops = Vec::with_capacity(staged.len());
        for member in staged {
            let Some(target_id) = member.id() else {
                return Err(Error::custom(format!(
                    "cannot flush links for '{}.{}': member is not persisted",
                    self.relation.source.name, self.relation.name
                )));
            };
            let op = self.relation.link_op(owner_id, target_id);
            if !ops.contains(&op) {
                ops.push(op);
            }
        }
        Ok(ops)
    }

    /// Initialize the collection immediately with one single-owner query.
    ///
    /// Fails with an unsupported-option error when `dataloader` and
    /// `ref_only` are combined. Plain `dataloader` requests are directed
    /// to [`init_batched`](Self::init_batched): batching happens at an
    /// explicit window boundary. Idempotent once initialized.
    pub async fn init<C: Connection>(
        &self,
        cx: &Cx,
        conn: &C,
        options: InitOptions,
    ) -> Outcome<Vec<T>, Error>
    where
        T: Clone,
    {
        if options.dataloader && options.ref_only {
            return Outcome::Err(Error::unsupported_option(
                self.relation.target.name,
                REF_OPTION,
            ));
        }
        if options.dataloader {
            return Outcome::Err(Error::custom(format!(
                "batched initialization of '{}.{}' goes through a BatchWindow; use init_batched",
                self.relation.source.name, self.relation.name
            )));
        }

        let owner_id = {
            let mut inner = lock(&self.inner);
            match inner.state {
                CollectionState::Initialized => return Outcome::Ok(inner.items.clone()),
                CollectionState::Initializing => {
                    return Outcome::Err(self.already_initializing());
                }
                CollectionState::Uninitialized => {}
            }
            let Some(owner_id) = inner.owner_id else {
                return Outcome::Err(self.no_owner());
            };
            inner.state = CollectionState::Initializing;
            owner_id
        };

        if options.ref_only {
            return self.init_refs(cx, conn, owner_id).await;
        }

        let q = sql::collection_query(self.relation, &[owner_id]);
        tracing::debug!(
            relation = self.relation.name,
            owner = owner_id,
            sql = %q.sql,
            "initializing collection"
        );
        let rows = match conn.query(cx, &q.sql, &[]).await {
            Outcome::Ok(rows) => rows,
            Outcome::Err(e) => {
                self.reset();
                return Outcome::Err(e);
            }
            Outcome::Cancelled(r) => {
                self.reset();
                return Outcome::Cancelled(r);
            }
            Outcome::Panicked(p) => {
                self.reset();
                return Outcome::Panicked(p);
            }
        };

        let mut items = Vec::with_capacity(rows.len());
        for row in &rows {
            match T::from_row(row) {
                Ok(item) => items.push(item),
                Err(e) => {
                    self.reset();
                    return Outcome::Err(e);
                }
            }
        }

        let out = items.clone();
        let mut inner = lock(&self.inner);
        inner.items = items;
        inner.state = CollectionState::Initialized;
        Outcome::Ok(out)
    }

    async fn init_refs<C: Connection>(
        &self,
        cx: &Cx,
        conn: &C,
        owner_id: i64,
    ) -> Outcome<Vec<T>, Error>
    where
        T: Clone,
    {
        let q = sql::ref_query(self.relation, &[owner_id]);
        tracing::debug!(
            relation = self.relation.name,
            owner = owner_id,
            sql = %q.sql,
            "initializing collection (refs only)"
        );
        let rows = match conn.query(cx, &q.sql, &[]).await {
            Outcome::Ok(rows) => rows,
            Outcome::Err(e) => {
                self.reset();
                return Outcome::Err(e);
            }
            Outcome::Cancelled(r) => {
                self.reset();
                return Outcome::Cancelled(r);
            }
            Outcome::Panicked(p) => {
                self.reset();
                return Outcome::Panicked(p);
            }
        };

        let mut refs = Vec::with_capacity(rows.len());
        for row in &rows {
            match row.get_named::<i64>(&q.fk_target_column) {
                Ok(id) => {
                    if !refs.contains(&id) {
                        refs.push(id);
                    }
                }
                Err(e) => {
                    self.reset();
                    return Outcome::Err(e);
                }
            }
        }

        let mut inner = lock(&self.inner);
        inner.refs = refs;
        inner.state = CollectionState::Initialized;
        Outcome::Ok(Vec::new())
    }

    /// Register a batched initialization request in a window.
    ///
    /// The request resolves when the window flushes. Rejects the
    /// `ref_only` option — reference-only loading is not supported in
    /// combination with batching. On an already-initialized collection
    /// this returns a resolved handle without enqueueing anything.
    pub fn init_batched(
        &self,
        window: &BatchWindow,
        options: InitOptions,
    ) -> Result<PendingInit> {
        if options.ref_only {
            return Err(Error::unsupported_option(
                self.relation.target.name,
                REF_OPTION,
            ));
        }

        let owner_id = {
            let mut inner = lock(&self.inner);
            match inner.state {
                CollectionState::Initialized => return Ok(PendingInit::already_resolved()),
                CollectionState::Initializing => return Err(self.already_initializing()),
                CollectionState::Uninitialized => {}
            }
            let Some(owner_id) = inner.owner_id else {
                return Err(self.no_owner());
            };
            inner.state = CollectionState::Initializing;
            owner_id
        };

        let target_pk = self.relation.target.primary_key_column();
        let deliver_inner = Arc::clone(&self.inner);
        let deliver = Box::new(move |rows: &[Row]| -> Result<()> {
            // Distinct-by-identifier at the consumption boundary: the
            // batched query fans out one row per linked owner row.
            let mut seen = Vec::new();
            let mut items = Vec::new();
            for row in rows {
                let id: i64 = row.get_named(target_pk)?;
                if seen.contains(&id) {
                    continue;
                }
                seen.push(id);
                items.push(T::from_row(row)?);
            }
            let mut inner = lock(&deliver_inner);
            inner.items = items;
            inner.state = CollectionState::Initialized;
            Ok(())
        });

        let fail_inner = Arc::clone(&self.inner);
        let fail = Box::new(move || {
            let mut inner = lock(&fail_inner);
            if inner.state != CollectionState::Initialized {
                inner.state = CollectionState::Uninitialized;
            }
        });

        Ok(window.enqueue(self.relation, owner_id, deliver, fail))
    }

    fn reset(&self) {
        lock(&self.inner).state = CollectionState::Uninitialized;
    }

    fn already_initializing(&self) -> Error {
        Error::custom(format!(
            "initialization of '{}.{}' is already in progress",
            self.relation.source.name, self.relation.name
        ))
    }

    fn no_owner(&self) -> Error {
        Error::custom(format!(
            "collection '{}.{}' has no persisted owner",
            self.relation.source.name, self.relation.name
        ))
    }
}

impl<T: Entity> Clone for Collection<T> {
    fn clone(&self) -> Self {
        Self {
            relation: self.relation,
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: Entity> fmt::Debug for Collection<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = lock(&self.inner);
        f.debug_struct("Collection")
            .field("relation", &self.relation.name)
            .field("owner_id", &inner.owner_id)
            .field("state", &inner.state)
            .field("items", &inner.items.len())
            .field("refs", &inner.refs.len())
            .field("staged", &inner.staged.len())
            .finish()
    }
}
