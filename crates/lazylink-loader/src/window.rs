//! Explicit batch window: the Batch Loader.
//!
//! A [`BatchWindow`] makes the batching boundary visible: collections
//! register requests with
//! [`Collection::init_batched`](crate::Collection::init_batched), and
//! [`BatchWindow::flush`] drains everything registered up to that call —
//! one consolidated query per relation definition — then distributes the
//! result rows back to each requesting collection. Requests registered
//! after the drain belong to the next flush.

use crate::sql;
use lazylink_core::{Connection, Cx, Error, Outcome, RelationDef, Result, Row};
use std::mem;
use std::sync::{Arc, Mutex, PoisonError};

pub(crate) type DeliverFn = Box<dyn FnOnce(&[Row]) -> Result<()> + Send>;
pub(crate) type FailFn = Box<dyn FnOnce() + Send>;

/// State machine of one batched initialization request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestState {
    /// Registered in a window, waiting for the flush boundary.
    Queued,
    /// The consolidated query has been issued.
    QueryIssued,
    /// Rows were delivered to the collection.
    Resolved,
    /// The query or the delivery failed.
    Failed,
}

/// Handle to one batched initialization request.
///
/// The collection itself receives the results; the handle only exposes the
/// request lifecycle.
#[derive(Debug)]
pub struct PendingInit {
    state: Arc<Mutex<RequestState>>,
}

impl PendingInit {
    pub(crate) fn new(state: Arc<Mutex<RequestState>>) -> Self {
        Self { state }
    }

    /// Handle for a request that needed no query (collection already
    /// initialized).
    pub(crate) fn already_resolved() -> Self {
        Self::new(Arc::new(Mutex::new(RequestState::Resolved)))
    }

    /// Current request state.
    pub fn state(&self) -> RequestState {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Whether rows have been delivered.
    pub fn is_resolved(&self) -> bool {
        self.state() == RequestState::Resolved
    }
}

struct BatchRequest {
    owner_id: i64,
    state: Arc<Mutex<RequestState>>,
    deliver: DeliverFn,
    fail: FailFn,
}

struct RelationQueue {
    relation: &'static RelationDef,
    requests: Vec<BatchRequest>,
}

/// Outcome of one window flush.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WindowSummary {
    /// Consolidated queries issued (one per relation with requests).
    pub queries_issued: usize,
    /// Requests resolved by this flush.
    pub requests_resolved: usize,
    /// Raw result rows fetched, before per-request deduplication. Larger
    /// than the number of distinct members whenever the batched join
    /// fans out.
    pub rows_fetched: usize,
}

/// A batching window over pending collection-initialization requests.
#[derive(Default)]
pub struct BatchWindow {
    queues: Mutex<Vec<RelationQueue>>,
}

impl BatchWindow {
    /// Open an empty window.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of requests waiting for the next flush.
    pub fn pending_requests(&self) -> usize {
        self.lock_queues().iter().map(|q| q.requests.len()).sum()
    }

    pub(crate) fn enqueue(
        &self,
        relation: &'static RelationDef,
        owner_id: i64,
        deliver: DeliverFn,
        fail: FailFn,
    ) -> PendingInit {
        let state = Arc::new(Mutex::new(RequestState::Queued));
        let request = BatchRequest {
            owner_id,
            state: Arc::clone(&state),
            deliver,
            fail,
        };

        let mut queues = self.lock_queues();
        match queues
            .iter_mut()
            .find(|q| std::ptr::eq(q.relation, relation))
        {
            Some(queue) => queue.requests.push(request),
            None => queues.push(RelationQueue {
                relation,
                requests: vec![request],
            }),
        }

        PendingInit::new(state)
    }

    /// Close the window: issue one consolidated query per relation with
    /// pending requests and distribute rows back to the collections.
    ///
    /// All requests registered before this call are settled by this call;
    /// a failed query fails every request that was still pending.
    pub async fn flush<C: Connection>(&self, cx: &Cx, conn: &C) -> Outcome<WindowSummary, Error> {
        let drained = mem::take(&mut *self.lock_queues());
        let mut summary = WindowSummary::default();

        let mut queues = drained.into_iter();
        while let Some(queue) = queues.next() {
            if queue.requests.is_empty() {
                continue;
            }

            let mut ids: Vec<i64> = Vec::new();
            for request in &queue.requests {
                if !ids.contains(&request.owner_id) {
                    ids.push(request.owner_id);
                }
            }

            let q = sql::batched_collection_query(queue.relation, &ids);
            for request in &queue.requests {
                set_state(&request.state, RequestState::QueryIssued);
            }
            tracing::debug!(
                relation = queue.relation.name,
                requests = queue.requests.len(),
                sql = %q.sql,
                "flushing batch window"
            );

            let rows = match conn.query(cx, &q.sql, &[]).await {
                Outcome::Ok(rows) => rows,
                Outcome::Err(e) => {
                    fail_requests(queue.requests);
                    fail_queues(queues);
                    return Outcome::Err(e);
                }
                Outcome::Cancelled(r) => {
                    fail_requests(queue.requests);
                    fail_queues(queues);
                    return Outcome::Cancelled(r);
                }
                Outcome::Panicked(p) => {
                    fail_requests(queue.requests);
                    fail_queues(queues);
                    return Outcome::Panicked(p);
                }
            };
            summary.queries_issued += 1;
            summary.rows_fetched += rows.len();

            let mut requests = queue.requests.into_iter();
            while let Some(request) = requests.next() {
                let BatchRequest {
                    owner_id,
                    state,
                    deliver,
                    fail,
                } = request;

                // Partition by the populated owner identifier column.
                let partition: Vec<Row> = rows
                    .iter()
                    .filter(|row| {
                        row.get_by_name(&q.owner_id_column)
                            .and_then(|v| v.as_i64())
                            == Some(owner_id)
                    })
                    .cloned()
                    .collect();

                match deliver(&partition) {
                    Ok(()) => {
                        set_state(&state, RequestState::Resolved);
                        summary.requests_resolved += 1;
                    }
                    Err(e) => {
                        set_state(&state, RequestState::Failed);
                        fail();
                        fail_requests(requests);
                        fail_queues(queues);
                        return Outcome::Err(e);
                    }
                }
            }
        }

        Outcome::Ok(summary)
    }

    fn lock_queues(&self) -> std::sync::MutexGuard<'_, Vec<RelationQueue>> {
        self.queues.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn set_state(state: &Arc<Mutex<RequestState>>, value: RequestState) {
    *state.lock().unwrap_or_else(PoisonError::into_inner) = value;
}

fn fail_requests(requests: impl IntoIterator<Item = BatchRequest>) {
    for BatchRequest { state, fail, .. } in requests {
        set_state(&state, RequestState::Failed);
        fail();
    }
}

fn fail_queues(queues: impl Iterator<Item = RelationQueue>) {
    for queue in queues {
        fail_requests(queue.requests);
    }
}
