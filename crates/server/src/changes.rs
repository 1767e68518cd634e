//! Change notification endpoint
//!
//! Every write to the purchases table bumps a cursor and broadcasts the
//! change kind. Clients long-poll `/changes` with the last cursor they saw
//! and come back for a full refetch whenever it moves.

use std::sync::{
    Arc,
    atomic::{AtomicU64, Ordering},
};
use std::time::Duration;

use axum::{
    Json,
    extract::{Query, State},
};
use tokio::sync::broadcast;

use api_types::changes::{ChangeKind, ChangePoll, ChangesResponse};

use crate::server::ServerState;

/// How long a poll with an up-to-date cursor is parked before answering
/// empty. Clients are expected to use a slightly larger request timeout.
const POLL_WINDOW: Duration = Duration::from_secs(25);

const BUS_CAPACITY: usize = 64;

#[derive(Clone)]
pub struct ChangeBus {
    tx: broadcast::Sender<ChangeKind>,
    cursor: Arc<AtomicU64>,
}

impl ChangeBus {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(BUS_CAPACITY);
        Self {
            tx,
            cursor: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Records one mutation and wakes every parked poll.
    pub fn publish(&self, kind: ChangeKind) {
        self.cursor.fetch_add(1, Ordering::SeqCst);
        // No parked poll is fine.
        let _ = self.tx.send(kind);
    }

    fn cursor(&self) -> u64 {
        self.cursor.load(Ordering::SeqCst)
    }

    fn subscribe(&self) -> broadcast::Receiver<ChangeKind> {
        self.tx.subscribe()
    }
}

impl Default for ChangeBus {
    fn default() -> Self {
        Self::new()
    }
}

/// Long-poll handler.
///
/// Without `after` the current cursor is returned immediately so the caller
/// can establish a baseline. With `after`, the request is parked until the
/// cursor moves past it or the window elapses.
pub async fn poll(
    State(state): State<ServerState>,
    Query(params): Query<ChangePoll>,
) -> Json<ChangesResponse> {
    let bus = &state.changes;

    let Some(after) = params.after else {
        return Json(ChangesResponse {
            cursor: bus.cursor(),
            kinds: Vec::new(),
        });
    };

    // Subscribe before comparing cursors so a publish landing between the
    // two steps is never missed.
    let mut rx = bus.subscribe();

    let current = bus.cursor();
    if current != after {
        return Json(ChangesResponse {
            cursor: current,
            kinds: Vec::new(),
        });
    }

    let mut kinds = Vec::new();
    let deadline = tokio::time::Instant::now() + POLL_WINDOW;
    match tokio::time::timeout_at(deadline, rx.recv()).await {
        Ok(Ok(kind)) => {
            kinds.push(kind);
            // Pick up the rest of the burst, if any.
            while let Ok(kind) = rx.try_recv() {
                kinds.push(kind);
            }
        }
        // Lagged still means the cursor moved; the caller refetches anyway.
        Ok(Err(broadcast::error::RecvError::Lagged(_)))
        | Ok(Err(broadcast::error::RecvError::Closed))
        | Err(_) => {}
    }

    Json(ChangesResponse {
        cursor: bus.cursor(),
        kinds,
    })
}
