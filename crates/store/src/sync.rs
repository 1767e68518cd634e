//! Synchronized snapshot of one user's purchases.
//!
//! [`SyncStore`] owns the authoritative local collection for the bound
//! identity and keeps it consistent with the remote service: full refetches
//! on demand and on change notices, optimistic deletes with wholesale
//! snapshot rollback, and stale-response discarding so the newest fetch
//! always wins regardless of completion order.

use std::sync::{Arc, Mutex, MutexGuard, Weak};

use chrono::NaiveDate;
use tokio::{sync::broadcast, task::JoinHandle};
use uuid::Uuid;

use crate::{
    ChangeEvent, ChangeFeed, Money, PurchaseDraft, PurchaseRecord, RemoteError, RemoteStore,
    ResultStore, StoreError,
    stats::{self, FavoriteProduct, Totals},
};

/// Snapshot lifecycle with respect to the bound identity.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Phase {
    /// No identity bound; the snapshot is empty and no remote calls happen.
    #[default]
    Unbound,
    /// A fetch is in flight; the prior collection stays visible meanwhile.
    Loading,
    /// The snapshot reflects the last completed fetch, plus any optimistic
    /// local edits.
    Ready,
}

/// Client-side purchase store.
///
/// Construct with [`SyncStore::builder`], then [`bind`](Self::bind) an
/// identity. All mutation of the collection happens behind one mutex that is
/// never held across an await; remote round trips run on captured values and
/// re-validate the session before applying anything.
pub struct SyncStore {
    remote: Arc<dyn RemoteStore>,
    feed: Option<Arc<dyn ChangeFeed>>,
    weak: Weak<SyncStore>,
    inner: Mutex<Inner>,
}

#[derive(Default)]
struct Inner {
    identity: Option<Uuid>,
    phase: Phase,
    snapshot: Arc<Vec<PurchaseRecord>>,
    /// Sequence number of the most recently issued fetch. A response is
    /// applied only while its number is still the latest.
    issued: u64,
    /// Bumped on every bind/unbind; results captured under an older session
    /// are never applied.
    session: u64,
    listener: Option<JoinHandle<()>>,
}

impl SyncStore {
    /// Returns a builder for `SyncStore`.
    pub fn builder() -> SyncStoreBuilder {
        SyncStoreBuilder::default()
    }

    /// Bind `user` and start synchronizing.
    ///
    /// Replaces any previous binding: the old session's in-flight results
    /// are discarded and its listener stopped. When a change feed is
    /// configured a listener task is started, then the initial fetch runs.
    pub async fn bind(&self, user: Uuid) -> ResultStore<()> {
        let replaced = {
            let mut inner = self.lock();
            inner.session += 1;
            inner.identity = Some(user);
            inner.phase = Phase::Loading;
            inner.snapshot = Arc::new(Vec::new());
            let old = inner.listener.take();
            if let Some(feed) = &self.feed {
                inner.listener = Some(listen(self.weak.clone(), feed.subscribe()));
            }
            old
        };
        if let Some(handle) = replaced {
            handle.abort();
        }

        self.refresh().await
    }

    /// Drop the bound identity and clear the snapshot.
    ///
    /// The listener is stopped and the session counter bumped, so results of
    /// fetches still in flight are discarded when they land. Calling this
    /// again, or without a binding, is harmless.
    pub fn unbind(&self) {
        let stopped = {
            let mut inner = self.lock();
            inner.session += 1;
            inner.identity = None;
            inner.phase = Phase::Unbound;
            inner.snapshot = Arc::new(Vec::new());
            inner.listener.take()
        };
        if let Some(handle) = stopped {
            handle.abort();
        }
    }

    /// Refetch the full collection for the bound identity.
    ///
    /// The result is sorted newest first (date, then creation time). A
    /// response is applied only if no newer fetch has been issued since and
    /// the session is unchanged; late arrivals are dropped. On failure the
    /// previous snapshot stays visible and the error is returned, without
    /// blocking later refreshes. While unbound this is a no-op.
    pub async fn refresh(&self) -> ResultStore<()> {
        let (owner, seq, session) = {
            let mut inner = self.lock();
            let Some(owner) = inner.identity else {
                return Ok(());
            };
            inner.issued += 1;
            inner.phase = Phase::Loading;
            (owner, inner.issued, inner.session)
        };

        let outcome = self.remote.select(owner).await;

        let mut inner = self.lock();
        if inner.session != session || inner.issued != seq {
            tracing::debug!(seq, "discarding stale fetch response");
            return Ok(());
        }
        match outcome {
            Ok(mut rows) => {
                sort_snapshot(&mut rows);
                inner.snapshot = Arc::new(rows);
                inner.phase = Phase::Ready;
                Ok(())
            }
            Err(err) => {
                inner.phase = Phase::Ready;
                Err(StoreError::Remote(err))
            }
        }
    }

    /// Validate and persist a new purchase, then refetch so the snapshot
    /// reflects the authoritative row.
    ///
    /// Fails fast on invalid input or a missing identity without contacting
    /// the remote service. Returns the created record as stored remotely. A
    /// refetch failure after a successful insert is logged, not returned.
    pub async fn insert(
        &self,
        name: &str,
        price: Money,
        date: NaiveDate,
    ) -> ResultStore<PurchaseRecord> {
        let draft = PurchaseDraft::new(name, price, date)?;
        let owner = self.lock().identity.ok_or(StoreError::Unauthorized)?;

        let created = self.remote.insert(draft, owner).await?;

        if let Err(err) = self.refresh().await {
            tracing::warn!("refetch after insert failed: {err}");
        }
        Ok(created)
    }

    /// Optimistically remove `id`, then delete it remotely.
    ///
    /// The record disappears from the snapshot before the remote call
    /// resolves. On remote failure the snapshot captured right before the
    /// removal is restored wholesale; reconciliation with concurrent writers
    /// is left to the next refetch, never to a diff. A remote not-found is
    /// treated as already deleted. On success a reconciling refetch runs
    /// (failure logged, not returned).
    pub async fn delete(&self, id: Uuid) -> ResultStore<()> {
        let (owner, session, before) = {
            let mut inner = self.lock();
            let owner = inner.identity.ok_or(StoreError::Unauthorized)?;
            if !inner.snapshot.iter().any(|p| p.id == id) {
                return Err(StoreError::NotFound(id));
            }
            let before = Arc::clone(&inner.snapshot);
            let after: Vec<PurchaseRecord> =
                before.iter().filter(|p| p.id != id).cloned().collect();
            inner.snapshot = Arc::new(after);
            (owner, inner.session, before)
        };

        match self.remote.delete(id, owner).await {
            Ok(()) => {}
            // The row was already gone remotely; keep the removal.
            Err(RemoteError::NotFound) => {}
            Err(err) => {
                let mut inner = self.lock();
                if inner.session == session {
                    inner.snapshot = before;
                }
                return Err(StoreError::Remote(err));
            }
        }

        if let Err(err) = self.refresh().await {
            tracing::warn!("refetch after delete failed: {err}");
        }
        Ok(())
    }

    /// The current collection. Never blocks on remote activity.
    #[must_use]
    pub fn snapshot(&self) -> Arc<Vec<PurchaseRecord>> {
        Arc::clone(&self.lock().snapshot)
    }

    #[must_use]
    pub fn phase(&self) -> Phase {
        self.lock().phase
    }

    #[must_use]
    pub fn identity(&self) -> Option<Uuid> {
        self.lock().identity
    }

    /// Spending totals over the current snapshot.
    #[must_use]
    pub fn totals(&self) -> Totals {
        stats::totals(&self.snapshot())
    }

    /// Most frequently bought product in the current snapshot.
    #[must_use]
    pub fn favorite_product(&self) -> Option<FavoriteProduct> {
        stats::favorite_product(&self.snapshot())
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl Drop for SyncStore {
    fn drop(&mut self) {
        let inner = match self.inner.get_mut() {
            Ok(inner) => inner,
            Err(poisoned) => poisoned.into_inner(),
        };
        if let Some(handle) = inner.listener.take() {
            handle.abort();
        }
    }
}

/// Change listener task: every notice triggers a refetch while the store is
/// bound. Holds only a weak reference so a dropped store ends the task
/// instead of the task keeping the store alive.
fn listen(store: Weak<SyncStore>, mut events: broadcast::Receiver<ChangeEvent>) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            let received = match events.recv().await {
                Ok(event) => Some(event.kind),
                // Dropped notices still mean the snapshot may be stale.
                Err(broadcast::error::RecvError::Lagged(_)) => None,
                Err(broadcast::error::RecvError::Closed) => break,
            };
            let Some(store) = store.upgrade() else {
                break;
            };
            if store.identity().is_none() {
                continue;
            }
            match received {
                Some(kind) => tracing::debug!(?kind, "change notice, refetching"),
                None => tracing::debug!("change feed lagged, refetching"),
            }
            if let Err(err) = store.refresh().await {
                tracing::warn!("refetch after change notice failed: {err}");
            }
        }
    })
}

/// Newest first: by purchase date, ties broken by creation time.
fn sort_snapshot(rows: &mut [PurchaseRecord]) {
    rows.sort_by(|a, b| {
        b.date
            .cmp(&a.date)
            .then_with(|| b.created_at.cmp(&a.created_at))
    });
}

/// Builder for [`SyncStore`].
#[derive(Default)]
pub struct SyncStoreBuilder {
    remote: Option<Arc<dyn RemoteStore>>,
    feed: Option<Arc<dyn ChangeFeed>>,
}

impl SyncStoreBuilder {
    /// Pass the required remote service.
    pub fn remote(mut self, remote: Arc<dyn RemoteStore>) -> SyncStoreBuilder {
        self.remote = Some(remote);
        self
    }

    /// Pass an optional change feed; without one the store only refetches on
    /// demand and after its own mutations.
    pub fn feed(mut self, feed: Arc<dyn ChangeFeed>) -> SyncStoreBuilder {
        self.feed = Some(feed);
        self
    }

    /// Construct the store.
    pub fn build(self) -> ResultStore<Arc<SyncStore>> {
        let remote = self
            .remote
            .ok_or_else(|| StoreError::Configuration("a remote store is required".to_string()))?;

        Ok(Arc::new_cyclic(|weak| SyncStore {
            remote,
            feed: self.feed,
            weak: weak.clone(),
            inner: Mutex::new(Inner::default()),
        }))
    }
}
