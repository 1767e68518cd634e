//! Contracts between the store and the remote purchases service.

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::{PurchaseDraft, PurchaseRecord};

/// Failure reported by a remote store implementation.
///
/// The store treats every variant the same way: the operation fails, the
/// snapshot stays in its last known good state, and no retry is attempted.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum RemoteError {
    /// The service rejected the caller's credentials or identity.
    #[error("remote rejected the identity")]
    Unauthorized,

    /// The service refused the row because of a server-side invariant.
    #[error("remote constraint violated: {0}")]
    Constraint(String),

    /// No row matched the id and owner.
    #[error("remote record not found")]
    NotFound,

    /// Network failure, timeout or malformed response.
    #[error("transport error: {0}")]
    Transport(String),
}

/// Remote persistence operations over the purchases table.
///
/// Every operation is scoped to an owner; the store never issues a call
/// without a bound identity. Implementations do not have to return `select`
/// results in any particular order, the store sorts snapshots itself.
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Fetch every purchase owned by `owner`.
    async fn select(&self, owner: Uuid) -> Result<Vec<PurchaseRecord>, RemoteError>;

    /// Persist a validated draft for `owner` and return the stored row,
    /// including the server-assigned id and creation timestamp.
    async fn insert(
        &self,
        draft: PurchaseDraft,
        owner: Uuid,
    ) -> Result<PurchaseRecord, RemoteError>;

    /// Delete the purchase `id` if it belongs to `owner`.
    ///
    /// Returns [`RemoteError::NotFound`] when no owned row matched.
    async fn delete(&self, id: Uuid, owner: Uuid) -> Result<(), RemoteError>;
}

/// What kind of write produced a change notice.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChangeKind {
    Insert,
    Update,
    Delete,
}

/// Table-level change notice.
///
/// Carries no row payload: a notice only means the snapshot may be stale and
/// a full refetch is due. The kind is informational.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ChangeEvent {
    pub kind: ChangeKind,
}

/// Source of purchase-table change notices.
///
/// Dropping the receiver ends the subscription; doing so repeatedly is
/// harmless.
pub trait ChangeFeed: Send + Sync {
    /// Open a subscription delivering every subsequent change notice.
    fn subscribe(&self) -> broadcast::Receiver<ChangeEvent>;
}
