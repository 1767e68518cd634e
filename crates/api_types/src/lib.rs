use chrono::{DateTime, FixedOffset, NaiveDate};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub mod purchase {
    use super::*;

    /// Payload for recording a new purchase.
    ///
    /// The owner is never part of the payload; the server takes it from the
    /// authenticated user.
    #[derive(Clone, Debug, Serialize, Deserialize)]
    pub struct PurchaseNew {
        pub name: String,
        /// Price in minor units (cents). Must be strictly positive.
        pub price_minor: i64,
        /// Calendar day of the purchase (`YYYY-MM-DD`).
        pub date: NaiveDate,
    }

    /// A stored purchase as returned by the server.
    #[derive(Clone, Debug, Serialize, Deserialize)]
    pub struct PurchaseView {
        /// Purchase id (UUID).
        ///
        /// This is serialized as a string in JSON.
        pub id: Uuid,
        pub name: String,
        pub price_minor: i64,
        pub date: NaiveDate,
        /// Creation timestamp (RFC 3339).
        pub created_at: DateTime<FixedOffset>,
    }

    #[derive(Clone, Debug, Serialize, Deserialize)]
    pub struct PurchaseListResponse {
        /// Newest first: date descending, then creation time descending.
        pub purchases: Vec<PurchaseView>,
    }
}

pub mod changes {
    use super::*;

    /// What kind of write produced a change notice.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
    #[serde(rename_all = "snake_case")]
    pub enum ChangeKind {
        Insert,
        Update,
        Delete,
    }

    /// Query for the long-poll changes endpoint.
    ///
    /// Without `after` the server answers immediately with the current
    /// cursor, which is how a client establishes its baseline.
    #[derive(Clone, Copy, Debug, Default, Serialize, Deserialize)]
    pub struct ChangePoll {
        pub after: Option<u64>,
    }

    /// Long-poll answer.
    ///
    /// `cursor` counts every change since the server started; any advance
    /// past the client's `after` means the purchases table changed. `kinds`
    /// lists the notices observed while the poll was waiting and may be
    /// empty even when the cursor advanced.
    #[derive(Clone, Debug, Serialize, Deserialize)]
    pub struct ChangesResponse {
        pub cursor: u64,
        pub kinds: Vec<ChangeKind>,
    }
}

pub mod user {
    use super::*;

    /// The authenticated identity, as reported by `/user/me`.
    #[derive(Clone, Debug, Serialize, Deserialize)]
    pub struct WhoAmI {
        /// User id (UUID), the value purchase ownership is scoped by.
        pub id: Uuid,
        pub username: String,
    }
}
