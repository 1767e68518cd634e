pub use error::{FieldIssue, StoreError};
pub use money::Money;
pub use purchase::{PurchaseDraft, PurchaseRecord};
pub use remote::{ChangeEvent, ChangeFeed, ChangeKind, RemoteError, RemoteStore};
pub use stats::{FavoriteProduct, Totals, favorite_product, totals};
pub use sync::{Phase, SyncStore, SyncStoreBuilder};

mod error;
mod money;
mod purchase;
mod remote;
mod stats;
mod sync;

type ResultStore<T> = Result<T, StoreError>;
