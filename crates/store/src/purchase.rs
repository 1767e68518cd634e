use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{FieldIssue, Money, ResultStore, StoreError};

/// A purchase as held in the local snapshot.
///
/// Records are immutable once created; the only lifecycle transition is
/// deletion. `id` and `created_at` are assigned by the remote service.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PurchaseRecord {
    pub id: Uuid,
    pub name: String,
    pub price: Money,
    /// Calendar day the purchase was made.
    pub date: NaiveDate,
    /// When the record was stored remotely.
    pub created_at: DateTime<Utc>,
    pub owner: Uuid,
}

/// Validated input for a new purchase.
///
/// Construction is the single validation point: an instance always carries a
/// non-empty trimmed name and a strictly positive price. Invalid input is
/// rejected with one [`StoreError::Validation`] listing every offending
/// field.
#[derive(Clone, Debug, PartialEq)]
pub struct PurchaseDraft {
    name: String,
    price: Money,
    date: NaiveDate,
}

impl PurchaseDraft {
    pub fn new(name: &str, price: Money, date: NaiveDate) -> ResultStore<Self> {
        let mut issues = Vec::new();

        let trimmed = name.trim();
        if trimmed.is_empty() {
            issues.push(FieldIssue::new("name", "product name is required"));
        }
        if !price.is_positive() {
            issues.push(FieldIssue::new("price", "price must be greater than zero"));
        }

        if !issues.is_empty() {
            return Err(StoreError::Validation(issues));
        }

        Ok(Self {
            name: trimmed.to_string(),
            price,
            date,
        })
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn price(&self) -> Money {
        self.price
    }

    #[must_use]
    pub fn date(&self) -> NaiveDate {
        self.date
    }
}
