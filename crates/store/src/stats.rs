//! Pure aggregation over purchase snapshots.
//!
//! Both functions are deterministic and recomputed from scratch on every
//! snapshot change; group membership can shift non-locally on delete, so
//! incremental updates are not attempted.

use std::collections::HashMap;

use unicode_normalization::UnicodeNormalization;

use crate::{Money, PurchaseRecord};

/// Spending totals over a snapshot.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Totals {
    pub total_spent: Money,
    pub count: usize,
    /// Mean price in minor units. `0.0` for an empty snapshot.
    pub average_price: f64,
}

/// The most frequently bought product in a snapshot.
#[derive(Clone, Debug, PartialEq)]
pub struct FavoriteProduct {
    /// Product name as first encountered, trimmed, original casing kept.
    pub name: String,
    pub times_bought: usize,
    /// Share of all purchases, in percent, rounded to one decimal.
    pub share_percent: f64,
    /// Mean price paid for this product, in minor units.
    pub average_price: f64,
}

pub fn totals(purchases: &[PurchaseRecord]) -> Totals {
    let total_spent: Money = purchases.iter().map(|p| p.price).sum();
    let count = purchases.len();
    let average_price = if count > 0 {
        total_spent.minor_units() as f64 / count as f64
    } else {
        0.0
    };

    Totals {
        total_spent,
        count,
        average_price,
    }
}

pub fn favorite_product(purchases: &[PurchaseRecord]) -> Option<FavoriteProduct> {
    struct Group {
        display: String,
        count: usize,
        total_minor: i64,
        first_seen: usize,
    }

    let mut groups: HashMap<String, Group> = HashMap::new();
    for (index, purchase) in purchases.iter().enumerate() {
        let entry = groups
            .entry(group_key(&purchase.name))
            .or_insert_with(|| Group {
                display: purchase.name.trim().to_string(),
                count: 0,
                total_minor: 0,
                first_seen: index,
            });
        entry.count += 1;
        entry.total_minor += purchase.price.minor_units();
    }

    // Highest count wins; on equal counts the group seen first in the input
    // keeps its place.
    let best = groups
        .into_values()
        .min_by_key(|g| (std::cmp::Reverse(g.count), g.first_seen))?;

    Some(FavoriteProduct {
        name: best.display,
        times_bought: best.count,
        share_percent: round_one_decimal(best.count as f64 / purchases.len() as f64 * 100.0),
        average_price: best.total_minor as f64 / best.count as f64,
    })
}

/// Grouping key: trimmed, NFC-normalized, lowercased.
///
/// Grouping is case-insensitive but not accent-insensitive; "Café" and
/// "café" share a group, "Cafe" does not.
fn group_key(name: &str) -> String {
    name.trim().nfc().flat_map(char::to_lowercase).collect()
}

fn round_one_decimal(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}
