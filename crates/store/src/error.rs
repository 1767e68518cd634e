//! Error types surfaced by the store.
//!
//! Mutation paths never swallow errors: every failure is returned to the
//! caller. Refetch failures after an already-committed mutation are the one
//! exception; they are logged and the next refresh attempt starts clean.

use std::fmt;

use thiserror::Error;
use uuid::Uuid;

use crate::remote::RemoteError;

/// An input field rejected by validation, with the reason.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FieldIssue {
    pub field: &'static str,
    pub reason: String,
}

impl FieldIssue {
    pub fn new(field: &'static str, reason: impl Into<String>) -> Self {
        Self {
            field,
            reason: reason.into(),
        }
    }
}

impl fmt::Display for FieldIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.reason)
    }
}

/// The errors returned by store operations.
#[derive(Debug, Error, PartialEq)]
pub enum StoreError {
    /// Input rejected before any remote call. Lists every offending field.
    #[error("invalid input: {}", join_issues(.0))]
    Validation(Vec<FieldIssue>),

    /// The operation requires a bound identity.
    #[error("no identity bound")]
    Unauthorized,

    /// Delete target absent from the current snapshot.
    #[error("purchase {0} is not in the current snapshot")]
    NotFound(Uuid),

    /// The remote service failed; the snapshot keeps its last known state.
    #[error(transparent)]
    Remote(#[from] RemoteError),

    /// The store was assembled without a required collaborator.
    #[error("store misconfigured: {0}")]
    Configuration(String),
}

impl StoreError {
    /// Shorthand for a single-field validation error.
    pub(crate) fn invalid_field(field: &'static str, reason: impl Into<String>) -> Self {
        Self::Validation(vec![FieldIssue::new(field, reason)])
    }
}

fn join_issues(issues: &[FieldIssue]) -> String {
    issues
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}
