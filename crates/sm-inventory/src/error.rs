// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Typed errors for inventory-store operations (§7 of `SPEC_FULL.md`).

use thiserror::Error;

/// Error returned by a rejected or failed inventory-store operation.
///
/// Every operation either succeeds with no partial mutation, or fails with
/// one of these and leaves the store bit-identical to its pre-call state.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CoreError {
    /// Rejected input: missing required field, immutable field changed, or a
    /// referential-integrity violation.
    #[error("validation error: {0}")]
    Validation(String),
    /// A lookup found no matching record.
    #[error("not found: {0}")]
    NotFound(String),
    /// A uniqueness constraint was violated (stack_id, probe name, token,
    /// `(job, target)`).
    #[error("conflict: {0}")]
    Conflict(String),
    /// An invariant was violated or an otherwise-unreachable state was hit.
    /// Logged at `error!` before being surfaced without detail.
    #[error("internal error: {0}")]
    Internal(String),
}

impl CoreError {
    /// Construct a [`CoreError::Validation`].
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Construct a [`CoreError::NotFound`].
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    /// Construct a [`CoreError::Conflict`].
    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    /// Construct a [`CoreError::Internal`], logging it at `error!` first
    /// (per §7: "Internal... Logged at error level; returned...
    /// without detail").
    #[track_caller]
    pub fn internal(msg: impl Into<String>) -> Self {
        let msg = msg.into();
        tracing::error!(detail = %msg, "internal inventory error");
        Self::Internal(msg)
    }
}
