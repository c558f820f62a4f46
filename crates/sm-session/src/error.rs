// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Errors for the session manager and auth gate (§7 of `SPEC_FULL.md`).

use sm_inventory::CoreError;
use thiserror::Error;

/// Errors from session-manager operations (`RegisterProbe`, activation,
/// restart/gone signalling).
#[derive(Debug, Error)]
pub enum SessionError {
    /// A session already exists for this probe id.
    #[error("session already exists")]
    AlreadyExists,
    /// No session exists for this probe id.
    #[error("no session for probe")]
    NotFound,
    /// An invariant was violated (e.g. the probe record referencing the
    /// tenant should not exist if the tenant does not).
    #[error("internal error: {0}")]
    Internal(String),
}

impl SessionError {
    /// Wrap an inventory lookup failure encountered while registering a
    /// probe. Per §4.3, any lookup failure here is `INTERNAL_ERROR` from
    /// the probe's perspective.
    #[track_caller]
    pub fn from_lookup_failure(err: &CoreError) -> Self {
        tracing::error!(error = %err, "probe lookup failed during registration");
        Self::Internal(err.to_string())
    }
}

/// Errors from the auth gate (§4.2).
#[derive(Debug, Error)]
pub enum AuthError {
    /// The authorization metadata was missing, duplicated, or not of the
    /// form `Bearer <base64>`.
    #[error("invalid authorization metadata: {0}")]
    InvalidArgument(String),
    /// The token decoded fine but does not resolve to a known probe.
    #[error("unknown token: {0}")]
    UnknownToken(#[source] CoreError),
}
