// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Auth gate (§4.2 of `SPEC_FULL.md`): transport-agnostic half. Resolves a
//! raw `authorization` metadata value to a probe id. The gate does not
//! itself touch session state.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use sm_inventory::InventoryStore;

use crate::error::AuthError;

const SCHEME_PREFIX: &str = "Bearer ";

/// Resolve a single `authorization` metadata value to a probe id.
///
/// `value` must be the full, single header value (callers are responsible
/// for failing with [`AuthError::InvalidArgument`] themselves if the
/// metadata entry was missing or duplicated before calling this).
pub fn resolve_probe_id(store: &InventoryStore, value: &str) -> Result<i64, AuthError> {
    let token_b64 = value.strip_prefix(SCHEME_PREFIX).ok_or_else(|| {
        AuthError::InvalidArgument("authorization header must be `Bearer <base64>`".into())
    })?;
    let raw = STANDARD
        .decode(token_b64)
        .map_err(|e| AuthError::InvalidArgument(format!("invalid base64 token: {e}")))?;
    store
        .find_probe_id_by_token(&raw)
        .map_err(AuthError::UnknownToken)
}

/// Validate that exactly one `authorization` metadata value was present.
pub fn require_single_value<'a>(values: &'a [&'a str]) -> Result<&'a str, AuthError> {
    match values {
        [] => Err(AuthError::InvalidArgument(
            "missing authorization metadata".into(),
        )),
        [single] => Ok(single),
        _ => Err(AuthError::InvalidArgument(
            "duplicate authorization metadata".into(),
        )),
    }
}
