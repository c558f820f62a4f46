// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Probe registration and session management, the change-dispatch filter,
//! and the stream-handler reconciliation algorithm for the
//! synthetic-monitoring checks core (`SPEC_FULL.md` §4.2-§4.5).

pub mod auth;
pub mod dispatch;
pub mod error;
pub mod filter;
pub mod reconciliation;
pub mod session;

pub use dispatch::{dispatch_check_delete, dispatch_check_upsert};
pub use error::{AuthError, SessionError};
pub use filter::{apply_batch, filter, ChangeOp, CheckChange, IncomingChange};
pub use reconciliation::{reconcile, ClaimedCheck, Reconciliation};
pub use session::{
    ActiveSession, Batch, ChangeBatch, SessionManager, CHANNEL_CAPACITY, REGISTRATION_TIMEOUT,
};
