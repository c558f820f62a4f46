// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Persisted runtime settings (§12 of `SPEC_FULL.md`), layered under CLI
//! overrides for a single invocation.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Key `ServerSettings` is saved/loaded under via `ConfigService`.
pub const CONFIG_KEY: &str = "server";

/// Runtime settings for `sm-checks-server`, persisted through
/// `ConfigService<FsConfigStore>` and overridable per-invocation by CLI
/// flags.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ServerSettings {
    /// Address the gRPC listener binds to.
    pub listen_addr: String,
    /// Optional bootstrap JSON document loaded at startup (§13).
    pub bootstrap_path: Option<PathBuf>,
    /// Registration-watchdog timeout, in milliseconds.
    pub registration_timeout_ms: u64,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0:9090".to_owned(),
            bootstrap_path: None,
            registration_timeout_ms: u64::try_from(sm_session::REGISTRATION_TIMEOUT.as_millis())
                .unwrap_or(u64::MAX),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::ServerSettings;

    #[test]
    fn default_listen_addr_is_well_formed() {
        let settings = ServerSettings::default();
        assert!(settings.listen_addr.parse::<std::net::SocketAddr>().is_ok());
    }
}
