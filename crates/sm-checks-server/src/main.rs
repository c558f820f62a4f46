// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! `sm-checks-server`: the synthetic-monitoring checks-core binary. Wires
//! together the inventory store (`sm-inventory`), the session manager and
//! auth gate (`sm-session`), and the `Checks`/`Tenants` tonic services
//! (§10-§13 of `SPEC_FULL.md`).

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use sm_config_core::config::ConfigService;
use sm_config_fs::FsConfigStore;
use sm_inventory::{BootstrapData, InventoryStore};
use sm_proto::pb::{checks_server::ChecksServer, tenants_server::TenantsServer};
use sm_session::SessionManager;
use tonic::transport::Server;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

mod auth;
mod config;
mod convert;
mod service;

use config::{ServerSettings, CONFIG_KEY};
use service::{ChecksService, TenantsService};

/// Command-line overrides for the persisted [`ServerSettings`] (§12).
#[derive(Parser, Debug)]
#[command(author, version, about = "Synthetic-monitoring checks-core server")]
struct Args {
    /// Address the gRPC listener binds to.
    #[arg(long)]
    listen_addr: Option<String>,
    /// Bootstrap JSON document to load at startup (§6/§13).
    #[arg(long)]
    bootstrap_path: Option<PathBuf>,
    /// Registration-watchdog timeout, in milliseconds.
    #[arg(long)]
    registration_timeout_ms: Option<u64>,
    /// Log level/filter (`RUST_LOG` syntax); overrides the environment.
    #[arg(long, default_value = "info")]
    log_level: String,
    /// Persist the effective settings (after CLI overrides) back to disk.
    #[arg(long)]
    save_config: bool,
}

impl Args {
    fn apply_to(self, mut settings: ServerSettings) -> (ServerSettings, bool) {
        if let Some(addr) = self.listen_addr {
            settings.listen_addr = addr;
        }
        if self.bootstrap_path.is_some() {
            settings.bootstrap_path = self.bootstrap_path;
        }
        if let Some(ms) = self.registration_timeout_ms {
            settings.registration_timeout_ms = ms;
        }
        (settings, self.save_config)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_new(&args.log_level).unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config: Option<ConfigService<FsConfigStore>> = FsConfigStore::new()
        .map(ConfigService::new)
        .map_err(|err| warn!(%err, "could not open persisted config store; using defaults"))
        .ok();

    let persisted = config
        .as_ref()
        .and_then(|c| c.load::<ServerSettings>(CONFIG_KEY).ok().flatten())
        .unwrap_or_default();

    let log_level = args.log_level.clone();
    let (settings, save_config) = args.apply_to(persisted);

    if save_config {
        if let Some(cfg) = &config {
            if let Err(err) = cfg.save(CONFIG_KEY, &settings) {
                warn!(%err, "failed to persist server settings");
            }
        }
    }

    info!(
        listen_addr = %settings.listen_addr,
        log_level = %log_level,
        registration_timeout_ms = settings.registration_timeout_ms,
        "starting sm-checks-server"
    );

    let inventory = Arc::new(InventoryStore::new());

    if let Some(path) = &settings.bootstrap_path {
        load_bootstrap(&inventory, path)?;
    }

    let sessions = Arc::new(SessionManager::with_registration_timeout(
        Arc::clone(&inventory),
        std::time::Duration::from_millis(settings.registration_timeout_ms),
    ));

    let checks = ChecksService::new(Arc::clone(&inventory), Arc::clone(&sessions));
    let tenants = TenantsService::new(Arc::clone(&inventory));

    let interceptor = auth::intercept(Arc::clone(&inventory));
    let checks_server = ChecksServer::with_interceptor(checks, interceptor.clone());
    let tenants_server = TenantsServer::with_interceptor(tenants, interceptor);

    let addr = settings
        .listen_addr
        .parse()
        .with_context(|| format!("invalid listen_addr {:?}", settings.listen_addr))?;

    info!(%addr, "gRPC server listening");

    Server::builder()
        .add_service(checks_server)
        .add_service(tenants_server)
        .serve_with_shutdown(addr, shutdown_signal())
        .await
        .context("gRPC server failed")?;

    info!("sm-checks-server shut down cleanly");
    Ok(())
}

/// Load bootstrap data (§6/§13) into `inventory`, failing fast on the first
/// rejected entry so a partially-loaded inventory never serves traffic.
fn load_bootstrap(inventory: &InventoryStore, path: &Path) -> Result<()> {
    info!(path = %path.display(), "loading bootstrap data");
    let raw = std::fs::read(path).with_context(|| format!("reading bootstrap file {}", path.display()))?;
    let data: BootstrapData =
        serde_json::from_slice(&raw).with_context(|| format!("parsing bootstrap file {}", path.display()))?;
    if let Err(err) = sm_inventory::bootstrap::load(inventory, data) {
        error!(%err, "bootstrap data rejected; refusing to start with a partial inventory");
        return Err(anyhow::anyhow!(err).context("loading bootstrap data"));
    }
    Ok(())
}

/// Resolves on Ctrl+C (or, on Unix, SIGTERM), for [`Server::serve_with_shutdown`].
async fn shutdown_signal() {
    let ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(err) => {
                warn!(%err, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {}
        () = terminate => {}
    }
    info!("shutdown signal received");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_overrides_take_precedence_over_persisted_settings() {
        let persisted = ServerSettings {
            listen_addr: "0.0.0.0:9090".into(),
            bootstrap_path: None,
            registration_timeout_ms: 1000,
        };
        let args = Args {
            listen_addr: Some("127.0.0.1:9999".into()),
            bootstrap_path: None,
            registration_timeout_ms: None,
            log_level: "info".into(),
            save_config: false,
        };
        let (settings, save) = args.apply_to(persisted);
        assert_eq!(settings.listen_addr, "127.0.0.1:9999");
        assert_eq!(settings.registration_timeout_ms, 1000);
        assert!(!save);
    }

    #[test]
    fn absent_cli_overrides_keep_persisted_values() {
        let persisted = ServerSettings {
            listen_addr: "0.0.0.0:9090".into(),
            bootstrap_path: Some(PathBuf::from("/etc/seed.json")),
            registration_timeout_ms: 1000,
        };
        let args = Args {
            listen_addr: None,
            bootstrap_path: None,
            registration_timeout_ms: None,
            log_level: "info".into(),
            save_config: false,
        };
        let (settings, _) = args.apply_to(persisted);
        assert_eq!(settings.listen_addr, "0.0.0.0:9090");
        assert_eq!(settings.bootstrap_path, Some(PathBuf::from("/etc/seed.json")));
    }
}
