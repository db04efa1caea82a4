// ABOUTME: Command implementations for the CLI subcommands
// ABOUTME: Exports ensure, status and smoke plus the shared cluster setup

pub mod ensure;
pub mod smoke;
pub mod status;

pub use ensure::ensure;
pub use smoke::smoke;
pub use status::status;

use crate::config::ClusterConfig;
use crate::postgres::connection::parse_ssl_mode;
use crate::postgres::PgConnector;
use crate::topology::LocalTopology;
use crate::utils::{self, PASSWORD_ENV};
use anyhow::Result;
use std::path::Path;
use tokio_util::sync::CancellationToken;

/// Everything a command needs to talk to the cluster
pub struct Cluster {
    pub config: ClusterConfig,
    pub topology: LocalTopology,
    pub connector: PgConnector,
}

impl Cluster {
    /// Load the config file and read the password from the environment
    pub fn from_config_file(path: impl AsRef<Path>) -> Result<Self> {
        let config = ClusterConfig::load(path)?;
        let password = utils::required_env(PASSWORD_ENV)?;
        Self::new(config, password)
    }

    pub fn new(config: ClusterConfig, password: String) -> Result<Self> {
        let ssl_mode = parse_ssl_mode(&config.postgres.ssl_mode)?;
        Ok(Self {
            topology: LocalTopology::new(config.clone(), password.clone())?,
            connector: PgConnector::new(password, ssl_mode),
            config,
        })
    }
}

/// Cancel `cancel` on the first Ctrl-C and exit on the second; abort the
/// returned task once the work is done
pub(crate) fn spawn_ctrl_c_watcher(cancel: CancellationToken) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_err() {
            return;
        }
        tracing::warn!("Interrupt received, cancelling (press Ctrl-C again to exit now)...");
        cancel.cancel();
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Second interrupt, exiting");
            std::process::exit(130);
        }
    })
}
