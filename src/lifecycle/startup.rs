//! Startup orchestration and config reload.
//!
//! # Responsibilities
//! - Register configured servers and create configured pools
//! - Apply reloaded configuration to a running manager
//!
//! # Design Decisions
//! - Fail fast: any pool that cannot be created aborts startup
//! - Reload retunes what exists; pools added to the file wait for a restart

use std::sync::Arc;
use tokio::sync::{broadcast, mpsc};

use crate::config::NtpPoolConfig;
use crate::pool::manager::{PoolManager, PoolUpdate};
use crate::pool::types::PoolError;
use crate::probe::TimeProbe;

/// Build a manager holding every configured server and pool.
pub fn build_manager(config: &NtpPoolConfig, probe: Arc<dyn TimeProbe>) -> Result<PoolManager, PoolError> {
    let manager = PoolManager::new(probe, config.health_check.manager_settings());

    for server in &config.servers {
        manager.register_server(server.descriptor());
    }
    for pool in &config.pools {
        manager.create_pool(pool.spec())?;
    }

    tracing::info!(
        servers = config.servers.len(),
        pools = config.pools.len(),
        "Pool manager initialized"
    );
    Ok(manager)
}

/// Apply a reloaded configuration to a running manager.
pub fn apply_reload(manager: &PoolManager, config: &NtpPoolConfig) {
    manager.apply_settings(config.health_check.manager_settings());

    for server in &config.servers {
        manager.register_server(server.descriptor());
    }

    for entry in &config.pools {
        let Some(pool_id) = manager.find_pool(&entry.name) else {
            tracing::warn!(pool = %entry.name, "New pool in config ignored until restart");
            continue;
        };
        let update = PoolUpdate {
            name: None,
            description: Some(entry.description.clone()),
            load_balance_method: Some(entry.load_balance_method),
            failover_enabled: Some(entry.failover_enabled),
            weights: Some(entry.parsed_weights()),
        };
        if let Err(e) = manager.update_pool(pool_id, update) {
            tracing::error!(pool = %entry.name, error = %e, "Failed to apply reloaded pool config");
        }
    }
}

/// Apply configs from `updates` until shutdown or the sender goes away.
pub async fn run_reload_loop(
    manager: Arc<PoolManager>,
    mut updates: mpsc::UnboundedReceiver<NtpPoolConfig>,
    mut shutdown: broadcast::Receiver<()>,
) {
    loop {
        tokio::select! {
            update = updates.recv() => match update {
                Some(config) => {
                    tracing::info!("Applying reloaded configuration");
                    apply_reload(&manager, &config);
                }
                None => break,
            },
            _ = shutdown.recv() => break,
        }
    }
    tracing::debug!("Config reload loop stopped");
}
