use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use wyvern_actions::ActionRegistry;
use wyvern_core::config::WyvernConfig;
use wyvern_core::error::{Result, WyvernError};
use wyvern_core::traits::Store;
use wyvern_core::types::SoarId;

use crate::soar::Soar;

/// Process-wide registry of soar instances keyed by ID.
///
/// Soars are built here from configuration or rebuilt from the store, and
/// their scheduler loops are started from here. Entries are never removed.
pub struct Wyvern {
    soars: RwLock<HashMap<SoarId, Arc<Soar>>>,
    handles: Mutex<HashMap<SoarId, JoinHandle<()>>>,
    registry: Arc<ActionRegistry>,
    store: Arc<dyn Store>,
    cancel: CancellationToken,
}

impl Wyvern {
    pub fn new(registry: ActionRegistry, store: Arc<dyn Store>) -> Self {
        Self {
            soars: RwLock::new(HashMap::new()),
            handles: Mutex::new(HashMap::new()),
            registry: Arc::new(registry),
            store,
            cancel: CancellationToken::new(),
        }
    }

    pub fn registry(&self) -> &ActionRegistry {
        &self.registry
    }

    pub fn store(&self) -> &Arc<dyn Store> {
        &self.store
    }

    /// Build the named soar and register it. Nothing is registered when
    /// construction fails.
    pub async fn load_from_config(&self, config: &WyvernConfig, name: &str) -> Result<SoarId> {
        let soar_conf = config
            .soar(name)
            .ok_or_else(|| WyvernError::SoarNotFound(name.to_string()))?;

        let soar = Soar::new(soar_conf, &self.registry, self.store.as_ref())?
            .with_interval(config.scheduler.interval())
            .with_store(Arc::clone(&self.store));
        soar.save(self.store.as_ref()).await?;

        let id = soar.id().clone();
        self.soars.write().await.insert(id.clone(), Arc::new(soar));
        info!(soar_id = %id, soar = name, "Soar registered");
        Ok(id)
    }

    /// Reconstruct a soar from the store and register it, replacing a
    /// registered instance with the same ID unless that one is running.
    /// `interval` is the pause between tick passes once it runs.
    pub async fn rebuild(&self, id: &SoarId, interval: Duration) -> Result<SoarId> {
        let mut soars = self.soars.write().await;
        if soars.get(id).is_some_and(|s| s.is_running()) {
            return Err(WyvernError::SoarAlreadyRunning(id.to_string()));
        }

        let soar = Soar::rebuild(id, Arc::clone(&self.store), &self.registry)?
            .with_interval(interval);
        soars.insert(id.clone(), Arc::new(soar));
        info!(soar_id = %id, "Soar registered from store");
        Ok(id.clone())
    }

    /// Start the scheduler loop of a registered soar.
    pub async fn run(&self, id: &SoarId) -> Result<()> {
        let soar = self
            .soar(id)
            .await
            .ok_or_else(|| WyvernError::SoarNotFound(id.to_string()))?;
        let handle = soar.start(self.cancel.child_token())?;
        self.handles.lock().await.insert(id.clone(), handle);
        Ok(())
    }

    /// Wait for a soar's scheduler loop to end. Returns immediately when the
    /// soar was never started or has already been waited on.
    pub async fn wait(&self, id: &SoarId) -> Result<()> {
        let handle = self.handles.lock().await.remove(id);
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                warn!(soar_id = %id, error = %e, "Soar task ended abnormally");
                return Err(WyvernError::Traversal(format!("soar {} task aborted: {}", id, e)));
            }
        }
        Ok(())
    }

    pub async fn soar(&self, id: &SoarId) -> Option<Arc<Soar>> {
        self.soars.read().await.get(id).cloned()
    }

    /// Registered soar IDs, sorted.
    pub async fn soar_ids(&self) -> Vec<SoarId> {
        let mut ids: Vec<SoarId> = self.soars.read().await.keys().cloned().collect();
        ids.sort();
        ids
    }

    pub async fn is_running(&self, id: &SoarId) -> bool {
        self.soar(id).await.is_some_and(|s| s.is_running())
    }

    /// Ask every scheduler loop to stop after its current pass, then wait
    /// for all of them.
    pub async fn shutdown(&self) {
        self.cancel.cancel();
        let handles: Vec<(SoarId, JoinHandle<()>)> = self.handles.lock().await.drain().collect();
        for (id, handle) in handles {
            if let Err(e) = handle.await {
                warn!(soar_id = %id, error = %e, "Soar task ended abnormally");
            }
        }
        info!("Wyvern shut down");
    }
}
