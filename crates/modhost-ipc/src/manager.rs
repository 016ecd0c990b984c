use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use modhost_core::{KernelConfig, Logger, Result};
use tokio::sync::{broadcast, Mutex as AsyncMutex};

use crate::child::{ChildHandle, SpawnSpec};
use crate::key::ChildKey;

/// Owns every live foreign-language child process and routes calls to them,
/// spawning one child per `ChildKey` and reusing it across calls (spec.md
/// §4.3). One manager per kernel instance.
pub struct IpcManager {
    children: DashMap<ChildKey, Arc<ChildHandle>>,
    spawn_locks: DashMap<ChildKey, Arc<AsyncMutex<()>>>,
    deaths: broadcast::Sender<ChildKey>,
    startup_timeout: Duration,
    logger: Logger,
}

impl IpcManager {
    pub fn new(config: &KernelConfig, logger: Logger) -> Self {
        let (deaths, _) = broadcast::channel(64);
        Self {
            children: DashMap::new(),
            spawn_locks: DashMap::new(),
            deaths,
            startup_timeout: config.ipc_startup_timeout,
            logger,
        }
    }

    /// Get the running child for `key`, spawning it via `spec` if none
    /// exists yet. Concurrent callers for the same key block on a per-key
    /// lock rather than racing to spawn duplicate processes.
    pub async fn get_or_spawn(
        &self,
        key: ChildKey,
        spec: SpawnSpec,
    ) -> Result<Arc<ChildHandle>> {
        if let Some(existing) = self.children.get(&key) {
            if !existing.is_dead() {
                return Ok(Arc::clone(&existing));
            }
        }

        let lock = Arc::clone(
            &self.spawn_locks
                .entry(key.clone())
                .or_insert_with(|| Arc::new(AsyncMutex::new(()))),
        );
        let _guard = lock.lock().await;

        if let Some(existing) = self.children.get(&key) {
            if !existing.is_dead() {
                return Ok(Arc::clone(&existing));
            }
        }

        let logger = self.logger.child(key.to_string());
        let deaths = self.deaths.clone();
        let handle = ChildHandle::spawn(
            key.clone(),
            spec,
            logger,
            self.startup_timeout,
            move |dead_key| {
                let _ = deaths.send(dead_key);
            },
        )
        .await?;

        self.children.insert(key, Arc::clone(&handle));
        Ok(handle)
    }

    /// Invoke `method` on the child for `key`, which must already be
    /// running (use [`Self::get_or_spawn`] first).
    pub async fn call(
        &self,
        key: &ChildKey,
        method: &str,
        args: Vec<serde_json::Value>,
        deadline: Duration,
    ) -> Result<serde_json::Value> {
        let handle = self
            .children
            .get(key)
            .map(|entry| Arc::clone(&entry))
            .ok_or_else(|| modhost_core::KernelError::IpcChannelClosed {
                module: key.module_name.clone(),
                id: None,
            })?;
        handle.call(method, args, deadline).await
    }

    /// Subscribe to child-death notifications, so the registry can purge
    /// the instances a dead child was backing (invariant I5).
    pub fn subscribe_deaths(&self) -> broadcast::Receiver<ChildKey> {
        self.deaths.subscribe()
    }

    pub fn is_running(&self, key: &ChildKey) -> bool {
        self.children
            .get(key)
            .map(|entry| !entry.is_dead())
            .unwrap_or(false)
    }

    /// Drop our handle to the child for `key`. The process itself is killed
    /// when the last `Arc<ChildHandle>` is dropped only if the caller also
    /// stops holding references elsewhere; the kernel's teardown path is
    /// responsible for calling the module's `stop()` before this.
    pub fn forget(&self, key: &ChildKey) {
        self.children.remove(key);
        self.spawn_locks.remove(key);
    }
}
