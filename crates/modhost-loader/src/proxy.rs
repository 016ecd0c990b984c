use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use modhost_core::{KernelError, KernelToken, Module, Result, Role};
use modhost_ipc::{ChildKey, IpcManager};

/// A `Module` whose business logic lives in a foreign-language child
/// process. Every trait method is forwarded as an IPC call named after the
/// method itself (spec.md §4.3, §4.8); the kernel never distinguishes a
/// proxy from a native instance once it's registered.
pub struct ForeignModuleProxy {
    name: String,
    role: Role,
    module_type: String,
    key: ChildKey,
    ipc: Arc<IpcManager>,
    call_deadline: Duration,
    privileged_key_set: AtomicBool,
}

impl ForeignModuleProxy {
    pub fn new(
        name: impl Into<String>,
        role: Role,
        module_type: impl Into<String>,
        key: ChildKey,
        ipc: Arc<IpcManager>,
        call_deadline: Duration,
    ) -> Self {
        Self {
            name: name.into(),
            role,
            module_type: module_type.into(),
            key,
            ipc,
            call_deadline,
            privileged_key_set: AtomicBool::new(false),
        }
    }

    /// Forward an arbitrary business-logic method to the child, for
    /// callers holding a `ForeignModuleProxy` directly rather than through
    /// the `Module` trait object.
    pub async fn invoke(&self, method: &str, args: Vec<serde_json::Value>) -> Result<serde_json::Value> {
        self.ipc
            .call(&self.key, method, args, self.call_deadline)
            .await
    }
}

#[async_trait]
impl Module for ForeignModuleProxy {
    fn name(&self) -> &str {
        &self.name
    }

    fn role(&self) -> Role {
        self.role
    }

    fn module_type(&self) -> &str {
        &self.module_type
    }

    fn set_privileged_key(&self, _token: KernelToken) -> Result<()> {
        if self.privileged_key_set.swap(true, Ordering::SeqCst) {
            return Err(KernelError::KeyAlreadySet {
                name: self.name.clone(),
            });
        }
        Ok(())
    }

    async fn start(&self, _token: &KernelToken) -> Result<()> {
        self.ipc
            .call(&self.key, "start", Vec::new(), self.call_deadline)
            .await
            .map(|_| ())
    }

    async fn stop(&self, _token: &KernelToken) -> Result<()> {
        self.ipc
            .call(&self.key, "stop", Vec::new(), self.call_deadline)
            .await
            .map(|_| ())
    }
}
