//! Ambient kernel configuration: the bootstrap tunables the host process
//! itself needs (module root directory, default timeouts), read from the
//! environment variables spec.md §6 names. This is distinct from the
//! caller-supplied "module definition" document, which stays an opaque
//! input the kernel only parses, never configures itself from.

use std::path::PathBuf;
use std::time::Duration;

/// Default deadline for a single IPC request (spec.md §4.3: "default 30s").
pub const DEFAULT_IPC_DEADLINE: Duration = Duration::from_secs(30);

/// Default bound on the child readiness handshake (spec.md §4.3: "10s").
pub const DEFAULT_IPC_STARTUP_TIMEOUT: Duration = Duration::from_secs(10);

/// Default per-module stop timeout during `stopAll` (spec.md §4.7: "2s").
pub const DEFAULT_STOP_TIMEOUT: Duration = Duration::from_secs(2);

#[derive(Debug, Clone)]
pub struct KernelConfig {
    pub module_root: PathBuf,
    pub ipc_deadline: Duration,
    pub ipc_startup_timeout: Duration,
    pub stop_timeout: Duration,
}

impl Default for KernelConfig {
    fn default() -> Self {
        Self {
            module_root: PathBuf::from("./modules"),
            ipc_deadline: DEFAULT_IPC_DEADLINE,
            ipc_startup_timeout: DEFAULT_IPC_STARTUP_TIMEOUT,
            stop_timeout: DEFAULT_STOP_TIMEOUT,
        }
    }
}

impl KernelConfig {
    /// Build from the process environment: `ADC_MODULE_ROOT` for the
    /// module root directory, falling back to `./modules`. Other fields
    /// keep their defaults; tests override them with the `with_*` builders
    /// instead of mutating the environment.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(root) = std::env::var("ADC_MODULE_ROOT") {
            config.module_root = PathBuf::from(root);
        }
        config
    }

    pub fn with_module_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.module_root = root.into();
        self
    }

    pub fn with_ipc_deadline(mut self, deadline: Duration) -> Self {
        self.ipc_deadline = deadline;
        self
    }

    pub fn with_stop_timeout(mut self, timeout: Duration) -> Self {
        self.stop_timeout = timeout;
        self
    }
}
