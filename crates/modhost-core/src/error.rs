/// The kernel's single error type, covering every discriminated failure kind
/// named by the runtime contract (resolver, registry, IPC, lifecycle) plus
/// the ambient I/O and serialization failures that occur while reading
/// module directories and wire frames.
///
/// Kept as one flat enum (rather than one type per component) because
/// callers at the `Kernel` façade routinely need to match on the kind
/// regardless of which layer raised it — see `Kernel::get_provider` and
/// friends, which propagate resolver, loader and registry errors through the
/// same `Result` alias.
#[derive(Debug, thiserror::Error)]
pub enum KernelError {
    #[error("module not found: {name} (language={language}, range={range})")]
    ModuleNotFound {
        name: String,
        language: String,
        range: String,
    },

    #[error("ambiguous lookup for module `{name}`: {candidate_count} candidates")]
    Ambiguous { name: String, candidate_count: usize },

    #[error("failed to load module `{name}`: {reason}")]
    LoadFailed { name: String, reason: String },

    #[error("child process for `{module}` did not become ready within {elapsed_ms}ms")]
    IpcStartupTimeout { module: String, elapsed_ms: u64 },

    #[error("request {id} to `{module}` timed out after {elapsed_ms}ms")]
    IpcTimeout {
        module: String,
        id: i64,
        elapsed_ms: u64,
    },

    #[error("remote error from `{module}` (request {id}): {message}")]
    IpcRemoteError {
        module: String,
        id: i64,
        message: String,
    },

    #[error("IPC channel to `{module}` closed while request {id:?} was pending")]
    IpcChannelClosed { module: String, id: Option<i64> },

    #[error("privileged call `{operation}` rejected: invalid capability token")]
    UnauthorizedKernelCall { operation: String },

    #[error("setPrivilegedKey called twice on module `{name}`")]
    KeyAlreadySet { name: String },

    #[error("dependency cycle detected while loading service `{service}`")]
    DependencyCycle { service: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{0}")]
    Other(String),
}

impl KernelError {
    /// The stable discriminant string for this error kind, suitable for
    /// logging and metrics tagging without formatting the full message.
    pub fn kind(&self) -> &'static str {
        match self {
            KernelError::ModuleNotFound { .. } => "MODULE_NOT_FOUND",
            KernelError::Ambiguous { .. } => "AMBIGUOUS",
            KernelError::LoadFailed { .. } => "LOAD_FAILED",
            KernelError::IpcStartupTimeout { .. } => "IPC_STARTUP_TIMEOUT",
            KernelError::IpcTimeout { .. } => "IPC_TIMEOUT",
            KernelError::IpcRemoteError { .. } => "IPC_REMOTE_ERROR",
            KernelError::IpcChannelClosed { .. } => "IPC_CHANNEL_CLOSED",
            KernelError::UnauthorizedKernelCall { .. } => "UNAUTHORIZED_KERNEL_CALL",
            KernelError::KeyAlreadySet { .. } => "KEY_ALREADY_SET",
            KernelError::DependencyCycle { .. } => "DEPENDENCY_CYCLE",
            KernelError::Io(_) => "IO",
            KernelError::Json(_) => "JSON",
            KernelError::Other(_) => "OTHER",
        }
    }
}

pub type Result<T, E = KernelError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_strings_match_spec_discriminants() {
        let err = KernelError::ModuleNotFound {
            name: "db".into(),
            language: "native".into(),
            range: "^1.0.0".into(),
        };
        assert_eq!(err.kind(), "MODULE_NOT_FOUND");

        let err = KernelError::KeyAlreadySet { name: "db".into() };
        assert_eq!(err.kind(), "KEY_ALREADY_SET");
    }
}
