//! Lifecycle Primitives (C8): the capability contract every module instance
//! implements, the kernel's privileged capability token, and the timeout
//! wrapper used during teardown.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::{KernelError, Result};
use crate::model::Role;

/// An opaque, process-unique capability held only by the `Kernel`.
/// Equality is by `Arc` identity (§4.7 "compares by identity"), not by
/// value, so no external caller can forge one by constructing a matching
/// value — they would need the exact `Arc` allocation the kernel created at
/// startup.
#[derive(Clone)]
pub struct KernelToken(Arc<()>);

impl KernelToken {
    pub fn new() -> Self {
        Self(Arc::new(()))
    }
}

impl Default for KernelToken {
    fn default() -> Self {
        Self::new()
    }
}

impl PartialEq for KernelToken {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl Eq for KernelToken {}

impl std::fmt::Debug for KernelToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("KernelToken(..)")
    }
}

/// Guard a privileged operation: succeed only if `presented` is the same
/// token identity as `expected` (invariant I3).
pub fn require_privileged(
    expected: &KernelToken,
    presented: &KernelToken,
    operation: &str,
) -> Result<()> {
    if expected == presented {
        Ok(())
    } else {
        Err(KernelError::UnauthorizedKernelCall {
            operation: operation.to_string(),
        })
    }
}

/// The capability contract every module instance implements (spec.md §4.8).
/// The kernel only ever calls these four methods plus the descriptive
/// getters; anything else a module exposes is opaque business logic the
/// kernel never interprets.
#[async_trait]
pub trait Module: Send + Sync {
    fn name(&self) -> &str;
    fn role(&self) -> Role;
    fn module_type(&self) -> &str;

    /// Set the kernel's capability token. Must succeed exactly once per
    /// instance; a second call fails `KEY_ALREADY_SET`.
    fn set_privileged_key(&self, token: KernelToken) -> Result<()>;

    /// Idempotent start: a second call after a successful first call is a
    /// no-op.
    async fn start(&self, token: &KernelToken) -> Result<()>;

    /// Idempotent stop: after it runs, the instance is considered dead.
    async fn stop(&self, token: &KernelToken) -> Result<()>;
}

impl std::fmt::Debug for dyn Module {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("dyn Module")
            .field("name", &self.name())
            .field("module_type", &self.module_type())
            .finish()
    }
}

/// Race `operation` against a `ms`-millisecond timer (spec.md §4.8). On
/// timeout, returns `None` and logs a warning tagged with `label` — used by
/// `stopAll` so one wedged module can't block the rest of teardown.
pub async fn with_timeout<F, T>(operation: F, ms: u64, label: &str) -> Option<T>
where
    F: Future<Output = T>,
{
    match tokio::time::timeout(Duration::from_millis(ms), operation).await {
        Ok(value) => Some(value),
        Err(_) => {
            tracing::warn!(label, timeout_ms = ms, "operation timed out");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn distinct_tokens_are_not_equal() {
        let a = KernelToken::new();
        let b = KernelToken::new();
        assert_ne!(a, b);
        assert_eq!(a.clone(), a);
    }

    #[test]
    fn require_privileged_rejects_foreign_token() {
        let real = KernelToken::new();
        let fake = KernelToken::new();
        assert!(require_privileged(&real, &real, "stop").is_ok());
        let err = require_privileged(&real, &fake, "stop").unwrap_err();
        assert_eq!(err.kind(), "UNAUTHORIZED_KERNEL_CALL");
    }

    #[tokio::test]
    async fn with_timeout_returns_none_when_exceeded() {
        let result = with_timeout(
            async {
                tokio::time::sleep(Duration::from_millis(50)).await;
                42
            },
            5,
            "slow-op",
        )
        .await;
        assert_eq!(result, None);
    }

    #[tokio::test]
    async fn with_timeout_returns_value_when_fast_enough() {
        let result = with_timeout(async { 42 }, 1000, "fast-op").await;
        assert_eq!(result, Some(42));
    }
}
