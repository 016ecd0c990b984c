use std::collections::HashSet;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use modhost_core::{KernelError, KernelToken, Result};

use crate::entry::RegistryEntry;

/// The reference-counted instance store (C5): one entry per `uniqueKey`,
/// a `logicalName -> uniqueKey` index for lookups, and a per-app dependency
/// set that drives the refcount. An app's dependency set is the only thing
/// that keeps an instance alive past its own registration.
pub struct Registry {
    instances: DashMap<String, RegistryEntry>,
    name_index: DashMap<String, Vec<String>>,
    refcounts: DashMap<String, AtomicI64>,
    app_dependencies: DashMap<String, HashSet<String>>,
    next_order: AtomicU64,
}

impl Registry {
    pub fn new() -> Self {
        Self {
            instances: DashMap::new(),
            name_index: DashMap::new(),
            refcounts: DashMap::new(),
            app_dependencies: DashMap::new(),
            next_order: AtomicU64::new(0),
        }
    }

    /// Insert a freshly-loaded instance. Fails if `unique_key` is already
    /// registered (invariant I1: a `uniqueKey` identifies at most one live
    /// instance at a time).
    pub fn register(
        &self,
        unique_key: impl Into<String>,
        logical_name: impl Into<String>,
        role: modhost_core::Role,
        load_context: Option<String>,
        instance: Arc<dyn modhost_core::Module>,
    ) -> Result<()> {
        let unique_key = unique_key.into();
        let logical_name = logical_name.into();

        if self.instances.contains_key(&unique_key) {
            return Err(KernelError::LoadFailed {
                name: logical_name,
                reason: format!("uniqueKey `{unique_key}` already registered"),
            });
        }

        let order = self.next_order.fetch_add(1, Ordering::SeqCst);
        let entry = RegistryEntry::new(
            unique_key.clone(),
            logical_name.clone(),
            role,
            load_context,
            instance,
            order,
        );
        self.instances.insert(unique_key.clone(), entry);
        self.name_index
            .entry(logical_name)
            .or_default()
            .push(unique_key.clone());
        self.refcounts.insert(unique_key, AtomicI64::new(0));
        Ok(())
    }

    /// Existence check by `uniqueKey` alone, independent of role — used by
    /// callers that already hold a uniqueKey (the already-registered fast
    /// path, `addDependency`'s existence guard) rather than a bare name.
    pub fn has_unique_key(&self, unique_key: &str) -> bool {
        self.instances.contains_key(unique_key)
    }

    /// Boolean form of [`Self::resolve`]: true if at least one instance
    /// registered under `role` answers to `logical_name` (spec.md §4.5
    /// `has(role, name, config?)`).
    pub fn has(&self, role: modhost_core::Role, logical_name: &str) -> bool {
        self.name_index
            .get(logical_name)
            .map(|keys| {
                keys.iter()
                    .any(|key| self.entry_role(key) == Some(role))
            })
            .unwrap_or(false)
    }

    fn entry_role(&self, unique_key: &str) -> Option<modhost_core::Role> {
        self.instances.get(unique_key).map(|entry| entry.role)
    }

    pub fn get_by_unique_key(&self, unique_key: &str) -> Option<Arc<dyn modhost_core::Module>> {
        self.instances
            .get(unique_key)
            .map(|entry| Arc::clone(&entry.instance))
    }

    /// Resolve a logical name registered under `role` to the single instance
    /// a caller should get, applying spec.md §4.5's disambiguation order:
    /// candidates present in the current load context's dependency set
    /// first, then the candidate with the longest `uniqueKey` (a more
    /// specific config always serializes to a longer key), and `AMBIGUOUS`
    /// only if that still leaves a genuine tie.
    pub fn resolve(
        &self,
        role: modhost_core::Role,
        logical_name: &str,
        load_context: Option<&str>,
    ) -> Result<Arc<dyn modhost_core::Module>> {
        let candidates: Vec<String> = self
            .name_index
            .get(logical_name)
            .map(|keys| keys.clone())
            .unwrap_or_default()
            .into_iter()
            .filter(|key| self.entry_role(key) == Some(role))
            .collect();

        if candidates.is_empty() {
            return Err(KernelError::ModuleNotFound {
                name: logical_name.to_string(),
                language: "any".to_string(),
                range: "*".to_string(),
            });
        }
        if candidates.len() == 1 {
            return self
                .get_by_unique_key(&candidates[0])
                .ok_or_else(|| KernelError::ModuleNotFound {
                    name: logical_name.to_string(),
                    language: "any".to_string(),
                    range: "*".to_string(),
                });
        }

        let context_matches: Vec<&String> = load_context
            .and_then(|app| self.app_dependencies.get(app))
            .map(|deps| {
                candidates
                    .iter()
                    .filter(|key| deps.contains(key.as_str()))
                    .collect::<Vec<_>>()
            })
            .unwrap_or_default();
        let pool: Vec<String> = if context_matches.len() == 1 {
            vec![context_matches[0].clone()]
        } else if !context_matches.is_empty() {
            context_matches.into_iter().cloned().collect()
        } else {
            candidates
        };

        let max_len = pool.iter().map(|k| k.len()).max().unwrap_or(0);
        let longest: Vec<&String> = pool.iter().filter(|k| k.len() == max_len).collect();
        match longest.as_slice() {
            [single] => self
                .get_by_unique_key(single)
                .ok_or_else(|| KernelError::ModuleNotFound {
                    name: logical_name.to_string(),
                    language: "any".to_string(),
                    range: "*".to_string(),
                }),
            _ => Err(KernelError::Ambiguous {
                name: logical_name.to_string(),
                candidate_count: longest.len(),
            }),
        }
    }

    /// Record that `app` depends on `unique_key`, incrementing its refcount
    /// the first time this app registers the dependency (idempotent per
    /// app, per property P1).
    pub fn add_dependency(&self, app: &str, unique_key: &str) -> Result<()> {
        if !self.has_unique_key(unique_key) {
            return Err(KernelError::ModuleNotFound {
                name: unique_key.to_string(),
                language: "any".to_string(),
                range: "*".to_string(),
            });
        }
        let mut set = self.app_dependencies.entry(app.to_string()).or_default();
        if set.insert(unique_key.to_string()) {
            if let Some(count) = self.refcounts.get(unique_key) {
                count.fetch_add(1, Ordering::SeqCst);
            }
        }
        Ok(())
    }

    /// Release every dependency `app` holds, stopping and unregistering any
    /// instance whose refcount reaches zero (property R2). Returns the
    /// `uniqueKey`s that were actually torn down.
    pub async fn cleanup_app_dependencies(&self, app: &str, token: &KernelToken) -> Vec<String> {
        let Some((_, keys)) = self.app_dependencies.remove(app) else {
            return Vec::new();
        };

        let mut stopped = Vec::new();
        for key in keys {
            let reached_zero = match self.refcounts.get(&key) {
                Some(count) => count.fetch_sub(1, Ordering::SeqCst) <= 1,
                None => false,
            };
            if reached_zero {
                if self.unload(&key, token).await {
                    stopped.push(key);
                }
            }
        }
        stopped
    }

    /// Stop and remove one instance unconditionally, regardless of
    /// refcount. Used both for the orphan-sweep path and to purge an
    /// instance backed by a child process that just died (invariant I5).
    pub async fn unload(&self, unique_key: &str, token: &KernelToken) -> bool {
        let Some((_, entry)) = self.instances.remove(unique_key) else {
            return false;
        };
        if let Some(keys) = self.name_index.get_mut(&entry.logical_name).as_deref_mut() {
            keys.retain(|k| k != unique_key);
        }
        self.refcounts.remove(unique_key);
        let _ = entry.instance.stop(token).await;
        true
    }

    /// Stop every remaining instance in reverse registration order
    /// (spec.md §4.7), ignoring refcounts — the final sweep after every
    /// app has already released its own dependencies.
    pub async fn stop_all(&self, token: &KernelToken, stop_timeout_ms: u64) {
        let mut keys: Vec<(u64, String)> = self
            .instances
            .iter()
            .map(|entry| (entry.registration_order, entry.unique_key.clone()))
            .collect();
        keys.sort_by(|a, b| b.0.cmp(&a.0));

        for (_, key) in keys {
            if let Some((_, entry)) = self.instances.remove(&key) {
                let label = entry.unique_key.clone();
                modhost_core::with_timeout(
                    entry.instance.stop(token),
                    stop_timeout_ms,
                    &label,
                )
                .await;
            }
        }
        self.name_index.clear();
        self.refcounts.clear();
        self.app_dependencies.clear();
    }

    pub fn instance_count(&self) -> usize {
        self.instances.len()
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicBool;

    struct FakeModule {
        name: String,
        stopped: Arc<AtomicBool>,
    }

    #[async_trait::async_trait]
    impl modhost_core::Module for FakeModule {
        fn name(&self) -> &str {
            &self.name
        }
        fn role(&self) -> modhost_core::Role {
            modhost_core::Role::Provider
        }
        fn module_type(&self) -> &str {
            "fake"
        }
        fn set_privileged_key(&self, _token: KernelToken) -> Result<()> {
            Ok(())
        }
        async fn start(&self, _token: &KernelToken) -> Result<()> {
            Ok(())
        }
        async fn stop(&self, _token: &KernelToken) -> Result<()> {
            self.stopped.store(true, Ordering::SeqCst);
            Ok(())
        }
    }

    fn fake(name: &str) -> (Arc<dyn modhost_core::Module>, Arc<AtomicBool>) {
        let stopped = Arc::new(AtomicBool::new(false));
        let module = Arc::new(FakeModule {
            name: name.to_string(),
            stopped: Arc::clone(&stopped),
        });
        (module, stopped)
    }

    #[test]
    fn registering_a_duplicate_unique_key_fails() {
        let registry = Registry::new();
        let (instance, _) = fake("db");
        registry
            .register("db#abc", "db", modhost_core::Role::Provider, None, instance)
            .unwrap();
        let (instance2, _) = fake("db");
        let err = registry
            .register("db#abc", "db", modhost_core::Role::Provider, None, instance2)
            .unwrap_err();
        assert_eq!(err.kind(), "LOAD_FAILED");
    }

    #[test]
    fn resolve_picks_the_longest_unique_key_when_context_does_not_disambiguate() {
        let registry = Registry::new();
        let (a, _) = fake("db");
        let (b, _) = fake("db");
        registry
            .register("db", "db", modhost_core::Role::Provider, None, a)
            .unwrap();
        registry
            .register("db#custom-config-hash", "db", modhost_core::Role::Provider, None, b)
            .unwrap();

        let resolved = registry
            .resolve(modhost_core::Role::Provider, "db", None)
            .unwrap();
        assert_eq!(resolved.name(), "db");
        // both candidates report the same `name()`; the distinguishing
        // assertion is that resolution succeeded instead of erroring
        // ambiguous, since uniqueKey length strictly disambiguates here.
    }

    #[test]
    fn resolve_disambiguates_by_load_context_dependency_set() {
        let registry = Registry::new();
        let (a, _) = fake("cache");
        let (b, _) = fake("cache");
        registry
            .register("cache#a", "cache", modhost_core::Role::Provider, None, a)
            .unwrap();
        registry
            .register("cache#bb", "cache", modhost_core::Role::Provider, None, b)
            .unwrap();
        registry.add_dependency("app-a", "cache#a").unwrap();

        let resolved = registry
            .resolve(modhost_core::Role::Provider, "cache", Some("app-a"))
            .unwrap();
        assert_eq!(resolved.name(), "cache");

        let err = registry
            .resolve(modhost_core::Role::Provider, "cache", None)
            .unwrap_err();
        assert_eq!(err.kind(), "AMBIGUOUS");
    }

    #[test]
    fn resolve_ignores_candidates_registered_under_a_different_role() {
        let registry = Registry::new();
        let (provider, _) = fake("widget");
        let (utility, _) = fake("widget");
        registry
            .register(
                "widget#provider",
                "widget",
                modhost_core::Role::Provider,
                None,
                provider,
            )
            .unwrap();
        registry
            .register(
                "widget#utility",
                "widget",
                modhost_core::Role::Utility,
                None,
                utility,
            )
            .unwrap();

        let resolved = registry
            .resolve(modhost_core::Role::Utility, "widget", None)
            .unwrap();
        assert_eq!(resolved.name(), "widget");
        assert!(registry.has(modhost_core::Role::Provider, "widget"));
        assert!(registry.has(modhost_core::Role::Utility, "widget"));
        assert!(!registry.has(modhost_core::Role::Service, "widget"));
    }

    #[test]
    fn resolve_with_no_candidates_is_module_not_found() {
        let registry = Registry::new();
        let err = registry
            .resolve(modhost_core::Role::Provider, "missing", None)
            .unwrap_err();
        assert_eq!(err.kind(), "MODULE_NOT_FOUND");
    }

    #[tokio::test]
    async fn dependency_refcount_only_stops_instance_after_every_app_releases() {
        let registry = Registry::new();
        let (instance, stopped) = fake("cache");
        registry
            .register("cache", "cache", modhost_core::Role::Provider, None, instance)
            .unwrap();
        registry.add_dependency("app-a", "cache").unwrap();
        registry.add_dependency("app-b", "cache").unwrap();

        let token = KernelToken::new();
        registry.cleanup_app_dependencies("app-a", &token).await;
        assert!(!stopped.load(Ordering::SeqCst));
        assert!(registry.has_unique_key("cache"));

        registry.cleanup_app_dependencies("app-b", &token).await;
        assert!(stopped.load(Ordering::SeqCst));
        assert!(!registry.has_unique_key("cache"));
    }

    #[tokio::test]
    async fn stop_all_tears_down_in_reverse_registration_order() {
        let registry = Registry::new();
        let (first, first_stopped) = fake("first");
        let (second, second_stopped) = fake("second");
        registry
            .register("first", "first", modhost_core::Role::Utility, None, first)
            .unwrap();
        registry
            .register("second", "second", modhost_core::Role::Utility, None, second)
            .unwrap();

        let token = KernelToken::new();
        registry.stop_all(&token, 1000).await;

        assert!(first_stopped.load(Ordering::SeqCst));
        assert!(second_stopped.load(Ordering::SeqCst));
        assert_eq!(registry.instance_count(), 0);
    }
}
