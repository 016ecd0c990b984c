use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use modhost_core::{KernelError, Language, Module, Result};

use crate::loader::{LanguageLoader, LoadRequest};

type Constructor = dyn Fn(serde_json::Value) -> Result<Arc<dyn Module>> + Send + Sync;

/// Loads host-native modules. Rust has no dynamic `import()`, so "loading"
/// a native module means looking up a constructor the host process
/// registered at startup, rather than reading anything off disk — the host
/// binary and its native modules are compiled together.
pub struct NativeLoader {
    constructors: DashMap<String, Arc<Constructor>>,
}

impl NativeLoader {
    pub fn new() -> Self {
        Self {
            constructors: DashMap::new(),
        }
    }

    pub fn register(
        &self,
        module_name: impl Into<String>,
        constructor: impl Fn(serde_json::Value) -> Result<Arc<dyn Module>> + Send + Sync + 'static,
    ) {
        self.constructors
            .insert(module_name.into(), Arc::new(constructor));
    }
}

impl Default for NativeLoader {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LanguageLoader for NativeLoader {
    fn can_handle(&self, language: Language) -> bool {
        matches!(language, Language::Native)
    }

    async fn load(&self, request: LoadRequest) -> Result<Arc<dyn Module>> {
        let constructor = self
            .constructors
            .get(&request.descriptor.name)
            .ok_or_else(|| KernelError::LoadFailed {
                name: request.descriptor.name.clone(),
                reason: "no native constructor registered for this module name".to_string(),
            })?;
        constructor(request.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use modhost_core::{KernelToken, ResolvedModule, Role, Version};

    struct Noop;

    #[async_trait]
    impl Module for Noop {
        fn name(&self) -> &str {
            "noop"
        }
        fn role(&self) -> Role {
            Role::Utility
        }
        fn module_type(&self) -> &str {
            "noop"
        }
        fn set_privileged_key(&self, _token: KernelToken) -> Result<()> {
            Ok(())
        }
        async fn start(&self, _token: &KernelToken) -> Result<()> {
            Ok(())
        }
        async fn stop(&self, _token: &KernelToken) -> Result<()> {
            Ok(())
        }
    }

    fn request(name: &str) -> LoadRequest {
        LoadRequest {
            descriptor: modhost_core::ModuleDescriptor::new(name),
            resolved: ResolvedModule {
                filesystem_path: "./modules/noop".into(),
                exact_version: Version::parse("1.0.0").unwrap(),
            },
            role: Role::Utility,
            config: serde_json::Value::Null,
        }
    }

    #[tokio::test]
    async fn load_fails_when_nothing_registered() {
        let loader = NativeLoader::new();
        let err = loader.load(request("missing")).await.unwrap_err();
        assert_eq!(err.kind(), "LOAD_FAILED");
    }

    #[tokio::test]
    async fn load_invokes_the_registered_constructor() {
        let loader = NativeLoader::new();
        loader.register("noop", |_config| Ok(Arc::new(Noop) as Arc<dyn Module>));
        let instance = loader.load(request("noop")).await.unwrap();
        assert_eq!(instance.name(), "noop");
    }
}
