use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use modhost_core::{
    interpolate_json, load_env_file, resolve_module_version, unique_key, KernelConfig,
    KernelError, KernelToken, Language, Logger, Module, ModuleDescriptor, ResolvedModule, Result,
    Role,
};
use modhost_ipc::IpcManager;
use modhost_loader::{select_loader, ForeignLoader, LanguageLoader, LoadRequest, NativeLoader};
use modhost_registry::Registry;

use crate::definition::ModuleDefinition;

/// The host-facing entry point (C7): owns the registry, the IPC bridge, the
/// language loaders and the one `KernelToken` that gates every privileged
/// lifecycle call. Apps never see a loader or the registry directly; they
/// hand the kernel a [`ModuleDefinition`] and get back `Module` handles.
pub struct Kernel {
    config: KernelConfig,
    token: KernelToken,
    registry: Arc<Registry>,
    ipc: Arc<IpcManager>,
    native: Arc<NativeLoader>,
    loaders: Vec<Arc<dyn LanguageLoader>>,
    logger: Logger,
}

impl Kernel {
    pub fn new(config: KernelConfig) -> Self {
        let logger = Logger::new("kernel");
        let ipc = Arc::new(IpcManager::new(&config, logger.child("ipc")));
        let native = Arc::new(NativeLoader::new());
        let foreign = Arc::new(ForeignLoader::new(Arc::clone(&ipc), config.ipc_deadline));
        let loaders: Vec<Arc<dyn LanguageLoader>> = vec![
            Arc::clone(&native) as Arc<dyn LanguageLoader>,
            foreign as Arc<dyn LanguageLoader>,
        ];
        Self {
            config,
            token: KernelToken::new(),
            registry: Arc::new(Registry::new()),
            ipc,
            native,
            loaders,
            logger,
        }
    }

    /// Register a constructor for a host-native module name. Must happen
    /// before any [`Self::start_app`] call that references the name.
    pub fn register_native_constructor(
        &self,
        module_name: impl Into<String>,
        constructor: impl Fn(serde_json::Value) -> Result<Arc<dyn Module>> + Send + Sync + 'static,
    ) {
        self.native.register(module_name, constructor);
    }

    /// Load every module a [`ModuleDefinition`] names on behalf of `app`,
    /// wiring phase-one globals and phase-two app-scoped services (spec.md
    /// §4.6). Returns the `uniqueKey`s that ended up registered.
    pub async fn start_app(
        &self,
        app: &str,
        definition: &ModuleDefinition,
    ) -> Result<Vec<String>> {
        let mut loaded = Vec::new();

        let global_candidates = definition
            .providers
            .iter()
            .map(|d| (d, Role::Provider))
            .chain(definition.utilities.iter().map(|d| (d, Role::Utility)));

        for (descriptor, role) in global_candidates {
            if descriptor.global {
                // Phase 1 instances are orphaned (owningApp = null): no
                // app_context and no parent env, since they have no
                // enclosing service.
                match self.load_descriptor(descriptor, role, None, None).await {
                    Ok(key) => loaded.push(key),
                    Err(err) if definition.fail_on_error => return Err(err),
                    Err(err) => {
                        self.logger.warn(&format!(
                            "global module `{}` failed to load: {err}",
                            descriptor.name
                        ));
                    }
                }
            }
        }

        for service in &definition.services {
            match self.load_service(service, app).await {
                Ok(key) => loaded.push(key),
                Err(err) if definition.fail_on_error => return Err(err),
                Err(err) => {
                    self.logger
                        .warn(&format!("service `{}` failed to load: {err}", service.name));
                }
            }
        }

        Ok(loaded)
    }

    /// Implements the documented Phase 2 contract (spec.md §4.6): inherit a
    /// default providers list from the service's colocated `config.json`
    /// when the descriptor omits one, fold the effective providers list into
    /// the service's `uniqueKey`, short-circuit on an already-registered
    /// service, and otherwise load the service's own non-global providers
    /// and utilities (scoped to the service's env) before constructing the
    /// service itself.
    async fn load_service(&self, service: &ModuleDescriptor, app: &str) -> Result<String> {
        let language = service.language();
        let resolved = self.resolve_descriptor(service, language).await?;
        let service_env = load_env_file(&resolved.filesystem_path.join(".env")).await;

        let effective_providers = match &service.providers {
            Some(providers) => providers.clone(),
            None => {
                self.default_providers_from_config_json(&resolved.filesystem_path)
                    .await
            }
        };

        let mut service_config = service.merged_config();
        interpolate_json(&mut service_config, &[&service_env]);

        // The uniqueKey is hashed from the config plus the effective
        // providers list, so two services with identical config but
        // different inherited providers never collide; `__providers` is a
        // hashing artifact only and is not part of the config the loader
        // hands to the service instance.
        let mut key_input = service_config.clone();
        if key_input.is_null() {
            key_input = serde_json::Value::Object(serde_json::Map::new());
        }
        if let serde_json::Value::Object(map) = &mut key_input {
            map.insert(
                "__providers".to_string(),
                serde_json::to_value(&effective_providers).unwrap_or(serde_json::Value::Null),
            );
        }
        let service_key = unique_key(&service.name, &key_input);

        if self.registry.has_unique_key(&service_key) {
            self.registry.add_dependency(app, &service_key)?;
            return Ok(service_key);
        }

        for provider in effective_providers.iter().filter(|d| !d.global) {
            let key = self
                .load_descriptor(provider, Role::Provider, Some(app), Some(&service_env))
                .await?;
            self.registry.add_dependency(app, &key)?;
        }
        if let Some(utilities) = &service.utilities {
            for utility in utilities.iter().filter(|d| !d.global) {
                let key = self
                    .load_descriptor(utility, Role::Utility, Some(app), Some(&service_env))
                    .await?;
                self.registry.add_dependency(app, &key)?;
            }
        }

        let loader = select_loader(&self.loaders, language).ok_or_else(|| KernelError::LoadFailed {
            name: service.name.clone(),
            reason: format!("no loader registered for language `{}`", language.tag()),
        })?;
        let request = LoadRequest {
            descriptor: service.clone(),
            resolved,
            role: Role::Service,
            config: service_config,
        };
        let instance = loader.load_service(request).await?;
        instance.set_privileged_key(self.token.clone())?;
        instance.start(&self.token).await?;
        self.registry.register(
            service_key.clone(),
            service.name.clone(),
            Role::Service,
            Some(app.to_string()),
            instance,
        )?;
        self.registry.add_dependency(app, &service_key)?;
        self.logger.ok(&format!("loaded `{service_key}`"));
        Ok(service_key)
    }

    /// Read a `providers` array out of a `config.json` colocated with a
    /// service's module directory, for services whose descriptor omits its
    /// own providers list (spec.md §4.6 Phase 2 step 2). Missing or
    /// unparsable files yield no defaults — best-effort, like `.env`.
    async fn default_providers_from_config_json(
        &self,
        service_dir: &Path,
    ) -> Vec<ModuleDescriptor> {
        let Ok(contents) = tokio::fs::read_to_string(service_dir.join("config.json")).await else {
            return Vec::new();
        };
        let Ok(value) = serde_json::from_str::<serde_json::Value>(&contents) else {
            return Vec::new();
        };
        value
            .get("providers")
            .and_then(|v| serde_json::from_value::<Vec<ModuleDescriptor>>(v.clone()).ok())
            .unwrap_or_default()
    }

    /// Resolve, env-interpolate, load and register one provider/utility/
    /// service descriptor. `app_context` is the owning app for attribution
    /// on `register` (`None` orphans the instance, per Phase 1); `parent_env`
    /// is the enclosing service's `.env` map, which outranks the
    /// descriptor's own `.env` map per scenario S6's precedence order.
    async fn load_descriptor(
        &self,
        descriptor: &ModuleDescriptor,
        role: Role,
        app_context: Option<&str>,
        parent_env: Option<&HashMap<String, String>>,
    ) -> Result<String> {
        let language = descriptor.language();
        let resolved = self.resolve_descriptor(descriptor, language).await?;
        let own_env = load_env_file(&resolved.filesystem_path.join(".env")).await;

        let mut merged = descriptor.merged_config();
        let scopes: Vec<&HashMap<String, String>> = match parent_env {
            Some(parent) => vec![parent, &own_env],
            None => vec![&own_env],
        };
        interpolate_json(&mut merged, &scopes);

        let key = unique_key(&descriptor.name, &merged);
        if self.registry.has_unique_key(&key) {
            return Ok(key);
        }

        let loader = select_loader(&self.loaders, language).ok_or_else(|| KernelError::LoadFailed {
            name: descriptor.name.clone(),
            reason: format!("no loader registered for language `{}`", language.tag()),
        })?;

        let request = LoadRequest {
            descriptor: descriptor.clone(),
            resolved,
            role,
            config: merged,
        };
        let instance = match role {
            Role::Provider => loader.load_provider(request).await?,
            Role::Utility => loader.load_utility(request).await?,
            Role::Service => loader.load_service(request).await?,
        };

        instance.set_privileged_key(self.token.clone())?;
        instance.start(&self.token).await?;
        self.registry.register(
            key.clone(),
            descriptor.name.clone(),
            role,
            app_context.map(|s| s.to_string()),
            instance,
        )?;
        self.logger.ok(&format!("loaded `{key}`"));
        Ok(key)
    }

    /// Version-resolve a descriptor's module directory, skipping the
    /// filesystem lookup entirely for native modules (Open Question: Rust
    /// has no dynamic `import()`, so native "loading" is a constructor
    /// registry keyed by name instead of a version-tagged directory).
    async fn resolve_descriptor(
        &self,
        descriptor: &ModuleDescriptor,
        language: Language,
    ) -> Result<ResolvedModule> {
        if language == Language::Native {
            Ok(ResolvedModule {
                filesystem_path: self.config.module_root.clone(),
                exact_version: modhost_core::Version::parse(&descriptor.version)
                    .unwrap_or(modhost_core::Version::new(0, 0, 0)),
            })
        } else {
            resolve_module_version(
                &self.config.module_root,
                &descriptor.name,
                &descriptor.version,
                language,
            )
            .await
            .ok_or_else(|| KernelError::ModuleNotFound {
                name: descriptor.name.clone(),
                language: language.tag().to_string(),
                range: descriptor.version.clone(),
            })
        }
    }

    pub fn get_provider(&self, logical_name: &str, context: Option<&str>) -> Result<Arc<dyn Module>> {
        self.registry.resolve(Role::Provider, logical_name, context)
    }

    pub fn get_utility(&self, logical_name: &str, context: Option<&str>) -> Result<Arc<dyn Module>> {
        self.registry.resolve(Role::Utility, logical_name, context)
    }

    pub fn get_service(&self, logical_name: &str, context: Option<&str>) -> Result<Arc<dyn Module>> {
        self.registry.resolve(Role::Service, logical_name, context)
    }

    pub fn has_module(&self, role: Role, logical_name: &str) -> bool {
        self.registry.has(role, logical_name)
    }

    pub fn add_module_dependency(&self, app: &str, unique_key: &str) -> Result<()> {
        self.registry.add_dependency(app, unique_key)
    }

    /// Release everything `app` depends on, stopping any instance whose
    /// refcount reaches zero (property R2).
    pub async fn stop_app(&self, app: &str) -> Vec<String> {
        self.registry.cleanup_app_dependencies(app, &self.token).await
    }

    /// Tear down every remaining instance, regardless of refcount, in
    /// reverse registration order (spec.md §4.7).
    pub async fn stop_all(&self) {
        self.registry
            .stop_all(&self.token, self.config.stop_timeout.as_millis() as u64)
            .await;
    }

    pub fn ipc(&self) -> &Arc<IpcManager> {
        &self.ipc
    }
}
