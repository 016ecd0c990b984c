use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use modhost_core::{KernelError, Language, Module, Result};
use modhost_ipc::{ChildKey, IpcManager, SpawnSpec};

use crate::loader::{LanguageLoader, LoadRequest};
use crate::proxy::ForeignModuleProxy;

/// Loads modules written in a language the host doesn't run natively, by
/// spawning them as a child process behind the IPC bridge (spec.md §4.3,
/// §4.5). Which interpreter/binary to launch and what its entry file is
/// named follows each language's own convention; everything past that is
/// identical between languages, which is why there's one loader instead of
/// one per language.
pub struct ForeignLoader {
    ipc: Arc<IpcManager>,
    call_deadline: Duration,
}

impl ForeignLoader {
    pub fn new(ipc: Arc<IpcManager>, call_deadline: Duration) -> Self {
        Self { ipc, call_deadline }
    }

    fn build_spawn_spec(&self, request: &LoadRequest) -> Result<SpawnSpec> {
        let language = request.descriptor.language();
        let entry_dir = &request.resolved.filesystem_path;
        let config_json = serde_json::to_string(&request.config)?;

        let spec = match language {
            Language::Python => SpawnSpec::new("python3")
                .arg(entry_dir.join("index.py").to_string_lossy().into_owned()),
            Language::TypeScript => SpawnSpec::new("node")
                .arg(entry_dir.join("index.js").to_string_lossy().into_owned()),
            Language::Cpp => SpawnSpec::new(entry_dir.join("module").to_string_lossy().into_owned()),
            Language::Native => {
                return Err(KernelError::LoadFailed {
                    name: request.descriptor.name.clone(),
                    reason: "native modules do not go through the foreign loader".to_string(),
                })
            }
        };

        Ok(spec
            .env("ADC_MODULE_NAME", request.descriptor.name.clone())
            .env("ADC_MODULE_VERSION", request.resolved.exact_version.to_string())
            .env("ADC_MODULE_TYPE", request.role.as_str())
            .env("ADC_MODULE_CONFIG", config_json)
            .current_dir(entry_dir.clone()))
    }
}

#[async_trait]
impl LanguageLoader for ForeignLoader {
    fn can_handle(&self, language: Language) -> bool {
        language.is_foreign()
    }

    async fn load(&self, request: LoadRequest) -> Result<Arc<dyn Module>> {
        let language = request.descriptor.language();
        let key = ChildKey::new(
            request.descriptor.name.clone(),
            request.resolved.exact_version.to_string(),
            language,
        );
        let spec = self.build_spawn_spec(&request)?;
        self.ipc.get_or_spawn(key.clone(), spec).await?;

        let module_type = request
            .descriptor
            .module_type
            .clone()
            .unwrap_or_else(|| request.role.as_str().to_string());

        Ok(Arc::new(ForeignModuleProxy::new(
            request.descriptor.name,
            request.role,
            module_type,
            key,
            Arc::clone(&self.ipc),
            self.call_deadline,
        )))
    }
}
