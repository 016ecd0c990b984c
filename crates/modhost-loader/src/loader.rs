use std::sync::Arc;

use async_trait::async_trait;
use modhost_core::{Language, Module, ModuleDescriptor, ResolvedModule, Result, Role};

/// Everything a loader needs to produce one instance: the descriptor as the
/// caller wrote it, where the version resolver found it on disk, which
/// capability role it's being loaded as, and its fully merged config.
#[derive(Clone)]
pub struct LoadRequest {
    pub descriptor: ModuleDescriptor,
    pub resolved: ResolvedModule,
    pub role: Role,
    pub config: serde_json::Value,
}

/// A backend capable of turning a resolved module directory into a live
/// `Module` instance (spec.md §4.5's polyglot loader dispatch, C4). The
/// three role-specific methods exist because the original contract keeps
/// them distinct entry points; by default they all forward to the same
/// `load`, since nothing about loading a provider differs mechanically from
/// loading a utility or service once the role is carried in the request.
#[async_trait]
pub trait LanguageLoader: Send + Sync {
    fn can_handle(&self, language: Language) -> bool;

    async fn load_provider(&self, request: LoadRequest) -> Result<Arc<dyn Module>> {
        self.load(request).await
    }

    async fn load_utility(&self, request: LoadRequest) -> Result<Arc<dyn Module>> {
        self.load(request).await
    }

    async fn load_service(&self, request: LoadRequest) -> Result<Arc<dyn Module>> {
        self.load(request).await
    }

    async fn load(&self, request: LoadRequest) -> Result<Arc<dyn Module>>;
}

/// Picks the first registered loader that claims a language, mirroring the
/// dispatch the kernel façade does before calling into a specific loader.
pub fn select_loader<'a>(
    loaders: &'a [Arc<dyn LanguageLoader>],
    language: Language,
) -> Option<&'a Arc<dyn LanguageLoader>> {
    loaders.iter().find(|loader| loader.can_handle(language))
}
