use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use modhost_core::{KernelConfig, KernelToken, Module, ModuleDescriptor, Result, Role};
use modhost_runtime::{Kernel, ModuleDefinition};

struct CountingProvider {
    name: String,
    start_count: Arc<AtomicUsize>,
    stopped: Arc<AtomicBool>,
}

#[async_trait]
impl Module for CountingProvider {
    fn name(&self) -> &str {
        &self.name
    }
    fn role(&self) -> Role {
        Role::Provider
    }
    fn module_type(&self) -> &str {
        "counting-provider"
    }
    fn set_privileged_key(&self, _token: KernelToken) -> Result<()> {
        Ok(())
    }
    async fn start(&self, _token: &KernelToken) -> Result<()> {
        self.start_count.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
    async fn stop(&self, _token: &KernelToken) -> Result<()> {
        self.stopped.store(true, Ordering::SeqCst);
        Ok(())
    }
}

fn kernel_with_provider(start_count: Arc<AtomicUsize>, stopped: Arc<AtomicBool>) -> Kernel {
    let kernel = Kernel::new(KernelConfig::default().with_module_root("./unused"));
    kernel.register_native_constructor("db", move |_config| {
        Ok(Arc::new(CountingProvider {
            name: "db".to_string(),
            start_count: Arc::clone(&start_count),
            stopped: Arc::clone(&stopped),
        }) as Arc<dyn Module>)
    });
    kernel
}

fn definition_with_shared_provider() -> ModuleDefinition {
    let mut provider = ModuleDescriptor::new("db");
    provider.global = true;
    ModuleDefinition {
        providers: vec![provider],
        utilities: Vec::new(),
        services: Vec::new(),
        fail_on_error: true,
    }
}

#[tokio::test]
async fn a_global_provider_is_started_once_and_shared_across_apps() {
    let start_count = Arc::new(AtomicUsize::new(0));
    let stopped = Arc::new(AtomicBool::new(false));
    let kernel = kernel_with_provider(Arc::clone(&start_count), Arc::clone(&stopped));
    let definition = definition_with_shared_provider();

    kernel.start_app("app-a", &definition).await.unwrap();
    kernel.start_app("app-b", &definition).await.unwrap();

    assert_eq!(start_count.load(Ordering::SeqCst), 1);
    assert!(kernel.get_provider("db", None).is_ok());
}

#[tokio::test]
async fn a_global_provider_outlives_every_dependent_app_and_is_reaped_only_by_stop_all() {
    let start_count = Arc::new(AtomicUsize::new(0));
    let stopped = Arc::new(AtomicBool::new(false));
    let kernel = kernel_with_provider(Arc::clone(&start_count), Arc::clone(&stopped));
    let definition = definition_with_shared_provider();

    kernel.start_app("app-a", &definition).await.unwrap();
    kernel.start_app("app-b", &definition).await.unwrap();

    // A global provider is registered with owningApp = null (orphan); no
    // app's teardown ever owns it.
    kernel.stop_app("app-a").await;
    assert!(!stopped.load(Ordering::SeqCst));
    assert!(kernel.has_module(Role::Provider, "db"));

    kernel.stop_app("app-b").await;
    assert!(!stopped.load(Ordering::SeqCst));
    assert!(kernel.has_module(Role::Provider, "db"));

    kernel.stop_all().await;
    assert!(stopped.load(Ordering::SeqCst));
    assert!(!kernel.has_module(Role::Provider, "db"));
}

struct RecordingService {
    name: String,
}

#[async_trait]
impl Module for RecordingService {
    fn name(&self) -> &str {
        &self.name
    }
    fn role(&self) -> Role {
        Role::Service
    }
    fn module_type(&self) -> &str {
        "recording-service"
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

#[tokio::test]
async fn an_app_scoped_provider_only_stops_once_its_one_owning_app_stops() {
    let start_count = Arc::new(AtomicUsize::new(0));
    let stopped = Arc::new(AtomicBool::new(false));
    let kernel = kernel_with_provider(Arc::clone(&start_count), Arc::clone(&stopped));
    kernel.register_native_constructor("checkout", move |_config| {
        Ok(Arc::new(RecordingService {
            name: "checkout".to_string(),
        }) as Arc<dyn Module>)
    });

    let mut provider = ModuleDescriptor::new("db");
    provider.global = false;
    let mut service = ModuleDescriptor::new("checkout");
    service.providers = Some(vec![provider]);
    let definition = ModuleDefinition {
        providers: Vec::new(),
        utilities: Vec::new(),
        services: vec![service],
        fail_on_error: true,
    };

    kernel.start_app("app-a", &definition).await.unwrap();
    assert!(kernel.has_module(Role::Provider, "db"));

    kernel.stop_app("app-a").await;
    assert!(stopped.load(Ordering::SeqCst));
    assert!(!kernel.has_module(Role::Provider, "db"));
}

#[tokio::test]
async fn stop_all_tears_down_remaining_modules_regardless_of_refcount() {
    let start_count = Arc::new(AtomicUsize::new(0));
    let stopped = Arc::new(AtomicBool::new(false));
    let kernel = kernel_with_provider(Arc::clone(&start_count), Arc::clone(&stopped));
    let definition = definition_with_shared_provider();

    kernel.start_app("app-a", &definition).await.unwrap();
    kernel.stop_all().await;

    assert!(stopped.load(Ordering::SeqCst));
}

#[tokio::test]
async fn get_provider_for_unknown_name_is_module_not_found() {
    let kernel = Kernel::new(KernelConfig::default());
    let err = kernel.get_provider("nonexistent", None).unwrap_err();
    assert_eq!(err.kind(), "MODULE_NOT_FOUND");
}
