//! Polyglot loader dispatch (C4): turns a resolved module directory into a
//! live `Module`, either by calling a registered host-native constructor or
//! by spawning the module as a child process behind `modhost-ipc`.

pub mod foreign;
pub mod loader;
pub mod native;
pub mod proxy;

pub use foreign::ForeignLoader;
pub use loader::{select_loader, LanguageLoader, LoadRequest};
pub use native::NativeLoader;
pub use proxy::ForeignModuleProxy;
