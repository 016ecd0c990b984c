//! Shared data model, error taxonomy, version resolver and lifecycle
//! primitives for the polyglot module kernel.
//!
//! This crate knows nothing about IPC, process spawning or the registry; it
//! only defines the vocabulary (`ModuleDescriptor`, `Role`, `Language`,
//! `KernelError`, `KernelToken`, the `Module` trait) the rest of the
//! workspace builds on, plus the two genuinely leaf algorithms (version
//! resolution and `.env`/`${}` interpolation) that don't need any of that
//! machinery to be correct.

pub mod config;
pub mod env;
pub mod error;
pub mod lifecycle;
pub mod logger;
pub mod model;
pub mod version;

pub use config::KernelConfig;
pub use env::{interpolate_json, load_env_file};
pub use error::{KernelError, Result};
pub use lifecycle::{require_privileged, with_timeout, KernelToken, Module};
pub use logger::{Level as LogLevel, Logger};
pub use model::{unique_key, Language, ModuleDescriptor, ResolvedModule, Role, Version};
pub use version::{resolve_module_version, VersionRange};
