//! Module definition orchestration (C6) and the `Kernel` façade (C7): the
//! two pieces an embedding host actually talks to, sitting on top of the
//! registry, loaders and IPC bridge the other crates provide.

pub mod definition;
pub mod kernel;

pub use definition::ModuleDefinition;
pub use kernel::Kernel;
