//! Reference-counted module instance registry (C5): the single source of
//! truth for which module instances are alive, which logical name they
//! answer to, and which apps still depend on them.

pub mod entry;
pub mod registry;

pub use entry::RegistryEntry;
pub use registry::Registry;
