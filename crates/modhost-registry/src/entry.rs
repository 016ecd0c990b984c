use std::sync::Arc;

use modhost_core::{Module, Role};

/// One loaded module instance, keyed by its content-addressed `uniqueKey`
/// (spec.md §4.4). `registration_order` breaks ties when several instances
/// must be torn down and the registry wants a deterministic, last-in-first
/// reverse order.
pub struct RegistryEntry {
    pub unique_key: String,
    pub logical_name: String,
    pub role: Role,
    pub load_context: Option<String>,
    pub instance: Arc<dyn Module>,
    pub registration_order: u64,
}

impl RegistryEntry {
    pub fn new(
        unique_key: impl Into<String>,
        logical_name: impl Into<String>,
        role: Role,
        load_context: Option<String>,
        instance: Arc<dyn Module>,
        registration_order: u64,
    ) -> Self {
        Self {
            unique_key: unique_key.into(),
            logical_name: logical_name.into(),
            role,
            load_context,
            instance,
            registration_order,
        }
    }
}
