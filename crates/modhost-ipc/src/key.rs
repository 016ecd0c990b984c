use modhost_core::Language;

/// Identifies a running child process by the module it hosts. The IPC
/// manager keeps at most one child per key alive at a time (spec.md §4.3:
/// "a second request for the same key reuses the running child").
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ChildKey {
    pub module_name: String,
    pub module_version: String,
    pub language: Language,
}

impl ChildKey {
    pub fn new(
        module_name: impl Into<String>,
        module_version: impl Into<String>,
        language: Language,
    ) -> Self {
        Self {
            module_name: module_name.into(),
            module_version: module_version.into(),
            language,
        }
    }
}

impl std::fmt::Display for ChildKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}@{} ({})",
            self.module_name,
            self.module_version,
            self.language.tag()
        )
    }
}
