use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Which of the three kernel-managed kinds a module instance is.
///
/// Providers are stateful resources, utilities are stateless helpers,
/// services compose the other two into business logic. The kernel never
/// inspects a module's own methods; `Role` is the only classification it
/// needs in order to route registry lookups and teardown ordering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Provider,
    Utility,
    Service,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Provider => "provider",
            Role::Utility => "utility",
            Role::Service => "service",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The language a module is implemented in, after tag normalization
/// (spec.md §4.1). `Native` modules run in the host process; every other
/// variant is launched as a child process via `modhost-ipc`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Language {
    Native,
    Python,
    TypeScript,
    Cpp,
}

impl Language {
    /// Normalize a free-form language tag the way the resolver and
    /// orchestrator require: case-insensitive, with the documented
    /// synonyms collapsed to a single canonical tag.
    pub fn parse(tag: &str) -> Option<Language> {
        match tag.to_ascii_lowercase().as_str() {
            "" | "native" | "host" | "rust" => Some(Language::Native),
            "ts" | "typescript" | "js" | "javascript" => Some(Language::TypeScript),
            "py" | "python" => Some(Language::Python),
            "cpp" | "cxx" | "c++" => Some(Language::Cpp),
            _ => None,
        }
    }

    /// The normalized tag used in on-disk directory names (`<version>-<tag>`).
    pub fn tag(&self) -> &'static str {
        match self {
            Language::Native => "native",
            Language::Python => "py",
            Language::TypeScript => "ts",
            Language::Cpp => "cpp",
        }
    }

    pub fn is_foreign(&self) -> bool {
        !matches!(self, Language::Native)
    }
}

/// An exact, canonical `MAJOR.MINOR.PATCH` version triple.
///
/// Ordering is numeric per component (spec.md §4.1); the derived `Ord`
/// relies on field declaration order matching comparison precedence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Version {
    pub major: u64,
    pub minor: u64,
    pub patch: u64,
}

impl Version {
    pub const fn new(major: u64, minor: u64, patch: u64) -> Self {
        Self {
            major,
            minor,
            patch,
        }
    }

    /// Parse a bare `X`, `X.Y` or `X.Y.Z` string; missing components default
    /// to zero, per spec.md §4.1.
    pub fn parse(s: &str) -> Option<Version> {
        let mut parts = s.split('.');
        let major = parts.next()?.parse().ok()?;
        let minor = parts.next().map(|p| p.parse().ok()).unwrap_or(Some(0))?;
        let patch = parts.next().map(|p| p.parse().ok()).unwrap_or(Some(0))?;
        if parts.next().is_some() {
            return None;
        }
        Some(Version::new(major, minor, patch))
    }
}

impl std::fmt::Display for Version {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

/// A caller-supplied module descriptor, as read from a module definition
/// document (spec.md §3, §6). `config`/`custom`/`options` stay opaque
/// `serde_json::Value` trees: the kernel never interprets module-specific
/// payloads, only merges and hashes them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModuleDescriptor {
    pub name: String,
    #[serde(default = "default_version_range")]
    pub version: String,
    #[serde(default)]
    pub language: Option<String>,
    #[serde(default)]
    pub global: bool,
    #[serde(default)]
    pub module_type: Option<String>,
    #[serde(default)]
    pub config: serde_json::Value,
    #[serde(default)]
    pub custom: serde_json::Value,
    #[serde(default)]
    pub options: serde_json::Value,
    #[serde(default)]
    pub providers: Option<Vec<ModuleDescriptor>>,
    #[serde(default)]
    pub utilities: Option<Vec<ModuleDescriptor>>,
}

fn default_version_range() -> String {
    "latest".to_string()
}

impl ModuleDescriptor {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: default_version_range(),
            language: None,
            global: false,
            module_type: None,
            config: serde_json::Value::Null,
            custom: serde_json::Value::Null,
            options: serde_json::Value::Null,
            providers: None,
            utilities: None,
        }
    }

    /// Merge `config`, `options` and `custom` into a single tree with the
    /// documented precedence `custom > options > config` (spec.md §6).
    pub fn merged_config(&self) -> serde_json::Value {
        let mut merged = self.config.clone();
        merge_json(&mut merged, &self.options);
        merge_json(&mut merged, &self.custom);
        merged
    }

    pub fn language(&self) -> Language {
        self.language
            .as_deref()
            .and_then(Language::parse)
            .unwrap_or(Language::Native)
    }
}

/// Shallow-then-recursive merge: object keys from `overlay` win, recursing
/// into nested objects so partial overrides compose instead of clobbering
/// whole subtrees.
fn merge_json(base: &mut serde_json::Value, overlay: &serde_json::Value) {
    if overlay.is_null() {
        return;
    }
    match (base, overlay) {
        (serde_json::Value::Object(base_map), serde_json::Value::Object(overlay_map)) => {
            for (key, value) in overlay_map {
                match base_map.get_mut(key) {
                    Some(existing) => merge_json(existing, value),
                    None => {
                        base_map.insert(key.clone(), value.clone());
                    }
                }
            }
        }
        (base_slot, overlay_value) => {
            *base_slot = overlay_value.clone();
        }
    }
}

/// The output of version resolution (C1): a concrete filesystem path and
/// the exact version it was resolved to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedModule {
    pub filesystem_path: PathBuf,
    pub exact_version: Version,
}

/// Compute the content-addressed `uniqueKey` for an instance: `name` alone
/// when the config tree is empty, otherwise `name#<hash>` where the hash is
/// the SHA-256 of a canonical (recursively key-sorted) JSON encoding of the
/// config, hex-encoded and truncated to 16 characters for readability in
/// logs (spec.md §3, property P2).
pub fn unique_key(name: &str, config: &serde_json::Value) -> String {
    if is_empty_config(config) {
        return name.to_string();
    }
    let canonical = canonicalize(config);
    let mut hasher = Sha256::new();
    hasher.update(canonical.as_bytes());
    let digest = hasher.finalize();
    let hex: String = digest.iter().take(8).map(|b| format!("{b:02x}")).collect();
    format!("{name}#{hex}")
}

fn is_empty_config(value: &serde_json::Value) -> bool {
    match value {
        serde_json::Value::Null => true,
        serde_json::Value::Object(map) => map.is_empty(),
        _ => false,
    }
}

/// Canonical JSON: object keys sorted recursively, so that two
/// semantically-equal configs with differently-ordered keys hash to the
/// same string (property P2).
fn canonicalize(value: &serde_json::Value) -> String {
    fn sorted(value: &serde_json::Value) -> serde_json::Value {
        match value {
            serde_json::Value::Object(map) => {
                let mut entries: Vec<_> = map.iter().collect();
                entries.sort_by(|a, b| a.0.cmp(b.0));
                let mut out = serde_json::Map::new();
                for (k, v) in entries {
                    out.insert(k.clone(), sorted(v));
                }
                serde_json::Value::Object(out)
            }
            serde_json::Value::Array(items) => {
                serde_json::Value::Array(items.iter().map(sorted).collect())
            }
            other => other.clone(),
        }
    }
    sorted(value).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn unique_key_is_name_only_when_config_empty() {
        assert_eq!(unique_key("db", &serde_json::Value::Null), "db");
        assert_eq!(unique_key("db", &json!({})), "db");
    }

    #[test]
    fn unique_key_is_stable_across_key_order() {
        let a = json!({"dsn": "mem://", "pool": 4});
        let b = json!({"pool": 4, "dsn": "mem://"});
        assert_eq!(unique_key("db", &a), unique_key("db", &b));
    }

    #[test]
    fn unique_key_differs_for_different_configs() {
        let a = json!({"dsn": "mem://a"});
        let b = json!({"dsn": "mem://b"});
        assert_ne!(unique_key("db", &a), unique_key("db", &b));
    }

    #[test]
    fn merged_config_precedence_is_custom_over_options_over_config() {
        let mut descriptor = ModuleDescriptor::new("cache");
        descriptor.config = json!({"ttl": 1, "size": 10});
        descriptor.options = json!({"ttl": 2});
        descriptor.custom = json!({"ttl": 3});
        let merged = descriptor.merged_config();
        assert_eq!(merged["ttl"], 3);
        assert_eq!(merged["size"], 10);
    }

    #[test]
    fn version_parse_defaults_missing_components_to_zero() {
        assert_eq!(Version::parse("1"), Some(Version::new(1, 0, 0)));
        assert_eq!(Version::parse("1.2"), Some(Version::new(1, 2, 0)));
        assert_eq!(Version::parse("1.2.3"), Some(Version::new(1, 2, 3)));
        assert_eq!(Version::parse("1.2.3.4"), None);
    }

    #[test]
    fn language_tag_normalization() {
        assert_eq!(Language::parse("JS"), Some(Language::TypeScript));
        assert_eq!(Language::parse("Python"), Some(Language::Python));
        assert_eq!(Language::parse("c++"), Some(Language::Cpp));
        assert_eq!(Language::parse("cobol"), None);
    }
}
