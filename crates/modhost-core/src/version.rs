//! Version Resolver (C1): locates the best on-disk module version matching
//! a semver-subset range, for a given language, under the documented
//! filesystem layout (spec.md §4.1).

use std::path::{Path, PathBuf};

use tokio::fs;

use crate::model::{Language, ResolvedModule, Version};

/// A parsed semver-subset range (spec.md §4.1's grammar).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VersionRange {
    Any,
    Exact(Version),
    Caret(Version),
    Tilde(Version),
    Gte(Version),
    Gt(Version),
    Lte(Version),
    Lt(Version),
}

impl VersionRange {
    pub fn parse(s: &str) -> Option<VersionRange> {
        let s = s.trim();
        if s == "*" || s.eq_ignore_ascii_case("latest") {
            return Some(VersionRange::Any);
        }
        if let Some(rest) = s.strip_prefix("^") {
            return Version::parse(rest).map(VersionRange::Caret);
        }
        if let Some(rest) = s.strip_prefix('~') {
            return Version::parse(rest).map(VersionRange::Tilde);
        }
        if let Some(rest) = s.strip_prefix(">=") {
            return Version::parse(rest).map(VersionRange::Gte);
        }
        if let Some(rest) = s.strip_prefix("<=") {
            return Version::parse(rest).map(VersionRange::Lte);
        }
        if let Some(rest) = s.strip_prefix('>') {
            return Version::parse(rest).map(VersionRange::Gt);
        }
        if let Some(rest) = s.strip_prefix('<') {
            return Version::parse(rest).map(VersionRange::Lt);
        }
        Version::parse(s).map(VersionRange::Exact)
    }

    pub fn matches(&self, candidate: &Version) -> bool {
        match self {
            VersionRange::Any => true,
            VersionRange::Exact(v) => candidate == v,
            VersionRange::Caret(v) => candidate.major == v.major && candidate >= v,
            VersionRange::Tilde(v) => {
                candidate.major == v.major && candidate.minor == v.minor && candidate >= v
            }
            VersionRange::Gte(v) => candidate >= v,
            VersionRange::Gt(v) => candidate > v,
            VersionRange::Lte(v) => candidate <= v,
            VersionRange::Lt(v) => candidate < v,
        }
    }
}

/// Parse a directory name of the form `<version>-<langTag>` into its parts.
/// Directories that don't match this shape (or whose language tag doesn't
/// normalize) are not candidates.
fn parse_version_dir(dir_name: &str) -> Option<(Version, Language)> {
    let (version_part, tag_part) = dir_name.rsplit_once('-')?;
    let version = Version::parse(version_part)?;
    let language = Language::parse(tag_part)?;
    Some((version, language))
}

const MAX_RECURSIVE_DEPTH: usize = 3;

/// Resolve `(moduleRootDirectory, logicalName, range, language)` to a
/// filesystem path and exact version, or `None` if nothing satisfies the
/// contract (spec.md §4.1). Never raises: callers log a warning and move on.
pub async fn resolve_module_version(
    module_root: &Path,
    logical_name: &str,
    range: &str,
    language: Language,
) -> Option<ResolvedModule> {
    let range = VersionRange::parse(range)?;
    let direct = module_root.join(logical_name);

    if fs::metadata(&direct).await.is_ok() {
        return resolve_within_module_dir(&direct, &range, language).await;
    }

    resolve_via_recursive_discovery(module_root, logical_name, &range, language, 0).await
}

/// Resolve candidates that live directly under `<root>/<logicalName>`,
/// covering both the preferred `<version>-<tag>/` layout and the legacy
/// flat layout (treated as `1.0.0`).
async fn resolve_within_module_dir(
    module_dir: &Path,
    range: &VersionRange,
    language: Language,
) -> Option<ResolvedModule> {
    if has_entry_file(module_dir, language).await {
        let legacy_version = Version::new(1, 0, 0);
        if range.matches(&legacy_version) {
            return Some(ResolvedModule {
                filesystem_path: module_dir.to_path_buf(),
                exact_version: legacy_version,
            });
        }
    }

    let mut candidates: Vec<(Version, PathBuf)> = Vec::new();
    let Ok(mut entries) = fs::read_dir(module_dir).await else {
        return None;
    };
    while let Ok(Some(entry)) = entries.next_entry().await {
        let file_name = entry.file_name();
        let name = file_name.to_string_lossy();
        if name.starts_with('.') {
            continue;
        }
        let Ok(file_type) = entry.file_type().await else {
            continue;
        };
        if !file_type.is_dir() && !file_type.is_symlink() {
            continue;
        }
        let Some((version, dir_language)) = parse_version_dir(&name) else {
            continue;
        };
        if dir_language != language || !range.matches(&version) {
            continue;
        }
        if !has_entry_file(&entry.path(), language).await {
            continue;
        }
        candidates.push((version, entry.path()));
    }

    pick_best(candidates)
}

/// Invariant I6: highest exact version wins, ties broken by lexicographic
/// path order (property P4).
fn pick_best(mut candidates: Vec<(Version, PathBuf)>) -> Option<ResolvedModule> {
    candidates.sort_by(|a, b| b.0.cmp(&a.0).then_with(|| a.1.cmp(&b.1)));
    candidates
        .into_iter()
        .next()
        .map(|(version, path)| ResolvedModule {
            filesystem_path: path,
            exact_version: version,
        })
}

/// Walk `<root>` up to depth `MAX_RECURSIVE_DEPTH` looking for a directory
/// literally named `logical_name`. Symbolic links and hidden entries
/// (leading `.`) are skipped while walking.
fn resolve_via_recursive_discovery<'a>(
    dir: &'a Path,
    logical_name: &'a str,
    range: &'a VersionRange,
    language: Language,
    depth: usize,
) -> std::pin::Pin<Box<dyn std::future::Future<Output = Option<ResolvedModule>> + Send + 'a>> {
    Box::pin(async move {
        if depth > MAX_RECURSIVE_DEPTH {
            return None;
        }
        let Ok(mut entries) = fs::read_dir(dir).await else {
            return None;
        };
        let mut subdirs = Vec::new();
        while let Ok(Some(entry)) = entries.next_entry().await {
            let file_name = entry.file_name();
            let name = file_name.to_string_lossy().into_owned();
            if name.starts_with('.') {
                continue;
            }
            let Ok(file_type) = entry.file_type().await else {
                continue;
            };
            if file_type.is_symlink() || !file_type.is_dir() {
                continue;
            }
            if name == logical_name {
                if let Some(found) =
                    resolve_within_module_dir(&entry.path(), range, language).await
                {
                    return Some(found);
                }
            }
            subdirs.push(entry.path());
        }
        for subdir in subdirs {
            if let Some(found) =
                resolve_via_recursive_discovery(&subdir, logical_name, range, language, depth + 1)
                    .await
            {
                return Some(found);
            }
        }
        None
    })
}

/// An "entry file" exists for the language if the expected `index.<ext>`
/// (or, for Cpp, an `index.cpp` alongside a CMake project) is present.
async fn has_entry_file(dir: &Path, language: Language) -> bool {
    let candidates: &[&str] = match language {
        Language::Native => &["index.ts", "index.js"],
        Language::Python => &["index.py"],
        Language::TypeScript => &["index.ts", "index.js"],
        Language::Cpp => &["index.cpp"],
    };
    for candidate in candidates {
        if fs::metadata(dir.join(candidate)).await.is_ok() {
            return true;
        }
    }
    false
}
