//! Import specifier aliasing
//!
//! Maps specifiers such as `@/views/Home` onto absolute locations using an
//! alias table and an extension-inference list. The longest matching key
//! wins, whatever the declaration order. A key ending in `$` only matches
//! the whole specifier.
//!
//! The resolver never touches the filesystem. Extension inference asks a
//! caller-supplied [`FileProbe`] whether a candidate exists.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Component, Path, PathBuf};

/// Errors for alias tables and resolution
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AliasError {
    #[error("malformed alias table: {0}")]
    MalformedTable(String),

    #[error("cannot resolve '{specifier}' (tried {tried} candidate(s))")]
    NotFound { specifier: String, tried: usize },
}

/// One alias entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Alias {
    pub key: String,
    pub target: PathBuf,
}

impl Alias {
    pub fn new(key: impl Into<String>, target: impl Into<PathBuf>) -> Self {
        Self {
            key: key.into(),
            target: target.into(),
        }
    }
}

/// Outcome of [`PathAliasResolver::resolve`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// An alias matched; `path` is the rewritten, normalized location.
    Aliased { key: String, path: PathBuf },
    /// No alias matched; the specifier is returned unchanged.
    Unaliased(String),
}

impl Resolution {
    pub fn is_aliased(&self) -> bool {
        matches!(self, Resolution::Aliased { .. })
    }

    fn into_path(self) -> PathBuf {
        match self {
            Resolution::Aliased { path, .. } => path,
            Resolution::Unaliased(s) => PathBuf::from(s),
        }
    }
}

/// Existence check used for extension inference.
pub trait FileProbe {
    fn exists(&self, path: &Path) -> bool;
}

impl<F> FileProbe for F
where
    F: Fn(&Path) -> bool,
{
    fn exists(&self, path: &Path) -> bool {
        self(path)
    }
}

/// Probe backed by the real filesystem.
#[derive(Debug, Clone, Copy, Default)]
pub struct FsProbe;

impl FileProbe for FsProbe {
    fn exists(&self, path: &Path) -> bool {
        path.is_file()
    }
}

#[derive(Debug, Clone)]
struct Entry {
    key: String,
    exact: bool,
    target: PathBuf,
}

/// Read-only alias resolver.
#[derive(Debug, Clone)]
pub struct PathAliasResolver {
    /// Sorted longest key first; ties keep declaration order.
    entries: Vec<Entry>,
    extensions: Vec<String>,
}

impl PathAliasResolver {
    /// Validate and index an alias table.
    pub fn new(aliases: Vec<Alias>, extensions: Vec<String>) -> Result<Self, AliasError> {
        let mut seen = HashSet::new();
        let mut entries = Vec::with_capacity(aliases.len());

        for alias in aliases {
            let (key, exact) = match alias.key.strip_suffix('$') {
                Some(k) => (k.to_string(), true),
                None => (alias.key.clone(), false),
            };

            if key.is_empty() {
                return Err(AliasError::MalformedTable(format!(
                    "empty alias key (target '{}')",
                    alias.target.display()
                )));
            }
            if key.ends_with('/') {
                return Err(AliasError::MalformedTable(format!(
                    "alias key '{}' must not end with '/'",
                    alias.key
                )));
            }
            if !seen.insert(alias.key.clone()) {
                return Err(AliasError::MalformedTable(format!(
                    "duplicate alias key '{}'",
                    alias.key
                )));
            }
            if !alias.target.is_absolute() {
                return Err(AliasError::MalformedTable(format!(
                    "alias '{}' target '{}' is not absolute",
                    alias.key,
                    alias.target.display()
                )));
            }

            entries.push(Entry {
                key,
                exact,
                target: alias.target,
            });
        }

        // exact entries first among equal keys; stable otherwise
        entries.sort_by(|a, b| {
            b.key
                .len()
                .cmp(&a.key.len())
                .then_with(|| b.exact.cmp(&a.exact))
        });

        let extensions = extensions
            .into_iter()
            .filter(|e| !e.is_empty())
            .map(|e| if e.starts_with('.') { e } else { format!(".{}", e) })
            .collect();

        Ok(Self {
            entries,
            extensions,
        })
    }

    /// Rewrite `specifier` through the longest matching alias.
    pub fn resolve(&self, specifier: &str) -> Resolution {
        for entry in &self.entries {
            let rest = if specifier == entry.key {
                Some("")
            } else if entry.exact {
                None
            } else {
                specifier
                    .strip_prefix(entry.key.as_str())
                    .and_then(|r| r.strip_prefix('/'))
                    // a rooted remainder would replace the target on join
                    .map(|r| r.trim_start_matches('/'))
            };

            if let Some(rest) = rest {
                let path = normalize(&entry.target.join(rest));
                tracing::debug!(specifier, key = %entry.key, path = %path.display(), "alias hit");
                return Resolution::Aliased {
                    key: entry.key.clone(),
                    path,
                };
            }
        }

        Resolution::Unaliased(specifier.to_string())
    }

    /// Resolve to an existing file, inferring the extension when missing.
    ///
    /// A path with an extension is probed as is; otherwise each configured
    /// extension is tried in order and the first existing candidate wins.
    pub fn resolve_file(
        &self,
        specifier: &str,
        probe: &dyn FileProbe,
    ) -> Result<PathBuf, AliasError> {
        let base = self.resolve(specifier).into_path();

        let candidates: Vec<PathBuf> = if base.extension().is_some() {
            vec![base]
        } else {
            self.extensions
                .iter()
                .map(|ext| {
                    let mut s = base.clone().into_os_string();
                    s.push(ext);
                    PathBuf::from(s)
                })
                .collect()
        };

        candidates
            .iter()
            .find(|c| probe.exists(c))
            .cloned()
            .ok_or_else(|| AliasError::NotFound {
                specifier: specifier.to_string(),
                tried: candidates.len(),
            })
    }

    pub fn extensions(&self) -> &[String] {
        &self.extensions
    }

    /// Keys in match priority order (with `$` for exact keys).
    pub fn keys(&self) -> Vec<String> {
        self.entries
            .iter()
            .map(|e| if e.exact { format!("{}$", e.key) } else { e.key.clone() })
            .collect()
    }
}

/// Lexically fold `.` and `..` components. `..` never climbs above the root.
fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}
