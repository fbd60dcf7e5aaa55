//! Tag catalog resolution.

use std::collections::HashSet;

use dabridge_common::TagPath;

use crate::error::EngineError;
use crate::source::DaSource;

/// How the tag set is chosen.
#[derive(Debug, Clone)]
pub enum TagSelection {
    /// Fixed list from configuration.
    Explicit(Vec<TagPath>),

    /// Discover against the source below a namespace prefix.
    Prefix(String),
}

/// Catalog resolution input: the selection plus glob-style excludes.
#[derive(Debug, Clone)]
pub struct CatalogSpec {
    pub selection: TagSelection,

    /// Glob patterns (`*`, `?`) removing tags after resolution.
    pub exclude: Vec<String>,
}

impl CatalogSpec {
    pub fn explicit(tags: Vec<TagPath>) -> Self {
        Self {
            selection: TagSelection::Explicit(tags),
            exclude: Vec::new(),
        }
    }

    pub fn prefix(prefix: impl Into<String>) -> Self {
        Self {
            selection: TagSelection::Prefix(prefix.into()),
            exclude: Vec::new(),
        }
    }

    pub fn with_exclude(mut self, patterns: Vec<String>) -> Self {
        self.exclude = patterns;
        self
    }
}

/// The resolved, ordered, duplicate-free tag set.
///
/// Read-only after construction; the scheduler owns it and workers see it
/// through an `Arc`.
#[derive(Debug, Clone)]
pub struct TagCatalog {
    tags: Vec<TagPath>,
}

impl TagCatalog {
    /// Resolve a catalog against the source.
    ///
    /// Explicit lists are validated for non-emptiness; duplicates collapse
    /// keeping first-occurrence order. Prefix mode runs discovery and fails
    /// if the source is unreachable or returns nothing. Excludes apply
    /// last; a catalog emptied by excludes is also a failure.
    pub async fn resolve(spec: &CatalogSpec, source: &dyn DaSource) -> Result<Self, EngineError> {
        let raw = match &spec.selection {
            TagSelection::Explicit(tags) => {
                if tags.is_empty() {
                    return Err(EngineError::discovery("Explicit tag list is empty"));
                }
                tags.clone()
            }
            TagSelection::Prefix(prefix) => {
                let found = source
                    .discover(prefix)
                    .await
                    .map_err(|e| EngineError::Discovery(e.to_string()))?;
                if found.is_empty() {
                    return Err(EngineError::Discovery(format!(
                        "Discovery under prefix '{}' returned no tags",
                        prefix
                    )));
                }
                found
            }
        };

        let mut seen = HashSet::new();
        let tags: Vec<TagPath> = raw
            .into_iter()
            .filter(|tag| seen.insert(tag.clone()))
            .filter(|tag| !spec.exclude.iter().any(|p| glob_match(tag.as_str(), p)))
            .collect();

        if tags.is_empty() {
            return Err(EngineError::discovery(
                "All resolved tags were removed by exclude patterns",
            ));
        }

        tracing::info!(tags = tags.len(), "Tag catalog resolved");
        Ok(Self { tags })
    }

    /// The resolved tags, in catalog order.
    pub fn tags(&self) -> &[TagPath] {
        &self.tags
    }

    pub fn len(&self) -> usize {
        self.tags.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tags.is_empty()
    }

    pub fn contains(&self, tag: &TagPath) -> bool {
        self.tags.contains(tag)
    }
}

/// Match `text` against a glob pattern supporting `*` and `?`.
fn glob_match(text: &str, pattern: &str) -> bool {
    let text: Vec<char> = text.chars().collect();
    let pattern: Vec<char> = pattern.chars().collect();

    let (mut t, mut p) = (0usize, 0usize);
    let mut star: Option<(usize, usize)> = None;

    while t < text.len() {
        if p < pattern.len() && (pattern[p] == '?' || pattern[p] == text[t]) {
            t += 1;
            p += 1;
        } else if p < pattern.len() && pattern[p] == '*' {
            star = Some((p, t));
            p += 1;
        } else if let Some((sp, st)) = star {
            // Backtrack: let the last `*` consume one more character.
            p = sp + 1;
            t = st + 1;
            star = Some((sp, st + 1));
        } else {
            return false;
        }
    }

    while p < pattern.len() && pattern[p] == '*' {
        p += 1;
    }
    p == pattern.len()
}
