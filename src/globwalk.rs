//! Glob expansion and exclusion handling for the file-tree job kinds.
//!
//! Source targets and excludes are shell-style glob patterns.  Patterns are
//! expanded to concrete paths up front; exclusion afterwards is a plain
//! prefix test on those expanded paths, which keeps the tar filter and the
//! index walker cheap.

use std::path::{Component, Path, PathBuf};

use globset::GlobBuilder;
use walkdir::WalkDir;

/// Expand one glob pattern to the matching filesystem paths.
///
/// `*` and `?` stay within a single path component; `**` crosses directories
/// (recursive expansion).  A pattern without wildcards resolves to itself
/// when it exists.
pub fn expand_glob(pattern: &str) -> Vec<PathBuf> {
    let pattern = pattern.trim_end_matches('/');
    if pattern.is_empty() {
        return Vec::new();
    }
    if !has_meta(pattern) {
        let path = PathBuf::from(pattern);
        return if path.exists() { vec![path] } else { Vec::new() };
    }

    let matcher = match GlobBuilder::new(pattern)
        .literal_separator(true)
        .build()
    {
        Ok(glob) => glob.compile_matcher(),
        Err(_) => return Vec::new(),
    };

    let root = fixed_prefix(pattern);
    let mut found: Vec<PathBuf> = Vec::new();
    for entry in WalkDir::new(&root)
        .follow_links(false)
        .into_iter()
        .filter_map(|e| e.ok())
    {
        if matcher.is_match(entry.path()) {
            found.push(entry.path().to_path_buf());
        }
    }
    found.sort();
    found
}

/// The longest wildcard-free leading directory of `pattern`.
fn fixed_prefix(pattern: &str) -> PathBuf {
    let mut prefix = PathBuf::new();
    for comp in Path::new(pattern).components() {
        match comp {
            Component::Normal(part) if has_meta(&part.to_string_lossy()) => break,
            other => prefix.push(other.as_os_str()),
        }
    }
    if prefix.as_os_str().is_empty() {
        PathBuf::from(".")
    } else {
        prefix
    }
}

fn has_meta(s: &str) -> bool {
    s.contains('*') || s.contains('?') || s.contains('[')
}

// ─── Exclusions ───────────────────────────────────────────────────────────────

/// Concrete paths excluded from a source, with prefix semantics: a path is
/// excluded when it equals, or lives under, any expanded exclude.
#[derive(Debug, Default, Clone)]
pub struct ExcludeSet {
    roots: Vec<PathBuf>,
}

impl ExcludeSet {
    /// Expand `excludes` against `targets`.  Relative excludes are joined
    /// onto every target pattern before expansion; absolute ones expand as
    /// they are.
    pub fn expand(targets: &[String], excludes: &[String]) -> Self {
        let mut roots = Vec::new();
        for exclude in excludes {
            if exclude.is_empty() {
                continue;
            }
            if exclude.starts_with('/') {
                roots.extend(expand_glob(exclude));
            } else {
                for target in targets {
                    let joined = format!("{}/{}", target.trim_end_matches('/'), exclude);
                    roots.extend(expand_glob(&joined));
                }
            }
        }
        Self { roots }
    }

    pub fn is_excluded(&self, path: &Path) -> bool {
        self.roots
            .iter()
            .any(|root| path == root || path.starts_with(root))
    }
}

// ─── Backup naming ────────────────────────────────────────────────────────────

/// Derive the backup base name for `target`, matched by the glob `pattern`.
///
/// The components of `target` that differ from the pattern (i.e. the parts a
/// wildcard matched) are joined with `___`; an explicit wildcard-free
/// pattern falls back to the last path component.
pub fn backup_name_from_glob(pattern: &str, target: &Path) -> String {
    let pattern_parts: Vec<&str> = pattern.split('/').collect();
    let target_str = target.to_string_lossy();
    let target_parts: Vec<&str> = target_str.split('/').collect();

    let mut differing: Vec<&str> = Vec::new();
    for (i, &part) in target_parts.iter().enumerate() {
        match pattern_parts.get(i) {
            Some(&p) if p == part => {}
            _ => differing.push(part),
        }
    }

    let name = differing.join("___");
    if !name.is_empty() {
        return name;
    }
    // The pattern named the path explicitly.
    target_parts
        .iter()
        .rev()
        .find(|p| !p.is_empty())
        .unwrap_or(&"")
        .to_string()
}

/// Storage-relative directory for a backup name (`___` marks nesting).
pub fn part_of_dir_path(backup_name: &str) -> String {
    backup_name.replace("___", "/")
}

// ─── Tests ────────────────────────────────────────────────────────────────────
