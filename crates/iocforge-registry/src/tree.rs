//! Release dependency trees.
//!
//! A support module's `configure/RELEASE` file names the modules it was
//! built against as macro assignments (`ASYN = $(SUPPORT)/asyn/4-41`).
//! [`ReleaseTree`] parses one module's RELEASE recursively into a root node
//! with leaves, and reports duplicate module versions across the tree as
//! warnings.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use indexmap::IndexMap;

use crate::error::Result;

/// One node of a release tree: a module pinned at a path.
#[derive(Debug, Clone)]
pub struct ReleaseLeaf {
    pub name: String,
    pub version: String,
    pub path: PathBuf,
    pub leaves: Vec<ReleaseLeaf>,
}

impl ReleaseLeaf {
    /// The tree flattened depth-first, children before parents.
    pub fn flatten(&self, include_self: bool) -> Vec<&ReleaseLeaf> {
        let mut out = Vec::new();
        for leaf in &self.leaves {
            out.extend(leaf.flatten(true));
        }
        if include_self {
            out.push(self);
        }
        out
    }
}

/// A parsed release tree plus its diagnostics.
#[derive(Debug, Clone)]
pub struct ReleaseTree {
    pub root: ReleaseLeaf,
    pub warnings: Vec<String>,
}

impl ReleaseTree {
    /// Read the tree rooted at a module library path.
    ///
    /// The module's name and version are taken from the last two path
    /// components; each `configure/RELEASE` entry becomes a leaf, parsed
    /// recursively. Paths already on the current branch are not descended
    /// into again.
    pub fn read(lib_path: &Path) -> Result<ReleaseTree> {
        let mut visited = HashSet::new();
        let root = read_leaf(lib_path, &mut visited)?;
        let mut tree = ReleaseTree {
            root,
            warnings: Vec::new(),
        };
        tree.check_duplicates();
        Ok(tree)
    }

    /// Every leaf of the tree, optionally with the root itself.
    pub fn flatten(&self, include_self: bool) -> Vec<&ReleaseLeaf> {
        self.root.flatten(include_self)
    }

    /// Record a warning for each module pinned at two different versions.
    fn check_duplicates(&mut self) {
        let mut seen: IndexMap<String, String> = IndexMap::new();
        for leaf in self.root.flatten(true) {
            let Some(previous) = seen.get(&leaf.name) else {
                seen.insert(leaf.name.clone(), leaf.version.clone());
                continue;
            };
            if previous == &leaf.version {
                continue;
            }
            let hint = older_version_hint(previous, &leaf.version);
            self.warnings.push(format!(
                "module {} appears at versions {} and {}{hint}",
                leaf.name, previous, leaf.version
            ));
        }
    }
}

/// A semver-aware hint naming the older of two versions, when both parse.
fn older_version_hint(a: &str, b: &str) -> String {
    match (parse_version(a), parse_version(b)) {
        (Some(va), Some(vb)) if va < vb => format!(" ({a} is older)"),
        (Some(va), Some(vb)) if vb < va => format!(" ({b} is older)"),
        _ => String::new(),
    }
}

/// Parse a release version string leniently. Dashes count as component
/// separators and missing components default to zero, so the common `N-M`
/// form compares as `N.M.0`.
fn parse_version(v: &str) -> Option<semver::Version> {
    let normalised = v.replace('-', ".");
    let mut parts = normalised.split('.');
    let major = parts.next()?.parse().ok()?;
    let minor = parts.next().map_or(Some(0), |p| p.parse().ok())?;
    let patch = parts.next().map_or(Some(0), |p| p.parse().ok())?;
    if parts.next().is_some() {
        return None;
    }
    Some(semver::Version::new(major, minor, patch))
}

fn read_leaf(lib_path: &Path, visited: &mut HashSet<PathBuf>) -> Result<ReleaseLeaf> {
    let mut components = lib_path.components().rev();
    let version = components
        .next()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .unwrap_or_default();
    let name = components
        .next()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .unwrap_or_default();

    let mut leaf = ReleaseLeaf {
        name,
        version,
        path: lib_path.to_path_buf(),
        leaves: Vec::new(),
    };

    let release = lib_path.join("configure/RELEASE");
    if release.is_file() && visited.insert(lib_path.to_path_buf()) {
        for (_macro_name, path) in parse_release(&release)? {
            if path.is_dir() {
                leaf.leaves.push(read_leaf(&path, visited)?);
            }
        }
        visited.remove(lib_path);
    }
    Ok(leaf)
}

/// Macro names that never point at support modules.
const NON_MODULE_MACROS: &[&str] = &["EPICS_BASE", "TOP", "TEMPLATE_TOP", "SUPPORT", "WORK"];

/// Parse the macro assignments of one RELEASE file, expanding references to
/// earlier assignments.
pub fn parse_release(path: &Path) -> Result<Vec<(String, PathBuf)>> {
    let text = std::fs::read_to_string(path)?;
    let mut macros: IndexMap<String, String> = IndexMap::new();
    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let Some((name, value)) = line.split_once('=') else {
            continue;
        };
        let name = name.trim();
        let value = expand(value.trim(), &macros);
        macros.insert(name.to_string(), value);
    }
    Ok(macros
        .into_iter()
        .filter(|(name, _)| !NON_MODULE_MACROS.contains(&name.as_str()))
        .map(|(name, value)| (name, PathBuf::from(value)))
        .collect())
}

/// Expand `$(NAME)` references against already-seen assignments; unknown
/// references expand to nothing, matching make semantics.
fn expand(value: &str, macros: &IndexMap<String, String>) -> String {
    let mut out = String::with_capacity(value.len());
    let mut rest = value;
    while let Some(start) = rest.find("$(") {
        out.push_str(&rest[..start]);
        let tail = &rest[start + 2..];
        match tail.find(')') {
            Some(end) => {
                let name = &tail[..end];
                if let Some(replacement) = macros.get(name) {
                    out.push_str(replacement);
                }
                rest = &tail[end + 1..];
            }
            None => {
                out.push_str(&rest[start..]);
                return out;
            }
        }
    }
    out.push_str(rest);
    out
}
