//! Ordered search roots for library folders and implementation files.
//!
//! Roots come from the command line, else `MATERIALX_SEARCH_PATH`, else the
//! current directory.

use std::path::{Path, PathBuf};

/// Environment variable holding extra library search roots.
pub const SEARCH_PATH_ENV_VAR: &str = "MATERIALX_SEARCH_PATH";

/// Ordered list of roots used to resolve relative library and object paths.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileSearchPath {
    roots: Vec<PathBuf>,
}

impl FileSearchPath {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_roots<I, P>(roots: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        Self {
            roots: roots.into_iter().map(Into::into).collect(),
        }
    }

    /// Roots from `MATERIALX_SEARCH_PATH`, falling back to the working directory.
    pub fn from_env() -> Self {
        let mut out = Self::new();
        if let Some(value) = std::env::var_os(SEARCH_PATH_ENV_VAR) {
            for p in std::env::split_paths(&value) {
                if !p.as_os_str().is_empty() {
                    out.append(p);
                }
            }
        }
        if out.roots.is_empty() {
            out.append(".");
        }
        out
    }

    pub fn append(&mut self, root: impl Into<PathBuf>) {
        let root = root.into();
        if !self.roots.contains(&root) {
            self.roots.push(root);
        }
    }

    pub fn roots(&self) -> &[PathBuf] {
        &self.roots
    }

    /// First root under which `relative` exists.
    pub fn find(&self, relative: impl AsRef<Path>) -> Option<PathBuf> {
        let relative = relative.as_ref();
        if relative.is_absolute() {
            return relative.exists().then(|| relative.to_path_buf());
        }
        self.roots
            .iter()
            .map(|root| root.join(relative))
            .find(|candidate| candidate.exists())
    }

    /// Absolute form of `path`: the first existing match under the roots, or the
    /// path joined to the first root when nothing exists yet.
    pub fn resolve(&self, path: impl AsRef<Path>) -> PathBuf {
        let path = path.as_ref();
        let joined = if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.find(path).unwrap_or_else(|| match self.roots.first() {
                Some(root) => root.join(path),
                None => path.to_path_buf(),
            })
        };
        std::path::absolute(&joined).unwrap_or(joined)
    }
}
