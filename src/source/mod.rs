//! Source discovery
//!
//! Glob-driven enumeration of files under a base directory.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use globset::{GlobBuilder, GlobSet, GlobSetBuilder};
use walkdir::WalkDir;

use crate::utils::{is_partial, path_to_slash};

/// A discovered source file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceFile {
    /// Absolute path
    pub path: PathBuf,

    /// Path relative to the base directory of the set that found it
    pub relative: PathBuf,
}

/// A set of glob patterns rooted at a base directory
#[derive(Debug, Clone)]
pub struct SourceSet {
    base: PathBuf,
    globs: GlobSet,
    skip_partials: bool,
}

impl SourceSet {
    /// Build a set from patterns relative to `base`. `*` does not cross
    /// directory separators; use `**` for that.
    pub fn new<P: Into<PathBuf>>(base: P, patterns: &[&str]) -> Result<Self> {
        Ok(Self {
            base: base.into(),
            globs: build_globset(patterns)?,
            skip_partials: false,
        })
    }

    /// Exclude files whose name starts with `_`
    pub fn skip_partials(mut self) -> Self {
        self.skip_partials = true;
        self
    }

    pub fn base(&self) -> &Path {
        &self.base
    }

    /// Whether an absolute path belongs to this set
    pub fn matches(&self, path: &Path) -> bool {
        let Ok(relative) = path.strip_prefix(&self.base) else {
            return false;
        };
        if self.skip_partials && is_partial(path) {
            return false;
        }
        self.globs.is_match(path_to_slash(relative))
    }

    /// Enumerate matching files. Directory entries are visited sorted by
    /// file name, so the result is stable across platforms. A missing base
    /// directory yields nothing.
    pub fn discover(&self) -> Vec<SourceFile> {
        WalkDir::new(&self.base)
            .sort_by_file_name()
            .into_iter()
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_type().is_file())
            .filter(|entry| self.matches(entry.path()))
            .filter_map(|entry| {
                let relative = entry.path().strip_prefix(&self.base).ok()?.to_path_buf();
                Some(SourceFile {
                    path: entry.into_path(),
                    relative,
                })
            })
            .collect()
    }
}

/// Compile glob patterns with literal separators
pub fn build_globset(patterns: &[&str]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        let glob = GlobBuilder::new(pattern)
            .literal_separator(true)
            .build()
            .with_context(|| format!("Invalid glob pattern: {}", pattern))?;
        builder.add(glob);
    }
    builder.build().context("Failed to build glob set")
}
