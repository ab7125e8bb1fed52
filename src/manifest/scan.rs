//! File system walker for discovering module files.
//!
//! This module provides directory traversal with support for:
//! - .gitignore rules
//! - Custom ignore patterns from configuration
//! - Hidden file handling

use ignore::WalkBuilder;
use ignore::overrides::{Override, OverrideBuilder};
use std::path::{Path, PathBuf};

use super::module::{FileKind, ModuleFile};
use crate::hash::{ContentHash, Fingerprint};

/// Walks a module's source root to find its files.
pub struct SourceWalker<'a> {
    ignore_patterns: &'a [String],
}

impl<'a> SourceWalker<'a> {
    pub fn new(ignore_patterns: &'a [String]) -> Self {
        Self { ignore_patterns }
    }

    fn overrides(&self, root: &Path) -> Option<Override> {
        let mut override_builder = OverrideBuilder::new(root);
        for pattern in self.ignore_patterns {
            // Exclusion pattern
            if let Err(e) = override_builder.add(&format!("!{pattern}")) {
                tracing::warn!("[manifest] invalid ignore pattern '{pattern}': {e}");
            }
        }
        override_builder.build().ok()
    }

    /// Walk `root` and return file paths relative to it, sorted.
    pub fn walk(&self, root: &Path) -> Vec<PathBuf> {
        let mut builder = WalkBuilder::new(root);

        builder
            .hidden(true) // Skip hidden files and directories
            .git_ignore(true)
            .git_global(false)
            .git_exclude(true)
            .follow_links(false)
            .require_git(false); // Allow gitignore to work in non-git directories

        if let Some(overrides) = self.overrides(root) {
            builder.overrides(overrides);
        }

        let mut files: Vec<PathBuf> = builder
            .build()
            .filter_map(Result::ok) // Skip entries we can't access
            .filter(|entry| entry.file_type().is_some_and(|ft| ft.is_file()))
            .filter_map(|entry| {
                entry
                    .path()
                    .strip_prefix(root)
                    .ok()
                    .map(Path::to_path_buf)
            })
            .collect();
        files.sort();
        files
    }
}

/// Stat and hash one file. The previous entry's hash is reused when the
/// fingerprint is unchanged.
pub fn scan_file(
    absolute: &Path,
    relative: &Path,
    previous: Option<&ModuleFile>,
) -> std::io::Result<ModuleFile> {
    let fingerprint = Fingerprint::from_metadata(&std::fs::metadata(absolute)?);

    let content_hash = match previous {
        Some(prev) if prev.fingerprint == fingerprint => prev.content_hash,
        _ => ContentHash::from_bytes(&std::fs::read(absolute)?),
    };

    Ok(ModuleFile {
        path: relative.to_path_buf(),
        kind: FileKind::classify(relative),
        content_hash,
        fingerprint,
    })
}
