//! Copybook resolution.
//!
//! A COPY name is resolved against the configured locations in order:
//!
//! 1. Explicit copybook files, in configured order. A file matches when its
//!    path ends with the name (compared case-insensitively).
//! 2. Search directories, in configured order. Each directory is walked
//!    recursively; a file matches when its path is the directory joined with
//!    the name (compared case-insensitively).
//!
//! Within each location the bare name is tried first, then the name with each
//! default extension, unless the name already has an extension.

use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};

use crate::config::CopybookConfig;
use crate::diagnostic::{Diagnostic, Diagnostics};
use crate::source::normalize_path;

/// Which configured location a copybook was found in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResolutionOrigin {
    /// Index into `copybook_files`.
    ExplicitFile(usize),
    /// Index into `copybook_directories`.
    Directory(usize),
}

/// A resolved copybook.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ResolvedCopybook {
    /// Normalized absolute path.
    pub path: PathBuf,
    pub origin: ResolutionOrigin,
}

/// A file found by walking a search directory.
#[derive(Debug)]
struct WalkedFile {
    path: PathBuf,
    key: Vec<String>,
}

/// Resolves COPY names for one preprocessing run.
///
/// Directory walks and resolution results are cached, so every name
/// resolves the same way for the whole run.
#[derive(Debug)]
pub struct CopybookResolver<'a> {
    config: &'a CopybookConfig,
    walks: HashMap<usize, Vec<WalkedFile>>,
    resolved: HashMap<String, Option<ResolvedCopybook>>,
}

impl<'a> CopybookResolver<'a> {
    pub fn new(config: &'a CopybookConfig) -> Self {
        Self {
            config,
            walks: HashMap::new(),
            resolved: HashMap::new(),
        }
    }

    /// Resolve a COPY name, or `None` if no location has it.
    ///
    /// Directory walk failures are recorded in `diagnostics` the first time
    /// the directory is walked.
    pub fn resolve(
        &mut self,
        identifier: &str,
        diagnostics: &mut Diagnostics,
    ) -> Option<ResolvedCopybook> {
        let name = identifier.replace('\\', "/");
        let memo_key = name.to_uppercase();
        if let Some(hit) = self.resolved.get(&memo_key) {
            return hit.clone();
        }

        let result = self.lookup(&name, diagnostics);
        match &result {
            Some(found) => tracing::debug!(
                identifier,
                path = %found.path.display(),
                origin = ?found.origin,
                "Resolved copybook"
            ),
            None => tracing::debug!(identifier, "Copybook not found"),
        }
        self.resolved.insert(memo_key, result.clone());
        result
    }

    fn lookup(&mut self, identifier: &str, diagnostics: &mut Diagnostics) -> Option<ResolvedCopybook> {
        let candidates = candidate_names(identifier, self.config);

        for (index, file) in self.config.copybook_files.iter().enumerate() {
            let file = normalize_path(file);
            let file_key = path_key(&file);
            if candidates
                .iter()
                .any(|name| file_key.ends_with(&name_key(name)))
            {
                return Some(ResolvedCopybook {
                    path: file,
                    origin: ResolutionOrigin::ExplicitFile(index),
                });
            }
        }

        for index in 0..self.config.copybook_directories.len() {
            let dir = normalize_path(&self.config.copybook_directories[index]);
            let files = self.walk(index, &dir, diagnostics);
            for name in &candidates {
                let wanted = path_key(&normalize_path(&dir.join(name)));
                if let Some(found) = files.iter().find(|f| f.key == wanted) {
                    return Some(ResolvedCopybook {
                        path: found.path.clone(),
                        origin: ResolutionOrigin::Directory(index),
                    });
                }
            }
        }

        None
    }

    /// Files under directory `index`, walked once per run.
    fn walk(&mut self, index: usize, dir: &Path, diagnostics: &mut Diagnostics) -> &[WalkedFile] {
        self.walks.entry(index).or_insert_with(|| {
            let mut files = Vec::new();
            walk_directory(dir, &mut files, diagnostics);
            tracing::trace!(directory = %dir.display(), files = files.len(), "Walked copybook directory");
            files
        })
    }
}

/// Names to try for `identifier`: itself, then with each default extension.
pub fn candidate_names(identifier: &str, config: &CopybookConfig) -> Vec<String> {
    let mut names = vec![identifier.to_string()];
    if Path::new(identifier).extension().is_none() {
        names.extend(config.extensions().map(|ext| format!("{identifier}.{ext}")));
    }
    names
}

/// Recursively collect regular files under `dir`, sorted by name.
///
/// Symbolic links to directories are not followed.
fn walk_directory(dir: &Path, files: &mut Vec<WalkedFile>, diagnostics: &mut Diagnostics) {
    let entries = match std::fs::read_dir(dir) {
        Ok(e) => e,
        Err(e) => {
            diagnostics.push(Diagnostic::DirectoryEnumeration {
                directory: dir.to_path_buf(),
                reason: e.to_string(),
            });
            return;
        }
    };

    let mut entries: Vec<_> = entries
        .filter_map(|entry| match entry {
            Ok(entry) => Some(entry),
            Err(e) => {
                diagnostics.push(Diagnostic::DirectoryEnumeration {
                    directory: dir.to_path_buf(),
                    reason: e.to_string(),
                });
                None
            }
        })
        .collect();
    entries.sort_by_key(|entry| entry.file_name());

    for entry in entries {
        let path = entry.path();
        let Ok(file_type) = entry.file_type() else {
            continue;
        };
        if file_type.is_dir() {
            walk_directory(&path, files, diagnostics);
        } else if file_type.is_file() || path.is_file() {
            let path = normalize_path(&path);
            files.push(WalkedFile {
                key: path_key(&path),
                path,
            });
        }
    }
}

/// Lower-cased path components, for case-insensitive comparison.
fn path_key(path: &Path) -> Vec<String> {
    path.components()
        .filter(|c| !matches!(c, Component::CurDir))
        .map(|c| c.as_os_str().to_string_lossy().to_lowercase())
        .collect()
}

/// Lower-cased components of a `/`-separated COPY name.
fn name_key(name: &str) -> Vec<String> {
    name.split('/')
        .filter(|part| !part.is_empty() && *part != ".")
        .map(str::to_lowercase)
        .collect()
}
