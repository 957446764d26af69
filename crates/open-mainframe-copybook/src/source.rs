//! Source units and the per-run source cache.
//!
//! Every file that takes part in a run (the root program and each resolved
//! copybook) is read once, has its line endings normalized, and is stored in
//! a [`SourceCache`] arena. Units are referred to by [`UnitId`] everywhere
//! else, so expansion frames never hold references into each other.

use std::collections::HashMap;
use std::io;
use std::path::{Component, Path, PathBuf};

use crate::config::SourceFormat;

/// Handle to a unit stored in a [`SourceCache`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct UnitId(pub u32);

/// A source file taking part in a preprocessing run.
#[derive(Debug, Clone)]
pub struct SourceUnit {
    /// Handle of this unit.
    pub id: UnitId,
    /// Normalized absolute path; the identity of the unit.
    pub path: PathBuf,
    /// Source text with `\n` line endings.
    pub text: String,
    /// Column layout the unit is normalized with.
    pub format: SourceFormat,
}

/// Arena of units read during one run, keyed by normalized path.
#[derive(Debug)]
pub struct SourceCache {
    format: SourceFormat,
    units: Vec<SourceUnit>,
    by_path: HashMap<PathBuf, UnitId>,
}

impl SourceCache {
    /// Create an empty cache whose units use `format`.
    pub fn new(format: SourceFormat) -> Self {
        Self {
            format,
            units: Vec::new(),
            by_path: HashMap::new(),
        }
    }

    /// Load a file, reading it only if it is not cached yet.
    pub fn load(&mut self, path: &Path) -> io::Result<UnitId> {
        let path = normalize_path(path);
        if let Some(&id) = self.by_path.get(&path) {
            return Ok(id);
        }

        let text = std::fs::read_to_string(&path)?;
        tracing::trace!(path = %path.display(), bytes = text.len(), "Read source unit");
        Ok(self.push(path, &text))
    }

    /// Register in-memory text under a logical path.
    ///
    /// If the path is already cached the existing unit is returned and
    /// `text` is ignored.
    pub fn insert(&mut self, path: &Path, text: &str) -> UnitId {
        let path = normalize_path(path);
        if let Some(&id) = self.by_path.get(&path) {
            return id;
        }
        self.push(path, text)
    }

    fn push(&mut self, path: PathBuf, text: &str) -> UnitId {
        let id = UnitId(self.units.len() as u32);
        self.units.push(SourceUnit {
            id,
            path: path.clone(),
            text: normalize_line_endings(text),
            format: self.format,
        });
        self.by_path.insert(path, id);
        id
    }

    /// Get a unit by handle.
    pub fn get(&self, id: UnitId) -> Option<&SourceUnit> {
        self.units.get(id.0 as usize)
    }

    /// Get a unit by handle.
    ///
    /// # Panics
    ///
    /// Panics if `id` was not produced by this cache.
    pub fn unit(&self, id: UnitId) -> &SourceUnit {
        &self.units[id.0 as usize]
    }

    /// Number of cached units.
    pub fn len(&self) -> usize {
        self.units.len()
    }

    /// Whether nothing has been loaded yet.
    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }

    /// Paths of all units, indexed by `UnitId`.
    pub fn paths(&self) -> Vec<PathBuf> {
        self.units.iter().map(|u| u.path.clone()).collect()
    }
}

/// Normalize line endings to `\n`.
///
/// Converts `\r\n` and bare `\r`; text without `\r` is returned unchanged.
pub fn normalize_line_endings(text: &str) -> String {
    if !text.contains('\r') {
        return text.to_string();
    }

    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars().peekable();
    while let Some(ch) = chars.next() {
        if ch == '\r' {
            out.push('\n');
            if chars.peek() == Some(&'\n') {
                chars.next();
            }
        } else {
            out.push(ch);
        }
    }
    out
}

/// Make a path absolute and remove `.` and `..` components lexically.
///
/// The file system is not consulted, so symlinks are left alone and the
/// path does not need to exist.
pub fn normalize_path(path: &Path) -> PathBuf {
    let absolute = std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf());
    let mut out = PathBuf::new();
    for component in absolute.components() {
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
