//! File-backed domain sets.
//!
//! Every store is a plain text file with one normalized domain per line.
//! All mutations take the store's exclusive lock and rewrites replace the
//! file atomically, so readers (including the resolver reading Final) see
//! either the old or the new content, never a torn one.

mod lock;
mod set;

pub use lock::{RunGuard, StoreLock};
pub use set::{Placement, StoreSet};

use crate::domain::Domain;
use crate::error::{Error, Result};
use crate::reconcile::parser::parse_line;
use rustc_hash::FxHashSet;
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreKind {
    Suspect,
    Whitelist,
    Blacklist,
    Final,
}

impl StoreKind {
    pub fn name(self) -> &'static str {
        match self {
            StoreKind::Suspect => "suspect",
            StoreKind::Whitelist => "whitelist",
            StoreKind::Blacklist => "blacklist",
            StoreKind::Final => "final",
        }
    }
}

#[derive(Debug, Clone)]
pub struct Store {
    kind: StoreKind,
    path: PathBuf,
}

impl Store {
    pub fn new(kind: StoreKind, path: impl Into<PathBuf>) -> Self {
        Self {
            kind,
            path: path.into(),
        }
    }

    pub fn kind(&self) -> StoreKind {
        self.kind
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reads the whole store. A missing file is an empty store.
    pub fn load(&self) -> Result<FxHashSet<Domain>> {
        let _lock = StoreLock::shared(&self.path).map_err(|e| self.error(e))?;
        let contents = self.read_unlocked().map_err(|e| self.error(e))?;
        Ok(self.parse(&contents).collect())
    }

    /// Reads the store in sorted order.
    pub fn load_sorted(&self) -> Result<Vec<Domain>> {
        let mut domains: Vec<_> = self.load()?.into_iter().collect();
        domains.sort();
        Ok(domains)
    }

    pub fn contains(&self, domain: &Domain) -> Result<bool> {
        Ok(self.load()?.contains(domain))
    }

    /// Appends `domain` unless it is already present. Returns whether a line
    /// was written. The write is flushed to disk before returning.
    pub fn append(&self, domain: &Domain) -> Result<bool> {
        let _lock = StoreLock::exclusive(&self.path).map_err(|e| self.error(e))?;
        let contents = self.read_unlocked().map_err(|e| self.error(e))?;
        if self.parse(&contents).any(|d| d == *domain) {
            return Ok(false);
        }

        let mut line = String::with_capacity(domain.as_str().len() + 2);
        if !contents.is_empty() && !contents.ends_with('\n') {
            line.push('\n');
        }
        line.push_str(domain.as_str());
        line.push('\n');

        let write = || -> io::Result<()> {
            let mut file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(&self.path)?;
            file.write_all(line.as_bytes())?;
            file.sync_data()
        };
        write().map_err(|e| self.error(e))?;
        Ok(true)
    }

    /// Keeps only the domains for which `keep` returns true and rewrites the
    /// store atomically. Returns the removed domains.
    pub fn retain<F>(&self, mut keep: F) -> Result<Vec<Domain>>
    where
        F: FnMut(&Domain) -> bool,
    {
        let _lock = StoreLock::exclusive(&self.path).map_err(|e| self.error(e))?;
        let contents = self.read_unlocked().map_err(|e| self.error(e))?;

        let mut kept: Vec<Domain> = Vec::new();
        let mut removed = Vec::new();
        let mut seen = FxHashSet::default();
        for domain in self.parse(&contents) {
            if !seen.insert(domain.clone()) {
                continue;
            }
            if keep(&domain) {
                kept.push(domain);
            } else {
                removed.push(domain);
            }
        }
        kept.sort();

        write_atomic(&self.path, render_lines(&kept).as_bytes()).map_err(|e| self.error(e))?;
        Ok(removed)
    }

    pub fn remove(&self, domain: &Domain) -> Result<bool> {
        let removed = self.retain(|d| d != domain)?;
        Ok(!removed.is_empty())
    }

    /// Locked read-modify-write of the raw file content.
    ///
    /// `update` receives the current content (`None` if the file does not
    /// exist) and returns the replacement, or `None` to leave the file
    /// untouched. Returns whether the file was replaced.
    pub fn update_raw<F>(&self, update: F) -> Result<bool>
    where
        F: FnOnce(Option<&str>) -> Option<String>,
    {
        let _lock = StoreLock::exclusive(&self.path).map_err(|e| self.error(e))?;
        let current = match fs::read_to_string(&self.path) {
            Ok(contents) => Some(contents),
            Err(e) if e.kind() == io::ErrorKind::NotFound => None,
            Err(e) => return Err(self.error(e)),
        };

        match update(current.as_deref()) {
            Some(next) => {
                write_atomic(&self.path, next.as_bytes()).map_err(|e| self.error(e))?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn read_unlocked(&self) -> io::Result<String> {
        match fs::read(&self.path) {
            Ok(bytes) => Ok(String::from_utf8_lossy(&bytes).into_owned()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(String::new()),
            Err(e) => Err(e),
        }
    }

    fn parse<'a>(&self, contents: &'a str) -> impl Iterator<Item = Domain> + 'a {
        let kind = self.kind;
        contents.lines().filter_map(move |line| match kind {
            // Final holds resolver directives, not bare domains.
            StoreKind::Final => parse_line(line),
            _ => {
                let line = line.trim();
                if line.starts_with('#') {
                    None
                } else {
                    Domain::parse(line)
                }
            }
        })
    }

    fn error(&self, source: io::Error) -> Error {
        Error::Store {
            name: self.kind.name(),
            path: self.path.clone(),
            source,
        }
    }
}

fn render_lines(domains: &[Domain]) -> String {
    let mut out = String::new();
    for domain in domains {
        out.push_str(domain.as_str());
        out.push('\n');
    }
    out
}

/// Runs a locking store operation on the blocking pool so lock waits and
/// `sync_data` never stall an async worker.
pub async fn blocking<T, F>(op: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(op).await?
}

/// Writes `contents` to a temp file next to `path` and renames it into
/// place. Keeps the permissions of the file being replaced.
pub(crate) fn write_atomic(path: &Path, contents: &[u8]) -> io::Result<()> {
    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };

    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
    tmp.write_all(contents)?;
    tmp.as_file().sync_all()?;

    match fs::metadata(path) {
        Ok(meta) => fs::set_permissions(tmp.path(), meta.permissions())?,
        Err(e) if e.kind() == io::ErrorKind::NotFound => set_default_permissions(tmp.path())?,
        Err(e) => return Err(e),
    }

    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

#[cfg(unix)]
fn set_default_permissions(path: &Path) -> io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    // The resolver usually runs as another user and must be able to read.
    fs::set_permissions(path, fs::Permissions::from_mode(0o644))
}

#[cfg(not(unix))]
fn set_default_permissions(_path: &Path) -> io::Result<()> {
    Ok(())
}
