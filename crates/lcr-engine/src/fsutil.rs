//! Atomic file replacement

use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use tempfile::{NamedTempFile, TempPath};

use crate::error::EngineResult;

fn parent_dir_or_dot(path: &Path) -> &Path {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    }
}

fn sibling_temp(dest: &Path, prefix: &str, suffix: &str) -> EngineResult<NamedTempFile> {
    let dir = parent_dir_or_dot(dest);
    fs::create_dir_all(dir)?;
    Ok(tempfile::Builder::new()
        .prefix(prefix)
        .suffix(suffix)
        .tempfile_in(dir)?)
}

/// A file written beside its destination but not yet visible there.
///
/// Dropping it removes the staging file and leaves the destination alone.
#[derive(Debug)]
pub struct Staged {
    path: TempPath,
    dest: PathBuf,
}

impl Staged {
    /// An empty staging file for `dest`, keeping `suffix` as its extension
    pub fn new(dest: impl AsRef<Path>, suffix: &str) -> EngineResult<Self> {
        let dest = dest.as_ref();
        let path = sibling_temp(dest, ".staging-", suffix)?.into_temp_path();
        Ok(Self {
            path,
            dest: dest.to_path_buf(),
        })
    }

    /// A staging file for `dest` holding `bytes`
    pub fn with_bytes(dest: impl AsRef<Path>, bytes: &[u8]) -> EngineResult<Self> {
        let dest = dest.as_ref();
        let mut tmp = sibling_temp(dest, ".staging-", "")?;
        tmp.as_file_mut().write_all(bytes)?;
        tmp.as_file_mut().flush()?;
        Ok(Self {
            path: tmp.into_temp_path(),
            dest: dest.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn dest(&self) -> &Path {
        &self.dest
    }

    /// Replace the destination. Readers see either the old or the new file.
    pub fn persist(self) -> EngineResult<()> {
        File::open(&self.path).and_then(|f| f.sync_all())?;
        self.path.persist(&self.dest).map_err(|e| e.error)?;
        Ok(())
    }

    /// Like [`Staged::persist`], keeping the destination's previous content so
    /// the replacement can be reverted
    pub fn install(self) -> EngineResult<Installed> {
        let previous = if self.dest.is_file() {
            let backup = sibling_temp(&self.dest, ".previous-", "")?.into_temp_path();
            fs::copy(&self.dest, &backup)?;
            Some(backup)
        } else {
            None
        };
        let dest = self.dest.clone();
        self.persist()?;
        Ok(Installed { dest, previous })
    }
}

/// A destination replaced by [`Staged::install`].
///
/// Dropping it keeps the new content.
#[derive(Debug)]
pub struct Installed {
    dest: PathBuf,
    previous: Option<TempPath>,
}

impl Installed {
    pub fn dest(&self) -> &Path {
        &self.dest
    }

    /// Put back what the destination held, or remove it if it did not exist
    pub fn revert(self) -> EngineResult<()> {
        match self.previous {
            Some(previous) => previous.persist(&self.dest).map_err(|e| e.error)?,
            None => fs::remove_file(&self.dest)?,
        }
        Ok(())
    }
}

/// Replace `dest` with `bytes`. Readers see either the old or the new file.
pub fn atomic_write_bytes(dest: impl AsRef<Path>, bytes: &[u8]) -> EngineResult<()> {
    Staged::with_bytes(dest, bytes)?.persist()
}
