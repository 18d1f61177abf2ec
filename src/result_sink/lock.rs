use anyhow::{bail, Context, Result};
use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Exclusive marker file next to the result file, held for a whole run.
///
/// Creation fails when another run holds the lock; the file is removed on
/// drop.
#[derive(Debug)]
pub struct RunLock {
    path: PathBuf,
}

impl RunLock {
    pub fn lock_path_for(target: &Path) -> PathBuf {
        let mut name = target
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".lock");
        target.with_file_name(name)
    }

    pub fn acquire(target: &Path) -> Result<Self> {
        let path = Self::lock_path_for(target);
        let mut file = match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                let holder = fs::read_to_string(&path).unwrap_or_default();
                bail!(
                    "Another run holds {:?} (pid {}). Remove the file if that run is gone.",
                    path,
                    holder.trim()
                );
            }
            Err(e) => {
                return Err(e).with_context(|| format!("Failed to create lock file {:?}", path))
            }
        };
        writeln!(file, "{}", std::process::id())
            .with_context(|| format!("Failed to write lock file {:?}", path))?;
        debug!("Acquired {:?}", path);
        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for RunLock {
    fn drop(&mut self) {
        if let Err(e) = fs::remove_file(&self.path) {
            warn!("Failed to remove lock file {:?}: {}", self.path, e);
        }
    }
}
