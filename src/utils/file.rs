use std::fs::{self, File, OpenOptions};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};

use log::{debug, warn};

use crate::config::defs::{PipelineError, LOCK_FILE};

pub fn is_gzipped(path: &Path) -> io::Result<bool> {
    let mut file = File::open(path)?;
    let mut buffer = [0u8; 2];
    match file.read_exact(&mut buffer) {
        Ok(()) => Ok(buffer == [0x1F, 0x8B]), // Gzip magic bytes
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => Ok(false),
        Err(e) => Err(e),
    }
}


/// Makes a path absolute by joining relative paths onto `cwd`.
///
/// # Arguments
///
/// * `path` - User supplied path.
/// * `cwd` - Base directory for relative paths.
///
/// # Returns
/// Absolute PathBuf
pub fn file_path_manipulator(path: &Path, cwd: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        cwd.join(path)
    }
}


/// Creates a directory if it is absent. An existing directory is left alone.
pub fn ensure_dir(path: &Path) -> Result<(), PipelineError> {
    match fs::create_dir(path) {
        Ok(()) => {
            debug!("Created directory {}", path.display());
            Ok(())
        }
        Err(e) if e.kind() == io::ErrorKind::AlreadyExists && path.is_dir() => Ok(()),
        Err(e) => Err(PipelineError::DirectoryCreation { path: path.to_path_buf(), source: e }),
    }
}


/// Hard-links `source` into `dir` under its own file name.
/// An existing entry is kept; links across filesystems fall back to a copy.
///
/// # Returns
/// Result<PathBuf, PipelineError> path of the linked file.
pub fn link_into(source: &Path, dir: &Path) -> Result<PathBuf, PipelineError> {
    let name = source.file_name().ok_or_else(|| PipelineError::ReferenceLink {
        path: source.to_path_buf(),
        source: io::Error::new(io::ErrorKind::InvalidInput, "path has no file name"),
    })?;
    let target = dir.join(name);

    if target.exists() {
        debug!("{} already present, keeping it", target.display());
        return Ok(target);
    }

    match fs::hard_link(source, &target) {
        Ok(()) => Ok(target),
        Err(e) if e.kind() == io::ErrorKind::CrossesDevices => {
            warn!("Cannot hard link {} across filesystems; copying instead", source.display());
            fs::copy(source, &target)
                .map(|_| target.clone())
                .map_err(|e| PipelineError::ReferenceLink { path: source.to_path_buf(), source: e })
        }
        Err(e) => Err(PipelineError::ReferenceLink { path: source.to_path_buf(), source: e }),
    }
}


/// Exclusive claim on an output directory for the lifetime of one run.
/// The lock file is removed on drop.
#[derive(Debug)]
pub struct RunLock {
    path: PathBuf,
}

impl RunLock {
    pub fn acquire(out_dir: &Path) -> Result<Self, PipelineError> {
        let path = out_dir.join(LOCK_FILE);
        let mut file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .map_err(|e| match e.kind() {
                io::ErrorKind::AlreadyExists => PipelineError::RunLocked(path.clone()),
                _ => PipelineError::IOError(format!("Cannot create {}: {}", path.display(), e)),
            })?;
        writeln!(file, "{}", std::process::id())
            .map_err(|e| PipelineError::IOError(e.to_string()))?;
        Ok(RunLock { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for RunLock {
    fn drop(&mut self) {
        if let Err(e) = fs::remove_file(&self.path) {
            warn!("Failed to remove lock file {}: {}", self.path.display(), e);
        }
    }
}
