use alloc::string::String;
use alloc::sync::Arc;
use alloc::vec::Vec;

use crate::error::Result;
use crate::response::{WipeReport, wipe_dir};

/// How a file is opened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenMode {
    /// Read from the beginning.
    Read,
    /// Write from the beginning, creating the file or truncating it.
    Write,
    /// Write without truncating, creating the file when it is missing.
    ///
    /// Used to reopen a file in the middle of an upload.
    Update,
}

/// A directory entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    /// Entry name, without any directory component.
    pub name: String,
    /// Size in bytes. Always zero for directories.
    pub size: u64,
    /// Whether the entry is a directory.
    pub is_dir: bool,
}

impl Entry {
    /// Creates a file [`Entry`].
    #[must_use]
    pub fn file(name: impl Into<String>, size: u64) -> Self {
        Self {
            name: name.into(),
            size,
            is_dir: false,
        }
    }

    /// Creates a directory [`Entry`].
    #[must_use]
    pub fn dir(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            size: 0,
            is_dir: true,
        }
    }
}

/// An open file.
///
/// The file is closed when dropped.
pub trait File {
    /// Reads up to `buf.len()` bytes at the current position.
    ///
    /// Returns `Ok(0)` at the end of the file.
    ///
    /// # Errors
    ///
    /// Fails when the underlying medium cannot be read.
    fn read(&mut self, buf: &mut [u8]) -> Result<usize>;

    /// Writes `bytes` at the current position and returns how many were
    /// written.
    ///
    /// A medium in a bad state may return `Ok(0)`.
    ///
    /// # Errors
    ///
    /// Fails when the underlying medium cannot be written.
    fn write(&mut self, bytes: &[u8]) -> Result<usize>;

    /// Moves the current position to `position` bytes from the start.
    ///
    /// # Errors
    ///
    /// Fails when the position cannot be reached.
    fn seek(&mut self, position: u64) -> Result<()>;

    /// Current position in bytes from the start.
    fn position(&self) -> u64;

    /// File size in bytes.
    fn size(&self) -> u64;

    /// Flushes buffered writes to the medium.
    ///
    /// # Errors
    ///
    /// Fails when the buffered data cannot be persisted.
    fn flush(&mut self) -> Result<()>;
}

/// The storage gateway: a hierarchical filesystem addressed with absolute,
/// `/`-separated paths.
///
/// Methods take `&self` because the gateway is shared between the transfer
/// session and the intrusion response.
pub trait Storage {
    /// File type returned by [`Storage::open`].
    type File: File;

    /// Opens the file at `path`.
    ///
    /// # Errors
    ///
    /// Fails when the file cannot be opened in the requested mode.
    fn open(&self, path: &str, mode: OpenMode) -> Result<Self::File>;

    /// Whether a file or directory exists at `path`.
    fn exists(&self, path: &str) -> bool;

    /// Whether `path` is a directory.
    fn is_dir(&self, path: &str) -> bool;

    /// Lists the entries of the directory at `path`.
    ///
    /// # Errors
    ///
    /// Fails when `path` is not a readable directory.
    fn list(&self, path: &str) -> Result<Vec<Entry>>;

    /// Creates the directory at `path`.
    ///
    /// # Errors
    ///
    /// Fails when the directory cannot be created.
    fn mkdir(&self, path: &str) -> Result<()>;

    /// Removes the file at `path`.
    ///
    /// # Errors
    ///
    /// Fails when the file cannot be removed.
    fn remove_file(&self, path: &str) -> Result<()>;

    /// Removes the empty directory at `path`.
    ///
    /// # Errors
    ///
    /// Fails when the directory is not empty or cannot be removed.
    fn remove_dir(&self, path: &str) -> Result<()>;

    /// Renames `from` to `to`.
    ///
    /// # Errors
    ///
    /// Fails when the entry cannot be moved.
    fn rename(&self, from: &str, to: &str) -> Result<()>;

    /// Removes every file and directory, bottom-up, counting the outcome in
    /// `report`.
    ///
    /// The default walks the tree through [`Storage::list`]. A storage able
    /// to hold entries [`Storage::list`] cannot name must override it.
    fn remove_all(&self, report: &mut WipeReport) {
        wipe_dir(self, "/", report);
    }
}

impl<S: Storage + ?Sized> Storage for Arc<S> {
    type File = S::File;

    fn open(&self, path: &str, mode: OpenMode) -> Result<Self::File> {
        (**self).open(path, mode)
    }

    fn exists(&self, path: &str) -> bool {
        (**self).exists(path)
    }

    fn is_dir(&self, path: &str) -> bool {
        (**self).is_dir(path)
    }

    fn list(&self, path: &str) -> Result<Vec<Entry>> {
        (**self).list(path)
    }

    fn mkdir(&self, path: &str) -> Result<()> {
        (**self).mkdir(path)
    }

    fn remove_file(&self, path: &str) -> Result<()> {
        (**self).remove_file(path)
    }

    fn remove_dir(&self, path: &str) -> Result<()> {
        (**self).remove_dir(path)
    }

    fn rename(&self, from: &str, to: &str) -> Result<()> {
        (**self).rename(from, to)
    }

    fn remove_all(&self, report: &mut WipeReport) {
        (**self).remove_all(report);
    }
}
