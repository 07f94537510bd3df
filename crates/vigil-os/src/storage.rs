use std::fs::{self, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Component, Path, PathBuf};

use tracing::{debug, error};

use vigil::error::Result;
use vigil::response::WipeReport;
use vigil::storage::{Entry, File, OpenMode, Storage};

use crate::error::storage_error;

/// A file of a [`FsStorage`].
#[derive(Debug)]
pub struct FsFile {
    file: fs::File,
    position: u64,
    size: u64,
}

impl File for FsFile {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        let n = self.file.read(buf).map_err(|e| storage_error(&e))?;
        self.position += n as u64;
        Ok(n)
    }

    fn write(&mut self, bytes: &[u8]) -> Result<usize> {
        let n = self.file.write(bytes).map_err(|e| storage_error(&e))?;
        self.position += n as u64;
        self.size = self.size.max(self.position);
        Ok(n)
    }

    fn seek(&mut self, position: u64) -> Result<()> {
        self.position = self
            .file
            .seek(SeekFrom::Start(position))
            .map_err(|e| storage_error(&e))?;
        Ok(())
    }

    fn position(&self) -> u64 {
        self.position
    }

    fn size(&self) -> u64 {
        self.size
    }

    fn flush(&mut self) -> Result<()> {
        self.file.flush().map_err(|e| storage_error(&e))?;
        self.file.sync_data().map_err(|e| storage_error(&e))
    }
}

/// A [`Storage`] backed by a host directory.
///
/// Session paths are resolved below the root directory: `..`, root and
/// prefix components are dropped, so no path escapes the root.
#[derive(Debug, Clone)]
pub struct FsStorage {
    root: PathBuf,
}

impl FsStorage {
    /// Creates a [`FsStorage`] rooted at `root`, creating the directory when
    /// it is missing.
    ///
    /// # Errors
    ///
    /// Fails when the root directory cannot be created.
    pub fn new(root: impl Into<PathBuf>) -> crate::error::Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    /// The root directory.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn host_path(&self, path: &str) -> PathBuf {
        let mut host = self.root.clone();
        for component in Path::new(path).components() {
            if let Component::Normal(segment) = component {
                host.push(segment);
            }
        }
        host
    }
}

// Works on host paths, so entries without a UTF-8 name are removed too.
fn remove_tree(dir: &Path, report: &mut WipeReport) {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) => {
            error!("Cannot list {}: {e}", dir.display());
            report.failures += 1;
            return;
        }
    };

    for entry in entries {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                error!("Cannot read an entry of {}: {e}", dir.display());
                report.failures += 1;
                continue;
            }
        };
        let path = entry.path();

        // Symbolic links are removed, never followed.
        let is_dir = match entry.file_type() {
            Ok(file_type) => file_type.is_dir(),
            Err(e) => {
                error!("Cannot inspect {}: {e}", path.display());
                report.failures += 1;
                continue;
            }
        };

        if is_dir {
            remove_tree(&path, report);
            match fs::remove_dir(&path) {
                Ok(()) => report.dirs_removed += 1,
                Err(e) => {
                    error!("Cannot remove {}: {e}", path.display());
                    report.failures += 1;
                }
            }
        } else {
            match fs::remove_file(&path) {
                Ok(()) => report.files_removed += 1,
                Err(e) => {
                    error!("Cannot remove {}: {e}", path.display());
                    report.failures += 1;
                }
            }
        }
    }
}

impl Storage for FsStorage {
    type File = FsFile;

    fn open(&self, path: &str, mode: OpenMode) -> Result<FsFile> {
        let host = self.host_path(path);
        if host.is_dir() {
            return Err(vigil::error::Error::storage("Is a directory"));
        }

        let mut options = OpenOptions::new();
        let _ = match mode {
            OpenMode::Read => options.read(true),
            OpenMode::Write => options.write(true).create(true).truncate(true),
            OpenMode::Update => options.write(true).create(true).truncate(false),
        };

        let file = options.open(&host).map_err(|e| storage_error(&e))?;
        let size = file.metadata().map_err(|e| storage_error(&e))?.len();
        debug!("Opened {} ({mode:?})", host.display());
        Ok(FsFile {
            file,
            position: 0,
            size,
        })
    }

    fn exists(&self, path: &str) -> bool {
        self.host_path(path).exists()
    }

    fn is_dir(&self, path: &str) -> bool {
        self.host_path(path).is_dir()
    }

    fn list(&self, path: &str) -> Result<Vec<Entry>> {
        let mut dirs = Vec::new();
        let mut files = Vec::new();
        for entry in fs::read_dir(self.host_path(path)).map_err(|e| storage_error(&e))? {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    debug!("Skipping unreadable entry: {e}");
                    continue;
                }
            };
            let Ok(name) = entry.file_name().into_string() else {
                debug!("Skipping non UTF-8 entry {:?}", entry.file_name());
                continue;
            };
            let metadata = match entry.metadata() {
                Ok(metadata) => metadata,
                Err(e) => {
                    debug!("Skipping {name}: {e}");
                    continue;
                }
            };
            if metadata.is_dir() {
                dirs.push(Entry::dir(name));
            } else {
                files.push(Entry::file(name, metadata.len()));
            }
        }

        dirs.sort_by(|a, b| a.name.cmp(&b.name));
        files.sort_by(|a, b| a.name.cmp(&b.name));
        dirs.append(&mut files);
        Ok(dirs)
    }

    fn mkdir(&self, path: &str) -> Result<()> {
        fs::create_dir(self.host_path(path)).map_err(|e| storage_error(&e))
    }

    fn remove_file(&self, path: &str) -> Result<()> {
        fs::remove_file(self.host_path(path)).map_err(|e| storage_error(&e))
    }

    fn remove_dir(&self, path: &str) -> Result<()> {
        fs::remove_dir(self.host_path(path)).map_err(|e| storage_error(&e))
    }

    fn rename(&self, from: &str, to: &str) -> Result<()> {
        fs::rename(self.host_path(from), self.host_path(to)).map_err(|e| storage_error(&e))
    }

    fn remove_all(&self, report: &mut WipeReport) {
        remove_tree(&self.root, report);
    }
}

#[cfg(test)]
mod tests {
    use vigil::response::{WipeReport, wipe};
    use vigil::storage::{Entry, File, OpenMode, Storage};

    use super::FsStorage;

    fn storage() -> (tempfile::TempDir, FsStorage) {
        let dir = tempfile::tempdir().unwrap();
        let storage = FsStorage::new(dir.path()).unwrap();
        (dir, storage)
    }

    #[test]
    fn write_read_update() {
        let (_dir, storage) = storage();

        let mut file = storage.open("/a.txt", OpenMode::Write).unwrap();
        assert_eq!(file.write(b"hello world").unwrap(), 11);
        assert_eq!(file.position(), 11);
        assert_eq!(file.size(), 11);
        file.flush().unwrap();
        drop(file);

        let mut file = storage.open("/a.txt", OpenMode::Update).unwrap();
        assert_eq!(file.size(), 11);
        file.seek(6).unwrap();
        assert_eq!(file.write(b"vigil").unwrap(), 5);
        drop(file);

        let mut file = storage.open("/a.txt", OpenMode::Read).unwrap();
        let mut buf = [0; 32];
        let n = file.read(&mut buf).unwrap();
        assert_eq!(&buf[..n], b"hello vigil");
        assert_eq!(file.read(&mut buf).unwrap(), 0);

        let file = storage.open("/a.txt", OpenMode::Write).unwrap();
        assert_eq!(file.size(), 0);
    }

    #[test]
    fn confined_to_root() {
        let (dir, storage) = storage();
        let _ = storage.open("/../../escape.txt", OpenMode::Write).unwrap();
        assert!(dir.path().join("escape.txt").exists());
        assert!(storage.exists("/escape.txt"));
    }

    #[test]
    fn directories() {
        let (_dir, storage) = storage();
        storage.mkdir("/docs").unwrap();
        assert!(storage.mkdir("/docs").is_err());
        assert!(storage.is_dir("/docs"));
        assert!(storage.open("/docs", OpenMode::Read).is_err());

        let _ = storage.open("/docs/b.txt", OpenMode::Write).unwrap();
        let _ = storage.open("/a.txt", OpenMode::Write).unwrap();
        storage.mkdir("/zeta").unwrap();

        assert_eq!(
            storage.list("/").unwrap(),
            vec![Entry::dir("docs"), Entry::dir("zeta"), Entry::file("a.txt", 0)]
        );
        assert!(storage.list("/missing").is_err());

        assert!(storage.remove_dir("/docs").is_err());
        storage.remove_file("/docs/b.txt").unwrap();
        storage.remove_dir("/docs").unwrap();
        assert!(!storage.exists("/docs"));
    }

    #[test]
    fn rename() {
        let (_dir, storage) = storage();
        let _ = storage.open("/a.txt", OpenMode::Write).unwrap();
        storage.mkdir("/docs").unwrap();
        storage.rename("/a.txt", "/docs/b.txt").unwrap();
        assert!(!storage.exists("/a.txt"));
        assert!(storage.exists("/docs/b.txt"));
        assert!(storage.rename("/missing", "/other").is_err());
    }

    #[test]
    fn wipe_clears_the_root() {
        let (dir, storage) = storage();
        storage.mkdir("/docs").unwrap();
        storage.mkdir("/docs/deep").unwrap();
        let _ = storage.open("/docs/deep/c.txt", OpenMode::Write).unwrap();
        let _ = storage.open("/plan.txt", OpenMode::Write).unwrap();

        assert_eq!(
            wipe(&storage),
            WipeReport {
                files_removed: 2,
                dirs_removed: 2,
                failures: 0,
            }
        );
        assert!(dir.path().is_dir());
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[cfg(unix)]
    #[test]
    fn wipe_removes_non_utf8_names() {
        use std::ffi::OsStr;
        use std::os::unix::ffi::OsStrExt;

        let (dir, storage) = storage();
        storage.mkdir("/docs").unwrap();
        let secret = dir.path().join("docs").join(OsStr::from_bytes(b"secret\xff.bin"));
        std::fs::write(&secret, b"secret").unwrap();
        let _ = storage.open("/plan.txt", OpenMode::Write).unwrap();

        // Listing cannot name the file, the wipe still removes it.
        assert_eq!(storage.list("/docs").unwrap(), Vec::new());
        assert_eq!(
            wipe(&storage),
            WipeReport {
                files_removed: 2,
                dirs_removed: 1,
                failures: 0,
            }
        );
        assert!(!secret.exists());
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }
}
