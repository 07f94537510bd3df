//! In-memory collaborators for unit tests.

use std::cell::{Cell, RefCell};
use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::format;
use std::net::Ipv4Addr;
use std::rc::Rc;
use std::string::{String, ToString};
use std::vec::Vec;

use crate::clock::Clock;
use crate::error::{Error, Result};
use crate::net::{Connection, Network};
use crate::path::join;
use crate::storage::{Entry, File, OpenMode, Storage};

#[derive(Default)]
struct Tree {
    files: BTreeMap<String, Vec<u8>>,
    dirs: BTreeSet<String>,
    locked: BTreeSet<String>,
    refused_writes: usize,
    open_files: usize,
}

impl Tree {
    fn is_dir(&self, path: &str) -> bool {
        path == "/" || self.dirs.contains(path)
    }

    fn exists(&self, path: &str) -> bool {
        self.is_dir(path) || self.files.contains_key(path)
    }

    fn parent_exists(&self, path: &str) -> bool {
        let parent = match path.rfind('/') {
            Some(0) | None => "/",
            Some(index) => &path[..index],
        };
        self.is_dir(parent)
    }

    fn children(&self, dir: &str) -> Vec<Entry> {
        let prefix = if dir == "/" {
            String::from("/")
        } else {
            format!("{dir}/")
        };
        let direct = |path: &String| {
            path.strip_prefix(prefix.as_str())
                .filter(|name| !name.is_empty() && !name.contains('/'))
                .map(ToString::to_string)
        };

        let mut entries: Vec<Entry> = self
            .dirs
            .iter()
            .filter_map(|path| direct(path).map(Entry::dir))
            .collect();
        entries.extend(self.files.iter().filter_map(|(path, content)| {
            direct(path).map(|name| Entry::file(name, content.len() as u64))
        }));
        entries
    }
}

/// A shared in-memory filesystem.
#[derive(Clone, Default)]
pub(crate) struct MemStorage {
    tree: Rc<RefCell<Tree>>,
}

impl MemStorage {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn put_file(&self, path: &str, content: &[u8]) {
        let _ = self
            .tree
            .borrow_mut()
            .files
            .insert(path.to_string(), content.to_vec());
    }

    pub(crate) fn put_dir(&self, path: &str) {
        let _ = self.tree.borrow_mut().dirs.insert(path.to_string());
    }

    pub(crate) fn file(&self, path: &str) -> Option<Vec<u8>> {
        self.tree.borrow().files.get(path).cloned()
    }

    /// Makes the next `count` writes return zero bytes.
    pub(crate) fn refuse_writes(&self, count: usize) {
        self.tree.borrow_mut().refused_writes = count;
    }

    /// Makes every removal of `path` fail.
    pub(crate) fn lock(&self, path: &str) {
        let _ = self.tree.borrow_mut().locked.insert(path.to_string());
    }

    pub(crate) fn open_files(&self) -> usize {
        self.tree.borrow().open_files
    }

    pub(crate) fn is_empty(&self) -> bool {
        let tree = self.tree.borrow();
        tree.files.is_empty() && tree.dirs.is_empty()
    }
}

pub(crate) struct MemFile {
    tree: Rc<RefCell<Tree>>,
    path: String,
    position: u64,
}

impl File for MemFile {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        let tree = self.tree.borrow();
        let content = tree
            .files
            .get(&self.path)
            .ok_or_else(|| Error::storage("file vanished"))?;
        let start = (self.position as usize).min(content.len());
        let read = buf.len().min(content.len() - start);
        buf[..read].copy_from_slice(&content[start..start + read]);
        self.position += read as u64;
        Ok(read)
    }

    fn write(&mut self, bytes: &[u8]) -> Result<usize> {
        let mut tree = self.tree.borrow_mut();
        if tree.refused_writes > 0 {
            tree.refused_writes -= 1;
            return Ok(0);
        }
        let content = tree.files.entry(self.path.clone()).or_default();
        let start = self.position as usize;
        if content.len() < start + bytes.len() {
            content.resize(start + bytes.len(), 0);
        }
        content[start..start + bytes.len()].copy_from_slice(bytes);
        self.position += bytes.len() as u64;
        Ok(bytes.len())
    }

    fn seek(&mut self, position: u64) -> Result<()> {
        self.position = position;
        Ok(())
    }

    fn position(&self) -> u64 {
        self.position
    }

    fn size(&self) -> u64 {
        self.tree
            .borrow()
            .files
            .get(&self.path)
            .map_or(0, |content| content.len() as u64)
    }

    fn flush(&mut self) -> Result<()> {
        Ok(())
    }
}

impl Drop for MemFile {
    fn drop(&mut self) {
        self.tree.borrow_mut().open_files -= 1;
    }
}

impl Storage for MemStorage {
    type File = MemFile;

    fn open(&self, path: &str, mode: OpenMode) -> Result<Self::File> {
        let mut tree = self.tree.borrow_mut();
        if tree.is_dir(path) {
            return Err(Error::storage(format!("{path} is a directory")));
        }
        match mode {
            OpenMode::Read if !tree.files.contains_key(path) => {
                return Err(Error::storage(format!("{path} not found")));
            }
            OpenMode::Read => {}
            OpenMode::Write | OpenMode::Update if !tree.parent_exists(path) => {
                return Err(Error::storage(format!("no parent for {path}")));
            }
            OpenMode::Write => {
                let _ = tree.files.insert(path.to_string(), Vec::new());
            }
            OpenMode::Update => {
                let _ = tree.files.entry(path.to_string()).or_default();
            }
        }
        tree.open_files += 1;

        Ok(MemFile {
            tree: Rc::clone(&self.tree),
            path: path.to_string(),
            position: 0,
        })
    }

    fn exists(&self, path: &str) -> bool {
        self.tree.borrow().exists(path)
    }

    fn is_dir(&self, path: &str) -> bool {
        self.tree.borrow().is_dir(path)
    }

    fn list(&self, path: &str) -> Result<Vec<Entry>> {
        let tree = self.tree.borrow();
        if !tree.is_dir(path) {
            return Err(Error::storage(format!("{path} is not a directory")));
        }
        Ok(tree.children(path))
    }

    fn mkdir(&self, path: &str) -> Result<()> {
        let mut tree = self.tree.borrow_mut();
        if tree.exists(path) || !tree.parent_exists(path) {
            return Err(Error::storage(format!("cannot create {path}")));
        }
        let _ = tree.dirs.insert(path.to_string());
        Ok(())
    }

    fn remove_file(&self, path: &str) -> Result<()> {
        let mut tree = self.tree.borrow_mut();
        if tree.locked.contains(path) {
            return Err(Error::storage(format!("{path} is locked")));
        }
        tree.files
            .remove(path)
            .map(|_| ())
            .ok_or_else(|| Error::storage(format!("{path} not found")))
    }

    fn remove_dir(&self, path: &str) -> Result<()> {
        let mut tree = self.tree.borrow_mut();
        if tree.locked.contains(path) || !tree.children(path).is_empty() {
            return Err(Error::storage(format!("cannot remove {path}")));
        }
        if tree.dirs.remove(path) {
            Ok(())
        } else {
            Err(Error::storage(format!("{path} not found")))
        }
    }

    fn rename(&self, from: &str, to: &str) -> Result<()> {
        let mut tree = self.tree.borrow_mut();
        if tree.exists(to) || !tree.parent_exists(to) {
            return Err(Error::storage(format!("cannot move to {to}")));
        }
        if let Some(content) = tree.files.remove(from) {
            let _ = tree.files.insert(to.to_string(), content);
            return Ok(());
        }
        if !tree.dirs.remove(from) {
            return Err(Error::storage(format!("{from} not found")));
        }
        let _ = tree.dirs.insert(to.to_string());

        let prefix = join(from, "");
        let moved = |path: &String| {
            path.strip_prefix(prefix.as_str())
                .map(|rest| join(to, rest))
        };
        let dirs: Vec<(String, String)> = tree
            .dirs
            .iter()
            .filter_map(|path| moved(path).map(|new| (path.clone(), new)))
            .collect();
        for (old, new) in dirs {
            let _ = tree.dirs.remove(&old);
            let _ = tree.dirs.insert(new);
        }
        let files: Vec<(String, String)> = tree
            .files
            .keys()
            .filter_map(|path| moved(path).map(|new| (path.clone(), new)))
            .collect();
        for (old, new) in files {
            if let Some(content) = tree.files.remove(&old) {
                let _ = tree.files.insert(new, content);
            }
        }
        Ok(())
    }
}

#[derive(Default)]
struct Pipe {
    to_server: VecDeque<u8>,
    to_client: Vec<u8>,
    client_closed: bool,
    server_closed: bool,
}

/// The server side of an in-memory connection.
pub(crate) struct MemConnection {
    pipe: Rc<RefCell<Pipe>>,
}

impl Connection for MemConnection {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        let mut pipe = self.pipe.borrow_mut();
        let read = buf.len().min(pipe.to_server.len());
        for (slot, byte) in buf.iter_mut().zip(pipe.to_server.drain(..read)) {
            *slot = byte;
        }
        Ok(read)
    }

    fn write_all(&mut self, bytes: &[u8]) -> Result<()> {
        let mut pipe = self.pipe.borrow_mut();
        if pipe.client_closed || pipe.server_closed {
            return Err(Error::network("connection closed"));
        }
        pipe.to_client.extend_from_slice(bytes);
        Ok(())
    }

    fn is_connected(&self) -> bool {
        let pipe = self.pipe.borrow();
        !pipe.server_closed && !(pipe.client_closed && pipe.to_server.is_empty())
    }

    fn close(&mut self) {
        self.pipe.borrow_mut().server_closed = true;
    }
}

/// The client side of an in-memory connection.
#[derive(Clone)]
pub(crate) struct Peer {
    pipe: Rc<RefCell<Pipe>>,
}

impl Peer {
    pub(crate) fn pair() -> (MemConnection, Self) {
        let pipe = Rc::new(RefCell::new(Pipe::default()));
        (
            MemConnection {
                pipe: Rc::clone(&pipe),
            },
            Self { pipe },
        )
    }

    pub(crate) fn send(&self, bytes: &[u8]) {
        self.pipe.borrow_mut().to_server.extend(bytes.iter().copied());
    }

    pub(crate) fn send_line(&self, line: &str) {
        self.send(line.as_bytes());
        self.send(b"\r\n");
    }

    pub(crate) fn received(&self) -> Vec<u8> {
        self.pipe.borrow().to_client.clone()
    }

    /// Returns and forgets the text received so far.
    pub(crate) fn take_text(&self) -> String {
        let bytes = core::mem::take(&mut self.pipe.borrow_mut().to_client);
        String::from_utf8_lossy(&bytes).into_owned()
    }

    pub(crate) fn close(&self) {
        self.pipe.borrow_mut().client_closed = true;
    }

    pub(crate) fn is_closed_by_server(&self) -> bool {
        self.pipe.borrow().server_closed
    }
}

#[derive(Default)]
struct Pending {
    control: VecDeque<MemConnection>,
    data: VecDeque<MemConnection>,
}

/// An in-memory network whose connections are queued by the test.
#[derive(Clone, Default)]
pub(crate) struct MemNetwork {
    pending: Rc<RefCell<Pending>>,
}

impl MemNetwork {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn connect_control(&self) -> Peer {
        let (connection, peer) = Peer::pair();
        self.pending.borrow_mut().control.push_back(connection);
        peer
    }

    pub(crate) fn connect_data(&self) -> Peer {
        let (connection, peer) = Peer::pair();
        self.pending.borrow_mut().data.push_back(connection);
        peer
    }
}

impl Network for MemNetwork {
    type Connection = MemConnection;

    fn accept_control(&mut self) -> Option<MemConnection> {
        self.pending.borrow_mut().control.pop_front()
    }

    fn accept_data(&mut self) -> Option<MemConnection> {
        self.pending.borrow_mut().data.pop_front()
    }

    fn local_ip(&self) -> Ipv4Addr {
        Ipv4Addr::new(192, 168, 4, 1)
    }
}

/// A clock moved by hand. Every pause advances it by `step` milliseconds.
#[derive(Clone)]
pub(crate) struct ManualClock {
    now: Rc<Cell<u64>>,
    step: u64,
}

impl ManualClock {
    pub(crate) fn new() -> Self {
        Self {
            now: Rc::new(Cell::new(0)),
            step: 100,
        }
    }

    pub(crate) fn advance(&self, ms: u64) {
        self.now.set(self.now.get() + ms);
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> u64 {
        self.now.get()
    }

    fn pause(&self) {
        self.advance(self.step);
    }
}
