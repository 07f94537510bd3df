use alloc::format;
use alloc::string::String;

use log::{debug, error, warn};

use crate::error::{Error, Result};
use crate::net::Connection;
use crate::reply::Reply;
use crate::storage::{File, OpenMode, Storage};

/// Bytes moved between the storage and the data channel in a single step.
pub const CHUNK_SIZE: usize = 4096;

// Reopen attempts after a zero-byte write before giving up on an upload.
const MAX_REOPEN_ATTEMPTS: usize = 8;

/// Direction of a transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// From the storage to the client.
    Retrieve,
    /// From the client to the storage.
    Store,
}

/// Outcome of a transfer step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Progress {
    /// More data may follow.
    Continue,
    /// The transfer is over and must be finished with
    /// [`Transfer::finish`].
    Complete,
    /// The transfer failed and must be dropped after sending the reply.
    Failed(Reply),
}

/// An active transfer, owning the open file.
#[derive(Debug)]
pub struct Transfer<F> {
    direction: Direction,
    file: F,
    path: String,
    started_ms: u64,
    bytes: u64,
}

impl<F: File> Transfer<F> {
    /// Starts sending `file` to the client.
    pub fn retrieve(file: F, path: impl Into<String>, now_ms: u64) -> Self {
        Self::new(Direction::Retrieve, file, path.into(), now_ms)
    }

    /// Starts receiving `file` from the client.
    pub fn store(file: F, path: impl Into<String>, now_ms: u64) -> Self {
        Self::new(Direction::Store, file, path.into(), now_ms)
    }

    const fn new(direction: Direction, file: F, path: String, started_ms: u64) -> Self {
        Self {
            direction,
            file,
            path,
            started_ms,
            bytes: 0,
        }
    }

    /// Returns the transfer direction.
    #[must_use]
    pub const fn direction(&self) -> Direction {
        self.direction
    }

    /// Returns the bytes moved so far.
    #[must_use]
    pub const fn bytes(&self) -> u64 {
        self.bytes
    }

    /// Returns the path of the transferred file.
    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Moves at most one chunk between the file and `peer`.
    ///
    /// `buf` is the scratch buffer for the chunk; its length bounds the
    /// amount of data moved.
    pub fn step<C, S>(&mut self, peer: &mut C, storage: &S, buf: &mut [u8]) -> Progress
    where
        C: Connection + ?Sized,
        S: Storage<File = F> + ?Sized,
    {
        match self.direction {
            Direction::Retrieve => self.send_chunk(peer, buf),
            Direction::Store => self.receive_chunk(peer, storage, buf),
        }
    }

    fn send_chunk<C: Connection + ?Sized>(&mut self, peer: &mut C, buf: &mut [u8]) -> Progress {
        if !peer.is_connected() {
            warn!("Data peer left while sending {}", self.path);
            return Progress::Complete;
        }

        let read = match self.file.read(buf) {
            Ok(read) => read,
            Err(e) => {
                error!("Cannot read {}: {e}", self.path);
                0
            }
        };
        if read == 0 {
            return Progress::Complete;
        }

        if let Err(e) = peer.write_all(&buf[..read]) {
            warn!("Cannot send {}: {e}", self.path);
            return Progress::Complete;
        }

        self.bytes += read as u64;
        Progress::Continue
    }

    fn receive_chunk<C, S>(&mut self, peer: &mut C, storage: &S, buf: &mut [u8]) -> Progress
    where
        C: Connection + ?Sized,
        S: Storage<File = F> + ?Sized,
    {
        let read = match peer.read(buf) {
            Ok(read) => read,
            Err(e) => {
                warn!("Cannot receive {}: {e}", self.path);
                0
            }
        };

        if read == 0 {
            return if peer.is_connected() {
                Progress::Continue
            } else {
                Progress::Complete
            };
        }

        if let Err(e) = self.write_chunk(storage, &buf[..read]) {
            error!("Cannot write {}: {e}", self.path);
            return Progress::Failed(Reply::new(451, "Local write error"));
        }

        self.bytes += read as u64;
        Progress::Continue
    }

    // A write returning zero bytes leaves the file in an unusable state:
    // reopen it at the same offset and try again.
    fn write_chunk<S>(&mut self, storage: &S, chunk: &[u8]) -> Result<()>
    where
        S: Storage<File = F> + ?Sized,
    {
        let mut offset = 0;
        let mut reopened = 0;

        while offset < chunk.len() {
            let position = self.file.position();
            let written = self.file.write(&chunk[offset..])?;
            if written > 0 {
                offset += written;
                continue;
            }

            if reopened == MAX_REOPEN_ATTEMPTS {
                return Err(Error::storage(format!(
                    "{} kept refusing writes at offset {position}",
                    self.path
                )));
            }
            reopened += 1;

            warn!("Zero-byte write on {} at {position}, reopening", self.path);
            let mut file = storage.open(&self.path, OpenMode::Update)?;
            file.seek(position)?;
            self.file = file;
        }

        Ok(())
    }

    /// Ends the transfer, closing the file, and builds the completion reply.
    pub fn finish(mut self, now_ms: u64) -> Reply {
        if self.direction == Direction::Store {
            if let Err(e) = self.file.flush() {
                error!("Cannot flush {}: {e}", self.path);
            }
        }

        let elapsed = now_ms.saturating_sub(self.started_ms);
        debug!(
            "Transfer of {} ended: {} bytes in {elapsed} ms",
            self.path, self.bytes
        );
        completion_reply(elapsed, self.bytes)
    }

    /// Aborts the transfer, closing the file.
    #[must_use]
    pub fn abort(self) -> Reply {
        warn!(
            "Transfer of {} aborted after {} bytes",
            self.path, self.bytes
        );
        Reply::new(426, "Transfer aborted")
    }
}

/// Builds the reply sent when a transfer ends.
///
/// The throughput is reported as bytes per millisecond, i.e. kbytes/s.
#[must_use]
pub fn completion_reply(elapsed_ms: u64, bytes: u64) -> Reply {
    if elapsed_ms > 0 && bytes > 0 {
        Reply::new(226, "File successfully transferred").line(format!(
            "{elapsed_ms} ms, {} kbytes/s",
            bytes / elapsed_ms
        ))
    } else {
        Reply::new(226, "File successfully transferred")
    }
}

#[cfg(test)]
mod tests {
    use std::vec;
    use std::vec::Vec;

    use crate::storage::{File, OpenMode, Storage};
    use crate::testing::{MemStorage, Peer};

    use super::{CHUNK_SIZE, Direction, Progress, Transfer, completion_reply};

    fn pattern(len: usize) -> Vec<u8> {
        (0..len).map(|i| (i % 251) as u8).collect()
    }

    #[test]
    fn retrieve_in_chunks() {
        let storage = MemStorage::new();
        let payload = pattern(CHUNK_SIZE * 2 + 10);
        storage.put_file("/a.bin", &payload);

        let (mut connection, peer) = Peer::pair();
        let file = storage.open("/a.bin", OpenMode::Read).unwrap();
        let mut transfer = Transfer::retrieve(file, "/a.bin", 0);
        assert_eq!(transfer.direction(), Direction::Retrieve);

        let mut buf = vec![0; CHUNK_SIZE];
        for _ in 0..3 {
            assert_eq!(
                transfer.step(&mut connection, &storage, &mut buf),
                Progress::Continue
            );
        }
        assert_eq!(
            transfer.step(&mut connection, &storage, &mut buf),
            Progress::Complete
        );
        assert_eq!(transfer.bytes(), payload.len() as u64);
        assert_eq!(peer.received(), payload);
    }

    #[test]
    fn store_until_peer_closes() {
        let storage = MemStorage::new();
        let payload = pattern(CHUNK_SIZE + 1);

        let (mut connection, peer) = Peer::pair();
        let file = storage.open("/up.bin", OpenMode::Write).unwrap();
        let mut transfer = Transfer::store(file, "/up.bin", 0);
        let mut buf = vec![0; CHUNK_SIZE];

        // Nothing sent yet: the transfer waits.
        assert_eq!(
            transfer.step(&mut connection, &storage, &mut buf),
            Progress::Continue
        );

        peer.send(&payload);
        peer.close();

        while transfer.step(&mut connection, &storage, &mut buf) == Progress::Continue {}
        let reply = transfer.finish(10);
        assert_eq!(reply.code(), 226);
        assert_eq!(storage.file("/up.bin").unwrap(), payload);
    }

    #[test]
    fn zero_byte_write_reopens() {
        let storage = MemStorage::new();
        let payload = pattern(100);

        let (mut connection, peer) = Peer::pair();
        let file = storage.open("/up.bin", OpenMode::Write).unwrap();
        let mut transfer = Transfer::store(file, "/up.bin", 0);
        let mut buf = vec![0; CHUNK_SIZE];

        peer.send(&payload[..50]);
        assert_eq!(
            transfer.step(&mut connection, &storage, &mut buf),
            Progress::Continue
        );

        storage.refuse_writes(2);
        peer.send(&payload[50..]);
        assert_eq!(
            transfer.step(&mut connection, &storage, &mut buf),
            Progress::Continue
        );

        peer.close();
        assert_eq!(
            transfer.step(&mut connection, &storage, &mut buf),
            Progress::Complete
        );
        assert_eq!(storage.file("/up.bin").unwrap(), payload);
    }

    #[test]
    fn zero_byte_write_gives_up() {
        let storage = MemStorage::new();
        let (mut connection, peer) = Peer::pair();
        let file = storage.open("/up.bin", OpenMode::Write).unwrap();
        let mut transfer = Transfer::store(file, "/up.bin", 0);
        let mut buf = vec![0; CHUNK_SIZE];

        storage.refuse_writes(usize::MAX);
        peer.send(b"data");
        match transfer.step(&mut connection, &storage, &mut buf) {
            Progress::Failed(reply) => assert_eq!(reply.code(), 451),
            progress => panic!("unexpected progress {progress:?}"),
        }
    }

    #[test]
    fn completion() {
        assert_eq!(
            completion_reply(50, 51_200).lines(),
            ["File successfully transferred", "50 ms, 1024 kbytes/s"]
        );
        assert_eq!(
            completion_reply(0, 51_200).lines(),
            ["File successfully transferred"]
        );
        assert_eq!(
            completion_reply(10, 0).lines(),
            ["File successfully transferred"]
        );
    }

    #[test]
    fn abort_closes_file() {
        let storage = MemStorage::new();
        storage.put_file("/a.bin", b"abc");
        let file = storage.open("/a.bin", OpenMode::Read).unwrap();
        assert_eq!(file.size(), 3);
        let transfer = Transfer::retrieve(file, "/a.bin", 0);
        assert_eq!(transfer.abort().code(), 426);
        assert_eq!(storage.open_files(), 0);
    }
}
