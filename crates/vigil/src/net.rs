use core::net::Ipv4Addr;

use crate::error::Result;

/// A connected network peer.
///
/// Both channels of the session use this trait. Reads never block: a read
/// with nothing available returns `Ok(0)`, exactly as a read on a closed
/// connection does, so [`Connection::is_connected`] is the only way to tell
/// the two apart.
pub trait Connection {
    /// Reads the bytes available right now into `buf`.
    ///
    /// # Errors
    ///
    /// Fails when the underlying socket reports an error other than "no data
    /// yet".
    fn read(&mut self, buf: &mut [u8]) -> Result<usize>;

    /// Writes all of `bytes` to the peer.
    ///
    /// # Errors
    ///
    /// Fails when the peer is gone or the write cannot complete.
    fn write_all(&mut self, bytes: &[u8]) -> Result<()>;

    /// Whether the peer is still connected.
    fn is_connected(&self) -> bool;

    /// Closes the connection.
    fn close(&mut self);
}

/// The network stack used by the session.
///
/// It owns two listeners that live for the whole process: one for the
/// control channel and one for the passive data channel.
pub trait Network {
    /// Connection type produced by both listeners.
    type Connection: Connection;

    /// Accepts a pending control channel connection, if any.
    fn accept_control(&mut self) -> Option<Self::Connection>;

    /// Accepts a pending data channel connection, if any.
    fn accept_data(&mut self) -> Option<Self::Connection>;

    /// The IPv4 address advertised to clients in passive mode replies.
    fn local_ip(&self) -> Ipv4Addr;
}
