use std::io::{ErrorKind as IoErrorKind, Read, Write};
use std::net::{IpAddr, Ipv4Addr, Shutdown, SocketAddr, SocketAddrV4, TcpListener, TcpStream};
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use vigil::net::{Connection, Network};

use crate::error::{Result, network_error};

// Longest wait for a congested peer to accept more bytes.
const WRITE_TIMEOUT: Duration = Duration::from_secs(5);
const WRITE_RETRY: Duration = Duration::from_millis(1);

/// A non-blocking TCP connection.
#[derive(Debug)]
pub struct TcpConnection {
    stream: TcpStream,
    connected: bool,
}

impl TcpConnection {
    fn new(stream: TcpStream) -> std::io::Result<Self> {
        stream.set_nonblocking(true)?;
        stream.set_nodelay(true)?;
        Ok(Self {
            stream,
            connected: true,
        })
    }
}

impl Connection for TcpConnection {
    fn read(&mut self, buf: &mut [u8]) -> vigil::error::Result<usize> {
        if !self.connected {
            return Ok(0);
        }

        match self.stream.read(buf) {
            Ok(0) => {
                debug!("Peer closed the connection");
                self.connected = false;
                Ok(0)
            }
            Ok(n) => Ok(n),
            Err(e) if e.kind() == IoErrorKind::WouldBlock || e.kind() == IoErrorKind::Interrupted => {
                Ok(0)
            }
            Err(e) => {
                self.connected = false;
                Err(network_error(&e))
            }
        }
    }

    fn write_all(&mut self, mut bytes: &[u8]) -> vigil::error::Result<()> {
        let started = Instant::now();
        while !bytes.is_empty() {
            if !self.connected {
                return Err(vigil::error::Error::network("Connection closed"));
            }

            match self.stream.write(bytes) {
                Ok(0) => {
                    self.connected = false;
                    return Err(vigil::error::Error::network("Connection closed"));
                }
                Ok(n) => bytes = &bytes[n..],
                Err(e) if e.kind() == IoErrorKind::WouldBlock || e.kind() == IoErrorKind::Interrupted => {
                    if started.elapsed() > WRITE_TIMEOUT {
                        return Err(vigil::error::Error::network("Write timed out"));
                    }
                    std::thread::sleep(WRITE_RETRY);
                }
                Err(e) => {
                    self.connected = false;
                    return Err(network_error(&e));
                }
            }
        }
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected
    }

    fn close(&mut self) {
        if self.connected {
            if let Err(e) = self.stream.shutdown(Shutdown::Both) {
                debug!("Shutdown failed: {e}");
            }
            self.connected = false;
        }
    }
}

/// The two TCP listeners of the session.
#[derive(Debug)]
pub struct TcpNetwork {
    control: TcpListener,
    data: TcpListener,
    advertised: Option<Ipv4Addr>,
    last_local: Ipv4Addr,
}

impl TcpNetwork {
    /// Binds the control and data listeners on `address`.
    ///
    /// A port of zero picks a free port, see [`TcpNetwork::control_port`] and
    /// [`TcpNetwork::data_port`].
    ///
    /// # Errors
    ///
    /// Fails when a listener cannot be bound.
    pub fn bind(address: Ipv4Addr, control_port: u16, data_port: u16) -> Result<Self> {
        let control = TcpListener::bind(SocketAddrV4::new(address, control_port))?;
        control.set_nonblocking(true)?;
        let data = TcpListener::bind(SocketAddrV4::new(address, data_port))?;
        data.set_nonblocking(true)?;

        Ok(Self {
            control,
            data,
            advertised: None,
            last_local: if address.is_unspecified() {
                Ipv4Addr::LOCALHOST
            } else {
                address
            },
        })
    }

    /// Sets the address advertised in passive mode replies.
    #[must_use]
    pub fn advertised(mut self, address: Option<Ipv4Addr>) -> Self {
        self.advertised = address;
        self
    }

    /// Bound control channel port.
    ///
    /// # Errors
    ///
    /// Fails when the listener address cannot be retrieved.
    pub fn control_port(&self) -> Result<u16> {
        Ok(self.control.local_addr()?.port())
    }

    /// Bound data channel port.
    ///
    /// # Errors
    ///
    /// Fails when the listener address cannot be retrieved.
    pub fn data_port(&self) -> Result<u16> {
        Ok(self.data.local_addr()?.port())
    }

    fn accept(listener: &TcpListener, channel: &str) -> Option<(TcpConnection, SocketAddr)> {
        match listener.accept() {
            Ok((stream, peer)) => {
                let local = stream.local_addr().ok();
                match TcpConnection::new(stream) {
                    Ok(connection) => {
                        debug!("Accepted {channel} connection from {peer}");
                        local.map(|local| (connection, local))
                    }
                    Err(e) => {
                        warn!("Cannot configure {channel} connection from {peer}: {e}");
                        None
                    }
                }
            }
            Err(e) if e.kind() == IoErrorKind::WouldBlock => None,
            Err(e) => {
                warn!("Cannot accept {channel} connection: {e}");
                None
            }
        }
    }
}

impl Network for TcpNetwork {
    type Connection = TcpConnection;

    fn accept_control(&mut self) -> Option<TcpConnection> {
        let (connection, local) = Self::accept(&self.control, "control")?;
        if let IpAddr::V4(ip) = local.ip() {
            self.last_local = ip;
        }
        Some(connection)
    }

    fn accept_data(&mut self) -> Option<TcpConnection> {
        Self::accept(&self.data, "data").map(|(connection, _)| connection)
    }

    fn local_ip(&self) -> Ipv4Addr {
        self.advertised.unwrap_or(self.last_local)
    }
}
