//! TCP side channel for exchanging connection and region descriptors.
//!
//! Runs once at setup time, before any data-plane traffic, so it uses plain
//! blocking sockets. The wire format is length-prefixed blobs: a 32-bit
//! little-endian byte count followed by the payload. Both peers send before
//! they receive; blobs are bounded well below socket buffer sizes, so the
//! symmetric exchange cannot deadlock.

use std::error::Error;
use std::fmt;
use std::io::{self, Read, Write};
use std::net::{TcpListener, TcpStream, ToSocketAddrs};

use tracing::info;

use super::{DescriptorError, ExportDescriptor};

/// Largest accepted blob. Descriptors are tens of bytes; anything near this
/// limit is a corrupt or hostile peer.
pub const MAX_BLOB_LEN: usize = 1 << 20;

/// Bootstrap failure: connection setup or descriptor exchange.
#[derive(Debug)]
pub enum BootstrapError {
    Io(io::Error),
    /// A blob exceeded [`MAX_BLOB_LEN`] (ours outbound or the peer's inbound).
    BlobTooLarge { len: usize },
    /// The peer sent a structurally invalid export descriptor.
    BadDescriptor(DescriptorError),
}

impl fmt::Display for BootstrapError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BootstrapError::Io(err) => write!(f, "bootstrap I/O failed: {err}"),
            BootstrapError::BlobTooLarge { len } => {
                write!(f, "descriptor blob of {len} bytes exceeds {MAX_BLOB_LEN}")
            }
            BootstrapError::BadDescriptor(err) => write!(f, "bad export descriptor: {err}"),
        }
    }
}

impl Error for BootstrapError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            BootstrapError::Io(err) => Some(err),
            BootstrapError::BadDescriptor(err) => Some(err),
            BootstrapError::BlobTooLarge { .. } => None,
        }
    }
}

impl From<io::Error> for BootstrapError {
    fn from(err: io::Error) -> Self {
        BootstrapError::Io(err)
    }
}

impl From<DescriptorError> for BootstrapError {
    fn from(err: DescriptorError) -> Self {
        BootstrapError::BadDescriptor(err)
    }
}

/// One bootstrap connection between two peers.
pub struct Bootstrap {
    stream: TcpStream,
}

impl Bootstrap {
    /// Connects to a listening peer.
    pub fn connect(addr: impl ToSocketAddrs + fmt::Debug) -> Result<Self, BootstrapError> {
        let stream = TcpStream::connect(&addr)?;
        stream.set_nodelay(true)?;
        info!(?addr, "bootstrap connected");
        Ok(Self { stream })
    }

    /// Listens on `port` (all interfaces) and accepts a single peer.
    pub fn accept(port: u16) -> Result<Self, BootstrapError> {
        let listener = TcpListener::bind(("0.0.0.0", port))?;
        info!(port, "bootstrap listening");
        let (stream, peer) = listener.accept()?;
        stream.set_nodelay(true)?;
        info!(%peer, "bootstrap accepted");
        Ok(Self { stream })
    }

    /// Sends one length-prefixed blob.
    pub fn send_blob(&mut self, blob: &[u8]) -> Result<(), BootstrapError> {
        if blob.len() > MAX_BLOB_LEN {
            return Err(BootstrapError::BlobTooLarge { len: blob.len() });
        }
        let len = blob.len() as u32;
        self.stream.write_all(&len.to_le_bytes())?;
        self.stream.write_all(blob)?;
        Ok(())
    }

    /// Receives one length-prefixed blob.
    pub fn recv_blob(&mut self) -> Result<Vec<u8>, BootstrapError> {
        let mut len_bytes = [0u8; 4];
        self.stream.read_exact(&mut len_bytes)?;
        let len = u32::from_le_bytes(len_bytes) as usize;
        if len > MAX_BLOB_LEN {
            return Err(BootstrapError::BlobTooLarge { len });
        }
        let mut blob = vec![0u8; len];
        self.stream.read_exact(&mut blob)?;
        Ok(blob)
    }

    /// Symmetric exchange: sends ours, then receives the peer's.
    pub fn exchange_blob(&mut self, ours: &[u8]) -> Result<Vec<u8>, BootstrapError> {
        self.send_blob(ours)?;
        self.recv_blob()
    }

    /// Exchanges export descriptors for one symmetric region pair.
    pub fn exchange_region(
        &mut self,
        ours: &ExportDescriptor,
    ) -> Result<ExportDescriptor, BootstrapError> {
        let blob = self.exchange_blob(&ours.encode())?;
        let theirs = ExportDescriptor::decode(&blob)?;
        info!(
            addr = format_args!("{:#x}", theirs.addr),
            len = theirs.len,
            "imported peer region descriptor"
        );
        Ok(theirs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::AccessFlags;
    use std::net::TcpListener;
    use std::thread;

    /// Bind port 0 to get a free port, then race-free connect/accept.
    fn local_pair() -> (Bootstrap, Bootstrap) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let client = thread::spawn(move || Bootstrap::connect(addr).unwrap());
        let (stream, _) = listener.accept().unwrap();
        stream.set_nodelay(true).unwrap();
        let server = Bootstrap { stream };
        (server, client.join().unwrap())
    }

    #[test]
    fn blob_roundtrip() {
        let (mut server, mut client) = local_pair();
        let handle = thread::spawn(move || {
            let got = client.exchange_blob(b"client-descriptor").unwrap();
            assert_eq!(got, b"server-descriptor");
        });
        let got = server.exchange_blob(b"server-descriptor").unwrap();
        assert_eq!(got, b"client-descriptor");
        handle.join().unwrap();
    }

    #[test]
    fn region_descriptor_roundtrip() {
        let (mut server, mut client) = local_pair();
        let server_desc = ExportDescriptor {
            addr: 0x1000,
            len: 4096,
            flags: AccessFlags::FULL,
        };
        let client_desc = ExportDescriptor {
            addr: 0x2000,
            len: 4096,
            flags: AccessFlags::REMOTE_WRITE,
        };

        let handle = thread::spawn(move || client.exchange_region(&client_desc).unwrap());
        let got_on_server = server.exchange_region(&server_desc).unwrap();
        let got_on_client = handle.join().unwrap();

        assert_eq!(got_on_server, client_desc);
        assert_eq!(got_on_client, server_desc);
    }

    #[test]
    fn oversized_blob_is_refused_before_sending() {
        let (mut server, _client) = local_pair();
        let huge = vec![0u8; MAX_BLOB_LEN + 1];
        let err = server.send_blob(&huge).unwrap_err();
        assert!(matches!(err, BootstrapError::BlobTooLarge { .. }));
    }

    #[test]
    fn truncated_peer_surfaces_io_error() {
        let (mut server, client) = local_pair();
        drop(client);
        let err = server.recv_blob().unwrap_err();
        assert!(matches!(err, BootstrapError::Io(_)));
    }
}
