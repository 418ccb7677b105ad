use std::io;
use std::net::{SocketAddrV4, UdpSocket};
use std::os::fd::AsFd;

use nix::poll::{PollFd, PollFlags, PollTimeout};
use socket2::{Domain, Socket as Socket2, Type};
use thiserror::Error;

use nsp_protocol::header::{Header, WireVersion};

#[cfg(windows)]
pub const DEFAULT_RECV_BUFSIZE: usize = 8 * 1024 * 1024;
#[cfg(not(windows))]
pub const DEFAULT_RECV_BUFSIZE: usize = 6 * 1024 * 1024;

/// Per-`recvfrom` scratch buffer size. A single UDP datagram concatenates
/// several whole packets back to back (`split_datagram` below), so this must
/// cover the largest datagram the instrument ever sends in one call, not just
/// `nsp_protocol::PKT_MAX_SIZE`'s single-packet bound — sized to the largest
/// UDP payload a non-jumbo Ethernet path can deliver.
pub const DATAGRAM_MAX_SIZE: usize = 65_507;

pub const DEFAULT_INST_PORT: u16 = 51002;
pub const LEGACY_INST_PORT: u16 = 51001;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("creating socket: {0}")]
    Socket(io::Error),
    #[error("setting SO_REUSEADDR: {0}")]
    SetReuseAddr(io::Error),
    #[error("setting SO_BROADCAST: {0}")]
    SetBroadcast(io::Error),
    #[error("setting SO_RCVBUF: {0}")]
    SetRecvBuffer(io::Error),
    #[error("setting SO_DONTROUTE: {0}")]
    SetDontRoute(io::Error),
    #[error("binding {0}: {1}")]
    Bind(SocketAddrV4, io::Error),
    #[error("connecting to {0}: {1}")]
    Connect(SocketAddrV4, io::Error),
    #[error("transport queue disconnected")]
    Closed,
}

#[derive(Debug, Clone, Copy)]
pub struct TransportConfig {
    pub local: SocketAddrV4,
    pub remote: SocketAddrV4,
    pub recv_bufsize: usize,
    pub wire_version: WireVersion,
    pub broadcast: bool,
}

/// A bound, connected UDP socket speaking to a single NSP instrument.
pub struct Socket {
    inner: UdpSocket,
    remote: SocketAddrV4,
}

impl Socket {
    pub fn open(config: &TransportConfig) -> Result<Socket, TransportError> {
        let socket = Socket2::new(Domain::IPV4, Type::DGRAM, None).map_err(TransportError::Socket)?;

        socket.set_reuse_address(true).map_err(TransportError::SetReuseAddr)?;

        if config.broadcast {
            socket.set_broadcast(true).map_err(TransportError::SetBroadcast)?;
        }

        socket
            .set_recv_buffer_size(config.recv_bufsize)
            .map_err(TransportError::SetRecvBuffer)?;

        if let Err(err) = set_dont_route(&socket) {
            log::warn!("failed to set SO_DONTROUTE: {err:?}");
        }

        socket
            .bind(&config.local.into())
            .map_err(|e| TransportError::Bind(config.local, e))?;

        let inner: UdpSocket = socket.into();

        Ok(Socket { inner, remote: config.remote })
    }

    pub fn send(&self, bytes: &[u8]) -> Result<(), io::Error> {
        self.inner.send_to(bytes, self.remote)?;
        Ok(())
    }

    pub fn recv(&self, buf: &mut [u8]) -> Result<usize, io::Error> {
        let mut poll = [PollFd::new(self.inner.as_fd(), PollFlags::POLLIN)];
        nix::poll::poll(&mut poll, PollTimeout::NONE)?;
        self.inner.recv(buf)
    }

    /// Unblocks a thread parked in `recv`'s `poll` without needing every
    /// `Arc<Socket>` clone dropped first (the receive thread holds one of
    /// its own). `shutdown(2)` on a connectionless socket still wakes a
    /// blocked `poll`/`recv` with an error on Linux, which is all `close()`
    /// needs to make the receive thread observe the transport closing.
    #[cfg(unix)]
    pub fn shutdown(&self) {
        use std::os::fd::AsRawFd;
        let rc = unsafe { libc::shutdown(self.inner.as_raw_fd(), libc::SHUT_RDWR) };
        if rc != 0 {
            log::debug!("socket shutdown: {}", io::Error::last_os_error());
        }
    }

    #[cfg(not(unix))]
    pub fn shutdown(&self) {}
}

#[cfg(unix)]
fn set_dont_route(socket: &Socket2) -> Result<(), io::Error> {
    use std::os::fd::AsRawFd;
    let fd = socket.as_raw_fd();
    let optval: libc::c_int = 1;
    let rc = unsafe {
        libc::setsockopt(
            fd,
            libc::SOL_SOCKET,
            libc::SO_DONTROUTE,
            &optval as *const _ as *const libc::c_void,
            std::mem::size_of::<libc::c_int>() as libc::socklen_t,
        )
    };
    if rc != 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}

#[cfg(not(unix))]
fn set_dont_route(_socket: &Socket2) -> Result<(), io::Error> {
    Ok(())
}

/// Slices a single datagram into its constituent packets: the firmware
/// concatenates several fixed/variable packets back to back inside one UDP
/// payload, each prefixed by its own header.
pub fn split_datagram(
    version: WireVersion,
    datagram: &[u8],
) -> Vec<(Header, Vec<u8>)> {
    let mut out = Vec::new();
    let mut offset = 0;

    while offset < datagram.len() {
        let Ok((header, header_len)) = Header::decode(version, &datagram[offset..]) else {
            break;
        };

        let body_len = 4 * header.dlen as usize;
        let total = header_len + body_len;

        if offset + total > datagram.len() {
            log::debug!("discarding truncated tail packet ({} of {} bytes available)",
                datagram.len() - offset, total);
            break;
        }

        let body = datagram[offset + header_len..offset + total].to_vec();
        out.push((header, body));
        offset += total;
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_two_concatenated_packets() {
        let h1 = Header { time: 1, chid: 0, pkt_type: 6, dlen: 1, instrument: 0 };
        let h2 = Header { time: 2, chid: 5, pkt_type: 0x40, dlen: 0, instrument: 0 };

        let mut datagram = Vec::new();
        h1.encode(WireVersion::V4_1, &mut datagram);
        datagram.extend_from_slice(&[1, 2, 3, 4]);
        h2.encode(WireVersion::V4_1, &mut datagram);

        let packets = split_datagram(WireVersion::V4_1, &datagram);
        assert_eq!(packets.len(), 2);
        assert_eq!(packets[0].0.time, 1);
        assert_eq!(packets[0].1, vec![1, 2, 3, 4]);
        assert_eq!(packets[1].0.chid, 5);
        assert!(packets[1].1.is_empty());
    }

    #[test]
    fn truncated_tail_discarded() {
        let h1 = Header { time: 1, chid: 0, pkt_type: 6, dlen: 5, instrument: 0 };
        let mut datagram = Vec::new();
        h1.encode(WireVersion::V4_1, &mut datagram);
        datagram.extend_from_slice(&[0u8; 4]); // claims dlen=5 (20 bytes) but only 4 present

        let packets = split_datagram(WireVersion::V4_1, &datagram);
        assert!(packets.is_empty());
    }
}
