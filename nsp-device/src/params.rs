use std::net::{Ipv4Addr, SocketAddrV4};

use nsp_protocol::header::WireVersion;

/// Connection parameters. Address resolution (network-adapter discovery,
/// ICMP probing for a reachable instrument) is explicitly out of scope here
/// — a caller that doesn't already know its client/instrument address
/// supplies one itself, or constructs `Params` via a separate collaborator
/// that does.
#[derive(Debug, Clone, Copy)]
pub struct Params {
    pub client_addr: Ipv4Addr,
    pub client_port: u16,
    pub inst_addr: Ipv4Addr,
    pub inst_port: u16,
    pub recv_bufsize: usize,
    pub wire_version: WireVersion,
    pub broadcast: bool,
}

impl Params {
    pub fn new(client_addr: Ipv4Addr, inst_addr: Ipv4Addr) -> Self {
        Params {
            client_addr,
            client_port: nsp_net::DEFAULT_INST_PORT,
            inst_addr,
            inst_port: nsp_net::DEFAULT_INST_PORT,
            recv_bufsize: nsp_net::DEFAULT_RECV_BUFSIZE,
            wire_version: WireVersion::V4_1,
            broadcast: false,
        }
    }

    pub fn legacy_port(mut self) -> Self {
        self.inst_port = nsp_net::LEGACY_INST_PORT;
        self.client_port = nsp_net::LEGACY_INST_PORT;
        self
    }

    pub fn transport_config(&self) -> nsp_net::TransportConfig {
        nsp_net::TransportConfig {
            local: SocketAddrV4::new(self.client_addr, self.client_port),
            remote: SocketAddrV4::new(self.inst_addr, self.inst_port),
            recv_bufsize: self.recv_bufsize,
            wire_version: self.wire_version,
            broadcast: self.broadcast,
        }
    }
}
