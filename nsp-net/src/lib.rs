pub mod queue;
pub mod socket;
pub mod transport;

pub use socket::{
    TransportConfig, TransportError, DATAGRAM_MAX_SIZE, DEFAULT_INST_PORT, DEFAULT_RECV_BUFSIZE, LEGACY_INST_PORT,
};
pub use transport::Transport;
