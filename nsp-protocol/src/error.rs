use thiserror::Error;

#[derive(Debug, Error)]
pub enum PacketError {
    #[error("no packet body registered for chid {chid:#06x} type {pkt_type:#06x}")]
    UnknownPacket { chid: u16, pkt_type: u16 },

    #[error("datagram ended mid-header or mid-body")]
    TruncatedDatagram,

    #[error("header claims wire version incompatible with this decoder")]
    WireVersionMismatch,
}
