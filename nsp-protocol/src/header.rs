use crate::error::PacketError;

/// Selects which of the three wire header encodings a transport speaks.
/// Fixed once per `Device`; 4.2+ firmware reuses the 4.1 header shape (only
/// `SysInfo`'s body grows a field), so there is no separate 4.2 variant here.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WireVersion {
    V3_11,
    V4_0,
    V4_1,
}

impl WireVersion {
    pub fn header_size(self) -> usize {
        match self {
            WireVersion::V3_11 => 8,
            WireVersion::V4_0 | WireVersion::V4_1 => 16,
        }
    }
}

/// Header fields normalized to a common shape regardless of wire version.
/// `instrument`/`reserved` are absent on the wire in v3.11 and read back as 0.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Header {
    pub time: u64,
    pub chid: u16,
    pub pkt_type: u16,
    pub dlen: u16,
    pub instrument: u8,
}

impl Header {
    pub fn is_configuration(&self) -> bool {
        self.chid & 0x8000 != 0
    }

    pub fn is_group(&self) -> bool {
        self.chid == 0
    }

    pub fn decode(version: WireVersion, bytes: &[u8]) -> Result<(Header, usize), PacketError> {
        let size = version.header_size();
        if bytes.len() < size {
            return Err(PacketError::TruncatedDatagram);
        }

        let header = match version {
            WireVersion::V3_11 => {
                let time = u32::from_le_bytes(bytes[0..4].try_into().unwrap()) as u64;
                let chid = u16::from_le_bytes(bytes[4..6].try_into().unwrap());
                let pkt_type = bytes[6] as u16;
                let dlen = bytes[7] as u16;
                Header { time, chid, pkt_type, dlen, instrument: 0 }
            }
            WireVersion::V4_0 => {
                let time = u64::from_le_bytes(bytes[0..8].try_into().unwrap());
                let chid = u16::from_le_bytes(bytes[8..10].try_into().unwrap());
                let pkt_type = bytes[10] as u16;
                let dlen = u16::from_le_bytes(bytes[11..13].try_into().unwrap());
                let instrument = bytes[13];
                Header { time, chid, pkt_type, dlen, instrument }
            }
            WireVersion::V4_1 => {
                let time = u64::from_le_bytes(bytes[0..8].try_into().unwrap());
                let chid = u16::from_le_bytes(bytes[8..10].try_into().unwrap());
                let pkt_type = u16::from_le_bytes(bytes[10..12].try_into().unwrap());
                let dlen = u16::from_le_bytes(bytes[12..14].try_into().unwrap());
                let instrument = bytes[14];
                Header { time, chid, pkt_type, dlen, instrument }
            }
        };

        Ok((header, size))
    }

    pub fn encode(&self, version: WireVersion, out: &mut Vec<u8>) {
        match version {
            WireVersion::V3_11 => {
                out.extend_from_slice(&(self.time as u32).to_le_bytes());
                out.extend_from_slice(&self.chid.to_le_bytes());
                out.push(self.pkt_type as u8);
                out.push(self.dlen as u8);
            }
            WireVersion::V4_0 => {
                out.extend_from_slice(&self.time.to_le_bytes());
                out.extend_from_slice(&self.chid.to_le_bytes());
                out.push(self.pkt_type as u8);
                out.extend_from_slice(&self.dlen.to_le_bytes());
                out.push(self.instrument);
                out.push(0);
            }
            WireVersion::V4_1 => {
                out.extend_from_slice(&self.time.to_le_bytes());
                out.extend_from_slice(&self.chid.to_le_bytes());
                out.extend_from_slice(&self.pkt_type.to_le_bytes());
                out.extend_from_slice(&self.dlen.to_le_bytes());
                out.push(self.instrument);
                out.push(0);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn v311_round_trip() {
        let header = Header { time: 12345, chid: 7, pkt_type: 0x40, dlen: 3, instrument: 0 };
        let mut buf = Vec::new();
        header.encode(WireVersion::V3_11, &mut buf);
        assert_eq!(buf.len(), 8);
        let (decoded, consumed) = Header::decode(WireVersion::V3_11, &buf).unwrap();
        assert_eq!(consumed, 8);
        assert_eq!(decoded, header);
    }

    #[test]
    fn v41_round_trip_wide_type() {
        let header = Header { time: u64::MAX, chid: 0x8000, pkt_type: 0x1234, dlen: 99, instrument: 2 };
        let mut buf = Vec::new();
        header.encode(WireVersion::V4_1, &mut buf);
        assert_eq!(buf.len(), 16);
        let (decoded, _) = Header::decode(WireVersion::V4_1, &buf).unwrap();
        assert_eq!(decoded, header);
        assert!(decoded.is_configuration());
    }

    #[test]
    fn v311_decodes_literal_wire_bytes() {
        let buf = [0x01, 0x00, 0x00, 0x00, 0x02, 0x00, 0x03, 0x04];
        let (decoded, consumed) = Header::decode(WireVersion::V3_11, &buf).unwrap();
        assert_eq!(consumed, 8);
        assert_eq!(decoded, Header { time: 1, chid: 2, pkt_type: 3, dlen: 4, instrument: 0 });
    }

    #[test]
    fn truncated_header_errs() {
        let buf = [0u8; 4];
        assert!(matches!(
            Header::decode(WireVersion::V4_1, &buf),
            Err(PacketError::TruncatedDatagram)
        ));
    }
}
