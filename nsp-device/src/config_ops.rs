//! Configuration write operations: each op starts from a snapshot of
//! the channel's current raw record, overlays the changed fields, rewrites
//! the header `type` to the scoped `CHANSETxxx` family, and returns the
//! wire bytes ready for `Transport::send`. `Device` owns the send/await
//! choreography; this module only knows how to build the packets.

use std::time::Duration;

use nsp_protocol::factory;
use nsp_protocol::header::{Header, WireVersion};
use nsp_protocol::packet::{Body, ChanInfo, Lnc};
use nsp_protocol::types::{AnaInpOpts, PacketType, CONFIGURATION_CHID};

use crate::mirror::ChannelRecord;

/// Settle delay pycbsdk inserts between the ainp-toggle write and the
/// subsequent smpgroup write (`time.sleep(0.005)` in `_set_channel_smpgroup`).
pub const SAMPLE_GROUP_SETTLE_DELAY: Duration = Duration::from_millis(5);

/// Default `smpfilter` selected per sample group, applied whenever a caller
/// writes `smpgroup` without separately choosing a filter.
pub fn default_smpfilter_for_group(group: u32) -> u32 {
    match group {
        1 => 5,
        2 => 6,
        3 => 7,
        4 => 10,
        _ => 0,
    }
}

// `chan` is carried in the body's `chan` field, not the header; the chid
// here just flags the datagram as a configuration packet.
fn encode_chaninfo_packet(pkt_type: PacketType, instrument: u8, info: ChanInfo, version: WireVersion) -> Vec<u8> {
    let header = Header { time: 0, chid: CONFIGURATION_CHID, pkt_type: pkt_type as u16, dlen: 0, instrument };
    factory::encode_packet(&header, version, &Body::ChanInfo(info))
}

/// Overlay applied to a channel's raw `ChanInfo` snapshot before it's sent
/// back out as a `CHANSETxxx` packet.
fn with_patched(mut record: ChannelRecord, patch: impl FnOnce(&mut ChanInfo)) -> ChanInfo {
    patch(&mut record.raw);
    record.raw
}

fn toggle_ainp_flag(ainpopts: u32, flag: u32, enable: bool) -> u32 {
    let cleared = ainpopts & !flag;
    cleared | if enable { flag } else { 0 }
}

macro_rules! set_field {
    ($dst:expr, $field:ident, $value:expr) => {
        match $dst {
            ChanInfo::V311(c) => c.$field = $value,
            ChanInfo::V41(c) => c.$field = $value,
        }
    };
}

fn get_ainpopts(info: &ChanInfo) -> u32 {
    info.ainpopts()
}

/// `CHANSETSMP`: sets `smpgroup` (and `smpfilter` to the group's default
/// unless the caller has already chosen one via `set_channel_sample_filter`).
/// Moving to/from group 6 also requires the companion
/// `CHANSETAINP` raw-stream toggle, built separately by
/// `set_channel_refelec_rawstream` and sent first by the caller with
/// `SAMPLE_GROUP_SETTLE_DELAY` between the two writes.
pub fn set_channel_sample_group(record: ChannelRecord, group: u32, instrument: u8, version: WireVersion) -> Vec<u8> {
    let info = with_patched(record, |raw| {
        set_field!(raw, smpgroup, group);
        set_field!(raw, smpfilter, default_smpfilter_for_group(group));
    });
    encode_chaninfo_packet(PacketType::ChanSetSmp, instrument, info, version)
}

/// `CHANSETSMP` reusing the same wire type but only touching `smpfilter`.
pub fn set_channel_sample_filter(record: ChannelRecord, smpfilter: u32, instrument: u8, version: WireVersion) -> Vec<u8> {
    let info = with_patched(record, |raw| set_field!(raw, smpfilter, smpfilter));
    encode_chaninfo_packet(PacketType::ChanSetSmp, instrument, info, version)
}

/// Sets or clears the `refelec_rawstream` ainp bit for groups 0, 5 and 6
/// only; every other group leaves the bit untouched and sends nothing.
pub fn set_channel_refelec_rawstream(record: ChannelRecord, group: u32, instrument: u8, version: WireVersion) -> Option<Vec<u8>> {
    let enable = match group {
        0 | 5 => false,
        6 => true,
        _ => return None,
    };
    let info = with_patched(record, |raw| {
        let current = get_ainpopts(raw);
        let next = toggle_ainp_flag(current, AnaInpOpts::REFELEC_RAWSTREAM.bits(), enable);
        set_field!(raw, ainpopts, next);
    });
    Some(encode_chaninfo_packet(PacketType::ChanSetAinp, instrument, info, version))
}

/// `CHANSETLABEL`.
pub fn set_channel_label(record: ChannelRecord, label: &str, instrument: u8, version: WireVersion) -> Vec<u8> {
    let mut bytes = [0u8; 16];
    let src = label.as_bytes();
    let n = src.len().min(16);
    bytes[..n].copy_from_slice(&src[..n]);
    let info = with_patched(record, |raw| set_field!(raw, label, bytes));
    encode_chaninfo_packet(PacketType::ChanSetLabel, instrument, info, version)
}

/// `CHANSETSPK`: spike extraction enable/filter selection.
pub fn set_channel_spike_filter(record: ChannelRecord, spkopts: u32, spkfilter: u32, instrument: u8, version: WireVersion) -> Vec<u8> {
    let info = with_patched(record, |raw| {
        set_field!(raw, spkopts, spkopts);
        set_field!(raw, spkfilter, spkfilter);
    });
    encode_chaninfo_packet(PacketType::ChanSetSpk, instrument, info, version)
}

/// `CHANSETAUTOTHRESHOLD`.
pub fn set_channel_auto_threshold(record: ChannelRecord, enable: bool, instrument: u8, version: WireVersion) -> Vec<u8> {
    use nsp_protocol::types::AInpSpk;
    let info = with_patched(record, |raw| {
        let current = match raw {
            ChanInfo::V311(c) => c.spkopts,
            ChanInfo::V41(c) => c.spkopts,
        };
        let next = toggle_ainp_flag(current, AInpSpk::THRAUTO.bits(), enable);
        set_field!(raw, spkopts, next);
    });
    encode_chaninfo_packet(PacketType::ChanSetAutoThreshold, instrument, info, version)
}

/// `CHANSETSPKTHR`.
pub fn set_channel_spike_threshold(record: ChannelRecord, spkthrlevel: i32, instrument: u8, version: WireVersion) -> Vec<u8> {
    let info = with_patched(record, |raw| set_field!(raw, spkthrlevel, spkthrlevel));
    encode_chaninfo_packet(PacketType::ChanSetSpkThr, instrument, info, version)
}

/// `CHANSETSPKHPS`: up to `MAX_UNITS` x `MAX_HOOPS` sort windows.
pub fn set_channel_hoops(
    record: ChannelRecord,
    spkhoops: [[nsp_protocol::types::Hoop; nsp_protocol::MAX_HOOPS]; nsp_protocol::MAX_UNITS],
    instrument: u8,
    version: WireVersion,
) -> Vec<u8> {
    let info = with_patched(record, |raw| set_field!(raw, spkhoops, spkhoops));
    encode_chaninfo_packet(PacketType::ChanSetSpkHps, instrument, info, version)
}

/// `CHANSETAINP`: LNC mode toggle via the 3-bit mask.
pub fn set_channel_lnc(record: ChannelRecord, enable: bool, instrument: u8, version: WireVersion) -> Vec<u8> {
    let info = with_patched(record, |raw| {
        let current = get_ainpopts(raw);
        let next = toggle_ainp_flag(current, AnaInpOpts::LNC_MASK.bits(), enable);
        set_field!(raw, ainpopts, next);
    });
    encode_chaninfo_packet(PacketType::ChanSetAinp, instrument, info, version)
}

/// `CHANSETAINP`: per-channel `lncrate` field (genuinely belongs on
/// `ChanInfo`, unlike the global LNC packet — see `set_global_lnc`).
pub fn set_channel_lnc_rate(record: ChannelRecord, lncrate: u32, instrument: u8, version: WireVersion) -> Vec<u8> {
    let info = with_patched(record, |raw| set_field!(raw, lncrate, lncrate));
    encode_chaninfo_packet(PacketType::ChanSetAinp, instrument, info, version)
}

/// `CHANSETAINP`: reference-electrode offset-correction bit.
pub fn set_channel_dc_offset(record: ChannelRecord, enable: bool, instrument: u8, version: WireVersion) -> Vec<u8> {
    let info = with_patched(record, |raw| {
        let current = get_ainpopts(raw);
        let next = toggle_ainp_flag(current, AnaInpOpts::REFELEC_OFFSETCORRECT.bits(), enable);
        set_field!(raw, ainpopts, next);
    });
    encode_chaninfo_packet(PacketType::ChanSetAinp, instrument, info, version)
}

/// `LNCSET`: a dedicated packet, NOT a `ChanInfo` overlay (Open Question 4
/// in the design ledger — the later reference revision builds this fresh).
pub fn set_global_lnc(freq: u32, refchan: u32, global_mode: u32, instrument: u8, version: WireVersion) -> Vec<u8> {
    let header = Header { time: 0, chid: CONFIGURATION_CHID, pkt_type: PacketType::LncSet as u16, dlen: 0, instrument };
    let body = Body::Lnc(Lnc { lnc_freq: freq, lnc_ref_chan: refchan, lnc_global_mode: global_mode });
    factory::encode_packet(&header, version, &body)
}

/// `CHANSETAOUT`.
pub fn set_channel_aout(record: ChannelRecord, aoutopts: u32, instrument: u8, version: WireVersion) -> Vec<u8> {
    let info = with_patched(record, |raw| set_field!(raw, aoutopts, aoutopts));
    encode_chaninfo_packet(PacketType::ChanSetAout, instrument, info, version)
}

/// `CHANSETDOUT`.
pub fn set_channel_dout(record: ChannelRecord, doutopts: u32, instrument: u8, version: WireVersion) -> Vec<u8> {
    let info = with_patched(record, |raw| set_field!(raw, doutopts, doutopts));
    encode_chaninfo_packet(PacketType::ChanSetDout, instrument, info, version)
}

/// `CHANSETDINP`.
pub fn set_channel_dinp(record: ChannelRecord, dinpopts: u32, instrument: u8, version: WireVersion) -> Vec<u8> {
    let info = with_patched(record, |raw| set_field!(raw, dinpopts, dinpopts));
    encode_chaninfo_packet(PacketType::ChanSetDinp, instrument, info, version)
}

/// `CHANSETSCALE`.
pub fn set_channel_scale(
    record: ChannelRecord,
    scalin: nsp_protocol::types::Scaling,
    scalout: nsp_protocol::types::Scaling,
    instrument: u8,
    version: WireVersion,
) -> Vec<u8> {
    let info = with_patched(record, |raw| {
        set_field!(raw, scalin, scalin);
        set_field!(raw, scalout, scalout);
    });
    encode_chaninfo_packet(PacketType::ChanSetScale, instrument, info, version)
}

#[cfg(test)]
mod tests {
    use super::*;
    use nsp_protocol::types::ChannelClass;

    fn record(chan: u32) -> ChannelRecord {
        let mut c: nsp_protocol::packet::ChanInfoV41 = bytemuck::Zeroable::zeroed();
        c.chan = chan;
        ChannelRecord { class: ChannelClass::AnalogIn, raw: ChanInfo::V41(c) }
    }

    #[test]
    fn sample_group_write_sets_default_filter() {
        let bytes = set_channel_sample_group(record(3), 2, 0, WireVersion::V4_1);
        let (header, _) = Header::decode(WireVersion::V4_1, &bytes).unwrap();
        assert_eq!(header.pkt_type, PacketType::ChanSetSmp as u16);
        assert!(header.is_configuration());

        let body_bytes = &bytes[WireVersion::V4_1.header_size()..];
        let body = factory::decode(&header, WireVersion::V4_1, None, body_bytes).unwrap();
        match body {
            Body::ChanInfo(ChanInfo::V41(c)) => {
                assert_eq!({ c.smpgroup }, 2);
                assert_eq!({ c.smpfilter }, 6);
            }
            _ => panic!("expected ChanInfo::V41"),
        }
    }

    #[test]
    fn refelec_rawstream_toggles_for_group_six() {
        let bytes = set_channel_refelec_rawstream(record(1), 6, 0, WireVersion::V4_1).expect("group 6 toggles");
        let (header, _) = Header::decode(WireVersion::V4_1, &bytes).unwrap();
        let body_bytes = &bytes[WireVersion::V4_1.header_size()..];
        let body = factory::decode(&header, WireVersion::V4_1, None, body_bytes).unwrap();
        match body {
            Body::ChanInfo(info) => assert_eq!(info.ainpopts() & AnaInpOpts::REFELEC_RAWSTREAM.bits(), AnaInpOpts::REFELEC_RAWSTREAM.bits()),
            _ => panic!("expected ChanInfo"),
        }
    }

    #[test]
    fn refelec_rawstream_untouched_for_non_boundary_groups() {
        for group in [1, 2, 3, 4] {
            assert!(
                set_channel_refelec_rawstream(record(1), group, 0, WireVersion::V4_1).is_none(),
                "group {group} should send no raw-stream toggle"
            );
        }
    }

    #[test]
    fn lnc_toggle_clears_before_setting() {
        let mut r = record(2);
        if let ChanInfo::V41(c) = &mut r.raw {
            c.ainpopts = AnaInpOpts::LNC_MASK.bits();
        }
        let bytes = set_channel_lnc(r, false, 0, WireVersion::V4_1);
        let (header, _) = Header::decode(WireVersion::V4_1, &bytes).unwrap();
        let body_bytes = &bytes[WireVersion::V4_1.header_size()..];
        let body = factory::decode(&header, WireVersion::V4_1, None, body_bytes).unwrap();
        match body {
            Body::ChanInfo(info) => assert_eq!(info.ainpopts() & AnaInpOpts::LNC_MASK.bits(), 0),
            _ => panic!("expected ChanInfo"),
        }
    }

    #[test]
    fn global_lnc_builds_dedicated_packet_not_chaninfo() {
        let bytes = set_global_lnc(60, 1, 1, 0, WireVersion::V4_1);
        let (header, _) = Header::decode(WireVersion::V4_1, &bytes).unwrap();
        assert_eq!(header.pkt_type, PacketType::LncSet as u16);
        let body_bytes = &bytes[WireVersion::V4_1.header_size()..];
        let body = factory::decode(&header, WireVersion::V4_1, None, body_bytes).unwrap();
        match body {
            Body::Lnc(lnc) => {
                assert_eq!({ lnc.lnc_freq }, 60);
                assert_eq!({ lnc.lnc_ref_chan }, 1);
            }
            _ => panic!("expected Lnc body"),
        }
    }
}
