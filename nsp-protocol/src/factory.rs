//! Packet factory: header + raw body bytes -> typed `Body`, and back.
//!
//! Dispatch order mirrors `CBPacketFactory.make_packet`: configuration
//! packets (`chid & 0x8000`) resolve by exact `type`, then by
//! `type & 0xF0` family, then fall back to `Generic`. Sample-group packets
//! (`chid == 0`, `type > 0`) resolve by group id. Everything else is a
//! per-channel event and needs a classification hint from the caller (the
//! protocol layer alone cannot tell a front-end spike channel from an audio
//! output channel; `nsp-device` supplies that from its channel table).
//!
//! `[CBPacketType.FILTREP, CBPacketType.FILTSET]` are registered against
//! `FiltInfo` here, not `GroupInfo` — the source registry maps them to the
//! group-info class, which has a different field layout than a filter
//! record and cannot be the intended target.

use crate::header::{Header, WireVersion};
use crate::packet::*;
use crate::types::ChannelClass;
use crate::PacketError;

pub fn decode(
    header: &Header,
    version: WireVersion,
    class_hint: Option<ChannelClass>,
    bytes: &[u8],
) -> Result<Body, PacketError> {
    if header.is_configuration() {
        return decode_configuration(header, version, bytes);
    }

    if header.is_group() {
        return Ok(if header.pkt_type > 0 {
            Body::SampleGroup(decode_sample_group(bytes))
        } else {
            Body::Generic(Generic { words: vec![] })
        });
    }

    // per-channel event packet; disambiguate using the caller's class hint
    match class_hint {
        Some(ChannelClass::FrontEnd) => Ok(Body::SpikeEvent(decode_spike_event(bytes))),
        Some(ChannelClass::AnalogIn) | Some(ChannelClass::Audio) => {
            Ok(Body::SampleGroup(decode_sample_group(bytes)))
        }
        _ => Ok(Body::Generic(decode_generic(bytes))),
    }
}

fn decode_configuration(header: &Header, version: WireVersion, bytes: &[u8]) -> Result<Body, PacketError> {
    let exact = header.pkt_type;

    match exact {
        // All SYSREP/SYSSET sub-variants (plain, spklen, runlevel, transport)
        // share the SysInfo body shape; only the sub-code in `type` differs.
        0x10..=0x13 | 0x90..=0x93 => {
            if bytes.len() >= core::mem::size_of::<SysInfoV42>() {
                Ok(Body::SysInfoV42(pod_from_bytes(bytes)))
            } else {
                Ok(Body::SysInfo(pod_from_bytes(bytes)))
            }
        }
        0x01 => {
            if version == WireVersion::V3_11 {
                Ok(Body::SysProtocolMonitorV311(pod_from_bytes(bytes)))
            } else {
                Ok(Body::SysProtocolMonitorV41(pod_from_bytes(bytes)))
            }
        }
        0x21 => Ok(Body::ProcInfo(pod_from_bytes(bytes))),
        0x22 => Ok(Body::BankInfo(pod_from_bytes(bytes))),
        0x23 | 0xA3 => Ok(Body::FiltInfo(pod_from_bytes(bytes))),
        0x27 | 0xA7 => Ok(Body::NTrodeInfo(pod_from_bytes(bytes))),
        0x25 | 0xA5 => Ok(Body::AdaptFiltInfo(pod_from_bytes(bytes))),
        0x26 | 0xA6 => Ok(Body::RefElecFiltInfo(pod_from_bytes(bytes))),
        0x28 | 0xA8 => Ok(Body::Lnc(pod_from_bytes(bytes))),
        0x30 | 0xB0 => Ok(Body::GroupInfo(decode_group_info(bytes))),
        0x31 | 0xB1 => {
            if version == WireVersion::V3_11 {
                Ok(Body::Comment(decode_comment_v311(bytes)))
            } else {
                Ok(Body::CommentV40(decode_comment_v40(bytes)))
            }
        }
        0x5C | 0xDC => Ok(Body::NPlay(decode_nplay(bytes, version))),
        0x5D | 0xDD => Ok(Body::SetDout(pod_from_bytes(bytes))),
        0x5F | 0xDF => Ok(Body::VideoTrack(decode_video_track(bytes))),
        0x29 | 0xA9 => Ok(Body::VideoSynch(pod_from_bytes(bytes))),
        0x61 | 0xE1 => Ok(Body::FileCfg(decode_file_cfg(bytes))),
        0x63 | 0xE3 => Ok(Body::Log(decode_log(bytes))),
        0x40..=0x4F | 0xC0..=0xCF => Ok(Body::ChanInfo(decode_chan_info(bytes, version))),
        0x50..=0x57 | 0xD0..=0xD7 => Ok(Body::Generic(decode_generic(bytes))),
        0x08 | 0x88 => Ok(Body::Generic(Generic { words: vec![] })),
        _ => {
            // family fallback: type & 0xF0
            match exact & 0xF0 {
                0x40 | 0xC0 => Ok(Body::ChanInfo(decode_chan_info(bytes, version))),
                _ => Ok(Body::Generic(decode_generic(bytes))),
            }
        }
    }
}

fn decode_chan_info(bytes: &[u8], version: WireVersion) -> ChanInfo {
    if version == WireVersion::V4_1 {
        ChanInfo::V41(pod_from_bytes(bytes))
    } else {
        ChanInfo::V311(pod_from_bytes(bytes))
    }
}

fn decode_group_info(bytes: &[u8]) -> GroupInfo {
    let fixed_size = core::mem::size_of::<GroupInfoFixed>();
    let fixed: GroupInfoFixed = pod_from_bytes(bytes);
    let tail = bytes.get(fixed_size..).unwrap_or(&[]);
    let mut chans: Vec<u16> = tail
        .chunks_exact(2)
        .map(|c| u16::from_le_bytes([c[0], c[1]]))
        .collect();
    chans.truncate(GroupInfo::MAX_ELEMENTS);

    GroupInfo {
        proc: fixed.proc,
        group: fixed.group,
        label: fixed.label,
        period: fixed.period,
        length: fixed.length,
        chans,
    }
}

fn decode_file_cfg(bytes: &[u8]) -> FileCfg {
    let header_size = 4 + 4 + 1 + 1;
    let options = u32::from_le_bytes(zero_pad::<4>(bytes.get(0..4).unwrap_or(&[])));
    let duration = u32::from_le_bytes(zero_pad::<4>(bytes.get(4..8).unwrap_or(&[])));
    let recording = *bytes.get(8).unwrap_or(&0);
    let extctrl = *bytes.get(9).unwrap_or(&0);
    let mut data = bytes.get(header_size..).unwrap_or(&[]).to_vec();
    data.truncate(FileCfg::MAX_ELEMENTS);
    FileCfg { options, duration, recording, extctrl, data }
}

fn decode_video_track(bytes: &[u8]) -> VideoTrack {
    let parent_id = u16::from_le_bytes(zero_pad::<2>(bytes.get(0..2).unwrap_or(&[])));
    let node_count = u16::from_le_bytes(zero_pad::<2>(bytes.get(2..4).unwrap_or(&[])));
    let node_id = u16::from_le_bytes(zero_pad::<2>(bytes.get(4..6).unwrap_or(&[])));
    let node_count_type = u16::from_le_bytes(zero_pad::<2>(bytes.get(6..8).unwrap_or(&[])));
    let max_zone_dim = u16::from_le_bytes(zero_pad::<2>(bytes.get(8..10).unwrap_or(&[])));
    let mut points: Vec<u16> = bytes
        .get(10..)
        .unwrap_or(&[])
        .chunks_exact(2)
        .map(|c| u16::from_le_bytes([c[0], c[1]]))
        .collect();
    points.truncate(VideoTrack::MAX_ELEMENTS);
    VideoTrack { parent_id, node_count, node_id, node_count_type, max_zone_dim, points }
}

fn decode_log(bytes: &[u8]) -> Log {
    let mode = *bytes.get(0).unwrap_or(&0);
    let severity = *bytes.get(1).unwrap_or(&0);
    let name = zero_pad::<16>(bytes.get(2..18).unwrap_or(&[]));
    let mut desc = bytes.get(18..).unwrap_or(&[]).to_vec();
    desc.truncate(Log::MAX_ELEMENTS);
    Log { mode, severity, name, desc }
}

fn decode_comment_v311(bytes: &[u8]) -> Comment {
    let charset = *bytes.get(0).unwrap_or(&0);
    let flags = *bytes.get(1).unwrap_or(&0);
    let data = u32::from_le_bytes(zero_pad::<4>(bytes.get(4..8).unwrap_or(&[])));
    let mut text = bytes.get(8..).unwrap_or(&[]).to_vec();
    text.truncate(Comment::MAX_ELEMENTS);
    Comment { charset, flags, data, text }
}

fn decode_comment_v40(bytes: &[u8]) -> CommentV40 {
    let charset = *bytes.get(0).unwrap_or(&0);
    let flags = *bytes.get(1).unwrap_or(&0);
    let time_started = u64::from_le_bytes(zero_pad::<8>(bytes.get(4..12).unwrap_or(&[])));
    let rgba = u32::from_le_bytes(zero_pad::<4>(bytes.get(12..16).unwrap_or(&[])));
    let mut text = bytes.get(16..).unwrap_or(&[]).to_vec();
    text.truncate(CommentV40::MAX_ELEMENTS);
    CommentV40 { charset, flags, time_started, rgba, text }
}

fn decode_nplay(bytes: &[u8], version: WireVersion) -> NPlay {
    let (ftime, stime, etime, rest_off) = if version == WireVersion::V3_11 {
        let ftime = u32::from_le_bytes(zero_pad::<4>(bytes.get(0..4).unwrap_or(&[]))) as u64;
        let stime = u32::from_le_bytes(zero_pad::<4>(bytes.get(4..8).unwrap_or(&[]))) as u64;
        let etime = u32::from_le_bytes(zero_pad::<4>(bytes.get(8..12).unwrap_or(&[]))) as u64;
        (ftime, stime, etime, 12)
    } else {
        let ftime = u64::from_le_bytes(zero_pad::<8>(bytes.get(0..8).unwrap_or(&[])));
        let stime = u64::from_le_bytes(zero_pad::<8>(bytes.get(8..16).unwrap_or(&[])));
        let etime = u64::from_le_bytes(zero_pad::<8>(bytes.get(16..24).unwrap_or(&[])));
        (ftime, stime, etime, 24)
    };
    let val = u32::from_le_bytes(zero_pad::<4>(bytes.get(rest_off..rest_off + 4).unwrap_or(&[])));
    let mode = u16::from_le_bytes(zero_pad::<2>(bytes.get(rest_off + 4..rest_off + 6).unwrap_or(&[])));
    let flags = u16::from_le_bytes(zero_pad::<2>(bytes.get(rest_off + 6..rest_off + 8).unwrap_or(&[])));
    let speed = f32::from_le_bytes(zero_pad::<4>(bytes.get(rest_off + 8..rest_off + 12).unwrap_or(&[])));
    let mut fname = bytes.get(rest_off + 12..).unwrap_or(&[]).to_vec();
    fname.truncate(NPlay::MAX_ELEMENTS);
    NPlay { ftime, stime, etime, val, mode, flags, speed, fname }
}

fn decode_spike_event(bytes: &[u8]) -> SpikeEvent {
    let fpattern = [
        f32::from_le_bytes(zero_pad::<4>(bytes.get(0..4).unwrap_or(&[]))),
        f32::from_le_bytes(zero_pad::<4>(bytes.get(4..8).unwrap_or(&[]))),
        f32::from_le_bytes(zero_pad::<4>(bytes.get(8..12).unwrap_or(&[]))),
    ];
    let unit = *bytes.get(12).unwrap_or(&0);
    let mut waveform: Vec<i16> = bytes
        .get(16..)
        .unwrap_or(&[])
        .chunks_exact(2)
        .map(|c| i16::from_le_bytes([c[0], c[1]]))
        .collect();
    waveform.truncate(SpikeEvent::MAX_ELEMENTS);
    SpikeEvent { fpattern, unit, waveform }
}

fn decode_sample_group(bytes: &[u8]) -> SampleGroup {
    let mut samples: Vec<i16> = bytes
        .chunks_exact(2)
        .map(|c| i16::from_le_bytes([c[0], c[1]]))
        .collect();
    samples.truncate(SampleGroup::MAX_ELEMENTS);
    SampleGroup { samples }
}

fn decode_generic(bytes: &[u8]) -> Generic {
    let words = bytes
        .chunks_exact(4)
        .map(|c| u32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect();
    Generic { words }
}

/// Serializes a body back to wire bytes (without the header), truncated to
/// a multiple of 4 as `dlen` requires.
pub fn encode(body: &Body) -> Vec<u8> {
    let mut out = match body {
        Body::SysInfo(b) => pod_to_bytes(b),
        Body::SysInfoV42(b) => pod_to_bytes(b),
        Body::SysProtocolMonitorV311(b) => pod_to_bytes(b),
        Body::SysProtocolMonitorV41(b) => pod_to_bytes(b),
        Body::ProcInfo(b) => pod_to_bytes(b),
        Body::BankInfo(b) => pod_to_bytes(b),
        Body::FiltInfo(b) => pod_to_bytes(b),
        Body::NTrodeInfo(b) => pod_to_bytes(b),
        Body::AdaptFiltInfo(b) => pod_to_bytes(b),
        Body::RefElecFiltInfo(b) => pod_to_bytes(b),
        Body::Lnc(b) => pod_to_bytes(b),
        Body::VideoSynch(b) => pod_to_bytes(b),
        Body::SetDout(b) => pod_to_bytes(b),
        Body::Gyro(b) => pod_to_bytes(b),
        Body::ChanInfo(ChanInfo::V311(b)) => pod_to_bytes(b),
        Body::ChanInfo(ChanInfo::V41(b)) => pod_to_bytes(b),
        Body::GroupInfo(g) => encode_group_info(g),
        Body::FileCfg(f) => encode_file_cfg(f),
        Body::VideoTrack(v) => encode_video_track(v),
        Body::Log(l) => encode_log(l),
        Body::Comment(c) => encode_comment_v311(c),
        Body::CommentV40(c) => encode_comment_v40(c),
        Body::NPlay(n) => encode_nplay(n),
        Body::SpikeEvent(s) => encode_spike_event(s),
        Body::SampleGroup(s) => encode_sample_group(s),
        Body::Generic(g) => encode_generic(g),
    };

    let truncated = out.len() - (out.len() % 4);
    if truncated != out.len() {
        log::debug!("truncating {} body bytes to {} (multiple of 4)", out.len(), truncated);
        out.truncate(truncated);
    }
    out
}

/// Serializes a complete outgoing datagram: encodes `body`, stamps
/// `header.dlen` from the resulting byte count, then writes the header in
/// front of it. The `dlen`/`pkt_type`/`chid` on the header passed in are
/// otherwise trusted as-is (callers building a `CHANSETxxx` or `SYSSET`
/// already set those before calling this).
pub fn encode_packet(header: &Header, version: WireVersion, body: &Body) -> Vec<u8> {
    let body_bytes = encode(body);
    let mut stamped = *header;
    stamped.dlen = (body_bytes.len() / 4) as u16;

    let mut out = Vec::with_capacity(version.header_size() + body_bytes.len());
    stamped.encode(version, &mut out);
    out.extend_from_slice(&body_bytes);
    out
}

fn encode_group_info(g: &GroupInfo) -> Vec<u8> {
    let fixed = GroupInfoFixed { proc: g.proc, group: g.group, label: g.label, period: g.period, length: g.length };
    let mut out = pod_to_bytes(&fixed);
    for chan in g.chans.iter().take(GroupInfo::MAX_ELEMENTS) {
        out.extend_from_slice(&chan.to_le_bytes());
    }
    out
}

fn encode_file_cfg(f: &FileCfg) -> Vec<u8> {
    let mut out = Vec::with_capacity(10 + f.data.len());
    out.extend_from_slice(&f.options.to_le_bytes());
    out.extend_from_slice(&f.duration.to_le_bytes());
    out.push(f.recording);
    out.push(f.extctrl);
    out.extend_from_slice(&f.data[..f.data.len().min(FileCfg::MAX_ELEMENTS)]);
    out
}

fn encode_video_track(v: &VideoTrack) -> Vec<u8> {
    let mut out = Vec::with_capacity(10 + v.points.len() * 2);
    out.extend_from_slice(&v.parent_id.to_le_bytes());
    out.extend_from_slice(&v.node_count.to_le_bytes());
    out.extend_from_slice(&v.node_id.to_le_bytes());
    out.extend_from_slice(&v.node_count_type.to_le_bytes());
    out.extend_from_slice(&v.max_zone_dim.to_le_bytes());
    for p in v.points.iter().take(VideoTrack::MAX_ELEMENTS) {
        out.extend_from_slice(&p.to_le_bytes());
    }
    out
}

fn encode_log(l: &Log) -> Vec<u8> {
    let mut out = Vec::with_capacity(18 + l.desc.len());
    out.push(l.mode);
    out.push(l.severity);
    out.extend_from_slice(&l.name);
    out.extend_from_slice(&l.desc[..l.desc.len().min(Log::MAX_ELEMENTS)]);
    out
}

fn encode_comment_v311(c: &Comment) -> Vec<u8> {
    let mut out = Vec::with_capacity(8 + c.text.len());
    out.push(c.charset);
    out.push(c.flags);
    out.extend_from_slice(&[0, 0]);
    out.extend_from_slice(&c.data.to_le_bytes());
    out.extend_from_slice(&c.text[..c.text.len().min(Comment::MAX_ELEMENTS)]);
    out
}

fn encode_comment_v40(c: &CommentV40) -> Vec<u8> {
    let mut out = Vec::with_capacity(16 + c.text.len());
    out.push(c.charset);
    out.push(c.flags);
    out.extend_from_slice(&[0, 0]);
    out.extend_from_slice(&c.time_started.to_le_bytes());
    out.extend_from_slice(&c.rgba.to_le_bytes());
    out.extend_from_slice(&c.text[..c.text.len().min(CommentV40::MAX_ELEMENTS)]);
    out
}

fn encode_nplay(n: &NPlay) -> Vec<u8> {
    let mut out = Vec::with_capacity(32 + n.fname.len());
    out.extend_from_slice(&n.ftime.to_le_bytes());
    out.extend_from_slice(&n.stime.to_le_bytes());
    out.extend_from_slice(&n.etime.to_le_bytes());
    out.extend_from_slice(&n.val.to_le_bytes());
    out.extend_from_slice(&n.mode.to_le_bytes());
    out.extend_from_slice(&n.flags.to_le_bytes());
    out.extend_from_slice(&n.speed.to_le_bytes());
    out.extend_from_slice(&n.fname[..n.fname.len().min(NPlay::MAX_ELEMENTS)]);
    out
}

fn encode_spike_event(s: &SpikeEvent) -> Vec<u8> {
    let mut out = Vec::with_capacity(16 + s.waveform.len() * 2);
    for f in s.fpattern {
        out.extend_from_slice(&f.to_le_bytes());
    }
    out.push(s.unit);
    out.extend_from_slice(&[0, 0, 0]);
    for w in s.waveform.iter().take(SpikeEvent::MAX_ELEMENTS) {
        out.extend_from_slice(&w.to_le_bytes());
    }
    out
}

fn encode_sample_group(s: &SampleGroup) -> Vec<u8> {
    let mut out = Vec::with_capacity(s.samples.len() * 2);
    for v in s.samples.iter().take(SampleGroup::MAX_ELEMENTS) {
        out.extend_from_slice(&v.to_le_bytes());
    }
    out
}

fn encode_generic(g: &Generic) -> Vec<u8> {
    let mut out = Vec::with_capacity(g.words.len() * 4);
    for w in &g.words {
        out.extend_from_slice(&w.to_le_bytes());
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header(chid: u16, pkt_type: u16) -> Header {
        Header { time: 1, chid, pkt_type, dlen: 0, instrument: 0 }
    }

    #[test]
    fn heartbeat_is_empty_generic() {
        let h = header(0, 0);
        let body = decode(&h, WireVersion::V4_1, None, &[]).unwrap();
        assert!(matches!(body, Body::Generic(g) if g.words.is_empty()));
    }

    #[test]
    fn sysinfo_v42_encode_matches_literal_wire_bytes() {
        let body = Body::SysInfoV42(SysInfoV42 {
            sysfreq: 30_000,
            spikelen: 60,
            spikepre: 22,
            resetque: 0,
            runlevel: 50,
            runflags: 0,
            transport: 0,
            reserved: [0, 0],
        });
        let header = Header { time: 0, chid: 0x8000, pkt_type: 0x90, dlen: 0, instrument: 0 };

        let datagram = encode_packet(&header, WireVersion::V4_1, &body);

        let mut expected_body = Vec::new();
        for word in [30_000u32, 60, 22, 0, 50, 0] {
            expected_body.extend_from_slice(&word.to_le_bytes());
        }
        expected_body.extend_from_slice(&0u16.to_le_bytes());
        expected_body.extend_from_slice(&[0u8, 0]);
        assert_eq!(expected_body.len(), 28);

        assert_eq!(&datagram[WireVersion::V4_1.header_size()..], &expected_body[..]);

        let (decoded_header, consumed) = Header::decode(WireVersion::V4_1, &datagram).unwrap();
        assert_eq!(consumed, WireVersion::V4_1.header_size());
        assert_eq!(decoded_header.dlen, 7);
        assert_eq!(decoded_header.pkt_type, 0x90);
        assert_eq!(decoded_header.chid, 0x8000);

        let decoded_body = decode(&decoded_header, WireVersion::V4_1, None, &datagram[consumed..]).unwrap();
        match decoded_body {
            Body::SysInfoV42(b) => {
                assert_eq!({ b.sysfreq }, 30_000);
                assert_eq!({ b.spikelen }, 60);
                assert_eq!({ b.spikepre }, 22);
                assert_eq!({ b.runlevel }, 50);
                assert_eq!({ b.transport }, 0);
            }
            _ => panic!("expected SysInfoV42"),
        }
    }

    #[test]
    fn sample_group_round_trips() {
        let samples = vec![1i16, -2, 3, -4];
        let mut bytes = Vec::new();
        for s in &samples {
            bytes.extend_from_slice(&s.to_le_bytes());
        }
        let h = header(0, 6);
        let body = decode(&h, WireVersion::V4_1, None, &bytes).unwrap();
        match &body {
            Body::SampleGroup(g) => assert_eq!(g.samples, samples),
            _ => panic!("expected SampleGroup"),
        }
        assert_eq!(encode(&body), bytes);
    }

    #[test]
    fn spike_event_round_trips_waveform() {
        let wave: Vec<i16> = (0..12).collect();
        let body = Body::SpikeEvent(SpikeEvent { fpattern: [0.0, 0.0, 0.0], unit: 2, waveform: wave.clone() });

        let encoded = encode(&body);
        assert_eq!(encoded.len(), 16 + 12 * 2);

        let h = header(14, 0);
        let decoded = decode(&h, WireVersion::V4_1, Some(ChannelClass::FrontEnd), &encoded).unwrap();
        match decoded {
            Body::SpikeEvent(s) => {
                assert_eq!(s.unit, 2);
                assert_eq!(s.waveform, wave);
            }
            _ => panic!("expected SpikeEvent"),
        }
    }

    #[test]
    fn filtrep_decodes_as_filt_info_not_group_info() {
        let bytes = vec![0u8; core::mem::size_of::<FiltInfo>()];
        let h = header(0x8000, 0x23);
        let body = decode(&h, WireVersion::V4_1, None, &bytes).unwrap();
        assert!(matches!(body, Body::FiltInfo(_)));
    }

    #[test]
    fn short_chaninfo_buffer_zero_pads() {
        let h = header(0x8000, 0xC0);
        let short = vec![0u8; 4];
        let body = decode(&h, WireVersion::V3_11, None, &short).unwrap();
        match body {
            Body::ChanInfo(ChanInfo::V311(c)) => assert_eq!({ c.chan }, 0),
            _ => panic!("expected ChanInfo::V311"),
        }
    }
}
