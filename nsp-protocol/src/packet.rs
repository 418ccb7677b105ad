//! Packet body layouts.
//!
//! Fixed-size bodies are represented as `bytemuck::Pod` structs and
//! round-tripped with `bytemuck::pod_read_unaligned`/`bytes_of`. Bodies with
//! a variable trailing array keep a fixed prefix struct plus a `Vec` for the
//! tail, truncated/padded at the `max_elements` bound named in the comment
//! on each type.

use bytemuck::{Pod, Zeroable};

use crate::header::Header;
use crate::types::{ChanInfoUnionLegacy, ChanInfoUnionV41, FiltDesc, Hoop, ManualUnitMapping, Scaling};

macro_rules! fixed_body {
    ($name:ident { $($field:ident : $ty:ty),* $(,)? }) => {
        #[repr(C, packed)]
        #[derive(Debug, Clone, Copy, Pod, Zeroable)]
        pub struct $name {
            $(pub $field: $ty),*
        }
    };
}

fixed_body!(SysInfo {
    sysfreq: u32,
    spikelen: u32,
    spikepre: u32,
    resetque: u32,
    runlevel: u32,
    runflags: u32,
});

/// 4.2+ adds a 16-bit `transport` field plus two reserved bytes after
/// `runflags`; callers on that wire version read this variant instead of
/// `SysInfo`.
fixed_body!(SysInfoV42 {
    sysfreq: u32,
    spikelen: u32,
    spikepre: u32,
    resetque: u32,
    runlevel: u32,
    runflags: u32,
    transport: u16,
    reserved: [u8; 2],
});

fixed_body!(SysProtocolMonitorV311 {
    sentpkts: u32,
});

/// v4.1 adds a monotonic `counter` alongside `sentpkts`.
fixed_body!(SysProtocolMonitorV41 {
    sentpkts: u32,
    counter: u32,
});

fixed_body!(ProcInfo {
    proc: u32,
    idcode: u32,
    ident: [u8; 64],
    chanbase: u32,
    chancount: u32,
    bankcount: u32,
    groupcount: u32,
    filtcount: u32,
    sortcount: u32,
    unitcount: u32,
    hoopcount: u32,
    sortmethod: u32,
    version: u32,
});

fixed_body!(BankInfo {
    proc: u32,
    bank: u32,
    idcode: u32,
    ident: [u8; 64],
    label: [u8; 16],
    chanbase: u32,
    chancount: u32,
});

fixed_body!(FiltInfo {
    proc: u32,
    filt: u32,
    label: [u8; 16],
    hpfreq: u32,
    hporder: u32,
    hptype: u32,
    lpfreq: u32,
    lporder: u32,
    lptype: u32,
});

fixed_body!(NTrodeInfo {
    ntrode: u16,
    label: [u8; 16],
    ngroupchans: u16,
    amplrejpos: i16,
    amplrejneg: i16,
    refelecchan: u32,
    unitmapping: [ManualUnitMapping; 5],
    spkhoops: [[Hoop; 4]; 5],
});

fixed_body!(AdaptFiltInfo {
    proc: u32,
    filt: u32,
    adapt_enable: u32,
    learning_rate: f32,
    refchan1: u32,
    refchan2: u32,
});

fixed_body!(RefElecFiltInfo {
    proc: u32,
    filt: u32,
    adapt_enable: u32,
    learning_rate: f32,
    refchan: u32,
});

fixed_body!(Lnc {
    lnc_freq: u32,
    lnc_ref_chan: u32,
    lnc_global_mode: u32,
});

fixed_body!(Gyro {
    gyroscope: [u8; 4],
    accelerometer: [u8; 4],
    magnetometer: [u8; 4],
    temperature: u16,
});

fixed_body!(SetDout {
    chan: u32,
    value: u16,
    mode: u16,
});

fixed_body!(VideoSynch {
    split: u16,
    frame: u32,
    etime: u32,
    id: u16,
});

/// v3.11 fixed-shape `ChanInfo` body (`union` carries the legacy monitor/lowhigh arm).
fixed_body!(ChanInfoV311 {
    chan: u32,
    proc: u32,
    bank: u32,
    term: u32,
    chancaps: u32,
    doutcaps: u32,
    dinpcaps: u32,
    aoutcaps: u32,
    ainpcaps: u32,
    spkcaps: u32,
    physcalin: Scaling,
    phyfiltin: FiltDesc,
    physcalout: Scaling,
    phyfiltout: FiltDesc,
    label: [u8; 16],
    userflags: u32,
    position: [i32; 4],
    scalin: Scaling,
    scalout: Scaling,
    doutopts: u32,
    dinpopts: u32,
    aoutopts: u32,
    eopchar: u32,
    union: ChanInfoUnionLegacy,
    trigtype: u8,
    _pad0: [u8; 1],
    trigchan: u16,
    trigval: u16,
    _pad1: [u8; 2],
    ainpopts: u32,
    lncrate: u32,
    smpfilter: u32,
    smpgroup: u32,
    smpdispmin: i32,
    smpdispmax: i32,
    spkfilter: u32,
    spkdispmax: i32,
    lncdispmax: i32,
    spkopts: u32,
    spkthrlevel: i32,
    spkthrlimit: i32,
    spkgroup: u32,
    amplrejpos: i16,
    amplrejneg: i16,
    refelecchan: u32,
    unitmapping: [ManualUnitMapping; 5],
    spkhoops: [[Hoop; 4]; 5],
});

/// v4.1 layout: inserts `triginst` before the wider `moninst`/`monchan` monitor arm.
fixed_body!(ChanInfoV41 {
    chan: u32,
    proc: u32,
    bank: u32,
    term: u32,
    chancaps: u32,
    doutcaps: u32,
    dinpcaps: u32,
    aoutcaps: u32,
    ainpcaps: u32,
    spkcaps: u32,
    physcalin: Scaling,
    phyfiltin: FiltDesc,
    physcalout: Scaling,
    phyfiltout: FiltDesc,
    label: [u8; 16],
    userflags: u32,
    position: [i32; 4],
    scalin: Scaling,
    scalout: Scaling,
    doutopts: u32,
    dinpopts: u32,
    aoutopts: u32,
    eopchar: u32,
    monitor: ChanInfoUnionV41,
    trigtype: u8,
    _pad0: [u8; 1],
    triginst: u16,
    trigchan: u16,
    trigval: u16,
    ainpopts: u32,
    lncrate: u32,
    smpfilter: u32,
    smpgroup: u32,
    smpdispmin: i32,
    smpdispmax: i32,
    spkfilter: u32,
    spkdispmax: i32,
    lncdispmax: i32,
    spkopts: u32,
    spkthrlevel: i32,
    spkthrlimit: i32,
    spkgroup: u32,
    amplrejpos: i16,
    amplrejneg: i16,
    refelecchan: u32,
    unitmapping: [ManualUnitMapping; 5],
    spkhoops: [[Hoop; 4]; 5],
});

/// Either header shape `ChanInfo` may arrive in, normalized for the device
/// layer's scoped-patch logic.
#[derive(Debug, Clone, Copy)]
pub enum ChanInfo {
    V311(ChanInfoV311),
    V41(ChanInfoV41),
}

impl ChanInfo {
    pub fn chan(&self) -> u32 {
        match self {
            ChanInfo::V311(c) => c.chan,
            ChanInfo::V41(c) => c.chan,
        }
    }

    pub fn ainpopts(&self) -> u32 {
        match self {
            ChanInfo::V311(c) => c.ainpopts,
            ChanInfo::V41(c) => c.ainpopts,
        }
    }

    pub fn chancaps(&self) -> u32 {
        match self {
            ChanInfo::V311(c) => c.chancaps,
            ChanInfo::V41(c) => c.chancaps,
        }
    }

    pub fn dinpcaps(&self) -> u32 {
        match self {
            ChanInfo::V311(c) => c.dinpcaps,
            ChanInfo::V41(c) => c.dinpcaps,
        }
    }

    pub fn aoutcaps(&self) -> u32 {
        match self {
            ChanInfo::V311(c) => c.aoutcaps,
            ChanInfo::V41(c) => c.aoutcaps,
        }
    }
}

/// `GroupInfo`: fixed prefix plus up to 272 member channel ids.
#[derive(Debug, Clone)]
pub struct GroupInfo {
    pub proc: u32,
    pub group: u32,
    pub label: [u8; 16],
    pub period: u32,
    pub length: u32,
    pub chans: Vec<u16>,
}

impl GroupInfo {
    pub const MAX_ELEMENTS: usize = 272;
}

fixed_body!(GroupInfoFixed {
    proc: u32,
    group: u32,
    label: [u8; 16],
    period: u32,
    length: u32,
});

/// `FileCfg`: fixed prefix plus up to 768 bytes (username/filename/comment
/// sub-fields, kept opaque here — callers that need the sub-layout slice it
/// themselves).
#[derive(Debug, Clone)]
pub struct FileCfg {
    pub options: u32,
    pub duration: u32,
    pub recording: u8,
    pub extctrl: u8,
    pub data: Vec<u8>,
}

impl FileCfg {
    pub const MAX_ELEMENTS: usize = 768;
}

/// `VideoTrack`: fixed prefix plus up to 128 trailing u16 node ids.
#[derive(Debug, Clone)]
pub struct VideoTrack {
    pub parent_id: u16,
    pub node_count: u16,
    pub node_id: u16,
    pub node_count_type: u16,
    pub max_zone_dim: u16,
    pub points: Vec<u16>,
}

impl VideoTrack {
    pub const MAX_ELEMENTS: usize = 128;
}

/// `Log`: severity/source fixed prefix plus up to 128 bytes of UTF-8 message.
#[derive(Debug, Clone)]
pub struct Log {
    pub mode: u8,
    pub severity: u8,
    pub name: [u8; 16],
    pub desc: Vec<u8>,
}

impl Log {
    pub const MAX_ELEMENTS: usize = 128;
}

/// `Comment`: `charset`/`flags`/`reserved` prefix, `data` word (either an
/// rgba-packed u32 or a start-timestamp depending on `flags`), trailing text.
#[derive(Debug, Clone)]
pub struct Comment {
    pub charset: u8,
    pub flags: u8,
    pub data: u32,
    pub text: Vec<u8>,
}

impl Comment {
    pub const MAX_ELEMENTS: usize = 128;

    pub fn rgba(&self) -> (u8, u8, u8, u8) {
        if self.flags & 0x01 != 0 {
            (0, 0, 0, 1)
        } else {
            let b = self.data.to_le_bytes();
            (b[0], b[1], b[2], b[3])
        }
    }

    pub fn time_started(&self) -> Option<u64> {
        (self.flags & 0x01 != 0).then_some(self.data as u64)
    }
}

/// v4.0+ variant splits the packed `data` word into real `time_started`/`rgba` fields.
#[derive(Debug, Clone)]
pub struct CommentV40 {
    pub charset: u8,
    pub flags: u8,
    pub time_started: u64,
    pub rgba: u32,
    pub text: Vec<u8>,
}

impl CommentV40 {
    pub const MAX_ELEMENTS: usize = 128;
}

/// `NPlay`: v3.11 uses 32-bit time fields, v4.0+ widens them to 64-bit.
/// Trailing `fname` up to 992 bytes.
#[derive(Debug, Clone)]
pub struct NPlay {
    pub ftime: u64,
    pub stime: u64,
    pub etime: u64,
    pub val: u32,
    pub mode: u16,
    pub flags: u16,
    pub speed: f32,
    pub fname: Vec<u8>,
}

impl NPlay {
    pub const MAX_ELEMENTS: usize = 992;
}

/// `SpikeEvent`: fixed header-like prefix plus up to 128 trailing i16 waveform samples.
#[derive(Debug, Clone)]
pub struct SpikeEvent {
    pub fpattern: [f32; 3],
    pub unit: u8,
    pub waveform: Vec<i16>,
}

impl SpikeEvent {
    pub const MAX_ELEMENTS: usize = 128;
}

/// `SampleGroup`: raw trailing i16 sample array, up to 272 values, no fixed prefix.
#[derive(Debug, Clone, Default)]
pub struct SampleGroup {
    pub samples: Vec<i16>,
}

impl SampleGroup {
    pub const MAX_ELEMENTS: usize = 272;
}

/// Fallback body: raw 32-bit words, used for `HeartBeat` (0 elements), the
/// spike-sorting status family, and anything the factory can't place.
#[derive(Debug, Clone, Default)]
pub struct Generic {
    pub words: Vec<u32>,
}

pub type SsModelAll = Generic;
pub type SsModel = Generic;
pub type SsDetect = Generic;
pub type SsArtifReject = Generic;
pub type SsNoiseBoundary = Generic;
pub type SsStatistics = Generic;
pub type SsStatus = Generic;

/// A fully decoded packet: normalized header plus a typed body.
#[derive(Debug, Clone)]
pub struct Packet {
    pub header: Header,
    pub body: Body,
}

#[derive(Debug, Clone)]
pub enum Body {
    SysInfo(SysInfo),
    SysInfoV42(SysInfoV42),
    SysProtocolMonitorV311(SysProtocolMonitorV311),
    SysProtocolMonitorV41(SysProtocolMonitorV41),
    ProcInfo(ProcInfo),
    BankInfo(BankInfo),
    FiltInfo(FiltInfo),
    GroupInfo(GroupInfo),
    ChanInfo(ChanInfo),
    NTrodeInfo(NTrodeInfo),
    AdaptFiltInfo(AdaptFiltInfo),
    RefElecFiltInfo(RefElecFiltInfo),
    Lnc(Lnc),
    FileCfg(FileCfg),
    VideoTrack(VideoTrack),
    VideoSynch(VideoSynch),
    Log(Log),
    Comment(Comment),
    CommentV40(CommentV40),
    NPlay(NPlay),
    SetDout(SetDout),
    Gyro(Gyro),
    SpikeEvent(SpikeEvent),
    SampleGroup(SampleGroup),
    Generic(Generic),
}

pub(crate) fn zero_pad<const N: usize>(bytes: &[u8]) -> [u8; N] {
    let mut buf = [0u8; N];
    let n = bytes.len().min(N);
    buf[..n].copy_from_slice(&bytes[..n]);
    buf
}

pub(crate) fn pod_from_bytes<T: Pod>(bytes: &[u8]) -> T {
    let size = core::mem::size_of::<T>();
    if bytes.len() >= size {
        bytemuck::pod_read_unaligned(&bytes[..size])
    } else {
        // Firmware sometimes truncates the trailing zero bytes of a fixed
        // struct off the wire; zero-pad up to the struct's full size.
        let mut buf = vec![0u8; size];
        buf[..bytes.len()].copy_from_slice(bytes);
        bytemuck::pod_read_unaligned(&buf)
    }
}

pub(crate) fn pod_to_bytes<T: Pod>(value: &T) -> Vec<u8> {
    bytemuck::bytes_of(value).to_vec()
}
