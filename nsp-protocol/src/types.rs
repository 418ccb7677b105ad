//! Wire-level enums, flags and small fixed structs shared by several packet bodies.

use bytemuck::{Pod, Zeroable};

/// Full packet type registry. Most discriminants only ever pass through the
/// factory's fallback/black-hole path; they still need to exist so that path
/// can name what it's ignoring.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum PacketType {
    SysHeartbeat = 0x00,
    SysProtocolMonitor = 0x01,
    RepConfigAll = 0x08,
    ReqConfigAll = 0x88,
    SysRep = 0x10,
    SysSet = 0x90,
    SysRepSpkLen = 0x11,
    SysSetSpkLen = 0x91,
    SysRepRunLevel = 0x12,
    SysSetRunLevel = 0x92,
    SysRepTransport = 0x13,
    SysSetTransport = 0x93,
    ProcRep = 0x21,
    BankRep = 0x22,
    FiltRep = 0x23,
    FiltSet = 0xA3,
    ChanResetRep = 0x24,
    ChanReset = 0xA4,
    AdaptFiltRep = 0x25,
    AdaptFiltSet = 0xA5,
    RefElecFiltRep = 0x26,
    RefElecFiltSet = 0xA6,
    RepNTrodeInfo = 0x27,
    SetNTrodeInfo = 0xA7,
    LncRep = 0x28,
    LncSet = 0xA8,
    VideoSynchRep = 0x29,
    VideoSynchSet = 0xA9,
    GroupRep = 0x30,
    GroupSet = 0xB0,
    CommentRep = 0x31,
    CommentSet = 0xB1,
    NplayRep = 0x5C,
    NplaySet = 0xDC,
    SetDoutRep = 0x5D,
    SetDoutSet = 0xDD,
    VideoTrackRep = 0x5F,
    VideoTrackSet = 0xDF,
    RepFileCfg = 0x61,
    SetFileCfg = 0xE1,
    LogRep = 0x63,
    LogSet = 0xE3,
    ChanRep = 0x40,
    ChanSet = 0xC0,
    ChanRepLabel = 0x41,
    ChanSetLabel = 0xC1,
    ChanRepScale = 0x42,
    ChanSetScale = 0xC2,
    ChanRepDout = 0x43,
    ChanSetDout = 0xC3,
    ChanRepDinp = 0x44,
    ChanSetDinp = 0xC4,
    ChanRepAout = 0x45,
    ChanSetAout = 0xC5,
    ChanRepDisp = 0x46,
    ChanSetDisp = 0xC6,
    ChanRepAinp = 0x47,
    ChanSetAinp = 0xC7,
    ChanRepSmp = 0x48,
    ChanSetSmp = 0xC8,
    ChanRepSpk = 0x49,
    ChanSetSpk = 0xC9,
    ChanRepSpkThr = 0x4A,
    ChanSetSpkThr = 0xCA,
    ChanRepSpkHps = 0x4B,
    ChanSetSpkHps = 0xCB,
    ChanRepUnitOverrides = 0x4C,
    ChanSetUnitOverrides = 0xCC,
    ChanRepNTrodeGroup = 0x4D,
    ChanSetNTrodeGroup = 0xCD,
    ChanRepRejectAmplitude = 0x4E,
    ChanSetRejectAmplitude = 0xCE,
    ChanRepAutoThreshold = 0x4F,
    ChanSetAutoThreshold = 0xCF,
    SsModelAllRep = 0x50,
    SsModelAllSet = 0xD0,
    SsModelRep = 0x51,
    SsModelSet = 0xD1,
    SsDetectRep = 0x52,
    SsDetectSet = 0xD2,
    SsArtifRejectRep = 0x53,
    SsArtifRejectSet = 0xD3,
    SsNoiseBoundaryRep = 0x54,
    SsNoiseBoundarySet = 0xD4,
    SsStatisticsRep = 0x55,
    SsStatisticsSet = 0xD5,
    SsStatusRep = 0x57,
    SsStatusSet = 0xD7,
}

impl PacketType {
    /// `type & 0xF0` family grouping used by the factory's second-pass match.
    pub fn family(raw: u16) -> u16 {
        raw & 0xF0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ChannelClass {
    #[default]
    Any,
    Group,
    FrontEnd,
    AnalogIn,
    DigitalIn,
    DigitalOut,
    Serial,
    Audio,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum SpecialChan {
    Group = 0x0000,
    Configuration = 0x8000,
}

pub const CONFIGURATION_CHID: u16 = SpecialChan::Configuration as u16;

/// Device-level transport flags. Richer than `common.py`'s `CBTransport`
/// (which aliases UDP to 0) — this matches the later `nsp.py` revision.
bitflags::bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Transport: u16 {
        const CHECK  = 0x0;
        const UDP    = 0x1;
        const TCP    = 0x2;
        const LSL    = 0x4;
        const USB    = 0x8;
        const SERIAL = 0xF;
    }
}

bitflags::bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct ChanCaps: u32 {
        const SERIAL   = 0x0000_0001;
        const AINP     = 0x0000_0002;
        const AOUT     = 0x0000_0004;
        const DINP     = 0x0000_0008;
        const DOUT     = 0x0000_0010;
        const GYRO     = 0x0000_0020;
        const ISOLATED = 0x0001_0000;
    }
}

bitflags::bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct AnaInpCaps: u32 {
        const LNC        = 0x0000_0001;
        const LIMITS     = 0x0000_0002;
        const SPK        = 0x0000_0004;
        const REFELEC    = 0x0000_0008;
        const MONITOR    = 0x0000_0010;
        const RAW        = 0x0000_0020;
        const FILTER     = 0x0000_0040;
        const RANGE      = 0x0000_0080;
    }
}

bitflags::bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct AnaInpOpts: u32 {
        const LNC_MASK               = 0x0000_0007;
        const LNC_OFF                = 0x0000_0000;
        const LNC_ON                 = 0x0000_0001;
        const REFELEC_OFFSETCORRECT  = 0x0000_0010;
        const REFELEC_RAWSTREAM      = 0x0000_0040;
    }
}

bitflags::bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct DigInpCaps: u32 {
        const SERIALMASK = 0x0000_00FF;
        const RISING     = 0x0000_0100;
        const FALLING    = 0x0000_0200;
    }
}

bitflags::bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct AnaOutCaps: u32 {
        const AUDIO  = 0x0000_0001;
        const SCALE  = 0x0000_0002;
        const STATIC = 0x0000_0004;
    }
}

bitflags::bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct AInpSpk: u32 {
        const EXTRACT  = 0x0000_0001;
        const REJART   = 0x0000_0002;
        const REJCLIP  = 0x0000_0004;
        const ALIGNPK  = 0x0000_0008;
        const REJAMPL  = 0x0000_0010;
        const THRLEVEL = 0x0000_0020;
        const THRAUTO  = 0x0000_0400;
    }
}

/// Line-noise-cancellation adaptation rate table, keyed by `lncrate` field value.
pub fn lnc_rate_hz(code: u32) -> Option<u32> {
    match code {
        0 => Some(0),
        1 => Some(1_000),
        10 => Some(10_000),
        30 => Some(30_000),
        60 => Some(60_000),
        _ => None,
    }
}

#[repr(C, packed)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub struct Scaling {
    pub digmin: i16,
    pub digmax: i16,
    pub anamin: i32,
    pub anamax: i32,
    pub anagain: i32,
    pub anaunit: [u8; 8],
}

#[repr(C, packed)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub struct FiltDesc {
    pub label: [u8; 16],
    pub hpfreq: u32,
    pub hporder: u32,
    pub hptype: u32,
    pub lpfreq: u32,
    pub lporder: u32,
    pub lptype: u32,
}

#[repr(C, packed)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub struct ManualUnitMapping {
    pub n_override: i16,
    pub af_origin: [i16; 3],
    pub af_shape: [[i16; 3]; 3],
    pub a_phi: i16,
    pub b_valid: u32,
}

#[repr(C, packed)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub struct Hoop {
    pub valid: u16,
    pub time: i16,
    pub min: i16,
    pub max: i16,
}

/// v3.11/v4.0 monitor-or-lowhigh union arm, stored untagged as raw bytes and
/// reinterpreted via accessor methods rather than a real Rust `union`.
#[repr(C, packed)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub struct ChanInfoUnionLegacy(pub [u8; 8]);

impl ChanInfoUnionLegacy {
    pub fn as_monitor(&self) -> (u32, i32) {
        let monsource = u32::from_le_bytes(self.0[0..4].try_into().unwrap());
        let outvalue = i32::from_le_bytes(self.0[4..8].try_into().unwrap());
        (monsource, outvalue)
    }

    pub fn as_low_high(&self) -> (u16, u16, i32) {
        let low = u16::from_le_bytes(self.0[0..2].try_into().unwrap());
        let high = u16::from_le_bytes(self.0[2..4].try_into().unwrap());
        let offset = i32::from_le_bytes(self.0[4..8].try_into().unwrap());
        (low, high, offset)
    }

    pub fn from_monitor(monsource: u32, outvalue: i32) -> Self {
        let mut buf = [0u8; 8];
        buf[0..4].copy_from_slice(&monsource.to_le_bytes());
        buf[4..8].copy_from_slice(&outvalue.to_le_bytes());
        ChanInfoUnionLegacy(buf)
    }
}

/// v4.1+ monitor arm: `moninst`/`monchan`/`outvalue` replaces the plain
/// `monsource` address.
#[repr(C, packed)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub struct ChanInfoUnionV41 {
    pub moninst: u16,
    pub monchan: u16,
    pub outvalue: i32,
}
