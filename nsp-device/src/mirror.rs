use std::collections::HashMap;
use std::sync::RwLock;

use nsp_protocol::packet::{ChanInfo, NPlay};
use nsp_protocol::types::ChannelClass;
use nsp_util::time::DeviceTick;

use crate::classify::{self, ClassifyInput};
use crate::startup::RunLevel;

/// A channel's mirrored state: the last full wire record plus its derived
/// class. Scoped `CHANREPxxx` replies patch `raw` in place through
/// `Mirror::patch_scoped`; full-scope `CHANREP` replaces `raw` wholesale and
/// re-derives `class` through `Mirror::apply_full_chan_info`. Keeping the
/// full wire record (not just the handful of fields the spec calls out) is
/// what lets `config_ops` clone-and-patch it back into an outgoing
/// `CHANSETxxx` packet without losing unrelated fields not tracked above.
#[derive(Debug, Clone)]
pub struct ChannelRecord {
    pub class: ChannelClass,
    pub raw: ChanInfo,
}

/// Running counters mirroring pycbsdk's `_monitor_state` dict.
#[derive(Debug, Default)]
pub struct MonitorState {
    pub pkts_received: u64,
    pub last_time: DeviceTick,
    pub last_protocol_monitor_counter: Option<u32>,
}

#[derive(Debug, Default)]
pub struct MirrorState {
    pub run_level: RunLevel,
    pub instrument: i32,
    pub proc_chans: u32,
    pub sysfreq: Option<u32>,
    pub transport_flags: u16,
    pub channel_infos: HashMap<u32, ChannelRecord>,
    pub group_infos: HashMap<u32, Vec<u32>>,
    pub group_nchans: HashMap<u32, usize>,
    pub nplay: Option<NPlay>,
    pub monitor: MonitorState,
}

impl MirrorState {
    pub fn has_nplay(&self) -> bool {
        self.nplay.is_some()
    }
}

pub struct Mirror {
    state: RwLock<MirrorState>,
}

impl Default for Mirror {
    fn default() -> Self {
        Mirror { state: RwLock::new(MirrorState { run_level: RunLevel::Startup, instrument: -1, ..Default::default() }) }
    }
}

impl Mirror {
    pub fn read<R>(&self, f: impl FnOnce(&MirrorState) -> R) -> R {
        f(&self.state.read().unwrap())
    }

    pub fn write<R>(&self, f: impl FnOnce(&mut MirrorState) -> R) -> R {
        f(&mut self.state.write().unwrap())
    }

    /// Clears the fields a `REQCONFIGALL` cascade is about to repopulate.
    /// `sysfreq`/`instrument`/`nplay` are intentionally preserved: they are
    /// either unaffected by a refresh or re-learned incidentally as part of
    /// the same cascade without needing to be zeroed first.
    pub fn clear_for_refresh(&self) {
        self.write(|s| {
            s.proc_chans = 0;
            s.channel_infos.clear();
            s.group_infos.clear();
            s.group_nchans.clear();
        });
    }

    fn instrument_ok(s: &MirrorState, observed: i32) -> bool {
        s.instrument < 0 || observed == s.instrument
    }

    fn chan_in_range(s: &MirrorState, chan: u32) -> bool {
        s.proc_chans == 0 || (chan >= 1 && chan <= s.proc_chans)
    }

    /// Applies a full-scope `CHANREP`/`CHANSET` record: replaces the channel
    /// record wholesale and re-runs classification. Drops the record if the
    /// instrument id doesn't match or the channel is out of the known range.
    pub fn apply_full_chan_info(&self, info: &ChanInfo, observed_instrument: i32) {
        let chan = info.chan();

        self.write(|s| {
            if !Self::instrument_ok(s, observed_instrument) {
                log::debug!("dropping chaninfo for chan {chan}: instrument mismatch");
                return;
            }
            if !Self::chan_in_range(s, chan) {
                log::debug!("dropping chaninfo for chan {chan}: out of [1, proc_chans] range");
                return;
            }

            let class = classify::classify(&ClassifyInput {
                chancaps: nsp_protocol::types::ChanCaps::from_bits_truncate(info.chancaps()),
                dinpcaps: nsp_protocol::types::DigInpCaps::from_bits_truncate(info.dinpcaps()),
                aoutcaps: nsp_protocol::types::AnaOutCaps::from_bits_truncate(info.aoutcaps()),
            });

            s.channel_infos.insert(chan, ChannelRecord { class, raw: *info });
        });
    }

    /// Patches the raw wire record in place for a scoped `CHANREPxxx` reply;
    /// `class` is left untouched: scoped updates never re-classify a channel.
    /// Same instrument/range drop rules as the full-scope path; the event a
    /// caller may be waiting on is the handler's responsibility to signal,
    /// not this method's (it fires regardless of whether the patch applied).
    pub fn patch_scoped(&self, chan: u32, observed_instrument: i32, patch: impl FnOnce(&mut ChanInfo)) {
        self.write(|s| {
            if !Self::instrument_ok(s, observed_instrument) {
                log::debug!("dropping scoped chaninfo for chan {chan}: instrument mismatch");
                return;
            }
            if !Self::chan_in_range(s, chan) {
                log::debug!("dropping scoped chaninfo for chan {chan}: out of [1, proc_chans] range");
                return;
            }
            if let Some(record) = s.channel_infos.get_mut(&chan) {
                patch(&mut record.raw);
            }
        });
    }

    /// Snapshot of one channel's full raw record, the starting point for
    /// every `config_ops` write (copy current -> overlay changed fields).
    pub fn channel_snapshot(&self, chan: u32) -> Option<ChannelRecord> {
        self.read(|s| s.channel_infos.get(&chan).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chan_info(chan: u32) -> ChanInfo {
        let mut c: nsp_protocol::packet::ChanInfoV41 = bytemuck::Zeroable::zeroed();
        c.chan = chan;
        ChanInfo::V41(c)
    }

    #[test]
    fn refresh_preserves_sysfreq() {
        let mirror = Mirror::default();
        mirror.write(|s| {
            s.sysfreq = Some(30_000);
            s.proc_chans = 128;
            s.channel_infos.insert(1, ChannelRecord { class: ChannelClass::Any, raw: chan_info(1) });
        });

        mirror.clear_for_refresh();

        mirror.read(|s| {
            assert_eq!(s.sysfreq, Some(30_000));
            assert_eq!(s.proc_chans, 0);
            assert!(s.channel_infos.is_empty());
        });
    }

    #[test]
    fn scoped_patch_drops_out_of_range_chan() {
        let mirror = Mirror::default();
        mirror.write(|s| {
            s.proc_chans = 4;
            s.channel_infos.insert(2, ChannelRecord { class: ChannelClass::Any, raw: chan_info(2) });
        });

        mirror.patch_scoped(99, -1, |raw| if let ChanInfo::V41(c) = raw { c.userflags = 1 });

        mirror.read(|s| assert!(!s.channel_infos.contains_key(&99)));
    }

    #[test]
    fn scoped_patch_drops_instrument_mismatch() {
        let mirror = Mirror::default();
        mirror.write(|s| {
            s.instrument = 0;
            s.proc_chans = 4;
            s.channel_infos.insert(2, ChannelRecord { class: ChannelClass::Any, raw: chan_info(2) });
        });

        mirror.patch_scoped(2, 1, |raw| if let ChanInfo::V41(c) = raw { c.userflags = 42 });

        mirror.read(|s| {
            let ChanInfo::V41(c) = s.channel_infos[&2].raw else { panic!("expected V41") };
            assert_eq!({ c.userflags }, 0);
        });
    }

    #[test]
    fn scoped_patch_applies_within_range() {
        let mirror = Mirror::default();
        mirror.write(|s| {
            s.proc_chans = 4;
            s.channel_infos.insert(2, ChannelRecord { class: ChannelClass::Any, raw: chan_info(2) });
        });

        mirror.patch_scoped(2, -1, |raw| if let ChanInfo::V41(c) = raw { c.userflags = 7 });

        mirror.read(|s| {
            let ChanInfo::V41(c) = s.channel_infos[&2].raw else { panic!("expected V41") };
            assert_eq!({ c.userflags }, 7);
        });
    }
}
