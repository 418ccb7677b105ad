//! Handler pipeline: drains the receive queue, maintains the monotonic
//! clock and out-of-order detection, and fans packets out to callbacks.
//!
//! Internal mirror-maintenance hooks (run-level tracking, channel-table
//! refresh, group membership, nplay/log surfacing) are registered as
//! ordinary configuration callbacks at construction time, exactly the way a
//! caller's own callback is registered later — `nsp-device` has no
//! privileged dispatch path, it just gets there first.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;

use nsp_protocol::factory;
use nsp_protocol::header::{Header, WireVersion};
use nsp_protocol::packet::{Body, ChanInfo};
use nsp_protocol::types::{ChannelClass, PacketType};

use nsp_net::queue::{QueueReceiver, RawPacket};
use nsp_util::time::DeviceTick;

use crate::events::ConfigEvents;
use crate::mirror::Mirror;
use crate::startup::RunLevel;

/// Copies one field from a decoded scoped reply into the mirrored raw
/// record, matched on the wire version both sides share.
macro_rules! copy_field {
    ($dst:expr, $src:expr, $field:ident) => {
        match ($dst, $src) {
            (ChanInfo::V311(d), ChanInfo::V311(s)) => d.$field = s.$field,
            (ChanInfo::V41(d), ChanInfo::V41(s)) => d.$field = s.$field,
            _ => {}
        }
    };
}

pub type EventCallback = Arc<dyn Fn(&Header, &Body) + Send + Sync>;
pub type GroupCallback = Arc<dyn Fn(&Header, u32, &Body) + Send + Sync>;
pub type ConfigCallback = Arc<dyn Fn(&Header, &Body) + Send + Sync>;

/// Opaque handle returned by `register_*`, consumed by `unregister_*`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CallbackHandle(u64);

struct Slot<C> {
    next_id: AtomicU64,
    entries: Mutex<Vec<(u64, C)>>,
}

// Manual impl: `derive(Default)` would add a spurious `C: Default` bound
// even though an empty `Vec<(u64, C)>` never needs one.
impl<C> Default for Slot<C> {
    fn default() -> Self {
        Slot { next_id: AtomicU64::new(0), entries: Mutex::new(Vec::new()) }
    }
}

impl<C: Clone> Slot<C> {
    fn register(&self, cb: C) -> CallbackHandle {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.entries.lock().unwrap().push((id, cb));
        CallbackHandle(id)
    }

    fn unregister(&self, handle: CallbackHandle) {
        self.entries.lock().unwrap().retain(|(id, _)| *id != handle.0);
    }

    /// Snapshots the current list under the lock, so a registration racing
    /// with dispatch is visible only on the next packet, never retroactively.
    fn snapshot(&self) -> Vec<C> {
        self.entries.lock().unwrap().iter().map(|(_, cb)| cb.clone()).collect()
    }
}

/// All callback registries a `Device` exposes through its facade.
#[derive(Default)]
pub struct Registries {
    event: Mutex<HashMap<ChannelClass, Slot<EventCallback>>>,
    group: Mutex<HashMap<u32, Slot<GroupCallback>>>,
    config: Mutex<HashMap<u16, Slot<ConfigCallback>>>,
}

impl Registries {
    pub fn register_event(&self, class: ChannelClass, cb: EventCallback) -> CallbackHandle {
        let mut map = self.event.lock().unwrap();
        map.entry(class).or_default().register(cb)
    }

    pub fn unregister_event(&self, class: ChannelClass, handle: CallbackHandle) {
        if let Some(slot) = self.event.lock().unwrap().get(&class) {
            slot.unregister(handle);
        }
    }

    pub fn register_group(&self, group_id: u32, cb: GroupCallback) -> CallbackHandle {
        let mut map = self.group.lock().unwrap();
        map.entry(group_id).or_default().register(cb)
    }

    pub fn unregister_group(&self, group_id: u32, handle: CallbackHandle) {
        if let Some(slot) = self.group.lock().unwrap().get(&group_id) {
            slot.unregister(handle);
        }
    }

    pub fn register_config(&self, pkt_type: u16, cb: ConfigCallback) -> CallbackHandle {
        let mut map = self.config.lock().unwrap();
        map.entry(pkt_type).or_default().register(cb)
    }

    pub fn unregister_config(&self, pkt_type: u16, handle: CallbackHandle) {
        if let Some(slot) = self.config.lock().unwrap().get(&pkt_type) {
            slot.unregister(handle);
        }
    }

    fn event_snapshot(&self, class: ChannelClass) -> Vec<EventCallback> {
        self.event.lock().unwrap().get(&class).map(Slot::snapshot).unwrap_or_default()
    }

    fn group_snapshot(&self, group_id: u32) -> Vec<GroupCallback> {
        self.group.lock().unwrap().get(&group_id).map(Slot::snapshot).unwrap_or_default()
    }

    fn config_snapshot(&self, pkt_type: u16) -> Vec<ConfigCallback> {
        self.config.lock().unwrap().get(&pkt_type).map(Slot::snapshot).unwrap_or_default()
    }
}

/// How often (in received-but-undispatched packets of a given type) an
/// unhandled configuration type is re-logged, mirroring pycbsdk's
/// `warn_unhandled` throttle.
const UNHANDLED_LOG_PERIOD: u64 = 100;

pub struct Handler {
    mirror: Arc<Mirror>,
    events: Arc<ConfigEvents>,
    registries: Arc<Registries>,
    version: WireVersion,
    last_group6_time: Mutex<DeviceTick>,
    last_group6_raw: Mutex<Option<Vec<u8>>>,
    seen_unhandled_types: Mutex<HashSet<u16>>,
    unhandled_counts: Mutex<HashMap<u16, u64>>,
}

impl Handler {
    pub fn new(mirror: Arc<Mirror>, events: Arc<ConfigEvents>, version: WireVersion) -> Arc<Handler> {
        let handler = Arc::new(Handler {
            mirror,
            events,
            registries: Arc::new(Registries::default()),
            version,
            last_group6_time: Mutex::new(DeviceTick::new(0)),
            last_group6_raw: Mutex::new(None),
            seen_unhandled_types: Mutex::new(HashSet::new()),
            unhandled_counts: Mutex::new(HashMap::new()),
        });

        handler.install_internal_hooks();
        handler
    }

    pub fn registries(&self) -> Arc<Registries> {
        self.registries.clone()
    }

    /// Raw bytes of the last in-order group-6 (raw) packet, kept around so a
    /// caller investigating an out-of-order warning can inspect what
    /// preceded it.
    pub fn last_group6_raw(&self) -> Option<Vec<u8>> {
        self.last_group6_raw.lock().unwrap().clone()
    }

    /// Spawns the dispatch thread. The receive queue only exists once the
    /// transport has opened its socket, so this runs from `connect()` even
    /// though the handler object itself is constructed earlier with the
    /// device — acceptable during the startup handshake.
    pub fn spawn(self: &Arc<Self>, rx: QueueReceiver) -> JoinHandle<()> {
        let handler = self.clone();
        std::thread::spawn(move || {
            nsp_util::thread::set_name("nsp-handler");
            loop {
                match rx.recv() {
                    Ok(raw) => handler.dispatch(raw),
                    Err(_) => return,
                }
            }
        })
    }

    /// The core per-packet pipeline.
    fn dispatch(&self, raw: RawPacket) {
        let RawPacket { header, body: body_bytes } = raw;

        let tick = DeviceTick::new(header.time);

        self.mirror.write(|s| {
            s.monitor.pkts_received += 1;
            if tick.is_after(s.monitor.last_time) {
                s.monitor.last_time = tick;
            }
        });

        if header.is_group() && header.pkt_type as u32 == 6 {
            let mut last = self.last_group6_time.lock().unwrap();
            if !tick.is_after(*last) {
                log::warn!(
                    "out-of-order group-6 packet: time={} < last_group_time={} (delta={})",
                    header.time, last.raw(), last.raw() - header.time
                );
            } else {
                *last = tick;
                *self.last_group6_raw.lock().unwrap() = Some(body_bytes.clone());
            }
        }

        if header.is_configuration() {
            self.dispatch_configuration(&header, &body_bytes);
        } else if header.is_group() {
            self.dispatch_group(&header, &body_bytes);
        } else {
            let class = self.mirror.read(|s| {
                s.channel_infos.get(&(header.chid as u32)).map(|r| r.class).unwrap_or(ChannelClass::Any)
            });
            self.dispatch_event(&header, class, &body_bytes);
        }
    }

    fn dispatch_configuration(&self, header: &Header, body_bytes: &[u8]) {
        let recipients = self.registries.config_snapshot(header.pkt_type);

        if recipients.is_empty() {
            self.record_unhandled_config(header.pkt_type);
            return;
        }

        let body = match factory::decode(header, self.version, None, body_bytes) {
            Ok(body) => body,
            Err(err) => {
                log::debug!("dropping undecodable configuration packet type={:#06x}: {err}", header.pkt_type);
                return;
            }
        };

        for cb in recipients {
            cb(header, &body);
        }
    }

    fn dispatch_group(&self, header: &Header, body_bytes: &[u8]) {
        let group_id = header.pkt_type as u32;
        let recipients = self.registries.group_snapshot(group_id);

        if recipients.is_empty() {
            return;
        }

        let body = match factory::decode(header, self.version, None, body_bytes) {
            Ok(body) => body,
            Err(err) => {
                log::debug!("dropping undecodable group packet group={group_id}: {err}");
                return;
            }
        };

        let body = self.truncate_group_samples(group_id, body);

        for cb in recipients {
            cb(header, group_id, &body);
        }
    }

    /// Wire carries an even number of i16 words regardless of the enabled
    /// channel count (odd counts leave one dummy trailing slot); truncate to
    /// the group's actual enabled-channel count from the mirror.
    fn truncate_group_samples(&self, group_id: u32, body: Body) -> Body {
        let Body::SampleGroup(mut group) = body else { return body };
        let nchans = self.mirror.read(|s| s.group_nchans.get(&group_id).copied());
        if let Some(nchans) = nchans {
            group.samples.truncate(nchans);
        }
        Body::SampleGroup(group)
    }

    fn dispatch_event(&self, header: &Header, class: ChannelClass, body_bytes: &[u8]) {
        let mut recipients = self.registries.event_snapshot(class);
        if class != ChannelClass::Any {
            recipients.extend(self.registries.event_snapshot(ChannelClass::Any));
        }

        if recipients.is_empty() {
            return;
        }

        let body = match factory::decode(header, self.version, Some(class), body_bytes) {
            Ok(body) => body,
            Err(err) => {
                log::debug!("dropping undecodable event packet chid={}: {err}", header.chid);
                return;
            }
        };

        for cb in recipients {
            cb(header, &body);
        }
    }

    fn record_unhandled_config(&self, pkt_type: u16) {
        let mut seen = self.seen_unhandled_types.lock().unwrap();
        if seen.insert(pkt_type) {
            log::debug!("no recipients registered for configuration type {pkt_type:#06x}");
        }
        drop(seen);

        let mut counts = self.unhandled_counts.lock().unwrap();
        let count = counts.entry(pkt_type).or_insert(0);
        *count += 1;
        if *count % UNHANDLED_LOG_PERIOD == 0 {
            log::debug!("{count} unhandled packets of configuration type {pkt_type:#06x} so far");
        }
    }

    /// Registers the device's own mirror-maintenance logic as ordinary
    /// configuration callbacks, first in registration order so a caller's
    /// own callback for the same type always observes an up-to-date mirror.
    fn install_internal_hooks(self: &Arc<Self>) {
        let mirror = self.mirror.clone();
        let events = self.events.clone();
        let sysrep = Arc::new(move |h: &Header, body: &Body| {
            let Some((runlevel, sysfreq)) = sys_info_fields(body) else { return };
            mirror.write(|s| {
                s.sysfreq = Some(sysfreq);
                s.run_level = run_level_from_wire(runlevel);
                s.instrument = h.instrument as i32;
            });
            events.sysrep.signal();
            if run_level_from_wire(runlevel) == RunLevel::Standby {
                events.runlevel_standby.signal();
            }
            if run_level_from_wire(runlevel) == RunLevel::Running {
                events.runlevel_running.signal();
            }
        }) as ConfigCallback;
        for ty in [
            PacketType::SysRep as u16,
            PacketType::SysRepSpkLen as u16,
            PacketType::SysRepRunLevel as u16,
            PacketType::SysRepTransport as u16,
        ] {
            self.registries.register_config(ty, sysrep.clone());
        }

        let mirror = self.mirror.clone();
        self.registries.register_config(PacketType::ProcRep as u16, Arc::new(move |_h, body| {
            if let Body::ProcInfo(info) = body {
                mirror.write(|s| s.proc_chans = info.chancount);
            }
        }));

        let mirror = self.mirror.clone();
        self.registries.register_config(PacketType::GroupRep as u16, Arc::new(move |_h, body| {
            if let Body::GroupInfo(info) = body {
                let chans: Vec<u32> = info.chans.iter().map(|&c| c as u32).collect();
                let nchans = chans.len();
                mirror.write(|s| {
                    s.group_infos.insert(info.group, chans);
                    s.group_nchans.insert(info.group, nchans);
                });
            }
        }));

        let mirror = self.mirror.clone();
        let events = self.events.clone();
        self.registries.register_config(PacketType::ChanRep as u16, Arc::new(move |h, body| {
            if let Body::ChanInfo(info) = body {
                mirror.apply_full_chan_info(info, h.instrument as i32);
                events.chaninfo.signal();
            }
        }));

        self.install_scoped_chaninfo_hook(PacketType::ChanRepAinp as u16, |dst, src| {
            copy_field!(dst, src, ainpopts);
            copy_field!(dst, src, lncrate);
            copy_field!(dst, src, refelecchan);
        });
        self.install_scoped_chaninfo_hook(PacketType::ChanRepSpk as u16, |dst, src| {
            copy_field!(dst, src, spkopts);
            copy_field!(dst, src, spkfilter);
        });
        self.install_scoped_chaninfo_hook(PacketType::ChanRepRejectAmplitude as u16, |dst, src| {
            copy_field!(dst, src, spkopts);
            copy_field!(dst, src, amplrejpos);
            copy_field!(dst, src, amplrejneg);
        });
        self.install_scoped_chaninfo_hook(PacketType::ChanRepAutoThreshold as u16, |dst, src| {
            copy_field!(dst, src, spkopts);
            copy_field!(dst, src, spkthrlevel);
            copy_field!(dst, src, spkthrlimit);
        });
        self.install_scoped_chaninfo_hook(PacketType::ChanRepSmp as u16, |dst, src| {
            copy_field!(dst, src, smpfilter);
            copy_field!(dst, src, smpgroup);
        });
        self.install_scoped_chaninfo_hook(PacketType::ChanRepSpkHps as u16, |dst, src| {
            copy_field!(dst, src, spkhoops);
        });
        self.install_scoped_chaninfo_hook(PacketType::ChanRepAout as u16, |dst, src| {
            copy_field!(dst, src, aoutopts);
        });
        self.install_scoped_chaninfo_hook(PacketType::ChanRepScale as u16, |dst, src| {
            copy_field!(dst, src, scalin);
            copy_field!(dst, src, scalout);
        });
        self.install_scoped_chaninfo_hook(PacketType::ChanRepDinp as u16, |dst, src| {
            copy_field!(dst, src, dinpopts);
            copy_field!(dst, src, eopchar);
        });
        self.install_scoped_chaninfo_hook(PacketType::ChanRepDout as u16, |dst, src| {
            copy_field!(dst, src, doutopts);
            copy_field!(dst, src, doutcaps);
        });
        self.install_scoped_chaninfo_hook(PacketType::ChanRepLabel as u16, |dst, src| {
            copy_field!(dst, src, label);
            copy_field!(dst, src, userflags);
        });
        self.install_scoped_chaninfo_hook(PacketType::ChanRepSpkThr as u16, |dst, src| {
            copy_field!(dst, src, spkthrlevel);
        });
        // CHANREPNTRODEGROUP / CHANREPDISP / CHANREPUNITOVERRIDES: no mirror
        // write yet, but the event still fires so a caller awaiting the
        // write isn't stuck.
        for ty in [
            PacketType::ChanRepNTrodeGroup as u16,
            PacketType::ChanRepDisp as u16,
            PacketType::ChanRepUnitOverrides as u16,
        ] {
            let events = self.events.clone();
            self.registries.register_config(ty, Arc::new(move |_h, _body| events.chaninfo.signal()));
        }

        let mirror = self.mirror.clone();
        self.registries.register_config(PacketType::NplayRep as u16, Arc::new(move |_h, body| {
            if let Body::NPlay(nplay) = body {
                mirror.write(|s| s.nplay = Some(nplay.clone()));
            }
        }));

        let mirror = self.mirror.clone();
        self.registries.register_config(PacketType::LogRep as u16, Arc::new(move |_h, body| {
            if let Body::Log(log_pkt) = body {
                let text = String::from_utf8_lossy(&log_pkt.desc);
                match log_pkt.severity {
                    0 => log::info!("device log: {text}"),
                    1 => log::error!("device log (critical): {text}"),
                    5 => log::error!("device log (error): {text}"),
                    other => log::warn!("device log (severity {other}): {text}"),
                }
            }
            let _ = mirror;
        }));

        let mirror = self.mirror.clone();
        self.registries.register_config(PacketType::SysProtocolMonitor as u16, Arc::new(move |_h, body| {
            let counter = match body {
                Body::SysProtocolMonitorV41(m) => Some(m.counter),
                Body::SysProtocolMonitorV311(_) => None,
                _ => None,
            };
            if let Some(counter) = counter {
                mirror.write(|s| {
                    if let Some(last) = s.monitor.last_protocol_monitor_counter {
                        let gap = counter.wrapping_sub(last);
                        if gap > 1 {
                            log::warn!("protocol monitor counter gap: last={last} now={counter} gap={gap}");
                        }
                    }
                    s.monitor.last_protocol_monitor_counter = Some(counter);
                });
            }
        }));
    }

    /// `patch` copies the fields this scoped reply is authoritative for from
    /// the freshly decoded `ChanInfo` into the mirrored raw record; anything
    /// it doesn't touch is left as the last full-scope `CHANREP` left it.
    fn install_scoped_chaninfo_hook(
        self: &Arc<Self>,
        pkt_type: u16,
        patch: impl Fn(&mut ChanInfo, &ChanInfo) + Send + Sync + 'static,
    ) {
        let mirror = self.mirror.clone();
        let events = self.events.clone();
        self.registries.register_config(pkt_type, Arc::new(move |h, body| {
            if let Body::ChanInfo(info) = body {
                let chan = info.chan();
                mirror.patch_scoped(chan, h.instrument as i32, |raw| patch(raw, info));
                events.chaninfo.signal();
            }
        }));
    }
}

fn run_level_from_wire(raw: u32) -> RunLevel {
    match raw {
        10 => RunLevel::Startup,
        20 => RunLevel::HardReset,
        30 => RunLevel::Standby,
        40 => RunLevel::Reset,
        50 => RunLevel::Running,
        60 => RunLevel::Stressed,
        70 => RunLevel::Error,
        80 => RunLevel::Shutdown,
        _ => RunLevel::Error,
    }
}

fn sys_info_fields(body: &Body) -> Option<(u32, u32)> {
    match body {
        Body::SysInfo(s) => Some((s.runlevel, s.sysfreq)),
        Body::SysInfoV42(s) => Some((s.runlevel, s.sysfreq)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nsp_protocol::header::WireVersion;
    use std::sync::atomic::AtomicU32;

    fn header(chid: u16, pkt_type: u16, time: u64) -> Header {
        Header { time, chid, pkt_type, dlen: 0, instrument: 0 }
    }

    #[test]
    fn group_callback_receives_truncated_samples() {
        let mirror = Arc::new(Mirror::default());
        mirror.write(|s| { s.group_nchans.insert(6, 2); });
        let events = Arc::new(ConfigEvents::default());
        let handler = Handler::new(mirror, events, WireVersion::V4_1);

        let received = Arc::new(Mutex::new(Vec::new()));
        let received2 = received.clone();
        handler.registries().register_group(6, Arc::new(move |_h, _g, body| {
            if let Body::SampleGroup(s) = body {
                received2.lock().unwrap().push(s.samples.clone());
            }
        }));

        let samples: Vec<i16> = vec![1, 2, 3, 4];
        let mut bytes = Vec::new();
        for s in &samples {
            bytes.extend_from_slice(&s.to_le_bytes());
        }

        handler.dispatch(RawPacket { header: header(0, 6, 100), body: bytes });

        assert_eq!(received.lock().unwrap()[0], vec![1, 2]);
    }

    #[test]
    fn out_of_order_group6_does_not_reorder_dispatch() {
        let mirror = Arc::new(Mirror::default());
        let events = Arc::new(ConfigEvents::default());
        let handler = Handler::new(mirror, events, WireVersion::V4_1);

        let order = Arc::new(Mutex::new(Vec::new()));
        let order2 = order.clone();
        handler.registries().register_group(6, Arc::new(move |h, _g, _body| {
            order2.lock().unwrap().push(h.time);
        }));

        handler.dispatch(RawPacket { header: header(0, 6, 1000), body: vec![] });
        handler.dispatch(RawPacket { header: header(0, 6, 999), body: vec![] });

        assert_eq!(*order.lock().unwrap(), vec![1000, 999]);
        assert_eq!(*handler.last_group6_time.lock().unwrap(), DeviceTick::new(1000));
    }

    #[test]
    fn config_family_fallback_type_still_dispatches() {
        let mirror = Arc::new(Mirror::default());
        let events = Arc::new(ConfigEvents::default());
        let handler = Handler::new(mirror, events, WireVersion::V4_1);

        let hits = Arc::new(AtomicU32::new(0));
        let hits2 = hits.clone();
        // register under the exact ChanRep type; a ChanRep-family scoped
        // type with no explicit registration should NOT hit this (the
        // factory's family fallback applies to decode, not to dispatch
        // lookup, which is always by exact registered type
        // applying only within the factory's own decode step).
        handler.registries().register_config(PacketType::ChanRep as u16, Arc::new(move |_h, _b| {
            hits2.fetch_add(1, Ordering::SeqCst);
        }));

        let bytes = vec![0u8; core::mem::size_of::<nsp_protocol::packet::ChanInfoV41>()];
        handler.dispatch(RawPacket { header: header(0x8000, PacketType::ChanRep as u16, 1), body: bytes });

        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }
}
