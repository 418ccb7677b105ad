//! Public facade: a `Device` handle wrapping the transport, handler and
//! configuration mirror behind the inherent methods a caller actually uses.
//! A stand-alone flat procedural API (`create_params`/`get_device`/...) some
//! client bindings layer on top of this is deliberately not provided here;
//! `Device::new` already collapses `create_params` + `get_device` since Rust
//! has no module-global device registry to thread a handle through.

use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;

use nsp_net::{Transport, TransportConfig};
use nsp_protocol::factory;
use nsp_protocol::header::{Header, WireVersion};
use nsp_protocol::packet::{Body, ChanInfo, SysInfo, SysInfoV42};
use nsp_protocol::types::{ChannelClass, PacketType, Transport as TransportFlags, CONFIGURATION_CHID};

use crate::config_ops;
use crate::error::{ConfigError, ConnectError};
use crate::events::ConfigEvents;
use crate::handler::{CallbackHandle, ConfigCallback, EventCallback, GroupCallback, Handler};
use crate::mirror::{ChannelRecord, Mirror};
use crate::params::Params;
use crate::startup::{
    RunLevel, GET_CONFIG_TIMEOUT, NPLAY_STEP_1_DELAY, NPLAY_STEP_2_DELAY, NPLAY_STEP_3_DELAY, RUNLEVEL_TIMEOUT,
};

macro_rules! get_field {
    ($info:expr, $field:ident) => {
        match $info {
            ChanInfo::V311(c) => c.$field,
            ChanInfo::V41(c) => c.$field,
        }
    };
}

/// A snapshot of the configuration mirror returned by `get_config`. Cheap to
/// clone; callers hold it instead of racing the handler thread's writes.
#[derive(Debug, Clone)]
pub struct ConfigSnapshot {
    pub proc_chans: u32,
    pub sysfreq: Option<u32>,
    pub instrument: i32,
    pub run_level: RunLevel,
    pub channel_count: usize,
}

pub struct Device {
    params: Params,
    mirror: Arc<Mirror>,
    events: Arc<ConfigEvents>,
    handler: Arc<Handler>,
    transport: Mutex<Option<Transport>>,
    handler_thread: Mutex<Option<JoinHandle<()>>>,
}

impl Device {
    pub fn new(params: Params) -> Arc<Device> {
        let mirror = Arc::new(Mirror::default());
        let events = Arc::new(ConfigEvents::default());
        let handler = Handler::new(mirror.clone(), events.clone(), params.wire_version);

        Arc::new(Device {
            params,
            mirror,
            events,
            handler,
            transport: Mutex::new(None),
            handler_thread: Mutex::new(None),
        })
    }

    pub fn wire_version(&self) -> WireVersion {
        self.params.wire_version
    }

    /// The instrument id last observed on a `SYSREP`, or 0 before the first
    /// one arrives (multi-instrument racks aside, single-instrument setups
    /// never populate anything else).
    fn instrument_id(&self) -> u8 {
        self.mirror.read(|s| if s.instrument >= 0 { s.instrument as u8 } else { 0 })
    }

    /// Runs the connection handshake and drives the run-level state machine
    /// to `Running`.
    pub fn connect(&self) -> Result<(), ConnectError> {
        let config: TransportConfig = self.params.transport_config();
        let (transport, rx) = Transport::open(config)?;
        let handler_thread = self.handler.clone().spawn(rx);

        *self.transport.lock().unwrap() = Some(transport);
        *self.handler_thread.lock().unwrap() = Some(handler_thread);

        self.events.sysrep.clear();
        self.set_runlevel(RunLevel::Running, RUNLEVEL_TIMEOUT)?;

        if self.run_level() != RunLevel::Running {
            self.events.runlevel_standby.clear();
            self.set_runlevel(RunLevel::HardReset, RUNLEVEL_TIMEOUT)?;
        }

        self.get_config(GET_CONFIG_TIMEOUT, true).ok();

        if self.run_level() != RunLevel::Running {
            self.events.runlevel_running.clear();
            self.set_runlevel_no_timeout(RunLevel::Reset);
        }

        if self.mirror.read(|s| s.has_nplay()) {
            self.run_nplay_choreography();
        }

        Ok(())
    }

    /// Re-sends the mirrored `NPlay` record unchanged between three paced
    /// delays. The instrument needs this settling time after a run-level
    /// transition before it will honor further `NPLAYSET` writes; the three
    /// delay constants are carried verbatim from the reference
    /// implementation's `_startup_sequence` (see `startup::NPLAY_STEP_*`).
    fn run_nplay_choreography(&self) {
        self.resend_nplay();
        std::thread::sleep(NPLAY_STEP_1_DELAY);
        self.resend_nplay();
        std::thread::sleep(NPLAY_STEP_2_DELAY);
        self.resend_nplay();
        std::thread::sleep(NPLAY_STEP_3_DELAY);
    }

    fn resend_nplay(&self) {
        let Some(nplay) = self.mirror.read(|s| s.nplay.clone()) else { return };
        let header = Header {
            time: 0,
            chid: CONFIGURATION_CHID,
            pkt_type: PacketType::NplaySet as u16,
            dlen: 0,
            instrument: self.instrument_id(),
        };
        let bytes = factory::encode_packet(&header, self.wire_version(), &Body::NPlay(nplay));
        let _ = self.transport_send(bytes);
    }

    /// Stops the handler and transport and joins both; the caller doesn't
    /// return until in-flight work has drained or been abandoned.
    pub fn disconnect(&self) {
        if let Some(transport) = self.transport.lock().unwrap().take() {
            transport.close();
        }
        if let Some(handle) = self.handler_thread.lock().unwrap().take() {
            let _ = handle.join();
        }
    }

    fn transport_send(&self, bytes: Vec<u8>) -> Result<(), ConfigError> {
        let guard = self.transport.lock().unwrap();
        match guard.as_ref() {
            Some(t) => t.send(bytes).map_err(ConfigError::from),
            None => Err(ConfigError::Transport(nsp_net::TransportError::Closed)),
        }
    }

    pub fn run_level(&self) -> RunLevel {
        self.mirror.read(|s| s.run_level)
    }

    pub fn get_runlevel(&self, force_refresh: bool, timeout: Duration) -> RunLevel {
        if force_refresh {
            let _ = self.set_runlevel(RunLevel::Running, timeout);
        }
        self.run_level()
    }

    /// `SYSSETRUNLEV`, awaiting the event associated with the target level
    /// (mirrors pycbsdk's `set_runlevel`: HardReset waits on `runlevel_standby`,
    /// Reset waits on `runlevel_running`, everything else waits on `sysrep`).
    pub fn set_runlevel(&self, level: RunLevel, timeout: Duration) -> Result<(), ConnectError> {
        let event = match level {
            RunLevel::HardReset => &self.events.runlevel_standby,
            RunLevel::Reset => &self.events.runlevel_running,
            _ => &self.events.sysrep,
        };
        event.clear();

        let body = Body::SysInfo(SysInfo { sysfreq: 0, spikelen: 0, spikepre: 0, resetque: 0, runlevel: level as u32, runflags: 0 });
        let header = Header {
            time: 1,
            chid: CONFIGURATION_CHID,
            pkt_type: PacketType::SysSetRunLevel as u16,
            dlen: 0,
            instrument: self.instrument_id(),
        };
        let bytes = factory::encode_packet(&header, self.wire_version(), &body);
        self.transport_send(bytes)?;

        if event.wait(timeout) {
            Ok(())
        } else {
            Err(ConnectError::RunLevelTimeout { expected: level })
        }
    }

    /// Blocks with no timeout.
    fn set_runlevel_no_timeout(&self, level: RunLevel) {
        self.events.runlevel_running.clear();
        let body = Body::SysInfo(SysInfo { sysfreq: 0, spikelen: 0, spikepre: 0, resetque: 0, runlevel: level as u32, runflags: 0 });
        let header = Header {
            time: 1,
            chid: CONFIGURATION_CHID,
            pkt_type: PacketType::SysSetRunLevel as u16,
            dlen: 0,
            instrument: self.instrument_id(),
        };
        let bytes = factory::encode_packet(&header, self.wire_version(), &body);
        if self.transport_send(bytes).is_ok() {
            self.events.runlevel_running.wait_forever();
        }
    }

    /// `REQCONFIGALL`. Success criterion is channel count, not the
    /// (commonly dropped) terminal `SYSINFO`.
    pub fn get_config(&self, timeout: Duration, force_refresh: bool) -> Result<ConfigSnapshot, ConfigError> {
        if force_refresh {
            self.mirror.clear_for_refresh();
        }

        self.events.sysrep.clear();
        let header = Header { time: 1, chid: CONFIGURATION_CHID, pkt_type: PacketType::ReqConfigAll as u16, dlen: 0, instrument: self.instrument_id() };
        let bytes = factory::encode_packet(&header, self.wire_version(), &Body::Generic(nsp_protocol::packet::Generic { words: vec![] }));
        self.transport_send(bytes)?;

        if !self.events.sysrep.wait(timeout) {
            log::debug!("did not receive final SYSREP for REQCONFIGALL, checking channel count anyway");
        }

        let (proc_chans, received) = self.mirror.read(|s| (s.proc_chans, s.channel_infos.len() as u32));
        if proc_chans == 0 || received != proc_chans {
            return Err(ConfigError::IncompleteConfig { expected: proc_chans, received });
        }

        Ok(self.snapshot())
    }

    pub fn snapshot(&self) -> ConfigSnapshot {
        self.mirror.read(|s| ConfigSnapshot {
            proc_chans: s.proc_chans,
            sysfreq: s.sysfreq,
            instrument: s.instrument,
            run_level: s.run_level,
            channel_count: s.channel_infos.len(),
        })
    }

    pub fn channel_snapshot(&self, chan: u32) -> Option<ChannelRecord> {
        self.mirror.channel_snapshot(chan)
    }

    pub fn set_transport(&self, flags: TransportFlags, enable: bool, timeout: Duration) -> Result<(), ConfigError> {
        self.events.sysrep.clear();
        let current = self.mirror.read(|s| s.transport_flags);
        let next = if enable { current | flags.bits() } else { current & !flags.bits() };

        let body = Body::SysInfoV42(SysInfoV42 {
            sysfreq: 0, spikelen: 0, spikepre: 0, resetque: 0, runlevel: 0, runflags: 0,
            transport: next, reserved: [0; 2],
        });
        let header = Header { time: 1, chid: CONFIGURATION_CHID, pkt_type: PacketType::SysSetTransport as u16, dlen: 0, instrument: self.instrument_id() };
        let bytes = factory::encode_packet(&header, self.wire_version(), &body);
        self.transport_send(bytes)?;

        if self.events.sysrep.wait(timeout) {
            self.mirror.write(|s| s.transport_flags = next);
            Ok(())
        } else {
            Err(ConfigError::NoReply)
        }
    }

    pub fn send_comment(&self, text: &str, timestamp: Option<u64>) -> Result<(), ConfigError> {
        let mut bytes = [0u8; 128];
        let src = text.as_bytes();
        let n = src.len().min(bytes.len());
        bytes[..n].copy_from_slice(&src[..n]);

        let time_started = timestamp.unwrap_or_else(|| self.mirror.read(|s| s.monitor.last_time.raw()));
        let comment = nsp_protocol::packet::CommentV40 { charset: 0, flags: 0, time_started, rgba: 0, text: bytes.to_vec() };
        let header = Header { time: 1, chid: CONFIGURATION_CHID, pkt_type: PacketType::CommentSet as u16, dlen: 0, instrument: self.instrument_id() };
        let out = factory::encode_packet(&header, self.wire_version(), &Body::CommentV40(comment));
        self.transport_send(out)
    }

    /// Sends a pre-built `ChanInfo` record as a full-scope `CHANSET`, per
    /// pycbsdk's `configure_channel_by_packet` — used when a caller already
    /// has an edited record (e.g. from a prior `get_config`) rather than
    /// going through one of the scoped setters below.
    pub fn set_channel_config_by_packet(&self, info: ChanInfo, timeout: Duration) -> Result<(), ConfigError> {
        let chan = info.chan();
        self.events.chaninfo.clear();
        let header = Header { time: 0, chid: CONFIGURATION_CHID, pkt_type: PacketType::ChanSet as u16, dlen: 0, instrument: self.instrument_id() };
        let bytes = factory::encode_packet(&header, self.wire_version(), &Body::ChanInfo(info));
        self.transport_send(bytes)?;
        self.confirm_or_diagnose(chan, timeout, |_| true)
    }

    fn apply_channel_op(
        &self,
        chan: u32,
        timeout: Duration,
        build: impl FnOnce(ChannelRecord, u8, WireVersion) -> Vec<u8>,
        applied: impl Fn(&ChanInfo) -> bool,
    ) -> Result<(), ConfigError> {
        let record = self.channel_snapshot(chan).ok_or(ConfigError::NoReply)?;
        self.events.chaninfo.clear();
        let bytes = build(record, self.instrument_id(), self.wire_version());
        self.transport_send(bytes)?;
        if timeout.is_zero() {
            return Ok(());
        }
        self.confirm_or_diagnose(chan, timeout, applied)
    }

    /// If the `chaninfo` event doesn't fire within `timeout`, force a
    /// refresh and compare the mirrored field against what we asked for —
    /// distinguishing "no ack, and it didn't apply" from "no ack, but it
    /// did" rather than treating every timeout as a hard failure.
    fn confirm_or_diagnose(&self, chan: u32, timeout: Duration, applied: impl Fn(&ChanInfo) -> bool) -> Result<(), ConfigError> {
        if self.events.chaninfo.wait(timeout) {
            return Ok(());
        }

        let _ = self.get_config(GET_CONFIG_TIMEOUT, true);
        match self.channel_snapshot(chan) {
            Some(record) if applied(&record.raw) => Err(ConfigError::NoReplyButApplied),
            _ => Err(ConfigError::NoReply),
        }
    }

    /// `CHANSETSMP` + the companion `CHANSETAINP` raw-stream toggle: groups
    /// 0/5 clear `refelec_rawstream`, group 6 sets it, anything else sends
    /// no toggle and leaves the bit as it was.
    pub fn set_channel_sample_group(&self, chan: u32, group: u32, timeout: Duration) -> Result<(), ConfigError> {
        let record = self.channel_snapshot(chan).ok_or(ConfigError::NoReply)?;
        if let Some(toggle) = config_ops::set_channel_refelec_rawstream(record, group, self.instrument_id(), self.wire_version()) {
            self.transport_send(toggle)?;
            std::thread::sleep(config_ops::SAMPLE_GROUP_SETTLE_DELAY);
        }

        self.apply_channel_op(
            chan,
            timeout,
            |record, inst, ver| config_ops::set_channel_sample_group(record, group, inst, ver),
            |info| get_field!(info, smpgroup) == group,
        )
    }

    pub fn set_channel_sample_filter(&self, chan: u32, smpfilter: u32, timeout: Duration) -> Result<(), ConfigError> {
        self.apply_channel_op(
            chan, timeout,
            |record, inst, ver| config_ops::set_channel_sample_filter(record, smpfilter, inst, ver),
            |info| get_field!(info, smpfilter) == smpfilter,
        )
    }

    pub fn set_channel_label(&self, chan: u32, label: &str, timeout: Duration) -> Result<(), ConfigError> {
        let mut expected = [0u8; 16];
        let src = label.as_bytes();
        let n = src.len().min(16);
        expected[..n].copy_from_slice(&src[..n]);

        self.apply_channel_op(
            chan, timeout,
            |record, inst, ver| config_ops::set_channel_label(record, label, inst, ver),
            move |info| get_field!(info, label) == expected,
        )
    }

    pub fn set_channel_spike_filter(&self, chan: u32, spkopts: u32, spkfilter: u32, timeout: Duration) -> Result<(), ConfigError> {
        self.apply_channel_op(
            chan, timeout,
            |record, inst, ver| config_ops::set_channel_spike_filter(record, spkopts, spkfilter, inst, ver),
            move |info| get_field!(info, spkopts) == spkopts && get_field!(info, spkfilter) == spkfilter,
        )
    }

    pub fn set_channel_auto_threshold(&self, chan: u32, enable: bool, timeout: Duration) -> Result<(), ConfigError> {
        use nsp_protocol::types::AInpSpk;
        self.apply_channel_op(
            chan, timeout,
            move |record, inst, ver| config_ops::set_channel_auto_threshold(record, enable, inst, ver),
            move |info| (get_field!(info, spkopts) & AInpSpk::THRAUTO.bits() != 0) == enable,
        )
    }

    pub fn set_channel_spike_threshold(&self, chan: u32, level: i32, timeout: Duration) -> Result<(), ConfigError> {
        self.apply_channel_op(
            chan, timeout,
            move |record, inst, ver| config_ops::set_channel_spike_threshold(record, level, inst, ver),
            move |info| get_field!(info, spkthrlevel) == level,
        )
    }

    pub fn set_channel_hoops(
        &self,
        chan: u32,
        hoops: [[nsp_protocol::types::Hoop; nsp_protocol::MAX_HOOPS]; nsp_protocol::MAX_UNITS],
        timeout: Duration,
    ) -> Result<(), ConfigError> {
        self.apply_channel_op(
            chan, timeout,
            move |record, inst, ver| config_ops::set_channel_hoops(record, hoops, inst, ver),
            |_| true,
        )
    }

    pub fn set_channel_lnc(&self, chan: u32, enable: bool, timeout: Duration) -> Result<(), ConfigError> {
        use nsp_protocol::types::AnaInpOpts;
        self.apply_channel_op(
            chan, timeout,
            move |record, inst, ver| config_ops::set_channel_lnc(record, enable, inst, ver),
            move |info| (info.ainpopts() & AnaInpOpts::LNC_MASK.bits() != 0) == enable,
        )
    }

    /// `lncrate` is a ChanInfo field in the later pycbsdk revision (Open
    /// Question 4 in DESIGN.md); `set_global_lnc` below is the dedicated
    /// `LNCSET` packet.
    pub fn set_channel_lnc_rate(&self, chan: u32, lncrate: u32, timeout: Duration) -> Result<(), ConfigError> {
        self.apply_channel_op(
            chan, timeout,
            move |record, inst, ver| config_ops::set_channel_lnc_rate(record, lncrate, inst, ver),
            move |info| get_field!(info, lncrate) == lncrate,
        )
    }

    pub fn set_channel_dc_offset(&self, chan: u32, enable: bool, timeout: Duration) -> Result<(), ConfigError> {
        use nsp_protocol::types::AnaInpOpts;
        self.apply_channel_op(
            chan, timeout,
            move |record, inst, ver| config_ops::set_channel_dc_offset(record, enable, inst, ver),
            move |info| (info.ainpopts() & AnaInpOpts::REFELEC_OFFSETCORRECT.bits() != 0) == enable,
        )
    }

    pub fn set_global_lnc(&self, freq: u32, refchan: u32, global_mode: u32) -> Result<(), ConfigError> {
        let bytes = config_ops::set_global_lnc(freq, refchan, global_mode, self.instrument_id(), self.wire_version());
        self.transport_send(bytes)
    }

    pub fn set_channel_aout(&self, chan: u32, aoutopts: u32, timeout: Duration) -> Result<(), ConfigError> {
        self.apply_channel_op(
            chan, timeout,
            move |record, inst, ver| config_ops::set_channel_aout(record, aoutopts, inst, ver),
            move |info| get_field!(info, aoutopts) == aoutopts,
        )
    }

    pub fn set_channel_dout(&self, chan: u32, doutopts: u32, timeout: Duration) -> Result<(), ConfigError> {
        self.apply_channel_op(
            chan, timeout,
            move |record, inst, ver| config_ops::set_channel_dout(record, doutopts, inst, ver),
            move |info| get_field!(info, doutopts) == doutopts,
        )
    }

    pub fn set_channel_dinp(&self, chan: u32, dinpopts: u32, timeout: Duration) -> Result<(), ConfigError> {
        self.apply_channel_op(
            chan, timeout,
            move |record, inst, ver| config_ops::set_channel_dinp(record, dinpopts, inst, ver),
            move |info| get_field!(info, dinpopts) == dinpopts,
        )
    }

    pub fn set_channel_scale(
        &self,
        chan: u32,
        scalin: nsp_protocol::types::Scaling,
        scalout: nsp_protocol::types::Scaling,
        timeout: Duration,
    ) -> Result<(), ConfigError> {
        self.apply_channel_op(
            chan, timeout,
            move |record, inst, ver| config_ops::set_channel_scale(record, scalin, scalout, inst, ver),
            |_| true,
        )
    }

    /// Disables a channel by clearing its sample group (moves it to group 0,
    /// same as `set_channel_sample_group(chan, 0, ...)` — pycbsdk's
    /// `configure_channel_disable` does exactly this, not a dedicated
    /// disable bit).
    pub fn set_channel_disable(&self, chan: u32, timeout: Duration) -> Result<(), ConfigError> {
        self.set_channel_sample_group(chan, 0, timeout)
    }

    pub fn set_all_channels_disable(&self, class: ChannelClass) {
        let chans: Vec<u32> = self.mirror.read(|s| {
            s.channel_infos.iter().filter(|(_, r)| r.class == class).map(|(&chan, _)| chan).collect()
        });
        for chan in chans {
            if let Err(err) = self.set_channel_disable(chan, Duration::ZERO) {
                log::debug!("disabling channel {chan} failed to send: {err}");
            }
        }
    }

    pub fn register_event_callback(&self, class: ChannelClass, cb: EventCallback) -> CallbackHandle {
        self.handler.registries().register_event(class, cb)
    }

    pub fn unregister_event_callback(&self, class: ChannelClass, handle: CallbackHandle) {
        self.handler.registries().unregister_event(class, handle);
    }

    /// Spike callbacks are `FrontEnd`-class event callbacks under the hood;
    /// kept as a named convenience since callers reach for it by that name.
    pub fn register_spike_callback(&self, cb: EventCallback) -> CallbackHandle {
        self.register_event_callback(ChannelClass::FrontEnd, cb)
    }

    pub fn unregister_spike_callback(&self, handle: CallbackHandle) {
        self.unregister_event_callback(ChannelClass::FrontEnd, handle);
    }

    pub fn register_group_callback(&self, group_id: u32, cb: GroupCallback) -> CallbackHandle {
        self.handler.registries().register_group(group_id, cb)
    }

    pub fn unregister_group_callback(&self, group_id: u32, handle: CallbackHandle) {
        self.handler.registries().unregister_group(group_id, handle);
    }

    pub fn register_config_callback(&self, pkt_type: u16, cb: ConfigCallback) -> CallbackHandle {
        self.handler.registries().register_config(pkt_type, cb)
    }

    pub fn unregister_config_callback(&self, pkt_type: u16, handle: CallbackHandle) {
        self.handler.registries().unregister_config(pkt_type, handle);
    }

    pub fn register_comment_callback(&self, cb: ConfigCallback) -> CallbackHandle {
        self.register_config_callback(PacketType::CommentRep as u16, cb)
    }

    pub fn unregister_comment_callback(&self, handle: CallbackHandle) {
        self.unregister_config_callback(PacketType::CommentRep as u16, handle);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    fn params() -> Params {
        Params::new(Ipv4Addr::LOCALHOST, Ipv4Addr::LOCALHOST)
    }

    #[test]
    fn new_device_starts_in_startup_runlevel() {
        let device = Device::new(params());
        assert_eq!(device.run_level(), RunLevel::Startup);
    }

    #[test]
    fn disconnect_without_connect_is_a_noop() {
        let device = Device::new(params());
        device.disconnect();
    }

    #[test]
    fn set_all_channels_disable_with_no_matching_channels_sends_nothing() {
        let device = Device::new(params());
        device.set_all_channels_disable(ChannelClass::Audio);
    }
}
