use std::sync::mpsc;
use std::sync::Arc;
use std::time::Duration;

use bytemuck::Zeroable;

use nsp_device::events::ConfigEvents;
use nsp_device::handler::Handler;
use nsp_device::mirror::Mirror;
use nsp_net::queue::{self, RawPacket};
use nsp_protocol::factory;
use nsp_protocol::header::{Header, WireVersion};
use nsp_protocol::packet::{Body, ChanInfo, ChanInfoV41, Log, ProcInfo};
use nsp_protocol::types::{PacketType, CONFIGURATION_CHID};

fn config_header(pkt_type: u16, time: u64) -> Header {
    Header { time, chid: CONFIGURATION_CHID, pkt_type, dlen: 0, instrument: 0 }
}

fn chan_info(chan: u32) -> ChanInfoV41 {
    let mut c: ChanInfoV41 = ChanInfoV41::zeroed();
    c.chan = chan;
    c
}

/// A `REQCONFIGALL` cascade that never delivers its terminal `SYSINFO` still
/// counts as complete once the channel table reaches `proc_chans` — the
/// same success criterion `Device::get_config` applies.
#[test]
fn incomplete_cascade_without_terminal_sysinfo_still_fills_channel_table() {
    let mirror = Arc::new(Mirror::default());
    let events = Arc::new(ConfigEvents::default());
    let handler = Handler::new(mirror.clone(), events, WireVersion::V4_1);

    let (tx, rx) = queue::channel();
    let join = handler.spawn(rx);

    let proc_info = ProcInfo {
        proc: 0,
        idcode: 0,
        ident: [0; 64],
        chanbase: 0,
        chancount: 3,
        bankcount: 0,
        groupcount: 0,
        filtcount: 0,
        sortcount: 0,
        unitcount: 0,
        hoopcount: 0,
        sortmethod: 0,
        version: 0,
    };
    tx.send(RawPacket {
        header: config_header(PacketType::ProcRep as u16, 1),
        body: factory::encode(&Body::ProcInfo(proc_info)),
    })
    .unwrap();

    for chan in 1..=3u32 {
        tx.send(RawPacket {
            header: config_header(PacketType::ChanRep as u16, 1 + chan as u64),
            body: factory::encode(&Body::ChanInfo(ChanInfo::V41(chan_info(chan)))),
        })
        .unwrap();
    }

    // deliberately no terminal SYSINFO/SYSREP packet follows.

    let (done_tx, done_rx) = mpsc::channel::<()>();
    handler.registries().register_config(
        PacketType::LogRep as u16,
        Arc::new(move |_h, _b| {
            let _ = done_tx.send(());
        }),
    );
    tx.send(RawPacket {
        header: config_header(PacketType::LogRep as u16, 100),
        body: factory::encode(&Body::Log(Log { mode: 0, severity: 0, name: [0; 16], desc: vec![] })),
    })
    .unwrap();
    done_rx.recv_timeout(Duration::from_secs(2)).expect("sentinel packet never dispatched");

    let (proc_chans, received) = mirror.read(|s| (s.proc_chans, s.channel_infos.len() as u32));
    assert_eq!(proc_chans, 3);
    assert_eq!(received, 3);

    drop(tx);
    join.join().unwrap();
}
