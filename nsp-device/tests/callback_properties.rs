use std::sync::mpsc;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use nsp_device::events::ConfigEvents;
use nsp_device::handler::Handler;
use nsp_device::mirror::Mirror;
use nsp_net::queue::{self, RawPacket};
use nsp_protocol::factory;
use nsp_protocol::header::{Header, WireVersion};
use nsp_protocol::packet::{Body, Generic, Log, SampleGroup};
use nsp_protocol::types::{ChannelClass, PacketType, CONFIGURATION_CHID};

fn wait_for_sentinel(handler: &Handler, tx: &queue::QueueSender) {
    let (done_tx, done_rx) = mpsc::channel::<()>();
    handler.registries().register_config(
        PacketType::LogRep as u16,
        Arc::new(move |_h, _b| {
            let _ = done_tx.send(());
        }),
    );
    tx.send(RawPacket {
        header: Header { time: u64::MAX, chid: CONFIGURATION_CHID, pkt_type: PacketType::LogRep as u16, dlen: 0, instrument: 0 },
        body: factory::encode(&Body::Log(Log { mode: 0, severity: 0, name: [0; 16], desc: vec![] })),
    })
    .unwrap();
    done_rx.recv_timeout(Duration::from_secs(5)).expect("sentinel packet never dispatched");
}

/// Callbacks registered for the same class run in registration order, and an
/// unregistration mid-stream takes effect on the next dispatched packet, not
/// retroactively.
#[test]
fn registration_order_and_unregistration_take_effect_on_next_packet() {
    let mirror = Arc::new(Mirror::default());
    let events = Arc::new(ConfigEvents::default());
    let handler = Handler::new(mirror, events, WireVersion::V4_1);
    let (tx, rx) = queue::channel();
    let join = handler.spawn(rx);

    let (order_tx, order_rx) = mpsc::channel::<&'static str>();
    let order_tx2 = order_tx.clone();

    let first = handler.registries().register_event(
        ChannelClass::Any,
        Arc::new(move |_h, _b| {
            let _ = order_tx.send("first");
        }),
    );
    handler.registries().register_event(
        ChannelClass::Any,
        Arc::new(move |_h, _b| {
            let _ = order_tx2.send("second");
        }),
    );

    let body = factory::encode(&Body::Generic(Generic { words: vec![] }));

    tx.send(RawPacket { header: Header { time: 1, chid: 7, pkt_type: 1, dlen: 0, instrument: 0 }, body: body.clone() }).unwrap();
    assert_eq!(order_rx.recv_timeout(Duration::from_secs(2)).unwrap(), "first");
    assert_eq!(order_rx.recv_timeout(Duration::from_secs(2)).unwrap(), "second");

    handler.registries().unregister_event(ChannelClass::Any, first);

    tx.send(RawPacket { header: Header { time: 2, chid: 7, pkt_type: 1, dlen: 0, instrument: 0 }, body: body.clone() }).unwrap();
    assert_eq!(order_rx.recv_timeout(Duration::from_secs(2)).unwrap(), "second");
    assert!(order_rx.try_recv().is_err(), "unregistered callback must not fire again");

    wait_for_sentinel(&handler, &tx);

    drop(tx);
    join.join().unwrap();
}

/// 10,000 packets alternating between a group stream and an event stream,
/// each routed to its own callback with no cross-talk and no reordering
/// within either stream.
#[test]
fn ten_thousand_interleaved_packets_dispatch_without_crosstalk_or_reordering() {
    let mirror = Arc::new(Mirror::default());
    let events = Arc::new(ConfigEvents::default());
    let handler = Handler::new(mirror, events, WireVersion::V4_1);
    let (tx, rx) = queue::channel();
    let join = handler.spawn(rx);

    let group_times = Arc::new(Mutex::new(Vec::new()));
    let group_times2 = group_times.clone();
    handler.registries().register_group(
        3,
        Arc::new(move |h, _group_id, _body| {
            group_times2.lock().unwrap().push(h.time);
        }),
    );

    let event_times = Arc::new(Mutex::new(Vec::new()));
    let event_times2 = event_times.clone();
    handler.registries().register_event(
        ChannelClass::Any,
        Arc::new(move |h, _body| {
            event_times2.lock().unwrap().push(h.time);
        }),
    );

    for i in 0..10_000u64 {
        if i % 2 == 0 {
            tx.send(RawPacket {
                header: Header { time: i, chid: 0, pkt_type: 3, dlen: 0, instrument: 0 },
                body: factory::encode(&Body::SampleGroup(SampleGroup { samples: vec![] })),
            })
            .unwrap();
        } else {
            tx.send(RawPacket {
                header: Header { time: i, chid: 50, pkt_type: 1, dlen: 0, instrument: 0 },
                body: factory::encode(&Body::Generic(Generic { words: vec![] })),
            })
            .unwrap();
        }
    }

    wait_for_sentinel(&handler, &tx);

    let group_times = group_times.lock().unwrap();
    let event_times = event_times.lock().unwrap();

    assert_eq!(group_times.len(), 5_000);
    assert_eq!(event_times.len(), 5_000);
    assert!(group_times.windows(2).all(|w| w[0] < w[1]), "group stream reordered");
    assert!(event_times.windows(2).all(|w| w[0] < w[1]), "event stream reordered");
    assert_eq!(group_times[0], 0);
    assert_eq!(event_times[0], 1);
    assert_eq!(*group_times.last().unwrap(), 9_998);
    assert_eq!(*event_times.last().unwrap(), 9_999);

    drop(group_times);
    drop(event_times);
    drop(tx);
    join.join().unwrap();
}
