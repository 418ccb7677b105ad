use std::sync::{mpsc, Arc};
use std::thread::JoinHandle;

use nsp_protocol::header::WireVersion;

use crate::queue::{self, QueueReceiver, QueueSender, RawPacket};
use crate::socket::{Socket, TransportConfig, TransportError};

/// Outgoing queue item; `Quit` is the sentinel that wakes and terminates the
/// sender thread on disconnect.
enum Outgoing {
    Bytes(Vec<u8>),
    Quit,
}

pub struct Transport {
    socket: Arc<Socket>,
    wire_version: WireVersion,
    out_tx: mpsc::Sender<Outgoing>,
    recv_handle: Option<JoinHandle<()>>,
    send_handle: Option<JoinHandle<()>>,
}

impl Transport {
    pub fn open(config: TransportConfig) -> Result<(Transport, QueueReceiver), TransportError> {
        let socket = Arc::new(Socket::open(&config)?);
        let (raw_tx, raw_rx) = queue::channel();
        let (out_tx, out_rx) = mpsc::channel::<Outgoing>();

        let recv_handle = spawn_receiver(socket.clone(), config.wire_version, raw_tx);
        let send_handle = spawn_sender(socket.clone(), out_rx);

        Ok((
            Transport {
                socket,
                wire_version: config.wire_version,
                out_tx,
                recv_handle: Some(recv_handle),
                send_handle: Some(send_handle),
            },
            raw_rx,
        ))
    }

    pub fn wire_version(&self) -> WireVersion {
        self.wire_version
    }

    pub fn send(&self, bytes: Vec<u8>) -> Result<(), TransportError> {
        self.out_tx.send(Outgoing::Bytes(bytes)).map_err(|_| TransportError::Closed)
    }

    /// Stops the send/receive threads and joins them. `Socket::shutdown`
    /// wakes the receive thread's blocked `poll` even though it holds its
    /// own `Arc<Socket>` clone; the sender exits on the `Quit` sentinel
    /// sent here.
    pub fn close(mut self) {
        let _ = self.out_tx.send(Outgoing::Quit);

        if let Some(handle) = self.send_handle.take() {
            let _ = handle.join();
        }

        self.socket.shutdown();

        if let Some(handle) = self.recv_handle.take() {
            let _ = handle.join();
        }
    }
}

fn spawn_receiver(
    socket: Arc<Socket>,
    version: WireVersion,
    out: QueueSender,
) -> JoinHandle<()> {
    std::thread::spawn(move || {
        nsp_util::thread::set_name("nsp-recv");
        nsp_util::thread::set_realtime_priority();

        let mut buf = vec![0u8; crate::socket::DATAGRAM_MAX_SIZE];

        loop {
            let nbytes = match socket.recv(&mut buf) {
                Ok(n) => n,
                Err(err) => {
                    log::debug!("receive thread exiting: {err}");
                    return;
                }
            };

            for (header, body) in crate::socket::split_datagram(version, &buf[..nbytes]) {
                if out.send(RawPacket { header, body }).is_err() {
                    return;
                }
            }
        }
    })
}

fn spawn_sender(socket: Arc<Socket>, rx: mpsc::Receiver<Outgoing>) -> JoinHandle<()> {
    std::thread::spawn(move || {
        nsp_util::thread::set_name("nsp-send");

        while let Ok(item) = rx.recv() {
            match item {
                Outgoing::Bytes(bytes) => {
                    if let Err(err) = socket.send(&bytes) {
                        log::warn!("send failed: {err}");
                    }
                }
                Outgoing::Quit => return,
            }
        }
    })
}
