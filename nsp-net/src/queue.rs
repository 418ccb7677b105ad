use std::collections::VecDeque;
use std::sync::{Arc, Condvar, Mutex};

use thiserror::Error;

/// A single demultiplexed protocol packet as handed from the receive thread
/// to the handler thread: wire-level header fields plus the raw body bytes,
/// not yet decoded into a typed `Body` (decoding happens on the handler
/// thread once a recipient is known to exist, per the handler pipeline).
#[derive(Debug, Clone)]
pub struct RawPacket {
    pub header: nsp_protocol::Header,
    pub body: Vec<u8>,
}

struct Shared {
    queue: Mutex<Option<VecDeque<RawPacket>>>,
    notify: Condvar,
}

impl Shared {
    fn disconnect(&self) {
        *self.queue.lock().unwrap() = None;
    }
}

pub struct QueueSender {
    shared: Arc<Shared>,
}

pub struct QueueReceiver {
    shared: Arc<Shared>,
}

#[derive(Debug, Clone, Copy, Error)]
#[error("transport queue disconnected")]
pub struct Disconnected;

pub fn channel() -> (QueueSender, QueueReceiver) {
    let shared = Arc::new(Shared {
        queue: Mutex::new(Some(VecDeque::new())),
        notify: Condvar::new(),
    });

    (QueueSender { shared: shared.clone() }, QueueReceiver { shared })
}

impl QueueSender {
    pub fn send(&self, packet: RawPacket) -> Result<(), Disconnected> {
        let mut queue = self.shared.queue.lock().unwrap();
        let Some(queue) = queue.as_mut() else {
            return Err(Disconnected);
        };

        queue.push_back(packet);
        self.shared.notify.notify_one();
        Ok(())
    }
}

impl Drop for QueueSender {
    fn drop(&mut self) {
        self.shared.disconnect();
    }
}

impl QueueReceiver {
    /// Blocks until a packet is available or the sender has disconnected.
    pub fn recv(&self) -> Result<RawPacket, Disconnected> {
        let mut queue_lock = self.shared.queue.lock().unwrap();

        loop {
            let Some(queue) = queue_lock.as_mut() else {
                return Err(Disconnected);
            };

            if let Some(packet) = queue.pop_front() {
                return Ok(packet);
            }

            queue_lock = self.shared.notify.wait(queue_lock).unwrap();
        }
    }
}

impl Drop for QueueReceiver {
    fn drop(&mut self) {
        self.shared.disconnect();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nsp_protocol::Header;

    fn packet(time: u64) -> RawPacket {
        RawPacket { header: Header { time, ..Header::default() }, body: vec![] }
    }

    #[test]
    fn fifo_order() {
        let (tx, rx) = channel();
        tx.send(packet(1)).unwrap();
        tx.send(packet(2)).unwrap();
        assert_eq!(rx.recv().unwrap().header.time, 1);
        assert_eq!(rx.recv().unwrap().header.time, 2);
    }

    #[test]
    fn drop_sender_disconnects_receiver() {
        let (tx, rx) = channel();
        drop(tx);
        assert!(matches!(rx.recv(), Err(Disconnected)));
    }
}
