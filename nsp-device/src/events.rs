use std::sync::{Condvar, Mutex};
use std::time::Duration;

/// A named one-shot condition, mirroring `threading.Event`: cleared before a
/// synchronous write, signalled by the handler once the matching reply
/// arrives, waited on (with timeout) by the calling thread.
#[derive(Default)]
pub struct NamedEvent {
    flag: Mutex<bool>,
    cond: Condvar,
}

impl NamedEvent {
    pub fn clear(&self) {
        *self.flag.lock().unwrap() = false;
    }

    pub fn signal(&self) {
        *self.flag.lock().unwrap() = true;
        self.cond.notify_all();
    }

    /// Returns `true` if signalled before `timeout` elapsed.
    pub fn wait(&self, timeout: Duration) -> bool {
        let guard = self.flag.lock().unwrap();
        if *guard {
            return true;
        }

        let (guard, result) = self.cond.wait_timeout_while(guard, timeout, |signalled| !*signalled).unwrap();
        let _ = guard;
        !result.timed_out()
    }

    /// Blocks with no timeout.
    pub fn wait_forever(&self) {
        let guard = self.flag.lock().unwrap();
        let _ = self.cond.wait_while(guard, |signalled| !*signalled).unwrap();
    }
}

#[derive(Default)]
pub struct ConfigEvents {
    pub sysrep: NamedEvent,
    pub runlevel_standby: NamedEvent,
    pub runlevel_running: NamedEvent,
    pub chaninfo: NamedEvent,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signals_before_timeout() {
        let event = NamedEvent::default();
        event.signal();
        assert!(event.wait(Duration::from_millis(1)));
    }

    #[test]
    fn times_out_when_unsignalled() {
        let event = NamedEvent::default();
        assert!(!event.wait(Duration::from_millis(5)));
    }
}
