//! Opaque device-clock tick newtype, following the same checked-arithmetic
//! idiom as a timestamp type, minus any assumption about units: `sysfreq`
//! (ticks/sec) lives in the device's configuration mirror, not here.

use core::ops::{Add, AddAssign};

#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Default)]
pub struct DeviceTick(u64);

impl DeviceTick {
    pub fn new(raw: u64) -> Self {
        DeviceTick(raw)
    }

    pub fn raw(self) -> u64 {
        self.0
    }

    pub fn saturating_duration_since(self, other: DeviceTick) -> TickDuration {
        TickDuration(self.0.saturating_sub(other.0))
    }

    /// Monotonic advance check used by the handler's `last_time` bookkeeping:
    /// a packet whose time is strictly less than the last seen is stale.
    pub fn is_after(self, other: DeviceTick) -> bool {
        self.0 >= other.0
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct TickDuration(u64);

impl Add<TickDuration> for DeviceTick {
    type Output = DeviceTick;

    fn add(self, rhs: TickDuration) -> DeviceTick {
        DeviceTick(self.0.checked_add(rhs.0).unwrap())
    }
}

impl AddAssign<TickDuration> for DeviceTick {
    fn add_assign(&mut self, rhs: TickDuration) {
        *self = *self + rhs;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn monotonic_check() {
        let a = DeviceTick::new(10);
        let b = DeviceTick::new(11);
        assert!(b.is_after(a));
        assert!(!a.is_after(b));
    }
}
