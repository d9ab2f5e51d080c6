use std::collections::HashMap;
use std::time::Duration;

/// Every logical timer a router can have pending.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Timer {
    Hello { iface: String },
    Inactivity { iface: String },
    DdRetransmit { iface: String },
    LsRequestRetransmit { iface: String },
    LsRetransmit { iface: String },
    LsaAging,
    LsaRefresh,
    RouteInstall,
    CongestionCheck,
    HoldQueue,
}

impl Timer {
    /// Interface the timer belongs to, if it is per-adjacency.
    pub fn iface(&self) -> Option<&str> {
        match self {
            Timer::Hello { iface }
            | Timer::Inactivity { iface }
            | Timer::DdRetransmit { iface }
            | Timer::LsRequestRetransmit { iface }
            | Timer::LsRetransmit { iface } => Some(iface),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimerHandle(pub u64);

/// Logical clock and scheduler supplied by the host event loop.
///
/// Times are offsets from the start of the simulation. Timers scheduled for
/// the same instant must fire in the order they were scheduled.
pub trait Clock {
    fn now(&self) -> Duration;
    fn schedule(&mut self, at: Duration, timer: Timer) -> TimerHandle;
    fn cancel(&mut self, handle: TimerHandle);
}

/// Tracks the pending handle of each logical timer so that arming a timer
/// always cancels its previous instance first.
#[derive(Debug, Default)]
pub struct TimerSet {
    pending: HashMap<Timer, TimerHandle>,
}

impl TimerSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn arm(&mut self, clock: &mut dyn Clock, timer: Timer, at: Duration) {
        if let Some(previous) = self.pending.remove(&timer) {
            clock.cancel(previous);
        }
        let handle = clock.schedule(at, timer.clone());
        self.pending.insert(timer, handle);
    }

    pub fn arm_after(&mut self, clock: &mut dyn Clock, timer: Timer, delay: Duration) {
        let at = clock.now() + delay;
        self.arm(clock, timer, at);
    }

    /// Arms only if nothing is pending for `timer`.
    pub fn ensure_armed(&mut self, clock: &mut dyn Clock, timer: Timer, delay: Duration) {
        if !self.pending.contains_key(&timer) {
            self.arm_after(clock, timer, delay);
        }
    }

    pub fn disarm(&mut self, clock: &mut dyn Clock, timer: &Timer) {
        if let Some(handle) = self.pending.remove(timer) {
            clock.cancel(handle);
        }
    }

    /// Cancels every timer bound to `iface`.
    pub fn disarm_iface(&mut self, clock: &mut dyn Clock, iface: &str) {
        let doomed: Vec<Timer> = self
            .pending
            .keys()
            .filter(|t| t.iface() == Some(iface))
            .cloned()
            .collect();
        for timer in doomed {
            self.disarm(clock, &timer);
        }
    }

    /// Called when `timer` fires; it is no longer pending.
    pub fn fired(&mut self, timer: &Timer) {
        self.pending.remove(timer);
    }

    pub fn is_armed(&self, timer: &Timer) -> bool {
        self.pending.contains_key(timer)
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct RecordingClock {
        now: Duration,
        next: u64,
        scheduled: Vec<(TimerHandle, Duration, Timer)>,
        cancelled: Vec<TimerHandle>,
    }

    impl Clock for RecordingClock {
        fn now(&self) -> Duration {
            self.now
        }

        fn schedule(&mut self, at: Duration, timer: Timer) -> TimerHandle {
            self.next += 1;
            let handle = TimerHandle(self.next);
            self.scheduled.push((handle, at, timer));
            handle
        }

        fn cancel(&mut self, handle: TimerHandle) {
            self.cancelled.push(handle);
        }
    }

    #[test]
    fn rearming_cancels_previous_instance() {
        let mut clock = RecordingClock::default();
        let mut timers = TimerSet::new();
        let hello = Timer::Hello { iface: "eth0".into() };

        timers.arm_after(&mut clock, hello.clone(), Duration::from_secs(10));
        timers.arm_after(&mut clock, hello.clone(), Duration::from_secs(5));

        assert_eq!(clock.scheduled.len(), 2);
        assert_eq!(clock.cancelled, vec![TimerHandle(1)]);
        assert_eq!(timers.len(), 1);
    }

    #[test]
    fn ensure_armed_keeps_existing() {
        let mut clock = RecordingClock::default();
        let mut timers = TimerSet::new();
        timers.ensure_armed(&mut clock, Timer::HoldQueue, Duration::from_millis(100));
        timers.ensure_armed(&mut clock, Timer::HoldQueue, Duration::from_millis(100));
        assert_eq!(clock.scheduled.len(), 1);
        assert!(clock.cancelled.is_empty());
    }

    #[test]
    fn disarm_iface_only_touches_that_interface() {
        let mut clock = RecordingClock::default();
        let mut timers = TimerSet::new();
        timers.arm_after(&mut clock, Timer::Hello { iface: "a".into() }, Duration::ZERO);
        timers.arm_after(&mut clock, Timer::LsRetransmit { iface: "a".into() }, Duration::ZERO);
        timers.arm_after(&mut clock, Timer::Hello { iface: "b".into() }, Duration::ZERO);
        timers.arm_after(&mut clock, Timer::LsaAging, Duration::ZERO);

        timers.disarm_iface(&mut clock, "a");
        assert_eq!(timers.len(), 2);
        assert!(timers.is_armed(&Timer::Hello { iface: "b".into() }));
        assert!(timers.is_armed(&Timer::LsaAging));
    }
}
