use std::time::Duration;
use tokio::time::Instant;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct IdleTick {
    /// Share of the idle window still left, from 1.0 down to 0.0.
    pub remaining: f32,
    /// Set on exactly one tick per cycle, when the window has run out.
    pub expired: bool,
}

/// Unattended-kiosk countdown.
///
/// Interactions push the deadline out; while the screen is hidden the timer
/// is paused and no ticks are scheduled.
#[derive(Clone, Debug)]
pub struct IdleTimer {
    timeout: Duration,
    tick_every: Duration,
    deadline: Instant,
    next_tick: Option<Instant>,
    triggered: bool,
}

impl IdleTimer {
    pub fn new(timeout: Duration, tick_every: Duration, now: Instant) -> Self {
        Self {
            timeout,
            tick_every,
            deadline: now + timeout,
            next_tick: Some(now + tick_every),
            triggered: false,
        }
    }

    pub fn deadline(&self) -> Instant {
        self.deadline
    }

    pub fn is_running(&self) -> bool {
        self.next_tick.is_some()
    }

    pub fn next_tick(&self) -> Option<Instant> {
        self.next_tick
    }

    pub fn touch(&mut self, now: Instant) {
        self.triggered = false;
        self.deadline = now + self.timeout;
    }

    pub fn pause(&mut self) {
        self.next_tick = None;
    }

    /// Fresh deadline and ticking again after the screen became visible.
    pub fn resume(&mut self, now: Instant) {
        self.touch(now);
        self.next_tick = Some(now + self.tick_every);
    }

    pub fn tick(&mut self, now: Instant) -> IdleTick {
        let remaining = self.deadline.saturating_duration_since(now);
        let fraction = if self.timeout.is_zero() {
            0.0
        } else {
            (remaining.as_secs_f32() / self.timeout.as_secs_f32()).clamp(0.0, 1.0)
        };
        let expired = remaining.is_zero() && !self.triggered;
        if expired {
            self.triggered = true;
        }
        if self.next_tick.is_some() {
            self.next_tick = Some(now + self.tick_every);
        }
        IdleTick {
            remaining: fraction,
            expired,
        }
    }
}
