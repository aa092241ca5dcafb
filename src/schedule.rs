//! Refresh-driven loop bookkeeping: clocks, minimum-interval gates and
//! cancellable loop slots.

use std::{
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
    time::{Duration, Instant},
};

/// Monotonic time source, measured from an arbitrary origin.
pub trait Clock: Send + Sync {
    fn now(&self) -> Duration;
}

#[derive(Clone, Copy, Debug)]
pub struct SystemClock {
    origin: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now(&self) -> Duration {
        self.origin.elapsed()
    }
}

/// Hand-driven clock. Clones share the same time.
#[derive(Clone, Debug, Default)]
pub struct ManualClock {
    nanos: Arc<AtomicU64>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn advance(&self, by: Duration) {
        self.nanos
            .fetch_add(duration_nanos(by), Ordering::SeqCst);
    }

    pub fn set(&self, at: Duration) {
        self.nanos.store(duration_nanos(at), Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Duration {
        Duration::from_nanos(self.nanos.load(Ordering::SeqCst))
    }
}

fn duration_nanos(d: Duration) -> u64 {
    u64::try_from(d.as_nanos()).unwrap_or(u64::MAX)
}

/// Minimum-interval gate. Each loop owns its own gate.
#[derive(Clone, Copy, Debug)]
pub struct RateGate {
    interval: Duration,
    last_fire: Option<Duration>,
}

impl RateGate {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last_fire: None,
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn would_fire(&self, now: Duration) -> bool {
        match self.last_fire {
            None => true,
            Some(last) => now.saturating_sub(last) >= self.interval,
        }
    }

    /// Records a fire at `now` if the interval has elapsed. Returns whether it fired.
    pub fn try_fire(&mut self, now: Duration) -> bool {
        if self.would_fire(now) {
            self.last_fire = Some(now);
            true
        } else {
            false
        }
    }

    pub fn reset(&mut self) {
        self.last_fire = None;
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum LoopKind {
    Preview,
    Automation,
    Recording,
    RecordingAutomation,
    SourceRetry,
}

/// One pending "run again on a later refresh" registration.
#[derive(Clone, Copy, Debug)]
pub struct LoopSlot {
    kind: LoopKind,
    not_before: Option<Duration>,
}

impl LoopSlot {
    pub fn new(kind: LoopKind) -> Self {
        Self {
            kind,
            not_before: None,
        }
    }

    pub fn kind(&self) -> LoopKind {
        self.kind
    }

    pub fn is_scheduled(&self) -> bool {
        self.not_before.is_some()
    }

    /// Run on the next refresh.
    pub fn schedule(&mut self) {
        self.not_before = Some(Duration::ZERO);
    }

    /// Run on the first refresh at or after `now + delay`.
    pub fn schedule_after(&mut self, now: Duration, delay: Duration) {
        self.not_before = Some(now.saturating_add(delay));
    }

    pub fn is_due(&self, now: Duration) -> bool {
        self.not_before.is_some_and(|at| now >= at)
    }

    /// Returns `false` if nothing was scheduled.
    pub fn cancel(&mut self) -> bool {
        let was = self.is_scheduled();
        if was {
            tracing::debug!(kind = ?self.kind, "loop cancelled");
        }
        self.not_before = None;
        was
    }
}
