//! Clock and repeating-tick scheduling.
//!
//! Nothing here sleeps or spawns threads. A `Scheduler` only records which
//! repeating ticks are live and when each is next due; the owner asks for
//! `due(now)` and acts on the result. Tests pass explicit instants (or a
//! `ManualClock`) and get deterministic virtual time.

use chrono::{DateTime, Duration, Utc};
use std::cell::Cell;

/// Cadence of the session elapsed-time counter
pub fn elapsed_interval() -> Duration {
    Duration::seconds(1)
}

/// Cadence at which a live rest timer is checked for expiry
pub fn rest_poll_interval() -> Duration {
    Duration::milliseconds(500)
}

/// Cadence for redrawing a rest countdown (progress ring)
pub fn rest_display_interval() -> Duration {
    Duration::milliseconds(100)
}

/// Cadence of the outbox length poll shown by sync indicators
pub fn queue_poll_interval() -> Duration {
    Duration::seconds(5)
}

/// Source of the current instant
pub trait Clock {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall clock
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Clock that only moves when told to
#[derive(Debug)]
pub struct ManualClock {
    now: Cell<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Cell::new(start),
        }
    }

    pub fn advance(&self, by: Duration) -> DateTime<Utc> {
        let next = self.now.get() + by;
        self.now.set(next);
        next
    }

    pub fn set(&self, to: DateTime<Utc>) {
        self.now.set(to);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        self.now.get()
    }
}

/// Handle returned by `schedule_repeating`
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct TickId(u64);

/// What a repeating tick is for
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TickKind {
    Elapsed,
    RestPoll,
    QueuePoll,
}

#[derive(Debug)]
struct Repeating {
    id: TickId,
    kind: TickKind,
    every: Duration,
    next_at: DateTime<Utc>,
}

/// Set of live repeating ticks
#[derive(Debug, Default)]
pub struct Scheduler {
    next_id: u64,
    ticks: Vec<Repeating>,
}

impl Scheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tick that first fires one interval after `now`
    pub fn schedule_repeating(
        &mut self,
        kind: TickKind,
        every: Duration,
        now: DateTime<Utc>,
    ) -> TickId {
        let id = TickId(self.next_id);
        self.next_id += 1;
        self.ticks.push(Repeating {
            id,
            kind,
            every,
            next_at: now + every,
        });
        tracing::trace!("Scheduled {:?} every {}ms", kind, every.num_milliseconds());
        id
    }

    /// Stop a tick; returns false if it was not live
    pub fn cancel(&mut self, id: TickId) -> bool {
        let before = self.ticks.len();
        self.ticks.retain(|t| t.id != id);
        before != self.ticks.len()
    }

    pub fn cancel_all(&mut self) {
        self.ticks.clear();
    }

    pub fn is_scheduled(&self, id: TickId) -> bool {
        self.ticks.iter().any(|t| t.id == id)
    }

    pub fn len(&self) -> usize {
        self.ticks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ticks.is_empty()
    }

    /// Ticks due at `now`, in registration order
    ///
    /// Missed periods are coalesced: a tick that is several intervals behind
    /// is reported once and rescheduled past `now`.
    pub fn due(&mut self, now: DateTime<Utc>) -> Vec<(TickId, TickKind)> {
        let mut fired = Vec::new();
        for tick in &mut self.ticks {
            if tick.next_at > now {
                continue;
            }
            fired.push((tick.id, tick.kind));
            let every_ms = tick.every.num_milliseconds().max(1);
            let behind_ms = (now - tick.next_at).num_milliseconds();
            let periods = behind_ms / every_ms + 1;
            tick.next_at += Duration::milliseconds(every_ms * periods);
        }
        fired
    }
}
