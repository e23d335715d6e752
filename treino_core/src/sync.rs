//! Delivery of finished workouts.
//!
//! `SyncService` decides the transport for each finished log: send directly
//! when the link is up, otherwise (or when sending fails) put it in the
//! outbox. It also replays the outbox when the link comes back.

use crate::outbox::{Outbox, OutboxStore};
use crate::scheduler::{self, Clock, Scheduler, SystemClock, TickId, TickKind};
use crate::{FinalizedWorkoutLog, Result};
use chrono::{DateTime, Utc};
use std::cell::Cell;

/// Remote store for finished workouts
pub trait Backend {
    fn send(&mut self, identity: &str, log: &FinalizedWorkoutLog) -> Result<()>;
}

/// Online/offline signal
pub trait Connectivity {
    fn is_online(&self) -> bool;
}

/// A link whose state never changes
#[derive(Debug, Clone, Copy)]
pub struct StaticLink(pub bool);

impl Connectivity for StaticLink {
    fn is_online(&self) -> bool {
        self.0
    }
}

/// A link toggled by hand
#[derive(Debug, Default)]
pub struct ManualLink {
    online: Cell<bool>,
}

impl ManualLink {
    pub fn new(online: bool) -> Self {
        Self {
            online: Cell::new(online),
        }
    }

    pub fn set(&self, online: bool) {
        self.online.set(online);
    }
}

impl Connectivity for ManualLink {
    fn is_online(&self) -> bool {
        self.online.get()
    }
}

/// How a finished log left the session
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Delivery {
    Sent,
    /// Offline at finish time
    Queued,
    /// Send failed; the log waits in the outbox
    QueuedAfterError,
}

impl Delivery {
    pub fn is_queued(self) -> bool {
        !matches!(self, Delivery::Sent)
    }
}

/// Takes ownership of a finished log's delivery
pub trait LogSubmitter {
    /// Only errors when the log could be neither sent nor queued
    fn submit(&mut self, log: &FinalizedWorkoutLog) -> Result<Delivery>;
}

/// What a sync indicator should show
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SyncStatus {
    /// Online with nothing pending
    Idle,
    Syncing { pending: usize },
    Offline { pending: usize },
}

/// Direct send with outbox fallback
pub struct SyncService<S: OutboxStore, B: Backend, C: Connectivity> {
    outbox: Outbox<S>,
    backend: B,
    link: C,
    identity: String,
    clock: Box<dyn Clock>,
    scheduler: Scheduler,
    poll_tick: Option<TickId>,
    was_online: bool,
    pending: usize,
}

impl<S: OutboxStore, B: Backend, C: Connectivity> SyncService<S, B, C> {
    pub fn new(outbox: Outbox<S>, backend: B, link: C, identity: impl Into<String>) -> Self {
        let was_online = link.is_online();
        let pending = match outbox.peek_count() {
            Ok(count) => count,
            Err(e) => {
                tracing::warn!("Failed to read outbox length: {}. Assuming empty.", e);
                0
            }
        };
        Self {
            outbox,
            backend,
            link,
            identity: identity.into(),
            clock: Box::new(SystemClock),
            scheduler: Scheduler::new(),
            poll_tick: None,
            was_online,
            pending,
        }
    }

    pub fn with_clock(mut self, clock: Box<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn outbox(&self) -> &Outbox<S> {
        &self.outbox
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn link(&self) -> &C {
        &self.link
    }

    pub fn identity(&self) -> &str {
        &self.identity
    }

    /// Replay the outbox now
    pub fn drain(&mut self) -> Result<usize> {
        let sent = self
            .outbox
            .drain(&self.identity, &mut self.backend, &self.link)?;
        self.refresh_pending();
        Ok(sent)
    }

    /// Compare the link against the last observed state and drain on an
    /// offline-to-online transition. Returns how many records were sent.
    pub fn check_connectivity(&mut self) -> Result<usize> {
        let online = self.link.is_online();
        let came_online = online && !self.was_online;
        self.was_online = online;
        if came_online {
            tracing::info!("Connection restored; draining outbox");
            self.drain()
        } else {
            Ok(0)
        }
    }

    /// Indicator state from the last known queue length
    pub fn status(&self) -> SyncStatus {
        match (self.link.is_online(), self.pending) {
            (true, 0) => SyncStatus::Idle,
            (true, pending) => SyncStatus::Syncing { pending },
            (false, pending) => SyncStatus::Offline { pending },
        }
    }

    /// Start the periodic queue-length poll
    pub fn start_polling(&mut self, now: DateTime<Utc>) {
        if self.poll_tick.is_none() {
            self.poll_tick = Some(self.scheduler.schedule_repeating(
                TickKind::QueuePoll,
                scheduler::queue_poll_interval(),
                now,
            ));
        }
    }

    pub fn stop_polling(&mut self) {
        if let Some(id) = self.poll_tick.take() {
            self.scheduler.cancel(id);
        }
    }

    /// Run due polls; returns the refreshed status when a poll ran
    pub fn pump(&mut self, now: DateTime<Utc>) -> Option<SyncStatus> {
        let due = self.scheduler.due(now);
        if !due.iter().any(|(_, kind)| *kind == TickKind::QueuePoll) {
            return None;
        }
        if let Err(e) = self.check_connectivity() {
            tracing::warn!("Outbox drain failed: {}", e);
        }
        self.refresh_pending();
        Some(self.status())
    }

    fn refresh_pending(&mut self) {
        match self.outbox.peek_count() {
            Ok(count) => self.pending = count,
            Err(e) => tracing::warn!("Failed to read outbox length: {}", e),
        }
    }

    fn enqueue(&mut self, log: &FinalizedWorkoutLog) -> Result<()> {
        let now = self.clock.now();
        self.outbox.enqueue(log, now)?;
        self.pending += 1;
        Ok(())
    }
}

impl<S: OutboxStore, B: Backend, C: Connectivity> LogSubmitter for SyncService<S, B, C> {
    fn submit(&mut self, log: &FinalizedWorkoutLog) -> Result<Delivery> {
        if !self.link.is_online() {
            self.enqueue(log)?;
            return Ok(Delivery::Queued);
        }

        match self.backend.send(&self.identity, log) {
            Ok(()) => {
                tracing::info!("Delivered {} workout", log.workout_id);
                Ok(Delivery::Sent)
            }
            Err(e) => {
                tracing::warn!("Failed to deliver {} workout: {}. Queuing.", log.workout_id, e);
                self.enqueue(log)?;
                Ok(Delivery::QueuedAfterError)
            }
        }
    }
}
