#![forbid(unsafe_code)]

//! Core domain model and business logic for the Treino workout tracker.
//!
//! This crate provides:
//! - Domain types (plans, sets, session state, finalized logs)
//! - The built-in plan catalog
//! - The active-workout state machine with its rest timer
//! - Persistence (session slot, outbox, history)
//! - Delivery with offline fallback
//! - Progress statistics and CSV export

pub mod types;
pub mod error;
pub mod catalog;
pub mod config;
pub mod logging;
pub mod rest_timer;
pub mod scheduler;
pub mod store;
pub mod session;
pub mod outbox;
pub mod sync;
pub mod history;
mod jsonl;
pub mod progress;
pub mod format;
pub mod export;

// Re-export commonly used types
pub use error::{Error, Result};
pub use types::*;
pub use catalog::{build_default_catalog, get_default_catalog};
pub use config::{Config, SessionConfig};
pub use rest_timer::{RestAlert, RestTimer, TerminalBell};
pub use scheduler::{Clock, ManualClock, SystemClock};
pub use store::{FileSessionStore, MemorySessionStore, SessionStore};
pub use session::{ActiveWorkout, PumpReport, SessionEvent, SessionPhase};
pub use outbox::{FileOutbox, MemoryOutbox, Outbox, OutboxStore};
pub use sync::{Backend, Connectivity, Delivery, LogSubmitter, StaticLink, SyncService, SyncStatus};
pub use history::{HistoryEntry, HistoryLog};
pub use export::export_csv;
