// src/watch/mod.rs

//! File watching and arrival detection.
//!
//! This module is responsible for:
//! - Deciding which file names a project ingests (`patterns`).
//! - Wiring up a cross-platform filesystem watcher (`notify`).
//! - Holding a file back until it is fully written (`stability`).
//! - Remembering which files were already ingested (`ledger`).
//! - Running one unit of work per candidate file (`event_handler`).

pub mod event_handler;
pub mod ledger;
pub mod patterns;
pub mod stability;
pub mod watcher;

pub use event_handler::{handle_arrival, pending_arrivals, run_arrival_loop};
pub use ledger::{FileLedgerStore, LedgerStore, MemoryLedgerStore, ProcessedLedger};
pub use patterns::ArrivalFilter;
pub use stability::wait_for_stability;
pub use watcher::{WatcherHandle, arrival_paths, spawn_source_watcher};
