//! Domain services behind the socket adapter and the HTTP routes.
//!
//! ARCHITECTURE
//! ============
//! Leaf-first: `classifier` (pure) → `ledger` (time entries) → `presence`
//! (per-event state machine) → `dispatch` (per-person ordering). `hub` owns
//! live dashboard subscribers; `schedule` drives the periodic timers.

pub mod analytics;
pub mod classifier;
pub mod directory;
pub mod dispatch;
pub mod hub;
pub mod ledger;
pub mod presence;
pub mod schedule;
