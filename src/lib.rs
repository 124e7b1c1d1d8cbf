//! alloq — allocation ledger and conflict engine for capacity-limited,
//! capability-tagged systems.
//!
//! A system has a concurrency capacity and a capability mask. Callers admit
//! three kinds of time-bounded occupancy against it:
//!
//! - **Entries**: real usage. Bounded by the system's capacity at every
//!   instant, and excluded from any overlapping outage that shares a
//!   capability bit.
//! - **Planned outages**: maintenance windows with a known end. Admitted
//!   only once every conflicting entry has been cleared.
//! - **Unplanned outages**: failures with an unknown end, approximated by a
//!   fixed sliding window `[start, start + window)`. Admission requires the
//!   window prefix to be clear of conflicting entry *starts*; a background
//!   reconciler evicts entries that slip inside the window afterwards.
//!
//! All admitted records live in a unified per-system ledger. Admission is
//! check-then-insert under a per-system write lock, so no interleaving of
//! concurrent requests can overshoot capacity or double-book an outage.
//! State is event-sourced through an append-only WAL and rebuilt on open.

pub mod engine;
pub mod limits;
pub mod model;
pub mod notify;
pub mod observability;
pub mod reconciler;
pub mod wal;
