//! Hard bounds on externally supplied inputs. Everything a caller hands the
//! engine is clamped here before it can touch a system's record set.

use crate::model::Ms;

/// Registered systems per engine.
pub const MAX_SYSTEMS: usize = 100_000;

/// Allocation records (entries + outage windows) per system.
pub const MAX_RECORDS_PER_SYSTEM: usize = 100_000;

/// Earliest accepted timestamp (unix epoch).
pub const MIN_VALID_TIMESTAMP_MS: Ms = 0;

/// Latest accepted timestamp (2100-01-01).
pub const MAX_VALID_TIMESTAMP_MS: Ms = 4_102_444_800_000;

/// Widest accepted interval: 10 years.
pub const MAX_SPAN_DURATION_MS: Ms = 10 * 365 * 24 * 3_600_000;

/// Widest accepted sliding window: 1 year.
pub const MAX_SLIDING_WINDOW_MS: Ms = 365 * 24 * 3_600_000;
