//! Values allocated under the per-(application, environment) lock: on-demand
//! counters and random request ids.
//!
//! Callers must hold the lock (`AttemptTransaction::lock_application`) before
//! allocating; neither allocator takes it itself.

pub mod counter;
pub mod random_id;

pub use counter::{OnDemandCounters, counter_window};
pub use random_id::{MAX_RANDOM_ID_ATTEMPTS, RandomIdSource, ThreadRngSource, allocate_random_id};
