//! Per-attempt execution: worker pool, synchronization points, the task
//! dependency scheduler and the intermediate value store.

pub mod executor;
pub mod scheduler;
pub mod values;

pub use executor::{SyncPoint, TaskExecutor};
pub use values::IntermediateValues;
