//! Control loop scheduling
//!
//! One [`ServiceLoop`] per monitored service, built by
//! [`ControlLoopBuilder`] and spawned by [`Scheduler`]. Loops share no
//! mutable state beyond the [`ServiceRegistry`] snapshots and the health
//! registry, so a failing service never blocks the others.

mod r#loop;
mod registry;
mod scheduler;

#[cfg(test)]
mod tests;

pub use r#loop::{LoopAdapters, LoopObservers, LoopPhase, LoopSettings, ServiceLoop, TickOutcome};
pub use registry::{ServiceRegistry, ServiceSnapshot};
pub use scheduler::{ControlLoopBuilder, Scheduler};
