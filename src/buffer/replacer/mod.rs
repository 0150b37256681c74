//! Eviction policy.
//!
//! - [`ClockReplacer`] - CLOCK / second chance with a persisted hand

mod clock;

pub use clock::ClockReplacer;
