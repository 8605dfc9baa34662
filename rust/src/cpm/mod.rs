//! Critical Path Method engine.
//!
//! Pipeline per run:
//! 1. index: hierarchy, successor index, topological order
//! 2. forward: early dates of leaves (fixed point)
//! 3. rollup: parent early dates
//! 4. backward: late dates of leaves (fixed point), then parent late dates
//! 5. float, critical, health
//!
//! `engine` drives the stages and owns the result types.

mod backward;
mod critical;
mod engine;
mod float;
mod forward;
mod health;
mod index;
mod rollup;
mod types;

pub use engine::{calculate, calculate_today, calculate_with_date_errors, CpmResult, CpmStats};
pub use types::{CalcState, CpmError, DateError, PassKind, ValidationError};
