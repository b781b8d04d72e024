//! Per-service failure isolation.

mod breaker;
mod manager;
mod store;

pub use breaker::{BreakerSnapshot, BreakerState, BreakerThresholds, CircuitBreaker, Transition};
pub use manager::BreakerManager;
pub use store::{BREAKERS_FILE, BreakerStore};
