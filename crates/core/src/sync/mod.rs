//! Profile synchronization: gateway contract, reconciliation, scheduling and
//! the engine that ties them together.

mod engine;
mod gateway;
mod reconcile;
mod scheduler;

pub use engine::*;
pub use gateway::*;
pub use reconcile::*;
pub use scheduler::*;
