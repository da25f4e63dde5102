//! Financial profile domain: aggregate model and mutation store.

mod model;
mod store;

pub use model::*;
pub use store::*;
