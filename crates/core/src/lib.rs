//! Core engine for the Moneta personal-finance coach: the financial profile
//! aggregate, its mutation store, and the eventually-consistent profile
//! synchronization machinery.

pub mod cache;
pub mod errors;
pub mod identity;
pub mod profile;
pub mod sync;

pub use errors::{CacheError, EngineError, GatewayError, Result};
pub use identity::IdentityKey;
