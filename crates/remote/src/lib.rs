//! HTTP implementation of the Moneta profile gateway.
//!
//! `RestGateway` talks to the cloud profile API and satisfies the
//! `RemoteGateway` contract from `moneta-core`.

mod client;
mod error;

pub use client::{AccessTokenProvider, RestGateway, StaticTokenProvider};
pub use error::{RemoteError, Result};
