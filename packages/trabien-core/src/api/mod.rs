//! API access module.
//!
//! Provides the authenticated request gateway for the Trabien REST API and
//! the typed endpoint surfaces built on top of it.

mod client;
mod error;
pub mod tasks;
pub mod teams;

pub use client::{ApiClient, ApiRequest, REFRESH_ENDPOINT};
pub use error::{ApiError, ApiResult};
