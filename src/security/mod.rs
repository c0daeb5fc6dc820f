//! Authentication and data integrity core for D-Drive.
//!
//! See [`ddrive`] for the module overview, architecture diagram,
//! and public API documentation.

mod audit;
mod auth;
mod clock;
mod credential;
mod ddrive;
mod error;
mod integrity;
mod rate_limit;
mod sanitize;
mod session;
mod upload;

// The ddrive.rs facade controls the entire public API surface.
pub use self::ddrive::*;
