//! Base types and error handling.
//!
//! Provides the error taxonomy shared across the crate:
//! - [`DispatchError`]: every failure mode of a dispatched request
//! - [`TransportError`]: opaque failures reported by a transport

pub mod error;

pub use error::{DispatchError, TransportError};
