//! Response simulation for the testpeer HTTP test double.
//!
//! Everything a handler needs to provoke a specific server behaviour lives
//! here: query parameter extraction, delays and staged (streamed) output,
//! request dumps, conditional content serving and JSON canonicalization.
//! The server crate only routes requests to these pieces and maps failures
//! to status codes.

#![deny(missing_docs)]

pub mod body;
pub mod content;
pub mod dump;
mod error;
pub mod json;
pub mod params;
pub mod response;
pub mod routes;
pub mod simulate;
pub mod template;

pub use error::{Result, SimError};
