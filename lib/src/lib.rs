//! Parse raw inbound email and forward it as JSON to an HTTP endpoint.

pub mod config;
pub mod drain;
pub mod email;
pub mod forward;
pub mod pipeline;

mod error;

#[cfg(test)]
mod testing;

pub use error::Error;
pub use pipeline::{Failure, InboundEvent, Pipeline, Stage};
