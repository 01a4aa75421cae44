//! Freight dispatch engine
//!
//! Stop scheduling with hours-of-service breaks, pricing decisions, run
//! insertion search and a cached, retrying routing client.

pub mod config;
pub mod defaults;
pub mod error;
pub mod services;
pub mod types;

pub use error::{DispatchError, Warnings};
