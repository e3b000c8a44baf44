// src/lib.rs

//! Mines public repositories' history to measure how contributors use a
//! framework's API surface.

pub mod adoption;
pub mod analyzer;
pub mod clone;
pub mod config;
pub mod discovery;
pub mod error;
pub mod metrics;
pub mod model;
pub mod pipeline;
pub mod store;

#[cfg(test)]
mod test_repo;

pub use error::{Error, Result};
