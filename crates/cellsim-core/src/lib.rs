//! Core types and utilities for the cell growth and placement simulation.

pub mod types;
pub mod config;
pub mod error;
pub mod geometry;
pub mod random;

pub use error::{Error, Result};
pub use types::*;
pub use config::*;
pub use random::{Rrf, Generator};
