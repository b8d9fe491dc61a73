//! Error types for the simulation.

use crate::types::CellId;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Invalid shape: length {length} must exceed width {width}")]
    InvalidShape { length: f64, width: f64 },

    #[error("Degenerate shape: {0}")]
    DegenerateShape(String),

    #[error("Placement precondition violated: {0}")]
    PlacementPrecondition(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Distribution error: {0}")]
    Distribution(String),

    #[error("Unknown cell: {0}")]
    UnknownCell(CellId),

    #[error("Invalid state: {0}")]
    InvalidState(String),
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}

impl From<rand_distr::NormalError> for Error {
    fn from(err: rand_distr::NormalError) -> Self {
        Error::Distribution(err.to_string())
    }
}
