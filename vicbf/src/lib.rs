use std::io;

use thiserror::Error;

pub mod batch;
pub mod filter;
mod fpr;
pub use fpr::*;
pub mod hash;
pub use hash::KeyHash;
pub mod rounds;
mod search;
pub use search::*;
pub mod utils;

#[derive(Debug, Error)]
pub enum Error {
    #[error("{0}")]
    IoError(#[from] io::Error),
    #[error("{0}")]
    Search(#[from] SearchError),
    #[error("invalid version {0}")]
    InvalidVersion(u8),
    #[error("invalid filter parameters: {0}")]
    InvalidParams(String),
    #[error("corrupted filter: {0}")]
    Corrupted(String),
    #[error("key is not in the filter")]
    NotPresent,
    #[error("line {line}: {reason}")]
    Parse { line: usize, reason: String },
    #[error("invalid column expression \"{0}\"")]
    InvalidExpr(String),
    #[error("unknown preset \"{0}\"")]
    UnknownPreset(String),
    #[error("compression failed: {0}")]
    Compression(io::Error),
    #[error("search worker panicked")]
    Worker,
}
