use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum CfrError {
    #[error("Invalid card notation: {0}")]
    InvalidCard(String),

    #[error("Invalid game definition: {0}")]
    InvalidGame(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Missing value file: {}", .0.display())]
    MissingFile(PathBuf),

    #[error("Value file {} has data past the last node", .path.display())]
    TrailingData { path: PathBuf },

    #[error("Value file {} ended before the last node", .path.display())]
    Truncated { path: PathBuf },

    #[error("Node count mismatch for player {player} street {street}: tree has {expected}, store has {found}")]
    NodeCountMismatch {
        player: usize,
        street: usize,
        expected: usize,
        found: usize,
    },

    #[error("Invariant violated: {0}")]
    Invariant(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type CfrResult<T> = Result<T, CfrError>;
