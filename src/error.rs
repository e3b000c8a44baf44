// src/error.rs

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Git error: {0}")]
    Git(#[from] git2::Error),

    #[error("Request error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Search error: {0}")]
    Search(String),

    #[error("Request quota exhausted for {url} (retry after {retry_after:?})")]
    RateLimited { url: String, retry_after: Duration },

    #[error("Repository {url} unavailable after {attempts} clone attempts")]
    CloneUnavailable { url: String, attempts: u32 },

    #[error("Scan of {} exceeded its budget of {budget:?}", path.display())]
    ScanBudgetExceeded { path: PathBuf, budget: Duration },

    #[error("Worker task failed: {0}")]
    Task(#[from] tokio::task::JoinError),

    #[error("Not found: {0}")]
    NotFound(String),
}

pub type Result<T> = std::result::Result<T, Error>;
