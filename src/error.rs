use thiserror::Error;

#[derive(Error, Debug)]
pub enum DashboardError {
    #[error("Upload error: {0}")]
    Upload(String),

    #[error("Ingest error: {0}")]
    Ingest(String),

    #[error("LLM error: {0}")]
    Llm(String),

    #[error("Modification error: {0}")]
    Modification(String),

    #[error("A modification is already in progress")]
    Busy,

    #[error("Session error: {0}")]
    Session(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, DashboardError>;
