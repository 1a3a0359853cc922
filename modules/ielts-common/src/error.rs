use thiserror::Error;

pub type Result<T> = std::result::Result<T, IeltsError>;

#[derive(Error, Debug)]
pub enum IeltsError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("State error: {0}")]
    State(String),

    #[error("Fetch error: {0}")]
    Fetch(String),

    #[error("Extraction error: {0}")]
    Extraction(String),

    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),
}
