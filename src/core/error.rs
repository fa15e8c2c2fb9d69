use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ModelError {
    #[error("invalid economy constants: {0}")]
    InvalidConstants(&'static str),
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("degenerate configuration: {0}")]
    Degenerate(&'static str),
}
