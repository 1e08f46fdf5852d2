use thiserror::Error;

#[derive(Error, Debug)]
pub enum ServerError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("tls error: {0}")]
    Tls(String),

    #[error("rule not found")]
    RuleNotFound,
}
