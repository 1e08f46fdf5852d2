use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("store operation failed: {0}")]
    Internal(String),
}
