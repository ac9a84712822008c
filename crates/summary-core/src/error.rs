use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid data: {0}")]
    Invalid(String),

    #[error("Remote failure: {0}")]
    Remote(String),

    #[error("Storage error: {0}")]
    Storage(String),
}
