use thiserror::Error;

#[derive(Error, Debug)]
pub enum FetchError {
    #[error("upstream unavailable: reconnect failed")]
    Unavailable,
    #[error("upstream call failed after retries: {0}")]
    RetriesExhausted(String),
}
