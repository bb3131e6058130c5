use thiserror::Error;

#[derive(Error, Debug)]
pub enum PersistError {
    #[error("store error: {0}")]
    Store(#[from] crate::store::StoreError),

    #[error("tag name fetch failed: {0}")]
    TagFetch(#[from] reqwest::Error),
}
