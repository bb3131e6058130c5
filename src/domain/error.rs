use thiserror::Error;

/// Top-level error type for the PICS sync service, aggregating each
/// module's own error enum via `#[from]` conversions. Used at the
/// service-wiring boundary; individual modules never depend on this type
/// themselves (see `crate::session::SessionError`, `crate::fetcher::FetchError`,
/// `crate::persister::PersistError`, `crate::app::config::ConfigError`).
#[derive(Error, Debug)]
pub enum PicsError {
    #[error("configuration error: {0}")]
    Config(#[from] crate::app::config::ConfigError),

    #[error("upstream session error: {0}")]
    Session(#[from] crate::session::SessionError),

    #[error("fetch error: {0}")]
    Fetch(#[from] crate::fetcher::FetchError),

    #[error("persistence error: {0}")]
    Persist(#[from] crate::persister::PersistError),

    #[error("store error: {0}")]
    Store(#[from] crate::store::StoreError),

    #[error("health server error: {0}")]
    Health(String),

    #[error("shutdown error: {0}")]
    Shutdown(String),
}
