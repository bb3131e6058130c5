//! Domain layer for the PICS sync service.
//!
//! Contains the canonical types shared across all modules:
//! - `ExtractedApp`: the pipeline's core data type, produced by the extractor
//!   and consumed by the persister
//! - `AppType`: the enumerated catalog type
//! - `PicsError`: top-level error type

pub mod error;
pub mod extracted_app;

pub use error::PicsError;
pub use extracted_app::{AppType, Association, AssociationKind, ExtractedApp, SteamDeckCompatibility};
