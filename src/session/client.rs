use super::error::SessionError;
use async_trait::async_trait;
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::broadcast;

/// A single app's raw PICS record, as delivered by the upstream platform.
/// Kept as an opaque JSON value: the extractor (`crate::extractor`) is the
/// only thing that knows its shape, and the shape varies by app.
pub type RawAppRecord = serde_json::Value;

/// Result of `get_changes_since`: the new global change number and the
/// set of appids it touched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeDelta {
    pub current_change_number: u64,
    pub app_changes: Vec<u32>,
}

/// Connection lifecycle events the upstream library pushes asynchronously.
/// The session subscribes to these and routes them into its own state
/// machine; see SPEC_FULL.md §9 ("Event callbacks").
#[derive(Debug, Clone)]
pub enum UpstreamEvent {
    Disconnected,
    Error(String),
}

/// The upstream platform's wire protocol, modeled as a trait rather than
/// implemented directly: the real protocol is a proprietary binary
/// protocol this repository does not describe (SPEC_FULL.md §1). Anything
/// satisfying this trait can drive the session, fetcher, monitor, and
/// bulk-backfill components unchanged.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait UpstreamClient: Send + Sync + 'static {
    async fn anonymous_login(&self) -> Result<bool, SessionError>;

    async fn get_product_info(
        &self,
        appids: &[u32],
        timeout: Duration,
    ) -> Result<HashMap<u32, RawAppRecord>, SessionError>;

    async fn get_changes_since(&self, since: u64) -> Result<Option<ChangeDelta>, SessionError>;

    async fn disconnect(&self);

    /// Subscribe to connection lifecycle events. Each call returns an
    /// independent receiver (broadcast semantics), matching how the
    /// session's event-routing task and any future observer can coexist.
    fn subscribe_events(&self) -> broadcast::Receiver<UpstreamEvent>;
}

/// Placeholder `UpstreamClient` wired in by default at the service-level
/// boundary. The real wire protocol is proprietary and out of scope (see
/// the trait doc above); every call fails with `SessionError::NotImplemented`
/// so the rest of the pipeline (reconnect/backoff/queueing) exercises its
/// real logic end to end once a production client is substituted in.
#[derive(Debug, Default)]
pub struct UnimplementedUpstreamClient;

impl UnimplementedUpstreamClient {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl UpstreamClient for UnimplementedUpstreamClient {
    async fn anonymous_login(&self) -> Result<bool, SessionError> {
        Err(SessionError::NotImplemented("anonymous_login"))
    }

    async fn get_product_info(
        &self,
        _appids: &[u32],
        _timeout: Duration,
    ) -> Result<HashMap<u32, RawAppRecord>, SessionError> {
        Err(SessionError::NotImplemented("get_product_info"))
    }

    async fn get_changes_since(&self, _since: u64) -> Result<Option<ChangeDelta>, SessionError> {
        Err(SessionError::NotImplemented("get_changes_since"))
    }

    async fn disconnect(&self) {}

    fn subscribe_events(&self) -> broadcast::Receiver<UpstreamEvent> {
        broadcast::channel(1).1
    }
}
