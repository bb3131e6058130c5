use thiserror::Error;

#[derive(Error, Debug)]
pub enum SessionError {
    #[error("login rejected by upstream")]
    LoginRejected,
    #[error("upstream call failed: {0}")]
    CallFailed(String),
    #[error("not connected")]
    NotConnected,
    #[error("reconnect attempts exhausted")]
    ReconnectExhausted,
    #[error("no production UpstreamClient is wired in: {0}")]
    NotImplemented(&'static str),
}
