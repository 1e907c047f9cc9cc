use reqwest::StatusCode;
use thiserror::Error;

/// Failure kinds surfaced by the Fullup client.
///
/// The batch paths (`authenticate`, `get_tanks`) swallow these at the call
/// boundary and hand the caller a `false`/`None` sentinel instead; only the
/// standalone history accessor returns them directly so callers can tell an
/// authentication problem from a fetch problem.
#[derive(Debug, Error)]
pub enum FullupError {
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("authentication with the Fullup API failed")]
    AuthenticationFailure,

    #[error("Fullup API returned status {status}")]
    Upstream { status: StatusCode },

    #[error("unexpected Fullup API payload: {0}")]
    Data(String),
}

impl FullupError {
    /// Status code of the upstream response, when the failure carries one.
    pub fn upstream_status(&self) -> Option<StatusCode> {
        match self {
            FullupError::Upstream { status } => Some(*status),
            _ => None,
        }
    }
}
