//! Error taxonomy for remote calls and harvesting

use crate::kv::KvError;

/// Classified failure of a single remote call, as reported by a [`RemoteClient`].
///
/// [`RemoteClient`]: crate::client::RemoteClient
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallError {
    /// Quota or rate limit signal (HTTP 429, YouTube `quotaExceeded`, ...)
    RateLimited(String),
    /// Network failure or 5xx; worth retrying
    Transient(String),
    /// Resource permanently has nothing to give (comments disabled, not found)
    Unavailable(String),
    /// Response could not be decoded into the expected page shape
    Malformed(String),
}

impl std::fmt::Display for CallError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::RateLimited(m) => write!(f, "rate limited: {m}"),
            Self::Transient(m) => write!(f, "transient: {m}"),
            Self::Unavailable(m) => write!(f, "unavailable: {m}"),
            Self::Malformed(m) => write!(f, "malformed response: {m}"),
        }
    }
}

impl std::error::Error for CallError {}

/// Error surfaced by the governor, paginator, discovery or orchestrator.
#[derive(Debug)]
pub enum HarvestError {
    /// Remote budget exhausted; every further call would fail the same way
    QuotaExceeded(String),
    /// Retries exhausted on a transient failure; local to the current unit
    Transient(String),
    /// Unit has nothing to harvest and never will
    Unavailable(String),
    /// Page missing an expected cursor/item shape; local to the current unit
    MalformedPage(String),
    /// Sink I/O failure
    Io(std::io::Error),
    /// Checkpoint store failure
    Checkpoint(KvError),
}

impl std::fmt::Display for HarvestError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::QuotaExceeded(m) => write!(f, "quota exceeded: {m}"),
            Self::Transient(m) => write!(f, "transient failure: {m}"),
            Self::Unavailable(m) => write!(f, "unavailable: {m}"),
            Self::MalformedPage(m) => write!(f, "malformed page: {m}"),
            Self::Io(e) => write!(f, "IO: {e}"),
            Self::Checkpoint(e) => write!(f, "checkpoint: {e}"),
        }
    }
}

impl std::error::Error for HarvestError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            Self::Checkpoint(e) => Some(e),
            _ => None,
        }
    }
}

impl HarvestError {
    /// Whether the whole run must stop.
    ///
    /// Quota exhaustion affects every later call; local I/O failures would
    /// break the write-then-checkpoint ordering.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::QuotaExceeded(_) | Self::Io(_) | Self::Checkpoint(_))
    }

    /// Whether the failure only concerns the current unit (it stays resumable).
    pub fn is_unit_failure(&self) -> bool {
        matches!(self, Self::Transient(_) | Self::MalformedPage(_))
    }
}

impl From<std::io::Error> for HarvestError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e)
    }
}

impl From<KvError> for HarvestError {
    fn from(e: KvError) -> Self {
        Self::Checkpoint(e)
    }
}
