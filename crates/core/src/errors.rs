//! Error taxonomy shared across the keeper. Transient errors are retried on
//! the next tick with backoff; decisive errors change watch-set state;
//! fatal/configuration errors are surfaced to the operator.

use thiserror::Error;

/// Classified revert reason from a settlement dry-run or submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RevertClass {
    /// Wrong addressing guess; try the next index candidate.
    InvalidIndex,
    /// Valid index, condition not yet met. Expected most ticks.
    NotTriggered,
    /// Position already settled; remove it from the watch set.
    AlreadyClosed,
    /// Signing identity not accepted by the ledger. Fatal.
    Unauthorized,
    /// Anything else, with the raw reason text.
    Other(String),
}

impl std::fmt::Display for RevertClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidIndex => write!(f, "invalid index"),
            Self::NotTriggered => write!(f, "condition not yet met"),
            Self::AlreadyClosed => write!(f, "already closed"),
            Self::Unauthorized => write!(f, "unauthorized"),
            Self::Other(reason) => write!(f, "revert: {reason}"),
        }
    }
}

/// Result of a state-non-mutating simulation of a settlement call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SimulationOutcome {
    Ok,
    Revert(RevertClass),
}

/// Failures reading the oracle feed.
#[derive(Debug, Error)]
pub enum OracleError {
    /// No price feed configured or resolvable for the instrument. Fatal.
    #[error("no price feed configured for instrument {0}")]
    FeedUnavailable(String),
    /// Feed answer could not be interpreted (negative, out of range).
    #[error("malformed oracle answer for {instrument}: {detail}")]
    MalformedAnswer { instrument: String, detail: String },
    /// RPC/network failure; transient.
    #[error("oracle transport error: {0}")]
    Transport(String),
}

impl OracleError {
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::Transport(_))
    }
}

/// Failures talking to the ledger contract.
#[derive(Debug, Error)]
pub enum LedgerError {
    /// Upstream position read failed; transient, never "no positions".
    #[error("registry read failed: {0}")]
    RegistryUnavailable(String),
    /// RPC/network failure; transient.
    #[error("ledger transport error: {0}")]
    Transport(String),
    /// Ledger response could not be interpreted.
    #[error("malformed ledger response: {0}")]
    Malformed(String),
    /// Signing identity rejected. Fatal.
    #[error("signing identity unauthorized: {0}")]
    Unauthorized(String),
    /// A mutating call was accepted but did not confirm successfully.
    #[error("submission failed: {0}")]
    Submission(String),
}

impl LedgerError {
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::RegistryUnavailable(_) | Self::Transport(_) | Self::Submission(_)
        )
    }
}
