//! Bridge error kinds.
//!
//! These codes are stable: they cross the HTTP surface and the job event bus
//! unchanged, and the queue uses the retryable/fatal split to decide between
//! backoff-retry and terminal failure.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum BridgeError {
    /// Signature does not recover to the claimed EVM address
    #[error("InvalidSignature")]
    InvalidSignature,

    /// No confirmed claim links the native and EVM addresses
    #[error("InvalidOwner")]
    InvalidOwner,

    /// Native address is on the oracle blacklist
    #[error("Blacklisted: {0}")]
    Blacklisted(String),

    /// Ledger balance below the requested amount
    #[error("InsufficientBalance")]
    InsufficientBalance,

    /// Duplicate hash or timestamp; the earlier submission won. Clients may
    /// treat this as success.
    #[error("AlreadyProcessed")]
    AlreadyProcessed,

    /// Hot wallet cannot cover the withdrawal yet; a delayed replacement job
    /// has been scheduled. Surfaced to the user as "pending", not an error.
    #[error("replaced by pending withdrawal")]
    PendingLiquidity,

    /// Malformed request field (negative amount, bad address, bad payload)
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Named-lock acquisition exhausted its retries
    #[error("lock contention on {0}")]
    ContentionTimeout(String),

    /// Chain RPC, node, or oracle failure
    #[error(transparent)]
    External(#[from] eyre::Report),
}

impl From<sqlx::Error> for BridgeError {
    fn from(e: sqlx::Error) -> Self {
        BridgeError::External(e.into())
    }
}

impl BridgeError {
    /// Whether the queue should retry the job with backoff.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            BridgeError::ContentionTimeout(_) | BridgeError::External(_)
        )
    }

    /// Stable code surfaced to clients and the event bus.
    pub fn code(&self) -> &'static str {
        match self {
            BridgeError::InvalidSignature => "InvalidSignature",
            BridgeError::InvalidOwner => "InvalidOwner",
            BridgeError::Blacklisted(_) => "Blacklisted",
            BridgeError::InsufficientBalance => "InsufficientBalance",
            BridgeError::AlreadyProcessed => "AlreadyProcessed",
            BridgeError::PendingLiquidity => "PendingLiquidity",
            BridgeError::InvalidRequest(_) => "InvalidRequest",
            BridgeError::ContentionTimeout(_) => "ContentionTimeout",
            BridgeError::External(_) => "ExternalFailure",
        }
    }
}

pub type BridgeResult<T> = std::result::Result<T, BridgeError>;

#[cfg(test)]
mod tests {
    use super::*;
    use eyre::eyre;

    #[test]
    fn test_retryable_split() {
        assert!(BridgeError::ContentionTimeout("balance:x".into()).is_retryable());
        assert!(BridgeError::External(eyre!("rpc down")).is_retryable());

        assert!(!BridgeError::InvalidSignature.is_retryable());
        assert!(!BridgeError::InvalidOwner.is_retryable());
        assert!(!BridgeError::InsufficientBalance.is_retryable());
        assert!(!BridgeError::AlreadyProcessed.is_retryable());
        assert!(!BridgeError::PendingLiquidity.is_retryable());
    }

    #[test]
    fn test_codes_are_stable() {
        assert_eq!(BridgeError::InvalidSignature.code(), "InvalidSignature");
        assert_eq!(BridgeError::External(eyre!("x")).code(), "ExternalFailure");
        assert_eq!(
            BridgeError::Blacklisted("paw_1abc".into()).code(),
            "Blacklisted"
        );
    }
}
