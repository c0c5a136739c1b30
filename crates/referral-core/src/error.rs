use thiserror::Error;

use crate::model::AccountId;

/// Canonical error type exposed by the referral ledger.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ReferralError {
    /// No referral code is stored under the requested token.
    #[error("referral code {0} not found")]
    ReferralNotFound(String),

    /// No account is stored under the requested id.
    #[error("account {0} not found")]
    AccountNotFound(AccountId),

    /// The account already has a referrer.
    #[error("referral was already triggered for account {account} (referred by {referrer})")]
    AlreadyTriggered {
        account: AccountId,
        referrer: AccountId,
    },

    /// The account tried to redeem a code it owns.
    #[error("account {0} cannot redeem its own referral code")]
    SelfReferral(AccountId),

    /// A row changed between read and commit. The whole operation may be re-run.
    #[error("concurrent write conflict on {0}")]
    TransientConflict(String),

    /// Crediting the account would overflow its balance.
    #[error("balance overflow on account {0}")]
    BalanceOverflow(AccountId),

    /// Input rejected by field validation.
    #[error("invalid {field}: {reason}")]
    Invalid { field: &'static str, reason: String },

    /// Snapshot contents are inconsistent: a state root mismatch or a
    /// duplicated key.
    #[error("ledger integrity check failed: {0}")]
    Integrity(String),

    /// Failure inside the persistence layer.
    #[error("storage failure: {0}")]
    Storage(String),
}

/// Coarse classification used by callers to pick a response and retry policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    AlreadyTriggered,
    Rejected,
    Invalid,
    TransientConflict,
    Internal,
}

impl ReferralError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::ReferralNotFound(_) | Self::AccountNotFound(_) => ErrorKind::NotFound,
            Self::AlreadyTriggered { .. } => ErrorKind::AlreadyTriggered,
            Self::SelfReferral(_) => ErrorKind::Rejected,
            Self::Invalid { .. } | Self::BalanceOverflow(_) => ErrorKind::Invalid,
            Self::TransientConflict(_) => ErrorKind::TransientConflict,
            Self::Integrity(_) | Self::Storage(_) => ErrorKind::Internal,
        }
    }

    /// Only commit conflicts are worth re-running; everything else is deterministic.
    pub fn is_retriable(&self) -> bool {
        self.kind() == ErrorKind::TransientConflict
    }

    pub(crate) fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            field,
            reason: reason.into(),
        }
    }
}
