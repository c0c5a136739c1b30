use serde::{Deserialize, Serialize};

use crate::model::{AccountId, Amount};

/// Audit entry produced by a committed trigger.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LedgerEvent {
    SignupReward {
        account: AccountId,
        code: String,
        amount: Amount,
    },
    ReferralLinked {
        account: AccountId,
        referrer: AccountId,
        code: String,
    },
    MilestoneBonus {
        owner: AccountId,
        code: String,
        signups: u64,
        amount: Amount,
    },
}

/// A journal entry as stored: the event plus the batch that committed it.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct EventRecord {
    pub height: u64,
    pub timestamp: u64,
    pub event: LedgerEvent,
}
