//! The reward ledger operation.
//!
//! [`ReferralLedger::trigger`] validates a referral code redemption and pays
//! out the signup reward (and, on a milestone, the owner bonus). All rows it
//! reads are carried into one [`WriteBatch`] with their read versions, so the
//! guards and the mutation are a single conditional commit: if anything the
//! guards looked at changes before the commit lands, nothing is written and
//! the caller gets [`ReferralError::TransientConflict`].

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::{
    error::ReferralError,
    event::LedgerEvent,
    model::{AccountId, Amount, ReferralCode},
    policy::RewardPlan,
    store::{LedgerStore, WriteBatch},
};

pub const TRIGGER_MESSAGE: &str = "Referral triggered successfully";

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct TriggerOutcome {
    pub referral_code: ReferralCode,
    pub message: String,
    pub signup_reward: Amount,
    pub milestone_bonus: Option<Amount>,
    pub height: u64,
}

pub struct ReferralLedger<S> {
    store: S,
}

impl<S: LedgerStore> ReferralLedger<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Redeem `code` for `account_id`.
    ///
    /// Runs exactly once; a [`ReferralError::TransientConflict`] means the
    /// whole call may be repeated (see [`crate::retry::RetryPolicy`]).
    pub fn trigger(&self, code: &str, account_id: AccountId) -> Result<TriggerOutcome, ReferralError> {
        let referral = self
            .store
            .referral_code(code)?
            .ok_or_else(|| ReferralError::ReferralNotFound(code.to_owned()))?;
        let target = self
            .store
            .account(account_id)?
            .ok_or(ReferralError::AccountNotFound(account_id))?;
        if let Some(referrer) = target.row.referred_by_id {
            return Err(ReferralError::AlreadyTriggered {
                account: account_id,
                referrer,
            });
        }
        let owner_id = referral.row.owner_id;
        if owner_id == account_id {
            return Err(ReferralError::SelfReferral(account_id));
        }
        let owner = self
            .store
            .account(owner_id)?
            .ok_or(ReferralError::AccountNotFound(owner_id))?;

        let mut code_row = referral.row;
        let signups = code_row.record_signup();
        let plan = RewardPlan::for_signup(signups);

        let mut target_row = target.row;
        target_row.credit(plan.signup_reward)?;
        target_row.referred_by_id = Some(owner_id);

        let mut batch = WriteBatch::new()
            .account(target.version, target_row)
            .referral_code(referral.version, code_row.clone())
            .event(LedgerEvent::SignupReward {
                account: account_id,
                code: code_row.code.clone(),
                amount: plan.signup_reward,
            })
            .event(LedgerEvent::ReferralLinked {
                account: account_id,
                referrer: owner_id,
                code: code_row.code.clone(),
            });

        if let Some(bonus) = plan.milestone_bonus {
            let mut owner_row = owner.row;
            owner_row.credit(bonus)?;
            batch = batch
                .account(owner.version, owner_row)
                .event(LedgerEvent::MilestoneBonus {
                    owner: owner_id,
                    code: code_row.code.clone(),
                    signups,
                    amount: bonus,
                });
        }

        debug!(code, account = account_id, signups, "committing referral trigger");
        let height = self.store.commit(batch)?;
        info!(
            code,
            account = account_id,
            referrer = owner_id,
            signups,
            milestone = plan.milestone_bonus.is_some(),
            height,
            "referral triggered"
        );

        Ok(TriggerOutcome {
            referral_code: code_row,
            message: TRIGGER_MESSAGE.to_owned(),
            signup_reward: plan.signup_reward,
            milestone_bonus: plan.milestone_bonus,
            height,
        })
    }
}
