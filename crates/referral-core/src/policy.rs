//! The fixed reward rule.
//!
//! Every successful trigger pays [`SIGNUP_REWARD`] to the referred account. A
//! code owner additionally receives [`MILESTONE_REWARD`] each time the code's
//! cumulative signups reach a multiple of [`MILESTONE_INTERVAL`].

use serde::{Deserialize, Serialize};

use crate::model::Amount;

pub const SIGNUP_REWARD: Amount = 10;
pub const MILESTONE_REWARD: Amount = 10;
pub const MILESTONE_INTERVAL: u64 = 5;

/// Credits owed for a single signup.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RewardPlan {
    pub signup_reward: Amount,
    pub milestone_bonus: Option<Amount>,
}

impl RewardPlan {
    /// Plan for the signup that brought a code to `signup_count`.
    pub fn for_signup(signup_count: u64) -> Self {
        Self {
            signup_reward: SIGNUP_REWARD,
            milestone_bonus: is_milestone(signup_count).then_some(MILESTONE_REWARD),
        }
    }
}

pub fn is_milestone(signup_count: u64) -> bool {
    signup_count != 0 && signup_count % MILESTONE_INTERVAL == 0
}
