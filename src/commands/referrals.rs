use referral_core::{AccountId, LedgerStore, ReferralError, ReferralLedger};
use serde_json::{json, Value};

use super::{Command, Context};

/// Referral code commands.
#[derive(Debug, clap::Subcommand)]
pub enum Referrals {
    /// List the referral codes owned by a user.
    List { user_id: AccountId },
    /// Issue a new referral code for a user.
    Create { user_id: AccountId },
    /// Show a referral code.
    Show { code: String },
    /// Delete a referral code.
    Delete { code: String },
    /// Redeem a referral code for a newly created user.
    Trigger {
        code: String,
        /// The user being referred.
        #[arg(long)]
        user_id: AccountId,
    },
}

impl Command for Referrals {
    fn is_mutating(&self) -> bool {
        !matches!(self, Self::List { .. } | Self::Show { .. })
    }

    fn execute(&self, ctx: &Context<'_>) -> eyre::Result<Value> {
        let output = match self {
            Self::List { user_id } => {
                json!({ "referrals": ctx.store.referral_codes_of(*user_id)? })
            }
            Self::Create { user_id } => {
                let referral = ctx.store.create_referral_code(*user_id)?;
                tracing::info!(code = %referral.code, owner = user_id, "referral code created");
                json!({
                    "referral": referral,
                    "messages": ["Referral created successfully"],
                })
            }
            Self::Show { code } => {
                let referral = ctx
                    .store
                    .referral_code(code)?
                    .ok_or_else(|| ReferralError::ReferralNotFound(code.clone()))?;
                json!({ "referral": referral.row })
            }
            Self::Delete { code } => {
                ctx.store.delete_referral_code(code)?;
                tracing::info!(code = %code, "referral code deleted");
                json!({ "messages": ["Referral deleted successfully"] })
            }
            Self::Trigger { code, user_id } => {
                let ledger = ReferralLedger::new(ctx.store);
                let outcome = ctx.retry.run(|| ledger.trigger(code, *user_id))?;
                serde_json::to_value(outcome)?
            }
        };
        Ok(output)
    }
}
