use referral_core::{Account, AccountForm, AccountId, Amount, LedgerStore, ReferralError};
use serde::Serialize;
use serde_json::{json, Value};

use super::{Command, Context};

/// User account commands.
#[derive(Debug, clap::Subcommand)]
pub enum Users {
    /// List all users.
    List,
    /// Create a user.
    Create(UserArgs),
    /// Show a user.
    Show { id: AccountId },
    /// Show a user's balance.
    Balance { id: AccountId },
    /// Replace a user's details.
    Update {
        id: AccountId,
        #[command(flatten)]
        args: UserArgs,
    },
    /// Delete a user and the referral codes it owns.
    Delete { id: AccountId },
}

#[derive(Debug, clap::Args)]
pub struct UserArgs {
    #[arg(long)]
    name: String,
    #[arg(long)]
    email: String,
    #[arg(long)]
    password: String,
    #[arg(long)]
    password_confirmation: String,
    /// Set the balance directly (administrative edit).
    #[arg(long)]
    balance: Option<Amount>,
}

impl UserArgs {
    fn to_form(&self) -> AccountForm {
        AccountForm {
            name: self.name.clone(),
            email: self.email.clone(),
            password: self.password.clone(),
            password_confirmation: self.password_confirmation.clone(),
            balance: self.balance,
        }
    }
}

/// Public view of an account; the password digest is never exposed.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct UserEntity<'a> {
    id: AccountId,
    name: &'a str,
    email: &'a str,
    balance: Amount,
    referred_by_id: Option<AccountId>,
}

impl<'a> From<&'a Account> for UserEntity<'a> {
    fn from(account: &'a Account) -> Self {
        Self {
            id: account.id,
            name: &account.name,
            email: &account.email,
            balance: account.balance,
            referred_by_id: account.referred_by_id,
        }
    }
}

fn find(ctx: &Context<'_>, id: AccountId) -> Result<Account, ReferralError> {
    ctx.store
        .account(id)?
        .map(|stored| stored.row)
        .ok_or(ReferralError::AccountNotFound(id))
}

impl Command for Users {
    fn is_mutating(&self) -> bool {
        matches!(self, Self::Create(_) | Self::Update { .. } | Self::Delete { .. })
    }

    fn execute(&self, ctx: &Context<'_>) -> eyre::Result<Value> {
        let output = match self {
            Self::List => {
                let accounts = ctx.store.accounts()?;
                let users: Vec<UserEntity<'_>> = accounts.iter().map(UserEntity::from).collect();
                json!({ "users": users })
            }
            Self::Create(args) => {
                let account = ctx.store.create_account(&args.to_form())?;
                tracing::info!(account = account.id, "user created");
                json!({ "user": UserEntity::from(&account) })
            }
            Self::Show { id } => {
                let account = find(ctx, *id)?;
                json!({ "user": UserEntity::from(&account) })
            }
            Self::Balance { id } => {
                let account = find(ctx, *id)?;
                json!({ "balance": account.balance })
            }
            Self::Update { id, args } => {
                ctx.store.update_account(*id, &args.to_form())?;
                tracing::info!(account = id, "user updated");
                json!({ "messages": ["User updated successfully"] })
            }
            Self::Delete { id } => {
                ctx.store.delete_account(*id)?;
                tracing::info!(account = id, "user deleted");
                json!({ "messages": ["User deleted successfully"] })
            }
        };
        Ok(output)
    }
}
