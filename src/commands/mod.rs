use referral_core::{ErrorKind, MemoryStore, RetryPolicy};
use serde_json::{json, Value};

use referrals::Referrals;
use users::Users;

mod referrals;
mod users;

/// Commands.
#[derive(Debug, clap::Subcommand)]
pub enum Commands {
    /// User account commands.
    #[command(subcommand)]
    Users(Users),
    /// Referral code commands.
    #[command(subcommand)]
    Referrals(Referrals),
    /// Print the reward journal.
    Events,
    /// Recompute the ledger state root.
    Verify,
}

pub(crate) trait Command {
    /// Whether the ledger file must be written back afterwards.
    fn is_mutating(&self) -> bool {
        false
    }

    fn execute(&self, ctx: &Context<'_>) -> eyre::Result<Value>;
}

impl Command for Commands {
    fn is_mutating(&self) -> bool {
        match self {
            Self::Users(users) => users.is_mutating(),
            Self::Referrals(referrals) => referrals.is_mutating(),
            Self::Events | Self::Verify => false,
        }
    }

    fn execute(&self, ctx: &Context<'_>) -> eyre::Result<Value> {
        match self {
            Self::Users(users) => users.execute(ctx),
            Self::Referrals(referrals) => referrals.execute(ctx),
            Self::Events => Ok(json!({ "events": ctx.store.events()? })),
            Self::Verify => {
                let snapshot = ctx.store.snapshot()?;
                snapshot.verify()?;
                Ok(json!({
                    "stateRoot": snapshot.state_root,
                    "height": snapshot.meta.height,
                }))
            }
        }
    }
}

pub(crate) struct Context<'a> {
    store: &'a MemoryStore,
    retry: &'a RetryPolicy,
}

impl<'a> Context<'a> {
    pub(crate) fn new(store: &'a MemoryStore, retry: &'a RetryPolicy) -> Self {
        Self { store, retry }
    }
}

/// HTTP-style status and process exit code for a ledger error.
pub(crate) fn status_of(kind: ErrorKind) -> (u16, u8) {
    match kind {
        ErrorKind::NotFound => (404, 4),
        ErrorKind::AlreadyTriggered => (409, 5),
        ErrorKind::Rejected | ErrorKind::Invalid => (422, 6),
        ErrorKind::TransientConflict => (503, 7),
        ErrorKind::Internal => (500, 1),
    }
}
