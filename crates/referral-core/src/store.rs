//! Persistence seam used by the reward ledger operation.
//!
//! Reads hand out rows together with their version. Writes are collected into
//! a [`WriteBatch`] in which every row carries the version it was derived
//! from; a store must apply the batch all-or-nothing and only if every one of
//! those versions is still current, otherwise it returns
//! [`ReferralError::TransientConflict`] and leaves every row untouched.

use std::collections::BTreeSet;

use crate::{
    error::ReferralError,
    event::LedgerEvent,
    model::{Account, AccountId, ReferralCode, Versioned},
};

pub trait LedgerStore: Send + Sync {
    fn account(&self, id: AccountId) -> Result<Option<Versioned<Account>>, ReferralError>;

    fn referral_code(&self, code: &str) -> Result<Option<Versioned<ReferralCode>>, ReferralError>;

    /// Apply `batch` atomically. Returns the ledger height it committed at.
    fn commit(&self, batch: WriteBatch) -> Result<u64, ReferralError>;
}

impl<S: LedgerStore + ?Sized> LedgerStore for &S {
    fn account(&self, id: AccountId) -> Result<Option<Versioned<Account>>, ReferralError> {
        (**self).account(id)
    }

    fn referral_code(&self, code: &str) -> Result<Option<Versioned<ReferralCode>>, ReferralError> {
        (**self).referral_code(code)
    }

    fn commit(&self, batch: WriteBatch) -> Result<u64, ReferralError> {
        (**self).commit(batch)
    }
}

impl<S: LedgerStore + ?Sized> LedgerStore for std::sync::Arc<S> {
    fn account(&self, id: AccountId) -> Result<Option<Versioned<Account>>, ReferralError> {
        (**self).account(id)
    }

    fn referral_code(&self, code: &str) -> Result<Option<Versioned<ReferralCode>>, ReferralError> {
        (**self).referral_code(code)
    }

    fn commit(&self, batch: WriteBatch) -> Result<u64, ReferralError> {
        (**self).commit(batch)
    }
}

/// New contents for a row, conditional on the row still being at `expected_version`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RowWrite<T> {
    pub expected_version: u64,
    pub row: T,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct WriteBatch {
    pub accounts: Vec<RowWrite<Account>>,
    pub referral_codes: Vec<RowWrite<ReferralCode>>,
    pub events: Vec<LedgerEvent>,
}

impl WriteBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn account(mut self, expected_version: u64, row: Account) -> Self {
        self.accounts.push(RowWrite {
            expected_version,
            row,
        });
        self
    }

    pub fn referral_code(mut self, expected_version: u64, row: ReferralCode) -> Self {
        self.referral_codes.push(RowWrite {
            expected_version,
            row,
        });
        self
    }

    pub fn event(mut self, event: LedgerEvent) -> Self {
        self.events.push(event);
        self
    }

    /// A row may appear at most once per batch.
    pub fn check_unique(&self) -> Result<(), ReferralError> {
        let mut accounts = BTreeSet::new();
        if let Some(dup) = self.accounts.iter().find(|w| !accounts.insert(w.row.id)) {
            return Err(ReferralError::invalid(
                "batch",
                format!("account {} written twice", dup.row.id),
            ));
        }
        let mut codes = BTreeSet::new();
        if let Some(dup) = self
            .referral_codes
            .iter()
            .find(|w| !codes.insert(w.row.code.as_str()))
        {
            return Err(ReferralError::invalid(
                "batch",
                format!("referral code {} written twice", dup.row.code),
            ));
        }
        Ok(())
    }
}
