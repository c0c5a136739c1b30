use rand::{rngs::OsRng, RngCore};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::ReferralError;

pub type AccountId = u64;
pub type Amount = u64;

const SALT_LEN: usize = 16;
const CODE_LEN: usize = 6; // bytes, rendered as 12 hex chars

/// A registered participant.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Account {
    pub id: AccountId,
    pub name: String,
    pub email: String,
    pub password_digest: PasswordDigest,
    pub balance: Amount,
    pub referred_by_id: Option<AccountId>,
}

impl Account {
    pub fn is_referred(&self) -> bool {
        self.referred_by_id.is_some()
    }

    pub fn credit(&mut self, amount: Amount) -> Result<(), ReferralError> {
        self.balance = self
            .balance
            .checked_add(amount)
            .ok_or(ReferralError::BalanceOverflow(self.id))?;
        Ok(())
    }
}

/// A redeemable token owned by an account.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ReferralCode {
    pub code: String,
    pub owner_id: AccountId,
    pub signup_count: u64,
}

impl ReferralCode {
    pub fn new(code: String, owner_id: AccountId) -> Self {
        Self {
            code,
            owner_id,
            signup_count: 0,
        }
    }

    /// Fresh random token. Uniqueness is enforced by the store.
    pub fn generate_token() -> String {
        let mut bytes = [0u8; CODE_LEN];
        OsRng.fill_bytes(&mut bytes);
        hex::encode(bytes)
    }

    /// Count one more signup and return the new total.
    pub fn record_signup(&mut self) -> u64 {
        self.signup_count += 1;
        self.signup_count
    }
}

/// A stored row together with its optimistic-concurrency version.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Versioned<T> {
    pub version: u64,
    pub row: T,
}

impl<T> Versioned<T> {
    pub fn new(row: T) -> Self {
        Self { version: 1, row }
    }
}

/// Salted SHA-256 of a password. Authentication lives outside this crate, so
/// this is only ever stored and compared.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct PasswordDigest {
    salt: String,
    hash: String,
}

impl PasswordDigest {
    pub fn new(password: &str) -> Self {
        let mut salt = [0u8; SALT_LEN];
        OsRng.fill_bytes(&mut salt);
        Self {
            hash: hash_password(&salt, password),
            salt: hex::encode(salt),
        }
    }

    pub fn verify(&self, password: &str) -> bool {
        match hex::decode(&self.salt) {
            Ok(salt) => hash_password(&salt, password) == self.hash,
            Err(_) => false,
        }
    }

    pub(crate) fn salt(&self) -> &str {
        &self.salt
    }

    pub(crate) fn hash(&self) -> &str {
        &self.hash
    }
}

fn hash_password(salt: &[u8], password: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(salt);
    hasher.update(password.as_bytes());
    hex::encode(hasher.finalize())
}

/// Fields accepted when creating or replacing an account.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct AccountForm {
    pub name: String,
    pub email: String,
    pub password: String,
    pub password_confirmation: String,
    pub balance: Option<Amount>,
}

impl AccountForm {
    pub fn validate(&self) -> Result<(), ReferralError> {
        require_present("name", &self.name)?;
        require_present("email", &self.email)?;
        require_present("password", &self.password)?;
        require_present("password_confirmation", &self.password_confirmation)?;
        if !looks_like_email(&self.email) {
            return Err(ReferralError::invalid("email", "must look like local@domain"));
        }
        if self.password != self.password_confirmation {
            return Err(ReferralError::invalid(
                "password_confirmation",
                "does not match password",
            ));
        }
        Ok(())
    }
}

fn require_present(field: &'static str, value: &str) -> Result<(), ReferralError> {
    if value.trim().is_empty() {
        return Err(ReferralError::invalid(field, "must not be blank"));
    }
    Ok(())
}

// `.+@.+`
fn looks_like_email(value: &str) -> bool {
    value
        .char_indices()
        .any(|(idx, c)| c == '@' && idx > 0 && idx + 1 < value.len())
}
