use std::{
    collections::BTreeMap,
    sync::{RwLock, RwLockReadGuard, RwLockWriteGuard},
    time::{SystemTime, UNIX_EPOCH},
};

use tracing::debug;

use crate::{
    error::ReferralError,
    event::EventRecord,
    model::{Account, AccountForm, AccountId, PasswordDigest, ReferralCode, Versioned},
    snapshot::{LedgerSnapshot, SnapshotMetadata},
    store::{LedgerStore, WriteBatch},
};

const MAX_TOKEN_ATTEMPTS: usize = 16;

#[derive(Debug, Default)]
struct Tables {
    height: u64,
    next_account_id: AccountId,
    accounts: BTreeMap<AccountId, Versioned<Account>>,
    referral_codes: BTreeMap<String, Versioned<ReferralCode>>,
    events: Vec<EventRecord>,
}

/// In-process store. All rows live behind one lock, so a commit's version
/// check and apply happen in a single exclusive section.
#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild a store from a snapshot after checking its state root and
    /// that no account id or code appears twice.
    pub fn from_snapshot(snapshot: LedgerSnapshot) -> Result<Self, ReferralError> {
        snapshot.verify()?;
        let next_account_id = snapshot
            .accounts
            .iter()
            .map(|a| a.row.id + 1)
            .max()
            .unwrap_or(1)
            .max(snapshot.meta.next_account_id);
        let mut accounts = BTreeMap::new();
        for account in snapshot.accounts {
            let id = account.row.id;
            if accounts.insert(id, account).is_some() {
                return Err(ReferralError::Integrity(format!("duplicate account {id}")));
            }
        }
        let mut referral_codes = BTreeMap::new();
        for code in snapshot.referral_codes {
            let key = code.row.code.clone();
            if let Some(previous) = referral_codes.insert(key, code) {
                return Err(ReferralError::Integrity(format!(
                    "duplicate referral code {}",
                    previous.row.code
                )));
            }
        }
        let tables = Tables {
            height: snapshot.meta.height,
            next_account_id,
            accounts,
            referral_codes,
            events: snapshot.events,
        };
        Ok(Self {
            tables: RwLock::new(tables),
        })
    }

    pub fn snapshot(&self) -> Result<LedgerSnapshot, ReferralError> {
        let tables = self.read()?;
        Ok(LedgerSnapshot::new(
            SnapshotMetadata {
                height: tables.height,
                next_account_id: tables.next_account_id,
            },
            tables.accounts.values().cloned().collect(),
            tables.referral_codes.values().cloned().collect(),
            tables.events.clone(),
        ))
    }

    pub fn height(&self) -> Result<u64, ReferralError> {
        Ok(self.read()?.height)
    }

    pub fn accounts(&self) -> Result<Vec<Account>, ReferralError> {
        Ok(self
            .read()?
            .accounts
            .values()
            .map(|a| a.row.clone())
            .collect())
    }

    pub fn create_account(&self, form: &AccountForm) -> Result<Account, ReferralError> {
        form.validate()?;
        let mut tables = self.write()?;
        let id = tables.next_account_id.max(1);
        tables.next_account_id = id + 1;
        let account = Account {
            id,
            name: form.name.clone(),
            email: form.email.clone(),
            password_digest: PasswordDigest::new(&form.password),
            balance: form.balance.unwrap_or_default(),
            referred_by_id: None,
        };
        tables.accounts.insert(id, Versioned::new(account.clone()));
        tables.height += 1;
        debug!(account = id, "account created");
        Ok(account)
    }

    /// Replace the editable fields of an account. Bumps the row version so an
    /// in-flight trigger reading the old row fails its commit.
    pub fn update_account(&self, id: AccountId, form: &AccountForm) -> Result<Account, ReferralError> {
        form.validate()?;
        let mut tables = self.write()?;
        let stored = tables
            .accounts
            .get_mut(&id)
            .ok_or(ReferralError::AccountNotFound(id))?;
        stored.row.name = form.name.clone();
        stored.row.email = form.email.clone();
        stored.row.password_digest = PasswordDigest::new(&form.password);
        if let Some(balance) = form.balance {
            stored.row.balance = balance;
        }
        stored.version += 1;
        let account = stored.row.clone();
        tables.height += 1;
        debug!(account = id, "account updated");
        Ok(account)
    }

    /// Remove an account and every referral code it owns. Links from accounts
    /// it referred are left in place.
    pub fn delete_account(&self, id: AccountId) -> Result<Account, ReferralError> {
        let mut tables = self.write()?;
        let removed = tables
            .accounts
            .remove(&id)
            .ok_or(ReferralError::AccountNotFound(id))?;
        tables.referral_codes.retain(|_, c| c.row.owner_id != id);
        tables.height += 1;
        debug!(account = id, "account deleted");
        Ok(removed.row)
    }

    pub fn referral_codes_of(&self, owner: AccountId) -> Result<Vec<ReferralCode>, ReferralError> {
        let tables = self.read()?;
        if !tables.accounts.contains_key(&owner) {
            return Err(ReferralError::AccountNotFound(owner));
        }
        Ok(tables
            .referral_codes
            .values()
            .filter(|c| c.row.owner_id == owner)
            .map(|c| c.row.clone())
            .collect())
    }

    pub fn create_referral_code(&self, owner: AccountId) -> Result<ReferralCode, ReferralError> {
        let mut tables = self.write()?;
        if !tables.accounts.contains_key(&owner) {
            return Err(ReferralError::AccountNotFound(owner));
        }
        let token = (0..MAX_TOKEN_ATTEMPTS)
            .map(|_| ReferralCode::generate_token())
            .find(|token| !tables.referral_codes.contains_key(token))
            .ok_or_else(|| ReferralError::Storage("unable to allocate a unique referral code".into()))?;
        let code = ReferralCode::new(token.clone(), owner);
        tables
            .referral_codes
            .insert(token, Versioned::new(code.clone()));
        tables.height += 1;
        debug!(code = %code.code, owner, "referral code created");
        Ok(code)
    }

    pub fn delete_referral_code(&self, code: &str) -> Result<ReferralCode, ReferralError> {
        let mut tables = self.write()?;
        let removed = tables
            .referral_codes
            .remove(code)
            .ok_or_else(|| ReferralError::ReferralNotFound(code.to_owned()))?;
        tables.height += 1;
        debug!(code, "referral code deleted");
        Ok(removed.row)
    }

    pub fn events(&self) -> Result<Vec<EventRecord>, ReferralError> {
        Ok(self.read()?.events.clone())
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, Tables>, ReferralError> {
        self.tables
            .read()
            .map_err(|_| ReferralError::Storage("ledger lock poisoned".into()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, Tables>, ReferralError> {
        self.tables
            .write()
            .map_err(|_| ReferralError::Storage("ledger lock poisoned".into()))
    }
}

impl LedgerStore for MemoryStore {
    fn account(&self, id: AccountId) -> Result<Option<Versioned<Account>>, ReferralError> {
        Ok(self.read()?.accounts.get(&id).cloned())
    }

    fn referral_code(&self, code: &str) -> Result<Option<Versioned<ReferralCode>>, ReferralError> {
        Ok(self.read()?.referral_codes.get(code).cloned())
    }

    fn commit(&self, batch: WriteBatch) -> Result<u64, ReferralError> {
        batch.check_unique()?;
        let mut tables = self.write()?;

        // Check every precondition before touching anything.
        for write in &batch.accounts {
            let current = tables.accounts.get(&write.row.id).map(|a| a.version);
            if current != Some(write.expected_version) {
                return Err(ReferralError::TransientConflict(format!(
                    "account {}",
                    write.row.id
                )));
            }
        }
        for write in &batch.referral_codes {
            let current = tables.referral_codes.get(&write.row.code).map(|c| c.version);
            if current != Some(write.expected_version) {
                return Err(ReferralError::TransientConflict(format!(
                    "referral code {}",
                    write.row.code
                )));
            }
        }

        for write in batch.accounts {
            tables.accounts.insert(
                write.row.id,
                Versioned {
                    version: write.expected_version + 1,
                    row: write.row,
                },
            );
        }
        for write in batch.referral_codes {
            tables.referral_codes.insert(
                write.row.code.clone(),
                Versioned {
                    version: write.expected_version + 1,
                    row: write.row,
                },
            );
        }

        tables.height += 1;
        let height = tables.height;
        let timestamp = unix_now();
        tables
            .events
            .extend(batch.events.into_iter().map(|event| EventRecord {
                height,
                timestamp,
                event,
            }));
        debug!(height, "write batch committed");
        Ok(height)
    }
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn form(name: &str) -> AccountForm {
        AccountForm {
            name: name.into(),
            email: format!("{name}@example.com"),
            password: "pw".into(),
            password_confirmation: "pw".into(),
            balance: None,
        }
    }

    #[test]
    fn stale_version_rejects_whole_batch() {
        let store = MemoryStore::new();
        let alice = store.create_account(&form("alice")).unwrap();
        let bob = store.create_account(&form("bob")).unwrap();
        let code = store.create_referral_code(alice.id).unwrap();

        let mut alice_row = store.account(alice.id).unwrap().unwrap();
        let mut bob_row = store.account(bob.id).unwrap().unwrap();
        let mut code_row = store.referral_code(&code.code).unwrap().unwrap();

        // Someone else edits bob first.
        store.update_account(bob.id, &form("robert")).unwrap();

        alice_row.row.balance = 99;
        bob_row.row.balance = 99;
        code_row.row.signup_count = 99;
        let err = store
            .commit(
                WriteBatch::new()
                    .account(alice_row.version, alice_row.row)
                    .account(bob_row.version, bob_row.row)
                    .referral_code(code_row.version, code_row.row),
            )
            .unwrap_err();
        assert_eq!(err, ReferralError::TransientConflict(format!("account {}", bob.id)));

        assert_eq!(store.account(alice.id).unwrap().unwrap().row.balance, 0);
        assert_eq!(store.account(bob.id).unwrap().unwrap().row.name, "robert");
        assert_eq!(
            store.referral_code(&code.code).unwrap().unwrap().row.signup_count,
            0
        );
        assert!(store.events().unwrap().is_empty());
    }

    #[test]
    fn commit_bumps_versions_and_height() {
        let store = MemoryStore::new();
        let alice = store.create_account(&form("alice")).unwrap();
        let before = store.height().unwrap();
        let row = store.account(alice.id).unwrap().unwrap();
        let height = store
            .commit(WriteBatch::new().account(row.version, row.row))
            .unwrap();
        assert_eq!(height, before + 1);
        assert_eq!(store.account(alice.id).unwrap().unwrap().version, row.version + 1);
    }

    #[test]
    fn duplicate_rows_in_batch_are_rejected() {
        let store = MemoryStore::new();
        let alice = store.create_account(&form("alice")).unwrap();
        let row = store.account(alice.id).unwrap().unwrap();
        let err = store
            .commit(
                WriteBatch::new()
                    .account(row.version, row.row.clone())
                    .account(row.version, row.row),
            )
            .unwrap_err();
        assert!(matches!(err, ReferralError::Invalid { field: "batch", .. }));
    }

    #[test]
    fn deleting_account_cascades_to_owned_codes() {
        let store = MemoryStore::new();
        let alice = store.create_account(&form("alice")).unwrap();
        let bob = store.create_account(&form("bob")).unwrap();
        let a1 = store.create_referral_code(alice.id).unwrap();
        let a2 = store.create_referral_code(alice.id).unwrap();
        let b1 = store.create_referral_code(bob.id).unwrap();
        assert_ne!(a1.code, a2.code);
        assert_eq!(store.referral_codes_of(alice.id).unwrap().len(), 2);

        store.delete_account(alice.id).unwrap();
        assert!(store.referral_code(&a1.code).unwrap().is_none());
        assert!(store.referral_code(&a2.code).unwrap().is_none());
        assert!(store.referral_code(&b1.code).unwrap().is_some());
        assert_eq!(
            store.referral_codes_of(alice.id),
            Err(ReferralError::AccountNotFound(alice.id))
        );
    }

    #[test]
    fn account_ids_are_not_reused() {
        let store = MemoryStore::new();
        let first = store.create_account(&form("first")).unwrap();
        store.delete_account(first.id).unwrap();
        let second = store.create_account(&form("second")).unwrap();
        assert!(second.id > first.id);
    }

    #[test]
    fn invalid_form_creates_nothing() {
        let store = MemoryStore::new();
        let mut bad = form("eve");
        bad.password_confirmation = "other".into();
        assert!(store.create_account(&bad).is_err());
        assert!(store.accounts().unwrap().is_empty());
    }

    #[test]
    fn snapshot_with_duplicate_rows_is_rejected() {
        let store = MemoryStore::new();
        let alice = store.create_account(&form("alice")).unwrap();
        store.create_referral_code(alice.id).unwrap();
        let clean = store.snapshot().unwrap();

        // Re-sealed, so the state root matches and only the key check can fail.
        let mut twin = clean.accounts[0].clone();
        twin.row.balance = 1_000;
        let mut accounts = clean.accounts.clone();
        accounts.push(twin);
        let doubled = LedgerSnapshot::new(
            clean.meta.clone(),
            accounts,
            clean.referral_codes.clone(),
            clean.events.clone(),
        );
        doubled.verify().unwrap();
        let err = MemoryStore::from_snapshot(doubled).unwrap_err();
        assert!(matches!(err, ReferralError::Integrity(_)));

        let mut codes = clean.referral_codes.clone();
        codes.push(clean.referral_codes[0].clone());
        let doubled = LedgerSnapshot::new(clean.meta.clone(), clean.accounts.clone(), codes, clean.events);
        let err = MemoryStore::from_snapshot(doubled).unwrap_err();
        assert!(matches!(err, ReferralError::Integrity(_)));
    }
}
