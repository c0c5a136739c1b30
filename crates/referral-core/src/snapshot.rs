use rs_merkle::{algorithms::Sha256 as MerkleSha256, MerkleTree};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::{
    error::ReferralError,
    event::{EventRecord, LedgerEvent},
    model::{Account, ReferralCode, Versioned},
};

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotMetadata {
    pub height: u64,
    pub next_account_id: u64,
}

/// Serialisable image of a whole ledger. `state_root` commits to every
/// row (versions included), the metadata and the event journal.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct LedgerSnapshot {
    pub meta: SnapshotMetadata,
    pub accounts: Vec<Versioned<Account>>,
    pub referral_codes: Vec<Versioned<ReferralCode>>,
    pub events: Vec<EventRecord>,
    pub state_root: String,
}

impl LedgerSnapshot {
    pub fn new(
        meta: SnapshotMetadata,
        accounts: Vec<Versioned<Account>>,
        referral_codes: Vec<Versioned<ReferralCode>>,
        events: Vec<EventRecord>,
    ) -> Self {
        let state_root = hex::encode(compute_state_root(&meta, &accounts, &referral_codes, &events));
        Self {
            meta,
            accounts,
            referral_codes,
            events,
            state_root,
        }
    }

    pub fn verify(&self) -> Result<(), ReferralError> {
        let computed = hex::encode(compute_state_root(
            &self.meta,
            &self.accounts,
            &self.referral_codes,
            &self.events,
        ));
        if computed != self.state_root {
            return Err(ReferralError::Integrity(format!(
                "state root mismatch: recorded {}, computed {computed}",
                self.state_root
            )));
        }
        Ok(())
    }
}

/// Merkle root over one leaf per account, one per referral code, the
/// metadata and a running hash of the event journal.
pub fn compute_state_root(
    meta: &SnapshotMetadata,
    accounts: &[Versioned<Account>],
    referral_codes: &[Versioned<ReferralCode>],
    events: &[EventRecord],
) -> [u8; 32] {
    let mut leaves: Vec<[u8; 32]> = Vec::with_capacity(accounts.len() + referral_codes.len() + 2);

    let mut hasher = Sha256::new();
    hasher.update(b"meta");
    hasher.update(meta.height.to_le_bytes());
    hasher.update(meta.next_account_id.to_le_bytes());
    leaves.push(hasher.finalize().into());

    for account in accounts {
        let row = &account.row;
        let mut hasher = Sha256::new();
        hasher.update(b"acct");
        hasher.update(account.version.to_le_bytes());
        hasher.update(row.id.to_le_bytes());
        hasher.update(row.balance.to_le_bytes());
        match row.referred_by_id {
            Some(referrer) => {
                hasher.update([1u8]);
                hasher.update(referrer.to_le_bytes());
            }
            None => hasher.update([0u8]),
        }
        update_str(&mut hasher, &row.name);
        update_str(&mut hasher, &row.email);
        update_str(&mut hasher, row.password_digest.salt());
        update_str(&mut hasher, row.password_digest.hash());
        leaves.push(hasher.finalize().into());
    }
    for code in referral_codes {
        let mut hasher = Sha256::new();
        hasher.update(b"code");
        hasher.update(code.version.to_le_bytes());
        update_str(&mut hasher, &code.row.code);
        hasher.update(code.row.owner_id.to_le_bytes());
        hasher.update(code.row.signup_count.to_le_bytes());
        leaves.push(hasher.finalize().into());
    }

    let mut hasher = Sha256::new();
    hasher.update(b"jrnl");
    hasher.update((events.len() as u64).to_le_bytes());
    for record in events {
        hash_event(&mut hasher, record);
    }
    leaves.push(hasher.finalize().into());

    MerkleTree::<MerkleSha256>::from_leaves(&leaves)
        .root()
        .unwrap_or_else(|| Sha256::digest(b"referral-ledger-empty").into())
}

fn hash_event(hasher: &mut Sha256, record: &EventRecord) {
    hasher.update(record.height.to_le_bytes());
    hasher.update(record.timestamp.to_le_bytes());
    match &record.event {
        LedgerEvent::SignupReward {
            account,
            code,
            amount,
        } => {
            hasher.update([0u8]);
            hasher.update(account.to_le_bytes());
            update_str(hasher, code);
            hasher.update(amount.to_le_bytes());
        }
        LedgerEvent::ReferralLinked {
            account,
            referrer,
            code,
        } => {
            hasher.update([1u8]);
            hasher.update(account.to_le_bytes());
            hasher.update(referrer.to_le_bytes());
            update_str(hasher, code);
        }
        LedgerEvent::MilestoneBonus {
            owner,
            code,
            signups,
            amount,
        } => {
            hasher.update([2u8]);
            hasher.update(owner.to_le_bytes());
            update_str(hasher, code);
            hasher.update(signups.to_le_bytes());
            hasher.update(amount.to_le_bytes());
        }
    }
}

fn update_str(hasher: &mut Sha256, value: &str) {
    hasher.update((value.len() as u64).to_le_bytes());
    hasher.update(value.as_bytes());
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        memory::MemoryStore,
        model::{AccountForm, PasswordDigest},
        trigger::ReferralLedger,
    };

    fn populated() -> MemoryStore {
        let store = MemoryStore::new();
        let owner = store
            .create_account(&AccountForm {
                name: "owner".into(),
                email: "owner@example.com".into(),
                password: "pw".into(),
                password_confirmation: "pw".into(),
                balance: Some(5),
            })
            .unwrap();
        let friend = store
            .create_account(&AccountForm {
                name: "friend".into(),
                email: "friend@example.com".into(),
                password: "pw".into(),
                password_confirmation: "pw".into(),
                balance: None,
            })
            .unwrap();
        let code = store.create_referral_code(owner.id).unwrap();
        ReferralLedger::new(&store).trigger(&code.code, friend.id).unwrap();
        store
    }

    #[test]
    fn snapshot_survives_json_and_restores_store() {
        let store = populated();
        let snapshot = store.snapshot().unwrap();
        let json = serde_json::to_vec(&snapshot).unwrap();
        let decoded: LedgerSnapshot = serde_json::from_slice(&json).unwrap();
        assert_eq!(decoded, snapshot);

        let restored = MemoryStore::from_snapshot(decoded).unwrap();
        assert_eq!(restored.snapshot().unwrap(), snapshot);
        assert_eq!(restored.events().unwrap().len(), 2);
    }

    #[test]
    fn tampered_balance_is_detected() {
        let mut snapshot = populated().snapshot().unwrap();
        snapshot.accounts[0].row.balance += 1_000;
        let err = MemoryStore::from_snapshot(snapshot).unwrap_err();
        assert!(matches!(err, ReferralError::Integrity(_)));
    }

    #[test]
    fn edited_journal_is_detected() {
        let mut snapshot = populated().snapshot().unwrap();
        match &mut snapshot.events[0].event {
            LedgerEvent::SignupReward { amount, .. } => *amount = 1_000,
            other => panic!("unexpected first event {other:?}"),
        }
        let err = MemoryStore::from_snapshot(snapshot.clone()).unwrap_err();
        assert!(matches!(err, ReferralError::Integrity(_)));

        snapshot = populated().snapshot().unwrap();
        snapshot.events.pop();
        assert!(snapshot.verify().is_err());
    }

    #[test]
    fn lowered_next_account_id_is_detected() {
        let store = populated();
        let extra = store
            .create_account(&AccountForm {
                name: "extra".into(),
                email: "extra@example.com".into(),
                password: "pw".into(),
                password_confirmation: "pw".into(),
                balance: None,
            })
            .unwrap();
        store.delete_account(extra.id).unwrap();

        let mut snapshot = store.snapshot().unwrap();
        assert_eq!(snapshot.meta.next_account_id, extra.id + 1);
        snapshot.meta.next_account_id = extra.id;
        let err = MemoryStore::from_snapshot(snapshot).unwrap_err();
        assert!(matches!(err, ReferralError::Integrity(_)));
    }

    #[test]
    fn renamed_account_and_swapped_digest_are_detected() {
        let original = populated().snapshot().unwrap();

        let mut renamed = original.clone();
        renamed.accounts[0].row.name = "mallory".into();
        assert!(renamed.verify().is_err());

        let mut swapped = original.clone();
        swapped.accounts[0].row.password_digest = PasswordDigest::new("other");
        assert!(swapped.verify().is_err());
    }

    #[test]
    fn empty_ledger_has_stable_root() {
        let a = MemoryStore::new().snapshot().unwrap();
        let b = MemoryStore::new().snapshot().unwrap();
        assert_eq!(a.state_root, b.state_root);
        a.verify().unwrap();
    }
}
