use std::sync::{Arc, Mutex};

use super::*;
use crate::state::{ClaimStatus, ReleaseFrequency, ScheduleStatus};

fn schedule(id: &str, created_at: i64, authority: Pubkey, beneficiary: Pubkey) -> VestingSchedule {
    VestingSchedule {
        id: id.to_string(),
        authority,
        beneficiary,
        token_mint: Pubkey::new_unique(),
        start_date: time::parse_timestamp("2024-01-01").unwrap(),
        end_date: time::parse_timestamp("2024-01-11").unwrap(),
        total_amount: 1000,
        claimed_amount: 0,
        release_frequency: ReleaseFrequency::Monthly,
        transaction_signature: Some(format!("sig-{id}")),
        created_at,
        status: ScheduleStatus::Pending,
        last_claimed_at: None,
        claim_history: Vec::new(),
    }
}

fn claim(id: &str, amount: u64, timestamp: i64) -> ClaimHistory {
    ClaimHistory {
        id: id.to_string(),
        amount,
        timestamp,
        transaction_signature: None,
        status: ClaimStatus::Completed,
    }
}

fn shared_store() -> (Arc<MemoryStore>, ScheduleStore) {
    let kv = Arc::new(MemoryStore::new());
    let store = ScheduleStore::open_shared(kv.clone());
    (kv, store)
}

/// Memory store that rejects writes and removals of one chosen key.
#[derive(Default)]
struct FlakyStore {
    inner: MemoryStore,
    fail_on: Mutex<Option<String>>,
}

impl FlakyStore {
    fn fail_on(&self, key: &str) {
        *self.fail_on.lock().unwrap() = Some(key.to_string());
    }

    fn check(&self, key: &str) -> Result<()> {
        if self.fail_on.lock().unwrap().as_deref() == Some(key) {
            return err!(LedgerError::StorageWriteFailure);
        }
        Ok(())
    }
}

impl KeyValueStore for FlakyStore {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        self.inner.get(key)
    }

    fn set(&self, key: &str, value: &[u8]) -> Result<()> {
        self.check(key)?;
        self.inner.set(key, value)
    }

    fn remove(&self, key: &str) -> Result<()> {
        self.check(key)?;
        self.inner.remove(key)
    }

    fn keys(&self) -> Result<Vec<String>> {
        self.inner.keys()
    }
}

fn flaky_store() -> (Arc<FlakyStore>, ScheduleStore) {
    let kv = Arc::new(FlakyStore::default());
    let store = ScheduleStore::open_shared(kv.clone());
    (kv, store)
}

fn stored_backup(kv: &dyn KeyValueStore, id: &str) -> Option<VestingSchedule> {
    kv.get(&backup_key(id)).unwrap().map(|b| decode(&b).unwrap())
}

fn encoded_len<T: AnchorSerialize>(value: &T) -> usize {
    let mut buf = Vec::new();
    AnchorSerialize::serialize(value, &mut buf).unwrap();
    buf.len()
}

fn ids(schedules: &[VestingSchedule]) -> Vec<&str> {
    schedules.iter().map(|s| s.id.as_str()).collect()
}

#[test]
fn save_keeps_insertion_order_and_backups() {
    let (kv, store) = shared_store();
    let a = Pubkey::new_unique();
    let b = Pubkey::new_unique();

    store.save(&schedule("s2", 20, a, b)).unwrap();
    store.save(&schedule("s1", 10, a, b)).unwrap();

    assert_eq!(ids(&store.get_all().unwrap()), vec!["s2", "s1"]);
    assert!(kv.get(&backup_key("s1")).unwrap().is_some());
    assert!(kv.get(&backup_key("s2")).unwrap().is_some());
    assert_eq!(store.get("s1").unwrap().created_at, 10);
    assert_eq!(store.get("nope").unwrap_err(), LedgerError::NotFound.into());
}

#[test]
fn participant_filters() {
    let (_, store) = shared_store();
    let alice = Pubkey::new_unique();
    let bob = Pubkey::new_unique();
    let carol = Pubkey::new_unique();

    store.save(&schedule("ab", 1, alice, bob)).unwrap();
    store.save(&schedule("ba", 2, bob, alice)).unwrap();
    store.save(&schedule("cc", 3, carol, carol)).unwrap();

    assert_eq!(ids(&store.get_for_user(&alice).unwrap()), vec!["ab", "ba"]);
    assert_eq!(ids(&store.get_for_beneficiary(&alice).unwrap()), vec!["ba"]);
    // self-grant matches once, not twice
    assert_eq!(ids(&store.get_for_user(&carol).unwrap()), vec!["cc"]);
    assert!(store.get_for_user(&Pubkey::new_unique()).unwrap().is_empty());
}

#[test]
fn update_merges_and_syncs_backup() {
    let (kv, store) = shared_store();
    let original = schedule("s1", 1, Pubkey::new_unique(), Pubkey::new_unique());
    store.save(&original).unwrap();

    let patch = SchedulePatch {
        claimed_amount: Some(300),
        status: Some(ScheduleStatus::Active),
        ..Default::default()
    };
    let updated = store.update("s1", &patch).unwrap().unwrap();
    assert_eq!(updated.claimed_amount, 300);
    assert_eq!(updated.beneficiary, original.beneficiary);
    assert_eq!(updated.transaction_signature, original.transaction_signature);

    let bytes = kv.get(&backup_key("s1")).unwrap().unwrap();
    let backup: VestingSchedule = decode(&bytes).unwrap();
    assert_eq!(backup, updated);
}

#[test]
fn update_and_delete_of_unknown_id_write_nothing() {
    let (kv, store) = shared_store();
    store.save(&schedule("s1", 1, Pubkey::new_unique(), Pubkey::new_unique())).unwrap();
    let before = kv.get(SCHEDULES_KEY).unwrap();

    let patch = SchedulePatch {
        claimed_amount: Some(1),
        ..Default::default()
    };
    assert_eq!(store.update("ghost", &patch).unwrap(), None);
    assert!(!store.delete("ghost").unwrap());
    assert_eq!(kv.get(SCHEDULES_KEY).unwrap(), before);
    assert!(kv.get(&backup_key("ghost")).unwrap().is_none());
}

#[test]
fn delete_purges_backup_and_history() {
    let (kv, store) = shared_store();
    let a = Pubkey::new_unique();
    store.save(&schedule("s1", 1, a, a)).unwrap();
    store.save(&schedule("s2", 2, a, a)).unwrap();
    store.append_claim_history("s1", &claim("c1", 5, 100)).unwrap();

    assert!(store.delete("s1").unwrap());
    assert_eq!(ids(&store.get_all().unwrap()), vec!["s2"]);
    assert!(kv.get(&backup_key("s1")).unwrap().is_none());
    assert!(kv.get(&history_key("s1")).unwrap().is_none());
    assert!(store.get_claim_history("s1").unwrap().is_empty());
}

#[test]
fn delete_of_unknown_id_keeps_orphan_history() {
    let (_, store) = shared_store();
    store.append_claim_history("orphan", &claim("c1", 5, 100)).unwrap();
    assert!(!store.delete("orphan").unwrap());
    assert_eq!(store.get_claim_history("orphan").unwrap().len(), 1);
}

#[test]
fn deleting_everything_does_not_resurrect() {
    let (_, store) = shared_store();
    let a = Pubkey::new_unique();
    store.save(&schedule("s1", 1, a, a)).unwrap();
    assert!(store.delete("s1").unwrap());
    assert!(store.get_all().unwrap().is_empty());
}

#[test]
fn claim_history_appends_in_order() {
    let (_, store) = shared_store();
    let a = Pubkey::new_unique();
    store.save(&schedule("s1", 1, a, a)).unwrap();

    assert!(store.append_claim_history("s1", &claim("c1", 5, 100)).unwrap());
    assert!(store.append_claim_history("s1", &claim("c2", 7, 200)).unwrap());

    let history = store.get_claim_history("s1").unwrap();
    assert_eq!(history.iter().map(|c| c.amount).collect::<Vec<_>>(), vec![5, 7]);

    let s = store.get("s1").unwrap();
    assert_eq!(s.claim_history, history);
    assert_eq!(s.last_claimed_at, Some(200));
}

#[test]
fn claim_history_for_missing_schedule_is_still_logged() {
    let (_, store) = shared_store();
    assert!(!store.append_claim_history("orphan", &claim("c1", 5, 100)).unwrap());
    assert_eq!(store.get_claim_history("orphan").unwrap().len(), 1);
    assert!(store.get_all().unwrap().is_empty());
    assert!(store.get_claim_history("never").unwrap().is_empty());
}

#[test]
fn commit_claim_is_all_or_nothing_on_missing_schedule() {
    let (kv, store) = shared_store();
    let patch = SchedulePatch {
        claimed_amount: Some(10),
        ..Default::default()
    };
    let e = store.commit_claim("ghost", 0, &patch, &claim("c1", 10, 1)).unwrap_err();
    assert_eq!(e, LedgerError::NotFound.into());
    assert!(kv.keys().unwrap().is_empty());
}

#[test]
fn commit_claim_rejects_stale_claimed_amount() {
    let (kv, store) = shared_store();
    let a = Pubkey::new_unique();
    store.save(&schedule("s1", 1, a, a)).unwrap();
    let bumped = SchedulePatch {
        claimed_amount: Some(300),
        ..Default::default()
    };
    store.update("s1", &bumped).unwrap();
    let before = kv.get(SCHEDULES_KEY).unwrap();

    let patch = SchedulePatch {
        claimed_amount: Some(500),
        ..Default::default()
    };
    let e = store.commit_claim("s1", 0, &patch, &claim("c1", 500, 1)).unwrap_err();
    assert_eq!(e, LedgerError::StaleClaim.into());
    assert_eq!(kv.get(SCHEDULES_KEY).unwrap(), before);
    assert!(store.get_claim_history("s1").unwrap().is_empty());

    let done = store.commit_claim("s1", 300, &patch, &claim("c1", 200, 1)).unwrap();
    assert_eq!(done.claimed_amount, 500);
    assert_eq!(store.get_claim_history("s1").unwrap().len(), 1);
}

#[test]
fn failed_save_stores_nothing() {
    let a = Pubkey::new_unique();
    for failing in [backup_key("s2"), SCHEDULES_KEY.to_string()] {
        let (kv, store) = flaky_store();
        store.save(&schedule("s1", 1, a, a)).unwrap();
        let before = kv.get(SCHEDULES_KEY).unwrap();

        kv.fail_on(&failing);
        let e = store.save(&schedule("s2", 2, a, a)).unwrap_err();
        assert_eq!(e, LedgerError::StorageWriteFailure.into(), "failing {failing}");
        assert_eq!(kv.get(SCHEDULES_KEY).unwrap(), before);
        assert!(stored_backup(kv.as_ref(), "s2").is_none());
        assert_eq!(ids(&store.get_all().unwrap()), vec!["s1"]);
    }
}

#[test]
fn quota_hit_on_backup_stores_nothing() {
    let a = Pubkey::new_unique();
    let s1 = schedule("s1", 1, a, a);
    let s2 = schedule("s2", 2, a, a);
    let primary_both = encoded_len(&vec![s1.clone(), s2.clone()]);
    let backup_one = encoded_len(&s1);
    // room for both primaries and one backup, not a second backup
    let quota = SCHEDULES_KEY.len() + primary_both + backup_key("s1").len() + backup_one + 10;
    let store = ScheduleStore::open(MemoryStore::with_quota(quota));

    store.save(&s1).unwrap();
    assert_eq!(
        store.save(&s2).unwrap_err(),
        LedgerError::StorageWriteFailure.into()
    );
    assert_eq!(ids(&store.get_all().unwrap()), vec!["s1"]);
}

#[test]
fn failed_claim_commit_writes_nothing() {
    let a = Pubkey::new_unique();
    let patch = SchedulePatch {
        claimed_amount: Some(500),
        status: Some(ScheduleStatus::Active),
        ..Default::default()
    };
    for failing in [
        history_key("s1"),
        backup_key("s1"),
        SCHEDULES_KEY.to_string(),
    ] {
        let (kv, store) = flaky_store();
        store.save(&schedule("s1", 1, a, a)).unwrap();

        kv.fail_on(&failing);
        assert!(store.commit_claim("s1", 0, &patch, &claim("c1", 500, 1)).is_err());
        assert_eq!(store.get("s1").unwrap().claimed_amount, 0, "failing {failing}");
        assert_eq!(stored_backup(kv.as_ref(), "s1").unwrap().claimed_amount, 0);
        assert!(store.get_claim_history("s1").unwrap().is_empty());
    }
}

#[test]
fn failed_delete_keeps_backup_and_history() {
    let (kv, store) = flaky_store();
    let a = Pubkey::new_unique();
    store.save(&schedule("s1", 1, a, a)).unwrap();
    store.append_claim_history("s1", &claim("c1", 5, 100)).unwrap();

    kv.fail_on(SCHEDULES_KEY);
    assert!(store.delete("s1").is_err());
    assert!(stored_backup(kv.as_ref(), "s1").is_some());
    assert_eq!(store.get_claim_history("s1").unwrap().len(), 1);
    assert_eq!(ids(&store.get_all().unwrap()), vec!["s1"]);
}

#[test]
fn recovers_from_backups_when_primary_is_lost() {
    let (kv, store) = shared_store();
    let a = Pubkey::new_unique();
    store.save(&schedule("late", 30, a, a)).unwrap();
    store.save(&schedule("early", 10, a, a)).unwrap();
    store
        .update(
            "late",
            &SchedulePatch {
                claimed_amount: Some(42),
                ..Default::default()
            },
        )
        .unwrap();

    kv.remove(SCHEDULES_KEY).unwrap();
    let recovered = store.get_all().unwrap();
    assert_eq!(ids(&recovered), vec!["early", "late"]);
    // backups track updates, not just the creation-time copy
    assert_eq!(recovered[1].claimed_amount, 42);
}

#[test]
fn recovers_from_backups_when_primary_is_corrupt() {
    let (kv, store) = shared_store();
    let a = Pubkey::new_unique();
    store.save(&schedule("s1", 1, a, a)).unwrap();
    kv.set(SCHEDULES_KEY, b"\xff\xff not borsh").unwrap();
    kv.set(&backup_key("junk"), b"also not borsh").unwrap();

    assert_eq!(ids(&store.get_all().unwrap()), vec!["s1"]);

    // the next save rebuilds the primary from what was recovered
    store.save(&schedule("s2", 2, a, a)).unwrap();
    let primary: Vec<VestingSchedule> = decode(&kv.get(SCHEDULES_KEY).unwrap().unwrap()).unwrap();
    assert_eq!(ids(&primary), vec!["s1", "s2"]);
}

#[test]
fn failed_write_surfaces_and_keeps_previous_state() {
    let kv = Arc::new(MemoryStore::with_quota(600));
    let store = ScheduleStore::open_shared(kv.clone());
    let a = Pubkey::new_unique();
    store.save(&schedule("s1", 1, a, a)).unwrap();

    let mut big = schedule("s2", 2, a, a);
    big.transaction_signature = Some("x".repeat(1_000));
    let e = store.save(&big).unwrap_err();
    assert_eq!(e, LedgerError::StorageWriteFailure.into());
    assert_eq!(ids(&store.get_all().unwrap()), vec!["s1"]);
}

#[test]
fn snapshot_round_trip() {
    let (_, store) = shared_store();
    let a = Pubkey::new_unique();
    let b = Pubkey::new_unique();
    store.save(&schedule("s1", 1, a, b)).unwrap();
    store.save(&schedule("s2", 2, b, a)).unwrap();
    store.append_claim_history("s1", &claim("c1", 5, 100)).unwrap();

    let now = time::parse_timestamp("2024-05-01T12:00:00Z").unwrap();
    let blob = store.export_snapshot(now).unwrap();
    let json: serde_json::Value = serde_json::from_str(&blob).unwrap();
    assert_eq!(json["version"], SNAPSHOT_VERSION);
    assert_eq!(json["exportDate"], "2024-05-01T12:00:00.000Z");
    assert_eq!(json["schedules"].as_array().unwrap().len(), 2);

    let (_, fresh) = shared_store();
    assert_eq!(fresh.import_snapshot(&blob).unwrap(), 2);
    assert_eq!(fresh.get_all().unwrap(), store.get_all().unwrap());
}

#[test]
fn import_replaces_collection_and_backups() {
    let (kv, store) = shared_store();
    let a = Pubkey::new_unique();
    store.save(&schedule("old", 1, a, a)).unwrap();

    let (_, other) = shared_store();
    other.save(&schedule("new", 2, a, a)).unwrap();
    let blob = other.export_snapshot(0).unwrap();

    store.import_snapshot(&blob).unwrap();
    assert_eq!(ids(&store.get_all().unwrap()), vec!["new"]);
    assert!(kv.get(&backup_key("old")).unwrap().is_none());

    kv.remove(SCHEDULES_KEY).unwrap();
    assert_eq!(ids(&store.get_all().unwrap()), vec!["new"]);
}

#[test]
fn failed_import_keeps_previous_collection_and_backups() {
    let a = Pubkey::new_unique();
    let (_, other) = shared_store();
    other.save(&schedule("new", 2, a, a)).unwrap();
    let blob = other.export_snapshot(0).unwrap();

    // primary write fails, or the stale-backup removal after it does
    for failing in [SCHEDULES_KEY.to_string(), backup_key("old")] {
        let (kv, store) = flaky_store();
        store.save(&schedule("old", 1, a, a)).unwrap();

        kv.fail_on(&failing);
        assert!(store.import_snapshot(&blob).is_err());
        assert_eq!(ids(&store.get_all().unwrap()), vec!["old"], "failing {failing}");
        assert!(stored_backup(kv.as_ref(), "old").is_some());
        assert!(stored_backup(kv.as_ref(), "new").is_none());
    }
}

#[test]
fn import_of_unstorable_id_is_rejected_up_front() {
    let dir = tempfile::tempdir().unwrap();
    let a = Pubkey::new_unique();
    let store = ScheduleStore::open(FileStore::open(dir.path()).unwrap());
    store.save(&schedule("old", 1, a, a)).unwrap();

    let (_, other) = shared_store();
    other.save(&schedule("new.1", 2, a, a)).unwrap();
    let blob = other.export_snapshot(0).unwrap();

    assert_eq!(
        store.import_snapshot(&blob).unwrap_err(),
        LedgerError::InvalidFormat.into()
    );
    assert_eq!(ids(&store.get_all().unwrap()), vec!["old"]);

    // the backup is still there to recover from
    let reopened = FileStore::open(dir.path()).unwrap();
    reopened.remove(SCHEDULES_KEY).unwrap();
    assert_eq!(ids(&store.get_all().unwrap()), vec!["old"]);
}

#[test]
fn import_accepts_other_versions() {
    let (_, store) = shared_store();
    let a = Pubkey::new_unique();
    let (_, other) = shared_store();
    other.save(&schedule("s1", 1, a, a)).unwrap();
    let mut json: serde_json::Value =
        serde_json::from_str(&other.export_snapshot(0).unwrap()).unwrap();
    json["version"] = serde_json::Value::from("2.0");

    assert_eq!(store.import_snapshot(&json.to_string()).unwrap(), 1);
    assert_eq!(ids(&store.get_all().unwrap()), vec!["s1"]);
}

#[test]
fn import_rejects_bad_shapes_without_writing() {
    let (kv, store) = shared_store();
    let a = Pubkey::new_unique();
    store.save(&schedule("keep", 1, a, a)).unwrap();
    let before = kv.get(SCHEDULES_KEY).unwrap();

    for blob in [
        "not json",
        "{}",
        r#"{"schedules": {"id": "x"}}"#,
        r#"{"schedules": "nope", "version": "1.0"}"#,
        r#"{"schedules": [{"id": "half"}], "version": "1.0"}"#,
    ] {
        let e = store.import_snapshot(blob).unwrap_err();
        assert_eq!(e, LedgerError::InvalidFormat.into(), "blob {blob}");
    }
    assert_eq!(kv.get(SCHEDULES_KEY).unwrap(), before);
    assert_eq!(ids(&store.get_all().unwrap()), vec!["keep"]);
}

#[test]
fn empty_import_is_valid() {
    let (_, store) = shared_store();
    let a = Pubkey::new_unique();
    store.save(&schedule("s1", 1, a, a)).unwrap();
    assert_eq!(
        store
            .import_snapshot(r#"{"schedules": [], "exportDate": "", "version": "1.0"}"#)
            .unwrap(),
        0
    );
    assert!(store.get_all().unwrap().is_empty());
}

#[test]
fn closed_store_refuses_work() {
    let (_, store) = shared_store();
    assert!(store.is_open());
    store.close().unwrap();
    assert!(!store.is_open());
    let a = Pubkey::new_unique();
    assert_eq!(
        store.save(&schedule("s1", 1, a, a)).unwrap_err(),
        LedgerError::StoreClosed.into()
    );
    assert_eq!(store.get_all().unwrap_err(), LedgerError::StoreClosed.into());
}

#[test]
fn file_backed_store_persists_across_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let a = Pubkey::new_unique();
    {
        let store = ScheduleStore::open(FileStore::open(dir.path()).unwrap());
        store.save(&schedule("s1", 1, a, a)).unwrap();
        store.append_claim_history("s1", &claim("c1", 3, 9)).unwrap();
        store.close().unwrap();
    }
    let store = ScheduleStore::open(FileStore::open(dir.path()).unwrap());
    assert_eq!(ids(&store.get_all().unwrap()), vec!["s1"]);
    assert_eq!(store.get_claim_history("s1").unwrap().len(), 1);
}
