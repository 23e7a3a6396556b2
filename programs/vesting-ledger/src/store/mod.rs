//! Durable schedule store over a pluggable key-value medium.
//!
//! Layout:
//! - `vesting_schedules`: every schedule, insertion order
//! - `vesting_backup_<id>`: one copy per schedule, rewritten on every change
//! - `claim_history_<id>`: per-schedule claim log, independent of the record
//!
//! All values are Borsh-encoded. Mutations are serialized by one write lock.
//! Each mutation is staged in a `WriteSet` that writes the primary collection
//! last and restores every touched key if any write fails.

pub mod backend;

use std::sync::{Arc, Mutex, MutexGuard, RwLock};

use anchor_lang::prelude::*;

use crate::constants::{BACKUP_KEY_PREFIX, HISTORY_KEY_PREFIX, SCHEDULES_KEY, SNAPSHOT_VERSION};
use crate::error::LedgerError;
use crate::state::{ClaimHistory, SchedulePatch, Snapshot, VestingSchedule};
use crate::utils::time;

pub use backend::{FileStore, KeyValueStore, MemoryStore};

pub struct ScheduleStore {
    backend: RwLock<Option<Arc<dyn KeyValueStore>>>,
    write_lock: Mutex<()>,
}

impl ScheduleStore {
    pub fn open(backend: impl KeyValueStore + 'static) -> Self {
        Self::open_shared(Arc::new(backend))
    }

    /// Open over a backend the caller keeps a handle to.
    pub fn open_shared(backend: Arc<dyn KeyValueStore>) -> Self {
        Self {
            backend: RwLock::new(Some(backend)),
            write_lock: Mutex::new(()),
        }
    }

    /// Detach from the backend. Later calls fail with `StoreClosed`.
    pub fn close(&self) -> Result<()> {
        let _guard = self.lock_writes()?;
        let mut backend = self
            .backend
            .write()
            .map_err(|_| error!(LedgerError::StoreClosed))?;
        *backend = None;
        msg!("schedule store closed");
        Ok(())
    }

    pub fn is_open(&self) -> bool {
        self.backend.read().map(|b| b.is_some()).unwrap_or(false)
    }

    /// Append a new schedule and write its backup copy.
    pub fn save(&self, schedule: &VestingSchedule) -> Result<()> {
        let _guard = self.lock_writes()?;
        let kv = self.backend()?;

        let mut schedules = load_all(kv.as_ref())?;
        schedules.push(schedule.clone());

        let mut writes = WriteSet::default();
        writes.put(backup_key(&schedule.id), schedule)?;
        writes.put(SCHEDULES_KEY.to_string(), &schedules)?;
        writes.commit(kv.as_ref())?;

        msg!("vesting schedule saved: {}", schedule.id);
        Ok(())
    }

    /// Every schedule in insertion order, rebuilt from backups when the
    /// primary collection is missing, unreadable or empty.
    pub fn get_all(&self) -> Result<Vec<VestingSchedule>> {
        let kv = self.backend()?;
        load_all(kv.as_ref())
    }

    pub fn get(&self, id: &str) -> Result<VestingSchedule> {
        self.get_all()?
            .into_iter()
            .find(|s| s.id == id)
            .ok_or_else(|| error!(LedgerError::NotFound))
    }

    /// Schedules where `address` is the authority or the beneficiary.
    pub fn get_for_user(&self, address: &Pubkey) -> Result<Vec<VestingSchedule>> {
        Ok(self
            .get_all()?
            .into_iter()
            .filter(|s| s.involves(address))
            .collect())
    }

    pub fn get_for_beneficiary(&self, address: &Pubkey) -> Result<Vec<VestingSchedule>> {
        Ok(self
            .get_all()?
            .into_iter()
            .filter(|s| s.beneficiary == *address)
            .collect())
    }

    /// Merge `patch` into schedule `id`. Returns the updated record, or
    /// `None` (nothing written) when no schedule has that id.
    pub fn update(&self, id: &str, patch: &SchedulePatch) -> Result<Option<VestingSchedule>> {
        let _guard = self.lock_writes()?;
        let kv = self.backend()?;

        let mut schedules = load_all(kv.as_ref())?;
        let Some(schedule) = schedules.iter_mut().find(|s| s.id == id) else {
            msg!("update skipped, no schedule {}", id);
            return Ok(None);
        };
        patch.apply_to(schedule);
        let updated = schedule.clone();

        let mut writes = WriteSet::default();
        writes.put(backup_key(id), &updated)?;
        writes.put(SCHEDULES_KEY.to_string(), &schedules)?;
        writes.commit(kv.as_ref())?;

        msg!("vesting schedule updated: {}", id);
        Ok(Some(updated))
    }

    /// Remove schedule `id` with its backup and history. Returns `false`
    /// and leaves every key alone when no schedule has that id, so history
    /// logged against a missing schedule survives.
    pub fn delete(&self, id: &str) -> Result<bool> {
        let _guard = self.lock_writes()?;
        let kv = self.backend()?;

        let mut schedules = load_all(kv.as_ref())?;
        let before = schedules.len();
        schedules.retain(|s| s.id != id);
        if schedules.len() == before {
            msg!("delete skipped, no schedule {}", id);
            return Ok(false);
        }

        let mut writes = WriteSet::default();
        writes.remove(backup_key(id));
        writes.remove(history_key(id));
        writes.put(SCHEDULES_KEY.to_string(), &schedules)?;
        writes.commit(kv.as_ref())?;

        msg!("vesting schedule deleted: {}", id);
        Ok(true)
    }

    /// Record a claim on the schedule (if it exists) and in the per-schedule
    /// history log (always). Returns whether the schedule record was found.
    pub fn append_claim_history(&self, schedule_id: &str, entry: &ClaimHistory) -> Result<bool> {
        let _guard = self.lock_writes()?;
        let kv = self.backend()?;

        let mut schedules = load_all(kv.as_ref())?;
        let updated = schedules
            .iter_mut()
            .find(|s| s.id == schedule_id)
            .map(|s| {
                s.claim_history.push(entry.clone());
                s.last_claimed_at = Some(entry.timestamp);
                s.clone()
            });
        let mut history = read_history(kv.as_ref(), schedule_id)?;
        history.push(entry.clone());

        let mut writes = WriteSet::default();
        writes.put(history_key(schedule_id), &history)?;
        if let Some(schedule) = &updated {
            writes.put(backup_key(schedule_id), schedule)?;
            writes.put(SCHEDULES_KEY.to_string(), &schedules)?;
        }
        writes.commit(kv.as_ref())?;

        msg!("claim history added: {} on {}", entry.id, schedule_id);
        Ok(updated.is_some())
    }

    pub fn get_claim_history(&self, schedule_id: &str) -> Result<Vec<ClaimHistory>> {
        let kv = self.backend()?;
        read_history(kv.as_ref(), schedule_id)
    }

    /// Apply a claim as one unit: patch the record, append its history entry.
    ///
    /// `expected_claimed` is the `claimed_amount` the claim was computed
    /// from. If the stored value differs the commit fails with `StaleClaim`.
    /// Nothing is written on `NotFound` or `StaleClaim`.
    pub fn commit_claim(
        &self,
        schedule_id: &str,
        expected_claimed: u64,
        patch: &SchedulePatch,
        entry: &ClaimHistory,
    ) -> Result<VestingSchedule> {
        let _guard = self.lock_writes()?;
        let kv = self.backend()?;

        let mut schedules = load_all(kv.as_ref())?;
        let schedule = schedules
            .iter_mut()
            .find(|s| s.id == schedule_id)
            .ok_or_else(|| error!(LedgerError::NotFound))?;
        if schedule.claimed_amount != expected_claimed {
            msg!(
                "claim on {} computed from claimed {} but store holds {}",
                schedule_id,
                expected_claimed,
                schedule.claimed_amount
            );
            return err!(LedgerError::StaleClaim);
        }
        patch.apply_to(schedule);
        schedule.claim_history.push(entry.clone());
        schedule.last_claimed_at = Some(entry.timestamp);
        let updated = schedule.clone();

        let mut history = read_history(kv.as_ref(), schedule_id)?;
        history.push(entry.clone());

        let mut writes = WriteSet::default();
        writes.put(history_key(schedule_id), &history)?;
        writes.put(backup_key(schedule_id), &updated)?;
        writes.put(SCHEDULES_KEY.to_string(), &schedules)?;
        writes.commit(kv.as_ref())?;

        msg!("claim {} committed on {}", entry.id, schedule_id);
        Ok(updated)
    }

    /// JSON snapshot `{schedules, exportDate, version}` stamped with `now_ms`.
    pub fn export_snapshot(&self, now_ms: i64) -> Result<String> {
        let snapshot = Snapshot {
            schedules: self.get_all()?,
            export_date: time::format_iso8601(now_ms)?,
            version: SNAPSHOT_VERSION.to_string(),
        };
        serde_json::to_string_pretty(&snapshot).map_err(|e| {
            msg!("export failed: {}", e);
            error!(LedgerError::StorageReadFailure)
        })
    }

    /// Replace the collection with the snapshot's schedules and resync
    /// backups. On any error the previous collection and backups remain.
    pub fn import_snapshot(&self, blob: &str) -> Result<usize> {
        let schedules = parse_snapshot(blob)?;

        let _guard = self.lock_writes()?;
        let kv = self.backend()?;

        if let Some(bad) = schedules.iter().find(|s| !kv.accepts_key(&backup_key(&s.id))) {
            msg!("import rejected, id {:?} cannot be stored", bad.id);
            return err!(LedgerError::InvalidFormat);
        }

        let mut writes = WriteSet::default();
        for schedule in &schedules {
            writes.put(backup_key(&schedule.id), schedule)?;
        }
        writes.put(SCHEDULES_KEY.to_string(), &schedules)?;
        for key in kv.keys()? {
            if let Some(id) = key.strip_prefix(BACKUP_KEY_PREFIX) {
                if !schedules.iter().any(|s| s.id == id) {
                    writes.remove(key.clone());
                }
            }
        }
        writes.commit(kv.as_ref())?;

        msg!("vesting data imported: {} schedules", schedules.len());
        Ok(schedules.len())
    }

    fn backend(&self) -> Result<Arc<dyn KeyValueStore>> {
        self.backend
            .read()
            .map_err(|_| error!(LedgerError::StoreClosed))?
            .clone()
            .ok_or_else(|| error!(LedgerError::StoreClosed))
    }

    fn lock_writes(&self) -> Result<MutexGuard<'_, ()>> {
        self.write_lock.lock().map_err(|_| {
            msg!("schedule store write lock poisoned");
            error!(LedgerError::StorageWriteFailure)
        })
    }
}

pub fn backup_key(id: &str) -> String {
    format!("{BACKUP_KEY_PREFIX}{id}")
}

pub fn history_key(id: &str) -> String {
    format!("{HISTORY_KEY_PREFIX}{id}")
}

fn load_all(kv: &dyn KeyValueStore) -> Result<Vec<VestingSchedule>> {
    let primary = match kv.get(SCHEDULES_KEY) {
        Ok(Some(bytes)) => decode::<Vec<VestingSchedule>>(&bytes).unwrap_or_else(|| {
            msg!("primary schedule collection is corrupt");
            Vec::new()
        }),
        Ok(None) => Vec::new(),
        Err(e) => {
            msg!("primary schedule collection unreadable: {}", e);
            Vec::new()
        }
    };
    if !primary.is_empty() {
        return Ok(primary);
    }

    let recovered = recover_from_backups(kv)?;
    if !recovered.is_empty() {
        msg!("recovered {} schedules from backup", recovered.len());
    }
    Ok(recovered)
}

fn recover_from_backups(kv: &dyn KeyValueStore) -> Result<Vec<VestingSchedule>> {
    let mut schedules = Vec::new();
    for key in kv.keys()? {
        if !key.starts_with(BACKUP_KEY_PREFIX) {
            continue;
        }
        match kv.get(&key)?.as_deref().and_then(decode::<VestingSchedule>) {
            Some(schedule) => schedules.push(schedule),
            None => msg!("skipping unreadable backup {}", key),
        }
    }
    schedules.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
    Ok(schedules)
}

fn read_history(kv: &dyn KeyValueStore, schedule_id: &str) -> Result<Vec<ClaimHistory>> {
    match kv.get(&history_key(schedule_id))? {
        Some(bytes) => decode(&bytes).ok_or_else(|| {
            msg!("claim history for {} is corrupt", schedule_id);
            error!(LedgerError::StorageReadFailure)
        }),
        None => Ok(Vec::new()),
    }
}

/// Encoded writes for one mutation, applied in staging order.
/// Callers stage the primary collection last.
#[derive(Default)]
struct WriteSet {
    ops: Vec<(String, Option<Vec<u8>>)>,
}

impl WriteSet {
    fn put<T: AnchorSerialize + ?Sized>(&mut self, key: String, value: &T) -> Result<()> {
        let mut buf = Vec::new();
        AnchorSerialize::serialize(value, &mut buf).map_err(|e| {
            msg!("encode {} failed: {}", key, e);
            error!(LedgerError::StorageWriteFailure)
        })?;
        self.ops.push((key, Some(buf)));
        Ok(())
    }

    fn remove(&mut self, key: String) {
        self.ops.push((key, None));
    }

    /// Apply every op. On the first failure, restore what was applied
    /// (newest first) and return that failure.
    fn commit(self, kv: &dyn KeyValueStore) -> Result<()> {
        let mut applied: Vec<(String, Option<Vec<u8>>)> = Vec::with_capacity(self.ops.len());
        for (key, value) in self.ops {
            if let Err(e) = apply_op(kv, key, value.as_deref(), &mut applied) {
                rollback(kv, applied);
                return Err(e);
            }
        }
        Ok(())
    }
}

fn apply_op(
    kv: &dyn KeyValueStore,
    key: String,
    value: Option<&[u8]>,
    applied: &mut Vec<(String, Option<Vec<u8>>)>,
) -> Result<()> {
    let previous = kv.get(&key)?;
    match value {
        Some(bytes) => kv.set(&key, bytes)?,
        None => kv.remove(&key)?,
    }
    applied.push((key, previous));
    Ok(())
}

fn rollback(kv: &dyn KeyValueStore, applied: Vec<(String, Option<Vec<u8>>)>) {
    for (key, previous) in applied.into_iter().rev() {
        let restored = match previous {
            Some(bytes) => kv.set(&key, &bytes),
            None => kv.remove(&key),
        };
        if let Err(e) = restored {
            msg!("rollback of {} failed: {}", key, e);
        }
    }
}

fn decode<T: AnchorDeserialize>(bytes: &[u8]) -> Option<T> {
    let mut cursor = bytes;
    let value = <T as AnchorDeserialize>::deserialize(&mut cursor).ok()?;
    cursor.is_empty().then_some(value)
}

fn parse_snapshot(blob: &str) -> Result<Vec<VestingSchedule>> {
    let mut value: serde_json::Value = serde_json::from_str(blob).map_err(|e| {
        msg!("import rejected, not JSON: {}", e);
        error!(LedgerError::InvalidFormat)
    })?;
    if let Some(version) = value.get("version").and_then(|v| v.as_str()) {
        if version != SNAPSHOT_VERSION {
            msg!("importing snapshot version {}", version);
        }
    }
    let raw = match value.get_mut("schedules") {
        Some(schedules) if schedules.is_array() => schedules.take(),
        _ => {
            msg!("import rejected, schedules missing or not a list");
            return err!(LedgerError::InvalidFormat);
        }
    };
    serde_json::from_value(raw).map_err(|e| {
        msg!("import rejected, bad schedule entry: {}", e);
        error!(LedgerError::InvalidFormat)
    })
}

#[cfg(test)]
mod tests;
