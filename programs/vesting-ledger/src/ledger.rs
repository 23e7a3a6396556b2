//! Entry points for the presentation layer: a store plus the collaborators
//! the composed operations need (time, transfers) and per-schedule claim locks.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use anchor_lang::prelude::*;

use crate::calculator::{self, ReleasePreview};
use crate::error::LedgerError;
use crate::operations::{self, ClaimReceipt, PortfolioStats, ScheduleView};
use crate::state::{ClaimHistory, ReleaseFrequency, ScheduleInput, ScheduleStatus, VestingSchedule};
use crate::store::{FileStore, MemoryStore, ScheduleStore};
use crate::transfer::{SimulatedTransferSubmitter, TransferSubmitter};
use crate::utils::clock::{SystemTimeSource, TimeSource};

/// Where schedules are persisted.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StorageConfig {
    /// Process-local; gone when the ledger is dropped.
    Memory { quota_bytes: Option<usize> },
    /// One file per key under this directory.
    Directory(PathBuf),
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self::Memory { quota_bytes: None }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LedgerConfig {
    pub storage: StorageConfig,
}

impl LedgerConfig {
    pub fn open_store(&self) -> Result<ScheduleStore> {
        Ok(match &self.storage {
            StorageConfig::Memory {
                quota_bytes: Some(quota),
            } => ScheduleStore::open(MemoryStore::with_quota(*quota)),
            StorageConfig::Memory { quota_bytes: None } => ScheduleStore::open(MemoryStore::new()),
            StorageConfig::Directory(dir) => ScheduleStore::open(FileStore::open(dir)?),
        })
    }
}

pub struct VestingLedger {
    store: ScheduleStore,
    clock: Arc<dyn TimeSource>,
    submitter: Arc<dyn TransferSubmitter>,
    claim_locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
    nonce: AtomicU64,
}

impl VestingLedger {
    pub fn new(
        store: ScheduleStore,
        clock: Arc<dyn TimeSource>,
        submitter: Arc<dyn TransferSubmitter>,
    ) -> Self {
        Self {
            store,
            clock,
            submitter,
            claim_locks: Mutex::new(HashMap::new()),
            nonce: AtomicU64::new(0),
        }
    }

    /// Wall clock and simulated transfers over the configured storage.
    pub fn open(config: &LedgerConfig) -> Result<Self> {
        Ok(Self::new(
            config.open_store()?,
            Arc::new(SystemTimeSource),
            Arc::new(SimulatedTransferSubmitter),
        ))
    }

    pub fn store(&self) -> &ScheduleStore {
        &self.store
    }

    pub fn now(&self) -> i64 {
        self.clock.now_millis()
    }

    pub fn close(&self) -> Result<()> {
        self.store.close()
    }

    pub fn create_schedule(&self, input: ScheduleInput) -> Result<VestingSchedule> {
        let nonce = self.nonce.fetch_add(1, Ordering::Relaxed);
        operations::create_schedule(&self.store, input, self.now(), nonce)
    }

    /// Claim everything currently claimable. Claims on the same schedule run
    /// one at a time; claims on different schedules do not wait on each other.
    pub fn claim_tokens(&self, schedule_id: &str) -> Result<ClaimReceipt> {
        let lock = self.claim_lock(schedule_id)?;
        let result = {
            let _guard = lock.lock().map_err(|_| {
                msg!("claim lock for {} poisoned", schedule_id);
                error!(LedgerError::StorageWriteFailure)
            })?;
            operations::claim_tokens(
                &self.store,
                self.submitter.as_ref(),
                schedule_id,
                self.now(),
            )
        };
        self.release_claim_lock(schedule_id, lock);
        result
    }

    pub fn claimable_amount(&self, schedule_id: &str) -> Result<u64> {
        let schedule = self.store.get(schedule_id)?;
        Ok(calculator::claimable_amount(&schedule, self.now()))
    }

    pub fn schedule_status(&self, schedule_id: &str) -> Result<ScheduleStatus> {
        let schedule = self.store.get(schedule_id)?;
        Ok(calculator::schedule_status(&schedule, self.now()))
    }

    pub fn claim_history(&self, schedule_id: &str) -> Result<Vec<ClaimHistory>> {
        self.store.get_claim_history(schedule_id)
    }

    pub fn schedules_for_user(&self, address: &Pubkey) -> Result<Vec<ScheduleView>> {
        operations::schedule_views(&self.store, address, self.now())
    }

    pub fn portfolio_stats(&self, address: &Pubkey) -> Result<PortfolioStats> {
        operations::portfolio_stats(&self.store, address, self.now())
    }

    pub fn release_preview(
        &self,
        start_date: i64,
        end_date: i64,
        total_amount: u64,
        frequency: ReleaseFrequency,
    ) -> ReleasePreview {
        calculator::release_preview(start_date, end_date, total_amount, frequency)
    }

    pub fn export_snapshot(&self) -> Result<String> {
        self.store.export_snapshot(self.now())
    }

    pub fn import_snapshot(&self, blob: &str) -> Result<usize> {
        self.store.import_snapshot(blob)
    }

    fn claim_lock(&self, schedule_id: &str) -> Result<Arc<Mutex<()>>> {
        let mut locks = self
            .claim_locks
            .lock()
            .map_err(|_| error!(LedgerError::StorageWriteFailure))?;
        Ok(locks.entry(schedule_id.to_string()).or_default().clone())
    }

    // Drop the map entry once no other claim holds or waits on it.
    fn release_claim_lock(&self, schedule_id: &str, lock: Arc<Mutex<()>>) {
        if let Ok(mut locks) = self.claim_locks.lock() {
            drop(lock);
            if locks
                .get(schedule_id)
                .is_some_and(|l| Arc::strong_count(l) == 1)
            {
                locks.remove(schedule_id);
            }
        }
    }
}
