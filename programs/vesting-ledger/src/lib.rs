#![allow(unexpected_cfgs)]

//! # Vesting Ledger
//!
//! Off-chain record keeping for SPL token vesting schedules:
//!  - durable schedule store with per-record backups and claim history logs
//!  - pure linear-vesting calculator (claimable amount, lifecycle status)
//!  - claim flow that commits only after the token transfer is confirmed,
//!    serialized per schedule
//!  - JSON snapshot export / import

pub mod calculator;
pub mod constants;
pub mod error;
pub mod ledger;
pub mod operations;
pub mod state;
pub mod store;
pub mod transfer;
pub mod utils;

pub use error::LedgerError;
pub use ledger::{LedgerConfig, StorageConfig, VestingLedger};
pub use state::*;
pub use store::{FileStore, KeyValueStore, MemoryStore, ScheduleStore};
pub use transfer::{SimulatedTransferSubmitter, TransferRequest, TransferSubmitter};
pub use utils::clock::{ManualTimeSource, SystemTimeSource, TimeSource};
