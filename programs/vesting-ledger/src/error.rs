use anchor_lang::prelude::*;

/// Error codes surfaced by the vesting ledger.
#[error_code]
pub enum LedgerError {
    #[msg("Storage rejected the write")]
    StorageWriteFailure,

    #[msg("Storage could not be read")]
    StorageReadFailure,

    #[msg("Invalid import data format")]
    InvalidFormat,

    #[msg("Vesting schedule not found")]
    NotFound,

    #[msg("Token transfer failed")]
    TransferError,

    #[msg("No tokens available to claim yet")]
    NothingToClaim,

    #[msg("Invalid schedule: end date must be after start date")]
    InvalidSchedule,

    #[msg("Invalid public key")]
    InvalidPubkey,

    #[msg("Store is closed")]
    StoreClosed,

    #[msg("Invalid timestamp")]
    InvalidTimestamp,

    #[msg("Math overflow")]
    MathOverflow,

    #[msg("Schedule changed while the claim was in flight")]
    StaleClaim,
}
