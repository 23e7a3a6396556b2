//! Ledger-wide constants: storage key layout, snapshot format, time units.

/// Key of the primary schedule collection.
pub const SCHEDULES_KEY: &str = "vesting_schedules";

/// Prefix of the per-schedule backup copies (`vesting_backup_<id>`).
pub const BACKUP_KEY_PREFIX: &str = "vesting_backup_";

/// Prefix of the per-schedule claim history logs (`claim_history_<id>`).
pub const HISTORY_KEY_PREFIX: &str = "claim_history_";

/// Version tag written into exported snapshots.
pub const SNAPSHOT_VERSION: &str = "1.0";

/// Prefix of claim event ids.
pub const CLAIM_ID_PREFIX: &str = "claim_";

/// Prefix of signatures produced by the simulated transfer submitter.
pub const SIMULATED_SIGNATURE_PREFIX: &str = "simulated_";

/// Hex characters kept from a BLAKE3 digest when rendering an id.
pub const ID_HEX_LEN: usize = 32;

/// Milliseconds per second.
pub const MILLIS_PER_SECOND: i64 = 1_000;

/// Seconds per day (UTC).
pub const SECONDS_PER_DAY: i64 = 86_400;

/// Milliseconds per day (UTC).
pub const MILLIS_PER_DAY: i64 = SECONDS_PER_DAY * MILLIS_PER_SECOND;
