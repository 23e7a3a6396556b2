use std::fmt;

use anchor_lang::prelude::*;
use serde::{Deserialize, Serialize};

use crate::state::ClaimHistory;
use crate::utils::serde_fmt::{iso_millis, pubkey_str};

/// Lifecycle of a schedule. Cached on the record, always re-derivable.
#[derive(
    AnchorSerialize, AnchorDeserialize, Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq,
)]
#[serde(rename_all = "lowercase")]
pub enum ScheduleStatus {
    #[default]
    Pending,
    Active,
    Completed,
}

impl fmt::Display for ScheduleStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Pending => "pending",
            Self::Active => "active",
            Self::Completed => "completed",
        })
    }
}

/// Display label for how often tokens are released. Vesting itself is continuous.
#[derive(
    AnchorSerialize, AnchorDeserialize, Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq,
)]
#[serde(rename_all = "lowercase")]
pub enum ReleaseFrequency {
    Daily,
    Weekly,
    #[default]
    Monthly,
    Quarterly,
}

impl ReleaseFrequency {
    /// Nominal period length used by the release preview.
    pub const fn period_days(self) -> u64 {
        match self {
            Self::Daily => 1,
            Self::Weekly => 7,
            Self::Monthly => 30,
            Self::Quarterly => 90,
        }
    }
}

/// One time-locked token grant.
#[derive(AnchorSerialize, AnchorDeserialize, Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct VestingSchedule {
    pub id: String,
    /// Grantor.
    #[serde(with = "pubkey_str")]
    pub authority: Pubkey,
    /// Recipient entitled to claim.
    #[serde(with = "pubkey_str")]
    pub beneficiary: Pubkey,
    /// Asset being vested.
    #[serde(with = "pubkey_str")]
    pub token_mint: Pubkey,
    /// Vesting window start (Unix ms, inclusive).
    #[serde(with = "iso_millis")]
    pub start_date: i64,
    /// Vesting window end (Unix ms); everything is claimable from here on.
    #[serde(with = "iso_millis")]
    pub end_date: i64,
    pub total_amount: u64,
    /// Cumulative amount already claimed. Never decreases.
    pub claimed_amount: u64,
    pub release_frequency: ReleaseFrequency,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transaction_signature: Option<String>,
    /// Unix ms.
    pub created_at: i64,
    pub status: ScheduleStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_claimed_at: Option<i64>,
    #[serde(default)]
    pub claim_history: Vec<ClaimHistory>,
}

impl VestingSchedule {
    /// True if `address` is the grantor or the recipient.
    pub fn involves(&self, address: &Pubkey) -> bool {
        self.authority == *address || self.beneficiary == *address
    }

    pub fn remaining_amount(&self) -> u64 {
        self.total_amount.saturating_sub(self.claimed_amount)
    }
}

/// Partial update merged into a stored schedule. Immutable fields are not representable.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SchedulePatch {
    pub claimed_amount: Option<u64>,
    pub status: Option<ScheduleStatus>,
    pub release_frequency: Option<ReleaseFrequency>,
    pub transaction_signature: Option<String>,
    pub last_claimed_at: Option<i64>,
}

impl SchedulePatch {
    pub fn apply_to(&self, schedule: &mut VestingSchedule) {
        if let Some(claimed) = self.claimed_amount {
            schedule.claimed_amount = claimed;
        }
        if let Some(status) = self.status {
            schedule.status = status;
        }
        if let Some(frequency) = self.release_frequency {
            schedule.release_frequency = frequency;
        }
        if let Some(signature) = &self.transaction_signature {
            schedule.transaction_signature = Some(signature.clone());
        }
        if let Some(at) = self.last_claimed_at {
            schedule.last_claimed_at = Some(at);
        }
    }
}

/// Creation input (everything the creator chooses).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ScheduleInput {
    pub authority: Pubkey,
    pub beneficiary: Pubkey,
    pub token_mint: Pubkey,
    pub start_date: i64,
    pub end_date: i64,
    pub total_amount: u64,
    pub release_frequency: ReleaseFrequency,
    pub transaction_signature: Option<String>,
}
