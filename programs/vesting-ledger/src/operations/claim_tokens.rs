use anchor_lang::prelude::*;

use crate::calculator;
use crate::error::LedgerError;
use crate::state::{ClaimHistory, ClaimStatus, SchedulePatch, ScheduleStatus, VestingSchedule};
use crate::store::ScheduleStore;
use crate::transfer::{TransferRequest, TransferSubmitter};
use crate::utils::ids;

/// Outcome of a successful claim.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ClaimReceipt {
    pub schedule: VestingSchedule,
    pub claim: ClaimHistory,
}

/// Release everything claimable on `schedule_id` at `now`.
///
/// Callers must hold the schedule's claim lock. The store is only written
/// after the submitter confirms the transfer; any failure before that
/// leaves it untouched.
pub fn claim_tokens(
    store: &ScheduleStore,
    submitter: &dyn TransferSubmitter,
    schedule_id: &str,
    now: i64,
) -> Result<ClaimReceipt> {
    let schedule = store.get(schedule_id)?;

    let claimable = calculator::claimable_amount(&schedule, now);
    require!(claimable > 0, LedgerError::NothingToClaim);

    let claimed_total = schedule
        .claimed_amount
        .checked_add(claimable)
        .ok_or(LedgerError::MathOverflow)?;

    let request = TransferRequest::new(
        schedule_id,
        claimable,
        schedule.token_mint,
        schedule.authority,
        schedule.beneficiary,
        now,
    );
    let signature = submitter.submit_transfer(&request).map_err(|e| {
        msg!("transfer for {} failed: {}", schedule_id, e);
        error!(LedgerError::TransferError)
    })?;

    let mut after = schedule.clone();
    after.claimed_amount = claimed_total;
    let status = calculator::schedule_status(&after, now);

    let claim = ClaimHistory {
        id: ids::claim_id(schedule_id, now, schedule.claim_history.len() as u64),
        amount: claimable,
        timestamp: now,
        transaction_signature: Some(signature),
        status: ClaimStatus::Completed,
    };
    let patch = SchedulePatch {
        claimed_amount: Some(claimed_total),
        status: Some(status),
        ..Default::default()
    };

    // Tokens have moved; a failed commit here must be reconciled by hand.
    let updated = store
        .commit_claim(schedule_id, schedule.claimed_amount, &patch, &claim)
        .map_err(|e| {
            msg!(
                "claim {} transferred but not recorded on {}: {}",
                claim.id,
                schedule_id,
                e
            );
            e
        })?;

    emit!(TokensClaimed {
        schedule_id: schedule_id.to_string(),
        beneficiary: updated.beneficiary,
        amount: claimable,
        claimed_total,
        total_amount: updated.total_amount,
        completed: status == ScheduleStatus::Completed,
    });

    Ok(ClaimReceipt {
        schedule: updated,
        claim,
    })
}

#[event]
pub struct TokensClaimed {
    pub schedule_id: String,
    pub beneficiary: Pubkey,
    pub amount: u64,
    pub claimed_total: u64,
    pub total_amount: u64,
    pub completed: bool,
}
