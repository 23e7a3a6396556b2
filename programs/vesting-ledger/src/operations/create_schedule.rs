use anchor_lang::prelude::*;

use crate::calculator;
use crate::error::LedgerError;
use crate::state::{ScheduleInput, ScheduleStatus, VestingSchedule};
use crate::store::ScheduleStore;
use crate::utils::ids;

pub fn create_schedule(
    store: &ScheduleStore,
    input: ScheduleInput,
    now: i64,
    nonce: u64,
) -> Result<VestingSchedule> {
    require!(
        input.start_date < input.end_date,
        LedgerError::InvalidSchedule
    );
    require!(
        input.beneficiary != Pubkey::default(),
        LedgerError::InvalidPubkey
    );
    require!(
        input.token_mint != Pubkey::default(),
        LedgerError::InvalidPubkey
    );

    let mut schedule = VestingSchedule {
        id: ids::schedule_id(
            &input.authority,
            &input.beneficiary,
            &input.token_mint,
            now,
            nonce,
        ),
        authority: input.authority,
        beneficiary: input.beneficiary,
        token_mint: input.token_mint,
        start_date: input.start_date,
        end_date: input.end_date,
        total_amount: input.total_amount,
        claimed_amount: 0,
        release_frequency: input.release_frequency,
        transaction_signature: input.transaction_signature,
        created_at: now,
        status: ScheduleStatus::Pending,
        last_claimed_at: None,
        claim_history: Vec::new(),
    };
    schedule.status = calculator::schedule_status(&schedule, now);

    store.save(&schedule)?;

    emit!(ScheduleCreated {
        id: schedule.id.clone(),
        authority: schedule.authority,
        beneficiary: schedule.beneficiary,
        token_mint: schedule.token_mint,
        start_date: schedule.start_date,
        end_date: schedule.end_date,
        total_amount: schedule.total_amount,
    });

    Ok(schedule)
}

#[event]
pub struct ScheduleCreated {
    pub id: String,
    pub authority: Pubkey,
    pub beneficiary: Pubkey,
    pub token_mint: Pubkey,
    pub start_date: i64,
    pub end_date: i64,
    pub total_amount: u64,
}
