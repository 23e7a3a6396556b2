use anchor_lang::prelude::*;

use crate::calculator;
use crate::error::LedgerError;
use crate::state::{ScheduleStatus, VestingSchedule};
use crate::store::ScheduleStore;

/// Dashboard totals for one wallet, over schedules it granted or receives.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PortfolioStats {
    pub schedule_count: u64,
    pub active_count: u64,
    /// Sum of `total - claimed`.
    pub total_value_locked: u64,
    pub claimable: u64,
}

/// A stored schedule with its live status and claimable amount.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ScheduleView {
    pub schedule: VestingSchedule,
    pub status: ScheduleStatus,
    pub claimable: u64,
}

pub fn schedule_views(
    store: &ScheduleStore,
    address: &Pubkey,
    now: i64,
) -> Result<Vec<ScheduleView>> {
    Ok(store
        .get_for_user(address)?
        .into_iter()
        .map(|schedule| ScheduleView {
            status: calculator::schedule_status(&schedule, now),
            claimable: calculator::claimable_amount(&schedule, now),
            schedule,
        })
        .collect())
}

pub fn portfolio_stats(store: &ScheduleStore, address: &Pubkey, now: i64) -> Result<PortfolioStats> {
    let mut stats = PortfolioStats::default();
    for view in schedule_views(store, address, now)? {
        stats.schedule_count += 1;
        if view.status == ScheduleStatus::Active {
            stats.active_count += 1;
        }
        stats.total_value_locked = stats
            .total_value_locked
            .checked_add(view.schedule.remaining_amount())
            .ok_or(LedgerError::MathOverflow)?;
        stats.claimable = stats
            .claimable
            .checked_add(view.claimable)
            .ok_or(LedgerError::MathOverflow)?;
    }
    Ok(stats)
}
