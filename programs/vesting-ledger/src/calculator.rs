//! Pure vesting math over one schedule snapshot and an explicit `now` (Unix ms).
//! - before start: nothing vested
//! - inside the window: `floor(total * elapsed / duration)`, linear and continuous
//! - at or after end: everything vested
//! `release_frequency` never enters the formula.

use crate::state::{ReleaseFrequency, ScheduleStatus, VestingSchedule};
use crate::utils::time;

/// Total accrued by `now`, ignoring what has already been claimed.
pub fn vested_amount(schedule: &VestingSchedule, now: i64) -> u64 {
    if now < schedule.start_date {
        return 0;
    }
    if now >= schedule.end_date {
        return schedule.total_amount;
    }
    // start <= now < end, so both spans are positive and elapsed < duration.
    let elapsed = (now as i128 - schedule.start_date as i128) as u128;
    let duration = (schedule.end_date as i128 - schedule.start_date as i128) as u128;
    let vested = (schedule.total_amount as u128) * elapsed / duration;
    u64::try_from(vested).unwrap_or(schedule.total_amount)
}

/// Amount accrued but not yet claimed. Never negative.
pub fn claimable_amount(schedule: &VestingSchedule, now: i64) -> u64 {
    vested_amount(schedule, now).saturating_sub(schedule.claimed_amount)
}

/// Completion needs both the end date and a full claim.
pub fn schedule_status(schedule: &VestingSchedule, now: i64) -> ScheduleStatus {
    if now < schedule.start_date {
        ScheduleStatus::Pending
    } else if now >= schedule.end_date && schedule.claimed_amount >= schedule.total_amount {
        ScheduleStatus::Completed
    } else {
        ScheduleStatus::Active
    }
}

/// Release breakdown shown before a schedule is created.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ReleasePreview {
    pub days: u64,
    pub number_of_releases: u64,
    pub amount_per_release: u64,
    /// Last release also carries the division remainder.
    pub final_release_amount: u64,
}

pub fn release_preview(
    start_date: i64,
    end_date: i64,
    total_amount: u64,
    frequency: ReleaseFrequency,
) -> ReleasePreview {
    let days = time::day_span_ceil(start_date, end_date);
    let number_of_releases = days.div_ceil(frequency.period_days());
    if number_of_releases == 0 {
        return ReleasePreview {
            days,
            number_of_releases,
            amount_per_release: 0,
            final_release_amount: total_amount,
        };
    }
    let amount_per_release = total_amount / number_of_releases;
    let remainder = total_amount % number_of_releases;
    ReleasePreview {
        days,
        number_of_releases,
        amount_per_release,
        final_release_amount: amount_per_release + remainder,
    }
}
