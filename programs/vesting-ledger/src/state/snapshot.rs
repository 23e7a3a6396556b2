use serde::{Deserialize, Serialize};

use crate::state::VestingSchedule;

/// Export/import envelope.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    pub schedules: Vec<VestingSchedule>,
    /// ISO-8601.
    pub export_date: String,
    pub version: String,
}
