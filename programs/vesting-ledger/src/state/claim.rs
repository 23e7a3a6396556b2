use anchor_lang::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(
    AnchorSerialize, AnchorDeserialize, Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq,
)]
#[serde(rename_all = "lowercase")]
pub enum ClaimStatus {
    Pending,
    Completed,
    Failed,
}

/// One claim event in a schedule's audit trail.
#[derive(AnchorSerialize, AnchorDeserialize, Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ClaimHistory {
    pub id: String,
    pub amount: u64,
    /// Unix ms.
    pub timestamp: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transaction_signature: Option<String>,
    pub status: ClaimStatus,
}
