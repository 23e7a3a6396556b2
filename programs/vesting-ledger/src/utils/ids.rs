//! Deterministic identifiers: BLAKE3 over fixed-layout seeds.

use anchor_lang::prelude::*;
use bytemuck::{Pod, Zeroable};

use crate::constants::{CLAIM_ID_PREFIX, ID_HEX_LEN, SIMULATED_SIGNATURE_PREFIX};

#[derive(Clone, Copy, Pod, Zeroable)]
#[repr(C)]
struct ScheduleSeed {
    authority: [u8; 32],
    beneficiary: [u8; 32],
    token_mint: [u8; 32],
    created_at: i64,
    nonce: u64,
}

#[derive(Clone, Copy, Pod, Zeroable)]
#[repr(C)]
struct EventSeed {
    digest: [u8; 32],
    timestamp: i64,
    ordinal: u64,
}

/// Id for a new schedule. `nonce` disambiguates grants created in the same millisecond.
pub fn schedule_id(
    authority: &Pubkey,
    beneficiary: &Pubkey,
    token_mint: &Pubkey,
    created_at: i64,
    nonce: u64,
) -> String {
    let seed = ScheduleSeed {
        authority: authority.to_bytes(),
        beneficiary: beneficiary.to_bytes(),
        token_mint: token_mint.to_bytes(),
        created_at,
        nonce,
    };
    short_hex(blake3::hash(bytemuck::bytes_of(&seed)))
}

/// Id for the `ordinal`-th claim against `schedule_id`.
pub fn claim_id(schedule_id: &str, timestamp: i64, ordinal: u64) -> String {
    format!(
        "{CLAIM_ID_PREFIX}{}",
        event_hex(b"claim", schedule_id, timestamp, ordinal)
    )
}

/// Placeholder signature for transfers that never leave the process.
pub fn simulated_signature(schedule_id: &str, timestamp: i64, amount: u64) -> String {
    format!(
        "{SIMULATED_SIGNATURE_PREFIX}{}",
        event_hex(b"transfer", schedule_id, timestamp, amount)
    )
}

fn event_hex(domain: &[u8], schedule_id: &str, timestamp: i64, ordinal: u64) -> String {
    let mut hasher = blake3::Hasher::new();
    hasher.update(domain);
    hasher.update(schedule_id.as_bytes());
    let seed = EventSeed {
        digest: *hasher.finalize().as_bytes(),
        timestamp,
        ordinal,
    };
    short_hex(blake3::hash(bytemuck::bytes_of(&seed)))
}

fn short_hex(hash: blake3::Hash) -> String {
    let mut hex = hash.to_hex().to_string();
    hex.truncate(ID_HEX_LEN);
    hex
}
