//! Boundary to whatever actually moves tokens (wallet, RPC client, simulator).

use anchor_lang::prelude::*;

use crate::utils::ids;

/// One SPL token movement the ledger wants performed.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TransferRequest {
    pub schedule_id: String,
    pub amount: u64,
    pub mint: Pubkey,
    /// Wallet funding the transfer (schedule authority).
    pub from: Pubkey,
    /// Wallet receiving the tokens (schedule beneficiary).
    pub to: Pubkey,
    pub source_ata: Pubkey,
    pub destination_ata: Pubkey,
    /// Unix ms at which the ledger requested the transfer.
    pub requested_at: i64,
}

impl TransferRequest {
    pub fn new(
        schedule_id: &str,
        amount: u64,
        mint: Pubkey,
        from: Pubkey,
        to: Pubkey,
        requested_at: i64,
    ) -> Self {
        Self {
            schedule_id: schedule_id.to_string(),
            amount,
            mint,
            from,
            to,
            source_ata: associated_token_address(&from, &mint),
            destination_ata: associated_token_address(&to, &mint),
            requested_at,
        }
    }
}

/// Submit a transfer and wait for its outcome. Returns the transaction
/// signature once confirmed. An error (including a timeout) means no
/// tokens moved.
pub trait TransferSubmitter: Send + Sync {
    fn submit_transfer(&self, request: &TransferRequest) -> Result<String>;
}

/// Confirms every transfer immediately with a deterministic fake signature.
#[derive(Clone, Copy, Debug, Default)]
pub struct SimulatedTransferSubmitter;

impl TransferSubmitter for SimulatedTransferSubmitter {
    fn submit_transfer(&self, request: &TransferRequest) -> Result<String> {
        msg!(
            "simulating transfer of {} from {} to {}",
            request.amount,
            request.source_ata,
            request.destination_ata
        );
        Ok(ids::simulated_signature(
            &request.schedule_id,
            request.requested_at,
            request.amount,
        ))
    }
}

/// ATA derivation: PDA(owner, token_program_id, mint) under the associated token program.
pub fn associated_token_address(owner: &Pubkey, mint: &Pubkey) -> Pubkey {
    let seeds: &[&[u8]] = &[
        owner.as_ref(),
        anchor_spl::token::ID.as_ref(),
        mint.as_ref(),
    ];
    let (ata, _) = Pubkey::find_program_address(seeds, &anchor_spl::associated_token::ID);
    ata
}
