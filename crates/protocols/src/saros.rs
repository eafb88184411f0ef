//! Saros DLMM (liquidity book) pair accounts and fee normalization.

use borsh::{BorshDeserialize, BorshSerialize};
use solana_sdk::pubkey::Pubkey;
use spl_associated_token_account::get_associated_token_address_with_program_id;

use crate::anchor;
use crate::error::ProtocolError;
use crate::fees::FeeBreakdown;

pub const SAROS_DLMM_PROGRAM_ID: Pubkey =
    Pubkey::from_str_const("1qbkdrr3z4ryLA7pZykqxvxWPoeifcVKo6ZG9CfkvVE");

#[derive(BorshSerialize, BorshDeserialize, Debug, Clone)]
pub struct StaticFeeParameters {
    pub base_factor: u16,
    pub filter_period: u16,
    pub decay_period: u16,
    pub reduction_factor: u16,
    pub variable_fee_control: u32,
    pub max_volatility_accumulator: u32,
    pub protocol_share: u16,
    pub padding: [u8; 2],
}

#[derive(BorshSerialize, BorshDeserialize, Debug, Clone)]
pub struct DynamicFeeParameters {
    pub time_last_updated: u64,
    pub volatility_accumulator: u32,
    pub volatility_reference: u32,
    pub id_reference: u32,
    pub padding: [u8; 4],
}

/// `Pair` account of the liquidity book program.
#[derive(BorshSerialize, BorshDeserialize, Debug, Clone)]
pub struct Pair {
    pub bump: [u8; 1],
    pub liquidity_book_config: Pubkey,
    pub bin_step: u8,
    pub bin_step_seed: [u8; 1],
    pub token_mint_x: Pubkey,
    pub token_mint_y: Pubkey,
    pub static_fee_parameters: StaticFeeParameters,
    pub active_id: u32,
    pub dynamic_fee_parameters: DynamicFeeParameters,
    pub protocol_fees_x: u64,
    pub protocol_fees_y: u64,
    pub hook: Option<Pubkey>,
}

impl Pair {
    pub const ACCOUNT_NAME: &'static str = "Pair";

    pub fn decode(address: &Pubkey, data: &[u8]) -> Result<Self, ProtocolError> {
        anchor::deserialize_account(Self::ACCOUNT_NAME, address, data)
    }

    /// Same shape as the Meteora formula but with this program's 1e6
    /// variable-fee divisor, and the base fee doubling as the ceiling.
    pub fn fees(&self) -> FeeBreakdown {
        let bin_step = self.bin_step as f64;
        let base_fee = self.static_fee_parameters.base_factor as f64 * bin_step / 1e6;
        let variable_fee = if self.static_fee_parameters.variable_fee_control > 0 {
            (self.dynamic_fee_parameters.volatility_accumulator as f64 * bin_step).powi(2)
                * self.static_fee_parameters.variable_fee_control as f64
                / 1e6
        } else {
            0.0
        };
        let dynamic_fee = base_fee.max(variable_fee);
        let protocol_fee =
            dynamic_fee * (self.static_fee_parameters.protocol_share as f64 / 1e4);

        FeeBreakdown {
            bin_step: self.bin_step as i32,
            base_fee,
            max_fee: base_fee,
            dynamic_fee,
            protocol_fee,
        }
    }

    /// The pair's vaults are associated token accounts owned by the pair
    /// itself; the token program comes from the mint's owner.
    pub fn vault(
        &self,
        pair_address: &Pubkey,
        mint: &Pubkey,
        token_program: &Pubkey,
    ) -> Pubkey {
        get_associated_token_address_with_program_id(pair_address, mint, token_program)
    }
}
