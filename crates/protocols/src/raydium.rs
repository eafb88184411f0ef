//! Raydium CLMM pool accounts and fee normalization.

use borsh::{BorshDeserialize, BorshSerialize};
use solana_sdk::pubkey::Pubkey;

use crate::anchor;
use crate::error::ProtocolError;
use crate::fees::FeeBreakdown;

pub const RAYDIUM_CLMM_PROGRAM_ID: Pubkey =
    Pubkey::from_str_const("CAMMCzo5YL8w4VFF8KVHrK22GGUsp5VTaW7grrKgrWqK");

#[derive(BorshSerialize, BorshDeserialize, Debug, Clone)]
pub struct RewardInfo {
    pub reward_state: u8,
    pub open_time: u64,
    pub end_time: u64,
    pub last_update_time: u64,
    pub emissions_per_second_x64: u128,
    pub reward_total_emissioned: u64,
    pub reward_claimed: u64,
    pub token_mint: Pubkey,
    pub token_vault: Pubkey,
    pub authority: Pubkey,
    pub reward_growth_global_x64: u128,
}

/// `PoolState` account, modeled up to the reward slots.
#[derive(BorshSerialize, BorshDeserialize, Debug, Clone)]
pub struct PoolState {
    pub bump: [u8; 1],
    pub amm_config: Pubkey,
    pub owner: Pubkey,
    pub token_mint_0: Pubkey,
    pub token_mint_1: Pubkey,
    pub token_vault_0: Pubkey,
    pub token_vault_1: Pubkey,
    pub observation_key: Pubkey,
    pub mint_decimals_0: u8,
    pub mint_decimals_1: u8,
    pub tick_spacing: u16,
    pub liquidity: u128,
    pub sqrt_price_x64: u128,
    pub tick_current: i32,
    pub padding_3: u16,
    pub padding_4: u16,
    pub fee_growth_global_0_x64: u128,
    pub fee_growth_global_1_x64: u128,
    pub protocol_fees_token_0: u64,
    pub protocol_fees_token_1: u64,
    pub swap_in_amount_token_0: u128,
    pub swap_out_amount_token_1: u128,
    pub swap_in_amount_token_1: u128,
    pub swap_out_amount_token_0: u128,
    pub status: u8,
    pub padding: [u8; 7],
    pub reward_infos: [RewardInfo; 3],
}

/// Shared fee configuration referenced by pools of the same tier.
#[derive(BorshSerialize, BorshDeserialize, Debug, Clone)]
pub struct AmmConfig {
    pub bump: u8,
    pub index: u16,
    pub owner: Pubkey,
    pub protocol_fee_rate: u32,
    pub trade_fee_rate: u32,
    pub tick_spacing: u16,
    pub fund_fee_rate: u32,
    pub padding_u32: u32,
    pub fund_owner: Pubkey,
    pub padding: [u64; 3],
}

impl PoolState {
    pub const ACCOUNT_NAME: &'static str = "PoolState";

    pub fn decode(address: &Pubkey, data: &[u8]) -> Result<Self, ProtocolError> {
        anchor::deserialize_account(Self::ACCOUNT_NAME, address, data)
    }

    /// No dynamic component; the trade fee rate scales with the config's
    /// tick spacing over 1e4, the protocol share over 1e6.
    pub fn fees(&self, config: &AmmConfig) -> FeeBreakdown {
        let base_fee = config.trade_fee_rate as f64 * config.tick_spacing as f64 / 1e4;
        let protocol_fee = base_fee * (config.protocol_fee_rate as f64 / 1e6);

        FeeBreakdown {
            bin_step: self.tick_spacing as i32,
            base_fee,
            max_fee: base_fee,
            dynamic_fee: 0.0,
            protocol_fee,
        }
    }

    pub fn reward_mints(&self) -> Vec<Pubkey> {
        self.reward_infos
            .iter()
            .filter(|info| info.token_mint != crate::token::SYSTEM_PROGRAM_ID)
            .map(|info| info.token_mint)
            .collect()
    }
}

impl AmmConfig {
    pub const ACCOUNT_NAME: &'static str = "AmmConfig";

    pub fn decode(address: &Pubkey, data: &[u8]) -> Result<Self, ProtocolError> {
        anchor::deserialize_account(Self::ACCOUNT_NAME, address, data)
    }
}
