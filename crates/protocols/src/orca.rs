//! Orca Whirlpool accounts, adaptive-fee oracle and fee normalization.

use borsh::{BorshDeserialize, BorshSerialize};
use solana_sdk::pubkey::Pubkey;

use crate::anchor;
use crate::error::ProtocolError;
use crate::fees::{DEFAULT_MAX_FEE, FeeBreakdown};

pub const WHIRLPOOL_PROGRAM_ID: Pubkey =
    Pubkey::from_str_const("whirLbMiicVdio4qvUfM5KAg6Ct8VwpYzGff3uctyCc");

#[derive(BorshSerialize, BorshDeserialize, Debug, Clone)]
pub struct WhirlpoolRewardInfo {
    pub mint: Pubkey,
    pub vault: Pubkey,
    pub authority: Pubkey,
    pub emissions_per_second_x64: u128,
    pub growth_global_x64: u128,
}

/// `Whirlpool` account, modeled up to the reward slots.
#[derive(BorshSerialize, BorshDeserialize, Debug, Clone)]
pub struct Whirlpool {
    pub whirlpools_config: Pubkey,
    pub whirlpool_bump: [u8; 1],
    pub tick_spacing: u16,
    pub fee_tier_index_seed: [u8; 2],
    pub fee_rate: u16,
    pub protocol_fee_rate: u16,
    pub liquidity: u128,
    pub sqrt_price: u128,
    pub tick_current_index: i32,
    pub protocol_fee_owed_a: u64,
    pub protocol_fee_owed_b: u64,
    pub token_mint_a: Pubkey,
    pub token_vault_a: Pubkey,
    pub fee_growth_global_a: u128,
    pub token_mint_b: Pubkey,
    pub token_vault_b: Pubkey,
    pub fee_growth_global_b: u128,
    pub reward_last_updated_timestamp: u64,
    pub reward_infos: [WhirlpoolRewardInfo; 3],
}

#[derive(BorshSerialize, BorshDeserialize, Debug, Clone)]
pub struct AdaptiveFeeConstants {
    pub filter_period: u16,
    pub decay_period: u16,
    pub reduction_factor: u16,
    pub adaptive_fee_control_factor: u32,
    pub max_volatility_accumulator: u32,
    pub tick_group_size: u16,
    pub major_swap_threshold_ticks: u16,
    pub reserved: [u8; 16],
}

#[derive(BorshSerialize, BorshDeserialize, Debug, Clone)]
pub struct AdaptiveFeeVariables {
    pub last_reference_update_timestamp: u64,
    pub last_major_swap_timestamp: u64,
    pub volatility_reference: u32,
    pub tick_group_index_reference: i32,
    pub volatility_accumulator: u32,
    pub reserved: [u8; 16],
}

/// Adaptive-fee `Oracle` account; exists only for whirlpools whose fee tier
/// enables adaptive fees.
#[derive(BorshSerialize, BorshDeserialize, Debug, Clone)]
pub struct Oracle {
    pub whirlpool: Pubkey,
    pub trade_enable_timestamp: u64,
    pub adaptive_fee_constants: AdaptiveFeeConstants,
    pub adaptive_fee_variables: AdaptiveFeeVariables,
}

impl Whirlpool {
    pub const ACCOUNT_NAME: &'static str = "Whirlpool";

    pub fn decode(address: &Pubkey, data: &[u8]) -> Result<Self, ProtocolError> {
        anchor::deserialize_account(Self::ACCOUNT_NAME, address, data)
    }

    pub fn fee_tier_index(&self) -> u16 {
        self.fee_tier_index_seed[0] as u16 + self.fee_tier_index_seed[1] as u16 * 256
    }

    /// Whirlpools whose fee tier index diverges from the tick spacing carry
    /// an adaptive-fee oracle account.
    pub fn has_adaptive_fee(&self) -> bool {
        self.tick_spacing != self.fee_tier_index()
    }

    /// Oracle PDA for this whirlpool.
    pub fn oracle_address(whirlpool: &Pubkey) -> Pubkey {
        Pubkey::find_program_address(
            &[b"oracle", whirlpool.as_ref()],
            &WHIRLPOOL_PROGRAM_ID,
        )
        .0
    }

    /// Fee normalization. The dynamic fee only exists when an oracle account
    /// is present; the protocol fee is taken from the base fee, not the
    /// dynamic fee; observed program behavior, kept as is.
    pub fn fees(&self, oracle: Option<&Oracle>) -> FeeBreakdown {
        let base_fee = self.fee_rate as f64 / 1e6;
        let protocol_fee = base_fee * (self.protocol_fee_rate as f64 / 1e4);

        let dynamic_fee = match oracle {
            Some(oracle) => {
                let variable_fee =
                    if oracle.adaptive_fee_constants.adaptive_fee_control_factor > 0 {
                        (oracle.adaptive_fee_variables.volatility_accumulator as f64
                            * self.tick_spacing as f64)
                            .powi(2)
                            * oracle.adaptive_fee_constants.adaptive_fee_control_factor as f64
                            / 1e6
                    } else {
                        0.0
                    };
                base_fee.max(variable_fee)
            }
            None => 0.0,
        };

        FeeBreakdown {
            bin_step: self.tick_spacing as i32,
            base_fee,
            max_fee: DEFAULT_MAX_FEE,
            dynamic_fee,
            protocol_fee,
        }
    }

    pub fn reward_mints(&self) -> Vec<Pubkey> {
        self.reward_infos
            .iter()
            .filter(|info| info.mint != crate::token::SYSTEM_PROGRAM_ID)
            .map(|info| info.mint)
            .collect()
    }
}

impl Oracle {
    pub const ACCOUNT_NAME: &'static str = "Oracle";

    pub fn decode(address: &Pubkey, data: &[u8]) -> Result<Self, ProtocolError> {
        anchor::deserialize_account(Self::ACCOUNT_NAME, address, data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn whirlpool(tick_spacing: u16, fee_rate: u16, protocol_fee_rate: u16) -> Whirlpool {
        Whirlpool {
            whirlpools_config: Pubkey::new_unique(),
            whirlpool_bump: [255],
            tick_spacing,
            fee_tier_index_seed: tick_spacing.to_le_bytes(),
            fee_rate,
            protocol_fee_rate,
            liquidity: 0,
            sqrt_price: 0,
            tick_current_index: 0,
            protocol_fee_owed_a: 0,
            protocol_fee_owed_b: 0,
            token_mint_a: Pubkey::new_unique(),
            token_vault_a: Pubkey::new_unique(),
            fee_growth_global_a: 0,
            token_mint_b: Pubkey::new_unique(),
            token_vault_b: Pubkey::new_unique(),
            fee_growth_global_b: 0,
            reward_last_updated_timestamp: 0,
            reward_infos: std::array::from_fn(|_| WhirlpoolRewardInfo {
                mint: crate::token::SYSTEM_PROGRAM_ID,
                vault: Pubkey::default(),
                authority: Pubkey::default(),
                emissions_per_second_x64: 0,
                growth_global_x64: 0,
            }),
        }
    }

    fn oracle(control_factor: u32, volatility_accumulator: u32) -> Oracle {
        Oracle {
            whirlpool: Pubkey::new_unique(),
            trade_enable_timestamp: 0,
            adaptive_fee_constants: AdaptiveFeeConstants {
                filter_period: 30,
                decay_period: 600,
                reduction_factor: 500,
                adaptive_fee_control_factor: control_factor,
                max_volatility_accumulator: 350_000,
                tick_group_size: 64,
                major_swap_threshold_ticks: 32,
                reserved: [0; 16],
            },
            adaptive_fee_variables: AdaptiveFeeVariables {
                last_reference_update_timestamp: 0,
                last_major_swap_timestamp: 0,
                volatility_reference: 0,
                tick_group_index_reference: 0,
                volatility_accumulator,
                reserved: [0; 16],
            },
        }
    }

    #[test]
    fn test_protocol_fee_derives_from_base_fee() {
        let fees = whirlpool(64, 3_000, 1_300).fees(None);
        assert_eq!(fees.base_fee, 0.003);
        assert_eq!(fees.protocol_fee, 0.003 * 0.13);
        // Without an oracle there is no dynamic component at all.
        assert_eq!(fees.dynamic_fee, 0.0);
    }

    #[test]
    fn test_dynamic_fee_requires_positive_control_factor() {
        let pool = whirlpool(64, 3_000, 1_300);
        let fees = pool.fees(Some(&oracle(0, 5_000)));
        assert_eq!(fees.dynamic_fee, fees.base_fee);
    }

    #[test]
    fn test_adaptive_fee_formula() {
        let pool = whirlpool(2, 3_000, 1_300);
        let fees = pool.fees(Some(&oracle(1_500, 100)));
        // (100 * 2)^2 * 1500 / 1e6 = 60
        assert_eq!(fees.dynamic_fee, 60.0);
        // Protocol fee stays on the base fee even when a dynamic fee exists.
        assert_eq!(fees.protocol_fee, 0.003 * 0.13);
    }

    #[test]
    fn test_fee_tier_index_flags_adaptive_pools() {
        let mut pool = whirlpool(64, 3_000, 1_300);
        assert!(!pool.has_adaptive_fee());
        // 1024 + tick spacing is the adaptive fee-tier convention.
        pool.fee_tier_index_seed = (1_024u16 + 64).to_le_bytes();
        assert_eq!(pool.fee_tier_index(), 1_088);
        assert!(pool.has_adaptive_fee());
    }
}
