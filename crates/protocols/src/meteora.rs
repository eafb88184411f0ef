//! Meteora DLMM (bin liquidity) pool accounts and fee normalization.

use borsh::{BorshDeserialize, BorshSerialize};
use solana_sdk::pubkey::Pubkey;

use crate::anchor;
use crate::error::ProtocolError;
use crate::fees::{DEFAULT_MAX_FEE, FeeBreakdown};

pub const METEORA_DLMM_PROGRAM_ID: Pubkey =
    Pubkey::from_str_const("LBUZKhRxPF3XUpBCjp4YeC6BNhu2nqBDt16ymccEZLo");

/// Static fee configuration of a DLMM pair.
#[derive(BorshSerialize, BorshDeserialize, Debug, Clone)]
pub struct StaticParameters {
    pub base_factor: u16,
    pub filter_period: u16,
    pub decay_period: u16,
    pub reduction_factor: u16,
    pub variable_fee_control: u32,
    pub max_volatility_accumulator: u32,
    pub min_bin_id: i32,
    pub max_bin_id: i32,
    pub protocol_share: u16,
    pub base_fee_power_factor: u8,
    pub padding: [u8; 5],
}

/// Volatility state updated on every swap.
#[derive(BorshSerialize, BorshDeserialize, Debug, Clone)]
pub struct VariableParameters {
    pub volatility_accumulator: u32,
    pub volatility_reference: u32,
    pub index_reference: i32,
    pub padding: [u8; 4],
    pub last_update_timestamp: i64,
    pub padding_1: [u8; 8],
}

#[derive(BorshSerialize, BorshDeserialize, Debug, Clone)]
pub struct ProtocolFee {
    pub amount_x: u64,
    pub amount_y: u64,
}

#[derive(BorshSerialize, BorshDeserialize, Debug, Clone)]
pub struct RewardInfo {
    pub mint: Pubkey,
    pub vault: Pubkey,
    pub funder: Pubkey,
    pub reward_duration: u64,
    pub reward_duration_end: u64,
    pub reward_rate: u128,
    pub last_update_time: u64,
    pub cumulative_seconds_with_empty_liquidity_reward: u64,
}

/// `LbPair` account, modeled up to the reward slots.
#[derive(BorshSerialize, BorshDeserialize, Debug, Clone)]
pub struct LbPair {
    pub parameters: StaticParameters,
    pub v_parameters: VariableParameters,
    pub bump_seed: [u8; 1],
    pub bin_step_seed: [u8; 2],
    pub pair_type: u8,
    pub active_id: i32,
    pub bin_step: u16,
    pub status: u8,
    pub require_base_factor_seed: u8,
    pub base_factor_seed: [u8; 2],
    pub activation_type: u8,
    pub creator_pool_on_off_control: u8,
    pub token_x_mint: Pubkey,
    pub token_y_mint: Pubkey,
    pub reserve_x: Pubkey,
    pub reserve_y: Pubkey,
    pub protocol_fee: ProtocolFee,
    pub padding_1: [u8; 32],
    pub reward_infos: [RewardInfo; 2],
}

impl LbPair {
    pub const ACCOUNT_NAME: &'static str = "LbPair";

    pub fn decode(address: &Pubkey, data: &[u8]) -> Result<Self, ProtocolError> {
        anchor::deserialize_account(Self::ACCOUNT_NAME, address, data)
    }

    /// Fee normalization: base and variable components scale with the bin
    /// step; the variable control divisor is this program's 1e11.
    pub fn fees(&self) -> FeeBreakdown {
        let bin_step = self.bin_step as f64;
        let base_fee = self.parameters.base_factor as f64 * bin_step / 1e6;
        let variable_fee = if self.parameters.variable_fee_control > 0 {
            (self.v_parameters.volatility_accumulator as f64 * bin_step).powi(2)
                * self.parameters.variable_fee_control as f64
                / 1e11
        } else {
            0.0
        };
        let dynamic_fee = base_fee.max(variable_fee);
        let protocol_fee = dynamic_fee * (self.parameters.protocol_share as f64 / 1e4);

        FeeBreakdown {
            bin_step: self.bin_step as i32,
            base_fee,
            max_fee: DEFAULT_MAX_FEE,
            dynamic_fee,
            protocol_fee,
        }
    }

    /// Reward mints in use; slots parked on the system program mean no
    /// reward is configured.
    pub fn reward_mints(&self) -> Vec<Pubkey> {
        self.reward_infos
            .iter()
            .filter(|info| info.mint != crate::token::SYSTEM_PROGRAM_ID)
            .map(|info| info.mint)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lb_pair(
        bin_step: u16,
        base_factor: u16,
        variable_fee_control: u32,
        volatility_accumulator: u32,
        protocol_share: u16,
    ) -> LbPair {
        LbPair {
            parameters: StaticParameters {
                base_factor,
                filter_period: 30,
                decay_period: 600,
                reduction_factor: 5000,
                variable_fee_control,
                max_volatility_accumulator: 350_000,
                min_bin_id: -443_636,
                max_bin_id: 443_636,
                protocol_share,
                base_fee_power_factor: 0,
                padding: [0; 5],
            },
            v_parameters: VariableParameters {
                volatility_accumulator,
                volatility_reference: 0,
                index_reference: 0,
                padding: [0; 4],
                last_update_timestamp: 0,
                padding_1: [0; 8],
            },
            bump_seed: [255],
            bin_step_seed: bin_step.to_le_bytes(),
            pair_type: 0,
            active_id: 0,
            bin_step,
            status: 0,
            require_base_factor_seed: 0,
            base_factor_seed: [0; 2],
            activation_type: 0,
            creator_pool_on_off_control: 0,
            token_x_mint: Pubkey::new_unique(),
            token_y_mint: Pubkey::new_unique(),
            reserve_x: Pubkey::new_unique(),
            reserve_y: Pubkey::new_unique(),
            protocol_fee: ProtocolFee {
                amount_x: 0,
                amount_y: 0,
            },
            padding_1: [0; 32],
            reward_infos: [
                RewardInfo {
                    mint: crate::token::SYSTEM_PROGRAM_ID,
                    vault: Pubkey::default(),
                    funder: Pubkey::default(),
                    reward_duration: 0,
                    reward_duration_end: 0,
                    reward_rate: 0,
                    last_update_time: 0,
                    cumulative_seconds_with_empty_liquidity_reward: 0,
                },
                RewardInfo {
                    mint: crate::token::SYSTEM_PROGRAM_ID,
                    vault: Pubkey::default(),
                    funder: Pubkey::default(),
                    reward_duration: 0,
                    reward_duration_end: 0,
                    reward_rate: 0,
                    last_update_time: 0,
                    cumulative_seconds_with_empty_liquidity_reward: 0,
                },
            ],
        }
    }

    #[test]
    fn test_base_fee_scales_with_bin_step() {
        let fees = lb_pair(1, 10_000, 0, 0, 2_000).fees();
        assert_eq!(fees.base_fee, 0.01);
        assert_eq!(fees.dynamic_fee, 0.01);
        assert_eq!(fees.protocol_fee, 0.002);
        assert_eq!(fees.max_fee, 10.0);
    }

    #[test]
    fn test_variable_fee_uses_1e11_divisor() {
        let fees = lb_pair(10, 5_000, 40_000, 10_000, 1_000).fees();
        // base = 5000 * 10 / 1e6 = 0.05
        assert_eq!(fees.base_fee, 0.05);
        // variable = (10_000 * 10)^2 * 40_000 / 1e11 = 4000
        assert_eq!(fees.dynamic_fee, 4_000.0);
        assert_eq!(fees.protocol_fee, 4_000.0 * 0.1);
    }

    #[test]
    fn test_variable_fee_disabled_when_control_zero() {
        let fees = lb_pair(10, 5_000, 0, 10_000, 1_000).fees();
        assert_eq!(fees.dynamic_fee, fees.base_fee);
    }

    #[test]
    fn test_reward_mints_skip_system_program_slots() {
        let mut pair = lb_pair(1, 10_000, 0, 0, 2_000);
        let reward = Pubkey::new_unique();
        pair.reward_infos[1].mint = reward;
        assert_eq!(pair.reward_mints(), vec![reward]);
    }

    #[test]
    fn test_account_roundtrip_through_discriminator() {
        let address = Pubkey::new_unique();
        let pair = lb_pair(25, 8_000, 0, 0, 500);
        let mut data = crate::anchor::account_discriminator(LbPair::ACCOUNT_NAME).to_vec();
        data.extend(borsh::to_vec(&pair).unwrap());
        // Trailing bytes (oracle, bitmaps) must not break prefix decoding.
        data.extend_from_slice(&[0u8; 128]);

        let decoded = LbPair::decode(&address, &data).unwrap();
        assert_eq!(decoded.bin_step, 25);
        assert_eq!(decoded.parameters.base_factor, 8_000);
    }
}
