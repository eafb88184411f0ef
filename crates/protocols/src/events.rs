//! Typed protocol events and the decoder contract.
//!
//! Each program's events are a closed enum; dispatch is exhaustive pattern
//! matching, never runtime field inspection. [`EventDecoder`] is the
//! boundary to the external transaction decoder: anything that turns a
//! fetched transaction into typed events satisfies the pipeline.
//! [`LogEventDecoder`] is the default implementation, lifting anchor event
//! payloads out of `Program data:` log lines.

use std::collections::HashMap;

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use borsh::BorshDeserialize;
use solana_sdk::pubkey::Pubkey;
use tracing::debug;

use poolscope_domain::{Market, SwapSide};

use crate::anchor;
use crate::error::ProtocolError;
use crate::rpc::TransactionRecord;

#[derive(BorshDeserialize, Debug, Clone)]
pub struct MeteoraSwapEvent {
    pub lb_pair: Pubkey,
    pub from: Pubkey,
    pub start_bin_id: i32,
    pub end_bin_id: i32,
    pub amount_in: u64,
    pub amount_out: u64,
    pub swap_for_y: bool,
    pub fee: u64,
    pub protocol_fee: u64,
    pub fee_bps: u128,
    pub host_fee: u64,
}

#[derive(Debug, Clone)]
pub enum MeteoraEvent {
    Swap(MeteoraSwapEvent),
}

#[derive(BorshDeserialize, Debug, Clone)]
pub struct SarosSwapEvent {
    pub pair: Pubkey,
    pub swap_for_y: bool,
    pub bin_id: u32,
    pub amount_in: u64,
    pub amount_out: u64,
    pub fee: u64,
    pub protocol_fee: u64,
}

#[derive(BorshDeserialize, Debug, Clone)]
pub struct SarosPositionCreationEvent {
    pub pair: Pubkey,
    pub position: Pubkey,
}

#[derive(BorshDeserialize, Debug, Clone)]
pub struct SarosPositionIncreaseEvent {
    pub pair: Pubkey,
    pub position: Pubkey,
    pub amounts_x: Vec<u64>,
    pub amounts_y: Vec<u64>,
}

#[derive(BorshDeserialize, Debug, Clone)]
pub struct SarosPositionDecreaseEvent {
    pub pair: Pubkey,
    pub position: Pubkey,
    pub amounts_x: Vec<u64>,
    pub amounts_y: Vec<u64>,
}

#[derive(Debug, Clone)]
pub enum SarosEvent {
    Swap(SarosSwapEvent),
    PositionCreation(SarosPositionCreationEvent),
    PositionIncrease(SarosPositionIncreaseEvent),
    PositionDecrease(SarosPositionDecreaseEvent),
}

#[derive(BorshDeserialize, Debug, Clone)]
pub struct OrcaTradedEvent {
    pub whirlpool: Pubkey,
    pub a_to_b: bool,
    pub pre_sqrt_price: u128,
    pub post_sqrt_price: u128,
    pub input_amount: u64,
    pub output_amount: u64,
    pub input_transfer_fee: u64,
    pub output_transfer_fee: u64,
    pub lp_fee: u64,
    pub protocol_fee: u64,
}

#[derive(Debug, Clone)]
pub enum OrcaEvent {
    Traded(OrcaTradedEvent),
}

#[derive(BorshDeserialize, Debug, Clone)]
pub struct RaydiumSwapEvent {
    pub pool_state: Pubkey,
    pub sender: Pubkey,
    pub token_account_0: Pubkey,
    pub token_account_1: Pubkey,
    pub amount_0: u64,
    pub transfer_fee_0: u64,
    pub amount_1: u64,
    pub transfer_fee_1: u64,
    pub zero_for_one: bool,
    pub sqrt_price_x64: u128,
    pub liquidity: u128,
    pub tick: i32,
}

#[derive(Debug, Clone)]
pub enum RaydiumEvent {
    Swap(RaydiumSwapEvent),
}

/// Market-tagged union over all protocol events.
#[derive(Debug, Clone)]
pub enum ProtocolEvent {
    Meteora(MeteoraEvent),
    Saros(SarosEvent),
    Orca(OrcaEvent),
    Raydium(RaydiumEvent),
}

/// A swap event reduced to what the normalizer needs: pool, direction, raw
/// base/quote amounts and the fee attributed to the side the protocol
/// charges it in.
#[derive(Debug, Clone)]
pub struct SwapObservation {
    pub pair: Pubkey,
    pub side: SwapSide,
    pub base_amount: u64,
    pub quote_amount: u64,
    pub base_fee: u64,
    pub quote_fee: u64,
}

impl ProtocolEvent {
    pub fn market(&self) -> Market {
        match self {
            ProtocolEvent::Meteora(_) => Market::Meteora,
            ProtocolEvent::Saros(_) => Market::Saros,
            ProtocolEvent::Orca(_) => Market::Orca,
            ProtocolEvent::Raydium(_) => Market::Raydium,
        }
    }

    /// Maps a swap-kind event onto a [`SwapObservation`]; position lifecycle
    /// events return `None`.
    pub fn swap_observation(&self) -> Option<SwapObservation> {
        match self {
            ProtocolEvent::Meteora(MeteoraEvent::Swap(event)) => Some(bin_swap_observation(
                event.lb_pair,
                event.swap_for_y,
                event.amount_in,
                event.amount_out,
                event.fee,
            )),
            ProtocolEvent::Saros(SarosEvent::Swap(event)) => Some(bin_swap_observation(
                event.pair,
                event.swap_for_y,
                event.amount_in,
                event.amount_out,
                event.fee,
            )),
            ProtocolEvent::Saros(_) => None,
            ProtocolEvent::Orca(OrcaEvent::Traded(event)) => {
                let (base_amount, quote_amount) = if event.a_to_b {
                    (event.input_amount, event.output_amount)
                } else {
                    (event.output_amount, event.input_amount)
                };
                let (base_fee, quote_fee) = if event.a_to_b {
                    (event.input_transfer_fee, event.output_transfer_fee)
                } else {
                    (event.output_transfer_fee, event.input_transfer_fee)
                };
                Some(SwapObservation {
                    pair: event.whirlpool,
                    side: side_from_flag(event.a_to_b),
                    base_amount,
                    quote_amount,
                    base_fee,
                    quote_fee,
                })
            }
            ProtocolEvent::Raydium(RaydiumEvent::Swap(event)) => {
                let (base_amount, quote_amount) = if event.zero_for_one {
                    (event.amount_1, event.amount_0)
                } else {
                    (event.amount_0, event.amount_1)
                };
                let (base_fee, quote_fee) = if event.zero_for_one {
                    (event.transfer_fee_0, event.transfer_fee_1)
                } else {
                    (event.transfer_fee_1, event.transfer_fee_0)
                };
                Some(SwapObservation {
                    pair: event.pool_state,
                    side: side_from_flag(event.zero_for_one),
                    base_amount,
                    quote_amount,
                    base_fee,
                    quote_fee,
                })
            }
        }
    }
}

/// Selling base for quote is a sell; the flag is `swap_for_y` / `a_to_b` /
/// `zero_for_one` depending on the program.
fn side_from_flag(base_in: bool) -> SwapSide {
    if base_in { SwapSide::Sell } else { SwapSide::Buy }
}

/// Meteora and Saros charge the swap fee in the input token; the amounts
/// swap roles with the direction flag.
fn bin_swap_observation(
    pair: Pubkey,
    swap_for_y: bool,
    amount_in: u64,
    amount_out: u64,
    fee: u64,
) -> SwapObservation {
    let (base_amount, quote_amount) = if swap_for_y {
        (amount_in, amount_out)
    } else {
        (amount_out, amount_in)
    };
    let (base_fee, quote_fee) = if swap_for_y { (fee, 0) } else { (0, fee) };
    SwapObservation {
        pair,
        side: side_from_flag(swap_for_y),
        base_amount,
        quote_amount,
        base_fee,
        quote_fee,
    }
}

/// The external decoder contract: typed events out of a fetched
/// transaction, in emission order.
pub trait EventDecoder: Send + Sync {
    fn decode(&self, tx: &TransactionRecord) -> Result<Vec<ProtocolEvent>, ProtocolError>;
}

#[derive(Debug, Clone, Copy)]
enum EventKind {
    MeteoraSwap,
    SarosSwap,
    SarosPositionCreation,
    SarosPositionIncrease,
    SarosPositionDecrease,
    OrcaTraded,
    RaydiumSwap,
}

/// Default decoder implementation: scans `Program data:` log lines for
/// anchor event payloads and matches their 8-byte discriminators against
/// the event names of the four supported programs. Payloads that do not
/// match any known event are skipped.
pub struct LogEventDecoder {
    table: HashMap<[u8; 8], EventKind>,
}

impl Default for LogEventDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl LogEventDecoder {
    pub fn new() -> Self {
        let mut table = HashMap::new();
        table.insert(anchor::event_discriminator("Swap"), EventKind::MeteoraSwap);
        table.insert(
            anchor::event_discriminator("BinSwapEvent"),
            EventKind::SarosSwap,
        );
        table.insert(
            anchor::event_discriminator("PositionCreationEvent"),
            EventKind::SarosPositionCreation,
        );
        table.insert(
            anchor::event_discriminator("PositionIncreaseEvent"),
            EventKind::SarosPositionIncrease,
        );
        table.insert(
            anchor::event_discriminator("PositionDecreaseEvent"),
            EventKind::SarosPositionDecrease,
        );
        table.insert(anchor::event_discriminator("Traded"), EventKind::OrcaTraded);
        table.insert(
            anchor::event_discriminator("SwapEvent"),
            EventKind::RaydiumSwap,
        );
        Self { table }
    }

    fn decode_payload(&self, data: &[u8]) -> Result<Option<ProtocolEvent>, ProtocolError> {
        if data.len() < 8 {
            return Ok(None);
        }
        let mut discriminator = [0u8; 8];
        discriminator.copy_from_slice(&data[..8]);
        let Some(kind) = self.table.get(&discriminator) else {
            return Ok(None);
        };
        let body = &data[8..];

        let event = match kind {
            EventKind::MeteoraSwap => ProtocolEvent::Meteora(MeteoraEvent::Swap(
                anchor::deserialize_event("Swap", body)?,
            )),
            EventKind::SarosSwap => ProtocolEvent::Saros(SarosEvent::Swap(
                anchor::deserialize_event("BinSwapEvent", body)?,
            )),
            EventKind::SarosPositionCreation => {
                ProtocolEvent::Saros(SarosEvent::PositionCreation(anchor::deserialize_event(
                    "PositionCreationEvent",
                    body,
                )?))
            }
            EventKind::SarosPositionIncrease => {
                ProtocolEvent::Saros(SarosEvent::PositionIncrease(anchor::deserialize_event(
                    "PositionIncreaseEvent",
                    body,
                )?))
            }
            EventKind::SarosPositionDecrease => {
                ProtocolEvent::Saros(SarosEvent::PositionDecrease(anchor::deserialize_event(
                    "PositionDecreaseEvent",
                    body,
                )?))
            }
            EventKind::OrcaTraded => ProtocolEvent::Orca(OrcaEvent::Traded(
                anchor::deserialize_event("Traded", body)?,
            )),
            EventKind::RaydiumSwap => ProtocolEvent::Raydium(RaydiumEvent::Swap(
                anchor::deserialize_event("SwapEvent", body)?,
            )),
        };
        Ok(Some(event))
    }
}

impl EventDecoder for LogEventDecoder {
    fn decode(&self, tx: &TransactionRecord) -> Result<Vec<ProtocolEvent>, ProtocolError> {
        let mut events = Vec::new();
        for log in tx.log_messages() {
            let Some(encoded) = log.strip_prefix("Program data: ") else {
                continue;
            };
            let Ok(data) = BASE64.decode(encoded.trim()) else {
                debug!(signature = %tx.signature, "undecodable program data log");
                continue;
            };
            match self.decode_payload(&data) {
                Ok(Some(event)) => events.push(event),
                Ok(None) => {}
                Err(err) => {
                    debug!(signature = %tx.signature, error = %err, "skipping malformed event");
                }
            }
        }
        Ok(events)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use borsh::BorshSerialize;

    #[derive(BorshSerialize)]
    struct RawMeteoraSwap {
        lb_pair: Pubkey,
        from: Pubkey,
        start_bin_id: i32,
        end_bin_id: i32,
        amount_in: u64,
        amount_out: u64,
        swap_for_y: bool,
        fee: u64,
        protocol_fee: u64,
        fee_bps: u128,
        host_fee: u64,
    }

    fn tx_with_logs(logs: &[String]) -> TransactionRecord {
        TransactionRecord {
            signature: "sig".to_string(),
            slot: 1,
            block_time: Some(1_700_000_000),
            failed: false,
            payload: serde_json::json!({ "meta": { "logMessages": logs } }),
        }
    }

    #[test]
    fn test_decodes_meteora_swap_from_program_data_log() {
        let pair = Pubkey::new_unique();
        let raw = RawMeteoraSwap {
            lb_pair: pair,
            from: Pubkey::new_unique(),
            start_bin_id: -3,
            end_bin_id: -1,
            amount_in: 1_000,
            amount_out: 950,
            swap_for_y: true,
            fee: 10,
            protocol_fee: 2,
            fee_bps: 25,
            host_fee: 0,
        };
        let mut payload = anchor::event_discriminator("Swap").to_vec();
        payload.extend(borsh::to_vec(&raw).unwrap());

        let tx = tx_with_logs(&[
            "Program LBUZKhRxPF3XUpBCjp4YeC6BNhu2nqBDt16ymccEZLo invoke [1]".to_string(),
            format!("Program data: {}", BASE64.encode(&payload)),
        ]);

        let events = LogEventDecoder::new().decode(&tx).unwrap();
        assert_eq!(events.len(), 1);
        match &events[0] {
            ProtocolEvent::Meteora(MeteoraEvent::Swap(event)) => {
                assert_eq!(event.lb_pair, pair);
                assert_eq!(event.amount_in, 1_000);
                assert!(event.swap_for_y);
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn test_unknown_discriminators_are_skipped() {
        let mut payload = anchor::event_discriminator("SomethingElse").to_vec();
        payload.extend_from_slice(&[0u8; 32]);
        let tx = tx_with_logs(&[format!("Program data: {}", BASE64.encode(&payload))]);
        assert!(LogEventDecoder::new().decode(&tx).unwrap().is_empty());
    }

    #[test]
    fn test_bin_swap_fee_lands_on_input_side() {
        let pair = Pubkey::new_unique();
        let sell = bin_swap_observation(pair, true, 100, 90, 7);
        assert_eq!(sell.side, SwapSide::Sell);
        assert_eq!((sell.base_amount, sell.quote_amount), (100, 90));
        assert_eq!((sell.base_fee, sell.quote_fee), (7, 0));

        let buy = bin_swap_observation(pair, false, 100, 90, 7);
        assert_eq!(buy.side, SwapSide::Buy);
        assert_eq!((buy.base_amount, buy.quote_amount), (90, 100));
        assert_eq!((buy.base_fee, buy.quote_fee), (0, 7));
    }

    #[test]
    fn test_orca_observation_tracks_direction() {
        let whirlpool = Pubkey::new_unique();
        let event = ProtocolEvent::Orca(OrcaEvent::Traded(OrcaTradedEvent {
            whirlpool,
            a_to_b: false,
            pre_sqrt_price: 0,
            post_sqrt_price: 0,
            input_amount: 500,
            output_amount: 480,
            input_transfer_fee: 5,
            output_transfer_fee: 1,
            lp_fee: 3,
            protocol_fee: 1,
        }));
        let observation = event.swap_observation().unwrap();
        assert_eq!(observation.side, SwapSide::Buy);
        assert_eq!(observation.base_amount, 480);
        assert_eq!(observation.quote_amount, 500);
        assert_eq!(observation.base_fee, 1);
        assert_eq!(observation.quote_fee, 5);
    }

    #[test]
    fn test_raydium_observation_swaps_amount_roles() {
        let pool = Pubkey::new_unique();
        let event = ProtocolEvent::Raydium(RaydiumEvent::Swap(RaydiumSwapEvent {
            pool_state: pool,
            sender: Pubkey::new_unique(),
            token_account_0: Pubkey::new_unique(),
            token_account_1: Pubkey::new_unique(),
            amount_0: 1_000,
            transfer_fee_0: 4,
            amount_1: 2_000,
            transfer_fee_1: 6,
            zero_for_one: true,
            sqrt_price_x64: 0,
            liquidity: 0,
            tick: 0,
        }));
        let observation = event.swap_observation().unwrap();
        assert_eq!(observation.side, SwapSide::Sell);
        assert_eq!(observation.base_amount, 2_000);
        assert_eq!(observation.quote_amount, 1_000);
        assert_eq!((observation.base_fee, observation.quote_fee), (4, 6));
    }

    #[test]
    fn test_position_events_are_not_swaps() {
        let event = ProtocolEvent::Saros(SarosEvent::PositionCreation(
            SarosPositionCreationEvent {
                pair: Pubkey::new_unique(),
                position: Pubkey::new_unique(),
            },
        ));
        assert!(event.swap_observation().is_none());
    }
}
