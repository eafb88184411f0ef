//! SPL token and Metaplex metadata account decoding.

use solana_program::program_pack::Pack;
use solana_sdk::pubkey::Pubkey;
use spl_token::state::{Account as SplTokenAccount, Mint as SplMint};

use crate::error::ProtocolError;

/// Metaplex token metadata program.
pub const METADATA_PROGRAM_ID: Pubkey =
    Pubkey::from_str_const("metaqbxxUerdq28cj1RbAWkYQm3ybzjb6a8bt518x1s");

/// The system program; reward slots parked on it mean "no reward".
pub const SYSTEM_PROGRAM_ID: Pubkey =
    Pubkey::from_str_const("11111111111111111111111111111111");

/// Raw balance of a token-vault account. Works for both legacy SPL token and
/// token-2022 accounts, whose base layout shares the first
/// [`SplTokenAccount::LEN`] bytes.
pub fn decode_token_amount(address: &Pubkey, data: &[u8]) -> Result<u64, ProtocolError> {
    if data.len() < SplTokenAccount::LEN {
        return Err(ProtocolError::AccountData {
            address: address.to_string(),
            kind: "TokenAccount",
            reason: format!("expected at least {} bytes", SplTokenAccount::LEN),
        });
    }
    let account = SplTokenAccount::unpack_from_slice(&data[..SplTokenAccount::LEN]).map_err(
        |err| ProtocolError::AccountData {
            address: address.to_string(),
            kind: "TokenAccount",
            reason: err.to_string(),
        },
    )?;
    Ok(account.amount)
}

/// Decimals of a mint account (legacy or token-2022 base layout).
pub fn decode_mint_decimals(address: &Pubkey, data: &[u8]) -> Result<u8, ProtocolError> {
    if data.len() < SplMint::LEN {
        return Err(ProtocolError::AccountData {
            address: address.to_string(),
            kind: "Mint",
            reason: format!("expected at least {} bytes", SplMint::LEN),
        });
    }
    let mint = SplMint::unpack_from_slice(&data[..SplMint::LEN]).map_err(|err| {
        ProtocolError::AccountData {
            address: address.to_string(),
            kind: "Mint",
            reason: err.to_string(),
        }
    })?;
    Ok(mint.decimals)
}

/// Metadata PDA for a mint under the Metaplex token metadata program.
pub fn metadata_address(mint: &Pubkey) -> Pubkey {
    Pubkey::find_program_address(
        &[b"metadata", METADATA_PROGRAM_ID.as_ref(), mint.as_ref()],
        &METADATA_PROGRAM_ID,
    )
    .0
}

/// Name/symbol pair read from a Metaplex metadata account.
#[derive(Debug, Clone)]
pub struct TokenMetadata {
    pub name: String,
    pub symbol: String,
    pub uri: String,
}

/// Walks the metadata account layout by hand: key (1) + update authority
/// (32) + mint (32), then three length-prefixed strings padded with NULs.
pub fn decode_metadata(address: &Pubkey, data: &[u8]) -> Result<TokenMetadata, ProtocolError> {
    let mut cursor = 1 + 32 + 32;
    let name = read_padded_string(address, data, &mut cursor)?;
    let symbol = read_padded_string(address, data, &mut cursor)?;
    let uri = read_padded_string(address, data, &mut cursor)?;
    Ok(TokenMetadata { name, symbol, uri })
}

fn read_padded_string(
    address: &Pubkey,
    data: &[u8],
    cursor: &mut usize,
) -> Result<String, ProtocolError> {
    let malformed = |reason: &str| ProtocolError::AccountData {
        address: address.to_string(),
        kind: "Metadata",
        reason: reason.to_string(),
    };

    let len_end = cursor
        .checked_add(4)
        .filter(|end| *end <= data.len())
        .ok_or_else(|| malformed("truncated string length"))?;
    let len = u32::from_le_bytes(
        data[*cursor..len_end]
            .try_into()
            .map_err(|_| malformed("truncated string length"))?,
    ) as usize;
    let end = len_end
        .checked_add(len)
        .filter(|end| *end <= data.len())
        .ok_or_else(|| malformed("truncated string body"))?;

    let value = String::from_utf8_lossy(&data[len_end..end])
        .trim_end_matches('\0')
        .to_string();
    *cursor = end;
    Ok(value)
}

/// Placeholder symbol when a mint has no metadata account on chain.
pub fn fallback_symbol(mint: &Pubkey) -> String {
    let address = mint.to_string();
    address.chars().take(6).collect()
}
