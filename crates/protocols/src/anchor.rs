//! Anchor account and event framing: 8-byte sha256 discriminators followed
//! by borsh-encoded bodies. Account structs here model only the layout
//! prefix up to the last consumed field, so decoding must tolerate trailing
//! bytes.

use borsh::BorshDeserialize;
use sha2::{Digest, Sha256};

use crate::error::ProtocolError;

fn discriminator(namespace: &str, name: &str) -> [u8; 8] {
    let mut hasher = Sha256::new();
    hasher.update(namespace.as_bytes());
    hasher.update(b":");
    hasher.update(name.as_bytes());
    let digest = hasher.finalize();
    let mut out = [0u8; 8];
    out.copy_from_slice(&digest[..8]);
    out
}

pub fn account_discriminator(name: &str) -> [u8; 8] {
    discriminator("account", name)
}

pub fn event_discriminator(name: &str) -> [u8; 8] {
    discriminator("event", name)
}

/// Decodes an anchor account of the named type, verifying the discriminator
/// and ignoring any bytes past the modeled prefix.
pub fn deserialize_account<T: BorshDeserialize>(
    name: &'static str,
    address: &solana_sdk::pubkey::Pubkey,
    data: &[u8],
) -> Result<T, ProtocolError> {
    if data.len() < 8 {
        return Err(ProtocolError::AccountData {
            address: address.to_string(),
            kind: name,
            reason: "account data shorter than discriminator".to_string(),
        });
    }
    if data[..8] != account_discriminator(name) {
        return Err(ProtocolError::AccountData {
            address: address.to_string(),
            kind: name,
            reason: "discriminator mismatch".to_string(),
        });
    }
    let mut body = &data[8..];
    T::deserialize(&mut body).map_err(|err| ProtocolError::AccountData {
        address: address.to_string(),
        kind: name,
        reason: err.to_string(),
    })
}

/// Decodes an anchor event body (discriminator already stripped), tolerating
/// trailing bytes the same way accounts do.
pub fn deserialize_event<T: BorshDeserialize>(name: &str, body: &[u8]) -> Result<T, ProtocolError> {
    let mut body = body;
    T::deserialize(&mut body)
        .map_err(|err| ProtocolError::Event(format!("{name}: {err}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_discriminators_differ_by_namespace() {
        assert_ne!(account_discriminator("Swap"), event_discriminator("Swap"));
    }

    #[test]
    fn test_event_discriminator_is_stable() {
        // sha256("event:Swap")[..8] must not drift between calls.
        assert_eq!(event_discriminator("Swap"), event_discriminator("Swap"));
    }
}
