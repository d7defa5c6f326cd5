//! Minimal ABI encoding for the handful of escrow/registry calls the
//! master issues. Head-only encoding is enough: every argument we pass is
//! a static 32-byte word.

use crate::error::{ChainError, Result};
use econos_crypto::keccak256;
use econos_types::{Address, Wei};

/// First four bytes of the keccak of the canonical method signature.
pub fn selector(signature: &str) -> [u8; 4] {
    let hash = keccak256(signature.as_bytes());
    [hash[0], hash[1], hash[2], hash[3]]
}

pub fn encode_bytes32(value: &[u8; 32]) -> [u8; 32] {
    *value
}

pub fn encode_address(addr: Address) -> [u8; 32] {
    let mut word = [0u8; 32];
    word[12..].copy_from_slice(addr.as_bytes());
    word
}

pub fn encode_u256(value: u128) -> [u8; 32] {
    let mut word = [0u8; 32];
    word[16..].copy_from_slice(&value.to_be_bytes());
    word
}

/// Calldata builder: selector followed by 32-byte words.
pub fn calldata(signature: &str, words: &[[u8; 32]]) -> Vec<u8> {
    let mut out = Vec::with_capacity(4 + words.len() * 32);
    out.extend_from_slice(&selector(signature));
    for word in words {
        out.extend_from_slice(word);
    }
    out
}

/// Fetch the `index`-th 32-byte word of a return payload.
pub fn word_at(data: &[u8], index: usize) -> Result<[u8; 32]> {
    let start = index * 32;
    let end = start + 32;
    if data.len() < end {
        return Err(ChainError::Decode(format!(
            "return data too short: want word {}, have {} bytes",
            index,
            data.len()
        )));
    }
    let mut word = [0u8; 32];
    word.copy_from_slice(&data[start..end]);
    Ok(word)
}

pub fn word_to_address(word: &[u8; 32]) -> Address {
    let mut addr = [0u8; 20];
    addr.copy_from_slice(&word[12..]);
    Address::from_bytes(addr)
}

pub fn word_to_u128(word: &[u8; 32]) -> Result<u128> {
    if word[..16].iter().any(|b| *b != 0) {
        return Err(ChainError::Decode("uint256 exceeds u128 range".to_string()));
    }
    let mut raw = [0u8; 16];
    raw.copy_from_slice(&word[16..]);
    Ok(u128::from_be_bytes(raw))
}

pub fn word_to_u64(word: &[u8; 32]) -> Result<u64> {
    let v = word_to_u128(word)?;
    u64::try_from(v).map_err(|_| ChainError::Decode("uint256 exceeds u64 range".to_string()))
}

pub fn word_to_wei(word: &[u8; 32]) -> Result<Wei> {
    word_to_u128(word).map(Wei::from_wei)
}

pub fn word_to_bool(word: &[u8; 32]) -> bool {
    word[31] != 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_selector_known_vector() {
        // keccak("transfer(address,uint256)")[0..4] == a9059cbb
        assert_eq!(selector("transfer(address,uint256)"), [0xa9, 0x05, 0x9c, 0xbb]);
    }

    #[test]
    fn test_address_round_trip() {
        let addr = Address::from_bytes([0x42; 20]);
        let word = encode_address(addr);
        assert!(word[..12].iter().all(|b| *b == 0));
        assert_eq!(word_to_address(&word), addr);
    }

    #[test]
    fn test_u256_round_trip() {
        let word = encode_u256(1_000_000_000_000_000_000);
        assert_eq!(word_to_u128(&word).unwrap(), 1_000_000_000_000_000_000);
    }

    #[test]
    fn test_u256_overflow_detected() {
        let mut word = [0u8; 32];
        word[0] = 1;
        assert!(word_to_u128(&word).is_err());
    }

    #[test]
    fn test_calldata_layout() {
        let data = calldata(
            "depositTask(bytes32,address,uint256)",
            &[
                encode_bytes32(&[1u8; 32]),
                encode_address(Address::from_bytes([2u8; 20])),
                encode_u256(7200),
            ],
        );
        assert_eq!(data.len(), 4 + 3 * 32);
        assert_eq!(&data[..4], &selector("depositTask(bytes32,address,uint256)"));
        assert_eq!(&data[4..36], &[1u8; 32]);
    }

    #[test]
    fn test_word_at_bounds() {
        let data = vec![0u8; 64];
        assert!(word_at(&data, 1).is_ok());
        assert!(word_at(&data, 2).is_err());
    }
}
