use sha3::{Digest, Keccak256};

/// Keccak-256 over raw bytes.
pub fn keccak256(data: &[u8]) -> [u8; 32] {
    let mut hasher = Keccak256::new();
    hasher.update(data);
    let digest = hasher.finalize();
    let mut out = [0u8; 32];
    out.copy_from_slice(&digest);
    out
}

/// Keccak-256 over the concatenation of several byte slices, avoiding an
/// intermediate allocation.
pub fn keccak256_concat(parts: &[&[u8]]) -> [u8; 32] {
    let mut hasher = Keccak256::new();
    for part in parts {
        hasher.update(part);
    }
    let digest = hasher.finalize();
    let mut out = [0u8; 32];
    out.copy_from_slice(&digest);
    out
}

/// EIP-191 personal-message digest of a 32-byte hash. Worker sidecars sign
/// result proofs with this scheme; it is deliberately distinct from the
/// typed-data scheme used for master authorizations and the two must never
/// be interchanged.
pub fn eth_signed_message_hash(hash: &[u8; 32]) -> [u8; 32] {
    keccak256_concat(&[b"\x19Ethereum Signed Message:\n32", hash])
}

/// Left-pad a value to a 32-byte word (ABI / typed-data encoding).
pub fn pad32(value: &[u8]) -> [u8; 32] {
    debug_assert!(value.len() <= 32);
    let mut out = [0u8; 32];
    out[32 - value.len()..].copy_from_slice(value);
    out
}

/// Encode a u128 as a 32-byte big-endian word.
pub fn u256_word(value: u128) -> [u8; 32] {
    pad32(&value.to_be_bytes())
}
