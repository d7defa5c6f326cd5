//! RLP encoding, just enough for legacy transactions.

/// Encode a byte string. Single bytes below 0x80 encode as themselves.
pub fn rlp_bytes(b: &[u8]) -> Vec<u8> {
    if b.len() == 1 && b[0] < 0x80 {
        return b.to_vec();
    }
    if b.len() <= 55 {
        let mut out = vec![0x80 + b.len() as u8];
        out.extend_from_slice(b);
        return out;
    }
    let len_bytes = minimal_be(b.len() as u128);
    let mut out = vec![0xb7 + len_bytes.len() as u8];
    out.extend_from_slice(&len_bytes);
    out.extend_from_slice(b);
    out
}

/// Encode an unsigned integer as its minimal big-endian byte string.
/// Zero encodes as the empty string (0x80).
pub fn rlp_u256(x: u128) -> Vec<u8> {
    if x == 0 {
        return vec![0x80];
    }
    rlp_bytes(&minimal_be(x))
}

/// Encode a list of already-encoded items.
pub fn rlp_list(items: &[Vec<u8>]) -> Vec<u8> {
    let payload_len: usize = items.iter().map(|i| i.len()).sum();
    let mut payload = Vec::with_capacity(payload_len);
    for item in items {
        payload.extend_from_slice(item);
    }
    if payload_len <= 55 {
        let mut out = vec![0xc0 + payload_len as u8];
        out.extend_from_slice(&payload);
        return out;
    }
    let len_bytes = minimal_be(payload_len as u128);
    let mut out = vec![0xf7 + len_bytes.len() as u8];
    out.extend_from_slice(&len_bytes);
    out.extend_from_slice(&payload);
    out
}

/// Minimal big-endian representation with leading zeroes stripped.
pub fn minimal_be(x: u128) -> Vec<u8> {
    let bytes = x.to_be_bytes();
    let first = bytes.iter().position(|b| *b != 0).unwrap_or(15);
    bytes[first..].to_vec()
}

/// Strip leading zeroes from a fixed-width big-endian value (signature
/// components must be minimally encoded inside the transaction).
pub fn strip_leading_zeroes(b: &[u8]) -> &[u8] {
    let first = b.iter().position(|x| *x != 0).unwrap_or(b.len() - 1);
    &b[first..]
}
