//! Legacy EIP-155 transaction signing for the master wallet.

use crate::error::{ChainError, Result};
use crate::rlp::{rlp_bytes, rlp_list, rlp_u256, strip_leading_zeroes};
use econos_crypto::keccak256;
use econos_types::Address;
use k256::ecdsa::SigningKey;

pub struct TxSigner {
    signing_key: SigningKey,
    address: Address,
    chain_id: u64,
}

impl TxSigner {
    pub fn new(private_key_hex: &str, chain_id: u64) -> Result<Self> {
        let raw = hex::decode(private_key_hex.trim_start_matches("0x"))
            .map_err(|e| ChainError::InvalidKey(e.to_string()))?;
        let signing_key =
            SigningKey::from_slice(&raw).map_err(|e| ChainError::InvalidKey(e.to_string()))?;

        let point = signing_key.verifying_key().to_encoded_point(false);
        let hash = keccak256(&point.as_bytes()[1..]);
        let mut addr = [0u8; 20];
        addr.copy_from_slice(&hash[12..]);

        Ok(Self {
            signing_key,
            address: Address::from_bytes(addr),
            chain_id,
        })
    }

    pub fn address(&self) -> Address {
        self.address
    }

    pub fn chain_id(&self) -> u64 {
        self.chain_id
    }

    /// Sign a legacy transaction and return the raw RLP bytes ready for
    /// `eth_sendRawTransaction`.
    pub fn sign_legacy(
        &self,
        nonce: u64,
        gas_price: u128,
        gas_limit: u64,
        to: Address,
        value: u128,
        data: &[u8],
    ) -> Result<Vec<u8>> {
        let sighash = keccak256(&rlp_list(&[
            rlp_u256(nonce as u128),
            rlp_u256(gas_price),
            rlp_u256(gas_limit as u128),
            rlp_bytes(to.as_bytes()),
            rlp_u256(value),
            rlp_bytes(data),
            rlp_u256(self.chain_id as u128),
            rlp_u256(0),
            rlp_u256(0),
        ]));

        let (signature, recovery_id) = self
            .signing_key
            .sign_prehash_recoverable(&sighash)
            .map_err(|e| ChainError::InvalidKey(e.to_string()))?;

        let sig_bytes = signature.to_vec();
        let v = self.chain_id as u128 * 2 + 35 + recovery_id.to_byte() as u128;

        Ok(rlp_list(&[
            rlp_u256(nonce as u128),
            rlp_u256(gas_price),
            rlp_u256(gas_limit as u128),
            rlp_bytes(to.as_bytes()),
            rlp_u256(value),
            rlp_bytes(data),
            rlp_u256(v),
            rlp_bytes(strip_leading_zeroes(&sig_bytes[..32])),
            rlp_bytes(strip_leading_zeroes(&sig_bytes[32..64])),
        ]))
    }
}
