//! EIP-712 style typed-data encoding for task authorizations.

use crate::hashing::{keccak256, keccak256_concat, pad32, u256_word};
use econos_types::{Address, TaskId};
use serde::{Deserialize, Serialize};

const DOMAIN_TYPE_WITH_CONTRACT: &[u8] =
    b"EIP712Domain(string name,string version,uint256 chainId,address verifyingContract)";
const DOMAIN_TYPE_WITHOUT_CONTRACT: &[u8] =
    b"EIP712Domain(string name,string version,uint256 chainId)";
const AUTHORIZATION_TYPE: &[u8] =
    b"TaskAuthorization(bytes32 taskId,address worker,uint256 expiresAt,uint256 nonce)";

/// Signing domain. Signatures bind to `(name, version, chain_id,
/// verifying_contract)`; changing any field invalidates every signature
/// produced under the old domain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Eip712Domain {
    pub name: String,
    pub version: String,
    pub chain_id: u64,
    pub verifying_contract: Option<Address>,
}

impl Eip712Domain {
    pub fn econos_master(chain_id: u64, verifying_contract: Option<Address>) -> Self {
        Self {
            name: "Econos Master Agent".to_string(),
            version: "1".to_string(),
            chain_id,
            verifying_contract,
        }
    }

    pub fn separator(&self) -> [u8; 32] {
        let chain_word = u256_word(self.chain_id as u128);
        match self.verifying_contract {
            Some(contract) => keccak256_concat(&[
                &keccak256(DOMAIN_TYPE_WITH_CONTRACT),
                &keccak256(self.name.as_bytes()),
                &keccak256(self.version.as_bytes()),
                &chain_word,
                &pad32(contract.as_bytes()),
            ]),
            None => keccak256_concat(&[
                &keccak256(DOMAIN_TYPE_WITHOUT_CONTRACT),
                &keccak256(self.name.as_bytes()),
                &keccak256(self.version.as_bytes()),
                &chain_word,
            ]),
        }
    }
}

/// The message the master signs: one task, one worker, one expiry, one nonce.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthorizationPayload {
    pub task_id: TaskId,
    pub worker: Address,
    /// Absolute Unix seconds.
    pub expires_at: u64,
    pub nonce: u64,
}

impl AuthorizationPayload {
    pub fn struct_hash(&self) -> [u8; 32] {
        keccak256_concat(&[
            &keccak256(AUTHORIZATION_TYPE),
            self.task_id.as_bytes(),
            &pad32(self.worker.as_bytes()),
            &u256_word(self.expires_at as u128),
            &u256_word(self.nonce as u128),
        ])
    }

    /// Final digest: `keccak256(0x1901 || domainSeparator || structHash)`.
    pub fn signing_digest(&self, domain: &Eip712Domain) -> [u8; 32] {
        keccak256_concat(&[&[0x19, 0x01], &domain.separator(), &self.struct_hash()])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn payload() -> AuthorizationPayload {
        AuthorizationPayload {
            task_id: TaskId::from_bytes([1u8; 32]),
            worker: Address::from_bytes([2u8; 20]),
            expires_at: 1_900_000_000,
            nonce: 7,
        }
    }

    #[test]
    fn test_digest_is_deterministic() {
        let domain = Eip712Domain::econos_master(240, None);
        assert_eq!(payload().signing_digest(&domain), payload().signing_digest(&domain));
    }

    #[test]
    fn test_chain_id_changes_digest() {
        let a = Eip712Domain::econos_master(240, None);
        let b = Eip712Domain::econos_master(241, None);
        assert_ne!(payload().signing_digest(&a), payload().signing_digest(&b));
    }

    #[test]
    fn test_verifying_contract_changes_digest() {
        let a = Eip712Domain::econos_master(240, Some(Address::from_bytes([9u8; 20])));
        let b = Eip712Domain::econos_master(240, Some(Address::from_bytes([8u8; 20])));
        let c = Eip712Domain::econos_master(240, None);
        let digests = [
            payload().signing_digest(&a),
            payload().signing_digest(&b),
            payload().signing_digest(&c),
        ];
        assert_ne!(digests[0], digests[1]);
        assert_ne!(digests[0], digests[2]);
    }

    #[test]
    fn test_every_payload_field_is_bound() {
        let domain = Eip712Domain::econos_master(240, None);
        let base = payload().signing_digest(&domain);

        let mut p = payload();
        p.nonce = 8;
        assert_ne!(p.signing_digest(&domain), base);

        let mut p = payload();
        p.expires_at += 1;
        assert_ne!(p.signing_digest(&domain), base);

        let mut p = payload();
        p.worker = Address::from_bytes([3u8; 20]);
        assert_ne!(p.signing_digest(&domain), base);

        let mut p = payload();
        p.task_id = TaskId::from_bytes([4u8; 32]);
        assert_ne!(p.signing_digest(&domain), base);
    }
}
