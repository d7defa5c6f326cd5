use crate::error::{AuthError, Result};
use crate::hashing::keccak256;
use crate::typed_data::{AuthorizationPayload, Eip712Domain};
use chrono::{DateTime, Duration, Utc};
use econos_types::{Address, AuthorizationRecord, TaskId};
use k256::ecdsa::{RecoveryId, Signature, SigningKey, VerifyingKey};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::RwLock;
use tracing::{debug, info};

#[derive(Debug, Clone)]
pub struct SignerConfig {
    /// Default authorization validity when the task deadline is further out.
    pub default_validity_secs: u64,
    /// Ledger entries older than this are reclaimed by pruning.
    pub nonce_retention_secs: u64,
}

impl Default for SignerConfig {
    fn default() -> Self {
        Self {
            default_validity_secs: 3_600,
            nonce_retention_secs: 86_400,
        }
    }
}

/// A signed authorization envelope: the payload, the 65-byte recoverable
/// signature, and the signer address the signature must recover to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedAuthorization {
    pub payload: AuthorizationPayload,
    /// 65 bytes (r || s || v) as 0x-hex, v is 27 or 28.
    pub signature: String,
    pub signer: Address,
}

impl SignedAuthorization {
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        (self.payload.expires_at as i64) < now.timestamp()
    }

    /// The triple persisted on the task record.
    pub fn to_record(&self) -> AuthorizationRecord {
        AuthorizationRecord {
            signature: self.signature.clone(),
            nonce: self.payload.nonce,
            expires_at: DateTime::from_timestamp(self.payload.expires_at as i64, 0)
                .unwrap_or_else(Utc::now),
        }
    }
}

/// Issues domain-separated task authorizations and owns the nonce ledger.
/// Nonces are unique per `(task_id, nonce)`; a second sign attempt on the
/// same pair is rejected.
pub struct AuthorizationSigner {
    signing_key: SigningKey,
    address: Address,
    domain: Eip712Domain,
    config: SignerConfig,
    next_nonce: AtomicU64,
    used_nonces: RwLock<HashMap<(TaskId, u64), DateTime<Utc>>>,
}

impl AuthorizationSigner {
    pub fn new(private_key_hex: &str, domain: Eip712Domain, config: SignerConfig) -> Result<Self> {
        let raw = hex::decode(private_key_hex.trim_start_matches("0x"))
            .map_err(|e| AuthError::InvalidKey(e.to_string()))?;
        let signing_key =
            SigningKey::from_slice(&raw).map_err(|e| AuthError::InvalidKey(e.to_string()))?;
        let address = address_of(signing_key.verifying_key());

        Ok(Self {
            signing_key,
            address,
            domain,
            config,
            next_nonce: AtomicU64::new(1),
            used_nonces: RwLock::new(HashMap::new()),
        })
    }

    pub fn address(&self) -> Address {
        self.address
    }

    pub fn domain(&self) -> &Eip712Domain {
        &self.domain
    }

    /// Build a payload for `(task_id, worker)` expiring after
    /// `validity_secs`, clamped so it never outlives the task deadline.
    pub fn generate(
        &self,
        task_id: TaskId,
        worker: Address,
        validity_secs: u64,
        deadline: Option<DateTime<Utc>>,
    ) -> Result<AuthorizationPayload> {
        let now = Utc::now();
        let mut expires_at = now + Duration::seconds(validity_secs.min(i64::MAX as u64) as i64);
        if let Some(deadline) = deadline {
            if deadline <= now {
                return Err(AuthError::EmptyValidityWindow);
            }
            expires_at = expires_at.min(deadline);
        }

        Ok(AuthorizationPayload {
            task_id,
            worker,
            expires_at: expires_at.timestamp() as u64,
            nonce: self.next_nonce.fetch_add(1, Ordering::SeqCst),
        })
    }

    /// Sign a payload, recording `(task_id, nonce)` in the ledger. Signing
    /// the same pair twice yields `NonceReused`.
    pub async fn sign(&self, payload: AuthorizationPayload) -> Result<SignedAuthorization> {
        let key = (payload.task_id, payload.nonce);
        {
            let mut used = self.used_nonces.write().await;
            if used.contains_key(&key) {
                return Err(AuthError::NonceReused {
                    task_id: payload.task_id.to_hex(),
                    nonce: payload.nonce,
                });
            }
            used.insert(key, Utc::now());
        }

        let digest = payload.signing_digest(&self.domain);
        let (signature, recovery_id) = self
            .signing_key
            .sign_prehash_recoverable(&digest)
            .map_err(|e| AuthError::SignatureInvalid(e.to_string()))?;

        let mut raw = [0u8; 65];
        raw[..64].copy_from_slice(&signature.to_vec());
        raw[64] = recovery_id.to_byte() + 27;

        info!(
            task_id = payload.task_id.short(),
            worker = %payload.worker,
            expires_at = payload.expires_at,
            nonce = payload.nonce,
            "🔏 Authorization signed"
        );

        Ok(SignedAuthorization {
            payload,
            signature: format!("0x{}", hex::encode(raw)),
            signer: self.address,
        })
    }

    /// Convenience: generate and sign in one step.
    pub async fn create_signed_authorization(
        &self,
        task_id: TaskId,
        worker: Address,
        validity_secs: u64,
        deadline: Option<DateTime<Utc>>,
    ) -> Result<SignedAuthorization> {
        let payload = self.generate(task_id, worker, validity_secs, deadline)?;
        self.sign(payload).await
    }

    /// True iff the signature recovers to `sa.signer` under this signer's
    /// domain. A signature minted under a different chain id or verifying
    /// contract recovers to a different address and fails here.
    pub fn verify(&self, sa: &SignedAuthorization) -> Result<bool> {
        let digest = sa.payload.signing_digest(&self.domain);
        let recovered = recover_signer(&digest, &sa.signature)?;
        Ok(recovered == sa.signer)
    }

    pub fn is_expired(&self, sa: &SignedAuthorization, now: DateTime<Utc>) -> bool {
        sa.is_expired(now)
    }

    pub async fn is_nonce_used(&self, task_id: TaskId, nonce: u64) -> bool {
        self.used_nonces.read().await.contains_key(&(task_id, nonce))
    }

    /// Drop ledger entries older than `max_age_secs` (defaults to the
    /// configured retention when `None`). Returns the number reclaimed.
    pub async fn prune_nonces_older_than(&self, max_age_secs: Option<u64>) -> usize {
        let age = max_age_secs.unwrap_or(self.config.nonce_retention_secs);
        let cutoff = Utc::now() - Duration::seconds(age.min(i64::MAX as u64) as i64);

        let mut used = self.used_nonces.write().await;
        let before = used.len();
        used.retain(|_, issued_at| *issued_at >= cutoff);
        let removed = before - used.len();

        if removed > 0 {
            debug!(removed, retained = used.len(), "Nonce ledger pruned");
        }
        removed
    }

    pub fn default_validity_secs(&self) -> u64 {
        self.config.default_validity_secs
    }
}

/// Recover the signer address from a 65-byte recoverable signature over
/// `digest`.
pub fn recover_signer(digest: &[u8; 32], signature_hex: &str) -> Result<Address> {
    let raw = hex::decode(signature_hex.trim_start_matches("0x"))
        .map_err(|e| AuthError::SignatureInvalid(e.to_string()))?;
    if raw.len() != 65 {
        return Err(AuthError::SignatureInvalid(format!(
            "expected 65 bytes, got {}",
            raw.len()
        )));
    }

    let signature = Signature::from_slice(&raw[..64])
        .map_err(|e| AuthError::SignatureInvalid(e.to_string()))?;
    let v = raw[64];
    let recovery_id = RecoveryId::from_byte(v.wrapping_sub(27))
        .ok_or_else(|| AuthError::SignatureInvalid(format!("bad recovery byte {}", v)))?;

    let verifying_key = VerifyingKey::recover_from_prehash(digest, &signature, recovery_id)
        .map_err(|e| AuthError::SignatureInvalid(e.to_string()))?;
    Ok(address_of(&verifying_key))
}

fn address_of(key: &VerifyingKey) -> Address {
    let point = key.to_encoded_point(false);
    let hash = keccak256(&point.as_bytes()[1..]);
    let mut addr = [0u8; 20];
    addr.copy_from_slice(&hash[12..]);
    Address::from_bytes(addr)
}

#[cfg(test)]
mod tests {
    use super::*;

    const TEST_KEY: &str = "4c0883a69102937d6231471b5dbb6204fe5129617082792ae468d01a3f362318";

    fn signer_on(chain_id: u64) -> AuthorizationSigner {
        AuthorizationSigner::new(
            TEST_KEY,
            Eip712Domain::econos_master(chain_id, Some(Address::from_bytes([0xaa; 20]))),
            SignerConfig::default(),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_sign_and_verify() {
        let signer = signer_on(240);
        let sa = signer
            .create_signed_authorization(
                TaskId::from_bytes([1u8; 32]),
                Address::from_bytes([2u8; 20]),
                600,
                None,
            )
            .await
            .unwrap();

        assert_eq!(sa.signer, signer.address());
        assert!(signer.verify(&sa).unwrap());
    }

    #[tokio::test]
    async fn test_nonce_replay_rejected() {
        let signer = signer_on(240);
        let payload = AuthorizationPayload {
            task_id: TaskId::from_bytes([1u8; 32]),
            worker: Address::from_bytes([0xbb; 20]),
            expires_at: Utc::now().timestamp() as u64 + 600,
            nonce: 7,
        };

        signer.sign(payload).await.unwrap();
        let err = signer.sign(payload).await.unwrap_err();
        assert!(matches!(err, AuthError::NonceReused { nonce: 7, .. }));
        assert!(signer.is_nonce_used(payload.task_id, 7).await);
    }

    #[tokio::test]
    async fn test_cross_chain_replay_fails_verification() {
        let signer_240 = signer_on(240);
        let signer_241 = signer_on(241);

        let sa = signer_240
            .create_signed_authorization(
                TaskId::from_bytes([3u8; 32]),
                Address::from_bytes([4u8; 20]),
                600,
                None,
            )
            .await
            .unwrap();

        assert!(signer_240.verify(&sa).unwrap());
        assert!(!signer_241.verify(&sa).unwrap());
    }

    #[tokio::test]
    async fn test_cross_contract_replay_fails_verification() {
        let a = AuthorizationSigner::new(
            TEST_KEY,
            Eip712Domain::econos_master(240, Some(Address::from_bytes([0x01; 20]))),
            SignerConfig::default(),
        )
        .unwrap();
        let b = AuthorizationSigner::new(
            TEST_KEY,
            Eip712Domain::econos_master(240, Some(Address::from_bytes([0x02; 20]))),
            SignerConfig::default(),
        )
        .unwrap();

        let sa = a
            .create_signed_authorization(
                TaskId::from_bytes([5u8; 32]),
                Address::from_bytes([6u8; 20]),
                600,
                None,
            )
            .await
            .unwrap();

        assert!(!b.verify(&sa).unwrap());
    }

    #[tokio::test]
    async fn test_serialize_round_trip_is_identity() {
        let signer = signer_on(240);
        let sa = signer
            .create_signed_authorization(
                TaskId::from_bytes([7u8; 32]),
                Address::from_bytes([8u8; 20]),
                600,
                None,
            )
            .await
            .unwrap();

        let json = sa.to_json().unwrap();
        let back = SignedAuthorization::from_json(&json).unwrap();
        assert_eq!(back, sa);
        assert!(signer.verify(&back).unwrap());
    }

    #[tokio::test]
    async fn test_expiry_clamped_to_deadline() {
        let signer = signer_on(240);
        let deadline = Utc::now() + Duration::seconds(120);
        let payload = signer
            .generate(
                TaskId::from_bytes([9u8; 32]),
                Address::from_bytes([1u8; 20]),
                3_600,
                Some(deadline),
            )
            .unwrap();

        assert!(payload.expires_at as i64 <= deadline.timestamp());
    }

    #[tokio::test]
    async fn test_generate_rejects_past_deadline() {
        let signer = signer_on(240);
        let err = signer
            .generate(
                TaskId::from_bytes([9u8; 32]),
                Address::from_bytes([1u8; 20]),
                3_600,
                Some(Utc::now() - Duration::seconds(5)),
            )
            .unwrap_err();
        assert!(matches!(err, AuthError::EmptyValidityWindow));
    }

    #[tokio::test]
    async fn test_prune_reclaims_old_entries() {
        let signer = signer_on(240);
        let payload = AuthorizationPayload {
            task_id: TaskId::from_bytes([2u8; 32]),
            worker: Address::from_bytes([3u8; 20]),
            expires_at: Utc::now().timestamp() as u64 + 600,
            nonce: 42,
        };
        signer.sign(payload).await.unwrap();

        // Entries younger than the cutoff survive.
        assert_eq!(signer.prune_nonces_older_than(Some(3_600)).await, 0);
        assert!(signer.is_nonce_used(payload.task_id, 42).await);

        // A zero-age prune reclaims everything.
        assert_eq!(signer.prune_nonces_older_than(Some(0)).await, 1);
        assert!(!signer.is_nonce_used(payload.task_id, 42).await);
    }

    #[tokio::test]
    async fn test_tampered_payload_fails_verification() {
        let signer = signer_on(240);
        let mut sa = signer
            .create_signed_authorization(
                TaskId::from_bytes([1u8; 32]),
                Address::from_bytes([2u8; 20]),
                600,
                None,
            )
            .await
            .unwrap();

        sa.payload.worker = Address::from_bytes([0xee; 20]);
        assert!(!signer.verify(&sa).unwrap());
    }
}
