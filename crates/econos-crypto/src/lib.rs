//! Typed-data authorization signing for the Econos master.
//!
//! The master authorizes exactly one worker to execute exactly one task
//! before a deadline by signing a domain-separated typed-data message.
//! Domain separation (chain id + verifying contract) prevents cross-chain
//! and cross-app replay; the nonce ledger prevents same-domain replay.

pub mod error;
pub mod hashing;
pub mod signer;
pub mod typed_data;

pub use error::{AuthError, Result};
pub use hashing::{eth_signed_message_hash, keccak256};
pub use signer::{AuthorizationSigner, SignedAuthorization, SignerConfig};
pub use typed_data::{AuthorizationPayload, Eip712Domain};
