//! Typed read/write access to the Econos escrow and registry contracts.
//!
//! Reads go through JSON-RPC `eth_call`; writes are legacy EIP-155
//! transactions signed with the master's key and gated on a configurable
//! confirmation depth. Contract events are polled from `eth_getLogs` and
//! fanned out on a broadcast channel in chain order.

pub mod abi;
pub mod error;
pub mod events;
pub mod gateway;
pub mod rlp;
pub mod rpc;
pub mod rpc_gateway;
pub mod test_helpers;
pub mod wallet;

pub use error::{ChainError, Result};
pub use events::ChainEvent;
pub use gateway::{ChainGateway, OnChainTask, TxReceipt};
pub use rpc_gateway::{RpcChainGateway, RpcGatewayConfig};
