//! Escrow contract event decoding.

use crate::abi::{word_at, word_to_address, word_to_wei};
use crate::error::{ChainError, Result};
use crate::rpc::{parse_data, parse_quantity};
use econos_crypto::keccak256;
use econos_types::{Address, Bytes32, Wei};
use serde::Deserialize;

/// Raw log entry as returned by `eth_getLogs`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawLog {
    pub address: String,
    pub topics: Vec<String>,
    pub data: String,
    pub block_number: String,
    pub log_index: String,
    pub transaction_hash: String,
}

/// Decoded escrow lifecycle events, delivered in chain order per task.
#[derive(Debug, Clone)]
pub enum ChainEvent {
    TaskCreated {
        task_id: Bytes32,
        master: Address,
        worker: Address,
        amount: Wei,
        block_number: u64,
        log_index: u64,
    },
    TaskCompleted {
        task_id: Bytes32,
        result_hash: Bytes32,
        block_number: u64,
        log_index: u64,
    },
    TaskRefunded {
        task_id: Bytes32,
        block_number: u64,
        log_index: u64,
    },
}

impl ChainEvent {
    pub fn task_id(&self) -> Bytes32 {
        match self {
            ChainEvent::TaskCreated { task_id, .. } => *task_id,
            ChainEvent::TaskCompleted { task_id, .. } => *task_id,
            ChainEvent::TaskRefunded { task_id, .. } => *task_id,
        }
    }

    /// Sort key preserving chain order: (block number, log index).
    pub fn ordering_key(&self) -> (u64, u64) {
        match self {
            ChainEvent::TaskCreated { block_number, log_index, .. }
            | ChainEvent::TaskCompleted { block_number, log_index, .. }
            | ChainEvent::TaskRefunded { block_number, log_index, .. } => {
                (*block_number, *log_index)
            }
        }
    }

    pub fn block_number(&self) -> u64 {
        self.ordering_key().0
    }
}

pub fn task_created_topic() -> Bytes32 {
    Bytes32::from_bytes(keccak256(b"TaskCreated(bytes32,address,address,uint256)"))
}

pub fn task_completed_topic() -> Bytes32 {
    Bytes32::from_bytes(keccak256(b"TaskCompleted(bytes32,bytes)"))
}

pub fn task_refunded_topic() -> Bytes32 {
    Bytes32::from_bytes(keccak256(b"TaskRefunded(bytes32)"))
}

/// Decode a raw log into a `ChainEvent`. Logs with an unknown topic decode
/// to `None` so foreign events on the same contract are skipped silently.
pub fn decode_log(log: &RawLog) -> Result<Option<ChainEvent>> {
    let topic0 = match log.topics.first() {
        Some(t) => Bytes32::from_hex(t).map_err(|e| ChainError::Decode(e.to_string()))?,
        None => return Ok(None),
    };

    let task_id = match log.topics.get(1) {
        Some(t) => Bytes32::from_hex(t).map_err(|e| ChainError::Decode(e.to_string()))?,
        None => return Ok(None),
    };

    let block_number = parse_quantity(&log.block_number)? as u64;
    let log_index = parse_quantity(&log.log_index)? as u64;
    let data = parse_data(&log.data)?;

    if topic0 == task_created_topic() {
        let master = word_to_address(&word_at(&data, 0)?);
        let worker = word_to_address(&word_at(&data, 1)?);
        let amount = word_to_wei(&word_at(&data, 2)?)?;
        return Ok(Some(ChainEvent::TaskCreated {
            task_id,
            master,
            worker,
            amount,
            block_number,
            log_index,
        }));
    }

    if topic0 == task_completed_topic() {
        let result_hash = decode_result_bytes(&data)?;
        return Ok(Some(ChainEvent::TaskCompleted {
            task_id,
            result_hash,
            block_number,
            log_index,
        }));
    }

    if topic0 == task_refunded_topic() {
        return Ok(Some(ChainEvent::TaskRefunded {
            task_id,
            block_number,
            log_index,
        }));
    }

    Ok(None)
}

/// The `bytes result` payload is ABI-encoded dynamic bytes carrying the
/// 32-byte result hash the worker submitted.
fn decode_result_bytes(data: &[u8]) -> Result<Bytes32> {
    let offset = crate::abi::word_to_u128(&word_at(data, 0)?)? as usize;
    let len_word = word_at(data, offset / 32)?;
    let len = crate::abi::word_to_u128(&len_word)? as usize;

    let start = offset + 32;
    if data.len() < start + len {
        return Err(ChainError::Decode("result bytes truncated".to_string()));
    }

    let mut hash = [0u8; 32];
    let take = len.min(32);
    hash[..take].copy_from_slice(&data[start..start + take]);
    Ok(Bytes32::from_bytes(hash))
}
