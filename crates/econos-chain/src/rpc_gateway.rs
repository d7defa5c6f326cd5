//! Production chain gateway over JSON-RPC.

use crate::abi::{
    calldata, encode_address, encode_bytes32, encode_u256, word_at, word_to_address, word_to_u64,
    word_to_wei,
};
use crate::error::{ChainError, Result};
use crate::events::{decode_log, ChainEvent, RawLog};
use crate::gateway::{ChainGateway, OnChainTask, TxReceipt};
use crate::rpc::{parse_data, parse_quantity, JsonRpcClient};
use crate::wallet::TxSigner;
use async_trait::async_trait;
use econos_types::{Address, Bytes32, Wei};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

const EVENT_CHANNEL_CAPACITY: usize = 1_024;
const RECEIPT_POLL_INTERVAL: Duration = Duration::from_secs(2);
const RECEIPT_POLL_ATTEMPTS: u32 = 90;

#[derive(Debug, Clone)]
pub struct RpcGatewayConfig {
    pub rpc_url: String,
    pub chain_id: u64,
    pub escrow_address: Address,
    pub registry_address: Address,
    /// Receipt depth required before a write is reported successful.
    pub block_confirmations: u64,
    pub gas_limit: u64,
    pub event_poll_interval_secs: u64,
}

impl Default for RpcGatewayConfig {
    fn default() -> Self {
        Self {
            rpc_url: "http://127.0.0.1:8545".to_string(),
            chain_id: 240,
            escrow_address: Address::ZERO,
            registry_address: Address::ZERO,
            block_confirmations: 2,
            gas_limit: 400_000,
            event_poll_interval_secs: 5,
        }
    }
}

/// JSON-RPC chain gateway. All writes funnel through one wallet whose
/// nonce is serialized behind a mutex; reads go straight to `eth_call`.
pub struct RpcChainGateway {
    rpc: JsonRpcClient,
    signer: TxSigner,
    config: RpcGatewayConfig,
    events_tx: broadcast::Sender<ChainEvent>,
    wallet_nonce: Mutex<Option<u64>>,
}

impl RpcChainGateway {
    pub fn new(master_private_key: &str, config: RpcGatewayConfig) -> Result<Self> {
        let signer = TxSigner::new(master_private_key, config.chain_id)?;
        let (events_tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);

        Ok(Self {
            rpc: JsonRpcClient::new(config.rpc_url.clone()),
            signer,
            config,
            events_tx,
            wallet_nonce: Mutex::new(None),
        })
    }

    pub fn master_address(&self) -> Address {
        self.signer.address()
    }

    async fn eth_call(&self, to: Address, data: Vec<u8>) -> Result<Vec<u8>> {
        let result: String = self
            .rpc
            .call(
                "eth_call",
                json!([{ "to": to.to_hex(), "data": format!("0x{}", hex::encode(data)) }, "latest"]),
            )
            .await?;
        parse_data(&result)
    }

    async fn latest_block(&self) -> Result<u64> {
        let result: String = self.rpc.call("eth_blockNumber", json!([])).await?;
        Ok(parse_quantity(&result)? as u64)
    }

    /// Sign and submit a write. The nonce cache stays locked for the whole
    /// build-and-send so concurrent writes cannot race the wallet nonce.
    async fn send_write(&self, data: Vec<u8>, value: Wei) -> Result<Bytes32> {
        let mut nonce_slot = self.wallet_nonce.lock().await;

        let nonce = match *nonce_slot {
            Some(n) => n,
            None => {
                let result: String = self
                    .rpc
                    .call(
                        "eth_getTransactionCount",
                        json!([self.signer.address().to_hex(), "pending"]),
                    )
                    .await?;
                parse_quantity(&result)? as u64
            }
        };

        let gas_price_hex: String = self.rpc.call("eth_gasPrice", json!([])).await?;
        let gas_price = parse_quantity(&gas_price_hex)?;

        let raw = self.signer.sign_legacy(
            nonce,
            gas_price,
            self.config.gas_limit,
            self.config.escrow_address,
            value.as_u128(),
            &data,
        )?;

        let sent = self
            .rpc
            .call::<String>(
                "eth_sendRawTransaction",
                json!([format!("0x{}", hex::encode(raw))]),
            )
            .await;

        match sent {
            Ok(tx_hash) => {
                *nonce_slot = Some(nonce + 1);
                Bytes32::from_hex(&tx_hash).map_err(|e| ChainError::Decode(e.to_string()))
            }
            Err(e) => {
                // Nonce state is unknown after a failed submit; refetch next time.
                *nonce_slot = None;
                Err(e)
            }
        }
    }

    /// Poll until the receipt is `block_confirmations` deep. A mined but
    /// shallow receipt at the polling deadline surfaces as
    /// `InsufficientConfirmations`; a reverted receipt as `TxReverted`.
    async fn wait_for_confirmations(&self, tx_hash: Bytes32) -> Result<TxReceipt> {
        let mut seen_depth: Option<u64> = None;

        for _ in 0..RECEIPT_POLL_ATTEMPTS {
            let receipt: Option<RawReceipt> = self
                .rpc
                .call("eth_getTransactionReceipt", json!([tx_hash.to_hex()]))
                .await?;

            if let Some(receipt) = receipt {
                if parse_quantity(&receipt.status)? != 1 {
                    return Err(ChainError::TxReverted(tx_hash.to_hex()));
                }

                let block_number = parse_quantity(&receipt.block_number)? as u64;
                let latest = self.latest_block().await?;
                let confirmations = confirmation_depth(latest, block_number);
                seen_depth = Some(confirmations);

                if confirmations >= self.config.block_confirmations {
                    return Ok(TxReceipt {
                        tx_hash,
                        block_number,
                        success: true,
                        confirmations,
                    });
                }
                debug!(
                    tx_hash = tx_hash.short(),
                    confirmations,
                    required = self.config.block_confirmations,
                    "⏳ Awaiting confirmations"
                );
            }

            tokio::time::sleep(RECEIPT_POLL_INTERVAL).await;
        }

        match seen_depth {
            Some(actual) => Err(ChainError::InsufficientConfirmations {
                required: self.config.block_confirmations,
                actual,
            }),
            None => Err(ChainError::ChainUnavailable(format!(
                "receipt for {} never appeared",
                tx_hash
            ))),
        }
    }

    /// Spawn the `eth_getLogs` poller feeding the broadcast channel,
    /// resuming from `from_block`. RPC hiccups are logged and retried on
    /// the next tick; the cursor only advances past fetched ranges.
    pub fn start_event_stream(self: &Arc<Self>, from_block: u64) -> JoinHandle<()> {
        let gateway = Arc::clone(self);
        tokio::spawn(async move {
            let mut cursor = from_block;
            let mut ticker =
                tokio::time::interval(Duration::from_secs(gateway.config.event_poll_interval_secs));
            info!(from_block, "📡 Escrow event stream started");

            loop {
                ticker.tick().await;

                let latest = match gateway.latest_block().await {
                    Ok(b) => b,
                    Err(e) => {
                        warn!(error = %e, "⚠️ Block height fetch failed");
                        continue;
                    }
                };
                if latest < cursor {
                    continue;
                }

                let logs: Vec<RawLog> = match gateway
                    .rpc
                    .call(
                        "eth_getLogs",
                        json!([{
                            "address": gateway.config.escrow_address.to_hex(),
                            "fromBlock": format!("0x{:x}", cursor),
                            "toBlock": format!("0x{:x}", latest),
                        }]),
                    )
                    .await
                {
                    Ok(logs) => logs,
                    Err(e) => {
                        warn!(error = %e, cursor, "⚠️ Log fetch failed, will retry");
                        continue;
                    }
                };

                let mut events: Vec<ChainEvent> = Vec::new();
                for log in &logs {
                    match decode_log(log) {
                        Ok(Some(event)) => events.push(event),
                        Ok(None) => {}
                        Err(e) => warn!(error = %e, "⚠️ Undecodable escrow log skipped"),
                    }
                }
                events.sort_by_key(|e| e.ordering_key());

                for event in events {
                    // Send fails only when nobody is subscribed; that is fine.
                    let _ = gateway.events_tx.send(event);
                }

                cursor = latest + 1;
            }
        })
    }
}

#[derive(Debug, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawReceipt {
    status: String,
    block_number: String,
}

/// Confirmation depth of a receipt mined at `block_number` when the chain
/// head is `latest`. The mined block itself counts as one confirmation.
pub fn confirmation_depth(latest: u64, block_number: u64) -> u64 {
    latest.saturating_sub(block_number) + 1
}

#[async_trait]
impl ChainGateway for RpcChainGateway {
    async fn get_task(&self, task_id: Bytes32) -> Result<Option<OnChainTask>> {
        let data = calldata("tasks(bytes32)", &[encode_bytes32(task_id.as_bytes())]);
        let ret = self.eth_call(self.config.escrow_address, data).await?;

        let master = word_to_address(&word_at(&ret, 0)?);
        if master.is_zero() {
            return Ok(None);
        }

        Ok(Some(OnChainTask {
            master,
            worker: word_to_address(&word_at(&ret, 1)?),
            amount: word_to_wei(&word_at(&ret, 2)?)?,
            deadline: word_to_u64(&word_at(&ret, 3)?)?,
            status: word_at(&ret, 4)?[31],
        }))
    }

    async fn deposit_task(
        &self,
        task_id: Bytes32,
        worker: Address,
        duration_secs: u64,
        amount: Wei,
    ) -> Result<TxReceipt> {
        if self.get_task(task_id).await?.is_some() {
            return Err(ChainError::TaskAlreadyDeposited(task_id.to_hex()));
        }

        let data = calldata(
            "depositTask(bytes32,address,uint256)",
            &[
                encode_bytes32(task_id.as_bytes()),
                encode_address(worker),
                encode_u256(duration_secs as u128),
            ],
        );

        let tx_hash = self.send_write(data, amount).await?;
        let receipt = self.wait_for_confirmations(tx_hash).await?;

        info!(
            task_id = task_id.short(),
            worker = %worker,
            amount_wei = %amount,
            duration_secs,
            tx_hash = tx_hash.short(),
            confirmations = receipt.confirmations,
            "💰 Escrow deposited"
        );
        Ok(receipt)
    }

    async fn refund_and_slash(&self, task_id: Bytes32) -> Result<TxReceipt> {
        let data = calldata("refundAndSlash(bytes32)", &[encode_bytes32(task_id.as_bytes())]);
        let tx_hash = self.send_write(data, Wei::ZERO).await?;
        let receipt = self.wait_for_confirmations(tx_hash).await?;

        info!(
            task_id = task_id.short(),
            tx_hash = tx_hash.short(),
            "⚔️ Escrow refunded, worker slashed"
        );
        Ok(receipt)
    }

    async fn is_worker_active(&self, worker: Address) -> Result<bool> {
        let data = calldata("isWorkerActive(address)", &[encode_address(worker)]);
        let ret = self.eth_call(self.config.registry_address, data).await?;
        Ok(crate::abi::word_to_bool(&word_at(&ret, 0)?))
    }

    async fn worker_reputation(&self, worker: Address) -> Result<u8> {
        let data = calldata("reputation(address)", &[encode_address(worker)]);
        let ret = self.eth_call(self.config.registry_address, data).await?;
        let score = crate::abi::word_to_u128(&word_at(&ret, 0)?)?;
        Ok(score.min(100) as u8)
    }

    fn subscribe(&self) -> broadcast::Receiver<ChainEvent> {
        self.events_tx.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_confirmation_boundary_is_inclusive() {
        // Mined at block 10, required depth 2: head 11 is exactly enough,
        // head 10 is one short.
        let required = 2u64;
        assert!(confirmation_depth(11, 10) >= required);
        assert!(confirmation_depth(10, 10) < required);
        assert_eq!(confirmation_depth(10, 10), 1);
    }

    #[test]
    fn test_confirmation_depth_saturates_on_reorg_window() {
        assert_eq!(confirmation_depth(5, 10), 1);
    }
}
