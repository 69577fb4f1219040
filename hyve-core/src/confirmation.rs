//! The Confirmation Tracker (spec §4.4): fork detection/replay and
//! maturity promotion.

use std::sync::Arc;

use hyve_rpc::{ExplorerClient, NodeClient};
use hyve_types::sse::{AddrHistResult, BlockSseEvent, BlockSseResult, UserAddrHistResult};
use hyve_types::{EventKind, MATURITY};
use tracing::{info, warn};

use crate::error::IndexerError;
use crate::events::EventBus;
use crate::ingestion::Poller;
use crate::metrics;
use crate::registry::AddressRegistry;
use crate::store::Store;

pub struct ConfirmationTracker {
    store: Arc<dyn Store>,
    node: Arc<dyn NodeClient>,
    explorer: Arc<dyn ExplorerClient>,
    registry: Arc<AddressRegistry>,
    events: Arc<EventBus>,
    poller: Arc<Poller>,
}

impl ConfirmationTracker {
    pub fn new(
        store: Arc<dyn Store>,
        node: Arc<dyn NodeClient>,
        explorer: Arc<dyn ExplorerClient>,
        registry: Arc<AddressRegistry>,
        events: Arc<EventBus>,
        poller: Arc<Poller>,
    ) -> Self {
        Self {
            store,
            node,
            explorer,
            registry,
            events,
            poller,
        }
    }

    /// Walks stored blocks in ascending height order applying spec §4.4's
    /// per-block rules. Runs after every ingestion pass that produced at
    /// least one block.
    pub async fn sweep(&self) -> Result<(), IndexerError> {
        for block in self.store.blocks_ascending().await? {
            let node_hash = self.node.get_block_hash(block.height).await?;

            if node_hash != block.hash {
                warn!(height = block.height, stored = %block.hash, actual = %node_hash, "fork detected");
                metrics::FORKS_DETECTED.inc();
                self.restore_snapshots_for_fork(block.id).await?;
                self.store.delete_block(block.id).await?;
                // chainHeight = −1 per spec §4.4 step 1: replays never write a Stat snapshot.
                self.poller.make_block(block.height, u64::MAX, Some(node_hash)).await?;
                continue;
            }

            let header = self.node.get_block_header(&block.hash).await?;
            let history_count = self.store.history_count(block.id).await?;

            if header.confirmations < MATURITY {
                continue;
            }

            if header.confirmations > MATURITY || history_count == 0 {
                self.store.delete_block(block.id).await?;
                metrics::BLOCKS_GARBAGE_COLLECTED.inc();
                continue;
            }

            self.mature_block(&block).await?;
        }
        Ok(())
    }

    /// Fork handler step 1: restores each affected subscription's
    /// `(block_t, block_c)` from its UserAddrHist snapshot before the
    /// block (and its histories) are discarded.
    async fn restore_snapshots_for_fork(&self, block_id: i64) -> Result<(), IndexerError> {
        for hist in self.store.addr_hist_for_block(block_id).await? {
            for snapshot in self.store.user_addr_hist_for_addr_hist(hist.id).await? {
                if let Some(mut subscription) = self.store.get_user_addr(snapshot.user_addr_id).await? {
                    subscription.restore_snapshot(snapshot.block_t, snapshot.block_c);
                    self.store.update_subscription(&subscription).await?;
                }
            }
        }
        Ok(())
    }

    /// Spec §4.4 step 5: rotates each history row's `info_new`, then
    /// posts the `block/mature` event once for the whole block.
    async fn mature_block(&self, block: &hyve_types::Block) -> Result<(), IndexerError> {
        self.store.set_block_conf(block.id, MATURITY).await?;

        let mut hist_results = Vec::new();
        for hist in self.store.addr_hist_for_block(block.id).await? {
            let Some(address) = self.store.get_address_by_id(hist.addr_id).await? else {
                continue;
            };

            let changed = self
                .registry
                .update_info(&*self.store, &*self.explorer, &address, block.height)
                .await?;
            let refreshed = if changed {
                self.store
                    .get_address_by_id(address.id)
                    .await?
                    .map(|a| a.info)
                    .unwrap_or_else(|| hist.info_new.clone())
            } else {
                hist.info_new.clone()
            };

            self.store.update_addr_hist_info_new(hist.id, refreshed.clone()).await?;

            let mut subscribers = Vec::new();
            for snapshot in self.store.user_addr_hist_for_addr_hist(hist.id).await? {
                let name = self
                    .store
                    .get_user_addr(snapshot.user_addr_id)
                    .await?
                    .map(|ua| ua.name)
                    .unwrap_or_default();
                subscribers.push(UserAddrHistResult {
                    user_addr_id: snapshot.user_addr_id,
                    name,
                    block_t: snapshot.block_t,
                    block_c: snapshot.block_c,
                });
            }

            hist_results.push(AddrHistResult {
                address: address.clone(),
                info_old: hist.info_new.clone(),
                info_new: refreshed,
                mined: block.miner_is(&address.hy),
                subscribers,
            });
        }

        metrics::BLOCKS_MATURED.inc();

        let sse_result = BlockSseResult {
            id: block.id,
            event: BlockSseEvent::Mature,
            height: block.height,
            hash: block.hash.clone(),
            info: block.info.clone(),
            hist: hist_results,
        };
        self.events
            .append(EventKind::Block, serde_json::to_value(&sse_result).expect("BlockSseResult serialises"))
            .await?;
        metrics::EVENTS_APPENDED.inc();
        info!(height = block.height, "block matured");
        Ok(())
    }
}
