// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.
//
// Copyright (c) DUSK NETWORK. All rights reserved.

mod client;
pub mod conf;
mod error;
mod fsm;
mod translator;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
pub use client::{HttpLedgerClient, LedgerClient};
pub use error::{FetchError, SyncError};
pub use fsm::{Outcome, State, Syncer};
use node_data::ledger::Height;
use node_data::message::AsyncQueue;
use tokio::sync::RwLock;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};
pub use translator::Translator;

use crate::{database, LongLivedService};

const MIN_REPOLL_INTERVAL: Duration = Duration::from_millis(10);

/// Keeps the store in step with the chain.
///
/// Reacts to heights delivered by the notifier and periodically retries
/// a range left behind by a stalled sync.
pub struct ChainSrv<C: LedgerClient, DB: database::Gateway> {
    params: conf::Params,
    /// Inbound chain heights
    heights: AsyncQueue<Height>,
    client: Option<C>,
    syncer: Option<Syncer<C, DB>>,
    shutdown: CancellationToken,
}

impl<C: LedgerClient, DB: database::Gateway> ChainSrv<C, DB> {
    pub fn new(
        params: conf::Params,
        client: C,
        heights: AsyncQueue<Height>,
        shutdown: CancellationToken,
    ) -> Self {
        info!("ChainSrv::new with conf {params}");
        Self {
            params,
            heights,
            client: Some(client),
            syncer: None,
            shutdown,
        }
    }
}

#[async_trait]
impl<C: LedgerClient, DB: database::Gateway> LongLivedService<DB>
    for ChainSrv<C, DB>
{
    async fn initialize(&mut self, db: Arc<RwLock<DB>>) -> anyhow::Result<()> {
        let client = self
            .client
            .take()
            .ok_or_else(|| anyhow::anyhow!("chain service initialized twice"))?;

        let mut syncer =
            Syncer::new(client, db, self.params.clone(), self.shutdown.clone());
        syncer.init().await?;

        self.syncer = Some(syncer);
        Ok(())
    }

    async fn execute(&mut self, _db: Arc<RwLock<DB>>) -> anyhow::Result<usize> {
        let syncer = self.syncer.as_mut().expect("initialize is called");

        let period = self.params.repoll_interval.max(MIN_REPOLL_INTERVAL);
        let mut repoll = interval_at(Instant::now() + period, period);
        repoll.set_missed_tick_behavior(MissedTickBehavior::Delay);

        // Message loop for the sync context
        loop {
            let res = tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => break,
                recv = self.heights.recv() => {
                    let Ok(height) = recv else {
                        info!(event = "height queue closed");
                        break;
                    };
                    debug!(event = "height notified", height);
                    syncer.on_notification(height).await
                }
                _ = repoll.tick() => syncer.on_repoll().await,
            };

            match res {
                Ok(Outcome::Synced(height)) => {
                    info!(event = "synced", height);
                }
                Ok(_) => {}
                Err(SyncError::Interrupted) => break,
                Err(err) => {
                    error!(event = "sync stalled", %err);
                }
            }
        }

        info!(
            event = "chain syncer stopped",
            last_synced = syncer.last_synced()
        );
        Ok(0)
    }

    /// Returns service name.
    fn name(&self) -> &'static str {
        "chain"
    }
}
