// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.
//
// Copyright (c) DUSK NETWORK. All rights reserved.

use std::sync::Arc;

use backoff::backoff::Backoff;
use backoff::ExponentialBackoff;
use node_data::ledger::{Archive, Height, Op};
use node_data::message;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::client::LedgerClient;
use super::conf::Params;
use super::error::{FetchError, SyncError};
use super::translator::Translator;
use crate::database::Gateway;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    Idle,
    Fetching(Height),
    Decoding(Height),
    Applying(Height),
    /// Startup could not establish the last synced height
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Notification at or below the last synced height
    Stale,
    /// Nothing left to sync
    UpToDate,
    /// Every height up to the value is durably stored
    Synced(Height),
}

/// Drives heights from the ledger into storage, strictly in height order.
///
/// A height is fetched, decoded and applied before the next one is
/// started. The checkpoint is written only after the height's ops are
/// durably stored, so a restart resumes from the first height that may
/// not be stored yet.
pub struct Syncer<C: LedgerClient, G: Gateway> {
    client: C,
    db: Arc<RwLock<G>>,
    params: Params,
    translator: Translator,

    state: State,
    last_synced: Height,
    /// Highest height known to exist on the chain
    target: Height,

    shutdown: CancellationToken,
}

impl<C: LedgerClient, G: Gateway> Syncer<C, G> {
    pub fn new(
        client: C,
        db: Arc<RwLock<G>>,
        params: Params,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            client,
            db,
            params,
            translator: Translator::new(),
            state: State::Idle,
            last_synced: 0,
            target: 0,
            shutdown,
        }
    }

    /// Loads the last synced height from storage.
    ///
    /// Falls back to the configured start height when nothing was synced
    /// yet. A failed read leaves the syncer in [`State::Failed`].
    pub async fn init(&mut self) -> Result<Height, SyncError> {
        let checkpoint = match self.db.read().await.read_checkpoint().await {
            Ok(checkpoint) => checkpoint,
            Err(err) => {
                self.state = State::Failed;
                error!(event = "checkpoint unavailable", ?err);
                return Err(SyncError::CheckpointUnavailable(err));
            }
        };

        self.last_synced = checkpoint.unwrap_or(self.params.start_height);
        self.target = self.last_synced;
        self.state = State::Idle;

        info!(
            event = "syncer initialized",
            checkpoint = ?checkpoint,
            last_synced = self.last_synced,
        );

        Ok(self.last_synced)
    }

    pub fn state(&self) -> State {
        self.state
    }

    pub fn last_synced(&self) -> Height {
        self.last_synced
    }

    pub fn target(&self) -> Height {
        self.target
    }

    /// Handles a newly reported chain height.
    pub async fn on_notification(
        &mut self,
        height: Height,
    ) -> Result<Outcome, SyncError> {
        if height <= self.last_synced {
            debug!(
                event = "stale notification",
                height,
                last_synced = self.last_synced
            );
            return Ok(Outcome::Stale);
        }

        self.target = self.target.max(height);
        self.sync_to_target().await
    }

    /// Retries a range left behind by a stalled sync.
    pub async fn on_repoll(&mut self) -> Result<Outcome, SyncError> {
        if self.target <= self.last_synced {
            return Ok(Outcome::UpToDate);
        }

        info!(
            event = "repoll",
            from = self.last_synced + 1,
            to = self.target
        );
        self.sync_to_target().await
    }

    async fn sync_to_target(&mut self) -> Result<Outcome, SyncError> {
        let target = self.target;
        info!(event = "sync started", from = self.last_synced + 1, to = target);

        while self.last_synced < target {
            let height = self.last_synced + 1;
            if let Err(err) = self.sync_height(height).await {
                self.state = State::Idle;
                return Err(match err {
                    SyncError::Interrupted => SyncError::Interrupted,
                    err => SyncError::Stalled {
                        from: height,
                        to: target,
                        source: Box::new(err),
                    },
                });
            }
        }

        self.state = State::Idle;
        Ok(Outcome::Synced(self.last_synced))
    }

    async fn sync_height(&mut self, height: Height) -> Result<(), SyncError> {
        self.state = State::Fetching(height);
        let messages = self.fetch(height).await?;

        self.state = State::Decoding(height);
        let archives = decode_height(height, &messages);

        self.state = State::Applying(height);
        let mut ops = self.translator.translate(archives);
        self.apply(height, &mut ops).await?;

        self.last_synced = height;
        Ok(())
    }

    async fn fetch(&self, height: Height) -> Result<Vec<Vec<u8>>, SyncError> {
        let mut retry = Retry::new(&self.params);
        loop {
            let res = tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => {
                    return Err(SyncError::Interrupted);
                }
                res = self.client.fetch(height) => res,
            };

            let err = match res.and_then(reject_chain_errors) {
                Ok(messages) => return Ok(messages),
                Err(err) => err,
            };

            warn!(
                event = "fetch failed",
                height,
                attempt = retry.attempt + 1,
                %err
            );

            match retry.wait(&self.shutdown).await {
                Ok(()) => {}
                Err(Stop::Exhausted) => return Err(SyncError::Fetch(err)),
                Err(Stop::Interrupted) => return Err(SyncError::Interrupted),
            }
        }
    }

    /// Stores the ops of `height` and then moves the checkpoint.
    ///
    /// A storage call in flight is never cancelled; shutdown is only
    /// honoured between attempts.
    async fn apply(
        &self,
        height: Height,
        ops: &mut [Op],
    ) -> Result<(), SyncError> {
        let mut retry = Retry::new(&self.params);
        loop {
            let res = {
                let db = self.db.read().await;
                match db.apply_height(height, ops).await {
                    Ok(()) => db.write_checkpoint(height).await,
                    Err(err) => Err(err),
                }
            };

            let err = match res {
                Ok(()) => return Ok(()),
                Err(err) => err,
            };

            warn!(
                event = "apply failed",
                height,
                attempt = retry.attempt + 1,
                ?err
            );

            match retry.wait(&self.shutdown).await {
                Ok(()) => {}
                Err(Stop::Exhausted) => {
                    return Err(SyncError::StorageApply(err));
                }
                Err(Stop::Interrupted) => return Err(SyncError::Interrupted),
            }
        }
    }
}

/// Turns a message carrying a chain-side error into a fetch failure.
///
/// The height is not served yet, so it must not be applied.
fn reject_chain_errors(
    messages: Vec<Vec<u8>>,
) -> Result<Vec<Vec<u8>>, FetchError> {
    match messages.iter().find_map(|raw| message::chain_error(raw)) {
        Some(err) => Err(FetchError::Chain(err)),
        None => Ok(messages),
    }
}

/// Decodes every message of a height, keeping the archives that belong
/// to it.
///
/// Malformed messages and archives of another height are dropped; they
/// do not prevent the height from being applied.
fn decode_height(height: Height, messages: &[Vec<u8>]) -> Vec<Archive> {
    let mut archives = vec![];
    let mut rejected = 0;

    for raw in messages {
        let decoded = match message::decode(raw) {
            Ok(decoded) => decoded,
            Err(err) => {
                warn!(event = "message discarded", height, %err);
                continue;
            }
        };

        rejected += decoded.rejected;
        for archive in decoded.archives {
            if archive.height != height {
                warn!(
                    event = "archive rejected",
                    reason = "height mismatch",
                    expected = height,
                    archive = %archive.id(),
                );
                rejected += 1;
                continue;
            }
            archives.push(archive);
        }
    }

    debug!(
        event = "height decoded",
        height,
        archives = archives.len(),
        rejected
    );
    archives
}

enum Stop {
    Exhausted,
    Interrupted,
}

/// Bounded exponential backoff shared by fetch and apply.
struct Retry {
    policy: ExponentialBackoff,
    attempt: u32,
    max_retries: u32,
}

impl Retry {
    fn new(params: &Params) -> Self {
        Self {
            policy: params.retry_policy(),
            attempt: 0,
            max_retries: params.retry_times,
        }
    }

    async fn wait(&mut self, shutdown: &CancellationToken) -> Result<(), Stop> {
        if self.attempt >= self.max_retries {
            return Err(Stop::Exhausted);
        }
        self.attempt += 1;

        let delay = self
            .policy
            .next_backoff()
            .unwrap_or(self.policy.max_interval);

        tokio::select! {
            biased;
            _ = shutdown.cancelled() => Err(Stop::Interrupted),
            _ = tokio::time::sleep(delay) => Ok(()),
        }
    }
}
