// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.
//
// Copyright (c) DUSK NETWORK. All rights reserved.

use node_data::ledger::Height;

/// Failure to pull a height from the chain's query endpoint.
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("endpoint answered {status}: {message}")]
    Status { status: u16, message: String },
    #[error("height {0} is not available")]
    Unavailable(Height),
    /// The endpoint answered with an error envelope
    #[error("chain error: {0}")]
    Chain(String),
}

#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    /// Fetch retry budget exhausted
    #[error("fetch failed: {0}")]
    Fetch(#[from] FetchError),
    /// Storage rejected a height or its checkpoint
    #[error("storage apply failed: {0}")]
    StorageApply(anyhow::Error),
    /// A height range could not be synced; retried on the next trigger
    #[error("sync stalled at height {from} (target {to}): {source}")]
    Stalled {
        from: Height,
        to: Height,
        source: Box<SyncError>,
    },
    /// The checkpoint could not be read at startup
    #[error("checkpoint unavailable: {0}")]
    CheckpointUnavailable(anyhow::Error),
    #[error("sync interrupted by shutdown")]
    Interrupted,
}
