// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.
//
// Copyright (c) DUSK NETWORK. All rights reserved.

pub mod conf;
pub mod sqlite;

use anyhow::Result;
use async_trait::async_trait;
use node_data::ledger::{Height, Op};

/// Storage primitives the chain syncer relies on.
///
/// Implementations are called from a single task and need no external
/// locking. They must serialize internally if shared with other writers.
#[async_trait]
pub trait Gateway: Send + Sync + 'static {
    /// Returns the last synced height, `None` if nothing was synced yet.
    async fn read_checkpoint(&self) -> Result<Option<Height>>;

    /// Persists the last synced height.
    ///
    /// The stored checkpoint never moves backwards: writing a height below
    /// the current one is a no-op.
    async fn write_checkpoint(&self, height: Height) -> Result<()>;

    /// Durably stores all ops of `height` in a single atomic unit.
    ///
    /// Either all ops are stored or none. Re-applying an op with the same
    /// (height, op hash) has no further effect. On success every op is
    /// marked as executed.
    async fn apply_height(&self, height: Height, ops: &mut [Op]) -> Result<()>;
}

#[cfg(test)]
pub(crate) mod memory {
    use std::collections::BTreeMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use anyhow::{anyhow, bail};
    use parking_lot::Mutex;

    use super::*;

    /// In-memory gateway with failure injection.
    #[derive(Default)]
    pub(crate) struct MemoryGateway {
        pub checkpoint: Mutex<Option<Height>>,
        /// Applied ops keyed by (height, op hash)
        pub ops: Mutex<BTreeMap<(Height, String), Op>>,
        /// Order in which heights were applied
        pub applied: Mutex<Vec<Height>>,
        /// Number of upcoming `apply_height` calls that fail
        pub failing_applies: AtomicUsize,
        pub broken_checkpoint: bool,
    }

    impl MemoryGateway {
        pub fn with_checkpoint(height: Height) -> Self {
            Self {
                checkpoint: Mutex::new(Some(height)),
                ..Default::default()
            }
        }
    }

    #[async_trait]
    impl Gateway for MemoryGateway {
        async fn read_checkpoint(&self) -> Result<Option<Height>> {
            if self.broken_checkpoint {
                return Err(anyhow!("checkpoint storage unavailable"));
            }
            Ok(*self.checkpoint.lock())
        }

        async fn write_checkpoint(&self, height: Height) -> Result<()> {
            let mut checkpoint = self.checkpoint.lock();
            *checkpoint = Some(checkpoint.map_or(height, |h| h.max(height)));
            Ok(())
        }

        async fn apply_height(
            &self,
            height: Height,
            ops: &mut [Op],
        ) -> Result<()> {
            let failing = self.failing_applies.load(Ordering::SeqCst);
            if failing > 0 {
                self.failing_applies.store(failing - 1, Ordering::SeqCst);
                bail!("injected apply failure at height {height}");
            }

            let mut stored = self.ops.lock();
            for op in ops.iter_mut() {
                op.is_executed = true;
                stored
                    .entry((height, op.op_hash.clone()))
                    .or_insert_with(|| op.clone());
            }
            self.applied.lock().push(height);
            Ok(())
        }
    }
}
