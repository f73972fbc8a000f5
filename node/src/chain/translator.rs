// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.
//
// Copyright (c) DUSK NETWORK. All rights reserved.

use node_data::ledger::{Archive, Op};
use node_data::verify;

/// Turns verified archives into storage-ready ops.
///
/// Order indices are process-local: they restart at zero with the process
/// and never repeat within it.
#[derive(Debug, Default)]
pub struct Translator {
    next_order: u64,
}

impl Translator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Order index the next translated op will receive.
    pub fn next_order(&self) -> u64 {
        self.next_order
    }

    pub fn translate(&mut self, archives: Vec<Archive>) -> Vec<Op> {
        archives
            .into_iter()
            .map(|archive| {
                let order = self.next_order;
                self.next_order += 1;

                let body = verify::normalize(&archive.data);
                Op {
                    order,
                    height: archive.height,
                    is_executed: false,
                    tx_hash: archive.tx_hash,
                    op_hash: archive.op_hash,
                    public_key: archive.public_key,
                    signature: archive.signature,
                    op_str: String::from_utf8_lossy(&body).into_owned(),
                }
            })
            .collect()
    }
}
