// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.
//
// Copyright (c) DUSK NETWORK. All rights reserved.

use serde::{Deserialize, Serialize};

use crate::args::Args;

#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(default)]
pub(crate) struct ChainConfig {
    /// Runs the sync services
    enabled: bool,

    #[serde(flatten)]
    params: node::chain::conf::Params,
}

impl Default for ChainConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            params: Default::default(),
        }
    }
}

impl From<ChainConfig> for node::chain::conf::Params {
    fn from(conf: ChainConfig) -> Self {
        conf.params
    }
}

impl ChainConfig {
    pub(crate) fn enabled(&self) -> bool {
        self.enabled
    }

    pub(crate) fn merge(&mut self, args: &Args) {
        if let Some(ledger_url) = &args.ledger_url {
            self.params.ledger_url = ledger_url.clone();
        }

        if let Some(start_height) = args.start_height {
            self.params.start_height = start_height;
        }
    }
}
