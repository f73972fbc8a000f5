// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.
//
// Copyright (c) DUSK NETWORK. All rights reserved.

use serde::{Deserialize, Serialize};

use crate::args::Args;

#[derive(Serialize, Deserialize, Clone, Default, Debug)]
pub(crate) struct NotifierConfig(node::notifier::conf::Params);

impl From<NotifierConfig> for node::notifier::conf::Params {
    fn from(conf: NotifierConfig) -> Self {
        conf.0
    }
}

impl NotifierConfig {
    /// Capacity of the height queue between notifier and syncer.
    pub(crate) fn queue_capacity(&self) -> usize {
        self.0.queue_capacity.max(1)
    }

    pub(crate) fn merge(&mut self, args: &Args) {
        if let Some(ws_url) = &args.ws_url {
            self.0.ws_url = ws_url.clone();
        }
    }
}
