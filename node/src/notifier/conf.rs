// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.
//
// Copyright (c) DUSK NETWORK. All rights reserved.

use std::fmt::Formatter;
use std::time::Duration;

use backoff::{ExponentialBackoff, ExponentialBackoffBuilder};
use serde::{Deserialize, Serialize};

#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(default)]
pub struct Params {
    /// Websocket endpoint pushing new chain heights
    pub ws_url: String,

    /// Text frame sent right after connecting, if the endpoint expects a
    /// subscription request
    pub subscribe_message: Option<String>,

    /// Capacity of the height queue. The notifier waits while it is full.
    pub queue_capacity: usize,

    #[serde(with = "humantime_serde")]
    pub reconnect_initial_interval: Duration,

    #[serde(with = "humantime_serde")]
    pub reconnect_max_interval: Duration,
}

impl Default for Params {
    fn default() -> Self {
        Self {
            ws_url: "ws://127.0.0.1:8002/ws".into(),
            subscribe_message: None,
            queue_capacity: 10,
            reconnect_initial_interval: Duration::from_millis(500),
            reconnect_max_interval: Duration::from_secs(30),
        }
    }
}

impl Params {
    pub(crate) fn reconnect_policy(&self) -> ExponentialBackoff {
        ExponentialBackoffBuilder::new()
            .with_initial_interval(self.reconnect_initial_interval)
            .with_max_interval(self.reconnect_max_interval)
            .with_max_elapsed_time(None)
            .build()
    }
}

impl std::fmt::Display for Params {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "ws_url: {}, subscribe: {}, queue_capacity: {}, \
             reconnect_initial_interval: {:?}, reconnect_max_interval: {:?}",
            self.ws_url,
            self.subscribe_message.is_some(),
            self.queue_capacity,
            self.reconnect_initial_interval,
            self.reconnect_max_interval,
        )
    }
}
