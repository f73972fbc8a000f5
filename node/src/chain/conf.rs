// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.
//
// Copyright (c) DUSK NETWORK. All rights reserved.

use std::fmt::Formatter;
use std::time::Duration;

use backoff::{ExponentialBackoff, ExponentialBackoffBuilder};
use node_data::ledger::Height;
use serde::{Deserialize, Serialize};

#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(default)]
pub struct Params {
    /// Base URL of the chain's query endpoint
    pub ledger_url: String,

    /// Path serving the ledger message of a height
    pub archive_path: String,

    /// Number of retries after a failed fetch or apply
    pub retry_times: u32,

    #[serde(with = "humantime_serde")]
    pub retry_initial_interval: Duration,

    #[serde(with = "humantime_serde")]
    pub retry_max_interval: Duration,

    /// Timeout of a single query to the ledger
    #[serde(with = "humantime_serde")]
    pub request_timeout: Duration,

    /// Interval at which a stalled range is retried without a new
    /// notification
    #[serde(with = "humantime_serde")]
    pub repoll_interval: Duration,

    /// Height considered synced when the store holds no checkpoint
    pub start_height: Height,
}

impl Default for Params {
    fn default() -> Self {
        Self {
            ledger_url: "http://127.0.0.1:8000".into(),
            archive_path: "archives".into(),
            retry_times: 5,
            retry_initial_interval: Duration::from_millis(200),
            retry_max_interval: Duration::from_secs(10),
            request_timeout: Duration::from_secs(10),
            repoll_interval: Duration::from_secs(30),
            start_height: 0,
        }
    }
}

impl Params {
    pub(crate) fn retry_policy(&self) -> ExponentialBackoff {
        ExponentialBackoffBuilder::new()
            .with_initial_interval(self.retry_initial_interval)
            .with_max_interval(self.retry_max_interval)
            .with_max_elapsed_time(None)
            .build()
    }
}

impl std::fmt::Display for Params {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "ledger_url: {}, archive_path: {}, retry_times: {}, \
             retry_initial_interval: {:?}, retry_max_interval: {:?}, \
             request_timeout: {:?}, repoll_interval: {:?}, start_height: {}",
            self.ledger_url,
            self.archive_path,
            self.retry_times,
            self.retry_initial_interval,
            self.retry_max_interval,
            self.request_timeout,
            self.repoll_interval,
            self.start_height,
        )
    }
}
