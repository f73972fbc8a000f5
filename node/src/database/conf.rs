// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.
//
// Copyright (c) DUSK NETWORK. All rights reserved.

use std::fmt::Formatter;
use std::time::Duration;

use serde::{Deserialize, Serialize};

#[derive(Serialize, Deserialize, Copy, Debug, Clone)]
#[serde(default)]
pub struct Params {
    /// Max number of connections in the SQLite reader pool.
    pub reader_max_connections: u32,

    /// How long a connection waits on a locked database before failing.
    #[serde(with = "humantime_serde")]
    pub busy_timeout: Duration,
}

impl Default for Params {
    fn default() -> Self {
        Self {
            reader_max_connections: 16,
            busy_timeout: Duration::from_secs(5),
        }
    }
}

impl std::fmt::Display for Params {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "reader_max_connections: {}, busy_timeout: {:?}",
            self.reader_max_connections, self.busy_timeout,
        )
    }
}
