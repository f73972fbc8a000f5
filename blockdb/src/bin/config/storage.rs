// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.
//
// Copyright (c) DUSK NETWORK. All rights reserved.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::args::Args;

/// Folder used when neither the config nor the command line sets one.
const DEFAULT_DB_PATH: &str = "blockdb-data";

#[derive(Serialize, Deserialize, Clone, Default, Debug)]
#[serde(default)]
pub(crate) struct StorageConfig {
    path: Option<PathBuf>,

    #[serde(flatten)]
    params: node::database::conf::Params,
}

impl StorageConfig {
    pub(crate) fn path(&self) -> PathBuf {
        self.path
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_DB_PATH))
    }

    pub(crate) fn params(&self) -> node::database::conf::Params {
        self.params
    }

    pub(crate) fn merge(&mut self, args: &Args) {
        if let Some(db_path) = &args.db_path {
            self.path = Some(db_path.clone());
        }
    }
}
