// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.
//
// Copyright (c) DUSK NETWORK. All rights reserved.

use std::path::PathBuf;

use clap::builder::PossibleValuesParser;
use clap::Parser;

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "BlockDB chain mirror node",
)]
pub struct Args {
    /// Sets the configuration file path
    #[clap(long, short, env = "BLOCKDB_CONFIG_TOML", value_parser)]
    pub config: Option<PathBuf>,

    /// Output log level
    #[clap(long)]
    pub log_level: Option<tracing::Level>,

    // Change the log format accordingly
    #[clap(long, value_parser = PossibleValuesParser::new(["coloured", "plain", "json"]))]
    pub log_type: Option<String>,

    /// Add log filter(s)
    #[clap(long)]
    pub log_filter: Option<String>,

    #[clap(long, value_parser)]
    /// path to the mirror database
    pub db_path: Option<PathBuf>,

    #[clap(long)]
    /// Base URL of the chain's query endpoint
    pub ledger_url: Option<String>,

    #[clap(long)]
    /// Websocket endpoint pushing new chain heights
    pub ws_url: Option<String>,

    #[clap(long)]
    /// Height considered synced when the mirror is empty
    pub start_height: Option<u64>,
}
