// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.
//
// Copyright (c) DUSK NETWORK. All rights reserved.

mod args;
mod config;
mod log;

use clap::Parser;
use node::chain::{ChainSrv, HttpLedgerClient};
use node::database::sqlite::SqliteGateway;
use node::notifier::HeightNotifier;
use node::{LongLivedService, Node};
use node_data::message::AsyncQueue;
use tracing::info;

use crate::args::Args;
use crate::config::Config;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let config = Config::try_from(&args)?;

    log::Log::new(config.log_level()?, config.log_filter(), config.log_type())
        .register()?;

    let db = SqliteGateway::create_or_open(
        config.storage.path(),
        config.storage.params(),
    )
    .await?;
    let node = Node::new(db);

    // Select list of services to enable
    type Services = dyn LongLivedService<SqliteGateway>;
    let mut service_list: Vec<Box<Services>> = vec![];

    if config.chain.enabled() {
        let heights =
            AsyncQueue::bounded(config.notifier.queue_capacity(), "heights");

        let chain: node::chain::conf::Params = config.chain.clone().into();
        let client = HttpLedgerClient::new(
            chain.ledger_url.clone(),
            chain.archive_path.clone(),
            chain.request_timeout,
        )?;

        service_list.push(Box::new(HeightNotifier::new(
            config.notifier.clone().into(),
            heights.clone(),
            node.shutdown_token(),
        )));
        service_list.push(Box::new(ChainSrv::<_, SqliteGateway>::new(
            chain,
            client,
            heights,
            node.shutdown_token(),
        )));
    } else {
        info!("chain sync is disabled");
    }

    // node spawn_all is the entry point
    if let Err(e) = node.spawn_all(service_list).await {
        tracing::error!("node terminated with err: {}", e);
        return Err(e.into());
    }

    Ok(())
}
