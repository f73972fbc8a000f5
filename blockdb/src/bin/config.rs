// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.
//
// Copyright (c) DUSK NETWORK. All rights reserved.

pub mod chain;
pub mod notifier;
pub mod storage;

use std::str::FromStr;

use anyhow::Context;
use serde::{Deserialize, Serialize};

use self::chain::ChainConfig;
use self::notifier::NotifierConfig;
use self::storage::StorageConfig;
use crate::args::Args;

#[derive(Serialize, Deserialize, Clone, Default, Debug)]
pub(crate) struct Config {
    log_level: Option<String>,
    log_type: Option<String>,
    log_filter: Option<String>,

    #[serde(default = "StorageConfig::default")]
    pub(crate) storage: StorageConfig,

    #[serde(default = "ChainConfig::default")]
    pub(crate) chain: ChainConfig,

    #[serde(default = "NotifierConfig::default")]
    pub(crate) notifier: NotifierConfig,
}

/// Default log_level.
const DEFAULT_LOG_LEVEL: &str = "info";

/// Default log_type.
const DEFAULT_LOG_TYPE: &str = "coloured";

impl TryFrom<&Args> for Config {
    type Error = anyhow::Error;

    fn try_from(args: &Args) -> Result<Self, Self::Error> {
        let mut config = match &args.config {
            None => Config::default(),
            Some(conf_path) => {
                let toml = std::fs::read_to_string(conf_path)
                    .with_context(|| format!("reading {conf_path:?}"))?;
                toml::from_str(&toml)
                    .with_context(|| format!("parsing {conf_path:?}"))?
            }
        };

        // Overwrite config log-level
        if let Some(log_level) = args.log_level {
            config.log_level = Some(log_level.to_string());
        }

        // Overwrite config log-type
        if let Some(log_type) = &args.log_type {
            config.log_type = Some(log_type.into());
        }

        // Overwrite config log-filter
        if let Some(log_filter) = &args.log_filter {
            config.log_filter = Some(log_filter.into());
        }

        config.storage.merge(args);
        config.chain.merge(args);
        config.notifier.merge(args);

        Ok(config)
    }
}

impl Config {
    pub(crate) fn log_type(&self) -> String {
        match &self.log_type {
            None => DEFAULT_LOG_TYPE.into(),
            Some(log_type) => log_type.into(),
        }
    }

    pub(crate) fn log_level(&self) -> anyhow::Result<tracing::Level> {
        let log_level = match &self.log_level {
            None => DEFAULT_LOG_LEVEL,
            Some(log_level) => log_level,
        };
        tracing::Level::from_str(log_level).with_context(|| {
            format!("Invalid log-level specified '{log_level}'")
        })
    }

    pub(crate) fn log_filter(&self) -> String {
        self.log_filter.clone().unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;
    use std::path::PathBuf;
    use std::time::Duration;

    use clap::Parser;

    use super::*;

    const SAMPLE: &str = r#"
log_level = "debug"
log_type = "json"

[storage]
path = "/var/lib/blockdb"
reader_max_connections = 4

[chain]
enabled = true
ledger_url = "http://10.0.0.1:8000"
retry_times = 3
retry_initial_interval = "100ms"
repoll_interval = "1m"
start_height = 122759

[notifier]
ws_url = "ws://10.0.0.1:8002/ws"
subscribe_message = '{"event":"new_sequencer"}'
queue_capacity = 32
"#;

    fn load(extra: &[&str]) -> Config {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(SAMPLE.as_bytes()).unwrap();

        let path = file.path().to_str().unwrap().to_owned();
        let mut argv = vec!["blockdb", "--config", path.as_str()];
        argv.extend_from_slice(extra);

        let args = Args::parse_from(argv);
        Config::try_from(&args).unwrap()
    }

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.log_type(), "coloured");
        assert_eq!(config.log_level().unwrap(), tracing::Level::INFO);
        assert!(config.chain.enabled());
        assert_eq!(config.storage.path(), PathBuf::from("blockdb-data"));
        assert_eq!(config.notifier.queue_capacity(), 10);

        let notifier: node::notifier::conf::Params = config.notifier.into();
        assert_eq!(notifier.ws_url, "ws://127.0.0.1:8002/ws");
    }

    #[test]
    fn test_toml_sections() {
        let config = load(&[]);
        assert_eq!(config.log_type(), "json");
        assert_eq!(config.log_level().unwrap(), tracing::Level::DEBUG);
        assert_eq!(config.storage.path(), PathBuf::from("/var/lib/blockdb"));
        assert_eq!(config.storage.params().reader_max_connections, 4);

        let chain: node::chain::conf::Params = config.chain.clone().into();
        assert_eq!(chain.ledger_url, "http://10.0.0.1:8000");
        assert_eq!(chain.archive_path, "archives");
        assert_eq!(chain.retry_times, 3);
        assert_eq!(chain.retry_initial_interval, Duration::from_millis(100));
        assert_eq!(chain.repoll_interval, Duration::from_secs(60));
        assert_eq!(chain.start_height, 122759);

        let notifier: node::notifier::conf::Params =
            config.notifier.clone().into();
        assert_eq!(notifier.ws_url, "ws://10.0.0.1:8002/ws");
        assert_eq!(
            notifier.subscribe_message.as_deref(),
            Some(r#"{"event":"new_sequencer"}"#)
        );
        assert_eq!(notifier.queue_capacity, 32);
    }

    #[test]
    fn test_args_override_file() {
        let config = load(&[
            "--log-level",
            "warn",
            "--db-path",
            "/tmp/mirror",
            "--ledger-url",
            "http://ledger:9000",
            "--ws-url",
            "ws://ledger:9001",
            "--start-height",
            "7",
        ]);

        assert_eq!(config.log_level().unwrap(), tracing::Level::WARN);
        assert_eq!(config.storage.path(), PathBuf::from("/tmp/mirror"));

        let chain: node::chain::conf::Params = config.chain.into();
        assert_eq!(chain.ledger_url, "http://ledger:9000");
        assert_eq!(chain.start_height, 7);

        let notifier: node::notifier::conf::Params = config.notifier.into();
        assert_eq!(notifier.ws_url, "ws://ledger:9001");
    }

    #[test]
    fn test_invalid_log_level() {
        let config: Config = toml::from_str(r#"log_level = "loud""#).unwrap();
        assert!(config.log_level().is_err());
    }
}
