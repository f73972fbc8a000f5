// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.
//
// Copyright (c) DUSK NETWORK. All rights reserved.

use std::time::Duration;

use async_trait::async_trait;
use node_data::ledger::Height;
use reqwest::{Client, ClientBuilder, StatusCode};
use tracing::trace;

use super::error::FetchError;

/// Pull side of the chain: the ledger messages recorded at a height.
#[async_trait]
pub trait LedgerClient: Send + Sync + 'static {
    /// Returns every raw ledger message published at `height`.
    ///
    /// An empty result means the height holds nothing to mirror.
    async fn fetch(&self, height: Height) -> Result<Vec<Vec<u8>>, FetchError>;
}

/// Queries the chain's HTTP endpoint, one request per height.
#[derive(Clone, Debug)]
pub struct HttpLedgerClient {
    client: Client,
    uri: String,
    archive_path: String,
}

impl HttpLedgerClient {
    pub fn new<S: Into<String>>(
        uri: S,
        archive_path: S,
        timeout: Duration,
    ) -> Result<Self, FetchError> {
        let client = ClientBuilder::new()
            .connect_timeout(timeout)
            .timeout(timeout)
            .build()?;

        let uri = uri.into().trim_end_matches('/').to_owned();
        let archive_path =
            archive_path.into().trim_start_matches('/').to_owned();

        Ok(Self {
            client,
            uri,
            archive_path,
        })
    }

    fn url(&self) -> String {
        format!("{}/{}", self.uri, self.archive_path)
    }
}

#[async_trait]
impl LedgerClient for HttpLedgerClient {
    async fn fetch(&self, height: Height) -> Result<Vec<Vec<u8>>, FetchError> {
        let response = self
            .client
            .get(self.url())
            .query(&[("height", height)])
            .send()
            .await?;

        let status = response.status();
        trace!(event = "ledger response", height, %status);

        if status == StatusCode::NOT_FOUND {
            return Err(FetchError::Unavailable(height));
        }

        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(FetchError::Status {
                status: status.as_u16(),
                message,
            });
        }

        let body = response.bytes().await?;
        if body.is_empty() {
            return Ok(vec![]);
        }

        Ok(vec![body.to_vec()])
    }
}
