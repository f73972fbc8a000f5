// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.
//
// Copyright (c) DUSK NETWORK. All rights reserved.

use tracing::subscriber::SetGlobalDefaultError;
use tracing_subscriber::fmt::format::{DefaultFields, Format};
use tracing_subscriber::fmt::SubscriberBuilder;
use tracing_subscriber::EnvFilter;

pub struct Log {
    level: tracing::Level,
    filter: String,
    format: String,
}

impl Log {
    pub fn new(
        level: tracing::Level,
        filter: String,
        format: String,
    ) -> Self {
        Self {
            level,
            filter,
            format,
        }
    }

    fn subscriber(
        &self,
    ) -> SubscriberBuilder<DefaultFields, Format, EnvFilter> {
        // Default log level plus the optional per-target filters
        tracing_subscriber::fmt::Subscriber::builder().with_env_filter(
            EnvFilter::new(self.filter.as_str())
                .add_directive(self.level.into()),
        )
    }

    /// Installs the subscriber used by every thread for the rest of the
    /// program.
    pub fn register(self) -> Result<(), SetGlobalDefaultError> {
        let subscriber = self.subscriber();
        match self.format.as_str() {
            "json" => {
                let subscriber = subscriber
                    .json()
                    .with_current_span(false)
                    .flatten_event(true)
                    .finish();

                tracing::subscriber::set_global_default(subscriber)
            }
            "plain" => {
                let subscriber = subscriber.with_ansi(false).finish();
                tracing::subscriber::set_global_default(subscriber)
            }
            _ => {
                let subscriber = subscriber.finish();
                tracing::subscriber::set_global_default(subscriber)
            }
        }
    }
}
