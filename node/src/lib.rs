// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.
//
// Copyright (c) DUSK NETWORK. All rights reserved.

pub mod chain;
pub mod database;
pub mod notifier;

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, Instrument};

/// Long running component of the mirror.
///
/// Services stop by themselves once the node's shutdown token is
/// cancelled.
#[async_trait]
pub trait LongLivedService<DB: database::Gateway>: Send + Sync {
    async fn initialize(
        &mut self,
        _db: Arc<RwLock<DB>>,
    ) -> anyhow::Result<()> {
        Ok(())
    }

    async fn execute(&mut self, db: Arc<RwLock<DB>>) -> anyhow::Result<usize>;

    /// Returns service name.
    fn name(&self) -> &'static str;
}

pub struct Node<DB: database::Gateway> {
    database: Arc<RwLock<DB>>,
    shutdown: CancellationToken,
}

impl<DB: database::Gateway> Node<DB> {
    pub fn new(db: DB) -> Self {
        Self {
            database: Arc::new(RwLock::new(db)),
            shutdown: CancellationToken::new(),
        }
    }

    pub fn database(&self) -> Arc<RwLock<DB>> {
        self.database.clone()
    }

    /// Token cancelled when the node is asked to stop.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Sets up and runs a list of services.
    ///
    /// A failed initialization aborts the start-up. Once running, the
    /// node waits for every service to stop.
    pub async fn spawn_all(
        &self,
        service_list: Vec<Box<dyn LongLivedService<DB>>>,
    ) -> anyhow::Result<()> {
        let mut service_list = service_list;

        // Initialize all services
        for service in service_list.iter_mut() {
            let name = service.name();
            info!("initializing service {name}");
            if let Err(err) = service.initialize(self.database.clone()).await {
                error!("service {name} failed to initialize: {err}");
                return Err(err);
            }
        }

        // Spawn all services and join-wait for their termination.
        let mut set = JoinSet::new();

        let shutdown = self.shutdown.clone();
        set.spawn(async move {
            tokio::select! {
                res = tokio::signal::ctrl_c() => match res {
                    Ok(()) => {
                        info!("interrupt received");
                        shutdown.cancel();
                    }
                    Err(err) => {
                        error!("cannot listen for interrupt: {err}");
                        shutdown.cancelled().await;
                    }
                },
                _ = shutdown.cancelled() => {}
            }
            Ok(2)
        });

        for mut s in service_list.into_iter() {
            let db = self.database.clone();
            let name = s.name();
            info!("starting service {name}");

            set.spawn(async move {
                s.execute(db)
                    .instrument(tracing::info_span!("srv", name))
                    .await
            });
        }

        // Wait for all spawned services to terminate with a result code or
        // an error.
        while let Some(res) = set.join_next().await {
            match res {
                Ok(Ok(_)) => {}
                Ok(Err(err)) => {
                    error!("service terminated with err {err}");
                }
                Err(err) => {
                    error!("service panicked: {err}");
                }
            }
        }

        info!("shutdown ...");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use super::*;
    use crate::database::memory::MemoryGateway;

    struct TestService {
        initialized: Arc<AtomicUsize>,
        shutdown: CancellationToken,
        fail_init: bool,
    }

    #[async_trait]
    impl LongLivedService<MemoryGateway> for TestService {
        async fn initialize(
            &mut self,
            _db: Arc<RwLock<MemoryGateway>>,
        ) -> anyhow::Result<()> {
            if self.fail_init {
                anyhow::bail!("service refuses to start");
            }
            self.initialized.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        async fn execute(
            &mut self,
            _db: Arc<RwLock<MemoryGateway>>,
        ) -> anyhow::Result<usize> {
            self.shutdown.cancelled().await;
            Ok(0)
        }

        fn name(&self) -> &'static str {
            "test-service"
        }
    }

    #[tokio::test]
    async fn test_spawn_all_until_shutdown() {
        let node = Node::new(MemoryGateway::default());
        let initialized = Arc::new(AtomicUsize::new(0));

        let services: Vec<Box<dyn LongLivedService<MemoryGateway>>> = (0..2)
            .map(|_| {
                Box::new(TestService {
                    initialized: initialized.clone(),
                    shutdown: node.shutdown_token(),
                    fail_init: false,
                }) as Box<dyn LongLivedService<MemoryGateway>>
            })
            .collect();

        let shutdown = node.shutdown_token();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            shutdown.cancel();
        });

        tokio::time::timeout(Duration::from_secs(5), node.spawn_all(services))
            .await
            .expect("node stops")
            .unwrap();
        assert_eq!(initialized.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_spawn_all_aborts_on_failed_init() {
        let node = Node::new(MemoryGateway::default());
        let service = TestService {
            initialized: Arc::new(AtomicUsize::new(0)),
            shutdown: node.shutdown_token(),
            fail_init: true,
        };

        let services: Vec<Box<dyn LongLivedService<MemoryGateway>>> =
            vec![Box::new(service)];
        assert!(node.spawn_all(services).await.is_err());
    }
}
