// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.
//
// Copyright (c) DUSK NETWORK. All rights reserved.

pub mod conf;

use std::sync::Arc;

use anyhow::anyhow;
use async_trait::async_trait;
use backoff::backoff::Backoff;
use futures_util::{SinkExt, StreamExt};
use node_data::ledger::Height;
use node_data::message::AsyncQueue;
use serde_json::Value;
use tokio::sync::{watch, RwLock};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use crate::{database, LongLivedService};

enum SessionEnd {
    Shutdown,
    Closed,
}

/// Turns the chain's websocket push channel into a stream of heights.
///
/// Heights are forwarded in arrival order; within one connection a height
/// at or below the last forwarded one is dropped. The tracker starts over
/// on every reconnect, the syncer ignores stale heights anyway.
pub struct HeightNotifier {
    params: conf::Params,
    heights: AsyncQueue<Height>,
    alive: watch::Sender<bool>,
    shutdown: CancellationToken,
}

impl HeightNotifier {
    pub fn new(
        params: conf::Params,
        heights: AsyncQueue<Height>,
        shutdown: CancellationToken,
    ) -> Self {
        info!("HeightNotifier::new with conf {params}");
        let (alive, _) = watch::channel(false);
        Self {
            params,
            heights,
            alive,
            shutdown,
        }
    }

    /// Reports whether the subscription is currently connected.
    pub fn liveness(&self) -> watch::Receiver<bool> {
        self.alive.subscribe()
    }

    async fn run(&self) -> anyhow::Result<()> {
        let mut reconnect = self.params.reconnect_policy();

        loop {
            let res = self.session().await;
            let was_alive = self.alive.send_replace(false);

            match res {
                Ok(SessionEnd::Shutdown) => break,
                Ok(SessionEnd::Closed) => {
                    warn!(
                        event = "subscription closed",
                        url = %self.params.ws_url
                    );
                }
                Err(err) => {
                    warn!(
                        event = "subscription failed",
                        url = %self.params.ws_url,
                        %err
                    );
                }
            }

            if was_alive {
                reconnect.reset();
            }

            let delay = reconnect
                .next_backoff()
                .unwrap_or(self.params.reconnect_max_interval);
            debug!(event = "reconnecting", delay = ?delay);

            tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => break,
                _ = tokio::time::sleep(delay) => {}
            }
        }

        info!(event = "notifier stopped");
        Ok(())
    }

    async fn session(&self) -> anyhow::Result<SessionEnd> {
        let (mut ws, _) = tokio::select! {
            biased;
            _ = self.shutdown.cancelled() => return Ok(SessionEnd::Shutdown),
            res = connect_async(self.params.ws_url.as_str()) => res?,
        };

        if let Some(subscribe) = &self.params.subscribe_message {
            ws.send(Message::text(subscribe.clone())).await?;
        }

        info!(event = "subscribed", url = %self.params.ws_url);
        self.alive.send_replace(true);

        let mut last = Monotonic::default();
        loop {
            let msg = tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => {
                    let _ = ws.close(None).await;
                    return Ok(SessionEnd::Shutdown);
                }
                msg = ws.next() => msg,
            };

            let text = match msg {
                None => return Ok(SessionEnd::Closed),
                Some(Err(err)) => return Err(err.into()),
                Some(Ok(Message::Close(_))) => return Ok(SessionEnd::Closed),
                Some(Ok(Message::Text(text))) => text,
                Some(Ok(Message::Binary(bytes))) => {
                    match String::from_utf8(bytes) {
                        Ok(text) => text,
                        Err(_) => {
                            warn!(
                                event = "notification discarded",
                                reason = "not utf-8"
                            );
                            continue;
                        }
                    }
                }
                Some(Ok(_)) => continue,
            };

            let Some(height) = parse_height(&text) else {
                warn!(
                    event = "notification discarded",
                    reason = "no height",
                    len = text.len()
                );
                continue;
            };

            if !last.advance(height) {
                trace!(event = "notification dropped", height);
                continue;
            }

            // Waits while the queue is full
            tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => {
                    return Ok(SessionEnd::Shutdown);
                }
                res = self.heights.send(height) => {
                    let label = self.heights.label();
                    res.map_err(|_| anyhow!("queue ({label}) is closed"))?;
                }
            }
        }
    }
}

#[async_trait]
impl<DB: database::Gateway> LongLivedService<DB> for HeightNotifier {
    async fn execute(&mut self, _db: Arc<RwLock<DB>>) -> anyhow::Result<usize> {
        self.run().await?;
        Ok(0)
    }

    /// Returns service name.
    fn name(&self) -> &'static str {
        "notifier"
    }
}

/// Highest height forwarded on the current connection.
#[derive(Debug, Default)]
struct Monotonic(Option<Height>);

impl Monotonic {
    fn advance(&mut self, height: Height) -> bool {
        match self.0 {
            Some(last) if height <= last => false,
            _ => {
                self.0 = Some(height);
                true
            }
        }
    }
}

/// Extracts a chain height from a notification.
///
/// Accepts a bare integer, a JSON number or a JSON object carrying
/// `height` either at the top level or under `data`.
pub fn parse_height(text: &str) -> Option<Height> {
    let text = text.trim();
    if let Ok(height) = text.parse::<Height>() {
        return Some(height);
    }

    let value: Value = serde_json::from_str(text).ok()?;
    match &value {
        Value::Number(n) => n.as_u64(),
        Value::Object(_) => height_field(&value)
            .or_else(|| value.get("data").and_then(height_field)),
        _ => None,
    }
}

fn height_field(value: &Value) -> Option<Height> {
    match value.get("height")? {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tokio::net::TcpListener;
    use tokio_tungstenite::accept_async;

    use super::*;
    use crate::database::memory::MemoryGateway;

    #[test]
    fn test_parse_height() {
        assert_eq!(parse_height("42"), Some(42));
        assert_eq!(parse_height(" 42\n"), Some(42));
        assert_eq!(parse_height(r#"{"height": 7}"#), Some(7));
        assert_eq!(parse_height(r#"{"height": "8"}"#), Some(8));
        assert_eq!(
            parse_height(r#"{"type": 1, "data": {"height": 9}}"#),
            Some(9)
        );
        assert_eq!(parse_height("4.5"), None);
        assert_eq!(parse_height("-1"), None);
        assert_eq!(parse_height(r#"{"data": null}"#), None);
        assert_eq!(parse_height("hello"), None);
        assert_eq!(parse_height(r#"[1, 2]"#), None);
    }

    #[test]
    fn test_monotonic_per_connection() {
        let mut last = Monotonic::default();
        let accepted: Vec<_> = [5, 5, 7, 6, 8]
            .into_iter()
            .filter(|h| last.advance(*h))
            .collect();
        assert_eq!(accepted, vec![5, 7, 8]);
    }

    fn params(url: String) -> conf::Params {
        conf::Params {
            ws_url: url,
            subscribe_message: Some(r#"{"subscribe":"height"}"#.into()),
            queue_capacity: 10,
            reconnect_initial_interval: Duration::from_millis(10),
            reconnect_max_interval: Duration::from_millis(20),
        }
    }

    async fn recv(queue: &AsyncQueue<Height>) -> Height {
        tokio::time::timeout(Duration::from_secs(5), queue.recv())
            .await
            .expect("height in time")
            .expect("queue open")
    }

    #[tokio::test]
    async fn test_notifier_forwards_and_reconnects() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("ws://{}", listener.local_addr().unwrap());

        let server = tokio::spawn(async move {
            // First connection
            let (stream, _) = listener.accept().await.unwrap();
            let mut ws = accept_async(stream).await.unwrap();

            let subscribe = ws.next().await.unwrap().unwrap();
            assert_eq!(
                subscribe.to_text().unwrap(),
                r#"{"subscribe":"height"}"#
            );

            let pushed = [
                "5",
                r#"{"height": 5}"#,
                "garbage",
                r#"{"data": {"height": 7}}"#,
                "6",
            ];
            for msg in pushed {
                ws.send(Message::text(msg)).await.unwrap();
            }
            ws.close(None).await.unwrap();

            // Second connection starts over
            let (stream, _) = listener.accept().await.unwrap();
            let mut ws = accept_async(stream).await.unwrap();
            let _subscribe = ws.next().await;
            for msg in ["7", "8"] {
                ws.send(Message::text(msg)).await.unwrap();
            }

            // Keep the connection open until the client leaves
            while let Some(Ok(_)) = ws.next().await {}
        });

        let heights = AsyncQueue::bounded(10, "heights");
        let shutdown = CancellationToken::new();
        let mut notifier =
            HeightNotifier::new(params(url), heights.clone(), shutdown.clone());
        let mut alive = notifier.liveness();

        let client = tokio::spawn(async move {
            let db = Arc::new(RwLock::new(MemoryGateway::default()));
            LongLivedService::<MemoryGateway>::execute(&mut notifier, db).await
        });

        let mut received = vec![];
        for _ in 0..4 {
            received.push(recv(&heights).await);
        }
        assert_eq!(received, vec![5, 7, 7, 8]);
        assert!(*alive.borrow_and_update());

        shutdown.cancel();
        client.await.unwrap().unwrap();
        server.await.unwrap();
        assert!(!*alive.borrow());
    }

    #[tokio::test]
    async fn test_notifier_stops_while_disconnected() {
        // Nobody listens here
        let addr = TcpListener::bind("127.0.0.1:0")
            .await
            .unwrap()
            .local_addr()
            .unwrap();

        let shutdown = CancellationToken::new();
        let mut notifier = HeightNotifier::new(
            params(format!("ws://{addr}")),
            AsyncQueue::bounded(1, "heights"),
            shutdown.clone(),
        );
        let alive = notifier.liveness();

        let client = tokio::spawn(async move {
            let db = Arc::new(RwLock::new(MemoryGateway::default()));
            LongLivedService::<MemoryGateway>::execute(&mut notifier, db).await
        });

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!*alive.borrow());

        shutdown.cancel();
        tokio::time::timeout(Duration::from_secs(5), client)
            .await
            .expect("notifier stops")
            .unwrap()
            .unwrap();
    }
}
