// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.
//
// Copyright (c) DUSK NETWORK. All rights reserved.

use serde::Deserialize;
use tracing::warn;

use crate::ledger::Archive;
use crate::verify;

/// Section type carrying a plain transaction.
pub const TX_TYPE_NORMAL: u8 = 0;
/// Section type carrying a sequencer.
pub const TX_TYPE_SEQUENCER: u8 = 1;
/// Section type carrying an archive.
pub const TX_TYPE_ARCHIVE: u8 = 4;

#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("malformed message: {0}")]
    Malformed(String),
    /// The chain answered with an error instead of the height's data
    #[error("chain error: {0}")]
    Chain(String),
}

impl From<serde_json::Error> for DecodeError {
    fn from(err: serde_json::Error) -> Self {
        Self::Malformed(err.to_string())
    }
}

/// Outcome of decoding one ledger message.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct Decoded {
    /// Archives that passed verification, in message order
    pub archives: Vec<Archive>,
    /// Number of archives dropped by verification
    pub rejected: usize,
}

/// Ledger message as served by the chain's query endpoint.
#[derive(Debug, Deserialize)]
struct Envelope {
    #[serde(default)]
    data: Option<Sections>,
    #[serde(default)]
    err: Option<String>,
}

/// Envelope status only, the payload is left unchecked.
#[derive(Debug, Deserialize)]
struct Status {
    #[serde(default)]
    err: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Sections {
    Many(Vec<Section>),
    One(Section),
}

#[derive(Debug, Deserialize)]
struct Section {
    #[serde(rename = "type")]
    section_type: u8,
    // Decoded only to enforce the schema; the mirror stores archives only.
    #[serde(default)]
    #[allow(dead_code)]
    transaction: Option<serde_json::Value>,
    #[serde(default)]
    #[allow(dead_code)]
    sequencer: Option<serde_json::Value>,
    #[serde(default)]
    archive: Option<Archive>,
}

/// Decodes a ledger message into the archives it carries.
///
/// The message is parsed as a whole: a schema violation anywhere discards
/// it. Archives failing verification are dropped and counted in
/// [`Decoded::rejected`].
pub fn decode(raw: &[u8]) -> Result<Decoded, DecodeError> {
    let envelope: Envelope = serde_json::from_slice(raw)?;

    if let Some(err) = envelope.err.filter(|e| !e.is_empty()) {
        return Err(DecodeError::Chain(err));
    }

    let sections = match envelope.data {
        None => vec![],
        Some(Sections::One(section)) => vec![section],
        Some(Sections::Many(sections)) => sections,
    };

    let mut decoded = Decoded::default();
    for (idx, section) in sections.into_iter().enumerate() {
        let archive = match (section.section_type, section.archive) {
            (TX_TYPE_ARCHIVE, Some(archive)) => archive,
            (TX_TYPE_ARCHIVE, None) => {
                return Err(DecodeError::Malformed(format!(
                    "section {idx} of type archive has no archive"
                )));
            }
            _ => continue,
        };

        match verify::verify(&archive) {
            Ok(()) => decoded.archives.push(archive),
            Err(err) => {
                warn!(
                    event = "archive rejected",
                    reason = %err,
                    archive = %archive.id(),
                );
                decoded.rejected += 1;
            }
        }
    }

    Ok(decoded)
}

/// Returns the error a ledger message reports, if any.
///
/// Messages that cannot be parsed report nothing here; [`decode`] rejects
/// them.
pub fn chain_error(raw: &[u8]) -> Option<String> {
    serde_json::from_slice::<Status>(raw)
        .ok()?
        .err
        .filter(|e| !e.is_empty())
}

/// AsyncQueue is a thin wrapper of async_channel.
#[derive(Clone)]
pub struct AsyncQueue<M: Clone> {
    receiver: async_channel::Receiver<M>,
    sender: async_channel::Sender<M>,

    label: &'static str,
}

impl<M: Clone> AsyncQueue<M> {
    /// Creates a bounded async queue with fixed capacity
    ///
    /// `Label` sets a queue label for logging
    ///
    /// Panics if `cap` is zero (Capacity must be a positive number).
    pub fn bounded(cap: usize, label: &'static str) -> Self {
        let (sender, receiver) = async_channel::bounded(cap);
        Self {
            receiver,
            sender,
            label,
        }
    }
}

impl<M: Clone> AsyncQueue<M> {
    /// Sends a message, waiting for free capacity while the queue is full.
    pub fn send(&self, msg: M) -> async_channel::Send<'_, M> {
        self.sender.send(msg)
    }

    pub fn recv(&self) -> async_channel::Recv<'_, M> {
        self.receiver.recv()
    }

    pub fn label(&self) -> &'static str {
        self.label
    }

    pub fn is_empty(&self) -> bool {
        self.receiver.is_empty()
    }
}
