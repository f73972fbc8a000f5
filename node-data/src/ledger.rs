// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.
//
// Copyright (c) DUSK NETWORK. All rights reserved.

use serde::{Deserialize, Serialize};

#[cfg(any(feature = "faker", test))]
use fake::Dummy;

/// Position of a record in the chain's event ordering.
pub type Height = u64;

pub type Hash = [u8; 32];

/// Chain-level event decoded from a ledger message.
///
/// Hashes, keys and signatures are kept in the hex form the chain delivers
/// them in; they are only decoded when the archive is verified.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Archive {
    pub height: Height,
    #[serde(rename = "type", default)]
    pub archive_type: u16,
    pub tx_hash: String,
    pub op_hash: String,
    pub public_key: String,
    pub signature: String,
    /// Op hashes of the predecessors of this archive
    #[serde(default)]
    pub parents: Vec<String>,
    #[serde(default)]
    pub account_nonce: u64,
    #[serde(default)]
    pub mind_nonce: u64,
    #[serde(default)]
    pub weight: u64,
    /// Opaque payload, either an embedded JSON document or a JSON string
    /// carrying one.
    pub data: serde_json::Value,
}

impl Archive {
    /// Returns the archive identifiers in a log friendly form.
    pub fn id(&self) -> String {
        format!(
            "height: {}, tx: {}, op: {}",
            self.height,
            to_str(&self.tx_hash),
            to_str(&self.op_hash)
        )
    }
}

/// Storage-ready operation derived from a verified [`Archive`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Op {
    /// Process-local sequence number assigned at translation
    pub order: u64,
    pub height: Height,
    /// Set only once the op has been durably stored
    pub is_executed: bool,
    pub tx_hash: String,
    pub op_hash: String,
    pub public_key: String,
    pub signature: String,
    /// Normalized op body
    pub op_str: String,
}

/// Shortens a hex identifier to its first and last 8 characters.
pub fn to_str(hash: &str) -> String {
    const KEEP: usize = 8;
    if hash.len() <= KEEP * 2 + 3 || !hash.is_ascii() {
        return hash.to_owned();
    }

    format!("{}...{}", &hash[..KEEP], &hash[hash.len() - KEEP..])
}

#[cfg(any(feature = "faker", test))]
pub mod faker {
    use super::*;
    use crate::verify;
    use k256::ecdsa::signature::Signer;
    use k256::ecdsa::{Signature, SigningKey};
    use rand::Rng;

    impl<T> Dummy<T> for Archive {
        /// Creates a correctly signed archive with a random payload.
        fn dummy_with_rng<R: Rng + ?Sized>(_config: &T, rng: &mut R) -> Self {
            let height = rng.gen_range(1..10_000);
            let payload = serde_json::json!({
                "op": "insert",
                "collection": "faker",
                "value": rng.gen::<u32>(),
            });
            let key: [u8; 32] = rng.gen();

            gen_signed_archive(height, payload, &signing_key(key))
        }
    }

    /// Returns a deterministic secp256k1 signing key.
    ///
    /// Falls back to a fixed key when `seed` is not a valid scalar.
    pub fn signing_key(seed: [u8; 32]) -> SigningKey {
        SigningKey::from_slice(&seed).unwrap_or_else(|_| {
            SigningKey::from_slice(&[7; 32]).expect("valid scalar")
        })
    }

    /// Builds an archive whose op hash and signature match `payload`.
    pub fn gen_signed_archive(
        height: Height,
        payload: serde_json::Value,
        key: &SigningKey,
    ) -> Archive {
        let hash = verify::content_hash(&payload);
        let signature: Signature = key.sign(&hash);
        let public_key = key.verifying_key().to_encoded_point(true);

        Archive {
            height,
            archive_type: 0,
            tx_hash: hex::encode(rand::random::<[u8; 32]>()),
            op_hash: hex::encode(hash),
            public_key: hex::encode(public_key.as_bytes()),
            signature: hex::encode(signature.to_der().as_bytes()),
            parents: vec![],
            account_nonce: 0,
            mind_nonce: 0,
            weight: 0,
            data: payload,
        }
    }
}
