// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.
//
// Copyright (c) DUSK NETWORK. All rights reserved.

//! Integrity checks for archives delivered by the chain.
//!
//! An archive is authentic when
//! - the SHA-256 of its normalized payload equals the declared `op_hash`,
//! - `signature` is a valid secp256k1 ECDSA signature of that hash by
//!   `public_key`.

use k256::ecdsa::signature::Verifier;
use k256::ecdsa::{Signature, VerifyingKey};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};

use crate::ledger::{Archive, Hash};

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum VerificationError {
    #[error("hash mismatch")]
    HashMismatch,
    #[error("invalid signature")]
    InvalidSignature,
}

/// Canonical byte form of an archive payload.
///
/// A string payload that embeds a JSON document is replaced by that
/// document; any other string is taken verbatim. JSON is re-encoded
/// compactly with object keys sorted at every level.
pub fn normalize(payload: &Value) -> Vec<u8> {
    match payload {
        Value::String(s) => match serde_json::from_str::<Value>(s) {
            Ok(embedded) => canonical_bytes(&embedded),
            Err(_) => s.as_bytes().to_vec(),
        },
        other => canonical_bytes(other),
    }
}

/// SHA-256 of the normalized payload.
pub fn content_hash(payload: &Value) -> Hash {
    Sha256::digest(normalize(payload)).into()
}

/// Checks both the content hash and the signature of `archive`.
pub fn verify(archive: &Archive) -> Result<(), VerificationError> {
    let hash = content_hash(&archive.data);

    let declared = decode_hex(&archive.op_hash)
        .map_err(|_| VerificationError::HashMismatch)?;
    if declared != hash {
        return Err(VerificationError::HashMismatch);
    }

    let key = decode_hex(&archive.public_key)
        .ok()
        .and_then(|bytes| VerifyingKey::from_sec1_bytes(&bytes).ok())
        .ok_or(VerificationError::InvalidSignature)?;

    let signature = decode_hex(&archive.signature)
        .ok()
        .and_then(|bytes| parse_signature(&bytes))
        .ok_or(VerificationError::InvalidSignature)?;

    key.verify(&hash, &signature)
        .map_err(|_| VerificationError::InvalidSignature)
}

/// Decodes a hex string with an optional `0x` prefix.
pub fn decode_hex(s: &str) -> Result<Vec<u8>, hex::FromHexError> {
    let s = s.trim();
    hex::decode(s.strip_prefix("0x").unwrap_or(s))
}

fn parse_signature(bytes: &[u8]) -> Option<Signature> {
    let signature = match bytes.len() {
        64 => Signature::from_slice(bytes).ok()?,
        // Compact form followed by a recovery id
        65 => Signature::from_slice(&bytes[..64]).ok()?,
        _ => Signature::from_der(bytes).ok()?,
    };

    // Only low-S signatures pass verification
    Some(signature.normalize_s().unwrap_or(signature))
}

fn canonical_bytes(value: &Value) -> Vec<u8> {
    serde_json::to_vec(&sorted(value))
        .expect("serializing a JSON value cannot fail")
}

fn sorted(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<_> = map.keys().collect();
            keys.sort();

            let mut out = Map::with_capacity(map.len());
            for k in keys {
                out.insert(k.clone(), sorted(&map[k]));
            }
            Value::Object(out)
        }
        Value::Array(items) => Value::Array(items.iter().map(sorted).collect()),
        other => other.clone(),
    }
}
