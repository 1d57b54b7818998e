//! Deterministic content and parameter fingerprints.
//!
//! A [`Fingerprint`] identifies the full construction history of a view:
//! the structural identity of the leaf source, every transform parameter
//! record along the chain, and any extraction-context parameters folded in
//! on top. Two views with equal fingerprints are interchangeable, and the
//! same logical inputs produce the same fingerprint across processes, so
//! fingerprints are safe to use as on-disk cache keys.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};

/// SHA-256 digest of a view's construction history, as 64 hex characters.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Fingerprint(String);

impl Fingerprint {
    /// Fingerprint a leaf view from its kind tag and structural identity.
    pub fn leaf<T: Serialize>(kind: &str, identity: &T) -> Result<Self> {
        let value = to_value(identity)?;
        let mut hasher = Sha256::new();
        hasher.update(b"leaf:");
        hasher.update(kind.as_bytes());
        hasher.update(b"\n");
        hash_canonical(&value, &mut hasher)?;
        Ok(Self(hex_digest(hasher)))
    }

    /// Fingerprint a transform node from its parent and parameter record.
    pub fn chained<T: Serialize>(parent: &Self, kind: &str, params: &T) -> Result<Self> {
        let value = to_value(params)?;
        let mut hasher = Sha256::new();
        hasher.update(b"node:");
        hasher.update(parent.0.as_bytes());
        hasher.update(b"\n");
        hasher.update(kind.as_bytes());
        hasher.update(b"\n");
        hash_canonical(&value, &mut hasher)?;
        Ok(Self(hex_digest(hasher)))
    }

    /// Combine several fingerprints with an extraction-context parameter
    /// record into one key.
    pub fn combined<T: Serialize>(parts: &[&Self], kind: &str, params: &T) -> Result<Self> {
        let value = to_value(params)?;
        let mut hasher = Sha256::new();
        hasher.update(b"combined:");
        hasher.update(kind.as_bytes());
        hasher.update(b"\n");
        for part in parts {
            hasher.update(part.0.as_bytes());
            hasher.update(b"\n");
        }
        hash_canonical(&value, &mut hasher)?;
        Ok(Self(hex_digest(hasher)))
    }

    /// Full hex digest.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Shortened digest for directory names and log lines.
    pub fn short(&self) -> &str {
        &self.0[..crate::constants::SHORT_FINGERPRINT_LEN.min(self.0.len())]
    }
}

impl std::fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

fn to_value<T: Serialize>(params: &T) -> Result<Value> {
    serde_json::to_value(params).map_err(|e| Error::Internal {
        message: format!("unserializable fingerprint input: {e}"),
    })
}

fn hex_digest(hasher: Sha256) -> String {
    use std::fmt::Write;
    let digest = hasher.finalize();
    let mut out = String::with_capacity(64);
    for byte in digest {
        let _ = write!(out, "{byte:02x}");
    }
    out
}

/// Feed a JSON value into the hasher in canonical form.
///
/// Object keys are visited in sorted order, integers are written in
/// decimal, and floats are written as their IEEE-754 bit pattern with
/// negative zero normalized to zero, so hashing is independent of map
/// ordering and float formatting.
fn hash_canonical(value: &Value, hasher: &mut Sha256) -> Result<()> {
    match value {
        Value::Null => hasher.update(b"n"),
        Value::Bool(b) => hasher.update(if *b { b"t" } else { b"f" }),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                hasher.update(format!("i{i}").as_bytes());
            } else if let Some(u) = n.as_u64() {
                hasher.update(format!("u{u}").as_bytes());
            } else if let Some(f) = n.as_f64() {
                let normalized = if f == 0.0 { 0.0 } else { f };
                hasher.update(format!("d{:016x}", normalized.to_bits()).as_bytes());
            } else {
                return Err(Error::Internal {
                    message: format!("unhashable number: {n}"),
                });
            }
        }
        Value::String(s) => {
            hasher.update(format!("s{}:", s.len()).as_bytes());
            hasher.update(s.as_bytes());
        }
        Value::Array(items) => {
            hasher.update(format!("a{}:", items.len()).as_bytes());
            for item in items {
                hash_canonical(item, hasher)?;
                hasher.update(b",");
            }
        }
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            hasher.update(format!("o{}:", keys.len()).as_bytes());
            for key in keys {
                hasher.update(format!("k{}:", key.len()).as_bytes());
                hasher.update(key.as_bytes());
                hasher.update(b"=");
                if let Some(v) = map.get(key) {
                    hash_canonical(v, hasher)?;
                }
                hasher.update(b";");
            }
        }
    }
    Ok(())
}
