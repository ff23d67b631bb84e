//! Identifier types used across the ledger
//!
//! Channel and message ids are plain ordinals assigned by the ledger. Addresses
//! are the caller identities supplied by the host envelope, and group keys are
//! digests derived from subscriber credentials.

use crate::{hash, QuayError};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Channel identifier, assigned 0, 1, 2, ... in creation order
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct ChannelId(pub u64);

impl ChannelId {
    /// Get the raw ordinal
    pub fn value(&self) -> u64 {
        self.0
    }

    /// Id that follows this one
    pub fn next(&self) -> Self {
        Self(self.0 + 1)
    }
}

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "channel-{}", self.0)
    }
}

impl From<u64> for ChannelId {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

/// Message identifier; the channel's message count at publish time
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct MessageId(pub u64);

impl MessageId {
    /// Get the raw ordinal
    pub fn value(&self) -> u64 {
        self.0
    }

    /// Id that follows this one
    pub fn next(&self) -> Self {
        Self(self.0 + 1)
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "message-{}", self.0)
    }
}

impl From<u64> for MessageId {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

/// Opaque publisher ordinal recorded on join; never used for delivery
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct PublisherIndex(pub u32);

/// Caller identity supplied by the host's transaction envelope
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct Address(pub [u8; 20]);

impl Address {
    /// Byte length of an address
    pub const LEN: usize = 20;

    /// Create from raw bytes
    pub fn from_bytes(bytes: [u8; 20]) -> Self {
        Self(bytes)
    }

    /// Deterministic address derived from a label, handy for fixtures and scenarios
    pub fn from_label(label: &str) -> Self {
        let digest = hash::hash(label.as_bytes());
        let mut bytes = [0u8; 20];
        bytes.copy_from_slice(&digest[12..]);
        Self(bytes)
    }

    /// Raw bytes
    pub fn as_bytes(&self) -> &[u8; 20] {
        &self.0
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl FromStr for Address {
    type Err = QuayError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let raw = s.strip_prefix("0x").unwrap_or(s);
        let bytes = hex::decode(raw)
            .map_err(|e| QuayError::invalid(format!("Invalid address {s}: {e}")))?;
        let bytes: [u8; 20] = bytes.try_into().map_err(|_| {
            QuayError::invalid(format!("Address must be {} bytes: {s}", Self::LEN))
        })?;
        Ok(Self(bytes))
    }
}

impl Serialize for Address {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Address {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Consumer group identity: `Hash(channel id, credential)`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct GroupKey(pub [u8; 32]);

impl GroupKey {
    /// Derive the group key for a credential on a channel
    pub fn derive(channel_id: ChannelId, credential: &Credential) -> Self {
        let mut h = hash::hasher();
        h.update(hash::GROUP_KEY_DOMAIN);
        h.update(&channel_id.value().to_be_bytes());
        h.update(&(credential.public_key.len() as u64).to_be_bytes());
        h.update(&credential.public_key);
        h.update(&credential.index.to_be_bytes());
        Self(h.finalize())
    }

    /// Raw digest bytes
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Abbreviated form for log output
    pub fn short(&self) -> String {
        hex::encode(&self.0[..6])
    }
}

impl fmt::Display for GroupKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl FromStr for GroupKey {
    type Err = QuayError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let raw = s.strip_prefix("0x").unwrap_or(s);
        let bytes = hex::decode(raw)
            .map_err(|e| QuayError::invalid(format!("Invalid group key {s}: {e}")))?;
        let bytes: [u8; 32] = bytes
            .try_into()
            .map_err(|_| QuayError::invalid(format!("Group key must be 32 bytes: {s}")))?;
        Ok(Self(bytes))
    }
}

impl Serialize for GroupKey {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for GroupKey {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Subscriber credential material: public key bytes plus derivation index.
///
/// The key's internal structure is never interpreted; it only feeds the group
/// key digest.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Credential {
    /// Opaque public key material (e.g. an extended public key)
    #[serde(with = "serde_bytes")]
    pub public_key: Vec<u8>,
    /// Derivation index
    pub index: u32,
}

impl Credential {
    /// Create a credential from key material and index
    pub fn new(public_key: impl Into<Vec<u8>>, index: u32) -> Self {
        Self {
            public_key: public_key.into(),
            index,
        }
    }
}
