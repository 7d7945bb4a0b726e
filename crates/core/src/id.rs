// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Typed identifiers for control-plane entities.
//!
//! Every id renders as `{kind prefix}{random suffix}` and lives in a
//! fixed inline buffer, so ids are `Copy`, hash like their string form,
//! and never allocate. The entity kind rides along in the type: a
//! [`SessionId`] cannot be passed where an [`ApplicationId`] is
//! expected, even though both are just short strings on the wire.

use std::borrow::Borrow;
use std::fmt;
use std::marker::PhantomData;

/// Inline capacity: a 4-char kind prefix plus a 20-char random suffix.
const ID_CAP: usize = 24;

/// An entity kind that gets its own id type.
pub trait IdKind {
    /// Four-character prefix, e.g. `"ses-"`.
    const PREFIX: &'static str;
}

/// Marker types naming each id kind.
pub mod kind {
    pub enum Session {}
    pub enum Application {}
    pub enum Worker {}
    pub enum Intervention {}

    impl super::IdKind for Session {
        const PREFIX: &'static str = "ses-";
    }
    impl super::IdKind for Application {
        const PREFIX: &'static str = "app-";
    }
    impl super::IdKind for Worker {
        const PREFIX: &'static str = "wkr-";
    }
    impl super::IdKind for Intervention {
        const PREFIX: &'static str = "itv-";
    }
}

/// Identifier for a bounded application session.
pub type SessionId = Id<kind::Session>;
/// Identifier for one application attempt at one job posting.
pub type ApplicationId = Id<kind::Application>;
/// Identifier for a worker in the pool.
pub type WorkerId = Id<kind::Worker>;
/// Identifier for a human-intervention request.
pub type InterventionId = Id<kind::Intervention>;

/// A typed, inline entity id.
pub struct Id<K> {
    len: u8,
    bytes: [u8; ID_CAP],
    kind: PhantomData<K>,
}

impl<K> Id<K> {
    /// Wrap an existing id string (replay, wire input, test fixtures).
    ///
    /// Ids minted by [`Id::new`] always fit the inline buffer; foreign
    /// strings longer than the capacity are cut at the last full
    /// character so the stored bytes stay valid UTF-8.
    pub fn from_string(id: impl AsRef<str>) -> Self {
        let src = id.as_ref().as_bytes();
        let mut len = src.len().min(ID_CAP);
        // Never cut inside a multi-byte character.
        while len > 0 && len < src.len() && (src[len] & 0xC0) == 0x80 {
            len -= 1;
        }
        let mut bytes = [0u8; ID_CAP];
        bytes[..len].copy_from_slice(&src[..len]);
        Self { len: len as u8, bytes, kind: PhantomData }
    }

    pub fn as_str(&self) -> &str {
        // from_string only stores whole characters.
        std::str::from_utf8(&self.bytes[..self.len as usize]).unwrap_or("")
    }
}

impl<K: IdKind> Id<K> {
    pub const PREFIX: &'static str = K::PREFIX;

    /// Mint a fresh random id with the kind prefix.
    pub fn new() -> Self {
        Self::from_string(format!("{}{}", K::PREFIX, nanoid::nanoid!(20)))
    }

    /// The random part, without the kind prefix.
    pub fn suffix(&self) -> &str {
        self.as_str().strip_prefix(K::PREFIX).unwrap_or_else(|| self.as_str())
    }
}

impl<K: IdKind> Default for Id<K> {
    fn default() -> Self {
        Self::new()
    }
}

// The marker type is phantom; no impl below may bound on K, or ids of
// uninhabited kinds would lose Copy/Eq/Hash.

impl<K> Clone for Id<K> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<K> Copy for Id<K> {}

impl<K> PartialEq for Id<K> {
    fn eq(&self, other: &Self) -> bool {
        self.as_str() == other.as_str()
    }
}

impl<K> Eq for Id<K> {}

impl<K> std::hash::Hash for Id<K> {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        // Hash the string form so Borrow<str> map lookups line up.
        self.as_str().hash(state);
    }
}

impl<K> Borrow<str> for Id<K> {
    fn borrow(&self) -> &str {
        self.as_str()
    }
}

impl<K> fmt::Debug for Id<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.as_str())
    }
}

impl<K> fmt::Display for Id<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl<K> serde::Serialize for Id<K> {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de, K> serde::Deserialize<'de> for Id<K> {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct IdVisitor<K>(PhantomData<K>);

        impl<'de, K> serde::de::Visitor<'de> for IdVisitor<K> {
            type Value = Id<K>;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "an id string of at most {ID_CAP} bytes")
            }

            fn visit_str<E: serde::de::Error>(self, v: &str) -> Result<Self::Value, E> {
                if v.len() > ID_CAP {
                    return Err(E::custom(format!("id exceeds {ID_CAP} bytes: {v:?}")));
                }
                Ok(Id::from_string(v))
            }
        }

        deserializer.deserialize_str(IdVisitor(PhantomData))
    }
}

#[cfg(test)]
#[path = "id_tests.rs"]
mod tests;
