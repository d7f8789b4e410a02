//! Owner identity.
//!
//! Every key on the remote side is the pair `(owner, id)`, so the owner id is
//! validated once at the edge and carried around as a newtype afterwards.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Longest owner id accepted, in bytes.
pub const MAX_OWNER_ID_LEN: usize = 255;

/// Returned when a raw string cannot be used as an owner id.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InvalidOwnerId {
    #[error("owner id is empty")]
    Empty,

    #[error("owner id is {len} bytes long, maximum is {max}")]
    TooLong { len: usize, max: usize },

    #[error("owner id contains control characters")]
    ControlCharacters,
}

/// The tenant identity that scopes all composite keys and row-level access.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct OwnerId(String);

impl OwnerId {
    /// Validate a raw owner id.
    ///
    /// Surrounding whitespace is not trimmed: `" u1"` and `"u1"` are different
    /// owners as far as the backend is concerned, so the caller must pass the
    /// id exactly as the auth provider issued it.
    pub fn parse(raw: impl Into<String>) -> Result<Self, InvalidOwnerId> {
        let raw = raw.into();
        if raw.trim().is_empty() {
            return Err(InvalidOwnerId::Empty);
        }
        if raw.len() > MAX_OWNER_ID_LEN {
            return Err(InvalidOwnerId::TooLong {
                len: raw.len(),
                max: MAX_OWNER_ID_LEN,
            });
        }
        if raw.chars().any(char::is_control) {
            return Err(InvalidOwnerId::ControlCharacters);
        }
        Ok(Self(raw))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for OwnerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for OwnerId {
    type Error = InvalidOwnerId;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(value)
    }
}

impl From<OwnerId> for String {
    fn from(owner: OwnerId) -> Self {
        owner.0
    }
}

impl AsRef<str> for OwnerId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
