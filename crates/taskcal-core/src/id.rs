//! Entity identifiers with remote provenance.
//!
//! Local entities own a string identifier. Once an entity has been created on
//! a provider, its identifier becomes [`EntityId::Remote`], which renders as
//! `"<provider>-<remote id>"` in the local store. Untagged identifiers are
//! locally originated and not yet synchronized.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::provider::Provider;

/// Identifier of a local task or event.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EntityId {
    /// Locally originated, never pushed.
    Local(String),
    /// Created on (or imported from) a provider.
    Remote {
        /// The provider holding the entity.
        provider: Provider,
        /// The provider's own identifier.
        remote_id: String,
    },
}

impl EntityId {
    /// Creates a local identifier.
    pub fn local(id: impl Into<String>) -> Self {
        Self::Local(id.into())
    }

    /// Creates a remote identifier.
    pub fn remote(provider: Provider, remote_id: impl Into<String>) -> Self {
        Self::Remote {
            provider,
            remote_id: remote_id.into(),
        }
    }

    /// Returns true if the entity has not been synchronized yet.
    pub fn is_local(&self) -> bool {
        matches!(self, Self::Local(_))
    }

    /// Returns the provider tag, if any.
    pub fn provider(&self) -> Option<Provider> {
        match self {
            Self::Local(_) => None,
            Self::Remote { provider, .. } => Some(*provider),
        }
    }

    /// Returns the remote identifier if this id is tagged with `provider`.
    pub fn remote_id_for(&self, provider: Provider) -> Option<&str> {
        match self {
            Self::Remote {
                provider: p,
                remote_id,
            } if *p == provider => Some(remote_id),
            _ => None,
        }
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Local(id) => f.write_str(id),
            Self::Remote {
                provider,
                remote_id,
            } => write!(f, "{}-{}", provider, remote_id),
        }
    }
}

impl FromStr for EntityId {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        for provider in Provider::ALL {
            if let Some(rest) = s
                .strip_prefix(provider.as_str())
                .and_then(|r| r.strip_prefix('-'))
                && !rest.is_empty()
            {
                return Ok(Self::remote(provider, rest));
            }
        }
        Ok(Self::Local(s.to_string()))
    }
}

impl From<&str> for EntityId {
    fn from(s: &str) -> Self {
        match s.parse() {
            Ok(id) => id,
            Err(never) => match never {},
        }
    }
}

impl Serialize for EntityId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for EntityId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Ok(EntityId::from(raw.as_str()))
    }
}
