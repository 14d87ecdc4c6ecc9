//! Provider and service identifiers.
//!
//! A [`Provider`] is an external account (Google, Microsoft, Todoist) that
//! requires OAuth-delegated access. A [`Service`] is one product of that
//! provider (its task service or its calendar service).

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// An external provider requiring OAuth-delegated access.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    /// Google (Tasks and Calendar).
    Google,
    /// Microsoft (To Do and Outlook Calendar).
    Microsoft,
    /// Todoist.
    Todoist,
}

impl Provider {
    /// All known providers, in display order.
    pub const ALL: [Provider; 3] = [Provider::Google, Provider::Microsoft, Provider::Todoist];

    /// Returns the stable lowercase key used for persistence and id tags.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Google => "google",
            Self::Microsoft => "microsoft",
            Self::Todoist => "todoist",
        }
    }

    /// Returns a human-readable provider name.
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::Google => "Google",
            Self::Microsoft => "Microsoft",
            Self::Todoist => "Todoist",
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when parsing an unknown provider or service name.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown {kind}: {value}")]
pub struct ParseNameError {
    kind: &'static str,
    value: String,
}

impl FromStr for Provider {
    type Err = ParseNameError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|p| p.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| ParseNameError {
                kind: "provider",
                value: s.to_string(),
            })
    }
}

/// A product offered by a provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Service {
    /// Task lists and tasks.
    Tasks,
    /// Calendars and events.
    Calendar,
}

impl Service {
    /// Returns the stable lowercase name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Tasks => "tasks",
            Self::Calendar => "calendar",
        }
    }
}

impl fmt::Display for Service {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Service {
    type Err = ParseNameError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "tasks" | "task" => Ok(Self::Tasks),
            "calendar" | "events" => Ok(Self::Calendar),
            _ => Err(ParseNameError {
                kind: "service",
                value: s.to_string(),
            }),
        }
    }
}
