//! Secret references in `config.toml`.
//!
//! A provider `client_id` may point outside the file:
//!
//! - `pass::path/in/store`: first line of `pass show path/in/store`
//! - `env::VAR_NAME`: the value of `$VAR_NAME`
//! - anything else: used as written

use std::process::Command;

use crate::error::{ClientError, ClientResult};

/// Where a configured value comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SecretRef<'a> {
    /// An entry of the `pass` password store.
    Pass(&'a str),
    /// An environment variable.
    Env(&'a str),
    /// The value itself.
    Plain(&'a str),
}

impl<'a> SecretRef<'a> {
    /// Splits off a known prefix.
    pub fn parse(value: &'a str) -> Self {
        if let Some(path) = value.strip_prefix("pass::") {
            Self::Pass(path)
        } else if let Some(var) = value.strip_prefix("env::") {
            Self::Env(var)
        } else {
            Self::Plain(value)
        }
    }

    /// Looks the value up.
    pub fn lookup(self) -> ClientResult<String> {
        match self {
            Self::Pass(path) => pass_show(path),
            Self::Env(var) => std::env::var(var).map_err(|_| {
                ClientError::config(format!("environment variable `{}` is not set", var))
            }),
            Self::Plain(value) => Ok(value.to_string()),
        }
    }
}

/// Resolves a value that may carry a secret reference prefix.
///
/// Surrounding whitespace is trimmed; an empty result is an error.
pub fn resolve(value: &str) -> ClientResult<String> {
    let resolved = SecretRef::parse(value).lookup()?;
    let trimmed = resolved.trim();
    if trimmed.is_empty() {
        return Err(ClientError::config(format!(
            "secret reference '{}' resolved to an empty value",
            value
        )));
    }
    Ok(trimmed.to_string())
}

fn pass_show(path: &str) -> ClientResult<String> {
    let output = Command::new("pass")
        .args(["show", path])
        .output()
        .map_err(|e| ClientError::config(format!("cannot run `pass show {}`: {}", path, e)))?;

    if !output.status.success() {
        return Err(ClientError::config(format!(
            "`pass show {}` exited with {}: {}",
            path,
            output.status,
            String::from_utf8_lossy(&output.stderr).trim()
        )));
    }

    String::from_utf8_lossy(&output.stdout)
        .lines()
        .next()
        .map(str::to_string)
        .ok_or_else(|| ClientError::config(format!("`pass show {}` printed nothing", path)))
}
