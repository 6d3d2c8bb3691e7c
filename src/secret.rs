//! Redacted wrapper for credential material.
//!
//! API keys, bearer tokens, and IDP passwords travel through the pipeline as
//! [`Secret`] values. The inner string is only reachable through
//! [`Secret::expose`], and both `Debug` and `Display` render a fixed
//! placeholder, so a secret can never leak through a log line, an error
//! message, or a derived `Debug` on a containing struct.

use serde::Deserialize;
use std::fmt;

/// A credential string that refuses to print itself.
#[derive(Clone, PartialEq, Eq, Deserialize)]
#[serde(transparent)]
pub struct Secret(String);

impl Secret {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Access the underlying value. Call sites are the audit surface:
    /// header construction, form encoding, and store comparisons only.
    pub fn expose(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<&str> for Secret {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for Secret {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Secret(***)")
    }
}

impl fmt::Display for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "***")
    }
}
