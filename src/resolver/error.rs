//! Error types for credential resolution.

use thiserror::Error;

/// The secret store could not be consulted at all.
///
/// Distinct from "the key is absent": an unavailable store is an
/// infrastructure fault and is propagated as-is, never downgraded to a
/// not-found answer.
#[derive(Error, Debug)]
#[error("secret store unavailable: {0}")]
pub struct SecretStoreError(pub String);

/// Errors that can occur while resolving tenant credentials.
#[derive(Error, Debug)]
pub enum ResolveError {
    /// No API key resolvable for the tenant.
    #[error("no API key found for the requesting organization")]
    KeyNotFound,

    /// The tenant has no stored model id.
    #[error("no model id found for the requesting organization")]
    ModelIdNotFound,

    /// The user has no tenant and no override applies.
    #[error("no default model id available for this user")]
    NoDefaultModelId,

    /// The store itself failed.
    #[error(transparent)]
    SecretStore(#[from] SecretStoreError),
}
