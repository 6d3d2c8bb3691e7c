//! Wire header names and Authorization construction.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;

use crate::secret::Secret;
use crate::token::BearerToken;

/// Correlation header, echoed back by the upstream.
pub const REQUEST_ID_HEADER: &str = "X-Request-ID";

/// Requesting user's UUID, sent on SaaS requests.
pub const REQUEST_USER_UUID_HEADER: &str = "X-Request-User-UUID";

/// `Authorization` value for the SaaS variant.
pub fn bearer(token: &BearerToken) -> String {
    format!("Bearer {}", token.access_token.expose())
}

/// `Authorization` value for the on-prem variant:
/// `ZenApiKey base64(username + ":" + api_key)`.
pub fn zen_api_key(username: &str, api_key: &Secret) -> String {
    let encoded = BASE64.encode(format!("{}:{}", username, api_key.expose()));
    format!("ZenApiKey {}", encoded)
}
