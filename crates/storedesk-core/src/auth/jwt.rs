//! Minimal JWT inspection: only the `exp` claim is read, signatures are the
//! server's business.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;
use tracing::debug;

#[derive(Debug, Deserialize)]
struct Claims {
    exp: Option<i64>,
}

/// Expiry time encoded in a JWT, if it can be read.
pub fn expires_at(token: &str) -> Option<DateTime<Utc>> {
    let mut parts = token.split('.');
    let (Some(_), Some(payload), Some(_), None) =
        (parts.next(), parts.next(), parts.next(), parts.next())
    else {
        return None;
    };

    // Some issuers pad their base64url segments
    let decoded = URL_SAFE_NO_PAD.decode(payload.trim_end_matches('=')).ok()?;
    let claims: Claims = serde_json::from_slice(&decoded).ok()?;
    DateTime::from_timestamp(claims.exp?, 0)
}

/// True when the token expires within `buffer` of `now`. Tokens whose expiry
/// cannot be read count as expiring.
pub fn expires_within_at(token: &str, buffer: Duration, now: DateTime<Utc>) -> bool {
    match expires_at(token) {
        Some(exp) => exp - now < buffer,
        None => {
            debug!("Token has no readable exp claim, treating as expiring");
            true
        }
    }
}

pub fn expires_within(token: &str, buffer: Duration) -> bool {
    expires_within_at(token, buffer, Utc::now())
}
