// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Bearer tokens: `<subject-hex>.<expiry-unix>.<mac-hex>`.
//!
//! The MAC is keyed BLAKE3 over `<subject-hex>.<expiry-unix>`, with the key
//! derived from the service secret.

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

use super::password::decode_hash;
use crate::error::FleetError;

const KEY_CONTEXT: &str = "fleet-tires 2024-06 access token mac v1";

/// Default token lifetime in minutes.
pub const TOKEN_TTL_MINUTES: i64 = 1440;
/// Longest configurable token lifetime in minutes (one leap year).
pub const MAX_TOKEN_TTL_MINUTES: i64 = 366 * 24 * 60;

/// An issued bearer token.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct AccessToken {
    /// Opaque token string.
    pub access_token: String,
    /// Always `"bearer"`.
    pub token_type: &'static str,
    /// Moment the token stops validating.
    pub expires_at: DateTime<Utc>,
}

/// Issues and verifies tokens under one secret.
#[derive(Clone)]
pub struct TokenSigner {
    key: [u8; blake3::KEY_LEN],
    ttl: Duration,
}

impl std::fmt::Debug for TokenSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenSigner")
            .field("ttl", &self.ttl)
            .finish_non_exhaustive()
    }
}

impl TokenSigner {
    /// Derive the MAC key from `secret`.
    pub fn new(secret: &str, ttl: Duration) -> Self {
        Self {
            key: blake3::derive_key(KEY_CONTEXT, secret.as_bytes()),
            ttl,
        }
    }

    /// Derive the MAC key from `secret`, with a lifetime in whole minutes.
    ///
    /// # Errors
    /// [`FleetError::Validation`] unless `minutes` is in `1..=MAX_TOKEN_TTL_MINUTES`.
    pub fn with_ttl_minutes(secret: &str, minutes: i64) -> Result<Self, FleetError> {
        let ttl = Some(minutes)
            .filter(|m| (1..=MAX_TOKEN_TTL_MINUTES).contains(m))
            .and_then(Duration::try_minutes)
            .ok_or_else(|| {
                FleetError::validation(
                    "token_ttl_minutes",
                    format!("must be 1-{MAX_TOKEN_TTL_MINUTES}, got {minutes}"),
                )
            })?;
        Ok(Self::new(secret, ttl))
    }

    /// Token lifetime.
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Issue a token for `subject` valid until `now + ttl`.
    ///
    /// # Errors
    /// [`FleetError::Validation`] when the expiry is not a representable time.
    pub fn issue(&self, subject: &str, now: DateTime<Utc>) -> Result<AccessToken, FleetError> {
        let expires_at = now.checked_add_signed(self.ttl).ok_or_else(|| {
            FleetError::validation("token_ttl_minutes", "token expiry is out of range")
        })?;
        let claims = format!("{}.{}", hex::encode(subject), expires_at.timestamp());
        let mac = blake3::keyed_hash(&self.key, claims.as_bytes());
        Ok(AccessToken {
            access_token: format!("{claims}.{}", mac.to_hex()),
            token_type: "bearer",
            expires_at,
        })
    }

    /// Return the subject of a genuine, unexpired token.
    ///
    /// # Errors
    /// [`FleetError::Unauthenticated`] for malformed, forged or expired tokens.
    pub fn verify(&self, token: &str, now: DateTime<Utc>) -> Result<String, FleetError> {
        let (claims, mac) = token.rsplit_once('.').ok_or(FleetError::Unauthenticated)?;
        let (subject, expiry) = claims.split_once('.').ok_or(FleetError::Unauthenticated)?;
        let mac = decode_hash(mac).map_err(|_| FleetError::Unauthenticated)?;
        if blake3::keyed_hash(&self.key, claims.as_bytes()) != mac {
            return Err(FleetError::Unauthenticated);
        }
        let expiry: i64 = expiry.parse().map_err(|_| FleetError::Unauthenticated)?;
        if now.timestamp() >= expiry {
            return Err(FleetError::Unauthenticated);
        }
        let subject = hex::decode(subject).map_err(|_| FleetError::Unauthenticated)?;
        String::from_utf8(subject).map_err(|_| FleetError::Unauthenticated)
    }
}
