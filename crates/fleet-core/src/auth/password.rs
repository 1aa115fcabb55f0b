// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Salted BLAKE3 password digests.
//!
//! Encoded as `b3$<salt-hex>$<digest-hex>`; the digest is BLAKE3 in derive-key
//! mode over `salt || password`.

use blake3::{Hash, Hasher};

const SCHEME: &str = "b3";
const CONTEXT: &str = "fleet-tires 2024-06 password digest v1";
const SALT_LEN: usize = 16;

/// Digest `password` with a fresh random salt.
pub fn hash_password(password: &str) -> String {
    let salt: [u8; SALT_LEN] = rand::random();
    let digest = digest(&salt, password);
    format!("{SCHEME}${}${}", hex::encode(salt), digest.to_hex())
}

/// Whether `encoded` uses the scheme [`hash_password`] writes. Digests from
/// other schemes (bcrypt rows of older deployments) never verify.
pub fn is_current_scheme(encoded: &str) -> bool {
    encoded
        .split_once('$')
        .is_some_and(|(scheme, _)| scheme == SCHEME)
}

/// Check `password` against an encoded digest. Malformed encodings never match.
pub fn verify_password(password: &str, encoded: &str) -> bool {
    let mut parts = encoded.split('$');
    let (Some(SCHEME), Some(salt), Some(expected), None) =
        (parts.next(), parts.next(), parts.next(), parts.next())
    else {
        return false;
    };
    let (Ok(salt), Ok(expected)) = (hex::decode(salt), decode_hash(expected)) else {
        return false;
    };
    // `Hash` equality is constant-time.
    digest(&salt, password) == expected
}

pub(crate) fn decode_hash(hex_digest: &str) -> Result<Hash, hex::FromHexError> {
    let mut bytes = [0u8; blake3::OUT_LEN];
    hex::decode_to_slice(hex_digest, &mut bytes)?;
    Ok(Hash::from(bytes))
}

fn digest(salt: &[u8], password: &str) -> Hash {
    let mut hasher = Hasher::new_derive_key(CONTEXT);
    hasher.update(salt);
    hasher.update(password.as_bytes());
    hasher.finalize()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip_and_mismatch() {
        let encoded = hash_password("admin123");
        assert!(encoded.starts_with("b3$"));
        assert!(verify_password("admin123", &encoded));
        assert!(!verify_password("admin124", &encoded));
    }

    #[test]
    fn salt_differs_per_call() {
        assert_ne!(hash_password("same"), hash_password("same"));
    }

    #[test]
    fn bcrypt_rows_are_foreign_and_never_match() {
        let bcrypt = "$2b$12$R9h/cIPz0gi.URNNX3kh2OPST9/PgBkqquzi.Ss7KIUgO2t0jWMUW";
        assert!(!is_current_scheme(bcrypt));
        assert!(!verify_password("admin123", bcrypt));
        assert!(is_current_scheme(&hash_password("admin123")));
    }

    #[test]
    fn malformed_encodings_never_match() {
        for encoded in ["", "b3$zz$00", "bcrypt$abc$def", "b3$00$00$00", "b3$00"] {
            assert!(!verify_password("x", encoded), "{encoded}");
        }
    }
}
