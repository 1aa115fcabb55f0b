// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Authentication: password digests, bearer tokens and the gate that turns a
//! token into a [`Principal`].

mod password;
mod token;

use serde::Serialize;

pub use password::{hash_password, is_current_scheme, verify_password};
pub use token::{AccessToken, TokenSigner, MAX_TOKEN_TTL_MINUTES, TOKEN_TTL_MINUTES};

use crate::error::FleetError;
use crate::model::{User, UserId};

/// An authenticated, active user.
///
/// Only this crate can construct one, so holding a `Principal` proves the
/// caller passed an [`AuthGate`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Principal {
    id: UserId,
    username: String,
    is_superuser: bool,
}

impl Principal {
    pub(crate) fn admit(user: User) -> Result<Self, FleetError> {
        if !user.is_active {
            return Err(FleetError::Inactive);
        }
        Ok(Self {
            id: user.id,
            username: user.username,
            is_superuser: user.is_superuser,
        })
    }

    /// User id.
    pub fn id(&self) -> UserId {
        self.id
    }

    /// Login name.
    pub fn username(&self) -> &str {
        &self.username
    }

    /// Privilege flag.
    pub fn is_superuser(&self) -> bool {
        self.is_superuser
    }
}

/// Resolves a bearer credential to a principal.
pub trait AuthGate {
    /// # Errors
    /// [`FleetError::Unauthenticated`] for a bad token or unknown subject,
    /// [`FleetError::Inactive`] for a disabled account.
    fn authenticate(&self, token: &str) -> Result<Principal, FleetError>;
}
