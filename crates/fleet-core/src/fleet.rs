// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Service facade: one [`Fleet`] per process, built from an explicit store
//! handle. Every public operation runs in exactly one store transaction.

use std::sync::Arc;

use tracing::{info, info_span, span::EnteredSpan, warn};

use crate::auth::{
    hash_password, is_current_scheme, verify_password, AccessToken, AuthGate, Principal,
    TokenSigner,
};
use crate::clock::{Clock, SystemClock};
use crate::coverage::load_covered;
use crate::error::FleetError;
use crate::limits::FleetLimits;
use crate::model::{
    normalize_password, normalize_username, Account, CoveredVehicle, NewUser, User, Vehicle,
    VehicleId, WheelPosition,
};
use crate::registry::{self, VehicleUpdate};
use crate::schema::{self, SchemaReport};
use crate::store::{Constraint, FleetStore, StoreError, StoreTx};
use crate::tires::{self, TireUpdate};

/// Fleet service over a store `S`.
pub struct Fleet<S> {
    store: S,
    limits: FleetLimits,
    signer: TokenSigner,
    clock: Arc<dyn Clock>,
}

impl<S: FleetStore> Fleet<S> {
    /// Wire a fleet to its store. Uses the system clock.
    pub fn new(store: S, limits: FleetLimits, signer: TokenSigner) -> Self {
        Self {
            store,
            limits,
            signer,
            clock: Arc::new(SystemClock),
        }
    }

    /// Replace the clock used for install times and token expiry.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Configured limits.
    pub fn limits(&self) -> &FleetLimits {
        &self.limits
    }

    /// Underlying store handle.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Run the startup schema guard.
    pub fn reconcile_schema(&self) -> Result<SchemaReport, FleetError> {
        schema::reconcile_schema(&self.store, &self.limits)
    }

    // ── accounts ──

    /// Create `username` unless it already exists. Returns whether it was created.
    pub fn ensure_user(&self, username: &str, password: &str) -> Result<bool, FleetError> {
        self.store.transaction(|tx| {
            let username = normalize_username(username)?;
            if tx.user_by_username(&username)?.is_some() {
                return Ok(false);
            }
            let user = insert_account(tx, &username, password)?;
            info!(user = %user.id, username = %user.username, "default account created");
            Ok(true)
        })
    }

    /// Create an account on behalf of `principal`.
    pub fn create_user(
        &self,
        principal: &Principal,
        username: &str,
        password: &str,
    ) -> Result<Account, FleetError> {
        let _span = actor_span(principal, "create_user");
        self.store.transaction(|tx| {
            let username = normalize_username(username)?;
            let user = insert_account(tx, &username, password)?;
            info!(user = %user.id, username = %user.username, "account created");
            Ok(Account::from(&user))
        })
    }

    /// Exchange credentials for a bearer token.
    ///
    /// # Errors
    /// [`FleetError::Unauthenticated`] for an unknown name or wrong password;
    /// [`FleetError::Inactive`] for a disabled account.
    pub fn login(&self, username: &str, password: &str) -> Result<AccessToken, FleetError> {
        let user = self
            .store
            .transaction(|tx| tx.user_by_username(username.trim()))?
            .ok_or(FleetError::Unauthenticated)?;
        if !is_current_scheme(&user.hashed_password) {
            warn!(
                username = %user.username,
                "stored password digest uses an unsupported scheme; recreate the account"
            );
        }
        if !verify_password(password.trim(), &user.hashed_password) {
            return Err(FleetError::Unauthenticated);
        }
        let principal = Principal::admit(user)?;
        info!(username = principal.username(), "login");
        self.signer.issue(principal.username(), self.clock.now())
    }

    /// Resolve a token to its principal.
    pub fn whoami(&self, token: &str) -> Result<Principal, FleetError> {
        self.authenticate(token)
    }

    // ── vehicles ──

    /// Vehicles whose plate contains `query`, ordered by plate.
    pub fn vehicles(
        &self,
        principal: &Principal,
        query: Option<&str>,
    ) -> Result<Vec<Vehicle>, FleetError> {
        let _span = actor_span(principal, "vehicles");
        self.store.transaction(|tx| registry::search(tx, query))
    }

    /// Register a vehicle with all of its wheel positions.
    pub fn register_vehicle(
        &self,
        principal: &Principal,
        plate: &str,
        description: Option<&str>,
    ) -> Result<CoveredVehicle, FleetError> {
        let _span = actor_span(principal, "register_vehicle");
        self.store
            .transaction(|tx| registry::register(tx, plate, description, &self.limits))
    }

    /// One vehicle with its complete set of positions.
    pub fn vehicle(
        &self,
        principal: &Principal,
        id: VehicleId,
    ) -> Result<CoveredVehicle, FleetError> {
        let _span = actor_span(principal, "vehicle");
        self.store.transaction(|tx| load_covered(tx, id, &self.limits))
    }

    /// Partially update a vehicle.
    pub fn update_vehicle(
        &self,
        principal: &Principal,
        id: VehicleId,
        changes: &VehicleUpdate,
    ) -> Result<Vehicle, FleetError> {
        let _span = actor_span(principal, "update_vehicle");
        self.store
            .transaction(|tx| registry::update(tx, id, changes, &self.limits))
    }

    /// Delete a vehicle and its positions.
    pub fn delete_vehicle(&self, principal: &Principal, id: VehicleId) -> Result<(), FleetError> {
        let _span = actor_span(principal, "delete_vehicle");
        self.store.transaction(|tx| registry::delete(tx, id))
    }

    // ── wheel positions ──

    /// Positions of a vehicle, ordered by index.
    pub fn wheel_positions(
        &self,
        principal: &Principal,
        id: VehicleId,
    ) -> Result<Vec<WheelPosition>, FleetError> {
        let _span = actor_span(principal, "wheel_positions");
        self.store
            .transaction(|tx| load_covered(tx, id, &self.limits))
            .map(|covered| covered.wheel_positions)
    }

    /// Mount a tire, or clear the slot when `serial` is absent or blank.
    pub fn set_tire(
        &self,
        principal: &Principal,
        id: VehicleId,
        index: u32,
        serial: Option<&str>,
    ) -> Result<WheelPosition, FleetError> {
        let _span = actor_span(principal, "set_tire");
        let now = self.clock.now();
        self.store
            .transaction(|tx| tires::set_tire(tx, id, index, serial, &self.limits, now))
    }

    /// Clear a slot.
    pub fn remove_tire(
        &self,
        principal: &Principal,
        id: VehicleId,
        index: u32,
    ) -> Result<WheelPosition, FleetError> {
        self.set_tire(principal, id, index, None)
    }

    /// Apply a batch of tire updates all-or-nothing.
    pub fn bulk_set_tires(
        &self,
        principal: &Principal,
        id: VehicleId,
        items: &[TireUpdate],
    ) -> Result<Vec<WheelPosition>, FleetError> {
        let _span = actor_span(principal, "bulk_set_tires");
        let now = self.clock.now();
        self.store
            .transaction(|tx| tires::bulk_set_tires(tx, id, items, &self.limits, now))
    }
}

impl<S: FleetStore> AuthGate for Fleet<S> {
    fn authenticate(&self, token: &str) -> Result<Principal, FleetError> {
        let subject = self.signer.verify(token, self.clock.now())?;
        let user = self
            .store
            .transaction(|tx| tx.user_by_username(&subject))?
            .ok_or(FleetError::Unauthenticated)?;
        Principal::admit(user)
    }
}

fn actor_span(principal: &Principal, op: &'static str) -> EnteredSpan {
    info_span!("fleet", op, actor = principal.username()).entered()
}

fn insert_account(
    tx: &mut dyn StoreTx,
    username: &str,
    password: &str,
) -> Result<User, FleetError> {
    let password = normalize_password(password)?;
    if tx.user_by_username(username)?.is_some() {
        return Err(FleetError::DuplicateUsername(username.to_owned()));
    }
    let new_user = NewUser {
        username: username.to_owned(),
        hashed_password: hash_password(&password),
    };
    tx.insert_user(&new_user).map_err(|err| match err {
        StoreError::ConstraintViolation {
            constraint: Constraint::Username,
        } => FleetError::DuplicateUsername(username.to_owned()),
        other => other.into(),
    })
}
