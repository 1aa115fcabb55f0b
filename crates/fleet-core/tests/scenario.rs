// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>

#![allow(missing_docs)]
#![allow(clippy::unwrap_used)]

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use fleet_core::{
    AuthGate, Clock, Field, Fleet, FleetError, FleetLimits, FleetStore, ManualClock, MemoryStore,
    PlatePolicy, Principal, TireState, TireUpdate, TokenSigner, VehicleUpdate,
};

struct Harness {
    fleet: Fleet<Arc<MemoryStore>>,
    store: Arc<MemoryStore>,
    clock: Arc<ManualClock>,
    admin: Principal,
}

fn harness_with(store: MemoryStore, limits: FleetLimits) -> Harness {
    let store = Arc::new(store);
    let clock = Arc::new(ManualClock::new(
        DateTime::<Utc>::UNIX_EPOCH + Duration::days(19_800),
    ));
    let fleet = Fleet::new(
        store.clone(),
        limits,
        TokenSigner::new("change-me-please", Duration::minutes(1440)),
    )
    .with_clock(clock.clone());
    fleet.reconcile_schema().unwrap();
    fleet.ensure_user("admin", "admin123").unwrap();
    let token = fleet.login("admin", "admin123").unwrap();
    let admin = fleet.authenticate(&token.access_token).unwrap();
    Harness {
        fleet,
        store,
        clock,
        admin,
    }
}

fn harness() -> Harness {
    harness_with(MemoryStore::new(), FleetLimits::default())
}

#[test]
fn create_set_clear_bulk() {
    let h = harness();

    // 1. register
    let covered = h.fleet.register_vehicle(&h.admin, "LT 123 CM", None).unwrap();
    let id = covered.vehicle.id;
    assert_eq!(covered.wheel_positions.len(), 20);
    assert!(covered.wheel_positions.iter().all(|p| p.tire.tire_serial.is_none()));

    // 2. mount
    let position = h.fleet.set_tire(&h.admin, id, 1, Some("TIRE001")).unwrap();
    assert_eq!(position.tire.tire_serial.as_deref(), Some("TIRE001"));
    assert!(position.tire.installed_at.is_some());

    // 3. clear with an empty serial
    let position = h.fleet.set_tire(&h.admin, id, 1, Some("")).unwrap();
    assert_eq!(position.tire, TireState::EMPTY);

    // 4. bulk
    h.clock.advance(Duration::minutes(1));
    let items = [TireUpdate::mount(1, "TIRE-A"), TireUpdate::mount(2, "TIRE-B")];
    let positions = h.fleet.bulk_set_tires(&h.admin, id, &items).unwrap();
    assert_eq!(positions.len(), 20);
    assert_eq!(positions[0].tire.tire_serial.as_deref(), Some("TIRE-A"));
    assert_eq!(positions[1].tire.tire_serial.as_deref(), Some("TIRE-B"));
    assert!(positions[2..].iter().all(|p| p.tire == TireState::EMPTY));

    let detail = h.fleet.vehicle(&h.admin, id).unwrap();
    assert_eq!(detail.wheel_positions, positions);
}

#[test]
fn duplicate_plate_leaves_one_vehicle() {
    let h = harness();
    h.fleet.register_vehicle(&h.admin, "LT 123 CM", None).unwrap();
    assert_eq!(
        h.fleet.register_vehicle(&h.admin, "LT 123 CM", Some("again")),
        Err(FleetError::DuplicatePlate("LT 123 CM".into()))
    );
    let found = h.fleet.vehicles(&h.admin, Some("lt 123")).unwrap();
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].description, None);
}

#[test]
fn bulk_with_bad_index_changes_nothing() {
    let h = harness();
    let id = h.fleet.register_vehicle(&h.admin, "LT 123 CM", None).unwrap().vehicle.id;
    h.fleet.set_tire(&h.admin, id, 3, Some("KEEP")).unwrap();
    let before = h.fleet.wheel_positions(&h.admin, id).unwrap();

    let items = [
        TireUpdate::mount(1, "A"),
        TireUpdate::clear(3),
        TireUpdate::mount(0, "B"),
    ];
    assert!(matches!(
        h.fleet.bulk_set_tires(&h.admin, id, &items),
        Err(FleetError::InvalidPositionIndex { index: 0, .. })
    ));
    assert_eq!(h.fleet.wheel_positions(&h.admin, id).unwrap(), before);
}

#[test]
fn missing_vehicle_and_capacity() {
    let h = harness_with(MemoryStore::new(), FleetLimits::new(20, 2).unwrap());
    let id = h.fleet.register_vehicle(&h.admin, "AAA 111", None).unwrap().vehicle.id;
    h.fleet.register_vehicle(&h.admin, "BBB 222", None).unwrap();
    assert_eq!(
        h.fleet.register_vehicle(&h.admin, "CCC 333", None),
        Err(FleetError::CapacityExceeded { limit: 2 })
    );

    h.fleet.delete_vehicle(&h.admin, id).unwrap();
    assert_eq!(
        h.fleet.set_tire(&h.admin, id, 1, Some("T")),
        Err(FleetError::VehicleNotFound(id))
    );
    h.fleet.register_vehicle(&h.admin, "CCC 333", None).unwrap();
}

#[test]
fn legacy_vehicle_is_repaired_on_startup() {
    let legacy = MemoryStore::legacy();
    let id = legacy
        .transaction(|tx| {
            let vehicle = tx.insert_vehicle("OLD 0001", Some("pre-tracking"))?;
            tx.insert_wheel_position(vehicle.id, 2, &TireState {
                tire_serial: Some("LEGACY".into()),
                installed_at: None,
            })?;
            Ok::<_, fleet_core::StoreError>(vehicle.id)
        })
        .unwrap();

    let h = harness_with(legacy, FleetLimits::default());
    let positions = h.store.transaction(|tx| tx.wheel_positions(id)).unwrap();
    assert_eq!(positions.len(), 20);
    assert_eq!(positions[1].tire.tire_serial.as_deref(), Some("LEGACY"));

    // install tracking works once the column exists
    let position = h.fleet.set_tire(&h.admin, id, 2, Some("NEW")).unwrap();
    assert!(position.tire.installed_at.is_some());
}

#[test]
fn plate_policy_governs_updates() {
    let h = harness_with(
        MemoryStore::new(),
        FleetLimits::default().with_plate_policy(PlatePolicy::Mutable),
    );
    let id = h.fleet.register_vehicle(&h.admin, "LT 123 CM", None).unwrap().vehicle.id;
    let changes = VehicleUpdate {
        license_plate: Field::Set("LT 321 CM".into()),
        description: Field::Set(Some("renumbered".into())),
    };
    let vehicle = h.fleet.update_vehicle(&h.admin, id, &changes).unwrap();
    assert_eq!(vehicle.license_plate, "LT 321 CM");
    assert_eq!(vehicle.description.as_deref(), Some("renumbered"));
}

#[test]
fn gate_rejects_foreign_and_malformed_tokens() {
    let h = harness();
    assert_eq!(
        h.fleet.authenticate("not-a-token"),
        Err(FleetError::Unauthenticated)
    );

    let other = TokenSigner::new("someone-else", Duration::minutes(5));
    let forged = other.issue("admin", h.clock.now()).unwrap();
    assert_eq!(
        h.fleet.authenticate(&forged.access_token),
        Err(FleetError::Unauthenticated)
    );
}
