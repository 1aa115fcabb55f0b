// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Startup schema guard.
//!
//! Brings persisted data up to the current layout without a migration
//! framework: first the `installed_at` column, then wheel-position backfill for
//! every vehicle. Each step is its own transaction. Safe to run on every start;
//! a satisfied store yields an all-zero [`SchemaReport`].

use serde::Serialize;
use tracing::info;

use crate::coverage::ensure_full_coverage;
use crate::error::FleetError;
use crate::limits::FleetLimits;
use crate::store::{FleetStore, SqlDialect, StoreTx, INSTALLED_AT_COLUMN, WHEEL_POSITIONS_TABLE};

/// What one guard run changed.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct SchemaReport {
    /// The install timestamp column was missing and has been added.
    pub installed_at_added: bool,
    /// Vehicles that needed at least one placeholder position.
    pub vehicles_repaired: usize,
    /// Placeholder positions created across the fleet.
    pub positions_inserted: usize,
}

impl SchemaReport {
    /// Whether the store already satisfied the layout.
    pub fn is_noop(&self) -> bool {
        *self == Self::default()
    }
}

/// Timestamp column type for `dialect`.
pub fn timestamp_column_type(dialect: SqlDialect) -> &'static str {
    match dialect {
        SqlDialect::Postgres => "TIMESTAMP WITH TIME ZONE",
        SqlDialect::MySql => "DATETIME(6)",
        SqlDialect::Sqlite | SqlDialect::Other => "DATETIME",
    }
}

/// Run the guard. Any error is meant to abort startup.
pub fn reconcile_schema<S: FleetStore>(
    store: &S,
    limits: &FleetLimits,
) -> Result<SchemaReport, FleetError> {
    let installed_at_added = store.transaction(ensure_installed_at)?;
    let (vehicles_repaired, positions_inserted) =
        store.transaction(|tx| backfill_positions(tx, limits))?;

    let report = SchemaReport {
        installed_at_added,
        vehicles_repaired,
        positions_inserted,
    };
    if report.is_noop() {
        info!("schema up to date");
    } else {
        info!(
            installed_at_added,
            vehicles_repaired, positions_inserted, "schema reconciled"
        );
    }
    Ok(report)
}

fn ensure_installed_at(tx: &mut dyn StoreTx) -> Result<bool, FleetError> {
    // A missing table is created complete by the store's bootstrap.
    let Some(columns) = tx.table_columns(WHEEL_POSITIONS_TABLE)? else {
        return Ok(false);
    };
    if columns.iter().any(|c| c == INSTALLED_AT_COLUMN) {
        return Ok(false);
    }
    let definition = timestamp_column_type(tx.dialect());
    tx.add_column(WHEEL_POSITIONS_TABLE, INSTALLED_AT_COLUMN, definition)?;
    info!(
        table = WHEEL_POSITIONS_TABLE,
        column = INSTALLED_AT_COLUMN,
        definition,
        "column added"
    );
    Ok(true)
}

fn backfill_positions(
    tx: &mut dyn StoreTx,
    limits: &FleetLimits,
) -> Result<(usize, usize), FleetError> {
    let mut repaired = 0;
    let mut inserted = 0;
    for id in tx.vehicle_ids()? {
        let coverage = ensure_full_coverage(tx, id, limits)?;
        if coverage.inserted > 0 {
            repaired += 1;
            inserted += coverage.inserted;
        }
    }
    Ok((repaired, inserted))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::memory::MemoryStore;

    #[test]
    fn dialect_column_types() {
        assert_eq!(timestamp_column_type(SqlDialect::Postgres), "TIMESTAMP WITH TIME ZONE");
        assert_eq!(timestamp_column_type(SqlDialect::MySql), "DATETIME(6)");
        assert_eq!(timestamp_column_type(SqlDialect::Sqlite), "DATETIME");
    }

    #[test]
    fn repairs_legacy_store_then_goes_quiet() {
        let store = MemoryStore::legacy();
        let limits = FleetLimits::new(6, 10).unwrap();
        store
            .transaction(|tx| {
                tx.insert_vehicle("LT 123 CM", None)?;
                tx.insert_vehicle("MH 12 XY 9999", None)
            })
            .unwrap();

        let report = reconcile_schema(&store, &limits).unwrap();
        assert_eq!(
            report,
            SchemaReport {
                installed_at_added: true,
                vehicles_repaired: 2,
                positions_inserted: 12,
            }
        );
        assert!(reconcile_schema(&store, &limits).unwrap().is_noop());
    }

    #[test]
    fn raised_slot_count_backfills_the_difference() {
        let store = MemoryStore::new();
        let small = FleetLimits::new(4, 10).unwrap();
        let large = FleetLimits::new(8, 10).unwrap();
        let id = store
            .transaction(|tx| crate::registry::register(tx, "LT 123 CM", None, &small))
            .unwrap()
            .vehicle
            .id;

        let report = reconcile_schema(&store, &large).unwrap();
        assert!(!report.installed_at_added);
        assert_eq!(report.positions_inserted, 4);
        assert_eq!(store.transaction(|tx| tx.wheel_positions(id)).unwrap().len(), 8);
    }
}
