// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Wiring: settings, store, startup guard and command dispatch.

use std::fs;
use std::path::Path;

use anyhow::{anyhow, Context, Result};
use fleet_app_core::config::ConfigService;
use fleet_app_core::ServiceSettings;
use fleet_config_fs::FsConfigStore;
use fleet_core::layout::{self, Slot};
use fleet_core::{
    AuthGate, Field, Fleet, FleetStore, Principal, SchemaReport, TireUpdate, VehicleId,
    VehicleUpdate, WheelPosition,
};
use fleet_store_sqlite::SqliteStore;
use serde::Serialize;
use serde_json::{json, Value};
use tracing::{info, warn};

use crate::cli::{Cli, Command, Overrides, UserCommand, VehicleCommand, WheelCommand};

/// Result of the startup guard.
#[derive(Debug, Serialize)]
pub struct Startup {
    schema: SchemaReport,
    admin_created: bool,
}

/// Wheel position with its place on the vehicle.
#[derive(Debug, Serialize)]
struct PositionView<'a> {
    #[serde(flatten)]
    position: &'a WheelPosition,
    slot: Option<Slot>,
    label: Option<String>,
}

impl<'a> From<&'a WheelPosition> for PositionView<'a> {
    fn from(position: &'a WheelPosition) -> Self {
        let slot = layout::slot(position.position_index);
        Self {
            position,
            slot,
            label: slot.map(|slot| slot.to_string()),
        }
    }
}

/// Run one invocation end to end and return its JSON output.
pub fn run(cli: Cli) -> Result<Value> {
    let settings = resolve_settings(&cli.overrides);
    if settings.uses_default_secret() {
        warn!("SECRET_KEY is the shipped placeholder; tokens can be forged");
    }
    let store = SqliteStore::open(&settings.database_path, settings.busy_timeout())
        .with_context(|| format!("open database {}", settings.database_path.display()))?;
    let fleet = Fleet::new(store, settings.limits()?, settings.token_signer()?);
    let startup = start(&fleet, &settings)?;
    dispatch(&fleet, startup, cli.token.as_deref(), cli.command)
}

/// Config file first (best effort), then flag and environment overrides.
pub fn resolve_settings(overrides: &Overrides) -> ServiceSettings {
    let store = match &overrides.config_dir {
        Some(dir) => FsConfigStore::at(dir),
        None => FsConfigStore::new(),
    };
    let mut settings = store
        .and_then(|store| ServiceSettings::load_or_init(&ConfigService::new(store)))
        .unwrap_or_else(|err| {
            warn!(error = %err, "settings unavailable, using defaults");
            ServiceSettings::default()
        });
    if let Some(url) = &overrides.database_url {
        settings.set_database_url(url);
    }
    if let Some(secret) = &overrides.secret_key {
        settings.secret_key.clone_from(secret);
    }
    if let Some(username) = &overrides.admin_username {
        settings.default_admin_username.clone_from(username);
    }
    if let Some(password) = &overrides.admin_password {
        settings.default_admin_password.clone_from(password);
    }
    if let Some(ttl) = overrides.token_ttl_minutes {
        settings.token_ttl_minutes = ttl;
    }
    settings
}

/// Schema guard then account bootstrap. A failing guard aborts startup.
pub fn start<S: FleetStore>(fleet: &Fleet<S>, settings: &ServiceSettings) -> Result<Startup> {
    let schema = fleet.reconcile_schema().context("schema reconciliation failed")?;
    let admin_created = fleet
        .ensure_user(
            &settings.default_admin_username,
            &settings.default_admin_password,
        )
        .context("seed default account")?;
    if admin_created {
        info!(username = %settings.default_admin_username, "seeded default account");
    }
    Ok(Startup {
        schema,
        admin_created,
    })
}

/// Execute `command`. Everything but `init` and `login` goes through the gate.
pub fn dispatch<S: FleetStore>(
    fleet: &Fleet<S>,
    startup: Startup,
    token: Option<&str>,
    command: Command,
) -> Result<Value> {
    let principal = match &command {
        Command::Init => return Ok(serde_json::to_value(startup)?),
        Command::Login { username, password } => {
            return Ok(serde_json::to_value(fleet.login(username, password)?)?)
        }
        _ => {
            let token = token.ok_or_else(|| anyhow!("no token: pass --token or set FLEET_TOKEN"))?;
            fleet.authenticate(token)?
        }
    };

    match command {
        Command::Init | Command::Login { .. } => Ok(Value::Null),
        Command::Whoami => Ok(serde_json::to_value(&principal)?),
        Command::User(UserCommand::Add { username, password }) => Ok(serde_json::to_value(
            fleet.create_user(&principal, &username, &password)?,
        )?),
        Command::Vehicle(cmd) => vehicle(fleet, &principal, cmd),
        Command::Wheel(cmd) => wheel(fleet, &principal, cmd),
    }
}

fn vehicle<S: FleetStore>(
    fleet: &Fleet<S>,
    principal: &Principal,
    cmd: VehicleCommand,
) -> Result<Value> {
    let value = match cmd {
        VehicleCommand::List { query } => {
            serde_json::to_value(fleet.vehicles(principal, query.as_deref())?)?
        }
        VehicleCommand::Create { plate, description } => serde_json::to_value(
            fleet.register_vehicle(principal, &plate, description.as_deref())?,
        )?,
        VehicleCommand::Show { id } => {
            let covered = fleet.vehicle(principal, VehicleId(id))?;
            json!({
                "vehicle": covered.vehicle,
                "wheel_positions": views(&covered.wheel_positions),
            })
        }
        VehicleCommand::Update {
            id,
            plate,
            description,
            clear_description,
        } => {
            let changes = VehicleUpdate {
                license_plate: plate.map_or(Field::Unset, Field::Set),
                description: match (description, clear_description) {
                    (_, true) => Field::Set(None),
                    (Some(text), false) => Field::Set(Some(text)),
                    (None, false) => Field::Unset,
                },
            };
            serde_json::to_value(fleet.update_vehicle(principal, VehicleId(id), &changes)?)?
        }
        VehicleCommand::Delete { id } => {
            fleet.delete_vehicle(principal, VehicleId(id))?;
            json!({ "deleted": id })
        }
    };
    Ok(value)
}

fn wheel<S: FleetStore>(
    fleet: &Fleet<S>,
    principal: &Principal,
    cmd: WheelCommand,
) -> Result<Value> {
    let value = match cmd {
        WheelCommand::List { vehicle } => {
            let positions = fleet.wheel_positions(principal, VehicleId(vehicle))?;
            serde_json::to_value(views(&positions))?
        }
        WheelCommand::Set {
            vehicle,
            index,
            serial,
        } => {
            let position = fleet.set_tire(principal, VehicleId(vehicle), index, serial.as_deref())?;
            serde_json::to_value(PositionView::from(&position))?
        }
        WheelCommand::Clear { vehicle, index } => {
            let position = fleet.remove_tire(principal, VehicleId(vehicle), index)?;
            serde_json::to_value(PositionView::from(&position))?
        }
        WheelCommand::Bulk {
            vehicle,
            json,
            file,
        } => {
            let items = bulk_items(json.as_deref(), file.as_deref())?;
            let positions = fleet.bulk_set_tires(principal, VehicleId(vehicle), &items)?;
            serde_json::to_value(views(&positions))?
        }
    };
    Ok(value)
}

fn views(positions: &[WheelPosition]) -> Vec<PositionView<'_>> {
    positions.iter().map(PositionView::from).collect()
}

fn bulk_items(json: Option<&str>, file: Option<&Path>) -> Result<Vec<TireUpdate>> {
    let text = match (json, file) {
        (Some(text), _) => text.to_owned(),
        (None, Some(path)) => fs::read_to_string(path)
            .with_context(|| format!("read bulk items from {}", path.display()))?,
        (None, None) => return Err(anyhow!("bulk items need --json or --file")),
    };
    serde_json::from_str(&text)
        .context("bulk items must be a JSON array of {position_index, tire_serial}")
}
