// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Argument surface.

use std::path::PathBuf;

use clap::{ArgGroup, Args, Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "fleetctl", author, version, about = "Fleet tire tracking")]
pub struct Cli {
    /// Bearer token from `fleetctl login`
    #[arg(long, env = "FLEET_TOKEN", global = true, hide_env_values = true)]
    pub token: Option<String>,

    #[command(flatten)]
    pub overrides: Overrides,

    #[command(subcommand)]
    pub command: Command,
}

/// Settings that flags and environment variables take over from the config file.
#[derive(Args, Debug, Default)]
pub struct Overrides {
    /// Directory holding `fleet-settings.json` (defaults to the user config dir)
    #[arg(long, global = true)]
    pub config_dir: Option<PathBuf>,
    /// Database file or `sqlite:///` URL
    #[arg(long = "database", env = "DATABASE_URL", global = true)]
    pub database_url: Option<String>,
    /// Token signing secret
    #[arg(long, env = "SECRET_KEY", global = true, hide_env_values = true)]
    pub secret_key: Option<String>,
    /// Account seeded on startup
    #[arg(long, env = "DEFAULT_ADMIN_USERNAME", global = true)]
    pub admin_username: Option<String>,
    /// Password of the seeded account
    #[arg(long, env = "DEFAULT_ADMIN_PASSWORD", global = true, hide_env_values = true)]
    pub admin_password: Option<String>,
    /// Token lifetime in minutes
    #[arg(long, env = "ACCESS_TOKEN_EXPIRE_MINUTES", global = true)]
    pub token_ttl_minutes: Option<i64>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Repair the schema and seed the default account
    Init,
    /// Exchange credentials for a bearer token
    Login {
        /// Account name
        username: String,
        /// Account password
        #[arg(long, env = "FLEET_PASSWORD", hide_env_values = true)]
        password: String,
    },
    /// Show the account behind the token
    Whoami,
    /// Manage accounts
    #[command(subcommand)]
    User(UserCommand),
    /// Manage vehicles
    #[command(subcommand)]
    Vehicle(VehicleCommand),
    /// Manage tires on wheel positions
    #[command(subcommand)]
    Wheel(WheelCommand),
}

#[derive(Subcommand, Debug)]
pub enum UserCommand {
    /// Create an account
    Add {
        /// Account name (3-50 characters)
        username: String,
        /// Password (6-128 characters)
        #[arg(long)]
        password: String,
    },
}

#[derive(Subcommand, Debug)]
pub enum VehicleCommand {
    /// List vehicles, optionally filtered by a plate fragment
    List {
        /// Case-insensitive plate fragment
        #[arg(long, short)]
        query: Option<String>,
    },
    /// Register a vehicle with all of its wheel positions
    Create {
        /// License plate
        plate: String,
        /// Free-text description
        #[arg(long)]
        description: Option<String>,
    },
    /// Show a vehicle and its wheel positions
    Show {
        /// Vehicle id
        id: i64,
    },
    /// Change a vehicle's plate or description
    Update {
        /// Vehicle id
        id: i64,
        /// New license plate
        #[arg(long)]
        plate: Option<String>,
        /// New description
        #[arg(long, conflicts_with = "clear_description")]
        description: Option<String>,
        /// Remove the description
        #[arg(long)]
        clear_description: bool,
    },
    /// Delete a vehicle and its wheel positions
    Delete {
        /// Vehicle id
        id: i64,
    },
}

#[derive(Subcommand, Debug)]
pub enum WheelCommand {
    /// List a vehicle's wheel positions
    List {
        /// Vehicle id
        vehicle: i64,
    },
    /// Mount a tire (an omitted or blank serial clears the slot)
    Set {
        /// Vehicle id
        vehicle: i64,
        /// Slot number
        index: u32,
        /// Tire serial
        serial: Option<String>,
    },
    /// Remove the tire from a slot
    Clear {
        /// Vehicle id
        vehicle: i64,
        /// Slot number
        index: u32,
    },
    /// Apply a JSON array of `{position_index, tire_serial}` all-or-nothing
    #[command(group(ArgGroup::new("source").required(true).args(["json", "file"])))]
    Bulk {
        /// Vehicle id
        vehicle: i64,
        /// Inline JSON
        #[arg(long)]
        json: Option<String>,
        /// File holding the JSON
        #[arg(long)]
        file: Option<PathBuf>,
    },
}
