// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Application services shared by fleet front ends: the config port and the
//! service settings persisted through it. Keeps the CLI adapter thin.

pub mod config;
pub mod settings;

pub use settings::ServiceSettings;
