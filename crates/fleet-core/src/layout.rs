// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Physical meaning of a slot number.
//!
//! Five axles carry eighteen wheels: a single-tire steer axle (1 left, 2
//! right) followed by four dual axles of four slots each. Everything above 18
//! is a spare.
//!
//! ```text
//!  axle 1     1 .  . 2
//!  axle 2     3 5  4 6
//!  axle 3     7 9  8 10
//!  axle 4    11 13 12 14
//!  axle 5    15 17 16 18
//! ```

use std::fmt;

use serde::Serialize;

/// Highest slot mounted on an axle.
pub const AXLE_SLOTS: u32 = 18;
const STEER_SLOTS: u32 = 2;
const DUAL_AXLE_SLOTS: u32 = 4;

/// Side of the vehicle.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Side {
    /// Driver side in the diagram.
    Left,
    /// Passenger side in the diagram.
    Right,
}

/// Position within a side of an axle.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Placement {
    /// Only tire on a steer axle end.
    Single,
    /// Outer tire of a dual pair.
    Outer,
    /// Inner tire of a dual pair.
    Inner,
}

/// Where a slot sits on the vehicle.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Slot {
    /// Mounted on an axle.
    Axle {
        /// Axle number, 1 at the front.
        axle: u32,
        /// Vehicle side.
        side: Side,
        /// Single, outer or inner.
        placement: Placement,
    },
    /// Carried spare, numbered from 1.
    Spare {
        /// Spare number.
        number: u32,
    },
}

/// Classify a slot number. `0` is not a slot.
pub fn slot(index: u32) -> Option<Slot> {
    match index {
        0 => None,
        1..=STEER_SLOTS => Some(Slot::Axle {
            axle: 1,
            side: if index == 1 { Side::Left } else { Side::Right },
            placement: Placement::Single,
        }),
        _ if index <= AXLE_SLOTS => {
            let offset = index - STEER_SLOTS - 1;
            let left = index % 2 == 1;
            // Lower index of each pair sits at the left edge of the diagram.
            let lower = offset % DUAL_AXLE_SLOTS < 2;
            Some(Slot::Axle {
                axle: 2 + offset / DUAL_AXLE_SLOTS,
                side: if left { Side::Left } else { Side::Right },
                placement: if left == lower {
                    Placement::Outer
                } else {
                    Placement::Inner
                },
            })
        }
        _ => Some(Slot::Spare {
            number: index - AXLE_SLOTS,
        }),
    }
}

impl fmt::Display for Slot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Axle {
                axle,
                side,
                placement,
            } => {
                let side = match side {
                    Side::Left => "L",
                    Side::Right => "R",
                };
                let placement = match placement {
                    Placement::Single => "",
                    Placement::Outer => "O",
                    Placement::Inner => "I",
                };
                write!(f, "A{axle}-{side}{placement}")
            }
            Self::Spare { number } => write!(f, "SP{number}"),
        }
    }
}
