// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/
//
// Copyright 2025 Oxide Computer Company

use std::fmt;

use common::ports::AdminMode;
use common::ports::LANES_PER_EPL;
use schemars::JsonSchema;
use serde::Deserialize;
use serde::Serialize;

use crate::PortSmType;

/// The number by which the SDK's callers refer to a port of any type.
#[derive(
    Clone,
    Copy,
    Debug,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Deserialize,
    Serialize,
    JsonSchema,
)]
pub struct LogicalPort(pub u32);

impl fmt::Display for LogicalPort {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "port{}", self.0)
    }
}

impl From<u32> for LogicalPort {
    fn from(p: u32) -> Self {
        LogicalPort(p)
    }
}

impl std::str::FromStr for LogicalPort {
    type Err = &'static str;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = "invalid port name";
        let digits = s.strip_prefix("port").unwrap_or(s);
        digits.parse::<u32>().map(LogicalPort).map_err(|_| err)
    }
}

/// A single SerDes lane, identified by its EPL and channel within the EPL.
#[derive(
    Clone,
    Copy,
    Debug,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Deserialize,
    Serialize,
    JsonSchema,
)]
pub struct LaneId {
    pub epl: u8,
    pub channel: u8,
}

impl LaneId {
    pub fn new(epl: u8, channel: u8) -> Self {
        LaneId { epl, channel }
    }

    /// The flat SerDes number used by register and firmware interfaces.
    pub fn serdes(&self) -> u32 {
        self.epl as u32 * LANES_PER_EPL as u32 + self.channel as u32
    }
}

impl fmt::Display for LaneId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "epl{}/{}", self.epl, self.channel)
    }
}

/// Transmit equalizer taps.  The `KrInit*` taps are the starting point for
/// KR link training.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, strum::EnumIter,
)]
pub enum Cursor {
    Main,
    Pre,
    Post,
    KrInitMain,
    KrInitPre,
    KrInitPost,
}

/// The two 40-bit halves of the BIST user pattern.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum BistHalf {
    Low,
    High,
}

/// Notifications delivered to the platform layer after the engine makes a
/// change with physical side effects.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PortUpdate {
    /// An attribute was written to hardware
    Attribute { port: LogicalPort, attr: u32 },
    /// A port's state machine was replaced with one of a different variant
    FsmRebound {
        port: LogicalPort,
        from: PortSmType,
        to: PortSmType,
    },
    /// A lane changed owners as a result of a lane-count change
    LaneMoved {
        lane: LaneId,
        from: LogicalPort,
        to: LogicalPort,
    },
    /// The port's administrative mode was applied
    AdminMode { port: LogicalPort, mode: AdminMode },
}
