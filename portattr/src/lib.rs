// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/
//
// Copyright 2025 Oxide Computer Company

//! The port attribute engine: per-port and per-lane configuration
//! attributes, their propagation across link aggregation groups, and the
//! state machines that follow a port's Ethernet and autonegotiation modes.

pub mod attr;
pub mod config;
mod context;
mod derived;
mod dispatch;
mod engine;
mod lag;
mod locks;
mod port;
mod port_mode;
pub mod regs;
mod setter;
mod storage;
pub mod types;

pub use attr::{lookup, AttrId, AttrValue, PortMask};
pub use config::{EngineConfig, PortSpec};
pub use engine::PortAttrEngine;
pub use types::{AttrError, AttrResult, LaneSel};
