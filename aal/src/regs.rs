// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/
//
// Copyright 2025 Oxide Computer Company

use std::fmt;

/// Functional block that owns a register.  Concrete register offsets and bit
/// positions are the backend's business; callers address fields logically.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum RegBlock {
    /// Per-port MAC configuration
    Mac,
    /// Per-port parser and default tagging
    Parser,
    /// Per-port forwarding and filtering
    Fwd,
    /// Per-port egress modification
    Modify,
    /// Per-port autonegotiation pages and timers
    An,
    /// Energy efficient ethernet
    Eee,
    /// PCIe endpoint status
    Pcie,
    /// Store-and-forward matrix, one row per ingress cardinal port
    Saf,
}

/// A logical register field: the owning block, the entity index within the
/// block (cardinal port, lane, or SAF row), and the field within the
/// register.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RegAddr {
    pub block: RegBlock,
    pub index: u32,
    pub field: u16,
}

impl RegAddr {
    pub const fn new(block: RegBlock, index: u32, field: u16) -> Self {
        RegAddr {
            block,
            index,
            field,
        }
    }
}

impl fmt::Display for RegAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}[{}].{}", self.block, self.index, self.field)
    }
}
