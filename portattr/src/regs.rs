// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/
//
// Copyright 2025 Oxide Computer Company

//! Register fields programmed by the engine.  Simple attributes occupy the
//! field numbered by their attribute id within their block; the fields below
//! are the ones computed or read back by the engine itself.

use aal::{RegAddr, RegBlock};

use crate::attr::AttrId;

/// Smallest frame accepted, including any ISL tag
pub const FRAME_MIN_LEN: u16 = 0x100;
/// Largest frame accepted, including any ISL tag
pub const FRAME_MAX_LEN: u16 = 0x101;
/// Length at which oversized frames are truncated
pub const TRUNC_LEN: u16 = 0x102;

pub const MASK_LO: u16 = 0x108;
pub const MASK_HI: u16 = 0x109;

pub const AN_NEXT_PAGE_COUNT: u16 = 0x10f;
pub const AN_NEXT_PAGE_BASE: u16 = 0x110;
pub const AN_PARTNER_BASE_PAGE: u16 = 0x120;
pub const AN_PARTNER_NEXT_PAGE_COUNT: u16 = 0x12f;
pub const AN_PARTNER_NEXT_PAGE_BASE: u16 = 0x130;

pub const EEE_STATE: u16 = 0x140;

pub const PCIE_LINK_WIDTH: u16 = 0x150;
pub const PCIE_LINK_SPEED: u16 = 0x151;

/// The field holding a simple attribute for a cardinal port.
pub fn attr_field(block: RegBlock, cardinal: u32, id: AttrId) -> RegAddr {
    RegAddr::new(block, cardinal, id as u16)
}

pub fn field(block: RegBlock, cardinal: u32, field: u16) -> RegAddr {
    RegAddr::new(block, cardinal, field)
}

/// The store-and-forward matrix entry for traffic from `rx` to `tx`.  A
/// value of 1 forces store-and-forward.
pub fn saf(rx: u32, tx: u32) -> RegAddr {
    RegAddr::new(RegBlock::Saf, rx, tx as u16)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fields_clear_of_attributes() {
        use strum::EnumCount;
        // Attribute fields are numbered by id and must never collide with
        // the engine's own fields.
        assert!((AttrId::COUNT as u16) < FRAME_MIN_LEN);
        assert_eq!(
            attr_field(RegBlock::Mac, 3, AttrId::Ifg),
            RegAddr::new(RegBlock::Mac, 3, 30)
        );
        assert_eq!(saf(2, 5), RegAddr::new(RegBlock::Saf, 2, 5));
    }
}
