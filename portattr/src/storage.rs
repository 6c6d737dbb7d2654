// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/
//
// Copyright 2025 Oxide Computer Company

//! Per-port and per-lane attribute storage.

use crate::attr::{
    descriptors, slot_counts, AttrValue, AttributeDescriptor, Scope,
    StorageClass,
};

/// A block of value slots, indexed by the descriptors' slot numbers.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct AttrBlock(Vec<AttrValue>);

impl AttrBlock {
    fn build(
        size: usize,
        cardinal_ports: usize,
        select: impl Fn(&AttributeDescriptor) -> bool,
    ) -> Self {
        let mut slots = vec![AttrValue::Bool(false); size];
        for desc in descriptors().filter(|d| select(d)) {
            slots[desc.slot] = desc.handler.initial(desc, cardinal_ports);
        }
        AttrBlock(slots)
    }

    pub fn get(&self, slot: usize) -> Option<&AttrValue> {
        self.0.get(slot)
    }

    pub fn get_mut(&mut self, slot: usize) -> Option<&mut AttrValue> {
        self.0.get_mut(slot)
    }
}

/// The generic and chip-specific attribute blocks of a port.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct PortAttrSet {
    pub generic: AttrBlock,
    pub ext: AttrBlock,
}

impl PortAttrSet {
    pub fn new(cardinal_ports: usize) -> Self {
        let counts = slot_counts();
        PortAttrSet {
            generic: AttrBlock::build(counts.port_generic, cardinal_ports, |d| {
                d.scope == Scope::Port && d.class == StorageClass::Generic
            }),
            ext: AttrBlock::build(counts.port_ext, cardinal_ports, |d| {
                d.scope == Scope::Port && d.class == StorageClass::Extension
            }),
        }
    }

    fn block(&self, class: StorageClass) -> &AttrBlock {
        match class {
            StorageClass::Generic => &self.generic,
            StorageClass::Extension => &self.ext,
        }
    }

    pub fn slot(&self, desc: &AttributeDescriptor) -> Option<&AttrValue> {
        match desc.scope {
            Scope::Port => self.block(desc.class).get(desc.slot),
            Scope::Lane => None,
        }
    }

    pub fn slot_mut(
        &mut self,
        desc: &AttributeDescriptor,
    ) -> Option<&mut AttrValue> {
        let block = match desc.class {
            StorageClass::Generic => &mut self.generic,
            StorageClass::Extension => &mut self.ext,
        };
        match desc.scope {
            Scope::Port => block.get_mut(desc.slot),
            Scope::Lane => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct LaneAttrSet {
    pub generic: AttrBlock,
}

impl LaneAttrSet {
    pub fn new() -> Self {
        LaneAttrSet {
            generic: AttrBlock::build(slot_counts().lane, 0, |d| {
                d.scope == Scope::Lane
            }),
        }
    }

    pub fn slot(&self, desc: &AttributeDescriptor) -> Option<&AttrValue> {
        match desc.scope {
            Scope::Lane => self.generic.get(desc.slot),
            Scope::Port => None,
        }
    }

    pub fn slot_mut(
        &mut self,
        desc: &AttributeDescriptor,
    ) -> Option<&mut AttrValue> {
        match desc.scope {
            Scope::Lane => self.generic.get_mut(desc.slot),
            Scope::Port => None,
        }
    }
}
