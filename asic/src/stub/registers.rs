// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/
//
// Copyright 2025 Oxide Computer Company

use std::collections::BTreeMap;
use std::sync::Mutex;

use aal::{RegAddr, RegBlock};

/// An in-memory register file.  Fields that have never been written read as
/// zero.
#[derive(Debug, Default)]
pub struct RegisterFile {
    fields: Mutex<BTreeMap<RegAddr, u64>>,
    writes: Mutex<u64>,
}

impl RegisterFile {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn read(&self, addr: RegAddr) -> u64 {
        let fields = self.fields.lock().unwrap();
        fields.get(&addr).copied().unwrap_or(0)
    }

    pub fn write(&self, addr: RegAddr, value: u64) {
        let mut fields = self.fields.lock().unwrap();
        fields.insert(addr, value);
        *self.writes.lock().unwrap() += 1;
    }

    /// Number of writes performed since the register file was created.
    pub fn write_count(&self) -> u64 {
        *self.writes.lock().unwrap()
    }

    /// Every field in a block that has been written, in address order.
    pub fn block(&self, block: RegBlock) -> Vec<(RegAddr, u64)> {
        let fields = self.fields.lock().unwrap();
        fields
            .iter()
            .filter(|(addr, _)| addr.block == block)
            .map(|(addr, value)| (*addr, *value))
            .collect()
    }
}
