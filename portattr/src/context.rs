// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/
//
// Copyright 2025 Oxide Computer Company

use std::collections::BTreeSet;

use aal::{LogicalPort, PortUpdate, RegAddr};

use crate::locks::AttrGuard;
use crate::port::PortTable;
use crate::types::AttrResult;

/// Engine-wide knobs consulted while applying attributes.
#[derive(Clone, Debug)]
pub(crate) struct Settings {
    pub per_lag_management: bool,
    pub fsm_history: bool,
    pub pll_poll_limit: u32,
}

/// Work deferred until every engine lock has been released.
#[derive(Debug, Default)]
pub(crate) struct Effects {
    /// Ports whose state machine was replaced and whose admin mode must be
    /// delivered to the new instance
    pub restore_admin: BTreeSet<LogicalPort>,
    pub updates: Vec<PortUpdate>,
}

/// Everything a write needs while the attribute lock is held.
pub(crate) struct ApplyCtx<'c, 'g> {
    pub asic: &'c asic::Handle,
    pub guard: &'c mut AttrGuard<'g>,
    pub settings: &'c Settings,
    pub log: &'c slog::Logger,
    pub effects: &'c mut Effects,
}

impl ApplyCtx<'_, '_> {
    pub fn ports(&self) -> &PortTable {
        self.guard.ports()
    }

    pub fn ports_mut(&mut self) -> &mut PortTable {
        self.guard.ports_mut()
    }

    pub fn write_reg(&self, addr: RegAddr, value: u64) -> AttrResult<()> {
        self.guard.regs().write(self.asic, addr, value)
    }
}

/// Everything a read needs while the attribute lock is held.
pub(crate) struct ReadCtx<'c, 'g> {
    pub asic: &'c asic::Handle,
    pub guard: &'c AttrGuard<'g>,
}

impl ReadCtx<'_, '_> {
    pub fn ports(&self) -> &PortTable {
        self.guard.ports()
    }

    pub fn cardinal_ports(&self) -> usize {
        self.guard.ports().cardinal_ports()
    }

    pub fn read_reg(&self, addr: RegAddr) -> AttrResult<u64> {
        self.guard.regs().read(self.asic, addr)
    }
}
