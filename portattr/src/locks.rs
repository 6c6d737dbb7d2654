// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/
//
// Copyright 2025 Oxide Computer Company

//! The engine's three locks.  They must be taken in the order LAG, attribute,
//! register.  The guards below make any other order impossible to express:
//! an attribute guard is obtained from the lock set or from a held LAG guard,
//! and a register guard only from a held attribute guard.

use std::sync::Mutex;
use std::sync::MutexGuard;

use aal::{RegAddr, RegisterOps};

use crate::lag::LagTable;
use crate::port::PortTable;
use crate::types::{AttrError, AttrResult};

pub(crate) struct Locks {
    lags: Mutex<LagTable>,
    ports: Mutex<PortTable>,
    regs: Mutex<()>,
}

impl Locks {
    pub fn new(lags: LagTable, ports: PortTable) -> Self {
        Locks {
            lags: Mutex::new(lags),
            ports: Mutex::new(ports),
            regs: Mutex::new(()),
        }
    }

    pub fn lag(&self) -> LagGuard<'_> {
        LagGuard {
            lags: self.lags.lock().unwrap(),
            locks: self,
        }
    }

    /// Take the attribute lock without the LAG lock.
    pub fn attrs(&self) -> AttrGuard<'_> {
        AttrGuard {
            ports: self.ports.lock().unwrap(),
            lags: None,
            regs: &self.regs,
        }
    }
}

pub(crate) struct LagGuard<'a> {
    lags: MutexGuard<'a, LagTable>,
    locks: &'a Locks,
}

impl LagGuard<'_> {
    pub fn lags(&self) -> &LagTable {
        &self.lags
    }

    /// Take the attribute lock while holding the LAG lock.  The LAG table
    /// stays reachable through the returned guard.
    pub fn attrs(&mut self) -> AttrGuard<'_> {
        let locks = self.locks;
        AttrGuard {
            ports: locks.ports.lock().unwrap(),
            lags: Some(&mut *self.lags),
            regs: &locks.regs,
        }
    }
}

pub(crate) struct AttrGuard<'a> {
    ports: MutexGuard<'a, PortTable>,
    lags: Option<&'a mut LagTable>,
    regs: &'a Mutex<()>,
}

impl AttrGuard<'_> {
    pub fn ports(&self) -> &PortTable {
        &self.ports
    }

    pub fn ports_mut(&mut self) -> &mut PortTable {
        &mut self.ports
    }

    pub fn lags(&self) -> AttrResult<&LagTable> {
        self.lags.as_deref().ok_or_else(lag_lock_not_held)
    }

    pub fn lags_mut(&mut self) -> AttrResult<&mut LagTable> {
        self.lags.as_deref_mut().ok_or_else(lag_lock_not_held)
    }

    pub fn regs(&self) -> RegGuard<'_> {
        RegGuard {
            _held: self.regs.lock().unwrap(),
        }
    }
}

fn lag_lock_not_held() -> AttrError {
    AttrError::Uninitialized("LAG table accessed without the LAG lock".into())
}

/// Holds the register lock.  Register sequences that must appear atomic to
/// other writers are issued through a single guard.
pub(crate) struct RegGuard<'a> {
    _held: MutexGuard<'a, ()>,
}

impl RegGuard<'_> {
    pub fn read(&self, asic: &dyn RegisterOps, addr: RegAddr) -> AttrResult<u64> {
        Ok(asic.read_field(addr)?)
    }

    pub fn write(
        &self,
        asic: &dyn RegisterOps,
        addr: RegAddr,
        value: u64,
    ) -> AttrResult<()> {
        Ok(asic.write_field(addr, value)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn locks() -> Locks {
        Locks::new(LagTable::default(), PortTable::new(4))
    }

    #[test]
    fn test_lag_table_needs_lag_lock() {
        let locks = locks();
        {
            let mut guard = locks.attrs();
            assert!(guard.lags().is_err());
            assert!(guard.lags_mut().is_err());
        }

        let mut lag = locks.lag();
        let mut guard = lag.attrs();
        assert!(guard.lags().is_ok());
        assert!(guard.lags_mut().is_ok());
        assert_eq!(guard.ports().cardinal_ports(), 4);
    }

    #[test]
    fn test_guards_release() {
        let locks = locks();
        {
            let mut lag = locks.lag();
            let guard = lag.attrs();
            let _regs = guard.regs();
        }
        // Everything was dropped, so each lock can be taken again
        assert!(locks.lags.try_lock().is_ok());
        assert!(locks.ports.try_lock().is_ok());
        assert!(locks.regs.try_lock().is_ok());
    }

    #[test]
    fn test_register_access() {
        let log = slog::Logger::root(slog::Discard, slog::o!());
        let hdl = asic::Handle::new(&log, &asic::AsicConfig::default()).unwrap();
        let locks = locks();
        let guard = locks.attrs();
        let addr = RegAddr::new(aal::RegBlock::Mac, 1, 2);
        let regs = guard.regs();
        regs.write(&hdl, addr, 0x55).unwrap();
        assert_eq!(regs.read(&hdl, addr).unwrap(), 0x55);
    }
}
