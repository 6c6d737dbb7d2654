// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/
//
// Copyright 2025 Oxide Computer Company

//! A software model of the switch, used when no hardware is present.

use std::sync::Arc;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use slog::{debug, o};

use aal::{
    AsicResult, AutonegPolicy, BistHalf, Cursor, FsmRuntime, LaneId,
    LogicalPort, PortSmType, RegAddr, RegBlock, RegisterOps, SerdesOps,
    SmState, SmSubject, SmVariant, StateMachine,
};
use common::ports::{AnMode, DfeMode, EthMode, RxTermination};

use crate::faults::{FaultPoint, Faults};
use crate::faux_fsm::{FauxFsm, FsmShared};
use crate::{FsmRecord, FsmStats};

pub mod registers;
pub mod serdes;

/// Tunables for the software model.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(default)]
pub struct AsicConfig {
    /// Eye score reported by lanes with an adaptive DFE
    pub default_eye_score: u32,
    /// Number of polls a lane's PLL needs before it reports lock
    pub pll_lock_polls: u32,
}

impl Default for AsicConfig {
    fn default() -> Self {
        AsicConfig {
            default_eye_score: 48,
            pll_lock_polls: 0,
        }
    }
}

pub struct StubHandle {
    log: slog::Logger,
    regs: registers::RegisterFile,
    serdes: serdes::SerdesModel,
    fsm: Arc<FsmShared>,
    faults: Arc<Faults>,
}

impl StubHandle {
    pub fn new(log: &slog::Logger, config: &AsicConfig) -> AsicResult<Self> {
        let log = log.new(o!("unit" => "asic"));
        let faults = Arc::new(Faults::new());
        let fsm = Arc::new(FsmShared::new(
            log.new(o!("unit" => "faux_fsm")),
            faults.clone(),
        ));

        Ok(StubHandle {
            log,
            regs: registers::RegisterFile::new(),
            serdes: serdes::SerdesModel::new(
                config.default_eye_score,
                config.pll_lock_polls,
            ),
            fsm,
            faults,
        })
    }

    /// Fault injection controls.
    pub fn faults(&self) -> &Faults {
        &self.faults
    }

    /// Read a register field without going through fault injection.
    pub fn peek(&self, addr: RegAddr) -> u64 {
        self.regs.read(addr)
    }

    /// Every field written in a register block, in address order.
    pub fn register_block(&self, block: RegBlock) -> Vec<(RegAddr, u64)> {
        self.regs.block(block)
    }

    pub fn register_writes(&self) -> u64 {
        self.regs.write_count()
    }

    /// Snapshot of a lane's simulated state.
    pub fn lane_model(&self, lane: LaneId) -> serdes::LaneModel {
        self.serdes.with_lane(lane, |l| l.clone())
    }

    pub fn set_eye_score(&self, lane: LaneId, score: u32) {
        self.serdes.with_lane(lane, |l| l.eye_score = score)
    }

    pub fn set_pll_lock_polls(&self, polls: u32) {
        self.serdes.set_pll_lock_polls(polls)
    }

    /// Select the mode a port's link partner settles on when autonegotiation
    /// completes.  `None` leaves negotiation pending forever.
    pub fn set_link_partner(&self, port: LogicalPort, mode: Option<EthMode>) {
        self.fsm.set_partner(port, mode)
    }

    pub fn fsm_history(&self) -> Vec<FsmRecord> {
        self.fsm.history()
    }

    pub fn fsm_history_for(&self, subject: SmSubject) -> Vec<FsmRecord> {
        self.fsm
            .history()
            .into_iter()
            .filter(|r| r.subject == subject)
            .collect()
    }

    pub fn fsm_stats(&self, subject: SmSubject) -> FsmStats {
        self.fsm.stats(subject)
    }

    /// Number of events that were delivered to an instance after it had been
    /// stopped.  Anything other than 0 indicates a bug in the caller.
    pub fn fsm_events_after_stop(&self) -> u64 {
        self.fsm.events_after_stop()
    }

    fn serdes_set(
        &self,
        lane: LaneId,
        what: &str,
        f: impl FnOnce(&mut serdes::LaneModel),
    ) -> AsicResult<()> {
        self.faults.check(
            &self.log,
            FaultPoint::SerdesSet,
            &format!("{what} on {lane}"),
        )?;
        debug!(self.log, "serdes {} on {}", what, lane);
        self.serdes.with_lane(lane, f);
        Ok(())
    }
}

impl RegisterOps for StubHandle {
    fn read_field(&self, addr: RegAddr) -> AsicResult<u64> {
        self.faults.check(
            &self.log,
            FaultPoint::RegisterRead,
            &format!("read {addr}"),
        )?;
        Ok(self.regs.read(addr))
    }

    fn write_field(&self, addr: RegAddr, value: u64) -> AsicResult<()> {
        self.faults.check(
            &self.log,
            FaultPoint::RegisterWrite,
            &format!("write {addr}"),
        )?;
        self.regs.write(addr, value);
        Ok(())
    }
}

impl SerdesOps for StubHandle {
    fn serdes_dfe_mode_set(
        &self,
        lane: LaneId,
        mode: DfeMode,
    ) -> AsicResult<()> {
        self.serdes_set(lane, "dfe mode", |l| l.dfe_mode = mode)
    }

    fn serdes_dfe_mode_get(&self, lane: LaneId) -> AsicResult<DfeMode> {
        Ok(self.serdes.with_lane(lane, |l| l.dfe_mode))
    }

    fn serdes_polarity_set(
        &self,
        lane: LaneId,
        rx_inverted: bool,
        tx_inverted: bool,
    ) -> AsicResult<()> {
        self.serdes_set(lane, "polarity", |l| {
            l.rx_inverted = rx_inverted;
            l.tx_inverted = tx_inverted;
        })
    }

    fn serdes_polarity_get(&self, lane: LaneId) -> AsicResult<(bool, bool)> {
        Ok(self
            .serdes
            .with_lane(lane, |l| (l.rx_inverted, l.tx_inverted)))
    }

    fn serdes_cursor_set(
        &self,
        lane: LaneId,
        cursor: Cursor,
        value: i32,
    ) -> AsicResult<()> {
        self.serdes_set(lane, "cursor", |l| {
            l.cursors.insert(cursor, value);
        })
    }

    fn serdes_cursor_get(
        &self,
        lane: LaneId,
        cursor: Cursor,
    ) -> AsicResult<i32> {
        Ok(self.serdes.with_lane(lane, |l| l.cursor(cursor)))
    }

    fn serdes_kr_init_cfg_set(
        &self,
        lane: LaneId,
        enable: bool,
    ) -> AsicResult<()> {
        self.serdes_set(lane, "kr init cfg", |l| l.kr_init_cfg = enable)
    }

    fn serdes_termination_set(
        &self,
        lane: LaneId,
        term: RxTermination,
    ) -> AsicResult<()> {
        self.serdes_set(lane, "termination", |l| l.termination = term)
    }

    fn serdes_termination_get(
        &self,
        lane: LaneId,
    ) -> AsicResult<RxTermination> {
        Ok(self.serdes.with_lane(lane, |l| l.termination))
    }

    fn serdes_bist_pattern_set(
        &self,
        lane: LaneId,
        half: BistHalf,
        pattern: u64,
    ) -> AsicResult<()> {
        self.serdes_set(lane, "bist pattern", |l| match half {
            BistHalf::Low => l.bist[0] = pattern,
            BistHalf::High => l.bist[1] = pattern,
        })
    }

    fn serdes_signal_threshold_set(
        &self,
        lane: LaneId,
        threshold: u32,
    ) -> AsicResult<()> {
        self.serdes_set(lane, "signal threshold", |l| {
            l.signal_threshold = threshold
        })
    }

    fn serdes_loopback_set(
        &self,
        lane: LaneId,
        enable: bool,
    ) -> AsicResult<()> {
        self.serdes_set(lane, "loopback", |l| l.loopback = enable)
    }

    fn serdes_eye_score(&self, lane: LaneId) -> AsicResult<u32> {
        Ok(self.serdes.eye_score(lane))
    }

    fn serdes_pll_ready(&self, lane: LaneId) -> AsicResult<bool> {
        Ok(self.serdes.poll_pll(lane))
    }
}

impl FsmRuntime for StubHandle {
    fn fsm_start(
        &self,
        subject: SmSubject,
        variant: SmVariant,
        initial: SmState,
        history: bool,
    ) -> AsicResult<Box<dyn StateMachine>> {
        let fsm =
            FauxFsm::start(self.fsm.clone(), subject, variant, initial, history)?;
        Ok(Box::new(fsm))
    }
}

impl AutonegPolicy for StubHandle {
    fn is_autoneg_ready(
        &self,
        eth_mode: EthMode,
        an_mode: AnMode,
    ) -> (bool, PortSmType) {
        let ready = match an_mode {
            AnMode::None => false,
            AnMode::Clause73 => eth_mode == EthMode::An73,
            AnMode::Clause37 => eth_mode == EthMode::Base1000X,
            AnMode::Sgmii => {
                matches!(eth_mode, EthMode::Sgmii | EthMode::Base1000X)
            }
        };
        if ready {
            (true, PortSmType::Autoneg)
        } else {
            (false, PortSmType::Basic)
        }
    }
}
