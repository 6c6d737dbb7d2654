// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/
//
// Copyright 2025 Oxide Computer Company

use thiserror::Error;

use common::ports::{AnMode, DfeMode, EthMode, RxTermination};

mod fsm;
pub use fsm::*;

mod ports;
pub use ports::*;

mod regs;
pub use regs::*;

/// A specialized Result type for ASIC operations
pub type AsicResult<T> = Result<T, AsicError>;

/// Error type conveying additional information about ASIC errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AsicError {
    /// An argument passed to the ASIC layer is invalid or inappropriate.  This
    /// indicates misbehavior from the caller.
    #[error("Invalid argument: {}", .0)]
    InvalidArg(String),
    /// An Asic function was called before the ASIC layer was properly
    /// initialized.  Indicates misbehavior from the caller.
    #[error("ASIC layer uninitialized: {}", .0)]
    Uninitialized(String),
    /// This operation is unsupported by the ASIC model being used
    #[error("Operation unsupported by the ASIC")]
    OperationUnsupported,
    /// The ASIC layer detected some internal inconsistency
    #[error("Internal error: {}", .0)]
    Internal(String),
    /// An event was delivered to a state machine that has already been
    /// stopped.
    #[error("State machine {} has been stopped", .0)]
    FsmStopped(String),
    /// The state machine has no transition for this event in its current
    /// state.
    #[error("State machine {fsm} cannot handle {event} in state {state}")]
    InvalidEvent {
        fsm: String,
        event: String,
        state: String,
    },
    /// A bounded hardware poll expired before the condition was met.
    #[error("Timed out: {}", .0)]
    Timeout(String),
    /// An error derived from a purposely triggered synthetic fault for testing
    /// purposes.
    #[error("Synthetic ASIC error: {}", .0)]
    Synthetic(String),
    /// A general indication that a caller is trying to modify something that
    /// is not present.
    #[error("Missing: {}", .0)]
    Missing(String),
}

/// Register-level access to the switch.  Each call is atomic; callers that
/// need a multi-register sequence to appear atomic must hold the register
/// lock across the sequence.
pub trait RegisterOps: Send + Sync {
    /// Read a single register field.
    fn read_field(&self, addr: RegAddr) -> AsicResult<u64>;

    /// Write a single register field.
    fn write_field(&self, addr: RegAddr, value: u64) -> AsicResult<()>;
}

/// Per-lane SerDes controls.  DFE tuning itself is performed by the SerDes
/// firmware; this interface only selects the mode and reads back results.
pub trait SerdesOps: Send + Sync {
    fn serdes_dfe_mode_set(&self, lane: LaneId, mode: DfeMode)
        -> AsicResult<()>;

    fn serdes_dfe_mode_get(&self, lane: LaneId) -> AsicResult<DfeMode>;

    /// Set the rx and tx polarity inversion for a lane.
    fn serdes_polarity_set(
        &self,
        lane: LaneId,
        rx_inverted: bool,
        tx_inverted: bool,
    ) -> AsicResult<()>;

    fn serdes_polarity_get(&self, lane: LaneId) -> AsicResult<(bool, bool)>;

    fn serdes_cursor_set(
        &self,
        lane: LaneId,
        cursor: Cursor,
        value: i32,
    ) -> AsicResult<()>;

    fn serdes_cursor_get(&self, lane: LaneId, cursor: Cursor)
        -> AsicResult<i32>;

    /// Select whether KR link training starts from the configured initial
    /// cursor values.
    fn serdes_kr_init_cfg_set(&self, lane: LaneId, enable: bool)
        -> AsicResult<()>;

    fn serdes_termination_set(
        &self,
        lane: LaneId,
        term: RxTermination,
    ) -> AsicResult<()>;

    fn serdes_termination_get(&self, lane: LaneId)
        -> AsicResult<RxTermination>;

    fn serdes_bist_pattern_set(
        &self,
        lane: LaneId,
        half: BistHalf,
        pattern: u64,
    ) -> AsicResult<()>;

    fn serdes_signal_threshold_set(
        &self,
        lane: LaneId,
        threshold: u32,
    ) -> AsicResult<()>;

    fn serdes_loopback_set(&self, lane: LaneId, enable: bool)
        -> AsicResult<()>;

    /// Current eye quality estimate reported by the DFE.
    fn serdes_eye_score(&self, lane: LaneId) -> AsicResult<u32>;

    fn serdes_pll_ready(&self, lane: LaneId) -> AsicResult<bool>;
}

/// The predicate used to decide whether a port's (Ethernet mode, AN mode)
/// pair requires the autonegotiation-capable port state machine.
pub trait AutonegPolicy: Send + Sync {
    /// Returns whether the port is ready to autonegotiate, along with the
    /// port state machine variant that should drive it.
    fn is_autoneg_ready(
        &self,
        eth_mode: EthMode,
        an_mode: AnMode,
    ) -> (bool, PortSmType);
}
