// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/
//
// Copyright 2025 Oxide Computer Company

//! Types shared between the attribute engine and the FSM runtime.  The engine
//! decides which variant of a state machine drives a port or lane; the
//! runtime owns the per-state transition behavior.

use std::fmt;

use common::ports::{AnMode, EthMode};

use crate::AsicResult;
use crate::LaneId;
use crate::LogicalPort;

/// The state machine variants that can drive a port.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, strum::EnumIter,
)]
pub enum PortSmType {
    /// No state machine is bound.  Ports are only in this state before they
    /// are configured, or after a rebind failed partway.
    #[default]
    Unspecified,
    Basic,
    /// Basic bring-up plus Clause 37/73 autonegotiation
    Autoneg,
    Pcie,
    Stub,
}

/// The state machine variants that can drive a SerDes lane.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, strum::EnumIter,
)]
pub enum LaneSmType {
    #[default]
    Unspecified,
    Basic,
    Pcie,
    Stub,
}

/// The variants of the per-lane DFE tuning sub-machine.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, strum::EnumIter,
)]
pub enum DfeSmType {
    #[default]
    Unspecified,
    Basic,
}

macro_rules! display_as_debug {
    ($($name:ident),*) => {
        $(
            impl fmt::Display for $name {
                fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                    write!(f, "{self:?}")
                }
            }
        )*
    };
}

display_as_debug!(PortSmType, LaneSmType, DfeSmType, SmState, SmEventId);

/// A fully qualified state machine variant.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SmVariant {
    Port(PortSmType),
    Lane(LaneSmType),
    Dfe(DfeSmType),
}

impl fmt::Display for SmVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SmVariant::Port(t) => write!(f, "port/{t}"),
            SmVariant::Lane(t) => write!(f, "lane/{t}"),
            SmVariant::Dfe(t) => write!(f, "dfe/{t}"),
        }
    }
}

impl From<PortSmType> for SmVariant {
    fn from(t: PortSmType) -> Self {
        SmVariant::Port(t)
    }
}

impl From<LaneSmType> for SmVariant {
    fn from(t: LaneSmType) -> Self {
        SmVariant::Lane(t)
    }
}

impl From<DfeSmType> for SmVariant {
    fn from(t: DfeSmType) -> Self {
        SmVariant::Dfe(t)
    }
}

/// The entity a state machine instance is driving.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SmSubject {
    Port(LogicalPort),
    Lane(LaneId),
    Dfe(LaneId),
}

impl fmt::Display for SmSubject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SmSubject::Port(p) => write!(f, "{p}"),
            SmSubject::Lane(l) => write!(f, "lane {l}"),
            SmSubject::Dfe(l) => write!(f, "dfe {l}"),
        }
    }
}

/// States shared by every variant.  Each variant only ever visits a subset.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, strum::EnumIter,
)]
pub enum SmState {
    /// The initial state of every variant
    #[default]
    Disabled,
    Configured,
    /// Autonegotiation in progress
    AnWait,
    LinkUp,
    PowerDown,
    DfeTuning,
    /// The instance has been stopped and will accept no further events
    Stopped,
}

#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, strum::EnumIter,
)]
pub enum SmEventId {
    Disable,
    Config,
    AnConfig,
    AdminUp,
    AdminDown,
    PowerDown,
    LaneConfig,
    DfeStart,
    DfeStop,
}

/// Event-specific data.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum SmEventPayload {
    #[default]
    None,
    /// A full reconfiguration of the port
    Config {
        eth_mode: EthMode,
        speed: u32,
        an_mode: AnMode,
    },
    /// New autonegotiation pages for an already configured port
    AnConfig {
        base_page: u64,
        next_pages: Vec<u64>,
        oui: u32,
    },
}

/// An event delivered to a state machine instance.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SmEvent {
    /// The variant the sender believes it is talking to
    pub variant: SmVariant,
    pub id: SmEventId,
    pub payload: SmEventPayload,
    /// Record the event in the runtime's transition history
    pub history: bool,
}

impl SmEvent {
    pub fn new(variant: impl Into<SmVariant>, id: SmEventId) -> Self {
        SmEvent {
            variant: variant.into(),
            id,
            payload: SmEventPayload::None,
            history: false,
        }
    }

    pub fn with_payload(mut self, payload: SmEventPayload) -> Self {
        self.payload = payload;
        self
    }

    pub fn with_history(mut self, history: bool) -> Self {
        self.history = history;
        self
    }
}

/// A running state machine instance.  Instances are owned by whoever started
/// them; dropping an instance without stopping it is a bug in the owner.
pub trait StateMachine: Send {
    fn subject(&self) -> SmSubject;

    fn variant(&self) -> SmVariant;

    fn state(&self) -> SmState;

    /// Deliver an event and run any resulting transition to completion.
    fn notify(&mut self, event: &SmEvent) -> AsicResult<()>;

    /// Stop the instance.  Any later event is refused.
    fn stop(&mut self) -> AsicResult<()>;

    /// The Ethernet mode resolved by autonegotiation, if the variant
    /// negotiates and negotiation has completed.
    fn negotiated_mode(&self) -> Option<EthMode> {
        None
    }
}

/// Constructs state machine instances.
pub trait FsmRuntime: Send + Sync {
    fn fsm_start(
        &self,
        subject: SmSubject,
        variant: SmVariant,
        initial: SmState,
        history: bool,
    ) -> AsicResult<Box<dyn StateMachine>>;
}
