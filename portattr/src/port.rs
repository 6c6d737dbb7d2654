// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/
//
// Copyright 2025 Oxide Computer Company

//! The ports and SerDes lanes managed by the engine, and the state machine
//! instances bound to them.

use std::collections::BTreeMap;
use std::fmt;

use aal::{
    AsicResult, DfeSmType, FsmRuntime, LaneId, LaneSmType, LogicalPort,
    PortSmType, SmEvent, SmEventId, SmEventPayload, SmState, SmSubject,
    SmVariant, StateMachine,
};
use common::ports::{
    AdminMode, AnMode, DfeMode, EthMode, IslTagFormat, PhysSubType, PortType,
};

use crate::attr::{lookup, AttrId, AttrValue};
use crate::storage::{LaneAttrSet, PortAttrSet};
use crate::types::{AttrError, AttrResult};

/// Where a port attaches to the switch.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum PhysMap {
    Epl { epl: u8, channel: u8 },
    Pcie { index: u8 },
    /// TE, loopback and PTI ports
    Fabric { index: u8 },
    None,
}

impl fmt::Display for PhysMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PhysMap::Epl { epl, channel } => write!(f, "epl{epl}/{channel}"),
            PhysMap::Pcie { index } => write!(f, "pcie{index}"),
            PhysMap::Fabric { index } => write!(f, "fabric{index}"),
            PhysMap::None => write!(f, "-"),
        }
    }
}

/// The binding types of the three kinds of state machine.
pub(crate) trait SmKind:
    Copy + Default + PartialEq + fmt::Display + Into<SmVariant>
{
}

impl SmKind for PortSmType {}
impl SmKind for LaneSmType {}
impl SmKind for DfeSmType {}

/// A state machine variant and the running instance of it, if any.  The
/// instance is only replaced through `release()` and `rebind()`, which
/// disable and stop it first.
pub(crate) struct Binding<T> {
    sm_type: T,
    instance: Option<Box<dyn StateMachine>>,
}

impl<T: SmKind> Binding<T> {
    pub fn unbound() -> Self {
        Binding {
            sm_type: T::default(),
            instance: None,
        }
    }

    pub fn sm_type(&self) -> T {
        self.sm_type
    }

    pub fn state(&self) -> Option<SmState> {
        self.instance.as_ref().map(|fsm| fsm.state())
    }

    pub fn negotiated_mode(&self) -> Option<EthMode> {
        self.instance.as_ref().and_then(|fsm| fsm.negotiated_mode())
    }

    /// Deliver an event to the bound instance.  Returns false if nothing is
    /// bound.
    pub fn notify(
        &mut self,
        id: SmEventId,
        payload: SmEventPayload,
        history: bool,
    ) -> AsicResult<bool> {
        let Some(fsm) = self.instance.as_mut() else {
            return Ok(false);
        };
        let event = SmEvent::new(self.sm_type, id)
            .with_payload(payload)
            .with_history(history);
        fsm.notify(&event)?;
        Ok(true)
    }

    /// Disable and stop the bound instance, leaving the binding unspecified
    /// whether or not that succeeds.
    pub fn release(&mut self, history: bool) -> AsicResult<()> {
        let sm_type = std::mem::take(&mut self.sm_type);
        let Some(mut fsm) = self.instance.take() else {
            return Ok(());
        };
        let event = SmEvent::new(sm_type, SmEventId::Disable).with_history(history);
        let disabled = fsm.notify(&event);
        let stopped = fsm.stop();
        disabled.and(stopped)
    }

    /// Replace the bound instance with a new one of the target variant,
    /// starting in its initial state.
    pub fn rebind(
        &mut self,
        asic: &dyn FsmRuntime,
        subject: SmSubject,
        target: T,
        history: bool,
    ) -> AsicResult<()> {
        self.release(history)?;
        if target == T::default() {
            return Ok(());
        }
        let fsm =
            asic.fsm_start(subject, target.into(), SmState::Disabled, history)?;
        self.instance = Some(fsm);
        self.sm_type = target;
        Ok(())
    }
}

impl<T> Drop for Binding<T> {
    fn drop(&mut self) {
        if let Some(mut fsm) = self.instance.take() {
            let _ = fsm.stop();
        }
    }
}

pub(crate) struct Port {
    pub id: LogicalPort,
    pub port_type: PortType,
    pub sub_type: PhysSubType,
    pub map: PhysMap,
    /// Index into the switch's per-port tables
    pub cardinal: Option<u32>,
    pub admin_mode: AdminMode,
    /// Drive the port with the stub state machine regardless of its mode
    pub stub_fsm: bool,
    pub fsm: Binding<PortSmType>,
    /// Lanes currently owned by the port, in channel order
    pub lanes: Vec<LaneId>,
    pub attrs: PortAttrSet,
    /// The LAG this port belongs to
    pub lag: Option<LogicalPort>,
    /// Attributes saved when the port joined its LAG
    pub snapshot: Option<PortAttrSet>,
}

impl Port {
    pub fn new(
        id: LogicalPort,
        port_type: PortType,
        sub_type: PhysSubType,
        map: PhysMap,
        cardinal_ports: usize,
    ) -> Self {
        Port {
            id,
            port_type,
            sub_type,
            map,
            cardinal: None,
            admin_mode: AdminMode::default(),
            stub_fsm: false,
            fsm: Binding::unbound(),
            lanes: Vec::new(),
            attrs: PortAttrSet::new(cardinal_ports),
            lag: None,
            snapshot: None,
        }
    }

    /// The stored value of a port-scoped attribute.
    pub fn cached(&self, id: AttrId) -> AttrResult<&AttrValue> {
        let desc = lookup(id)?;
        self.attrs
            .slot(desc)
            .ok_or_else(|| AttrError::InvalidArgument(format!("{id} is not port-scoped")))
    }

    pub fn set_cached(&mut self, id: AttrId, value: AttrValue) {
        if let Ok(desc) = lookup(id) {
            if let Some(slot) = self.attrs.slot_mut(desc) {
                *slot = value;
            }
        }
    }

    pub fn eth_mode(&self) -> EthMode {
        self.cached(AttrId::EthernetMode)
            .ok()
            .and_then(|v| v.as_eth_mode())
            .unwrap_or_default()
    }

    pub fn an_mode(&self) -> AnMode {
        self.cached(AttrId::Autoneg)
            .ok()
            .and_then(|v| v.as_an_mode())
            .unwrap_or_default()
    }

    pub fn isl_tag(&self) -> IslTagFormat {
        match self.cached(AttrId::IslTagFormat) {
            Ok(AttrValue::IslTagFormat(tag)) => *tag,
            _ => IslTagFormat::None,
        }
    }

    pub fn frame_size(&self, id: AttrId) -> u32 {
        self.cached(id).ok().and_then(|v| v.as_u32()).unwrap_or(0)
    }

    pub fn flag(&self, id: AttrId) -> bool {
        self.cached(id).ok().and_then(|v| v.as_bool()).unwrap_or(false)
    }

    /// The rate the port is running at: the negotiated mode's if the state
    /// machine has resolved one, otherwise the configured mode's.
    pub fn speed(&self) -> u32 {
        self.fsm
            .negotiated_mode()
            .unwrap_or_else(|| self.eth_mode())
            .speed()
    }

    pub fn epl(&self) -> Option<(u8, u8)> {
        match self.map {
            PhysMap::Epl { epl, channel } => Some((epl, channel)),
            _ => None,
        }
    }

    pub fn subject(&self) -> SmSubject {
        SmSubject::Port(self.id)
    }
}

pub(crate) struct Lane {
    pub id: LaneId,
    /// The port whose single-lane modes use this lane
    pub home: LogicalPort,
    pub owner: LogicalPort,
    pub attrs: LaneAttrSet,
    pub fsm: Binding<LaneSmType>,
    pub dfe: Binding<DfeSmType>,
}

impl Lane {
    pub fn new(id: LaneId, home: LogicalPort) -> Self {
        Lane {
            id,
            home,
            owner: home,
            attrs: LaneAttrSet::new(),
            fsm: Binding::unbound(),
            dfe: Binding::unbound(),
        }
    }

    pub fn dfe_mode(&self) -> DfeMode {
        match lookup(AttrId::DfeMode).map(|desc| self.attrs.slot(desc)) {
            Ok(Some(AttrValue::DfeMode(mode))) => *mode,
            _ => DfeMode::default(),
        }
    }
}

/// Every port and lane known to the engine.  Guarded as a whole by the
/// attribute lock.
pub(crate) struct PortTable {
    ports: BTreeMap<LogicalPort, Port>,
    lanes: BTreeMap<LaneId, Lane>,
    cardinal_ports: usize,
}

impl PortTable {
    pub fn new(cardinal_ports: usize) -> Self {
        PortTable {
            ports: BTreeMap::new(),
            lanes: BTreeMap::new(),
            cardinal_ports,
        }
    }

    /// The number of ports with a slot in the switch's per-port tables.
    pub fn cardinal_ports(&self) -> usize {
        self.cardinal_ports
    }

    pub fn contains(&self, port: LogicalPort) -> bool {
        self.ports.contains_key(&port)
    }

    pub fn get(&self, port: LogicalPort) -> AttrResult<&Port> {
        self.ports.get(&port).ok_or(AttrError::InvalidPort(port))
    }

    pub fn get_mut(&mut self, port: LogicalPort) -> AttrResult<&mut Port> {
        self.ports.get_mut(&port).ok_or(AttrError::InvalidPort(port))
    }

    pub fn insert(&mut self, port: Port) {
        self.ports.insert(port.id, port);
    }

    pub fn remove(&mut self, port: LogicalPort) -> Option<Port> {
        self.ports.remove(&port)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Port> {
        self.ports.values()
    }

    pub fn lane(&self, lane: LaneId) -> AttrResult<&Lane> {
        self.lanes.get(&lane).ok_or_else(|| {
            AttrError::InvalidArgument(format!("no such lane {lane}"))
        })
    }

    pub fn lane_mut(&mut self, lane: LaneId) -> AttrResult<&mut Lane> {
        self.lanes.get_mut(&lane).ok_or_else(|| {
            AttrError::InvalidArgument(format!("no such lane {lane}"))
        })
    }

    /// The storage blocks of a port and, optionally, one of its lanes.
    pub fn attrs_mut(
        &mut self,
        port: LogicalPort,
        lane: Option<LaneId>,
    ) -> AttrResult<(&mut PortAttrSet, Option<&mut LaneAttrSet>)> {
        let port_attrs = &mut self
            .ports
            .get_mut(&port)
            .ok_or(AttrError::InvalidPort(port))?
            .attrs;
        let lane_attrs = match lane {
            Some(lane) => Some(
                &mut self
                    .lanes
                    .get_mut(&lane)
                    .ok_or_else(|| {
                        AttrError::InvalidArgument(format!("no such lane {lane}"))
                    })?
                    .attrs,
            ),
            None => None,
        };
        Ok((port_attrs, lane_attrs))
    }

    pub fn insert_lane(&mut self, lane: Lane) {
        self.lanes.insert(lane.id, lane);
    }

    /// The other ports on the same EPL as `port`.
    pub fn epl_siblings(&self, port: &Port) -> Vec<&Port> {
        let Some((epl, _)) = port.epl() else {
            return Vec::new();
        };
        self.ports
            .values()
            .filter(|p| p.id != port.id)
            .filter(|p| p.epl().map(|(e, _)| e) == Some(epl))
            .collect()
    }
}
