// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/
//
// Copyright 2025 Oxide Computer Company

use std::sync::Mutex;

use aal::{
    DfeSmType, LaneId, LaneSmType, LogicalPort, PortSmType, PortUpdate,
    SmEventId, SmEventPayload, SmState,
};
use common::ports::{AdminMode, PhysSubType, PortType};
use slog::{debug, error, info, o, warn};
use tokio::sync::mpsc::UnboundedSender;

use crate::attr::{lookup, AttrValue, AttributeDescriptor};
use crate::config::{EngineConfig, PortSpec};
use crate::context::{ApplyCtx, Effects, ReadCtx, Settings};
use crate::lag::{self, LagMembership, LagTable};
use crate::locks::{AttrGuard, Locks};
use crate::port::{Lane, PhysMap, Port, PortTable};
use crate::port_mode;
use crate::setter::{
    get_cached, get_direct, set_direct, set_virtual, virtual_port_attr,
};
use crate::types::{AttrError, AttrResult, LaneSel, Origin};

/// The port attribute engine.  Every public operation takes the engine's
/// locks in the order LAG, attribute, register, and releases them before any
/// notification goes out.
pub struct PortAttrEngine {
    log: slog::Logger,
    settings: Settings,
    lag_port_base: u32,
    asic_hdl: asic::Handle,
    locks: Locks,
    update_tx: Mutex<Option<UnboundedSender<PortUpdate>>>,
}

fn port_for_spec(spec: &PortSpec, cardinal_ports: usize) -> Port {
    let (port_type, sub_type, map) = match *spec {
        PortSpec::Epl { epl, channel, .. } => (
            PortType::Physical,
            PhysSubType::Epl,
            PhysMap::Epl { epl, channel },
        ),
        PortSpec::Pcie { index, .. } => (
            PortType::Physical,
            PhysSubType::Pcie,
            PhysMap::Pcie { index },
        ),
        PortSpec::Cpu { .. } => {
            (PortType::Cpu, PhysSubType::None, PhysMap::None)
        }
        PortSpec::Te { index, .. } => {
            (PortType::Te, PhysSubType::Te, PhysMap::Fabric { index })
        }
        PortSpec::Loopback { index, .. } => (
            PortType::Loopback,
            PhysSubType::Loopback,
            PhysMap::Fabric { index },
        ),
        PortSpec::Pti { index, .. } => {
            (PortType::Pti, PhysSubType::Pti, PhysMap::Fabric { index })
        }
        PortSpec::Virtual { .. } => {
            (PortType::Virtual, PhysSubType::None, PhysMap::None)
        }
        PortSpec::Special { .. } => {
            (PortType::Special, PhysSubType::None, PhysMap::None)
        }
    };
    let mut port =
        Port::new(spec.port(), port_type, sub_type, map, cardinal_ports);
    port.stub_fsm = matches!(spec, PortSpec::Epl { stub: true, .. });
    port
}

/// The state machine a port starts with.
fn initial_port_sm(port: &Port) -> PortSmType {
    match (port.port_type, port.sub_type) {
        (PortType::Virtual | PortType::Special | PortType::Lag, _) => {
            PortSmType::Unspecified
        }
        (_, PhysSubType::Epl) if port.stub_fsm => PortSmType::Stub,
        (_, PhysSubType::Epl) => PortSmType::Basic,
        (_, PhysSubType::Pcie) => PortSmType::Pcie,
        _ => PortSmType::Stub,
    }
}

/// Create the ports and lanes named in the configuration and start their
/// state machines.
fn build_ports(
    log: &slog::Logger,
    config: &EngineConfig,
    asic_hdl: &asic::Handle,
) -> AttrResult<PortTable> {
    let history = config.fsm_history;
    let mut ports = PortTable::new(config.cardinal_ports);
    let mut next_cardinal = 0;

    for spec in &config.ports {
        let mut port = port_for_spec(spec, config.cardinal_ports);
        if spec.is_cardinal() {
            port.cardinal = Some(next_cardinal);
            next_cardinal += 1;
        }

        let subject = port.subject();
        port.fsm
            .rebind(asic_hdl, subject, initial_port_sm(&port), history)?;

        let lane = match spec {
            PortSpec::Epl { epl, channel, .. } => {
                Some(LaneId::new(*epl, *channel))
            }
            PortSpec::Pcie {
                serdes: Some(lane), ..
            } => Some(*lane),
            _ => None,
        };
        if let Some(id) = lane {
            let mut lane = Lane::new(id, port.id);
            let (lane_type, dfe_type) = port_mode::lane_sm_types(&port, &port);
            lane.fsm
                .rebind(asic_hdl, aal::SmSubject::Lane(id), lane_type, history)?;
            lane.dfe
                .rebind(asic_hdl, aal::SmSubject::Dfe(id), dfe_type, history)?;
            port.lanes.push(id);
            ports.insert_lane(lane);
        }

        debug!(log, "created port";
            "port" => %port.id,
            "type" => %port.port_type,
            "map" => %port.map,
            "fsm" => %port.fsm.sm_type());
        ports.insert(port);
    }
    Ok(ports)
}

/// Route a write by the kind of port it is aimed at.
fn set_routed(
    ctx: &mut ApplyCtx<'_, '_>,
    port: LogicalPort,
    lane: LaneSel,
    desc: &'static AttributeDescriptor,
    value: AttrValue,
) -> AttrResult<()> {
    match ctx.ports().get(port)?.port_type {
        PortType::Lag => lag::set_on_lag_logical_port(ctx, port, desc, value),
        PortType::Physical
        | PortType::Cpu
        | PortType::Te
        | PortType::Loopback
        | PortType::Pti => {
            set_direct(ctx, port, lane, desc, value, Origin::Direct)
        }
        PortType::Virtual => set_virtual(ctx, port, desc, value),
        PortType::Special => Err(AttrError::InvalidArgument(format!(
            "attributes cannot be set on special {port}"
        ))),
    }
}

fn get_routed(
    ctx: &ReadCtx<'_, '_>,
    port: LogicalPort,
    lane: LaneSel,
    desc: &'static AttributeDescriptor,
) -> AttrResult<AttrValue> {
    match ctx.ports().get(port)?.port_type {
        PortType::Lag if !desc.per_lag => {
            Err(AttrError::NotPerLagAttribute(desc.id.to_string()))
        }
        PortType::Lag => get_cached(ctx, port, desc),
        PortType::Physical
        | PortType::Cpu
        | PortType::Te
        | PortType::Loopback
        | PortType::Pti => get_direct(ctx, port, lane, desc),
        PortType::Virtual if virtual_port_attr(desc.id) => {
            get_cached(ctx, port, desc)
        }
        PortType::Virtual | PortType::Special => {
            Err(AttrError::InvalidArgument(format!(
                "{} cannot be read from {port}",
                desc.id
            )))
        }
    }
}

fn admin_event(mode: AdminMode) -> SmEventId {
    match mode {
        AdminMode::Up => SmEventId::AdminUp,
        AdminMode::Down => SmEventId::AdminDown,
        AdminMode::PowerDown => SmEventId::PowerDown,
    }
}

impl PortAttrEngine {
    pub fn new(
        log: &slog::Logger,
        config: &EngineConfig,
        asic_hdl: asic::Handle,
    ) -> AttrResult<Self> {
        let log = log.new(o!("unit" => "portattr"));
        config
            .validate()
            .map_err(|e| AttrError::InvalidArgument(e.to_string()))?;

        let ports = build_ports(&log, config, &asic_hdl)?;
        info!(log, "port attribute engine initialized";
            "ports" => config.ports.len(),
            "cardinal_ports" => config.cardinal_ports,
            "per_lag_management" => config.per_lag_management);

        Ok(PortAttrEngine {
            log,
            settings: Settings {
                per_lag_management: config.per_lag_management,
                fsm_history: config.fsm_history,
                pll_poll_limit: config.pll_poll_limit,
            },
            lag_port_base: config.lag_port_base,
            asic_hdl,
            locks: Locks::new(LagTable::default(), ports),
            update_tx: Mutex::new(None),
        })
    }

    /// Build an engine, along with its root logger and ASIC handle, from a
    /// configuration.
    pub fn init(config: &EngineConfig) -> anyhow::Result<Self> {
        let log = common::logging::init("portattr", &config.log)?;
        let asic_hdl = asic::Handle::new(&log, &config.asic)?;
        Ok(PortAttrEngine::new(&log, config, asic_hdl)?)
    }

    pub fn asic(&self) -> &asic::Handle {
        &self.asic_hdl
    }

    /// Deliver a `PortUpdate` on `tx` after every change with physical side
    /// effects.  Replaces any previously registered handler.
    pub fn register_port_update_handler(&self, tx: UnboundedSender<PortUpdate>) {
        *self.update_tx.lock().unwrap() = Some(tx);
    }

    fn apply_ctx<'c, 'g>(
        &'c self,
        guard: &'c mut AttrGuard<'g>,
        effects: &'c mut Effects,
    ) -> ApplyCtx<'c, 'g> {
        ApplyCtx {
            asic: &self.asic_hdl,
            guard,
            settings: &self.settings,
            log: &self.log,
            effects,
        }
    }

    // Run `f` holding the LAG and attribute locks.
    fn with_lag_lock<T>(
        &self,
        f: impl FnOnce(&mut ApplyCtx<'_, '_>) -> AttrResult<T>,
    ) -> AttrResult<T> {
        let mut effects = Effects::default();
        let mut lags = self.locks.lag();
        let mut guard = lags.attrs();
        let result = f(&mut self.apply_ctx(&mut guard, &mut effects));
        drop(guard);
        drop(lags);
        self.finish(result, effects)
    }

    // Run `f` holding only the attribute lock.
    fn with_attr_lock<T>(
        &self,
        f: impl FnOnce(&mut ApplyCtx<'_, '_>) -> AttrResult<T>,
    ) -> AttrResult<T> {
        let mut effects = Effects::default();
        let mut guard = self.locks.attrs();
        let result = f(&mut self.apply_ctx(&mut guard, &mut effects));
        drop(guard);
        self.finish(result, effects)
    }

    fn with_read_lock<T>(
        &self,
        f: impl FnOnce(&ReadCtx<'_, '_>) -> AttrResult<T>,
    ) -> AttrResult<T> {
        let guard = self.locks.attrs();
        let ctx = ReadCtx {
            asic: &self.asic_hdl,
            guard: &guard,
        };
        f(&ctx)
    }

    /// Publish the side effects of an operation once its locks have been
    /// released.  Admin modes are redelivered even if the operation failed
    /// after replacing a state machine.
    fn finish<T>(&self, result: AttrResult<T>, effects: Effects) -> AttrResult<T> {
        self.send_updates(effects.updates);

        let mut restore_err = None;
        for port in effects.restore_admin {
            if let Err(e) = self.deliver_admin_mode(port, None) {
                error!(self.log, "failed to restore admin mode";
                    "port" => %port,
                    "error" => %e);
                restore_err.get_or_insert(e);
            }
        }
        match (result, restore_err) {
            (Ok(_), Some(e)) => Err(e),
            (result, _) => result,
        }
    }

    fn send_updates(&self, updates: Vec<PortUpdate>) {
        if updates.is_empty() {
            return;
        }
        let mut tx = self.update_tx.lock().unwrap();
        let Some(sender) = tx.as_ref() else {
            return;
        };
        for update in updates {
            if sender.send(update).is_err() {
                warn!(self.log, "port update receiver has gone away");
                *tx = None;
                return;
            }
        }
    }

    /// Set an attribute on a port, or on one or all of its lanes.
    pub fn set_attribute(
        &self,
        port: LogicalPort,
        lane: LaneSel,
        attr: impl Into<u32>,
        value: impl Into<AttrValue>,
    ) -> AttrResult<()> {
        let desc = lookup(attr)?;
        let value = value.into();
        if desc.per_lag {
            self.with_lag_lock(|ctx| set_routed(ctx, port, lane, desc, value))
        } else {
            self.with_attr_lock(|ctx| set_routed(ctx, port, lane, desc, value))
        }
    }

    /// Read an attribute from a port, or from one of its lanes.  With
    /// `LaneSel::All` a lane attribute is read from the port's first lane.
    pub fn get_attribute(
        &self,
        port: LogicalPort,
        lane: LaneSel,
        attr: impl Into<u32>,
    ) -> AttrResult<AttrValue> {
        let desc = lookup(attr)?;
        self.with_read_lock(|ctx| get_routed(ctx, port, lane, desc))
    }

    // Deliver an admin mode to a port's state machines.  With no mode given,
    // the port's last admin mode is delivered again.
    fn deliver_admin_mode(
        &self,
        port: LogicalPort,
        mode: Option<AdminMode>,
    ) -> AttrResult<()> {
        let history = self.settings.fsm_history;
        let mut guard = self.locks.attrs();
        let ports = guard.ports_mut();

        let p = ports.get_mut(port)?;
        let mode = mode.unwrap_or(p.admin_mode);
        p.admin_mode = mode;
        let event = admin_event(mode);
        p.fsm.notify(event, SmEventPayload::None, history)?;

        let lanes = p.lanes.clone();
        for lane in lanes {
            ports
                .lane_mut(lane)?
                .fsm
                .notify(event, SmEventPayload::None, history)?;
        }
        drop(guard);

        debug!(self.log, "admin mode delivered"; "port" => %port, "mode" => %mode);
        self.send_updates(vec![PortUpdate::AdminMode { port, mode }]);
        Ok(())
    }

    pub fn set_admin_mode(
        &self,
        port: LogicalPort,
        mode: AdminMode,
    ) -> AttrResult<()> {
        self.deliver_admin_mode(port, Some(mode))
    }

    pub fn admin_mode(&self, port: LogicalPort) -> AttrResult<AdminMode> {
        self.with_read_lock(|ctx| Ok(ctx.ports().get(port)?.admin_mode))
    }

    pub fn port_sm_type(&self, port: LogicalPort) -> AttrResult<PortSmType> {
        self.with_read_lock(|ctx| Ok(ctx.ports().get(port)?.fsm.sm_type()))
    }

    /// The state of a port's state machine, or `None` if none is bound.
    pub fn port_fsm_state(&self, port: LogicalPort) -> AttrResult<Option<SmState>> {
        self.with_read_lock(|ctx| Ok(ctx.ports().get(port)?.fsm.state()))
    }

    /// The lanes a port currently owns, in channel order.
    pub fn port_lanes(&self, port: LogicalPort) -> AttrResult<Vec<LaneId>> {
        self.with_read_lock(|ctx| Ok(ctx.ports().get(port)?.lanes.clone()))
    }

    fn owned_lane(
        ctx: &ReadCtx<'_, '_>,
        port: LogicalPort,
        idx: u8,
    ) -> AttrResult<LaneId> {
        ctx.ports()
            .get(port)?
            .lanes
            .get(idx as usize)
            .copied()
            .ok_or(AttrError::InvalidPortLane {
                port,
                lane: LaneSel::Index(idx),
            })
    }

    pub fn lane_sm_type(
        &self,
        port: LogicalPort,
        idx: u8,
    ) -> AttrResult<LaneSmType> {
        self.with_read_lock(|ctx| {
            let lane = Self::owned_lane(ctx, port, idx)?;
            Ok(ctx.ports().lane(lane)?.fsm.sm_type())
        })
    }

    pub fn lane_dfe_sm_type(
        &self,
        port: LogicalPort,
        idx: u8,
    ) -> AttrResult<DfeSmType> {
        self.with_read_lock(|ctx| {
            let lane = Self::owned_lane(ctx, port, idx)?;
            Ok(ctx.ports().lane(lane)?.dfe.sm_type())
        })
    }

    /// Create LAG `index`, returning its logical port.
    pub fn create_lag(
        &self,
        index: u32,
        internal: bool,
    ) -> AttrResult<LogicalPort> {
        let port = self
            .lag_port_base
            .checked_add(index)
            .map(LogicalPort)
            .ok_or_else(|| {
                AttrError::InvalidArgument(format!("LAG index {index} too large"))
            })?;

        self.with_lag_lock(|ctx| {
            if ctx.ports().contains(port) {
                return Err(AttrError::InvalidArgument(format!(
                    "{port} already exists"
                )));
            }
            let cardinal_ports = ctx.ports().cardinal_ports();
            ctx.ports_mut().insert(Port::new(
                port,
                PortType::Lag,
                PhysSubType::None,
                PhysMap::None,
                cardinal_ports,
            ));
            ctx.guard.lags_mut()?.insert(LagMembership {
                index,
                port,
                internal,
                members: Default::default(),
            });
            info!(ctx.log, "created LAG"; "lag" => %port, "internal" => internal);
            Ok(port)
        })
    }

    /// Delete a LAG.  Every member is removed first; the LAG is deleted even
    /// if restoring a member's settings fails.
    pub fn delete_lag(&self, lag: LogicalPort) -> AttrResult<()> {
        self.with_lag_lock(|ctx| {
            let members: Vec<LogicalPort> =
                ctx.guard.lags()?.get(lag)?.members.iter().copied().collect();
            let mut first = None;
            for member in members {
                if let Err(e) = lag::remove_member(ctx, lag, member) {
                    first.get_or_insert(e);
                }
            }
            ctx.guard.lags_mut()?.remove(lag);
            ctx.ports_mut().remove(lag);
            info!(ctx.log, "deleted LAG"; "lag" => %lag);
            first.map_or(Ok(()), Err)
        })
    }

    pub fn add_lag_member(
        &self,
        lag: LogicalPort,
        port: LogicalPort,
    ) -> AttrResult<()> {
        self.with_lag_lock(|ctx| lag::add_member(ctx, lag, port))
    }

    pub fn remove_lag_member(
        &self,
        lag: LogicalPort,
        port: LogicalPort,
    ) -> AttrResult<()> {
        self.with_lag_lock(|ctx| lag::remove_member(ctx, lag, port))
    }

    pub fn lag_members(&self, lag: LogicalPort) -> AttrResult<Vec<LogicalPort>> {
        let lags = self.locks.lag();
        let members = lags.lags().get(lag)?.members.iter().copied().collect();
        Ok(members)
    }

    /// Copy a LAG's per-lag attributes onto one of its members.  `port` must
    /// already belong to `lag`.
    pub fn apply_lag_settings_to_new_member(
        &self,
        port: LogicalPort,
        lag: LogicalPort,
    ) -> AttrResult<()> {
        self.with_lag_lock(|ctx| {
            lag::apply_lag_settings_to_new_member(ctx, port, lag)
        })
    }

    /// Write back the attributes a port had before it joined its LAG.  The
    /// port must still be a member.
    pub fn restore_original_member_attr(
        &self,
        port: LogicalPort,
    ) -> AttrResult<()> {
        self.with_lag_lock(|ctx| lag::restore_original_member_attr(ctx, port))
    }
}
