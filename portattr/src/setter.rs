// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/
//
// Copyright 2025 Oxide Computer Company

//! The internal get/set paths, run with the attribute lock held.  The public
//! facade and the LAG propagator both funnel through here; they differ only
//! in the `Origin` they pass.

use aal::{LaneId, LogicalPort, PortUpdate};
use slog::debug;

use crate::attr::handlers::{Recompute, Target};
use crate::attr::{AttrId, AttrValue, AttributeDescriptor, Scope};
use crate::context::{ApplyCtx, ReadCtx};
use crate::derived;
use crate::dispatch::{resolve, resolve_mut, validate_access, validate_per_lag};
use crate::port::{Port, PortTable};
use crate::types::{AttrError, AttrResult, Direction, LaneSel, Origin};

/// Lane attributes a single request may apply to every lane of a port.
/// BIST patterns are per-lane by nature, and the eye score has no meaning
/// across lanes.
fn fans_out(id: AttrId) -> bool {
    !matches!(
        id,
        AttrId::BistUserPatternLow40
            | AttrId::BistUserPatternHigh40
            | AttrId::EyeScore
    )
}

/// Attributes a virtual port carries.  They are stored but never programmed.
pub(crate) fn virtual_port_attr(id: AttrId) -> bool {
    matches!(
        id,
        AttrId::DefVlan | AttrId::DefPri | AttrId::DefCfi | AttrId::DefSwpri
    )
}

/// Work out which lanes a request touches.  Port-scoped attributes touch no
/// lane, whatever the caller asked for.
pub(crate) fn select_lanes(
    desc: &AttributeDescriptor,
    port: &Port,
    sel: LaneSel,
    direction: Direction,
) -> AttrResult<Vec<Option<LaneId>>> {
    if desc.scope == Scope::Port {
        return Ok(vec![None]);
    }

    let bad_lane = || AttrError::InvalidPortLane {
        port: port.id,
        lane: sel,
    };
    match sel {
        LaneSel::NotApplicable => Err(bad_lane()),
        LaneSel::Index(idx) => port
            .lanes
            .get(idx as usize)
            .map(|lane| vec![Some(*lane)])
            .ok_or_else(bad_lane),
        LaneSel::All => {
            let first = port.lanes.first().ok_or_else(bad_lane)?;
            match direction {
                Direction::Read => Ok(vec![Some(*first)]),
                Direction::Write if fans_out(desc.id) => {
                    Ok(port.lanes.iter().map(|l| Some(*l)).collect())
                }
                Direction::Write => Err(bad_lane()),
            }
        }
    }
}

fn cached<'a>(
    ports: &'a PortTable,
    port: LogicalPort,
    lane: Option<LaneId>,
    desc: &AttributeDescriptor,
) -> AttrResult<&'a AttrValue> {
    let lane_attrs = match lane {
        Some(lane) => Some(&ports.lane(lane)?.attrs),
        None => None,
    };
    resolve(desc, &ports.get(port)?.attrs, lane_attrs)
}

fn store(
    ports: &mut PortTable,
    port: LogicalPort,
    lane: Option<LaneId>,
    desc: &AttributeDescriptor,
    value: AttrValue,
) -> AttrResult<()> {
    let (port_attrs, lane_attrs) = ports.attrs_mut(port, lane)?;
    *resolve_mut(desc, port_attrs, lane_attrs)? = value;
    Ok(())
}

/// Apply an already validated value to one port or lane: program the
/// hardware if the value changed, store it, and bring any derived state up
/// to date.
pub(crate) fn set_one(
    ctx: &mut ApplyCtx<'_, '_>,
    port: LogicalPort,
    lane: Option<LaneId>,
    desc: &AttributeDescriptor,
    value: AttrValue,
) -> AttrResult<()> {
    let needed = {
        let ports = ctx.ports();
        let current = cached(ports, port, lane, desc)?;
        desc.handler.needs_apply(ports.get(port)?, current, &value)
    };
    if !needed {
        debug!(ctx.log, "{} unchanged", desc.id; "port" => %port);
        return Ok(());
    }

    desc.handler.apply(desc, ctx, Target { port, lane }, &value)?;
    debug!(ctx.log, "set {}", desc.id;
        "port" => %port,
        "lane" => ?lane,
        "value" => %value);
    store(ctx.ports_mut(), port, lane, desc, value)?;

    match desc.handler.recompute() {
        Recompute::None => {}
        Recompute::FrameLengths => derived::frame_lengths(ctx, port)?,
        Recompute::SafMatrix => derived::saf_matrix(ctx)?,
    }
    ctx.effects.updates.push(PortUpdate::Attribute {
        port,
        attr: desc.id.into(),
    });
    Ok(())
}

/// Set an attribute on a port that programs its own hardware.
pub(crate) fn set_direct(
    ctx: &mut ApplyCtx<'_, '_>,
    port: LogicalPort,
    sel: LaneSel,
    desc: &AttributeDescriptor,
    value: AttrValue,
    origin: Origin,
) -> AttrResult<()> {
    let (lanes, value) = {
        let ports = ctx.ports();
        let p = ports.get(port)?;
        validate_access(desc, p, Direction::Write)?;
        validate_per_lag(desc, p, origin, ctx.settings.per_lag_management)?;
        let lanes = select_lanes(desc, p, sel, Direction::Write)?;
        (lanes, desc.handler.validate(desc, ports, p, value)?)
    };

    for lane in lanes {
        set_one(ctx, port, lane, desc, value.clone())?;
    }
    Ok(())
}

/// Store an attribute on a virtual port.
pub(crate) fn set_virtual(
    ctx: &mut ApplyCtx<'_, '_>,
    port: LogicalPort,
    desc: &AttributeDescriptor,
    value: AttrValue,
) -> AttrResult<()> {
    if !virtual_port_attr(desc.id) {
        return Err(AttrError::InvalidArgument(format!(
            "{} cannot be set on virtual {port}",
            desc.id
        )));
    }
    let value = {
        let ports = ctx.ports();
        desc.handler.validate(desc, ports, ports.get(port)?, value)?
    };
    let p = ctx.ports_mut().get_mut(port)?;
    *resolve_mut(desc, &mut p.attrs, None)? = value;
    Ok(())
}

/// Read an attribute from a port or lane, going to the hardware for live
/// status.
pub(crate) fn get_direct(
    ctx: &ReadCtx<'_, '_>,
    port: LogicalPort,
    sel: LaneSel,
    desc: &AttributeDescriptor,
) -> AttrResult<AttrValue> {
    let ports = ctx.ports();
    let p = ports.get(port)?;
    validate_access(desc, p, Direction::Read)?;
    let lane = select_lanes(desc, p, sel, Direction::Read)?
        .into_iter()
        .next()
        .flatten();
    let current = cached(ports, port, lane, desc)?;
    desc.handler.read(desc, ctx, Target { port, lane }, current)
}

/// Read an attribute straight from a port's storage.  Used for LAG and
/// virtual ports, which have no hardware of their own.
pub(crate) fn get_cached(
    ctx: &ReadCtx<'_, '_>,
    port: LogicalPort,
    desc: &AttributeDescriptor,
) -> AttrResult<AttrValue> {
    let current = cached(ctx.ports(), port, None, desc)?;
    Ok(desc.handler.to_api(current, ctx.cardinal_ports()))
}
