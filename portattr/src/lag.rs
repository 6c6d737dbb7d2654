// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/
//
// Copyright 2025 Oxide Computer Company

//! Link aggregation groups.  Per-lag attributes are owned by the LAG's
//! logical port and copied onto each member.  A member's own values are
//! saved when it joins and written back when it leaves.

use std::collections::{BTreeMap, BTreeSet};

use aal::{LogicalPort, PortUpdate};
use common::ports::{PhysSubType, PortType};
use slog::{debug, info, warn};

use crate::attr::{descriptors, AttrId, AttrValue, AttributeDescriptor, Scope};
use crate::context::ApplyCtx;
use crate::dispatch::{resolve, resolve_mut, validate_access};
use crate::port::Port;
use crate::setter::set_direct;
use crate::storage::PortAttrSet;
use crate::types::{AttrError, AttrResult, Direction, LaneSel, Origin};

#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct LagMembership {
    pub index: u32,
    pub port: LogicalPort,
    /// Internal LAGs join switches in a stack rather than face the network
    pub internal: bool,
    pub members: BTreeSet<LogicalPort>,
}

/// Every LAG, keyed by its logical port.  Guarded by the LAG lock.
#[derive(Debug, Default)]
pub(crate) struct LagTable {
    lags: BTreeMap<LogicalPort, LagMembership>,
}

impl LagTable {
    pub fn get(&self, lag: LogicalPort) -> AttrResult<&LagMembership> {
        self.lags.get(&lag).ok_or(AttrError::InvalidPort(lag))
    }

    pub fn get_mut(
        &mut self,
        lag: LogicalPort,
    ) -> AttrResult<&mut LagMembership> {
        self.lags.get_mut(&lag).ok_or(AttrError::InvalidPort(lag))
    }

    pub fn insert(&mut self, lag: LagMembership) {
        self.lags.insert(lag.port, lag);
    }

    pub fn remove(&mut self, lag: LogicalPort) -> Option<LagMembership> {
        self.lags.remove(&lag)
    }
}

fn per_lag_descriptors() -> impl Iterator<Item = &'static AttributeDescriptor>
{
    descriptors().filter(|d| d.per_lag && d.scope == Scope::Port)
}

/// The per-lag writes needed to bring `member` in line with `source`, in the
/// caller-facing representation the setter expects.
fn differing(
    member: &Port,
    source: &PortAttrSet,
    cardinal_ports: usize,
    log: &slog::Logger,
) -> AttrResult<Vec<(&'static AttributeDescriptor, AttrValue)>> {
    let mut writes = Vec::new();
    for desc in per_lag_descriptors() {
        if desc.excluded(member.sub_type, true) {
            debug!(log, "{} not applicable", desc.id; "port" => %member.id);
            continue;
        }
        let want = resolve(desc, source, None)?;
        if resolve(desc, &member.attrs, None)? != want {
            writes.push((desc, desc.handler.to_api(want, cardinal_ports)));
        }
    }
    order_frame_sizes(&mut writes, member);
    Ok(writes)
}

/// The minimum frame size is checked against the stored maximum and vice
/// versa.  When the new minimum is above the member's current maximum the
/// maximum has to go first.
fn order_frame_sizes(
    writes: &mut [(&'static AttributeDescriptor, AttrValue)],
    member: &Port,
) {
    let pos = |id| writes.iter().position(|(d, _)| d.id == id);
    let (Some(min), Some(max)) =
        (pos(AttrId::MinFrameSize), pos(AttrId::MaxFrameSize))
    else {
        return;
    };
    let new_min = writes[min].1.as_u32().unwrap_or(0);
    let grows_past_max = new_min > member.frame_size(AttrId::MaxFrameSize);
    if grows_past_max == (min < max) {
        writes.swap(min, max);
    }
}

/// Fails unless `member` currently belongs to `lag`.
fn check_membership(
    ctx: &ApplyCtx<'_, '_>,
    member: LogicalPort,
    lag: LogicalPort,
) -> AttrResult<()> {
    let lags = ctx.guard.lags()?;
    let Ok(membership) = lags.get(lag) else {
        return Err(AttrError::InvalidArgument(format!("{lag} is not a LAG")));
    };
    if membership.members.contains(&member) {
        Ok(())
    } else {
        Err(AttrError::InvalidArgument(format!(
            "{member} is not a member of {lag}"
        )))
    }
}

/// Copy the LAG's per-lag attributes onto one of its members.  The member's
/// own values are saved first, unless a saved copy already exists.  The
/// first failing write aborts the copy.
pub(crate) fn apply_lag_settings_to_new_member(
    ctx: &mut ApplyCtx<'_, '_>,
    member: LogicalPort,
    lag: LogicalPort,
) -> AttrResult<()> {
    check_membership(ctx, member, lag)?;
    copy_lag_settings(ctx, member, lag)
}

fn copy_lag_settings(
    ctx: &mut ApplyCtx<'_, '_>,
    member: LogicalPort,
    lag: LogicalPort,
) -> AttrResult<()> {
    let writes = {
        let ports = ctx.ports();
        let source = &ports.get(lag)?.attrs;
        differing(ports.get(member)?, source, ports.cardinal_ports(), ctx.log)?
    };

    let m = ctx.ports_mut().get_mut(member)?;
    if m.snapshot.is_none() {
        m.snapshot = Some(m.attrs.clone());
    }

    info!(ctx.log, "applying LAG settings";
        "port" => %member,
        "lag" => %lag,
        "attributes" => writes.len());
    for (desc, value) in writes {
        set_direct(
            ctx,
            member,
            LaneSel::NotApplicable,
            desc,
            value,
            Origin::Propagator,
        )?;
    }
    Ok(())
}

/// Write back the per-lag attributes a LAG member had before it joined.
/// The saved copy is consumed even if some writes fail; every write is
/// attempted and the first failure is returned.
pub(crate) fn restore_original_member_attr(
    ctx: &mut ApplyCtx<'_, '_>,
    member: LogicalPort,
) -> AttrResult<()> {
    let Some(lag) = ctx.ports().get(member)?.lag else {
        return Err(AttrError::InvalidArgument(format!(
            "{member} is not a LAG member"
        )));
    };
    check_membership(ctx, member, lag)?;
    restore_snapshot(ctx, member)
}

fn restore_snapshot(
    ctx: &mut ApplyCtx<'_, '_>,
    member: LogicalPort,
) -> AttrResult<()> {
    let snapshot = ctx
        .ports_mut()
        .get_mut(member)?
        .snapshot
        .take()
        .ok_or_else(|| {
            AttrError::Uninitialized(format!("no saved attributes for {member}"))
        })?;

    let writes = {
        let ports = ctx.ports();
        differing(ports.get(member)?, &snapshot, ports.cardinal_ports(), ctx.log)?
    };

    info!(ctx.log, "restoring member settings";
        "port" => %member,
        "attributes" => writes.len());
    let mut first = None;
    for (desc, value) in writes {
        if let Err(e) = set_direct(
            ctx,
            member,
            LaneSel::NotApplicable,
            desc,
            value,
            Origin::Propagator,
        ) {
            warn!(ctx.log, "failed to restore {}", desc.id;
                "port" => %member,
                "error" => %e);
            first.get_or_insert(e);
        }
    }
    first.map_or(Ok(()), Err)
}

/// Set a per-lag attribute on a LAG.  The value is stored on the LAG's
/// logical port and pushed to every member it applies to.
///
/// The LAG's copy is updated before any member is written.  A member write
/// that fails stops the push and is returned, leaving the LAG and the
/// members already written with the new value; nothing is rolled back.
pub(crate) fn set_on_lag_logical_port(
    ctx: &mut ApplyCtx<'_, '_>,
    lag: LogicalPort,
    desc: &'static AttributeDescriptor,
    value: AttrValue,
) -> AttrResult<()> {
    if !desc.per_lag {
        return Err(AttrError::NotPerLagAttribute(desc.id.to_string()));
    }

    let (value, members) = {
        let ports = ctx.ports();
        let p = ports.get(lag)?;
        validate_access(desc, p, Direction::Write)?;
        let value = desc.handler.validate(desc, ports, p, value)?;
        let members: Vec<LogicalPort> =
            ctx.guard.lags()?.get(lag)?.members.iter().copied().collect();
        (value, members)
    };
    let api = desc.handler.to_api(&value, ctx.ports().cardinal_ports());

    let p = ctx.ports_mut().get_mut(lag)?;
    *resolve_mut(desc, &mut p.attrs, None)? = value;
    debug!(ctx.log, "set {} on LAG", desc.id;
        "lag" => %lag,
        "members" => members.len());

    for member in members {
        if desc.excluded(ctx.ports().get(member)?.sub_type, true) {
            continue;
        }
        set_direct(
            ctx,
            member,
            LaneSel::NotApplicable,
            desc,
            api.clone(),
            Origin::Propagator,
        )?;
    }
    ctx.effects.updates.push(PortUpdate::Attribute {
        port: lag,
        attr: desc.id.into(),
    });
    Ok(())
}

/// Only physical ports with a MAC of their own can be aggregated.
fn check_joinable(port: &Port) -> AttrResult<()> {
    let ok = port.port_type == PortType::Physical
        && matches!(port.sub_type, PhysSubType::Epl | PhysSubType::Pcie);
    if ok {
        Ok(())
    } else {
        Err(AttrError::InvalidArgument(format!(
            "{} port {} cannot join a LAG",
            port.port_type, port.id
        )))
    }
}

/// Make `member` part of `lag`, copying the LAG's settings onto it when
/// per-lag management is active.
pub(crate) fn add_member(
    ctx: &mut ApplyCtx<'_, '_>,
    lag: LogicalPort,
    member: LogicalPort,
) -> AttrResult<()> {
    ctx.guard.lags()?.get(lag)?;
    let p = ctx.ports_mut().get_mut(member)?;
    check_joinable(p)?;
    if let Some(current) = p.lag {
        return Err(AttrError::InvalidPortState {
            port: member,
            reason: format!("already a member of {current}"),
        });
    }
    p.lag = Some(lag);
    ctx.guard.lags_mut()?.get_mut(lag)?.members.insert(member);
    info!(ctx.log, "port joined LAG"; "port" => %member, "lag" => %lag);

    if ctx.settings.per_lag_management {
        copy_lag_settings(ctx, member, lag)?;
    }
    Ok(())
}

/// Remove `member` from `lag`.  The member leaves even if its original
/// settings can't all be restored.
pub(crate) fn remove_member(
    ctx: &mut ApplyCtx<'_, '_>,
    lag: LogicalPort,
    member: LogicalPort,
) -> AttrResult<()> {
    if !ctx.guard.lags_mut()?.get_mut(lag)?.members.remove(&member) {
        return Err(AttrError::InvalidArgument(format!(
            "{member} is not a member of {lag}"
        )));
    }
    ctx.ports_mut().get_mut(member)?.lag = None;
    info!(ctx.log, "port left LAG"; "port" => %member, "lag" => %lag);

    if ctx.settings.per_lag_management {
        restore_snapshot(ctx, member)
    } else {
        Ok(())
    }
}
