// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/
//
// Copyright 2025 Oxide Computer Company

//! Ethernet mode and autonegotiation changes.  A mode change may require a
//! different port state machine variant, may move SerDes lanes between the
//! ports of an EPL, and always ends with the new configuration delivered to
//! the port's state machine.
//!
//! Failures abort the sequence where they occur.  Hardware state already
//! changed by earlier steps is not rolled back.

use std::collections::BTreeSet;

use aal::{
    AutonegPolicy, DfeSmType, LaneId, LaneSmType, LogicalPort, PortSmType,
    PortUpdate, SerdesOps, SmEventId, SmEventPayload, SmSubject,
};
use common::ports::{AnMode, DfeMode, EthMode, PhysSubType, LANES_PER_EPL};
use slog::{debug, error, info};

use crate::attr::handlers::MAX_NEXT_PAGES;
use crate::attr::{AttrId, AttrValue};
use crate::context::ApplyCtx;
use crate::port::{Port, PortTable};
use crate::types::{AttrError, AttrResult};

/// The AN mode a port ends up with after its Ethernet mode changes.
pub(crate) fn implied_an_mode(eth: EthMode, current: AnMode) -> AnMode {
    match (eth, current) {
        (EthMode::An73, _) => AnMode::Clause73,
        (_, AnMode::Clause73) => AnMode::None,
        (eth, an) if !eth.supports_autoneg(an) => AnMode::None,
        (_, an) => an,
    }
}

/// The port state machine variant that should drive a port in the given
/// modes.
pub(crate) fn target_port_sm(
    policy: &dyn AutonegPolicy,
    port: &Port,
    eth: EthMode,
    an: AnMode,
) -> PortSmType {
    if port.stub_fsm {
        return PortSmType::Stub;
    }
    match port.sub_type {
        PhysSubType::Epl => match policy.is_autoneg_ready(eth, an) {
            (true, sm_type) => sm_type,
            (false, _) => PortSmType::Basic,
        },
        PhysSubType::Pcie => PortSmType::Pcie,
        _ => PortSmType::Stub,
    }
}

/// The lanes a port on the given EPL channel uses in a mode.
fn lane_footprint(epl: u8, channel: u8, eth: EthMode) -> Vec<LaneId> {
    if eth.is_multi_lane() {
        (0..LANES_PER_EPL).map(|c| LaneId::new(epl, c)).collect()
    } else {
        vec![LaneId::new(epl, channel)]
    }
}

/// Check that a port can take on the lane footprint of a mode.  A multi-lane
/// mode borrows the lanes of every other port on the EPL, so those ports
/// must be disabled.  A single-lane mode needs the port's own lane back.
fn check_footprint(
    ports: &PortTable,
    port: &Port,
    eth: EthMode,
) -> AttrResult<()> {
    let Some((epl, channel)) = port.epl() else {
        return Err(AttrError::InvalidEthMode {
            port: port.id,
            mode: eth.to_string(),
        });
    };
    let state_err = |reason: String| AttrError::InvalidPortState {
        port: port.id,
        reason,
    };

    if eth.is_multi_lane() {
        if let Some(sibling) = ports
            .epl_siblings(port)
            .into_iter()
            .find(|p| p.eth_mode().is_enabled())
        {
            return Err(state_err(format!(
                "{} on the same EPL is enabled",
                sibling.id
            )));
        }
        for lane in lane_footprint(epl, channel, eth) {
            let l = ports
                .lane(lane)
                .map_err(|_| state_err(format!("lane {lane} is not present")))?;
            // A PCIe port with its SerDes on this EPL keeps its lane
            for holder in [l.home, l.owner] {
                let sub_type = ports.get(holder)?.sub_type;
                if sub_type != PhysSubType::Epl {
                    return Err(state_err(format!(
                        "lane {lane} belongs to {sub_type} port {holder}"
                    )));
                }
            }
        }
    } else {
        let lane = LaneId::new(epl, channel);
        let owner = ports
            .lane(lane)
            .map_err(|_| state_err(format!("lane {lane} is not present")))?
            .owner;
        if owner != port.id {
            return Err(state_err(format!("lane {lane} is in use by {owner}")));
        }
    }
    Ok(())
}

/// The lane and DFE state machine variants for a lane whose home is `home`
/// while `owner` holds it.  PCIe lanes never run DFE tuning, and neither do
/// lanes owned by a port on the stub machine.
pub(crate) fn lane_sm_types(
    home: &Port,
    owner: &Port,
) -> (LaneSmType, DfeSmType) {
    match home.sub_type {
        PhysSubType::Pcie => (LaneSmType::Pcie, DfeSmType::Unspecified),
        _ if owner.stub_fsm => (LaneSmType::Stub, DfeSmType::Unspecified),
        _ => (LaneSmType::Basic, DfeSmType::Basic),
    }
}

/// Replace the port's state machine if it isn't already of the target
/// variant.  The port's admin mode is redelivered once the engine's locks
/// are released.
pub(crate) fn rebind_port(
    ctx: &mut ApplyCtx<'_, '_>,
    port: LogicalPort,
    target: PortSmType,
) -> AttrResult<()> {
    let history = ctx.settings.fsm_history;
    let p = ctx.guard.ports_mut().get_mut(port)?;
    let from = p.fsm.sm_type();
    if from == target {
        return Ok(());
    }

    let subject = p.subject();
    if let Err(e) = p.fsm.rebind(ctx.asic, subject, target, history) {
        error!(ctx.log, "failed to rebind port fsm";
            "port" => %port,
            "from" => %from,
            "to" => %target,
            "error" => %e);
        return Err(e.into());
    }
    info!(ctx.log, "rebound port fsm";
        "port" => %port,
        "from" => %from,
        "to" => %target);
    ctx.effects.restore_admin.insert(port);
    ctx.effects.updates.push(PortUpdate::FsmRebound {
        port,
        from,
        to: target,
    });
    Ok(())
}

/// Hand a lane to a new owner, restarting its state machines so nothing
/// configured for the old owner survives.
fn move_lane(
    ctx: &mut ApplyCtx<'_, '_>,
    lane: LaneId,
    to: LogicalPort,
) -> AttrResult<()> {
    let history = ctx.settings.fsm_history;
    let ports = ctx.guard.ports_mut();
    let (from, home) = {
        let l = ports.lane(lane)?;
        (l.owner, l.home)
    };
    let (lane_type, dfe_type) =
        lane_sm_types(ports.get(home)?, ports.get(to)?);

    if let Ok(old) = ports.get_mut(from) {
        old.lanes.retain(|l| *l != lane);
    }
    let new = ports.get_mut(to)?;
    new.lanes.push(lane);
    new.lanes.sort();

    let l = ports.lane_mut(lane)?;
    l.owner = to;
    l.fsm
        .rebind(ctx.asic, SmSubject::Lane(lane), lane_type, history)?;
    l.dfe.rebind(ctx.asic, SmSubject::Dfe(lane), dfe_type, history)?;

    debug!(ctx.log, "lane moved";
        "lane" => %lane,
        "from" => %from,
        "to" => %to);
    ctx.effects
        .updates
        .push(PortUpdate::LaneMoved { lane, from, to });
    Ok(())
}

/// Bring the set of lanes a port owns in line with its new mode.  Lanes it
/// no longer needs go back to the ports they belong to.
fn update_lanes(
    ctx: &mut ApplyCtx<'_, '_>,
    port: LogicalPort,
    eth: EthMode,
) -> AttrResult<()> {
    let (want, have) = {
        let p = ctx.ports().get(port)?;
        let Some((epl, channel)) = p.epl() else {
            return Ok(());
        };
        let want: BTreeSet<LaneId> =
            lane_footprint(epl, channel, eth).into_iter().collect();
        let have: BTreeSet<LaneId> = p.lanes.iter().copied().collect();
        (want, have)
    };

    for lane in want.difference(&have) {
        move_lane(ctx, *lane, port)?;
    }
    for lane in have.difference(&want) {
        let home = ctx.ports().lane(*lane)?.home;
        move_lane(ctx, *lane, home)?;
    }
    Ok(())
}

/// Wait for the PLLs of a port's lanes to lock.  The wait is a bounded poll;
/// a lane that never locks is logged and left for the state machine to deal
/// with.
fn wait_for_pll(ctx: &ApplyCtx<'_, '_>, lanes: &[LaneId]) -> AttrResult<()> {
    let limit = ctx.settings.pll_poll_limit;
    for lane in lanes {
        let mut locked = false;
        for _ in 0..limit {
            if ctx.asic.serdes_pll_ready(*lane)? {
                locked = true;
                break;
            }
        }
        if !locked {
            error!(ctx.log, "PLL failed to lock";
                "lane" => %lane,
                "polls" => limit);
        }
    }
    Ok(())
}

fn dfe_event(eth: EthMode, dfe: DfeMode) -> SmEventId {
    if eth.is_enabled() && dfe.is_adaptive() {
        SmEventId::DfeStart
    } else {
        SmEventId::DfeStop
    }
}

/// Deliver a port's configuration to its state machine and its lanes'.
fn configure(
    ctx: &mut ApplyCtx<'_, '_>,
    port: LogicalPort,
    eth: EthMode,
    an: AnMode,
) -> AttrResult<()> {
    let history = ctx.settings.fsm_history;
    let ports = ctx.guard.ports_mut();
    let p = ports.get_mut(port)?;
    if matches!(
        p.fsm.sm_type(),
        PortSmType::Basic | PortSmType::Autoneg | PortSmType::Stub
    ) {
        p.fsm.notify(
            SmEventId::Config,
            SmEventPayload::Config {
                eth_mode: eth,
                speed: eth.speed(),
                an_mode: an,
            },
            history,
        )?;
    }

    let lanes = p.lanes.clone();
    for lane in &lanes {
        let l = ports.lane_mut(*lane)?;
        l.fsm
            .notify(SmEventId::LaneConfig, SmEventPayload::None, history)?;
        let dfe = dfe_event(eth, l.dfe_mode());
        l.dfe.notify(dfe, SmEventPayload::None, history)?;
    }

    if eth.is_enabled() {
        wait_for_pll(ctx, &lanes)?;
    }
    Ok(())
}

/// Change a port's Ethernet mode.
pub(crate) fn set_eth_mode(
    ctx: &mut ApplyCtx<'_, '_>,
    port: LogicalPort,
    eth: EthMode,
) -> AttrResult<()> {
    let (an, target) = {
        let ports = ctx.ports();
        let p = ports.get(port)?;
        check_footprint(ports, p, eth)?;
        let an = implied_an_mode(eth, p.an_mode());
        (an, target_port_sm(ctx.asic, p, eth, an))
    };

    {
        let p = ctx.guard.ports_mut().get_mut(port)?;
        if p.an_mode() != an {
            info!(ctx.log, "AN mode follows ethernet mode";
                "port" => %port,
                "eth_mode" => %eth,
                "from" => %p.an_mode(),
                "to" => %an);
            p.set_cached(AttrId::Autoneg, an.into());
        }
    }

    rebind_port(ctx, port, target)?;
    update_lanes(ctx, port, eth)?;
    configure(ctx, port, eth, an)
}

/// Change a port's autonegotiation mode.
pub(crate) fn set_an_mode(
    ctx: &mut ApplyCtx<'_, '_>,
    port: LogicalPort,
    an: AnMode,
) -> AttrResult<()> {
    let (eth, target) = {
        let p = ctx.ports().get(port)?;
        let eth = p.eth_mode();
        (eth, target_port_sm(ctx.asic, p, eth, an))
    };
    rebind_port(ctx, port, target)?;
    configure(ctx, port, eth, an)
}

/// Tell an autonegotiating port about new pages.  `changed` holds the value
/// about to be stored for `id`; the other pages come from storage.
pub(crate) fn an_pages_changed(
    ctx: &mut ApplyCtx<'_, '_>,
    port: LogicalPort,
    id: AttrId,
    changed: &AttrValue,
) -> AttrResult<()> {
    let history = ctx.settings.fsm_history;
    let p = ctx.guard.ports_mut().get_mut(port)?;
    if p.fsm.sm_type() != PortSmType::Autoneg {
        return Ok(());
    }

    let page = |which: AttrId| -> AttrResult<AttrValue> {
        if which == id {
            Ok(changed.clone())
        } else {
            p.cached(which).cloned()
        }
    };
    let base_page = page(AttrId::AutonegBasePage)?.as_u64().unwrap_or(0);
    let next_pages = match page(AttrId::AutonegNextPages)? {
        AttrValue::U64List(pages) => pages,
        _ => Vec::new(),
    };
    let oui = page(AttrId::Autoneg25gNextPageOui)?.as_u32().unwrap_or(0);
    if next_pages.len() > MAX_NEXT_PAGES {
        return Err(AttrError::invalid_value(
            AttrId::AutonegNextPages,
            format!(
                "{} next pages exceeds the limit of {MAX_NEXT_PAGES}",
                next_pages.len()
            ),
        ));
    }

    p.fsm.notify(
        SmEventId::AnConfig,
        SmEventPayload::AnConfig {
            base_page,
            next_pages,
            oui,
        },
        history,
    )?;
    Ok(())
}

/// Start or stop DFE tuning on a lane after its DFE mode changes.
pub(crate) fn dfe_mode_changed(
    ctx: &mut ApplyCtx<'_, '_>,
    lane: LaneId,
    mode: DfeMode,
) -> AttrResult<()> {
    let history = ctx.settings.fsm_history;
    let ports = ctx.guard.ports_mut();
    let owner = ports.lane(lane)?.owner;
    let eth = ports.get(owner)?.eth_mode();
    ports.lane_mut(lane)?.dfe.notify(
        dfe_event(eth, mode),
        SmEventPayload::None,
        history,
    )?;
    Ok(())
}
