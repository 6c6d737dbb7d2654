// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/
//
// Copyright 2025 Oxide Computer Company

//! Per-attribute behavior.  Each descriptor owns one handler, chosen when the
//! table is built, which knows how to check a value, program it into the
//! switch, and read it back.

use aal::{
    BistHalf, Cursor, LaneId, LogicalPort, PortSmType, RegBlock, SerdesOps,
    SmState,
};
use common::ports::LanePolarity;

use super::{AttrId, AttrValue, AttributeDescriptor, PortMask};
use crate::context::{ApplyCtx, ReadCtx};
use crate::port::{PhysMap, Port, PortTable};
use crate::port_mode;
use crate::regs;
use crate::types::{AttrError, AttrResult};

/// The largest value an autonegotiation page may carry.
pub(crate) const MAX_48: u64 = (1 << 48) - 1;
const MAX_40: u64 = (1 << 40) - 1;
/// The most next pages a port will transmit or record from its partner.
pub(crate) const MAX_NEXT_PAGES: usize = 16;

const MAX_MIN_FRAME: u32 = 252;
const MAX_MAX_FRAME: u32 = 15864;
const OUI_MASK: u32 = 0x00ff_ffff;

/// The port, and optionally the lane, an attribute is being applied to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct Target {
    pub port: LogicalPort,
    pub lane: Option<LaneId>,
}

/// Derived register state that must be recomputed after a write lands.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Recompute {
    None,
    /// Min/max frame length and truncation length of the port
    FrameLengths,
    /// The store-and-forward matrix over every cardinal port pair
    SafMatrix,
}

pub(crate) trait AttrHandler: Send + Sync {
    /// Check a caller's value and convert it to its stored form.  Must have
    /// no side effects.
    fn validate(
        &self,
        desc: &AttributeDescriptor,
        _ports: &PortTable,
        _port: &Port,
        value: AttrValue,
    ) -> AttrResult<AttrValue> {
        check_type(desc, &value)?;
        Ok(value)
    }

    /// Whether a validated value must be pushed to hardware.
    fn needs_apply(
        &self,
        _port: &Port,
        current: &AttrValue,
        new: &AttrValue,
    ) -> bool {
        current != new
    }

    /// Program a validated value.  Called before the value is stored, so the
    /// port's storage still holds the previous value.
    fn apply(
        &self,
        _desc: &AttributeDescriptor,
        _ctx: &mut ApplyCtx<'_, '_>,
        _target: Target,
        _value: &AttrValue,
    ) -> AttrResult<()> {
        Ok(())
    }

    /// Produce the value returned to a caller.
    fn read(
        &self,
        _desc: &AttributeDescriptor,
        ctx: &ReadCtx<'_, '_>,
        _target: Target,
        cached: &AttrValue,
    ) -> AttrResult<AttrValue> {
        Ok(self.to_api(cached, ctx.cardinal_ports()))
    }

    /// Convert a stored value to the caller-facing representation.
    fn to_api(&self, cached: &AttrValue, _cardinal_ports: usize) -> AttrValue {
        cached.clone()
    }

    /// The value stored in a newly created port or lane.
    fn initial(
        &self,
        desc: &AttributeDescriptor,
        _cardinal_ports: usize,
    ) -> AttrValue {
        desc.default.clone()
    }

    fn recompute(&self) -> Recompute {
        Recompute::None
    }
}

fn check_type(desc: &AttributeDescriptor, value: &AttrValue) -> AttrResult<()> {
    if value.data_type() == desc.data_type {
        Ok(())
    } else {
        Err(AttrError::invalid_value(
            desc.id,
            format!("expected {}, got {}", desc.data_type, value.data_type()),
        ))
    }
}

fn cardinal(ctx: &ApplyCtx<'_, '_>, port: LogicalPort) -> AttrResult<u32> {
    ctx.ports().get(port)?.cardinal.ok_or_else(|| {
        AttrError::InvalidArgument(format!("{port} has no cardinal index"))
    })
}

fn target_lane(target: Target) -> AttrResult<LaneId> {
    target.lane.ok_or_else(|| {
        AttrError::InvalidArgument(format!(
            "lane attribute applied to {} without a lane",
            target.port
        ))
    })
}

#[derive(Clone, Copy, Debug)]
pub(crate) enum Check {
    Any,
    Range(u32, u32),
    /// Only bits within the mask may be set
    Mask(u32),
}

/// An attribute held in a single register field, indexed by the port's
/// cardinal number.
pub(crate) struct Reg {
    block: RegBlock,
    check: Check,
    recompute: Recompute,
}

impl Reg {
    pub fn any(block: RegBlock) -> Self {
        Reg {
            block,
            check: Check::Any,
            recompute: Recompute::None,
        }
    }

    pub fn range(block: RegBlock, min: u32, max: u32) -> Self {
        Reg {
            check: Check::Range(min, max),
            ..Reg::any(block)
        }
    }

    pub fn mask(block: RegBlock, mask: u32) -> Self {
        Reg {
            check: Check::Mask(mask),
            ..Reg::any(block)
        }
    }

    pub fn frame_lengths(self) -> Self {
        Reg {
            recompute: Recompute::FrameLengths,
            ..self
        }
    }

    pub fn saf_matrix(self) -> Self {
        Reg {
            recompute: Recompute::SafMatrix,
            ..self
        }
    }
}

impl AttrHandler for Reg {
    fn validate(
        &self,
        desc: &AttributeDescriptor,
        _ports: &PortTable,
        _port: &Port,
        value: AttrValue,
    ) -> AttrResult<AttrValue> {
        check_type(desc, &value)?;
        match (self.check, value.as_u32()) {
            (Check::Range(min, max), Some(v)) if v < min || v > max => Err(
                AttrError::invalid_value(desc.id, format!("{v} not in {min}..={max}")),
            ),
            (Check::Mask(mask), Some(v)) if v & !mask != 0 => {
                Err(AttrError::invalid_value(
                    desc.id,
                    format!("{v:#x} has bits outside {mask:#x}"),
                ))
            }
            _ => Ok(value),
        }
    }

    fn apply(
        &self,
        desc: &AttributeDescriptor,
        ctx: &mut ApplyCtx<'_, '_>,
        target: Target,
        value: &AttrValue,
    ) -> AttrResult<()> {
        let cardinal = cardinal(ctx, target.port)?;
        let raw = value.reg_value().ok_or_else(|| {
            AttrError::invalid_value(desc.id, "no register encoding")
        })?;
        ctx.write_reg(regs::attr_field(self.block, cardinal, desc.id), raw)
    }

    fn recompute(&self) -> Recompute {
        self.recompute
    }
}

/// The minimum and maximum frame sizes.  Both are rounded up to a whole
/// number of words and must stay ordered.
pub(crate) enum FrameSize {
    Min,
    Max,
}

impl AttrHandler for FrameSize {
    fn validate(
        &self,
        desc: &AttributeDescriptor,
        _ports: &PortTable,
        port: &Port,
        value: AttrValue,
    ) -> AttrResult<AttrValue> {
        check_type(desc, &value)?;
        let Some(size) = value.as_u32() else {
            return Err(AttrError::invalid_value(desc.id, "not a size"));
        };
        let rounded = size
            .checked_next_multiple_of(4)
            .ok_or_else(|| AttrError::invalid_value(desc.id, "too large"))?;

        match self {
            FrameSize::Min => {
                if rounded > MAX_MIN_FRAME {
                    return Err(AttrError::invalid_value(
                        desc.id,
                        format!("{rounded} exceeds {MAX_MIN_FRAME}"),
                    ));
                }
                let max = port.frame_size(AttrId::MaxFrameSize);
                if rounded > max {
                    return Err(AttrError::invalid_value(
                        desc.id,
                        format!("{rounded} exceeds the maximum frame size {max}"),
                    ));
                }
            }
            FrameSize::Max => {
                if rounded > MAX_MAX_FRAME {
                    return Err(AttrError::invalid_value(
                        desc.id,
                        format!("{rounded} exceeds {MAX_MAX_FRAME}"),
                    ));
                }
                let min = port.frame_size(AttrId::MinFrameSize);
                if rounded < min {
                    return Err(AttrError::invalid_value(
                        desc.id,
                        format!("{rounded} is below the minimum frame size {min}"),
                    ));
                }
            }
        }
        Ok(AttrValue::U32(rounded))
    }

    // The lengths are only meaningful together with the ISL tag, so they are
    // written by the frame length recomputation.
    fn recompute(&self) -> Recompute {
        Recompute::FrameLengths
    }
}

/// The wide forwarding mask.  Callers see one flag per cardinal port, the
/// switch holds a compact mask.
pub(crate) struct MaskWideHandler;

impl AttrHandler for MaskWideHandler {
    fn validate(
        &self,
        desc: &AttributeDescriptor,
        ports: &PortTable,
        _port: &Port,
        value: AttrValue,
    ) -> AttrResult<AttrValue> {
        check_type(desc, &value)?;
        let AttrValue::BitArray(bits) = value else {
            return Err(AttrError::invalid_value(desc.id, "not a bit array"));
        };
        let count = ports.cardinal_ports();
        if let Some(idx) =
            bits.iter().enumerate().skip(count).find(|(_, set)| **set)
        {
            return Err(AttrError::invalid_value(
                desc.id,
                format!("bit {} set but only {count} cardinal ports", idx.0),
            ));
        }
        PortMask::from_bits(&bits)
            .map(AttrValue::PortMask)
            .ok_or_else(|| AttrError::invalid_value(desc.id, "mask too wide"))
    }

    fn apply(
        &self,
        desc: &AttributeDescriptor,
        ctx: &mut ApplyCtx<'_, '_>,
        target: Target,
        value: &AttrValue,
    ) -> AttrResult<()> {
        let AttrValue::PortMask(mask) = value else {
            return Err(AttrError::invalid_value(desc.id, "not a port mask"));
        };
        let cardinal = cardinal(ctx, target.port)?;
        let guard = ctx.guard.regs();
        guard.write(
            ctx.asic,
            regs::field(RegBlock::Fwd, cardinal, regs::MASK_LO),
            mask.low(),
        )?;
        guard.write(
            ctx.asic,
            regs::field(RegBlock::Fwd, cardinal, regs::MASK_HI),
            mask.high(),
        )
    }

    fn to_api(&self, cached: &AttrValue, cardinal_ports: usize) -> AttrValue {
        match cached {
            AttrValue::PortMask(mask) => {
                AttrValue::BitArray(mask.to_bits(cardinal_ports))
            }
            other => other.clone(),
        }
    }

    fn initial(
        &self,
        _desc: &AttributeDescriptor,
        cardinal_ports: usize,
    ) -> AttrValue {
        AttrValue::PortMask(PortMask::all(cardinal_ports))
    }
}

pub(crate) struct EthernetModeHandler;

impl AttrHandler for EthernetModeHandler {
    fn validate(
        &self,
        desc: &AttributeDescriptor,
        _ports: &PortTable,
        port: &Port,
        value: AttrValue,
    ) -> AttrResult<AttrValue> {
        check_type(desc, &value)?;
        let Some(mode) = value.as_eth_mode() else {
            return Err(AttrError::invalid_value(desc.id, "not an ethernet mode"));
        };
        let invalid = || AttrError::InvalidEthMode {
            port: port.id,
            mode: mode.to_string(),
        };
        if mode.is_negotiated_only() {
            return Err(invalid());
        }
        match port.map {
            PhysMap::Epl { channel, .. } if mode.is_multi_lane() && channel != 0 => {
                Err(invalid())
            }
            PhysMap::Epl { .. } => Ok(value),
            _ => Err(invalid()),
        }
    }

    // A port whose last rebind failed has no state machine; setting the same
    // mode again is how it gets one back.
    fn needs_apply(
        &self,
        port: &Port,
        current: &AttrValue,
        new: &AttrValue,
    ) -> bool {
        current != new || port.fsm.sm_type() == PortSmType::Unspecified
    }

    fn apply(
        &self,
        desc: &AttributeDescriptor,
        ctx: &mut ApplyCtx<'_, '_>,
        target: Target,
        value: &AttrValue,
    ) -> AttrResult<()> {
        let mode = value.as_eth_mode().ok_or_else(|| {
            AttrError::invalid_value(desc.id, "not an ethernet mode")
        })?;
        port_mode::set_eth_mode(ctx, target.port, mode)
    }

    fn recompute(&self) -> Recompute {
        Recompute::SafMatrix
    }
}

pub(crate) struct AutonegModeHandler;

impl AttrHandler for AutonegModeHandler {
    fn validate(
        &self,
        desc: &AttributeDescriptor,
        _ports: &PortTable,
        port: &Port,
        value: AttrValue,
    ) -> AttrResult<AttrValue> {
        check_type(desc, &value)?;
        let Some(an) = value.as_an_mode() else {
            return Err(AttrError::invalid_value(desc.id, "not an AN mode"));
        };
        let eth = port.eth_mode();
        if eth.supports_autoneg(an) {
            Ok(value)
        } else {
            Err(AttrError::InvalidArgument(format!(
                "autonegotiation mode {an} cannot be used with {eth}"
            )))
        }
    }

    fn apply(
        &self,
        desc: &AttributeDescriptor,
        ctx: &mut ApplyCtx<'_, '_>,
        target: Target,
        value: &AttrValue,
    ) -> AttrResult<()> {
        let an = value
            .as_an_mode()
            .ok_or_else(|| AttrError::invalid_value(desc.id, "not an AN mode"))?;
        port_mode::set_an_mode(ctx, target.port, an)
    }
}

/// Pages transmitted during autonegotiation.
pub(crate) enum AnPage {
    Base,
    NextPages,
    /// The OUI carried in the 25G consortium next pages
    Oui,
}

impl AttrHandler for AnPage {
    fn validate(
        &self,
        desc: &AttributeDescriptor,
        _ports: &PortTable,
        _port: &Port,
        value: AttrValue,
    ) -> AttrResult<AttrValue> {
        check_type(desc, &value)?;
        match (self, value) {
            (AnPage::Base, AttrValue::U64(page)) if page > MAX_48 => Err(
                AttrError::invalid_value(desc.id, format!("{page:#x} exceeds 48 bits")),
            ),
            (AnPage::NextPages, AttrValue::U64List(pages)) => {
                if pages.len() > MAX_NEXT_PAGES {
                    return Err(AttrError::invalid_value(
                        desc.id,
                        format!("{} pages, at most {MAX_NEXT_PAGES}", pages.len()),
                    ));
                }
                if let Some(page) = pages.iter().find(|p| **p > MAX_48) {
                    return Err(AttrError::invalid_value(
                        desc.id,
                        format!("{page:#x} exceeds 48 bits"),
                    ));
                }
                Ok(AttrValue::U64List(pages))
            }
            (AnPage::Oui, AttrValue::U32(oui)) => Ok(AttrValue::U32(oui & OUI_MASK)),
            (_, value) => Ok(value),
        }
    }

    fn apply(
        &self,
        desc: &AttributeDescriptor,
        ctx: &mut ApplyCtx<'_, '_>,
        target: Target,
        value: &AttrValue,
    ) -> AttrResult<()> {
        let cardinal = cardinal(ctx, target.port)?;
        match (self, value) {
            (AnPage::NextPages, AttrValue::U64List(pages)) => {
                let guard = ctx.guard.regs();
                guard.write(
                    ctx.asic,
                    regs::field(RegBlock::An, cardinal, regs::AN_NEXT_PAGE_COUNT),
                    pages.len() as u64,
                )?;
                for (idx, page) in pages.iter().enumerate() {
                    guard.write(
                        ctx.asic,
                        regs::field(
                            RegBlock::An,
                            cardinal,
                            regs::AN_NEXT_PAGE_BASE + idx as u16,
                        ),
                        *page,
                    )?;
                }
            }
            (_, value) => {
                let raw = value.reg_value().ok_or_else(|| {
                    AttrError::invalid_value(desc.id, "no register encoding")
                })?;
                ctx.write_reg(regs::attr_field(RegBlock::An, cardinal, desc.id), raw)?;
            }
        }
        port_mode::an_pages_changed(ctx, target.port, desc.id, value)
    }
}

/// Read-only status, fetched from the state machines or the hardware on
/// every read.
pub(crate) enum Live {
    Speed,
    LinkState,
    PartnerBasePage,
    PartnerNextPages,
    EeeState,
    PcieLinkWidth,
    PcieLinkSpeed,
    EyeScore,
}

impl AttrHandler for Live {
    fn read(
        &self,
        _desc: &AttributeDescriptor,
        ctx: &ReadCtx<'_, '_>,
        target: Target,
        _cached: &AttrValue,
    ) -> AttrResult<AttrValue> {
        let port = ctx.ports().get(target.port)?;
        let cardinal = || {
            port.cardinal.ok_or_else(|| {
                AttrError::InvalidArgument(format!(
                    "{} has no cardinal index",
                    target.port
                ))
            })
        };

        Ok(match self {
            Live::Speed => AttrValue::U32(port.speed()),
            Live::LinkState => {
                AttrValue::Bool(port.fsm.state() == Some(SmState::LinkUp))
            }
            Live::PartnerBasePage => AttrValue::U64(ctx.read_reg(regs::field(
                RegBlock::An,
                cardinal()?,
                regs::AN_PARTNER_BASE_PAGE,
            ))?),
            Live::PartnerNextPages => {
                let cardinal = cardinal()?;
                let count = ctx.read_reg(regs::field(
                    RegBlock::An,
                    cardinal,
                    regs::AN_PARTNER_NEXT_PAGE_COUNT,
                ))?;
                let count = (count as usize).min(MAX_NEXT_PAGES);
                let mut pages = Vec::with_capacity(count);
                for idx in 0..count {
                    pages.push(ctx.read_reg(regs::field(
                        RegBlock::An,
                        cardinal,
                        regs::AN_PARTNER_NEXT_PAGE_BASE + idx as u16,
                    ))?);
                }
                AttrValue::U64List(pages)
            }
            Live::EeeState => AttrValue::U32(ctx.read_reg(regs::field(
                RegBlock::Eee,
                cardinal()?,
                regs::EEE_STATE,
            ))? as u32),
            Live::PcieLinkWidth => AttrValue::U32(ctx.read_reg(regs::field(
                RegBlock::Pcie,
                cardinal()?,
                regs::PCIE_LINK_WIDTH,
            ))? as u32),
            Live::PcieLinkSpeed => AttrValue::U32(ctx.read_reg(regs::field(
                RegBlock::Pcie,
                cardinal()?,
                regs::PCIE_LINK_SPEED,
            ))? as u32),
            Live::EyeScore => {
                let lane = target_lane(target)?;
                AttrValue::U32(ctx.asic.serdes_eye_score(lane)?)
            }
        })
    }
}

/// SerDes lane controls.
pub(crate) enum LaneCtl {
    Polarity,
    Termination,
    Dfe,
    /// A transmit equalizer tap and its legal range
    Cursor(Cursor, i32, i32),
    KrInitCfg,
    Bist(BistHalf),
    /// Largest legal threshold
    SignalThreshold(u32),
    Loopback,
}

impl AttrHandler for LaneCtl {
    fn validate(
        &self,
        desc: &AttributeDescriptor,
        _ports: &PortTable,
        _port: &Port,
        value: AttrValue,
    ) -> AttrResult<AttrValue> {
        check_type(desc, &value)?;
        match (self, &value) {
            (LaneCtl::Cursor(_, min, max), AttrValue::I32(v))
                if v < min || v > max =>
            {
                Err(AttrError::invalid_value(
                    desc.id,
                    format!("{v} not in {min}..={max}"),
                ))
            }
            (LaneCtl::Bist(_), AttrValue::U64(v)) if *v > MAX_40 => Err(
                AttrError::invalid_value(desc.id, format!("{v:#x} exceeds 40 bits")),
            ),
            (LaneCtl::SignalThreshold(max), AttrValue::U32(v)) if v > max => {
                Err(AttrError::invalid_value(
                    desc.id,
                    format!("{v} exceeds {max}"),
                ))
            }
            _ => Ok(value),
        }
    }

    fn apply(
        &self,
        desc: &AttributeDescriptor,
        ctx: &mut ApplyCtx<'_, '_>,
        target: Target,
        value: &AttrValue,
    ) -> AttrResult<()> {
        let lane = target_lane(target)?;
        let asic = ctx.asic;
        match (self, value) {
            (LaneCtl::Polarity, AttrValue::LanePolarity(p)) => {
                let (rx, tx) = p.rx_tx();
                asic.serdes_polarity_set(lane, rx, tx)?;
            }
            (LaneCtl::Termination, AttrValue::RxTermination(t)) => {
                asic.serdes_termination_set(lane, *t)?;
            }
            (LaneCtl::Dfe, AttrValue::DfeMode(mode)) => {
                asic.serdes_dfe_mode_set(lane, *mode)?;
                port_mode::dfe_mode_changed(ctx, lane, *mode)?;
            }
            (LaneCtl::Cursor(cursor, ..), AttrValue::I32(v)) => {
                asic.serdes_cursor_set(lane, *cursor, *v)?;
            }
            (LaneCtl::KrInitCfg, AttrValue::Bool(enable)) => {
                asic.serdes_kr_init_cfg_set(lane, *enable)?;
            }
            (LaneCtl::Bist(half), AttrValue::U64(pattern)) => {
                asic.serdes_bist_pattern_set(lane, *half, *pattern)?;
            }
            (LaneCtl::SignalThreshold(_), AttrValue::U32(v)) => {
                asic.serdes_signal_threshold_set(lane, *v)?;
            }
            (LaneCtl::Loopback, AttrValue::Bool(enable)) => {
                asic.serdes_loopback_set(lane, *enable)?;
            }
            (_, value) => {
                return Err(AttrError::invalid_value(
                    desc.id,
                    format!("unexpected {}", value.data_type()),
                ))
            }
        }
        Ok(())
    }

    // Settings the SerDes can report are read back from the lane.  The rest
    // are write-only and come from storage.
    fn read(
        &self,
        _desc: &AttributeDescriptor,
        ctx: &ReadCtx<'_, '_>,
        target: Target,
        cached: &AttrValue,
    ) -> AttrResult<AttrValue> {
        let asic = ctx.asic;
        Ok(match self {
            LaneCtl::Polarity => {
                let (rx, tx) = asic.serdes_polarity_get(target_lane(target)?)?;
                AttrValue::LanePolarity(LanePolarity::from_rx_tx(rx, tx))
            }
            LaneCtl::Termination => AttrValue::RxTermination(
                asic.serdes_termination_get(target_lane(target)?)?,
            ),
            LaneCtl::Dfe => {
                AttrValue::DfeMode(asic.serdes_dfe_mode_get(target_lane(target)?)?)
            }
            LaneCtl::Cursor(cursor, ..) => {
                AttrValue::I32(asic.serdes_cursor_get(target_lane(target)?, *cursor)?)
            }
            _ => cached.clone(),
        })
    }
}
