// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/
//
// Copyright 2025 Oxide Computer Company

//! Register state computed from several attributes at once.

use aal::{LogicalPort, RegBlock};
use slog::debug;

use crate::attr::AttrId;
use crate::context::ApplyCtx;
use crate::port::Port;
use crate::regs;
use crate::types::AttrResult;

const TRUNC_GRANULE: u32 = 64;

/// Frame length limits for a port as programmed into the MAC.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct FrameLengths {
    pub min: u32,
    pub max: u32,
    pub trunc: u32,
}

impl FrameLengths {
    /// The ISL tag travels inside the frame, so it is added to both limits.
    /// Frames are truncated at the next whole granule above the maximum.
    pub fn for_port(port: &Port) -> Self {
        let tag = port.isl_tag().tag_bytes();
        let min = port.frame_size(AttrId::MinFrameSize) + tag;
        let max = port.frame_size(AttrId::MaxFrameSize) + tag;
        FrameLengths {
            min,
            max,
            trunc: max.next_multiple_of(TRUNC_GRANULE),
        }
    }
}

/// Reprogram a port's frame length registers.  All three are written under
/// one hold of the register lock.
pub(crate) fn frame_lengths(
    ctx: &mut ApplyCtx<'_, '_>,
    port: LogicalPort,
) -> AttrResult<()> {
    let p = ctx.ports().get(port)?;
    let Some(cardinal) = p.cardinal else {
        return Ok(());
    };
    let lengths = FrameLengths::for_port(p);

    let guard = ctx.guard.regs();
    for (field, value) in [
        (regs::FRAME_MIN_LEN, lengths.min),
        (regs::FRAME_MAX_LEN, lengths.max),
        (regs::TRUNC_LEN, lengths.trunc),
    ] {
        guard.write(
            ctx.asic,
            regs::field(RegBlock::Mac, cardinal, field),
            value as u64,
        )?;
    }
    debug!(ctx.log, "frame lengths updated";
        "port" => %port,
        "min" => lengths.min,
        "max" => lengths.max,
        "trunc" => lengths.trunc);
    Ok(())
}

struct SafEntry {
    cardinal: u32,
    rx_cut_through: bool,
    tx_cut_through: bool,
    speed: u32,
}

/// Whether traffic from `rx` to `tx` must be stored before it is forwarded.
/// Cutting through is only safe when both ends allow it and the egress port
/// is no faster than the ingress port.
fn store_and_forward(rx: &SafEntry, tx: &SafEntry) -> bool {
    !(rx.rx_cut_through && tx.tx_cut_through && rx.speed >= tx.speed)
}

/// Recompute the store-and-forward matrix over every pair of cardinal
/// ports.
pub(crate) fn saf_matrix(ctx: &mut ApplyCtx<'_, '_>) -> AttrResult<()> {
    let entries: Vec<SafEntry> = ctx
        .ports()
        .iter()
        .filter_map(|p| {
            p.cardinal.map(|cardinal| SafEntry {
                cardinal,
                rx_cut_through: p.flag(AttrId::RxCutThrough),
                tx_cut_through: p.flag(AttrId::TxCutThrough),
                speed: p.speed(),
            })
        })
        .collect();

    let guard = ctx.guard.regs();
    let mut cut_through = 0;
    for rx in &entries {
        for tx in &entries {
            let saf = store_and_forward(rx, tx);
            if !saf {
                cut_through += 1;
            }
            guard.write(
                ctx.asic,
                regs::saf(rx.cardinal, tx.cardinal),
                saf as u64,
            )?;
        }
    }
    debug!(ctx.log, "SAF matrix updated";
        "ports" => entries.len(),
        "cut_through_pairs" => cut_through);
    Ok(())
}
