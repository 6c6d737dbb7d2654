// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/
//
// Copyright 2025 Oxide Computer Company

use aal::{Cursor, LaneId, LogicalPort, PortUpdate, RegBlock, SerdesOps};
use common::ports::{DfeMode, EthMode, IslTagFormat, LanePolarity};
use portattr::regs;
use portattr::{AttrError, AttrId, AttrValue, LaneSel};
use pretty_assertions::assert_eq;

use super::common::*;

#[test]
fn test_unknown_attribute() {
    let (engine, _rx) = engine("unknown_attribute");
    assert_eq!(
        engine.get_attribute(EPL0_0, LaneSel::All, 9999u32),
        Err(AttrError::InvalidAttribute(9999))
    );
    assert_eq!(
        engine.set_attribute(EPL0_0, LaneSel::All, 9999u32, 1u32),
        Err(AttrError::InvalidAttribute(9999))
    );
}

#[test]
fn test_excluded_attribute() {
    let (engine, _rx) = engine("excluded_attribute");

    assert_eq!(
        engine.set_attribute(PCIE0, LaneSel::All, AttrId::MinFrameSize, 128u32),
        Err(AttrError::UnsupportedAttribute {
            port: PCIE0,
            attr: "MinFrameSize".to_string(),
        })
    );
    // Readable, just not writable
    assert_eq!(
        engine.get_attribute(PCIE0, LaneSel::All, AttrId::MinFrameSize),
        Ok(AttrValue::U32(64))
    );
    assert!(matches!(
        engine.get_attribute(PCIE0, LaneSel::All, AttrId::EthernetMode),
        Err(AttrError::UnsupportedAttribute { .. })
    ));
    assert!(matches!(
        engine.get_attribute(EPL0_0, LaneSel::All, AttrId::PcieLinkWidth),
        Err(AttrError::UnsupportedAttribute { .. })
    ));
    assert!(matches!(
        engine.set_attribute(TE, LaneSel::All, AttrId::Ifg, 8u32),
        Err(AttrError::UnsupportedAttribute { .. })
    ));
}

#[test]
fn test_read_only_attribute() {
    let (engine, _rx) = engine("read_only_attribute");
    assert_eq!(
        engine.set_attribute(EPL0_0, LaneSel::All, AttrId::Speed, 10_000u32),
        Err(AttrError::ReadOnlyAttribute("Speed".to_string()))
    );
}

#[test]
fn test_wrong_value_type() {
    let (engine, _rx) = engine("wrong_value_type");
    assert!(matches!(
        engine.set_attribute(EPL0_0, LaneSel::All, AttrId::DefVlan, true),
        Err(AttrError::InvalidValue { .. })
    ));
    assert!(matches!(
        engine.set_attribute(EPL0_0, LaneSel::All, AttrId::DefVlan, 4096u32),
        Err(AttrError::InvalidValue { .. })
    ));
}

#[test]
fn test_frame_size_rounding() {
    let (engine, _rx) = engine("frame_size_rounding");
    let max_len = regs::field(RegBlock::Mac, EPL0_0.0, regs::FRAME_MAX_LEN);
    let trunc_len = regs::field(RegBlock::Mac, EPL0_0.0, regs::TRUNC_LEN);

    engine
        .set_attribute(EPL0_0, LaneSel::All, AttrId::MaxFrameSize, 65u32)
        .unwrap();
    assert_eq!(
        engine.get_attribute(EPL0_0, LaneSel::All, AttrId::MaxFrameSize),
        Ok(AttrValue::U32(68))
    );
    assert_eq!(engine.asic().peek(max_len), 68);
    assert_eq!(engine.asic().peek(trunc_len), 128);

    assert!(matches!(
        engine.set_attribute(EPL0_0, LaneSel::All, AttrId::MaxFrameSize, 20000u32),
        Err(AttrError::InvalidValue { .. })
    ));
    assert_eq!(
        engine.get_attribute(EPL0_0, LaneSel::All, AttrId::MaxFrameSize),
        Ok(AttrValue::U32(68))
    );

    // Below the current minimum
    assert!(matches!(
        engine.set_attribute(EPL0_0, LaneSel::All, AttrId::MaxFrameSize, 60u32),
        Err(AttrError::InvalidValue { .. })
    ));
}

#[test]
fn test_isl_tag_frame_lengths() {
    let (engine, _rx) = engine("isl_tag_frame_lengths");
    let reg = |field| regs::field(RegBlock::Mac, EPL0_0.0, field);

    engine
        .set_attribute(
            EPL0_0,
            LaneSel::All,
            AttrId::IslTagFormat,
            IslTagFormat::F56,
        )
        .unwrap();
    assert_eq!(engine.asic().peek(reg(regs::FRAME_MIN_LEN)), 72);
    assert_eq!(engine.asic().peek(reg(regs::FRAME_MAX_LEN)), 1544);
    assert_eq!(engine.asic().peek(reg(regs::TRUNC_LEN)), 1600);
}

#[test]
fn test_idempotent_set() {
    let (engine, mut rx) = engine("idempotent_set");

    engine
        .set_attribute(EPL0_0, LaneSel::All, AttrId::DefVlan, 10u32)
        .unwrap();
    let writes = engine.asic().register_writes();
    assert_eq!(
        drain(&mut rx),
        vec![PortUpdate::Attribute {
            port: EPL0_0,
            attr: AttrId::DefVlan.into(),
        }]
    );

    engine
        .set_attribute(EPL0_0, LaneSel::All, AttrId::DefVlan, 10u32)
        .unwrap();
    assert_eq!(engine.asic().register_writes(), writes);
    assert!(drain(&mut rx).is_empty());
    assert_eq!(
        engine.get_attribute(EPL0_0, LaneSel::All, AttrId::DefVlan),
        Ok(AttrValue::U32(10))
    );
}

#[test]
fn test_register_programming() {
    let (engine, _rx) = engine("register_programming");
    engine
        .set_attribute(EPL1_0, LaneSel::NotApplicable, AttrId::Ifg, 20u32)
        .unwrap();
    let addr = regs::attr_field(RegBlock::Mac, EPL1_0.0, AttrId::Ifg);
    assert_eq!(engine.asic().peek(addr), 20);
}

#[test]
fn test_oui_truncated() {
    let (engine, _rx) = engine("oui_truncated");
    engine
        .set_attribute(
            EPL0_0,
            LaneSel::All,
            AttrId::Autoneg25gNextPageOui,
            0x1234_5678u32,
        )
        .unwrap();
    assert_eq!(
        engine.get_attribute(EPL0_0, LaneSel::All, AttrId::Autoneg25gNextPageOui),
        Ok(AttrValue::U32(0x34_5678))
    );
}

#[test]
fn test_mask_wide() {
    let (engine, _rx) = engine("mask_wide");

    let AttrValue::BitArray(bits) = engine
        .get_attribute(EPL0_0, LaneSel::All, AttrId::MaskWide)
        .unwrap()
    else {
        panic!("mask is not a bit array");
    };
    assert_eq!(bits.len(), 48);
    assert!(bits.iter().all(|b| *b));

    let mut bits = vec![false; 48];
    bits[3] = true;
    bits[40] = true;
    engine
        .set_attribute(EPL0_0, LaneSel::All, AttrId::MaskWide, bits.clone())
        .unwrap();
    assert_eq!(
        engine.get_attribute(EPL0_0, LaneSel::All, AttrId::MaskWide),
        Ok(AttrValue::BitArray(bits))
    );

    let mut too_wide = vec![false; 64];
    too_wide[50] = true;
    assert!(matches!(
        engine.set_attribute(EPL0_0, LaneSel::All, AttrId::MaskWide, too_wide),
        Err(AttrError::InvalidValue { .. })
    ));
}

#[test]
fn test_lane_selection() {
    let (engine, _rx) = engine("lane_selection");

    engine
        .set_attribute(
            EPL0_0,
            LaneSel::All,
            AttrId::LanePolarity,
            LanePolarity::InvertRx,
        )
        .unwrap();
    assert_eq!(
        engine.get_attribute(EPL0_0, LaneSel::Index(0), AttrId::LanePolarity),
        Ok(AttrValue::LanePolarity(LanePolarity::InvertRx))
    );
    assert_eq!(
        engine.set_attribute(
            EPL0_0,
            LaneSel::Index(1),
            AttrId::LanePolarity,
            LanePolarity::Normal,
        ),
        Err(AttrError::InvalidPortLane {
            port: EPL0_0,
            lane: LaneSel::Index(1),
        })
    );
    assert!(matches!(
        engine.get_attribute(
            EPL0_0,
            LaneSel::NotApplicable,
            AttrId::LanePolarity
        ),
        Err(AttrError::InvalidPortLane { .. })
    ));

    // The CPU port has no lanes of its own
    assert!(matches!(
        engine.set_attribute(CPU, LaneSel::All, AttrId::SignalThreshold, 4u32),
        Err(AttrError::InvalidPortLane { .. })
    ));
}

#[test]
fn test_lane_settings_read_back() {
    let (engine, _rx) = engine("lane_settings_read_back");
    let lane = LaneId::new(1, 0);
    engine
        .set_attribute(EPL1_0, LaneSel::Index(0), AttrId::DfeMode, DfeMode::Static)
        .unwrap();
    engine
        .set_attribute(EPL1_0, LaneSel::Index(0), AttrId::TxLanePreCursor, -4i32)
        .unwrap();
    assert_eq!(
        engine.get_attribute(EPL1_0, LaneSel::Index(0), AttrId::DfeMode),
        Ok(AttrValue::DfeMode(DfeMode::Static))
    );
    assert_eq!(
        engine.get_attribute(EPL1_0, LaneSel::Index(0), AttrId::TxLanePreCursor),
        Ok(AttrValue::I32(-4))
    );

    // The SerDes is the source of truth, even when changed behind the
    // engine's back
    let asic = engine.asic();
    asic.serdes_dfe_mode_set(lane, DfeMode::Continuous).unwrap();
    asic.serdes_cursor_set(lane, Cursor::Pre, 2).unwrap();
    asic.serdes_polarity_set(lane, false, true).unwrap();
    assert_eq!(
        engine.get_attribute(EPL1_0, LaneSel::Index(0), AttrId::DfeMode),
        Ok(AttrValue::DfeMode(DfeMode::Continuous))
    );
    assert_eq!(
        engine.get_attribute(EPL1_0, LaneSel::Index(0), AttrId::TxLanePreCursor),
        Ok(AttrValue::I32(2))
    );
    assert_eq!(
        engine.get_attribute(EPL1_0, LaneSel::Index(0), AttrId::LanePolarity),
        Ok(AttrValue::LanePolarity(LanePolarity::InvertTx))
    );
}

#[test]
fn test_saf_matrix() {
    let (engine, _rx) = engine("saf_matrix");
    let saf = |rx: LogicalPort, tx: LogicalPort| {
        engine.asic().peek(regs::saf(rx.0, tx.0))
    };
    let set = |port, attr, value: bool| {
        engine
            .set_attribute(port, LaneSel::NotApplicable, attr, value)
            .unwrap()
    };
    let set_eth = |port, mode: EthMode| {
        engine
            .set_attribute(port, LaneSel::All, AttrId::EthernetMode, mode)
            .unwrap()
    };

    set_eth(EPL0_0, EthMode::Base25GSr);
    set_eth(EPL0_1, EthMode::Base10GSr);

    // Cutting through needs both ends to allow it
    set(EPL0_0, AttrId::RxCutThrough, true);
    assert_eq!(saf(EPL0_0, EPL0_1), 1);
    set(EPL0_1, AttrId::TxCutThrough, true);
    assert_eq!(saf(EPL0_0, EPL0_1), 0);
    assert_eq!(saf(EPL0_1, EPL0_0), 1);

    // The egress port can't be faster than the ingress port
    set(EPL0_1, AttrId::RxCutThrough, true);
    set(EPL0_0, AttrId::TxCutThrough, true);
    assert_eq!(saf(EPL0_1, EPL0_0), 1);
    set_eth(EPL0_1, EthMode::Base25GSr);
    assert_eq!(saf(EPL0_1, EPL0_0), 0);

    // Every pair of cardinal ports is programmed, and only the pairs
    // between the two ports cut through
    let matrix = engine.asic().register_block(RegBlock::Saf);
    assert_eq!(matrix.len(), 22 * 22);
    assert_eq!(matrix.iter().filter(|(_, v)| *v == 0).count(), 4);

    set(EPL0_0, AttrId::RxCutThrough, false);
    assert_eq!(saf(EPL0_0, EPL0_1), 1);
    assert_eq!(saf(EPL0_0, EPL0_0), 1);
    assert_eq!(saf(EPL0_1, EPL0_0), 0);
}

#[test]
fn test_eye_score() {
    let (engine, _rx) = engine("eye_score");
    let lane = aal::LaneId::new(0, 0);
    engine.asic().set_eye_score(lane, 33);
    assert_eq!(
        engine.get_attribute(EPL0_0, LaneSel::All, AttrId::EyeScore),
        Ok(AttrValue::U32(33))
    );
}

#[test]
fn test_unknown_port() {
    let (engine, _rx) = engine("unknown_port");
    assert_eq!(
        engine.set_attribute(LogicalPort(500), LaneSel::All, AttrId::DefVlan, 2u32),
        Err(AttrError::InvalidPort(LogicalPort(500)))
    );
}
