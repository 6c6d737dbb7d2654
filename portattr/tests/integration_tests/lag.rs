// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/
//
// Copyright 2025 Oxide Computer Company

use aal::{LogicalPort, PortUpdate};
use portattr::{AttrError, AttrId, AttrValue, EngineConfig, LaneSel};
use pretty_assertions::assert_eq;

use super::common::*;

fn get_u32(
    engine: &portattr::PortAttrEngine,
    port: LogicalPort,
    attr: AttrId,
) -> u32 {
    match engine.get_attribute(port, LaneSel::All, attr) {
        Ok(AttrValue::U32(v)) => v,
        other => panic!("unexpected {attr} on {port}: {other:?}"),
    }
}

#[test]
fn test_propagation() {
    let (engine, mut rx) = engine("lag_propagation");
    let lag = engine.create_lag(0, false).unwrap();
    for member in [EPL0_0, EPL1_0, PCIE0] {
        engine.add_lag_member(lag, member).unwrap();
    }
    drain(&mut rx);

    engine
        .set_attribute(lag, LaneSel::All, AttrId::DefVlan, 300u32)
        .unwrap();
    for port in [lag, EPL0_0, EPL1_0, PCIE0] {
        assert_eq!(get_u32(&engine, port, AttrId::DefVlan), 300);
    }
    let updates = drain(&mut rx);
    assert!(updates.contains(&PortUpdate::Attribute {
        port: lag,
        attr: AttrId::DefVlan.into(),
    }));
    assert!(updates.contains(&PortUpdate::Attribute {
        port: PCIE0,
        attr: AttrId::DefVlan.into(),
    }));

    // Frame sizes can't be written on PCIe ports, so that member keeps its
    // own
    engine
        .set_attribute(lag, LaneSel::All, AttrId::MaxFrameSize, 9216u32)
        .unwrap();
    assert_eq!(get_u32(&engine, lag, AttrId::MaxFrameSize), 9216);
    assert_eq!(get_u32(&engine, EPL0_0, AttrId::MaxFrameSize), 9216);
    assert_eq!(get_u32(&engine, EPL1_0, AttrId::MaxFrameSize), 9216);
    assert_eq!(get_u32(&engine, PCIE0, AttrId::MaxFrameSize), 1536);

    // Ports outside the LAG are untouched
    assert_eq!(get_u32(&engine, EPL0_1, AttrId::DefVlan), 1);
}

#[test]
fn test_mask_propagation() {
    let (engine, _rx) = engine("lag_mask_propagation");
    let lag = engine.create_lag(2, false).unwrap();
    engine.add_lag_member(lag, EPL0_0).unwrap();

    let mut bits = vec![false; 48];
    bits[7] = true;
    engine
        .set_attribute(lag, LaneSel::All, AttrId::MaskWide, bits.clone())
        .unwrap();
    assert_eq!(
        engine.get_attribute(lag, LaneSel::All, AttrId::MaskWide),
        Ok(AttrValue::BitArray(bits.clone()))
    );
    assert_eq!(
        engine.get_attribute(EPL0_0, LaneSel::All, AttrId::MaskWide),
        Ok(AttrValue::BitArray(bits))
    );
}

#[test]
fn test_member_write_rejected() {
    let (engine, _rx) = engine("lag_member_write");
    let lag = engine.create_lag(0, false).unwrap();
    engine.add_lag_member(lag, EPL0_0).unwrap();

    assert_eq!(
        engine.set_attribute(EPL0_0, LaneSel::All, AttrId::MinFrameSize, 128u32),
        Err(AttrError::PerLagAttribute {
            port: EPL0_0,
            attr: "MinFrameSize".to_string(),
        })
    );
    // Attributes the LAG doesn't own are still the member's to change
    engine
        .set_attribute(EPL0_0, LaneSel::All, AttrId::TxCfi, 2u32)
        .unwrap();
}

#[test]
fn test_member_write_without_per_lag_management() {
    let config = EngineConfig {
        per_lag_management: false,
        ..Default::default()
    };
    let (engine, _rx) = engine_with("lag_unmanaged", config);
    let lag = engine.create_lag(0, false).unwrap();
    engine.add_lag_member(lag, EPL0_0).unwrap();
    engine
        .set_attribute(EPL0_0, LaneSel::All, AttrId::MinFrameSize, 128u32)
        .unwrap();
    // Nothing was saved when the port joined
    assert!(matches!(
        engine.restore_original_member_attr(EPL0_0),
        Err(AttrError::Uninitialized(_))
    ));
}

#[test]
fn test_not_per_lag() {
    let (engine, _rx) = engine("lag_not_per_lag");
    let lag = engine.create_lag(0, false).unwrap();
    assert_eq!(
        engine.set_attribute(lag, LaneSel::All, AttrId::Ifg, 20u32),
        Err(AttrError::NotPerLagAttribute("Ifg".to_string()))
    );
    assert_eq!(
        engine.get_attribute(lag, LaneSel::All, AttrId::Ifg),
        Err(AttrError::NotPerLagAttribute("Ifg".to_string()))
    );
}

#[test]
fn test_save_restore() {
    let (engine, _rx) = engine("lag_save_restore");
    engine
        .set_attribute(EPL0_2, LaneSel::All, AttrId::DefVlan, 7u32)
        .unwrap();
    engine
        .set_attribute(EPL0_2, LaneSel::All, AttrId::Learning, false)
        .unwrap();

    let lag = engine.create_lag(0, false).unwrap();
    engine
        .set_attribute(lag, LaneSel::All, AttrId::DefVlan, 20u32)
        .unwrap();
    engine.add_lag_member(lag, EPL0_2).unwrap();
    assert_eq!(get_u32(&engine, EPL0_2, AttrId::DefVlan), 20);
    assert_eq!(
        engine.get_attribute(EPL0_2, LaneSel::All, AttrId::Learning),
        Ok(AttrValue::Bool(true))
    );

    engine.remove_lag_member(lag, EPL0_2).unwrap();
    assert_eq!(get_u32(&engine, EPL0_2, AttrId::DefVlan), 7);
    assert_eq!(
        engine.get_attribute(EPL0_2, LaneSel::All, AttrId::Learning),
        Ok(AttrValue::Bool(false))
    );

    // Only members have anything to restore
    assert!(matches!(
        engine.restore_original_member_attr(EPL0_2),
        Err(AttrError::InvalidArgument(_))
    ));
    // And the port is free to manage its own attributes again
    engine
        .set_attribute(EPL0_2, LaneSel::All, AttrId::DefVlan, 8u32)
        .unwrap();
}

#[test]
fn test_snapshot_taken_once() {
    let (engine, _rx) = engine("lag_snapshot_once");
    engine
        .set_attribute(EPL0_3, LaneSel::All, AttrId::DefPri, 5u32)
        .unwrap();
    let lag = engine.create_lag(0, false).unwrap();
    engine.add_lag_member(lag, EPL0_3).unwrap();
    assert_eq!(get_u32(&engine, EPL0_3, AttrId::DefPri), 0);

    engine
        .set_attribute(lag, LaneSel::All, AttrId::DefPri, 3u32)
        .unwrap();
    // Applying again must not overwrite what was saved at join time
    engine.apply_lag_settings_to_new_member(EPL0_3, lag).unwrap();
    engine.restore_original_member_attr(EPL0_3).unwrap();
    assert_eq!(get_u32(&engine, EPL0_3, AttrId::DefPri), 5);

    // The saved copy was consumed
    assert!(matches!(
        engine.restore_original_member_attr(EPL0_3),
        Err(AttrError::Uninitialized(_))
    ));
}

#[test]
fn test_settings_need_membership() {
    let (engine, _rx) = engine("lag_settings_need_membership");
    engine
        .set_attribute(EPL0_1, LaneSel::All, AttrId::DefVlan, 77u32)
        .unwrap();

    // A physical port is not a LAG to copy from
    assert!(matches!(
        engine.apply_lag_settings_to_new_member(EPL0_0, EPL0_1),
        Err(AttrError::InvalidArgument(_))
    ));
    assert_eq!(get_u32(&engine, EPL0_0, AttrId::DefVlan), 1);

    // Nor is a LAG the port hasn't joined
    let lag = engine.create_lag(0, false).unwrap();
    engine
        .set_attribute(lag, LaneSel::All, AttrId::DefVlan, 30u32)
        .unwrap();
    assert!(matches!(
        engine.apply_lag_settings_to_new_member(EPL0_2, lag),
        Err(AttrError::InvalidArgument(_))
    ));
    assert_eq!(get_u32(&engine, EPL0_2, AttrId::DefVlan), 1);
    assert!(matches!(
        engine.restore_original_member_attr(EPL0_2),
        Err(AttrError::InvalidArgument(_))
    ));

    // A member of another LAG can't take this one's settings
    let other = engine.create_lag(1, false).unwrap();
    engine.add_lag_member(other, EPL0_3).unwrap();
    assert!(matches!(
        engine.apply_lag_settings_to_new_member(EPL0_3, lag),
        Err(AttrError::InvalidArgument(_))
    ));
    assert_eq!(get_u32(&engine, EPL0_3, AttrId::DefVlan), 1);

    engine.add_lag_member(lag, EPL0_2).unwrap();
    assert_eq!(get_u32(&engine, EPL0_2, AttrId::DefVlan), 30);
}

#[test]
fn test_frame_size_order() {
    let (engine, _rx) = engine("lag_frame_size_order");
    engine
        .set_attribute(EPL1_0, LaneSel::All, AttrId::MaxFrameSize, 128u32)
        .unwrap();

    let lag = engine.create_lag(0, false).unwrap();
    engine
        .set_attribute(lag, LaneSel::All, AttrId::MinFrameSize, 200u32)
        .unwrap();

    // The new minimum is above the member's maximum, so the maximum has to
    // be raised first
    engine.add_lag_member(lag, EPL1_0).unwrap();
    assert_eq!(get_u32(&engine, EPL1_0, AttrId::MinFrameSize), 200);
    assert_eq!(get_u32(&engine, EPL1_0, AttrId::MaxFrameSize), 1536);

    engine.remove_lag_member(lag, EPL1_0).unwrap();
    assert_eq!(get_u32(&engine, EPL1_0, AttrId::MinFrameSize), 64);
    assert_eq!(get_u32(&engine, EPL1_0, AttrId::MaxFrameSize), 128);
}

#[test]
fn test_membership_rules() {
    let (engine, _rx) = engine("lag_membership_rules");
    let lag = engine.create_lag(0, false).unwrap();
    let other = engine.create_lag(1, true).unwrap();

    engine.add_lag_member(lag, EPL0_0).unwrap();
    assert!(matches!(
        engine.add_lag_member(other, EPL0_0),
        Err(AttrError::InvalidPortState { .. })
    ));
    assert!(matches!(
        engine.add_lag_member(lag, TE),
        Err(AttrError::InvalidArgument(_))
    ));
    assert!(matches!(
        engine.add_lag_member(lag, CPU),
        Err(AttrError::InvalidArgument(_))
    ));
    assert!(matches!(
        engine.remove_lag_member(other, EPL0_0),
        Err(AttrError::InvalidArgument(_))
    ));
    assert_eq!(
        engine.add_lag_member(LogicalPort(1100), EPL0_1),
        Err(AttrError::InvalidPort(LogicalPort(1100)))
    );
    assert_eq!(engine.lag_members(lag).unwrap(), vec![EPL0_0]);
    assert!(engine.lag_members(other).unwrap().is_empty());
}

#[test]
fn test_delete_restores_members() {
    let (engine, _rx) = engine("lag_delete");
    let lag = engine.create_lag(0, false).unwrap();
    engine
        .set_attribute(lag, LaneSel::All, AttrId::DefVlan, 99u32)
        .unwrap();
    engine.add_lag_member(lag, EPL0_0).unwrap();
    engine.add_lag_member(lag, EPL0_1).unwrap();
    assert_eq!(get_u32(&engine, EPL0_1, AttrId::DefVlan), 99);

    engine.delete_lag(lag).unwrap();
    assert_eq!(get_u32(&engine, EPL0_0, AttrId::DefVlan), 1);
    assert_eq!(get_u32(&engine, EPL0_1, AttrId::DefVlan), 1);
    assert_eq!(
        engine.get_attribute(lag, LaneSel::All, AttrId::DefVlan),
        Err(AttrError::InvalidPort(lag))
    );
}

#[test]
fn test_concurrent_lag_operations() {
    let (engine, _rx) = engine("lag_concurrent");
    let lag = engine.create_lag(0, false).unwrap();
    engine.add_lag_member(lag, EPL0_0).unwrap();
    engine.add_lag_member(lag, EPL0_1).unwrap();
    let engine = &engine;

    std::thread::scope(|s| {
        // The only writer of the LAG's VLAN
        s.spawn(move || {
            for vlan in 100..150u32 {
                engine
                    .set_attribute(lag, LaneSel::All, AttrId::DefVlan, vlan)
                    .unwrap();
            }
        });

        // Members never get to write what the LAG owns
        s.spawn(move || {
            for _ in 0..50 {
                assert!(matches!(
                    engine.set_attribute(
                        EPL0_1,
                        LaneSel::All,
                        AttrId::DefVlan,
                        9u32
                    ),
                    Err(AttrError::PerLagAttribute { .. })
                ));
                engine
                    .set_attribute(EPL0_1, LaneSel::All, AttrId::TxCfi, 1u32)
                    .unwrap();
            }
        });

        // A port joining and leaving while the LAG's settings change
        s.spawn(move || {
            for _ in 0..20 {
                engine.add_lag_member(lag, EPL0_3).unwrap();
                engine.remove_lag_member(lag, EPL0_3).unwrap();
                assert_eq!(get_u32(engine, EPL0_3, AttrId::DefVlan), 1);
            }
        });

        // A second LAG coming and going
        s.spawn(move || {
            for _ in 0..20 {
                let other = engine.create_lag(1, false).unwrap();
                engine
                    .set_attribute(other, LaneSel::All, AttrId::DefVlan, 500u32)
                    .unwrap();
                engine.add_lag_member(other, EPL1_0).unwrap();
                assert_eq!(get_u32(engine, EPL1_0, AttrId::DefVlan), 500);
                engine.delete_lag(other).unwrap();
                assert_eq!(get_u32(engine, EPL1_0, AttrId::DefVlan), 1);
            }
        });
    });

    for port in [lag, EPL0_0, EPL0_1] {
        assert_eq!(get_u32(engine, port, AttrId::DefVlan), 149);
    }
    assert_eq!(get_u32(engine, EPL0_3, AttrId::DefVlan), 1);
    assert_eq!(engine.lag_members(lag).unwrap(), vec![EPL0_0, EPL0_1]);
    assert_eq!(
        engine.lag_members(LogicalPort(1025)),
        Err(AttrError::InvalidPort(LogicalPort(1025)))
    );
    assert_eq!(engine.asic().fsm_events_after_stop(), 0);
}
