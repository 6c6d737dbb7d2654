// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/
//
// Copyright 2025 Oxide Computer Company

use aal::{
    AutonegPolicy, DfeSmType, LaneId, LaneSmType, PortSmType, PortUpdate,
    SmState, SmSubject,
};
use asic::faults::FaultPoint;
use common::ports::{AdminMode, AnMode, DfeMode, EthMode};
use portattr::{AttrError, AttrId, AttrValue, EngineConfig, LaneSel, PortSpec};
use pretty_assertions::assert_eq;
use strum::IntoEnumIterator;

use super::common::*;

fn set_eth(
    engine: &portattr::PortAttrEngine,
    port: aal::LogicalPort,
    mode: EthMode,
) -> Result<(), AttrError> {
    engine.set_attribute(port, LaneSel::All, AttrId::EthernetMode, mode)
}

fn an_mode(engine: &portattr::PortAttrEngine, port: aal::LogicalPort) -> AnMode {
    match engine.get_attribute(port, LaneSel::All, AttrId::Autoneg) {
        Ok(AttrValue::AnMode(an)) => an,
        other => panic!("unexpected AN mode: {other:?}"),
    }
}

#[test]
fn test_variant_follows_autoneg_policy() {
    let (engine, _rx) = engine("variant_follows_policy");
    engine.set_admin_mode(EPL0_0, AdminMode::Up).unwrap();

    for mode in EthMode::iter().filter(|m| !m.is_negotiated_only()) {
        set_eth(&engine, EPL0_0, mode).unwrap();
        let an = an_mode(&engine, EPL0_0);
        let expected = match engine.asic().is_autoneg_ready(mode, an) {
            (true, sm_type) => sm_type,
            (false, _) => PortSmType::Basic,
        };
        assert_eq!(
            engine.port_sm_type(EPL0_0).unwrap(),
            expected,
            "after switching to {mode}"
        );
        assert_eq!(
            engine.port_lanes(EPL0_0).unwrap().len(),
            mode.lane_count() as usize
        );
    }

    // Every replaced instance was disabled and stopped before its
    // successor started, and nothing reached it afterwards
    assert_eq!(engine.asic().fsm_events_after_stop(), 0);
}

#[test]
fn test_rebind_sequence() {
    let (engine, _rx) = engine("rebind_sequence");
    set_eth(&engine, EPL0_0, EthMode::An73).unwrap();

    let history = engine.asic().fsm_history_for(SmSubject::Port(EPL0_0));
    let transitions: Vec<_> = history
        .iter()
        .map(|r| (r.variant, r.event, r.to))
        .collect();
    let basic = aal::SmVariant::Port(PortSmType::Basic);
    let autoneg = aal::SmVariant::Port(PortSmType::Autoneg);
    assert_eq!(
        transitions,
        vec![
            (basic, None, SmState::Disabled),
            (basic, Some(aal::SmEventId::Disable), SmState::Disabled),
            (basic, None, SmState::Stopped),
            (autoneg, None, SmState::Disabled),
            (autoneg, Some(aal::SmEventId::Config), SmState::Configured),
            (autoneg, Some(aal::SmEventId::AdminDown), SmState::Configured),
        ]
    );
}

#[test]
fn test_an73() {
    let (engine, mut rx) = engine("an73");
    engine.set_admin_mode(EPL1_0, AdminMode::Up).unwrap();
    drain(&mut rx);

    set_eth(&engine, EPL1_0, EthMode::An73).unwrap();
    assert_eq!(an_mode(&engine, EPL1_0), AnMode::Clause73);
    assert_eq!(engine.port_sm_type(EPL1_0).unwrap(), PortSmType::Autoneg);

    let updates = drain(&mut rx);
    assert!(updates.contains(&PortUpdate::FsmRebound {
        port: EPL1_0,
        from: PortSmType::Basic,
        to: PortSmType::Autoneg,
    }));
    // The admin mode was delivered to the new instance, which is waiting
    // for a link partner
    assert_eq!(
        updates.last(),
        Some(&PortUpdate::AdminMode {
            port: EPL1_0,
            mode: AdminMode::Up,
        })
    );
    assert_eq!(
        engine.port_fsm_state(EPL1_0).unwrap(),
        Some(SmState::AnWait)
    );

    // New pages restart the negotiation, which now finds a partner
    engine
        .asic()
        .set_link_partner(EPL1_0, Some(EthMode::Base25GKr));
    engine
        .set_attribute(EPL1_0, LaneSel::All, AttrId::AutonegBasePage, 0x4001u64)
        .unwrap();
    assert_eq!(
        engine.port_fsm_state(EPL1_0).unwrap(),
        Some(SmState::LinkUp)
    );
    assert_eq!(
        engine.get_attribute(EPL1_0, LaneSel::All, AttrId::Speed),
        Ok(AttrValue::U32(25_000))
    );
    assert_eq!(
        engine.get_attribute(EPL1_0, LaneSel::All, AttrId::LinkState),
        Ok(AttrValue::Bool(true))
    );

    // Leaving AN-73 drops clause 73 autonegotiation
    set_eth(&engine, EPL1_0, EthMode::Base10GKr).unwrap();
    assert_eq!(an_mode(&engine, EPL1_0), AnMode::None);
    assert_eq!(engine.port_sm_type(EPL1_0).unwrap(), PortSmType::Basic);
    assert_eq!(
        engine.port_fsm_state(EPL1_0).unwrap(),
        Some(SmState::LinkUp)
    );
}

#[test]
fn test_autoneg_mode_validation() {
    let (engine, _rx) = engine("autoneg_mode_validation");
    set_eth(&engine, EPL0_0, EthMode::Base10GKr).unwrap();
    assert!(matches!(
        engine.set_attribute(
            EPL0_0,
            LaneSel::All,
            AttrId::Autoneg,
            AnMode::Clause73
        ),
        Err(AttrError::InvalidArgument(_))
    ));

    set_eth(&engine, EPL0_0, EthMode::Base1000X).unwrap();
    engine
        .set_attribute(EPL0_0, LaneSel::All, AttrId::Autoneg, AnMode::Clause37)
        .unwrap();
    assert_eq!(engine.port_sm_type(EPL0_0).unwrap(), PortSmType::Autoneg);

    engine
        .set_attribute(EPL0_0, LaneSel::All, AttrId::Autoneg, AnMode::None)
        .unwrap();
    assert_eq!(engine.port_sm_type(EPL0_0).unwrap(), PortSmType::Basic);
}

#[test]
fn test_negotiated_only_modes() {
    let (engine, _rx) = engine("negotiated_only_modes");
    for mode in [EthMode::Base25GKr, EthMode::Base100GCr4] {
        assert_eq!(
            set_eth(&engine, EPL0_0, mode),
            Err(AttrError::InvalidEthMode {
                port: EPL0_0,
                mode: mode.to_string(),
            })
        );
    }
}

#[test]
fn test_multi_lane_transitions() {
    let (engine, _rx) = engine("multi_lane_transitions");

    // A four-lane mode only fits on channel 0
    assert!(matches!(
        set_eth(&engine, EPL0_1, EthMode::Base40GSr4),
        Err(AttrError::InvalidEthMode { .. })
    ));

    // An enabled sibling blocks the change
    set_eth(&engine, EPL0_1, EthMode::Base10GSr).unwrap();
    assert!(matches!(
        set_eth(&engine, EPL0_0, EthMode::Base40GSr4),
        Err(AttrError::InvalidPortState { .. })
    ));
    assert_eq!(engine.port_lanes(EPL0_0).unwrap(), vec![LaneId::new(0, 0)]);

    set_eth(&engine, EPL0_1, EthMode::Disabled).unwrap();
    set_eth(&engine, EPL0_0, EthMode::Base40GSr4).unwrap();
    assert_eq!(
        engine.port_lanes(EPL0_0).unwrap(),
        (0..4).map(|c| LaneId::new(0, c)).collect::<Vec<_>>()
    );
    assert!(engine.port_lanes(EPL0_2).unwrap().is_empty());

    // The borrowed lane isn't available to its home port
    assert!(matches!(
        set_eth(&engine, EPL0_2, EthMode::Base10GSr),
        Err(AttrError::InvalidPortState { .. })
    ));

    // Going back to one lane always works
    set_eth(&engine, EPL0_0, EthMode::Base10GSr).unwrap();
    assert_eq!(engine.port_lanes(EPL0_0).unwrap(), vec![LaneId::new(0, 0)]);
    for port in [EPL0_1, EPL0_2, EPL0_3] {
        assert_eq!(engine.port_lanes(port).unwrap().len(), 1);
        assert_eq!(engine.lane_sm_type(port, 0).unwrap(), LaneSmType::Basic);
        assert_eq!(engine.lane_dfe_sm_type(port, 0).unwrap(), DfeSmType::Basic);
    }
    set_eth(&engine, EPL0_2, EthMode::Base10GSr).unwrap();
    assert_eq!(engine.asic().fsm_events_after_stop(), 0);
}

#[test]
fn test_pcie_lane_not_borrowed() {
    // Channel 1 of EPL 0 carries a PCIe link rather than an Ethernet port
    let epl = |port, channel| PortSpec::Epl {
        port,
        epl: 0,
        channel,
        stub: false,
    };
    let config = EngineConfig {
        ports: vec![
            epl(1, 0),
            PortSpec::Pcie {
                port: 2,
                index: 0,
                serdes: Some(LaneId::new(0, 1)),
            },
            epl(3, 2),
            epl(4, 3),
        ],
        ..Default::default()
    };
    let (engine, _rx) = engine_with("pcie_lane_not_borrowed", config);
    let pcie = aal::LogicalPort(2);
    assert_eq!(engine.lane_sm_type(pcie, 0).unwrap(), LaneSmType::Pcie);

    assert!(matches!(
        set_eth(&engine, EPL0_0, EthMode::Base40GSr4),
        Err(AttrError::InvalidPortState { .. })
    ));
    assert_eq!(engine.port_lanes(EPL0_0).unwrap(), vec![LaneId::new(0, 0)]);
    assert_eq!(engine.port_lanes(pcie).unwrap(), vec![LaneId::new(0, 1)]);
    assert_eq!(engine.lane_sm_type(pcie, 0).unwrap(), LaneSmType::Pcie);
    assert_eq!(
        engine.lane_dfe_sm_type(pcie, 0).unwrap(),
        DfeSmType::Unspecified
    );

    // Single-lane modes are unaffected
    set_eth(&engine, EPL0_0, EthMode::Base10GSr).unwrap();
    assert_eq!(engine.port_lanes(EPL0_0).unwrap(), vec![LaneId::new(0, 0)]);
}

#[test]
fn test_lane_moves_reported() {
    let (engine, mut rx) = engine("lane_moves_reported");
    set_eth(&engine, EPL0_0, EthMode::Base100GSr4).unwrap();
    let moved: Vec<_> = drain(&mut rx)
        .into_iter()
        .filter(|u| matches!(u, PortUpdate::LaneMoved { .. }))
        .collect();
    assert_eq!(
        moved,
        vec![
            PortUpdate::LaneMoved {
                lane: LaneId::new(0, 1),
                from: EPL0_1,
                to: EPL0_0,
            },
            PortUpdate::LaneMoved {
                lane: LaneId::new(0, 2),
                from: EPL0_2,
                to: EPL0_0,
            },
            PortUpdate::LaneMoved {
                lane: LaneId::new(0, 3),
                from: EPL0_3,
                to: EPL0_0,
            },
        ]
    );
}

#[test]
fn test_failed_rebind() {
    let (engine, _rx) = engine("failed_rebind");
    engine.asic().faults().fail_next(FaultPoint::FsmStart);
    assert!(matches!(
        set_eth(&engine, EPL0_0, EthMode::An73),
        Err(AttrError::Asic(_))
    ));
    assert_eq!(engine.port_sm_type(EPL0_0).unwrap(), PortSmType::Unspecified);
    assert_eq!(engine.port_fsm_state(EPL0_0).unwrap(), None);

    // The next mode change binds a state machine again
    set_eth(&engine, EPL0_0, EthMode::Base10GKr).unwrap();
    assert_eq!(engine.port_sm_type(EPL0_0).unwrap(), PortSmType::Basic);
    assert_eq!(an_mode(&engine, EPL0_0), AnMode::None);
}

#[test]
fn test_dfe_mode() {
    let (engine, _rx) = engine("dfe_mode");
    let lane = LaneId::new(1, 0);
    let dfe = SmSubject::Dfe(lane);
    set_eth(&engine, EPL1_0, EthMode::Base10GSr).unwrap();
    assert_eq!(engine.asic().fsm_stats(dfe).get(SmState::DfeTuning), 1);

    engine
        .set_attribute(EPL1_0, LaneSel::Index(0), AttrId::DfeMode, DfeMode::Static)
        .unwrap();
    assert_eq!(engine.asic().lane_model(lane).dfe_mode, DfeMode::Static);
    let last = engine.asic().fsm_history_for(dfe).pop().unwrap();
    assert_eq!(last.to, SmState::Disabled);
}

#[test]
fn test_pcie_admin() {
    let (engine, _rx) = engine("pcie_admin");
    engine.set_admin_mode(PCIE0, AdminMode::Up).unwrap();
    assert_eq!(engine.port_fsm_state(PCIE0).unwrap(), Some(SmState::LinkUp));
    engine.set_admin_mode(PCIE0, AdminMode::Down).unwrap();
    assert_eq!(
        engine.port_fsm_state(PCIE0).unwrap(),
        Some(SmState::Configured)
    );
    assert_eq!(engine.admin_mode(PCIE0).unwrap(), AdminMode::Down);
}
