// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/
//
// Copyright 2025 Oxide Computer Company

//! Access checks and storage resolution.  Nothing here has side effects.
//!
//! A missing descriptor is reported as `InvalidAttribute` by
//! `attr::lookup()`, which every caller goes through to obtain the
//! descriptor checked here.

use crate::attr::{AttrValue, AttributeDescriptor, Scope};
use crate::port::Port;
use crate::storage::{LaneAttrSet, PortAttrSet};
use crate::types::{AttrError, AttrResult, Direction, Origin};

/// Check that the attribute may be accessed on this port in this direction.
pub(crate) fn validate_access(
    desc: &AttributeDescriptor,
    port: &Port,
    direction: Direction,
) -> AttrResult<()> {
    let write = direction == Direction::Write;
    if desc.excluded(port.sub_type, write) {
        return Err(AttrError::UnsupportedAttribute {
            port: port.id,
            attr: desc.id.to_string(),
        });
    }
    if write && desc.is_read_only() {
        return Err(AttrError::ReadOnlyAttribute(desc.id.to_string()));
    }
    Ok(())
}

/// Per-lag attributes of a LAG member belong to the LAG.  Only the
/// propagator may write them while per-lag management is active.
pub(crate) fn validate_per_lag(
    desc: &AttributeDescriptor,
    port: &Port,
    origin: Origin,
    per_lag_management: bool,
) -> AttrResult<()> {
    if per_lag_management
        && desc.per_lag
        && port.lag.is_some()
        && origin != Origin::Propagator
    {
        return Err(AttrError::PerLagAttribute {
            port: port.id,
            attr: desc.id.to_string(),
        });
    }
    Ok(())
}

fn missing_slot(desc: &AttributeDescriptor) -> AttrError {
    AttrError::InvalidArgument(format!(
        "{} has no {:?}-scoped storage here",
        desc.id, desc.scope
    ))
}

/// Find the stored value of an attribute.  Lane-scoped attributes need the
/// lane's block.
pub(crate) fn resolve<'a>(
    desc: &AttributeDescriptor,
    port: &'a PortAttrSet,
    lane: Option<&'a LaneAttrSet>,
) -> AttrResult<&'a AttrValue> {
    match desc.scope {
        Scope::Port => port.slot(desc),
        Scope::Lane => lane.and_then(|l| l.slot(desc)),
    }
    .ok_or_else(|| missing_slot(desc))
}

pub(crate) fn resolve_mut<'a>(
    desc: &AttributeDescriptor,
    port: &'a mut PortAttrSet,
    lane: Option<&'a mut LaneAttrSet>,
) -> AttrResult<&'a mut AttrValue> {
    match desc.scope {
        Scope::Port => port.slot_mut(desc),
        Scope::Lane => lane.and_then(|l| l.slot_mut(desc)),
    }
    .ok_or_else(|| missing_slot(desc))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attr::{lookup, AttrId};
    use crate::port::tests::{epl_port, pcie_port};
    use aal::LogicalPort;

    #[test]
    fn test_exclusions() {
        let epl = epl_port(1, 0, 0);
        let pcie = pcie_port(2, 0);
        let min = lookup(AttrId::MinFrameSize).unwrap();
        assert!(validate_access(min, &epl, Direction::Write).is_ok());
        assert!(validate_access(min, &pcie, Direction::Read).is_ok());
        assert_eq!(
            validate_access(min, &pcie, Direction::Write),
            Err(AttrError::UnsupportedAttribute {
                port: LogicalPort(2),
                attr: "MinFrameSize".to_string(),
            })
        );

        let eth = lookup(AttrId::EthernetMode).unwrap();
        assert!(validate_access(eth, &pcie, Direction::Read).is_err());

        let width = lookup(AttrId::PcieLinkWidth).unwrap();
        assert!(validate_access(width, &pcie, Direction::Read).is_ok());
        assert!(validate_access(width, &epl, Direction::Read).is_err());
    }

    #[test]
    fn test_read_only() {
        let epl = epl_port(1, 0, 0);
        let speed = lookup(AttrId::Speed).unwrap();
        assert!(validate_access(speed, &epl, Direction::Read).is_ok());
        assert_eq!(
            validate_access(speed, &epl, Direction::Write),
            Err(AttrError::ReadOnlyAttribute("Speed".to_string()))
        );
    }

    #[test]
    fn test_per_lag() {
        let mut port = epl_port(1, 0, 0);
        let vlan = lookup(AttrId::DefVlan).unwrap();
        let cfi = lookup(AttrId::TxCfi).unwrap();
        assert!(validate_per_lag(vlan, &port, Origin::Direct, true).is_ok());

        port.lag = Some(LogicalPort(1024));
        assert!(matches!(
            validate_per_lag(vlan, &port, Origin::Direct, true),
            Err(AttrError::PerLagAttribute { .. })
        ));
        assert!(validate_per_lag(vlan, &port, Origin::Propagator, true).is_ok());
        assert!(validate_per_lag(vlan, &port, Origin::Direct, false).is_ok());
        assert!(validate_per_lag(cfi, &port, Origin::Direct, true).is_ok());
    }

    #[test]
    fn test_resolve() {
        let mut port = epl_port(1, 0, 0);
        let mut lane = LaneAttrSet::new();
        let oui = lookup(AttrId::Autoneg25gNextPageOui).unwrap();
        let dfe = lookup(AttrId::DfeMode).unwrap();

        assert_eq!(resolve(oui, &port.attrs, None), Ok(&AttrValue::U32(0x6a737d)));
        assert!(resolve(dfe, &port.attrs, None).is_err());
        assert!(resolve(dfe, &port.attrs, Some(&lane)).is_ok());

        *resolve_mut(oui, &mut port.attrs, Some(&mut lane)).unwrap() =
            AttrValue::U32(7);
        assert_eq!(port.attrs.ext.get(oui.slot), Some(&AttrValue::U32(7)));
    }
}
