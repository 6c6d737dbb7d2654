// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/
//
// Copyright 2025 Oxide Computer Company

//! Port and lane vocabulary shared by the ASIC layer and the attribute engine.

use std::fmt;
use std::str::FromStr;

use schemars::JsonSchema;
use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;

/// Number of SerDes lanes in a single Ethernet Port Logic block.
pub const LANES_PER_EPL: u8 = 4;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PortParseError {
    #[error("unknown {kind}: \"{value}\"")]
    Unknown { kind: &'static str, value: String },
}

/// The kind of a logical port.
#[derive(
    Clone,
    Copy,
    Debug,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Deserialize,
    Serialize,
    JsonSchema,
    strum::EnumIter,
)]
#[serde(rename_all = "snake_case")]
pub enum PortType {
    Physical,
    Cpu,
    Lag,
    Virtual,
    Te,
    Loopback,
    Pti,
    /// Flood, remote and other pseudo ports that carry no attributes.
    Special,
}

impl PortType {
    /// Ports backed by a cardinal slot in the switch's per-port hardware
    /// tables.
    pub fn is_cardinal(&self) -> bool {
        matches!(
            self,
            PortType::Physical
                | PortType::Cpu
                | PortType::Te
                | PortType::Loopback
                | PortType::Pti
        )
    }
}

impl fmt::Display for PortType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self:?}")
    }
}

/// The physical ring a cardinal port sits on.  Attribute applicability is
/// expressed in terms of these sub-types.
#[derive(
    Clone,
    Copy,
    Debug,
    Default,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Deserialize,
    Serialize,
    JsonSchema,
    strum::EnumIter,
)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum PhysSubType {
    #[default]
    None = 0,
    Epl = 1,
    Pcie = 2,
    Te = 3,
    Loopback = 4,
    Pti = 5,
}

impl PhysSubType {
    pub const fn bit(self) -> u8 {
        1 << (self as u8)
    }
}

impl fmt::Display for PhysSubType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self:?}")
    }
}

/// The Ethernet interface mode of an EPL port.
#[derive(
    Clone,
    Copy,
    Debug,
    Default,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Deserialize,
    Serialize,
    JsonSchema,
    strum::EnumIter,
)]
#[serde(rename_all = "lowercase")]
#[repr(u8)]
pub enum EthMode {
    #[default]
    Disabled,
    Sgmii,
    Base1000X,
    Base1000Kx,
    Base2500X,
    Base10GKr,
    Base10GCr,
    Base10GSr,
    Base25GKr,
    Base25GCr,
    Base25GSr,
    Xaui,
    Base40GKr4,
    Base40GCr4,
    Base40GSr4,
    Base100GKr4,
    Base100GCr4,
    Base100GSr4,
    /// Clause 73 autonegotiation; the resulting mode is chosen by the
    /// negotiation.
    An73,
}

impl EthMode {
    /// Number of SerDes lanes the mode occupies.
    pub fn lane_count(&self) -> u8 {
        match self {
            EthMode::Xaui
            | EthMode::Base40GKr4
            | EthMode::Base40GCr4
            | EthMode::Base40GSr4
            | EthMode::Base100GKr4
            | EthMode::Base100GCr4
            | EthMode::Base100GSr4 => 4,
            _ => 1,
        }
    }

    pub fn is_multi_lane(&self) -> bool {
        self.lane_count() > 1
    }

    pub fn is_enabled(&self) -> bool {
        *self != EthMode::Disabled
    }

    /// Modes that can only be the outcome of a Clause 73 negotiation and may
    /// not be configured directly.
    pub fn is_negotiated_only(&self) -> bool {
        matches!(
            self,
            EthMode::Base25GKr
                | EthMode::Base25GCr
                | EthMode::Base100GKr4
                | EthMode::Base100GCr4
        )
    }

    /// Nominal data rate in Mb/s.  Disabled and not-yet-negotiated ports
    /// report 0.
    pub fn speed(&self) -> u32 {
        match self {
            EthMode::Disabled | EthMode::An73 => 0,
            EthMode::Sgmii | EthMode::Base1000X | EthMode::Base1000Kx => 1000,
            EthMode::Base2500X => 2500,
            EthMode::Base10GKr
            | EthMode::Base10GCr
            | EthMode::Base10GSr
            | EthMode::Xaui => 10_000,
            EthMode::Base25GKr | EthMode::Base25GCr | EthMode::Base25GSr => {
                25_000
            }
            EthMode::Base40GKr4 | EthMode::Base40GCr4 | EthMode::Base40GSr4 => {
                40_000
            }
            EthMode::Base100GKr4
            | EthMode::Base100GCr4
            | EthMode::Base100GSr4 => 100_000,
        }
    }

    /// Whether the given autonegotiation mode may be configured alongside
    /// this Ethernet mode.
    pub fn supports_autoneg(&self, an: AnMode) -> bool {
        match an {
            AnMode::None => true,
            AnMode::Clause73 => {
                matches!(self, EthMode::An73 | EthMode::Disabled)
            }
            AnMode::Clause37 => {
                matches!(self, EthMode::Base1000X | EthMode::Disabled)
            }
            AnMode::Sgmii => matches!(
                self,
                EthMode::Sgmii | EthMode::Base1000X | EthMode::Disabled
            ),
        }
    }
}

impl fmt::Display for EthMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self:?}")
    }
}

impl FromStr for EthMode {
    type Err = PortParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        use strum::IntoEnumIterator;

        let lower = s.to_lowercase();
        EthMode::iter()
            .find(|m| format!("{m:?}").to_lowercase() == lower)
            .ok_or_else(|| PortParseError::Unknown {
                kind: "ethernet mode",
                value: s.to_string(),
            })
    }
}

/// Autonegotiation protocol.
#[derive(
    Clone,
    Copy,
    Debug,
    Default,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Deserialize,
    Serialize,
    JsonSchema,
    strum::EnumIter,
)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum AnMode {
    #[default]
    None,
    Clause37,
    Sgmii,
    Clause73,
}

impl fmt::Display for AnMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self:?}")
    }
}

/// The administrative state requested for a port.
#[derive(
    Clone,
    Copy,
    Debug,
    Default,
    PartialEq,
    Eq,
    Hash,
    Deserialize,
    Serialize,
    JsonSchema,
)]
#[serde(rename_all = "snake_case")]
pub enum AdminMode {
    Up,
    #[default]
    Down,
    PowerDown,
}

impl fmt::Display for AdminMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self:?}")
    }
}

macro_rules! port_enum {
    ($(#[$meta:meta])* $name:ident { $($(#[$vmeta:meta])* $variant:ident),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(
            Clone,
            Copy,
            Debug,
            Default,
            PartialEq,
            Eq,
            Hash,
            PartialOrd,
            Ord,
            Deserialize,
            Serialize,
            JsonSchema,
            strum::EnumIter,
        )]
        #[serde(rename_all = "snake_case")]
        #[repr(u8)]
        pub enum $name {
            $($(#[$vmeta])* $variant),+
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{self:?}")
            }
        }
    };
}

port_enum! {
    /// Inter-switch link tag carried on frames egressing the port.
    IslTagFormat {
        #[default]
        None,
        F56,
        F96,
    }
}

impl IslTagFormat {
    /// Number of bytes the tag adds to every frame.
    pub fn tag_bytes(&self) -> u32 {
        match self {
            IslTagFormat::None => 0,
            IslTagFormat::F56 => 8,
            IslTagFormat::F96 => 12,
        }
    }
}

port_enum! {
    /// How deep into the frame the parser looks.
    ParserMode {
        #[default]
        L2,
        L3,
        L4,
    }
}

port_enum! {
    /// 802.1X authorization state.
    Dot1xState {
        #[default]
        NotActive,
        Authorized,
        NotAuthorized,
    }
}

port_enum! {
    /// Action taken on MAC security violations.
    SecurityAction {
        #[default]
        None,
        Drop,
        Trap,
        Event,
    }
}

port_enum! {
    /// Handling of the frame check sequence on transmit.
    TxFcsMode {
        Passthru,
        PassthruCheck,
        Insert,
        #[default]
        ReplaceGood,
        ReplaceBad,
    }
}

port_enum! {
    /// MAC-level loopback.
    LoopbackMode {
        #[default]
        Off,
        TxToRx,
        RxToTx,
    }
}

port_enum! {
    /// Per-lane polarity inversion.
    LanePolarity {
        #[default]
        Normal,
        InvertRx,
        InvertTx,
        InvertBoth,
    }
}

impl LanePolarity {
    /// Split into (rx inverted, tx inverted).
    pub fn rx_tx(&self) -> (bool, bool) {
        match self {
            LanePolarity::Normal => (false, false),
            LanePolarity::InvertRx => (true, false),
            LanePolarity::InvertTx => (false, true),
            LanePolarity::InvertBoth => (true, true),
        }
    }

    pub fn from_rx_tx(rx: bool, tx: bool) -> Self {
        match (rx, tx) {
            (false, false) => LanePolarity::Normal,
            (true, false) => LanePolarity::InvertRx,
            (false, true) => LanePolarity::InvertTx,
            (true, true) => LanePolarity::InvertBoth,
        }
    }
}

port_enum! {
    /// Receiver termination.
    RxTermination {
        Low,
        #[default]
        High,
        Float,
    }
}

port_enum! {
    /// Receiver decision-feedback equalizer tuning mode.
    DfeMode {
        Static,
        OneShot,
        #[default]
        Continuous,
        Kr,
        IcalOnly,
    }
}

impl DfeMode {
    /// Modes that run the DFE tuning state machine.
    pub fn is_adaptive(&self) -> bool {
        !matches!(self, DfeMode::Static)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strum::IntoEnumIterator;

    #[test]
    fn test_lane_counts() {
        assert_eq!(EthMode::Disabled.lane_count(), 1);
        assert_eq!(EthMode::An73.lane_count(), 1);
        assert_eq!(EthMode::Base10GKr.lane_count(), 1);
        assert_eq!(EthMode::Base40GCr4.lane_count(), 4);
        assert_eq!(EthMode::Xaui.lane_count(), 4);
        for mode in EthMode::iter() {
            assert!(mode.lane_count() == 1 || mode.lane_count() == 4);
        }
    }

    #[test]
    fn test_negotiated_only() {
        let negotiated: Vec<EthMode> =
            EthMode::iter().filter(|m| m.is_negotiated_only()).collect();
        assert_eq!(
            negotiated,
            vec![
                EthMode::Base25GKr,
                EthMode::Base25GCr,
                EthMode::Base100GKr4,
                EthMode::Base100GCr4
            ]
        );
    }

    #[test]
    fn test_parse_eth_mode() {
        assert_eq!("base40gsr4".parse::<EthMode>().unwrap(), EthMode::Base40GSr4);
        assert_eq!("An73".parse::<EthMode>().unwrap(), EthMode::An73);
        assert!("100g".parse::<EthMode>().is_err());
    }

    #[test]
    fn test_autoneg_compat() {
        assert!(EthMode::An73.supports_autoneg(AnMode::Clause73));
        assert!(!EthMode::Base10GKr.supports_autoneg(AnMode::Clause73));
        assert!(EthMode::Base1000X.supports_autoneg(AnMode::Clause37));
        assert!(EthMode::Sgmii.supports_autoneg(AnMode::Sgmii));
        assert!(!EthMode::Sgmii.supports_autoneg(AnMode::Clause37));
        for mode in EthMode::iter() {
            assert!(mode.supports_autoneg(AnMode::None));
        }
    }

    #[test]
    fn test_polarity_split() {
        for p in LanePolarity::iter() {
            let (rx, tx) = p.rx_tx();
            assert_eq!(LanePolarity::from_rx_tx(rx, tx), p);
        }
    }

    #[test]
    fn test_serde_names() {
        let s = serde_json::to_string(&EthMode::Base100GSr4).unwrap();
        assert_eq!(s, "\"base100gsr4\"");
        let t: PortType = serde_json::from_str("\"loopback\"").unwrap();
        assert_eq!(t, PortType::Loopback);
    }
}
