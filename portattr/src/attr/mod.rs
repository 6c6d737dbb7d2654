// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/
//
// Copyright 2025 Oxide Computer Company

//! The attribute vocabulary: ids, values, and the descriptors that say how
//! each attribute is stored, validated, and programmed.

use std::fmt;
use std::ops::BitOr;

use common::ports::{
    AnMode, DfeMode, Dot1xState, EthMode, IslTagFormat, LanePolarity,
    LoopbackMode, ParserMode, PhysSubType, RxTermination, SecurityAction,
    TxFcsMode,
};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::types::{AttrError, AttrResult};

pub(crate) mod handlers;
mod table;

pub(crate) use handlers::AttrHandler;
pub use table::lookup;
pub(crate) use table::{descriptors, slot_counts};

/// The public attribute id space.  Values are stable and contiguous from 0.
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
    strum::EnumCount,
    strum::FromRepr,
)]
#[repr(u32)]
pub enum AttrId {
    MinFrameSize = 0,
    MaxFrameSize = 1,
    IslTagFormat = 2,
    DefVlan = 3,
    DefPri = 4,
    DefCfi = 5,
    DefDscp = 6,
    DefSwpri = 7,
    SwpriSource = 8,
    SwpriDscpPref = 9,
    TxCfi = 10,
    Learning = 11,
    Tagging = 12,
    DropBv = 13,
    DropTagged = 14,
    DropUntagged = 15,
    Dot1xState = 16,
    SecurityAction = 17,
    LoopbackSuppression = 18,
    UcastFlooding = 19,
    McastFlooding = 20,
    BcastFlooding = 21,
    McastPruning = 22,
    Parser = 23,
    ParseMpls = 24,
    Routable = 25,
    UpdateTtl = 26,
    UpdateDscp = 27,
    ReplaceDscp = 28,
    MaskWide = 29,
    Ifg = 30,
    DicEnable = 31,
    TxPadSize = 32,
    TxFcsMode = 33,
    TxPause = 34,
    RxPause = 35,
    TxPauseResendTime = 36,
    TxClassPause = 37,
    RxClassPause = 38,
    LinkInterrupt = 39,
    Loopback = 40,
    FabricLoopback = 41,
    TimestampGeneration = 42,
    EgressTimestampEvents = 43,
    EthernetMode = 44,
    Autoneg = 45,
    AutonegBasePage = 46,
    AutonegNextPages = 47,
    AutonegLinkInhibitTimer = 48,
    AutonegLinkInhibitTimerKx = 49,
    Speed = 50,
    LinkState = 51,
    AutonegPartnerBasePage = 52,
    AutonegPartnerNextPages = 53,
    Autoneg25gNextPageOui = 54,
    EeeMode = 55,
    TxLpiTimeout = 56,
    RxCutThrough = 57,
    TxCutThrough = 58,
    TxClkCompensation = 59,
    LinkOptimization = 60,
    SmpLosslessPause = 61,
    EeeState = 62,
    PcieLinkWidth = 63,
    PcieLinkSpeed = 64,
    LanePolarity = 65,
    RxTermination = 66,
    DfeMode = 67,
    TxLaneCursor = 68,
    TxLanePreCursor = 69,
    TxLanePostCursor = 70,
    TxLaneEnaKrInitCfg = 71,
    TxLaneKrInitCursor = 72,
    TxLaneKrInitPreCursor = 73,
    TxLaneKrInitPostCursor = 74,
    BistUserPatternLow40 = 75,
    BistUserPatternHigh40 = 76,
    SignalThreshold = 77,
    SerdesLoopback = 78,
    EyeScore = 79,
}

impl fmt::Display for AttrId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self:?}")
    }
}

impl From<AttrId> for u32 {
    fn from(id: AttrId) -> Self {
        id as u32
    }
}

impl TryFrom<u32> for AttrId {
    type Error = AttrError;

    fn try_from(id: u32) -> AttrResult<Self> {
        AttrId::from_repr(id).ok_or(AttrError::InvalidAttribute(id))
    }
}

/// A compact set of cardinal ports, as held in the switch's per-port
/// forwarding masks.
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
pub struct PortMask(pub u128);

impl PortMask {
    /// The largest number of cardinal ports a mask can describe.
    pub const CAPACITY: usize = 128;

    /// A mask containing the first `count` cardinal ports.
    pub fn all(count: usize) -> Self {
        if count >= Self::CAPACITY {
            PortMask(u128::MAX)
        } else {
            PortMask((1u128 << count) - 1)
        }
    }

    pub fn contains(&self, cardinal: usize) -> bool {
        cardinal < Self::CAPACITY && self.0 & (1u128 << cardinal) != 0
    }

    /// Build a mask from an array of per-port flags.  Returns `None` if a
    /// flag is set beyond the capacity of the mask.
    pub fn from_bits(bits: &[bool]) -> Option<Self> {
        let mut mask = 0u128;
        for (idx, _) in bits.iter().enumerate().filter(|(_, set)| **set) {
            if idx >= Self::CAPACITY {
                return None;
            }
            mask |= 1u128 << idx;
        }
        Some(PortMask(mask))
    }

    /// Expand the mask into an array of `count` per-port flags.
    pub fn to_bits(&self, count: usize) -> Vec<bool> {
        (0..count).map(|idx| self.contains(idx)).collect()
    }

    pub fn low(&self) -> u64 {
        self.0 as u64
    }

    pub fn high(&self) -> u64 {
        (self.0 >> 64) as u64
    }
}

/// The type of an attribute's value as seen by callers.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum DataType {
    Bool,
    U32,
    I32,
    U64,
    U64List,
    BitArray,
    PortMask,
    IslTagFormat,
    Parser,
    Dot1xState,
    SecurityAction,
    TxFcsMode,
    Loopback,
    EthMode,
    AnMode,
    LanePolarity,
    RxTermination,
    DfeMode,
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self:?}")
    }
}

/// An attribute value.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum AttrValue {
    Bool(bool),
    U32(u32),
    I32(i32),
    U64(u64),
    U64List(Vec<u64>),
    /// One flag per cardinal port
    BitArray(Vec<bool>),
    PortMask(PortMask),
    IslTagFormat(IslTagFormat),
    Parser(ParserMode),
    Dot1xState(Dot1xState),
    SecurityAction(SecurityAction),
    TxFcsMode(TxFcsMode),
    Loopback(LoopbackMode),
    EthMode(EthMode),
    AnMode(AnMode),
    LanePolarity(LanePolarity),
    RxTermination(RxTermination),
    DfeMode(DfeMode),
}

impl AttrValue {
    pub fn data_type(&self) -> DataType {
        match self {
            AttrValue::Bool(_) => DataType::Bool,
            AttrValue::U32(_) => DataType::U32,
            AttrValue::I32(_) => DataType::I32,
            AttrValue::U64(_) => DataType::U64,
            AttrValue::U64List(_) => DataType::U64List,
            AttrValue::BitArray(_) => DataType::BitArray,
            AttrValue::PortMask(_) => DataType::PortMask,
            AttrValue::IslTagFormat(_) => DataType::IslTagFormat,
            AttrValue::Parser(_) => DataType::Parser,
            AttrValue::Dot1xState(_) => DataType::Dot1xState,
            AttrValue::SecurityAction(_) => DataType::SecurityAction,
            AttrValue::TxFcsMode(_) => DataType::TxFcsMode,
            AttrValue::Loopback(_) => DataType::Loopback,
            AttrValue::EthMode(_) => DataType::EthMode,
            AttrValue::AnMode(_) => DataType::AnMode,
            AttrValue::LanePolarity(_) => DataType::LanePolarity,
            AttrValue::RxTermination(_) => DataType::RxTermination,
            AttrValue::DfeMode(_) => DataType::DfeMode,
        }
    }

    /// The encoding of a scalar value in a single register field.  Lists and
    /// port sets have no single-field encoding.
    pub fn reg_value(&self) -> Option<u64> {
        Some(match self {
            AttrValue::Bool(b) => *b as u64,
            AttrValue::U32(v) => *v as u64,
            AttrValue::I32(v) => *v as u32 as u64,
            AttrValue::U64(v) => *v,
            AttrValue::IslTagFormat(v) => *v as u64,
            AttrValue::Parser(v) => *v as u64,
            AttrValue::Dot1xState(v) => *v as u64,
            AttrValue::SecurityAction(v) => *v as u64,
            AttrValue::TxFcsMode(v) => *v as u64,
            AttrValue::Loopback(v) => *v as u64,
            AttrValue::EthMode(v) => *v as u64,
            AttrValue::AnMode(v) => *v as u64,
            AttrValue::LanePolarity(v) => *v as u64,
            AttrValue::RxTermination(v) => *v as u64,
            AttrValue::DfeMode(v) => *v as u64,
            AttrValue::U64List(_)
            | AttrValue::BitArray(_)
            | AttrValue::PortMask(_) => return None,
        })
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            AttrValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_u32(&self) -> Option<u32> {
        match self {
            AttrValue::U32(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_u64(&self) -> Option<u64> {
        match self {
            AttrValue::U64(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_eth_mode(&self) -> Option<EthMode> {
        match self {
            AttrValue::EthMode(m) => Some(*m),
            _ => None,
        }
    }

    pub fn as_an_mode(&self) -> Option<AnMode> {
        match self {
            AttrValue::AnMode(m) => Some(*m),
            _ => None,
        }
    }
}

impl fmt::Display for AttrValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttrValue::Bool(b) => write!(f, "{b}"),
            AttrValue::U32(v) => write!(f, "{v}"),
            AttrValue::I32(v) => write!(f, "{v}"),
            AttrValue::U64(v) => write!(f, "{v:#x}"),
            AttrValue::U64List(v) => write!(f, "{v:x?}"),
            AttrValue::BitArray(bits) => {
                let set = bits.iter().filter(|b| **b).count();
                write!(f, "{set}/{} ports", bits.len())
            }
            AttrValue::PortMask(m) => write!(f, "{:#x}", m.0),
            AttrValue::IslTagFormat(v) => write!(f, "{v}"),
            AttrValue::Parser(v) => write!(f, "{v}"),
            AttrValue::Dot1xState(v) => write!(f, "{v}"),
            AttrValue::SecurityAction(v) => write!(f, "{v}"),
            AttrValue::TxFcsMode(v) => write!(f, "{v}"),
            AttrValue::Loopback(v) => write!(f, "{v}"),
            AttrValue::EthMode(v) => write!(f, "{v}"),
            AttrValue::AnMode(v) => write!(f, "{v}"),
            AttrValue::LanePolarity(v) => write!(f, "{v}"),
            AttrValue::RxTermination(v) => write!(f, "{v}"),
            AttrValue::DfeMode(v) => write!(f, "{v}"),
        }
    }
}

macro_rules! value_from {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl From<$ty> for AttrValue {
                fn from(v: $ty) -> Self {
                    AttrValue::$variant(v)
                }
            }
        )*
    };
}

value_from! {
    bool => Bool,
    u32 => U32,
    i32 => I32,
    u64 => U64,
    Vec<u64> => U64List,
    Vec<bool> => BitArray,
    PortMask => PortMask,
    IslTagFormat => IslTagFormat,
    ParserMode => Parser,
    Dot1xState => Dot1xState,
    SecurityAction => SecurityAction,
    TxFcsMode => TxFcsMode,
    LoopbackMode => Loopback,
    EthMode => EthMode,
    AnMode => AnMode,
    LanePolarity => LanePolarity,
    RxTermination => RxTermination,
    DfeMode => DfeMode,
}

/// Which storage block holds an attribute.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum StorageClass {
    /// The common per-port or per-lane block
    Generic,
    /// The chip-specific extension block
    Extension,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Scope {
    Port,
    Lane,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Access {
    ReadWrite,
    ReadOnly,
}

/// A set of physical sub-types.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct SubTypeMask(u8);

impl SubTypeMask {
    pub const NONE: SubTypeMask = SubTypeMask(0);

    pub const fn of(sub_types: &[PhysSubType]) -> Self {
        let mut mask = 0;
        let mut i = 0;
        while i < sub_types.len() {
            mask |= sub_types[i].bit();
            i += 1;
        }
        SubTypeMask(mask)
    }

    pub fn contains(&self, sub_type: PhysSubType) -> bool {
        self.0 & sub_type.bit() != 0
    }
}

impl BitOr for SubTypeMask {
    type Output = SubTypeMask;

    fn bitor(self, rhs: Self) -> Self {
        SubTypeMask(self.0 | rhs.0)
    }
}

/// Everything known about one attribute.  Descriptors are built once and
/// never change.
pub struct AttributeDescriptor {
    pub id: AttrId,
    pub class: StorageClass,
    pub scope: Scope,
    /// The type callers pass and receive
    pub data_type: DataType,
    pub access: Access,
    /// Managed on the LAG port and pushed to every member
    pub per_lag: bool,
    /// Index of the value slot within the (scope, class) block
    pub slot: usize,
    /// Sub-types on which the attribute cannot be read
    pub exclude_read: SubTypeMask,
    /// Sub-types on which the attribute cannot be written
    pub exclude_write: SubTypeMask,
    /// Stored value for a newly created port or lane
    pub default: AttrValue,
    pub(crate) handler: Box<dyn AttrHandler>,
}

impl AttributeDescriptor {
    pub fn is_read_only(&self) -> bool {
        self.access == Access::ReadOnly
    }

    pub fn excluded(&self, sub_type: PhysSubType, write: bool) -> bool {
        if write {
            self.exclude_write.contains(sub_type)
        } else {
            self.exclude_read.contains(sub_type)
        }
    }
}

impl fmt::Debug for AttributeDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AttributeDescriptor")
            .field("id", &self.id)
            .field("class", &self.class)
            .field("scope", &self.scope)
            .field("data_type", &self.data_type)
            .field("access", &self.access)
            .field("per_lag", &self.per_lag)
            .field("slot", &self.slot)
            .field("default", &self.default)
            .finish_non_exhaustive()
    }
}
