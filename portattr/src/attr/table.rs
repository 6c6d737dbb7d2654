// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/
//
// Copyright 2025 Oxide Computer Company

use std::collections::BTreeMap;

use aal::{BistHalf, Cursor, RegBlock};
use common::ports::{
    AnMode, DfeMode, Dot1xState, EthMode, IslTagFormat, LanePolarity,
    LoopbackMode, ParserMode, PhysSubType, RxTermination, SecurityAction,
    TxFcsMode,
};
use lazy_static::lazy_static;

use super::handlers::*;
use super::*;

const EPL_ONLY: SubTypeMask = SubTypeMask::of(&[
    PhysSubType::Pcie,
    PhysSubType::Te,
    PhysSubType::Loopback,
    PhysSubType::Pti,
]);
const PCIE_ONLY: SubTypeMask = SubTypeMask::of(&[
    PhysSubType::Epl,
    PhysSubType::Te,
    PhysSubType::Loopback,
    PhysSubType::Pti,
]);
const MAC_ONLY: SubTypeMask = SubTypeMask::of(&[
    PhysSubType::Te,
    PhysSubType::Loopback,
    PhysSubType::Pti,
]);
const PCIE: SubTypeMask = SubTypeMask::of(&[PhysSubType::Pcie]);

struct Def {
    id: AttrId,
    class: StorageClass,
    scope: Scope,
    data_type: DataType,
    access: Access,
    per_lag: bool,
    exclude_read: SubTypeMask,
    exclude_write: SubTypeMask,
    default: AttrValue,
    handler: Box<dyn AttrHandler>,
}

fn attr(
    id: AttrId,
    default: impl Into<AttrValue>,
    handler: impl AttrHandler + 'static,
) -> Def {
    let default = default.into();
    Def {
        id,
        class: StorageClass::Generic,
        scope: Scope::Port,
        data_type: default.data_type(),
        access: Access::ReadWrite,
        per_lag: false,
        exclude_read: SubTypeMask::NONE,
        exclude_write: SubTypeMask::NONE,
        default,
        handler: Box::new(handler),
    }
}

impl Def {
    fn per_lag(mut self) -> Self {
        self.per_lag = true;
        self
    }

    fn ext(mut self) -> Self {
        self.class = StorageClass::Extension;
        self
    }

    fn lane(mut self) -> Self {
        self.scope = Scope::Lane;
        self.exclude(EPL_ONLY)
    }

    fn read_only(mut self) -> Self {
        self.access = Access::ReadOnly;
        self
    }

    fn exclude(mut self, mask: SubTypeMask) -> Self {
        self.exclude_read = self.exclude_read | mask;
        self.exclude_write = self.exclude_write | mask;
        self
    }

    fn exclude_write(mut self, mask: SubTypeMask) -> Self {
        self.exclude_write = self.exclude_write | mask;
        self
    }

    fn api_type(mut self, data_type: DataType) -> Self {
        self.data_type = data_type;
        self
    }
}

fn definitions() -> Vec<Def> {
    use AttrId as A;
    use RegBlock::{An, Eee, Fwd, Mac, Modify, Parser as Prs};

    vec![
        attr(A::MinFrameSize, 64u32, FrameSize::Min)
            .per_lag()
            .exclude_write(PCIE),
        attr(A::MaxFrameSize, 1536u32, FrameSize::Max)
            .per_lag()
            .exclude_write(PCIE),
        attr(A::IslTagFormat, IslTagFormat::None, Reg::any(Modify).frame_lengths())
            .per_lag(),
        attr(A::DefVlan, 1u32, Reg::range(Prs, 1, 4095)).per_lag(),
        attr(A::DefPri, 0u32, Reg::range(Prs, 0, 7)).per_lag(),
        attr(A::DefCfi, 0u32, Reg::range(Prs, 0, 1)).per_lag(),
        attr(A::DefDscp, 0u32, Reg::range(Prs, 0, 63)).per_lag(),
        attr(A::DefSwpri, 0u32, Reg::range(Prs, 0, 15)).per_lag(),
        attr(A::SwpriSource, 0u32, Reg::mask(Prs, 0x7)).per_lag(),
        attr(A::SwpriDscpPref, false, Reg::any(Prs)).per_lag(),
        attr(A::TxCfi, 0u32, Reg::range(Modify, 0, 2)),
        attr(A::Learning, true, Reg::any(Fwd)).per_lag(),
        attr(A::Tagging, false, Reg::any(Modify)).per_lag(),
        attr(A::DropBv, true, Reg::any(Fwd)).per_lag(),
        attr(A::DropTagged, false, Reg::any(Prs)).per_lag(),
        attr(A::DropUntagged, false, Reg::any(Prs)).per_lag(),
        attr(A::Dot1xState, Dot1xState::NotActive, Reg::any(Fwd)).per_lag(),
        attr(A::SecurityAction, SecurityAction::None, Reg::any(Fwd)).per_lag(),
        attr(A::LoopbackSuppression, true, Reg::any(Fwd)).per_lag(),
        attr(A::UcastFlooding, true, Reg::any(Fwd)).per_lag(),
        attr(A::McastFlooding, true, Reg::any(Fwd)).per_lag(),
        attr(A::BcastFlooding, true, Reg::any(Fwd)).per_lag(),
        attr(A::McastPruning, false, Reg::any(Fwd)).per_lag(),
        attr(A::Parser, ParserMode::L2, Reg::any(Prs)).per_lag(),
        attr(A::ParseMpls, false, Reg::any(Prs)).per_lag(),
        attr(A::Routable, false, Reg::any(Fwd)).per_lag(),
        attr(A::UpdateTtl, true, Reg::any(Modify)).per_lag(),
        attr(A::UpdateDscp, true, Reg::any(Modify)).per_lag(),
        attr(A::ReplaceDscp, false, Reg::any(Modify)).per_lag(),
        attr(A::MaskWide, PortMask::default(), MaskWideHandler)
            .per_lag()
            .api_type(DataType::BitArray),
        attr(A::Ifg, 12u32, Reg::range(Mac, 1, 255)).exclude(MAC_ONLY),
        attr(A::DicEnable, true, Reg::any(Mac)).exclude(MAC_ONLY),
        attr(A::TxPadSize, 64u32, Reg::range(Mac, 0, 255)).exclude(MAC_ONLY),
        attr(A::TxFcsMode, TxFcsMode::ReplaceGood, Reg::any(Mac))
            .exclude(MAC_ONLY),
        attr(A::TxPause, false, Reg::any(Mac)).exclude(MAC_ONLY),
        attr(A::RxPause, false, Reg::any(Mac)).exclude(MAC_ONLY),
        attr(A::TxPauseResendTime, 0xffffu32, Reg::range(Mac, 0, 0xffff))
            .exclude(MAC_ONLY),
        attr(A::TxClassPause, 0u32, Reg::mask(Mac, 0xff)).exclude(MAC_ONLY),
        attr(A::RxClassPause, 0u32, Reg::mask(Mac, 0xff)).exclude(MAC_ONLY),
        attr(A::LinkInterrupt, true, Reg::any(Mac)),
        attr(A::Loopback, LoopbackMode::Off, Reg::any(Mac)).exclude(EPL_ONLY),
        attr(A::FabricLoopback, false, Reg::any(Fwd)),
        attr(A::TimestampGeneration, false, Reg::any(Mac)).exclude(EPL_ONLY),
        attr(A::EgressTimestampEvents, false, Reg::any(Mac)).exclude(EPL_ONLY),
        attr(A::EthernetMode, EthMode::Disabled, EthernetModeHandler)
            .exclude(EPL_ONLY),
        attr(A::Autoneg, AnMode::None, AutonegModeHandler).exclude(EPL_ONLY),
        attr(A::AutonegBasePage, 0u64, AnPage::Base).exclude(EPL_ONLY),
        attr(A::AutonegNextPages, Vec::<u64>::new(), AnPage::NextPages)
            .exclude(EPL_ONLY),
        attr(A::AutonegLinkInhibitTimer, 0u32, Reg::range(An, 0, 511))
            .exclude(EPL_ONLY),
        attr(A::AutonegLinkInhibitTimerKx, 0u32, Reg::range(An, 0, 511))
            .exclude(EPL_ONLY),
        attr(A::Speed, 0u32, Live::Speed).read_only().exclude(EPL_ONLY),
        attr(A::LinkState, false, Live::LinkState)
            .read_only()
            .exclude(MAC_ONLY),
        attr(A::AutonegPartnerBasePage, 0u64, Live::PartnerBasePage)
            .read_only()
            .exclude(EPL_ONLY),
        attr(A::AutonegPartnerNextPages, Vec::<u64>::new(), Live::PartnerNextPages)
            .read_only()
            .exclude(EPL_ONLY),
        attr(A::Autoneg25gNextPageOui, 0x6a737du32, AnPage::Oui)
            .ext()
            .exclude(EPL_ONLY),
        attr(A::EeeMode, false, Reg::any(Eee)).ext().exclude(EPL_ONLY),
        attr(A::TxLpiTimeout, 100u32, Reg::range(Eee, 0, 4095))
            .ext()
            .exclude(EPL_ONLY),
        attr(A::RxCutThrough, false, Reg::any(Fwd).saf_matrix())
            .ext()
            .exclude(EPL_ONLY),
        attr(A::TxCutThrough, false, Reg::any(Fwd).saf_matrix())
            .ext()
            .exclude(EPL_ONLY),
        attr(A::TxClkCompensation, 100u32, Reg::range(Mac, 0, 10_000))
            .ext()
            .exclude(EPL_ONLY),
        attr(A::LinkOptimization, false, Reg::any(Mac)).ext().exclude(EPL_ONLY),
        attr(A::SmpLosslessPause, 0u32, Reg::mask(Mac, 0x3))
            .ext()
            .exclude(MAC_ONLY),
        attr(A::EeeState, 0u32, Live::EeeState)
            .ext()
            .read_only()
            .exclude(EPL_ONLY),
        attr(A::PcieLinkWidth, 0u32, Live::PcieLinkWidth)
            .ext()
            .read_only()
            .exclude(PCIE_ONLY),
        attr(A::PcieLinkSpeed, 0u32, Live::PcieLinkSpeed)
            .ext()
            .read_only()
            .exclude(PCIE_ONLY),
        attr(A::LanePolarity, LanePolarity::Normal, LaneCtl::Polarity).lane(),
        attr(A::RxTermination, RxTermination::High, LaneCtl::Termination).lane(),
        attr(A::DfeMode, DfeMode::Continuous, LaneCtl::Dfe).lane(),
        attr(A::TxLaneCursor, 0i32, LaneCtl::Cursor(Cursor::Main, 0, 63)).lane(),
        attr(A::TxLanePreCursor, 0i32, LaneCtl::Cursor(Cursor::Pre, -15, 15))
            .lane(),
        attr(A::TxLanePostCursor, 0i32, LaneCtl::Cursor(Cursor::Post, -31, 31))
            .lane(),
        attr(A::TxLaneEnaKrInitCfg, false, LaneCtl::KrInitCfg).lane(),
        attr(
            A::TxLaneKrInitCursor,
            0i32,
            LaneCtl::Cursor(Cursor::KrInitMain, 0, 63),
        )
        .lane(),
        attr(
            A::TxLaneKrInitPreCursor,
            0i32,
            LaneCtl::Cursor(Cursor::KrInitPre, -15, 15),
        )
        .lane(),
        attr(
            A::TxLaneKrInitPostCursor,
            0i32,
            LaneCtl::Cursor(Cursor::KrInitPost, -31, 31),
        )
        .lane(),
        attr(A::BistUserPatternLow40, 0u64, LaneCtl::Bist(BistHalf::Low)).lane(),
        attr(A::BistUserPatternHigh40, 0u64, LaneCtl::Bist(BistHalf::High))
            .lane(),
        attr(A::SignalThreshold, 0u32, LaneCtl::SignalThreshold(15)).lane(),
        attr(A::SerdesLoopback, false, LaneCtl::Loopback).lane(),
        attr(A::EyeScore, 0u32, Live::EyeScore).lane().read_only(),
    ]
}

/// The number of value slots in each storage block.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub(crate) struct SlotCounts {
    pub port_generic: usize,
    pub port_ext: usize,
    pub lane: usize,
}

struct AttrTable {
    descriptors: BTreeMap<AttrId, AttributeDescriptor>,
    slots: SlotCounts,
}

impl AttrTable {
    fn new() -> Self {
        let mut descriptors = BTreeMap::new();
        let mut slots = SlotCounts::default();

        for def in definitions() {
            let counter = match (def.scope, def.class) {
                (Scope::Port, StorageClass::Generic) => &mut slots.port_generic,
                (Scope::Port, StorageClass::Extension) => &mut slots.port_ext,
                (Scope::Lane, _) => &mut slots.lane,
            };
            let slot = *counter;
            *counter += 1;

            let desc = AttributeDescriptor {
                id: def.id,
                class: def.class,
                scope: def.scope,
                data_type: def.data_type,
                access: def.access,
                per_lag: def.per_lag,
                slot,
                exclude_read: def.exclude_read,
                exclude_write: def.exclude_write,
                default: def.default,
                handler: def.handler,
            };
            let prior = descriptors.insert(def.id, desc);
            assert!(prior.is_none(), "attribute {} defined twice", def.id);
        }
        AttrTable { descriptors, slots }
    }
}

lazy_static! {
    static ref TABLE: AttrTable = AttrTable::new();
}

/// Find the descriptor for a raw attribute id.
pub fn lookup(id: impl Into<u32>) -> AttrResult<&'static AttributeDescriptor> {
    let raw = id.into();
    let id = AttrId::try_from(raw)?;
    TABLE
        .descriptors
        .get(&id)
        .ok_or(AttrError::InvalidAttribute(raw))
}

/// Every descriptor, in id order.
pub(crate) fn descriptors() -> impl Iterator<Item = &'static AttributeDescriptor>
{
    TABLE.descriptors.values()
}

pub(crate) fn slot_counts() -> SlotCounts {
    TABLE.slots
}
