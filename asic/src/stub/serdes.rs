// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/
//
// Copyright 2025 Oxide Computer Company

use std::collections::BTreeMap;
use std::sync::Mutex;

use aal::{BistHalf, Cursor, LaneId};
use common::ports::{DfeMode, RxTermination};

/// The simulated analog and firmware state of a single SerDes lane.
#[derive(Clone, Debug)]
pub struct LaneModel {
    pub dfe_mode: DfeMode,
    pub rx_inverted: bool,
    pub tx_inverted: bool,
    pub cursors: BTreeMap<Cursor, i32>,
    pub kr_init_cfg: bool,
    pub termination: RxTermination,
    pub bist: [u64; 2],
    pub signal_threshold: u32,
    pub loopback: bool,
    pub eye_score: u32,
    // Number of times the PLL has been polled since the lane was created
    pll_polls: u32,
}

impl LaneModel {
    fn new(eye_score: u32) -> Self {
        LaneModel {
            dfe_mode: DfeMode::default(),
            rx_inverted: false,
            tx_inverted: false,
            cursors: BTreeMap::new(),
            kr_init_cfg: false,
            termination: RxTermination::default(),
            bist: [0; 2],
            signal_threshold: 0,
            loopback: false,
            eye_score,
            pll_polls: 0,
        }
    }

    pub fn cursor(&self, cursor: Cursor) -> i32 {
        self.cursors.get(&cursor).copied().unwrap_or(0)
    }

    pub fn bist(&self, half: BistHalf) -> u64 {
        match half {
            BistHalf::Low => self.bist[0],
            BistHalf::High => self.bist[1],
        }
    }
}

/// All lanes of the simulated switch.  Lanes come into existence the first
/// time they are touched.
pub struct SerdesModel {
    lanes: Mutex<BTreeMap<LaneId, LaneModel>>,
    default_eye_score: u32,
    pll_lock_polls: Mutex<u32>,
}

impl SerdesModel {
    pub fn new(default_eye_score: u32, pll_lock_polls: u32) -> Self {
        SerdesModel {
            lanes: Mutex::new(BTreeMap::new()),
            default_eye_score,
            pll_lock_polls: Mutex::new(pll_lock_polls),
        }
    }

    /// Run `f` against the model of `lane`.
    pub fn with_lane<T>(
        &self,
        lane: LaneId,
        f: impl FnOnce(&mut LaneModel) -> T,
    ) -> T {
        let mut lanes = self.lanes.lock().unwrap();
        let model = lanes
            .entry(lane)
            .or_insert_with(|| LaneModel::new(self.default_eye_score));
        f(model)
    }

    pub fn set_pll_lock_polls(&self, polls: u32) {
        *self.pll_lock_polls.lock().unwrap() = polls;
    }

    /// The PLL reports lock once it has been polled often enough.
    pub fn poll_pll(&self, lane: LaneId) -> bool {
        let needed = *self.pll_lock_polls.lock().unwrap();
        self.with_lane(lane, |l| {
            l.pll_polls = l.pll_polls.saturating_add(1);
            l.pll_polls > needed
        })
    }

    /// The eye closes when the receiver is not adapting.
    pub fn eye_score(&self, lane: LaneId) -> u32 {
        self.with_lane(lane, |l| {
            if l.dfe_mode.is_adaptive() {
                l.eye_score
            } else {
                l.eye_score / 2
            }
        })
    }
}
