// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/
//
// Copyright 2025 Oxide Computer Company

//! Deterministic fault injection for the simulated backend.  A fault is armed
//! at a named point to let a number of calls through and then fail a number
//! of calls with [`AsicError::Synthetic`].

use std::collections::BTreeMap;
use std::sync::Mutex;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use slog::Logger;

use aal::{AsicError, AsicResult};

/// Places in the backend where a fault can be injected.
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
)]
#[serde(rename_all = "snake_case")]
pub enum FaultPoint {
    RegisterRead,
    RegisterWrite,
    SerdesSet,
    FsmStart,
    FsmNotify,
    FsmStop,
}

/// An armed fault: pass `skip` calls, then fail the next `count`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct FaultPlan {
    pub skip: u32,
    pub count: u32,
}

#[derive(Debug, Default)]
pub struct Faults(Mutex<BTreeMap<FaultPoint, FaultPlan>>);

impl Faults {
    pub fn new() -> Self {
        Self::default()
    }

    /// Arm a fault at `point`, replacing any fault already armed there.
    pub fn arm(&self, point: FaultPoint, skip: u32, count: u32) {
        let mut plans = self.0.lock().unwrap();
        plans.insert(point, FaultPlan { skip, count });
    }

    /// Fail the very next call through `point`.
    pub fn fail_next(&self, point: FaultPoint) {
        self.arm(point, 0, 1)
    }

    pub fn clear(&self) {
        self.0.lock().unwrap().clear();
    }

    /// Returns an error if a fault armed at this point is due.
    pub fn check(
        &self,
        log: &Logger,
        point: FaultPoint,
        message: &str,
    ) -> AsicResult<()> {
        let mut plans = self.0.lock().unwrap();
        let Some(plan) = plans.get_mut(&point) else {
            return Ok(());
        };
        if plan.count == 0 {
            plans.remove(&point);
            return Ok(());
        }
        if plan.skip > 0 {
            plan.skip -= 1;
            return Ok(());
        }
        plan.count -= 1;
        if plan.count == 0 {
            plans.remove(&point);
        }
        slog::error!(log, "injected fault: {}", message; "point" => ?point);
        Err(AsicError::Synthetic(message.into()))
    }
}
