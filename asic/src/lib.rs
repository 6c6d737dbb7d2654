// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/
//
// Copyright 2025 Oxide Computer Company

#[cfg(not(feature = "stub"))]
compile_error! {"must set the stub feature"}

use std::collections::BTreeMap;

use aal::SmState;

// No hardware backend is wired up yet, so every backend drives its ports and
// lanes with the simulated state machines.
mod faux_fsm;
pub use faux_fsm::FsmRecord;

pub mod faults;

/// A collections of counters reflecting the number of times each
/// FSM state was entered.
#[derive(Debug, Clone)]
pub struct FsmStats(BTreeMap<SmState, u32>);

impl FsmStats {
    /// Return an empty set of counters
    pub fn new() -> Self {
        FsmStats(BTreeMap::new())
    }

    /// Returns the counter for a single state.
    pub fn get(&self, state: SmState) -> u32 {
        *self.0.get(&state).unwrap_or(&0)
    }

    /// Increases the counter for a single state by 1.
    pub fn bump(&mut self, state: SmState) {
        self.0
            .entry(state)
            .and_modify(|count| *count += 1)
            .or_insert(1);
    }

    /// Returns the states that have been entered at least once.
    pub fn states(&self) -> Vec<SmState> {
        self.0.keys().cloned().collect()
    }
}

impl Default for FsmStats {
    fn default() -> Self {
        Self::new()
    }
}

cfg_if::cfg_if! {
    if #[cfg(feature = "stub")] {
        pub mod stub;
        mod plat {
            pub use super::stub::AsicConfig;
            pub use super::stub::StubHandle as Handle;
        }
    }
}

pub use plat::AsicConfig;
pub use plat::Handle;
