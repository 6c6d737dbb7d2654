// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/
//
// Copyright 2025 Oxide Computer Company

use std::collections::BTreeMap;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use slog::{debug, error, warn};

use aal::{
    AsicError, AsicResult, DfeSmType, LaneSmType, LogicalPort, PortSmType,
    SmEvent, SmEventId, SmEventPayload, SmState, SmSubject, SmVariant,
    StateMachine,
};
use common::ports::{AnMode, EthMode};

use crate::faults::{FaultPoint, Faults};
use crate::FsmStats;

/// Oldest records are discarded once the history holds this many.
const HISTORY_LIMIT: usize = 4096;

/// A single entry in the transition history.  Starting and stopping an
/// instance are recorded with no event.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FsmRecord {
    pub timestamp: DateTime<Utc>,
    pub subject: SmSubject,
    pub variant: SmVariant,
    pub event: Option<SmEventId>,
    pub from: SmState,
    pub to: SmState,
}

/// State shared by every simulated state machine started by a single handle.
pub(crate) struct FsmShared {
    log: slog::Logger,
    history: Mutex<VecDeque<FsmRecord>>,
    stats: Mutex<BTreeMap<SmSubject, FsmStats>>,
    events_after_stop: AtomicU64,
    // The mode each port's simulated link partner will settle on when
    // autonegotiation runs.
    partners: Mutex<BTreeMap<LogicalPort, EthMode>>,
    faults: Arc<Faults>,
}

impl FsmShared {
    pub fn new(log: slog::Logger, faults: Arc<Faults>) -> Self {
        FsmShared {
            log,
            history: Mutex::new(VecDeque::new()),
            stats: Mutex::new(BTreeMap::new()),
            events_after_stop: AtomicU64::new(0),
            partners: Mutex::new(BTreeMap::new()),
            faults,
        }
    }

    fn record(&self, record: FsmRecord) {
        let mut history = self.history.lock().unwrap();
        if history.len() == HISTORY_LIMIT {
            history.pop_front();
        }
        history.push_back(record);
    }

    fn bump(&self, subject: SmSubject, state: SmState) {
        let mut stats = self.stats.lock().unwrap();
        stats.entry(subject).or_default().bump(state);
    }

    pub fn history(&self) -> Vec<FsmRecord> {
        self.history.lock().unwrap().iter().cloned().collect()
    }

    pub fn stats(&self, subject: SmSubject) -> FsmStats {
        let stats = self.stats.lock().unwrap();
        stats.get(&subject).cloned().unwrap_or_default()
    }

    pub fn events_after_stop(&self) -> u64 {
        self.events_after_stop.load(Ordering::Relaxed)
    }

    pub fn set_partner(&self, port: LogicalPort, mode: Option<EthMode>) {
        let mut partners = self.partners.lock().unwrap();
        match mode {
            Some(m) => partners.insert(port, m),
            None => partners.remove(&port),
        };
    }

    fn partner(&self, port: LogicalPort) -> Option<EthMode> {
        self.partners.lock().unwrap().get(&port).copied()
    }
}

/// Links in the stub backend don't have a real state machine underlying
/// them.  Each instance emulates just enough of its variant's transition
/// table to exercise the engine: which events a variant accepts, and the
/// coarse state it settles in.
pub(crate) struct FauxFsm {
    subject: SmSubject,
    variant: SmVariant,
    state: SmState,
    admin_up: bool,
    eth_mode: EthMode,
    an_mode: AnMode,
    negotiated: Option<EthMode>,
    stopped: bool,
    history: bool,
    shared: Arc<FsmShared>,
}

impl FauxFsm {
    pub fn start(
        shared: Arc<FsmShared>,
        subject: SmSubject,
        variant: SmVariant,
        initial: SmState,
        history: bool,
    ) -> AsicResult<Self> {
        let unspecified = matches!(
            variant,
            SmVariant::Port(PortSmType::Unspecified)
                | SmVariant::Lane(LaneSmType::Unspecified)
                | SmVariant::Dfe(DfeSmType::Unspecified)
        );
        let consistent = matches!(
            (subject, variant),
            (SmSubject::Port(_), SmVariant::Port(_))
                | (SmSubject::Lane(_), SmVariant::Lane(_))
                | (SmSubject::Dfe(_), SmVariant::Dfe(_))
        );
        if unspecified || !consistent {
            return Err(AsicError::InvalidArg(format!(
                "cannot start {variant} for {subject}"
            )));
        }
        if initial == SmState::Stopped {
            return Err(AsicError::InvalidArg(
                "cannot start in the stopped state".into(),
            ));
        }
        shared.faults.check(
            &shared.log,
            FaultPoint::FsmStart,
            &format!("start {variant} for {subject}"),
        )?;

        debug!(shared.log, "starting {} for {}", variant, subject);
        let fsm = FauxFsm {
            subject,
            variant,
            state: initial,
            admin_up: false,
            eth_mode: EthMode::Disabled,
            an_mode: AnMode::None,
            negotiated: None,
            stopped: false,
            history,
            shared,
        };
        fsm.shared.bump(subject, initial);
        if history {
            fsm.record(None, initial, initial);
        }
        Ok(fsm)
    }

    fn record(&self, event: Option<SmEventId>, from: SmState, to: SmState) {
        self.shared.record(FsmRecord {
            timestamp: Utc::now(),
            subject: self.subject,
            variant: self.variant,
            event,
            from,
            to,
        });
    }

    fn invalid(&self, event: SmEventId) -> AsicError {
        AsicError::InvalidEvent {
            fsm: format!("{} ({})", self.subject, self.variant),
            event: event.to_string(),
            state: self.state.to_string(),
        }
    }

    // The state a port settles in once it is administratively up.
    fn port_up_state(&mut self) -> SmState {
        if !self.eth_mode.is_enabled() {
            return SmState::Disabled;
        }
        if self.variant != SmVariant::Port(PortSmType::Autoneg)
            || self.an_mode == AnMode::None
        {
            return SmState::LinkUp;
        }
        let SmSubject::Port(port) = self.subject else {
            return SmState::AnWait;
        };
        match self.shared.partner(port) {
            Some(mode) => {
                self.negotiated = Some(mode);
                SmState::LinkUp
            }
            None => {
                self.negotiated = None;
                SmState::AnWait
            }
        }
    }

    fn port_idle_state(&self) -> SmState {
        if self.eth_mode.is_enabled() {
            SmState::Configured
        } else {
            SmState::Disabled
        }
    }

    fn next_port_state(
        &mut self,
        sm_type: PortSmType,
        event: &SmEvent,
    ) -> AsicResult<SmState> {
        let id = event.id;
        match (sm_type, id) {
            (_, SmEventId::Disable) => {
                self.admin_up = false;
                self.negotiated = None;
                Ok(SmState::Disabled)
            }
            (_, SmEventId::PowerDown) => {
                self.admin_up = false;
                self.negotiated = None;
                Ok(SmState::PowerDown)
            }
            (PortSmType::Stub, _) => Ok(match id {
                SmEventId::AdminUp => SmState::LinkUp,
                SmEventId::AdminDown => SmState::Disabled,
                SmEventId::Config => SmState::Configured,
                _ => self.state,
            }),
            (PortSmType::Pcie, SmEventId::AdminUp) => {
                self.admin_up = true;
                Ok(SmState::LinkUp)
            }
            (PortSmType::Pcie, SmEventId::AdminDown) => {
                self.admin_up = false;
                Ok(SmState::Configured)
            }
            (PortSmType::Basic | PortSmType::Autoneg, SmEventId::Config) => {
                let SmEventPayload::Config {
                    eth_mode, an_mode, ..
                } = &event.payload
                else {
                    return Err(AsicError::InvalidArg(
                        "config event without a configuration".into(),
                    ));
                };
                self.eth_mode = *eth_mode;
                self.an_mode = *an_mode;
                self.negotiated = None;
                if self.admin_up {
                    Ok(self.port_up_state())
                } else {
                    Ok(self.port_idle_state())
                }
            }
            (PortSmType::Autoneg, SmEventId::AnConfig) => {
                if !matches!(event.payload, SmEventPayload::AnConfig { .. }) {
                    return Err(AsicError::InvalidArg(
                        "AN config event without pages".into(),
                    ));
                }
                // New pages restart any negotiation already under way
                match self.state {
                    SmState::AnWait | SmState::LinkUp => {
                        Ok(self.port_up_state())
                    }
                    state => Ok(state),
                }
            }
            (PortSmType::Basic | PortSmType::Autoneg, SmEventId::AdminUp) => {
                self.admin_up = true;
                Ok(self.port_up_state())
            }
            (
                PortSmType::Basic | PortSmType::Autoneg,
                SmEventId::AdminDown,
            ) => {
                self.admin_up = false;
                self.negotiated = None;
                Ok(self.port_idle_state())
            }
            _ => Err(self.invalid(id)),
        }
    }

    fn next_lane_state(
        &mut self,
        sm_type: LaneSmType,
        id: SmEventId,
    ) -> AsicResult<SmState> {
        let configured =
            matches!(self.state, SmState::Configured | SmState::LinkUp);
        match (sm_type, id) {
            (_, SmEventId::Disable) => Ok(SmState::Disabled),
            (_, SmEventId::PowerDown) => Ok(SmState::PowerDown),
            (_, SmEventId::LaneConfig) => Ok(SmState::Configured),
            (_, SmEventId::AdminUp) if configured => Ok(SmState::LinkUp),
            (_, SmEventId::AdminUp) => Ok(self.state),
            (_, SmEventId::AdminDown) if configured => Ok(SmState::Configured),
            (_, SmEventId::AdminDown) => Ok(SmState::Disabled),
            (LaneSmType::Stub, _) => Ok(self.state),
            _ => Err(self.invalid(id)),
        }
    }

    fn next_dfe_state(&self, id: SmEventId) -> AsicResult<SmState> {
        match id {
            SmEventId::Disable | SmEventId::DfeStop => Ok(SmState::Disabled),
            SmEventId::DfeStart => Ok(SmState::DfeTuning),
            _ => Err(self.invalid(id)),
        }
    }
}

impl StateMachine for FauxFsm {
    fn subject(&self) -> SmSubject {
        self.subject
    }

    fn variant(&self) -> SmVariant {
        self.variant
    }

    fn state(&self) -> SmState {
        self.state
    }

    fn notify(&mut self, event: &SmEvent) -> AsicResult<()> {
        if self.stopped {
            self.shared.events_after_stop.fetch_add(1, Ordering::Relaxed);
            error!(self.shared.log, "{} delivered to stopped fsm", event.id;
                "subject" => %self.subject,
                "variant" => %self.variant);
            return Err(AsicError::FsmStopped(self.subject.to_string()));
        }
        self.shared.faults.check(
            &self.shared.log,
            FaultPoint::FsmNotify,
            &format!("{} to {}", event.id, self.subject),
        )?;
        if event.variant != self.variant {
            return Err(AsicError::InvalidArg(format!(
                "{} event for {} delivered to {}",
                event.id, event.variant, self.variant
            )));
        }

        let from = self.state;
        let to = match self.variant {
            SmVariant::Port(t) => self.next_port_state(t, event)?,
            SmVariant::Lane(t) => self.next_lane_state(t, event.id)?,
            SmVariant::Dfe(_) => self.next_dfe_state(event.id)?,
        };
        self.state = to;
        if to != from {
            self.shared.bump(self.subject, to);
        }
        if self.history || event.history {
            self.record(Some(event.id), from, to);
        }
        Ok(())
    }

    fn stop(&mut self) -> AsicResult<()> {
        if self.stopped {
            return Err(AsicError::FsmStopped(self.subject.to_string()));
        }
        self.shared.faults.check(
            &self.shared.log,
            FaultPoint::FsmStop,
            &format!("stop {}", self.subject),
        )?;
        let from = self.state;
        self.stopped = true;
        self.state = SmState::Stopped;
        self.negotiated = None;
        if self.history {
            self.record(None, from, SmState::Stopped);
        }
        debug!(self.shared.log, "stopped {} for {}", self.variant, self.subject);
        Ok(())
    }

    fn negotiated_mode(&self) -> Option<EthMode> {
        self.negotiated
    }
}

impl Drop for FauxFsm {
    fn drop(&mut self) {
        if !self.stopped {
            warn!(self.shared.log, "dropping running fsm";
                "subject" => %self.subject,
                "variant" => %self.variant);
        }
    }
}
