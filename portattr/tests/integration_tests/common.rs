// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/
//
// Copyright 2025 Oxide Computer Company

use aal::{LogicalPort, PortUpdate};
use portattr::{EngineConfig, PortAttrEngine};
use slog::Drain;
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver};

/// Ports in the default port map.
pub const CPU: LogicalPort = LogicalPort(0);
pub const EPL0_0: LogicalPort = LogicalPort(1);
pub const EPL0_1: LogicalPort = LogicalPort(2);
pub const EPL0_2: LogicalPort = LogicalPort(3);
pub const EPL0_3: LogicalPort = LogicalPort(4);
pub const EPL1_0: LogicalPort = LogicalPort(5);
pub const PCIE0: LogicalPort = LogicalPort(17);
pub const TE: LogicalPort = LogicalPort(19);

fn test_logger(name: &'static str) -> slog::Logger {
    let decorator = slog_term::PlainSyncDecorator::new(slog_term::TestStdoutWriter);
    let drain = slog_term::FullFormat::new(decorator).build().fuse();
    slog::Logger::root(drain, slog::o!("test" => name))
}

pub fn engine_with(
    name: &'static str,
    config: EngineConfig,
) -> (PortAttrEngine, UnboundedReceiver<PortUpdate>) {
    let log = test_logger(name);
    let hdl = asic::Handle::new(&log, &config.asic).unwrap();
    let engine = PortAttrEngine::new(&log, &config, hdl).unwrap();
    let (tx, rx) = unbounded_channel();
    engine.register_port_update_handler(tx);
    (engine, rx)
}

/// An engine over the default port map, with state machine history enabled.
pub fn engine(
    name: &'static str,
) -> (PortAttrEngine, UnboundedReceiver<PortUpdate>) {
    let config = EngineConfig {
        fsm_history: true,
        ..Default::default()
    };
    engine_with(name, config)
}

/// Every update delivered so far.
pub fn drain(rx: &mut UnboundedReceiver<PortUpdate>) -> Vec<PortUpdate> {
    let mut updates = Vec::new();
    while let Ok(update) = rx.try_recv() {
        updates.push(update);
    }
    updates
}
