// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/
//
// Copyright 2025 Oxide Computer Company

//! Configuration for the attribute engine.

use std::collections::BTreeSet;
use std::path::Path;

use aal::{LaneId, LogicalPort};
use anyhow::{anyhow, bail, Context};
use common::logging::LogConfig;
use common::ports::LANES_PER_EPL;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// A port to create when the engine starts.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PortSpec {
    /// An Ethernet port on one channel of an EPL
    Epl {
        port: u32,
        epl: u8,
        channel: u8,
        /// Drive the port with the stub state machine
        #[serde(default)]
        stub: bool,
    },
    Pcie {
        port: u32,
        index: u8,
        /// The SerDes lane carrying the PCIe link, if it is on an EPL
        #[serde(default)]
        serdes: Option<LaneId>,
    },
    Cpu {
        port: u32,
    },
    Te {
        port: u32,
        index: u8,
    },
    Loopback {
        port: u32,
        index: u8,
    },
    Pti {
        port: u32,
        index: u8,
    },
    Virtual {
        port: u32,
    },
    Special {
        port: u32,
    },
}

impl PortSpec {
    pub fn port(&self) -> LogicalPort {
        let raw = match self {
            PortSpec::Epl { port, .. }
            | PortSpec::Pcie { port, .. }
            | PortSpec::Cpu { port }
            | PortSpec::Te { port, .. }
            | PortSpec::Loopback { port, .. }
            | PortSpec::Pti { port, .. }
            | PortSpec::Virtual { port }
            | PortSpec::Special { port } => *port,
        };
        LogicalPort(raw)
    }

    /// Whether the port takes a slot in the switch's per-port tables.
    pub fn is_cardinal(&self) -> bool {
        !matches!(self, PortSpec::Virtual { .. } | PortSpec::Special { .. })
    }
}

#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema)]
#[serde(default)]
pub struct EngineConfig {
    /// Whether LAGs own their members' per-lag attributes.
    pub per_lag_management: bool,
    /// Record every state machine transition in the backend's history.
    pub fsm_history: bool,
    /// Size of the switch's per-port tables.
    pub cardinal_ports: usize,
    /// Logical port number of LAG 0.  LAG n is `lag_port_base + n`.
    pub lag_port_base: u32,
    /// How many times to poll a lane's PLL after it is configured.
    pub pll_poll_limit: u32,
    pub log: LogConfig,
    pub asic: asic::AsicConfig,
    pub ports: Vec<PortSpec>,
}

/// The port map of a switch with a CPU port, four EPLs, two PCIe ports and
/// one port of each internal kind.
fn default_ports() -> Vec<PortSpec> {
    let mut ports = vec![PortSpec::Cpu { port: 0 }];
    ports.extend((1..=16).map(|port| PortSpec::Epl {
        port,
        epl: ((port - 1) / LANES_PER_EPL as u32) as u8,
        channel: ((port - 1) % LANES_PER_EPL as u32) as u8,
        stub: false,
    }));
    ports.extend([
        PortSpec::Pcie {
            port: 17,
            index: 0,
            serdes: None,
        },
        PortSpec::Pcie {
            port: 18,
            index: 1,
            serdes: None,
        },
        PortSpec::Te { port: 19, index: 0 },
        PortSpec::Loopback { port: 20, index: 0 },
        PortSpec::Pti { port: 21, index: 0 },
        PortSpec::Virtual { port: 22 },
        PortSpec::Special { port: 23 },
    ]);
    ports
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            per_lag_management: true,
            fsm_history: false,
            cardinal_ports: 48,
            lag_port_base: 1024,
            pll_poll_limit: 16,
            log: LogConfig::default(),
            asic: asic::AsicConfig::default(),
            ports: default_ports(),
        }
    }
}

impl EngineConfig {
    pub fn from_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let txt = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        let config: EngineConfig = toml::from_str(&txt)
            .with_context(|| format!("parsing {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    /// Check the port map for collisions.
    pub fn validate(&self) -> anyhow::Result<()> {
        let mut seen = BTreeSet::new();
        let mut lanes = BTreeSet::new();
        for spec in &self.ports {
            let port = spec.port();
            if !seen.insert(port) {
                bail!("{port} is configured more than once");
            }
            if port.0 >= self.lag_port_base {
                bail!(
                    "{port} collides with the LAG range starting at {}",
                    self.lag_port_base
                );
            }
            let lane = match spec {
                PortSpec::Epl { epl, channel, .. } => {
                    Some(LaneId::new(*epl, *channel))
                }
                PortSpec::Pcie { serdes, .. } => *serdes,
                _ => None,
            };
            if let Some(lane) = lane {
                if lane.channel >= LANES_PER_EPL {
                    bail!("{port}: {lane} is not a valid lane");
                }
                if !lanes.insert(lane) {
                    bail!("{port}: {lane} is already in use");
                }
            }
        }

        let cardinal = self.ports.iter().filter(|p| p.is_cardinal()).count();
        if cardinal > self.cardinal_ports {
            return Err(anyhow!(
                "{cardinal} ports need a table slot but only {} exist",
                self.cardinal_ports
            ));
        }
        Ok(())
    }
}
