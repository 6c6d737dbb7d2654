// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/
//
// Copyright 2025 Oxide Computer Company

//! General types used throughout the attribute engine.

use std::convert;
use std::fmt;

use aal::{AsicError, LogicalPort};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

pub type AttrResult<T> = Result<T, AttrError>;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AttrError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
    #[error("Port {0} does not exist")]
    InvalidPort(LogicalPort),
    #[error("Invalid lane {lane} for port {port}")]
    InvalidPortLane { port: LogicalPort, lane: LaneSel },
    #[error("Attribute {attr} is not supported on port {port}")]
    UnsupportedAttribute { port: LogicalPort, attr: String },
    #[error("No such attribute: {0}")]
    InvalidAttribute(u32),
    #[error("Attribute {0} is read-only")]
    ReadOnlyAttribute(String),
    #[error("Invalid value for {attr}: {reason}")]
    InvalidValue { attr: String, reason: String },
    #[error("Attribute {attr} is managed by the LAG containing port {port}")]
    PerLagAttribute { port: LogicalPort, attr: String },
    #[error("Attribute {0} cannot be set on a LAG")]
    NotPerLagAttribute(String),
    #[error("Port {port} is in the wrong state: {reason}")]
    InvalidPortState { port: LogicalPort, reason: String },
    #[error("Ethernet mode {mode} is not valid on port {port}")]
    InvalidEthMode { port: LogicalPort, mode: String },
    #[error("Uninitialized: {0}")]
    Uninitialized(String),
    #[error("ASIC error: {0}")]
    Asic(AsicError),
}

impl AttrError {
    pub(crate) fn invalid_value(
        attr: impl fmt::Display,
        reason: impl ToString,
    ) -> Self {
        AttrError::InvalidValue {
            attr: attr.to_string(),
            reason: reason.to_string(),
        }
    }
}

impl convert::From<AsicError> for AttrError {
    fn from(err: AsicError) -> Self {
        AttrError::Asic(err)
    }
}

/// The lane a get or set is aimed at.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Hash, Deserialize, Serialize, JsonSchema,
)]
#[serde(rename_all = "snake_case")]
pub enum LaneSel {
    /// Every lane owned by the port.  Port-scoped attributes ignore the
    /// lane entirely.
    All,
    /// The attribute is port-scoped.
    NotApplicable,
    /// A lane index relative to the port, not a SerDes number.
    Index(u8),
}

impl fmt::Display for LaneSel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LaneSel::All => write!(f, "all"),
            LaneSel::NotApplicable => write!(f, "n/a"),
            LaneSel::Index(i) => write!(f, "{i}"),
        }
    }
}

/// Whether an access reads or writes an attribute.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Direction {
    Read,
    Write,
}

/// Who is asking for a write.  Writes from the LAG propagator are allowed
/// to touch per-lag attributes on member ports.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Origin {
    Direct,
    Propagator,
}
