// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/
//
// Copyright 2025 Oxide Computer Company

//! Root logger construction.

use std::fs::OpenOptions;
use std::io::Write;
use std::str::FromStr;

use anyhow::Context;
use schemars::JsonSchema;
use serde::Deserialize;
use serde::Serialize;
use slog::Drain;

/// Output log info in unstructured text or bunyan-style json
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema,
)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Human,
    Json,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "human" => Ok(LogFormat::Human),
            "json" => Ok(LogFormat::Json),
            _ => Err(format!("invalid log format: {s}")),
        }
    }
}

/// Where and how the root logger should emit records.
#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema)]
#[serde(default)]
pub struct LogConfig {
    /// If set, where the log should be written.  If not set, the log goes to
    /// stdout.
    pub file: Option<String>,
    pub format: LogFormat,
    /// Minimum level to emit ("critical", "error", "warning", "info",
    /// "debug", "trace").
    pub level: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        LogConfig {
            file: None,
            format: LogFormat::Human,
            level: "info".to_string(),
        }
    }
}

fn build_drain<W>(
    name: &'static str,
    format: LogFormat,
    level: slog::Level,
    w: W,
) -> slog::Fuse<slog_async::Async>
where
    W: Write + Send + 'static,
{
    match format {
        LogFormat::Json => {
            let drain = slog_bunyan::with_name(name, w).build().fuse();
            let drain = slog::LevelFilter::new(drain, level).ignore_res();
            slog_async::Async::new(drain).chan_size(0x2000).build().fuse()
        }
        LogFormat::Human => {
            let decorator = slog_term::PlainDecorator::new(w);
            let drain = slog_term::FullFormat::new(decorator).build().fuse();
            let drain = slog::LevelFilter::new(drain, level).ignore_res();
            slog_async::Async::new(drain).chan_size(0x2000).build().fuse()
        }
    }
}

/// Build the root logger for a process embedding the engine.
pub fn init(
    name: &'static str,
    config: &LogConfig,
) -> anyhow::Result<slog::Logger> {
    let level = slog::Level::from_str(&config.level).map_err(|_| {
        anyhow::anyhow!("invalid log level: {}", config.level)
    })?;

    let drain = match &config.file {
        Some(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("opening log file {path}"))?;
            build_drain(name, config.format, level, file)
        }
        None => build_drain(name, config.format, level, std::io::stdout()),
    };

    Ok(slog::Logger::root(drain, slog::o!("name" => name)))
}
