//! Toolchain configuration.
//!
//! Defaults mirror a plain `cc -O3` build. Every field can be overridden from
//! a JSON document or from the environment:
//!
//! | variable               | field          |
//! |------------------------|----------------|
//! | `TETHER_CC`            | `compiler`     |
//! | `TETHER_OPT_LEVEL`     | `opt_level`    |
//! | `TETHER_BUILD_TIMEOUT` | `timeout_secs` |
//! | `TETHER_CFLAGS`        | `extra_args`   |

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use derive_more::{Display, Error};
use serde::{Deserialize, Deserializer};

pub const ENV_COMPILER: &str = "TETHER_CC";
pub const ENV_OPT_LEVEL: &str = "TETHER_OPT_LEVEL";
pub const ENV_TIMEOUT: &str = "TETHER_BUILD_TIMEOUT";
pub const ENV_CFLAGS: &str = "TETHER_CFLAGS";

pub const DEFAULT_TIMEOUT_SECS: u64 = 60;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OptLevel {
    O0,
    O1,
    O2,
    #[default]
    O3,
    Os,
}

impl OptLevel {
    pub fn flag(self) -> &'static str {
        match self {
            OptLevel::O0 => "-O0",
            OptLevel::O1 => "-O1",
            OptLevel::O2 => "-O2",
            OptLevel::O3 => "-O3",
            OptLevel::Os => "-Os",
        }
    }
}

impl fmt::Display for OptLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.flag())
    }
}

#[derive(Debug, Display, Error)]
#[display("unknown optimization level `{level}`")]
pub struct UnknownOptLevel {
    pub level: String,
}

impl FromStr for OptLevel {
    type Err = UnknownOptLevel;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim_start_matches('-').to_ascii_lowercase().as_str() {
            "o0" | "0" => Ok(OptLevel::O0),
            "o1" | "1" => Ok(OptLevel::O1),
            "o2" | "2" => Ok(OptLevel::O2),
            "o3" | "3" => Ok(OptLevel::O3),
            "os" | "s" => Ok(OptLevel::Os),
            _ => Err(UnknownOptLevel {
                level: s.to_owned(),
            }),
        }
    }
}

/// How generated glue is compiled into a loadable module.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ToolchainConfig {
    /// Compiler driver, resolved through `PATH` when not absolute.
    pub compiler: PathBuf,
    pub opt_level: OptLevel,
    /// Appended after the generated arguments.
    pub extra_args: Vec<String>,
    /// Searched after the directory holding the ABI header.
    pub include_dirs: Vec<PathBuf>,
    /// Upper bound on one compiler invocation. Never zero.
    #[serde(deserialize_with = "positive_secs")]
    pub timeout_secs: u64,
}

fn positive_secs<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u64, D::Error> {
    match u64::deserialize(deserializer)? {
        0 => Err(serde::de::Error::custom("timeout_secs must be at least 1")),
        secs => Ok(secs),
    }
}

impl Default for ToolchainConfig {
    fn default() -> Self {
        ToolchainConfig {
            compiler: PathBuf::from("cc"),
            opt_level: OptLevel::default(),
            extra_args: Vec::new(),
            include_dirs: Vec::new(),
            timeout_secs: DEFAULT_TIMEOUT_SECS,
        }
    }
}

impl ToolchainConfig {
    /// Defaults with environment overrides applied.
    pub fn from_env() -> Self {
        Self::default().with_env_overrides(|key| std::env::var(key).ok())
    }

    pub fn from_json(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }

    /// Apply overrides read through `lookup`. Malformed values are logged
    /// and leave the field unchanged.
    pub fn with_env_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(cc) = lookup(ENV_COMPILER).filter(|v| !v.trim().is_empty()) {
            self.compiler = PathBuf::from(cc.trim());
        }
        if let Some(level) = lookup(ENV_OPT_LEVEL) {
            match level.parse() {
                Ok(level) => self.opt_level = level,
                Err(err) => tracing::warn!(var = ENV_OPT_LEVEL, "ignoring override: {err}"),
            }
        }
        if let Some(secs) = lookup(ENV_TIMEOUT) {
            match secs.trim().parse::<u64>() {
                Ok(secs) if secs > 0 => self.timeout_secs = secs,
                _ => tracing::warn!(var = ENV_TIMEOUT, value = %secs, "ignoring override"),
            }
        }
        if let Some(flags) = lookup(ENV_CFLAGS) {
            self.extra_args
                .extend(flags.split_whitespace().map(str::to_owned));
        }
        self
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}
