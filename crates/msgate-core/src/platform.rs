//! The closed set of client platforms.
//!
//! Ordinals are part of the wire contract (handshake `platformID`, push
//! results, envelope payloads) and must not be renumbered. Adding a platform
//! means appending a variant, extending [`Platform::ALL`], and bumping
//! [`PLATFORM_SET_VERSION`].

use crate::error::{GateError, GateResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Version of the platform enumeration below.
pub const PLATFORM_SET_VERSION: u32 = 1;

/// A client platform kind. One live connection is allowed per user per platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(into = "i32", try_from = "i32")]
#[repr(i32)]
pub enum Platform {
    Ios = 1,
    Android = 2,
    Windows = 3,
    Osx = 4,
    Web = 5,
    MiniWeb = 6,
    Linux = 7,
}

impl Platform {
    /// Every platform, in ordinal order.
    pub const ALL: [Platform; 7] = [
        Platform::Ios,
        Platform::Android,
        Platform::Windows,
        Platform::Osx,
        Platform::Web,
        Platform::MiniWeb,
        Platform::Linux,
    ];

    /// Numeric platform ID as used on the wire.
    pub fn id(self) -> i32 {
        self as i32
    }

    /// Canonical display name.
    pub fn name(self) -> &'static str {
        match self {
            Platform::Ios => "IOS",
            Platform::Android => "Android",
            Platform::Windows => "Windows",
            Platform::Osx => "OSX",
            Platform::Web => "Web",
            Platform::MiniWeb => "MiniWeb",
            Platform::Linux => "Linux",
        }
    }

    pub fn from_id(id: i32) -> Option<Self> {
        Self::ALL.iter().copied().find(|p| p.id() == id)
    }

    /// Case-insensitive name lookup.
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL
            .iter()
            .copied()
            .find(|p| p.name().eq_ignore_ascii_case(name))
    }

    /// Parse a handshake value: either the numeric ordinal or the name.
    pub fn parse(value: &str) -> GateResult<Self> {
        let value = value.trim();
        let found = match value.parse::<i32>() {
            Ok(id) => Self::from_id(id),
            Err(_) => Self::from_name(value),
        };
        found.ok_or_else(|| GateError::UnknownPlatform(value.to_string()))
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Platform {
    type Err = GateError;

    fn from_str(s: &str) -> GateResult<Self> {
        Self::parse(s)
    }
}

impl From<Platform> for i32 {
    fn from(p: Platform) -> i32 {
        p as i32
    }
}

impl TryFrom<i32> for Platform {
    type Error = String;
    fn try_from(v: i32) -> Result<Self, String> {
        Platform::from_id(v).ok_or_else(|| format!("unknown platform id: {v}"))
    }
}
