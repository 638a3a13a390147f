// ABOUTME: Slot colors and validated slot base names.
// ABOUTME: A slot name plus a color yields the container name for that slot.

use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use super::ContainerId;

/// One of the two mutually exclusive deployment positions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SlotColor {
    Blue,
    Green,
}

impl SlotColor {
    pub const ALL: [SlotColor; 2] = [SlotColor::Blue, SlotColor::Green];

    /// The complementary color.
    pub fn other(self) -> Self {
        match self {
            SlotColor::Blue => SlotColor::Green,
            SlotColor::Green => SlotColor::Blue,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            SlotColor::Blue => "blue",
            SlotColor::Green => "green",
        }
    }
}

impl fmt::Display for SlotColor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SlotColor {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "blue" => Ok(SlotColor::Blue),
            "green" => Ok(SlotColor::Green),
            other => Err(format!("unknown slot color: {}", other)),
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SlotNameError {
    #[error("slot name cannot be empty")]
    Empty,

    #[error("slot name exceeds maximum length of {0} characters")]
    TooLong(usize),

    #[error("slot name cannot start or end with a hyphen")]
    EdgeHyphen,

    #[error("invalid character in slot name: {0:?}")]
    InvalidChar(char),
}

/// Base name shared by both slot containers (`<name>-blue`, `<name>-green`).
///
/// Lowercase alphanumerics and hyphens only, short enough that the color
/// suffix still fits a 63 character DNS label.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct SlotName(String);

impl SlotName {
    pub const MAX_LEN: usize = 57;

    pub fn new(value: &str) -> Result<Self, SlotNameError> {
        let value = value.trim();
        if value.is_empty() {
            return Err(SlotNameError::Empty);
        }
        if value.len() > Self::MAX_LEN {
            return Err(SlotNameError::TooLong(Self::MAX_LEN));
        }
        if value.starts_with('-') || value.ends_with('-') {
            return Err(SlotNameError::EdgeHyphen);
        }
        if let Some(c) = value
            .chars()
            .find(|c| !c.is_ascii_lowercase() && !c.is_ascii_digit() && *c != '-')
        {
            return Err(SlotNameError::InvalidChar(c));
        }
        Ok(Self(value.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Container name for the given color.
    pub fn container_name(&self, color: SlotColor) -> String {
        format!("{}-{}", self.0, color)
    }

    pub fn container_id(&self, color: SlotColor) -> ContainerId {
        ContainerId::new(self.container_name(color))
    }
}

impl fmt::Display for SlotName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for SlotName {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::new(&s).map_err(serde::de::Error::custom)
    }
}
