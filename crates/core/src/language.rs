// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The supported language set and alias normalization.
//!
//! Languages are validated once at the HTTP boundary; everything downstream
//! carries the enum, so pools, images, and pod labels never see a raw
//! user-supplied string.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// A supported execution language.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Language {
    Py,
    Js,
    Ts,
    Go,
    Java,
    C,
    Cpp,
    Php,
    Rs,
    R,
    F90,
    D,
}

impl Language {
    pub const ALL: [Language; 12] = [
        Language::Py,
        Language::Js,
        Language::Ts,
        Language::Go,
        Language::Java,
        Language::C,
        Language::Cpp,
        Language::Php,
        Language::Rs,
        Language::R,
        Language::F90,
        Language::D,
    ];

    /// Canonical short name, as used in pod names, labels, and the API.
    pub fn as_str(&self) -> &'static str {
        match self {
            Language::Py => "py",
            Language::Js => "js",
            Language::Ts => "ts",
            Language::Go => "go",
            Language::Java => "java",
            Language::C => "c",
            Language::Cpp => "cpp",
            Language::Php => "php",
            Language::Rs => "rs",
            Language::R => "r",
            Language::F90 => "f90",
            Language::D => "d",
        }
    }

    /// Whether interpreter state capture is supported for this language.
    pub fn supports_state(&self) -> bool {
        matches!(self, Language::Py)
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error for unsupported language strings. Carries the offending input.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unsupported language: {0}")]
pub struct UnsupportedLanguage(pub String);

impl FromStr for Language {
    type Err = UnsupportedLanguage;

    /// Parse a language name, accepting the long-form aliases clients send.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "py" | "python" => Ok(Language::Py),
            "js" | "javascript" => Ok(Language::Js),
            "ts" | "typescript" => Ok(Language::Ts),
            "go" => Ok(Language::Go),
            "java" => Ok(Language::Java),
            "c" => Ok(Language::C),
            "cpp" => Ok(Language::Cpp),
            "php" => Ok(Language::Php),
            "rs" | "rust" => Ok(Language::Rs),
            "r" => Ok(Language::R),
            "f90" => Ok(Language::F90),
            "d" => Ok(Language::D),
            _ => Err(UnsupportedLanguage(s.to_string())),
        }
    }
}

impl Serialize for Language {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for Language {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Language::from_str(&s).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
#[path = "language_tests.rs"]
mod tests;
