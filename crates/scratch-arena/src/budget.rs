// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Scratch budget configuration and parsing.

use crate::ArenaError;
use std::fmt;
use std::str::FromStr;

const KB: usize = 1024;
const MB: usize = 1024 * KB;
const GB: usize = 1024 * MB;

/// A byte ceiling for one scratch generation.
///
/// # Parsing
/// - `"256M"` or `"256MB"` → 256 × 1024² bytes
/// - `"1G"` or `"1GB"` → 1024³ bytes
/// - `"512K"` or `"512KB"` → 512 × 1024 bytes
/// - `"65536"` → raw byte count
///
/// # Examples
/// ```
/// use scratch_arena::ScratchBudget;
///
/// let b = ScratchBudget::parse("64M").unwrap();
/// assert_eq!(b.as_bytes(), 64 * 1024 * 1024);
/// assert!(b.admits(1024));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct ScratchBudget {
    bytes: usize,
}

impl ScratchBudget {
    pub fn from_bytes(bytes: usize) -> Self {
        Self { bytes }
    }

    pub fn from_mb(mb: usize) -> Self {
        Self { bytes: mb * MB }
    }

    pub fn as_bytes(&self) -> usize {
        self.bytes
    }

    /// Returns `true` if `bytes` fits under the ceiling.
    pub fn admits(&self, bytes: usize) -> bool {
        bytes <= self.bytes
    }

    /// Parses a human-readable budget string. Case-insensitive.
    pub fn parse(s: &str) -> Result<Self, ArenaError> {
        let trimmed = s.trim();
        let upper = trimmed.to_ascii_uppercase();
        let invalid = || ArenaError::InvalidBudget(s.to_string());

        let (digits, multiplier) = [
            ("GB", GB),
            ("G", GB),
            ("MB", MB),
            ("M", MB),
            ("KB", KB),
            ("K", KB),
            ("B", 1),
        ]
        .iter()
        .find_map(|(suffix, mult)| {
            upper
                .strip_suffix(suffix)
                .map(|rest| (rest.trim().to_string(), *mult))
        })
        .unwrap_or((upper.clone(), 1));

        let value: usize = digits.parse().map_err(|_| invalid())?;
        let bytes = value.checked_mul(multiplier).ok_or_else(invalid)?;
        if bytes == 0 {
            return Err(invalid());
        }
        Ok(Self { bytes })
    }
}

impl FromStr for ScratchBudget {
    type Err = ArenaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for ScratchBudget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let b = self.bytes;
        if b >= GB && b % GB == 0 {
            write!(f, "{} GB", b / GB)
        } else if b >= MB && b % MB == 0 {
            write!(f, "{} MB", b / MB)
        } else if b >= KB && b % KB == 0 {
            write!(f, "{} KB", b / KB)
        } else {
            write!(f, "{b} B")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_suffixes() {
        assert_eq!(ScratchBudget::parse("256M").unwrap().as_bytes(), 256 * MB);
        assert_eq!(ScratchBudget::parse("256mb").unwrap().as_bytes(), 256 * MB);
        assert_eq!(ScratchBudget::parse("1G").unwrap().as_bytes(), GB);
        assert_eq!(ScratchBudget::parse("512K").unwrap().as_bytes(), 512 * KB);
        assert_eq!(ScratchBudget::parse("  4096 ").unwrap().as_bytes(), 4096);
        assert_eq!("2KB".parse::<ScratchBudget>().unwrap().as_bytes(), 2048);
    }

    #[test]
    fn test_parse_invalid() {
        assert!(ScratchBudget::parse("").is_err());
        assert!(ScratchBudget::parse("lots").is_err());
        assert!(ScratchBudget::parse("0M").is_err());
        assert!(matches!(
            ScratchBudget::parse("12Q"),
            Err(ArenaError::InvalidBudget(_))
        ));
    }

    #[test]
    fn test_admits() {
        let b = ScratchBudget::from_bytes(100);
        assert!(b.admits(100));
        assert!(!b.admits(101));
    }

    #[test]
    fn test_display() {
        assert_eq!(ScratchBudget::from_mb(3).to_string(), "3 MB");
        assert_eq!(ScratchBudget::from_bytes(2048).to_string(), "2 KB");
        assert_eq!(ScratchBudget::from_bytes(100).to_string(), "100 B");
    }

    #[test]
    fn test_serde_roundtrip() {
        let b = ScratchBudget::from_mb(8);
        let json = serde_json::to_string(&b).unwrap();
        let back: ScratchBudget = serde_json::from_str(&json).unwrap();
        assert_eq!(b, back);
    }
}
