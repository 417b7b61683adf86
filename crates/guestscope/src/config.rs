//! Translator configuration.
//!
//! An [`MmuConfig`] is fixed when an [`Mmu`](crate::mmu::Mmu) is built and
//! never changes afterwards: every walk performed by that translator uses
//! the same linear-address width and the same MAXPHYADDR.

use crate::verified::paging::{FOUR_LEVEL_LINEAR_BITS, MAX_PHYSICAL_BITS, MIN_PHYSICAL_BITS};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Default implemented physical-address width.
pub const DEFAULT_PHYSICAL_BITS: u32 = 48;

/// Guest CPU architecture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Arch {
    /// 32-bit x86 with 2-level (non-PAE) paging.  Not supported.
    X86,
    /// x86_64 with 4-level paging.
    X86_64,
}

impl std::fmt::Display for Arch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Arch::X86 => write!(f, "x86"),
            Arch::X86_64 => write!(f, "x86_64"),
        }
    }
}

/// Errors raised while building a translator configuration.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum ConfigError {
    /// Only 4-level x86_64 paging is modelled.
    #[error("Paging mode of {arch} is not supported")]
    UnsupportedArch {
        /// The rejected architecture.
        arch: Arch,
    },

    /// MAXPHYADDR outside the architectural range.
    #[error(
        "Physical address width {bits} out of range \
         ({MIN_PHYSICAL_BITS}..={MAX_PHYSICAL_BITS})"
    )]
    PhysicalBits {
        /// Rejected width.
        bits: u32,
    },
}

/// Fixed per-translator paging parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MmuConfig {
    /// Guest architecture.
    pub arch: Arch,
    /// Implemented linear-address bits; addresses must be canonical.
    pub linear_bits: u32,
    /// Implemented physical-address bits (MAXPHYADDR, `M`).
    pub physical_bits: u32,
}

impl Default for MmuConfig {
    fn default() -> Self {
        Self {
            arch: Arch::X86_64,
            linear_bits: FOUR_LEVEL_LINEAR_BITS,
            physical_bits: DEFAULT_PHYSICAL_BITS,
        }
    }
}

impl MmuConfig {
    /// Configuration for `arch`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::UnsupportedArch`] for 32-bit x86: its
    /// 2-level paging is not modelled and callers must not fall back to
    /// a 4-level walk over 4-byte entries.
    pub fn for_arch(arch: Arch) -> Result<Self, ConfigError> {
        match arch {
            Arch::X86_64 => Ok(Self::default()),
            Arch::X86 => Err(ConfigError::UnsupportedArch { arch }),
        }
    }

    /// Replace MAXPHYADDR, validating it against the architectural range.
    pub fn with_physical_bits(mut self, bits: u32) -> Result<Self, ConfigError> {
        if !(MIN_PHYSICAL_BITS..=MAX_PHYSICAL_BITS).contains(&bits) {
            return Err(ConfigError::PhysicalBits { bits });
        }
        self.physical_bits = bits;
        Ok(self)
    }

    /// Re-check a configuration that was built field by field or
    /// deserialized.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.arch != Arch::X86_64 {
            return Err(ConfigError::UnsupportedArch { arch: self.arch });
        }
        if !(MIN_PHYSICAL_BITS..=MAX_PHYSICAL_BITS).contains(&self.physical_bits) {
            return Err(ConfigError::PhysicalBits {
                bits: self.physical_bits,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_four_level_x86_64() {
        let config = MmuConfig::default();
        assert_eq!(config.arch, Arch::X86_64);
        assert_eq!(config.linear_bits, 48);
        assert_eq!(config.physical_bits, DEFAULT_PHYSICAL_BITS);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn x86_is_rejected() {
        assert_eq!(
            MmuConfig::for_arch(Arch::X86),
            Err(ConfigError::UnsupportedArch { arch: Arch::X86 })
        );
    }

    #[test]
    fn physical_bits_range() {
        let config = MmuConfig::default();
        assert_eq!(config.with_physical_bits(52).unwrap().physical_bits, 52);
        assert_eq!(config.with_physical_bits(36).unwrap().physical_bits, 36);
        assert!(matches!(
            config.with_physical_bits(53),
            Err(ConfigError::PhysicalBits { bits: 53 })
        ));
        assert!(config.with_physical_bits(12).is_err());
    }

    #[test]
    fn deserialized_config_is_validated() {
        let config: MmuConfig =
            serde_json::from_str(r#"{"arch":"x86","linear_bits":32,"physical_bits":32}"#)
                .unwrap();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::UnsupportedArch { .. })
        ));
    }
}
