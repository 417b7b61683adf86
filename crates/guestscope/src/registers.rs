//! Saved CPU table registers.
//!
//! A [`CpuState`] carries the three registers the inspector needs from a
//! stopped vCPU: CR3 for translation and GDTR/IDTR for the descriptor
//! tables.  It is read from a JSON snapshot so that any debugger or
//! hypervisor can hand it over without a dedicated protocol:
//!
//! ```json
//! {
//!   "cr3": "0x1000",
//!   "gdt": { "base": "0xfffffe0000001000", "limit": 127 },
//!   "idt": { "base": "0xfffffe0000000000", "limit": "0xfff" }
//! }
//! ```
//!
//! Each value may be a JSON number or a `0x`-prefixed hex string.

use crate::gdt::Gdt;
use crate::idt::Idt;
use serde::{de, Deserialize, Deserializer, Serialize};
use std::path::Path;
use thiserror::Error;

/// Errors raised while loading a register snapshot.
#[derive(Error, Debug)]
pub enum RegisterError {
    #[error("Failed to read register snapshot")]
    Io(#[from] std::io::Error),

    #[error("Malformed register snapshot")]
    Parse(#[from] serde_json::Error),
}

/// Base and limit of a descriptor-table register.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableRegister {
    #[serde(deserialize_with = "hex_or_int")]
    pub base: u64,
    #[serde(deserialize_with = "hex_or_int")]
    pub limit: u16,
}

/// CR3, GDTR and IDTR of one vCPU.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CpuState {
    #[serde(deserialize_with = "hex_or_int")]
    pub cr3: u64,
    #[serde(default)]
    pub gdt: TableRegister,
    #[serde(default)]
    pub idt: TableRegister,
}

impl CpuState {
    pub fn from_json(text: &str) -> Result<Self, RegisterError> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, RegisterError> {
        Self::from_json(&std::fs::read_to_string(path)?)
    }

    pub fn gdt(&self) -> Gdt {
        Gdt::new(self.gdt.base, self.gdt.limit)
    }

    pub fn idt(&self) -> Idt {
        Idt::new(self.idt.base, self.idt.limit)
    }
}

/// Parse a register value from `0x…`, plain decimal or a JSON number.
pub fn parse_value<T: TryFrom<u64>>(text: &str) -> Option<T> {
    let digits = text.trim().to_ascii_lowercase().replace('_', "");
    let value = match digits.strip_prefix("0x") {
        Some(hex) => u64::from_str_radix(hex, 16).ok()?,
        None => digits.parse().ok()?,
    };
    T::try_from(value).ok()
}

fn hex_or_int<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: TryFrom<u64>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Value {
        Int(u64),
        Text(String),
    }

    let value = match Value::deserialize(deserializer)? {
        Value::Int(value) => T::try_from(value).ok(),
        Value::Text(text) => parse_value(&text),
    };
    value.ok_or_else(|| de::Error::custom("register value malformed or out of range"))
}
