//! Address-to-symbol lookup for labelling interrupt handlers.
//!
//! Symbols come from `nm` output or a kernel `System.map`; both are one
//! `address type name` triple per line.

use log::debug;
use std::collections::BTreeMap;
use std::path::Path;
use thiserror::Error;

/// Errors raised while loading a symbol table.
#[derive(Error, Debug)]
pub enum SymbolError {
    #[error("Failed to read symbol file")]
    Io(#[from] std::io::Error),

    #[error("Malformed symbol on line {line}: {text:?}")]
    Parse {
        /// 1-based line number.
        line: usize,
        text: String,
    },
}

/// Optional collaborator that names code addresses.
pub trait SymbolResolver {
    /// Name of the function containing `address`, if known.
    fn resolve_symbol(&self, address: u64) -> Option<String>;
}

/// Sorted table of text symbols.
#[derive(Debug, Clone, Default)]
pub struct SymbolMap {
    symbols: BTreeMap<u64, String>,
}

impl SymbolMap {
    /// Parse `nm` / `System.map` text.
    ///
    /// Only text symbols (types `T`, `t`, `W`, `w`) are kept.  Lines
    /// without an address, such as undefined symbols, are skipped.  When
    /// several symbols share an address the first one wins.
    pub fn parse(text: &str) -> Result<Self, SymbolError> {
        let mut symbols = BTreeMap::new();
        for (number, line) in text.lines().enumerate() {
            let fields: Vec<&str> = line.split_whitespace().collect();
            let [address, kind, name, ..] = fields.as_slice() else {
                continue;
            };
            if !matches!(*kind, "T" | "t" | "W" | "w") {
                continue;
            }
            let address = u64::from_str_radix(address, 16).map_err(|_| SymbolError::Parse {
                line: number + 1,
                text: line.to_string(),
            })?;
            symbols.entry(address).or_insert_with(|| name.to_string());
        }
        Ok(Self { symbols })
    }

    /// Load and parse a symbol file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, SymbolError> {
        let path = path.as_ref();
        let map = Self::parse(&std::fs::read_to_string(path)?)?;
        debug!("{} symbols loaded from {}", map.len(), path.display());
        Ok(map)
    }

    pub fn insert(&mut self, address: u64, name: impl Into<String>) {
        self.symbols.insert(address, name.into());
    }

    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }
}

impl SymbolResolver for SymbolMap {
    /// Nearest symbol at or below `address`, as `name` or `name+0xoff`.
    fn resolve_symbol(&self, address: u64) -> Option<String> {
        let (start, name) = self.symbols.range(..=address).next_back()?;
        match address - start {
            0 => Some(name.clone()),
            offset => Some(format!("{name}+{offset:#x}")),
        }
    }
}
