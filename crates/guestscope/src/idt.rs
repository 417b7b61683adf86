//! Interrupt Descriptor Table decoding.
//!
//! In long mode every IDT slot is a 16-byte interrupt or trap gate; the
//! table holds `(limit + 1) / 16` of them.

use crate::compact::{compact, CompactedRun};
use crate::gdt::{le_u128, DescriptorError, TableError, SYSTEM_SIZE};
use crate::linear::{check_range, LinearReader};
use crate::memory::PhysicalMemory;
use crate::symbols::SymbolResolver;
use crate::verified::descriptor::{
    dpl, gate_ist, gate_offset, gate_selector, present, segment_type,
};
use log::{debug, warn};
use serde::Serialize;
use std::fmt;

/// Label shown for a handler no symbol covers.
pub const UNKNOWN_SYMBOL: &str = "?";

/// Gate type, from the 4-bit type field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum GateKind {
    Interrupt,
    Trap,
    Other(u8),
}

impl From<u8> for GateKind {
    fn from(type_: u8) -> Self {
        match type_ {
            0xE => GateKind::Interrupt,
            0xF => GateKind::Trap,
            other => GateKind::Other(other),
        }
    }
}

/// One decoded IDT slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct GateDescriptor {
    pub raw: u128,
    /// Handler address.
    pub offset: u64,
    /// Handler code-segment selector.
    pub selector: u16,
    pub ist: u8,
    #[serde(rename = "type")]
    pub type_: u8,
    pub dpl: u8,
    pub present: bool,
}

impl GateDescriptor {
    pub fn from_raw(raw: u128) -> Self {
        Self {
            raw,
            offset: gate_offset(raw),
            selector: gate_selector(raw),
            ist: gate_ist(raw),
            type_: segment_type(raw),
            dpl: dpl(raw),
            present: present(raw) == 1,
        }
    }

    /// Decode the first 16 bytes of `bytes` (little endian).
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, DescriptorError> {
        le_u128(bytes).map(Self::from_raw)
    }

    pub fn kind(&self) -> GateKind {
        GateKind::from(self.type_)
    }

    /// Handler label: the resolver's name for [`offset`](Self::offset), or
    /// [`UNKNOWN_SYMBOL`].
    pub fn label(&self, resolver: Option<&dyn SymbolResolver>) -> String {
        resolver
            .and_then(|resolver| resolver.resolve_symbol(self.offset))
            .unwrap_or_else(|| UNKNOWN_SYMBOL.to_string())
    }

    /// Display adapter that labels the handler through `resolver`.
    pub fn display<'a>(&'a self, resolver: Option<&'a dyn SymbolResolver>) -> GateDisplay<'a> {
        GateDisplay {
            gate: self,
            resolver,
        }
    }

    /// Gates compact together when they reach the same handler.
    pub fn same_target(&self, other: &Self) -> bool {
        self.offset == other.offset && self.selector == other.selector
    }
}

impl fmt::Display for GateDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.display(None), f)
    }
}

/// See [`GateDescriptor::display`].
pub struct GateDisplay<'a> {
    gate: &'a GateDescriptor,
    resolver: Option<&'a dyn SymbolResolver>,
}

impl fmt::Display for GateDisplay<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let gate = self.gate;
        write!(
            f,
            "{:#x}:{:#x} <{}> [off:{:x}|p:{}|dpl:{}|type:{:x}|ist:{:x}|ss:{:x}] raw={:032x}",
            gate.selector,
            gate.offset,
            gate.label(self.resolver),
            gate.offset,
            u8::from(gate.present),
            gate.dpl,
            gate.type_,
            gate.ist,
            gate.selector,
            gate.raw
        )
    }
}

/// An IDT located by its IDTR value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Idt {
    /// Linear base address.
    pub base: u64,
    /// Table limit: size in bytes minus one.
    pub limit: u16,
}

impl Idt {
    pub fn new(base: u64, limit: u16) -> Self {
        Self { base, limit }
    }

    /// Number of whole gates the limit covers.
    pub fn len(&self) -> usize {
        (usize::from(self.limit) + 1) / SYSTEM_SIZE
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Decode every gate, indexed by vector number.
    pub fn decode<M: PhysicalMemory>(
        &self,
        reader: &LinearReader<'_, M>,
    ) -> Result<Vec<(usize, GateDescriptor)>, TableError> {
        let trailing = (usize::from(self.limit) + 1) % SYSTEM_SIZE;
        if trailing != 0 {
            warn!("IDT at {:#x}: {trailing} trailing bytes ignored", self.base);
        }

        let size = u64::from(self.limit) + 1;
        check_range(self.base, size)
            .map_err(|source| TableError::Read { offset: 0, source })?;

        (0..self.len())
            .map(|vector| {
                let offset = (vector * SYSTEM_SIZE) as u64;
                let bytes = reader
                    .read(self.base + offset, SYSTEM_SIZE)
                    .map_err(|source| TableError::Read { offset, source })?;
                let gate = GateDescriptor::from_bytes(&bytes)
                    .map_err(|source| TableError::Descriptor { offset, source })?;
                debug!("IDT[{vector}]: {:#x}:{:#x}", gate.selector, gate.offset);
                Ok((vector, gate))
            })
            .collect()
    }

    /// Fold adjacent gates that reach the same handler.
    pub fn compact(gates: Vec<(usize, GateDescriptor)>) -> Vec<CompactedRun<GateDescriptor>> {
        compact(gates, GateDescriptor::same_target)
    }

    /// One line per run: `[start-end]:\t<gate>`.
    pub fn render(
        runs: &[CompactedRun<GateDescriptor>],
        resolver: Option<&dyn SymbolResolver>,
    ) -> Vec<String> {
        runs.iter()
            .map(|run| {
                let gate = run.entry.display(resolver);
                if run.start == run.end {
                    format!("[{}]:\t{gate}", run.start)
                } else {
                    format!("[{}-{}]:\t{gate}", run.start, run.end)
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MmuConfig;
    use crate::mmu::{Mmu, TranslationError};
    use crate::symbols::SymbolMap;
    use crate::testutil::PagedImage;
    use crate::verified::descriptor::gate_entry;

    const IDT_VA: u64 = 0xffff_fe00_0000_0000;
    const IDT_PA: u64 = 0xa000;

    const DIVIDE: u64 = 0xffff_ffff_8100_1000;
    const SPURIOUS: u64 = 0xffff_ffff_8100_2000;
    const INTERRUPT: u8 = 0x8e;
    const TRAP: u8 = 0x8f;

    fn image_with_idt(gates: &[u128]) -> PagedImage {
        let mut paged = PagedImage::new();
        paged.map_4k(IDT_VA, IDT_PA, 0);
        let bytes: Vec<u8> = gates.iter().flat_map(|g| g.to_le_bytes()).collect();
        paged.write_bytes(IDT_PA, &bytes);
        paged
    }

    fn decode(paged: &PagedImage, limit: u16) -> Result<Vec<(usize, GateDescriptor)>, TableError> {
        let mmu = Mmu::new(paged.image(), MmuConfig::default()).unwrap();
        let reader = LinearReader::new(&mmu, paged.root());
        Idt::new(IDT_VA, limit).decode(&reader)
    }

    #[test]
    fn gate_fields() {
        let gate = GateDescriptor::from_raw(gate_entry(DIVIDE, 0x10, 2, TRAP | 0x60));
        assert_eq!(gate.offset, DIVIDE);
        assert_eq!(gate.selector, 0x10);
        assert_eq!(gate.ist, 2);
        assert_eq!(gate.dpl, 3);
        assert!(gate.present);
        assert_eq!(gate.kind(), GateKind::Trap);
        assert_eq!(GateKind::from(0x5), GateKind::Other(5));
    }

    #[test]
    fn short_input_is_truncated() {
        assert!(matches!(
            GateDescriptor::from_bytes(&[0; 12]),
            Err(DescriptorError::Truncated {
                needed: 16,
                available: 12
            })
        ));
    }

    #[test]
    fn label_falls_back_to_placeholder() {
        let gate = GateDescriptor::from_raw(gate_entry(DIVIDE + 4, 0x10, 0, INTERRUPT));
        let mut symbols = SymbolMap::default();
        symbols.insert(DIVIDE, "asm_exc_divide_error");

        assert_eq!(gate.label(None), "?");
        assert_eq!(gate.label(Some(&symbols)), "asm_exc_divide_error+0x4");
        assert_eq!(gate.label(Some(&SymbolMap::default())), "?");

        // The label is cosmetic.
        let plain = GateDescriptor::from_raw(gate.raw);
        assert_eq!(plain, gate);
    }

    #[test]
    fn display_format() {
        let gate = GateDescriptor::from_raw(gate_entry(DIVIDE, 0x10, 0, INTERRUPT));
        assert_eq!(
            gate.to_string(),
            format!(
                "0x10:0xffffffff81001000 <?> [off:ffffffff81001000|p:1|dpl:0|type:e|ist:0|ss:10] \
                 raw={:032x}",
                gate.raw
            )
        );
    }

    #[test]
    fn decode_counts_whole_gates() {
        let gates = [
            gate_entry(DIVIDE, 0x10, 0, INTERRUPT),
            gate_entry(SPURIOUS, 0x10, 0, INTERRUPT),
            gate_entry(SPURIOUS, 0x10, 0, INTERRUPT),
        ];
        let paged = image_with_idt(&gates);

        let all = decode(&paged, 0x2f).unwrap();
        assert_eq!(all.len(), 3);
        assert_eq!(all[2].0, 2);
        assert_eq!(all[0].1.offset, DIVIDE);

        // A partial last slot is not decoded.
        assert_eq!(decode(&paged, 0x27).unwrap().len(), 2);
        assert!(decode(&paged, 0x0e).unwrap().is_empty());
        assert!(Idt::new(0, 0x0e).is_empty());
    }

    #[test]
    fn compacts_on_offset_and_selector() {
        let gates = [
            gate_entry(DIVIDE, 0x10, 0, INTERRUPT),
            gate_entry(SPURIOUS, 0x10, 0, INTERRUPT),
            // Differs only in IST and type: still the same handler.
            gate_entry(SPURIOUS, 0x10, 1, TRAP),
            gate_entry(SPURIOUS, 0x33, 0, INTERRUPT),
        ];
        let paged = image_with_idt(&gates);
        let runs = Idt::compact(decode(&paged, 0x3f).unwrap());

        let ranges: Vec<_> = runs.iter().map(|r| (r.start, r.end)).collect();
        assert_eq!(ranges, [(0, 0), (1, 2), (3, 3)]);

        let mut symbols = SymbolMap::default();
        symbols.insert(SPURIOUS, "spurious_interrupt");
        let lines = Idt::render(&runs, Some(&symbols));
        assert!(lines[0].starts_with("[0]:\t0x10:0xffffffff81001000 <?>"));
        let spurious = "[1-2]:\t0x10:0xffffffff81002000 <spurious_interrupt>";
        assert!(lines[1].starts_with(spurious));
        assert!(lines[2].starts_with("[3]:\t0x33:"));
    }

    #[test]
    fn unmapped_idt_reports_offset() {
        let paged = image_with_idt(&[gate_entry(DIVIDE, 0x10, 0, INTERRUPT)]);
        let mmu = Mmu::new(paged.image(), MmuConfig::default()).unwrap();
        let reader = LinearReader::new(&mmu, paged.root());

        // The second page of a 0x1010-byte table is not mapped.
        let err = Idt::new(IDT_VA, 0x100f).decode(&reader).unwrap_err();
        assert!(matches!(
            err,
            TableError::Read {
                offset: 0x1000,
                source: TranslationError::Unmapped { .. }
            }
        ));
    }

    #[test]
    fn table_past_top_of_memory_is_rejected() {
        let mut paged = PagedImage::new();
        paged.map_4k(0xffff_ffff_ffff_f000, IDT_PA, 0);
        paged.map_4k(0, IDT_PA + 0x1000, 0);
        let mmu = Mmu::new(paged.image(), MmuConfig::default()).unwrap();
        let reader = LinearReader::new(&mmu, paged.root());

        let err = Idt::new(0xffff_ffff_ffff_fff0, 0x1f)
            .decode(&reader)
            .unwrap_err();
        assert!(matches!(
            err,
            TableError::Read {
                offset: 0,
                source: TranslationError::Wrapped { length: 0x20, .. }
            }
        ));
    }
}
