//! Global Descriptor Table decoding.
//!
//! A GDT slot is 8 bytes for null, code and data segments and 16 bytes
//! for the 64-bit system descriptors (TSS, call gate).  The low 8 bytes
//! alone decide which it is, so the table walker reads them first,
//! classifies, and only then fetches the upper half when needed.
//!
//! Classification of the low qword:
//!
//! | bits 44:43 | type (43:40) | descriptor   | size |
//! |------------|--------------|--------------|------|
//! | `10`       | any          | data segment | 8    |
//! | `11`       | any          | code segment | 8    |
//! | `0x`       | `0x0`        | null         | 8    |
//! | `0x`       | `0xF`        | call gate    | 16   |
//! | `0x`       | `1xx1`       | TSS          | 16   |
//! | `0x`       | other        | unsupported  | —    |

use crate::linear::{check_range, LinearReader};
use crate::memory::PhysicalMemory;
use crate::mmu::TranslationError;
use crate::verified::bits::bits;
use crate::verified::descriptor::{
    available, default_size, dpl, effective_limit, gate_offset, gate_selector, granularity,
    long_mode, present, segment_base, segment_class, segment_limit, segment_type, system_base_high,
};
use log::{debug, warn};
use serde::Serialize;
use std::fmt;
use thiserror::Error;

/// Size of a null, code or data descriptor.
pub const SEGMENT_SIZE: usize = 8;

/// Size of a 64-bit system descriptor or gate.
pub const SYSTEM_SIZE: usize = 16;

/// Errors raised while decoding a single descriptor.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum DescriptorError {
    /// A system descriptor type this decoder does not know.
    #[error("Unsupported system descriptor type {type_:#x} (raw {raw:#018x})")]
    UnsupportedType {
        type_: u8,
        /// Low 8 bytes of the descriptor.
        raw: u64,
    },

    /// Fewer bytes than the descriptor occupies.
    #[error("Descriptor needs {needed} bytes, only {available} available")]
    Truncated { needed: usize, available: usize },
}

/// Errors raised while walking a descriptor table.
#[derive(Error, Debug)]
pub enum TableError {
    /// The table bytes at `offset` could not be read.
    #[error("Failed to read descriptor at table offset {offset:#x}")]
    Read {
        offset: u64,
        source: TranslationError,
    },

    /// The descriptor at `offset` could not be decoded.
    #[error("Invalid descriptor at table offset {offset:#x}")]
    Descriptor {
        offset: u64,
        source: DescriptorError,
    },
}

// ═══════════════════════════════════════════════════════════════════════
//  Classification
// ═══════════════════════════════════════════════════════════════════════

/// Descriptor variant, decided from the low 8 bytes only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DescriptorKind {
    Null,
    Data,
    Code,
    Tss,
    CallGate,
}

impl DescriptorKind {
    /// Classify the low 8 bytes of a descriptor.
    pub fn classify(low: u64) -> Result<Self, DescriptorError> {
        let raw = u128::from(low);
        match segment_class(raw) {
            0b10 => return Ok(DescriptorKind::Data),
            0b11 => return Ok(DescriptorKind::Code),
            _ => {}
        }
        // Call gate (0xF) also satisfies the TSS mask.
        match segment_type(raw) {
            0x0 => Ok(DescriptorKind::Null),
            0xF => Ok(DescriptorKind::CallGate),
            t if t & 0x9 == 0x9 => Ok(DescriptorKind::Tss),
            t => Err(DescriptorError::UnsupportedType { type_: t, raw: low }),
        }
    }

    /// Bytes occupied in the table.
    pub fn size(self) -> usize {
        match self {
            DescriptorKind::Null | DescriptorKind::Data | DescriptorKind::Code => SEGMENT_SIZE,
            DescriptorKind::Tss | DescriptorKind::CallGate => SYSTEM_SIZE,
        }
    }
}

impl fmt::Display for DescriptorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DescriptorKind::Null => "null",
            DescriptorKind::Data => "data",
            DescriptorKind::Code => "code",
            DescriptorKind::Tss => "tss",
            DescriptorKind::CallGate => "call gate",
        };
        f.write_str(name)
    }
}

// ═══════════════════════════════════════════════════════════════════════
//  Descriptor variants
// ═══════════════════════════════════════════════════════════════════════

/// Fields shared by every segment descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SegmentHeader {
    /// Low 8 bytes.
    pub raw: u64,
    pub base: u32,
    /// Raw 20-bit limit; not scaled by granularity.
    pub limit: u32,
    #[serde(rename = "type")]
    pub type_: u8,
    pub granularity: bool,
    pub present: bool,
    pub long_mode: bool,
    pub dpl: u8,
    pub available: bool,
}

impl SegmentHeader {
    fn new(low: u64) -> Self {
        let raw = u128::from(low);
        Self {
            raw: low,
            base: segment_base(raw),
            limit: segment_limit(raw),
            type_: segment_type(raw),
            granularity: granularity(raw) == 1,
            present: present(raw) == 1,
            long_mode: long_mode(raw) == 1,
            dpl: dpl(raw),
            available: available(raw) == 1,
        }
    }

    /// Limit in bytes, scaled by 4 KiB when granularity is set.
    pub fn byte_limit(&self) -> u32 {
        effective_limit(u128::from(self.raw))
    }

    fn flags(&self) -> String {
        format!(
            "g{}|l{}|avl{}|p{}|dpl{}",
            u8::from(self.granularity),
            u8::from(self.long_mode),
            u8::from(self.available),
            u8::from(self.present),
            self.dpl
        )
    }
}

/// Data segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DataSegment {
    pub header: SegmentHeader,
    /// B: 32-bit stack pointer / upper bound.
    pub big: bool,
    pub expand_down: bool,
    pub writable: bool,
    pub accessed: bool,
}

/// Code segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CodeSegment {
    pub header: SegmentHeader,
    /// D: 32-bit default operand size.
    pub default_size: bool,
    pub conforming: bool,
    pub readable: bool,
    pub accessed: bool,
}

/// Fields shared by 16-byte system descriptors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SystemHeader {
    pub header: SegmentHeader,
    /// All 16 bytes.
    pub raw: u128,
    /// Bits 127:109.
    pub reserved_high: u32,
    /// Bits 108:104; must be zero.
    pub zero: u8,
    /// Bits 103:96.
    pub reserved_low: u8,
}

impl SystemHeader {
    fn new(raw: u128) -> Self {
        Self {
            header: SegmentHeader::new(raw as u64),
            raw,
            reserved_high: bits(raw, 96 + 13, 32 - 13) as u32,
            zero: bits(raw, 96 + 8, 5) as u8,
            reserved_low: bits(raw, 96, 8) as u8,
        }
    }
}

/// 64-bit task-state segment descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TssDescriptor {
    pub system: SystemHeader,
    /// Full 64-bit base.
    pub base: u64,
    pub busy: bool,
}

/// 64-bit call gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CallGateDescriptor {
    pub system: SystemHeader,
    pub selector: u16,
    pub offset: u64,
}

/// One decoded GDT slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SegmentDescriptor {
    Null { raw: u64 },
    Data(DataSegment),
    Code(CodeSegment),
    Tss(TssDescriptor),
    CallGate(CallGateDescriptor),
}

impl SegmentDescriptor {
    /// Decode the descriptor at the start of `bytes` (little endian).
    ///
    /// # Errors
    ///
    /// - [`DescriptorError::Truncated`] if `bytes` is shorter than the
    ///   descriptor its low 8 bytes announce.
    /// - [`DescriptorError::UnsupportedType`] for an unknown system type.
    pub fn create(bytes: &[u8]) -> Result<Self, DescriptorError> {
        let low = le_u64(bytes)?;
        let kind = DescriptorKind::classify(low)?;
        if bytes.len() < kind.size() {
            return Err(DescriptorError::Truncated {
                needed: kind.size(),
                available: bytes.len(),
            });
        }

        let descriptor = match kind {
            DescriptorKind::Null => SegmentDescriptor::Null { raw: low },
            DescriptorKind::Data => {
                let header = SegmentHeader::new(low);
                SegmentDescriptor::Data(DataSegment {
                    header,
                    big: default_size(u128::from(low)) == 1,
                    expand_down: header.type_ & 0x4 != 0,
                    writable: header.type_ & 0x2 != 0,
                    accessed: header.type_ & 0x1 != 0,
                })
            }
            DescriptorKind::Code => {
                let header = SegmentHeader::new(low);
                SegmentDescriptor::Code(CodeSegment {
                    header,
                    default_size: default_size(u128::from(low)) == 1,
                    conforming: header.type_ & 0x4 != 0,
                    readable: header.type_ & 0x2 != 0,
                    accessed: header.type_ & 0x1 != 0,
                })
            }
            DescriptorKind::Tss => {
                let system = SystemHeader::new(le_u128(bytes)?);
                SegmentDescriptor::Tss(TssDescriptor {
                    base: u64::from(system_base_high(system.raw)) << 32
                        | u64::from(system.header.base),
                    busy: system.header.type_ & 0x2 != 0,
                    system,
                })
            }
            DescriptorKind::CallGate => {
                let system = SystemHeader::new(le_u128(bytes)?);
                SegmentDescriptor::CallGate(CallGateDescriptor {
                    selector: gate_selector(system.raw),
                    offset: gate_offset(system.raw),
                    system,
                })
            }
        };
        Ok(descriptor)
    }

    pub fn kind(&self) -> DescriptorKind {
        match self {
            SegmentDescriptor::Null { .. } => DescriptorKind::Null,
            SegmentDescriptor::Data(_) => DescriptorKind::Data,
            SegmentDescriptor::Code(_) => DescriptorKind::Code,
            SegmentDescriptor::Tss(_) => DescriptorKind::Tss,
            SegmentDescriptor::CallGate(_) => DescriptorKind::CallGate,
        }
    }

    /// Bytes this descriptor occupies in the table.
    pub fn size(&self) -> usize {
        self.kind().size()
    }
}

impl fmt::Display for SegmentDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = self.kind();
        match self {
            SegmentDescriptor::Null { raw } => write!(f, "<{kind}> [{raw:x}]"),
            SegmentDescriptor::Data(data) => {
                let h = &data.header;
                write!(
                    f,
                    "<{kind}> {:#x}:{:x} [{}|b{}|e{}|w{}|a{}] {:x}",
                    h.base,
                    h.limit,
                    h.flags(),
                    u8::from(data.big),
                    u8::from(data.expand_down),
                    u8::from(data.writable),
                    u8::from(data.accessed),
                    h.raw
                )?;
                if h.long_mode {
                    write!(f, " (invalid l)")?;
                }
                Ok(())
            }
            SegmentDescriptor::Code(code) => {
                let h = &code.header;
                write!(
                    f,
                    "<{kind}> {:#x}:{:x} [{}|d{}|c{}|r{}|a{}] {:x}",
                    h.base,
                    h.limit,
                    h.flags(),
                    u8::from(code.default_size),
                    u8::from(code.conforming),
                    u8::from(code.readable),
                    u8::from(code.accessed),
                    h.raw
                )
            }
            SegmentDescriptor::Tss(tss) => {
                let s = &tss.system;
                write!(
                    f,
                    "<{kind}> {:#x}:{:x} [{}|type:{:x}|busy{}|rsvd:{:#x}|0:{}|rsvd:{:#x}] {:032x}",
                    tss.base,
                    s.header.limit,
                    s.header.flags(),
                    s.header.type_,
                    u8::from(tss.busy),
                    s.reserved_high,
                    s.zero,
                    s.reserved_low,
                    s.raw
                )
            }
            SegmentDescriptor::CallGate(gate) => {
                let s = &gate.system;
                write!(
                    f,
                    "<{kind}> {:#x}:{:#x} [p{}|dpl{}|0:{}] {:032x}",
                    gate.selector,
                    gate.offset,
                    u8::from(s.header.present),
                    s.header.dpl,
                    s.zero,
                    s.raw
                )
            }
        }
    }
}

pub(crate) fn le_u64(bytes: &[u8]) -> Result<u64, DescriptorError> {
    let head: [u8; 8] = bytes
        .get(..8)
        .and_then(|b| b.try_into().ok())
        .ok_or(DescriptorError::Truncated {
            needed: 8,
            available: bytes.len(),
        })?;
    Ok(u64::from_le_bytes(head))
}

pub(crate) fn le_u128(bytes: &[u8]) -> Result<u128, DescriptorError> {
    let head: [u8; 16] = bytes
        .get(..16)
        .and_then(|b| b.try_into().ok())
        .ok_or(DescriptorError::Truncated {
            needed: 16,
            available: bytes.len(),
        })?;
    Ok(u128::from_le_bytes(head))
}

// ═══════════════════════════════════════════════════════════════════════
//  Table walk
// ═══════════════════════════════════════════════════════════════════════

/// A descriptor and its byte offset (its selector) within the table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct GdtEntry {
    pub offset: u64,
    pub descriptor: SegmentDescriptor,
}

impl fmt::Display for GdtEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{:#x}]: {}", self.offset, self.descriptor)
    }
}

/// A GDT located by its GDTR value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Gdt {
    /// Linear base address.
    pub base: u64,
    /// Table limit: size in bytes minus one.
    pub limit: u16,
}

impl Gdt {
    pub fn new(base: u64, limit: u16) -> Self {
        Self { base, limit }
    }

    /// Decode every descriptor in the table, in order.
    ///
    /// The cursor advances by each descriptor's own size and never reads
    /// past `limit`.  Fewer than 8 trailing bytes are skipped with a
    /// warning; a 16-byte descriptor cut off by the limit is an error.
    pub fn decode<M: PhysicalMemory>(
        &self,
        reader: &LinearReader<'_, M>,
    ) -> Result<Vec<GdtEntry>, TableError> {
        let end = u64::from(self.limit) + 1;
        check_range(self.base, end)
            .map_err(|source| TableError::Read { offset: 0, source })?;
        let mut entries = Vec::new();
        let mut offset = 0u64;

        while offset < end {
            let remaining = end - offset;
            if remaining < SEGMENT_SIZE as u64 {
                warn!(
                    "GDT at {:#x}: {remaining} trailing bytes after offset {offset:#x}",
                    self.base
                );
                break;
            }

            let address = self.base + offset;
            let mut bytes = reader
                .read(address, SEGMENT_SIZE)
                .map_err(|source| TableError::Read { offset, source })?;
            let low = le_u64(&bytes).map_err(|source| TableError::Descriptor { offset, source })?;
            let kind = DescriptorKind::classify(low)
                .map_err(|source| TableError::Descriptor { offset, source })?;

            if kind.size() > SEGMENT_SIZE {
                if remaining < kind.size() as u64 {
                    return Err(TableError::Descriptor {
                        offset,
                        source: DescriptorError::Truncated {
                            needed: kind.size(),
                            available: remaining as usize,
                        },
                    });
                }
                let upper = address + SEGMENT_SIZE as u64;
                let high = reader
                    .read(upper, kind.size() - SEGMENT_SIZE)
                    .map_err(|source| TableError::Read { offset, source })?;
                bytes.extend_from_slice(&high);
            }

            let descriptor = SegmentDescriptor::create(&bytes)
                .map_err(|source| TableError::Descriptor { offset, source })?;
            debug!("GDT[{offset:#x}]: {kind}");
            entries.push(GdtEntry { offset, descriptor });
            offset += descriptor.size() as u64;
        }

        Ok(entries)
    }
}

// ═══════════════════════════════════════════════════════════════════════
//  Tests
// ═══════════════════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MmuConfig;
    use crate::mmu::Mmu;
    use crate::testutil::{PagedImage, RecordingMemory};
    use crate::verified::descriptor::{gate_entry, segment_entry, system_entry};

    const FLAGS_CODE64: u16 = 0xa09b;
    const FLAGS_DATA: u16 = 0xc093;
    const FLAGS_TSS: u16 = 0x808b;

    const GDT_VA: u64 = 0xffff_8000_0000_3000;
    const GDT_PA: u64 = 0x8000;

    fn table_bytes(entries: &[u128], sizes: &[usize]) -> Vec<u8> {
        entries
            .iter()
            .zip(sizes)
            .flat_map(|(raw, size)| raw.to_le_bytes()[..*size].to_vec())
            .collect()
    }

    fn boot_gdt() -> Vec<u8> {
        table_bytes(
            &[
                0,
                u128::from(segment_entry(FLAGS_CODE64, 0, 0xfffff)),
                u128::from(segment_entry(FLAGS_DATA, 0, 0xfffff)),
                system_entry(FLAGS_TSS, 0xffff_8880_0001_2000, 0x67),
                u128::from(segment_entry(0x00f3 | 0xc000, 0, 0xfffff)),
            ],
            &[8, 8, 8, 16, 8],
        )
    }

    fn decode(bytes: &[u8], limit: u16) -> Result<Vec<GdtEntry>, TableError> {
        let mut paged = PagedImage::new();
        paged.map_4k(GDT_VA, GDT_PA, 0);
        paged.write_bytes(GDT_PA, bytes);
        let mmu = Mmu::new(paged.image(), MmuConfig::default()).unwrap();
        let reader = LinearReader::new(&mmu, paged.root());
        Gdt::new(GDT_VA, limit).decode(&reader)
    }

    // ─── Classification ──────────────────────────────────────────────

    #[test]
    fn zero_bytes_are_null() {
        let descriptor = SegmentDescriptor::create(&[0; 8]).unwrap();
        assert_eq!(descriptor, SegmentDescriptor::Null { raw: 0 });
        assert_eq!(descriptor.size(), 8);
    }

    #[test]
    fn tss_type_nine_is_sixteen_bytes() {
        let raw = system_entry(0x0089, 0x1000, 0x67);
        let descriptor = SegmentDescriptor::create(&raw.to_le_bytes()).unwrap();
        let SegmentDescriptor::Tss(tss) = descriptor else {
            panic!("expected TSS, got {descriptor:?}");
        };
        assert_eq!(descriptor.size(), 16);
        assert_eq!(tss.base, 0x1000);
        assert!(!tss.busy);
        assert_eq!(tss.system.zero, 0);
    }

    #[test]
    fn call_gate_wins_over_tss_mask() {
        let raw = gate_entry(0xffff_ffff_8100_0000, 0x10, 0, 0x8f);
        let descriptor = SegmentDescriptor::create(&raw.to_le_bytes()).unwrap();
        let SegmentDescriptor::CallGate(gate) = descriptor else {
            panic!("expected call gate, got {descriptor:?}");
        };
        assert_eq!(gate.selector, 0x10);
        assert_eq!(gate.offset, 0xffff_ffff_8100_0000);
        assert_eq!(descriptor.size(), 16);
    }

    #[test]
    fn unsupported_system_type() {
        // LDT, type 0x2.
        let raw = segment_entry(0x0082, 0, 0);
        assert_eq!(
            SegmentDescriptor::create(&raw.to_le_bytes()),
            Err(DescriptorError::UnsupportedType { type_: 2, raw })
        );
    }

    #[test]
    fn sixteen_byte_kind_needs_sixteen_bytes() {
        let raw = system_entry(FLAGS_TSS, 0, 0x67);
        assert_eq!(
            SegmentDescriptor::create(&raw.to_le_bytes()[..8]),
            Err(DescriptorError::Truncated {
                needed: 16,
                available: 8
            })
        );
        assert!(matches!(
            SegmentDescriptor::create(&[0; 4]),
            Err(DescriptorError::Truncated { needed: 8, .. })
        ));
    }

    #[test]
    fn code_and_data_fields() {
        let code = segment_entry(FLAGS_CODE64, 0, 0xfffff);
        let SegmentDescriptor::Code(code) = SegmentDescriptor::create(&code.to_le_bytes()).unwrap()
        else {
            panic!("expected code segment");
        };
        assert!(code.header.long_mode);
        assert!(code.readable);
        assert!(code.accessed);
        assert!(!code.conforming);
        assert!(!code.default_size);
        assert_eq!(code.header.byte_limit(), 0xffff_ffff);

        let data = segment_entry(FLAGS_DATA, 0x1000, 0x1f);
        let SegmentDescriptor::Data(data) = SegmentDescriptor::create(&data.to_le_bytes()).unwrap()
        else {
            panic!("expected data segment");
        };
        assert_eq!(data.header.base, 0x1000);
        assert_eq!(data.header.limit, 0x1f);
        assert!(data.big);
        assert!(data.writable);
        assert!(!data.expand_down);
    }

    #[test]
    fn display_formats() {
        let null = SegmentDescriptor::create(&[0; 8]).unwrap();
        assert_eq!(null.to_string(), "<null> [0]");

        let code = segment_entry(FLAGS_CODE64, 0, 0xfffff);
        let code = SegmentDescriptor::create(&code.to_le_bytes()).unwrap();
        assert_eq!(
            code.to_string(),
            "<code> 0x0:fffff [g1|l1|avl0|p1|dpl0|d0|c0|r1|a1] af9b000000ffff"
        );

        let bad = segment_entry(FLAGS_DATA | 0x2000, 0, 0);
        let bad = SegmentDescriptor::create(&bad.to_le_bytes()).unwrap();
        assert!(bad.to_string().ends_with("(invalid l)"));
    }

    // ─── Table walk ──────────────────────────────────────────────────

    #[test]
    fn walk_advances_by_descriptor_size() {
        let bytes = boot_gdt();
        let entries = decode(&bytes, bytes.len() as u16 - 1).unwrap();

        let layout: Vec<_> = entries
            .iter()
            .map(|e| (e.offset, e.descriptor.kind()))
            .collect();
        assert_eq!(
            layout,
            [
                (0x00, DescriptorKind::Null),
                (0x08, DescriptorKind::Code),
                (0x10, DescriptorKind::Data),
                (0x18, DescriptorKind::Tss),
                (0x28, DescriptorKind::Data),
            ]
        );
        let SegmentDescriptor::Tss(tss) = entries[3].descriptor else {
            panic!("expected TSS");
        };
        assert_eq!(tss.base, 0xffff_8880_0001_2000);
        assert!(tss.busy);
        assert!(entries[4].descriptor.to_string().contains("dpl3"));
        assert_eq!(entries[1].to_string().split(':').next(), Some("[0x8]"));
    }

    #[test]
    fn walk_never_reads_past_limit() {
        let bytes = boot_gdt();
        let mut paged = PagedImage::new();
        paged.map_4k(GDT_VA, GDT_PA, 0);
        paged.write_bytes(GDT_PA, &bytes);
        let recording = RecordingMemory::new(paged.image());
        let mmu = Mmu::new(&recording, MmuConfig::default()).unwrap();
        let reader = LinearReader::new(&mmu, paged.root());

        // Three segments plus three stray bytes.
        let entries = Gdt::new(GDT_VA, 0x1a).decode(&reader).unwrap();
        assert_eq!(entries.len(), 3);
        let highest = recording
            .reads()
            .into_iter()
            .filter(|(address, _)| (GDT_PA..GDT_PA + 0x1000).contains(address))
            .map(|(address, size)| address + size.bytes() as u64)
            .max()
            .unwrap();
        assert_eq!(highest, GDT_PA + 0x18);
    }

    #[test]
    fn system_descriptor_cut_by_limit() {
        let bytes = boot_gdt();
        let err = decode(&bytes, 0x1f).unwrap_err();
        assert!(matches!(
            err,
            TableError::Descriptor {
                offset: 0x18,
                source: DescriptorError::Truncated {
                    needed: 16,
                    available: 8
                }
            }
        ));
    }

    #[test]
    fn unsupported_entry_reports_offset() {
        let mut bytes = boot_gdt();
        bytes[8..16].copy_from_slice(&segment_entry(0x0082, 0, 0).to_le_bytes());
        let err = decode(&bytes, bytes.len() as u16 - 1).unwrap_err();
        assert!(matches!(err, TableError::Descriptor { offset: 0x8, .. }));
    }

    #[test]
    fn unmapped_table_is_read_error() {
        let paged = PagedImage::new();
        let mmu = Mmu::new(paged.image(), MmuConfig::default()).unwrap();
        let reader = LinearReader::new(&mmu, paged.root());
        let err = Gdt::new(GDT_VA, 0x2f).decode(&reader).unwrap_err();
        assert!(matches!(
            err,
            TableError::Read {
                offset: 0,
                source: TranslationError::Unmapped { .. }
            }
        ));
    }

    #[test]
    fn table_past_top_of_memory_is_rejected() {
        let mut paged = PagedImage::new();
        paged.map_4k(0xffff_ffff_ffff_f000, GDT_PA, 0);
        paged.map_4k(0, GDT_PA + 0x1000, 0);
        let mmu = Mmu::new(paged.image(), MmuConfig::default()).unwrap();
        let reader = LinearReader::new(&mmu, paged.root());

        let err = Gdt::new(0xffff_ffff_ffff_fff8, 0xf)
            .decode(&reader)
            .unwrap_err();
        assert!(matches!(
            err,
            TableError::Read {
                offset: 0,
                source: TranslationError::Wrapped { length: 0x10, .. }
            }
        ));
    }
}
