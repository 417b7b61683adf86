//! Out-of-guest inspection of x86_64 virtual memory and descriptor tables.
//!
//! This crate reads a stopped guest's paging structures and protection
//! tables through nothing more than a physical-memory reader.  Given a
//! CR3 value it translates linear addresses through the 4-level
//! hierarchy, and given GDTR/IDTR it decodes every segment descriptor and
//! interrupt gate into typed records.
//!
//! # Core Capabilities
//!
//! 1. **Translation:** 4-level walk with 1 GiB / 2 MiB short-circuiting
//!    and reserved-bit checks against MAXPHYADDR
//! 2. **Linear reads:** arbitrary byte ranges across pages of any size
//! 3. **GDT:** null, code, data, TSS and call-gate descriptors
//! 4. **IDT:** interrupt and trap gates, labelled through a symbol map
//! 5. **Compaction:** run-length folding of repetitive tables for display
//!
//! # Example
//!
//! ```no_run
//! use guestscope::config::MmuConfig;
//! use guestscope::gdt::Gdt;
//! use guestscope::linear::LinearReader;
//! use guestscope::memory::GuestImage;
//! use guestscope::mmu::Mmu;
//!
//! let image = GuestImage::load("guest.raw", 0).unwrap();
//! let mmu = Mmu::new(&image, MmuConfig::default()).unwrap();
//!
//! let cr3 = 0x1000;
//! let translation = mmu.resolve(cr3, 0xffff_ffff_8100_0000).unwrap();
//! println!("{translation}");
//!
//! let reader = LinearReader::new(&mmu, cr3);
//! for entry in Gdt::new(0xffff_fe00_0000_1000, 0x7f).decode(&reader).unwrap() {
//!     println!("{entry}");
//! }
//! ```
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐   read_physical   ┌──────────┐
//! │ GuestImage / │ ◄──────────────── │   Mmu    │ ◄── CR3, va
//! │ Interruptible│                   └────┬─────┘
//! └──────────────┘                        │ resolve per page
//!                                    ┌────▼─────────┐
//!                                    │ LinearReader │
//!                                    └────┬─────────┘
//!                          8/16-byte slots│
//!                              ┌──────────┴──────────┐
//!                         ┌────▼────┐           ┌────▼────┐
//!                         │   Gdt   │           │   Idt   │ ── SymbolMap
//!                         └─────────┘           └────┬────┘
//!                                                    │ compact
//! ```
//!
//! All bit arithmetic lives in [`verified`] as pure functions; the other
//! modules only sequence reads and assemble results.

pub mod compact;
pub mod config;
pub mod gdt;
pub mod idt;
pub mod linear;
pub mod memory;
pub mod mmu;
pub mod paging;
pub mod registers;
pub mod symbols;
pub mod verified;

#[cfg(test)]
mod testutil;
