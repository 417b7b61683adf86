//! Verified pure functions for guestscope.
//!
//! This module contains the arithmetic core of the translator and the
//! descriptor decoders: bit-slice extraction, virtual-address splitting,
//! frame-field masking, and the raw field layouts of segment and gate
//! descriptors.  Every function takes values in and returns values out,
//! with **no I/O and no reads of guest memory**.
//!
//! The effectful shell (`mmu`, `linear`, `gdt`, `idt`) drives the memory
//! reader and delegates every bit manipulation here, so the two halves can
//! be tested independently.
//!
//! # Corresponding Verus specs
//!
//! Formal specifications live in `verus/paging_spec.rs`.  They are not
//! compiled by `cargo`; they are consumed by the Verus verifier separately.
//!
//! [Verus]: https://github.com/verus-lang/verus

pub mod bits;
pub mod descriptor;
pub mod paging;
