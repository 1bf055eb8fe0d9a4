//! # hppa-link — PA-RISC ELF relocation and procedure-linkage engine
//!
//! `hppa-link` resolves symbolic relocation records into final bit patterns
//! inside PA-RISC instructions and data words. It owns the link-time side
//! tables position-independent code needs — the DLT (the GOT analog), the
//! procedure linkage table, and function descriptors — and synthesizes
//! long-branch stubs for calls whose target a direct branch cannot reach.
//!
//! It is a linked-in component: object-file parsing, section layout, and
//! address assignment belong to the surrounding linker driver. The driver
//! registers sections and symbols with a [`LinkSession`], sizes and builds
//! stubs across the address-assignment step, then applies each section's
//! records with [`relocate_section`].
//!
//! ## Quick Start
//!
//! ```rust
//! use hppa_link::{
//!     relocate_section, LinkOptions, LinkSession, RelocCode, RelocationRecord, Section,
//!     SectionFlags, Symbol, WordSize,
//! };
//!
//! let mut session = LinkSession::new(LinkOptions::new(WordSize::Elf32));
//! let text = session.add_section(Section {
//!     name: ".text".into(),
//!     vma: 0x1000,
//!     file_offset: 0,
//!     size: 4,
//!     flags: SectionFlags { alloc: true, load: true, readonly: true, code: true },
//!     output_offset: 0,
//! });
//! let datum = session.add_symbol(Symbol::absolute("datum", 0x1234_5678));
//!
//! // ldil L'datum,%r1
//! let mut contents = 0x2020_0000u32.to_be_bytes().to_vec();
//! let mut records = [RelocationRecord::rela(0, RelocCode::Dir21L, datum, 0)];
//! let summary =
//!     relocate_section(&mut session, text, &mut records, &mut contents, None, &mut ())
//!         .unwrap();
//! assert_eq!(summary.applied, 1);
//! assert_eq!(contents, 0x2022_6246u32.to_be_bytes());
//! ```
//!
//! ## Call order
//!
//! 1. [`StubPlan::size`] over every input section's records, before any
//!    address is assigned, to learn how much stub space to reserve.
//! 2. The external linker assigns addresses, including the stub region's.
//! 3. [`StubPlan::build`] consumes the plan at its final base address.
//! 4. [`relocate_section`] once per input section, with the built image.
//!
//! The build step consumes the plan by value, so running the phases out of
//! order is a compile error rather than a link-time surprise.

#![cfg_attr(not(feature = "std"), no_std)]
#![forbid(unsafe_code)]
// ── Pedantic lint policy ─────────────────────────────────────────────────
// Relocation processing is wall-to-wall integer bit surgery: narrowing and
// sign-changing casts between field widths, and dense hex literals taken
// straight from the architecture manual (0x1f_1ffd, 0xe020_2002). The
// lints below fire constantly on exactly that code and are accepted here.
#![allow(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_possible_wrap,
    clippy::cast_lossless,
    clippy::unreadable_literal,
    clippy::match_same_arms,
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::too_many_lines,
    clippy::similar_names,
    clippy::doc_markdown
)]

extern crate alloc;

/// Fixup-request to relocation-type mapping.
pub mod classify;
/// Error types and their display strings.
pub mod error;
/// Field selectors and the scattered immediate encodings.
pub mod field;
/// Instruction-word patching and implicit-addend recovery.
pub mod insn;
/// Relocation codes, descriptors, and input records.
pub mod reloc;
/// The per-section relocation driver and value resolver.
pub mod relocate;
/// Link-session state: arenas, side tables, segment bases.
pub mod session;
/// Long-branch stub planning and emission.
pub mod stub;

// Re-exports
pub use classify::{classify, BaseOp, Format};
pub use error::LinkError;
pub use field::{field_adjust, FieldSelector};
pub use insn::{implicit_addend, insn_format, patch_insn, InsnFormat};
pub use reloc::{
    descriptor_for_wire, Addend, OverflowCheck, RelocCode, RelocDescriptor, RelocationRecord,
    WIRE_TABLE_LEN,
};
pub use relocate::{
    relocate_section, CollectedDiagnostics, DiagnosticEvent, Diagnostics, RelocationSummary,
};
pub use session::{
    is_local_label, AuxEntry, AuxKey, Binding, LinkMode, LinkOptions, LinkSession, Section,
    SectionFlags, SectionId, SegmentBases, Symbol, SymbolId, SymbolPlacement, SymbolResolution,
    WordSize,
};
pub use stub::{is_millicode, BranchClass, StubImage, StubInput, StubKey, StubKind, StubPlan};
