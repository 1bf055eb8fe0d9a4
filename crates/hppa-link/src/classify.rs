//! Mapping generic fixup requests onto concrete relocation types.
//!
//! Assemblers and object writers think in terms of a base operation (an
//! absolute reference, a GP-relative reference, a call), an instruction
//! format, and a field selector. Which relocation type that triple lands on
//! is an ABI table in its own right, reproduced here.

use crate::field::FieldSelector;
use crate::reloc::RelocCode;
use crate::session::WordSize;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// The generic operation a fixup wants performed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum BaseOp {
    /// Absolute reference to a symbol.
    Direct,
    /// Reference relative to the global pointer.
    GpRel,
    /// PC-relative call (or load/store, for the 14-bit forms).
    PcrelCall,
    /// Marker that establishes the segment base.
    SegBase,
    /// 32-bit segment-relative datum.
    SegRel32,
    /// C++ vtable garbage-collection hint.
    VtableEntry,
    /// C++ vtable inheritance hint.
    VtableInherit,
}

/// Instruction or data format the fixup patches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Format {
    /// 12-bit conditional-branch displacement.
    W12,
    /// 14-bit load/store displacement.
    W14,
    /// 17-bit branch displacement.
    W17,
    /// 21-bit left immediate.
    W21,
    /// 22-bit branch displacement.
    W22,
    /// 32-bit word.
    W32,
    /// 64-bit doubleword.
    W64,
}

/// Picks the relocation type for a base operation, format, and selector.
///
/// Returns `None` for combinations the ABI does not define. The word size
/// matters twice: a 32-bit absolute datum is section-relative on 64-bit
/// targets (DWARF relies on this), and GP-relative types come in a
/// 32-bit (`DPREL`) and a 64-bit (`DLTREL`) family at a fixed distance
/// from each other in the numbering.
#[must_use]
pub fn classify(
    base: BaseOp,
    format: Format,
    field: FieldSelector,
    word: WordSize,
) -> Option<RelocCode> {
    match base {
        BaseOp::Direct => direct(format, field, word),
        BaseOp::GpRel => gp_rel(format, field, word),
        BaseOp::PcrelCall => pcrel_call(format, field),
        BaseOp::SegBase => Some(RelocCode::Segbase),
        BaseOp::SegRel32 => Some(RelocCode::Segrel32),
        BaseOp::VtableEntry => Some(RelocCode::GnuVtentry),
        BaseOp::VtableInherit => Some(RelocCode::GnuVtinherit),
    }
}

fn direct(format: Format, field: FieldSelector, word: WordSize) -> Option<RelocCode> {
    use FieldSelector as S;

    Some(match (format, field) {
        (Format::W14, S::F) => RelocCode::Dir14F,
        (Format::W14, S::R | S::Rr | S::Rd) => RelocCode::Dir14R,
        (Format::W14, S::Rt) => RelocCode::Dltind14R,
        (Format::W14, S::Rtp) => RelocCode::LtoffFptr14DR,
        (Format::W14, S::T) => RelocCode::Dltind14F,
        (Format::W14, S::Rp) => RelocCode::Plabel14R,

        (Format::W17, S::F) => RelocCode::Dir17F,
        (Format::W17, S::R | S::Rr | S::Rd) => RelocCode::Dir17R,

        (Format::W21, S::L | S::Lr | S::Ld | S::Nl | S::Nlr) => RelocCode::Dir21L,
        (Format::W21, S::Lt) => RelocCode::Dltind21L,
        (Format::W21, S::Ltp) => RelocCode::LtoffFptr21L,
        (Format::W21, S::Lp) => RelocCode::Plabel21L,

        (Format::W32, S::F) => match word {
            WordSize::Elf32 => RelocCode::Dir32,
            // A 32-bit datum on a 64-bit target is section relative.
            WordSize::Elf64 => RelocCode::Secrel32,
        },
        (Format::W32, S::P) => RelocCode::Plabel32,

        (Format::W64, S::F) => RelocCode::Dir64,
        (Format::W64, S::P) => RelocCode::Fptr64,

        _ => return None,
    })
}

fn gp_rel(format: Format, field: FieldSelector, word: WordSize) -> Option<RelocCode> {
    use FieldSelector as S;

    // The two families sit at identical offsets from their 21L member.
    Some(match (format, field, word) {
        (Format::W14, S::R | S::Rr | S::Rd, WordSize::Elf32) => RelocCode::Dprel14R,
        (Format::W14, S::R | S::Rr | S::Rd, WordSize::Elf64) => RelocCode::Dltrel14R,
        (Format::W14, S::F, WordSize::Elf32) => RelocCode::Dprel14F,
        (Format::W14, S::F, WordSize::Elf64) => RelocCode::Dltrel14F,
        (Format::W21, S::L | S::Lr | S::Ld | S::Nl | S::Nlr, WordSize::Elf32) => {
            RelocCode::Dprel21L
        }
        (Format::W21, S::L | S::Lr | S::Ld | S::Nl | S::Nlr, WordSize::Elf64) => {
            RelocCode::Dltrel21L
        }
        _ => return None,
    })
}

fn pcrel_call(format: Format, field: FieldSelector) -> Option<RelocCode> {
    use FieldSelector as S;

    Some(match (format, field) {
        (Format::W12, S::F) => RelocCode::Pcrel12F,
        // The 14-bit forms are not calls at all but PC-relative
        // loads and stores.
        (Format::W14, S::R | S::Rr | S::Rd) => RelocCode::Pcrel14R,
        (Format::W14, S::F) => RelocCode::Pcrel14F,
        (Format::W17, S::R | S::Rr | S::Rd) => RelocCode::Pcrel17R,
        (Format::W17, S::F) => RelocCode::Pcrel17F,
        (Format::W21, S::L | S::Lr | S::Ld | S::Nl | S::Nlr) => RelocCode::Pcrel21L,
        (Format::W22, S::F) => RelocCode::Pcrel22F,
        _ => return None,
    })
}
