//! Inserting relocated values into instruction words.
//!
//! PA-RISC has a small number of immediate layouts shared by a large number
//! of relocation types, so patching dispatches on the layout, not the type.
//! The inverse direction recovers a pre-added addend from an already
//! encoded field, which is how records without an explicit addend carry
//! their constant.

use crate::field::{
    assemble_12, assemble_17, assemble_21, assemble_22, disassemble_12, disassemble_17,
    disassemble_21, disassemble_22, low_sign_extend, low_sign_unext, sign_extend,
};
use crate::reloc::RelocCode;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Immediate layout a relocation type patches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum InsnFormat {
    /// 12-bit conditional branch.
    Branch12,
    /// 17-bit branch, `b`/`bl` and `be`.
    Branch17,
    /// 22-bit branch.
    Branch22,
    /// 21-bit `ldil`/`addil` immediate.
    Imm21,
    /// 14-bit low-sign displacement, `ldo` and word loads/stores.
    Imm14,
    /// 14-bit displacement of doubleword loads/stores.
    Imm14Dword,
    /// 14-bit displacement of floating-point word loads/stores.
    Imm14Fword,
    /// Data word, patched outside the instruction path.
    Word32,
    /// Data doubleword, patched outside the instruction path.
    Word64,
    /// Nothing to patch.
    None,
}

/// Returns the immediate layout used by a relocation type.
#[must_use]
pub fn insn_format(code: RelocCode) -> InsnFormat {
    use RelocCode as R;

    match code {
        R::Pcrel12F => InsnFormat::Branch12,

        R::Pcrel17F
        | R::Pcrel17C
        | R::Pcrel17R
        | R::Dir17F
        | R::Dir17R
        | R::Baserel17R
        | R::Baserel17F => InsnFormat::Branch17,

        R::Pcrel22F | R::Pcrel22C => InsnFormat::Branch22,

        R::Dir21L
        | R::Pcrel21L
        | R::Dprel21L
        | R::Dltrel21L
        | R::Dltind21L
        | R::LtoffFptr21L
        | R::Pltoff21L
        | R::LtoffTp21L
        | R::Tprel21L
        | R::Plabel21L
        | R::Baserel21L => InsnFormat::Imm21,

        R::Dir14R
        | R::Dir14F
        | R::Dir16F
        | R::Pcrel14R
        | R::Pcrel14F
        | R::Pcrel16F
        | R::Dprel14R
        | R::Dprel14F
        | R::Dltrel14R
        | R::Dltrel14F
        | R::Dltind14R
        | R::Dltind14F
        | R::LtoffFptr14R
        | R::LtoffFptr16F
        | R::LtoffTp14R
        | R::LtoffTp14F
        | R::LtoffTp16F
        | R::Gprel16F
        | R::Pltoff14R
        | R::Pltoff14F
        | R::Pltoff16F
        | R::Ltoff16F
        | R::Tprel14R
        | R::Tprel16F
        | R::Plabel14R
        | R::Baserel14R
        | R::Baserel14F => InsnFormat::Imm14,

        R::Dir14DR
        | R::Dir16DF
        | R::Pcrel14DR
        | R::Pcrel16DF
        | R::Dprel14DR
        | R::Dltrel14DR
        | R::Dltind14DR
        | R::LtoffFptr14DR
        | R::LtoffFptr16DF
        | R::LtoffTp14DR
        | R::LtoffTp16DF
        | R::Gprel16DF
        | R::Pltoff14DR
        | R::Pltoff16DF
        | R::Ltoff16DF
        | R::Tprel14DR
        | R::Tprel16DF
        | R::Baserel14DR => InsnFormat::Imm14Dword,

        R::Dir14WR
        | R::Dir16WF
        | R::Pcrel14WR
        | R::Pcrel16WF
        | R::Dprel14WR
        | R::Dltrel14WR
        | R::Dltind14WR
        | R::LtoffFptr14WR
        | R::LtoffFptr16WF
        | R::LtoffTp14WR
        | R::LtoffTp16WF
        | R::Gprel16WF
        | R::Pltoff14WR
        | R::Pltoff16WF
        | R::Ltoff16WF
        | R::Tprel14WR
        | R::Tprel16WF
        | R::Baserel14WR => InsnFormat::Imm14Fword,

        R::Dir32
        | R::Pcrel32
        | R::Secrel32
        | R::Segrel32
        | R::Tprel32
        | R::LtoffFptr32
        | R::Plabel32 => InsnFormat::Word32,

        R::Dir64
        | R::Pcrel64
        | R::Fptr64
        | R::Gprel64
        | R::Ltoff64
        | R::Segrel64
        | R::Tprel64
        | R::LtoffFptr64
        | R::LtoffTp64 => InsnFormat::Word64,

        R::None
        | R::Setbase
        | R::Segbase
        | R::GnuVtentry
        | R::GnuVtinherit
        | R::Copy
        | R::Iplt
        | R::Eplt
        | R::Unimplemented => InsnFormat::None,
    }
}

/// Installs an adjusted field value into an instruction word.
///
/// Branch values must already be converted to word displacements. Bits
/// outside the immediate field are preserved; the word and no-op layouts
/// return the instruction untouched since their patching happens on the
/// data path.
#[must_use]
pub fn patch_insn(insn: u32, value: i64, format: InsnFormat) -> u32 {
    let v = value as u32;
    match format {
        InsnFormat::Branch12 => (insn & !0x1ffd) | assemble_12(v),
        InsnFormat::Branch17 => (insn & !0x1f_1ffd) | assemble_17(v),
        InsnFormat::Branch22 => (insn & !0x3ff_1ffd) | assemble_22(v),
        InsnFormat::Imm21 => (insn & !0x1f_ffff) | assemble_21(v),
        InsnFormat::Imm14 => (insn & !0x3fff) | low_sign_unext(value, 14),
        InsnFormat::Imm14Dword => {
            (insn & !0x3ff1) | ((v & 0x2000) >> 13) | ((v & 0x1ff8) << 1)
        }
        InsnFormat::Imm14Fword => {
            (insn & !0x3ff9) | ((v & 0x2000) >> 13) | ((v & 0x1ffc) << 1)
        }
        InsnFormat::Word32 | InsnFormat::Word64 | InsnFormat::None => insn,
    }
}

/// Recovers the addend a record left pre-added inside an instruction.
///
/// The inverse of [`patch_insn`]: branch displacements come back in bytes,
/// the 21-bit left form shifted back up to its address weight. The word
/// layouts return zero because their addend lives in the data word itself
/// and is read by the caller.
#[must_use]
pub fn implicit_addend(insn: u32, format: InsnFormat) -> i64 {
    match format {
        InsnFormat::Branch12 => sign_extend(u64::from(disassemble_12(insn)), 12) << 2,
        InsnFormat::Branch17 => sign_extend(u64::from(disassemble_17(insn)), 17) << 2,
        InsnFormat::Branch22 => sign_extend(u64::from(disassemble_22(insn)), 22) << 2,
        InsnFormat::Imm21 => sign_extend(u64::from(disassemble_21(insn)), 21) << 11,
        InsnFormat::Imm14 => low_sign_extend(u64::from(insn) & 0x3fff, 14),
        InsnFormat::Imm14Dword => {
            let v = ((insn >> 1) & 0x1ff8) | ((insn & 1) << 13);
            sign_extend(u64::from(v), 14)
        }
        InsnFormat::Imm14Fword => {
            let v = ((insn >> 1) & 0x1ffc) | ((insn & 1) << 13);
            sign_extend(u64::from(v), 14)
        }
        InsnFormat::Word32 | InsnFormat::Word64 | InsnFormat::None => 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_follow_the_name_suffix() {
        assert_eq!(insn_format(RelocCode::Pcrel12F), InsnFormat::Branch12);
        assert_eq!(insn_format(RelocCode::Pcrel17C), InsnFormat::Branch17);
        assert_eq!(insn_format(RelocCode::Dir17R), InsnFormat::Branch17);
        assert_eq!(insn_format(RelocCode::Pcrel22F), InsnFormat::Branch22);
        assert_eq!(insn_format(RelocCode::LtoffTp21L), InsnFormat::Imm21);
        assert_eq!(insn_format(RelocCode::Ltoff16F), InsnFormat::Imm14);
        assert_eq!(insn_format(RelocCode::Gprel16DF), InsnFormat::Imm14Dword);
        assert_eq!(insn_format(RelocCode::Dltind14WR), InsnFormat::Imm14Fword);
        assert_eq!(insn_format(RelocCode::Segrel32), InsnFormat::Word32);
        assert_eq!(insn_format(RelocCode::Fptr64), InsnFormat::Word64);
        assert_eq!(insn_format(RelocCode::Setbase), InsnFormat::None);
    }

    #[test]
    fn patch_preserves_opcode_bits() {
        // ldil %r1 with a left immediate.
        let patched = patch_insn(0x2020_0000, 0x2468a, InsnFormat::Imm21);
        assert_eq!(patched & !0x1f_ffff, 0x2020_0000);
        assert_eq!(patched, 0x2020_0000 | 0x26246);

        // bl with a 17-bit word displacement keeps its register field.
        let bl = 0xe840_0000u32;
        let patched = patch_insn(bl, 0x100, InsnFormat::Branch17);
        assert_eq!(patched & !0x1f_1ffd, bl);
    }

    #[test]
    fn patch_zero_word_dir21l_example() {
        assert_eq!(patch_insn(0, 0x2468a, InsnFormat::Imm21), 0x0002_6246);
    }

    #[test]
    fn low_sign_displacement_example() {
        // ldo -4(%r31),%r31
        let ldo = patch_insn(0x37ff_0000, -4, InsnFormat::Imm14);
        assert_eq!(ldo, 0x37ff_3ff9);
    }

    #[test]
    fn implicit_addend_roundtrip() {
        for (format, value) in [
            (InsnFormat::Branch12, -0x800i64),
            (InsnFormat::Branch12, 0x7fc),
            (InsnFormat::Branch17, -0x4_0000),
            (InsnFormat::Branch17, 0x3_fffc),
            (InsnFormat::Branch22, -0x80_0000),
            (InsnFormat::Branch22, 0x40_1234 & !3),
            (InsnFormat::Imm14, -8192),
            (InsnFormat::Imm14, 8191),
            (InsnFormat::Imm14Dword, -8192),
            (InsnFormat::Imm14Dword, 0x1ff8),
            (InsnFormat::Imm14Fword, 0x1ffc),
            (InsnFormat::Imm14Fword, -4),
        ] {
            let stored = match format {
                InsnFormat::Branch12 | InsnFormat::Branch17 | InsnFormat::Branch22 => value >> 2,
                _ => value,
            };
            let insn = patch_insn(0, stored, format);
            assert_eq!(implicit_addend(insn, format), value, "{format:?} {value:#x}");
        }
    }

    #[test]
    fn imm21_implicit_addend_keeps_address_weight() {
        let insn = patch_insn(0x2020_0000, 0x2468a, InsnFormat::Imm21);
        assert_eq!(implicit_addend(insn, InsnFormat::Imm21), 0x2468a << 11);
    }

    #[test]
    fn word_formats_do_not_touch_instructions() {
        assert_eq!(patch_insn(0xdead_beef, 0x1234, InsnFormat::Word32), 0xdead_beef);
        assert_eq!(patch_insn(0xdead_beef, 0x1234, InsnFormat::None), 0xdead_beef);
        assert_eq!(implicit_addend(0xdead_beef, InsnFormat::Word64), 0);
    }
}
