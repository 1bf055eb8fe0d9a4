//! Field selectors and the scattered immediate encodings.
//!
//! PA-RISC instructions spread immediate operands across non-contiguous bit
//! ranges and the assembler syntax selects which slice of an address a
//! relocation is allowed to install (`L'x`, `R'x` and friends). This module
//! holds both halves of that story: [`field_adjust`] applies a selector to a
//! symbol value, and the `assemble_*`/`disassemble_*` pairs move the adjusted
//! value in and out of the instruction bit layout.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Address-field selector applied to a symbol value before insertion.
///
/// The left/right pairs split a 32-bit value at bit 11 so that a two
/// instruction sequence (`ldil`/`ldo`, `ldil`/`be`, ...) can materialize a
/// full address: the left part feeds a 21-bit immediate, the right part an
/// 11-bit one. The rounding variants exist so that the right part can carry
/// part of the addend in its sign.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum FieldSelector {
    /// Whole value, unmodified.
    F,
    /// Left part after rounding the value to the next 2048 boundary.
    Ls,
    /// Right part as an 11-bit signed quantity.
    Rs,
    /// Left 21 bits of the value.
    L,
    /// Right 11 bits of the value.
    R,
    /// Left part rounded up unconditionally to a 2048 multiple.
    Ld,
    /// Right part with all upper bits forced on.
    Rd,
    /// Left part with the addend rounded to a multiple of 8192.
    Lr,
    /// Right part with the addend rounded to a multiple of 8192.
    Rr,
    /// Null selector, the field becomes zero.
    N,
    /// Null variant of `L`.
    Nl,
    /// Null variant of `Lr`.
    Nlr,
    /// Procedure label (whole value).
    P,
    /// Left part of a procedure label.
    Lp,
    /// Right part of a procedure label.
    Rp,
    /// Linkage-table slot (whole value).
    T,
    /// Left part of a linkage-table offset.
    Lt,
    /// Right part of a linkage-table offset.
    Rt,
    /// Left part of a descriptor linkage-table offset.
    Ltp,
    /// Right part of a descriptor linkage-table offset.
    Rtp,
}

fn ones(len: u32) -> u64 {
    (1u64 << len) - 1
}

/// Sign-extends the low `len` bits of `x`.
#[must_use]
pub fn sign_extend(x: u64, len: u32) -> i64 {
    let sign = 1u64 << (len - 1);
    ((x & ones(len)) ^ sign).wrapping_sub(sign) as i64
}

/// Sign-extends a `len`-bit value whose sign lives in the lowest bit.
#[must_use]
pub fn low_sign_extend(x: u64, len: u32) -> i64 {
    ((x & ones(len)) >> 1) as i64 - (((x & 1) << (len - 1)) as i64)
}

/// Truncates `x` to its low `len` bits.
#[must_use]
pub fn sign_unext(x: i64, len: u32) -> u32 {
    (x as u64 & ones(len)) as u32
}

/// Truncates `x` to `len` bits and rotates the sign down to bit 0.
#[must_use]
pub fn low_sign_unext(x: i64, len: u32) -> u32 {
    let temp = sign_unext(x, len - 1);
    let sign = ((x as u64) >> (len - 1)) as u32 & 1;
    (temp << 1) | sign
}

/// Deposits a 12-bit branch displacement into its instruction layout.
#[must_use]
pub fn assemble_12(x: u32) -> u32 {
    ((x & 0x800) >> 11) | ((x & 0x400) >> 8) | ((x & 0x3ff) << 3)
}

/// Recovers the 12-bit displacement from instruction bits.
#[must_use]
pub fn disassemble_12(insn: u32) -> u32 {
    ((insn >> 3) & 0x3ff) | (((insn >> 2) & 1) << 10) | ((insn & 1) << 11)
}

/// Deposits a 14-bit low-sign immediate (`ldo`/`ldw` displacement form).
#[must_use]
pub fn assemble_14(x: u32) -> u32 {
    ((x & 0x1fff) << 1) | ((x & 0x2000) >> 13)
}

/// Recovers the 14-bit low-sign immediate from instruction bits.
#[must_use]
pub fn disassemble_14(insn: u32) -> u32 {
    ((insn >> 1) & 0x1fff) | ((insn & 1) << 13)
}

/// Deposits a wide-mode 16-bit immediate.
///
/// The wide form keeps the sign in bit 0 and flips the two bits below it
/// when the value is negative.
#[must_use]
pub fn assemble_16(x: u32) -> u32 {
    let t = (x << 1) & 0xffff;
    let s = x & 0x8000;
    (t ^ s ^ (s >> 1)) | (s >> 15)
}

/// Recovers a wide-mode 16-bit immediate from instruction bits.
#[must_use]
pub fn disassemble_16(insn: u32) -> u32 {
    let sign = insn & 1;
    let t = if sign == 1 {
        (insn & 0xfffe) ^ 0xc000
    } else {
        insn & 0xffff
    };
    (t >> 1) | (sign << 15)
}

/// Deposits a 17-bit branch displacement into its instruction layout.
#[must_use]
pub fn assemble_17(x: u32) -> u32 {
    ((x & 0x10000) >> 16)
        | ((x & 0x0f800) << 5)
        | ((x & 0x00400) >> 8)
        | ((x & 0x003ff) << 3)
}

/// Recovers the 17-bit displacement from instruction bits.
#[must_use]
pub fn disassemble_17(insn: u32) -> u32 {
    ((insn & 1) << 16)
        | (((insn >> 16) & 0x1f) << 11)
        | (((insn >> 2) & 1) << 10)
        | ((insn >> 3) & 0x3ff)
}

/// Deposits a 21-bit left immediate (`ldil`/`addil` operand).
#[must_use]
pub fn assemble_21(x: u32) -> u32 {
    ((x & 0x10_0000) >> 20)
        | ((x & 0x0f_fe00) >> 8)
        | ((x & 0x00_0180) << 7)
        | ((x & 0x00_007c) << 14)
        | ((x & 0x00_0003) << 12)
}

/// Recovers the 21-bit immediate from instruction bits.
#[must_use]
pub fn disassemble_21(insn: u32) -> u32 {
    ((insn & 1) << 20)
        | (((insn >> 1) & 0x7ff) << 9)
        | (((insn >> 14) & 3) << 7)
        | (((insn >> 16) & 0x1f) << 2)
        | ((insn >> 12) & 3)
}

/// Deposits a 22-bit branch displacement into its instruction layout.
#[must_use]
pub fn assemble_22(x: u32) -> u32 {
    ((x & 0x20_0000) >> 21)
        | ((x & 0x1f_0000) << 5)
        | ((x & 0x00_f800) << 5)
        | ((x & 0x00_0400) >> 8)
        | ((x & 0x00_03ff) << 3)
}

/// Recovers the 22-bit displacement from instruction bits.
#[must_use]
pub fn disassemble_22(insn: u32) -> u32 {
    ((insn & 1) << 21)
        | (((insn >> 21) & 0x1f) << 16)
        | (((insn >> 16) & 0x1f) << 11)
        | (((insn >> 2) & 1) << 10)
        | ((insn >> 3) & 0x3ff)
}

fn round_addend(constant: i64) -> i64 {
    constant.wrapping_add(0x1000) & !0x1fff
}

/// Applies a field selector to a symbol value plus addend.
///
/// `value` is the resolved symbol address and `constant` the relocation
/// addend (possibly biased, e.g. by -8 for calls). The rounding selectors
/// `Lr`/`Rr` fold the addend into the split in a way that keeps
/// `(lr << 11) + rr` equal to the full sum; everything else works on the
/// plain sum. The null selectors produce zero so the linker can patch the
/// field out entirely.
#[must_use]
pub fn field_adjust(value: u64, constant: i64, sel: FieldSelector) -> i64 {
    use FieldSelector as S;

    let direct = value.wrapping_add(constant as u64);
    match sel {
        S::F | S::P | S::T => direct as i64,
        S::N | S::Nl => 0,
        S::Ls => (direct.wrapping_add(0x400) >> 11) as i64,
        S::Rs => {
            let low = (direct & 0x7ff) as i64;
            if low & 0x400 != 0 {
                low - 0x800
            } else {
                low
            }
        }
        S::L | S::Lp | S::Lt | S::Ltp => (direct >> 11) as i64,
        S::R | S::Rp | S::Rt | S::Rtp => (direct & 0x7ff) as i64,
        S::Ld => (direct.wrapping_add(0x800) >> 11) as i64,
        S::Rd => (direct | !0x7ff_u64) as i64,
        S::Lr | S::Nlr => {
            let rounded = round_addend(constant);
            (value.wrapping_add(rounded as u64) >> 11) as i64
        }
        S::Rr => {
            let rounded = round_addend(constant);
            ((value.wrapping_add(rounded as u64) & 0x7ff) as i64)
                .wrapping_add(constant.wrapping_sub(rounded))
        }
    }
}

/// Reports whether `value` survives truncation to a `bits`-wide field.
///
/// Matches the lax bitfield rule used for relocation overflow checks: the
/// value may be either a signed or an unsigned quantity, so anything in
/// `[-2^(bits-1), 2^bits)` is accepted. Zero-width and 64-bit fields accept
/// everything.
#[must_use]
pub fn fits_bitfield(value: i64, bits: u8) -> bool {
    if bits == 0 || bits >= 64 {
        return true;
    }
    let bits = u32::from(bits);
    value >= -(1i64 << (bits - 1)) && value < (1i64 << bits)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sign_extend_basics() {
        assert_eq!(sign_extend(0x1ffff, 17), -1);
        assert_eq!(sign_extend(0x0ffff, 17), 0xffff);
        assert_eq!(sign_extend(0x10000, 17), -65536);
    }

    #[test]
    fn low_sign_forms() {
        // The low bit is the sign in the 14-bit displacement format.
        assert_eq!(low_sign_extend(1, 14), -8192);
        assert_eq!(low_sign_extend(2, 14), 1);
        assert_eq!(low_sign_unext(-4, 14), 0x3ff9);
        assert_eq!(low_sign_unext(1, 14), 2);
    }

    #[test]
    fn left_right_split_recombines() {
        let x = 0x1234_5678u64;
        let l = field_adjust(x, 0, FieldSelector::L);
        let r = field_adjust(x, 0, FieldSelector::R);
        assert_eq!(((l as u64) << 11) + r as u64, x);

        let ls = field_adjust(x, 0, FieldSelector::Ls);
        let rs = field_adjust(x, 0, FieldSelector::Rs);
        assert_eq!(((ls << 11) + rs) as u64, x);
    }

    #[test]
    fn rounding_split_absorbs_addend() {
        for addend in [-0x2345i64, -1, 0, 1, 0x7ff, 0x1fff, 0x12345] {
            let sym = 0x0040_2000u64;
            let lr = field_adjust(sym, addend, FieldSelector::Lr);
            let rr = field_adjust(sym, addend, FieldSelector::Rr);
            let whole = ((lr as u64) << 11).wrapping_add(rr as u64);
            assert_eq!(whole, sym.wrapping_add(addend as u64), "addend {addend:#x}");
        }
    }

    #[test]
    fn null_selectors_zero_the_field() {
        assert_eq!(field_adjust(0xdead_beef, 0x123, FieldSelector::N), 0);
        assert_eq!(field_adjust(0xdead_beef, 0x123, FieldSelector::Nl), 0);
    }

    #[test]
    fn left_rounded_selector_example() {
        // ldil operand for the address 0x12345678.
        assert_eq!(field_adjust(0x1234_5678, 0, FieldSelector::Lr), 0x2468a);
        assert_eq!(assemble_21(0x2468a), 0x26246);
    }

    #[test]
    fn rd_forces_upper_bits() {
        let v = field_adjust(0x1801, 0, FieldSelector::Rd);
        assert!(v < 0);
        assert_eq!(v & 0x7ff, 0x001);
        assert_eq!(v | 0x7ff, -1);
    }

    #[test]
    fn assemble_masks() {
        for x in [0u32, 1, 0x7ff, 0xfff, 0x1_ffff, 0x1f_ffff, 0x3f_ffff] {
            assert_eq!(assemble_12(x) & !0x1ffd, 0);
            assert_eq!(assemble_14(x) & !0x3fff, 0);
            assert_eq!(assemble_16(x) & !0xffff, 0);
            assert_eq!(assemble_17(x) & !0x1f_1ffd, 0);
            assert_eq!(assemble_21(x) & !0x1f_ffff, 0);
            assert_eq!(assemble_22(x) & !0x3ff_1ffd, 0);
        }
    }

    #[test]
    fn roundtrips() {
        for x in [0u32, 1, 2, 0x3ff, 0x400, 0x7ff] {
            assert_eq!(disassemble_12(assemble_12(x & 0xfff)), x & 0xfff);
            assert_eq!(disassemble_14(assemble_14(x)), x);
            assert_eq!(disassemble_16(assemble_16(x)), x);
            assert_eq!(disassemble_17(assemble_17(x)), x);
            assert_eq!(disassemble_21(assemble_21(x)), x);
            assert_eq!(disassemble_22(assemble_22(x)), x);
        }
        assert_eq!(disassemble_16(assemble_16(0xffff)), 0xffff);
        assert_eq!(disassemble_16(assemble_16(0x8000)), 0x8000);
        assert_eq!(disassemble_21(assemble_21(0x1f_ffff)), 0x1f_ffff);
        assert_eq!(disassemble_22(assemble_22(0x3f_ffff)), 0x3f_ffff);
    }

    #[test]
    fn bitfield_check_accepts_signed_and_unsigned() {
        assert!(fits_bitfield(-0x800, 12));
        assert!(fits_bitfield(0xfff, 12));
        assert!(!fits_bitfield(-0x801, 12));
        assert!(!fits_bitfield(0x1000, 12));
        assert!(fits_bitfield(i64::MIN, 64));
        assert!(fits_bitfield(i64::MAX, 0));
    }
}
