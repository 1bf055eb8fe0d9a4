//! Property-based tests using proptest.
//!
//! These verify the bit-exact encoding invariants across the full input
//! ranges — complementing the pinned-pattern regression tests and the
//! libfuzzer targets.

use hppa_link::field::{
    assemble_12, assemble_14, assemble_16, assemble_17, assemble_21, assemble_22, disassemble_12,
    disassemble_14, disassemble_16, disassemble_17, disassemble_21, disassemble_22, field_adjust,
    fits_bitfield, low_sign_extend, low_sign_unext, sign_extend,
};
use hppa_link::{implicit_addend, patch_insn, FieldSelector, InsnFormat};
use proptest::prelude::*;

// ── Strategies ──────────────────────────────────────────────────────────

fn arb_insn_format() -> impl Strategy<Value = InsnFormat> {
    prop::sample::select(vec![
        InsnFormat::Branch12,
        InsnFormat::Branch17,
        InsnFormat::Branch22,
        InsnFormat::Imm21,
        InsnFormat::Imm14,
        InsnFormat::Imm14Dword,
        InsnFormat::Imm14Fword,
    ])
}

fn field_mask(format: InsnFormat) -> u32 {
    match format {
        InsnFormat::Branch12 => 0x1ffd,
        InsnFormat::Branch17 => 0x1f_1ffd,
        InsnFormat::Branch22 => 0x3ff_1ffd,
        InsnFormat::Imm21 => 0x1f_ffff,
        InsnFormat::Imm14 => 0x3fff,
        InsnFormat::Imm14Dword => 0x3ff1,
        InsnFormat::Imm14Fword => 0x3ff9,
        _ => 0,
    }
}

// ── Encode/decode round trips ───────────────────────────────────────────

proptest! {
    #[test]
    fn roundtrip_12(x in 0u32..0x1000) {
        prop_assert_eq!(disassemble_12(assemble_12(x)), x);
    }

    #[test]
    fn roundtrip_14(x in 0u32..0x4000) {
        prop_assert_eq!(disassemble_14(assemble_14(x)), x);
    }

    #[test]
    fn roundtrip_16(x in 0u32..0x1_0000) {
        prop_assert_eq!(disassemble_16(assemble_16(x)), x);
    }

    #[test]
    fn roundtrip_17(x in 0u32..0x2_0000) {
        prop_assert_eq!(disassemble_17(assemble_17(x)), x);
    }

    #[test]
    fn roundtrip_21(x in 0u32..0x20_0000) {
        prop_assert_eq!(disassemble_21(assemble_21(x)), x);
    }

    #[test]
    fn roundtrip_22(x in 0u32..0x40_0000) {
        prop_assert_eq!(disassemble_22(assemble_22(x)), x);
    }

    // ── Sign handling ───────────────────────────────────────────────────

    #[test]
    fn sign_extend_matches_shift_pair(x in any::<u64>(), len in 1u32..=63) {
        let expect = ((x << (64 - len)) as i64) >> (64 - len);
        prop_assert_eq!(sign_extend(x, len), expect);
    }

    #[test]
    fn low_sign_roundtrip(v in -0x2000i64..0x2000) {
        prop_assert_eq!(low_sign_extend(u64::from(low_sign_unext(v, 14)), 14), v);
    }

    // ── Selector splits recombine ───────────────────────────────────────

    #[test]
    fn l_r_split_recombines(value in any::<u64>()) {
        let l = field_adjust(value, 0, FieldSelector::L) as u64;
        let r = field_adjust(value, 0, FieldSelector::R) as u64;
        prop_assert_eq!((l << 11).wrapping_add(r), value);
    }

    #[test]
    fn ls_rs_split_recombines(value in any::<u64>()) {
        let ls = field_adjust(value, 0, FieldSelector::Ls);
        let rs = field_adjust(value, 0, FieldSelector::Rs);
        prop_assert_eq!(((ls as u64) << 11).wrapping_add(rs as u64), value);
    }

    #[test]
    fn lr_rr_split_absorbs_any_addend(value in any::<u64>(), addend in any::<i64>()) {
        let lr = field_adjust(value, addend, FieldSelector::Lr);
        let rr = field_adjust(value, addend, FieldSelector::Rr);
        let whole = ((lr as u64) << 11).wrapping_add(rr as u64);
        prop_assert_eq!(whole, value.wrapping_add(addend as u64));
    }

    #[test]
    fn null_selectors_always_zero(value in any::<u64>(), addend in any::<i64>()) {
        prop_assert_eq!(field_adjust(value, addend, FieldSelector::N), 0);
        prop_assert_eq!(field_adjust(value, addend, FieldSelector::Nl), 0);
    }

    // ── Patching ────────────────────────────────────────────────────────

    #[test]
    fn patch_preserves_bits_outside_the_field(
        insn in any::<u32>(),
        value in any::<i64>(),
        format in arb_insn_format(),
    ) {
        let mask = field_mask(format);
        let patched = patch_insn(insn, value, format);
        prop_assert_eq!(patched & !mask, insn & !mask);
    }

    #[test]
    fn word_formats_never_touch_the_instruction(insn in any::<u32>(), value in any::<i64>()) {
        prop_assert_eq!(patch_insn(insn, value, InsnFormat::Word32), insn);
        prop_assert_eq!(patch_insn(insn, value, InsnFormat::Word64), insn);
        prop_assert_eq!(patch_insn(insn, value, InsnFormat::None), insn);
    }

    #[test]
    fn imm14_implicit_addend_roundtrip(v in -0x2000i64..0x2000) {
        let insn = patch_insn(0, v, InsnFormat::Imm14);
        prop_assert_eq!(implicit_addend(insn, InsnFormat::Imm14), v);
    }

    #[test]
    fn branch17_implicit_addend_roundtrip(words in -0x1_0000i64..0x1_0000) {
        // Branch fields store word displacements; the recovered addend
        // comes back in bytes.
        let insn = patch_insn(0, words, InsnFormat::Branch17);
        prop_assert_eq!(implicit_addend(insn, InsnFormat::Branch17), words << 2);
    }

    #[test]
    fn branch22_implicit_addend_roundtrip(words in -0x20_0000i64..0x20_0000) {
        let insn = patch_insn(0, words, InsnFormat::Branch22);
        prop_assert_eq!(implicit_addend(insn, InsnFormat::Branch22), words << 2);
    }

    // ── Overflow checking ───────────────────────────────────────────────

    #[test]
    fn bitfield_check_matches_signed_or_unsigned_range(value in any::<i64>(), bits in 1u8..=32) {
        let lo = -(1i64 << (u32::from(bits) - 1));
        let hi = 1i64 << u32::from(bits);
        prop_assert_eq!(fits_bitfield(value, bits), value >= lo && value < hi);
    }
}
