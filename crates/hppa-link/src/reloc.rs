//! Relocation codes, their descriptors, and input records.
//!
//! The descriptor table mirrors the PA-RISC ELF relocation numbering: one
//! slot per wire value from 0 through 233, reserved slots included. Several
//! historical oddities of that table are kept as they are, since tools in
//! the wild display them: a handful of implemented entries answer to the
//! name `R_PARISC_UNIMPLEMENTED`, and `R_PARISC_LTOFF16WF` prints as its
//! doubleword sibling.

use crate::session::SymbolId;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Number of wire slots in the descriptor table.
pub const WIRE_TABLE_LEN: u32 = 234;

/// A PA-RISC relocation type.
///
/// Discriminants are the on-disk type values. `Unimplemented` stands in for
/// every reserved slot of the table and never appears on the wire itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[repr(u32)]
#[allow(missing_docs)]
pub enum RelocCode {
    None = 0,
    Dir32 = 1,
    Dir21L = 2,
    Dir17R = 3,
    Dir17F = 4,
    Dir14R = 6,
    Dir14F = 7,
    Pcrel12F = 8,
    Pcrel32 = 9,
    Pcrel21L = 10,
    Pcrel17R = 11,
    Pcrel17F = 12,
    Pcrel17C = 13,
    Pcrel14R = 14,
    Pcrel14F = 15,
    Dprel21L = 18,
    Dprel14WR = 19,
    Dprel14DR = 20,
    Dprel14R = 22,
    Dprel14F = 23,
    Dltrel21L = 26,
    Dltrel14R = 30,
    Dltrel14F = 31,
    Dltind21L = 34,
    Dltind14R = 38,
    Dltind14F = 39,
    Setbase = 40,
    Secrel32 = 41,
    Baserel21L = 42,
    Baserel17R = 43,
    Baserel17F = 44,
    Baserel14R = 46,
    Baserel14F = 47,
    Segbase = 48,
    Segrel32 = 49,
    Pltoff21L = 50,
    Pltoff14R = 54,
    Pltoff14F = 55,
    LtoffFptr32 = 57,
    LtoffFptr21L = 58,
    LtoffFptr14R = 62,
    Fptr64 = 64,
    Plabel32 = 65,
    Plabel21L = 66,
    Plabel14R = 70,
    Pcrel64 = 72,
    Pcrel22C = 73,
    Pcrel22F = 74,
    Pcrel14WR = 75,
    Pcrel14DR = 76,
    Pcrel16F = 77,
    Pcrel16WF = 78,
    Pcrel16DF = 79,
    Dir64 = 80,
    Dir14WR = 83,
    Dir14DR = 84,
    Dir16F = 85,
    Dir16WF = 86,
    Dir16DF = 87,
    Gprel64 = 88,
    Dltrel14WR = 91,
    Dltrel14DR = 92,
    Gprel16F = 93,
    Gprel16WF = 94,
    Gprel16DF = 95,
    Ltoff64 = 96,
    Dltind14WR = 99,
    Dltind14DR = 100,
    Ltoff16F = 101,
    Ltoff16WF = 102,
    Ltoff16DF = 103,
    Baserel14WR = 106,
    Baserel14DR = 107,
    Segrel64 = 112,
    Pltoff14WR = 115,
    Pltoff14DR = 116,
    Pltoff16F = 117,
    Pltoff16WF = 118,
    Pltoff16DF = 119,
    LtoffFptr64 = 120,
    LtoffFptr14WR = 123,
    LtoffFptr14DR = 124,
    LtoffFptr16F = 125,
    LtoffFptr16WF = 126,
    LtoffFptr16DF = 127,
    Copy = 128,
    Iplt = 129,
    Eplt = 130,
    Tprel32 = 153,
    Tprel21L = 154,
    Tprel14R = 158,
    LtoffTp21L = 162,
    LtoffTp14R = 166,
    LtoffTp14F = 167,
    Tprel64 = 216,
    Tprel14WR = 219,
    Tprel14DR = 220,
    Tprel16F = 221,
    Tprel16WF = 222,
    Tprel16DF = 223,
    LtoffTp64 = 224,
    LtoffTp14WR = 227,
    LtoffTp14DR = 228,
    LtoffTp16F = 229,
    LtoffTp16WF = 230,
    LtoffTp16DF = 231,
    GnuVtentry = 232,
    GnuVtinherit = 233,
    /// Stand-in for every reserved slot of the relocation table.
    Unimplemented = 234,
}

/// Overflow policy attached to a relocation descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum OverflowCheck {
    /// Truncate silently.
    None,
    /// Accept values that fit the field as either signed or unsigned.
    Bitfield,
}

/// Static metadata for one slot of the relocation table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RelocDescriptor {
    /// Decoded relocation type for this slot.
    pub code: RelocCode,
    /// Width in bits of the patched field, zero for markers.
    pub bit_width: u8,
    /// Wire-level PC-relative flag.
    ///
    /// Only the original eight call types carry it; the later PC-relative
    /// additions were registered without the flag and that quirk is
    /// preserved here.
    pub pc_relative: bool,
    /// Overflow policy for the patched field.
    pub check: OverflowCheck,
    /// Display name, e.g. `"R_PARISC_DIR21L"`.
    pub name: &'static str,
}

const fn desc(
    code: RelocCode,
    bit_width: u8,
    pc_relative: bool,
    check: OverflowCheck,
    name: &'static str,
) -> RelocDescriptor {
    RelocDescriptor {
        code,
        bit_width,
        pc_relative,
        check,
        name,
    }
}

const UNIMPL: RelocDescriptor = desc(
    RelocCode::Unimplemented,
    0,
    false,
    OverflowCheck::Bitfield,
    "R_PARISC_UNIMPLEMENTED",
);

const UNIMPL_LAX: RelocDescriptor = desc(
    RelocCode::Unimplemented,
    0,
    false,
    OverflowCheck::None,
    "R_PARISC_UNIMPLEMENTED",
);

static DESCRIPTORS: [RelocDescriptor; WIRE_TABLE_LEN as usize] = [
    desc(RelocCode::None, 0, false, OverflowCheck::Bitfield, "R_PARISC_NONE"),
    desc(RelocCode::Dir32, 32, false, OverflowCheck::Bitfield, "R_PARISC_DIR32"),
    desc(RelocCode::Dir21L, 21, false, OverflowCheck::Bitfield, "R_PARISC_DIR21L"),
    desc(RelocCode::Dir17R, 17, false, OverflowCheck::Bitfield, "R_PARISC_DIR17R"),
    desc(RelocCode::Dir17F, 17, false, OverflowCheck::Bitfield, "R_PARISC_DIR17F"),
    UNIMPL,
    desc(RelocCode::Dir14R, 14, false, OverflowCheck::Bitfield, "R_PARISC_DIR14R"),
    desc(RelocCode::Dir14F, 14, false, OverflowCheck::Bitfield, "R_PARISC_DIR14F"),
    desc(RelocCode::Pcrel12F, 12, true, OverflowCheck::Bitfield, "R_PARISC_PCREL12F"),
    desc(RelocCode::Pcrel32, 32, true, OverflowCheck::Bitfield, "R_PARISC_PCREL32"),
    desc(RelocCode::Pcrel21L, 21, true, OverflowCheck::Bitfield, "R_PARISC_PCREL21L"),
    desc(RelocCode::Pcrel17R, 17, true, OverflowCheck::Bitfield, "R_PARISC_PCREL17R"),
    desc(RelocCode::Pcrel17F, 17, true, OverflowCheck::Bitfield, "R_PARISC_PCREL17F"),
    desc(RelocCode::Pcrel17C, 17, true, OverflowCheck::Bitfield, "R_PARISC_PCREL17C"),
    desc(RelocCode::Pcrel14R, 14, true, OverflowCheck::Bitfield, "R_PARISC_PCREL14R"),
    desc(RelocCode::Pcrel14F, 14, true, OverflowCheck::Bitfield, "R_PARISC_PCREL14F"),
    UNIMPL,
    UNIMPL,
    desc(RelocCode::Dprel21L, 21, false, OverflowCheck::Bitfield, "R_PARISC_DPREL21L"),
    desc(RelocCode::Dprel14WR, 14, false, OverflowCheck::Bitfield, "R_PARISC_DPREL14WR"),
    desc(RelocCode::Dprel14DR, 14, false, OverflowCheck::Bitfield, "R_PARISC_DPREL14DR"),
    UNIMPL,
    desc(RelocCode::Dprel14R, 14, false, OverflowCheck::Bitfield, "R_PARISC_DPREL14R"),
    desc(RelocCode::Dprel14F, 14, false, OverflowCheck::Bitfield, "R_PARISC_DPREL14F"),
    UNIMPL,
    UNIMPL,
    desc(RelocCode::Dltrel21L, 21, false, OverflowCheck::Bitfield, "R_PARISC_DLTREL21L"),
    UNIMPL,
    UNIMPL,
    UNIMPL,
    desc(RelocCode::Dltrel14R, 14, false, OverflowCheck::Bitfield, "R_PARISC_DLTREL14R"),
    desc(RelocCode::Dltrel14F, 14, false, OverflowCheck::Bitfield, "R_PARISC_DLTREL14F"),
    UNIMPL,
    UNIMPL,
    desc(RelocCode::Dltind21L, 21, false, OverflowCheck::Bitfield, "R_PARISC_DLTIND21L"),
    UNIMPL,
    UNIMPL,
    UNIMPL,
    desc(RelocCode::Dltind14R, 14, false, OverflowCheck::Bitfield, "R_PARISC_DLTIND14R"),
    desc(RelocCode::Dltind14F, 14, false, OverflowCheck::Bitfield, "R_PARISC_DLTIND14F"),
    desc(RelocCode::Setbase, 0, false, OverflowCheck::Bitfield, "R_PARISC_SETBASE"),
    desc(RelocCode::Secrel32, 32, false, OverflowCheck::Bitfield, "R_PARISC_SECREL32"),
    desc(RelocCode::Baserel21L, 21, false, OverflowCheck::Bitfield, "R_PARISC_BASEREL21L"),
    desc(RelocCode::Baserel17R, 17, false, OverflowCheck::Bitfield, "R_PARISC_BASEREL17R"),
    desc(RelocCode::Baserel17F, 17, false, OverflowCheck::Bitfield, "R_PARISC_BASEREL17F"),
    UNIMPL,
    desc(RelocCode::Baserel14R, 14, false, OverflowCheck::Bitfield, "R_PARISC_BASEREL14R"),
    desc(RelocCode::Baserel14F, 14, false, OverflowCheck::Bitfield, "R_PARISC_BASEREL14F"),
    desc(RelocCode::Segbase, 0, false, OverflowCheck::Bitfield, "R_PARISC_SEGBASE"),
    desc(RelocCode::Segrel32, 32, false, OverflowCheck::Bitfield, "R_PARISC_SEGREL32"),
    desc(RelocCode::Pltoff21L, 21, false, OverflowCheck::Bitfield, "R_PARISC_PLTOFF21L"),
    UNIMPL,
    UNIMPL,
    UNIMPL,
    desc(RelocCode::Pltoff14R, 14, false, OverflowCheck::Bitfield, "R_PARISC_PLTOFF14R"),
    desc(RelocCode::Pltoff14F, 14, false, OverflowCheck::Bitfield, "R_PARISC_PLTOFF14F"),
    UNIMPL,
    desc(RelocCode::LtoffFptr32, 32, false, OverflowCheck::Bitfield, "R_PARISC_LTOFF_FPTR32"),
    desc(RelocCode::LtoffFptr21L, 21, false, OverflowCheck::Bitfield, "R_PARISC_LTOFF_FPTR21L"),
    UNIMPL,
    UNIMPL,
    UNIMPL,
    desc(RelocCode::LtoffFptr14R, 14, false, OverflowCheck::Bitfield, "R_PARISC_LTOFF_FPTR14R"),
    UNIMPL,
    desc(RelocCode::Fptr64, 64, false, OverflowCheck::Bitfield, "R_PARISC_FPTR64"),
    desc(RelocCode::Plabel32, 32, false, OverflowCheck::Bitfield, "R_PARISC_PLABEL32"),
    desc(RelocCode::Plabel21L, 21, false, OverflowCheck::Bitfield, "R_PARISC_PLABEL21L"),
    UNIMPL,
    UNIMPL,
    UNIMPL,
    desc(RelocCode::Plabel14R, 14, false, OverflowCheck::Bitfield, "R_PARISC_PLABEL14R"),
    UNIMPL,
    desc(RelocCode::Pcrel64, 64, false, OverflowCheck::Bitfield, "R_PARISC_PCREL64"),
    desc(RelocCode::Pcrel22C, 22, false, OverflowCheck::Bitfield, "R_PARISC_PCREL22C"),
    desc(RelocCode::Pcrel22F, 22, false, OverflowCheck::Bitfield, "R_PARISC_PCREL22F"),
    desc(RelocCode::Pcrel14WR, 14, false, OverflowCheck::Bitfield, "R_PARISC_PCREL14WR"),
    desc(RelocCode::Pcrel14DR, 14, false, OverflowCheck::Bitfield, "R_PARISC_PCREL14DR"),
    desc(RelocCode::Pcrel16F, 16, false, OverflowCheck::Bitfield, "R_PARISC_PCREL16F"),
    desc(RelocCode::Pcrel16WF, 16, false, OverflowCheck::Bitfield, "R_PARISC_PCREL16WF"),
    desc(RelocCode::Pcrel16DF, 16, false, OverflowCheck::Bitfield, "R_PARISC_PCREL16DF"),
    desc(RelocCode::Dir64, 64, false, OverflowCheck::Bitfield, "R_PARISC_DIR64"),
    UNIMPL,
    UNIMPL,
    desc(RelocCode::Dir14WR, 14, false, OverflowCheck::Bitfield, "R_PARISC_DIR14WR"),
    desc(RelocCode::Dir14DR, 14, false, OverflowCheck::Bitfield, "R_PARISC_DIR14DR"),
    desc(RelocCode::Dir16F, 16, false, OverflowCheck::Bitfield, "R_PARISC_DIR16F"),
    desc(RelocCode::Dir16WF, 16, false, OverflowCheck::Bitfield, "R_PARISC_DIR16WF"),
    desc(RelocCode::Dir16DF, 16, false, OverflowCheck::Bitfield, "R_PARISC_DIR16DF"),
    desc(RelocCode::Gprel64, 64, false, OverflowCheck::Bitfield, "R_PARISC_GPREL64"),
    UNIMPL,
    UNIMPL,
    desc(RelocCode::Dltrel14WR, 14, false, OverflowCheck::Bitfield, "R_PARISC_DLTREL14WR"),
    desc(RelocCode::Dltrel14DR, 14, false, OverflowCheck::Bitfield, "R_PARISC_DLTREL14DR"),
    desc(RelocCode::Gprel16F, 16, false, OverflowCheck::Bitfield, "R_PARISC_GPREL16F"),
    desc(RelocCode::Gprel16WF, 16, false, OverflowCheck::Bitfield, "R_PARISC_GPREL16WF"),
    desc(RelocCode::Gprel16DF, 16, false, OverflowCheck::Bitfield, "R_PARISC_GPREL16DF"),
    desc(RelocCode::Ltoff64, 64, false, OverflowCheck::Bitfield, "R_PARISC_LTOFF64"),
    UNIMPL,
    UNIMPL,
    desc(RelocCode::Dltind14WR, 14, false, OverflowCheck::Bitfield, "R_PARISC_DLTIND14WR"),
    desc(RelocCode::Dltind14DR, 14, false, OverflowCheck::Bitfield, "R_PARISC_DLTIND14DR"),
    desc(RelocCode::Ltoff16F, 16, false, OverflowCheck::Bitfield, "R_PARISC_LTOFF16F"),
    desc(RelocCode::Ltoff16WF, 16, false, OverflowCheck::Bitfield, "R_PARISC_LTOFF16DF"),
    desc(RelocCode::Ltoff16DF, 16, false, OverflowCheck::Bitfield, "R_PARISC_LTOFF16DF"),
    UNIMPL,
    UNIMPL,
    desc(RelocCode::Baserel14WR, 14, false, OverflowCheck::Bitfield, "R_PARISC_BASEREL14WR"),
    desc(RelocCode::Baserel14DR, 14, false, OverflowCheck::Bitfield, "R_PARISC_BASEREL14DR"),
    UNIMPL,
    UNIMPL,
    UNIMPL,
    UNIMPL,
    desc(RelocCode::Segrel64, 64, false, OverflowCheck::Bitfield, "R_PARISC_SEGREL64"),
    UNIMPL,
    UNIMPL,
    desc(RelocCode::Pltoff14WR, 14, false, OverflowCheck::Bitfield, "R_PARISC_PLTOFF14WR"),
    desc(RelocCode::Pltoff14DR, 14, false, OverflowCheck::Bitfield, "R_PARISC_PLTOFF14DR"),
    desc(RelocCode::Pltoff16F, 16, false, OverflowCheck::Bitfield, "R_PARISC_PLTOFF16F"),
    desc(RelocCode::Pltoff16WF, 16, false, OverflowCheck::Bitfield, "R_PARISC_PLTOFF16WF"),
    desc(RelocCode::Pltoff16DF, 16, false, OverflowCheck::Bitfield, "R_PARISC_PLTOFF16DF"),
    desc(RelocCode::LtoffFptr64, 64, false, OverflowCheck::Bitfield, "R_PARISC_UNIMPLEMENTED"),
    UNIMPL,
    UNIMPL,
    desc(RelocCode::LtoffFptr14WR, 14, false, OverflowCheck::Bitfield, "R_PARISC_LTOFF_FPTR14WR"),
    desc(RelocCode::LtoffFptr14DR, 14, false, OverflowCheck::Bitfield, "R_PARISC_LTOFF_FPTR14DR"),
    desc(RelocCode::LtoffFptr16F, 16, false, OverflowCheck::Bitfield, "R_PARISC_LTOFF_FPTR16F"),
    desc(RelocCode::LtoffFptr16WF, 16, false, OverflowCheck::Bitfield, "R_PARISC_LTOFF_FPTR16WF"),
    desc(RelocCode::LtoffFptr16DF, 16, false, OverflowCheck::Bitfield, "R_PARISC_UNIMPLEMENTED"),
    desc(RelocCode::Copy, 0, false, OverflowCheck::Bitfield, "R_PARISC_COPY"),
    desc(RelocCode::Iplt, 0, false, OverflowCheck::Bitfield, "R_PARISC_IPLT"),
    desc(RelocCode::Eplt, 0, false, OverflowCheck::Bitfield, "R_PARISC_EPLT"),
    UNIMPL,
    UNIMPL,
    UNIMPL,
    UNIMPL,
    UNIMPL,
    UNIMPL,
    UNIMPL_LAX,
    UNIMPL,
    UNIMPL,
    UNIMPL_LAX,
    UNIMPL,
    UNIMPL,
    UNIMPL,
    UNIMPL,
    UNIMPL,
    UNIMPL,
    UNIMPL_LAX,
    UNIMPL,
    UNIMPL,
    UNIMPL_LAX,
    UNIMPL_LAX,
    UNIMPL_LAX,
    desc(RelocCode::Tprel32, 32, false, OverflowCheck::None, "R_PARISC_TPREL32"),
    desc(RelocCode::Tprel21L, 21, false, OverflowCheck::None, "R_PARISC_TPREL21L"),
    UNIMPL_LAX,
    UNIMPL_LAX,
    UNIMPL_LAX,
    desc(RelocCode::Tprel14R, 14, false, OverflowCheck::None, "R_PARISC_TPREL14R"),
    UNIMPL_LAX,
    UNIMPL_LAX,
    UNIMPL_LAX,
    desc(RelocCode::LtoffTp21L, 21, false, OverflowCheck::Bitfield, "R_PARISC_LTOFF_TP21L"),
    UNIMPL_LAX,
    UNIMPL,
    UNIMPL,
    desc(RelocCode::LtoffTp14R, 14, false, OverflowCheck::Bitfield, "R_PARISC_UNIMPLEMENTED"),
    desc(RelocCode::LtoffTp14F, 14, false, OverflowCheck::Bitfield, "R_PARISC_LTOFF_TP14F"),
    UNIMPL,
    UNIMPL,
    UNIMPL,
    UNIMPL_LAX,
    UNIMPL,
    UNIMPL,
    UNIMPL,
    UNIMPL,
    UNIMPL,
    UNIMPL,
    UNIMPL_LAX,
    UNIMPL,
    UNIMPL,
    UNIMPL_LAX,
    UNIMPL,
    UNIMPL,
    UNIMPL,
    UNIMPL,
    UNIMPL,
    UNIMPL,
    UNIMPL_LAX,
    UNIMPL,
    UNIMPL,
    UNIMPL_LAX,
    UNIMPL,
    UNIMPL,
    UNIMPL,
    UNIMPL,
    UNIMPL,
    UNIMPL,
    UNIMPL_LAX,
    UNIMPL,
    UNIMPL,
    UNIMPL_LAX,
    UNIMPL,
    UNIMPL,
    UNIMPL,
    UNIMPL,
    UNIMPL,
    UNIMPL,
    UNIMPL_LAX,
    UNIMPL,
    UNIMPL,
    UNIMPL,
    UNIMPL_LAX,
    UNIMPL,
    UNIMPL,
    UNIMPL,
    desc(RelocCode::Tprel64, 64, false, OverflowCheck::Bitfield, "R_PARISC_TPREL64"),
    UNIMPL,
    UNIMPL,
    desc(RelocCode::Tprel14WR, 14, false, OverflowCheck::None, "R_PARISC_TPREL14WR"),
    desc(RelocCode::Tprel14DR, 14, false, OverflowCheck::Bitfield, "R_PARISC_TPREL14DR"),
    desc(RelocCode::Tprel16F, 16, false, OverflowCheck::Bitfield, "R_PARISC_TPREL16F"),
    desc(RelocCode::Tprel16WF, 16, false, OverflowCheck::None, "R_PARISC_TPREL16WF"),
    desc(RelocCode::Tprel16DF, 16, false, OverflowCheck::Bitfield, "R_PARISC_TPREL16DF"),
    desc(RelocCode::LtoffTp64, 64, false, OverflowCheck::Bitfield, "R_PARISC_LTOFF_TP64"),
    UNIMPL,
    UNIMPL,
    desc(RelocCode::LtoffTp14WR, 14, false, OverflowCheck::Bitfield, "R_PARISC_LTOFF_TP14WR"),
    desc(RelocCode::LtoffTp14DR, 14, false, OverflowCheck::Bitfield, "R_PARISC_LTOFF_TP14DR"),
    desc(RelocCode::LtoffTp16F, 16, false, OverflowCheck::None, "R_PARISC_LTOFF_TP16F"),
    desc(RelocCode::LtoffTp16WF, 16, false, OverflowCheck::Bitfield, "R_PARISC_LTOFF_TP16WF"),
    desc(RelocCode::LtoffTp16DF, 16, false, OverflowCheck::Bitfield, "R_PARISC_LTOFF_TP16DF"),
    desc(RelocCode::GnuVtentry, 0, false, OverflowCheck::None, "R_PARISC_GNU_VTENTRY"),
    desc(RelocCode::GnuVtinherit, 0, false, OverflowCheck::None, "R_PARISC_GNU_VTINHERIT"),
];

impl RelocCode {
    /// Decodes a wire type value, returning `None` when it is outside the
    /// table. Reserved in-table slots decode to [`RelocCode::Unimplemented`].
    #[must_use]
    pub fn from_wire(kind: u32) -> Option<Self> {
        DESCRIPTORS.get(kind as usize).map(|d| d.code)
    }

    /// Returns the descriptor for this code.
    #[must_use]
    pub fn descriptor(self) -> &'static RelocDescriptor {
        if self == Self::Unimplemented {
            &UNIMPL
        } else {
            &DESCRIPTORS[self as usize]
        }
    }

    /// Display name of this code as the table spells it.
    #[must_use]
    pub fn name(self) -> &'static str {
        self.descriptor().name
    }
}

/// Returns the descriptor stored at a wire slot, reserved slots included.
#[must_use]
pub fn descriptor_for_wire(kind: u32) -> Option<&'static RelocDescriptor> {
    DESCRIPTORS.get(kind as usize)
}

/// How a record carries its addend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Addend {
    /// The addend travels in the record.
    Explicit(i64),
    /// The addend is pre-added into the patched field and must be read
    /// back out of the section contents.
    Implicit,
}

/// One relocation record from an input object.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct RelocationRecord {
    /// Byte offset of the patched field within its section.
    pub offset: u64,
    /// Wire relocation type. Kept raw so malformed inputs stay
    /// representable; decoding happens when the record is applied.
    pub kind: u32,
    /// Index of the referenced symbol in the session symbol table.
    pub symbol: SymbolId,
    /// Addend carried by, or implied by, the record.
    pub addend: Addend,
}

impl RelocationRecord {
    /// Builds a record with an explicit addend.
    #[must_use]
    pub fn rela(offset: u64, code: RelocCode, symbol: SymbolId, addend: i64) -> Self {
        Self {
            offset,
            kind: code as u32,
            symbol,
            addend: Addend::Explicit(addend),
        }
    }

    /// Builds a record whose addend lives in the patched field.
    #[must_use]
    pub fn rel(offset: u64, code: RelocCode, symbol: SymbolId) -> Self {
        Self {
            offset,
            kind: code as u32,
            symbol,
            addend: Addend::Implicit,
        }
    }
}
