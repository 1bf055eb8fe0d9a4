//! The relocation driver.
//!
//! [`relocate_section`] walks one section's records, resolves each
//! referenced symbol through the session, computes the family-specific
//! field value, and patches the section contents in place. Side tables
//! (DLT slots, PLT entries, function descriptors) are filled on demand
//! through the session, and calls that cannot reach their target are
//! redirected through the stubs planned beforehand.

use alloc::string::String;
use alloc::vec::Vec;

use crate::error::LinkError;
use crate::field::{field_adjust, fits_bitfield, FieldSelector};
use crate::insn::{implicit_addend, insn_format, patch_insn, InsnFormat};
use crate::reloc::{descriptor_for_wire, Addend, OverflowCheck, RelocCode, RelocationRecord};
use crate::session::{
    AuxKey, Binding, LinkMode, LinkSession, SectionId, SymbolPlacement, SymbolResolution,
};
use crate::stub::{BranchClass, StubImage, StubKey};

/// `or %r0,%r0,%r0`
const NOP: u32 = 0x0800_0240;

/// Sink for the recoverable conditions a relocation pass can hit.
///
/// Every method has an empty default, so `()` serves as a silent sink.
/// Fatal conditions are not routed here; they surface as [`LinkError`].
pub trait Diagnostics {
    /// A computed field value did not fit the relocation's bit width.
    /// The field is still patched with the truncated value.
    fn overflow(&mut self, _symbol: &str, _reloc: &str, _offset: u64) {}

    /// A required symbol had no definition anywhere. Reported just
    /// before the pass fails.
    fn undefined_symbol(&mut self, _symbol: &str, _offset: u64) {}

    /// A symbol defined only by a shared dependency was needed by a
    /// record that cannot be redirected; zero was patched instead.
    fn unresolvable(&mut self, _symbol: &str, _reloc: &str, _offset: u64) {}
}

impl Diagnostics for () {}

/// One recorded diagnostic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiagnosticEvent {
    /// Field overflow; see [`Diagnostics::overflow`].
    Overflow {
        /// Symbol the record referenced.
        symbol: String,
        /// Display name of the relocation.
        reloc: String,
        /// Record offset.
        offset: u64,
    },
    /// Fatal undefined symbol; see [`Diagnostics::undefined_symbol`].
    Undefined {
        /// Symbol the record referenced.
        symbol: String,
        /// Record offset.
        offset: u64,
    },
    /// Unresolvable reference; see [`Diagnostics::unresolvable`].
    Unresolvable {
        /// Symbol the record referenced.
        symbol: String,
        /// Display name of the relocation.
        reloc: String,
        /// Record offset.
        offset: u64,
    },
}

/// A [`Diagnostics`] sink that keeps every event, mostly for callers
/// that batch-report after the pass.
#[derive(Debug, Default)]
pub struct CollectedDiagnostics {
    /// Events in the order they were reported.
    pub events: Vec<DiagnosticEvent>,
}

impl Diagnostics for CollectedDiagnostics {
    fn overflow(&mut self, symbol: &str, reloc: &str, offset: u64) {
        self.events.push(DiagnosticEvent::Overflow {
            symbol: String::from(symbol),
            reloc: String::from(reloc),
            offset,
        });
    }

    fn undefined_symbol(&mut self, symbol: &str, offset: u64) {
        self.events.push(DiagnosticEvent::Undefined {
            symbol: String::from(symbol),
            offset,
        });
    }

    fn unresolvable(&mut self, symbol: &str, reloc: &str, offset: u64) {
        self.events.push(DiagnosticEvent::Unresolvable {
            symbol: String::from(symbol),
            reloc: String::from(reloc),
            offset,
        });
    }
}

/// Counters describing what one [`relocate_section`] call did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[must_use]
pub struct RelocationSummary {
    /// Records resolved and patched.
    pub applied: usize,
    /// Addends rewritten in relocatable mode.
    pub adjusted: usize,
    /// Markers and records a relocatable pass carried through untouched.
    pub skipped: usize,
    /// Field values that overflowed their bit width.
    pub overflows: usize,
    /// Unresolvable references patched as zero.
    pub warnings: usize,
    /// Redirected calls whose delay slot was exchanged.
    pub swaps: usize,
}

/// Processing family of a relocation code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Family {
    /// Bookkeeping types with no field to patch.
    Marker,
    /// Absolute address in an instruction field.
    Direct,
    /// Absolute address as a bare data word.
    DirectWord,
    /// PC-relative load or store.
    Pcrel,
    /// PC-relative branch; the field holds a word displacement.
    PcrelBranch,
    /// PC-relative data word.
    PcrelWord,
    /// DLT-slot offset in an instruction field; `fptr` routes the slot
    /// through a function descriptor.
    Dltind { fptr: bool },
    /// DLT-slot offset as a data word.
    DltindWord { fptr: bool },
    /// Global-pointer-relative instruction field.
    GpRel,
    /// Global-pointer-relative data word.
    GpRelWord,
    /// PLT-entry offset relative to the global pointer.
    Pltoff,
    /// Address of a function descriptor as a data word.
    FptrWord,
    /// Offset from the owning section's start.
    SecrelWord,
    /// Offset from the text or data segment base.
    SegrelWord,
    /// Thread-pointer-relative instruction field.
    Tprel,
    /// Thread-pointer-relative data word.
    TprelWord,
    /// DLT slot holding a thread-pointer-relative value.
    LtoffTp,
    /// Same, as a data word.
    LtoffTpWord,
    /// Dynamic-linking types this engine refuses.
    Unsupported,
}

fn family(code: RelocCode) -> Family {
    use RelocCode as R;

    match code {
        R::None | R::Setbase | R::Segbase | R::GnuVtentry | R::GnuVtinherit => Family::Marker,

        R::Dir21L
        | R::Dir17R
        | R::Dir17F
        | R::Dir14R
        | R::Dir14F
        | R::Dir14WR
        | R::Dir14DR
        | R::Dir16F
        | R::Dir16WF
        | R::Dir16DF => Family::Direct,
        R::Dir32 | R::Dir64 => Family::DirectWord,

        R::Pcrel21L
        | R::Pcrel14R
        | R::Pcrel14F
        | R::Pcrel14WR
        | R::Pcrel14DR
        | R::Pcrel16F
        | R::Pcrel16WF
        | R::Pcrel16DF => Family::Pcrel,
        R::Pcrel12F | R::Pcrel17R | R::Pcrel17F | R::Pcrel17C | R::Pcrel22C | R::Pcrel22F => {
            Family::PcrelBranch
        }
        R::Pcrel32 | R::Pcrel64 => Family::PcrelWord,

        R::Dltind21L
        | R::Dltind14R
        | R::Dltind14F
        | R::Dltind14WR
        | R::Dltind14DR
        | R::Ltoff16F
        | R::Ltoff16WF
        | R::Ltoff16DF => Family::Dltind { fptr: false },
        R::LtoffFptr21L
        | R::LtoffFptr14R
        | R::LtoffFptr14WR
        | R::LtoffFptr14DR
        | R::LtoffFptr16F
        | R::LtoffFptr16WF
        | R::LtoffFptr16DF => Family::Dltind { fptr: true },
        R::Ltoff64 => Family::DltindWord { fptr: false },
        R::LtoffFptr32 | R::LtoffFptr64 => Family::DltindWord { fptr: true },

        R::Dprel21L
        | R::Dprel14R
        | R::Dprel14F
        | R::Dprel14WR
        | R::Dprel14DR
        | R::Dltrel21L
        | R::Dltrel14R
        | R::Dltrel14F
        | R::Dltrel14WR
        | R::Dltrel14DR
        | R::Gprel16F
        | R::Gprel16WF
        | R::Gprel16DF => Family::GpRel,
        R::Gprel64 => Family::GpRelWord,

        R::Pltoff21L
        | R::Pltoff14R
        | R::Pltoff14F
        | R::Pltoff14WR
        | R::Pltoff14DR
        | R::Pltoff16F
        | R::Pltoff16WF
        | R::Pltoff16DF => Family::Pltoff,

        R::Fptr64 => Family::FptrWord,
        R::Secrel32 => Family::SecrelWord,
        R::Segrel32 | R::Segrel64 => Family::SegrelWord,

        R::Tprel21L
        | R::Tprel14R
        | R::Tprel14WR
        | R::Tprel14DR
        | R::Tprel16F
        | R::Tprel16WF
        | R::Tprel16DF => Family::Tprel,
        R::Tprel32 | R::Tprel64 => Family::TprelWord,
        R::LtoffTp21L
        | R::LtoffTp14R
        | R::LtoffTp14F
        | R::LtoffTp14WR
        | R::LtoffTp14DR
        | R::LtoffTp16F
        | R::LtoffTp16WF
        | R::LtoffTp16DF => Family::LtoffTp,
        R::LtoffTp64 => Family::LtoffTpWord,

        R::Plabel32
        | R::Plabel21L
        | R::Plabel14R
        | R::Baserel21L
        | R::Baserel17R
        | R::Baserel17F
        | R::Baserel14R
        | R::Baserel14F
        | R::Baserel14WR
        | R::Baserel14DR
        | R::Copy
        | R::Iplt
        | R::Eplt
        | R::Unimplemented => Family::Unsupported,
    }
}

/// Field selector for an absolute-value instruction field.
fn absolute_selector(code: RelocCode) -> FieldSelector {
    use RelocCode as R;

    match code {
        R::Dir21L
        | R::Dprel21L
        | R::Dltrel21L
        | R::Dltind21L
        | R::Pltoff21L
        | R::LtoffFptr21L
        | R::Tprel21L
        | R::LtoffTp21L => FieldSelector::Lr,
        R::Dir14R | R::Dir17R | R::Dir14WR | R::Dir14DR => FieldSelector::Rr,
        R::Dprel14R | R::Dprel14WR | R::Dprel14DR => FieldSelector::Rr,
        R::Dltrel14R | R::Dltrel14WR | R::Dltrel14DR => FieldSelector::Rr,
        R::Dltind14R | R::Dltind14WR | R::Dltind14DR => FieldSelector::Rr,
        R::Pltoff14R | R::Pltoff14WR | R::Pltoff14DR => FieldSelector::Rr,
        R::LtoffFptr14R | R::LtoffFptr14WR | R::LtoffFptr14DR => FieldSelector::Rr,
        R::Tprel14R | R::Tprel14WR | R::Tprel14DR => FieldSelector::Rr,
        R::LtoffTp14R | R::LtoffTp14F | R::LtoffTp14WR | R::LtoffTp14DR => FieldSelector::Rr,
        _ => FieldSelector::F,
    }
}

/// Field selector for a PC-relative instruction field.
fn pcrel_selector(code: RelocCode) -> FieldSelector {
    use RelocCode as R;

    match code {
        R::Pcrel21L => FieldSelector::L,
        R::Pcrel17R | R::Pcrel14R | R::Pcrel14WR | R::Pcrel14DR => FieldSelector::R,
        _ => FieldSelector::F,
    }
}

fn patch_width(format: InsnFormat) -> u64 {
    match format {
        InsnFormat::Word64 => 8,
        InsnFormat::None => 0,
        _ => 4,
    }
}

fn read_u32(bytes: &[u8], offset: u64) -> u32 {
    let o = offset as usize;
    u32::from_be_bytes([bytes[o], bytes[o + 1], bytes[o + 2], bytes[o + 3]])
}

fn read_u64(bytes: &[u8], offset: u64) -> u64 {
    let o = offset as usize;
    let mut raw = [0u8; 8];
    raw.copy_from_slice(&bytes[o..o + 8]);
    u64::from_be_bytes(raw)
}

fn write_u32(bytes: &mut [u8], offset: u64, value: u32) {
    let o = offset as usize;
    bytes[o..o + 4].copy_from_slice(&value.to_be_bytes());
}

fn write_u64(bytes: &mut [u8], offset: u64, value: u64) {
    let o = offset as usize;
    bytes[o..o + 8].copy_from_slice(&value.to_be_bytes());
}

fn note_unresolvable(
    tolerant: bool,
    diag: &mut dyn Diagnostics,
    summary: &mut RelocationSummary,
    symbol: &str,
    reloc: &str,
    offset: u64,
) {
    if !tolerant {
        diag.unresolvable(symbol, reloc, offset);
        summary.warnings += 1;
    }
}

enum PatchValue {
    Insn(i64),
    Word32(u64),
    Word64(u64),
}

/// Resolves and applies every record against one section's contents.
///
/// `records` is mutable for two reasons: relocatable links rewrite the
/// addends of section-symbol records in place, and a delay-slot exchange
/// shifts the offsets of records that follow the moved instruction.
/// `stubs` carries the built stub image when the link planned one.
///
/// # Errors
///
/// Fails fast on malformed input (unknown or unsupported relocation
/// types, bad symbol indexes, out-of-bounds offsets) and on undefined
/// symbols the session does not tolerate. Recoverable conditions go
/// through `diag` instead.
pub fn relocate_section(
    session: &mut LinkSession,
    section: SectionId,
    records: &mut [RelocationRecord],
    contents: &mut [u8],
    stubs: Option<&StubImage>,
    diag: &mut dyn Diagnostics,
) -> Result<RelocationSummary, LinkError> {
    let (sec_name, sec_vma) = match session.section(section) {
        Some(sec) => (sec.name.clone(), sec.vma),
        None => {
            return Err(LinkError::UnknownSection {
                section: section.index(),
            });
        }
    };
    let gp = session.gp();
    let tp = session.tp();
    let relocatable = session.options.mode == LinkMode::Relocatable;
    let tolerant = session.options.shared || session.options.tolerate_undefined;

    let mut summary = RelocationSummary::default();

    for i in 0..records.len() {
        let rec = records[i];
        let Some(desc) = descriptor_for_wire(rec.kind) else {
            return Err(LinkError::UnknownRelocation {
                section: sec_name.clone(),
                offset: rec.offset,
                kind: rec.kind,
            });
        };
        let code = desc.code;
        let fam = family(code);
        if fam == Family::Marker {
            summary.skipped += 1;
            continue;
        }

        if relocatable {
            // Merging objects: section contents stay put, but addends
            // against section symbols must absorb the displacement of
            // their input section within the merged output.
            let Some(sym) = session.symbol(rec.symbol) else {
                return Err(LinkError::BadSymbolIndex {
                    section: sec_name.clone(),
                    offset: rec.offset,
                    index: rec.symbol.index(),
                });
            };
            if sym.is_section {
                if let (SymbolPlacement::Section(def), Addend::Explicit(a)) =
                    (sym.placement, rec.addend)
                {
                    let shift = session.section(def).map_or(0, |s| s.output_offset);
                    records[i].addend = Addend::Explicit(a.wrapping_add(shift as i64));
                    summary.adjusted += 1;
                    continue;
                }
            }
            summary.skipped += 1;
            continue;
        }

        if fam == Family::Unsupported {
            return Err(LinkError::UnsupportedRelocation {
                section: sec_name.clone(),
                offset: rec.offset,
                name: String::from(desc.name),
            });
        }

        let Some(sym) = session.symbol(rec.symbol) else {
            return Err(LinkError::BadSymbolIndex {
                section: sec_name.clone(),
                offset: rec.offset,
                index: rec.symbol.index(),
            });
        };
        let sym_binding = sym.binding;
        let sym_placement = sym.placement;
        let sym_signature = sym.signature;
        // Section symbols often arrive nameless; show the section
        // instead.
        let display_name = if sym.name.is_empty() {
            match sym_placement {
                SymbolPlacement::Section(def) => session
                    .section(def)
                    .map_or_else(|| sec_name.clone(), |s| s.name.clone()),
                _ => sec_name.clone(),
            }
        } else {
            sym.name.clone()
        };

        let fmt = insn_format(code);
        let width = patch_width(fmt);
        match rec.offset.checked_add(width) {
            Some(end) if end <= contents.len() as u64 => {}
            _ => {
                return Err(LinkError::OffsetOutOfBounds {
                    section: sec_name.clone(),
                    offset: rec.offset,
                    len: contents.len() as u64,
                });
            }
        }

        let insn_before = read_u32(contents, rec.offset);
        let addend = match rec.addend {
            Addend::Explicit(a) => a,
            Addend::Implicit => match fmt {
                InsnFormat::Word32 => i64::from(read_u32(contents, rec.offset) as i32),
                InsnFormat::Word64 => read_u64(contents, rec.offset) as i64,
                _ => implicit_addend(insn_before, fmt),
            },
        };

        let resolution = session
            .resolve(rec.symbol)
            .unwrap_or(SymbolResolution::Undefined);
        let (mut value, sym_section, external, defined) = match resolution {
            SymbolResolution::Defined { value, section } => (value, section, false, true),
            SymbolResolution::External => (0, None, true, false),
            SymbolResolution::Undefined => {
                if sym_binding == Binding::Weak || tolerant {
                    (0, None, false, false)
                } else {
                    diag.undefined_symbol(&display_name, rec.offset);
                    return Err(LinkError::UndefinedSymbol {
                        section: sec_name.clone(),
                        offset: rec.offset,
                        symbol: display_name,
                    });
                }
            }
        };

        let key = if sym_binding == Binding::Local {
            AuxKey::local(rec.symbol, section, addend as u32)
        } else {
            AuxKey {
                symbol: rec.symbol,
                origin: None,
                signature: sym_signature,
            }
        };
        let stub_origin = match (sym_binding, sym_placement) {
            (Binding::Local, SymbolPlacement::Section(def)) => Some(def),
            _ => None,
        };

        // Families that cannot consume a stub report externals up front.
        if external
            && !matches!(
                fam,
                Family::Direct | Family::Pcrel | Family::PcrelBranch | Family::PcrelWord
            )
        {
            note_unresolvable(
                tolerant,
                diag,
                &mut summary,
                &display_name,
                desc.name,
                rec.offset,
            );
        }

        let mut swap_delay = false;
        let mut rewrite_link = false;

        let patch = match fam {
            Family::Direct => {
                if external {
                    match stubs.and_then(|s| s.lookup_symbol(rec.symbol, stub_origin)) {
                        Some(addr) => value = addr,
                        None => note_unresolvable(
                            tolerant,
                            diag,
                            &mut summary,
                            &display_name,
                            desc.name,
                            rec.offset,
                        ),
                    }
                }
                let mut v = field_adjust(value, addend, absolute_selector(code));
                if matches!(code, RelocCode::Dir17R | RelocCode::Dir17F) {
                    v >>= 2;
                }
                PatchValue::Insn(v)
            }
            Family::DirectWord => {
                let v = value.wrapping_add(addend as u64);
                if code == RelocCode::Dir64 {
                    PatchValue::Word64(v)
                } else {
                    PatchValue::Word32(v)
                }
            }
            Family::Pcrel => {
                if external {
                    match stubs.and_then(|s| s.lookup_symbol(rec.symbol, stub_origin)) {
                        Some(addr) => value = addr,
                        None => note_unresolvable(
                            tolerant,
                            diag,
                            &mut summary,
                            &display_name,
                            desc.name,
                            rec.offset,
                        ),
                    }
                }
                let site = sec_vma.wrapping_add(rec.offset);
                PatchValue::Insn(field_adjust(
                    value.wrapping_sub(site),
                    addend.wrapping_sub(8),
                    pcrel_selector(code),
                ))
            }
            Family::PcrelBranch => {
                let mut site = sec_vma.wrapping_add(rec.offset);
                let mut redirected = false;
                if let Some(class) = BranchClass::from_code(code) {
                    let stub_key = StubKey {
                        class,
                        symbol: rec.symbol,
                        origin: stub_origin,
                    };
                    if external {
                        let found = stubs.and_then(|s| {
                            s.lookup(stub_key)
                                .or_else(|| s.lookup_symbol(rec.symbol, stub_origin))
                        });
                        match found {
                            Some(addr) => {
                                value = addr;
                                redirected = true;
                                session.note_stub_redirect(key, addr);
                            }
                            None => note_unresolvable(
                                tolerant,
                                diag,
                                &mut summary,
                                &display_name,
                                desc.name,
                                rec.offset,
                            ),
                        }
                    } else if defined {
                        let dest = value.wrapping_add(addend as u64);
                        let distance = dest.wrapping_sub(site.wrapping_add(8)) as i64;
                        if distance < -class.limit() || distance >= class.limit() {
                            if let Some(addr) = stubs.and_then(|s| s.lookup(stub_key)) {
                                value = addr;
                                redirected = true;
                                session.note_stub_redirect(key, addr);
                            }
                        }
                    }
                }

                let is_call = matches!(
                    code,
                    RelocCode::Pcrel17F
                        | RelocCode::Pcrel17C
                        | RelocCode::Pcrel22F
                        | RelocCode::Pcrel22C
                );
                if redirected && is_call {
                    // The 17-bit forms carry the link register in the
                    // instruction; move it to %r31 so the stub's copy
                    // restores the calling convention. The 22-bit form
                    // spends those bits on displacement.
                    rewrite_link = fmt == InsnFormat::Branch17;
                    let delay_offset = rec.offset + 4;
                    if delay_offset + 4 <= contents.len() as u64
                        && read_u32(contents, delay_offset) != NOP
                    {
                        // Occupied delay slot: the call will move one
                        // word down, executing after its former delay
                        // instruction. The stub's return-pointer
                        // adjustment assumes exactly this layout.
                        swap_delay = true;
                        site = site.wrapping_add(4);
                    }
                }

                let v = field_adjust(
                    value.wrapping_sub(site),
                    addend.wrapping_sub(8),
                    pcrel_selector(code),
                );
                PatchValue::Insn(v >> 2)
            }
            Family::PcrelWord => {
                if external {
                    match stubs.and_then(|s| s.lookup_symbol(rec.symbol, stub_origin)) {
                        Some(addr) => value = addr,
                        None => note_unresolvable(
                            tolerant,
                            diag,
                            &mut summary,
                            &display_name,
                            desc.name,
                            rec.offset,
                        ),
                    }
                }
                let site = sec_vma.wrapping_add(rec.offset);
                let v = value
                    .wrapping_sub(site)
                    .wrapping_add(addend.wrapping_sub(8) as u64);
                if code == RelocCode::Pcrel32 {
                    PatchValue::Word32(v)
                } else {
                    PatchValue::Word64(v)
                }
            }
            Family::Dltind { fptr } => {
                let content = if fptr && defined {
                    session.ensure_opd_slot(key, value)
                } else {
                    value
                };
                let slot = session.ensure_dlt_slot(key, content);
                PatchValue::Insn(field_adjust(
                    slot.wrapping_sub(gp),
                    addend,
                    absolute_selector(code),
                ))
            }
            Family::DltindWord { fptr } => {
                let content = if fptr && defined {
                    session.ensure_opd_slot(key, value)
                } else {
                    value
                };
                let slot = session.ensure_dlt_slot(key, content);
                let v = slot.wrapping_sub(gp).wrapping_add(addend as u64);
                if code == RelocCode::LtoffFptr32 {
                    PatchValue::Word32(v)
                } else {
                    PatchValue::Word64(v)
                }
            }
            Family::GpRel => PatchValue::Insn(field_adjust(
                value.wrapping_sub(gp),
                addend,
                absolute_selector(code),
            )),
            Family::GpRelWord => {
                PatchValue::Word64(value.wrapping_sub(gp).wrapping_add(addend as u64))
            }
            Family::Pltoff => {
                let slot = session.ensure_plt_slot(key, value);
                PatchValue::Insn(field_adjust(
                    slot.wrapping_sub(gp),
                    addend,
                    absolute_selector(code),
                ))
            }
            Family::FptrWord => {
                // Locally defined functions get a descriptor built here;
                // imported ones are described by their home object.
                let v = if defined {
                    session.ensure_opd_slot(key, value)
                } else {
                    value
                };
                PatchValue::Word64(v.wrapping_add(addend as u64))
            }
            Family::SecrelWord => {
                let base = sym_section
                    .and_then(|s| session.section(s))
                    .map_or(0, |s| s.vma);
                PatchValue::Word32(value.wrapping_add(addend as u64).wrapping_sub(base))
            }
            Family::SegrelWord => {
                let bases = session.segment_bases();
                let in_text = sym_section
                    .and_then(|s| session.section(s))
                    .is_some_and(|s| s.flags.code);
                let base = if in_text { bases.text } else { bases.data };
                let v = value.wrapping_add(addend as u64).wrapping_sub(base);
                if code == RelocCode::Segrel32 {
                    PatchValue::Word32(v)
                } else {
                    PatchValue::Word64(v)
                }
            }
            Family::Tprel => PatchValue::Insn(field_adjust(
                value.wrapping_sub(tp),
                addend,
                absolute_selector(code),
            )),
            Family::TprelWord => {
                let v = value.wrapping_sub(tp).wrapping_add(addend as u64);
                if code == RelocCode::Tprel32 {
                    PatchValue::Word32(v)
                } else {
                    PatchValue::Word64(v)
                }
            }
            Family::LtoffTp => {
                let content = if defined { value.wrapping_sub(tp) } else { value };
                let slot = session.ensure_tp_slot(key, content);
                PatchValue::Insn(field_adjust(
                    slot.wrapping_sub(gp),
                    addend,
                    absolute_selector(code),
                ))
            }
            Family::LtoffTpWord => {
                let content = if defined { value.wrapping_sub(tp) } else { value };
                let slot = session.ensure_tp_slot(key, content);
                PatchValue::Word64(slot.wrapping_sub(gp).wrapping_add(addend as u64))
            }
            Family::Marker | Family::Unsupported => unreachable!("filtered above"),
        };

        let field_value = match patch {
            PatchValue::Insn(v) => v,
            PatchValue::Word32(v) | PatchValue::Word64(v) => v as i64,
        };
        if desc.check == OverflowCheck::Bitfield && !fits_bitfield(field_value, desc.bit_width) {
            diag.overflow(&display_name, desc.name, rec.offset);
            summary.overflows += 1;
        }

        match patch {
            PatchValue::Insn(v) => {
                let mut word = patch_insn(insn_before, v, fmt);
                if rewrite_link {
                    word = (word & !(0x1f << 21)) | (31 << 21);
                }
                write_u32(contents, rec.offset, word);
            }
            PatchValue::Word32(v) => write_u32(contents, rec.offset, v as u32),
            PatchValue::Word64(v) => write_u64(contents, rec.offset, v),
        }

        if swap_delay {
            let branch = read_u32(contents, rec.offset);
            let delay = read_u32(contents, rec.offset + 4);
            write_u32(contents, rec.offset, delay);
            write_u32(contents, rec.offset + 4, branch & !2);
            summary.swaps += 1;
            let delay_offset = rec.offset + 4;
            for later in records[i + 1..].iter_mut() {
                if later.offset == delay_offset {
                    later.offset -= 4;
                }
            }
        }

        summary.applied += 1;
    }

    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::{
        LinkOptions, LinkSession, Section, SectionFlags, Symbol, WordSize,
    };
    use crate::stub::{StubInput, StubPlan};
    use alloc::string::ToString;
    use alloc::vec;

    fn text_section(name: &str, vma: u64) -> Section {
        Section {
            name: name.to_string(),
            vma,
            file_offset: 0,
            size: 0x10_0000,
            flags: SectionFlags {
                alloc: true,
                load: true,
                readonly: true,
                code: true,
            },
            output_offset: 0,
        }
    }

    fn words(bytes: &[u8]) -> Vec<u32> {
        bytes
            .chunks_exact(4)
            .map(|c| u32::from_be_bytes([c[0], c[1], c[2], c[3]]))
            .collect()
    }

    #[test]
    fn dir21l_builds_the_left_half() {
        let mut s = LinkSession::new(LinkOptions::new(WordSize::Elf32));
        let text = s.add_section(text_section(".text", 0));
        let sym = s.add_symbol(Symbol::absolute("datum", 0x1234_5678));
        let mut records = [RelocationRecord::rela(0, RelocCode::Dir21L, sym, 0)];
        let mut contents = 0x2020_0000u32.to_be_bytes().to_vec();

        let summary =
            relocate_section(&mut s, text, &mut records, &mut contents, None, &mut ()).unwrap();
        assert_eq!(summary.applied, 1);
        assert_eq!(words(&contents), [0x2022_6246]);
    }

    #[test]
    fn pcrel17f_call_in_range() {
        let mut s = LinkSession::new(LinkOptions::new(WordSize::Elf32));
        let text = s.add_section(text_section(".text", 0x1000));
        let callee = s.add_symbol(Symbol::in_section("callee", text, 0x1000));
        let mut records = [RelocationRecord::rela(0, RelocCode::Pcrel17F, callee, 0)];
        // bl 0,%r2 followed by a nop in the delay slot.
        let mut contents = Vec::new();
        contents.extend_from_slice(&0xe840_0000u32.to_be_bytes());
        contents.extend_from_slice(&NOP.to_be_bytes());

        relocate_section(&mut s, text, &mut records, &mut contents, None, &mut ()).unwrap();
        // (0x2000 - 0x1000 - 8) >> 2 = 0x3fe.
        assert_eq!(words(&contents)[0], 0xe840_1ff0);
    }

    #[test]
    fn undefined_symbol_is_fatal_and_reported() {
        let mut s = LinkSession::new(LinkOptions::new(WordSize::Elf32));
        let text = s.add_section(text_section(".text", 0));
        let missing = s.add_symbol(Symbol::undefined("missing"));
        let mut records = [RelocationRecord::rela(0, RelocCode::Dir32, missing, 0)];
        let mut contents = vec![0u8; 4];
        let mut diag = CollectedDiagnostics::default();

        let err = relocate_section(&mut s, text, &mut records, &mut contents, None, &mut diag)
            .unwrap_err();
        assert_eq!(
            err,
            LinkError::UndefinedSymbol {
                section: ".text".to_string(),
                offset: 0,
                symbol: "missing".to_string(),
            }
        );
        assert_eq!(
            diag.events,
            [DiagnosticEvent::Undefined {
                symbol: "missing".to_string(),
                offset: 0,
            }]
        );
    }

    #[test]
    fn weak_undefined_resolves_to_zero() {
        let mut s = LinkSession::new(LinkOptions::new(WordSize::Elf32));
        let text = s.add_section(text_section(".text", 0));
        let weak = s.add_symbol(Symbol::undefined("maybe").weak());
        let mut records = [RelocationRecord::rela(0, RelocCode::Dir32, weak, 0)];
        let mut contents = vec![0xffu8; 4];

        let summary =
            relocate_section(&mut s, text, &mut records, &mut contents, None, &mut ()).unwrap();
        assert_eq!(summary.applied, 1);
        assert_eq!(words(&contents), [0]);
    }

    #[test]
    fn unknown_kind_is_fatal() {
        let mut s = LinkSession::new(LinkOptions::new(WordSize::Elf32));
        let text = s.add_section(text_section(".text", 0));
        let sym = s.add_symbol(Symbol::absolute("x", 0));
        let mut records = [RelocationRecord {
            offset: 0x1c,
            kind: 240,
            symbol: sym,
            addend: Addend::Explicit(0),
        }];
        let mut contents = vec![0u8; 0x40];

        let err = relocate_section(&mut s, text, &mut records, &mut contents, None, &mut ())
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            ".text+0x1c: unknown relocation type 240"
        );
    }

    #[test]
    fn dynamic_types_are_refused() {
        let mut s = LinkSession::new(LinkOptions::new(WordSize::Elf32));
        let text = s.add_section(text_section(".text", 0));
        let sym = s.add_symbol(Symbol::absolute("x", 0));
        let mut records = [RelocationRecord::rela(0, RelocCode::Copy, sym, 0)];
        let mut contents = vec![0u8; 4];

        let err = relocate_section(&mut s, text, &mut records, &mut contents, None, &mut ())
            .unwrap_err();
        assert_eq!(
            err,
            LinkError::UnsupportedRelocation {
                section: ".text".to_string(),
                offset: 0,
                name: "R_PARISC_COPY".to_string(),
            }
        );
    }

    #[test]
    fn out_of_bounds_offset_is_fatal() {
        let mut s = LinkSession::new(LinkOptions::new(WordSize::Elf32));
        let text = s.add_section(text_section(".text", 0));
        let sym = s.add_symbol(Symbol::absolute("x", 0));
        let mut records = [RelocationRecord::rela(0x100, RelocCode::Dir32, sym, 0)];
        let mut contents = vec![0u8; 64];

        let err = relocate_section(&mut s, text, &mut records, &mut contents, None, &mut ())
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            ".text+0x100: relocation offset beyond section contents (len 64)"
        );
    }

    #[test]
    fn relocatable_mode_rewrites_section_addends_only() {
        let mut s = LinkSession::new(LinkOptions {
            mode: LinkMode::Relocatable,
            ..LinkOptions::new(WordSize::Elf32)
        });
        let text = s.add_section(text_section(".text", 0));
        let merged = s.add_section(Section {
            output_offset: 0x100,
            ..text_section(".text.other", 0x8000)
        });
        let sec_sym = s.add_symbol(Symbol::section_symbol(".text.other", merged));
        let plain = s.add_symbol(Symbol::in_section("f", merged, 0x20));
        let mut records = [
            RelocationRecord::rela(0, RelocCode::Dir32, sec_sym, 0x10),
            RelocationRecord::rela(4, RelocCode::Dir32, plain, 0x10),
        ];
        let mut contents = vec![0u8; 8];

        let summary =
            relocate_section(&mut s, text, &mut records, &mut contents, None, &mut ()).unwrap();
        assert_eq!(summary.adjusted, 1);
        assert_eq!(summary.skipped, 1);
        assert_eq!(summary.applied, 0);
        assert_eq!(records[0].addend, Addend::Explicit(0x110));
        assert_eq!(records[1].addend, Addend::Explicit(0x10));
        assert!(contents.iter().all(|&b| b == 0));
    }

    #[test]
    fn dlt_slot_created_once_and_filled() {
        let mut s = LinkSession::new(LinkOptions::new(WordSize::Elf64));
        s.set_dlt_base(0x8000);
        let text = s.add_section(text_section(".text", 0x1000));
        let datum = s.add_symbol(Symbol::in_section("datum", text, 0x2340));
        let mut records = [
            RelocationRecord::rela(0, RelocCode::Dltind14R, datum, 0),
            RelocationRecord::rela(4, RelocCode::Dltind14R, datum, 0),
        ];
        let mut contents = vec![0u8; 8];

        let summary =
            relocate_section(&mut s, text, &mut records, &mut contents, None, &mut ()).unwrap();
        assert_eq!(summary.applied, 2);
        assert_eq!(s.aux_len(), 1);
        assert_eq!(s.dlt().len(), 8);
        assert_eq!(&s.dlt().bytes()[0..8], &0x3340u64.to_be_bytes());
        // gp falls back to the DLT base, so the slot offset is zero.
        assert_eq!(words(&contents), [0, 0]);
    }

    #[test]
    fn fptr64_builds_a_descriptor_for_locals() {
        let mut s = LinkSession::new(LinkOptions::new(WordSize::Elf64));
        s.set_opd_base(0x6000);
        let text = s.add_section(text_section(".text", 0x1000));
        let data = s.add_section(Section {
            flags: SectionFlags {
                alloc: true,
                load: true,
                readonly: false,
                code: false,
            },
            ..text_section(".data", 0x9000)
        });
        let func = s.add_symbol(Symbol::in_section("handler", text, 0x20));
        let mut records = [RelocationRecord::rela(0, RelocCode::Fptr64, func, 0)];
        let mut contents = vec![0u8; 8];

        relocate_section(&mut s, data, &mut records, &mut contents, None, &mut ()).unwrap();
        assert_eq!(&contents[..], &0x6000u64.to_be_bytes());
        let opd = s.opd().bytes();
        assert_eq!(&opd[16..24], &0x1020u64.to_be_bytes());
        // gp fell back to the descriptor table base.
        assert_eq!(&opd[24..32], &0x6000u64.to_be_bytes());
    }

    #[test]
    fn imported_function_pointers_stay_unresolved() {
        let mut s = LinkSession::new(LinkOptions::new(WordSize::Elf64));
        let data = s.add_section(text_section(".data", 0x9000));
        let imp = s.add_symbol(Symbol::import("ext_handler"));
        let mut records = [RelocationRecord::rela(0, RelocCode::Fptr64, imp, 0)];
        let mut contents = vec![0xffu8; 8];
        let mut diag = CollectedDiagnostics::default();

        let summary =
            relocate_section(&mut s, data, &mut records, &mut contents, None, &mut diag).unwrap();
        assert_eq!(summary.warnings, 1);
        assert_eq!(&contents[..], &0u64.to_be_bytes());
        assert!(s.opd().is_empty());
        assert!(matches!(
            diag.events[0],
            DiagnosticEvent::Unresolvable { .. }
        ));
    }

    #[test]
    fn overflow_is_reported_but_patched() {
        let mut s = LinkSession::new(LinkOptions::new(WordSize::Elf32));
        let text = s.add_section(text_section(".text", 0));
        let sym = s.add_symbol(Symbol::absolute("far_datum", 0x1234_5678));
        let mut records = [RelocationRecord::rela(0, RelocCode::Dir14F, sym, 0)];
        let mut contents = vec![0u8; 4];
        let mut diag = CollectedDiagnostics::default();

        let summary =
            relocate_section(&mut s, text, &mut records, &mut contents, None, &mut diag).unwrap();
        assert_eq!(summary.overflows, 1);
        assert_eq!(summary.applied, 1);
        assert_eq!(
            diag.events,
            [DiagnosticEvent::Overflow {
                symbol: "far_datum".to_string(),
                reloc: "R_PARISC_DIR14F".to_string(),
                offset: 0,
            }]
        );
        assert_ne!(words(&contents), [0]);
    }

    #[test]
    fn segrel_subtracts_the_owning_segment_base() {
        let mut s = LinkSession::new(LinkOptions::new(WordSize::Elf32));
        let text = s.add_section(Section {
            file_offset: 0x100,
            ..text_section(".text", 0x1000)
        });
        let data = s.add_section(Section {
            file_offset: 0x5000,
            flags: SectionFlags {
                alloc: true,
                load: true,
                readonly: false,
                code: false,
            },
            ..text_section(".data", 0x2_5000)
        });
        let f = s.add_symbol(Symbol::in_section("f", text, 0x40));
        let mut records = [RelocationRecord::rela(0, RelocCode::Segrel32, f, 0)];
        let mut contents = vec![0u8; 4];

        relocate_section(&mut s, data, &mut records, &mut contents, None, &mut ()).unwrap();
        // text base = 0x1000 - 0x100; the symbol sits 0x140 past it.
        assert_eq!(words(&contents), [0x140]);
    }

    #[test]
    fn unresolvable_import_without_stub_warns() {
        let mut s = LinkSession::new(LinkOptions::new(WordSize::Elf32));
        let text = s.add_section(text_section(".text", 0x1000));
        let imp = s.add_symbol(Symbol::import("printf"));
        let mut records = [RelocationRecord::rela(0, RelocCode::Pcrel17F, imp, 0)];
        let mut contents = vec![0u8; 8];
        let mut diag = CollectedDiagnostics::default();

        let summary =
            relocate_section(&mut s, text, &mut records, &mut contents, None, &mut diag).unwrap();
        assert_eq!(summary.warnings, 1);
        assert_eq!(summary.applied, 1);
    }

    #[test]
    fn redirected_call_with_occupied_delay_slot_is_exchanged() {
        let mut s = LinkSession::new(LinkOptions::new(WordSize::Elf32));
        let text = s.add_section(text_section(".text", 0));
        let far_text = s.add_section(text_section(".text.far", 0x4100_0000));
        let far = s.add_symbol(Symbol::in_section("far", far_text, 0));

        let sizing_records = [RelocationRecord::rela(0, RelocCode::Pcrel17F, far, 0)];
        let plan = StubPlan::size(
            &s,
            &[StubInput {
                section: text,
                records: &sizing_records,
            }],
        );
        assert_eq!(plan.len(), 1);
        let image = plan.build(0x1_0000, &s).unwrap();

        // bl,n far,%r2 with a live instruction in the delay slot, plus a
        // marker record pointing at the delay word.
        let payload = 0x0803_0241u32;
        let mut contents = Vec::new();
        contents.extend_from_slice(&0xe840_0002u32.to_be_bytes());
        contents.extend_from_slice(&payload.to_be_bytes());
        let mut records = [
            RelocationRecord::rela(0, RelocCode::Pcrel17F, far, 0),
            RelocationRecord::rela(4, RelocCode::None, far, 0),
        ];

        let summary = relocate_section(
            &mut s,
            text,
            &mut records,
            &mut contents,
            Some(&image),
            &mut (),
        )
        .unwrap();
        assert_eq!(summary.swaps, 1);

        let w = words(&contents);
        // The payload now runs first; the call moved into its slot.
        assert_eq!(w[0], payload);
        // Nullify cleared, link register moved to %r31, displacement
        // aimed at the stub from the call's new home.
        assert_eq!(w[1], 0xebe7_1fec);
        // The record that followed the delay word tracks the move.
        assert_eq!(records[1].offset, 0);
        // The redirect was memoized for this target.
        assert_eq!(
            s.aux_entry(AuxKey::global(far)).and_then(|e| e.stub_offset),
            Some(0x1_0000)
        );
    }

    #[test]
    fn redirected_call_with_nop_delay_slot_stays_put() {
        let mut s = LinkSession::new(LinkOptions::new(WordSize::Elf32));
        let text = s.add_section(text_section(".text", 0));
        let far_text = s.add_section(text_section(".text.far", 0x4100_0000));
        let far = s.add_symbol(Symbol::in_section("far", far_text, 0));

        let sizing_records = [RelocationRecord::rela(0, RelocCode::Pcrel17F, far, 0)];
        let plan = StubPlan::size(
            &s,
            &[StubInput {
                section: text,
                records: &sizing_records,
            }],
        );
        let image = plan.build(0x1_0000, &s).unwrap();

        let mut contents = Vec::new();
        contents.extend_from_slice(&0xe840_0000u32.to_be_bytes());
        contents.extend_from_slice(&NOP.to_be_bytes());
        let mut records = [RelocationRecord::rela(0, RelocCode::Pcrel17F, far, 0)];

        let summary = relocate_section(
            &mut s,
            text,
            &mut records,
            &mut contents,
            Some(&image),
            &mut (),
        )
        .unwrap();
        assert_eq!(summary.swaps, 0);

        let w = words(&contents);
        // (0x10000 - 0 - 8) >> 2 = 0x3ffe, linked through %r31.
        assert_eq!(w[0], 0xebe7_1ff6);
        assert_eq!(w[1], NOP);
    }

    #[test]
    fn tls_slots_do_not_collide_with_plain_slots() {
        let mut s = LinkSession::new(LinkOptions::new(WordSize::Elf64));
        s.set_dlt_base(0x8000);
        s.options.tp = Some(0x100);
        let text = s.add_section(text_section(".text", 0x1000));
        let var = s.add_symbol(Symbol::in_section("tls_var", text, 0x400));
        let mut records = [
            RelocationRecord::rela(0, RelocCode::Dltind14R, var, 0),
            RelocationRecord::rela(4, RelocCode::LtoffTp14R, var, 0),
        ];
        let mut contents = vec![0u8; 8];

        relocate_section(&mut s, text, &mut records, &mut contents, None, &mut ()).unwrap();
        // Two distinct slots: the raw address and the tp-relative value.
        assert_eq!(s.dlt().len(), 16);
        assert_eq!(&s.dlt().bytes()[0..8], &0x1400u64.to_be_bytes());
        assert_eq!(&s.dlt().bytes()[8..16], &0x1300u64.to_be_bytes());
    }
}
