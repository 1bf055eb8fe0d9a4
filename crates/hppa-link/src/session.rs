//! Link-session state.
//!
//! A [`LinkSession`] owns everything that outlives a single relocation
//! record: the section and symbol arenas, the auxiliary-entry table that
//! backs linkage-table indirection, the byte images of the DLT, PLT, and
//! descriptor tables, and the lazily computed segment bases. Sections and
//! symbols are referred to by small index handles rather than references,
//! so records and stub keys stay `Copy` and the borrow checker stays out
//! of the way.

use alloc::collections::BTreeMap;
use alloc::string::String;
use alloc::vec::Vec;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Handle to a section registered with a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct SectionId(u32);

impl SectionId {
    /// Builds a handle from a raw index.
    #[must_use]
    pub fn new(index: u32) -> Self {
        Self(index)
    }

    /// The raw index.
    #[must_use]
    pub fn index(self) -> u32 {
        self.0
    }
}

/// Handle to a symbol registered with a session.
///
/// Symbol handles double as the symbol-table indexes that relocation
/// records carry, in registration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct SymbolId(u32);

impl SymbolId {
    /// Builds a handle from a raw symbol-table index.
    #[must_use]
    pub fn new(index: u32) -> Self {
        Self(index)
    }

    /// The raw index.
    #[must_use]
    pub fn index(self) -> u32 {
        self.0
    }
}

/// Target word size of the link.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum WordSize {
    /// 32-bit ELF.
    Elf32,
    /// 64-bit ELF.
    Elf64,
}

impl WordSize {
    /// Size in bytes of one linkage-table slot.
    #[must_use]
    pub fn slot_bytes(self) -> u64 {
        match self {
            Self::Elf32 => 4,
            Self::Elf64 => 8,
        }
    }
}

/// Whether this link produces a final image or another relocatable object.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum LinkMode {
    /// Resolve and patch everything.
    Final,
    /// Merge objects; only section-symbol addends are rewritten.
    Relocatable,
}

/// Placement flags of an output section.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct SectionFlags {
    /// Occupies address space.
    pub alloc: bool,
    /// Loaded from the file.
    pub load: bool,
    /// Not writable at run time.
    pub readonly: bool,
    /// Holds instructions.
    pub code: bool,
}

/// One output section as the external linker laid it out.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Section {
    /// Section name, e.g. `".text"`.
    pub name: String,
    /// Assigned virtual address.
    pub vma: u64,
    /// Offset of the section contents within the output file.
    pub file_offset: u64,
    /// Size in bytes.
    pub size: u64,
    /// Placement flags.
    pub flags: SectionFlags,
    /// Displacement of this input section within its merged output
    /// section. Only consulted by relocatable links.
    pub output_offset: u64,
}

/// Symbol binding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Binding {
    /// Not visible outside its object.
    Local,
    /// Ordinary global.
    Global,
    /// Global that may stay undefined and resolves to zero.
    Weak,
}

/// Where a symbol's value comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum SymbolPlacement {
    /// Defined at an offset inside a session section.
    Section(SectionId),
    /// Absolute value, no section.
    Absolute,
    /// Defined only by a shared dependency; no local address.
    Import,
    /// No definition anywhere.
    Undefined,
}

/// One symbol-table entry.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Symbol {
    /// Symbol name.
    pub name: String,
    /// Offset within the owning section, or the absolute value.
    pub value: u64,
    /// Definition site.
    pub placement: SymbolPlacement,
    /// Binding.
    pub binding: Binding,
    /// True for the synthetic symbol that names a section itself; its
    /// own value is ignored during resolution.
    pub is_section: bool,
    /// Call-convention signature, folded into auxiliary-table keys.
    pub signature: u32,
}

impl Symbol {
    /// A symbol defined at `value` inside `section`.
    #[must_use]
    pub fn in_section(name: &str, section: SectionId, value: u64) -> Self {
        Self {
            name: String::from(name),
            value,
            placement: SymbolPlacement::Section(section),
            binding: Binding::Global,
            is_section: false,
            signature: 0,
        }
    }

    /// The synthetic symbol standing for a section.
    #[must_use]
    pub fn section_symbol(name: &str, section: SectionId) -> Self {
        Self {
            name: String::from(name),
            value: 0,
            placement: SymbolPlacement::Section(section),
            binding: Binding::Local,
            is_section: true,
            signature: 0,
        }
    }

    /// An absolute symbol.
    #[must_use]
    pub fn absolute(name: &str, value: u64) -> Self {
        Self {
            name: String::from(name),
            value,
            placement: SymbolPlacement::Absolute,
            binding: Binding::Global,
            is_section: false,
            signature: 0,
        }
    }

    /// A symbol defined only by a shared dependency.
    #[must_use]
    pub fn import(name: &str) -> Self {
        Self {
            name: String::from(name),
            value: 0,
            placement: SymbolPlacement::Import,
            binding: Binding::Global,
            is_section: false,
            signature: 0,
        }
    }

    /// An undefined symbol.
    #[must_use]
    pub fn undefined(name: &str) -> Self {
        Self {
            name: String::from(name),
            value: 0,
            placement: SymbolPlacement::Undefined,
            binding: Binding::Global,
            is_section: false,
            signature: 0,
        }
    }

    /// Same symbol with weak binding.
    #[must_use]
    pub fn weak(mut self) -> Self {
        self.binding = Binding::Weak;
        self
    }

    /// Same symbol with local binding.
    #[must_use]
    pub fn local(mut self) -> Self {
        self.binding = Binding::Local;
        self
    }
}

/// Outcome of looking a symbol's address up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SymbolResolution {
    /// The symbol has an address in this link.
    Defined {
        /// Resolved virtual address.
        value: u64,
        /// Owning section, if any.
        section: Option<SectionId>,
    },
    /// Defined only by a shared dependency; callers redirect through a
    /// stub or an auxiliary-table slot.
    External,
    /// No definition anywhere.
    Undefined,
}

/// Knobs for one link pass.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct LinkOptions {
    /// Target word size.
    pub word_size: WordSize,
    /// Final or relocatable output.
    pub mode: LinkMode,
    /// Building a shared object; undefined symbols with default
    /// visibility are tolerated.
    pub shared: bool,
    /// Tolerate undefined symbols even outside shared links.
    pub tolerate_undefined: bool,
    /// Overrides the computed global-pointer value.
    pub gp: Option<u64>,
    /// Thread-pointer value for the thread-local families.
    pub tp: Option<u64>,
}

impl LinkOptions {
    /// Options for a final link at the given word size.
    #[must_use]
    pub fn new(word_size: WordSize) -> Self {
        Self {
            word_size,
            mode: LinkMode::Final,
            shared: false,
            tolerate_undefined: false,
            gp: None,
            tp: None,
        }
    }
}

impl Default for LinkOptions {
    fn default() -> Self {
        Self::new(WordSize::Elf32)
    }
}

/// Key of an auxiliary entry.
///
/// Globals share one entry per symbol. Local symbols are disambiguated by
/// the referencing section and the record's constant, since two locals of
/// the same name in different inputs must not collide.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct AuxKey {
    /// Referenced symbol.
    pub symbol: SymbolId,
    /// Referencing section for local symbols, `None` for globals.
    pub origin: Option<SectionId>,
    /// Call-convention signature or local disambiguator.
    pub signature: u32,
}

impl AuxKey {
    /// Key for a global symbol.
    #[must_use]
    pub fn global(symbol: SymbolId) -> Self {
        Self {
            symbol,
            origin: None,
            signature: 0,
        }
    }

    /// Key for a local symbol referenced from `origin`.
    #[must_use]
    pub fn local(symbol: SymbolId, origin: SectionId, signature: u32) -> Self {
        Self {
            symbol,
            origin: Some(origin),
            signature,
        }
    }
}

/// Lazily filled offsets owned by one auxiliary-table key.
///
/// Every slot starts unassigned and is carved out of its table the first
/// time a relocation needs it, never again afterwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct AuxEntry {
    /// Offset of the symbol's slot in the DLT.
    pub dlt_offset: Option<u64>,
    /// Offset of the symbol's thread-pointer slot, also carved from the
    /// DLT but holding a thread-relative value.
    pub tp_offset: Option<u64>,
    /// Offset of the symbol's PLT entry.
    pub plt_offset: Option<u64>,
    /// Offset of the symbol's function descriptor.
    pub opd_offset: Option<u64>,
    /// Address of the stub this symbol's calls were redirected to.
    pub stub_offset: Option<u64>,
}

/// Growable byte image of one generated table (DLT, PLT, or OPD).
#[derive(Debug, Clone, Default)]
pub struct TableImage {
    base: Option<u64>,
    bytes: Vec<u8>,
}

impl TableImage {
    /// Assigned base address, once the external linker has placed the
    /// table.
    #[must_use]
    pub fn base(&self) -> Option<u64> {
        self.base
    }

    /// The table contents generated so far.
    #[must_use]
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Current size in bytes.
    #[must_use]
    pub fn len(&self) -> u64 {
        self.bytes.len() as u64
    }

    /// True when nothing has been allocated yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    fn address(&self, offset: u64) -> u64 {
        self.base.unwrap_or(0).wrapping_add(offset)
    }

    fn reserve(&mut self, len: u64) -> u64 {
        let offset = self.bytes.len() as u64;
        self.bytes.resize(self.bytes.len() + len as usize, 0);
        offset
    }

    fn put_be32(&mut self, offset: u64, value: u32) {
        let offset = offset as usize;
        self.bytes[offset..offset + 4].copy_from_slice(&value.to_be_bytes());
    }

    fn put_be64(&mut self, offset: u64, value: u64) {
        let offset = offset as usize;
        self.bytes[offset..offset + 8].copy_from_slice(&value.to_be_bytes());
    }
}

/// Lowest mapped address of the two canonical output segments.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SegmentBases {
    /// Base of the read-only (text) segment.
    pub text: u64,
    /// Base of the read-write (data) segment.
    pub data: u64,
}

/// State shared by every relocation of one link pass.
#[derive(Debug, Default)]
pub struct LinkSession {
    /// Link-wide options.
    pub options: LinkOptions,
    sections: Vec<Section>,
    symbols: Vec<Symbol>,
    aux_entries: Vec<AuxEntry>,
    aux_index: BTreeMap<AuxKey, usize>,
    aux_cache: Option<(AuxKey, usize)>,
    dlt: TableImage,
    plt: TableImage,
    opd: TableImage,
    segment_bases: Option<SegmentBases>,
}

impl LinkSession {
    /// Creates an empty session.
    #[must_use]
    pub fn new(options: LinkOptions) -> Self {
        Self {
            options,
            ..Self::default()
        }
    }

    /// Registers a section, returning its handle.
    pub fn add_section(&mut self, section: Section) -> SectionId {
        let id = SectionId(self.sections.len() as u32);
        self.sections.push(section);
        id
    }

    /// Registers a symbol, returning its handle.
    pub fn add_symbol(&mut self, symbol: Symbol) -> SymbolId {
        let id = SymbolId(self.symbols.len() as u32);
        self.symbols.push(symbol);
        id
    }

    /// Looks a section up.
    #[must_use]
    pub fn section(&self, id: SectionId) -> Option<&Section> {
        self.sections.get(id.0 as usize)
    }

    /// Mutable section access, e.g. to record output displacements.
    pub fn section_mut(&mut self, id: SectionId) -> Option<&mut Section> {
        self.sections.get_mut(id.0 as usize)
    }

    /// Looks a symbol up.
    #[must_use]
    pub fn symbol(&self, id: SymbolId) -> Option<&Symbol> {
        self.symbols.get(id.0 as usize)
    }

    /// All registered sections, in handle order.
    #[must_use]
    pub fn sections(&self) -> &[Section] {
        &self.sections
    }

    /// All registered symbols, in handle order.
    #[must_use]
    pub fn symbols(&self) -> &[Symbol] {
        &self.symbols
    }

    /// Resolves a symbol handle to an address or its external status.
    ///
    /// Returns `None` only for a handle this session never issued.
    #[must_use]
    pub fn resolve(&self, id: SymbolId) -> Option<SymbolResolution> {
        let sym = self.symbol(id)?;
        Some(match sym.placement {
            SymbolPlacement::Section(sec_id) => match self.section(sec_id) {
                Some(sec) => {
                    let offset = if sym.is_section { 0 } else { sym.value };
                    SymbolResolution::Defined {
                        value: sec.vma.wrapping_add(offset),
                        section: Some(sec_id),
                    }
                }
                None => SymbolResolution::Undefined,
            },
            SymbolPlacement::Absolute => SymbolResolution::Defined {
                value: sym.value,
                section: None,
            },
            SymbolPlacement::Import => SymbolResolution::External,
            SymbolPlacement::Undefined => SymbolResolution::Undefined,
        })
    }

    /// Sets the DLT base address.
    pub fn set_dlt_base(&mut self, base: u64) {
        self.dlt.base = Some(base);
    }

    /// Sets the PLT base address.
    pub fn set_plt_base(&mut self, base: u64) {
        self.plt.base = Some(base);
    }

    /// Sets the descriptor-table base address.
    pub fn set_opd_base(&mut self, base: u64) {
        self.opd.base = Some(base);
    }

    /// The DLT image.
    #[must_use]
    pub fn dlt(&self) -> &TableImage {
        &self.dlt
    }

    /// The PLT image.
    #[must_use]
    pub fn plt(&self) -> &TableImage {
        &self.plt
    }

    /// The descriptor-table image.
    #[must_use]
    pub fn opd(&self) -> &TableImage {
        &self.opd
    }

    /// Number of distinct auxiliary entries created so far.
    #[must_use]
    pub fn aux_len(&self) -> usize {
        self.aux_entries.len()
    }

    /// Read-only view of an auxiliary entry, if one exists for `key`.
    #[must_use]
    pub fn aux_entry(&self, key: AuxKey) -> Option<&AuxEntry> {
        if let Some((cached, idx)) = self.aux_cache {
            if cached == key {
                return self.aux_entries.get(idx);
            }
        }
        self.aux_index.get(&key).map(|&idx| &self.aux_entries[idx])
    }

    fn intern_aux(&mut self, key: AuxKey) -> usize {
        if let Some((cached, idx)) = self.aux_cache {
            if cached == key {
                return idx;
            }
        }
        let idx = match self.aux_index.get(&key) {
            Some(&idx) => idx,
            None => {
                let idx = self.aux_entries.len();
                self.aux_entries.push(AuxEntry::default());
                self.aux_index.insert(key, idx);
                idx
            }
        };
        self.aux_cache = Some((key, idx));
        idx
    }

    /// Records the stub address a key's calls were redirected through.
    pub fn note_stub_redirect(&mut self, key: AuxKey, address: u64) {
        let idx = self.intern_aux(key);
        let slot = &mut self.aux_entries[idx].stub_offset;
        if slot.is_none() {
            *slot = Some(address);
        }
    }

    /// Address of the key's DLT slot, allocating and filling it with
    /// `content` on first use. Later calls return the same slot and
    /// leave the content alone.
    pub fn ensure_dlt_slot(&mut self, key: AuxKey, content: u64) -> u64 {
        let word = self.options.word_size;
        let idx = self.intern_aux(key);
        if let Some(offset) = self.aux_entries[idx].dlt_offset {
            return self.dlt.address(offset);
        }
        let offset = self.dlt.reserve(word.slot_bytes());
        match word {
            WordSize::Elf32 => self.dlt.put_be32(offset, content as u32),
            WordSize::Elf64 => self.dlt.put_be64(offset, content),
        }
        self.aux_entries[idx].dlt_offset = Some(offset);
        self.dlt.address(offset)
    }

    /// Address of the key's thread-pointer slot. Lives in the DLT like
    /// an ordinary slot but is tracked separately, since the same symbol
    /// may be referenced both ways with different slot contents.
    pub fn ensure_tp_slot(&mut self, key: AuxKey, content: u64) -> u64 {
        let word = self.options.word_size;
        let idx = self.intern_aux(key);
        if let Some(offset) = self.aux_entries[idx].tp_offset {
            return self.dlt.address(offset);
        }
        let offset = self.dlt.reserve(word.slot_bytes());
        match word {
            WordSize::Elf32 => self.dlt.put_be32(offset, content as u32),
            WordSize::Elf64 => self.dlt.put_be64(offset, content),
        }
        self.aux_entries[idx].tp_offset = Some(offset);
        self.dlt.address(offset)
    }

    /// Address of the key's function descriptor, building the 4-word
    /// record (two zero words, code address, global pointer) on first
    /// use.
    pub fn ensure_opd_slot(&mut self, key: AuxKey, code_address: u64) -> u64 {
        let gp = self.gp();
        let idx = self.intern_aux(key);
        if let Some(offset) = self.aux_entries[idx].opd_offset {
            return self.opd.address(offset);
        }
        let offset = self.opd.reserve(32);
        self.opd.put_be64(offset + 16, code_address);
        self.opd.put_be64(offset + 24, gp);
        self.aux_entries[idx].opd_offset = Some(offset);
        self.opd.address(offset)
    }

    /// Address of the key's PLT entry, writing the `{code address,
    /// global pointer}` pair on first use.
    pub fn ensure_plt_slot(&mut self, key: AuxKey, code_address: u64) -> u64 {
        let word = self.options.word_size;
        let gp = self.gp();
        let idx = self.intern_aux(key);
        if let Some(offset) = self.aux_entries[idx].plt_offset {
            return self.plt.address(offset);
        }
        let offset = self.plt.reserve(2 * word.slot_bytes());
        match word {
            WordSize::Elf32 => {
                self.plt.put_be32(offset, code_address as u32);
                self.plt.put_be32(offset + 4, gp as u32);
            }
            WordSize::Elf64 => {
                self.plt.put_be64(offset, code_address);
                self.plt.put_be64(offset + 8, gp);
            }
        }
        self.aux_entries[idx].plt_offset = Some(offset);
        self.plt.address(offset)
    }

    /// The two canonical segment bases, scanned from the section table
    /// on first use and cached for the rest of the link.
    pub fn segment_bases(&mut self) -> SegmentBases {
        if let Some(bases) = self.segment_bases {
            return bases;
        }
        let mut text = u64::MAX;
        let mut data = u64::MAX;
        for sec in &self.sections {
            let value = sec.vma.wrapping_sub(sec.file_offset);
            let f = sec.flags;
            if f.alloc && f.load && f.readonly {
                if value < text {
                    text = value;
                }
            } else if f.alloc && f.load {
                if value < data {
                    data = value;
                }
            }
        }
        let bases = SegmentBases { text, data };
        self.segment_bases = Some(bases);
        bases
    }

    /// The global-pointer value for this link.
    ///
    /// An explicit option wins. Otherwise the PLT base is preferred, so
    /// generated stubs can reach PLT entries with short displacements,
    /// then the DLT, the descriptor table, and finally a section named
    /// `.data`. With none of those placed the value is zero.
    #[must_use]
    pub fn gp(&self) -> u64 {
        if let Some(gp) = self.options.gp {
            return gp;
        }
        if let Some(base) = self.plt.base {
            return base;
        }
        if let Some(base) = self.dlt.base {
            return base;
        }
        if let Some(base) = self.opd.base {
            return base;
        }
        self.sections
            .iter()
            .find(|s| s.name == ".data")
            .map_or(0, |s| s.vma)
    }

    /// The thread-pointer value, zero unless configured.
    #[must_use]
    pub fn tp(&self) -> u64 {
        self.options.tp.unwrap_or(0)
    }
}

/// True for assembler-temporary names that never leave their object.
///
/// PA uses an `L$` prefix where other ELF targets use `.L`.
#[must_use]
pub fn is_local_label(name: &str) -> bool {
    name.starts_with("L$") || name.starts_with(".L")
}
