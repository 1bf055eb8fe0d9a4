//! Error types shared across the crate.

use alloc::string::String;
use core::fmt;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Errors produced while resolving and applying relocations.
///
/// Every variant that originates from a relocation record carries the name of
/// the section being patched and the byte offset of the record, so a caller
/// can report the failing input location without extra bookkeeping.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[non_exhaustive]
pub enum LinkError {
    /// A record carried a relocation type outside the descriptor table.
    UnknownRelocation {
        /// Name of the section being patched.
        section: String,
        /// Byte offset of the record within the section.
        offset: u64,
        /// The out-of-range type value from the record.
        kind: u32,
    },
    /// A record used a relocation the engine does not handle.
    ///
    /// This covers the dynamic-linking types (`R_PARISC_COPY`, the PLT
    /// entry types) as well as reserved slots of the descriptor table.
    UnsupportedRelocation {
        /// Name of the section being patched.
        section: String,
        /// Byte offset of the record within the section.
        offset: u64,
        /// Display name of the relocation, e.g. `"R_PARISC_COPY"`.
        name: String,
    },
    /// The relocation pass was handed a section handle the session never
    /// issued.
    UnknownSection {
        /// The raw handle index.
        section: u32,
    },
    /// A record referenced a symbol index the session never registered.
    BadSymbolIndex {
        /// Name of the section being patched.
        section: String,
        /// Byte offset of the record within the section.
        offset: u64,
        /// The symbol index carried by the record.
        index: u32,
    },
    /// A non-weak symbol had no definition and the session does not
    /// tolerate undefined symbols.
    UndefinedSymbol {
        /// Name of the section being patched.
        section: String,
        /// Byte offset of the record within the section.
        offset: u64,
        /// Name of the symbol that could not be resolved.
        symbol: String,
    },
    /// A record pointed past the end of the section contents.
    OffsetOutOfBounds {
        /// Name of the section being patched.
        section: String,
        /// Byte offset of the record within the section.
        offset: u64,
        /// Length of the section contents that were handed in.
        len: u64,
    },
    /// A stub entry targets a symbol that has no address anywhere.
    StubTargetUndefined {
        /// Name of the symbol the stub was supposed to reach.
        symbol: String,
    },
}

impl fmt::Display for LinkError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnknownRelocation {
                section,
                offset,
                kind,
            } => {
                write!(f, "{section}+{offset:#x}: unknown relocation type {kind}")
            }
            Self::UnsupportedRelocation {
                section,
                offset,
                name,
            } => {
                write!(f, "{section}+{offset:#x}: unsupported relocation {name}")
            }
            Self::UnknownSection { section } => {
                write!(f, "relocation pass given unknown section handle {section}")
            }
            Self::BadSymbolIndex {
                section,
                offset,
                index,
            } => {
                write!(f, "{section}+{offset:#x}: symbol index {index} out of range")
            }
            Self::UndefinedSymbol {
                section,
                offset,
                symbol,
            } => {
                write!(f, "{section}+{offset:#x}: undefined symbol '{symbol}'")
            }
            Self::OffsetOutOfBounds {
                section,
                offset,
                len,
            } => {
                write!(
                    f,
                    "{section}+{offset:#x}: relocation offset beyond section contents (len {len})"
                )
            }
            Self::StubTargetUndefined { symbol } => {
                write!(f, "stub target '{symbol}' has no definition")
            }
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for LinkError {}
