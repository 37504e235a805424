use std::collections::btree_map::Entry;
use std::collections::BTreeMap;
use std::fs::File;
use std::io::Read as _;
use std::ops::Deref as _;
use std::os::unix::fs::PermissionsExt as _;
use std::path::Path;

use crate::log::debug;
use crate::log::warn;
use crate::mmap::Mmap;
use crate::Addr;
use crate::ErrorExt as _;
use crate::Result;

use super::parser::ElfParser;
use super::types::EI_CLASS;
use super::types::EI_DATA;
use super::types::EI_NIDENT;
use super::types::ELFCLASS32;
use super::types::ELFCLASS64;
use super::types::ELFDATA2LSB;
use super::types::ELFDATA2MSB;
use super::types::Elf64_Sym;
use super::types::ELFMAG;
use super::types::ET_CORE;
use super::types::ET_DYN;
use super::types::ET_EXEC;
use super::types::ET_NONE;
use super::types::ET_REL;
use super::types::SHN_UNDEF;
use super::types::STT_NOTYPE;


/// The owner-execute permission bit.
const S_IXUSR: u32 = 0o100;


/// The type of an ELF object, as reported by its header.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ElfType {
    /// No file type.
    None,
    /// A relocatable object.
    Rel,
    /// An executable.
    Exec,
    /// A shared object (which includes position independent
    /// executables).
    Dyn,
    /// A core dump.
    Core,
    /// An OS or processor specific type.
    Other(u16),
}

impl From<u16> for ElfType {
    fn from(other: u16) -> Self {
        match other {
            ET_NONE => Self::None,
            ET_REL => Self::Rel,
            ET_EXEC => Self::Exec,
            ET_DYN => Self::Dyn,
            ET_CORE => Self::Core,
            other => Self::Other(other),
        }
    }
}


/// Decode the ELF type from the header bytes at the start of a file.
fn elf_type(header: &[u8]) -> Option<ElfType> {
    let ident = header.get(..EI_NIDENT)?;
    if ident[..4] != ELFMAG {
        return None
    }

    // `e_type` is located right after `e_ident` for both classes, but
    // we insist on a complete header.
    let header_size = match ident[EI_CLASS] {
        ELFCLASS32 => 52,
        ELFCLASS64 => 64,
        _ => return None,
    };
    if header.len() < header_size {
        return None
    }

    let bytes = [header[EI_NIDENT], header[EI_NIDENT + 1]];
    let e_type = match ident[EI_DATA] {
        ELFDATA2LSB => u16::from_le_bytes(bytes),
        ELFDATA2MSB => u16::from_be_bytes(bytes),
        _ => return None,
    };
    Some(ElfType::from(e_type))
}

/// Check whether `path` refers to an ELF file and report its type.
///
/// Any failure (the file can't be opened, is not an ELF file, or has a
/// malformed header) results in `None`.
pub fn inspect(path: &Path) -> Option<ElfType> {
    let mut file = File::open(path).ok()?;
    let mut header = [0u8; 64];
    let mut len = 0;
    while len < header.len() {
        match file.read(&mut header[len..]) {
            Ok(0) => break,
            Ok(n) => len += n,
            Err(_err) => return None,
        }
    }
    elf_type(&header[..len])
}

fn has_exec_permission(path: &Path) -> bool {
    path.metadata()
        .map(|meta| meta.permissions().mode() & S_IXUSR != 0)
        .unwrap_or(false)
}

/// Check whether `path` refers to an ELF executable (`ET_EXEC`) that
/// its owner is permitted to execute.
pub fn is_executable(path: &Path) -> bool {
    inspect(path) == Some(ElfType::Exec) && has_exec_permission(path)
}

/// Check whether `path` is a binary we can probe: either an
/// executable as per [`is_executable`] or a shared object.
///
/// Shared objects don't need to be executable themselves.
pub fn is_usable_binary(path: &Path) -> bool {
    match inspect(path) {
        Some(ElfType::Exec) => has_exec_permission(path),
        Some(ElfType::Dyn) => true,
        _ => false,
    }
}


/// A symbol as stored in an ELF symbol table.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ElfSymbol {
    /// The symbol's name.
    pub name: String,
    /// The symbol's start address.
    pub start: Addr,
    /// The symbol's end address (exclusive). Equal to `start` for
    /// symbols without size.
    pub end: Addr,
}

impl ElfSymbol {
    /// Check whether `addr` lies within the symbol. A symbol without
    /// size covers just its start address.
    pub fn contains(&self, addr: Addr) -> bool {
        addr == self.start || (self.start..self.end).contains(&addr)
    }
}


/// An address ordered table of ELF symbols.
///
/// At most one symbol is kept per start address: the first one
/// encountered.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SymbolTable {
    syms: BTreeMap<Addr, ElfSymbol>,
}

impl SymbolTable {
    fn insert(&mut self, sym: ElfSymbol) {
        if let Entry::Vacant(entry) = self.syms.entry(sym.start) {
            let _sym = entry.insert(sym);
        }
    }

    /// Iterate over all symbols, in descending address order.
    pub fn iter(&self) -> impl Iterator<Item = &ElfSymbol> + '_ {
        self.syms.values().rev()
    }

    /// Retrieve the symbol starting at `addr`.
    pub fn get(&self, addr: Addr) -> Option<&ElfSymbol> {
        self.syms.get(&addr)
    }

    /// Find the symbol covering `addr`, i.e., the symbol with the
    /// closest start address at or below `addr`, provided that its
    /// extent includes `addr`.
    pub fn find_addr(&self, addr: Addr) -> Option<&ElfSymbol> {
        let (_start, sym) = self.syms.range(..=addr).next_back()?;
        sym.contains(addr).then_some(sym)
    }

    /// Find a symbol by name.
    ///
    /// Symbols hidden behind an alias at the same address are not
    /// found; use [`defines_symbol`] to check for those.
    pub fn find_name(&self, name: &str) -> Option<&ElfSymbol> {
        self.syms.values().find(|sym| sym.name == name)
    }

    /// The number of symbols in the table.
    pub fn len(&self) -> usize {
        self.syms.len()
    }

    /// Check whether the table is empty.
    pub fn is_empty(&self) -> bool {
        self.syms.is_empty()
    }
}


fn is_typed_and_defined(sym: &Elf64_Sym) -> bool {
    sym.type_() != STT_NOTYPE && sym.st_shndx != SHN_UNDEF
}

fn symbol_table_from_parser(parser: &ElfParser<'_>) -> Result<SymbolTable> {
    let mut table = SymbolTable::default();
    let () = parser.for_each_sym(|name, sym| {
        if !is_typed_and_defined(sym) {
            return
        }

        let start = sym.st_value;
        let sym = ElfSymbol {
            name: name.to_string(),
            start,
            end: start.saturating_add(sym.st_size),
        };
        let () = table.insert(sym);
    })?;
    Ok(table)
}

fn try_symbol_table(path: &Path) -> Result<SymbolTable> {
    let mmap = Mmap::open(path)
        .with_context(|| format!("failed to memory map `{}`", path.display()))?;
    let parser = ElfParser::new(mmap.deref());
    symbol_table_from_parser(&parser)
        .with_context(|| format!("failed to read symbols of `{}`", path.display()))
}

fn try_defines_symbol(path: &Path, name: &str) -> Result<bool> {
    let mmap = Mmap::open(path)
        .with_context(|| format!("failed to memory map `{}`", path.display()))?;
    let parser = ElfParser::new(mmap.deref());
    let mut found = false;
    let () = parser
        .for_each_sym(|sym_name, sym| {
            found |= sym_name == name && sym.st_value != 0 && is_typed_and_defined(sym);
        })
        .with_context(|| format!("failed to read symbols of `{}`", path.display()))?;
    Ok(found)
}

/// Check whether the ELF file at `path` defines a typed symbol called
/// `name` at a non-zero address.
///
/// Unlike [`SymbolTable::find_name`], every symbol is considered, even
/// if it shares its address with another one.
pub fn defines_symbol(path: &Path, name: &str) -> bool {
    match try_defines_symbol(path, name) {
        Ok(found) => found,
        Err(err) => {
            warn!("{err:#}");
            false
        }
    }
}

/// Build the symbol table of the ELF file at `path`.
///
/// All typed, defined symbols of both the symbol table and the dynamic
/// symbol table are included. Failure to read symbols results in an
/// empty table.
pub fn symbol_table(path: &Path) -> SymbolTable {
    match try_symbol_table(path) {
        Ok(table) => {
            debug!("read {} symbols from {}", table.len(), path.display());
            table
        }
        Err(err) => {
            warn!("{err:#}");
            SymbolTable::default()
        }
    }
}
