use std::cell::OnceCell;
use std::fmt::Debug;
use std::fmt::Formatter;
use std::fmt::Result as FmtResult;

use crate::util::align_up_u32;
use crate::util::slice_at;
use crate::util::OnceCellExt as _;
use crate::util::ReadRaw as _;
use crate::Error;
use crate::ErrorExt as _;
use crate::IntoError as _;
use crate::Result;

use super::types::Elf64_Ehdr;
use super::types::Elf64_Nhdr;
use super::types::Elf64_Shdr;
use super::types::Elf64_Sym;
use super::types::EI_CLASS;
use super::types::EI_DATA;
use super::types::ELFCLASS64;
use super::types::ELFDATA_NATIVE;
use super::types::ELFMAG;
use super::types::SHN_XINDEX;
use super::types::SHT_DYNSYM;
use super::types::SHT_NOTE;
use super::types::SHT_SYMTAB;


fn symbol_name<'data>(strtab: &'data [u8], sym: &Elf64_Sym) -> Result<&'data str> {
    let name = strtab
        .get(sym.st_name as usize..)
        .ok_or_invalid_input(|| "string table index out of bounds")?
        .read_cstr()
        .ok_or_invalid_input(|| "no valid string found in string table")?
        .to_str()
        .map_err(Error::with_invalid_data)
        .context("invalid symbol name")?;

    Ok(name)
}


#[derive(Debug)]
struct EhdrExt {
    /// The ELF header.
    ehdr: Elf64_Ehdr,
    /// Override of `ehdr.e_shnum`, handling of which is special-cased
    /// by the ELF standard.
    shnum: usize,
}


/// A parser for native endian ELF64 data.
///
/// The data may stem from a memory mapped file or from memory, as is
/// the case for the vDSO. Every access is bounds checked against the
/// provided buffer.
pub(crate) struct ElfParser<'data> {
    data: &'data [u8],
    ehdr: OnceCell<EhdrExt>,
    shdrs: OnceCell<Vec<Elf64_Shdr>>,
}

impl<'data> ElfParser<'data> {
    pub fn new(data: &'data [u8]) -> Self {
        Self {
            data,
            ehdr: OnceCell::new(),
            shdrs: OnceCell::new(),
        }
    }

    /// Read the very first section header.
    ///
    /// ELF contains a couple of clauses that special case data ranges
    /// of certain member variables to reference data from this header,
    /// which otherwise is zeroed out.
    fn read_first_shdr(&self, ehdr: &Elf64_Ehdr) -> Result<Elf64_Shdr> {
        let mut data = slice_at(self.data, ehdr.e_shoff, Elf64_Shdr::SIZE as u64)
            .ok_or_invalid_data(|| "Elf64_Ehdr::e_shoff is invalid")?;
        Elf64_Shdr::read(&mut data).ok_or_invalid_data(|| "failed to read Elf64_Shdr")
    }

    fn parse_ehdr(&self) -> Result<EhdrExt> {
        let mut data = self.data;
        let ehdr = Elf64_Ehdr::read(&mut data).ok_or_invalid_data(|| "failed to read Elf64_Ehdr")?;
        if ehdr.e_ident[0..4] != ELFMAG {
            return Err(Error::with_invalid_data(format!(
                "encountered unexpected e_ident: {:x?}",
                &ehdr.e_ident[0..4]
            )))
        }

        if ehdr.e_ident[EI_CLASS] != ELFCLASS64 {
            return Err(Error::with_unsupported(format!(
                "unsupported ELF class: {}",
                ehdr.e_ident[EI_CLASS]
            )))
        }

        if ehdr.e_ident[EI_DATA] != ELFDATA_NATIVE {
            return Err(Error::with_unsupported(format!(
                "unsupported ELF data encoding: {}",
                ehdr.e_ident[EI_DATA]
            )))
        }

        if ehdr.e_shentsize != 0 && usize::from(ehdr.e_shentsize) != Elf64_Shdr::SIZE {
            return Err(Error::with_invalid_data(format!(
                "unexpected section header entry size: {}",
                ehdr.e_shentsize
            )))
        }

        // "If the number of entries in the section header table is larger than
        // or equal to SHN_LORESERVE, e_shnum holds the value zero and the real
        // number of entries in the section header table is held in the sh_size
        // member of the initial entry in section header table."
        let shnum = if ehdr.e_shnum == 0 && ehdr.e_shoff != 0 {
            let shdr = self.read_first_shdr(&ehdr)?;
            usize::try_from(shdr.sh_size).ok().ok_or_invalid_data(|| {
                format!(
                    "ELF file contains unsupported number of sections ({})",
                    shdr.sh_size
                )
            })?
        } else {
            ehdr.e_shnum.into()
        };

        Ok(EhdrExt { ehdr, shnum })
    }

    fn ensure_ehdr(&self) -> Result<&EhdrExt> {
        self.ehdr.get_or_try_init_(|| self.parse_ehdr())
    }

    fn parse_shdrs(&self) -> Result<Vec<Elf64_Shdr>> {
        let ehdr = self.ensure_ehdr()?;
        let size = (ehdr.shnum as u64)
            .checked_mul(Elf64_Shdr::SIZE as u64)
            .ok_or_invalid_data(|| "section header table size overflows")?;
        let mut data = slice_at(self.data, ehdr.ehdr.e_shoff, size)
            .ok_or_invalid_data(|| "Elf64_Ehdr::e_shoff is invalid")?;

        (0..ehdr.shnum)
            .map(|_| Elf64_Shdr::read(&mut data).ok_or_invalid_data(|| "failed to read Elf64_Shdr"))
            .collect()
    }

    /// Retrieve all section headers.
    pub fn section_headers(&self) -> Result<&[Elf64_Shdr]> {
        self.shdrs
            .get_or_try_init_(|| self.parse_shdrs())
            .map(Vec::as_slice)
    }

    /// Retrieve the index of the section name string table.
    pub fn shstrndx(&self) -> Result<usize> {
        let ehdr = self.ensure_ehdr()?;
        // "If the index of section name string table section is larger
        // than or equal to SHN_LORESERVE (0xff00), this member holds
        // SHN_XINDEX (0xffff) and  the real index of the section name
        // string table section is held in the sh_link member of the
        // initial entry in section header table."
        let shstrndx = if ehdr.ehdr.e_shstrndx == SHN_XINDEX {
            let shdr = self.read_first_shdr(&ehdr.ehdr)?;
            shdr.sh_link
        } else {
            u32::from(ehdr.ehdr.e_shstrndx)
        };

        usize::try_from(shstrndx).ok().ok_or_invalid_data(|| {
            format!("ELF file contains unsupported section name string table index ({shstrndx})")
        })
    }

    /// Retrieve the raw section data for the ELF section at index
    /// `idx`.
    pub fn section_data(&self, idx: usize) -> Result<&'data [u8]> {
        let shdrs = self.section_headers()?;
        let section = shdrs
            .get(idx)
            .ok_or_invalid_input(|| format!("ELF section index ({idx}) out of bounds"))?;

        slice_at(self.data, section.sh_offset, section.sh_size)
            .ok_or_invalid_data(|| format!("section {idx} data is out of bounds"))
    }

    /// Get the name of the section at a given index.
    pub fn section_name(&self, idx: usize) -> Result<&'data str> {
        let shdrs = self.section_headers()?;
        let shstrtab = self.section_data(self.shstrndx()?)?;
        let section = shdrs
            .get(idx)
            .ok_or_invalid_input(|| "ELF section index out of bounds")?;

        shstrtab
            .get(section.sh_name as usize..)
            .ok_or_invalid_input(|| "string table index out of bounds")?
            .read_cstr()
            .ok_or_invalid_input(|| "no valid string found in string table")?
            .to_str()
            .map_err(Error::with_invalid_data)
            .context("invalid section name")
    }

    /// Invoke `f` for every symbol in the symbol table (`.symtab`) and
    /// the dynamic symbol table (`.dynsym`), in that order.
    pub fn for_each_sym<F>(&self, mut f: F) -> Result<()>
    where
        F: FnMut(&'data str, &Elf64_Sym),
    {
        let shdrs = self.section_headers()?;
        for kind in [SHT_SYMTAB, SHT_DYNSYM] {
            for (idx, shdr) in shdrs.iter().enumerate() {
                if shdr.sh_type != kind {
                    continue
                }

                let mut syms = self.section_data(idx)?;
                if syms.len() % Elf64_Sym::SIZE != 0 {
                    return Err(Error::with_invalid_data(
                        "size of symbol table section is invalid",
                    ))
                }
                let strtab = self
                    .section_data(shdr.sh_link as usize)
                    .context("failed to retrieve symbol string table")?;

                while !syms.is_empty() {
                    let sym = Elf64_Sym::read(&mut syms)
                        .ok_or_invalid_data(|| "failed to read symbol table contents")?;
                    let name = symbol_name(strtab, &sym)?;
                    let () = f(name, &sym);
                }
            }
        }
        Ok(())
    }

    /// Find the descriptor of the first note with the given name and
    /// type in any of the `SHT_NOTE` sections.
    pub fn find_note(&self, name: &[u8], type_: u32) -> Result<Option<&'data [u8]>> {
        let shdrs = self.section_headers()?;
        for (idx, shdr) in shdrs.iter().enumerate() {
            if shdr.sh_type != SHT_NOTE {
                continue
            }

            let mut notes = self.section_data(idx)?;
            while !notes.is_empty() {
                let nhdr = Elf64_Nhdr::read(&mut notes)
                    .ok_or_invalid_data(|| "failed to read note header")?;
                let name_len = align_up_u32(nhdr.n_namesz, 4)
                    .ok_or_invalid_data(|| "note name size overflows")?;
                let desc_len = align_up_u32(nhdr.n_descsz, 4)
                    .ok_or_invalid_data(|| "note descriptor size overflows")?;

                let note_name = notes
                    .read_slice(name_len as usize)
                    .ok_or_invalid_data(|| "note name is out of bounds")?;
                let desc = notes
                    .read_slice(desc_len as usize)
                    .ok_or_invalid_data(|| "note descriptor is out of bounds")?;

                // The name is NUL terminated and stored in `n_namesz`
                // bytes, including the terminator.
                let note_name = &note_name[..nhdr.n_namesz as usize];
                let note_name = note_name.strip_suffix(b"\0").unwrap_or(note_name);
                if note_name == name && nhdr.n_type == type_ {
                    return Ok(Some(&desc[..nhdr.n_descsz as usize]))
                }
            }
        }
        Ok(None)
    }
}

impl Debug for ElfParser<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.debug_struct("ElfParser")
            .field("len", &self.data.len())
            .finish()
    }
}
