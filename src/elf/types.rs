#![allow(non_camel_case_types)]

use crate::util::ReadRaw as _;

pub(crate) const EI_NIDENT: usize = 16;
pub(crate) const ELFMAG: [u8; 4] = [0x7f, b'E', b'L', b'F'];

pub(crate) const EI_CLASS: usize = 4;
pub(crate) const EI_DATA: usize = 5;

pub(crate) const ELFCLASS32: u8 = 1;
pub(crate) const ELFCLASS64: u8 = 2;

pub(crate) const ELFDATA2LSB: u8 = 1;
pub(crate) const ELFDATA2MSB: u8 = 2;

#[cfg(target_endian = "little")]
pub(crate) const ELFDATA_NATIVE: u8 = ELFDATA2LSB;
#[cfg(target_endian = "big")]
pub(crate) const ELFDATA_NATIVE: u8 = ELFDATA2MSB;

pub(crate) const ET_NONE: u16 = 0;
pub(crate) const ET_REL: u16 = 1;
pub(crate) const ET_EXEC: u16 = 2;
pub(crate) const ET_DYN: u16 = 3;
pub(crate) const ET_CORE: u16 = 4;

type Elf64_Addr = u64;
type Elf64_Half = u16;
type Elf64_Off = u64;
type Elf64_Word = u32;
type Elf64_Xword = u64;


/// The ELF64 file header.
///
/// Fields are decoded one by one from the raw bytes in native byte
/// order.
#[derive(Clone, Debug)]
pub(crate) struct Elf64_Ehdr {
    pub e_ident: [u8; EI_NIDENT], /* ELF "magic number" */
    pub e_type: Elf64_Half,
    pub e_machine: Elf64_Half,
    pub e_version: Elf64_Word,
    pub e_entry: Elf64_Addr, /* Entry point virtual address */
    pub e_phoff: Elf64_Off,  /* Program header table file offset */
    pub e_shoff: Elf64_Off,  /* Section header table file offset */
    pub e_flags: Elf64_Word,
    pub e_ehsize: Elf64_Half,
    pub e_phentsize: Elf64_Half,
    pub e_phnum: Elf64_Half,
    pub e_shentsize: Elf64_Half,
    pub e_shnum: Elf64_Half,
    pub e_shstrndx: Elf64_Half,
}

impl Elf64_Ehdr {
    /// The size of the header in its on-disk representation.
    pub const SIZE: usize = 64;

    pub fn read(data: &mut &[u8]) -> Option<Self> {
        let ident = data.read_slice(EI_NIDENT)?;
        let mut e_ident = [0; EI_NIDENT];
        let () = e_ident.copy_from_slice(ident);

        Some(Self {
            e_ident,
            e_type: data.read_u16()?,
            e_machine: data.read_u16()?,
            e_version: data.read_u32()?,
            e_entry: data.read_u64()?,
            e_phoff: data.read_u64()?,
            e_shoff: data.read_u64()?,
            e_flags: data.read_u32()?,
            e_ehsize: data.read_u16()?,
            e_phentsize: data.read_u16()?,
            e_phnum: data.read_u16()?,
            e_shentsize: data.read_u16()?,
            e_shnum: data.read_u16()?,
            e_shstrndx: data.read_u16()?,
        })
    }
}


#[derive(Clone, Debug)]
pub(crate) struct Elf64_Shdr {
    pub sh_name: Elf64_Word,       /* Section name, index in string tbl */
    pub sh_type: Elf64_Word,       /* Type of section */
    pub sh_flags: Elf64_Xword,     /* Miscellaneous section attributes */
    pub sh_addr: Elf64_Addr,       /* Section virtual addr at execution */
    pub sh_offset: Elf64_Off,      /* Section file offset */
    pub sh_size: Elf64_Xword,      /* Size of section in bytes */
    pub sh_link: Elf64_Word,       /* Index of another section */
    pub sh_info: Elf64_Word,       /* Additional section information */
    pub sh_addralign: Elf64_Xword, /* Section alignment */
    pub sh_entsize: Elf64_Xword,   /* Entry size if section holds table */
}

impl Elf64_Shdr {
    pub const SIZE: usize = 64;

    pub fn read(data: &mut &[u8]) -> Option<Self> {
        Some(Self {
            sh_name: data.read_u32()?,
            sh_type: data.read_u32()?,
            sh_flags: data.read_u64()?,
            sh_addr: data.read_u64()?,
            sh_offset: data.read_u64()?,
            sh_size: data.read_u64()?,
            sh_link: data.read_u32()?,
            sh_info: data.read_u32()?,
            sh_addralign: data.read_u64()?,
            sh_entsize: data.read_u64()?,
        })
    }
}

pub(crate) const SHN_UNDEF: u16 = 0;
pub(crate) const SHN_XINDEX: u16 = 0xffff;

pub(crate) const SHT_SYMTAB: Elf64_Word = 2;
pub(crate) const SHT_NOTE: Elf64_Word = 7;
pub(crate) const SHT_DYNSYM: Elf64_Word = 11;

pub(crate) const STT_NOTYPE: u8 = 0;
#[cfg(test)]
pub(crate) const STT_OBJECT: u8 = 1;
#[cfg(test)]
pub(crate) const STT_FUNC: u8 = 2;


#[derive(Clone, Debug)]
pub(crate) struct Elf64_Sym {
    pub st_name: Elf64_Word,  /* Symbol name, index in string tbl */
    pub st_info: u8,          /* Type and binding attributes */
    pub st_other: u8,         /* No defined meaning, 0 */
    pub st_shndx: Elf64_Half, /* Associated section index */
    pub st_value: Elf64_Addr, /* Value of the symbol */
    pub st_size: Elf64_Xword, /* Associated symbol size */
}

impl Elf64_Sym {
    pub const SIZE: usize = 24;

    pub fn read(data: &mut &[u8]) -> Option<Self> {
        Some(Self {
            st_name: data.read_u32()?,
            st_info: data.read_u8()?,
            st_other: data.read_u8()?,
            st_shndx: data.read_u16()?,
            st_value: data.read_u64()?,
            st_size: data.read_u64()?,
        })
    }

    /// Extract the symbols type, typically represented by a STT_* constant.
    #[inline]
    pub fn type_(&self) -> u8 {
        self.st_info & 0xf
    }
}


#[derive(Clone, Debug)]
pub(crate) struct Elf64_Nhdr {
    pub n_namesz: Elf64_Word,
    pub n_descsz: Elf64_Word,
    pub n_type: Elf64_Word,
}

impl Elf64_Nhdr {
    pub fn read(data: &mut &[u8]) -> Option<Self> {
        Some(Self {
            n_namesz: data.read_u32()?,
            n_descsz: data.read_u32()?,
            n_type: data.read_u32()?,
        })
    }
}
