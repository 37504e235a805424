use std::fs::File;
use std::io::Write as _;
use std::os::unix::fs::PermissionsExt as _;
use std::path::Path;

use crate::elf::types::EI_NIDENT;
use crate::elf::types::ELFCLASS64;
use crate::elf::types::ELFDATA_NATIVE;
use crate::elf::types::ELFMAG;
use crate::elf::types::ET_DYN;
use crate::elf::types::SHT_NOTE;
use crate::elf::types::SHT_SYMTAB;
use crate::elf::types::STT_FUNC;


const SHT_STRTAB: u32 = 3;


fn align(data: &mut Vec<u8>, align: usize) {
    let len = data.len().next_multiple_of(align);
    let () = data.resize(len, 0);
}


/// A builder for minimal native endian ELF64 images.
///
/// Images contain the sections `.strtab`, `.symtab`, `.note`, and
/// `.shstrtab` (in that order, after the NULL section), with the
/// section header table placed last.
#[derive(Debug)]
pub(crate) struct ElfBuilder {
    type_: u16,
    /// Symbols as (name, type, section index, value, size).
    syms: Vec<(String, u8, u16, u64, u64)>,
    /// Notes as (name, type, descriptor).
    notes: Vec<(Vec<u8>, u32, Vec<u8>)>,
}

impl ElfBuilder {
    pub fn new() -> Self {
        Self {
            type_: ET_DYN,
            syms: Vec::new(),
            notes: Vec::new(),
        }
    }

    pub fn set_type(mut self, type_: u16) -> Self {
        self.type_ = type_;
        self
    }

    pub fn add_sym(mut self, name: &str, type_: u8, addr: u64, size: u64) -> Self {
        let () = self.syms.push((name.to_string(), type_, 1, addr, size));
        self
    }

    pub fn add_func(self, name: &str, addr: u64, size: u64) -> Self {
        self.add_sym(name, STT_FUNC, addr, size)
    }

    /// Add an undefined (imported) function symbol.
    pub fn add_undefined(mut self, name: &str) -> Self {
        let () = self.syms.push((name.to_string(), STT_FUNC, 0, 0, 0));
        self
    }

    pub fn add_note(mut self, name: &[u8], type_: u32, desc: &[u8]) -> Self {
        let () = self.notes.push((name.to_vec(), type_, desc.to_vec()));
        self
    }

    pub fn build(self) -> Vec<u8> {
        let mut data = vec![0u8; 64];

        let strtab_off = data.len();
        let () = data.push(0);
        let mut name_offs = Vec::new();
        for (name, ..) in &self.syms {
            let () = name_offs.push((data.len() - strtab_off) as u32);
            let () = data.extend_from_slice(name.as_bytes());
            let () = data.push(0);
        }
        let strtab_len = data.len() - strtab_off;

        let () = align(&mut data, 8);
        let symtab_off = data.len();
        let () = data.extend_from_slice(&[0; 24]);
        for ((_name, type_, shndx, value, size), name_off) in self.syms.iter().zip(name_offs) {
            let () = data.extend_from_slice(&name_off.to_ne_bytes());
            // STB_GLOBAL binding.
            let () = data.push((1 << 4) | type_);
            let () = data.push(0);
            let () = data.extend_from_slice(&shndx.to_ne_bytes());
            let () = data.extend_from_slice(&value.to_ne_bytes());
            let () = data.extend_from_slice(&size.to_ne_bytes());
        }
        let symtab_len = data.len() - symtab_off;

        let () = align(&mut data, 4);
        let note_off = data.len();
        for (name, type_, desc) in &self.notes {
            let namesz = name.len() as u32 + 1;
            let () = data.extend_from_slice(&namesz.to_ne_bytes());
            let () = data.extend_from_slice(&(desc.len() as u32).to_ne_bytes());
            let () = data.extend_from_slice(&type_.to_ne_bytes());
            let () = data.extend_from_slice(name);
            let () = data.push(0);
            let () = align(&mut data, 4);
            let () = data.extend_from_slice(desc);
            let () = align(&mut data, 4);
        }
        let note_len = data.len() - note_off;

        let shstrtab_off = data.len();
        let shstrtab = b"\0.strtab\0.symtab\0.note\0.shstrtab\0";
        let () = data.extend_from_slice(shstrtab);

        let () = align(&mut data, 8);
        let shoff = data.len();
        // (name, type, offset, size, link, entsize)
        let sections = [
            (0, 0, 0, 0, 0, 0),
            (1, SHT_STRTAB, strtab_off, strtab_len, 0, 0),
            (9, SHT_SYMTAB, symtab_off, symtab_len, 1, 24),
            (17, SHT_NOTE, note_off, note_len, 0, 0),
            (23, SHT_STRTAB, shstrtab_off, shstrtab.len(), 0, 0),
        ];
        for (name, type_, offset, size, link, entsize) in sections {
            let () = data.extend_from_slice(&(name as u32).to_ne_bytes());
            let () = data.extend_from_slice(&type_.to_ne_bytes());
            let () = data.extend_from_slice(&0u64.to_ne_bytes());
            let () = data.extend_from_slice(&0u64.to_ne_bytes());
            let () = data.extend_from_slice(&(offset as u64).to_ne_bytes());
            let () = data.extend_from_slice(&(size as u64).to_ne_bytes());
            let () = data.extend_from_slice(&(link as u32).to_ne_bytes());
            let () = data.extend_from_slice(&0u32.to_ne_bytes());
            let () = data.extend_from_slice(&1u64.to_ne_bytes());
            let () = data.extend_from_slice(&(entsize as u64).to_ne_bytes());
        }

        let mut ehdr = Vec::with_capacity(64);
        let () = ehdr.extend_from_slice(&ELFMAG);
        let () = ehdr.extend_from_slice(&[ELFCLASS64, ELFDATA_NATIVE, 1]);
        let () = ehdr.resize(EI_NIDENT, 0);
        let () = ehdr.extend_from_slice(&self.type_.to_ne_bytes());
        // EM_X86_64; the value is irrelevant to us.
        let () = ehdr.extend_from_slice(&62u16.to_ne_bytes());
        let () = ehdr.extend_from_slice(&1u32.to_ne_bytes());
        let () = ehdr.extend_from_slice(&0u64.to_ne_bytes());
        let () = ehdr.extend_from_slice(&0u64.to_ne_bytes());
        let () = ehdr.extend_from_slice(&(shoff as u64).to_ne_bytes());
        let () = ehdr.extend_from_slice(&0u32.to_ne_bytes());
        for half in [64u16, 0, 0, 64, sections.len() as u16, 4] {
            let () = ehdr.extend_from_slice(&half.to_ne_bytes());
        }
        let () = data[..64].copy_from_slice(&ehdr);
        data
    }

    /// Write the image to `path`, with the provided permission bits.
    pub fn write(self, path: &Path, mode: u32) {
        let data = self.build();
        let mut file = File::create(path).unwrap();
        let () = file.write_all(&data).unwrap();
        let mut perms = file.metadata().unwrap().permissions();
        let () = perms.set_mode(mode);
        let () = file.set_permissions(perms).unwrap();
    }
}
