use std::fs::File;
use std::ops::Deref;
use std::path::Path;

use memmap2::Mmap as Mapping;
use memmap2::MmapOptions;

use crate::Error;
use crate::ErrorExt as _;
use crate::Result;


/// A read-only memory mapping of an entire file.
///
/// Empty files are represented without an actual mapping, because the
/// kernel refuses to create zero sized ones.
#[derive(Debug)]
pub(crate) struct Mmap {
    mapping: Option<Mapping>,
}

impl Mmap {
    /// Memory map the file at `path`.
    pub(crate) fn open<P>(path: P) -> Result<Self>
    where
        P: AsRef<Path>,
    {
        let file = File::open(path)?;
        Self::map(&file)
    }

    /// Map the provided file into memory, in its entirety.
    pub(crate) fn map(file: &File) -> Result<Self> {
        let len = libc::size_t::try_from(file.metadata()?.len())
            .map_err(Error::with_invalid_data)
            .context("file is too large to mmap")?;

        let mapping = if len == 0 {
            None
        } else {
            // SAFETY: The mapping is read-only. Modification of the
            //         file by others is outside of our control.
            Some(unsafe { MmapOptions::new().len(len).map(file) }?)
        };
        Ok(Self { mapping })
    }
}

impl Deref for Mmap {
    type Target = [u8];

    fn deref(&self) -> &Self::Target {
        self.mapping.as_deref().unwrap_or(&[])
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    use std::io::Write as _;

    use tempfile::NamedTempFile;
    use test_log::test;


    /// Check that we can map an empty file.
    #[test]
    fn map_empty_file() {
        let file = NamedTempFile::new().unwrap();
        let mmap = Mmap::map(file.as_file()).unwrap();
        assert_eq!(mmap.deref(), &[]);
    }

    /// Check that mapped contents match the file's.
    #[test]
    fn map_file() {
        let mut file = NamedTempFile::new().unwrap();
        let () = file.write_all(b"\x7fELF and then some").unwrap();
        let () = file.as_file().sync_all().unwrap();

        let mmap = Mmap::open(file.path()).unwrap();
        assert_eq!(mmap.deref(), b"\x7fELF and then some");
    }

    /// Check that missing files are reported as such.
    #[test]
    fn map_missing_file() {
        let err = Mmap::open("/does-not-exist/probenv").unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::NotFound);
    }
}
