use std::cell::OnceCell;
use std::ffi::CStr;
use std::io::Error;
use std::mem::size_of;
use std::mem::MaybeUninit;

use crate::Error as CrateError;
use crate::ErrorExt as _;
use crate::Result as CrateResult;


/// An extension trait for [`OnceCell`], providing fallible
/// initialization.
pub(crate) trait OnceCellExt<T> {
    /// Retrieve the contained value, initializing it using `f` if the
    /// cell is still empty.
    fn get_or_try_init_<F, E>(&self, f: F) -> Result<&T, E>
    where
        F: FnOnce() -> Result<T, E>;
}

impl<T> OnceCellExt<T> for OnceCell<T> {
    fn get_or_try_init_<F, E>(&self, f: F) -> Result<&T, E>
    where
        F: FnOnce() -> Result<T, E>,
    {
        if let Some(value) = self.get() {
            return Ok(value)
        }

        let value = f()?;
        // Initialization can't have happened reentrantly, because
        // `OnceCell` is `!Sync` and `f` does not have access to `self`.
        Ok(self.get_or_init(|| value))
    }
}


fn uname() -> Result<libc::utsname, Error> {
    let mut dst = MaybeUninit::uninit();
    let rc = unsafe { libc::uname(dst.as_mut_ptr()) };
    if rc < 0 {
        return Err(Error::last_os_error())
    }

    // SAFETY: The object is initialized on success of `uname`.
    Ok(unsafe { dst.assume_init() })
}

fn uts_field(field: &[libc::c_char]) -> CrateResult<String> {
    // SAFETY: `uname` ensures NUL terminated strings in all `utsname`
    //         members on success.
    let s = unsafe { CStr::from_ptr(field.as_ptr()) };
    let s = s
        .to_str()
        .map_err(CrateError::with_invalid_data)
        .context("uname string is not valid Unicode")?;
    Ok(s.to_string())
}

/// Retrieve the kernel release string (`uname -r`).
pub(crate) fn uname_release() -> CrateResult<String> {
    let uts = uname().context("failed to query uname information")?;
    uts_field(&uts.release)
}

/// Retrieve the machine hardware name (`uname -m`).
pub(crate) fn uname_machine() -> CrateResult<String> {
    let uts = uname().context("failed to query uname information")?;
    uts_field(&uts.machine)
}


/// A marker trait for "plain old data" data types.
///
/// # Safety
/// Only safe to implement for types that are valid for any bit pattern.
pub(crate) unsafe trait Pod {}

unsafe impl Pod for u8 {}
unsafe impl Pod for u16 {}
unsafe impl Pod for u32 {}
unsafe impl Pod for u64 {}

/// An trait providing utility functions for reading data from a byte buffer.
///
/// All reads are bounds checked and report `None` if insufficient data
/// is available. Multi-byte values are read in native byte order.
pub(crate) trait ReadRaw<'data> {
    /// Ensure that `len` bytes are available for consumption.
    fn ensure(&self, len: usize) -> Option<()>;

    /// Consume and return `len` bytes.
    fn read_slice(&mut self, len: usize) -> Option<&'data [u8]>;

    /// Read a NUL terminated string.
    fn read_cstr(&mut self) -> Option<&'data CStr>;

    /// Advance the read pointer by `cnt` bytes.
    #[inline]
    fn advance(&mut self, cnt: usize) -> Option<()> {
        let _data = self.read_slice(cnt)?;
        Some(())
    }

    /// Read anything implementing `Pod`.
    #[inline]
    fn read_pod<T>(&mut self) -> Option<T>
    where
        T: Pod,
    {
        let data = self.read_slice(size_of::<T>())?;
        // SAFETY: `T` is `Pod` and hence valid for any bit pattern. The pointer
        //         is guaranteed to be valid and to point to memory of at least
        //         `sizeof(T)` bytes.
        let value = unsafe { data.as_ptr().cast::<T>().read_unaligned() };
        Some(value)
    }

    /// Read a `u8` value.
    #[inline]
    fn read_u8(&mut self) -> Option<u8> {
        self.read_pod::<u8>()
    }

    /// Read a `u16` value.
    #[inline]
    fn read_u16(&mut self) -> Option<u16> {
        self.read_pod::<u16>()
    }

    /// Read a `u32` value.
    #[inline]
    fn read_u32(&mut self) -> Option<u32> {
        self.read_pod::<u32>()
    }

    /// Read a `u64` value.
    #[inline]
    fn read_u64(&mut self) -> Option<u64> {
        self.read_pod::<u64>()
    }
}

impl<'data> ReadRaw<'data> for &'data [u8] {
    #[inline]
    fn ensure(&self, len: usize) -> Option<()> {
        if len > self.len() {
            return None
        }
        Some(())
    }

    #[inline]
    fn read_slice(&mut self, len: usize) -> Option<&'data [u8]> {
        self.ensure(len)?;
        let (a, b) = self.split_at(len);
        *self = b;
        Some(a)
    }

    #[inline]
    fn read_cstr(&mut self) -> Option<&'data CStr> {
        let idx = self.iter().position(|byte| *byte == b'\0')?;
        CStr::from_bytes_with_nul(self.read_slice(idx + 1)?).ok()
    }
}


/// Retrieve the sub-slice `[offset, offset + len)` of `data`, checking
/// for overflow and bounds.
#[inline]
pub(crate) fn slice_at(data: &[u8], offset: u64, len: u64) -> Option<&[u8]> {
    let start = usize::try_from(offset).ok()?;
    let len = usize::try_from(len).ok()?;
    let end = start.checked_add(len)?;
    data.get(start..end)
}

/// Round `value` up to the next multiple of `align`, which has to be a
/// power of two.
#[inline]
pub(crate) fn align_up_u32(value: u32, align: u32) -> Option<u32> {
    debug_assert!(align.is_power_of_two());
    Some(value.checked_add(align - 1)? & !(align - 1))
}
