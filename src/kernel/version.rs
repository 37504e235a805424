use std::cell::OnceCell;
use std::fs;
use std::slice;

use regex::Regex;

use crate::elf::ElfParser;
use crate::log::debug;
use crate::log::warn;
use crate::maps;
use crate::maps::PathName;
use crate::util::uname_release;
use crate::Pid;
use crate::Result;


/// The name of the "component" representing the vDSO inside
/// `/proc/<pid>/maps`.
const VDSO_MAPS_COMPONENT: &str = "[vdso]";
/// The location of the installed kernel UAPI version header.
const VERSION_HEADER: &str = "/usr/include/linux/version.h";


/// Combine a kernel version triple into a single version code, the
/// way the `KERNEL_VERSION` macro does.
///
/// The patch level saturates at 255.
pub const fn kernel_version_code(major: u32, minor: u32, patch: u32) -> u32 {
    let patch = if patch > 255 { 255 } else { patch };
    (major << 16) + (minor << 8) + patch
}

/// The version code of the kernel headers present at build time, or 0
/// if there were none.
fn build_version_code() -> u32 {
    option_env!("PROBENV_BUILD_LINUX_VERSION_CODE")
        .and_then(|code| code.parse().ok())
        .unwrap_or(0)
}


/// The source of information about the running kernel.
pub trait KernelInfo {
    /// The kernel release, as reported by `uname -r`.
    fn release(&self) -> Option<String>;

    /// The vDSO image mapped into our process.
    fn vdso_image(&self) -> Option<&[u8]>;

    /// The contents of the installed `linux/version.h` header.
    fn version_header(&self) -> Option<String>;
}


/// The [`KernelInfo`] provided by the running system.
#[derive(Clone, Debug, Default)]
pub struct SystemKernelInfo {
    _private: (),
}

impl SystemKernelInfo {
    fn find_vdso() -> Result<Option<&'static [u8]>> {
        // `getauxval(AT_SYSINFO_EHDR)` would provide the start address
        // but not the size of the image, so go through the maps file.
        for result in maps::parse(Pid::Slf)? {
            let entry = result?;
            if matches!(&entry.path_name, Some(PathName::Component(c)) if c == VDSO_MAPS_COMPONENT)
            {
                let data = entry.range.start as *const u8;
                let len = entry.range.end.saturating_sub(entry.range.start);
                // SAFETY: The range describes the vDSO mapping of our
                //         own process, which is statically allocated by
                //         the kernel and will never vanish.
                let mem = unsafe { slice::from_raw_parts(data, len as usize) };
                return Ok(Some(mem))
            }
        }
        Ok(None)
    }
}

impl KernelInfo for SystemKernelInfo {
    fn release(&self) -> Option<String> {
        match uname_release() {
            Ok(release) => Some(release),
            Err(err) => {
                warn!("{err:#}");
                None
            }
        }
    }

    fn vdso_image(&self) -> Option<&[u8]> {
        match Self::find_vdso() {
            Ok(vdso) => vdso,
            Err(err) => {
                warn!("failed to find vDSO: {err:#}");
                None
            }
        }
    }

    fn version_header(&self) -> Option<String> {
        fs::read_to_string(VERSION_HEADER).ok()
    }
}


/// The strategy used for determining the kernel version.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum KernelVersionMethod {
    /// Read the version note embedded in the vDSO, falling back to the
    /// version of the headers present at build time.
    Vdso,
    /// Parse the release reported by `uname`.
    Uts,
    /// Read `LINUX_VERSION_CODE` from the installed kernel headers.
    File,
    /// Do not determine a version. Always 0.
    None,
}


/// Extract the version code from the `Linux` note of a vDSO image.
fn version_from_vdso(vdso: &[u8]) -> Option<u32> {
    let parser = ElfParser::new(vdso);
    match parser.find_note(b"Linux", 0) {
        Ok(Some(desc)) => {
            let desc = <[u8; 4]>::try_from(desc).ok()?;
            Some(u32::from_ne_bytes(desc)).filter(|code| *code != 0)
        }
        Ok(None) => None,
        Err(err) => {
            debug!("failed to read vDSO notes: {err:#}");
            None
        }
    }
}

/// Parse a `<major>.<minor>.<patch>` prefix of a kernel release.
fn version_from_release(release: &str) -> Option<u32> {
    fn leading_number(s: &str) -> Option<u32> {
        let end = s
            .find(|c: char| !c.is_ascii_digit())
            .unwrap_or(s.len());
        s[..end].parse().ok()
    }

    let mut parts = release.splitn(3, '.');
    let major = parts.next()?.parse().ok()?;
    let minor = parts.next()?.parse().ok()?;
    let patch = leading_number(parts.next()?)?;
    Some(kernel_version_code(major, minor, patch))
}

/// Extract `LINUX_VERSION_CODE` from the contents of a version header.
fn version_from_header(header: &str) -> Option<u32> {
    let regex = Regex::new(r"#define\s+LINUX_VERSION_CODE\s+(\d+)").ok()?;
    let captures = regex.captures(header)?;
    captures.get(1)?.as_str().parse().ok()
}


/// A memoizing retriever of the running kernel's version code.
///
/// Each [`KernelVersionMethod`] is evaluated at most once. A strategy
/// that fails reports 0.
#[derive(Debug, Default)]
pub struct KernelVersion<I = SystemKernelInfo> {
    info: I,
    vdso: OnceCell<u32>,
    uts: OnceCell<u32>,
    file: OnceCell<u32>,
}

impl KernelVersion<SystemKernelInfo> {
    /// Create a [`KernelVersion`] querying the running system.
    pub fn new() -> Self {
        Self::with_info(SystemKernelInfo::default())
    }
}

impl<I> KernelVersion<I>
where
    I: KernelInfo,
{
    /// Create a [`KernelVersion`] using the provided source of
    /// information.
    pub fn with_info(info: I) -> Self {
        Self {
            info,
            vdso: OnceCell::new(),
            uts: OnceCell::new(),
            file: OnceCell::new(),
        }
    }

    fn vdso_version(&self) -> u32 {
        self.info
            .vdso_image()
            .and_then(version_from_vdso)
            .unwrap_or_else(build_version_code)
    }

    fn uts_version(&self) -> u32 {
        self.info
            .release()
            .as_deref()
            .and_then(version_from_release)
            .unwrap_or(0)
    }

    fn header_version(&self) -> u32 {
        self.info
            .version_header()
            .as_deref()
            .and_then(version_from_header)
            .unwrap_or(0)
    }

    /// Retrieve the kernel version code using the given strategy.
    pub fn kernel_version(&self, method: KernelVersionMethod) -> u32 {
        let code = match method {
            KernelVersionMethod::Vdso => *self.vdso.get_or_init(|| self.vdso_version()),
            KernelVersionMethod::Uts => *self.uts.get_or_init(|| self.uts_version()),
            KernelVersionMethod::File => *self.file.get_or_init(|| self.header_version()),
            KernelVersionMethod::None => 0,
        };
        debug!("kernel version via {method:?}: {code:#x}");
        code
    }
}
