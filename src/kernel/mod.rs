//! Discovery of kernel artifacts: images, headers, configuration, and
//! the set of traceable functions.

mod cflags;
mod dirs;
mod funcs;
mod kconfig;
mod modules;
mod version;
mod vmlinux;

pub use cflags::kernel_cflags;
pub use dirs::kernel_dirs;
pub use dirs::KernelDirs;
pub use funcs::is_bad_func;
pub use funcs::is_recursive_func;
pub use funcs::FuncsModulesMap;
pub use funcs::TraceableFuncs;
pub use kconfig::KConfig;
pub use modules::is_module_loaded;
pub use version::kernel_version_code;
pub use version::KernelInfo;
pub use version::KernelVersion;
pub use version::KernelVersionMethod;
pub use version::SystemKernelInfo;
pub use vmlinux::find_vmlinux;
pub use vmlinux::VmlinuxLocation;
pub use vmlinux::VMLINUX_LOCATIONS;

use crate::util::uname_machine;
use crate::util::uname_release;
use crate::Result;


/// Retrieve the release of the running kernel, as reported by
/// `uname -r`.
pub fn kernel_release() -> Result<String> {
    uname_release()
}

/// Retrieve the machine hardware name of the running kernel, as
/// reported by `uname -m`.
pub fn kernel_machine() -> Result<String> {
    uname_machine()
}
