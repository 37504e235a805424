use std::fs::File;
use std::io::BufRead as _;
use std::io::BufReader;
use std::io::Read;

use crate::log::warn;


/// The pseudo module representing the kernel image itself.
const VMLINUX_MODULE: &str = "vmlinux";
/// The listing of loaded kernel modules.
const PROC_MODULES: &str = "/proc/modules";


fn is_module_listed<R>(reader: R, module: &str) -> bool
where
    R: Read,
{
    BufReader::new(reader)
        .lines()
        .map_while(Result::ok)
        .any(|line| {
            line.strip_prefix(module)
                .is_some_and(|rest| rest.starts_with(' '))
        })
}

/// Check whether kernel module `module` is currently loaded.
///
/// The kernel image (`vmlinux`) is always considered loaded.
pub fn is_module_loaded(module: &str) -> bool {
    if module == VMLINUX_MODULE {
        return true
    }

    match File::open(PROC_MODULES) {
        Ok(file) => is_module_listed(file, module),
        Err(err) => {
            warn!("failed to open {PROC_MODULES}: {err}");
            false
        }
    }
}
