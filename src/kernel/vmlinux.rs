use std::borrow::Cow;
use std::fs::File;
use std::path::Path;
use std::path::PathBuf;

use crate::elf::defines_symbol;
use crate::log::debug;
use crate::log::warn;
use crate::Config;


/// A location at which a kernel image may be found.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VmlinuxLocation {
    /// The path template. The placeholder `{release}` is replaced with
    /// the kernel release.
    pub path: Cow<'static, str>,
    /// Whether the location holds raw BTF data instead of an ELF image.
    pub raw: bool,
}

impl VmlinuxLocation {
    const fn elf(path: &'static str) -> Self {
        Self {
            path: Cow::Borrowed(path),
            raw: false,
        }
    }
}

/// Well known kernel image locations, in order of preference.
pub const VMLINUX_LOCATIONS: &[VmlinuxLocation] = &[
    VmlinuxLocation {
        path: Cow::Borrowed("/sys/kernel/btf/vmlinux"),
        raw: true,
    },
    VmlinuxLocation::elf("/boot/vmlinux-{release}"),
    VmlinuxLocation::elf("/lib/modules/{release}/vmlinux-{release}"),
    VmlinuxLocation::elf("/lib/modules/{release}/build/vmlinux"),
    VmlinuxLocation::elf("/usr/lib/modules/{release}/kernel/vmlinux"),
    VmlinuxLocation::elf("/usr/lib/debug/boot/vmlinux-{release}"),
    VmlinuxLocation::elf("/usr/lib/debug/boot/vmlinux-{release}.debug"),
    VmlinuxLocation::elf("/usr/lib/debug/lib/modules/{release}/vmlinux"),
];


/// Substitute the `{release}` placeholder in `template`.
///
/// `None` is returned if the template contains any other placeholder.
fn expand_template(template: &str, release: &str) -> Option<String> {
    let mut expanded = String::with_capacity(template.len() + release.len());
    let mut rest = template;

    while let Some(idx) = rest.find('{') {
        let () = expanded.push_str(&rest[..idx]);
        let placeholder = &rest[idx..];
        let end = placeholder.find('}')?;
        match &placeholder[1..end] {
            "release" => expanded.push_str(release),
            _ => return None,
        }
        rest = &placeholder[end + 1..];
    }
    let () = expanded.push_str(rest);
    Some(expanded)
}

fn is_readable(path: &Path) -> bool {
    File::open(path).is_ok()
}

fn find_vmlinux_in<'loc, L>(locations: L, sym: Option<&str>, release: &str) -> Option<PathBuf>
where
    L: IntoIterator<Item = &'loc VmlinuxLocation>,
{
    for location in locations {
        if location.raw {
            continue
        }

        let path = match expand_template(&location.path, release) {
            Some(path) => path,
            None => {
                warn!("unsupported placeholder in vmlinux location `{}`", location.path);
                continue
            }
        };
        if path.len() >= libc::PATH_MAX as usize {
            warn!("vmlinux location `{}` expands to an overly long path", location.path);
            continue
        }

        let path = PathBuf::from(path);
        if !is_readable(&path) {
            continue
        }

        match sym {
            None => return Some(path),
            Some(sym) => {
                if defines_symbol(&path, sym) {
                    return Some(path)
                }
                debug!("{} does not contain symbol `{sym}`", path.display());
            }
        }
    }
    None
}

/// Find a kernel image with debug symbols for kernel `release`.
///
/// The image configured via [`Config`] is used in place of the well
/// known [`VMLINUX_LOCATIONS`] if set. Locations holding raw BTF are
/// skipped. If `sym` is provided, only an image defining that symbol
/// at a non-zero address is accepted.
#[cfg_attr(feature = "tracing", crate::log::instrument(skip(config)))]
pub fn find_vmlinux(config: &Config, sym: Option<&str>, release: &str) -> Option<PathBuf> {
    let vmlinux = match config.vmlinux() {
        Some(path) => {
            let location = VmlinuxLocation {
                path: Cow::Owned(path.to_string_lossy().into_owned()),
                raw: false,
            };
            find_vmlinux_in([&location], sym, release)
        }
        None => find_vmlinux_in(VMLINUX_LOCATIONS, sym, release),
    };

    match &vmlinux {
        Some(path) => debug!("using kernel image {}", path.display()),
        None => debug!("no kernel image found for release {release}"),
    }
    vmlinux
}
