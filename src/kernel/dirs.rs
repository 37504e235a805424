use std::path::Path;
use std::path::PathBuf;

use crate::log::debug;
use crate::Config;


/// The kernel header directory baked in at build time, if any.
const KERNEL_HEADERS_DIR: Option<&str> = option_env!("PROBENV_KERNEL_HEADERS_DIR");

/// The directory holding per-release kernel module trees.
const MODULES_DIR: &str = "/lib/modules";


/// The source and build directories of a kernel.
///
/// If `found` is `false`, the directories are merely the locations
/// that were expected to hold the headers.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct KernelDirs {
    /// The kernel source directory (headers, `include/`).
    pub source: PathBuf,
    /// The kernel build (object) directory (generated headers).
    pub build: PathBuf,
    /// Whether the directories are known to exist.
    pub found: bool,
}

fn kernel_dirs_impl(
    headers_dir: Option<&str>,
    config: &Config,
    modules_dir: &Path,
    release: &str,
) -> KernelDirs {
    if let Some(dir) = headers_dir.filter(|dir| !dir.is_empty()) {
        let dir = PathBuf::from(dir);
        return KernelDirs {
            source: dir.clone(),
            build: dir,
            found: true,
        }
    }

    if let Some(source) = &config.kernel_source {
        let build = config.kernel_build.clone().unwrap_or_else(|| source.clone());
        return KernelDirs {
            source: source.clone(),
            build,
            found: true,
        }
    }

    let modules = modules_dir.join(release);
    let source = modules.join("source");
    let build = modules.join("build");
    let (source, build) = match (source.is_dir(), build.is_dir()) {
        (true, true) => (source, build),
        (true, false) => (source.clone(), source),
        (false, true) => (build.clone(), build),
        (false, false) => {
            debug!("no kernel headers found in {}", modules.display());
            return KernelDirs {
                source,
                build,
                found: false,
            }
        }
    };

    KernelDirs {
        source,
        build,
        found: true,
    }
}

/// Determine the source and build directories of kernel `release`.
///
/// The directory set at build time via `PROBENV_KERNEL_HEADERS_DIR`
/// takes precedence over the directories configured via [`Config`],
/// which in turn take precedence over
/// `/lib/modules/<release>/{source,build}`. If only one of the latter
/// exists, it is used for both. If neither exists, they are reported
/// nevertheless, with `found` unset.
pub fn kernel_dirs(config: &Config, release: &str) -> KernelDirs {
    let dirs = kernel_dirs_impl(KERNEL_HEADERS_DIR, config, Path::new(MODULES_DIR), release);
    debug!("kernel directories for release {release}: {dirs:?}");
    dirs
}
