//! Resolution of command names to binaries.

use std::ffi::OsStr;
use std::fs;
use std::io;
use std::os::unix::ffi::OsStrExt as _;
use std::path::Path;
use std::path::PathBuf;

use glob::glob;

use crate::elf::is_usable_binary;
use crate::log::debug;
use crate::log::warn;
use crate::namespace::is_different_mount_ns;
use crate::namespace::path_for_pid_mountns;
use crate::namespace::read_environ_var;
use crate::Config;
use crate::Error;
use crate::ErrorExt as _;
use crate::Pid;
use crate::Result;


/// Split a `PATH` style list of directories, skipping empty entries.
fn split_path_list(paths: &OsStr) -> impl Iterator<Item = &Path> {
    paths
        .as_bytes()
        .split(|byte| *byte == b':')
        .filter(|dir| !dir.is_empty())
        .map(|dir| Path::new(OsStr::from_bytes(dir)))
}

/// Expand a shell style glob pattern into the list of matching paths.
///
/// A pattern that matches nothing is reported as is.
fn expand_wildcard_path(pattern: &Path) -> Result<Vec<PathBuf>> {
    let pattern_str = pattern
        .to_str()
        .ok_or_else(|| Error::with_invalid_input("glob pattern is not valid Unicode"))?;
    let paths = glob(pattern_str)
        .map_err(Error::with_invalid_input)
        .with_context(|| format!("failed to expand glob pattern `{pattern_str}`"))?;

    let mut expanded = Vec::new();
    for result in paths {
        match result {
            Ok(path) => expanded.push(path),
            Err(err) => debug!("skipping unreadable glob match: {err}"),
        }
    }

    if expanded.is_empty() {
        let () = expanded.push(pattern.to_path_buf());
    }
    Ok(expanded)
}


/// A resolver of command names to binaries (executables and shared
/// objects), possibly inside the mount namespace of another process.
#[derive(Debug)]
pub struct BinaryResolver<'cfg> {
    config: &'cfg Config,
}

impl<'cfg> BinaryResolver<'cfg> {
    /// Create a new [`BinaryResolver`] using the executable search path
    /// of the provided [`Config`].
    pub fn new(config: &'cfg Config) -> Self {
        Self { config }
    }

    /// Retrieve the executable search path of process `pid`.
    fn pid_path_list(pid: Pid) -> Option<String> {
        match read_environ_var(pid, "PATH") {
            Ok(path) => path,
            Err(err) => {
                warn!("failed to read PATH of process {pid}: {err:#}");
                None
            }
        }
    }

    /// Resolve `cmd` to the list of binaries it may refer to.
    ///
    /// Candidates are `cmd` itself and, unless it contains a `/`, `cmd`
    /// inside every directory of the executable search path. If `pid`
    /// lives in a different mount namespace, its own `PATH` is used and
    /// candidates are made relative to its root. Candidates containing
    /// `*` are glob expanded. Only ELF executables with owner execute
    /// permission and ELF shared objects are reported.
    #[cfg_attr(feature = "tracing", crate::log::instrument(skip(self), err))]
    pub fn resolve(&self, cmd: &str, pid: Option<Pid>) -> Result<Vec<PathBuf>> {
        let mntns_pid = match pid {
            Some(pid) if is_different_mount_ns(pid)? => Some(pid),
            _ => None,
        };

        let pid_paths;
        let paths = if let Some(pid) = mntns_pid {
            pid_paths = Self::pid_path_list(pid);
            pid_paths.as_deref().map(OsStr::new)
        } else {
            self.config.path.as_deref()
        };

        let mut candidates = vec![PathBuf::from(cmd)];
        if !cmd.contains('/') {
            if let Some(paths) = paths {
                let () = candidates.extend(split_path_list(paths).map(|dir| dir.join(cmd)));
            }
        }

        if let Some(pid) = mntns_pid {
            let () = candidates
                .iter_mut()
                .for_each(|path| *path = path_for_pid_mountns(pid, path));
        }

        if cmd.contains('*') {
            let mut expanded = Vec::with_capacity(candidates.len());
            for path in candidates {
                let () = expanded.extend(expand_wildcard_path(&path)?);
            }
            candidates = expanded;
        }

        let binaries = candidates
            .into_iter()
            .filter(|path| is_usable_binary(path))
            .collect::<Vec<_>>();
        debug!("`{cmd}` resolved to {binaries:?}");
        Ok(binaries)
    }

    /// Find the first directory of the executable search path
    /// containing an entry called `name`.
    pub fn find_in_path(&self, name: &str) -> Option<PathBuf> {
        let paths = self.config.path.as_deref()?;
        split_path_list(paths)
            .map(|dir| dir.join(name))
            .find(|path| path.exists())
    }
}


/// Find a file called `name` in the directory of the currently running
/// executable.
pub fn find_near_self(name: &str) -> Option<PathBuf> {
    let exe = match fs::read_link("/proc/self/exe") {
        Ok(exe) => exe,
        Err(err) => {
            warn!("failed to resolve /proc/self/exe: {err}");
            return None
        }
    };

    let path = exe.with_file_name(name);
    match path.try_exists() {
        Ok(true) => Some(path),
        Ok(false) => None,
        Err(err) => {
            warn!("failed to stat {}: {err}", path.display());
            None
        }
    }
}

/// Convert `path` into a canonical absolute path.
///
/// Paths inside another process' root (`/proc/<pid>/root/...`) are
/// reported unchanged, because canonicalization would escape into our
/// own mount namespace. `None` is returned if canonicalization failed.
pub fn abs_path(path: &Path) -> Option<PathBuf> {
    if is_pid_root_path(path) {
        return Some(path.to_path_buf())
    }

    match fs::canonicalize(path) {
        Ok(path) => Some(path),
        Err(err) if err.kind() == io::ErrorKind::NotFound => None,
        Err(err) => {
            debug!("failed to canonicalize {}: {err}", path.display());
            None
        }
    }
}

fn is_pid_root_path(path: &Path) -> bool {
    let bytes = path.as_os_str().as_bytes();
    let rest = match bytes.strip_prefix(b"/proc/") {
        Some(rest) => rest,
        None => return false,
    };
    let digits = rest.iter().take_while(|byte| byte.is_ascii_digit()).count();
    digits > 0 && rest[digits..].starts_with(b"/root/")
}
