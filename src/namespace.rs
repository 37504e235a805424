//! Mount namespace awareness.
//!
//! A process running in a different mount namespace (e.g., inside a
//! container) sees a different file system than we do. Paths it
//! reports need to be accessed through `/proc/<pid>/root`.

use std::ffi::OsStr;
use std::fs;
use std::io;
use std::os::unix::ffi::OsStrExt as _;
use std::os::unix::fs::MetadataExt as _;
use std::path::Path;
use std::path::PathBuf;

use crate::log::debug;
use crate::Error;
use crate::ErrorExt as _;
use crate::Pid;
use crate::Result;


fn mount_ns_id(path: &Path) -> io::Result<(u64, u64)> {
    let meta = fs::metadata(path)?;
    Ok((meta.dev(), meta.ino()))
}

fn is_different_mount_ns_impl(pid: Pid, self_ns: &Path, target_ns: &Path) -> Result<bool> {
    let self_id = mount_ns_id(self_ns).map_err(|err| {
        Error::with_mount_ns(
            format!(
                "failed to compare mount namespace with PID {pid}: failed to stat `{}`",
                self_ns.display()
            ),
            Some(err),
        )
    })?;
    let target_id = mount_ns_id(target_ns).map_err(|err| {
        Error::with_mount_ns(
            format!(
                "failed to compare mount namespace with PID {pid}: failed to stat `{}`",
                target_ns.display()
            ),
            Some(err),
        )
    })?;

    let different = self_id != target_id;
    debug!("process {pid} in different mount namespace: {different}");
    Ok(different)
}

/// Check whether the process `pid` lives in a mount namespace
/// different from ours.
///
/// An error of kind [`ErrorKind::MountNamespace`][crate::ErrorKind::MountNamespace]
/// is reported if either namespace could not be inspected.
pub fn is_different_mount_ns(pid: Pid) -> Result<bool> {
    match pid {
        Pid::Slf => Ok(false),
        Pid::Pid(..) => {
            let target_ns = PathBuf::from(format!("/proc/{pid}/ns/mnt"));
            is_different_mount_ns_impl(pid, Path::new("/proc/self/ns/mnt"), &target_ns)
        }
    }
}

/// Make `path` relative to the root directory of process `pid`, by
/// prefixing it with `/proc/<pid>/root`.
///
/// Paths already relative to that root are returned unchanged.
pub fn path_for_pid_mountns(pid: Pid, path: &Path) -> PathBuf {
    let root = format!("/proc/{pid}/root");
    let bytes = path.as_os_str().as_bytes();

    if bytes.starts_with(root.as_bytes()) {
        return path.to_path_buf()
    }

    let mut rel = root.into_bytes();
    if !bytes.starts_with(b"/") {
        let () = rel.push(b'/');
    }
    let () = rel.extend_from_slice(bytes);
    PathBuf::from(OsStr::from_bytes(&rel))
}

/// Look up the value of environment variable `name` in the
/// environment of process `pid`.
pub fn read_environ_var(pid: Pid, name: &str) -> Result<Option<String>> {
    let path = format!("/proc/{pid}/environ");
    let environ = fs::read(&path).with_context(|| format!("failed to read `{path}`"))?;
    Ok(find_environ_var(&environ, name))
}

fn find_environ_var(environ: &[u8], name: &str) -> Option<String> {
    environ
        .split(|byte| *byte == b'\0')
        .filter_map(|record| {
            let value = record.strip_prefix(name.as_bytes())?.strip_prefix(b"=")?;
            Some(String::from_utf8_lossy(value).into_owned())
        })
        .next()
}


#[cfg(test)]
mod tests {
    use super::*;

    use std::process;

    use tempfile::tempdir;
    use test_log::test;

    use crate::ErrorKind;


    /// We are never in a different mount namespace than ourselves.
    #[test]
    fn same_mount_ns() {
        assert!(!is_different_mount_ns(Pid::Slf).unwrap());
        let pid = Pid::from(process::id());
        assert!(!is_different_mount_ns(pid).unwrap());
    }

    /// Failure to inspect a namespace is an error, not "same
    /// namespace".
    #[test]
    fn mount_ns_comparison_failure() {
        let pid = Pid::from(u32::MAX);
        let err = is_different_mount_ns(pid).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MountNamespace);

        let dir = tempdir().unwrap();
        let missing = dir.path().join("mnt");
        let err = is_different_mount_ns_impl(pid, &missing, Path::new("/proc/self/ns/mnt"))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MountNamespace);
    }

    /// Two distinct files stand in for distinct namespaces.
    #[test]
    fn different_mount_ns() {
        let dir = tempdir().unwrap();
        let a = dir.path().join("a");
        let b = dir.path().join("b");
        let () = fs::write(&a, b"").unwrap();
        let () = fs::write(&b, b"").unwrap();
        let pid = Pid::from(42);
        assert!(is_different_mount_ns_impl(pid, &a, &b).unwrap());
        assert!(!is_different_mount_ns_impl(pid, &a, &a).unwrap());
    }

    /// Check rewriting of paths for another mount namespace.
    #[test]
    fn mount_ns_path_rewriting() {
        let pid = Pid::from(1234);
        assert_eq!(
            path_for_pid_mountns(pid, Path::new("/usr/bin/ls")),
            Path::new("/proc/1234/root/usr/bin/ls")
        );
        assert_eq!(
            path_for_pid_mountns(pid, Path::new("bin/ls")),
            Path::new("/proc/1234/root/bin/ls")
        );

        let rewritten = path_for_pid_mountns(pid, Path::new("/usr/bin/ls"));
        assert_eq!(path_for_pid_mountns(pid, &rewritten), rewritten);
    }

    /// Check that we find variables in a NUL separated environment
    /// block.
    #[test]
    fn environ_var_lookup() {
        let environ = b"HOME=/root\0MYPATH=/nope\0PATH=/bin:/usr/bin\0EMPTY=\0";
        assert_eq!(
            find_environ_var(environ, "PATH"),
            Some("/bin:/usr/bin".to_string())
        );
        assert_eq!(find_environ_var(environ, "EMPTY"), Some(String::new()));
        assert_eq!(find_environ_var(environ, "PAT"), None);
        assert_eq!(find_environ_var(environ, "USER"), None);
        assert_eq!(find_environ_var(b"", "PATH"), None);
    }

    /// Check that we can read our own environment via procfs.
    #[test]
    fn own_environ_reading() {
        // The environment block reflects the state at process start,
        // so only check for a lack of errors here.
        let _path = read_environ_var(Pid::Slf, "PATH").unwrap();
    }
}
