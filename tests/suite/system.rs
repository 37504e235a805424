use std::env;
use std::fs;
use std::io;
use std::io::Write as _;
use std::os::fd::AsRawFd as _;
use std::path::Path;
use std::process;

use probenv::cpu;
use probenv::namespace::is_different_mount_ns;
use probenv::namespace::path_for_pid_mountns;
use probenv::namespace::read_environ_var;
use probenv::stdio::StdioSilencer;
use probenv::ErrorKind;
use probenv::Pid;

use tempfile::NamedTempFile;

use test_fork::fork;

use test_log::test;


/// Make sure that the online CPUs are a subset of the possible ones.
#[test]
fn cpu_lists() {
    let online = cpu::online_cpus().unwrap();
    let possible = cpu::possible_cpus().unwrap();
    assert!(online.iter().all(|cpu| possible.contains(cpu)));

    let max = cpu::max_cpu_id().unwrap();
    assert_eq!(max.wrapping_add(1).count_ones(), 1);
    assert!(possible.iter().all(|cpu| *cpu <= max));
}

/// Check that we share a mount namespace with ourselves.
#[test]
fn own_mount_namespace() {
    let pid = Pid::from(process::id());
    assert!(!is_different_mount_ns(pid).unwrap());
    assert!(!is_different_mount_ns(Pid::Slf).unwrap());

    let path = path_for_pid_mountns(pid, Path::new("/usr/bin/true"));
    assert_eq!(path, Path::new(&format!("/proc/{pid}/root/usr/bin/true")));
}

/// Check that we can read variables from our own environment.
#[test]
fn own_environment() {
    let pid = Pid::from(process::id());
    let path = read_environ_var(pid, "PATH").unwrap();
    assert_eq!(path, env::var("PATH").ok());
    assert_eq!(read_environ_var(pid, "PROBENV_UNSET_VARIABLE").unwrap(), None);
}

/// Check that standard output is silenced and restored.
///
/// Redirecting standard output affects the whole process, which is why
/// the test runs in a child.
#[fork]
#[test]
fn silence_stdout() {
    let file = NamedTempFile::new().unwrap();
    let rc = unsafe { libc::dup2(file.as_file().as_raw_fd(), libc::STDOUT_FILENO) };
    assert!(rc >= 0, "{}", io::Error::last_os_error());

    let () = io::stdout().write_all(b"visible ").unwrap();
    {
        let silencer = StdioSilencer::stdout().unwrap();
        assert!(silencer.is_active());
        let () = io::stdout().write_all(b"hidden ").unwrap();
    }
    let () = io::stdout().write_all(b"again").unwrap();
    let () = io::stdout().flush().unwrap();

    let content = fs::read_to_string(file.path()).unwrap();
    assert_eq!(content, "visible again");
}

/// Check that running out of file descriptors is reported.
#[fork]
#[test]
fn silence_without_descriptors() {
    let mut limit = libc::rlimit {
        rlim_cur: 0,
        rlim_max: 0,
    };
    let rc = unsafe { libc::getrlimit(libc::RLIMIT_NOFILE, &mut limit) };
    assert_eq!(rc, 0, "{}", io::Error::last_os_error());

    // With a soft limit of zero no new descriptor can be allocated.
    limit.rlim_cur = 0;
    let rc = unsafe { libc::setrlimit(libc::RLIMIT_NOFILE, &limit) };
    assert_eq!(rc, 0, "{}", io::Error::last_os_error());

    let err = StdioSilencer::stderr().unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ResourceLimit);
}
