use std::env::current_exe;
use std::fs;
use std::process;
use std::process::Command;
use std::process::Stdio;

use probenv::maps::all_running_pids;
use probenv::maps::pids_for_program;
use probenv::maps::MappedPaths;
use probenv::path::BinaryResolver;
use probenv::Config;
use probenv::Pid;

use scopeguard::defer;

use test_log::test;


/// Check that our own executable shows up first among our mappings.
#[test]
fn own_mapped_paths() {
    let exe = fs::canonicalize(current_exe().unwrap()).unwrap();
    let mut mapped = MappedPaths::new();

    let paths = mapped.mapped_paths(Pid::Slf).unwrap();
    assert_eq!(paths.first(), Some(&exe));

    let pid = Pid::from(process::id());
    let paths = mapped.mapped_paths(pid).unwrap();
    assert_eq!(paths.first(), Some(&exe));
    // Every image is reported only once.
    let mut deduped = paths.clone();
    let () = deduped.sort();
    let () = deduped.dedup();
    assert_eq!(deduped.len(), paths.len());
}

/// Check that processes are found by the program they run.
#[test]
fn program_pids() {
    let config = Config::from_env();
    let resolver = BinaryResolver::new(&config);
    let Some(sleep) = resolver.find_in_path("sleep") else {
        return
    };

    let mut child = Command::new(&sleep)
        .arg("30")
        .stdout(Stdio::null())
        .spawn()
        .unwrap();
    let child_pid = Pid::from(child.id());
    defer! {
        let _result = child.kill();
        let _status = child.wait();
    }

    assert!(all_running_pids().unwrap().contains(&child_pid));
    let pids = pids_for_program(&sleep).unwrap();
    assert!(pids.contains(&child_pid), "{pids:?}");

    let mut mapped = MappedPaths::new();
    let paths = mapped.mapped_paths_for_running_pids().unwrap();
    assert!(paths.contains(&fs::canonicalize(&sleep).unwrap()));
}
