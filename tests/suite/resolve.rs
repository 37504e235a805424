use std::env::current_exe;
use std::fs;
use std::os::unix::fs::PermissionsExt as _;
use std::path::PathBuf;
use std::process;

use probenv::elf;
use probenv::elf::ElfType;
use probenv::path::abs_path;
use probenv::path::BinaryResolver;
use probenv::Config;
use probenv::Pid;

use tempfile::tempdir;

use test_log::test;


/// Retrieve the path to the running test binary, which is a position
/// independent executable (and hence an ELF shared object).
fn test_exe() -> PathBuf {
    current_exe().unwrap()
}


/// Check that we can inspect the running test binary.
#[test]
fn inspect_test_binary() {
    let exe = test_exe();
    let type_ = elf::inspect(&exe).unwrap();
    assert!(matches!(type_, ElfType::Exec | ElfType::Dyn), "{type_:?}");
    assert!(elf::is_usable_binary(&exe));

    let syms = elf::symbol_table(&exe);
    assert!(!syms.is_empty());
}

/// Check that a binary is found through the search path, both from our
/// own point of view and from that of our own process.
#[test]
fn resolve_through_path() {
    let exe = test_exe();
    let dir = exe.parent().unwrap();
    let name = exe.file_name().unwrap().to_str().unwrap();

    let config = Config::builder()
        .set_path(Some(format!("/does-not-exist:{}", dir.display())))
        .build();
    let resolver = BinaryResolver::new(&config);

    let paths = resolver.resolve(name, None).unwrap();
    assert_eq!(paths, vec![exe.clone()]);

    let pid = Pid::from(process::id());
    let paths = resolver.resolve(name, Some(pid)).unwrap();
    assert_eq!(paths, vec![exe.clone()]);

    let paths = resolver.resolve(exe.to_str().unwrap(), None).unwrap();
    assert_eq!(paths, vec![exe]);
}

/// Check that wildcard commands expand to all matching binaries.
#[test]
fn resolve_wildcard() {
    let exe = test_exe();
    let dir = tempdir().unwrap();
    let first = dir.path().join("probe-target-1");
    let second = dir.path().join("probe-target-2");
    let _cnt = fs::copy(&exe, &first).unwrap();
    let _cnt = fs::copy(&exe, &second).unwrap();
    let () = fs::write(dir.path().join("probe-target-3"), b"not ELF").unwrap();

    let config = Config::builder()
        .set_path(Some(dir.path().as_os_str()))
        .build();
    let resolver = BinaryResolver::new(&config);
    let mut paths = resolver.resolve("probe-target-*", None).unwrap();
    let () = paths.sort();
    assert_eq!(paths, vec![first.clone(), second]);

    // Position independent executables remain usable without
    // execute permission, as they are shared objects.
    let () = fs::set_permissions(&first, fs::Permissions::from_mode(0o644)).unwrap();
    let type_ = elf::inspect(&first).unwrap();
    let usable = elf::is_usable_binary(&first);
    assert_eq!(usable, type_ == ElfType::Dyn);
}

/// Check that absolute paths are made canonical.
#[test]
fn absolute_paths() {
    let exe = test_exe();
    let dir = exe.parent().unwrap();
    let dotted = dir.join(".").join(exe.file_name().unwrap());
    assert_eq!(abs_path(&dotted), Some(fs::canonicalize(&exe).unwrap()));
}
