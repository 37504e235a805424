use std::env::current_exe;
use std::fs;
use std::io::Write as _;

use probenv::elf;
use probenv::kernel;
use probenv::kernel::is_module_loaded;
use probenv::kernel::kernel_version_code;
use probenv::kernel::KConfig;
use probenv::kernel::KernelVersion;
use probenv::kernel::KernelVersionMethod;
use probenv::kernel::TraceableFuncs;
use probenv::Config;

use tempfile::tempdir;
use tempfile::NamedTempFile;

use test_log::test;


/// Check that a configured kernel image is only accepted if it defines
/// the requested symbol.
#[test]
fn vmlinux_override() {
    let exe = current_exe().unwrap();
    let config = Config::builder().set_vmlinux(Some(&exe)).build();
    let release = kernel::kernel_release().unwrap();

    assert_eq!(kernel::find_vmlinux(&config, None, &release), Some(exe.clone()));
    assert_eq!(
        kernel::find_vmlinux(&config, Some("main"), &release),
        Some(exe.clone())
    );
    assert_eq!(
        kernel::find_vmlinux(&config, Some("this_symbol_does_not_exist"), &release),
        None
    );

    // The override is authoritative: no well known location is
    // considered in its place.
    let config = Config::builder()
        .set_vmlinux(Some(exe.with_file_name("does-not-exist")))
        .build();
    assert_eq!(kernel::find_vmlinux(&config, None, &release), None);
}

/// Check that whatever kernel image we find on the system is an ELF
/// file.
#[test]
fn system_vmlinux() {
    let config = Config::builder().build();
    let release = kernel::kernel_release().unwrap();
    if let Some(path) = kernel::find_vmlinux(&config, None, &release) {
        assert!(elf::inspect(&path).is_some(), "{}", path.display());
    }
}

/// Check that explicitly configured kernel directories are reported.
#[test]
fn configured_kernel_dirs() {
    let dir = tempdir().unwrap();
    let source = dir.path().join("source");
    let build = dir.path().join("build");
    let () = fs::create_dir(&source).unwrap();
    let () = fs::create_dir(&build).unwrap();

    let config = Config::builder()
        .set_kernel_dirs(Some(&source), Some(&build))
        .build();
    let dirs = kernel::kernel_dirs(&config, "0.0.0-does-not-exist");
    assert!(dirs.found);
    assert_eq!(dirs.source, source);
    assert_eq!(dirs.build, build);

    let kconfig = KConfig::default();
    let cflags = kernel::kernel_cflags("x86_64", &source, &build, &kconfig, None);
    assert!(cflags.contains(&format!("-I{}/arch/x86/include", source.display())));
    assert!(cflags.contains(&format!("-I{}/include/generated/uapi", build.display())));
}

/// Check that a configured kernel configuration is picked up.
#[test]
fn configured_kconfig() {
    let mut file = NamedTempFile::new().unwrap();
    let () = file
        .write_all(b"# CONFIG_FOO is not set\nCONFIG_BPF=y\nCONFIG_HZ=250\n")
        .unwrap();

    let config = Config::builder().set_kconfig(Some(file.path())).build();
    let kconfig = KConfig::new(&config);
    assert_eq!(kconfig.len(), 2);
    assert!(kconfig.has_value("CONFIG_BPF", "y"));
    assert_eq!(kconfig.get("CONFIG_HZ"), Some("250"));
    assert_eq!(kconfig.get("CONFIG_FOO"), None);
}

/// Make sure that the running kernel's version can be determined.
#[test]
fn running_kernel_version() {
    let version = KernelVersion::new();
    let uts = version.kernel_version(KernelVersionMethod::Uts);
    assert_ne!(uts, 0);
    assert!(uts >= kernel_version_code(2, 6, 0));
    assert_eq!(version.kernel_version(KernelVersionMethod::None), 0);

    // If the vDSO carries a version note, it has to agree with the
    // release at least on the major version.
    let vdso = version.kernel_version(KernelVersionMethod::Vdso);
    if vdso != 0 {
        assert_eq!(vdso >> 16, uts >> 16);
    }
}

/// Check the traceable function catalog on a synthetic tracefs
/// listing.
#[test]
fn traceable_functions() {
    let dir = tempdir().unwrap();
    let available = dir.path().join("available_filter_functions");
    let blacklist = dir.path().join("blacklist");
    let () = fs::write(
        &available,
        "\
do_sys_open
vfs_read
vfs_read [overlay]
__ftrace_invalid_address___64
arch_cpu_idle
vmx_vmexit [kvm_intel]
",
    )
    .unwrap();
    let () = fs::write(
        &blacklist,
        "0xffffffff81000000-0xffffffff81000010\tdo_sys_open\n",
    )
    .unwrap();

    let config = Config::builder()
        .set_available_functions(Some(&available))
        .set_kprobes_blacklist(&blacklist)
        .build();
    let funcs = TraceableFuncs::new(&config).parse();

    assert!(!funcs.contains_key("do_sys_open"));
    assert!(!funcs.contains_key("arch_cpu_idle"));
    assert!(!funcs.contains_key("__ftrace_invalid_address___64"));
    let mut modules = funcs["vfs_read"].iter().cloned().collect::<Vec<_>>();
    let () = modules.sort();
    assert_eq!(modules, vec!["overlay", "vmlinux"]);
    assert!(funcs["vmx_vmexit"].contains("kvm_intel"));
}

/// Check module presence queries.
#[test]
fn module_presence() {
    assert!(is_module_loaded("vmlinux"));
    assert!(!is_module_loaded("probenv_module_that_does_not_exist"));
}
