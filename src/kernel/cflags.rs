use std::path::Path;

use super::KConfig;


/// Map a machine hardware name (`uname -m`) to the name of the
/// corresponding architecture directory in the kernel source tree.
fn kernel_arch(machine: &str) -> &str {
    const PREFIXES: &[(&str, &str)] = &[
        ("x86_64", "x86"),
        ("arm", "arm"),
        ("sa110", "arm"),
        ("s390x", "s390"),
        ("parisc64", "parisc"),
        ("ppc", "powerpc"),
        ("mips", "mips"),
        ("sh", "sh"),
        ("aarch64", "arm64"),
        ("loongarch", "loongarch"),
    ];

    // i386, i486, i586, i686, ...
    let bytes = machine.as_bytes();
    if bytes.first() == Some(&b'i') && bytes.get(2..4) == Some(b"86") {
        return "x86"
    }

    PREFIXES
        .iter()
        .find(|(prefix, _arch)| machine.starts_with(prefix))
        .map(|(_prefix, arch)| *arch)
        .unwrap_or(machine)
}

/// Compute the compiler flags needed for parsing kernel headers.
///
/// `ksrc` and `kobj` are the kernel source and build directories.
/// `arch_override` takes precedence over the architecture derived from
/// `machine` and is additionally announced via `-D__TARGET_ARCH_<arch>`.
pub fn kernel_cflags(
    machine: &str,
    ksrc: &Path,
    kobj: &Path,
    kconfig: &KConfig,
    arch_override: Option<&str>,
) -> Vec<String> {
    let arch = arch_override.unwrap_or_else(|| kernel_arch(machine));
    let ksrc = ksrc.display();
    let kobj = kobj.display();

    let mut cflags = vec![
        "-nostdinc".to_string(),
        "-isystem".to_string(),
        "/virtual/lib/clang/include".to_string(),
        // See $(LINUXINCLUDE) and $(USERINCLUDE) in the kernel's
        // Makefile.
        format!("-I{ksrc}/arch/{arch}/include"),
        format!("-I{kobj}/arch/{arch}/include/generated"),
        format!("-I{ksrc}/include"),
        format!("-I{kobj}/include"),
        format!("-I{ksrc}/arch/{arch}/include/uapi"),
        format!("-I{kobj}/arch/{arch}/include/generated/uapi"),
        format!("-I{ksrc}/include/uapi"),
        format!("-I{kobj}/include/generated/uapi"),
        "-include".to_string(),
        format!("{ksrc}/include/linux/kconfig.h"),
        "-D__KERNEL__".to_string(),
        "-D__BPF_TRACING__".to_string(),
        "-D__HAVE_BUILTIN_BSWAP16__".to_string(),
        "-D__HAVE_BUILTIN_BSWAP32__".to_string(),
        "-D__HAVE_BUILTIN_BSWAP64__".to_string(),
        "-DKBUILD_MODNAME=\"probenv\"".to_string(),
    ];

    if arch_override.is_some() {
        let () = cflags.push(format!("-D__TARGET_ARCH_{arch}"));
    }

    match arch {
        // Required by several headers in arch/arm/include.
        "arm" => cflags.push("-D__LINUX_ARM_ARCH__=7".to_string()),
        // arm64 defines the KASAN shadow scale in its Makefile, which
        // we never run. Values are taken from arch/arm64/Makefile.
        "arm64" if kconfig.has_value("CONFIG_KASAN", "y") => {
            let shift = if kconfig.has_value("CONFIG_KASAN_SW_TAGS", "y") {
                4
            } else {
                3
            };
            let () = cflags.push(format!("-DKASAN_SHADOW_SCALE_SHIFT={shift}"));
        }
        _ => (),
    }

    cflags
}


#[cfg(test)]
mod tests {
    use super::*;

    use test_log::test;


    /// Check the mapping of machine names to architectures.
    #[test]
    fn arch_mapping() {
        assert_eq!(kernel_arch("x86_64"), "x86");
        assert_eq!(kernel_arch("i686"), "x86");
        assert_eq!(kernel_arch("i386"), "x86");
        assert_eq!(kernel_arch("armv7l"), "arm");
        assert_eq!(kernel_arch("sa110"), "arm");
        assert_eq!(kernel_arch("s390x"), "s390");
        assert_eq!(kernel_arch("parisc64"), "parisc");
        assert_eq!(kernel_arch("ppc64le"), "powerpc");
        assert_eq!(kernel_arch("mips64"), "mips");
        assert_eq!(kernel_arch("sh4"), "sh");
        assert_eq!(kernel_arch("aarch64"), "arm64");
        assert_eq!(kernel_arch("loongarch64"), "loongarch");
        assert_eq!(kernel_arch("riscv64"), "riscv64");
        assert_eq!(kernel_arch("ia64"), "ia64");
    }

    /// Check the flags generated for an x86 machine.
    #[test]
    fn x86_cflags() {
        let kconfig = KConfig::default();
        let cflags = kernel_cflags(
            "x86_64",
            Path::new("/ksrc"),
            Path::new("/kobj"),
            &kconfig,
            None,
        );
        assert_eq!(cflags.len(), 19);
        assert_eq!(cflags[..3], ["-nostdinc", "-isystem", "/virtual/lib/clang/include"]);
        assert_eq!(cflags[3], "-I/ksrc/arch/x86/include");
        assert_eq!(cflags[4], "-I/kobj/arch/x86/include/generated");
        assert_eq!(cflags[10], "-I/kobj/include/generated/uapi");
        assert_eq!(cflags[12], "/ksrc/include/linux/kconfig.h");
        assert_eq!(cflags[18], "-DKBUILD_MODNAME=\"probenv\"");
        assert!(!cflags.iter().any(|flag| flag.starts_with("-D__TARGET_ARCH_")));
    }

    /// Check that an architecture override is honored and announced.
    #[test]
    fn arch_override() {
        let kconfig = KConfig::default();
        let cflags = kernel_cflags(
            "x86_64",
            Path::new("/ksrc"),
            Path::new("/kobj"),
            &kconfig,
            Some("arm"),
        );
        assert_eq!(cflags[3], "-I/ksrc/arch/arm/include");
        assert!(cflags.contains(&"-D__TARGET_ARCH_arm".to_string()));
        assert_eq!(cflags.last().unwrap(), "-D__LINUX_ARM_ARCH__=7");
    }

    /// Check the arm64 KASAN special case.
    #[test]
    fn arm64_kasan() {
        let ksrc = Path::new("/ksrc");
        let cflags = kernel_cflags("aarch64", ksrc, ksrc, &KConfig::default(), None);
        assert!(!cflags.iter().any(|flag| flag.contains("KASAN")));

        let kconfig = KConfig::from_reader(b"CONFIG_KASAN=y\n".as_slice()).unwrap();
        let cflags = kernel_cflags("aarch64", ksrc, ksrc, &kconfig, None);
        assert_eq!(cflags.last().unwrap(), "-DKASAN_SHADOW_SCALE_SHIFT=3");

        let kconfig =
            KConfig::from_reader(b"CONFIG_KASAN=y\nCONFIG_KASAN_SW_TAGS=y\n".as_slice()).unwrap();
        let cflags = kernel_cflags("aarch64", ksrc, ksrc, &kconfig, None);
        assert_eq!(cflags.last().unwrap(), "-DKASAN_SHADOW_SCALE_SHIFT=4");
    }
}
