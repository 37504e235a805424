use std::fs;


/// The kernel UAPI header defining `LINUX_VERSION_CODE`.
const VERSION_HEADER: &str = "/usr/include/linux/version.h";


/// Extract the value of `LINUX_VERSION_CODE` from the contents of
/// `linux/version.h`.
fn version_code(header: &str) -> Option<u32> {
    header.lines().find_map(|line| {
        let mut words = line.split_whitespace();
        match (words.next(), words.next(), words.next()) {
            (Some("#define"), Some("LINUX_VERSION_CODE"), Some(code)) => code.parse().ok(),
            _ => None,
        }
    })
}

fn main() {
    println!("cargo:rerun-if-changed=build.rs");
    println!("cargo:rerun-if-changed={VERSION_HEADER}");

    // Headers may be absent on the build host, in which case we can't
    // provide a fallback for the vDSO based kernel version lookup.
    let code = fs::read_to_string(VERSION_HEADER)
        .ok()
        .and_then(|header| version_code(&header))
        .unwrap_or(0);
    println!("cargo:rustc-env=PROBENV_BUILD_LINUX_VERSION_CODE={code}");
}
